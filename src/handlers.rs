// src/handlers.rs
use crate::errors::BotError;
use crate::flows::{AppContext, handle_update};
use crate::services::telegram::Update;
use actix_web::{HttpRequest, HttpResponse, web};
use log::{debug, warn};

pub const SECRET_HEADER: &str = "X-Telegram-Bot-Api-Secret-Token";

/// Telegram webhook. The update is acknowledged at once and handled on its
/// own task so slow model calls never hold the HTTP response.
pub async fn webhook(
    req: HttpRequest,
    body: web::Bytes,
    ctx: web::Data<AppContext>,
) -> Result<HttpResponse, BotError> {
    let secret = req
        .headers()
        .get(SECRET_HEADER)
        .and_then(|value| value.to_str().ok());

    if secret != Some(ctx.config.webhook_secret.as_str()) {
        warn!("Webhook call with missing or wrong secret token");
        return Err(BotError::Validation("invalid secret token".to_string()));
    }

    let update: Update = serde_json::from_slice(&body)?;
    debug!("Webhook update {}", update.update_id);

    tokio::spawn(handle_update(ctx.into_inner(), update));

    Ok(HttpResponse::Ok().json(serde_json::json!({ "ok": true })))
}

pub async fn health(ctx: web::Data<AppContext>) -> HttpResponse {
    HttpResponse::Ok().json(serde_json::json!({
        "status": "healthy",
        "service": "cardsmith",
        "version": env!("CARGO_PKG_VERSION"),
        "sessions": ctx.sessions.len().await,
    }))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.route("/webhook", web::post().to(webhook))
        .route("/health", web::get().to(health));
}
