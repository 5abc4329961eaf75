// src/main.rs
use actix_web::{App, HttpServer, middleware, web};
use log::info;
use std::sync::Arc;

mod config;
mod errors;
mod flows;
mod handlers;
mod keyboards;
mod models;
mod polling;
mod services;
mod session;
mod texts;

use crate::config::Config;
use crate::flows::AppContext;
use crate::services::completion::HttpCompletionClient;
use crate::services::telegram::TelegramClient;

#[actix_web::main]
async fn main() -> anyhow::Result<()> {
    env_logger::init_from_env(env_logger::Env::new().default_filter_or("info"));

    info!("Starting Cardsmith bot...");

    let config = Config::from_env()?;
    let client = reqwest::Client::new();

    let telegram = Arc::new(TelegramClient::new(
        client.clone(),
        &config.telegram_api_url,
        &config.telegram_bot_token,
    ));
    let text_backend = Arc::new(HttpCompletionClient::new(
        client.clone(),
        "Grok",
        config.grok_api_url.clone(),
        config.grok_api_key.clone(),
        config.image_timeout(),
    ));
    let image_backend = Arc::new(
        HttpCompletionClient::new(
            client,
            "OpenRouter",
            config.openrouter_api_url.clone(),
            config.openrouter_api_key.clone(),
            config.image_timeout(),
        )
        .with_header("HTTP-Referer", "https://t.me/cardsmith_bot")
        .with_header("X-Title", "Cardsmith"),
    );

    info!("Text model: {}, image model: {}", config.grok_model, config.image_model);

    let webhook_url = config.webhook_url.clone();
    let bind_addr = config.bind_addr.clone();
    let ctx = Arc::new(AppContext::new(
        config,
        telegram.clone(),
        text_backend,
        image_backend,
    ));

    let Some(webhook_url) = webhook_url else {
        polling::run(ctx, telegram).await?;
        return Ok(());
    };

    let webhook_url = if webhook_url.trim_end_matches('/').ends_with("/webhook") {
        webhook_url
    } else {
        format!("{}/webhook", webhook_url.trim_end_matches('/'))
    };
    telegram
        .set_webhook(&webhook_url, &ctx.config.webhook_secret)
        .await?;
    info!("Webhook set to {}", webhook_url);

    info!("Starting HTTP server on {}", bind_addr);

    let data = web::Data::from(ctx);
    HttpServer::new(move || {
        App::new()
            .app_data(data.clone())
            .wrap(middleware::Logger::default())
            .configure(handlers::configure)
    })
    .bind(&bind_addr)?
    .run()
    .await?;

    Ok(())
}
