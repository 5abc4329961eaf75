// src/errors.rs
use actix_web::{HttpResponse, ResponseError};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BotError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("HTTP error: {0}")]
    Http(String),

    #[error("Upstream error: {0}")]
    Upstream(String),

    #[error("LLM service error: {0}")]
    Llm(String),

    #[error("Image generation error: {0}")]
    ImageGeneration(String),

    #[error("Image processing error: {0}")]
    ImageProcessing(String),

    #[error("Malformed model response: {0}")]
    MalformedResponse(String),

    #[error("Telegram API error: {0}")]
    Telegram(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<reqwest::Error> for BotError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            BotError::Http(format!("request timed out: {}", e))
        } else {
            BotError::Http(e.to_string())
        }
    }
}

impl From<serde_json::Error> for BotError {
    fn from(e: serde_json::Error) -> Self {
        BotError::Serialization(e.to_string())
    }
}

impl ResponseError for BotError {
    fn error_response(&self) -> HttpResponse {
        match self {
            BotError::Validation(_) => HttpResponse::Unauthorized().json(serde_json::json!({
                "error": "Unauthorized",
                "message": self.to_string()
            })),
            BotError::Serialization(_) | BotError::MalformedResponse(_) => {
                HttpResponse::BadRequest().json(serde_json::json!({
                    "error": "Invalid update",
                    "message": self.to_string()
                }))
            }
            BotError::Llm(_) | BotError::ImageGeneration(_) | BotError::Upstream(_) => {
                HttpResponse::ServiceUnavailable().json(serde_json::json!({
                    "error": "AI service error",
                    "message": self.to_string()
                }))
            }
            _ => HttpResponse::InternalServerError().json(serde_json::json!({
                "error": "Internal error",
                "message": self.to_string()
            })),
        }
    }
}
