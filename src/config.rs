// src/config.rs
use crate::errors::BotError;
use std::time::Duration;
use uuid::Uuid;

const TOKEN_PLACEHOLDER: &str = "YOUR_TELEGRAM_BOT_TOKEN_HERE";

#[derive(Debug, Clone)]
pub struct Config {
    // Telegram
    pub telegram_bot_token: String,
    pub telegram_api_url: String,
    pub webhook_url: Option<String>,
    pub webhook_secret: String,
    pub bind_addr: String,

    // Text model (keywords, SEO)
    pub grok_api_key: String,
    pub grok_api_url: String,
    pub grok_model: String,

    // Image model
    pub openrouter_api_key: String,
    pub openrouter_api_url: String,
    pub image_model: String,

    // Image settings
    pub max_image_size_mb: usize,
    pub image_timeout_seconds: u64,
    pub default_slides_count: u32,
    pub min_slides: u32,
    pub max_slides: u32,

    // Marketplace slide size (3:4)
    pub image_width: u32,
    pub image_height: u32,
}

impl Config {
    /// Loads `.env` if present, then reads the process environment.
    pub fn from_env() -> Result<Self, BotError> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, BotError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |name: &str, default: &str| {
            lookup(name)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };
        let number = |name: &str, default: u64| -> Result<u64, BotError> {
            match lookup(name).map(|v| v.trim().to_string()) {
                Some(v) if !v.is_empty() => v
                    .parse::<u64>()
                    .map_err(|_| BotError::Config(format!("{} must be a number, got '{}'", name, v))),
                _ => Ok(default),
            }
        };
        let narrow = |name: &str, default: u32| -> Result<u32, BotError> {
            let value = number(name, default.into())?;
            u32::try_from(value)
                .map_err(|_| BotError::Config(format!("{} is out of range: {}", name, value)))
        };

        let config = Config {
            telegram_bot_token: string("TELEGRAM_BOT_TOKEN", ""),
            telegram_api_url: string("TELEGRAM_API_URL", "https://api.telegram.org"),
            webhook_url: lookup("WEBHOOK_URL")
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty()),
            webhook_secret: string("WEBHOOK_SECRET", &Uuid::new_v4().simple().to_string()),
            bind_addr: string("BIND_ADDR", "0.0.0.0:8080"),

            grok_api_key: string("GROK_API_KEY", ""),
            grok_api_url: string("GROK_API_URL", "https://api.x.ai/v1/chat/completions"),
            grok_model: string("GROK_MODEL", "grok-4"),

            openrouter_api_key: string("OPENROUTER_API_KEY", ""),
            openrouter_api_url: string(
                "OPENROUTER_API_URL",
                "https://openrouter.ai/api/v1/chat/completions",
            ),
            image_model: string("IMAGE_MODEL", "google/gemini-3-pro-image-preview"),

            max_image_size_mb: narrow("MAX_IMAGE_SIZE_MB", 10)? as usize,
            image_timeout_seconds: number("IMAGE_TIMEOUT_SECONDS", 120)?,
            default_slides_count: narrow("DEFAULT_SLIDES", 5)?,
            min_slides: narrow("MIN_SLIDES", 3)?,
            max_slides: narrow("MAX_SLIDES", 7)?,

            image_width: narrow("IMAGE_WIDTH", 900)?,
            image_height: narrow("IMAGE_HEIGHT", 1200)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Collects every problem so the operator sees them all at once.
    pub fn validate(&self) -> Result<(), BotError> {
        let mut errors = Vec::new();

        if self.telegram_bot_token.is_empty() || self.telegram_bot_token == TOKEN_PLACEHOLDER {
            errors.push("TELEGRAM_BOT_TOKEN is not set".to_string());
        }
        if self.grok_api_key.is_empty() {
            errors.push("GROK_API_KEY is not set".to_string());
        }
        if self.openrouter_api_key.is_empty() {
            errors.push("OPENROUTER_API_KEY is not set".to_string());
        }
        if self.min_slides == 0 || self.min_slides > self.max_slides {
            errors.push(format!(
                "slide bounds are invalid: MIN_SLIDES={} MAX_SLIDES={}",
                self.min_slides, self.max_slides
            ));
        }
        if let Some(url) = &self.webhook_url {
            if !url.starts_with("https://") {
                errors.push(format!("WEBHOOK_URL must use https, got '{}'", url));
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(BotError::Config(errors.join("; ")))
        }
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_secs(self.image_timeout_seconds)
    }

    pub fn clamp_slides(&self, requested: u32) -> u32 {
        requested.clamp(self.min_slides, self.max_slides)
    }
}

#[cfg(test)]
impl Config {
    pub fn for_tests() -> Self {
        let vars = [
            ("TELEGRAM_BOT_TOKEN", "123:abc"),
            ("GROK_API_KEY", "grok"),
            ("OPENROUTER_API_KEY", "router"),
            ("WEBHOOK_SECRET", "secret"),
        ];
        Self::from_lookup(|name| {
            vars.iter()
                .find(|(k, _)| *k == name)
                .map(|(_, v)| v.to_string())
        })
        .expect("test config is valid")
    }
}
