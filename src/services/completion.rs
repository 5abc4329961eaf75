// src/services/completion.rs
use crate::errors::BotError;
use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;

#[derive(Debug, Clone, Serialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<ChatMessage>,
    pub temperature: f32,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modalities: Option<Vec<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub role: String,
    pub content: MessageContent,
}

impl ChatMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self {
            role: "system".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Text(text.into()),
        }
    }

    pub fn user_parts(parts: Vec<ContentPart>) -> Self {
        Self {
            role: "user".to_string(),
            content: MessageContent::Parts(parts),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text { text: String },
    ImageUrl { image_url: ImageUrl },
}

impl ContentPart {
    pub fn text(text: impl Into<String>) -> Self {
        ContentPart::Text { text: text.into() }
    }

    /// Embeds raw image bytes as a base64 data URL.
    pub fn image(data: &[u8], mime: &str) -> Self {
        ContentPart::ImageUrl {
            image_url: ImageUrl {
                url: format!(
                    "data:{};base64,{}",
                    mime,
                    general_purpose::STANDARD.encode(data)
                ),
            },
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageUrl {
    pub url: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct CompletionResponse {
    #[serde(default)]
    pub choices: Vec<Choice>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Choice {
    #[serde(default)]
    pub message: ResponseMessage,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ResponseMessage {
    #[serde(default)]
    pub content: Option<ResponseContent>,
    #[serde(default)]
    pub images: Vec<ResponseImage>,
}

/// Providers answer with either a plain string or a list of typed parts.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ResponseContent {
    Text(String),
    Parts(Vec<serde_json::Value>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseImage {
    #[serde(default)]
    pub image_url: Option<ImageUrl>,
}

impl CompletionResponse {
    pub fn first_message(&self) -> Option<&ResponseMessage> {
        self.choices.first().map(|c| &c.message)
    }

    /// Text of the first choice: the string content, or its first text part.
    pub fn text(&self) -> Option<String> {
        match self.first_message()?.content.as_ref()? {
            ResponseContent::Text(text) => Some(text.clone()),
            ResponseContent::Parts(parts) => parts.iter().find_map(|part| match part {
                serde_json::Value::String(s) => Some(s.clone()),
                serde_json::Value::Object(_) if part["type"] == "text" => {
                    part["text"].as_str().map(|s| s.to_string())
                }
                _ => None,
            }),
        }
    }
}

/// An OpenAI-compatible chat completions endpoint.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BotError>;
}

pub struct HttpCompletionClient {
    client: Client,
    api_url: String,
    api_key: String,
    extra_headers: Vec<(String, String)>,
    timeout: Duration,
    label: &'static str,
}

impl HttpCompletionClient {
    pub fn new(client: Client, label: &'static str, api_url: String, api_key: String, timeout: Duration) -> Self {
        Self {
            client,
            api_url,
            api_key,
            extra_headers: Vec::new(),
            timeout,
            label,
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.extra_headers.push((name.to_string(), value.to_string()));
        self
    }
}

#[async_trait]
impl ChatCompletion for HttpCompletionClient {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BotError> {
        let mut builder = self
            .client
            .post(&self.api_url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .timeout(self.timeout)
            .json(request);
        for (name, value) in &self.extra_headers {
            builder = builder.header(name.as_str(), value.as_str());
        }

        let response = builder
            .send()
            .await
            .map_err(|e| BotError::Upstream(format!("{} request failed: {}", self.label, e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(BotError::Upstream(format!(
                "{} error: {} - {}",
                self.label, status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            BotError::Upstream(format!("Failed to parse {} response: {}", self.label, e))
        })
    }
}

#[cfg(test)]
pub mod fake {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    /// Replays queued responses and records every request it receives.
    #[derive(Default)]
    pub struct ScriptedCompletion {
        replies: Mutex<VecDeque<Result<CompletionResponse, BotError>>>,
        pub requests: Mutex<Vec<CompletionRequest>>,
    }

    impl ScriptedCompletion {
        pub fn push_text(&self, text: &str) {
            self.push_json(serde_json::json!({
                "choices": [{ "message": { "content": text } }]
            }));
        }

        pub fn push_image(&self, data: &[u8]) {
            self.push_json(serde_json::json!({
                "choices": [{ "message": {
                    "content": [{
                        "type": "image_url",
                        "image_url": { "url": format!("data:image/png;base64,{}", general_purpose::STANDARD.encode(data)) }
                    }]
                } }]
            }));
        }

        pub fn push_json(&self, value: serde_json::Value) {
            let response = serde_json::from_value(value).expect("valid response json");
            self.replies.lock().unwrap().push_back(Ok(response));
        }

        pub fn push_error(&self, message: &str) {
            self.replies
                .lock()
                .unwrap()
                .push_back(Err(BotError::Upstream(message.to_string())));
        }

        pub fn request_count(&self) -> usize {
            self.requests.lock().unwrap().len()
        }

        pub fn request(&self, index: usize) -> CompletionRequest {
            self.requests.lock().unwrap()[index].clone()
        }
    }

    #[async_trait]
    impl ChatCompletion for ScriptedCompletion {
        async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, BotError> {
            self.requests.lock().unwrap().push(request.clone());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(BotError::Upstream("no scripted reply".to_string())))
        }
    }

    /// Text of every text part and plain message in a request.
    pub fn request_text(request: &CompletionRequest) -> String {
        request
            .messages
            .iter()
            .flat_map(|m| match &m.content {
                MessageContent::Text(t) => vec![t.clone()],
                MessageContent::Parts(parts) => parts
                    .iter()
                    .filter_map(|p| match p {
                        ContentPart::Text { text } => Some(text.clone()),
                        ContentPart::ImageUrl { .. } => None,
                    })
                    .collect(),
            })
            .collect::<Vec<_>>()
            .join("\n")
    }

    pub fn image_count(request: &CompletionRequest) -> usize {
        request
            .messages
            .iter()
            .map(|m| match &m.content {
                MessageContent::Parts(parts) => parts
                    .iter()
                    .filter(|p| matches!(p, ContentPart::ImageUrl { .. }))
                    .count(),
                MessageContent::Text(_) => 0,
            })
            .sum()
    }
}
