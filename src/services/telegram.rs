// src/services/telegram.rs
use crate::errors::BotError;
use async_trait::async_trait;
use bytes::Bytes;
use log::{debug, warn};
use reqwest::Client;
use reqwest::multipart::{Form, Part};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::time::Duration;

pub const MESSAGE_LIMIT: usize = 4096;
pub const CAPTION_LIMIT: usize = 1024;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Clone, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub callback_query: Option<CallbackQuery>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Message {
    pub message_id: i64,
    #[serde(default)]
    pub from: Option<User>,
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
    #[serde(default)]
    pub photo: Vec<PhotoSize>,
    #[serde(default)]
    pub document: Option<Document>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub id: i64,
    #[serde(default)]
    pub first_name: String,
    #[serde(default)]
    pub username: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct PhotoSize {
    pub file_id: String,
    #[serde(default)]
    pub width: u32,
    #[serde(default)]
    pub height: u32,
    #[serde(default)]
    pub file_size: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Document {
    pub file_id: String,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub file_name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    #[serde(default)]
    pub message: Option<Message>,
    #[serde(default)]
    pub data: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct File {
    pub file_id: String,
    #[serde(default)]
    pub file_path: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InlineKeyboardMarkup {
    pub inline_keyboard: Vec<Vec<InlineKeyboardButton>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InlineKeyboardButton {
    pub text: String,
    pub callback_data: String,
}

impl InlineKeyboardButton {
    pub fn new(text: &str, callback_data: &str) -> Self {
        Self {
            text: text.to_string(),
            callback_data: callback_data.to_string(),
        }
    }
}

#[cfg(test)]
impl InlineKeyboardMarkup {
    pub fn callbacks(&self) -> impl Iterator<Item = &str> {
        self.inline_keyboard
            .iter()
            .flatten()
            .map(|b| b.callback_data.as_str())
    }
}

#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    #[serde(default)]
    description: Option<String>,
}

/// The subset of the Bot API the conversation flows use. All text is sent
/// with HTML parse mode.
#[async_trait]
pub trait Messenger: Send + Sync {
    /// Returns the id of the last message sent.
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError>;

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), BotError>;

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), BotError>;

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: Vec<u8>,
        filename: &str,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError>;

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), BotError>;

    async fn download_file(&self, file_id: &str) -> Result<Bytes, BotError>;
}

pub struct TelegramClient {
    client: Client,
    api_base: String,
    file_base: String,
}

impl TelegramClient {
    pub fn new(client: Client, api_url: &str, token: &str) -> Self {
        let api_url = api_url.trim_end_matches('/');
        Self {
            client,
            api_base: format!("{}/bot{}", api_url, token),
            file_base: format!("{}/file/bot{}", api_url, token),
        }
    }

    async fn read_envelope<T: DeserializeOwned>(
        method: &str,
        response: reqwest::Response,
    ) -> Result<T, BotError> {
        let status = response.status();
        let envelope: ApiResponse<T> = response.json().await.map_err(|e| {
            BotError::Telegram(format!("{} returned unreadable body ({}): {}", method, status, e))
        })?;

        if !envelope.ok {
            return Err(BotError::Telegram(format!(
                "{} failed: {}",
                method,
                envelope.description.unwrap_or_else(|| status.to_string())
            )));
        }

        envelope
            .result
            .ok_or_else(|| BotError::Telegram(format!("{} returned no result", method)))
    }

    async fn call<T: DeserializeOwned>(
        &self,
        method: &str,
        body: &serde_json::Value,
        timeout: Duration,
    ) -> Result<T, BotError> {
        debug!("Telegram call: {}", method);
        let response = self
            .client
            .post(format!("{}/{}", self.api_base, method))
            .timeout(timeout)
            .json(body)
            .send()
            .await?;
        Self::read_envelope(method, response).await
    }

    pub async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, BotError> {
        self.call(
            "getUpdates",
            &serde_json::json!({
                "offset": offset,
                "timeout": timeout_secs,
                "allowed_updates": ["message", "callback_query"],
            }),
            Duration::from_secs(timeout_secs) + REQUEST_TIMEOUT,
        )
        .await
    }

    pub async fn set_webhook(&self, url: &str, secret: &str) -> Result<(), BotError> {
        let _: bool = self
            .call(
                "setWebhook",
                &serde_json::json!({
                    "url": url,
                    "secret_token": secret,
                    "allowed_updates": ["message", "callback_query"],
                }),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    pub async fn delete_webhook(&self) -> Result<(), BotError> {
        let _: bool = self
            .call("deleteWebhook", &serde_json::json!({}), REQUEST_TIMEOUT)
            .await?;
        Ok(())
    }
}

#[async_trait]
impl Messenger for TelegramClient {
    async fn send_message(
        &self,
        chat_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError> {
        let chunks = split_message(text, MESSAGE_LIMIT);
        let last = chunks.len().saturating_sub(1);
        let mut message_id = 0;

        for (index, chunk) in chunks.iter().enumerate() {
            let mut body = serde_json::json!({
                "chat_id": chat_id,
                "text": chunk,
                "parse_mode": "HTML",
            });
            if let Some(keyboard) = keyboard.filter(|_| index == last) {
                body["reply_markup"] = serde_json::to_value(keyboard)?;
            }

            let message: Message = self.call("sendMessage", &body, REQUEST_TIMEOUT).await?;
            message_id = message.message_id;
        }

        Ok(message_id)
    }

    async fn edit_message_text(
        &self,
        chat_id: i64,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<(), BotError> {
        if text.chars().count() > MESSAGE_LIMIT {
            return Err(BotError::Telegram(
                "text too long to edit in place".to_string(),
            ));
        }

        let mut body = serde_json::json!({
            "chat_id": chat_id,
            "message_id": message_id,
            "text": text,
            "parse_mode": "HTML",
        });
        if let Some(keyboard) = keyboard {
            body["reply_markup"] = serde_json::to_value(keyboard)?;
        }

        // Returns the edited Message, or `true` for inline messages.
        let _: serde_json::Value = self.call("editMessageText", &body, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn delete_message(&self, chat_id: i64, message_id: i64) -> Result<(), BotError> {
        let _: bool = self
            .call(
                "deleteMessage",
                &serde_json::json!({ "chat_id": chat_id, "message_id": message_id }),
                REQUEST_TIMEOUT,
            )
            .await?;
        Ok(())
    }

    async fn send_photo(
        &self,
        chat_id: i64,
        photo: Vec<u8>,
        filename: &str,
        caption: Option<&str>,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError> {
        let part = Part::bytes(photo)
            .file_name(filename.to_string())
            .mime_str("image/jpeg")?;

        let mut form = Form::new()
            .text("chat_id", chat_id.to_string())
            .part("photo", part);
        if let Some(caption) = caption {
            form = form
                .text("caption", truncate_caption(caption))
                .text("parse_mode", "HTML");
        }
        if let Some(keyboard) = keyboard {
            form = form.text("reply_markup", serde_json::to_string(keyboard)?);
        }

        let response = self
            .client
            .post(format!("{}/sendPhoto", self.api_base))
            .timeout(REQUEST_TIMEOUT * 2)
            .multipart(form)
            .send()
            .await?;

        let message: Message = Self::read_envelope("sendPhoto", response).await?;
        Ok(message.message_id)
    }

    async fn answer_callback(&self, callback_id: &str, text: Option<&str>) -> Result<(), BotError> {
        let mut body = serde_json::json!({ "callback_query_id": callback_id });
        if let Some(text) = text {
            body["text"] = serde_json::Value::from(text);
        }
        let _: bool = self.call("answerCallbackQuery", &body, REQUEST_TIMEOUT).await?;
        Ok(())
    }

    async fn download_file(&self, file_id: &str) -> Result<Bytes, BotError> {
        let file: File = self
            .call(
                "getFile",
                &serde_json::json!({ "file_id": file_id }),
                REQUEST_TIMEOUT,
            )
            .await?;

        let path = file
            .file_path
            .ok_or_else(|| BotError::Telegram(format!("file {} has no path", file.file_id)))?;

        let response = self
            .client
            .get(format!("{}/{}", self.file_base, path))
            .timeout(REQUEST_TIMEOUT * 2)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(BotError::Telegram(format!(
                "file download failed: {}",
                response.status()
            )));
        }

        Ok(response.bytes().await?)
    }
}

/// Splits text into chunks of at most `limit` characters, breaking on line
/// boundaries where possible.
pub fn split_message(text: &str, limit: usize) -> Vec<String> {
    if text.chars().count() <= limit {
        return vec![text.to_string()];
    }

    let mut chunks = Vec::new();
    let mut current = String::new();
    let mut current_len = 0;

    for line in text.split('\n') {
        let line_len = line.chars().count();

        if current_len > 0 && current_len + 1 + line_len > limit {
            chunks.push(std::mem::take(&mut current));
            current_len = 0;
        }

        if line_len > limit {
            let chars: Vec<char> = line.chars().collect();
            for piece in chars.chunks(limit) {
                if current_len > 0 {
                    chunks.push(std::mem::take(&mut current));
                }
                current = piece.iter().collect();
                current_len = piece.len();
            }
            continue;
        }

        if current_len > 0 {
            current.push('\n');
            current_len += 1;
        }
        current.push_str(line);
        current_len += line_len;
    }

    if !current.is_empty() {
        chunks.push(current);
    }

    chunks
}

/// Cuts an HTML caption to `CAPTION_LIMIT` visible characters. Entities count
/// as one character and tags as none; the cut never lands inside either, and
/// tags left open are closed.
pub fn truncate_caption(caption: &str) -> String {
    let mut pos = 0;
    let mut visible = 0;
    let mut open: Vec<&str> = Vec::new();

    while pos < caption.len() {
        let rest = &caption[pos..];
        let len = if rest.starts_with('<') {
            let len = rest.find('>').map_or(rest.len(), |end| end + 1);
            let inner = rest[1..len].trim_end_matches('>');
            let name = inner
                .trim_start_matches('/')
                .split_whitespace()
                .next()
                .unwrap_or_default();
            if inner.starts_with('/') {
                if let Some(i) = open.iter().rposition(|tag| *tag == name) {
                    open.truncate(i);
                }
            } else {
                open.push(name);
            }
            len
        } else {
            if visible == CAPTION_LIMIT {
                break;
            }
            visible += 1;
            if rest.starts_with('&') {
                rest.find(';').filter(|&end| end <= 10).map_or(1, |end| end + 1)
            } else {
                rest.chars().next().map_or(1, char::len_utf8)
            }
        };
        pos += len;
    }

    if pos >= caption.len() {
        return caption.to_string();
    }

    warn!("Caption cut to {} characters", CAPTION_LIMIT);
    let mut cut = caption[..pos].to_string();
    for tag in open.iter().rev() {
        cut.push_str(&format!("</{}>", tag));
    }
    cut
}


#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_text_is_one_chunk() {
        assert_eq!(split_message("привет", 10), vec!["привет"]);
    }

    #[test]
    fn long_text_splits_on_lines() {
        let text = "aaaa\nbbbb\ncccc";
        assert_eq!(split_message(text, 9), vec!["aaaa\nbbbb", "cccc"]);
    }

    #[test]
    fn overlong_line_is_hard_split_on_chars() {
        let text = "ёёёёё";
        let chunks = split_message(text, 2);
        assert_eq!(chunks, vec!["ёё", "ёё", "ё"]);
        assert!(chunks.iter().all(|c| c.chars().count() <= 2));
    }

    #[test]
    fn every_chunk_fits_the_limit() {
        let text = (0..500)
            .map(|i| format!("строка номер {}", i))
            .collect::<Vec<_>>()
            .join("\n");
        let chunks = split_message(&text, MESSAGE_LIMIT);
        assert!(chunks.len() > 1);
        assert!(chunks.iter().all(|c| c.chars().count() <= MESSAGE_LIMIT));
        assert_eq!(chunks.join("\n"), text);
    }

    #[test]
    fn captions_are_cut_to_limit() {
        let caption = "я".repeat(CAPTION_LIMIT + 10);
        assert_eq!(truncate_caption(&caption).chars().count(), CAPTION_LIMIT);
        assert_eq!(truncate_caption("ok"), "ok");
    }

    #[test]
    fn caption_cut_respects_entities_and_tags() {
        let body = "&amp;".repeat(CAPTION_LIMIT + 5);
        let caption = format!("<b>Анализ:</b>\n<i>{}</i>", body);
        let cut = truncate_caption(&caption);

        assert!(cut.starts_with("<b>Анализ:</b>\n<i>&amp;"));
        assert!(cut.ends_with("&amp;</i>"));
        let entities = cut.matches("&amp;").count();
        assert_eq!(entities + "Анализ:\n".chars().count(), CAPTION_LIMIT);

        let escaped = crate::texts::snippet(&"<&>".repeat(300), 700);
        assert_eq!(truncate_caption(&escaped), escaped);
    }

    #[test]
    fn update_with_photo_and_callback_deserializes() {
        let update: Update = serde_json::from_value(serde_json::json!({
            "update_id": 10,
            "message": {
                "message_id": 5,
                "from": { "id": 42, "is_bot": false, "first_name": "Ann" },
                "chat": { "id": 42, "type": "private" },
                "photo": [
                    { "file_id": "small", "file_unique_id": "s", "width": 90, "height": 90 },
                    { "file_id": "big", "file_unique_id": "b", "width": 1280, "height": 1280 }
                ]
            }
        }))
        .unwrap();
        let message = update.message.unwrap();
        assert_eq!(message.photo.last().unwrap().file_id, "big");
        assert!(update.callback_query.is_none());
    }

    #[test]
    fn envelope_reports_description() {
        let envelope: ApiResponse<bool> = serde_json::from_value(serde_json::json!({
            "ok": false,
            "error_code": 400,
            "description": "Bad Request: message is not modified"
        }))
        .unwrap();
        assert!(!envelope.ok);
        assert!(envelope.result.is_none());
        assert_eq!(envelope.description.as_deref(), Some("Bad Request: message is not modified"));
    }

    #[test]
    fn keyboard_serializes_to_bot_api_shape() {
        let keyboard = InlineKeyboardMarkup {
            inline_keyboard: vec![vec![InlineKeyboardButton::new("❌ Отмена", "cancel")]],
        };
        let value = serde_json::to_value(&keyboard).unwrap();
        assert_eq!(value["inline_keyboard"][0][0]["callback_data"], "cancel");
    }
}
