// src/flows/mod.rs
pub mod edit_photo;
pub mod first_slide;
pub mod free_image;
pub mod infographic;
pub mod keywords;
pub mod remove_bg;
pub mod seo;
pub mod seo_slides;
pub mod slides_from_ref;
pub mod start;

use crate::config::Config;
use crate::errors::BotError;
use crate::keyboards;
use crate::services::completion::ChatCompletion;
use crate::services::image_processor::ImageProcessor;
use crate::services::image_service::ImageService;
use crate::services::llm_service::{LlmService, SlideBounds};
use crate::services::telegram::{InlineKeyboardMarkup, Messenger, Update};
use crate::session::{Conversation, Dialog, SessionStore};
use crate::texts;
use bytes::Bytes;
use log::{debug, error, info, warn};
use std::sync::Arc;

/// Services and state shared by every update handler.
pub struct AppContext {
    pub config: Config,
    pub sessions: SessionStore,
    pub messenger: Arc<dyn Messenger>,
    pub llm: LlmService,
    pub images: ImageService,
    pub processor: ImageProcessor,
}

impl AppContext {
    pub fn new(
        config: Config,
        messenger: Arc<dyn Messenger>,
        text_backend: Arc<dyn ChatCompletion>,
        image_backend: Arc<dyn ChatCompletion>,
    ) -> Self {
        let bounds = SlideBounds {
            default: config.default_slides_count,
            min: config.min_slides,
            max: config.max_slides,
        };

        Self {
            llm: LlmService::new(text_backend, config.grok_model.clone(), bounds),
            images: ImageService::new(image_backend, config.image_model.clone()),
            processor: ImageProcessor::new(config.max_image_size_mb),
            sessions: SessionStore::new(),
            messenger,
            config,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Input {
    Command(String),
    Text(String),
    Photo(String),
    Callback {
        id: String,
        data: String,
        message_id: Option<i64>,
    },
    Other,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Incoming {
    pub user_id: i64,
    pub chat_id: i64,
    pub input: Input,
}

const COMMANDS: [&str; 3] = ["start", "help", "menu"];

impl Incoming {
    pub fn from_update(update: &Update) -> Option<Self> {
        if let Some(callback) = &update.callback_query {
            let message = callback.message.as_ref();
            return Some(Incoming {
                user_id: callback.from.id,
                chat_id: message.map(|m| m.chat.id).unwrap_or(callback.from.id),
                input: Input::Callback {
                    id: callback.id.clone(),
                    data: callback.data.clone().unwrap_or_default(),
                    message_id: message.map(|m| m.message_id),
                },
            });
        }

        let message = update.message.as_ref()?;
        let user_id = message.from.as_ref().map(|u| u.id).unwrap_or(message.chat.id);

        let input = if let Some(photo) = message.photo.last() {
            Input::Photo(photo.file_id.clone())
        } else if let Some(document) = message
            .document
            .as_ref()
            .filter(|d| d.mime_type.as_deref().is_some_and(|m| m.starts_with("image/")))
        {
            Input::Photo(document.file_id.clone())
        } else if let Some(text) = &message.text {
            parse_command(text)
                .map(Input::Command)
                .unwrap_or_else(|| Input::Text(text.clone()))
        } else {
            Input::Other
        };

        Some(Incoming {
            user_id,
            chat_id: message.chat.id,
            input,
        })
    }
}

/// `/start@my_bot args` -> `start`, for the commands the bot knows.
fn parse_command(text: &str) -> Option<String> {
    let word = text.trim().strip_prefix('/')?.split_whitespace().next()?;
    let name = word.split('@').next()?.to_lowercase();
    COMMANDS.contains(&name.as_str()).then_some(name)
}

/// Chat operations for the update being handled.
pub struct Turn<'a> {
    pub ctx: &'a AppContext,
    chat_id: i64,
    callback_id: Option<String>,
    callback_message: Option<i64>,
    answered: bool,
}

impl<'a> Turn<'a> {
    pub fn new(ctx: &'a AppContext, incoming: &Incoming) -> Self {
        let (callback_id, callback_message) = match &incoming.input {
            Input::Callback { id, message_id, .. } => (Some(id.clone()), *message_id),
            _ => (None, None),
        };

        Self {
            ctx,
            chat_id: incoming.chat_id,
            callback_id,
            callback_message,
            answered: false,
        }
    }

    /// Answers the callback query, at most once per update.
    pub async fn ack(&mut self, text: Option<&str>) -> Result<(), BotError> {
        if self.answered {
            return Ok(());
        }
        self.answered = true;
        match &self.callback_id {
            Some(id) => self.ctx.messenger.answer_callback(id, text).await,
            None => Ok(()),
        }
    }

    pub async fn stale(&mut self) -> Result<(), BotError> {
        self.ack(Some(texts::STALE_BUTTON)).await
    }

    pub async fn send(
        &self,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError> {
        self.ctx
            .messenger
            .send_message(self.chat_id, text, keyboard)
            .await
    }

    /// Replaces the pressed button's message, or sends a new one when there
    /// is none or it cannot be edited. Returns the id of the shown message.
    pub async fn show(
        &self,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError> {
        match self.callback_message {
            Some(message_id) => self.edit(message_id, text, keyboard).await,
            None => self.send(text, keyboard).await,
        }
    }

    /// Edits a message, falling back to a new message.
    pub async fn edit(
        &self,
        message_id: i64,
        text: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError> {
        match self
            .ctx
            .messenger
            .edit_message_text(self.chat_id, message_id, text, keyboard)
            .await
        {
            Ok(()) => Ok(message_id),
            Err(e) => {
                debug!("Edit of message {} failed ({}), sending new", message_id, e);
                self.send(text, keyboard).await
            }
        }
    }

    /// Best effort; a message that is already gone is not an error.
    pub async fn delete(&self, message_id: i64) {
        if let Err(e) = self
            .ctx
            .messenger
            .delete_message(self.chat_id, message_id)
            .await
        {
            warn!("Failed to delete message {}: {}", message_id, e);
        }
    }

    pub async fn send_photo(
        &self,
        photo: Vec<u8>,
        filename: &str,
        caption: &str,
        keyboard: Option<&InlineKeyboardMarkup>,
    ) -> Result<i64, BotError> {
        self.ctx
            .messenger
            .send_photo(self.chat_id, photo, filename, Some(caption), keyboard)
            .await
    }

    /// Downloads a photo and bounds it for model requests.
    pub async fn download_photo(&self, file_id: &str) -> Result<Bytes, BotError> {
        let data = self.ctx.messenger.download_file(file_id).await?;
        let prepared = self.ctx.processor.prepare_upload(&data)?;
        let (width, height) = self.ctx.processor.dimensions(&prepared)?;
        info!(
            "Photo {} received, {}x{}, {} bytes",
            file_id,
            width,
            height,
            prepared.len()
        );
        Ok(Bytes::from(prepared))
    }

    /// Like `download_photo`, but a failure is reported to the user and
    /// yields `None` so the flow can keep waiting for another photo.
    pub async fn receive_photo(&self, file_id: &str) -> Result<Option<Bytes>, BotError> {
        match self.download_photo(file_id).await {
            Ok(image) => Ok(Some(image)),
            Err(e) => {
                error!("Error receiving photo: {}", e);
                self.send(texts::PHOTO_FAILED, Some(&keyboards::cancel()))
                    .await?;
                Ok(None)
            }
        }
    }

    /// Resizes and compresses a generated image for the chat.
    pub fn for_chat(&self, image: &[u8]) -> Result<Vec<u8>, BotError> {
        self.ctx.processor.prepare_for_chat(image)
    }
}

/// Trimmed text when it has at least `min_chars` characters.
pub fn long_enough(text: &str, min_chars: usize) -> Option<String> {
    (texts::char_len(text) >= min_chars).then(|| text.trim().to_string())
}

pub const MIN_NAME_CHARS: usize = 3;

/// Entry point for every update, from polling or the webhook.
pub async fn handle_update(ctx: Arc<AppContext>, update: Update) {
    match Incoming::from_update(&update) {
        Some(incoming) => dispatch(&ctx, incoming).await,
        None => debug!("Ignoring update {}", update.update_id),
    }
}

pub async fn dispatch(ctx: &AppContext, incoming: Incoming) {
    let conversation = ctx.sessions.entry(incoming.user_id).await;
    let mut conversation = conversation.lock().await;
    let mut turn = Turn::new(ctx, &incoming);

    debug!(
        "User {} in {:?} sent {:?}",
        incoming.user_id, conversation.dialog, incoming.input
    );

    if let Err(e) = route(&mut turn, &mut conversation, &incoming.input).await {
        error!("Error handling update for user {}: {}", incoming.user_id, e);
        conversation.dialog = Dialog::Idle;
        if let Err(e) = turn
            .send(texts::GENERIC_ERROR, Some(&keyboards::back_to_menu()))
            .await
        {
            error!("Failed to report error to user {}: {}", incoming.user_id, e);
        }
    }

    if let Err(e) = turn.ack(None).await {
        warn!("Failed to answer callback: {}", e);
    }
}

async fn route(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    input: &Input,
) -> Result<(), BotError> {
    if let Input::Command(command) = input {
        return start::command(turn, conversation, command).await;
    }

    if let Input::Callback { data, .. } = input {
        if start::handles(data) {
            return start::callback(turn, conversation, data).await;
        }
        match data.as_str() {
            "remove_bg" => return remove_bg::start(turn, conversation).await,
            "keywords" => return keywords::start(turn, conversation).await,
            "seo" => return seo::start(turn, conversation).await,
            "infographic" => return infographic::start(turn, conversation).await,
            "seo_slides" => return seo_slides::start(turn, conversation).await,
            "first_slide" => return first_slide::start(turn, conversation).await,
            "slides_from_ref" => return slides_from_ref::start(turn, conversation).await,
            "free_image" => return free_image::start(turn, conversation).await,
            "edit_photo" => return edit_photo::start(turn, conversation).await,
            _ => {}
        }
    }

    match conversation.dialog.clone() {
        Dialog::Idle => start::idle(turn, input).await,
        Dialog::RemoveBg(step) => remove_bg::handle(turn, conversation, step, input).await,
        Dialog::Keywords(step) => keywords::handle(turn, conversation, step, input).await,
        Dialog::Seo(step) => seo::handle(turn, conversation, step, input).await,
        Dialog::Infographic(step) => infographic::handle(turn, conversation, step, input).await,
        Dialog::SeoSlides(step) => seo_slides::handle(turn, conversation, step, input).await,
        Dialog::FirstSlide(step) => first_slide::handle(turn, conversation, step, input).await,
        Dialog::SlidesFromRef { step, slides_made } => {
            slides_from_ref::handle(turn, conversation, step, slides_made, input).await
        }
        Dialog::FreeImage { step, prompt } => {
            free_image::handle(turn, conversation, step, prompt, input).await
        }
        Dialog::EditPhoto(step) => edit_photo::handle(turn, conversation, step, input).await,
    }
}

/// Reply for input a step does not expect: a toast for buttons, otherwise
/// `hint` with a cancel button.
pub async fn unexpected(turn: &mut Turn<'_>, input: &Input, hint: &str) -> Result<(), BotError> {
    match input {
        Input::Callback { .. } => turn.stale().await,
        _ => {
            turn.send(hint, Some(&keyboards::cancel())).await?;
            Ok(())
        }
    }
}

#[cfg(test)]
pub mod harness {
    use super::*;
    use crate::services::completion::fake::ScriptedCompletion;
    use crate::services::telegram::fake::RecordingMessenger;
    use crate::session::UserSession;

    pub const USER: i64 = 7;

    /// A dispatcher wired to scripted models and a recording messenger.
    pub struct Harness {
        pub ctx: AppContext,
        pub text_model: Arc<ScriptedCompletion>,
        pub image_model: Arc<ScriptedCompletion>,
        pub chat: Arc<RecordingMessenger>,
        next_message: std::sync::atomic::AtomicI64,
    }

    impl Harness {
        pub fn new() -> Self {
            let text_model = Arc::new(ScriptedCompletion::default());
            let image_model = Arc::new(ScriptedCompletion::default());
            let chat = Arc::new(RecordingMessenger::default());
            let ctx = AppContext::new(
                Config::for_tests(),
                chat.clone(),
                text_model.clone(),
                image_model.clone(),
            );
            Self {
                ctx,
                text_model,
                image_model,
                chat,
                next_message: std::sync::atomic::AtomicI64::new(1),
            }
        }

        async fn send(&self, input: Input) {
            dispatch(
                &self.ctx,
                Incoming {
                    user_id: USER,
                    chat_id: USER,
                    input,
                },
            )
            .await;
        }

        pub async fn text(&self, text: &str) {
            self.send(Input::Text(text.to_string())).await;
        }

        pub async fn command(&self, name: &str) {
            self.send(Input::Command(name.to_string())).await;
        }

        /// Registers `data` as a downloadable file and sends it as a photo.
        pub async fn photo(&self, data: Vec<u8>) {
            let n = self
                .next_message
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            let file_id = format!("file-{}", n);
            self.chat.add_file(&file_id, data);
            self.send(Input::Photo(file_id)).await;
        }

        pub async fn press(&self, data: &str) {
            let n = self
                .next_message
                .fetch_add(1, std::sync::atomic::Ordering::SeqCst);
            self.send(Input::Callback {
                id: format!("cb-{}", n),
                data: data.to_string(),
                message_id: Some(n),
            })
            .await;
        }

        pub async fn dialog(&self) -> Dialog {
            self.ctx.sessions.entry(USER).await.lock().await.dialog.clone()
        }

        pub async fn session(&self) -> UserSession {
            self.ctx.sessions.entry(USER).await.lock().await.session.clone()
        }

        pub async fn set_dialog(&self, dialog: Dialog) {
            self.ctx.sessions.entry(USER).await.lock().await.dialog = dialog;
        }

        pub async fn edit_session(&self, edit: impl FnOnce(&mut UserSession)) {
            edit(&mut self.ctx.sessions.entry(USER).await.lock().await.session);
        }
    }
}
