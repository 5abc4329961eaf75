// src/session.rs
use crate::models::{CtrPlan, FullAnalysis, GeneratedSlide, KeywordSet, SlidePrompt};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

/// Everything a user has produced so far, shared between flows.
#[derive(Debug, Clone)]
pub struct UserSession {
    pub user_id: i64,
    pub created_at: DateTime<Utc>,

    pub product_name: Option<String>,
    pub category: Option<String>,

    pub original_image: Option<Bytes>,
    pub no_bg_image: Option<Bytes>,
    pub reference_image: Option<Bytes>,
    pub additional_reference: Option<Bytes>,

    pub slide_prompt: Option<String>,
    pub product_description: Option<String>,

    pub keywords: Option<KeywordSet>,
    pub seo_title: Option<String>,
    pub seo_card_content: Vec<String>,
    pub seo_description: Option<String>,

    pub num_slides: Option<u32>,
    pub slide_prompts: Vec<SlidePrompt>,
    pub style_guide: Option<String>,

    pub main_slide_design: Option<GeneratedSlide>,
    pub slides_designs: Vec<GeneratedSlide>,

    pub full_analysis: Option<FullAnalysis>,
    pub ctr_plan: Option<CtrPlan>,
}

impl UserSession {
    pub fn new(user_id: i64) -> Self {
        Self {
            user_id,
            created_at: Utc::now(),
            product_name: None,
            category: None,
            original_image: None,
            no_bg_image: None,
            reference_image: None,
            additional_reference: None,
            slide_prompt: None,
            product_description: None,
            keywords: None,
            seo_title: None,
            seo_card_content: Vec::new(),
            seo_description: None,
            num_slides: None,
            slide_prompts: Vec::new(),
            style_guide: None,
            main_slide_design: None,
            slides_designs: Vec::new(),
            full_analysis: None,
            ctr_plan: None,
        }
    }

    /// Clears everything except the owner and creation time.
    pub fn reset(&mut self) {
        *self = Self {
            created_at: self.created_at,
            ..Self::new(self.user_id)
        };
    }

    pub fn has_image(&self) -> bool {
        self.original_image.is_some()
    }

    pub fn has_product_info(&self) -> bool {
        self.product_name.is_some() && self.category.is_some()
    }

    pub fn has_analysis(&self) -> bool {
        self.full_analysis.is_some()
    }

    pub fn keywords_list(&self) -> Vec<String> {
        self.keywords
            .as_ref()
            .map(KeywordSet::unique)
            .unwrap_or_default()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoveBgStep {
    Photo,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeywordsStep {
    ProductName,
    Category,
    CustomCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeoStep {
    ConfirmExisting,
    ProductName,
    Category,
    CustomCategory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfographicStep {
    ConfirmPhoto,
    Photo,
    ProductName,
    Category,
    CustomCategory,
    SlideCount,
    ConfirmPlan,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeoSlidesStep {
    Photo,
    Description,
    SlideCount,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FirstSlideStep {
    ProductPhoto,
    ReferenceChoice,
    Reference,
    Prompt,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefSlidesStep {
    StyleReference,
    ProductPhoto,
    ExtraChoice,
    ExtraReference,
    Description,
    MoreSlides,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FreeImageStep {
    Prompt,
    Result,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EditPhotoStep {
    Photo,
    Instruction,
}

/// Which flow the user is in and how far along it they are.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum Dialog {
    #[default]
    Idle,
    RemoveBg(RemoveBgStep),
    Keywords(KeywordsStep),
    Seo(SeoStep),
    Infographic(InfographicStep),
    SeoSlides(SeoSlidesStep),
    FirstSlide(FirstSlideStep),
    /// `slides_made` counts slides generated after the style reference.
    SlidesFromRef {
        step: RefSlidesStep,
        slides_made: u32,
    },
    FreeImage {
        step: FreeImageStep,
        prompt: Option<String>,
    },
    EditPhoto(EditPhotoStep),
}

#[derive(Debug)]
pub struct Conversation {
    pub dialog: Dialog,
    pub session: UserSession,
}

impl Conversation {
    pub fn new(user_id: i64) -> Self {
        Self {
            dialog: Dialog::Idle,
            session: UserSession::new(user_id),
        }
    }

    /// Leaves any flow and drops everything collected so far.
    pub fn reset(&mut self) {
        self.dialog = Dialog::Idle;
        self.session.reset();
    }
}

/// In-memory conversations keyed by Telegram user id. Lost on restart.
#[derive(Default)]
pub struct SessionStore {
    conversations: Mutex<HashMap<i64, Arc<Mutex<Conversation>>>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// The user's conversation, created on first contact. Lock it for the
    /// whole update so one user's updates are handled one at a time.
    pub async fn entry(&self, user_id: i64) -> Arc<Mutex<Conversation>> {
        self.conversations
            .lock()
            .await
            .entry(user_id)
            .or_insert_with(|| Arc::new(Mutex::new(Conversation::new(user_id))))
            .clone()
    }

    /// Must not be called while holding that user's conversation lock.
    pub async fn reset(&self, user_id: i64) {
        let conversation = self.conversations.lock().await.get(&user_id).cloned();
        if let Some(conversation) = conversation {
            conversation.lock().await.reset();
        }
    }

    pub async fn remove(&self, user_id: i64) -> bool {
        self.conversations.lock().await.remove(&user_id).is_some()
    }

    pub async fn contains(&self, user_id: i64) -> bool {
        self.conversations.lock().await.contains_key(&user_id)
    }

    pub async fn len(&self) -> usize {
        self.conversations.lock().await.len()
    }
}
