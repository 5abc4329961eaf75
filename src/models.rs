// src/models.rs
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// A JSON reply from a model that must pass a shape check after parsing.
pub trait ModelReply: for<'de> Deserialize<'de> {
    fn validate(&self) -> Result<(), String>;
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct KeywordSet {
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub high_frequency: Vec<String>,
    #[serde(default)]
    pub mid_frequency: Vec<String>,
    #[serde(default)]
    pub low_frequency: Vec<String>,
}

impl KeywordSet {
    /// High, mid and low frequency keywords in that order, or the generic
    /// list when the model did not split them.
    pub fn ranked(&self) -> Vec<String> {
        let ranked: Vec<String> = self
            .high_frequency
            .iter()
            .chain(&self.mid_frequency)
            .chain(&self.low_frequency)
            .cloned()
            .collect();

        if ranked.is_empty() {
            self.keywords.clone()
        } else {
            ranked
        }
    }

    /// Every keyword from every list, deduplicated, first occurrence wins.
    pub fn unique(&self) -> Vec<String> {
        let mut seen = std::collections::HashSet::new();
        self.high_frequency
            .iter()
            .chain(&self.mid_frequency)
            .chain(&self.low_frequency)
            .chain(&self.keywords)
            .filter(|k| seen.insert(k.as_str()))
            .cloned()
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.keywords.is_empty()
            && self.high_frequency.is_empty()
            && self.mid_frequency.is_empty()
            && self.low_frequency.is_empty()
    }
}

impl ModelReply for KeywordSet {
    fn validate(&self) -> Result<(), String> {
        if self.is_empty() {
            return Err("no keywords in reply".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlideContent {
    #[serde(default)]
    pub slide: u32,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub text: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeoContent {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub card_bullets: Vec<String>,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub optimal_slides: Option<u32>,
    #[serde(default)]
    pub slides_content: Vec<SlideContent>,
}

impl ModelReply for SeoContent {
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("SEO reply has no title".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlidePrompt {
    #[serde(default)]
    pub slide: u32,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub prompt: String,
    #[serde(default)]
    pub text_overlay: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SlidePlan {
    #[serde(default)]
    pub style_guide: String,
    #[serde(default)]
    pub prompts: Vec<SlidePrompt>,
}

impl SlidePlan {
    /// Numbers prompts by position unless every prompt already has a
    /// distinct non-zero number.
    pub fn number_slides(&mut self) {
        let mut seen = std::collections::HashSet::new();
        if self.prompts.iter().all(|p| p.slide > 0 && seen.insert(p.slide)) {
            return;
        }
        for (i, prompt) in self.prompts.iter_mut().enumerate() {
            prompt.slide = i as u32 + 1;
        }
    }
}

impl ModelReply for SlidePlan {
    fn validate(&self) -> Result<(), String> {
        if self.prompts.is_empty() {
            return Err("slide plan has no prompts".to_string());
        }
        Ok(())
    }
}

/// Keywords, SEO copy and slide prompts for one product.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FullAnalysis {
    pub product_name: String,
    pub category: String,
    pub keywords: KeywordSet,
    pub seo: SeoContent,
    pub num_slides: u32,
    pub style_guide: String,
    pub slide_prompts: Vec<SlidePrompt>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtrSeo {
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub bullets: Vec<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtrSlide {
    #[serde(default)]
    pub slide: u32,
    #[serde(default)]
    pub is_main: bool,
    #[serde(default)]
    pub focus: String,
    #[serde(default)]
    pub text_ru: String,
    #[serde(default)]
    pub ctr_elements: Vec<String>,
}

/// SEO copy plus click-through oriented slide plan built from a free-text brief.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CtrPlan {
    #[serde(default)]
    pub keywords: KeywordSet,
    #[serde(default)]
    pub seo: CtrSeo,
    #[serde(default)]
    pub slide_prompts: Vec<CtrSlide>,
}

impl ModelReply for CtrPlan {
    fn validate(&self) -> Result<(), String> {
        if self.seo.title.trim().is_empty() && self.seo.description.trim().is_empty() {
            return Err("CTR plan has neither title nor description".to_string());
        }
        Ok(())
    }
}

#[derive(Debug, Clone)]
pub struct GeneratedSlide {
    pub id: Uuid,
    pub slide_num: u32,
    pub is_main: bool,
    pub text_overlay: String,
    pub image: Option<Bytes>,
}

impl GeneratedSlide {
    pub fn failed(&self) -> bool {
        self.image.is_none()
    }
}

#[derive(Debug, Clone)]
pub struct SlideVariant {
    pub style: String,
    pub image: Option<Bytes>,
}

/// Outcome of a background removal request. The image model sometimes
/// answers with text only; the original photo is returned in that case.
#[derive(Debug, Clone)]
pub struct BackgroundRemoval {
    pub image: Bytes,
    pub regenerated: bool,
}
