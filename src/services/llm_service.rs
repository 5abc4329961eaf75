// src/services/llm_service.rs
use crate::errors::BotError;
use crate::models::*;
use crate::services::completion::{ChatCompletion, ChatMessage, CompletionRequest};
use crate::services::reply_parser::{parse_reply, preview};
use log::{error, info};
use std::sync::Arc;

const MAX_TOKENS: u32 = 8192;
const SEO_KEYWORD_LIMIT: usize = 15;

/// Bounds applied to the number of infographic slides.
#[derive(Debug, Clone, Copy)]
pub struct SlideBounds {
    pub default: u32,
    pub min: u32,
    pub max: u32,
}

impl SlideBounds {
    pub fn resolve(&self, requested: Option<u32>, suggested: Option<u32>) -> u32 {
        requested
            .or(suggested)
            .unwrap_or(self.default)
            .clamp(self.min, self.max)
    }
}

/// Keyword research and SEO copy on top of the text model.
pub struct LlmService {
    backend: Arc<dyn ChatCompletion>,
    model: String,
    bounds: SlideBounds,
}

impl LlmService {
    pub fn new(backend: Arc<dyn ChatCompletion>, model: String, bounds: SlideBounds) -> Self {
        Self {
            backend,
            model,
            bounds,
        }
    }

    async fn ask<T: ModelReply>(
        &self,
        system_prompt: &str,
        user_prompt: String,
        temperature: f32,
        what: &str,
    ) -> Result<T, BotError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::system(system_prompt), ChatMessage::user(user_prompt)],
            temperature,
            max_tokens: MAX_TOKENS,
            modalities: None,
        };

        let response = self
            .backend
            .complete(&request)
            .await
            .map_err(|e| BotError::Llm(format!("{} request failed: {}", what, e)))?;

        let content = response
            .text()
            .ok_or_else(|| BotError::Llm(format!("No content in {} response", what)))?;
        info!("Text model response received for {}, length: {}", what, content.len());

        parse_reply(&content).inspect_err(|e| {
            error!("Failed to parse {} JSON: {}, response: {}", what, e, preview(&content, 500));
        })
    }

    pub async fn analyze_keywords(
        &self,
        product_name: &str,
        category: &str,
    ) -> Result<KeywordSet, BotError> {
        let system_prompt = r#"Ты - эксперт по SEO для маркетплейсов Wildberries и Ozon в России.
Твоя задача - анализировать товары и находить ключевые слова, по которым их ищут покупатели.

ВАЖНО: Отвечай ТОЛЬКО валидным JSON без markdown-форматирования и без ```json блоков.

Формат ответа:
{
    "keywords": ["ключ1", "ключ2", ...],
    "high_frequency": ["высокочастотный1", ...],
    "mid_frequency": ["среднечастотный1", ...],
    "low_frequency": ["низкочастотный1", ...]
}"#;

        let user_prompt = format!(
            "Проанализируй товар и подбери ключевые слова для продвижения на WB и Ozon:\n\n\
             Товар: {product_name}\n\
             Категория: {category}\n\n\
             Найди 15-20 ключевых слов и фраз, которые покупатели в России используют для поиска такого товара.\n\
             Раздели их на высокочастотные (3-5), среднечастотные (5-7) и низкочастотные/длиннохвостые (5-8).\n\n\
             Отвечай ТОЛЬКО валидным JSON."
        );

        self.ask(system_prompt, user_prompt, 0.5, "keywords").await
    }

    pub async fn generate_seo_content(
        &self,
        product_name: &str,
        category: &str,
        keywords: &[String],
    ) -> Result<SeoContent, BotError> {
        let system_prompt = r#"Ты - копирайтер, который пишет продающие описания для маркетплейсов Wildberries и Ozon.
Создавай убедительные SEO-оптимизированные тексты на русском языке.

ВАЖНО: Отвечай ТОЛЬКО валидным JSON без markdown-форматирования и без ```json блоков.

Формат ответа:
{
    "title": "SEO-заголовок до 60 символов",
    "card_bullets": ["УТП 1", "УТП 2", "УТП 3", ...],
    "description": "Полное описание товара 500-1000 символов",
    "optimal_slides": 5,
    "slides_content": [
        {"slide": 1, "focus": "Главное УТП", "text": "Текст для слайда"},
        ...
    ]
}"#;

        let keywords_str = keywords
            .iter()
            .take(SEO_KEYWORD_LIMIT)
            .cloned()
            .collect::<Vec<_>>()
            .join(", ");

        let user_prompt = format!(
            "Создай SEO-контент для товара:\n\n\
             Товар: {product_name}\n\
             Категория: {category}\n\
             Ключевые слова: {keywords_str}\n\n\
             Требования:\n\
             1. SEO-заголовок (до 60 символов) с главным ключевым словом\n\
             2. Буллеты для карточки (5-7 коротких УТП)\n\
             3. Описание товара (500-1000 символов) с естественно вписанными ключевыми словами\n\
             4. Оптимальное количество слайдов инфографики ({min}-{max})\n\
             5. Фокус и короткий текст для каждого слайда\n\n\
             Отвечай ТОЛЬКО валидным JSON.",
            min = self.bounds.min,
            max = self.bounds.max,
        );

        self.ask(system_prompt, user_prompt, 0.7, "SEO").await
    }

    pub async fn generate_slide_prompts(
        &self,
        product_name: &str,
        category: &str,
        seo: &SeoContent,
        num_slides: u32,
    ) -> Result<SlidePlan, BotError> {
        let system_prompt = r#"Ты - эксперт по промтам для генерации изображений инфографики товаров.
Пиши детальные промты на английском языке для AI-генерации карточек товаров.

ВАЖНО: Отвечай ТОЛЬКО валидным JSON без markdown-форматирования.

Формат ответа:
{
    "style_guide": "Описание общего стиля для всех слайдов",
    "prompts": [
        {
            "slide": 1,
            "is_main": true,
            "prompt": "Детальный промт на английском",
            "text_overlay": "Текст на русском для наложения"
        },
        ...
    ]
}"#;

        let slides_info = seo
            .slides_content
            .iter()
            .take(num_slides as usize)
            .map(|s| format!("Слайд {}: {} - {}", s.slide, s.focus, s.text))
            .collect::<Vec<_>>()
            .join("\n");

        let user_prompt = format!(
            "Создай промты для генерации {num_slides} слайдов инфографики:\n\n\
             Товар: {product_name}\n\
             Категория: {category}\n\
             Заголовок: {title}\n\n\
             Контент слайдов:\n{slides_info}\n\n\
             Требования к промтам:\n\
             1. Первый слайд главный (is_main: true) и задаёт стиль для остальных\n\
             2. Все слайды в едином стиле\n\
             3. Промты на английском языке\n\
             4. Текст для наложения на каждый слайд на русском\n\
             5. Стиль: профессиональная инфографика для маркетплейса, чистый фон, яркие акценты\n\n\
             Включи в промты:\n\
             - Размер 900x1200 (3:4)\n\
             - Профессиональный продуктовый дизайн\n\
             - Место для текста\n\
             - Современный минималистичный стиль\n\n\
             Отвечай ТОЛЬКО валидным JSON.",
            title = seo.title,
        );

        let mut plan: SlidePlan = self.ask(system_prompt, user_prompt, 0.8, "slide prompts").await?;
        plan.number_slides();
        info!("Slide prompts parsed successfully, {} prompts", plan.prompts.len());
        Ok(plan)
    }

    /// Keywords, then SEO copy, then slide prompts. Any failed step fails the
    /// whole analysis.
    pub async fn generate_full_analysis(
        &self,
        product_name: &str,
        category: &str,
        num_slides: Option<u32>,
    ) -> Result<FullAnalysis, BotError> {
        let keywords = self
            .analyze_keywords(product_name, category)
            .await
            .inspect_err(|e| error!("Failed to get keywords: {}", e))?;

        let seo = self
            .generate_seo_content(product_name, category, &keywords.ranked())
            .await
            .inspect_err(|e| error!("Failed to generate SEO content: {}", e))?;

        let num_slides = self.bounds.resolve(num_slides, seo.optimal_slides);

        let plan = self
            .generate_slide_prompts(product_name, category, &seo, num_slides)
            .await
            .inspect_err(|e| error!("Failed to generate slide prompts: {}", e))?;

        Ok(FullAnalysis {
            product_name: product_name.to_string(),
            category: category.to_string(),
            keywords,
            seo,
            num_slides,
            style_guide: plan.style_guide,
            slide_prompts: plan.prompts,
        })
    }

    pub async fn generate_seo_with_ctr_prompts(
        &self,
        product_description: &str,
        num_slides: u32,
    ) -> Result<CtrPlan, BotError> {
        let system_prompt = r#"Ты - эксперт по продающему контенту для маркетплейсов WB/Ozon с фокусом на максимальный CTR.

ВАЖНО: Отвечай ТОЛЬКО валидным JSON без markdown.

Задача:
1. Проанализировать описание товара и пожелания клиента
2. Создать SEO-контент для карточки
3. Создать промты для каждого слайда инфографики с МАКСИМАЛЬНЫМ CTR

Формат ответа:
{
    "keywords": {
        "high_frequency": ["ключ1", "ключ2"],
        "mid_frequency": ["ключ1", "ключ2"],
        "low_frequency": ["ключ1", "ключ2"]
    },
    "seo": {
        "title": "SEO заголовок",
        "description": "Полное описание 500-1000 символов",
        "bullets": ["УТП 1", "УТП 2"]
    },
    "slide_prompts": [
        {
            "slide": 1,
            "is_main": true,
            "focus": "Что главное на слайде",
            "text_ru": "Текст на русском для слайда",
            "ctr_elements": ["элемент1", "элемент2"]
        }
    ]
}"#;

        let user_prompt = format!(
            "Описание товара и пожелания клиента:\n{product_description}\n\n\
             Количество слайдов: {num_slides}\n\n\
             ТРЕБОВАНИЯ К ПРОМТАМ ДЛЯ СЛАЙДОВ:\n\
             1. Каждый промт направлен на МАКСИМАЛЬНЫЙ CTR\n\
             2. Слайд 1 самый важный и должен привлекать внимание\n\
             3. Продающие элементы: яркие акценты, контрасты, чёткие УТП\n\
             4. Укажи ЧТО показать, но не КАК именно\n\
             5. Все тексты на русском языке\n\
             6. Учти пожелания клиента по каждому слайду\n\n\
             Для каждого слайда укажи:\n\
             - focus: что главное на слайде\n\
             - text_ru: текст для отображения на слайде\n\
             - ctr_elements: элементы, повышающие CTR (например: \"яркая цена\", \"бейдж скидки\", \"стрелка внимания\")\n\n\
             Отвечай ТОЛЬКО валидным JSON."
        );

        let plan: CtrPlan = self.ask(system_prompt, user_prompt, 0.7, "SEO CTR").await?;
        info!("SEO with CTR prompts generated: {} slides", plan.slide_prompts.len());
        Ok(plan)
    }
}
