// src/services/image_service.rs
use crate::errors::BotError;
use crate::models::{BackgroundRemoval, GeneratedSlide, SlidePrompt, SlideVariant};
use crate::services::completion::{
    ChatCompletion, ChatMessage, CompletionRequest, CompletionResponse, ContentPart,
    ResponseContent,
};
use crate::services::image_processor::ImageProcessor;
use base64::{Engine as _, engine::general_purpose};
use bytes::Bytes;
use futures_util::future::join_all;
use log::{error, info, warn};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;
use uuid::Uuid;

const MAX_TOKENS: u32 = 8192;

static INLINE_DATA_URL: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"data:image/[^;]+;base64,([A-Za-z0-9+/=]+)").expect("valid data url regex")
});

/// Styles used for the first-slide variants, in order.
pub const VARIANT_STYLES: [(&str, &str); 3] = [
    (
        "Яркий контрастный",
        "насыщенные цвета, контрастный фон, крупные бейджи и стрелки, максимум внимания в выдаче",
    ),
    (
        "Премиальный минимализм",
        "светлый чистый фон, много воздуха, тонкая типографика, сдержанная палитра с одним акцентом",
    ),
    (
        "Лайфстайл",
        "товар в реальном окружении, мягкий естественный свет, эмоция использования, текст на плашках",
    ),
];

pub struct SlideRequest<'a> {
    pub product_image: &'a [u8],
    pub slide_number: u32,
    pub slide_text: &'a str,
    pub product_name: &'a str,
    pub style_description: &'a str,
    pub is_main: bool,
    pub reference_image: Option<&'a [u8]>,
}

/// Image editing and slide synthesis on top of the multimodal model.
pub struct ImageService {
    backend: Arc<dyn ChatCompletion>,
    model: String,
}

impl ImageService {
    pub fn new(backend: Arc<dyn ChatCompletion>, model: String) -> Self {
        Self { backend, model }
    }

    async fn request(
        &self,
        parts: Vec<ContentPart>,
        temperature: f32,
        wants_image: bool,
    ) -> Result<CompletionResponse, BotError> {
        let request = CompletionRequest {
            model: self.model.clone(),
            messages: vec![ChatMessage::user_parts(parts)],
            temperature,
            max_tokens: MAX_TOKENS,
            modalities: wants_image.then(|| vec!["image".to_string(), "text".to_string()]),
        };

        self.backend
            .complete(&request)
            .await
            .map_err(|e| BotError::ImageGeneration(format!("Image model request failed: {}", e)))
    }

    async fn generate(
        &self,
        parts: Vec<ContentPart>,
        temperature: f32,
        what: &str,
    ) -> Result<Bytes, BotError> {
        let response = self.request(parts, temperature, true).await?;
        match extract_image(&response) {
            Some(image) => {
                info!("{}: image received, {} bytes", what, image.len());
                Ok(Bytes::from(image))
            }
            None => {
                warn!("{}: no image in response", what);
                Err(BotError::ImageGeneration(format!("{}: no image in response", what)))
            }
        }
    }

    fn photo(data: &[u8]) -> ContentPart {
        ContentPart::image(data, ImageProcessor::mime_type(data))
    }

    /// Asks the model to redraw the product on pure white. When the model
    /// answers with text only, the original photo comes back unchanged.
    pub async fn remove_background(&self, image: Bytes) -> Result<BackgroundRemoval, BotError> {
        let prompt = "Проанализируй это изображение товара и создай новое изображение.\n\n\
            ЗАДАЧА: удали фон и оставь ТОЛЬКО товар на чистом белом фоне.\n\n\
            ТРЕБОВАНИЯ:\n\
            1. Товар в точности как на оригинале\n\
            2. Фон идеально белый (#FFFFFF)\n\
            3. Сохрани все детали, цвета и текстуры товара\n\
            4. Товар по центру\n\
            5. Небольшие поля вокруг товара\n\n\
            Сгенерируй изображение товара на белом фоне.";

        let response = self
            .request(vec![ContentPart::text(prompt), Self::photo(&image)], 0.3, true)
            .await?;

        match extract_image(&response) {
            Some(generated) => Ok(BackgroundRemoval {
                image: Bytes::from(generated),
                regenerated: true,
            }),
            None => {
                info!("Background removal: returning original (model didn't generate image)");
                Ok(BackgroundRemoval {
                    image,
                    regenerated: false,
                })
            }
        }
    }

    pub async fn analyze_product_image(&self, image: &[u8]) -> Result<String, BotError> {
        let prompt = "Проанализируй это изображение товара. Опиши на русском языке:\n\n\
            1. Что за товар на фото\n\
            2. Основные характеристики и особенности\n\
            3. Цветовая гамма\n\
            4. Материал (если видно)\n\
            5. Для какой аудитории подходит\n\
            6. Ключевые преимущества для продажи\n\n\
            Ответ дай на русском языке, кратко и по делу.";

        let response = self
            .request(vec![ContentPart::text(prompt), Self::photo(image)], 0.5, false)
            .await?;

        response
            .text()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .ok_or_else(|| BotError::ImageGeneration("Image analysis returned no text".to_string()))
    }

    pub async fn generate_infographic_slide(
        &self,
        request: SlideRequest<'_>,
    ) -> Result<Bytes, BotError> {
        let SlideRequest {
            product_image,
            slide_number,
            slide_text,
            product_name,
            style_description,
            is_main,
            reference_image,
        } = request;

        let prompt = if is_main {
            format!(
                "Создай профессиональную инфографику для маркетплейса (Wildberries/Ozon).\n\n\
                 ТОВАР: {product_name}\n\n\
                 ТЕКСТ НА РУССКОМ ДЛЯ СЛАЙДА:\n{slide_text}\n\n\
                 ТРЕБОВАНИЯ К ДИЗАЙНУ:\n\
                 1. Размер: 900x1200 пикселей (3:4)\n\
                 2. Товар с фото главный элемент\n\
                 3. Фон: чистый белый или светлый градиент\n\
                 4. Текст крупный, читаемый, НА РУССКОМ ЯЗЫКЕ\n\
                 5. Стиль: современный, минималистичный, премиальный\n\
                 6. Графические акценты: иконки, стрелки\n\
                 7. Яркие акцентные цвета\n\n\
                 ЭТО ГЛАВНЫЙ СЛАЙД, он задаёт стиль всей серии.\n\
                 Текст только на русском языке!\n\n\
                 Сгенерируй готовое изображение инфографики."
            )
        } else {
            format!(
                "Создай слайд #{slide_number} инфографики для маркетплейса.\n\n\
                 ТОВАР: {product_name}\n\n\
                 ТЕКСТ НА РУССКОМ ДЛЯ ЭТОГО СЛАЙДА:\n{slide_text}\n\n\
                 СТИЛЬ (совпадает с главным слайдом):\n{style_description}\n\n\
                 ТРЕБОВАНИЯ:\n\
                 1. Размер: 900x1200 пикселей\n\
                 2. ТОЧНО повтори стиль главного слайда\n\
                 3. Те же цвета, шрифты, элементы дизайна\n\
                 4. Текст только на русском языке\n\
                 5. Товар виден на слайде\n\n\
                 Сгенерируй изображение в едином стиле с серией."
            )
        };

        let mut parts = vec![ContentPart::text(prompt), Self::photo(product_image)];

        if let Some(reference) = reference_image.filter(|_| !is_main) {
            parts.push(ContentPart::text(
                "\n\nРЕФЕРЕНС СТИЛЯ (повтори этот стиль точно):",
            ));
            parts.push(Self::photo(reference));
        }

        self.generate(parts, 0.7, &format!("Slide {}", slide_number))
            .await
    }

    /// Generates slides one after another. The first main slide that comes
    /// back becomes the style reference for every later slide; failed slides
    /// stay in the result without an image.
    pub async fn generate_all_slides(
        &self,
        product_image: &[u8],
        slide_prompts: &[SlidePrompt],
        style_guide: &str,
        product_name: &str,
    ) -> Vec<GeneratedSlide> {
        let mut results = Vec::with_capacity(slide_prompts.len());
        let mut main_slide: Option<Bytes> = None;

        for slide in slide_prompts {
            info!("Generating slide {}...", slide.slide);

            let outcome = self
                .generate_infographic_slide(SlideRequest {
                    product_image,
                    slide_number: slide.slide,
                    slide_text: &slide.text_overlay,
                    product_name,
                    style_description: style_guide,
                    is_main: slide.is_main,
                    reference_image: if slide.is_main {
                        None
                    } else {
                        main_slide.as_deref()
                    },
                })
                .await;

            let image = match outcome {
                Ok(image) => {
                    if slide.is_main && main_slide.is_none() {
                        main_slide = Some(image.clone());
                    }
                    info!("Slide {} generated successfully", slide.slide);
                    Some(image)
                }
                Err(e) => {
                    error!("Failed to generate slide {}: {}", slide.slide, e);
                    None
                }
            };

            results.push(GeneratedSlide {
                id: Uuid::new_v4(),
                slide_num: slide.slide,
                is_main: slide.is_main,
                text_overlay: slide.text_overlay.clone(),
                image,
            });
        }

        results
    }

    pub async fn edit_image_by_prompt(
        &self,
        image: &[u8],
        instruction: &str,
    ) -> Result<Bytes, BotError> {
        let prompt = format!(
            "Отредактируй это изображение согласно инструкции.\n\n\
             ИНСТРУКЦИЯ:\n{instruction}\n\n\
             ТРЕБОВАНИЯ:\n\
             1. Выполни ТОЛЬКО то, что указано в инструкции\n\
             2. Остальные элементы изображения сохрани без изменений\n\
             3. Результат выглядит профессионально и естественно\n\
             4. Если нужен текст, используй русский язык\n\n\
             Сгенерируй отредактированное изображение."
        );

        self.generate(vec![ContentPart::text(prompt), Self::photo(image)], 0.5, "Edit image")
            .await
    }

    pub async fn generate_from_prompt(&self, prompt: &str) -> Result<Bytes, BotError> {
        let prompt = format!(
            "Сгенерируй изображение по описанию:\n\n{prompt}\n\n\
             Если на изображении есть текст, пиши его на русском языке без ошибок."
        );

        self.generate(vec![ContentPart::text(prompt)], 0.9, "Free image")
            .await
    }

    /// Requests `num_variants` first slides in different styles at once.
    pub async fn generate_first_slide_variants(
        &self,
        product_image: &[u8],
        reference_image: Option<&[u8]>,
        prompt: &str,
        num_variants: usize,
    ) -> Vec<SlideVariant> {
        let jobs = VARIANT_STYLES
            .iter()
            .cycle()
            .take(num_variants)
            .enumerate()
            .map(|(index, (style, style_hint))| async move {
                let mut text = format!(
                    "Создай ГЛАВНЫЙ (первый) слайд инфографики для маркетплейса WB/Ozon.\n\n\
                     ОПИСАНИЕ ОТ КЛИЕНТА:\n{prompt}\n\n\
                     СТИЛЬ ВАРИАНТА: {style} - {style_hint}\n\n\
                     ТРЕБОВАНИЯ:\n\
                     1. Размер 900x1200 (3:4)\n\
                     2. Товар с фото главный элемент, сохрани его внешний вид\n\
                     3. Текст крупный, читаемый, только на русском языке\n\
                     4. Слайд должен выделяться в выдаче и давать максимальный CTR"
                );
                if reference_image.is_some() {
                    text.push_str(
                        "\n\nВторое изображение - РЕФЕРЕНС. Возьми из него композицию и подачу, \
                         адаптировав под товар.",
                    );
                }

                let mut parts = vec![ContentPart::text(text), Self::photo(product_image)];
                if let Some(reference) = reference_image {
                    parts.push(Self::photo(reference));
                }

                let image = self
                    .generate(parts, 0.9, &format!("First slide variant {}", index + 1))
                    .await
                    .inspect_err(|e| error!("Variant {} failed: {}", index + 1, e))
                    .ok();

                SlideVariant {
                    style: style.to_string(),
                    image,
                }
            });

        join_all(jobs).await
    }

    pub async fn generate_slide_from_reference(
        &self,
        style_reference: &[u8],
        product_image: Option<&[u8]>,
        additional_reference: Option<&[u8]>,
        slide_description: &str,
        slide_number: u32,
    ) -> Result<Bytes, BotError> {
        let mut text = format!(
            "Создай слайд #{slide_number} инфографики для маркетплейса WB/Ozon.\n\n\
             ОПИСАНИЕ СЛАЙДА:\n{slide_description}\n\n\
             Первое изображение - РЕФЕРЕНС СТИЛЯ. Повтори точно: цвета, шрифты, \
             фон, расположение плашек и графические элементы.\n"
        );
        if product_image.is_some() {
            text.push_str("Следующее изображение - ТОВАР. Покажи именно этот товар.\n");
        }
        if additional_reference.is_some() {
            text.push_str(
                "Последнее изображение - РЕФЕРЕНС СТРУКТУРЫ. Возьми из него компоновку \
                 и содержание, но не стиль.\n",
            );
        }
        text.push_str(
            "\nРазмер 900x1200 (3:4). Весь текст только на русском языке.\n\
             Сгенерируй изображение слайда.",
        );

        let mut parts = vec![ContentPart::text(text), Self::photo(style_reference)];
        if let Some(product) = product_image {
            parts.push(Self::photo(product));
        }
        if let Some(extra) = additional_reference {
            parts.push(Self::photo(extra));
        }

        self.generate(parts, 0.7, &format!("Reference slide {}", slide_number))
            .await
    }
}

fn decode_data_url(url: &str) -> Option<Vec<u8>> {
    let rest = url.trim().strip_prefix("data:image")?;
    let (_, payload) = rest.split_once(";base64,")?;
    general_purpose::STANDARD.decode(payload.trim()).ok()
}

/// Finds generated image bytes in a response: OpenRouter's `images` list,
/// `image_url` content parts, or a data URL inside string content.
pub fn extract_image(response: &CompletionResponse) -> Option<Vec<u8>> {
    let message = response.first_message()?;

    if let Some(image) = message
        .images
        .iter()
        .filter_map(|img| img.image_url.as_ref())
        .find_map(|url| decode_data_url(&url.url))
    {
        return Some(image);
    }

    match message.content.as_ref()? {
        ResponseContent::Parts(parts) => parts
            .iter()
            .filter(|part| part["type"] == "image_url")
            .filter_map(|part| part["image_url"]["url"].as_str())
            .find_map(decode_data_url),
        ResponseContent::Text(text) => INLINE_DATA_URL
            .captures(text)
            .and_then(|c| c.get(1))
            .and_then(|m| general_purpose::STANDARD.decode(m.as_str()).ok()),
    }
}
