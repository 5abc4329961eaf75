// src/flows/infographic.rs
use super::{Input, MIN_NAME_CHARS, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards::{self, CategoryChoice, SlideChoice};
use crate::models::GeneratedSlide;
use crate::session::{Conversation, Dialog, InfographicStep};
use crate::texts;
use log::{error, info, warn};

const ASK_NAME: &str = "📝 <b>Шаг 2:</b> Введите название товара:";
const ASK_PHOTO: &str = "📸 Отправьте фото товара:";

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    if conversation.session.has_image() {
        conversation.dialog = Dialog::Infographic(InfographicStep::ConfirmPhoto);
        turn.show(
            "<b>Создание инфографики</b>\n\n\
             У вас уже загружено изображение товара.\n\
             Использовать его или загрузить новое?",
            Some(&keyboards::infographic_use_image()),
        )
        .await?;
        return Ok(());
    }

    conversation.dialog = Dialog::Infographic(InfographicStep::Photo);
    turn.show(
        "<b>Создание инфографики для WB/Ozon</b>\n\n\
         Этот процесс включает:\n\
         1️⃣ Загрузка фото товара\n\
         2️⃣ Анализ и SEO-оптимизация\n\
         3️⃣ Генерация слайдов инфографики\n\n\
         📸 <b>Шаг 1:</b> Отправьте фото товара:",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: InfographicStep,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (InfographicStep::ConfirmPhoto, Input::Callback { data, .. }) => match data.as_str() {
            "infographic_use_existing" => {
                if conversation.session.has_product_info() {
                    ask_slide_count(turn, conversation).await
                } else {
                    conversation.dialog = Dialog::Infographic(InfographicStep::ProductName);
                    turn.show(ASK_NAME, Some(&keyboards::cancel())).await?;
                    Ok(())
                }
            }
            "infographic_new_photo" => {
                conversation.session.reset();
                conversation.dialog = Dialog::Infographic(InfographicStep::Photo);
                turn.show(ASK_PHOTO, Some(&keyboards::cancel())).await?;
                Ok(())
            }
            _ => turn.stale().await,
        },
        (InfographicStep::ConfirmPhoto, _) => unexpected(turn, input, texts::USE_BUTTONS).await,

        (InfographicStep::Photo, Input::Photo(file_id)) => {
            receive_photo(turn, conversation, file_id).await
        }
        (InfographicStep::Photo, _) => unexpected(turn, input, texts::SEND_PHOTO).await,

        (InfographicStep::ProductName, Input::Text(text)) => {
            let Some(name) = long_enough(text, MIN_NAME_CHARS) else {
                turn.send(texts::NAME_TOO_SHORT, Some(&keyboards::cancel()))
                    .await?;
                return Ok(());
            };
            turn.send(
                &format!(
                    "<b>Товар:</b> {}\n\n📁 <b>Шаг 3:</b> Выберите категорию:",
                    texts::escape(&name)
                ),
                Some(&keyboards::categories()),
            )
            .await?;
            conversation.session.product_name = Some(name);
            conversation.dialog = Dialog::Infographic(InfographicStep::Category);
            Ok(())
        }
        (InfographicStep::ProductName, _) => unexpected(turn, input, texts::SEND_NAME).await,

        (InfographicStep::Category, Input::Callback { data, .. }) => {
            match keyboards::parse_category(data) {
                Some(CategoryChoice::Custom) => {
                    conversation.dialog = Dialog::Infographic(InfographicStep::CustomCategory);
                    turn.show(texts::ENTER_CATEGORY, Some(&keyboards::cancel()))
                        .await?;
                    Ok(())
                }
                Some(CategoryChoice::Named(category)) => {
                    conversation.session.category = Some(category.to_string());
                    ask_slide_count(turn, conversation).await
                }
                None => turn.stale().await,
            }
        }
        (InfographicStep::Category, _) => unexpected(turn, input, texts::USE_BUTTONS).await,

        (InfographicStep::CustomCategory, Input::Text(text)) if !text.trim().is_empty() => {
            conversation.session.category = Some(text.trim().to_string());
            ask_slide_count(turn, conversation).await
        }
        (InfographicStep::CustomCategory, _) => {
            unexpected(turn, input, texts::ENTER_CATEGORY).await
        }

        (InfographicStep::SlideCount, Input::Callback { data, .. }) => {
            match keyboards::parse_slide_choice(data) {
                Some(SlideChoice::Fixed(n)) => build_plan(turn, conversation, Some(n)).await,
                Some(SlideChoice::Auto) => build_plan(turn, conversation, None).await,
                None => turn.stale().await,
            }
        }
        (InfographicStep::SlideCount, _) => unexpected(turn, input, texts::USE_BUTTONS).await,

        (InfographicStep::ConfirmPlan, Input::Callback { data, .. }) => match data.as_str() {
            "generate_start" => generate(turn, conversation).await,
            "edit_slides_count" => {
                conversation.dialog = Dialog::Infographic(InfographicStep::SlideCount);
                turn.show(
                    "Выберите новое количество слайдов:",
                    Some(&keyboards::slide_count()),
                )
                .await?;
                Ok(())
            }
            "edit_prompts" => {
                if conversation.session.slide_prompts.is_empty() {
                    return turn.ack(Some("Промты не найдены")).await;
                }
                turn.show(
                    &texts::prompts_listing(&conversation.session.slide_prompts),
                    Some(&keyboards::edit_plan()),
                )
                .await?;
                Ok(())
            }
            _ => turn.stale().await,
        },
        (InfographicStep::ConfirmPlan, _) => unexpected(turn, input, texts::USE_BUTTONS).await,
    }
}

async fn receive_photo(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    file_id: &str,
) -> Result<(), BotError> {
    let progress = turn.send("⏳ Загружаю изображение...", None).await?;

    let image = match turn.download_photo(file_id).await {
        Ok(image) => image,
        Err(e) => {
            error!("Error receiving photo: {}", e);
            turn.edit(progress, texts::PHOTO_FAILED, Some(&keyboards::cancel()))
                .await?;
            return Ok(());
        }
    };

    let analysis = turn
        .ctx
        .images
        .analyze_product_image(&image)
        .await
        .inspect_err(|e| warn!("Product analysis failed: {}", e))
        .ok();
    conversation.session.original_image = Some(image);

    turn.delete(progress).await;
    let text = match analysis {
        Some(analysis) => format!(
            "✅ Изображение загружено!\n\n<b>Анализ:</b>\n{}\n\n{}",
            texts::snippet(&analysis, 500),
            ASK_NAME
        ),
        None => format!("✅ Изображение загружено!\n\n{}", ASK_NAME),
    };
    turn.send(&text, Some(&keyboards::cancel())).await?;
    conversation.dialog = Dialog::Infographic(InfographicStep::ProductName);
    Ok(())
}

async fn ask_slide_count(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
) -> Result<(), BotError> {
    let session = &conversation.session;
    let (Some(name), Some(category)) = (&session.product_name, &session.category) else {
        conversation.dialog = Dialog::Idle;
        turn.show(texts::SESSION_LOST, Some(&keyboards::back_to_menu()))
            .await?;
        return Ok(());
    };

    let text = format!(
        "{}\n\n🎨 <b>Шаг 4:</b> Выберите количество слайдов или доверьте выбор AI:",
        texts::product_header(name, category)
    );
    conversation.dialog = Dialog::Infographic(InfographicStep::SlideCount);
    turn.show(&text, Some(&keyboards::slide_count())).await?;
    Ok(())
}

async fn build_plan(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    num_slides: Option<u32>,
) -> Result<(), BotError> {
    let session = &mut conversation.session;
    let (Some(name), Some(category)) = (session.product_name.clone(), session.category.clone())
    else {
        conversation.dialog = Dialog::Idle;
        turn.show(texts::SESSION_LOST, Some(&keyboards::back_to_menu()))
            .await?;
        return Ok(());
    };

    turn.ack(Some("Анализирую и создаю план...")).await?;
    let progress = turn
        .show(
            "⏳ <b>Создаю план инфографики...</b>\n\n\
             🔍 Анализирую ключевые слова\n\
             📝 Генерирую SEO-контент\n\
             🎨 Создаю промты для слайдов\n\n\
             Это может занять до минуты...",
            None,
        )
        .await?;

    match turn
        .ctx
        .llm
        .generate_full_analysis(&name, &category, num_slides)
        .await
    {
        Ok(analysis) => {
            info!(
                "Plan for '{}' ready: {} slides",
                name,
                analysis.slide_prompts.len()
            );
            let preview = texts::plan_preview(&analysis);
            session.num_slides = Some(analysis.num_slides);
            session.style_guide = Some(analysis.style_guide.clone());
            session.slide_prompts = analysis.slide_prompts.clone();
            session.keywords = Some(analysis.keywords.clone());
            session.seo_title = Some(analysis.seo.title.clone());
            session.full_analysis = Some(analysis);

            conversation.dialog = Dialog::Infographic(InfographicStep::ConfirmPlan);
            turn.edit(progress, &preview, Some(&keyboards::edit_plan()))
                .await?;
        }
        Err(e) => {
            error!("Error creating plan: {}", e);
            conversation.dialog = Dialog::Idle;
            turn.edit(
                progress,
                "❌ Не удалось создать план.\nПопробуйте позже.",
                Some(&keyboards::back_to_menu()),
            )
            .await?;
        }
    }
    Ok(())
}

async fn generate(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::Idle;
    let session = &mut conversation.session;
    let (Some(image), Some(analysis)) = (session.original_image.clone(), &session.full_analysis)
    else {
        turn.show(texts::SESSION_LOST, Some(&keyboards::back_to_menu()))
            .await?;
        return Ok(());
    };
    let product_name = analysis.product_name.clone();
    let style_guide = analysis.style_guide.clone();

    turn.ack(Some("Начинаю генерацию...")).await?;
    let progress = turn
        .show(
            &format!(
                "🎨 <b>Генерация инфографики...</b>\n\n\
                 Создаю {} слайдов...\n\n\
                 ⏳ Это может занять несколько минут.",
                session.slide_prompts.len()
            ),
            None,
        )
        .await?;

    let ctx = turn.ctx;
    let slides = ctx
        .images
        .generate_all_slides(&image, &session.slide_prompts, &style_guide, &product_name)
        .await;

    session.main_slide_design = slides.iter().find(|s| s.is_main && !s.failed()).cloned();

    let mut delivered = 0;
    let mut missing = Vec::new();
    for slide in &slides {
        if deliver_slide(turn, slide).await {
            delivered += 1;
        } else {
            missing.push(slide.slide_num.to_string());
        }
    }

    turn.delete(progress).await;
    let total = slides.len();
    session.slides_designs = slides;

    if delivered == 0 {
        turn.send(
            "❌ Не удалось создать слайды.\nПопробуйте позже.",
            Some(&keyboards::back_to_menu()),
        )
        .await?;
        return Ok(());
    }

    let mut text = format!(
        "<b>✅ Инфографика создана!</b>\n\n<b>Товар:</b> {}\n<b>Слайдов:</b> {} из {}",
        texts::escape(&product_name),
        delivered,
        total
    );
    if !missing.is_empty() {
        text.push_str(&format!(
            "\n\n⚠️ Не удалось создать слайды: {}",
            missing.join(", ")
        ));
    }
    turn.send(&text, Some(&keyboards::back_to_menu())).await?;
    Ok(())
}

/// Resizes and sends one slide; false when it has no image or either step fails.
async fn deliver_slide(turn: &Turn<'_>, slide: &GeneratedSlide) -> bool {
    let Some(data) = &slide.image else {
        return false;
    };
    let config = &turn.ctx.config;
    let photo = match turn.ctx.processor.resize_for_marketplace(
        data,
        config.image_width,
        config.image_height,
    ) {
        Ok(photo) => photo,
        Err(e) => {
            error!("Slide {} could not be resized: {}", slide.slide_num, e);
            return false;
        }
    };

    match turn
        .send_photo(
            photo,
            &format!("slide_{}.jpg", slide.slide_num),
            &slide_caption(slide),
            None,
        )
        .await
    {
        Ok(_) => true,
        Err(e) => {
            error!("Slide {} could not be sent: {}", slide.slide_num, e);
            false
        }
    }
}

fn slide_caption(slide: &GeneratedSlide) -> String {
    let crown = if slide.is_main { "👑 " } else { "" };
    format!(
        "{}<b>Слайд {}</b>\n{}",
        crown,
        slide.slide_num,
        texts::snippet(&slide.text_overlay, 200)
    )
}

#[cfg(test)]
mod tests {
    use crate::flows::harness::Harness;
    use crate::keyboards;
    use crate::services::completion::fake::image_count;
    use crate::services::image_processor::samples;
    use crate::services::telegram::fake::Sent;
    use crate::session::{Dialog, InfographicStep};
    use crate::texts;
    use bytes::Bytes;

    const KEYWORDS: &str = r#"{"high_frequency": ["термокружка"], "mid_frequency": [], "low_frequency": []}"#;
    const SEO: &str = r#"{"title": "Термокружка 450 мл", "card_bullets": [], "description": "d", "optimal_slides": 3}"#;
    const PLAN: &str = r#"{"style_guide": "тёплые тона", "prompts": [
        {"slide": 1, "is_main": true, "prompt": "hero", "text_overlay": "Держит тепло 8 часов"},
        {"slide": 2, "is_main": false, "prompt": "detail", "text_overlay": "Не протекает"},
        {"slide": 3, "is_main": false, "prompt": "size", "text_overlay": "450 мл"}
    ]}"#;

    fn script_plan(h: &Harness) {
        h.text_model.push_text(KEYWORDS);
        h.text_model.push_text(SEO);
        h.text_model.push_text(PLAN);
    }

    async fn reach_plan(h: &Harness) {
        h.press("infographic").await;
        h.image_model.push_text("Стальная термокружка");
        h.photo(samples::jpeg(64, 64)).await;
        h.text("Термокружка").await;
        h.press("cat_home").await;
        script_plan(h);
        h.press("slides_3").await;
    }

    #[tokio::test]
    async fn full_run_sends_every_slide_at_marketplace_size() {
        let h = Harness::new();
        reach_plan(&h).await;
        assert_eq!(h.dialog().await, Dialog::Infographic(InfographicStep::ConfirmPlan));
        assert!(h.chat.last_text().contains("<b>Количество слайдов:</b> 3"));
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::edit_plan()));

        for _ in 0..3 {
            h.image_model.push_image(&samples::png(30, 40));
        }
        h.press("generate_start").await;

        let photos = h.chat.photos();
        assert_eq!(photos.len(), 3);
        assert!(photos[0].text().starts_with("👑 <b>Слайд 1</b>"));
        assert!(h.chat.last_text().contains("<b>Слайдов:</b> 3 из 3"));
        assert_eq!(h.dialog().await, Dialog::Idle);

        // the first (main) slide is the style reference for the rest
        assert_eq!(image_count(&h.image_model.request(1)), 1);
        assert_eq!(image_count(&h.image_model.request(2)), 2);

        let session = h.session().await;
        assert_eq!(session.slides_designs.len(), 3);
        assert_eq!(session.main_slide_design.map(|s| s.slide_num), Some(1));
    }

    #[tokio::test]
    async fn partial_failure_lists_missing_slides() {
        let h = Harness::new();
        reach_plan(&h).await;

        h.image_model.push_image(&samples::png(30, 40));
        h.image_model.push_error("overloaded");
        h.image_model.push_image(&samples::png(30, 40));
        h.press("generate_start").await;

        assert_eq!(h.chat.photos().len(), 2);
        assert!(h.chat.last_text().contains("Не удалось создать слайды: 2"));
    }

    #[tokio::test]
    async fn unnumbered_plan_still_reports_the_failed_slide() {
        let h = Harness::new();
        h.press("infographic").await;
        h.image_model.push_text("Стальная термокружка");
        h.photo(samples::jpeg(64, 64)).await;
        h.text("Термокружка").await;
        h.press("cat_home").await;
        h.text_model.push_text(KEYWORDS);
        h.text_model.push_text(SEO);
        h.text_model.push_text(
            r#"{"style_guide": "", "prompts": [
                {"is_main": true, "prompt": "hero", "text_overlay": "a"},
                {"prompt": "detail", "text_overlay": "b"},
                {"prompt": "size", "text_overlay": "c"}
            ]}"#,
        );
        h.press("slides_3").await;

        h.image_model.push_image(&samples::png(30, 40));
        h.image_model.push_error("overloaded");
        h.image_model.push_image(&samples::png(30, 40));
        h.press("generate_start").await;

        let photos = h.chat.photos();
        assert_eq!(photos.len(), 2);
        assert!(photos[0].text().starts_with("👑 <b>Слайд 1</b>"));
        assert!(photos[1].text().starts_with("<b>Слайд 3</b>"));
        assert!(h.chat.last_text().contains("<b>Слайдов:</b> 2 из 3"));
        assert!(h.chat.last_text().contains("Не удалось создать слайды: 2"));
    }

    #[tokio::test]
    async fn rejected_upload_keeps_the_run_and_its_slides() {
        let h = Harness::new();
        reach_plan(&h).await;
        h.chat
            .fail_photos
            .lock()
            .unwrap()
            .push("slide_2.jpg".to_string());

        for _ in 0..3 {
            h.image_model.push_image(&samples::png(30, 40));
        }
        h.press("generate_start").await;

        assert_eq!(h.chat.photos().len(), 2);
        assert!(h.chat.last_text().contains("<b>Слайдов:</b> 2 из 3"));
        assert!(h.chat.last_text().contains("Не удалось создать слайды: 2"));
        assert!(h.chat.sent().iter().any(|s| matches!(s, Sent::Delete { .. })));

        let session = h.session().await;
        assert_eq!(session.slides_designs.len(), 3);
        assert!(session.main_slide_design.is_some());
    }

    #[tokio::test]
    async fn all_slides_failing_reports_error() {
        let h = Harness::new();
        reach_plan(&h).await;
        h.press("generate_start").await;

        assert!(h.chat.photos().is_empty());
        assert!(h.chat.last_text().starts_with("❌ Не удалось создать слайды"));
        assert_eq!(h.dialog().await, Dialog::Idle);
    }

    #[tokio::test]
    async fn failed_plan_returns_to_menu() {
        let h = Harness::new();
        h.edit_session(|s| {
            s.original_image = Some(Bytes::from(samples::jpeg(8, 8)));
            s.product_name = Some("Термокружка".into());
            s.category = Some("Дом и сад".into());
        })
        .await;
        h.press("infographic").await;
        h.press("infographic_use_existing").await;
        assert_eq!(h.dialog().await, Dialog::Infographic(InfographicStep::SlideCount));

        h.text_model.push_error("down");
        h.press("slides_auto").await;

        assert!(h.chat.last_text().starts_with("❌ Не удалось создать план"));
        assert_eq!(h.dialog().await, Dialog::Idle);
    }

    #[tokio::test]
    async fn plan_can_be_reviewed_and_resized() {
        let h = Harness::new();
        reach_plan(&h).await;

        h.press("edit_prompts").await;
        assert!(h.chat.last_text().contains("Промт: detail"));
        assert_eq!(h.dialog().await, Dialog::Infographic(InfographicStep::ConfirmPlan));

        h.press("edit_slides_count").await;
        assert_eq!(h.dialog().await, Dialog::Infographic(InfographicStep::SlideCount));
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::slide_count()));
    }

    #[tokio::test]
    async fn new_photo_resets_session() {
        let h = Harness::new();
        h.edit_session(|s| {
            s.original_image = Some(Bytes::from_static(b"old"));
            s.product_name = Some("Чайник".into());
        })
        .await;
        h.press("infographic").await;
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::infographic_use_image()));

        h.press("infographic_new_photo").await;
        assert_eq!(h.dialog().await, Dialog::Infographic(InfographicStep::Photo));
        assert!(!h.session().await.has_image());
    }

    #[tokio::test]
    async fn unreadable_photo_keeps_waiting() {
        let h = Harness::new();
        h.press("infographic").await;
        h.photo(b"garbage".to_vec()).await;

        assert!(matches!(
            h.chat.sent().last(),
            Some(Sent::Edit { text, .. }) if text == texts::PHOTO_FAILED
        ));
        assert_eq!(h.dialog().await, Dialog::Infographic(InfographicStep::Photo));
    }
}
