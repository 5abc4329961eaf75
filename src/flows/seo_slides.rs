// src/flows/seo_slides.rs
use super::{Input, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards::{self, SlideChoice};
use crate::session::{Conversation, Dialog, SeoSlidesStep};
use crate::texts;
use log::{error, warn};

const MIN_DESCRIPTION_CHARS: usize = 10;

const ASK_DESCRIPTION: &str = "<b>📝 Шаг 2:</b> Опишите товар и ваши пожелания по слайдам.\n\n\
    <b>Важно указать:</b>\n\
    • Название товара\n\
    • Что должно быть на каждом слайде\n\
    • Особенности (размеры, материал, доставка и т.д.)\n\n\
    <b>Пример:</b>\n\
    <i>Кроссовки Nike Air Max\n\
    Слайд 1 - главная с товаром и ценой\n\
    Слайд 2 - таблица размеров\n\
    Слайд 3 - преимущества материала\n\
    Слайд 4 - удобная доставка и возврат</i>\n\n\
    ✏️ Введите описание:";

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::SeoSlides(SeoSlidesStep::Photo);
    turn.show(
        "<b>📝 SEO + План слайдов для инфографики</b>\n\n\
         Этот инструмент создаст:\n\
         • SEO-описание для карточки товара\n\
         • Промты для каждого слайда с фокусом на CTR\n\n\
         📸 <b>Шаг 1:</b> Отправьте фото товара:",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: SeoSlidesStep,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (SeoSlidesStep::Photo, Input::Photo(file_id)) => {
            let Some(image) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };

            let progress = turn.send("⏳ Анализирую товар на фото...", None).await?;
            let analysis = turn
                .ctx
                .images
                .analyze_product_image(&image)
                .await
                .inspect_err(|e| warn!("Product analysis failed: {}", e))
                .ok();
            turn.delete(progress).await;

            conversation.session.original_image = Some(image);
            conversation.dialog = Dialog::SeoSlides(SeoSlidesStep::Description);

            let analysis = analysis
                .map(|a| format!("\n\n<b>Анализ фото:</b>\n{}", texts::snippet(&a, 300)))
                .unwrap_or_default();
            turn.send(
                &format!("✅ Фото загружено!{}\n\n{}", analysis, ASK_DESCRIPTION),
                Some(&keyboards::cancel()),
            )
            .await?;
            Ok(())
        }
        (SeoSlidesStep::Photo, _) => unexpected(turn, input, texts::SEND_PHOTO).await,

        (SeoSlidesStep::Description, Input::Text(text)) => {
            let Some(description) = long_enough(text, MIN_DESCRIPTION_CHARS) else {
                turn.send(
                    &format!("{} Добавьте больше деталей.", texts::DESCRIPTION_TOO_SHORT),
                    Some(&keyboards::cancel()),
                )
                .await?;
                return Ok(());
            };
            conversation.session.product_description = Some(description);
            conversation.dialog = Dialog::SeoSlides(SeoSlidesStep::SlideCount);
            turn.send(
                "<b>Описание сохранено!</b>\n\n<b>📊 Шаг 3:</b> Выберите количество слайдов:",
                Some(&keyboards::slide_count()),
            )
            .await?;
            Ok(())
        }
        (SeoSlidesStep::Description, _) => {
            unexpected(turn, input, texts::SEND_DESCRIPTION).await
        }

        (SeoSlidesStep::SlideCount, Input::Callback { data, .. }) => {
            let num_slides = match keyboards::parse_slide_choice(data) {
                Some(SlideChoice::Fixed(n)) => turn.ctx.config.clamp_slides(n),
                Some(SlideChoice::Auto) => turn.ctx.config.default_slides_count,
                None => return turn.stale().await,
            };
            process(turn, conversation, num_slides).await
        }
        (SeoSlidesStep::SlideCount, _) => unexpected(turn, input, texts::USE_BUTTONS).await,
    }
}

async fn process(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    num_slides: u32,
) -> Result<(), BotError> {
    conversation.dialog = Dialog::Idle;
    let session = &mut conversation.session;
    let Some(description) = session.product_description.clone() else {
        turn.show(texts::SESSION_LOST, Some(&keyboards::back_to_menu()))
            .await?;
        return Ok(());
    };

    turn.ack(Some("Генерирую SEO и план слайдов...")).await?;
    let progress = turn
        .show(
            "⏳ <b>Создаю SEO и план слайдов...</b>\n\n\
             🔍 Анализирую ключевые слова\n\
             📝 Генерирую SEO-описание\n\
             🎯 Создаю промты для максимального CTR\n\n\
             Это может занять до минуты...",
            None,
        )
        .await?;

    let plan = match turn
        .ctx
        .llm
        .generate_seo_with_ctr_prompts(&description, num_slides)
        .await
    {
        Ok(plan) => plan,
        Err(e) => {
            error!("Error generating SEO slides: {}", e);
            turn.edit(
                progress,
                "❌ Не удалось создать SEO и план.\nПопробуйте позже.",
                Some(&keyboards::back_to_menu()),
            )
            .await?;
            return Ok(());
        }
    };

    turn.edit(progress, &texts::ctr_seo(&plan), None).await?;
    if let Some(keywords) = texts::ctr_keywords(&plan.keywords) {
        turn.send(&keywords, None).await?;
    }

    if plan.slide_prompts.is_empty() {
        turn.send(
            "⚠️ Промты для слайдов не созданы.",
            Some(&keyboards::back_to_menu()),
        )
        .await?;
    } else {
        turn.send(&texts::ctr_slides(&plan), Some(&keyboards::back_to_menu()))
            .await?;
        turn.send(
            "💡 <b>Совет:</b> Теперь перейдите в «Создать первый слайд», \
             чтобы сгенерировать инфографику на основе этого плана.",
            None,
        )
        .await?;
    }

    session.keywords = Some(plan.keywords.clone());
    session.seo_title = Some(plan.seo.title.clone());
    session.seo_card_content = plan.seo.bullets.clone();
    session.seo_description = Some(plan.seo.description.clone());
    session.ctr_plan = Some(plan);
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::flows::harness::Harness;
    use crate::keyboards;
    use crate::services::completion::fake::request_text;
    use crate::services::image_processor::samples;
    use crate::session::{Dialog, SeoSlidesStep};
    use crate::texts;

    const PLAN: &str = r#"{
        "keywords": {"high_frequency": ["кроссовки", "кеды"], "mid_frequency": [], "low_frequency": ["x"]},
        "seo": {"title": "Кроссовки Nike Air Max", "description": "Лёгкие и удобные", "bullets": ["Дышащие"]},
        "slide_prompts": [
            {"slide": 1, "is_main": true, "focus": "Товар и цена", "text_ru": "Скидка 30%", "ctr_elements": ["бейдж"]},
            {"slide": 2, "is_main": false, "focus": "Размеры", "text_ru": "Таблица размеров", "ctr_elements": []}
        ]
    }"#;

    const BRIEF: &str = "Кроссовки Nike Air Max, слайд 2 с размерами";

    async fn reach_slide_count(h: &Harness) {
        h.press("seo_slides").await;
        h.image_model.push_text("Белые кроссовки");
        h.photo(samples::jpeg(48, 48)).await;
        assert_eq!(h.dialog().await, Dialog::SeoSlides(SeoSlidesStep::Description));
        h.text(BRIEF).await;
        assert_eq!(h.dialog().await, Dialog::SeoSlides(SeoSlidesStep::SlideCount));
    }

    #[tokio::test]
    async fn brief_becomes_seo_keywords_and_slide_plan() {
        let h = Harness::new();
        reach_slide_count(&h).await;
        h.text_model.push_text(PLAN);
        h.press("slides_4").await;

        let request = request_text(&h.text_model.request(0));
        assert!(request.contains(BRIEF));
        assert!(request.contains("Количество слайдов: 4"));

        let texts: Vec<String> = h.chat.sent().iter().map(|s| s.text().to_string()).collect();
        assert!(texts.iter().any(|t| t.contains("Кроссовки Nike Air Max") && t.contains("Лёгкие и удобные")));
        assert!(texts.iter().any(|t| t.contains("<b>ВЧ:</b> кроссовки, кеды")));
        assert!(texts.iter().any(|t| t.contains("<b>Слайд 2:</b> Размеры")));
        assert!(h.chat.last_text().starts_with("💡"));
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::back_to_menu()));

        let session = h.session().await;
        assert!(session.ctr_plan.is_some());
        assert_eq!(session.seo_card_content, vec!["Дышащие"]);
        assert_eq!(h.dialog().await, Dialog::Idle);
    }

    #[tokio::test]
    async fn auto_uses_default_slide_count() {
        let h = Harness::new();
        reach_slide_count(&h).await;
        h.text_model.push_text(PLAN);
        h.press("slides_auto").await;

        assert!(request_text(&h.text_model.request(0)).contains("Количество слайдов: 5"));
    }

    #[tokio::test]
    async fn short_brief_is_rejected() {
        let h = Harness::new();
        h.press("seo_slides").await;
        h.image_model.push_error("no analysis");
        h.photo(samples::jpeg(48, 48)).await;
        h.text("кеды").await;

        assert!(h.chat.last_text().starts_with(texts::DESCRIPTION_TOO_SHORT));
        assert_eq!(h.dialog().await, Dialog::SeoSlides(SeoSlidesStep::Description));
    }

    #[tokio::test]
    async fn failed_plan_reports_error() {
        let h = Harness::new();
        reach_slide_count(&h).await;
        h.text_model.push_text("не JSON");
        h.press("slides_3").await;

        assert!(h.chat.last_text().starts_with("❌ Не удалось создать SEO и план"));
        assert!(h.session().await.ctr_plan.is_none());
        assert_eq!(h.dialog().await, Dialog::Idle);
    }
}
