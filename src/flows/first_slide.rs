// src/flows/first_slide.rs
use super::{Input, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards;
use crate::session::{Conversation, Dialog, FirstSlideStep};
use crate::texts;
use log::error;

const VARIANTS: usize = 3;
const MIN_PROMPT_CHARS: usize = 10;

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::FirstSlide(FirstSlideStep::ProductPhoto);
    turn.show(
        "<b>🎨 Создание первого слайда инфографики</b>\n\n\
         Первый слайд - самый важный для CTR!\n\
         Вы получите 3 варианта в разных стилях.\n\n\
         📸 <b>Шаг 1:</b> Отправьте фото товара:",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: FirstSlideStep,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (FirstSlideStep::ProductPhoto, Input::Photo(file_id)) => {
            let Some(image) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };
            conversation.session.original_image = Some(image);
            conversation.dialog = Dialog::FirstSlide(FirstSlideStep::ReferenceChoice);
            turn.send(
                "✅ Фото товара загружено!\n\n\
                 <b>Шаг 2:</b> Хотите добавить референс?\n\n\
                 Референс - это пример слайда, стиль которого нужно повторить.",
                Some(&keyboards::reference_choice()),
            )
            .await?;
            Ok(())
        }
        (FirstSlideStep::ProductPhoto, _) => unexpected(turn, input, texts::SEND_PHOTO).await,

        (FirstSlideStep::ReferenceChoice, Input::Callback { data, .. }) => match data.as_str() {
            "first_with_ref" => {
                conversation.dialog = Dialog::FirstSlide(FirstSlideStep::Reference);
                turn.show(
                    "<b>📷 Загрузка референса</b>\n\n\
                     Отправьте фото-референс первого слайда.\n\
                     Модель возьмёт стиль и композицию из референса.\n\n\
                     📸 Отправьте фото референса:",
                    Some(&keyboards::cancel()),
                )
                .await?;
                Ok(())
            }
            "first_no_ref" => {
                conversation.session.reference_image = None;
                conversation.dialog = Dialog::FirstSlide(FirstSlideStep::Prompt);
                turn.show(
                    "<b>✏️ Опишите первый слайд</b>\n\n\
                     Что должно быть на главном слайде?\n\n\
                     <b>Пример:</b>\n\
                     <i>Главный слайд для кроссовок Nike.\n\
                     Показать товар крупно, цену 4990₽,\n\
                     бейдж 'Хит продаж', акцент на качество.</i>\n\n\
                     ✏️ Введите описание:",
                    Some(&keyboards::cancel()),
                )
                .await?;
                Ok(())
            }
            _ => turn.stale().await,
        },
        (FirstSlideStep::ReferenceChoice, _) => {
            unexpected(turn, input, texts::USE_BUTTONS).await
        }

        (FirstSlideStep::Reference, Input::Photo(file_id)) => {
            let Some(reference) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };
            conversation.session.reference_image = Some(reference);
            conversation.dialog = Dialog::FirstSlide(FirstSlideStep::Prompt);
            turn.send(
                "✅ Референс загружен!\n\n\
                 <b>✏️ Опишите первый слайд</b>\n\n\
                 Модель возьмёт стиль из референса.\n\
                 Укажите что именно показать на слайде.\n\n\
                 <b>Пример:</b>\n\
                 <i>Сделай в стиле референса.\n\
                 Товар - постельное бельё.\n\
                 Цена 2990₽, премиум качество,\n\
                 акцент на натуральные материалы.</i>\n\n\
                 ✏️ Введите описание:",
                Some(&keyboards::cancel()),
            )
            .await?;
            Ok(())
        }
        (FirstSlideStep::Reference, _) => unexpected(turn, input, texts::SEND_REFERENCE).await,

        (FirstSlideStep::Prompt, Input::Text(text)) => {
            let Some(prompt) = long_enough(text, MIN_PROMPT_CHARS) else {
                turn.send(texts::DESCRIPTION_TOO_SHORT, Some(&keyboards::cancel()))
                    .await?;
                return Ok(());
            };
            generate(turn, conversation, prompt).await
        }
        (FirstSlideStep::Prompt, _) => unexpected(turn, input, texts::SEND_DESCRIPTION).await,
    }
}

async fn generate(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    prompt: String,
) -> Result<(), BotError> {
    conversation.dialog = Dialog::Idle;
    let session = &mut conversation.session;
    let Some(product) = session.original_image.clone() else {
        turn.send(
            "❌ Фото товара не найдено. Начните заново.",
            Some(&keyboards::back_to_menu()),
        )
        .await?;
        return Ok(());
    };

    let progress = turn
        .send(
            "🎨 <b>Генерирую 3 варианта первого слайда...</b>\n\n\
             Это может занять 2-3 минуты.\n\
             Каждый вариант в уникальном стиле для максимального CTR.",
            None,
        )
        .await?;

    let variants = turn
        .ctx
        .images
        .generate_first_slide_variants(
            &product,
            session.reference_image.as_deref(),
            &prompt,
            VARIANTS,
        )
        .await;
    session.slide_prompt = Some(prompt);
    turn.delete(progress).await;

    let succeeded = variants.iter().filter(|v| v.image.is_some()).count();
    if succeeded == 0 {
        turn.send(
            "❌ Не удалось сгенерировать варианты.\nПопробуйте другой промт.",
            Some(&keyboards::back_to_menu()),
        )
        .await?;
        return Ok(());
    }

    turn.send(
        &format!(
            "<b>✅ Готово!</b>\n\n\
             Создано {} из {} вариантов.\n\
             Выберите лучший для генерации остальных слайдов.",
            succeeded,
            variants.len()
        ),
        None,
    )
    .await?;

    for (index, variant) in variants.iter().enumerate() {
        let number = index + 1;
        let photo = variant
            .image
            .as_ref()
            .map(|image| turn.for_chat(image))
            .transpose()
            .inspect_err(|e| error!("Variant {} could not be prepared: {}", number, e))
            .ok()
            .flatten();

        match photo {
            Some(photo) => {
                turn.send_photo(
                    photo,
                    &format!("variant_{}.jpg", number),
                    &format!("<b>Вариант {}:</b> {}", number, variant.style),
                    None,
                )
                .await?;
            }
            None => {
                turn.send(&format!("❌ Вариант {} не удалось сгенерировать", number), None)
                    .await?;
            }
        }
    }

    turn.send(
        "💡 <b>Совет:</b> Сохраните лучший вариант и используйте его \
         как референс в «Слайды по референсу».",
        Some(&keyboards::back_to_menu()),
    )
    .await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::flows::harness::Harness;
    use crate::keyboards;
    use crate::services::completion::fake::{image_count, request_text};
    use crate::services::image_processor::samples;
    use crate::session::{Dialog, FirstSlideStep};
    use crate::texts;

    const PROMPT: &str = "Главный слайд, цена 4990₽, бейдж Хит";

    #[tokio::test]
    async fn three_variants_without_reference() {
        let h = Harness::new();
        h.press("first_slide").await;
        h.photo(samples::jpeg(40, 40)).await;
        assert_eq!(h.dialog().await, Dialog::FirstSlide(FirstSlideStep::ReferenceChoice));
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::reference_choice()));

        h.press("first_no_ref").await;
        for _ in 0..3 {
            h.image_model.push_image(&samples::png(20, 20));
        }
        h.text(PROMPT).await;

        let photos = h.chat.photos();
        assert_eq!(photos.len(), 3);
        assert!(photos[0].text().contains("Яркий контрастный"));
        assert!(photos[2].text().contains("Лайфстайл"));
        assert!(h.chat.last_text().starts_with("💡"));
        assert_eq!(image_count(&h.image_model.request(0)), 1);
        assert!(request_text(&h.image_model.request(1)).contains(PROMPT));
        assert_eq!(h.dialog().await, Dialog::Idle);
    }

    #[tokio::test]
    async fn reference_is_sent_with_every_variant() {
        let h = Harness::new();
        h.press("first_slide").await;
        h.photo(samples::jpeg(40, 40)).await;
        h.press("first_with_ref").await;
        h.photo(samples::jpeg(30, 40)).await;
        assert_eq!(h.dialog().await, Dialog::FirstSlide(FirstSlideStep::Prompt));

        h.image_model.push_image(&samples::png(20, 20));
        h.image_model.push_error("busy");
        h.image_model.push_image(&samples::png(20, 20));
        h.text(PROMPT).await;

        assert_eq!(h.image_model.request_count(), 3);
        assert!((0..3).all(|i| image_count(&h.image_model.request(i)) == 2));
        assert_eq!(h.chat.photos().len(), 2);
        let texts: Vec<String> = h.chat.sent().iter().map(|s| s.text().to_string()).collect();
        assert!(texts.iter().any(|t| t.contains("Создано 2 из 3")));
        assert!(texts.iter().any(|t| t == "❌ Вариант 2 не удалось сгенерировать"));
    }

    #[tokio::test]
    async fn all_variants_failing_reports_error() {
        let h = Harness::new();
        h.press("first_slide").await;
        h.photo(samples::jpeg(40, 40)).await;
        h.press("first_no_ref").await;
        h.text(PROMPT).await;

        assert!(h.chat.photos().is_empty());
        assert!(h.chat.last_text().starts_with("❌ Не удалось сгенерировать варианты"));
        assert_eq!(h.dialog().await, Dialog::Idle);
    }

    #[tokio::test]
    async fn short_prompt_keeps_waiting() {
        let h = Harness::new();
        h.press("first_slide").await;
        h.photo(samples::jpeg(40, 40)).await;
        h.press("first_no_ref").await;
        h.text("слайд").await;

        assert_eq!(h.chat.last_text(), texts::DESCRIPTION_TOO_SHORT);
        assert_eq!(h.dialog().await, Dialog::FirstSlide(FirstSlideStep::Prompt));
        assert_eq!(h.image_model.request_count(), 0);
    }
}
