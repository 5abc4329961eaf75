// src/flows/slides_from_ref.rs
use super::{Input, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards;
use crate::session::{Conversation, Dialog, RefSlidesStep};
use crate::texts;
use log::error;

const MIN_DESCRIPTION_CHARS: usize = 5;

const ASK_DESCRIPTION: &str = "<b>✏️ Опишите слайд</b>\n\n\
    Что должно быть на этом слайде?\n\n\
    <b>Пример:</b>\n\
    <i>Слайд 2 - размеры. Показать таблицу размеров\n\
    для обуви: EU 36-45, US 5-12. Текст 'Выберите\n\
    свой размер' и указатель на таблицу.</i>\n\n\
    ✏️ Введите описание:";

fn at(step: RefSlidesStep, slides_made: u32) -> Dialog {
    Dialog::SlidesFromRef { step, slides_made }
}

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = at(RefSlidesStep::StyleReference, 0);
    turn.show(
        "<b>📑 Создание слайдов по референсу</b>\n\n\
         Генерация слайдов в стиле вашего первого слайда.\n\n\
         <b>📸 Шаг 1:</b> Отправьте референс первого слайда\n\
         (это задаст стиль для всех остальных)",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: RefSlidesStep,
    slides_made: u32,
    input: &Input,
) -> Result<(), BotError> {
    let session = &mut conversation.session;
    match (step, input) {
        (RefSlidesStep::StyleReference, Input::Photo(file_id)) => {
            let Some(reference) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };
            session.reference_image = Some(reference);
            conversation.dialog = at(RefSlidesStep::ProductPhoto, slides_made);
            turn.send(
                "✅ Референс стиля загружен!\n\n\
                 <b>📸 Шаг 2:</b> Отправьте фото товара\n\
                 (или отправьте любое сообщение, чтобы пропустить)",
                Some(&keyboards::cancel()),
            )
            .await?;
            Ok(())
        }
        (RefSlidesStep::StyleReference, _) => {
            unexpected(turn, input, texts::SEND_REFERENCE).await
        }

        (RefSlidesStep::ProductPhoto, Input::Photo(file_id)) => {
            let Some(product) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };
            session.original_image = Some(product);
            conversation.dialog = at(RefSlidesStep::ExtraChoice, slides_made);
            turn.send(
                "✅ Фото товара загружено!\n\n\
                 <b>📸 Шаг 3:</b> Дополнительный референс?\n\n\
                 Можете добавить референс для контента/структуры слайда\n\
                 (например, слайд с размерами для примера)",
                Some(&keyboards::extra_reference()),
            )
            .await?;
            Ok(())
        }
        (RefSlidesStep::ProductPhoto, Input::Text(_)) => {
            session.original_image = None;
            conversation.dialog = at(RefSlidesStep::ExtraChoice, slides_made);
            turn.send(
                "⏭ Фото товара пропущено.\n\n\
                 <b>📸 Шаг 3:</b> Дополнительный референс?\n\n\
                 Можете добавить референс для контента/структуры слайда.",
                Some(&keyboards::extra_reference()),
            )
            .await?;
            Ok(())
        }
        (RefSlidesStep::ProductPhoto, _) => unexpected(turn, input, texts::SEND_PHOTO).await,

        (RefSlidesStep::ExtraChoice | RefSlidesStep::Description, Input::Callback { data, .. })
            if data == "add_extra_ref" =>
        {
            conversation.dialog = at(RefSlidesStep::ExtraReference, slides_made);
            turn.show(
                "<b>📷 Дополнительный референс</b>\n\n\
                 Отправьте фото-референс для структуры/контента.\n\
                 Стиль возьмётся из основного референса,\n\
                 а структура - из этого.\n\n\
                 📸 Отправьте фото:",
                Some(&keyboards::cancel()),
            )
            .await?;
            Ok(())
        }
        (RefSlidesStep::ExtraChoice | RefSlidesStep::Description, Input::Callback { data, .. })
            if data == "skip_extra_ref" =>
        {
            session.additional_reference = None;
            conversation.dialog = at(RefSlidesStep::Description, slides_made);
            turn.show(ASK_DESCRIPTION, Some(&keyboards::cancel())).await?;
            Ok(())
        }
        (RefSlidesStep::ExtraChoice, _) => unexpected(turn, input, texts::USE_BUTTONS).await,

        (RefSlidesStep::ExtraReference, Input::Photo(file_id)) => {
            let Some(extra) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };
            session.additional_reference = Some(extra);
            conversation.dialog = at(RefSlidesStep::Description, slides_made);
            turn.send(
                "✅ Дополнительный референс загружен!\n\n\
                 <b>✏️ Опишите слайд</b>\n\n\
                 Что должно быть на этом слайде?\n\n\
                 ✏️ Введите описание:",
                Some(&keyboards::cancel()),
            )
            .await?;
            Ok(())
        }
        (RefSlidesStep::ExtraReference, _) => {
            unexpected(turn, input, texts::SEND_REFERENCE).await
        }

        (RefSlidesStep::Description, Input::Text(text)) => {
            let Some(description) = long_enough(text, MIN_DESCRIPTION_CHARS) else {
                turn.send(texts::DESCRIPTION_TOO_SHORT, Some(&keyboards::cancel()))
                    .await?;
                return Ok(());
            };
            generate(turn, conversation, slides_made, description).await
        }
        (RefSlidesStep::Description, _) => {
            unexpected(turn, input, texts::SEND_DESCRIPTION).await
        }

        (RefSlidesStep::MoreSlides, Input::Callback { data, .. }) => match data.as_str() {
            "generate_more_slide" => {
                session.additional_reference = None;
                conversation.dialog = at(RefSlidesStep::Description, slides_made);
                turn.show(
                    &format!(
                        "<b>📑 Слайд {}</b>\n\nХотите добавить референс для этого слайда?",
                        slides_made + 2
                    ),
                    Some(&keyboards::extra_reference()),
                )
                .await?;
                Ok(())
            }
            "slides_done" => {
                conversation.dialog = Dialog::Idle;
                turn.show(
                    &format!(
                        "<b>✅ Готово!</b>\n\n\
                         Создано слайдов: {}\n\n\
                         Все слайды сгенерированы в едином стиле.",
                        slides_made
                    ),
                    Some(&keyboards::back_to_menu()),
                )
                .await?;
                Ok(())
            }
            _ => turn.stale().await,
        },
        (RefSlidesStep::MoreSlides, _) => unexpected(turn, input, texts::USE_BUTTONS).await,
    }
}

/// Slide numbers start at 2; the style reference is slide 1.
async fn generate(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    slides_made: u32,
    description: String,
) -> Result<(), BotError> {
    let session = &conversation.session;
    let Some(reference) = session.reference_image.clone() else {
        conversation.dialog = Dialog::Idle;
        turn.send(
            "❌ Референс не найден. Начните заново.",
            Some(&keyboards::back_to_menu()),
        )
        .await?;
        return Ok(());
    };

    let made = slides_made + 1;
    let number = made + 1;
    let progress = turn
        .send(
            &format!(
                "🎨 <b>Генерирую слайд {}...</b>\n\nЭто может занять до минуты.",
                number
            ),
            None,
        )
        .await?;

    let outcome = turn
        .ctx
        .images
        .generate_slide_from_reference(
            &reference,
            session.original_image.as_deref(),
            session.additional_reference.as_deref(),
            &description,
            number,
        )
        .await
        .and_then(|image| turn.for_chat(&image));
    turn.delete(progress).await;

    match outcome {
        Ok(photo) => {
            turn.send_photo(
                photo,
                &format!("slide_{}.jpg", number),
                &format!("<b>✅ Слайд {}</b>\n\n{}", number, texts::snippet(&description, 200)),
                None,
            )
            .await?;
            conversation.dialog = at(RefSlidesStep::MoreSlides, made);
            turn.send("Хотите создать ещё слайд?", Some(&keyboards::more_slides()))
                .await?;
        }
        Err(e) => {
            error!("Error generating slide {}: {}", number, e);
            conversation.dialog = at(RefSlidesStep::MoreSlides, slides_made);
            turn.send(
                "❌ Не удалось сгенерировать слайд.\nПопробуйте другое описание.",
                Some(&keyboards::more_slides()),
            )
            .await?;
        }
    }
    Ok(())
}
