// src/flows/edit_photo.rs
use super::{Input, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards;
use crate::session::{Conversation, Dialog, EditPhotoStep};
use crate::texts;
use log::error;

const MIN_INSTRUCTION_CHARS: usize = 3;

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::EditPhoto(EditPhotoStep::Photo);
    turn.show(
        "<b>✏️ Умный редактор фото</b>\n\n\
         Отправьте фотографию для редактирования.\n\n\
         <b>Возможности:</b>\n\
         • Удаление фона\n\
         • Редактирование по описанию\n\
         • Улучшение качества\n\
         • Добавление элементов\n\n\
         📸 Отправьте фото:",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: EditPhotoStep,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (EditPhotoStep::Photo, Input::Photo(file_id)) => {
            let Some(image) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };
            conversation.session.original_image = Some(image);
            conversation.dialog = Dialog::EditPhoto(EditPhotoStep::Instruction);
            turn.send(
                "✅ Фото загружено!\n\n\
                 <b>Опишите, что нужно сделать:</b>\n\n\
                 Примеры:\n\
                 • <i>Товар - кровать, убери всё вокруг, оставь только товар на белом фоне</i>\n\
                 • <i>Сделай фон белым</i>\n\
                 • <i>Улучши освещение и цвета</i>\n\
                 • <i>Добавь текст 'СКИДКА 50%' красным</i>\n\
                 • <i>Убери лишние объекты</i>\n\n\
                 ✏️ Напишите ваш промт:",
                Some(&keyboards::cancel()),
            )
            .await?;
            Ok(())
        }
        (EditPhotoStep::Photo, _) => {
            unexpected(turn, input, "⚠️ Пожалуйста, отправьте фотографию.").await
        }

        (EditPhotoStep::Instruction, Input::Text(text)) => {
            let Some(instruction) = long_enough(text, MIN_INSTRUCTION_CHARS) else {
                turn.send(
                    "⚠️ Промт слишком короткий. Опишите подробнее, что нужно изменить.",
                    Some(&keyboards::cancel()),
                )
                .await?;
                return Ok(());
            };
            process(turn, conversation, instruction).await
        }
        (EditPhotoStep::Instruction, _) => {
            unexpected(
                turn,
                input,
                "⚠️ Пожалуйста, напишите текстом, что нужно изменить на фото.",
            )
            .await
        }
    }
}

async fn process(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    instruction: String,
) -> Result<(), BotError> {
    conversation.dialog = Dialog::Idle;
    let Some(image) = conversation.session.original_image.clone() else {
        turn.send(
            "❌ Фото не найдено. Начните заново.",
            Some(&keyboards::back_to_menu()),
        )
        .await?;
        return Ok(());
    };

    let progress = turn
        .send(
            &format!(
                "⏳ Обрабатываю изображение...\n\n<b>Ваш промт:</b> {}\n\nЭто может занять до минуты...",
                texts::snippet(&instruction, 100)
            ),
            None,
        )
        .await?;

    let outcome = turn
        .ctx
        .images
        .edit_image_by_prompt(&image, &instruction)
        .await
        .and_then(|edited| turn.for_chat(&edited));

    match outcome {
        Ok(photo) => {
            turn.delete(progress).await;
            turn.send_photo(
                photo,
                "edited_photo.jpg",
                &format!(
                    "✅ <b>Фото отредактировано!</b>\n\n<b>Промт:</b> {}",
                    texts::snippet(&instruction, 200)
                ),
                Some(&keyboards::back_to_menu()),
            )
            .await?;
        }
        Err(e) => {
            error!("Error editing photo: {}", e);
            turn.edit(
                progress,
                "❌ Не удалось отредактировать изображение.\n\
                 Попробуйте другой промт или другое фото.",
                Some(&keyboards::back_to_menu()),
            )
            .await?;
        }
    }
    Ok(())
}
