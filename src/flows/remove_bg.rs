// src/flows/remove_bg.rs
use super::{Input, Turn, unexpected};
use crate::errors::BotError;
use crate::keyboards;
use crate::session::{Conversation, Dialog, RemoveBgStep};
use crate::texts;
use bytes::Bytes;
use log::{error, warn};

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::RemoveBg(RemoveBgStep::Photo);
    turn.show(
        "<b>🖼 Удаление фона с фото</b>\n\n\
         Отправьте фотографию товара, и я оставлю только товар на белом фоне.\n\n\
         📸 Отправьте фото:",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: RemoveBgStep,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (RemoveBgStep::Photo, Input::Photo(file_id)) => {
            let Some(image) = turn.receive_photo(file_id).await? else {
                return Ok(());
            };
            conversation.session.original_image = Some(image.clone());
            process(turn, conversation, image).await
        }
        _ => {
            unexpected(
                turn,
                input,
                "⚠️ Пожалуйста, отправьте фотографию.\nЯ жду изображение товара.",
            )
            .await
        }
    }
}

async fn process(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    image: Bytes,
) -> Result<(), BotError> {
    let progress = turn
        .send(
            "⏳ Обрабатываю изображение...\nЭто может занять до минуты.",
            None,
        )
        .await?;

    let ctx = turn.ctx;
    let outcome = ctx
        .images
        .remove_background(image.clone())
        .await
        .and_then(|removal| Ok((turn.for_chat(&removal.image)?, removal.regenerated)));

    match outcome {
        Ok((processed, regenerated)) => {
            let analysis = ctx
                .images
                .analyze_product_image(&image)
                .await
                .inspect_err(|e| warn!("Product analysis failed: {}", e))
                .ok();

            conversation.session.no_bg_image = Some(Bytes::from(processed.clone()));

            let mut caption = String::new();
            if let Some(analysis) = analysis {
                caption.push_str(&format!(
                    "<b>Анализ изображения:</b>\n\n{}\n\n",
                    texts::snippet(&analysis, 700)
                ));
            }
            if !regenerated {
                caption.push_str("⚠️ Модель не смогла убрать фон, сохранено исходное фото.\n");
            }
            caption.push_str("✅ Изображение сохранено для дальнейшей работы.");

            turn.delete(progress).await;
            turn.send_photo(
                processed,
                "product_no_bg.jpg",
                &caption,
                Some(&keyboards::back_to_menu()),
            )
            .await?;
        }
        Err(e) => {
            error!("Error processing photo: {}", e);
            turn.edit(
                progress,
                "❌ Не удалось обработать изображение.\nПопробуйте другое фото.",
                Some(&keyboards::back_to_menu()),
            )
            .await?;
        }
    }

    conversation.dialog = Dialog::Idle;
    Ok(())
}
