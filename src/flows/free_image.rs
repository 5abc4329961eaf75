// src/flows/free_image.rs
use super::{Input, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards;
use crate::session::{Conversation, Dialog, FreeImageStep};
use crate::texts;
use log::error;

const MIN_PROMPT_CHARS: usize = 5;

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::FreeImage {
        step: FreeImageStep::Prompt,
        prompt: None,
    };
    turn.show(
        "<b>🖼 Генерация изображения по промпту</b>\n\n\
         Опишите что хотите сгенерировать.\n\
         Модель создаст изображение по вашему описанию.\n\n\
         <b>Примеры промптов:</b>\n\
         • <i>Инфографика для маркетплейса: кроссовки Nike на белом фоне, цена 4990₽, бейдж скидка -30%</i>\n\
         • <i>Баннер для рекламы: яркий фон, текст РАСПРОДАЖА, летняя тема</i>\n\
         • <i>Иконка для приложения: минималистичный дизайн, корзина покупок</i>\n\n\
         ✏️ Введите ваш промпт:",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: FreeImageStep,
    prompt: Option<String>,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (FreeImageStep::Prompt, Input::Text(text)) => {
            let Some(prompt) = long_enough(text, MIN_PROMPT_CHARS) else {
                turn.send(
                    "⚠️ Промпт слишком короткий. Опишите подробнее.",
                    Some(&keyboards::cancel()),
                )
                .await?;
                return Ok(());
            };
            generate(turn, conversation, prompt).await
        }
        (FreeImageStep::Prompt, _) => {
            unexpected(turn, input, "⚠️ Введите текстовый промпт.").await
        }

        (FreeImageStep::Result, Input::Callback { data, .. }) => match data.as_str() {
            "free_regenerate" => match prompt {
                Some(prompt) => {
                    turn.ack(Some("Генерирую новый вариант...")).await?;
                    generate(turn, conversation, prompt).await
                }
                None => {
                    conversation.dialog = Dialog::FreeImage {
                        step: FreeImageStep::Prompt,
                        prompt: None,
                    };
                    turn.send(
                        "❌ Промпт потерян. Введите новый.",
                        Some(&keyboards::cancel()),
                    )
                    .await?;
                    Ok(())
                }
            },
            "free_new_prompt" => {
                conversation.dialog = Dialog::FreeImage {
                    step: FreeImageStep::Prompt,
                    prompt: None,
                };
                turn.send("✏️ Введите новый промпт:", Some(&keyboards::cancel()))
                    .await?;
                Ok(())
            }
            _ => turn.stale().await,
        },
        (FreeImageStep::Result, _) => unexpected(turn, input, texts::USE_BUTTONS).await,
    }
}

/// Generates and shows one image. Success or not, the user lands on the
/// result screen with the prompt kept for regeneration.
async fn generate(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    prompt: String,
) -> Result<(), BotError> {
    let progress = turn
        .send(
            "🎨 <b>Генерирую изображение...</b>\n\nЭто может занять до минуты.",
            None,
        )
        .await?;

    let outcome = turn
        .ctx
        .images
        .generate_from_prompt(&prompt)
        .await
        .and_then(|image| turn.for_chat(&image));
    turn.delete(progress).await;

    match outcome {
        Ok(photo) => {
            turn.send_photo(
                photo,
                "generated.jpg",
                &format!(
                    "<b>✅ Изображение готово!</b>\n\n<b>Промпт:</b> <i>{}</i>",
                    texts::snippet(&prompt, 100)
                ),
                Some(&keyboards::free_result()),
            )
            .await?;
        }
        Err(e) => {
            error!("Error generating free image: {}", e);
            turn.send(
                "❌ Не удалось сгенерировать изображение.\nПопробуйте другой промпт.",
                Some(&keyboards::free_result()),
            )
            .await?;
        }
    }

    conversation.dialog = Dialog::FreeImage {
        step: FreeImageStep::Result,
        prompt: Some(prompt),
    };
    Ok(())
}
