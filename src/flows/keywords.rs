// src/flows/keywords.rs
use super::{Input, MIN_NAME_CHARS, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards::{self, CategoryChoice};
use crate::session::{Conversation, Dialog, KeywordsStep};
use crate::texts;
use log::error;

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::Keywords(KeywordsStep::ProductName);
    turn.show(
        "<b>🔍 Поиск ключевых слов для WB/Ozon</b>\n\n\
         Введите название товара:\n\n\
         <i>Например: Кроссовки мужские Nike Air Max</i>",
        Some(&keyboards::cancel()),
    )
    .await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: KeywordsStep,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (KeywordsStep::ProductName, Input::Text(text)) => {
            let Some(name) = long_enough(text, MIN_NAME_CHARS) else {
                turn.send(texts::NAME_TOO_SHORT, Some(&keyboards::cancel()))
                    .await?;
                return Ok(());
            };
            turn.send(
                &format!(
                    "<b>Товар:</b> {}\n\nВыберите категорию товара или введите свою:",
                    texts::escape(&name)
                ),
                Some(&keyboards::categories()),
            )
            .await?;
            conversation.session.product_name = Some(name);
            conversation.dialog = Dialog::Keywords(KeywordsStep::Category);
            Ok(())
        }
        (KeywordsStep::ProductName, _) => unexpected(turn, input, texts::SEND_NAME).await,

        (KeywordsStep::Category, Input::Callback { data, .. }) => {
            match keyboards::parse_category(data) {
                Some(CategoryChoice::Custom) => {
                    conversation.dialog = Dialog::Keywords(KeywordsStep::CustomCategory);
                    turn.show(texts::ENTER_CATEGORY, Some(&keyboards::cancel()))
                        .await?;
                    Ok(())
                }
                Some(CategoryChoice::Named(category)) => {
                    conversation.session.category = Some(category.to_string());
                    turn.ack(None).await?;
                    process(turn, conversation).await
                }
                None => turn.stale().await,
            }
        }
        (KeywordsStep::Category, _) => unexpected(turn, input, texts::USE_BUTTONS).await,

        (KeywordsStep::CustomCategory, Input::Text(text)) if !text.trim().is_empty() => {
            conversation.session.category = Some(text.trim().to_string());
            process(turn, conversation).await
        }
        (KeywordsStep::CustomCategory, _) => {
            unexpected(turn, input, texts::ENTER_CATEGORY).await
        }
    }
}

async fn process(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    conversation.dialog = Dialog::Idle;
    let session = &mut conversation.session;
    let (Some(name), Some(category)) = (session.product_name.clone(), session.category.clone())
    else {
        turn.send(texts::SESSION_LOST, Some(&keyboards::back_to_menu()))
            .await?;
        return Ok(());
    };

    let progress = turn
        .send(
            &format!(
                "🔍 Ищу ключевые слова...\n\n{}\n\nЭто может занять несколько секунд...",
                texts::product_header(&name, &category)
            ),
            None,
        )
        .await?;

    match turn.ctx.llm.analyze_keywords(&name, &category).await {
        Ok(keywords) => {
            let text = texts::keywords_message("Ключевые слова для WB/Ozon:", &keywords);
            session.keywords = Some(keywords);
            turn.edit(progress, &text, Some(&keyboards::back_to_menu()))
                .await?;
        }
        Err(e) => {
            error!("Error getting keywords: {}", e);
            turn.edit(
                progress,
                "❌ Не удалось найти ключевые слова.\nПопробуйте уточнить название товара.",
                Some(&keyboards::back_to_menu()),
            )
            .await?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use crate::flows::harness::Harness;
    use crate::keyboards;
    use crate::services::completion::fake::request_text;
    use crate::session::{Dialog, KeywordsStep};
    use crate::texts;

    const KEYWORDS: &str = r#"```json
{"high_frequency": ["кроссовки мужские"], "mid_frequency": ["кроссовки nike"], "low_frequency": ["кроссовки nike air max 90"]}
```"#;

    #[tokio::test]
    async fn name_then_category_button_yields_keywords() {
        let h = Harness::new();
        h.press("keywords").await;
        h.text("  Кроссовки Nike Air Max  ").await;
        assert_eq!(h.dialog().await, Dialog::Keywords(KeywordsStep::Category));
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::categories()));

        h.text_model.push_text(KEYWORDS);
        h.press("cat_shoes").await;

        let request = h.text_model.request(0);
        assert!(request_text(&request).contains("Кроссовки Nike Air Max"));
        assert!(request_text(&request).contains("Обувь"));
        assert!(h.chat.last_text().contains("<b>Высокочастотные:</b>\nкроссовки мужские"));
        assert_eq!(h.dialog().await, Dialog::Idle);

        let session = h.session().await;
        assert_eq!(session.product_name.as_deref(), Some("Кроссовки Nike Air Max"));
        assert_eq!(session.keywords_list().len(), 3);
    }

    #[tokio::test]
    async fn short_name_is_rejected() {
        let h = Harness::new();
        h.press("keywords").await;
        h.text("ab").await;

        assert_eq!(h.chat.last_text(), texts::NAME_TOO_SHORT);
        assert_eq!(h.dialog().await, Dialog::Keywords(KeywordsStep::ProductName));
    }

    #[tokio::test]
    async fn custom_category_is_typed() {
        let h = Harness::new();
        h.press("keywords").await;
        h.text("Лежанка для собак").await;
        h.press("cat_custom").await;
        assert_eq!(h.dialog().await, Dialog::Keywords(KeywordsStep::CustomCategory));

        h.text_model.push_text(KEYWORDS);
        h.text("Зоотовары").await;

        assert!(request_text(&h.text_model.request(0)).contains("Зоотовары"));
        assert_eq!(h.session().await.category.as_deref(), Some("Зоотовары"));
    }

    #[tokio::test]
    async fn malformed_reply_shows_failure() {
        let h = Harness::new();
        h.press("keywords").await;
        h.text("Чайник электрический").await;
        h.text_model.push_text("Извините, не могу помочь");
        h.press("cat_home").await;

        assert!(h.chat.last_text().starts_with("❌ Не удалось найти ключевые слова"));
        assert!(h.session().await.keywords.is_none());
        assert_eq!(h.dialog().await, Dialog::Idle);
    }
}
