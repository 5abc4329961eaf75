// src/flows/seo.rs
use super::{Input, MIN_NAME_CHARS, Turn, long_enough, unexpected};
use crate::errors::BotError;
use crate::keyboards::{self, CategoryChoice};
use crate::session::{Conversation, Dialog, SeoStep};
use crate::texts;
use log::error;

/// The slide count only shapes `slides_content`, which this flow does not show.
const SEO_ONLY_SLIDES: u32 = 5;

const ASK_NAME: &str = "<b>📄 Создание SEO-описания для WB/Ozon</b>\n\n\
    Введите название товара:\n\n\
    <i>Например: Куртка женская зимняя с капюшоном</i>";

pub async fn start(turn: &mut Turn<'_>, conversation: &mut Conversation) -> Result<(), BotError> {
    let session = &conversation.session;
    if let (Some(name), Some(category)) = (&session.product_name, &session.category) {
        let mut text = format!(
            "<b>📄 Создание SEO-описания</b>\n\n{}",
            texts::product_header(name, category)
        );
        if session.has_analysis() {
            text.push_str(&format!(
                "\n<i>Уже подобрано ключевых слов: {}</i>",
                session.keywords_list().len()
            ));
        }
        text.push_str("\n\nИспользовать эти данные или ввести новые?");
        conversation.dialog = Dialog::Seo(SeoStep::ConfirmExisting);
        turn.show(&text, Some(&keyboards::seo_use_existing())).await?;
        return Ok(());
    }

    conversation.dialog = Dialog::Seo(SeoStep::ProductName);
    turn.show(ASK_NAME, Some(&keyboards::cancel())).await?;
    Ok(())
}

pub async fn handle(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    step: SeoStep,
    input: &Input,
) -> Result<(), BotError> {
    match (step, input) {
        (SeoStep::ConfirmExisting, Input::Callback { data, .. }) => match data.as_str() {
            "seo_use_existing" => {
                turn.ack(None).await?;
                process(turn, conversation).await
            }
            "seo_new_data" => {
                conversation.session.reset();
                conversation.dialog = Dialog::Seo(SeoStep::ProductName);
                turn.show(ASK_NAME, Some(&keyboards::cancel())).await?;
                Ok(())
            }
            _ => turn.stale().await,
        },
        (SeoStep::ConfirmExisting, _) => unexpected(turn, input, texts::USE_BUTTONS).await,

        (SeoStep::ProductName, Input::Text(text)) => {
            let Some(name) = long_enough(text, MIN_NAME_CHARS) else {
                turn.send(texts::NAME_TOO_SHORT, Some(&keyboards::cancel()))
                    .await?;
                return Ok(());
            };
            turn.send(
                &format!("<b>Товар:</b> {}\n\nВыберите категорию:", texts::escape(&name)),
                Some(&keyboards::categories()),
            )
            .await?;
            conversation.session.product_name = Some(name);
            conversation.dialog = Dialog::Seo(SeoStep::Category);
            Ok(())
        }
        (SeoStep::ProductName, _) => unexpected(turn, input, texts::SEND_NAME).await,

        (SeoStep::Category, Input::Callback { data, .. }) => match keyboards::parse_category(data) {
            Some(CategoryChoice::Custom) => {
                conversation.dialog = Dialog::Seo(SeoStep::CustomCategory);
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
        },
        (SeoStep::Category, _) => unexpected(turn, input, texts::USE_BUTTONS).await,

        (SeoStep::CustomCategory, Input::Text(text)) if !text.trim().is_empty() => {
            conversation.session.category = Some(text.trim().to_string());
            process(turn, conversation).await
        }
        (SeoStep::CustomCategory, _) => unexpected(turn, input, texts::ENTER_CATEGORY).await,
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
                "📝 Генерирую SEO-контент...\n\n{}\n\nАнализирую ключевые слова и создаю описание...",
                texts::product_header(&name, &category)
            ),
            None,
        )
        .await?;

    let analysis = match turn
        .ctx
        .llm
        .generate_full_analysis(&name, &category, Some(SEO_ONLY_SLIDES))
        .await
    {
        Ok(analysis) => analysis,
        Err(e) => {
            error!("Error generating SEO: {}", e);
            turn.edit(
                progress,
                "❌ Не удалось сгенерировать SEO-контент.\nПопробуйте позже.",
                Some(&keyboards::back_to_menu()),
            )
            .await?;
            return Ok(());
        }
    };

    turn.edit(progress, &texts::seo_summary(&analysis.seo), None)
        .await?;
    if !analysis.seo.description.is_empty() {
        turn.send(&texts::seo_description(&analysis.seo.description), None)
            .await?;
    }
    turn.send(
        &texts::keywords_message("🔑 Ключевые слова:", &analysis.keywords),
        Some(&keyboards::back_to_menu()),
    )
    .await?;

    session.keywords = Some(analysis.keywords.clone());
    session.seo_title = Some(analysis.seo.title.clone());
    session.seo_card_content = analysis.seo.card_bullets.clone();
    session.seo_description = Some(analysis.seo.description.clone());
    session.full_analysis = Some(analysis);
    Ok(())
}
