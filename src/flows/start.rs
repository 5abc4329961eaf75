// src/flows/start.rs
use super::{Input, Turn};
use crate::errors::BotError;
use crate::keyboards;
use crate::session::{Conversation, Dialog};
use crate::texts;
use log::info;

const GLOBAL_BUTTONS: [&str; 3] = ["main_menu", "back_to_menu", "cancel"];

pub fn handles(callback_data: &str) -> bool {
    GLOBAL_BUTTONS.contains(&callback_data)
}

pub async fn command(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    command: &str,
) -> Result<(), BotError> {
    match command {
        "start" => {
            info!("User {} started the bot", conversation.session.user_id);
            conversation.reset();
            turn.send(texts::WELCOME, Some(&keyboards::main_menu())).await?;
        }
        "menu" => {
            conversation.dialog = Dialog::Idle;
            turn.send(texts::MENU, Some(&keyboards::main_menu())).await?;
        }
        _ => {
            turn.send(texts::HELP, Some(&keyboards::back_to_menu())).await?;
        }
    }
    Ok(())
}

pub async fn callback(
    turn: &mut Turn<'_>,
    conversation: &mut Conversation,
    data: &str,
) -> Result<(), BotError> {
    match data {
        "cancel" => {
            conversation.reset();
            turn.ack(Some("Отменено")).await?;
            turn.show(
                &format!("{}\n\n{}", texts::CANCELLED, texts::WELCOME),
                Some(&keyboards::main_menu()),
            )
            .await?;
        }
        "back_to_menu" => {
            conversation.dialog = Dialog::Idle;
            turn.show(texts::MENU, Some(&keyboards::main_menu())).await?;
        }
        _ => {
            conversation.reset();
            turn.show(texts::WELCOME, Some(&keyboards::main_menu())).await?;
        }
    }
    Ok(())
}

pub async fn idle(turn: &mut Turn<'_>, input: &Input) -> Result<(), BotError> {
    match input {
        Input::Callback { .. } => turn.stale().await,
        _ => {
            turn.send(texts::IDLE_HINT, Some(&keyboards::main_menu()))
                .await?;
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::flows::harness::Harness;
    use crate::keyboards;
    use crate::services::telegram::fake::Sent;
    use crate::session::{Dialog, EditPhotoStep};
    use crate::texts;
    use bytes::Bytes;

    #[tokio::test]
    async fn start_resets_session_and_shows_welcome() {
        let h = Harness::new();
        h.edit_session(|s| s.original_image = Some(Bytes::from_static(b"x")))
            .await;
        h.set_dialog(Dialog::EditPhoto(EditPhotoStep::Instruction)).await;

        h.command("start").await;

        assert_eq!(h.dialog().await, Dialog::Idle);
        assert!(!h.session().await.has_image());
        assert_eq!(h.chat.last_text(), texts::WELCOME);
    }

    #[tokio::test]
    async fn menu_keeps_session_data() {
        let h = Harness::new();
        h.edit_session(|s| s.original_image = Some(Bytes::from_static(b"x")))
            .await;
        h.set_dialog(Dialog::EditPhoto(EditPhotoStep::Photo)).await;

        h.command("menu").await;

        assert_eq!(h.dialog().await, Dialog::Idle);
        assert!(h.session().await.has_image());
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::main_menu()));
    }

    #[tokio::test]
    async fn help_offers_way_back() {
        let h = Harness::new();
        h.command("help").await;
        assert!(h.chat.last_text().contains("Справка по боту"));
        assert_eq!(h.chat.last_keyboard(), Some(keyboards::back_to_menu()));
    }

    #[tokio::test]
    async fn cancel_clears_flow_and_toasts() {
        let h = Harness::new();
        h.set_dialog(Dialog::EditPhoto(EditPhotoStep::Photo)).await;
        h.edit_session(|s| s.product_name = Some("Куртка".into())).await;

        h.press("cancel").await;

        assert_eq!(h.dialog().await, Dialog::Idle);
        assert!(h.session().await.product_name.is_none());
        assert_eq!(h.chat.answers(), vec![Some("Отменено".to_string())]);
        assert!(h.chat.last_text().starts_with(texts::CANCELLED));
    }

    #[tokio::test]
    async fn back_to_menu_edits_the_pressed_message() {
        let h = Harness::new();
        h.press("back_to_menu").await;
        assert!(matches!(
            h.chat.sent().first(),
            Some(Sent::Edit { text, .. }) if text == texts::MENU
        ));
    }
}
