// src/polling.rs
use crate::errors::BotError;
use crate::flows::{AppContext, handle_update};
use crate::services::telegram::{TelegramClient, Update};
use async_trait::async_trait;
use log::{error, info};
use std::sync::Arc;
use std::time::Duration;

const POLL_TIMEOUT_SECS: u64 = 30;
const RETRY_DELAY: Duration = Duration::from_secs(5);

/// Where long-polled updates come from.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn delete_webhook(&self) -> Result<(), BotError>;
    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, BotError>;
}

#[async_trait]
impl UpdateSource for TelegramClient {
    async fn delete_webhook(&self) -> Result<(), BotError> {
        TelegramClient::delete_webhook(self).await
    }

    async fn get_updates(&self, offset: i64, timeout_secs: u64) -> Result<Vec<Update>, BotError> {
        TelegramClient::get_updates(self, offset, timeout_secs).await
    }
}

/// Fetches one batch, spawns a task per update and returns the next offset.
pub async fn poll_once(
    ctx: &Arc<AppContext>,
    source: &dyn UpdateSource,
    offset: i64,
) -> Result<i64, BotError> {
    let updates = source.get_updates(offset, POLL_TIMEOUT_SECS).await?;
    let mut next = offset;

    for update in updates {
        next = next.max(update.update_id + 1);
        tokio::spawn(handle_update(ctx.clone(), update));
    }

    Ok(next)
}

pub async fn run(ctx: Arc<AppContext>, source: Arc<dyn UpdateSource>) -> Result<(), BotError> {
    source.delete_webhook().await?;
    info!("Webhook removed, polling for updates");

    let mut offset = 0;
    loop {
        match poll_once(&ctx, source.as_ref(), offset).await {
            Ok(next) => offset = next,
            Err(e) => {
                error!("Polling failed: {}", e);
                tokio::time::sleep(RETRY_DELAY).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::services::completion::fake::ScriptedCompletion;
    use crate::services::telegram::fake::RecordingMessenger;
    use std::collections::VecDeque;
    use std::sync::Mutex;

    #[derive(Default)]
    struct QueuedUpdates {
        batches: Mutex<VecDeque<Result<Vec<Update>, BotError>>>,
        offsets: Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl UpdateSource for QueuedUpdates {
        async fn delete_webhook(&self) -> Result<(), BotError> {
            Ok(())
        }

        async fn get_updates(&self, offset: i64, _timeout: u64) -> Result<Vec<Update>, BotError> {
            self.offsets.lock().unwrap().push(offset);
            self.batches
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Ok(Vec::new()))
        }
    }

    fn context() -> Arc<AppContext> {
        Arc::new(AppContext::new(
            Config::for_tests(),
            Arc::new(RecordingMessenger::default()),
            Arc::new(ScriptedCompletion::default()),
            Arc::new(ScriptedCompletion::default()),
        ))
    }

    fn update(id: i64, user: i64) -> Update {
        serde_json::from_value(serde_json::json!({
            "update_id": id,
            "message": {
                "message_id": id,
                "from": { "id": user, "first_name": "U" },
                "chat": { "id": user },
                "text": "/start"
            }
        }))
        .unwrap()
    }

    #[tokio::test]
    async fn offset_moves_past_the_last_update() {
        let ctx = context();
        let source = QueuedUpdates::default();
        source
            .batches
            .lock()
            .unwrap()
            .push_back(Ok(vec![update(41, 1), update(40, 2)]));

        let next = poll_once(&ctx, &source, 0).await.unwrap();
        assert_eq!(next, 42);

        let next = poll_once(&ctx, &source, next).await.unwrap();
        assert_eq!(next, 42);
        assert_eq!(*source.offsets.lock().unwrap(), vec![0, 42]);
    }

    #[tokio::test]
    async fn failed_poll_keeps_offset_for_retry() {
        let ctx = context();
        let source = QueuedUpdates::default();
        source
            .batches
            .lock()
            .unwrap()
            .push_back(Err(BotError::Telegram("Bad Gateway".into())));

        assert!(poll_once(&ctx, &source, 7).await.is_err());
        assert_eq!(poll_once(&ctx, &source, 7).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn updates_reach_the_dispatcher() {
        let ctx = context();
        let source = QueuedUpdates::default();
        source.batches.lock().unwrap().push_back(Ok(vec![update(1, 9)]));

        poll_once(&ctx, &source, 0).await.unwrap();
        for _ in 0..50 {
            if ctx.sessions.contains(9).await {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(ctx.sessions.contains(9).await);
    }
}
