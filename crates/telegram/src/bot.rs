use std::{sync::Arc, time::Duration};

use {
    lorebot_dialogs::UserLanes,
    secrecy::ExposeSecret,
    teloxide::{
        ApiError, RequestError,
        prelude::*,
        types::{AllowedUpdate, BotCommand, UpdateKind},
    },
    tokio::task::JoinHandle,
    tokio_util::sync::CancellationToken,
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, labels, telegram as tg_metrics};

use crate::{
    config::TelegramAccountConfig,
    error::{Error, Result},
    handlers,
    outbound::TelegramOutbound,
    state::AccountState,
};

const POLL_ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// A bot account whose credentials have been verified.
pub struct Connection {
    pub account_id: String,
    pub bot: Bot,
    pub bot_username: Option<String>,
    pub config: TelegramAccountConfig,
}

impl Connection {
    pub fn outbound(&self) -> Arc<TelegramOutbound> {
        Arc::new(TelegramOutbound::new(self.bot.clone(), self.account_id.clone()))
    }

    pub fn into_state(self, lanes: Arc<UserLanes>) -> AccountState {
        AccountState {
            account_id: self.account_id,
            bot: self.bot,
            bot_username: self.bot_username,
            config: self.config,
            lanes,
        }
    }
}

/// Verify the token and clear any webhook so long polling works.
pub async fn connect(account_id: &str, config: TelegramAccountConfig) -> Result<Connection> {
    // The client timeout must outlast the long-polling timeout.
    let client = teloxide::net::default_reqwest_settings()
        .timeout(Duration::from_secs(u64::from(config.poll_timeout_secs) + 15))
        .build()?;
    let bot = Bot::with_client(config.token.expose_secret(), client);

    let me = bot.get_me().await?;
    bot.delete_webhook().send().await?;

    info!(
        account_id,
        username = ?me.username,
        "telegram bot connected (webhook cleared)"
    );

    Ok(Connection {
        account_id: account_id.to_string(),
        bot,
        bot_username: me.username.clone(),
        config,
    })
}

/// Publish the command menu shown by Telegram clients.
pub async fn register_commands(bot: &Bot, account_id: &str, menu: &[(&'static str, String)]) {
    let commands: Vec<BotCommand> = menu
        .iter()
        .map(|(name, description)| BotCommand::new(*name, description.clone()))
        .collect();
    if let Err(e) = bot.set_my_commands(commands).await {
        warn!(account_id, "failed to register bot commands: {e}");
    }
}

/// Long-poll getUpdates until `cancel` fires, handing every update to the
/// account's lanes. Ends with [`Error::Conflict`] when another process
/// polls the same token.
pub fn spawn_polling(state: Arc<AccountState>, cancel: CancellationToken) -> JoinHandle<Result<()>> {
    tokio::spawn(async move {
        let account_id = state.account_id.as_str();
        info!(account_id, "starting telegram polling loop");
        let mut offset: i32 = 0;

        loop {
            let request = state
                .bot
                .get_updates()
                .offset(offset)
                .timeout(state.config.poll_timeout_secs)
                .allowed_updates(vec![AllowedUpdate::Message, AllowedUpdate::CallbackQuery])
                .send();
            let result = tokio::select! {
                () = cancel.cancelled() => {
                    info!(account_id, "telegram polling stopped");
                    return Ok(());
                }
                result = request => result,
            };

            let updates = match result {
                Ok(updates) => updates,
                Err(RequestError::Api(ApiError::TerminatedByOtherGetUpdates)) => {
                    warn!(
                        account_id,
                        "telegram polling disabled: another instance is running with this token"
                    );
                    return Err(Error::Conflict);
                },
                Err(e) => {
                    #[cfg(feature = "metrics")]
                    counter!(
                        tg_metrics::POLLING_ERRORS_TOTAL,
                        labels::ACCOUNT_ID => state.account_id.clone()
                    )
                    .increment(1);
                    warn!(account_id, error = %e, "telegram getUpdates failed");
                    tokio::select! {
                        () = cancel.cancelled() => return Ok(()),
                        () = tokio::time::sleep(POLL_ERROR_BACKOFF) => continue,
                    }
                },
            };

            if !updates.is_empty() {
                debug!(account_id, count = updates.len(), "got telegram updates");
            }
            for update in updates {
                offset = update.id.as_offset();
                #[cfg(feature = "metrics")]
                counter!(
                    tg_metrics::UPDATES_RECEIVED_TOTAL,
                    labels::ACCOUNT_ID => state.account_id.clone()
                )
                .increment(1);
                match update.kind {
                    UpdateKind::Message(msg) => handlers::handle_message(&msg, &state),
                    UpdateKind::CallbackQuery(query) => {
                        handlers::handle_callback_query(query, &state).await;
                    },
                    other => debug!(account_id, "ignoring update: {other:?}"),
                }
            }
        }
    })
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::testing::MockTelegramApi,
        lorebot_dialogs::{
            Dispatcher,
            memory::MemoryStore,
            render::{EntryDocument, RenderError, RenderedDocument, Renderer},
            store::Stores,
        },
        serde_json::json,
    };

    struct NoRenderer;

    impl Renderer for NoRenderer {
        fn render(
            &self,
            _doc: &EntryDocument<'_>,
        ) -> std::result::Result<RenderedDocument, RenderError> {
            Err(RenderError::Failed("not in this test".into()))
        }
    }

    fn state_for(api: &MockTelegramApi, config: TelegramAccountConfig) -> Arc<AccountState> {
        let bot = api.bot();
        let connection = Connection {
            account_id: "test".into(),
            bot: bot.clone(),
            bot_username: Some("lorebot".into()),
            config,
        };
        let dispatcher = Arc::new(Dispatcher::new(
            Stores::from_backend(Arc::new(MemoryStore::new())),
            Arc::new(NoRenderer),
            connection.outbound(),
        ));
        let lanes = Arc::new(UserLanes::new(
            dispatcher,
            Duration::from_secs(60),
            CancellationToken::new(),
        ));
        Arc::new(connection.into_state(lanes))
    }

    fn help_update(update_id: i64, user_id: i64) -> serde_json::Value {
        json!({
            "update_id": update_id,
            "message": {
                "message_id": 5,
                "date": 1,
                "chat": { "id": user_id, "type": "private", "first_name": "Mira" },
                "from": { "id": user_id, "is_bot": false, "first_name": "Mira" },
                "text": "/help"
            }
        })
    }

    #[tokio::test]
    async fn polled_messages_are_answered_and_offset_advances() {
        let api = MockTelegramApi::start().await;
        api.push_updates(json!([help_update(7, 42)]));
        let state = state_for(&api, TelegramAccountConfig::default());
        let cancel = CancellationToken::new();
        let task = spawn_polling(Arc::clone(&state), cancel.clone());

        let sent = api.wait_for("SendMessage", 1).await;
        assert_eq!(sent[0]["chat_id"], 42);

        let polls = api.wait_for("GetUpdates", 2).await;
        assert_eq!(polls[1]["offset"], 8);

        cancel.cancel();
        task.await.unwrap().unwrap();
        state.lanes.shutdown(Duration::from_secs(1)).await;
        api.shutdown().await;
    }

    #[tokio::test]
    async fn denied_senders_get_no_reply() {
        let api = MockTelegramApi::start().await;
        api.push_updates(json!([help_update(1, 99)]));
        let config = TelegramAccountConfig {
            dm_policy: crate::access::DmPolicy::Allowlist,
            allowlist: vec!["42".into()],
            ..Default::default()
        };
        let state = state_for(&api, config);
        let cancel = CancellationToken::new();
        let task = spawn_polling(Arc::clone(&state), cancel.clone());

        api.wait_for("GetUpdates", 3).await;
        assert!(api.calls("SendMessage").is_empty());

        cancel.cancel();
        task.await.unwrap().unwrap();
        api.shutdown().await;
    }
}
