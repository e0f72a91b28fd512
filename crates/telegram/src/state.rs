use std::sync::Arc;

use lorebot_dialogs::UserLanes;

use crate::config::TelegramAccountConfig;

/// Per-account runtime state shared by the polling loop and handlers.
pub struct AccountState {
    pub account_id: String,
    pub bot: teloxide::Bot,
    pub bot_username: Option<String>,
    pub config: TelegramAccountConfig,
    pub lanes: Arc<UserLanes>,
}
