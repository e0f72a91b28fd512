//! Telegram transport for lorebot.
//!
//! Long-polls the Bot API with teloxide, turns messages and button taps into
//! dialog notifications, and implements [`lorebot_dialogs::outbound::ChatOutbound`]
//! for replies, documents and photo downloads.

pub mod access;
pub mod bot;
pub mod config;
pub mod error;
pub mod handlers;
pub mod outbound;
pub mod state;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    bot::{Connection, connect, register_commands, spawn_polling},
    config::TelegramAccountConfig,
    error::{Error, Result},
    outbound::TelegramOutbound,
    state::AccountState,
};
