//! Shared identifiers, roles, and error plumbing used across all lorebot crates.

pub mod error;
pub mod types;

pub use {
    error::{Error, FromMessage, Result},
    types::{ChatId, EntryId, Role, TopicId, UserId, UserIdentity},
};
