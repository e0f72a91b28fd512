//! Session dispatch core.
//!
//! Inbound chat notifications are classified into [`Event`]s and routed to
//! the caller's in-progress command [`Session`], which advances exactly one
//! step per event. The [`SessionRegistry`] holds at most one session per user;
//! [`UserLanes`] keeps each user's events in receipt order while different
//! users proceed concurrently.
//!
//! Storage, rendering, localization and the chat transport are collaborators
//! reached through the traits in [`store`], [`render`], [`i18n`] and
//! [`outbound`].

pub mod command;
pub mod dispatch;
pub mod effects;
pub mod error;
pub mod event;
pub mod factory;
pub mod flows;
pub mod i18n;
pub mod identity;
pub mod lanes;
pub mod memory;
pub mod outbound;
pub mod policy;
pub mod registry;
pub mod render;
pub mod reply;
pub mod search;
pub mod session;
pub mod store;
pub mod validate;

#[cfg(test)]
pub(crate) mod testing;

pub use {
    command::{CommandDescriptor, CommandKind},
    dispatch::{Dispatched, Dispatcher},
    error::{Error, Result},
    event::{Event, ImageRef, Inbound, InboundPayload, Sender},
    lanes::UserLanes,
    registry::{Claim, SessionRegistry},
    session::{Accumulated, Session, Step},
};
