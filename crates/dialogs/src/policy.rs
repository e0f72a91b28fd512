//! Cancellation, conflict and failure handling shared by the dispatcher.

use {lorebot_common::UserId, tracing::error};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, dialogs as dialog_metrics, labels};

use crate::{
    command::CommandKind,
    error::Error,
    factory::StartRejected,
    i18n::MessageKey,
    registry::SessionRegistry,
    reply::Reply,
    session::Session,
};

/// Remove the caller's session, if any, and produce the single
/// acknowledgement. Cancelling twice is harmless.
pub fn cancel(registry: &SessionRegistry, user: UserId) -> (Option<CommandKind>, Reply) {
    match registry.remove(user) {
        Some(session) => {
            #[cfg(feature = "metrics")]
            counter!(
                dialog_metrics::CANCELLATIONS_TOTAL,
                labels::COMMAND => session.kind.name()
            )
            .increment(1);
            (
                Some(session.kind),
                Reply::key(MessageKey::Cancelled).arg("command", session.kind),
            )
        },
        None => (None, Reply::key(MessageKey::NothingToCancel)),
    }
}

/// A second command while one is active: warn and keep the existing session.
pub fn conflict(active: CommandKind) -> Reply {
    #[cfg(feature = "metrics")]
    counter!(dialog_metrics::CONFLICTS_TOTAL, labels::COMMAND => active.name()).increment(1);
    Reply::key(MessageKey::AlreadyActive).arg("command", active)
}

pub fn rejected(rejection: &StartRejected) -> Reply {
    match rejection {
        StartRejected::UnknownCommand { name } => {
            Reply::key(MessageKey::UnknownCommand).arg("command", name)
        },
        StartRejected::Unauthorized { kind, .. } => {
            #[cfg(feature = "metrics")]
            counter!(dialog_metrics::UNAUTHORIZED_TOTAL, labels::COMMAND => kind.name())
                .increment(1);
            Reply::key(MessageKey::Unauthorized).arg("command", kind)
        },
    }
}

pub fn expired(kind: CommandKind) -> Reply {
    Reply::key(MessageKey::Expired).arg("command", kind)
}

/// The only text users see for unexpected failures.
pub fn generic_error() -> Reply {
    Reply::key(MessageKey::GenericError)
}

/// Log an unexpected failure with enough context to diagnose it.
pub fn report_failure(error: &Error, session: Option<&Session>, user: UserId) {
    match session {
        Some(session) => error!(
            user = %user,
            command = session.kind.name(),
            step = %session.step,
            error = %error,
            kind = error.kind(),
            "command failed"
        ),
        None => error!(user = %user, error = %error, kind = error.kind(), "dispatch failed"),
    }
}
