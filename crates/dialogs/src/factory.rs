//! Builds a fresh session for a command, after the permission check.

use lorebot_common::{ChatId, Role, UserIdentity};

use crate::{command::CommandKind, session::Session};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StartRejected {
    UnknownCommand { name: String },
    Unauthorized { kind: CommandKind, required: Role },
}

/// Maps command names to new sessions. Holds no state; the command table is
/// static.
#[derive(Debug, Clone, Copy, Default)]
pub struct CommandFactory;

impl CommandFactory {
    /// New session at the command's first step. The command's entry prompt
    /// is produced separately by its flow.
    pub fn create(
        &self,
        name: &str,
        args: &[String],
        identity: &UserIdentity,
        chat_id: ChatId,
    ) -> Result<Session, StartRejected> {
        let kind = CommandKind::from_name(name).ok_or_else(|| StartRejected::UnknownCommand {
            name: name.to_string(),
        })?;
        let descriptor = kind.descriptor();
        if !identity.role.satisfies(descriptor.required_role) {
            return Err(StartRejected::Unauthorized {
                kind,
                required: descriptor.required_role,
            });
        }
        Ok(Session::start(kind, identity.id, chat_id, kind.seed(args)))
    }
}
