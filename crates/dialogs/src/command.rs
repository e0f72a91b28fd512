//! The multi-step command table.

use std::fmt;

use lorebot_common::Role;

use crate::{
    flows::{
        DeleteEntryFlow, EditEntryFlow, EntryImageFlow, Flow, NewEntryFlow, NewTopicFlow,
        SetRoleFlow, SubscribeFlow, UnsubscribeFlow,
    },
    i18n::MessageKey,
    session::{Accumulated, Step},
    store::Category,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    NewEntry,
    EditEntry,
    EntryImage,
    DeleteEntry,
    NewTopic,
    Subscribe,
    Unsubscribe,
    SetRole,
}

/// Static description of a multi-step command.
pub struct CommandDescriptor {
    pub kind: CommandKind,
    /// Command word without the leading slash.
    pub name: &'static str,
    pub required_role: Role,
    /// Step sequence; a session only ever moves to the next element.
    pub steps: &'static [Step],
    pub summary: MessageKey,
    pub flow: &'static dyn Flow,
}

impl CommandDescriptor {
    pub fn first_step(&self) -> Step {
        self.steps.first().copied().unwrap_or(Step::SelectTopic)
    }

    pub fn successor(&self, step: Step) -> Option<Step> {
        let position = self.steps.iter().position(|s| *s == step)?;
        self.steps.get(position + 1).copied()
    }
}

impl fmt::Debug for CommandDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CommandDescriptor")
            .field("name", &self.name)
            .field("required_role", &self.required_role)
            .field("steps", &self.steps)
            .finish_non_exhaustive()
    }
}

static NEW_ENTRY: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::NewEntry,
    name: "newentry",
    required_role: Role::Editor,
    steps: &[Step::SelectTopic, Step::EnterName, Step::EnterContent],
    summary: MessageKey::HelpNewEntry,
    flow: &NewEntryFlow,
};

static EDIT_ENTRY: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::EditEntry,
    name: "editentry",
    required_role: Role::Editor,
    steps: &[
        Step::SelectTopic,
        Step::SelectEntry,
        Step::EnterContent,
        Step::AttachImage,
    ],
    summary: MessageKey::HelpEditEntry,
    flow: &EditEntryFlow,
};

static ENTRY_IMAGE: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::EntryImage,
    name: "entryimage",
    required_role: Role::Editor,
    steps: &[Step::SelectTopic, Step::SelectEntry, Step::AttachImage],
    summary: MessageKey::HelpEntryImage,
    flow: &EntryImageFlow,
};

static DELETE_ENTRY: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::DeleteEntry,
    name: "deleteentry",
    required_role: Role::Admin,
    steps: &[Step::SelectTopic, Step::SelectEntry, Step::Confirm],
    summary: MessageKey::HelpDeleteEntry,
    flow: &DeleteEntryFlow,
};

static NEW_TOPIC: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::NewTopic,
    name: "newtopic",
    required_role: Role::Admin,
    steps: &[Step::EnterTopicName],
    summary: MessageKey::HelpNewTopic,
    flow: &NewTopicFlow,
};

static SUBSCRIBE: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::Subscribe,
    name: "subscribe",
    required_role: Role::Viewer,
    steps: &[Step::SelectTopic],
    summary: MessageKey::HelpSubscribe,
    flow: &SubscribeFlow,
};

static UNSUBSCRIBE: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::Unsubscribe,
    name: "unsubscribe",
    required_role: Role::Viewer,
    steps: &[Step::SelectTopic],
    summary: MessageKey::HelpUnsubscribe,
    flow: &UnsubscribeFlow,
};

static SET_ROLE: CommandDescriptor = CommandDescriptor {
    kind: CommandKind::SetRole,
    name: "setrole",
    required_role: Role::Admin,
    steps: &[Step::EnterUser, Step::SelectRole],
    summary: MessageKey::HelpSetRole,
    flow: &SetRoleFlow,
};

/// Every multi-step command, in help order.
pub static DESCRIPTORS: [&CommandDescriptor; 8] = [
    &NEW_ENTRY,
    &EDIT_ENTRY,
    &ENTRY_IMAGE,
    &DELETE_ENTRY,
    &NEW_TOPIC,
    &SUBSCRIBE,
    &UNSUBSCRIBE,
    &SET_ROLE,
];

impl CommandKind {
    pub fn descriptor(self) -> &'static CommandDescriptor {
        match self {
            Self::NewEntry => &NEW_ENTRY,
            Self::EditEntry => &EDIT_ENTRY,
            Self::EntryImage => &ENTRY_IMAGE,
            Self::DeleteEntry => &DELETE_ENTRY,
            Self::NewTopic => &NEW_TOPIC,
            Self::Subscribe => &SUBSCRIBE,
            Self::Unsubscribe => &UNSUBSCRIBE,
            Self::SetRole => &SET_ROLE,
        }
    }

    pub fn name(self) -> &'static str {
        self.descriptor().name
    }

    pub fn from_name(name: &str) -> Option<Self> {
        DESCRIPTORS
            .iter()
            .find(|d| d.name == name)
            .map(|d| d.kind)
    }

    /// Initial accumulated values derived from the command arguments.
    /// Unrecognized arguments are ignored.
    pub fn seed(self, args: &[String]) -> Accumulated {
        let category = match self {
            Self::NewEntry => args
                .first()
                .and_then(|arg| arg.parse::<Category>().ok())
                .unwrap_or_default(),
            _ => Category::Standard,
        };
        Accumulated {
            category,
            ..Accumulated::default()
        }
    }
}

impl fmt::Display for CommandKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Stateless commands handled before any session lookup.
pub const CANCEL: &str = "cancel";
pub const HELP: &str = "help";
pub const START: &str = "start";
