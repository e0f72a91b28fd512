//! Per-user command sessions.

use std::{fmt, time::Instant};

use lorebot_common::{ChatId, EntryId, TopicId, UserId};

use crate::{
    command::{CommandDescriptor, CommandKind},
    error::{Context, Error, Result},
    event::ImageRef,
    store::{Category, Entry, Topic},
};

/// One point in a command's step sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Step {
    SelectTopic,
    SelectEntry,
    EnterName,
    EnterContent,
    AttachImage,
    Confirm,
    EnterTopicName,
    EnterUser,
    SelectRole,
}

impl Step {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::SelectTopic => "select_topic",
            Self::SelectEntry => "select_entry",
            Self::EnterName => "enter_name",
            Self::EnterContent => "enter_content",
            Self::AttachImage => "attach_image",
            Self::Confirm => "confirm",
            Self::EnterTopicName => "enter_topic_name",
            Self::EnterUser => "enter_user",
            Self::SelectRole => "select_role",
        }
    }
}

impl fmt::Display for Step {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicRef {
    pub id: TopicId,
    pub name: String,
}

impl From<&Topic> for TopicRef {
    fn from(topic: &Topic) -> Self {
        Self {
            id: topic.id,
            name: topic.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryRef {
    pub id: EntryId,
    pub name: String,
}

impl From<&Entry> for EntryRef {
    fn from(entry: &Entry) -> Self {
        Self {
            id: entry.id,
            name: entry.name.clone(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRef {
    pub id: UserId,
    pub display_name: String,
}

/// Values collected by earlier steps.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Accumulated {
    pub category: Category,
    pub topic: Option<TopicRef>,
    pub entry: Option<EntryRef>,
    pub name: Option<String>,
    pub content: Option<String>,
    pub image: Option<ImageRef>,
    pub target_user: Option<UserRef>,
}

impl Accumulated {
    #[must_use]
    pub fn with_topic(&self, topic: TopicRef) -> Self {
        Self {
            topic: Some(topic),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_entry(&self, entry: EntryRef) -> Self {
        Self {
            entry: Some(entry),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_name(&self, name: String) -> Self {
        Self {
            name: Some(name),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_content(&self, content: String) -> Self {
        Self {
            content: Some(content),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_image(&self, image: ImageRef) -> Self {
        Self {
            image: Some(image),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn with_target_user(&self, user: UserRef) -> Self {
        Self {
            target_user: Some(user),
            ..self.clone()
        }
    }
}

/// An in-progress multi-step command owned by one user.
///
/// Sessions are values: a step computes the successor with [`Session::advance`]
/// and the registry swaps it in. The registry hands out clones, so a session
/// held by a running step never observes concurrent changes.
#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub user_id: UserId,
    pub chat_id: ChatId,
    pub kind: CommandKind,
    pub step: Step,
    pub accumulated: Accumulated,
    /// Set once the session has left the registry.
    pub terminal: bool,
    pub started_at: Instant,
    pub updated_at: Instant,
}

impl Session {
    /// A fresh session at the command's first step.
    pub fn start(
        kind: CommandKind,
        user_id: UserId,
        chat_id: ChatId,
        accumulated: Accumulated,
    ) -> Self {
        let now = Instant::now();
        Self {
            user_id,
            chat_id,
            kind,
            step: kind.descriptor().first_step(),
            accumulated,
            terminal: false,
            started_at: now,
            updated_at: now,
        }
    }

    pub fn descriptor(&self) -> &'static CommandDescriptor {
        self.kind.descriptor()
    }

    /// The successor session at `next`. Only the step immediately after the
    /// current one in the command's sequence is accepted.
    pub fn advance(&self, next: Step, accumulated: Accumulated) -> Result<Session> {
        let descriptor = self.descriptor();
        if self.terminal || descriptor.successor(self.step) != Some(next) {
            return Err(Error::InvalidStep {
                command: descriptor.name,
                from: self.step.as_str(),
                to: next.as_str(),
            });
        }
        Ok(Self {
            step: next,
            accumulated,
            updated_at: Instant::now(),
            ..self.clone()
        })
    }

    /// Whether the current step is the command's final one.
    pub fn at_last_step(&self) -> bool {
        self.descriptor().successor(self.step).is_none()
    }

    pub fn topic(&self) -> Result<&TopicRef> {
        self.accumulated
            .topic
            .as_ref()
            .with_context(|| self.missing_value("topic"))
    }

    pub fn entry(&self) -> Result<&EntryRef> {
        self.accumulated
            .entry
            .as_ref()
            .with_context(|| self.missing_value("entry"))
    }

    pub fn name(&self) -> Result<&str> {
        self.accumulated
            .name
            .as_deref()
            .with_context(|| self.missing_value("name"))
    }

    pub fn content(&self) -> Result<&str> {
        self.accumulated
            .content
            .as_deref()
            .with_context(|| self.missing_value("content"))
    }

    pub fn target_user(&self) -> Result<&UserRef> {
        self.accumulated
            .target_user
            .as_ref()
            .with_context(|| self.missing_value("target user"))
    }

    fn missing_value(&self, what: &str) -> String {
        format!("/{} at {} has no {what}", self.descriptor().name, self.step)
    }
}
