//! Per-command state machines.
//!
//! A flow never mutates the session it is given. It inspects the current step
//! and the event, consults the stores when it needs to, and returns a
//! [`StepOutcome`] describing the successor session, the replies and any
//! domain effects. The dispatcher applies the outcome.

mod delete_entry;
mod edit_entry;
mod entry_image;
mod new_entry;
mod new_topic;
mod set_role;
mod subscription;

pub use {
    delete_entry::DeleteEntryFlow,
    edit_entry::EditEntryFlow,
    entry_image::EntryImageFlow,
    new_entry::NewEntryFlow,
    new_topic::NewTopicFlow,
    set_role::SetRoleFlow,
    subscription::{SubscribeFlow, UnsubscribeFlow},
};

use {async_trait::async_trait, lorebot_common::UserIdentity};

use crate::{
    effects::DomainEffect,
    error::{Error, Result},
    event::{CallbackData, Event},
    i18n::MessageKey,
    reply::{Button, Keyboard, Reply},
    session::{Accumulated, Session, Step, TopicRef},
    store::{Category, Entry, Stores, Topic},
    validate::ValidationError,
};

/// What a step needs besides the session and the event.
pub struct StepContext<'a> {
    pub stores: &'a Stores,
    pub identity: &'a UserIdentity,
}

#[derive(Debug)]
pub enum StepOutcome {
    /// Replies only; the session stays where it is.
    Prompt(Vec<Reply>),
    /// Move to the successor session.
    Advance {
        session: Session,
        replies: Vec<Reply>,
    },
    /// The command is finished. Effects run after the session is removed and
    /// the replies are sent only if they all succeed.
    Complete {
        replies: Vec<Reply>,
        effects: Vec<DomainEffect>,
    },
    /// Recoverable input error; the session stays at its current step.
    Reject {
        error: ValidationError,
        replies: Vec<Reply>,
    },
    /// Something the command depends on is gone; the session is removed.
    Fail { replies: Vec<Reply>, error: Error },
    /// The event does not fit the current step.
    Ignore,
}

impl StepOutcome {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Prompt(_) => "prompt",
            Self::Advance { .. } => "advance",
            Self::Complete { .. } => "complete",
            Self::Reject { .. } => "reject",
            Self::Fail { .. } => "fail",
            Self::Ignore => "ignore",
        }
    }

    pub(crate) fn reject(error: ValidationError) -> Self {
        Self::Reject {
            error,
            replies: Vec::new(),
        }
    }

    pub(crate) fn complete(reply: Reply, effects: Vec<DomainEffect>) -> Self {
        Self::Complete {
            replies: vec![reply],
            effects,
        }
    }

    /// Finish without side effects.
    pub(crate) fn notice(reply: Reply) -> Self {
        Self::complete(reply, Vec::new())
    }
}

#[async_trait]
pub trait Flow: Send + Sync {
    /// Runs once, right after the session is created at its first step.
    async fn enter(&self, ctx: &StepContext<'_>, session: &Session) -> Result<StepOutcome>;

    /// Consume one event at the session's current step.
    async fn step(
        &self,
        ctx: &StepContext<'_>,
        session: &Session,
        event: &Event,
    ) -> Result<StepOutcome>;
}

pub(crate) fn advance(
    session: &Session,
    next: Step,
    accumulated: Accumulated,
    reply: Reply,
) -> Result<StepOutcome> {
    Ok(StepOutcome::Advance {
        session: session.advance(next, accumulated)?,
        replies: vec![reply],
    })
}

/// A selection made through an inline button.
pub(crate) enum Picked<T> {
    Found(T),
    /// The button named something that has since been deleted.
    Gone(StepOutcome),
    /// Not a selection this step offered.
    NotOffered,
}

pub(crate) fn topic_keyboard(topics: &[Topic]) -> Keyboard {
    Keyboard::column(
        topics
            .iter()
            .map(|t| Button::new(t.name.clone(), CallbackData::Topic(t.id))),
    )
}

pub(crate) fn entry_keyboard(entries: &[Entry]) -> Keyboard {
    Keyboard::column(entries.iter().map(|e| {
        let label = match e.category {
            Category::Standard => e.name.clone(),
            Category::Ranking => format!("★ {}", e.name),
        };
        Button::new(label, CallbackData::Entry(e.id))
    }))
}

/// Entry prompt shared by the commands that start by choosing a topic.
pub(crate) async fn prompt_for_topic(ctx: &StepContext<'_>) -> Result<StepOutcome> {
    let topics = ctx
        .stores
        .topics
        .list_topics()
        .await
        .map_err(Error::Persistence)?;
    if topics.is_empty() {
        return Ok(StepOutcome::notice(Reply::key(MessageKey::NoTopics)));
    }
    Ok(StepOutcome::Prompt(vec![
        Reply::key(MessageKey::ChooseTopic).with_keyboard(topic_keyboard(&topics)),
    ]))
}

pub(crate) async fn pick_topic(ctx: &StepContext<'_>, event: &Event) -> Result<Picked<Topic>> {
    let Some(CallbackData::Topic(id)) = event.callback() else {
        return Ok(Picked::NotOffered);
    };
    match ctx
        .stores
        .topics
        .get_topic(id)
        .await
        .map_err(Error::Persistence)?
    {
        Some(topic) => Ok(Picked::Found(topic)),
        None => Ok(Picked::Gone(StepOutcome::Fail {
            replies: vec![Reply::key(MessageKey::TopicNotFound)],
            error: Error::missing(format!("topic {id}")),
        })),
    }
}

/// Pick an entry of the topic chosen earlier in the session.
pub(crate) async fn pick_entry(
    ctx: &StepContext<'_>,
    session: &Session,
    event: &Event,
) -> Result<Picked<Entry>> {
    let Some(CallbackData::Entry(id)) = event.callback() else {
        return Ok(Picked::NotOffered);
    };
    let topic = session.topic()?;
    match ctx
        .stores
        .entries
        .get_entry(id)
        .await
        .map_err(Error::Persistence)?
    {
        Some(entry) if entry.topic_id == topic.id => Ok(Picked::Found(entry)),
        Some(_) => Ok(Picked::NotOffered),
        None => Ok(Picked::Gone(StepOutcome::Fail {
            replies: vec![Reply::key(MessageKey::EntryNotFound)],
            error: Error::missing(format!("entry {id}")),
        })),
    }
}

/// After a topic was picked: list its entries and move to entry selection,
/// or finish with a notice when the topic is empty.
pub(crate) async fn advance_to_entry_selection(
    ctx: &StepContext<'_>,
    session: &Session,
    topic: &Topic,
) -> Result<StepOutcome> {
    let entries = ctx
        .stores
        .entries
        .list_entries(topic.id)
        .await
        .map_err(Error::Persistence)?;
    if entries.is_empty() {
        return Ok(StepOutcome::notice(
            Reply::key(MessageKey::NoEntries).arg("topic", &topic.name),
        ));
    }
    advance(
        session,
        Step::SelectEntry,
        session.accumulated.with_topic(TopicRef::from(topic)),
        Reply::key(MessageKey::ChooseEntry)
            .arg("topic", &topic.name)
            .with_keyboard(entry_keyboard(&entries)),
    )
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use {
        super::*,
        crate::{
            command::CommandKind,
            memory::MemoryStore,
            store::{EntryStore, NewEntry, NewTopic, TopicStore},
            validate::name_key,
        },
        lorebot_common::{ChatId, Role, UserId},
    };

    pub struct Fixture {
        pub store: Arc<MemoryStore>,
        pub stores: Stores,
        pub identity: UserIdentity,
    }

    impl Fixture {
        pub fn new(role: Role) -> Self {
            let store = Arc::new(MemoryStore::new());
            Self {
                stores: Stores::from_backend(Arc::clone(&store)),
                store,
                identity: UserIdentity::new(UserId(42), "Mira", role),
            }
        }

        pub fn ctx(&self) -> StepContext<'_> {
            StepContext {
                stores: &self.stores,
                identity: &self.identity,
            }
        }

        pub fn session(&self, kind: CommandKind) -> Session {
            Session::start(kind, self.identity.id, ChatId(42), kind.seed(&[]))
        }

        pub async fn topic(&self, name: &str) -> Topic {
            self.store
                .create_topic(NewTopic {
                    name: name.into(),
                    name_key: name_key(name),
                })
                .await
                .unwrap_or_else(|e| panic!("create topic: {e}"))
        }

        pub async fn entry(&self, topic: &Topic, name: &str, category: Category) -> Entry {
            self.store
                .create_entry(NewEntry {
                    topic_id: topic.id,
                    name: name.into(),
                    name_key: name_key(name),
                    content: format!("{name} lore"),
                    category,
                    author: self.identity.id,
                })
                .await
                .unwrap_or_else(|e| panic!("create entry: {e}"))
        }
    }

    pub fn text(value: &str) -> Event {
        Event::Text {
            value: value.into(),
        }
    }

    pub fn tap(data: CallbackData) -> Event {
        Event::Callback {
            data: data.to_string(),
        }
    }

    /// The successor session of an `Advance` outcome.
    pub fn advanced(outcome: StepOutcome) -> Session {
        match outcome {
            StepOutcome::Advance { session, .. } => session,
            other => panic!("expected advance, got {}", other.kind()),
        }
    }

    pub fn first_key(replies: &[Reply]) -> Option<MessageKey> {
        replies.first().and_then(Reply::message_key)
    }
}
