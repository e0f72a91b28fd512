//! Domain effects: the persistence and delivery work a completed command
//! asks for. They run after the session has been removed.

use std::sync::Arc;

use {
    lorebot_common::{ChatId, Role, UserId, UserIdentity},
    tracing::{debug, info, warn},
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, dialogs as dialog_metrics, labels};

use crate::{
    error::{Error, Result},
    event::ImageRef,
    i18n::{Localizer, MessageKey},
    outbound::{ChatOutbound, OutboundMessage},
    render::{EntryDocument, RenderedDocument, Renderer},
    session::{EntryRef, TopicRef},
    store::{Category, Entry, EntryImage, NewEntry, NewTopic, Stores, now_epoch},
    validate::name_key,
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DomainEffect {
    /// Persist the entry, send its document to the author and notify the
    /// topic's subscribers.
    CreateEntry {
        topic: TopicRef,
        name: String,
        content: String,
        category: Category,
    },
    UpdateEntry {
        entry: EntryRef,
        content: String,
        image: Option<ImageRef>,
    },
    SetEntryImage {
        entry: EntryRef,
        image: ImageRef,
    },
    DeleteEntry {
        entry: EntryRef,
    },
    CreateTopic {
        name: String,
    },
    Subscribe {
        topic: TopicRef,
    },
    Unsubscribe {
        topic: TopicRef,
    },
    SetRole {
        user: UserId,
        role: Role,
    },
}

impl DomainEffect {
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CreateEntry { .. } => "create_entry",
            Self::UpdateEntry { .. } => "update_entry",
            Self::SetEntryImage { .. } => "set_entry_image",
            Self::DeleteEntry { .. } => "delete_entry",
            Self::CreateTopic { .. } => "create_topic",
            Self::Subscribe { .. } => "subscribe",
            Self::Unsubscribe { .. } => "unsubscribe",
            Self::SetRole { .. } => "set_role",
        }
    }
}

/// Applies effects against the stores and delivers rendered documents.
#[derive(Clone)]
pub struct EffectRunner {
    stores: Stores,
    renderer: Arc<dyn Renderer>,
    outbound: Arc<dyn ChatOutbound>,
    localizer: Arc<dyn Localizer>,
}

impl EffectRunner {
    pub fn new(
        stores: Stores,
        renderer: Arc<dyn Renderer>,
        outbound: Arc<dyn ChatOutbound>,
        localizer: Arc<dyn Localizer>,
    ) -> Self {
        Self {
            stores,
            renderer,
            outbound,
            localizer,
        }
    }

    pub fn set_localizer(&mut self, localizer: Arc<dyn Localizer>) {
        self.localizer = localizer;
    }

    pub async fn apply(
        &self,
        actor: &UserIdentity,
        chat: ChatId,
        effect: DomainEffect,
    ) -> Result<()> {
        let kind = effect.kind();
        let result = self.apply_inner(actor, chat, effect).await;
        match &result {
            Ok(()) => debug!(user = %actor.id, effect = kind, "effect applied"),
            Err(e) => {
                warn!(user = %actor.id, effect = kind, error = %e, "effect failed");
                #[cfg(feature = "metrics")]
                counter!(
                    dialog_metrics::EFFECT_ERRORS_TOTAL,
                    labels::KIND => kind,
                    labels::ERROR_TYPE => e.kind()
                )
                .increment(1);
            },
        }
        result
    }

    async fn apply_inner(
        &self,
        actor: &UserIdentity,
        chat: ChatId,
        effect: DomainEffect,
    ) -> Result<()> {
        match effect {
            DomainEffect::CreateEntry {
                topic,
                name,
                content,
                category,
            } => {
                let rendered = self.render(&EntryDocument {
                    topic: &topic.name,
                    name: &name,
                    content: &content,
                    category,
                    image: None,
                    updated_at: now_epoch(),
                })?;
                let entry = self
                    .stores
                    .entries
                    .create_entry(NewEntry {
                        topic_id: topic.id,
                        name_key: name_key(&name),
                        name,
                        content,
                        category,
                        author: actor.id,
                    })
                    .await
                    .map_err(Error::Persistence)?;
                info!(user = %actor.id, entry = %entry.id, topic = %topic.id, "entry created");
                self.deliver(chat, &entry, &rendered).await;
                self.notify_subscribers(actor.id, &topic, &entry).await;
            },
            DomainEffect::UpdateEntry {
                entry,
                content,
                image,
            } => {
                let current = self.current_entry(&entry).await?;
                let topic = self.topic_name(&current).await?;
                let fresh = match image {
                    Some(image) => Some(self.fetch_image(&current, &image).await?),
                    None => None,
                };
                let stored = match &fresh {
                    Some(_) => None,
                    None => self
                        .stores
                        .images
                        .get_image(current.id)
                        .await
                        .map_err(Error::Persistence)?,
                };
                let rendered = self.render(&EntryDocument {
                    topic: &topic,
                    name: &current.name,
                    content: &content,
                    category: current.category,
                    image: fresh.as_ref().or(stored.as_ref()),
                    updated_at: now_epoch(),
                })?;
                if let Some(fresh) = fresh {
                    self.stores
                        .images
                        .put_image(fresh)
                        .await
                        .map_err(Error::Persistence)?;
                }
                let updated = self
                    .stores
                    .entries
                    .update_entry_content(entry.id, &content)
                    .await
                    .map_err(Error::Persistence)?
                    .ok_or_else(|| Error::missing(format!("entry {}", entry.id)))?;
                info!(user = %actor.id, entry = %entry.id, "entry updated");
                self.deliver(chat, &updated, &rendered).await;
            },
            DomainEffect::SetEntryImage { entry, image } => {
                let current = self.current_entry(&entry).await?;
                let topic = self.topic_name(&current).await?;
                let fresh = self.fetch_image(&current, &image).await?;
                let rendered = self.render(&EntryDocument {
                    topic: &topic,
                    name: &current.name,
                    content: &current.content,
                    category: current.category,
                    image: Some(&fresh),
                    updated_at: current.updated_at,
                })?;
                self.stores
                    .images
                    .put_image(fresh)
                    .await
                    .map_err(Error::Persistence)?;
                info!(user = %actor.id, entry = %entry.id, "entry image set");
                self.deliver(chat, &current, &rendered).await;
            },
            DomainEffect::DeleteEntry { entry } => {
                self.stores
                    .images
                    .delete_image(entry.id)
                    .await
                    .map_err(Error::Persistence)?;
                let deleted = self
                    .stores
                    .entries
                    .delete_entry(entry.id)
                    .await
                    .map_err(Error::Persistence)?;
                if !deleted {
                    return Err(Error::missing(format!("entry {}", entry.id)));
                }
                info!(user = %actor.id, entry = %entry.id, "entry deleted");
            },
            DomainEffect::CreateTopic { name } => {
                let topic = self
                    .stores
                    .topics
                    .create_topic(NewTopic {
                        name_key: name_key(&name),
                        name,
                    })
                    .await
                    .map_err(Error::Persistence)?;
                info!(user = %actor.id, topic = %topic.id, "topic created");
            },
            DomainEffect::Subscribe { topic } => {
                self.stores
                    .subscriptions
                    .subscribe(actor.id, topic.id)
                    .await
                    .map_err(Error::Persistence)?;
            },
            DomainEffect::Unsubscribe { topic } => {
                self.stores
                    .subscriptions
                    .unsubscribe(actor.id, topic.id)
                    .await
                    .map_err(Error::Persistence)?;
            },
            DomainEffect::SetRole { user, role } => {
                let known = self
                    .stores
                    .users
                    .set_role(user, role)
                    .await
                    .map_err(Error::Persistence)?;
                if !known {
                    return Err(Error::missing(format!("user {user}")));
                }
                info!(user = %actor.id, target = %user, role = %role, "role changed");
            },
        }
        Ok(())
    }

    async fn current_entry(&self, entry: &EntryRef) -> Result<Entry> {
        self.stores
            .entries
            .get_entry(entry.id)
            .await
            .map_err(Error::Persistence)?
            .ok_or_else(|| Error::missing(format!("entry {}", entry.id)))
    }

    async fn topic_name(&self, entry: &Entry) -> Result<String> {
        self.stores
            .topics
            .get_topic(entry.topic_id)
            .await
            .map_err(Error::Persistence)?
            .map(|topic| topic.name)
            .ok_or_else(|| Error::missing(format!("topic {}", entry.topic_id)))
    }

    async fn fetch_image(&self, entry: &Entry, image: &ImageRef) -> Result<EntryImage> {
        let data = self
            .outbound
            .fetch_image(image)
            .await
            .map_err(Error::Transport)?;
        Ok(EntryImage {
            entry_id: entry.id,
            media_type: image.media_type.clone(),
            data,
        })
    }

    fn render(&self, document: &EntryDocument<'_>) -> Result<RenderedDocument> {
        Ok(self.renderer.render(document)?)
    }

    /// Delivery is best effort; the entry is already stored.
    async fn deliver(&self, chat: ChatId, entry: &Entry, rendered: &RenderedDocument) {
        if let Err(e) = self
            .outbound
            .send_document(chat, rendered, Some(&entry.name))
            .await
        {
            warn!(chat = %chat, entry = %entry.id, error = %e, "failed to send entry document");
        }
    }

    /// Render a stored entry with its current image and send it.
    pub async fn send_entry(&self, chat: ChatId, entry: &Entry, topic: &str) -> Result<()> {
        let image = self
            .stores
            .images
            .get_image(entry.id)
            .await
            .map_err(Error::Persistence)?;
        let rendered = self.render(&EntryDocument {
            topic,
            name: &entry.name,
            content: &entry.content,
            category: entry.category,
            image: image.as_ref(),
            updated_at: entry.updated_at,
        })?;
        self.deliver(chat, entry, &rendered).await;
        Ok(())
    }

    /// Tell every subscriber of the topic except the author. Failures are
    /// logged and skipped.
    async fn notify_subscribers(&self, author: UserId, topic: &TopicRef, entry: &Entry) {
        let subscribers = match self.stores.subscriptions.subscribers(topic.id).await {
            Ok(subscribers) => subscribers,
            Err(e) => {
                warn!(topic = %topic.id, error = %e, "failed to load subscribers");
                return;
            },
        };
        for subscriber in subscribers.into_iter().filter(|s| *s != author) {
            let language = match self.stores.users.get_user(subscriber).await {
                Ok(record) => record.and_then(|r| r.language),
                Err(e) => {
                    debug!(user = %subscriber, error = %e, "subscriber lookup failed");
                    None
                },
            };
            let text = self.localizer.translate(
                language.as_deref(),
                MessageKey::NewEntryNotice,
                &[("topic", topic.name.clone()), ("name", entry.name.clone())],
            );
            if let Err(e) = self
                .outbound
                .send_text(ChatId::from(subscriber), &OutboundMessage::text(text))
                .await
            {
                warn!(user = %subscriber, error = %e, "failed to notify subscriber");
            }
        }
    }
}
