//! In-process store, used for `run --ephemeral` and in tests.

use std::{
    collections::{BTreeMap, BTreeSet, HashMap},
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use {
    async_trait::async_trait,
    lorebot_common::{EntryId, Role, TopicId, UserId},
};

use crate::store::{
    Entry, EntryImage, EntryStore, ImageStore, NewEntry, NewTopic, SubscriptionStore, Topic,
    TopicStore, UserRecord, UserStore, now_epoch,
};

#[derive(Default)]
struct Inner {
    next_id: i64,
    topics: BTreeMap<TopicId, Topic>,
    entries: BTreeMap<EntryId, Entry>,
    images: HashMap<EntryId, EntryImage>,
    users: HashMap<UserId, UserRecord>,
    subscriptions: BTreeSet<(UserId, TopicId)>,
}

impl Inner {
    fn next_id(&mut self) -> i64 {
        self.next_id += 1;
        self.next_id
    }
}

#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<Inner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|e| e.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl TopicStore for MemoryStore {
    async fn list_topics(&self) -> anyhow::Result<Vec<Topic>> {
        let mut topics: Vec<Topic> = self.read().topics.values().cloned().collect();
        topics.sort_by(|a, b| a.name_key.cmp(&b.name_key));
        Ok(topics)
    }

    async fn get_topic(&self, id: TopicId) -> anyhow::Result<Option<Topic>> {
        Ok(self.read().topics.get(&id).cloned())
    }

    async fn find_topic_by_key(&self, name_key: &str) -> anyhow::Result<Option<Topic>> {
        Ok(self
            .read()
            .topics
            .values()
            .find(|t| t.name_key == name_key)
            .cloned())
    }

    async fn create_topic(&self, topic: NewTopic) -> anyhow::Result<Topic> {
        let mut inner = self.write();
        if inner.topics.values().any(|t| t.name_key == topic.name_key) {
            anyhow::bail!("topic {:?} already exists", topic.name);
        }
        let id = TopicId(inner.next_id());
        let created = Topic {
            id,
            name: topic.name,
            name_key: topic.name_key,
            created_at: now_epoch(),
        };
        inner.topics.insert(id, created.clone());
        Ok(created)
    }
}

#[async_trait]
impl EntryStore for MemoryStore {
    async fn list_entries(&self, topic: TopicId) -> anyhow::Result<Vec<Entry>> {
        let mut entries: Vec<Entry> = self
            .read()
            .entries
            .values()
            .filter(|e| e.topic_id == topic)
            .cloned()
            .collect();
        entries.sort_by(|a, b| {
            (a.category.as_str(), &a.name_key).cmp(&(b.category.as_str(), &b.name_key))
        });
        Ok(entries)
    }

    async fn get_entry(&self, id: EntryId) -> anyhow::Result<Option<Entry>> {
        Ok(self.read().entries.get(&id).cloned())
    }

    async fn search_entries(&self, fragment_key: &str, limit: usize) -> anyhow::Result<Vec<Entry>> {
        let mut hits: Vec<Entry> = self
            .read()
            .entries
            .values()
            .filter(|e| e.name_key.contains(fragment_key))
            .cloned()
            .collect();
        hits.sort_by(|a, b| a.name_key.cmp(&b.name_key));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn create_entry(&self, entry: NewEntry) -> anyhow::Result<Entry> {
        let mut inner = self.write();
        if !inner.topics.contains_key(&entry.topic_id) {
            anyhow::bail!("topic {} does not exist", entry.topic_id);
        }
        let taken = inner.entries.values().any(|e| {
            e.topic_id == entry.topic_id
                && e.category == entry.category
                && e.name_key == entry.name_key
        });
        if taken {
            anyhow::bail!("entry {:?} already exists in topic {}", entry.name, entry.topic_id);
        }
        let id = EntryId(inner.next_id());
        let now = now_epoch();
        let created = Entry {
            id,
            topic_id: entry.topic_id,
            name: entry.name,
            name_key: entry.name_key,
            content: entry.content,
            category: entry.category,
            author: entry.author,
            created_at: now,
            updated_at: now,
        };
        inner.entries.insert(id, created.clone());
        Ok(created)
    }

    async fn update_entry_content(
        &self,
        id: EntryId,
        content: &str,
    ) -> anyhow::Result<Option<Entry>> {
        let mut inner = self.write();
        Ok(inner.entries.get_mut(&id).map(|entry| {
            entry.content = content.to_string();
            entry.updated_at = now_epoch();
            entry.clone()
        }))
    }

    async fn delete_entry(&self, id: EntryId) -> anyhow::Result<bool> {
        let mut inner = self.write();
        inner.images.remove(&id);
        Ok(inner.entries.remove(&id).is_some())
    }
}

#[async_trait]
impl ImageStore for MemoryStore {
    async fn get_image(&self, entry: EntryId) -> anyhow::Result<Option<EntryImage>> {
        Ok(self.read().images.get(&entry).cloned())
    }

    async fn put_image(&self, image: EntryImage) -> anyhow::Result<()> {
        let mut inner = self.write();
        if !inner.entries.contains_key(&image.entry_id) {
            anyhow::bail!("entry {} does not exist", image.entry_id);
        }
        inner.images.insert(image.entry_id, image);
        Ok(())
    }

    async fn delete_image(&self, entry: EntryId) -> anyhow::Result<()> {
        self.write().images.remove(&entry);
        Ok(())
    }
}

#[async_trait]
impl UserStore for MemoryStore {
    async fn get_user(&self, id: UserId) -> anyhow::Result<Option<UserRecord>> {
        Ok(self.read().users.get(&id).cloned())
    }

    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<UserRecord>> {
        Ok(self
            .read()
            .users
            .values()
            .find(|u| {
                u.username
                    .as_deref()
                    .is_some_and(|name| name.eq_ignore_ascii_case(username))
            })
            .cloned())
    }

    async fn upsert_user(&self, user: UserRecord) -> anyhow::Result<()> {
        self.write().users.insert(user.id, user);
        Ok(())
    }

    async fn set_role(&self, id: UserId, role: Role) -> anyhow::Result<bool> {
        Ok(self
            .write()
            .users
            .get_mut(&id)
            .map(|user| user.role = role)
            .is_some())
    }
}

#[async_trait]
impl SubscriptionStore for MemoryStore {
    async fn subscribe(&self, user: UserId, topic: TopicId) -> anyhow::Result<bool> {
        Ok(self.write().subscriptions.insert((user, topic)))
    }

    async fn unsubscribe(&self, user: UserId, topic: TopicId) -> anyhow::Result<bool> {
        Ok(self.write().subscriptions.remove(&(user, topic)))
    }

    async fn subscribed_topics(&self, user: UserId) -> anyhow::Result<Vec<TopicId>> {
        Ok(self
            .read()
            .subscriptions
            .iter()
            .filter(|(u, _)| *u == user)
            .map(|(_, t)| *t)
            .collect())
    }

    async fn subscribers(&self, topic: TopicId) -> anyhow::Result<Vec<UserId>> {
        Ok(self
            .read()
            .subscriptions
            .iter()
            .filter(|(_, t)| *t == topic)
            .map(|(u, _)| *u)
            .collect())
    }
}
