//! Persistence collaborators. Implementations live in `lorebot-store`
//! (SQLite) and [`crate::memory`] (in-process).

use std::{
    fmt,
    str::FromStr,
    sync::Arc,
    time::{SystemTime, UNIX_EPOCH},
};

use {
    async_trait::async_trait,
    lorebot_common::{EntryId, Role, TopicId, UserId},
    serde::{Deserialize, Serialize},
};

/// Entry category. Names are unique per topic and category.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    #[default]
    Standard,
    Ranking,
}

impl Category {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Standard => "standard",
            Self::Ranking => "ranking",
        }
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Category {
    type Err = lorebot_common::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "standard" => Ok(Self::Standard),
            "ranking" => Ok(Self::Ranking),
            _ => Err(lorebot_common::Error::parse("category", s)),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Topic {
    pub id: TopicId,
    pub name: String,
    pub name_key: String,
    pub created_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewTopic {
    pub name: String,
    pub name_key: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub id: EntryId,
    pub topic_id: TopicId,
    pub name: String,
    pub name_key: String,
    pub content: String,
    pub category: Category,
    pub author: UserId,
    pub created_at: i64,
    pub updated_at: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewEntry {
    pub topic_id: TopicId,
    pub name: String,
    pub name_key: String,
    pub content: String,
    pub category: Category,
    pub author: UserId,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntryImage {
    pub entry_id: EntryId,
    pub media_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: UserId,
    pub display_name: String,
    pub username: Option<String>,
    pub role: Role,
    pub language: Option<String>,
}

#[async_trait]
pub trait TopicStore: Send + Sync {
    /// All topics ordered by name.
    async fn list_topics(&self) -> anyhow::Result<Vec<Topic>>;
    async fn get_topic(&self, id: TopicId) -> anyhow::Result<Option<Topic>>;
    async fn find_topic_by_key(&self, name_key: &str) -> anyhow::Result<Option<Topic>>;
    async fn create_topic(&self, topic: NewTopic) -> anyhow::Result<Topic>;
}

#[async_trait]
pub trait EntryStore: Send + Sync {
    /// Entries of a topic ordered by category then name.
    async fn list_entries(&self, topic: TopicId) -> anyhow::Result<Vec<Entry>>;
    async fn get_entry(&self, id: EntryId) -> anyhow::Result<Option<Entry>>;
    /// Entries whose name key contains `fragment_key`, at most `limit` rows.
    async fn search_entries(&self, fragment_key: &str, limit: usize) -> anyhow::Result<Vec<Entry>>;
    async fn create_entry(&self, entry: NewEntry) -> anyhow::Result<Entry>;
    /// Replace content. `None` when the entry no longer exists.
    async fn update_entry_content(&self, id: EntryId, content: &str)
    -> anyhow::Result<Option<Entry>>;
    /// Returns `false` when there was nothing to delete.
    async fn delete_entry(&self, id: EntryId) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait ImageStore: Send + Sync {
    async fn get_image(&self, entry: EntryId) -> anyhow::Result<Option<EntryImage>>;
    async fn put_image(&self, image: EntryImage) -> anyhow::Result<()>;
    async fn delete_image(&self, entry: EntryId) -> anyhow::Result<()>;
}

#[async_trait]
pub trait UserStore: Send + Sync {
    async fn get_user(&self, id: UserId) -> anyhow::Result<Option<UserRecord>>;
    async fn find_user_by_username(&self, username: &str) -> anyhow::Result<Option<UserRecord>>;
    async fn upsert_user(&self, user: UserRecord) -> anyhow::Result<()>;
    /// Returns `false` when the user is unknown.
    async fn set_role(&self, id: UserId, role: Role) -> anyhow::Result<bool>;
}

#[async_trait]
pub trait SubscriptionStore: Send + Sync {
    /// Returns `true` when the subscription is new.
    async fn subscribe(&self, user: UserId, topic: TopicId) -> anyhow::Result<bool>;
    /// Returns `true` when a subscription was removed.
    async fn unsubscribe(&self, user: UserId, topic: TopicId) -> anyhow::Result<bool>;
    async fn subscribed_topics(&self, user: UserId) -> anyhow::Result<Vec<TopicId>>;
    async fn subscribers(&self, topic: TopicId) -> anyhow::Result<Vec<UserId>>;
}

/// The full set of persistence collaborators.
#[derive(Clone)]
pub struct Stores {
    pub topics: Arc<dyn TopicStore>,
    pub entries: Arc<dyn EntryStore>,
    pub images: Arc<dyn ImageStore>,
    pub users: Arc<dyn UserStore>,
    pub subscriptions: Arc<dyn SubscriptionStore>,
}

impl Stores {
    /// Use one backend for every repository.
    pub fn from_backend<S>(backend: Arc<S>) -> Self
    where
        S: TopicStore + EntryStore + ImageStore + UserStore + SubscriptionStore + 'static,
    {
        Self {
            topics: backend.clone(),
            entries: backend.clone(),
            images: backend.clone(),
            users: backend.clone(),
            subscriptions: backend,
        }
    }
}

impl fmt::Debug for Stores {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Stores").finish_non_exhaustive()
    }
}

/// Seconds since the Unix epoch.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or_default()
}
