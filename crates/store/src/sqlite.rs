use std::{future::Future, time::Instant};

use {
    anyhow::{Context, Result},
    async_trait::async_trait,
    lorebot_common::{EntryId, Role, TopicId, UserId},
    lorebot_dialogs::store::{
        Entry, EntryImage, EntryStore, ImageStore, NewEntry, NewTopic, SubscriptionStore, Topic,
        TopicStore, UserRecord, UserStore, now_epoch,
    },
    sqlx::SqlitePool,
    tracing::trace,
};

#[cfg(feature = "metrics")]
use lorebot_metrics::{counter, histogram, labels, store as store_metrics};

#[derive(sqlx::FromRow)]
struct TopicRow {
    id: i64,
    name: String,
    name_key: String,
    created_at: i64,
}

impl From<TopicRow> for Topic {
    fn from(r: TopicRow) -> Self {
        Self {
            id: TopicId(r.id),
            name: r.name,
            name_key: r.name_key,
            created_at: r.created_at,
        }
    }
}

#[derive(sqlx::FromRow)]
struct EntryRow {
    id: i64,
    topic_id: i64,
    name: String,
    name_key: String,
    content: String,
    category: String,
    author: i64,
    created_at: i64,
    updated_at: i64,
}

impl TryFrom<EntryRow> for Entry {
    type Error = anyhow::Error;

    fn try_from(r: EntryRow) -> Result<Self> {
        Ok(Self {
            id: EntryId(r.id),
            topic_id: TopicId(r.topic_id),
            name: r.name,
            name_key: r.name_key,
            content: r.content,
            category: r.category.parse()?,
            author: UserId(r.author),
            created_at: r.created_at,
            updated_at: r.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct ImageRow {
    entry_id: i64,
    media_type: String,
    data: Vec<u8>,
}

impl From<ImageRow> for EntryImage {
    fn from(r: ImageRow) -> Self {
        Self {
            entry_id: EntryId(r.entry_id),
            media_type: r.media_type,
            data: r.data,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: i64,
    display_name: String,
    username: Option<String>,
    role: String,
    language: Option<String>,
}

impl TryFrom<UserRow> for UserRecord {
    type Error = anyhow::Error;

    fn try_from(r: UserRow) -> Result<Self> {
        Ok(Self {
            id: UserId(r.id),
            display_name: r.display_name,
            username: r.username,
            role: r.role.parse::<Role>()?,
            language: r.language,
        })
    }
}

const ENTRY_COLUMNS: &str =
    "id, topic_id, name, name_key, content, category, author, created_at, updated_at";

/// Escape `LIKE` wildcards in user input.
fn like_fragment(fragment: &str) -> String {
    let mut escaped = String::with_capacity(fragment.len() + 2);
    escaped.push('%');
    for c in fragment.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

/// Time a query and label failures with the operation name.
async fn timed<T>(
    operation: &'static str,
    query: impl Future<Output = sqlx::Result<T>>,
) -> Result<T> {
    let started = Instant::now();
    let result = query.await;
    let elapsed = started.elapsed();
    trace!(operation, elapsed_us = elapsed.as_micros() as u64, "query");

    #[cfg(feature = "metrics")]
    {
        histogram!(store_metrics::QUERY_DURATION_SECONDS, labels::OPERATION => operation)
            .record(elapsed.as_secs_f64());
        if result.is_err() {
            counter!(store_metrics::QUERY_ERRORS_TOTAL, labels::OPERATION => operation)
                .increment(1);
        }
    }

    result.with_context(|| format!("{operation} failed"))
}

/// SQLite-backed store for every lorebot repository.
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

#[async_trait]
impl TopicStore for SqliteStore {
    async fn list_topics(&self) -> Result<Vec<Topic>> {
        let rows = timed(
            "list_topics",
            sqlx::query_as::<_, TopicRow>("SELECT * FROM topics ORDER BY name_key")
                .fetch_all(&self.pool),
        )
        .await?;
        Ok(rows.into_iter().map(Topic::from).collect())
    }

    async fn get_topic(&self, id: TopicId) -> Result<Option<Topic>> {
        let row = timed(
            "get_topic",
            sqlx::query_as::<_, TopicRow>("SELECT * FROM topics WHERE id = ?")
                .bind(id.0)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(Topic::from))
    }

    async fn find_topic_by_key(&self, name_key: &str) -> Result<Option<Topic>> {
        let row = timed(
            "find_topic_by_key",
            sqlx::query_as::<_, TopicRow>("SELECT * FROM topics WHERE name_key = ?")
                .bind(name_key)
                .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(Topic::from))
    }

    async fn create_topic(&self, topic: NewTopic) -> Result<Topic> {
        let row = timed(
            "create_topic",
            sqlx::query_as::<_, TopicRow>(
                "INSERT INTO topics (name, name_key, created_at) VALUES (?, ?, ?) RETURNING *",
            )
            .bind(&topic.name)
            .bind(&topic.name_key)
            .bind(now_epoch())
            .fetch_one(&self.pool),
        )
        .await?;
        Ok(row.into())
    }
}

#[async_trait]
impl EntryStore for SqliteStore {
    async fn list_entries(&self, topic: TopicId) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE topic_id = ? ORDER BY category, name_key"
        );
        let rows = timed(
            "list_entries",
            sqlx::query_as::<_, EntryRow>(&sql)
                .bind(topic.0)
                .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn get_entry(&self, id: EntryId) -> Result<Option<Entry>> {
        let sql = format!("SELECT {ENTRY_COLUMNS} FROM entries WHERE id = ?");
        let row = timed(
            "get_entry",
            sqlx::query_as::<_, EntryRow>(&sql)
                .bind(id.0)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn search_entries(&self, fragment_key: &str, limit: usize) -> Result<Vec<Entry>> {
        let sql = format!(
            "SELECT {ENTRY_COLUMNS} FROM entries WHERE name_key LIKE ? ESCAPE '\\' \
             ORDER BY name_key LIMIT ?"
        );
        let rows = timed(
            "search_entries",
            sqlx::query_as::<_, EntryRow>(&sql)
                .bind(like_fragment(fragment_key))
                .bind(i64::try_from(limit).unwrap_or(i64::MAX))
                .fetch_all(&self.pool),
        )
        .await?;
        rows.into_iter().map(TryInto::try_into).collect()
    }

    async fn create_entry(&self, entry: NewEntry) -> Result<Entry> {
        let now = now_epoch();
        let sql = format!(
            "INSERT INTO entries (topic_id, name, name_key, content, category, author, created_at, updated_at) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING {ENTRY_COLUMNS}"
        );
        let row = timed(
            "create_entry",
            sqlx::query_as::<_, EntryRow>(&sql)
                .bind(entry.topic_id.0)
                .bind(&entry.name)
                .bind(&entry.name_key)
                .bind(&entry.content)
                .bind(entry.category.as_str())
                .bind(entry.author.0)
                .bind(now)
                .bind(now)
                .fetch_one(&self.pool),
        )
        .await?;
        row.try_into()
    }

    async fn update_entry_content(&self, id: EntryId, content: &str) -> Result<Option<Entry>> {
        let sql = format!(
            "UPDATE entries SET content = ?, updated_at = ? WHERE id = ? RETURNING {ENTRY_COLUMNS}"
        );
        let row = timed(
            "update_entry_content",
            sqlx::query_as::<_, EntryRow>(&sql)
                .bind(content)
                .bind(now_epoch())
                .bind(id.0)
                .fetch_optional(&self.pool),
        )
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn delete_entry(&self, id: EntryId) -> Result<bool> {
        let result = timed(
            "delete_entry",
            sqlx::query("DELETE FROM entries WHERE id = ?")
                .bind(id.0)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl ImageStore for SqliteStore {
    async fn get_image(&self, entry: EntryId) -> Result<Option<EntryImage>> {
        let row = timed(
            "get_image",
            sqlx::query_as::<_, ImageRow>(
                "SELECT entry_id, media_type, data FROM entry_images WHERE entry_id = ?",
            )
            .bind(entry.0)
            .fetch_optional(&self.pool),
        )
        .await?;
        Ok(row.map(EntryImage::from))
    }

    async fn put_image(&self, image: EntryImage) -> Result<()> {
        timed(
            "put_image",
            sqlx::query(
                r#"INSERT INTO entry_images (entry_id, media_type, data, updated_at)
                   VALUES (?, ?, ?, ?)
                   ON CONFLICT(entry_id) DO UPDATE SET
                     media_type = excluded.media_type,
                     data = excluded.data,
                     updated_at = excluded.updated_at"#,
            )
            .bind(image.entry_id.0)
            .bind(&image.media_type)
            .bind(&image.data)
            .bind(now_epoch())
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn delete_image(&self, entry: EntryId) -> Result<()> {
        timed(
            "delete_image",
            sqlx::query("DELETE FROM entry_images WHERE entry_id = ?")
                .bind(entry.0)
                .execute(&self.pool),
        )
        .await?;
        Ok(())
    }
}

#[async_trait]
impl UserStore for SqliteStore {
    async fn get_user(&self, id: UserId) -> Result<Option<UserRecord>> {
        let row = timed(
            "get_user",
            sqlx::query_as::<_, UserRow>(
                "SELECT id, display_name, username, role, language FROM users WHERE id = ?",
            )
            .bind(id.0)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn find_user_by_username(&self, username: &str) -> Result<Option<UserRecord>> {
        let row = timed(
            "find_user_by_username",
            sqlx::query_as::<_, UserRow>(
                "SELECT id, display_name, username, role, language FROM users \
                 WHERE username = ? COLLATE NOCASE LIMIT 1",
            )
            .bind(username)
            .fetch_optional(&self.pool),
        )
        .await?;
        row.map(TryInto::try_into).transpose()
    }

    async fn upsert_user(&self, user: UserRecord) -> Result<()> {
        let now = now_epoch();
        timed(
            "upsert_user",
            sqlx::query(
                r#"INSERT INTO users (id, display_name, username, role, language, created_at, updated_at)
                   VALUES (?, ?, ?, ?, ?, ?, ?)
                   ON CONFLICT(id) DO UPDATE SET
                     display_name = excluded.display_name,
                     username = excluded.username,
                     role = excluded.role,
                     language = excluded.language,
                     updated_at = excluded.updated_at"#,
            )
            .bind(user.id.0)
            .bind(&user.display_name)
            .bind(&user.username)
            .bind(user.role.as_str())
            .bind(&user.language)
            .bind(now)
            .bind(now)
            .execute(&self.pool),
        )
        .await?;
        Ok(())
    }

    async fn set_role(&self, id: UserId, role: Role) -> Result<bool> {
        let result = timed(
            "set_role",
            sqlx::query("UPDATE users SET role = ?, updated_at = ? WHERE id = ?")
                .bind(role.as_str())
                .bind(now_epoch())
                .bind(id.0)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }
}

#[async_trait]
impl SubscriptionStore for SqliteStore {
    async fn subscribe(&self, user: UserId, topic: TopicId) -> Result<bool> {
        let result = timed(
            "subscribe",
            sqlx::query(
                "INSERT INTO subscriptions (user_id, topic_id, created_at) VALUES (?, ?, ?) \
                 ON CONFLICT(user_id, topic_id) DO NOTHING",
            )
            .bind(user.0)
            .bind(topic.0)
            .bind(now_epoch())
            .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn unsubscribe(&self, user: UserId, topic: TopicId) -> Result<bool> {
        let result = timed(
            "unsubscribe",
            sqlx::query("DELETE FROM subscriptions WHERE user_id = ? AND topic_id = ?")
                .bind(user.0)
                .bind(topic.0)
                .execute(&self.pool),
        )
        .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn subscribed_topics(&self, user: UserId) -> Result<Vec<TopicId>> {
        let ids: Vec<i64> = timed(
            "subscribed_topics",
            sqlx::query_scalar("SELECT topic_id FROM subscriptions WHERE user_id = ?")
                .bind(user.0)
                .fetch_all(&self.pool),
        )
        .await?;
        Ok(ids.into_iter().map(TopicId).collect())
    }

    async fn subscribers(&self, topic: TopicId) -> Result<Vec<UserId>> {
        let ids: Vec<i64> = timed(
            "subscribers",
            sqlx::query_scalar("SELECT user_id FROM subscriptions WHERE topic_id = ?")
                .bind(topic.0)
                .fetch_all(&self.pool),
        )
        .await?;
        Ok(ids.into_iter().map(UserId).collect())
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        lorebot_dialogs::{store::Category, validate::name_key},
        sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions},
        std::str::FromStr,
    };

    async fn test_store() -> SqliteStore {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .unwrap()
            .foreign_keys(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await
            .unwrap();
        crate::run_migrations(&pool).await.unwrap();
        SqliteStore::new(pool)
    }

    async fn topic(store: &SqliteStore, name: &str) -> Topic {
        store
            .create_topic(NewTopic {
                name: name.into(),
                name_key: name_key(name),
            })
            .await
            .unwrap()
    }

    fn new_entry(topic: &Topic, name: &str, category: Category) -> NewEntry {
        NewEntry {
            topic_id: topic.id,
            name: name.into(),
            name_key: name_key(name),
            content: format!("{name} lore"),
            category,
            author: UserId(1),
        }
    }

    #[tokio::test]
    async fn topics_round_trip_and_stay_unique() {
        let store = test_store().await;
        let ashfall = topic(&store, "Ashfall").await;
        assert_eq!(store.get_topic(ashfall.id).await.unwrap().unwrap().name, "Ashfall");
        assert_eq!(
            store.find_topic_by_key("ashfall").await.unwrap().unwrap().id,
            ashfall.id
        );
        let dup = store
            .create_topic(NewTopic {
                name: "ASHFALL".into(),
                name_key: "ashfall".into(),
            })
            .await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn entry_uniqueness_is_per_topic_and_category() {
        let store = test_store().await;
        let ashfall = topic(&store, "Ashfall").await;
        store
            .create_entry(new_entry(&ashfall, "Aëlin", Category::Standard))
            .await
            .unwrap();
        assert!(
            store
                .create_entry(new_entry(&ashfall, "aelin", Category::Standard))
                .await
                .is_err()
        );
        let ranked = store
            .create_entry(new_entry(&ashfall, "aelin", Category::Ranking))
            .await
            .unwrap();
        assert_eq!(ranked.category, Category::Ranking);

        let listed = store.list_entries(ashfall.id).await.unwrap();
        assert_eq!(listed.len(), 2);
        assert_eq!(listed[0].category, Category::Ranking);
    }

    #[tokio::test]
    async fn update_and_delete_entry() {
        let store = test_store().await;
        let ashfall = topic(&store, "Ashfall").await;
        let entry = store
            .create_entry(new_entry(&ashfall, "Zed", Category::Standard))
            .await
            .unwrap();

        let updated = store
            .update_entry_content(entry.id, "rewritten")
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.content, "rewritten");

        store
            .put_image(EntryImage {
                entry_id: entry.id,
                media_type: "image/png".into(),
                data: vec![0x89, b'P', b'N', b'G'],
            })
            .await
            .unwrap();
        assert!(store.delete_entry(entry.id).await.unwrap());
        assert!(store.get_image(entry.id).await.unwrap().is_none());
        assert!(!store.delete_entry(entry.id).await.unwrap());
        assert!(
            store
                .update_entry_content(entry.id, "x")
                .await
                .unwrap()
                .is_none()
        );
    }

    #[tokio::test]
    async fn image_upsert_replaces_bytes() {
        let store = test_store().await;
        let ashfall = topic(&store, "Ashfall").await;
        let entry = store
            .create_entry(new_entry(&ashfall, "Zed", Category::Standard))
            .await
            .unwrap();
        for data in [vec![1u8], vec![2u8, 3]] {
            store
                .put_image(EntryImage {
                    entry_id: entry.id,
                    media_type: "image/jpeg".into(),
                    data,
                })
                .await
                .unwrap();
        }
        let image = store.get_image(entry.id).await.unwrap().unwrap();
        assert_eq!(image.data, vec![2, 3]);
    }

    #[tokio::test]
    async fn search_escapes_wildcards() {
        let store = test_store().await;
        let ashfall = topic(&store, "Ashfall").await;
        for name in ["Aëlin", "Aelina", "Zed"] {
            store
                .create_entry(new_entry(&ashfall, name, Category::Standard))
                .await
                .unwrap();
        }
        assert_eq!(store.search_entries("ael", 10).await.unwrap().len(), 2);
        assert_eq!(store.search_entries("ael", 1).await.unwrap().len(), 1);
        assert!(store.search_entries("%", 10).await.unwrap().is_empty());
        assert!(store.search_entries("_", 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn users_and_roles() {
        let store = test_store().await;
        assert!(!store.set_role(UserId(7), Role::Editor).await.unwrap());
        store
            .upsert_user(UserRecord {
                id: UserId(7),
                display_name: "Tomas".into(),
                username: Some("Tomas".into()),
                role: Role::Viewer,
                language: Some("es".into()),
            })
            .await
            .unwrap();
        assert!(store.set_role(UserId(7), Role::Editor).await.unwrap());

        let found = store.find_user_by_username("tomas").await.unwrap().unwrap();
        assert_eq!(found.role, Role::Editor);
        assert_eq!(found.language.as_deref(), Some("es"));
    }

    #[tokio::test]
    async fn subscriptions_are_idempotent_and_cascade() {
        let store = test_store().await;
        let ashfall = topic(&store, "Ashfall").await;
        assert!(store.subscribe(UserId(1), ashfall.id).await.unwrap());
        assert!(!store.subscribe(UserId(1), ashfall.id).await.unwrap());
        assert!(store.subscribe(UserId(2), ashfall.id).await.unwrap());

        let mut subscribers = store.subscribers(ashfall.id).await.unwrap();
        subscribers.sort();
        assert_eq!(subscribers, vec![UserId(1), UserId(2)]);
        assert_eq!(store.subscribed_topics(UserId(1)).await.unwrap(), vec![ashfall.id]);

        assert!(store.unsubscribe(UserId(1), ashfall.id).await.unwrap());
        assert!(!store.unsubscribe(UserId(1), ashfall.id).await.unwrap());
    }

    #[test]
    fn like_fragment_escaping() {
        assert_eq!(like_fragment("a_b%"), "%a\\_b\\%%");
    }
}
