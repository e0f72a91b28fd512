//! Resolves the sender of an inbound notification to a [`UserIdentity`].

use std::sync::Arc;

use {
    lorebot_common::UserIdentity,
    lorebot_config::AccessConfig,
    tracing::debug,
};

use crate::{
    event::Sender,
    store::{UserRecord, UserStore},
};

/// Looks the sender up in the user store, creating a record on first
/// contact. The effective role is the higher of the stored role and the one
/// granted by the access config.
pub struct IdentityResolver {
    users: Arc<dyn UserStore>,
    access: AccessConfig,
}

impl IdentityResolver {
    pub fn new(users: Arc<dyn UserStore>, access: AccessConfig) -> Self {
        Self { users, access }
    }

    pub async fn resolve(&self, sender: &Sender) -> anyhow::Result<UserIdentity> {
        let configured = self
            .access
            .configured_role(&sender.user_id.to_string(), sender.username.as_deref());
        let stored = self.users.get_user(sender.user_id).await?;

        let record = match stored {
            Some(existing) => {
                let refreshed = UserRecord {
                    display_name: sender.display_name.clone(),
                    username: sender.username.clone().or_else(|| existing.username.clone()),
                    language: sender.language.clone().or_else(|| existing.language.clone()),
                    ..existing.clone()
                };
                if refreshed != existing {
                    self.users.upsert_user(refreshed.clone()).await?;
                }
                refreshed
            },
            None => {
                let created = UserRecord {
                    id: sender.user_id,
                    display_name: sender.display_name.clone(),
                    username: sender.username.clone(),
                    role: configured,
                    language: sender.language.clone(),
                };
                self.users.upsert_user(created.clone()).await?;
                debug!(user = %sender.user_id, role = %configured, "registered new user");
                created
            },
        };

        Ok(UserIdentity {
            id: record.id,
            display_name: record.display_name,
            role: record.role.max(configured),
            language: record.language,
        })
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {
        super::*,
        crate::memory::MemoryStore,
        lorebot_common::{Role, UserId},
    };

    fn sender(id: i64, username: Option<&str>) -> Sender {
        Sender {
            user_id: UserId(id),
            display_name: "Mira".into(),
            username: username.map(str::to_string),
            language: Some("pt-BR".into()),
        }
    }

    #[tokio::test]
    async fn first_contact_creates_record_with_configured_role() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone(), AccessConfig {
            editors: vec!["@mira".into()],
            ..AccessConfig::default()
        });

        let identity = resolver.resolve(&sender(5, Some("Mira"))).await.unwrap();
        assert_eq!(identity.role, Role::Editor);
        assert_eq!(identity.language.as_deref(), Some("pt-BR"));
        let stored = store.get_user(UserId(5)).await.unwrap().unwrap();
        assert_eq!(stored.role, Role::Editor);
    }

    #[tokio::test]
    async fn stored_role_wins_when_higher() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone(), AccessConfig::default());
        resolver.resolve(&sender(5, None)).await.unwrap();
        store.set_role(UserId(5), Role::Admin).await.unwrap();

        let identity = resolver.resolve(&sender(5, None)).await.unwrap();
        assert_eq!(identity.role, Role::Admin);
    }

    #[tokio::test]
    async fn configured_admin_cannot_be_demoted_by_store() {
        let store = Arc::new(MemoryStore::new());
        let resolver = IdentityResolver::new(store.clone(), AccessConfig {
            admins: vec!["5".into()],
            ..AccessConfig::default()
        });
        resolver.resolve(&sender(5, None)).await.unwrap();
        store.set_role(UserId(5), Role::Viewer).await.unwrap();

        assert_eq!(resolver.resolve(&sender(5, None)).await.unwrap().role, Role::Admin);
    }
}
