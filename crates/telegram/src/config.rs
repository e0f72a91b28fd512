use {
    secrecy::{ExposeSecret, Secret},
    serde::{Deserialize, Serialize},
};

use crate::{
    access::{DmPolicy, GroupPolicy},
    error::{Error, Result},
};

/// Configuration for a single Telegram bot account, read from
/// `[channels.telegram.<account_id>]`.
#[derive(Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelegramAccountConfig {
    /// Bot token from @BotFather.
    #[serde(serialize_with = "serialize_secret")]
    pub token: Secret<String>,

    /// DM access policy.
    pub dm_policy: DmPolicy,

    /// User IDs or usernames allowed to DM the bot.
    pub allowlist: Vec<String>,

    /// Group access policy.
    pub group_policy: GroupPolicy,

    /// Group chat IDs the bot answers in.
    pub group_allowlist: Vec<String>,

    /// Long-polling timeout passed to getUpdates.
    pub poll_timeout_secs: u32,
}

impl TelegramAccountConfig {
    /// Parse the opaque per-account value from the main config.
    pub fn from_value(account_id: &str, value: &serde_json::Value) -> Result<Self> {
        serde_json::from_value(value.clone()).map_err(|e| Error::config(account_id, e))
    }

    /// Copy with the token replaced, for display.
    pub fn redacted(&self) -> Self {
        Self {
            token: Secret::new("[REDACTED]".into()),
            ..self.clone()
        }
    }
}

impl std::fmt::Debug for TelegramAccountConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TelegramAccountConfig")
            .field("token", &"[REDACTED]")
            .field("dm_policy", &self.dm_policy)
            .field("group_policy", &self.group_policy)
            .field("poll_timeout_secs", &self.poll_timeout_secs)
            .finish_non_exhaustive()
    }
}

fn serialize_secret<S: serde::Serializer>(
    secret: &Secret<String>,
    serializer: S,
) -> std::result::Result<S::Ok, S::Error> {
    serializer.serialize_str(secret.expose_secret())
}

impl Default for TelegramAccountConfig {
    fn default() -> Self {
        Self {
            token: Secret::new(String::new()),
            dm_policy: DmPolicy::default(),
            allowlist: Vec::new(),
            group_policy: GroupPolicy::default(),
            group_allowlist: Vec::new(),
            poll_timeout_secs: 30,
        }
    }
}

#[allow(clippy::unwrap_used, clippy::expect_used)]
#[cfg(test)]
mod tests {
    use {super::*, serde_json::json};

    #[test]
    fn default_config() {
        let cfg = TelegramAccountConfig::default();
        assert_eq!(cfg.dm_policy, DmPolicy::Open);
        assert_eq!(cfg.group_policy, GroupPolicy::Disabled);
        assert_eq!(cfg.poll_timeout_secs, 30);
    }

    #[test]
    fn parses_account_value() {
        let cfg = TelegramAccountConfig::from_value("main", &json!({
            "token": "123:ABC",
            "dm_policy": "allowlist",
            "allowlist": ["user1", "42"]
        }))
        .unwrap();
        assert_eq!(cfg.token.expose_secret(), "123:ABC");
        assert_eq!(cfg.dm_policy, DmPolicy::Allowlist);
        assert_eq!(cfg.allowlist, vec!["user1", "42"]);
        assert_eq!(cfg.poll_timeout_secs, 30);
    }

    #[test]
    fn rejects_unknown_policy() {
        let err = TelegramAccountConfig::from_value("main", &json!({ "dm_policy": "sometimes" }))
            .unwrap_err();
        assert!(err.to_string().contains("`main`"));
    }

    #[test]
    fn redacted_hides_token() {
        let cfg = TelegramAccountConfig {
            token: Secret::new("tok".into()),
            ..Default::default()
        };
        let json = serde_json::to_value(cfg.redacted()).unwrap();
        assert_eq!(json["token"], "[REDACTED]");
        assert!(!format!("{cfg:?}").contains("tok\""));
    }
}
