/// Config schema: channels, access roles, sessions, storage, locale, search, metrics.
use std::{collections::HashMap, path::PathBuf};

use {
    lorebot_common::Role,
    serde::{Deserialize, Serialize},
};

/// Root configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LorebotConfig {
    pub channels: ChannelsConfig,
    pub access: AccessConfig,
    pub sessions: SessionsConfig,
    pub storage: StorageConfig,
    pub locale: LocaleConfig,
    pub search: SearchConfig,
    pub metrics: MetricsConfig,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChannelsConfig {
    /// Telegram bot accounts, keyed by account ID. Parsed by the telegram crate.
    #[serde(default)]
    pub telegram: HashMap<String, serde_json::Value>,
}

/// Bootstrap role assignment for users the store has not seen yet.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct AccessConfig {
    /// User IDs or usernames (without `@`) that are always admins.
    pub admins: Vec<String>,
    /// User IDs or usernames that are at least editors.
    pub editors: Vec<String>,
    pub default_role: Role,
}

impl AccessConfig {
    /// Role granted by the config lists alone.
    pub fn configured_role(&self, user_id: &str, username: Option<&str>) -> Role {
        let listed = |list: &[String]| {
            list.iter().any(|entry| {
                let entry = entry.trim().trim_start_matches('@');
                entry == user_id || username.is_some_and(|u| entry.eq_ignore_ascii_case(u))
            })
        };
        if listed(&self.admins) {
            Role::Admin
        } else if listed(&self.editors) {
            Role::Editor.max(self.default_role)
        } else {
            self.default_role
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionsConfig {
    /// Abandoned sessions are removed after this many idle seconds. `0` keeps them forever.
    pub idle_timeout_secs: u64,
    /// How often the idle sweeper runs.
    pub sweep_interval_secs: u64,
    /// Per-user dispatch lanes retire after this many idle seconds.
    pub lane_idle_secs: u64,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            idle_timeout_secs: 3600,
            sweep_interval_secs: 60,
            lane_idle_secs: 300,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// SQLite URL. Defaults to `sqlite://<data_dir>/lorebot.db`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub database_url: Option<String>,
}

impl StorageConfig {
    pub fn resolve_url(&self, data_dir: &std::path::Path) -> String {
        self.database_url.clone().unwrap_or_else(|| {
            let path: PathBuf = data_dir.join("lorebot.db");
            format!("sqlite://{}?mode=rwc", path.display())
        })
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LocaleConfig {
    pub default_language: String,
    /// Template overrides: language → message id → template.
    pub messages: HashMap<String, HashMap<String, String>>,
}

impl Default for LocaleConfig {
    fn default() -> Self {
        Self {
            default_language: "en".into(),
            messages: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub enabled: bool,
    pub min_chars: usize,
    pub max_results: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            min_chars: 2,
            max_results: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    /// Address of the Prometheus scrape endpoint (`GET /metrics`).
    pub listen: String,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            listen: "127.0.0.1:9464".into(),
        }
    }
}
