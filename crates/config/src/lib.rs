//! Configuration loading, env substitution, and validation.
//!
//! Config files: `lorebot.toml`, `lorebot.yaml`, `lorebot.yml`, or `lorebot.json`,
//! searched in `./` then `~/.config/lorebot/`.
//!
//! `${ENV_VAR}` and `${ENV_VAR:-fallback}` are substituted in the raw text
//! before parsing.

pub mod env_subst;
pub mod loader;
pub mod schema;
pub mod validate;

pub use {
    loader::{config_dir, data_dir, discover_and_load, load_config},
    schema::{
        AccessConfig, ChannelsConfig, LocaleConfig, LorebotConfig, MetricsConfig, SearchConfig,
        SessionsConfig, StorageConfig,
    },
    validate::{Diagnostic, Severity, validate},
};
