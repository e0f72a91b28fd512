//! Semantic checks that serde cannot express.

use std::{fmt, net::SocketAddr};

use crate::schema::LorebotConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub severity: Severity,
    /// Dotted path of the offending key, e.g. `channels.telegram.main.token`.
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Error,
            path: path.into(),
            message: message.into(),
        }
    }

    fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            severity: Severity::Warning,
            path: path.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let level = match self.severity {
            Severity::Error => "error",
            Severity::Warning => "warning",
        };
        write!(f, "{level}: {}: {}", self.path, self.message)
    }
}

/// Message ids accepted in `[locale.messages]`; supplied by the caller so
/// this crate does not depend on the dialog catalog.
pub fn validate(config: &LorebotConfig, known_message_ids: &[&str]) -> Vec<Diagnostic> {
    let mut out = Vec::new();

    if config.channels.telegram.is_empty() {
        out.push(Diagnostic::error(
            "channels.telegram",
            "no telegram account configured",
        ));
    }
    for (account_id, value) in &config.channels.telegram {
        let token = value.get("token").and_then(|t| t.as_str()).unwrap_or("");
        if token.trim().is_empty() {
            out.push(Diagnostic::error(
                format!("channels.telegram.{account_id}.token"),
                "bot token is required",
            ));
        } else if token.contains("${") {
            out.push(Diagnostic::error(
                format!("channels.telegram.{account_id}.token"),
                "unresolved environment placeholder",
            ));
        }
    }

    let sessions = &config.sessions;
    if sessions.idle_timeout_secs > 0 && sessions.sweep_interval_secs == 0 {
        out.push(Diagnostic::error(
            "sessions.sweep_interval_secs",
            "must be greater than zero when idle_timeout_secs is set",
        ));
    } else if sessions.idle_timeout_secs > 0
        && sessions.sweep_interval_secs > sessions.idle_timeout_secs
    {
        out.push(Diagnostic::warning(
            "sessions.sweep_interval_secs",
            "sweeps less often than the idle timeout; sessions will outlive it",
        ));
    }
    if sessions.lane_idle_secs == 0 {
        out.push(Diagnostic::error(
            "sessions.lane_idle_secs",
            "must be greater than zero",
        ));
    }

    if config.search.enabled && config.search.max_results == 0 {
        out.push(Diagnostic::warning(
            "search.max_results",
            "search is enabled but returns no results",
        ));
    }

    if config.metrics.enabled && config.metrics.listen.parse::<SocketAddr>().is_err() {
        out.push(Diagnostic::error(
            "metrics.listen",
            format!("`{}` is not a socket address", config.metrics.listen),
        ));
    }

    for (language, messages) in &config.locale.messages {
        for id in messages.keys() {
            if !known_message_ids.contains(&id.as_str()) {
                out.push(Diagnostic::warning(
                    format!("locale.messages.{language}.{id}"),
                    "unknown message id",
                ));
            }
        }
    }

    out
}
