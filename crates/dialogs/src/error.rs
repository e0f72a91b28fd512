use thiserror::Error;

use crate::render::RenderError;

/// Unexpected failures. Validation and conflict outcomes never use this type;
/// they are resolved inside the state machine.
#[derive(Debug, Error)]
pub enum Error {
    #[error("persistence failed: {0:#}")]
    Persistence(anyhow::Error),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("transport failed: {0:#}")]
    Transport(anyhow::Error),

    #[error("{what} not found")]
    MissingEntity { what: String },

    #[error("/{command}: cannot move from {from} to {to}")]
    InvalidStep {
        command: &'static str,
        from: &'static str,
        to: &'static str,
    },

    #[error("{0}")]
    Message(String),
}

impl Error {
    #[must_use]
    pub fn missing(what: impl Into<String>) -> Self {
        Self::MissingEntity { what: what.into() }
    }

    /// Short label used for logs and metrics.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Persistence(_) => "persistence",
            Self::Render(_) => "render",
            Self::Transport(_) => "transport",
            Self::MissingEntity { .. } => "missing_entity",
            Self::InvalidStep { .. } => "invalid_step",
            Self::Message(_) => "other",
        }
    }
}

impl lorebot_common::FromMessage for Error {
    fn from_message(message: String) -> Self {
        Self::Message(message)
    }
}

pub type Result<T> = std::result::Result<T, Error>;

lorebot_common::impl_context!();
