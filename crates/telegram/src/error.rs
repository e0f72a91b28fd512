use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Telegram(#[from] teloxide::RequestError),

    #[error("http request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("file download returned HTTP {status}")]
    DownloadStatus { status: u16 },

    #[error("invalid telegram account config `{account_id}`: {source}")]
    Config {
        account_id: String,
        #[source]
        source: serde_json::Error,
    },

    /// getUpdates was terminated because another process polls the same token.
    #[error("another bot instance is polling with this token")]
    Conflict,
}

impl Error {
    #[must_use]
    pub fn config(account_id: impl Into<String>, source: serde_json::Error) -> Self {
        Self::Config {
            account_id: account_id.into(),
            source,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
