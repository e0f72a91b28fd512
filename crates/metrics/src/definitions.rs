//! Metric name and label definitions.
//!
//! All metric names used across lorebot live here so the exported set is
//! documented in one place.

/// Session dispatch core metrics
pub mod dialogs {
    /// Inbound events dispatched, labelled by event kind
    pub const EVENTS_TOTAL: &str = "lorebot_dialog_events_total";
    /// Sessions created by a successful claim
    pub const SESSIONS_STARTED_TOTAL: &str = "lorebot_dialog_sessions_started_total";
    /// Sessions currently held by the registry
    pub const SESSIONS_ACTIVE: &str = "lorebot_dialog_sessions_active";
    /// Sessions removed by the idle sweeper
    pub const SESSIONS_EXPIRED_TOTAL: &str = "lorebot_dialog_sessions_expired_total";
    /// Step outcomes, labelled by outcome (advance, complete, reject, fail, ignore)
    pub const OUTCOMES_TOTAL: &str = "lorebot_dialog_outcomes_total";
    /// Duration of a single state-machine step in seconds
    pub const STEP_DURATION_SECONDS: &str = "lorebot_dialog_step_duration_seconds";
    /// Attempts to start a command while another one is active
    pub const CONFLICTS_TOTAL: &str = "lorebot_dialog_conflicts_total";
    /// Attempts to start a command without the required role
    pub const UNAUTHORIZED_TOTAL: &str = "lorebot_dialog_unauthorized_total";
    /// Cancellation requests, labelled by whether a session existed
    pub const CANCELLATIONS_TOTAL: &str = "lorebot_dialog_cancellations_total";
    /// Domain effects that failed to apply, labelled by error type
    pub const EFFECT_ERRORS_TOTAL: &str = "lorebot_dialog_effect_errors_total";
    /// Free-text searches served without a session
    pub const SEARCHES_TOTAL: &str = "lorebot_dialog_searches_total";
    /// Active per-user dispatch lanes
    pub const LANES_ACTIVE: &str = "lorebot_dialog_lanes_active";
}

/// Telegram transport metrics
pub mod telegram {
    /// Updates received from getUpdates
    pub const UPDATES_RECEIVED_TOTAL: &str = "lorebot_telegram_updates_received_total";
    /// Messages and documents sent to Telegram
    pub const MESSAGES_SENT_TOTAL: &str = "lorebot_telegram_messages_sent_total";
    /// Send failures after retries were exhausted
    pub const SEND_ERRORS_TOTAL: &str = "lorebot_telegram_send_errors_total";
    /// Requests delayed by a RetryAfter response
    pub const RETRY_AFTER_TOTAL: &str = "lorebot_telegram_retry_after_total";
    /// getUpdates failures
    pub const POLLING_ERRORS_TOTAL: &str = "lorebot_telegram_polling_errors_total";
    /// Inbound messages dropped by DM access gating
    pub const ACCESS_CONTROL_DENIALS_TOTAL: &str = "lorebot_telegram_access_control_denials_total";
    /// Bytes downloaded for image attachments
    pub const DOWNLOAD_BYTES: &str = "lorebot_telegram_download_bytes";
}

/// Repository metrics
pub mod store {
    /// Query duration in seconds, labelled by operation
    pub const QUERY_DURATION_SECONDS: &str = "lorebot_store_query_duration_seconds";
    /// Failed queries, labelled by operation
    pub const QUERY_ERRORS_TOTAL: &str = "lorebot_store_query_errors_total";
}

/// Renderer metrics
pub mod render {
    /// Documents rendered
    pub const DOCUMENTS_TOTAL: &str = "lorebot_render_documents_total";
    /// Rendered document size in bytes
    pub const DOCUMENT_BYTES: &str = "lorebot_render_document_bytes";
}

/// Common label keys
pub mod labels {
    pub const KIND: &str = "kind";
    pub const COMMAND: &str = "command";
    pub const OUTCOME: &str = "outcome";
    pub const OPERATION: &str = "operation";
    pub const ERROR_TYPE: &str = "error_type";
    pub const ACCOUNT_ID: &str = "account_id";
}

/// Histogram buckets
pub mod buckets {
    use once_cell::sync::Lazy;

    /// Step and query durations (in seconds), 100µs to 10s
    pub static STEP_DURATION: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            0.0001, 0.0005, 0.001, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 10.0,
        ]
    });

    /// Document and download sizes (in bytes), 1KB to 50MB
    pub static PAYLOAD_SIZE: Lazy<Vec<f64>> = Lazy::new(|| {
        vec![
            1024.0,     // 1KB
            10240.0,    // 10KB
            102400.0,   // 100KB
            1048576.0,  // 1MB
            10485760.0, // 10MB
            52428800.0, // 50MB
        ]
    });
}
