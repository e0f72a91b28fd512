//! Metrics collection and export for lorebot.
//!
//! Every crate records through the `metrics` facade re-exported here, behind
//! its own `metrics` cargo feature. Nothing is exported until
//! [`init_metrics`] installs a recorder; with the `prometheus` feature the
//! returned [`MetricsHandle`] renders the Prometheus text format.
//!
//! ```rust,ignore
//! use lorebot_metrics::{counter, dialogs};
//!
//! counter!(dialogs::EVENTS_TOTAL, "kind" => "text").increment(1);
//! ```

mod definitions;
mod recorder;

pub use {
    definitions::*,
    recorder::{MetricsHandle, MetricsRecorderConfig, init_metrics},
};

pub use metrics::{counter, gauge, histogram};
