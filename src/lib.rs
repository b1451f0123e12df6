// src/lib.rs
//! budgetwatch - Deduplicated chat notifications for cloud billing budget alerts.

pub mod app;
pub mod cli;
pub mod config;
pub mod dedup;
pub mod error;
pub mod event;
pub mod metrics;
pub mod notify;
pub mod pipeline;
pub mod state;
pub mod template;

// Re-export commonly used types
pub use app::build_pipeline;
pub use cli::LogFormat;
pub use dedup::{Decision, decide};
pub use event::{AlertEvent, parse_event};
pub use metrics::register_metric_descriptions;
pub use notify::{MattermostNotifier, NotificationRecord, Notifier, RetryPolicy, SlackNotifier};
pub use pipeline::{Outcome, Pipeline, Timeouts};
pub use state::{BudgetKey, BudgetNotificationState, KvBackend, KvStateStore, StateStore};
pub use template::{MessageRenderer, RenderedMessage};
