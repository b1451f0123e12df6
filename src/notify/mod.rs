//! Chat delivery for budget alerts.
//!
//! - [`Notifier`]: one chat destination per deployment
//! - [`SlackNotifier`]: Slack Web API `chat.postMessage`
//! - [`MattermostNotifier`]: Mattermost incoming webhook
//! - [`send_with_retry`]: shared exponential backoff loop
//!
//! # Retry Policy
//!
//! Each attempt is classified by the notifier:
//!
//! - **Transient** (rate limit, 5xx, network error): retried with backoff up to
//!   `max_attempts`, then [`NotifyError::DeliveryFailed`]
//! - **Permanent** (bad credentials, unknown channel, other 4xx): returned
//!   immediately as [`NotifyError::Permanent`]
//!
//! A retried attempt may duplicate a message whose success response was lost.
//! Delivery to chat is at-least-once.

pub mod mattermost;
pub mod payload;
pub mod slack;

use crate::error::NotifyError;
use async_trait::async_trait;
use std::future::Future;
use std::time::Duration;

pub use mattermost::MattermostNotifier;
pub use payload::NotificationRecord;
pub use slack::SlackNotifier;

/// Default number of delivery attempts.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;

/// Default base delay between attempts.
pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_millis(500);

/// Default maximum delay between attempts.
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Sends rendered alerts to a chat destination.
///
/// Implementations own their retry behavior, typically via [`send_with_retry`].
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Instance name, used in logs.
    fn name(&self) -> &str;

    /// Kind of notifier (e.g. "slack", "mattermost").
    fn notifier_type(&self) -> &str;

    /// Channel messages are posted to.
    fn channel(&self) -> &str;

    /// Deliver one notification.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - Accepted by the chat API
    /// * `Err(NotifyError::Permanent)` - Rejected, retrying cannot help
    /// * `Err(NotifyError::DeliveryFailed)` - Transient failures exhausted all attempts
    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError>;
}

impl std::fmt::Debug for dyn Notifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Notifier")
            .field("name", &self.name())
            .field("type", &self.notifier_type())
            .field("channel", &self.channel())
            .finish()
    }
}

/// Bounded exponential backoff settings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_base: DEFAULT_BACKOFF_BASE,
            backoff_max: DEFAULT_BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// Delay before the attempt following `attempt` (0-based).
    ///
    /// A server-provided `retry_after` is honored but never exceeds
    /// `backoff_max`.
    pub fn delay_for(&self, attempt: u32, retry_after: Option<Duration>) -> Duration {
        let backoff = backoff_delay(attempt, self.backoff_base, self.backoff_max);
        match retry_after {
            Some(hint) => std::cmp::min(std::cmp::max(backoff, hint), self.backoff_max),
            None => backoff,
        }
    }
}

/// Calculate exponential backoff delay: `min(base * 2^attempt, max)`.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let delay = base.saturating_mul(2_u32.saturating_pow(attempt));
    std::cmp::min(delay, max)
}

/// Classification of one failed delivery attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptError {
    Transient {
        reason: String,
        retry_after: Option<Duration>,
    },
    Permanent(String),
}

impl AttemptError {
    pub fn transient(reason: impl Into<String>) -> Self {
        AttemptError::Transient {
            reason: reason.into(),
            retry_after: None,
        }
    }
}

/// Run `attempt` until it succeeds, fails permanently, or the policy is
/// exhausted.
pub async fn send_with_retry<F, Fut>(
    policy: &RetryPolicy,
    notifier_type: &'static str,
    mut attempt: F,
) -> Result<(), NotifyError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<(), AttemptError>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut last_error = String::new();

    for n in 0..max_attempts {
        match attempt(n).await {
            Ok(()) => {
                tracing::info!(attempt = n, "Notification delivered");
                metrics::counter!(
                    "budgetwatch_notifications_sent_total",
                    "notifier_type" => notifier_type
                )
                .increment(1);
                return Ok(());
            }
            Err(AttemptError::Permanent(reason)) => {
                tracing::error!(
                    attempt = n,
                    error = %reason,
                    "Chat API rejected notification, not retrying"
                );
                metrics::counter!(
                    "budgetwatch_notify_errors_total",
                    "notifier_type" => notifier_type,
                    "kind" => "permanent"
                )
                .increment(1);
                return Err(NotifyError::Permanent(reason));
            }
            Err(AttemptError::Transient {
                reason,
                retry_after,
            }) => {
                tracing::warn!(attempt = n, error = %reason, "Delivery attempt failed");
                last_error = reason;

                if n + 1 < max_attempts {
                    let delay = policy.delay_for(n, retry_after);
                    tracing::debug!(delay_ms = delay.as_millis() as u64, "Waiting before retry");
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }

    tracing::error!(
        max_attempts = max_attempts,
        error = %last_error,
        "Failed to deliver notification after all retries"
    );
    metrics::counter!(
        "budgetwatch_notify_errors_total",
        "notifier_type" => notifier_type,
        "kind" => "exhausted"
    )
    .increment(1);
    Err(NotifyError::DeliveryFailed {
        attempts: max_attempts,
        last_error,
    })
}

/// Parse a `Retry-After` header given in seconds.
pub(crate) fn retry_after_header(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(Duration::from_secs)
}
