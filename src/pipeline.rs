//! Per-event orchestration.
//!
//! ```text
//! Received -> Parsed -> Decided -> Notified -> Committed -> Done
//!                              \-> Skipped  -/
//! any stage -> Failed(reason)
//! ```
//!
//! The watermark is committed only after the notification went out. A crash
//! between sending and committing produces a duplicate on redelivery; the
//! reverse order could drop an alert silently.
//!
//! Nothing is cached between invocations: every event reads the store.

use crate::dedup::decide;
use crate::error::{NotifyError, PipelineError, StateStoreError};
use crate::event::{AlertEvent, parse_event};
use crate::notify::{NotificationRecord, Notifier};
use crate::state::{BudgetKey, StateStore};
use crate::template::MessageRenderer;
use chrono::Utc;
use rust_decimal::Decimal;
use std::sync::Arc;
use std::time::Duration;
use tracing::Instrument;

/// Default bound on a single state store call.
pub const DEFAULT_STATE_STORE_TIMEOUT: Duration = Duration::from_secs(5);

/// Default bound on a whole delivery, retries included.
pub const DEFAULT_NOTIFY_TIMEOUT: Duration = Duration::from_secs(30);

/// Pipeline stages, used as a log field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Received,
    Parsed,
    Decided,
    Notified,
    Skipped,
    Committed,
    Done,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Received => "received",
            Stage::Parsed => "parsed",
            Stage::Decided => "decided",
            Stage::Notified => "notified",
            Stage::Skipped => "skipped",
            Stage::Committed => "committed",
            Stage::Done => "done",
        };
        f.write_str(name)
    }
}

/// Successful end state of one invocation.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Notified {
        budget_id: String,
        threshold: Decimal,
    },
    Skipped {
        budget_id: String,
        threshold: Decimal,
        watermark: Decimal,
    },
}

impl Outcome {
    pub fn notified(&self) -> bool {
        matches!(self, Outcome::Notified { .. })
    }
}

/// Bounds on every network suspension point.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub state_store: Duration,
    pub notify: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            state_store: DEFAULT_STATE_STORE_TIMEOUT,
            notify: DEFAULT_NOTIFY_TIMEOUT,
        }
    }
}

/// Parses, deduplicates, notifies and commits one alert at a time.
pub struct Pipeline {
    store: Arc<dyn StateStore>,
    notifier: Arc<dyn Notifier>,
    renderer: MessageRenderer,
    timeouts: Timeouts,
}

impl Pipeline {
    pub fn new(
        store: Arc<dyn StateStore>,
        notifier: Arc<dyn Notifier>,
        renderer: MessageRenderer,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            store,
            notifier,
            renderer,
            timeouts,
        }
    }

    /// Handle one raw inbound payload.
    ///
    /// `Err` means the invocation failed; [`PipelineError::is_retryable`]
    /// tells the transport whether redelivery makes sense.
    pub async fn handle(&self, raw: &[u8]) -> Result<Outcome, PipelineError> {
        metrics::counter!("budgetwatch_events_total").increment(1);
        tracing::debug!(stage = %Stage::Received, bytes = raw.len(), "Event received");

        let event = match parse_event(raw) {
            Ok(event) => event,
            Err(e) => {
                tracing::error!(error = %e, "Rejecting malformed event, will not retry");
                metrics::counter!("budgetwatch_events_malformed_total").increment(1);
                return Err(e.into());
            }
        };

        let span = tracing::info_span!(
            "budget_alert",
            budget_id = %event.budget_id,
            threshold = %event.threshold_fraction
        );
        self.handle_event(event).instrument(span).await
    }

    /// Handle an already parsed alert.
    pub async fn handle_event(&self, event: AlertEvent) -> Result<Outcome, PipelineError> {
        tracing::info!(
            stage = %Stage::Parsed,
            budget_name = %event.budget_display_name,
            cost = %event.cost_amount,
            budget = %event.budget_amount,
            "Budget alert parsed"
        );

        let key = BudgetKey::new(event.budget_id.clone(), event.billing_account_id.clone());

        let current = match self.load_state(&key).await {
            Ok(state) => state,
            Err(e) => {
                tracing::error!(error = %e, "Cannot read notification state, failing for redelivery");
                metrics::counter!("budgetwatch_state_errors_total", "operation" => "get")
                    .increment(1);
                return Err(PipelineError::StateUnavailable(e));
            }
        };

        let decision = decide(&event, current.as_ref(), Utc::now());
        let previous = current.as_ref().map(|s| s.last_notified_threshold);
        tracing::debug!(
            stage = %Stage::Decided,
            notify = decision.notify,
            previous_watermark = ?previous,
            new_watermark = %decision.new_state.last_notified_threshold,
            "Dedup decision made"
        );

        let outcome = if decision.notify {
            self.notify(&event).await?;
            tracing::info!(stage = %Stage::Notified, "Notification sent");
            Outcome::Notified {
                budget_id: event.budget_id.clone(),
                threshold: event.threshold_fraction,
            }
        } else {
            tracing::info!(
                stage = %Stage::Skipped,
                watermark = %decision.new_state.last_notified_threshold,
                "Threshold already notified, skipping"
            );
            metrics::counter!("budgetwatch_notifications_skipped_total").increment(1);
            Outcome::Skipped {
                budget_id: event.budget_id.clone(),
                threshold: event.threshold_fraction,
                watermark: decision.new_state.last_notified_threshold,
            }
        };

        if let Err(e) = self.commit_state(&key, &decision.new_state).await {
            tracing::error!(
                error = %e,
                notified = outcome.notified(),
                watermark = %decision.new_state.last_notified_threshold,
                "Failed to commit notification state; a redelivery may notify again"
            );
            metrics::counter!("budgetwatch_state_errors_total", "operation" => "set")
                .increment(1);
            metrics::counter!("budgetwatch_commit_failures_total").increment(1);
            return Err(PipelineError::CommitFailed {
                budget_id: event.budget_id,
                source: e,
            });
        }
        tracing::debug!(stage = %Stage::Committed, "State committed");

        tracing::debug!(stage = %Stage::Done, "Event handled");
        Ok(outcome)
    }

    async fn load_state(
        &self,
        key: &BudgetKey,
    ) -> Result<Option<crate::state::BudgetNotificationState>, StateStoreError> {
        let limit = self.timeouts.state_store;
        tokio::time::timeout(limit, self.store.get(key))
            .await
            .map_err(|_| StateStoreError::Timeout(limit))?
    }

    async fn commit_state(
        &self,
        key: &BudgetKey,
        state: &crate::state::BudgetNotificationState,
    ) -> Result<(), StateStoreError> {
        let limit = self.timeouts.state_store;
        tokio::time::timeout(limit, self.store.set(key, state))
            .await
            .map_err(|_| StateStoreError::Timeout(limit))?
    }

    async fn notify(&self, event: &AlertEvent) -> Result<(), NotifyError> {
        let message = self.renderer.render(event);
        let record = NotificationRecord::new(message, self.notifier.channel(), event);

        let limit = self.timeouts.notify;
        let result = match tokio::time::timeout(limit, self.notifier.send(&record)).await {
            Ok(result) => result,
            Err(_) => Err(NotifyError::Timeout(limit)),
        };

        if let Err(ref e) = result {
            tracing::error!(
                notifier = self.notifier.name(),
                notifier_type = self.notifier.notifier_type(),
                error = %e,
                "Notification failed, state left uncommitted for redelivery"
            );
        }
        result
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("notifier", &self.notifier.name())
            .field("notifier_type", &self.notifier.notifier_type())
            .field("channel", &self.notifier.channel())
            .field("renderer", &self.renderer)
            .field("timeouts", &self.timeouts)
            .finish()
    }
}
