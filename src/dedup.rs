//! Notify-or-skip decision against the stored watermark.
//!
//! Cloud Billing keeps re-publishing a budget notification for as long as the
//! condition holds, and Pub/Sub may deliver any of them more than once. A
//! notification goes out only when the alert's threshold is strictly above
//! the highest threshold already announced for that budget.
//!
//! ```text
//! stored   event   notify   new watermark
//! (none)   0.10    yes      0.10
//! 0.50     0.50    no       0.50
//! 0.50     0.51    yes      0.51
//! 0.90     0.50    no       0.90   (stale redelivery never lowers it)
//! ```
//!
//! No I/O happens here; the current time is passed in so decisions are
//! reproducible.

use crate::event::AlertEvent;
use crate::state::BudgetNotificationState;
use chrono::{DateTime, Utc};

/// Outcome of [`decide`].
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub notify: bool,
    pub new_state: BudgetNotificationState,
}

/// Compare `event` against the stored watermark.
///
/// Absent state behaves like an infinitely low watermark. The returned
/// watermark is `max(event, stored)`, so it never decreases.
pub fn decide(
    event: &AlertEvent,
    current: Option<&BudgetNotificationState>,
    now: DateTime<Utc>,
) -> Decision {
    let (notify, last_notified_threshold) = match current {
        None => (true, event.threshold_fraction),
        Some(state) => (
            event.threshold_fraction > state.last_notified_threshold,
            event.threshold_fraction.max(state.last_notified_threshold),
        ),
    };

    let cost_interval_start = event
        .cost_interval_start
        .or_else(|| current.and_then(|s| s.cost_interval_start));

    Decision {
        notify,
        new_state: BudgetNotificationState {
            last_notified_threshold,
            updated_at: now,
            cost_interval_start,
        },
    }
}
