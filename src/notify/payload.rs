//! Notification record handed to notifiers.

use crate::event::AlertEvent;
use crate::template::RenderedMessage;
use rust_decimal::Decimal;

/// A rendered alert bound to its destination.
///
/// `budget_id` and `threshold_fraction` are carried for logging and error
/// attribution only.
#[derive(Debug, Clone, PartialEq)]
pub struct NotificationRecord {
    pub title: String,
    pub body: String,
    /// Hex accent color (#rrggbb).
    pub color: String,
    pub channel: String,
    pub budget_id: String,
    pub threshold_fraction: Decimal,
}

impl NotificationRecord {
    pub fn new(message: RenderedMessage, channel: &str, event: &AlertEvent) -> Self {
        Self {
            title: message.title,
            body: message.body,
            color: message.color,
            channel: channel.to_string(),
            budget_id: event.budget_id.clone(),
            threshold_fraction: event.threshold_fraction,
        }
    }

    /// Title and body as one markdown text, for APIs without attachments.
    pub fn text(&self) -> String {
        format!("*{}*\n{}", self.title, self.body)
    }
}
