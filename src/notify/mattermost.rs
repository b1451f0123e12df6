//! Mattermost notifier implementation.
//!
//! Sends alerts through an incoming webhook as a single colored attachment.

use crate::config::SecretString;
use crate::error::NotifyError;
use crate::notify::{
    AttemptError, NotificationRecord, Notifier, RetryPolicy, retry_after_header, send_with_retry,
};
use async_trait::async_trait;
use reqwest::StatusCode;
use serde::Serialize;
use tracing::Instrument;

/// Mattermost attachment structure for incoming webhooks.
#[derive(Debug, Clone, Serialize)]
struct MattermostAttachment {
    fallback: String,
    color: String,
    title: String,
    text: String,
    footer: String,
}

/// Mattermost webhook payload structure.
#[derive(Debug, Clone, Serialize)]
struct MattermostPayload {
    #[serde(skip_serializing_if = "Option::is_none")]
    channel: Option<String>,
    attachments: Vec<MattermostAttachment>,
}

fn build_mattermost_payload(record: &NotificationRecord) -> MattermostPayload {
    MattermostPayload {
        // Empty channel means "the webhook's own channel".
        channel: Some(record.channel.clone()).filter(|c| !c.is_empty()),
        attachments: vec![MattermostAttachment {
            fallback: record.title.clone(),
            color: record.color.clone(),
            title: record.title.clone(),
            text: record.body.clone(),
            footer: format!("budgetwatch | {}", record.budget_id),
        }],
    }
}

/// Mattermost notifier.
///
/// # Retry Policy
///
/// - **429 / 5xx / network errors**: retry with backoff
/// - **Other 4xx**: do NOT retry (bad webhook, invalid payload)
pub struct MattermostNotifier {
    name: String,
    webhook_url: SecretString,
    channel: String,
    client: reqwest::Client,
    retry: RetryPolicy,
}

impl MattermostNotifier {
    /// `channel` may be empty to post to the webhook's default channel.
    pub fn new(
        name: String,
        webhook_url: SecretString,
        channel: String,
        client: reqwest::Client,
        retry: RetryPolicy,
    ) -> Self {
        Self {
            name,
            webhook_url,
            channel,
            client,
            retry,
        }
    }

    async fn attempt(&self, payload: &MattermostPayload) -> Result<(), AttemptError> {
        let response = self
            .client
            .post(self.webhook_url.expose())
            .json(payload)
            .send()
            .await
            .map_err(|e| AttemptError::transient(format!("request failed: {}", e)))?;

        let status = response.status();
        if status.is_success() {
            Ok(())
        } else if status == StatusCode::TOO_MANY_REQUESTS {
            Err(AttemptError::Transient {
                reason: "rate limited (HTTP 429)".to_string(),
                retry_after: retry_after_header(response.headers()),
            })
        } else if status.is_server_error() {
            Err(AttemptError::transient(format!("server error: {}", status)))
        } else {
            Err(AttemptError::Permanent(format!("client error: {}", status)))
        }
    }
}

#[async_trait]
impl Notifier for MattermostNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    fn notifier_type(&self) -> &str {
        "mattermost"
    }

    fn channel(&self) -> &str {
        &self.channel
    }

    async fn send(&self, record: &NotificationRecord) -> Result<(), NotifyError> {
        let span = tracing::info_span!(
            "send_mattermost",
            notifier_name = %self.name,
            budget_id = %record.budget_id,
            threshold = %record.threshold_fraction
        );

        let payload = build_mattermost_payload(record);
        send_with_retry(&self.retry, "mattermost", |_| self.attempt(&payload))
            .instrument(span)
            .await
    }
}

impl std::fmt::Debug for MattermostNotifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MattermostNotifier")
            .field("name", &self.name)
            .field("channel", &self.channel)
            .field("webhook_url", &self.webhook_url)
            .finish()
    }
}
