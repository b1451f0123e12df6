//! Centralized error types for budgetwatch using thiserror.
//!
//! Each pipeline stage has its own error enum; [`PipelineError`] wraps them
//! and decides what the invoking transport should do with a failure.

use std::time::Duration;
use thiserror::Error;

/// Errors related to configuration loading and validation.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load config file: {0}")]
    LoadError(String),
    #[error("invalid configuration: {0}")]
    ValidationError(String),
    #[error("invalid template '{name}': {message}")]
    InvalidTemplate { name: String, message: String },
}

/// The inbound payload could not be turned into an alert.
///
/// Never retried: a malformed payload stays malformed on redelivery.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum MalformedEventError {
    #[error("cannot decode payload: {0}")]
    Decode(String),
    #[error("missing required field '{0}'")]
    MissingField(&'static str),
    #[error("field '{field}' is not numeric: {value}")]
    NonNumeric { field: &'static str, value: String },
    #[error("invalid value for '{field}': {reason}")]
    InvalidAmount {
        field: &'static str,
        reason: String,
    },
}

/// Failures talking to the external key-value service.
///
/// Distinct from "absent": an unknown key is `Ok(None)`, never an error.
#[derive(Error, Debug)]
pub enum StateStoreError {
    #[error("state store transport error: {0}")]
    Transport(String),
    #[error("state store rejected credentials: {0}")]
    Unauthorized(String),
    #[error("state store call timed out after {0:?}")]
    Timeout(Duration),
    #[error("cannot encode state: {0}")]
    Encode(String),
}

/// Errors related to chat notification sending.
#[derive(Error, Debug)]
pub enum NotifyError {
    /// Transient failures persisted through every retry attempt.
    #[error("delivery failed after {attempts} attempts: {last_error}")]
    DeliveryFailed { attempts: u32, last_error: String },
    /// Non-retryable rejection (bad credentials, unknown channel, ...).
    #[error("notification rejected: {0}")]
    Permanent(String),
    #[error("notification timed out after {0:?}")]
    Timeout(Duration),
}

/// Terminal failure of one pipeline invocation.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("malformed event: {0}")]
    MalformedEvent(#[from] MalformedEventError),
    #[error("state unavailable: {0}")]
    StateUnavailable(#[source] StateStoreError),
    #[error("notify error: {0}")]
    Notify(#[from] NotifyError),
    #[error("commit failed for budget '{budget_id}': {source}")]
    CommitFailed {
        budget_id: String,
        #[source]
        source: StateStoreError,
    },
}

impl PipelineError {
    /// Whether redelivering the same event can succeed.
    pub fn is_retryable(&self) -> bool {
        !matches!(self, PipelineError::MalformedEvent(_))
    }

    /// Short machine-readable reason, used for log fields and metric labels.
    pub fn reason(&self) -> &'static str {
        match self {
            PipelineError::MalformedEvent(_) => "malformed_event",
            PipelineError::StateUnavailable(_) => "state_unavailable",
            PipelineError::Notify(_) => "notify_error",
            PipelineError::CommitFailed { .. } => "commit_failed",
        }
    }
}

/// Failure while assembling the pipeline from a runtime configuration.
#[derive(Error, Debug)]
pub enum SetupError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("cannot build HTTP client: {0}")]
    HttpClient(String),
    /// The Slack token lives in the state backend and could not be read.
    #[error("cannot read notifier token '{key}': {source}")]
    TokenUnavailable {
        key: String,
        #[source]
        source: StateStoreError,
    },
}

impl SetupError {
    /// Only a backend hiccup while fetching the token is worth a redelivery.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SetupError::TokenUnavailable { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_error_display() {
        let err = ConfigError::LoadError("file not found".to_string());
        assert_eq!(err.to_string(), "failed to load config file: file not found");

        let err = ConfigError::InvalidTemplate {
            name: "title".to_string(),
            message: "unclosed block".to_string(),
        };
        assert_eq!(err.to_string(), "invalid template 'title': unclosed block");
    }

    #[test]
    fn malformed_event_display() {
        let err = MalformedEventError::MissingField("budgetAmount");
        assert_eq!(err.to_string(), "missing required field 'budgetAmount'");

        let err = MalformedEventError::NonNumeric {
            field: "costAmount",
            value: "\"lots\"".to_string(),
        };
        assert_eq!(err.to_string(), "field 'costAmount' is not numeric: \"lots\"");
    }

    #[test]
    fn notify_error_display() {
        let err = NotifyError::DeliveryFailed {
            attempts: 3,
            last_error: "HTTP 503".to_string(),
        };
        assert_eq!(err.to_string(), "delivery failed after 3 attempts: HTTP 503");

        let err = NotifyError::Permanent("invalid_auth".to_string());
        assert_eq!(err.to_string(), "notification rejected: invalid_auth");
    }

    #[test]
    fn setup_error_retryability() {
        let missing = SetupError::Config(ConfigError::ValidationError("no token".into()));
        assert!(!missing.is_retryable());

        let unavailable = SetupError::TokenUnavailable {
            key: "slack-bot-token".to_string(),
            source: StateStoreError::Transport("connection refused".to_string()),
        };
        assert!(unavailable.is_retryable());
        assert_eq!(
            unavailable.to_string(),
            "cannot read notifier token 'slack-bot-token': state store transport error: connection refused"
        );
    }

    #[test]
    fn pipeline_error_retryability() {
        let malformed = PipelineError::from(MalformedEventError::MissingField("budgetId"));
        assert!(!malformed.is_retryable());
        assert_eq!(malformed.reason(), "malformed_event");

        let unavailable =
            PipelineError::StateUnavailable(StateStoreError::Transport("reset".to_string()));
        assert!(unavailable.is_retryable());

        let permanent = PipelineError::from(NotifyError::Permanent("channel_not_found".into()));
        assert!(permanent.is_retryable());

        let commit = PipelineError::CommitFailed {
            budget_id: "b-1".to_string(),
            source: StateStoreError::Timeout(Duration::from_secs(5)),
        };
        assert!(commit.is_retryable());
        assert_eq!(
            commit.to_string(),
            "commit failed for budget 'b-1': state store call timed out after 5s"
        );
    }
}
