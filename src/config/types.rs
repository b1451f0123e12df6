//! Core configuration types and loading.

use super::notifiers::NotifierConfig;
use super::validation::{validate_jinja_template, validate_key_prefix, validate_template_render};
use crate::error::ConfigError;
use crate::state::DEFAULT_KEY_PREFIX;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default configuration file path.
pub const DEFAULT_CONFIG_PATH: &str = "/etc/budgetwatch/config.yaml";

/// Upper bound for `retry.max_attempts`.
pub const MAX_RETRY_ATTEMPTS: u32 = 10;

/// Main configuration structure for budgetwatch.
#[derive(Debug, Deserialize)]
pub struct Config {
    /// Where notifications go.
    pub notifier: NotifierConfig,
    /// Where watermarks live.
    pub state: StateConfig,
    #[serde(default)]
    pub timeouts: TimeoutsConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    /// Custom message templates; the embedded ones are used when absent.
    #[serde(default)]
    pub templates: Option<TemplatesConfig>,
}

/// Kind of key-value backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StateBackendKind {
    File,
    Http,
    Memory,
}

impl std::fmt::Display for StateBackendKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            StateBackendKind::File => "file",
            StateBackendKind::Http => "http",
            StateBackendKind::Memory => "memory",
        };
        f.write_str(name)
    }
}

/// State backend configuration.
///
/// `path` applies to `file`, `url` and `token` to `http`.
#[derive(Debug, Clone, Deserialize)]
pub struct StateConfig {
    pub backend: StateBackendKind,
    #[serde(default)]
    pub path: Option<String>,
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default = "default_key_prefix")]
    pub key_prefix: String,
}

fn default_key_prefix() -> String {
    DEFAULT_KEY_PREFIX.to_string()
}

/// Bounds on every network call.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutsConfig {
    /// Per state-store call.
    #[serde(default = "default_state_store_timeout", with = "humantime_serde")]
    pub state_store: Duration,
    /// Whole send, retries included.
    #[serde(default = "default_notify_timeout", with = "humantime_serde")]
    pub notify: Duration,
    /// Per HTTP request (reqwest client timeout).
    #[serde(default = "default_http_request_timeout", with = "humantime_serde")]
    pub http_request: Duration,
}

fn default_state_store_timeout() -> Duration {
    Duration::from_secs(5)
}

fn default_notify_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_http_request_timeout() -> Duration {
    Duration::from_secs(10)
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            state_store: default_state_store_timeout(),
            notify: default_notify_timeout(),
            http_request: default_http_request_timeout(),
        }
    }
}

/// Notification retry settings.
#[derive(Debug, Clone, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_backoff_base", with = "humantime_serde")]
    pub backoff_base: Duration,
    #[serde(default = "default_backoff_max", with = "humantime_serde")]
    pub backoff_max: Duration,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_backoff_base() -> Duration {
    Duration::from_millis(500)
}

fn default_backoff_max() -> Duration {
    Duration::from_secs(5)
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            backoff_base: default_backoff_base(),
            backoff_max: default_backoff_max(),
        }
    }
}

/// Message templates (minijinja syntax).
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TemplatesConfig {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub body: Option<String>,
}

impl Config {
    /// Load configuration from a file path.
    ///
    /// # Errors
    /// Returns [`ConfigError::LoadError`] if the file cannot be read.
    /// Returns [`ConfigError::ValidationError`] if the YAML is invalid.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::LoadError(format!("{}: {}", path.display(), e)))?;

        Self::from_yaml(&content)
    }

    /// Parse configuration from YAML text.
    pub fn from_yaml(content: &str) -> Result<Self, ConfigError> {
        serde_yaml::from_str(content).map_err(|e| ConfigError::ValidationError(e.to_string()))
    }

    /// Check everything that can be checked without the environment.
    ///
    /// # Errors
    /// Returns every problem found, not just the first one.
    pub fn validate(&self) -> Result<(), Vec<ConfigError>> {
        let mut errors = Vec::new();

        self.validate_notifier(&mut errors);
        self.validate_state(&mut errors);

        for (name, value) in [
            ("timeouts.state_store", self.timeouts.state_store),
            ("timeouts.notify", self.timeouts.notify),
            ("timeouts.http_request", self.timeouts.http_request),
        ] {
            if value.is_zero() {
                errors.push(ConfigError::ValidationError(format!(
                    "{} must be greater than zero",
                    name
                )));
            }
        }

        if self.retry.max_attempts == 0 || self.retry.max_attempts > MAX_RETRY_ATTEMPTS {
            errors.push(ConfigError::ValidationError(format!(
                "retry.max_attempts must be between 1 and {}, got {}",
                MAX_RETRY_ATTEMPTS, self.retry.max_attempts
            )));
        }
        if self.retry.backoff_base > self.retry.backoff_max {
            errors.push(ConfigError::ValidationError(
                "retry.backoff_base must not exceed retry.backoff_max".to_string(),
            ));
        }

        if let Some(ref templates) = self.templates {
            for (name, source) in [("title", &templates.title), ("body", &templates.body)] {
                let Some(source) = source else { continue };
                let result =
                    validate_jinja_template(source).and_then(|_| validate_template_render(source));
                if let Err(message) = result {
                    errors.push(ConfigError::InvalidTemplate {
                        name: name.to_string(),
                        message,
                    });
                }
            }
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }

    fn validate_notifier(&self, errors: &mut Vec<ConfigError>) {
        match self.notifier {
            NotifierConfig::Slack(ref slack) => {
                let has_token = slack.token.as_deref().is_some_and(|t| !t.trim().is_empty());
                let has_key = slack
                    .token_key
                    .as_deref()
                    .is_some_and(|k| !k.trim().is_empty());

                if !has_token && !has_key {
                    errors.push(ConfigError::ValidationError(
                        "notifier: slack requires 'token' or 'token_key'".to_string(),
                    ));
                }
                if !has_token && has_key && self.state.backend == StateBackendKind::Memory {
                    errors.push(ConfigError::ValidationError(
                        "notifier.token_key requires a file or http state backend".to_string(),
                    ));
                }
                if let Some(ref url) = slack.api_url
                    && !is_http_url(url)
                {
                    errors.push(ConfigError::ValidationError(format!(
                        "notifier.api_url must start with http:// or https://, got '{}'",
                        url
                    )));
                }
                if let Some(ref channel) = slack.channel
                    && channel.trim().is_empty()
                {
                    errors.push(ConfigError::ValidationError(
                        "notifier.channel cannot be empty".to_string(),
                    ));
                }
            }
            NotifierConfig::Mattermost(ref mm) => {
                if mm.webhook_url.trim().is_empty() {
                    errors.push(ConfigError::ValidationError(
                        "notifier.webhook_url cannot be empty".to_string(),
                    ));
                }
            }
        }
    }

    fn validate_state(&self, errors: &mut Vec<ConfigError>) {
        let state = &self.state;
        match state.backend {
            StateBackendKind::File => {
                if state.path.as_deref().is_none_or(|p| p.trim().is_empty()) {
                    errors.push(ConfigError::ValidationError(
                        "state.path is required for the file backend".to_string(),
                    ));
                }
            }
            StateBackendKind::Http => match state.url.as_deref() {
                None => errors.push(ConfigError::ValidationError(
                    "state.url is required for the http backend".to_string(),
                )),
                // `${VAR}` references are checked once resolved.
                Some(url) if !url.contains("${") && !is_http_url(url) => {
                    errors.push(ConfigError::ValidationError(format!(
                        "state.url must start with http:// or https://, got '{}'",
                        url
                    )));
                }
                Some(_) => {}
            },
            StateBackendKind::Memory => {}
        }

        if let Err(e) = validate_key_prefix(&state.key_prefix) {
            errors.push(ConfigError::ValidationError(format!("state.key_prefix: {}", e)));
        }
    }
}

impl StateConfig {
    /// `path` as a filesystem path (file backend).
    pub fn path_buf(&self) -> Option<PathBuf> {
        self.path.as_ref().map(PathBuf::from)
    }
}

pub(crate) fn is_http_url(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}
