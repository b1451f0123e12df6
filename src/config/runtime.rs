//! Runtime configuration: environment resolved, defaults applied.

use super::env::{resolve_env_vars, resolve_optional};
use super::notifiers::{DEFAULT_SLACK_CHANNEL, ENV_SLACK_CHANNEL, NotifierConfig};
use super::secret::SecretString;
use super::types::{Config, StateBackendKind, is_http_url};
use crate::error::ConfigError;
use crate::notify::RetryPolicy;
use crate::notify::slack::SLACK_API_URL;
use crate::pipeline::Timeouts;
use crate::template::{DEFAULT_BODY_TEMPLATE, DEFAULT_TITLE_TEMPLATE, MessageRenderer};
use std::path::PathBuf;
use std::time::Duration;

/// Configuration ready to build the pipeline from.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
    pub notifier: RuntimeNotifier,
    pub state: RuntimeState,
    pub timeouts: Timeouts,
    /// Per HTTP request, shared by every reqwest call.
    pub http_request_timeout: Duration,
    pub retry: RetryPolicy,
    pub title_template: String,
    pub body_template: String,
}

/// Resolved notifier settings.
#[derive(Debug, Clone)]
pub enum RuntimeNotifier {
    Slack {
        token: SlackToken,
        channel: String,
        api_url: String,
    },
    Mattermost {
        webhook_url: SecretString,
        /// Empty means the webhook's own channel.
        channel: String,
    },
}

/// Where the Slack bot token comes from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SlackToken {
    Inline(SecretString),
    /// Read from the state backend under this key.
    StoredAt(String),
}

/// Resolved state backend settings.
#[derive(Debug, Clone)]
pub struct RuntimeState {
    pub backend: RuntimeBackend,
    pub key_prefix: String,
}

#[derive(Debug, Clone)]
pub enum RuntimeBackend {
    File(PathBuf),
    Http {
        url: String,
        token: Option<SecretString>,
    },
    Memory,
}

impl RuntimeNotifier {
    pub fn notifier_type(&self) -> &'static str {
        match self {
            RuntimeNotifier::Slack { .. } => "slack",
            RuntimeNotifier::Mattermost { .. } => "mattermost",
        }
    }
}

impl RuntimeConfig {
    /// Renderer for the configured templates.
    pub fn renderer(&self) -> MessageRenderer {
        MessageRenderer::new(self.title_template.clone(), self.body_template.clone())
    }
}

impl Config {
    /// Resolve `${VAR}` references and fallbacks.
    ///
    /// Call after [`Config::validate`].
    ///
    /// # Errors
    /// Returns [`ConfigError::ValidationError`] for undefined environment
    /// variables or values that are invalid once resolved.
    pub fn compile(self) -> Result<RuntimeConfig, ConfigError> {
        let notifier = match self.notifier {
            NotifierConfig::Slack(slack) => {
                // An undefined variable in `token` is fatal only without a
                // `token_key` to fall back to.
                let resolved = match resolve_optional(slack.token.as_deref()) {
                    Ok(token) => token,
                    Err(e) if slack.token_key.is_some() => {
                        tracing::debug!(error = %e, "Slack token unresolved, using token_key");
                        None
                    }
                    Err(e) => return Err(e),
                };
                let token = match resolved {
                    Some(token) if !token.trim().is_empty() => {
                        SlackToken::Inline(SecretString::new(token))
                    }
                    _ => match slack.token_key {
                        Some(key) if !key.trim().is_empty() => SlackToken::StoredAt(key),
                        _ => {
                            return Err(ConfigError::ValidationError(
                                "notifier: slack token resolved to an empty value and no \
                                 token_key is set"
                                    .to_string(),
                            ));
                        }
                    },
                };

                let channel = slack
                    .channel
                    .or_else(|| std::env::var(ENV_SLACK_CHANNEL).ok())
                    .filter(|c| !c.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_SLACK_CHANNEL.to_string());

                RuntimeNotifier::Slack {
                    token,
                    channel,
                    api_url: slack.api_url.unwrap_or_else(|| SLACK_API_URL.to_string()),
                }
            }
            NotifierConfig::Mattermost(mm) => {
                let url = resolve_env_vars(&mm.webhook_url)?;
                if !is_http_url(&url) {
                    return Err(ConfigError::ValidationError(
                        "notifier.webhook_url must start with http:// or https://".to_string(),
                    ));
                }
                RuntimeNotifier::Mattermost {
                    webhook_url: SecretString::new(url),
                    channel: mm.channel.unwrap_or_default(),
                }
            }
        };

        let backend = match self.state.backend {
            StateBackendKind::File => {
                let path = resolve_optional(self.state.path.as_deref())?.ok_or_else(|| {
                    ConfigError::ValidationError("state.path is required".to_string())
                })?;
                RuntimeBackend::File(PathBuf::from(path))
            }
            StateBackendKind::Http => {
                let url = resolve_optional(self.state.url.as_deref())?.ok_or_else(|| {
                    ConfigError::ValidationError("state.url is required".to_string())
                })?;
                if !is_http_url(&url) {
                    return Err(ConfigError::ValidationError(
                        "state.url must start with http:// or https://".to_string(),
                    ));
                }
                let token = resolve_optional(self.state.token.as_deref())?
                    .filter(|t| !t.is_empty())
                    .map(SecretString::new);
                RuntimeBackend::Http { url, token }
            }
            StateBackendKind::Memory => RuntimeBackend::Memory,
        };

        let templates = self.templates.unwrap_or_default();

        Ok(RuntimeConfig {
            notifier,
            state: RuntimeState {
                backend,
                key_prefix: self.state.key_prefix,
            },
            timeouts: Timeouts {
                state_store: self.timeouts.state_store,
                notify: self.timeouts.notify,
            },
            http_request_timeout: self.timeouts.http_request,
            retry: RetryPolicy {
                max_attempts: self.retry.max_attempts,
                backoff_base: self.retry.backoff_base,
                backoff_max: self.retry.backoff_max,
            },
            title_template: templates
                .title
                .unwrap_or_else(|| DEFAULT_TITLE_TEMPLATE.to_string()),
            body_template: templates
                .body
                .unwrap_or_else(|| DEFAULT_BODY_TEMPLATE.to_string()),
        })
    }
}
