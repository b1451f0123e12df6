//! Pipeline assembly from a [`RuntimeConfig`].

use crate::config::{RuntimeBackend, RuntimeConfig, RuntimeNotifier, SecretString, SlackToken};
use crate::error::{ConfigError, SetupError, StateStoreError};
use crate::notify::Notifier;
use crate::notify::mattermost::MattermostNotifier;
use crate::notify::slack::SlackNotifier;
use crate::pipeline::Pipeline;
use crate::state::{FileBackend, HttpBackend, KvBackend, KvStateStore, MemoryBackend};
use std::sync::Arc;
use std::time::Duration;

/// Build the shared HTTP client with the per-request timeout.
pub fn build_http_client(timeout: Duration) -> Result<reqwest::Client, SetupError> {
    reqwest::Client::builder()
        .timeout(timeout)
        .user_agent(concat!("budgetwatch/", env!("CARGO_PKG_VERSION")))
        .build()
        .map_err(|e| SetupError::HttpClient(e.to_string()))
}

/// Instantiate the configured key-value backend.
pub fn build_backend(backend: &RuntimeBackend, client: &reqwest::Client) -> Arc<dyn KvBackend> {
    match backend {
        RuntimeBackend::File(dir) => Arc::new(FileBackend::new(dir.clone())),
        RuntimeBackend::Http { url, token } => {
            Arc::new(HttpBackend::new(client.clone(), url, token.clone()))
        }
        RuntimeBackend::Memory => Arc::new(MemoryBackend::new()),
    }
}

/// Read the Slack bot token stored under `key` (raw text or a JSON string).
pub async fn fetch_stored_token(
    backend: &dyn KvBackend,
    key: &str,
    timeout: Duration,
) -> Result<SecretString, SetupError> {
    let fetched = tokio::time::timeout(timeout, backend.get(key))
        .await
        .map_err(|_| StateStoreError::Timeout(timeout))
        .and_then(|r| r);

    let bytes = match fetched {
        Ok(Some(bytes)) => bytes,
        Ok(None) => {
            return Err(ConfigError::ValidationError(format!(
                "notifier.token_key '{}' not found in {} state backend",
                key,
                backend.backend_type()
            ))
            .into());
        }
        Err(source) => {
            return Err(SetupError::TokenUnavailable {
                key: key.to_string(),
                source,
            });
        }
    };

    let text = String::from_utf8(bytes).map_err(|_| {
        ConfigError::ValidationError(format!("notifier.token_key '{}' is not UTF-8", key))
    })?;
    let trimmed = text.trim();
    let token = if trimmed.starts_with('"') {
        serde_json::from_str::<String>(trimmed).unwrap_or_else(|_| trimmed.to_string())
    } else {
        trimmed.to_string()
    };

    if token.is_empty() {
        return Err(ConfigError::ValidationError(format!(
            "notifier.token_key '{}' holds an empty value",
            key
        ))
        .into());
    }

    tracing::debug!(key = %key, "Loaded notifier token from state backend");
    Ok(SecretString::new(token))
}

/// Instantiate the configured notifier.
pub async fn build_notifier(
    config: &RuntimeConfig,
    client: &reqwest::Client,
    backend: &dyn KvBackend,
) -> Result<Arc<dyn Notifier>, SetupError> {
    match config.notifier {
        RuntimeNotifier::Slack {
            ref token,
            ref channel,
            ref api_url,
        } => {
            let (token, source) = match token {
                SlackToken::Inline(token) => (token.clone(), "config"),
                SlackToken::StoredAt(key) => (
                    fetch_stored_token(backend, key, config.timeouts.state_store).await?,
                    "state backend",
                ),
            };
            tracing::debug!(token = %token.hint(), source, "Slack token resolved");
            Ok(Arc::new(
                SlackNotifier::new(
                    "slack".to_string(),
                    client.clone(),
                    token,
                    channel.clone(),
                    config.retry,
                )
                .with_api_url(api_url),
            ))
        }
        RuntimeNotifier::Mattermost {
            ref webhook_url,
            ref channel,
        } => Ok(Arc::new(MattermostNotifier::new(
            "mattermost".to_string(),
            webhook_url.clone(),
            channel.clone(),
            client.clone(),
            config.retry,
        ))),
    }
}

/// Assemble the whole pipeline.
///
/// # Errors
/// [`SetupError::TokenUnavailable`] is retryable; everything else means the
/// configuration must be fixed.
pub async fn build_pipeline(config: &RuntimeConfig) -> Result<Pipeline, SetupError> {
    let client = build_http_client(config.http_request_timeout)?;
    let backend = build_backend(&config.state.backend, &client);
    let notifier = build_notifier(config, &client, backend.as_ref()).await?;

    tracing::info!(
        notifier_type = notifier.notifier_type(),
        channel = %notifier.channel(),
        backend = backend.backend_type(),
        key_prefix = %config.state.key_prefix,
        "Pipeline assembled"
    );

    let store = KvStateStore::new(backend, config.state.key_prefix.clone());
    Ok(Pipeline::new(
        Arc::new(store),
        notifier,
        config.renderer(),
        config.timeouts,
    ))
}
