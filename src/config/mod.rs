//! Configuration loading and validation for budgetwatch.
//!
//! This module handles loading the YAML configuration file,
//! validation, and resolving environment variables for secrets.

mod env;
mod notifiers;
mod runtime;
mod secret;
mod types;
mod validation;

// Re-exports publics
pub use env::resolve_env_vars;
pub use notifiers::{
    DEFAULT_SLACK_CHANNEL, ENV_SLACK_CHANNEL, MattermostNotifierConfig, NotifierConfig,
    SlackNotifierConfig,
};
pub use runtime::{RuntimeBackend, RuntimeConfig, RuntimeNotifier, RuntimeState, SlackToken};
pub use secret::SecretString;
pub use types::{
    Config, DEFAULT_CONFIG_PATH, MAX_RETRY_ATTEMPTS, RetryConfig, StateBackendKind, StateConfig,
    TemplatesConfig, TimeoutsConfig,
};
pub use validation::validate_template_render;
