//! Notifier configuration types.

use serde::Deserialize;

/// Channel used when neither the config nor `SLACK_CHANNEL` names one.
pub const DEFAULT_SLACK_CHANNEL: &str = "#billing-alerts";

/// Environment variable consulted when `notifier.channel` is absent.
pub const ENV_SLACK_CHANNEL: &str = "SLACK_CHANNEL";

/// Chat destination, tagged by `type`.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum NotifierConfig {
    /// Slack Web API with a bot token.
    #[serde(rename = "slack")]
    Slack(SlackNotifierConfig),
    /// Mattermost incoming webhook.
    #[serde(rename = "mattermost")]
    Mattermost(MattermostNotifierConfig),
}

impl NotifierConfig {
    pub fn notifier_type(&self) -> &'static str {
        match self {
            NotifierConfig::Slack(_) => "slack",
            NotifierConfig::Mattermost(_) => "mattermost",
        }
    }
}

/// Slack notifier configuration.
///
/// Exactly one of `token` and `token_key` is expected. `token_key` names a
/// key in the state backend holding the bot token.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SlackNotifierConfig {
    /// Bot token; supports `${ENV_VAR}` substitution.
    #[serde(default)]
    pub token: Option<String>,
    #[serde(default)]
    pub token_key: Option<String>,
    #[serde(default)]
    pub channel: Option<String>,
    /// Web API base URL, overridable for proxies.
    #[serde(default)]
    pub api_url: Option<String>,
}

/// Mattermost notifier configuration.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MattermostNotifierConfig {
    /// Webhook URL; supports `${ENV_VAR}` substitution.
    pub webhook_url: String,
    /// Overrides the webhook's default channel.
    #[serde(default)]
    pub channel: Option<String>,
}
