//! Command-line interface for budgetwatch using clap.
//!
//! One invocation handles one event; the exit status is the report back to
//! the delivering transport.

use clap::{Parser, ValueEnum};
use std::path::PathBuf;

use crate::config::DEFAULT_CONFIG_PATH;
use crate::error::{PipelineError, SetupError};

/// Event handled, notified or skipped.
pub const EXIT_DONE: i32 = 0;
/// Transient failure; the transport should redeliver.
pub const EXIT_RETRYABLE: i32 = 1;
/// Permanent failure; redelivering the same payload cannot succeed.
pub const EXIT_REJECTED: i32 = 2;
/// Configuration is missing or invalid.
pub const EXIT_CONFIG: i32 = 3;

/// Log output format.
#[derive(Debug, Clone, Copy, Default, ValueEnum)]
pub enum LogFormat {
    /// Human-readable text format (default).
    #[default]
    Text,
    /// Structured JSON format for log aggregation.
    Json,
}

/// Deduplicated chat notifications for cloud billing budget alerts.
#[derive(Parser, Debug)]
#[command(name = "budgetwatch")]
#[command(version)]
#[command(about = "Deduplicated chat notifications for cloud billing budget alerts")]
pub struct Cli {
    /// Path to configuration file.
    #[arg(short = 'c', long = "config", default_value = DEFAULT_CONFIG_PATH)]
    pub config: PathBuf,

    /// Validate configuration and exit.
    #[arg(long = "validate")]
    pub validate: bool,

    /// Read the event payload from this file instead of stdin ("-" = stdin).
    #[arg(short = 'e', long = "event")]
    pub event: Option<PathBuf>,

    /// Parse and render the event, print the message, touch nothing.
    #[arg(long = "dry-run", conflicts_with = "validate")]
    pub dry_run: bool,

    /// Log format: text or json.
    #[arg(long = "log-format", value_enum, default_value_t = LogFormat::Text, env = "LOG_FORMAT")]
    pub log_format: LogFormat,
}

impl Cli {
    /// Event file, `None` meaning stdin.
    pub fn event_path(&self) -> Option<&PathBuf> {
        self.event.as_ref().filter(|p| p.as_os_str() != "-")
    }
}

/// Exit status for a failed invocation.
pub fn exit_code_for(err: &PipelineError) -> i32 {
    if err.is_retryable() {
        EXIT_RETRYABLE
    } else {
        EXIT_REJECTED
    }
}

/// Exit status for a failure while assembling the pipeline.
pub fn setup_exit_code(err: &SetupError) -> i32 {
    if err.is_retryable() {
        EXIT_RETRYABLE
    } else {
        EXIT_CONFIG
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::{ConfigError, MalformedEventError, NotifyError, StateStoreError};
    use serial_test::serial;

    #[test]
    fn cli_default_config_path() {
        let cli = Cli::try_parse_from(["budgetwatch"]).unwrap();
        assert_eq!(cli.config, PathBuf::from(DEFAULT_CONFIG_PATH));
        assert!(cli.event_path().is_none());
        assert!(!cli.dry_run);
    }

    #[test]
    fn cli_custom_config_path() {
        let cli = Cli::try_parse_from(["budgetwatch", "-c", "/custom/path.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/custom/path.yaml"));

        let cli = Cli::try_parse_from(["budgetwatch", "--config", "/long/path.yaml"]).unwrap();
        assert_eq!(cli.config, PathBuf::from("/long/path.yaml"));
    }

    #[test]
    fn cli_event_path() {
        let cli = Cli::try_parse_from(["budgetwatch", "--event", "/tmp/alert.json"]).unwrap();
        assert_eq!(cli.event_path(), Some(&PathBuf::from("/tmp/alert.json")));

        let cli = Cli::try_parse_from(["budgetwatch", "-e", "-"]).unwrap();
        assert!(cli.event_path().is_none());
    }

    #[test]
    fn cli_validate_flag() {
        let cli = Cli::try_parse_from(["budgetwatch", "--validate"]).unwrap();
        assert!(cli.validate);
    }

    #[test]
    fn cli_dry_run_conflicts_with_validate() {
        let result = Cli::try_parse_from(["budgetwatch", "--validate", "--dry-run"]);
        assert!(result.is_err());
    }

    #[test]
    fn cli_log_format_default() {
        let cli = Cli::try_parse_from(["budgetwatch"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Text));
    }

    #[test]
    fn cli_log_format_json() {
        let cli = Cli::try_parse_from(["budgetwatch", "--log-format", "json"]).unwrap();
        assert!(matches!(cli.log_format, LogFormat::Json));
    }

    #[test]
    fn cli_log_format_invalid_rejected() {
        let result = Cli::try_parse_from(["budgetwatch", "--log-format", "invalid"]);
        assert!(result.is_err(), "Invalid log format should be rejected");
    }

    #[test]
    #[serial]
    fn cli_log_format_from_env() {
        temp_env::with_var("LOG_FORMAT", Some("json"), || {
            let cli = Cli::try_parse_from(["budgetwatch"]).unwrap();
            assert!(matches!(cli.log_format, LogFormat::Json));
        });
    }

    #[test]
    #[serial]
    fn cli_log_format_flag_overrides_env() {
        temp_env::with_var("LOG_FORMAT", Some("json"), || {
            let cli = Cli::try_parse_from(["budgetwatch", "--log-format", "text"]).unwrap();
            assert!(matches!(cli.log_format, LogFormat::Text));
        });
    }

    #[test]
    fn exit_codes_follow_retryability() {
        let malformed = PipelineError::from(MalformedEventError::MissingField("budgetAmount"));
        assert_eq!(exit_code_for(&malformed), EXIT_REJECTED);

        let notify = PipelineError::from(NotifyError::Permanent("invalid_auth".to_string()));
        assert_eq!(exit_code_for(&notify), EXIT_RETRYABLE);

        let state = PipelineError::StateUnavailable(StateStoreError::Transport("x".to_string()));
        assert_eq!(exit_code_for(&state), EXIT_RETRYABLE);

        let config = SetupError::Config(ConfigError::ValidationError("x".to_string()));
        assert_eq!(setup_exit_code(&config), EXIT_CONFIG);

        let token = SetupError::TokenUnavailable {
            key: "k".to_string(),
            source: StateStoreError::Transport("x".to_string()),
        };
        assert_eq!(setup_exit_code(&token), EXIT_RETRYABLE);
    }
}
