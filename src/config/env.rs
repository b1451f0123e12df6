//! Environment variable substitution.

use crate::error::ConfigError;
use regex::Regex;
use std::sync::LazyLock;

static ENV_VAR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var regex")
});

/// Resolves `${VAR_NAME}` patterns in a string.
///
/// Every undefined variable is reported in one error.
pub fn resolve_env_vars(value: &str) -> Result<String, ConfigError> {
    let mut missing = Vec::new();

    let resolved = ENV_VAR_PATTERN.replace_all(value, |caps: &regex::Captures<'_>| {
        match std::env::var(&caps[1]) {
            Ok(v) => v,
            Err(_) => {
                missing.push(caps[1].to_string());
                String::new()
            }
        }
    });

    if missing.is_empty() {
        Ok(resolved.into_owned())
    } else {
        Err(ConfigError::ValidationError(format!(
            "undefined environment variable{}: {}",
            if missing.len() > 1 { "s" } else { "" },
            missing.join(", ")
        )))
    }
}

/// [`resolve_env_vars`] for optional fields.
pub fn resolve_optional(value: Option<&str>) -> Result<Option<String>, ConfigError> {
    value.map(resolve_env_vars).transpose()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_single_variable() {
        temp_env::with_var("TEST_SLACK_TOKEN", Some("xoxb-abc"), || {
            assert_eq!(resolve_env_vars("${TEST_SLACK_TOKEN}").unwrap(), "xoxb-abc");
        });
    }

    #[test]
    #[serial]
    fn resolve_env_vars_substitutes_multiple_variables() {
        temp_env::with_vars(
            [
                ("TEST_KV_HOST", Some("kv.internal")),
                ("TEST_KV_VERSION", Some("v1")),
            ],
            || {
                let result = resolve_env_vars("https://${TEST_KV_HOST}/${TEST_KV_VERSION}/keys");
                assert_eq!(result.unwrap(), "https://kv.internal/v1/keys");
            },
        );
    }

    #[test]
    fn resolve_env_vars_returns_unchanged_without_pattern() {
        let input = "https://slack.com/api";
        assert_eq!(resolve_env_vars(input).unwrap(), input);
    }

    #[test]
    #[serial]
    fn resolve_env_vars_reports_all_undefined_variables() {
        temp_env::with_vars(
            [
                ("UNDEFINED_BW_ONE", None::<&str>),
                ("UNDEFINED_BW_TWO", None::<&str>),
            ],
            || {
                let err = resolve_env_vars("${UNDEFINED_BW_ONE}/${UNDEFINED_BW_TWO}").unwrap_err();
                let msg = err.to_string();
                assert!(msg.contains("variables"));
                assert!(msg.contains("UNDEFINED_BW_ONE"));
                assert!(msg.contains("UNDEFINED_BW_TWO"));
            },
        );
    }

    #[test]
    fn resolve_optional_passes_none_through() {
        assert_eq!(resolve_optional(None).unwrap(), None);
        assert_eq!(
            resolve_optional(Some("plain")).unwrap(),
            Some("plain".to_string())
        );
    }
}
