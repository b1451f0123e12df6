//! Template and key validation utilities.

use minijinja::{Environment, UndefinedBehavior};

/// Validates Jinja template syntax.
pub(crate) fn validate_jinja_template(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.add_template("_validate", source)
        .map_err(|e| e.to_string())?;
    Ok(())
}

/// Validates a Jinja template by performing a test render with empty data.
/// Detects runtime errors like unknown filters.
///
/// # Errors
/// Returns an error string if the template syntax is invalid or uses unknown filters.
pub fn validate_template_render(source: &str) -> Result<(), String> {
    let mut env = Environment::new();
    env.set_undefined_behavior(UndefinedBehavior::Lenient);
    env.add_template("_render_test", source)
        .map_err(|e| e.to_string())?;

    let tmpl = env
        .get_template("_render_test")
        .map_err(|e| e.to_string())?;
    tmpl.render(serde_json::json!({}))
        .map_err(|e| e.to_string())?;

    Ok(())
}

/// Key prefixes end up in file names and URL paths.
pub(crate) fn validate_key_prefix(prefix: &str) -> Result<(), String> {
    if prefix.is_empty() {
        return Err("cannot be empty".to_string());
    }
    match prefix
        .chars()
        .find(|c| !(c.is_ascii_alphanumeric() || *c == '-' || *c == '_'))
    {
        Some(c) => Err(format!(
            "invalid character '{}' in '{}' (allowed: letters, digits, '-', '_')",
            c, prefix
        )),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_key_prefix_accepts_safe_names() {
        assert!(validate_key_prefix("budgetwatch-state").is_ok());
        assert!(validate_key_prefix("prod_alerts2").is_ok());
    }

    #[test]
    fn validate_key_prefix_rejects_separators() {
        assert!(validate_key_prefix("").is_err());
        assert!(validate_key_prefix("a/b").is_err());
        assert!(validate_key_prefix("..").is_err());
        assert!(validate_key_prefix("with space").is_err());
    }

    #[test]
    fn validate_template_render_detects_unknown_filter() {
        let result = validate_template_render("{{ budget_name | truncate(50) }}");
        assert!(result.is_err());
        assert!(result.unwrap_err().contains("truncate"));
    }

    #[test]
    fn validate_template_render_allows_builtin_filters() {
        let result = validate_template_render("{{ budget_name | upper | default('unknown') }}");
        assert!(result.is_ok());
    }

    #[test]
    fn validate_template_render_allows_missing_variables() {
        let result = validate_template_render("Spent {{ cost_text }} of {{ budget_text }}");
        assert!(result.is_ok());
    }

    #[test]
    fn validate_jinja_template_detects_syntax_errors() {
        let result = validate_jinja_template("{% if over_budget");
        assert!(result.is_err());
    }

    #[test]
    fn validate_jinja_template_accepts_valid_syntax() {
        let result =
            validate_jinja_template("{{ budget_name }} {% if over_budget %}(exceeded){% endif %}");
        assert!(result.is_ok());
    }
}
