//! Message formatting for budget alerts.
//!
//! Messages are Jinja2-style templates rendered with minijinja. Templates
//! can be overridden in the configuration; the embedded defaults are used
//! otherwise and as a fallback when a custom template fails to render.
//!
//! Variables available to templates:
//!
//! | name                | example                       |
//! |---------------------|-------------------------------|
//! | `budget_name`       | `prod-project`                |
//! | `budget_id`         | `6f1c...`                     |
//! | `cost`              | `1,234.50`                    |
//! | `budget`            | `1,000.00`                    |
//! | `currency`          | `USD` (empty when unknown)    |
//! | `cost_text`         | `1,234.50 USD`                |
//! | `budget_text`       | `1,000.00 USD`                |
//! | `threshold_percent` | `123.45`                      |
//! | `over_budget`       | `true`                        |
//! | `period_start`      | `Oct 01, 2026` (empty if unknown) |

use crate::event::AlertEvent;
use minijinja::{Environment, UndefinedBehavior, context};
use rust_decimal::{Decimal, RoundingStrategy};

/// Default title template.
pub const DEFAULT_TITLE_TEMPLATE: &str = "Budget alert: {{ budget_name }}";

/// Default body template.
pub const DEFAULT_BODY_TEMPLATE: &str = "*{{ cost_text }}* is over {{ threshold_percent }}% \
of the budgeted {{ budget_text }}\
{% if period_start %} for the period starting {{ period_start }}{% endif %}.\
{% if over_budget %}\nThe budget has been exceeded.{% endif %}";

/// Accent color below 100% of the budget.
pub const COLOR_WARNING: &str = "#e8a33d";

/// Accent color at or above 100% of the budget.
pub const COLOR_EXCEEDED: &str = "#d0021b";

/// Rendered message ready for a notifier.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderedMessage {
    pub title: String,
    pub body: String,
    /// Hex accent color (#rrggbb) for channels that support it.
    pub color: String,
}

/// Renders alert messages from title/body templates.
pub struct MessageRenderer {
    env: Environment<'static>,
    title: String,
    body: String,
}

impl MessageRenderer {
    /// Create a renderer with custom templates.
    ///
    /// Templates are validated at config load time.
    pub fn new(title: impl Into<String>, body: impl Into<String>) -> Self {
        let mut env = Environment::new();
        env.set_undefined_behavior(UndefinedBehavior::Lenient);
        Self {
            env,
            title: title.into(),
            body: body.into(),
        }
    }

    /// Render `event`, falling back to the embedded templates on error.
    pub fn render(&self, event: &AlertEvent) -> RenderedMessage {
        let ctx = build_context(event);
        let color = if event.is_over_budget() {
            COLOR_EXCEEDED
        } else {
            COLOR_WARNING
        };

        let rendered = self
            .env
            .render_str(&self.title, &ctx)
            .and_then(|title| Ok((title, self.env.render_str(&self.body, &ctx)?)));

        let (title, body) = match rendered {
            Ok(pair) => pair,
            Err(e) => {
                tracing::warn!(
                    budget_id = %event.budget_id,
                    error = %e,
                    "Custom template failed to render, using default"
                );
                self.render_defaults(&ctx, event)
            }
        };

        RenderedMessage {
            title,
            body,
            color: color.to_string(),
        }
    }

    fn render_defaults(&self, ctx: &minijinja::Value, event: &AlertEvent) -> (String, String) {
        let title = self
            .env
            .render_str(DEFAULT_TITLE_TEMPLATE, ctx)
            .unwrap_or_else(|_| format!("Budget alert: {}", event.budget_display_name));
        let body = self
            .env
            .render_str(DEFAULT_BODY_TEMPLATE, ctx)
            .unwrap_or_else(|_| {
                format!(
                    "{} is over {}% of the budget",
                    format_amount(event.cost_amount),
                    format_percent(event.threshold_fraction)
                )
            });
        (title, body)
    }
}

impl Default for MessageRenderer {
    fn default() -> Self {
        Self::new(DEFAULT_TITLE_TEMPLATE, DEFAULT_BODY_TEMPLATE)
    }
}

impl std::fmt::Debug for MessageRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MessageRenderer")
            .field("title", &self.title)
            .field("body", &self.body)
            .finish()
    }
}

fn build_context(event: &AlertEvent) -> minijinja::Value {
    let currency = event.currency_code.clone().unwrap_or_default();
    let with_currency = |amount: Decimal| {
        let formatted = format_amount(amount);
        if currency.is_empty() {
            formatted
        } else {
            format!("{} {}", formatted, currency)
        }
    };

    context! {
        budget_name => &event.budget_display_name,
        budget_id => &event.budget_id,
        cost => format_amount(event.cost_amount),
        budget => format_amount(event.budget_amount),
        currency => &currency,
        cost_text => with_currency(event.cost_amount),
        budget_text => with_currency(event.budget_amount),
        threshold_percent => format_percent(event.threshold_fraction),
        over_budget => event.is_over_budget(),
        period_start => event
            .cost_interval_start
            .map(|t| t.format("%b %d, %Y").to_string())
            .unwrap_or_default(),
    }
}

/// Two decimals with thousands separators: `1234567.891` -> `1,234,567.89`.
pub fn format_amount(amount: Decimal) -> String {
    let rounded = amount.round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero);
    let text = format!("{:.2}", rounded.abs());
    let (int_part, frac_part) = text.split_once('.').unwrap_or((text.as_str(), "00"));

    let mut grouped = String::with_capacity(int_part.len() + int_part.len() / 3);
    for (i, ch) in int_part.chars().enumerate() {
        if i > 0 && (int_part.len() - i) % 3 == 0 {
            grouped.push(',');
        }
        grouped.push(ch);
    }

    let sign = if rounded.is_sign_negative() && !rounded.is_zero() {
        "-"
    } else {
        ""
    };
    format!("{}{}.{}", sign, grouped, frac_part)
}

/// Threshold fraction as a percentage without trailing zeros: `0.5` -> `50`.
///
/// Fractions too large to scale are printed as-is with a `(fraction)` suffix.
pub fn format_percent(fraction: Decimal) -> String {
    match fraction.checked_mul(Decimal::ONE_HUNDRED) {
        Some(percent) => percent
            .round_dp_with_strategy(2, RoundingStrategy::MidpointAwayFromZero)
            .normalize()
            .to_string(),
        None => format!("{} (fraction)", fraction.normalize()),
    }
}
