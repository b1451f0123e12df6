//! budgetwatch - Deduplicated chat notifications for cloud billing budget alerts.

use std::io::Read;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{error, info, warn};

use budgetwatch::cli::{
    Cli, EXIT_CONFIG, EXIT_DONE, EXIT_REJECTED, EXIT_RETRYABLE, LogFormat, exit_code_for,
    setup_exit_code,
};
use budgetwatch::config::{Config, RuntimeBackend, RuntimeConfig, RuntimeNotifier};
use budgetwatch::metrics::initialize_metrics;
use budgetwatch::{Outcome, build_pipeline, parse_event, register_metric_descriptions};

/// Initialize the tracing subscriber with the specified log format.
///
/// Logs go to stderr; stdout is reserved for `--validate` and `--dry-run`.
fn init_logging(format: LogFormat) {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    match format {
        LogFormat::Text => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
        LogFormat::Json => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .json()
                .with_current_span(true)
                .with_span_list(false)
                .flatten_event(true)
                .with_env_filter(filter)
                .init();
        }
    }
}

/// Load, validate and compile; logs every problem found.
fn load_config(cli: &Cli) -> Option<RuntimeConfig> {
    info!(config_path = %cli.config.display(), "Loading configuration");

    let config = match Config::load(&cli.config) {
        Ok(c) => c,
        Err(e) => {
            error!(error = %e, path = %cli.config.display(), "Failed to load configuration");
            return None;
        }
    };

    if let Err(errors) = config.validate() {
        for e in &errors {
            error!(error = %e, "Configuration validation error");
        }
        error!(error_count = errors.len(), "Configuration validation failed");
        return None;
    }

    match config.compile() {
        Ok(runtime) => Some(runtime),
        Err(e) => {
            error!(error = %e, "Configuration validation error");
            None
        }
    }
}

fn print_summary(cli: &Cli, config: &RuntimeConfig) {
    println!("Configuration is valid: {}", cli.config.display());
    match config.notifier {
        RuntimeNotifier::Slack {
            ref channel,
            ref api_url,
            ..
        } => println!("  Notifier: slack (channel {}, api {})", channel, api_url),
        RuntimeNotifier::Mattermost { ref channel, .. } => {
            let channel = if channel.is_empty() {
                "webhook default"
            } else {
                channel.as_str()
            };
            println!("  Notifier: mattermost (channel {})", channel)
        }
    }
    let backend = match config.state.backend {
        RuntimeBackend::File(ref dir) => format!("file ({})", dir.display()),
        RuntimeBackend::Http { ref url, .. } => format!("http ({})", url),
        RuntimeBackend::Memory => "memory".to_string(),
    };
    println!(
        "  State: {} (key prefix {})",
        backend, config.state.key_prefix
    );
    println!(
        "  Retry: {} attempts, backoff {:?}..{:?}",
        config.retry.max_attempts, config.retry.backoff_base, config.retry.backoff_max
    );
}

fn read_event(cli: &Cli) -> Result<Vec<u8>> {
    match cli.event_path() {
        Some(path) => {
            std::fs::read(path).with_context(|| format!("cannot read event {}", path.display()))
        }
        None => {
            let mut buf = Vec::new();
            std::io::stdin()
                .read_to_end(&mut buf)
                .context("cannot read event from stdin")?;
            Ok(buf)
        }
    }
}

fn dry_run(config: &RuntimeConfig, raw: &[u8]) -> i32 {
    let event = match parse_event(raw) {
        Ok(event) => event,
        Err(e) => {
            error!(error = %e, "Malformed event");
            return EXIT_REJECTED;
        }
    };

    let message = config.renderer().render(&event);
    println!("Budget: {} ({})", event.budget_display_name, event.budget_id);
    println!("Threshold: {}", event.threshold_fraction);
    println!("Color: {}", message.color);
    println!("Title: {}", message.title);
    println!("{}", message.body);
    EXIT_DONE
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(cli.log_format);

    let Some(config) = load_config(&cli) else {
        std::process::exit(EXIT_CONFIG);
    };

    if cli.validate {
        print_summary(&cli, &config);
        return Ok(());
    }

    let raw = match read_event(&cli) {
        Ok(raw) => raw,
        Err(e) => {
            error!(error = %format!("{:#}", e), "No event to process");
            std::process::exit(EXIT_REJECTED);
        }
    };

    if cli.dry_run {
        std::process::exit(dry_run(&config, &raw));
    }

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    let code = runtime.block_on(run(config, raw));
    if code != EXIT_DONE {
        std::process::exit(code);
    }
    Ok(())
}

/// Handle the event; returns the process exit status.
async fn run(config: RuntimeConfig, raw: Vec<u8>) -> i32 {
    register_metric_descriptions();
    initialize_metrics(config.notifier.notifier_type());

    let pipeline = match build_pipeline(&config).await {
        Ok(p) => p,
        Err(e) => {
            error!(error = %e, retryable = e.is_retryable(), "Cannot assemble pipeline");
            return setup_exit_code(&e);
        }
    };

    tokio::select! {
        result = pipeline.handle(&raw) => match result {
            Ok(Outcome::Notified { budget_id, threshold }) => {
                info!(budget_id = %budget_id, threshold = %threshold, "Done: notified");
                EXIT_DONE
            }
            Ok(Outcome::Skipped { budget_id, threshold, watermark }) => {
                info!(
                    budget_id = %budget_id,
                    threshold = %threshold,
                    watermark = %watermark,
                    "Done: already notified"
                );
                EXIT_DONE
            }
            Err(e) => {
                error!(
                    error = %e,
                    reason = e.reason(),
                    retryable = e.is_retryable(),
                    "Event failed"
                );
                exit_code_for(&e)
            }
        },
        _ = shutdown_signal() => {
            warn!("Interrupted before completion, event must be redelivered");
            EXIT_RETRYABLE
        }
    }
}

/// Resolves on Ctrl-C; never resolves if the handler cannot be installed.
async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for ctrl-c signal");
        std::future::pending::<()>().await;
    }
}
