//! Structured logging setup

use tracing::Level;
use tracing::subscriber::SetGlobalDefaultError;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

/// Map a configured level name to a tracing level; unknown names fall back to INFO
pub fn parse_level(level: &str) -> Level {
    match level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    }
}

/// Build the log filter: `RUST_LOG` wins when set, otherwise the configured level
fn build_filter(level: &str) -> EnvFilter {
    match std::env::var(EnvFilter::DEFAULT_ENV) {
        Ok(directives) if !directives.trim().is_empty() => EnvFilter::new(directives),
        _ => {
            let mut filter = EnvFilter::new(parse_level(level).to_string());
            // reqwest/hyper connection chatter drowns out gateway logs at debug
            for directive in ["hyper=warn", "hyper_util=warn", "reqwest=info"] {
                match directive.parse() {
                    Ok(directive) => filter = filter.add_directive(directive),
                    Err(e) => eprintln!("Failed to set log filter '{}': {}", directive, e),
                }
            }
            filter
        }
    }
}

/// Install the global tracing subscriber
///
/// # Arguments
/// * `level` - Base level name (`trace`, `debug`, `info`, `warn`, `error`)
/// * `json` - Emit JSON lines instead of human-readable output
///
/// # Errors
/// Returns an error if a global subscriber is already installed.
pub fn init_logging(level: &str, json: bool) -> Result<(), SetGlobalDefaultError> {
    let filter = build_filter(level);

    if json {
        let subscriber = FmtSubscriber::builder()
            .with_env_filter(filter)
            .json()
            .finish();
        tracing::subscriber::set_global_default(subscriber)
    } else {
        let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();
        tracing::subscriber::set_global_default(subscriber)
    }
}
