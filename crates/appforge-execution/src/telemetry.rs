//! Global tracing subscriber setup.

use appforge_core::config::LoggingConfig;
use appforge_core::{ForgeError, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer, fmt};

use crate::diagnostics::DiagnosticsLayer;

/// Filter directive in effect: `RUST_LOG` wins over `logging.filter`.
fn directive(config: &LoggingConfig) -> String {
    std::env::var(EnvFilter::DEFAULT_ENV)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .unwrap_or_else(|| config.filter.clone())
}

fn env_filter(directive: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(directive)
        .map_err(|e| ForgeError::config(format!("invalid log filter '{directive}': {e}")))
}

/// Installs the process-wide subscriber.
///
/// Output goes to stderr, as JSON lines when `logging.json` is set. The
/// optional diagnostics layer sees the same events as stderr.
///
/// # Errors
///
/// Returns a config error for an invalid filter or when a subscriber is
/// already installed.
pub fn init_tracing(config: &LoggingConfig, diagnostics: Option<DiagnosticsLayer>) -> Result<()> {
    let directive = directive(config);

    let output = if config.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&directive)?)
            .boxed()
    } else {
        fmt::layer()
            .with_target(false)
            .with_writer(std::io::stderr)
            .with_filter(env_filter(&directive)?)
            .boxed()
    };
    let diagnostics = match diagnostics {
        Some(layer) => Some(layer.with_filter(env_filter(&directive)?)),
        None => None,
    };

    tracing_subscriber::registry()
        .with(output)
        .with(diagnostics)
        .try_init()
        .map_err(|e| ForgeError::config(format!("tracing already initialised: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_malformed_filter() {
        assert!(env_filter("appforge=notalevel").is_err());
        assert!(env_filter("info,appforge_execution=debug").is_ok());
    }
}
