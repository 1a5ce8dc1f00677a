//! Log setup for the bridge binary.
//!
//! stdout carries the protocol, so every log line goes to stderr.

use anyhow::{Context, Result};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable holding the bridge's log filter
pub const LOG_ENV: &str = "GRID_BRIDGE_LOG";

const DEFAULT_FILTER: &str = "warn";

/// Pick filter directives: the command-line flag, then `GRID_BRIDGE_LOG`,
/// then `RUST_LOG`, then the default.
fn resolve_filter(flag: Option<&str>, bridge_env: Option<String>, rust_log: Option<String>) -> String {
    flag.map(str::to_string)
        .or(bridge_env)
        .or(rust_log)
        .filter(|directives| !directives.trim().is_empty())
        .unwrap_or_else(|| DEFAULT_FILTER.to_string())
}

pub fn init(flag: Option<&str>) -> Result<()> {
    let directives = resolve_filter(
        flag,
        std::env::var(LOG_ENV).ok(),
        std::env::var(EnvFilter::DEFAULT_ENV).ok(),
    );
    let filter = EnvFilter::try_new(&directives)
        .with_context(|| format!("Invalid log filter '{directives}'"))?;

    let stderr_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .with_target(true)
        .with_level(true)
        .compact();

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .try_init()
        .context("Failed to install the log subscriber")?;

    tracing::debug!("logging initialized with '{directives}'");
    Ok(())
}
