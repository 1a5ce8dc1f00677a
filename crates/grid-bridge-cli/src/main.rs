//! gridbridge - serve a spreadsheet grid host over stdin/stdout

mod logging;

use std::fs;
use std::path::PathBuf;

use anyhow::{anyhow, Context, Result};
use clap::Parser;
use grid_bridge::{BridgeConfig, Channel, ExecutionLoop, LuaEngine, Session};

#[derive(Parser, Debug)]
#[command(name = "gridbridge")]
#[command(
    author,
    version,
    about = "Run Lua scripts against a spreadsheet grid over stdin/stdout"
)]
struct Cli {
    /// Sheet index used when a reference has no `<sheet>!` prefix
    #[arg(short, long, default_value = "0")]
    sheet: usize,

    /// Lua file to run before serving the host (repeatable)
    #[arg(short, long = "init", value_name = "FILE")]
    init: Vec<PathBuf>,

    /// Remove os, io, debug and module loading from the Lua state
    #[arg(long)]
    sandbox: bool,

    /// Log filter, e.g. "debug" or "grid_bridge=trace" (overrides GRID_BRIDGE_LOG)
    #[arg(long, value_name = "FILTER")]
    log_level: Option<String>,
}

impl Cli {
    fn config(&self) -> BridgeConfig {
        BridgeConfig {
            default_sheet: self.sheet,
            sandbox: self.sandbox,
            init_scripts: self.init.clone(),
        }
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    logging::init(cli.log_level.as_deref())?;

    let config = cli.config();
    let session = Session::new(Channel::stdio(), &config).into_shared();
    let engine =
        LuaEngine::new(session.clone(), &config).context("Failed to start the Lua engine")?;
    let mut runner = ExecutionLoop::new(session, engine);

    for path in &config.init_scripts {
        let source = fs::read_to_string(path)
            .with_context(|| format!("Failed to read '{}'", path.display()))?;
        runner
            .execute_source(&source)
            .map_err(|failure| anyhow!("'{}' failed: {failure}", path.display()))?;
        tracing::info!("ran init script {}", path.display());
    }

    runner.run().context("Bridge stopped")
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_cli_definition() {
        Cli::command().debug_assert();
    }

    #[test]
    fn test_defaults() {
        let cli = Cli::try_parse_from(["gridbridge"]).unwrap();
        let config = cli.config();
        assert_eq!(config.default_sheet, 0);
        assert!(!config.sandbox);
        assert!(config.init_scripts.is_empty());
    }

    #[test]
    fn test_flags() {
        let cli = Cli::try_parse_from([
            "gridbridge",
            "--sheet",
            "2",
            "--init",
            "a.lua",
            "-i",
            "b.lua",
            "--sandbox",
            "--log-level",
            "debug",
        ])
        .unwrap();

        let config = cli.config();
        assert_eq!(config.default_sheet, 2);
        assert!(config.sandbox);
        assert_eq!(
            config.init_scripts,
            vec![PathBuf::from("a.lua"), PathBuf::from("b.lua")]
        );
        assert_eq!(cli.log_level.as_deref(), Some("debug"));
    }
}
