//! Session settings supplied by the embedding program or the command line.

use std::path::PathBuf;

/// Configuration for a bridge session.
#[derive(Debug, Clone)]
pub struct BridgeConfig {
    /// Sheet used by references without a `<sheet>!` prefix.
    pub default_sheet: usize,

    /// Remove file, process and module loading globals from the Lua state.
    pub sandbox: bool,

    /// Lua files executed, in order, before the loop starts.
    pub init_scripts: Vec<PathBuf>,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_sheet: 0,
            sandbox: false,
            init_scripts: Vec::new(),
        }
    }
}
