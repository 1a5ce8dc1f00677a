//! The seam between the execution loop and a scripting language.

use grid_bridge_core::Scalar;

use crate::dispatch::ScriptHandle;

/// An uncaught failure while running script code.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{message}")]
pub struct ScriptFailure {
    pub message: String,
}

impl ScriptFailure {
    pub fn new<S: Into<String>>(message: S) -> Self {
        Self {
            message: message.into(),
        }
    }
}

/// A scripting engine the execution loop can drive.
///
/// Implementations reach the grid through a shared
/// [`Session`](crate::session::Session) captured at construction.
pub trait ScriptEngine {
    /// Run a chunk of source text to completion
    fn execute(&mut self, chunk: &str) -> Result<(), ScriptFailure>;

    /// Call a function the engine registered under `handle`
    fn invoke(&mut self, handle: ScriptHandle, args: &[Scalar]) -> Result<Scalar, ScriptFailure>;
}
