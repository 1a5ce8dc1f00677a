//! Error types for the bridge.

use grid_bridge_protocol::ProtocolError;

/// Errors from the bridge session and execution loop.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    #[error("I/O error on the host channel: {0}")]
    Io(#[from] std::io::Error),

    #[error("Host closed the channel")]
    ChannelClosed,

    #[error(transparent)]
    Core(#[from] grid_bridge_core::Error),

    #[error(transparent)]
    Protocol(#[from] ProtocolError),

    #[error("A data request is already waiting for the host")]
    NestedDataRequest,

    #[error("Host did not provide a value for {0}")]
    MissingData(String),

    #[error("Lua error: {0}")]
    Lua(#[from] mlua::Error),
}

pub type Result<T> = std::result::Result<T, BridgeError>;
