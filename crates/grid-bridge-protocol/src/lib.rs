//! Message framing between the grid host and the scripting bridge.
//!
//! The bridge writes frames to stdout, each a sentinel-wrapped record on its
//! own line:
//!
//! - `#PARSE#<json>#ENDPARSE#` - write values into the grid
//! - `#DATA#<sheet>!<range>#ENDPARSE#` - ask the host for live cell values
//! - `#INTERPRETER#<text>#ENDPARSE#` - console output and error reports
//! - `#PYTHONFUNCTION#<value>#ENDPARSE#` - result of a host-initiated call
//! - `#IMAGE#<json>#ENDPARSE#` - a rendered image, base64 encoded
//! - `#COMMANDCOMPLETE#` - the current chunk finished
//!
//! Every frame is a single line of ASCII; see [`escape`] for how bodies are
//! kept that way.
//!
//! The host writes plain script lines to stdin; a blank line ends a chunk.
//! Any stdout text without a sentinel is engine output, not protocol.

pub mod escape;
mod frame;
mod inbound;

pub use escape::{escape_line, to_ascii_json, unescape_line, AsciiFormatter};
pub use frame::{parse_stream, Frame, FunctionResult, Outbound, WriteCommand, WriteKind};
pub use inbound::{encode_call, DataLine, InboundChunk};

/// Opens a write-command frame
pub const PARSE_OPEN: &str = "#PARSE#";
/// Opens a data-request frame
pub const DATA_OPEN: &str = "#DATA#";
/// Opens a diagnostic frame
pub const INTERPRETER_OPEN: &str = "#INTERPRETER#";
/// Opens a function-result frame
pub const FUNCTION_RESULT_OPEN: &str = "#PYTHONFUNCTION#";
/// Opens an image frame
pub const IMAGE_OPEN: &str = "#IMAGE#";
/// Closes every frame except command-complete
pub const FRAME_CLOSE: &str = "#ENDPARSE#";
/// Marks the end of a chunk's execution
pub const COMMAND_COMPLETE: &str = "#COMMANDCOMPLETE#";
/// Prefix of an inbound chunk that calls a registered function
pub const FUNCTION_CALL_PREFIX: &str = "#FUNCTION#";
/// Prefix the host UI uses to style failure diagnostics
pub const ERROR_MARKER: &str = "[error]";

/// Errors from encoding or decoding protocol messages.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Unknown frame: {0}")]
    UnknownFrame(String),

    #[error("Malformed frame: {0}")]
    MalformedFrame(String),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, ProtocolError>;
