//! # grid-bridge
//!
//! Runs scripts on behalf of a spreadsheet grid host, over the host's
//! stdin/stdout.
//!
//! The host sends chunks of Lua source separated by blank lines. While a
//! chunk runs, the script can write cells (write-command frames), print
//! (diagnostic frames), show images and read live cell values. A read sends a
//! data request and blocks until the host replies with a chunk that fills the
//! `sheet_data` cache; the script then resumes with those values.
//!
//! ```no_run
//! use grid_bridge::{BridgeConfig, Channel, ExecutionLoop, LuaEngine, Session};
//!
//! # fn main() -> grid_bridge::Result<()> {
//! let config = BridgeConfig::default();
//! let session = Session::new(Channel::stdio(), &config).into_shared();
//! let engine = LuaEngine::new(session.clone(), &config)?;
//! ExecutionLoop::new(session, engine).run()?;
//! # Ok(())
//! # }
//! ```

pub mod channel;
pub mod config;
pub mod dispatch;
pub mod engine;
pub mod error;
pub mod image;
pub mod lua;
pub mod runner;
pub mod session;

pub use channel::Channel;
pub use config::BridgeConfig;
pub use dispatch::{
    dispatch, ArgKind, DispatchError, FunctionEntry, FunctionRegistry, Handler, ScriptHandle,
    Signature,
};
pub use engine::{ScriptEngine, ScriptFailure};
pub use error::{BridgeError, Result};
pub use image::{capture_image, PlotSurface, SvgDocument};
pub use lua::LuaEngine;
pub use runner::ExecutionLoop;
pub use session::{fetch_range, LoopState, PendingFetch, ScriptBuffer, Session, SharedSession};
