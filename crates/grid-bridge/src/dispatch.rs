//! Host-initiated function calls.
//!
//! Functions are registered by name with a typed signature. The host calls
//! them with string arguments; each argument is coerced to its declared kind
//! before the handler runs. The caller always gets a [`FunctionResult`]:
//! failures are reported as quoted text, never raised.

use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use std::str::FromStr;

use grid_bridge_core::Scalar;
use grid_bridge_protocol::FunctionResult;

use crate::engine::ScriptEngine;
use crate::session::SharedSession;

/// Declared type of a function argument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArgKind {
    Text,
    Number,
    Bool,
}

impl ArgKind {
    fn coerce(self, raw: &str) -> Option<Scalar> {
        match self {
            ArgKind::Text => Some(Scalar::text(raw)),
            ArgKind::Number => raw.trim().parse::<f64>().ok().map(Scalar::Number),
            ArgKind::Bool => match raw.trim().to_ascii_lowercase().as_str() {
                "true" | "1" => Some(Scalar::Bool(true)),
                "false" | "0" => Some(Scalar::Bool(false)),
                _ => None,
            },
        }
    }
}

impl fmt::Display for ArgKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ArgKind::Text => "text",
            ArgKind::Number => "number",
            ArgKind::Bool => "bool",
        })
    }
}

impl FromStr for ArgKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "text" | "string" => Ok(ArgKind::Text),
            "number" => Ok(ArgKind::Number),
            "bool" | "boolean" => Ok(ArgKind::Bool),
            other => Err(format!("unknown argument kind '{other}'")),
        }
    }
}

/// Parameters a function accepts
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    /// Exactly these arguments, in order
    Fixed(Vec<ArgKind>),
    /// Any number of text arguments
    Variadic,
}

impl Signature {
    fn coerce(&self, name: &str, args: &[String]) -> Result<Vec<Scalar>, DispatchError> {
        let kinds = match self {
            Signature::Variadic => return Ok(args.iter().map(|a| Scalar::text(a.as_str())).collect()),
            Signature::Fixed(kinds) => kinds,
        };

        if kinds.len() != args.len() {
            return Err(DispatchError::Arity {
                name: name.to_string(),
                expected: kinds.len(),
                actual: args.len(),
            });
        }

        kinds
            .iter()
            .zip(args)
            .enumerate()
            .map(|(index, (kind, raw))| {
                kind.coerce(raw).ok_or_else(|| DispatchError::ArgumentType {
                    name: name.to_string(),
                    index: index + 1,
                    expected: *kind,
                    value: raw.clone(),
                })
            })
            .collect()
    }
}

/// Identifies a function held by the scripting engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ScriptHandle(pub u64);

pub type NativeFn = Rc<dyn Fn(&[Scalar]) -> Result<Scalar, String>>;

/// What runs when a function is called
#[derive(Clone)]
pub enum Handler {
    Native(NativeFn),
    Script(ScriptHandle),
}

impl fmt::Debug for Handler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Handler::Native(_) => f.write_str("Native(..)"),
            Handler::Script(handle) => f.debug_tuple("Script").field(handle).finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct FunctionEntry {
    pub signature: Signature,
    pub handler: Handler,
}

/// Functions callable by the host, by name
#[derive(Debug, Clone, Default)]
pub struct FunctionRegistry {
    entries: HashMap<String, FunctionEntry>,
}

impl FunctionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a function, returning the entry it replaced
    pub fn register<S: Into<String>>(
        &mut self,
        name: S,
        signature: Signature,
        handler: Handler,
    ) -> Option<FunctionEntry> {
        let name = name.into();
        tracing::debug!("registering function '{name}' ({signature:?})");
        self.entries.insert(name, FunctionEntry { signature, handler })
    }

    /// Register a Rust closure
    pub fn register_native<S, F>(&mut self, name: S, signature: Signature, f: F) -> Option<FunctionEntry>
    where
        S: Into<String>,
        F: Fn(&[Scalar]) -> Result<Scalar, String> + 'static,
    {
        self.register(name, signature, Handler::Native(Rc::new(f)))
    }

    pub fn get(&self, name: &str) -> Option<&FunctionEntry> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Why a function call produced no value
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum DispatchError {
    #[error("Unknown function '{0}'")]
    UnknownFunction(String),

    #[error("'{name}' expects {expected} arguments, got {actual}")]
    Arity {
        name: String,
        expected: usize,
        actual: usize,
    },

    #[error("Argument {index} of '{name}' must be a {expected}, got '{value}'")]
    ArgumentType {
        name: String,
        index: usize,
        expected: ArgKind,
        value: String,
    },

    #[error("'{name}' failed: {message}")]
    Failed { name: String, message: String },
}

/// Call a registered function and classify its result.
pub fn dispatch(
    session: &SharedSession,
    engine: &mut dyn ScriptEngine,
    name: &str,
    args: &[String],
) -> FunctionResult {
    match call(session, engine, name, args) {
        Ok(value) => classify(value),
        Err(e) => {
            tracing::warn!("function call failed: {e}");
            FunctionResult::quoted(e.to_string())
        }
    }
}

fn call(
    session: &SharedSession,
    engine: &mut dyn ScriptEngine,
    name: &str,
    args: &[String],
) -> Result<Scalar, DispatchError> {
    // The session must not stay borrowed while the handler runs; it may read
    // the grid.
    let entry = session
        .borrow()
        .registry()
        .get(name)
        .cloned()
        .ok_or_else(|| DispatchError::UnknownFunction(name.to_string()))?;

    let values = entry.signature.coerce(name, args)?;
    tracing::debug!("calling '{name}' with {} arguments", values.len());

    match entry.handler {
        Handler::Native(f) => f(&values).map_err(|message| DispatchError::Failed {
            name: name.to_string(),
            message,
        }),
        Handler::Script(handle) => engine.invoke(handle, &values).map_err(|failure| {
            DispatchError::Failed {
                name: name.to_string(),
                message: failure.message,
            }
        }),
    }
}

/// Numbers go back bare; everything else as quoted text
pub fn classify(value: Scalar) -> FunctionResult {
    match value {
        Scalar::Number(n) => FunctionResult::number(n),
        other => FunctionResult::quoted(other.to_string()),
    }
}
