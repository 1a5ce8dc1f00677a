//! Outbound frames and their write-command payloads.

use grid_bridge_core::{escape_text, SheetRange};
use serde::{Deserialize, Serialize};

use crate::escape::{escape_line, to_ascii_json, unescape_line};
use crate::{
    ProtocolError, Result, COMMAND_COMPLETE, DATA_OPEN, ERROR_MARKER, FRAME_CLOSE,
    FUNCTION_RESULT_OPEN, IMAGE_OPEN, INTERPRETER_OPEN, PARSE_OPEN,
};

const RANGE_TAG: &str = "RANGE";
const SET_LIST: &str = "SETLIST";
const SET_SINGLE: &str = "SETSINGLE";
const IMAGE_TAG: &str = "IMAGE";

const OPENERS: [&str; 5] = [
    PARSE_OPEN,
    DATA_OPEN,
    INTERPRETER_OPEN,
    FUNCTION_RESULT_OPEN,
    IMAGE_OPEN,
];

/// JSON payload of a write or image frame.
///
/// Range writes carry `["RANGE", <op>, <range>, <sheet>, values...]`; images
/// carry `["IMAGE", <base64>]`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WriteCommand {
    pub arguments: Vec<String>,
}

/// Operation a write command performs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteKind {
    /// Literal values, one per cell, column-major
    SetList,
    /// One value the host evaluates as a formula
    SetSingle,
    Image,
}

impl WriteCommand {
    /// Write pre-encoded values into a range
    pub fn set_list(target: &SheetRange, values: Vec<String>) -> Self {
        let mut arguments = Self::range_header(SET_LIST, target);
        arguments.extend(values);
        Self { arguments }
    }

    /// Write a single pre-encoded value (starting with `=`) into a range
    pub fn set_single(target: &SheetRange, value: String) -> Self {
        let mut arguments = Self::range_header(SET_SINGLE, target);
        arguments.push(value);
        Self { arguments }
    }

    /// Carry a base64-encoded image
    pub fn image(base64: String) -> Self {
        Self {
            arguments: vec![IMAGE_TAG.to_string(), base64],
        }
    }

    fn range_header(op: &str, target: &SheetRange) -> Vec<String> {
        vec![
            RANGE_TAG.to_string(),
            op.to_string(),
            target.range.to_wire_string(),
            target.sheet.to_string(),
        ]
    }

    pub fn kind(&self) -> Option<WriteKind> {
        match self.arguments.first().map(String::as_str) {
            Some(IMAGE_TAG) => Some(WriteKind::Image),
            Some(RANGE_TAG) => match self.arguments.get(1).map(String::as_str) {
                Some(SET_LIST) => Some(WriteKind::SetList),
                Some(SET_SINGLE) => Some(WriteKind::SetSingle),
                _ => None,
            },
            _ => None,
        }
    }

    /// Target range of a range write
    pub fn range(&self) -> Option<&str> {
        match self.kind()? {
            WriteKind::Image => None,
            _ => self.arguments.get(2).map(String::as_str),
        }
    }

    /// Target sheet of a range write
    pub fn sheet(&self) -> Option<usize> {
        match self.kind()? {
            WriteKind::Image => None,
            _ => self.arguments.get(3)?.parse().ok(),
        }
    }

    /// The values (or image payload) after the header
    pub fn values(&self) -> &[String] {
        let skip = match self.kind() {
            Some(WriteKind::Image) => 1,
            Some(_) => 4,
            None => 0,
        };
        self.arguments.get(skip..).unwrap_or_default()
    }
}

/// Result of a host-initiated function call
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionResult {
    /// Written bare
    Numeric(f64),
    /// Written as a quoted string literal
    Quoted(String),
}

impl FunctionResult {
    /// A numeric result; non-finite numbers fall back to their quoted text
    pub fn number(n: f64) -> Self {
        if n.is_finite() {
            FunctionResult::Numeric(n)
        } else {
            FunctionResult::Quoted(n.to_string())
        }
    }

    pub fn quoted<S: Into<String>>(s: S) -> Self {
        FunctionResult::Quoted(s.into())
    }

    pub fn to_wire(&self) -> String {
        match self {
            FunctionResult::Numeric(n) => n.to_string(),
            FunctionResult::Quoted(s) => escape_line(&escape_text(s)),
        }
    }

    fn from_wire(body: &str) -> Result<Self> {
        let body = unescape_line(body)?;
        if let Some(inner) = body
            .strip_prefix('"')
            .and_then(|rest| rest.strip_suffix('"'))
        {
            return Ok(FunctionResult::Quoted(inner.replace("\"\"", "\"")));
        }
        body.parse::<f64>()
            .map(FunctionResult::Numeric)
            .map_err(|_| ProtocolError::MalformedFrame(format!("function result '{body}'")))
    }
}

/// A frame written by the bridge
#[derive(Debug, Clone, PartialEq)]
pub enum Frame {
    Write(WriteCommand),
    DataRequest(SheetRange),
    Diagnostic(String),
    FunctionResult(FunctionResult),
    /// Base64-encoded image bytes
    Image(String),
    CommandComplete,
}

impl Frame {
    /// A diagnostic carrying the error marker
    pub fn error<S: std::fmt::Display>(message: S) -> Self {
        Frame::Diagnostic(format!("{ERROR_MARKER} {message}"))
    }

    /// Whether this is a diagnostic reporting a failure
    pub fn is_error(&self) -> bool {
        matches!(self, Frame::Diagnostic(text) if text.starts_with(ERROR_MARKER))
    }

    /// Render the frame as one ASCII line, without its trailing newline
    pub fn encode(&self) -> Result<String> {
        let wrap = |open: &str, body: &str| format!("{open}{body}{FRAME_CLOSE}");

        Ok(match self {
            Frame::Write(command) => wrap(PARSE_OPEN, &to_ascii_json(command)?),
            Frame::DataRequest(target) => wrap(DATA_OPEN, &target.to_string()),
            Frame::Diagnostic(text) => wrap(INTERPRETER_OPEN, &escape_line(text)),
            Frame::FunctionResult(result) => wrap(FUNCTION_RESULT_OPEN, &result.to_wire()),
            Frame::Image(base64) => {
                let payload = WriteCommand::image(base64.clone());
                wrap(IMAGE_OPEN, &to_ascii_json(&payload)?)
            }
            Frame::CommandComplete => COMMAND_COMPLETE.to_string(),
        })
    }

    /// Parse one complete frame record
    pub fn decode(record: &str) -> Result<Self> {
        let record = record.trim_end_matches(['\r', '\n']);
        if record == COMMAND_COMPLETE {
            return Ok(Frame::CommandComplete);
        }

        let (open, body) = split_frame(record)?;
        match open {
            PARSE_OPEN => Ok(Frame::Write(serde_json::from_str(body)?)),
            DATA_OPEN => SheetRange::parse(body)
                .map(Frame::DataRequest)
                .map_err(|e| ProtocolError::MalformedFrame(e.to_string())),
            INTERPRETER_OPEN => unescape_line(body).map(Frame::Diagnostic),
            FUNCTION_RESULT_OPEN => FunctionResult::from_wire(body).map(Frame::FunctionResult),
            IMAGE_OPEN => {
                let payload: WriteCommand = serde_json::from_str(body)?;
                match (payload.kind(), payload.values()) {
                    (Some(WriteKind::Image), [data]) => Ok(Frame::Image(data.clone())),
                    _ => Err(ProtocolError::MalformedFrame(format!(
                        "image payload {:?}",
                        payload.arguments
                    ))),
                }
            }
            _ => Err(ProtocolError::UnknownFrame(record.to_string())),
        }
    }
}

fn split_frame(record: &str) -> Result<(&'static str, &str)> {
    for open in OPENERS {
        if let Some(rest) = record.strip_prefix(open) {
            let body = rest.strip_suffix(FRAME_CLOSE).ok_or_else(|| {
                ProtocolError::MalformedFrame(format!("missing {FRAME_CLOSE} in '{record}'"))
            })?;
            return Ok((open, body));
        }
    }
    Err(ProtocolError::UnknownFrame(record.to_string()))
}

/// One item of bridge output as seen by the host
#[derive(Debug, Clone, PartialEq)]
pub enum Outbound {
    Frame(Frame),
    /// Text without a sentinel, echoed by the engine
    Raw(String),
}

impl Outbound {
    /// Classify a single record of bridge output
    pub fn classify(record: &str) -> Result<Self> {
        let trimmed = record.trim_end_matches(['\r', '\n']);
        if trimmed == COMMAND_COMPLETE || OPENERS.iter().any(|o| trimmed.starts_with(o)) {
            Frame::decode(trimmed).map(Outbound::Frame)
        } else {
            Ok(Outbound::Raw(trimmed.to_string()))
        }
    }

    pub fn as_frame(&self) -> Option<&Frame> {
        match self {
            Outbound::Frame(frame) => Some(frame),
            Outbound::Raw(_) => None,
        }
    }
}

/// Split a stretch of bridge output into frames and raw lines, one record
/// per line
pub fn parse_stream(output: &str) -> Result<Vec<Outbound>> {
    output
        .lines()
        .filter(|line| !line.trim().is_empty())
        .map(Outbound::classify)
        .collect()
}
