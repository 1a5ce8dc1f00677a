//! Per-process bridge state.
//!
//! A [`Session`] owns everything the loop and the engine's callbacks share:
//! the host channel, the cache of cell values the host sent back, the current
//! sheet, the loop state and the function registry. It is shared as
//! [`SharedSession`]; no borrow may be held while the engine runs code, since
//! that code calls back into the session.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use grid_bridge_core::{encode_list, encode_single, Scalar, SheetRange, Value, WriteTarget};
use grid_bridge_protocol::{Frame, WriteCommand};

use crate::channel::Channel;
use crate::config::BridgeConfig;
use crate::dispatch::FunctionRegistry;
use crate::engine::ScriptFailure;
use crate::error::{BridgeError, Result};

pub type SharedSession = Rc<RefCell<Session>>;

/// Where the execution loop is in its cycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LoopState {
    #[default]
    Idle,
    /// Collecting lines of a chunk
    Accumulating,
    /// The engine is running a chunk
    Executing,
    /// A data request is out and the host's reply is being processed
    AwaitingData,
}

/// Lines of the chunk being collected
#[derive(Debug, Default)]
pub struct ScriptBuffer {
    text: String,
}

impl ScriptBuffer {
    /// Append a line, keeping its newline
    pub fn push_line(&mut self, line: &str) {
        self.text.push_str(line);
        self.text.push('\n');
    }

    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }

    pub fn as_str(&self) -> &str {
        &self.text
    }

    /// Take the collected text, leaving the buffer empty
    pub fn take(&mut self) -> String {
        std::mem::take(&mut self.text)
    }
}

/// A data request waiting for its reply to be evaluated
#[derive(Debug)]
pub struct PendingFetch {
    pub target: SheetRange,
    /// The host's reply, to be run by the engine
    pub chunk: String,
    resume: LoopState,
}

pub struct Session {
    channel: Channel,
    sheet_data: HashMap<String, Scalar>,
    current_sheet: usize,
    state: LoopState,
    buffer: ScriptBuffer,
    registry: FunctionRegistry,
}

impl Session {
    pub fn new(channel: Channel, config: &BridgeConfig) -> Self {
        Self {
            channel,
            sheet_data: HashMap::new(),
            current_sheet: config.default_sheet,
            state: LoopState::Idle,
            buffer: ScriptBuffer::default(),
            registry: FunctionRegistry::new(),
        }
    }

    pub fn into_shared(self) -> SharedSession {
        Rc::new(RefCell::new(self))
    }

    pub fn state(&self) -> LoopState {
        self.state
    }

    pub fn set_state(&mut self, state: LoopState) {
        tracing::trace!("loop state {:?} -> {state:?}", self.state);
        self.state = state;
    }

    pub fn current_sheet(&self) -> usize {
        self.current_sheet
    }

    pub fn set_current_sheet(&mut self, sheet: usize) {
        self.current_sheet = sheet;
    }

    pub fn buffer(&self) -> &ScriptBuffer {
        &self.buffer
    }

    pub fn buffer_mut(&mut self) -> &mut ScriptBuffer {
        &mut self.buffer
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.registry
    }

    pub fn read_line(&mut self) -> Result<Option<String>> {
        self.channel.read_line()
    }

    pub fn send(&mut self, frame: Frame) -> Result<()> {
        self.channel.send(&frame)
    }

    /// Store a cell value received from the host
    pub fn store(&mut self, key: String, value: Scalar) {
        self.sheet_data.insert(key, value);
    }

    pub fn lookup(&self, key: &str) -> Option<&Scalar> {
        self.sheet_data.get(key)
    }

    /// Parse a reference against the current sheet
    pub fn resolve_range(&self, reference: &str) -> Result<SheetRange> {
        Ok(SheetRange::parse_with_default(reference, self.current_sheet)?)
    }

    /// Size the target from the data, encode it and send the write command.
    ///
    /// Returns the range the data occupies.
    pub fn write_value(&mut self, reference: &str, value: &Value) -> Result<SheetRange> {
        let target = WriteTarget::parse(reference)?;
        let range = target.resolve(value.shape())?;
        let destination = SheetRange::new(target.sheet.unwrap_or(self.current_sheet), range);

        let command = match value {
            Value::Scalar(input) => WriteCommand::set_single(&destination, encode_single(input)?),
            Value::List(items) => WriteCommand::set_list(&destination, encode_list(items)?),
            Value::Table(table) => WriteCommand::set_list(&destination, table.to_columns()?.values),
        };

        self.send(Frame::Write(command))?;
        Ok(destination)
    }

    /// Send a data request and read the host's reply, up to the first blank
    /// line.
    ///
    /// The loop stays in [`LoopState::AwaitingData`] until
    /// [`complete_fetch`](Self::complete_fetch), so a request made while the
    /// reply is evaluated fails instead of waiting on a second reply.
    pub fn begin_fetch(&mut self, reference: &str) -> Result<PendingFetch> {
        if self.state == LoopState::AwaitingData {
            return Err(BridgeError::NestedDataRequest);
        }

        let target = self.resolve_range(reference)?;
        self.send(Frame::DataRequest(target))?;

        let resume = self.state;
        self.set_state(LoopState::AwaitingData);

        let mut reply = ScriptBuffer::default();
        loop {
            match self.channel.read_line() {
                Ok(Some(line)) if line.is_empty() => break,
                Ok(Some(line)) => reply.push_line(&line),
                Ok(None) => {
                    self.set_state(resume);
                    return Err(BridgeError::ChannelClosed);
                }
                Err(e) => {
                    self.set_state(resume);
                    return Err(e);
                }
            }
        }

        tracing::debug!("data reply for {target}: {} bytes", reply.as_str().len());
        Ok(PendingFetch {
            target,
            chunk: reply.take(),
            resume,
        })
    }

    /// Leave the awaiting state and collect the requested cells, column-major
    pub fn complete_fetch(&mut self, pending: PendingFetch) -> Result<Vec<Scalar>> {
        self.set_state(pending.resume);

        pending
            .target
            .cache_keys()
            .map(|key| match self.sheet_data.get(&key) {
                Some(value) => Ok(value.clone()),
                None => Err(BridgeError::MissingData(key)),
            })
            .collect()
    }
}

/// Read a range from the host.
///
/// `evaluate` runs the host's reply; it is expected to fill the cache through
/// [`Session::store`]. A failing reply is reported to the host and the read
/// then fails on the first cell it did not provide.
pub fn fetch_range<F>(session: &SharedSession, reference: &str, evaluate: F) -> Result<Vec<Scalar>>
where
    F: FnOnce(&str) -> std::result::Result<(), ScriptFailure>,
{
    let pending = session.borrow_mut().begin_fetch(reference)?;

    let reported = match evaluate(&pending.chunk) {
        Ok(()) => Ok(()),
        Err(failure) => {
            tracing::warn!("data reply for {} failed: {failure}", pending.target);
            session.borrow_mut().send(Frame::error(&failure))
        }
    };

    let values = session.borrow_mut().complete_fetch(pending);
    reported?;
    values
}

#[cfg(test)]
mod tests {
    use super::*;
    use grid_bridge_core::{CellInput, Column, Table};
    use grid_bridge_protocol::{parse_stream, Outbound};
    use pretty_assertions::assert_eq;
    use std::io::{self, Cursor, Write};

    #[derive(Clone, Default)]
    struct Captured(Rc<RefCell<Vec<u8>>>);

    impl Write for Captured {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.borrow_mut().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Captured {
        fn frames(&self) -> Vec<Frame> {
            let text = String::from_utf8(self.0.borrow().clone()).unwrap();
            parse_stream(&text)
                .unwrap()
                .into_iter()
                .filter_map(|item| match item {
                    Outbound::Frame(frame) => Some(frame),
                    Outbound::Raw(_) => None,
                })
                .collect()
        }
    }

    fn session_with_input(input: &str) -> (SharedSession, Captured) {
        let out = Captured::default();
        let channel = Channel::new(Cursor::new(input.as_bytes().to_vec()), out.clone());
        let session = Session::new(channel, &BridgeConfig::default()).into_shared();
        (session, out)
    }

    #[test]
    fn test_script_buffer() {
        let mut buffer = ScriptBuffer::default();
        buffer.push_line("a = 1");
        buffer.push_line("b = 2");
        assert_eq!(buffer.as_str(), "a = 1\nb = 2\n");
        assert_eq!(buffer.take(), "a = 1\nb = 2\n");
        assert!(buffer.is_empty());
    }

    #[test]
    fn test_write_list_to_bare_column() {
        let (session, out) = session_with_input("");
        let value = Value::List(vec!["hi".into(), "there".into()]);
        let range = session.borrow_mut().write_value("C", &value).unwrap();
        assert_eq!(range.to_string(), "0!C1:C2");

        let frames = out.frames();
        let Frame::Write(command) = &frames[0] else {
            panic!("expected a write frame, got {frames:?}");
        };
        assert_eq!(
            command.arguments,
            vec!["RANGE", "SETLIST", "C1:C2", "0", "\"hi\"", "\"there\""]
        );
    }

    #[test]
    fn test_write_scalar_uses_current_sheet() {
        let (session, out) = session_with_input("");
        session.borrow_mut().set_current_sheet(2);
        session
            .borrow_mut()
            .write_value("B3", &Value::Scalar(CellInput::formula("SUM(A1:A2)")))
            .unwrap();

        let frames = out.frames();
        let Frame::Write(command) = &frames[0] else {
            panic!("expected a write frame, got {frames:?}");
        };
        assert_eq!(
            command.arguments,
            vec!["RANGE", "SETSINGLE", "B3:B3", "2", "=SUM(A1:A2)"]
        );
    }

    #[test]
    fn test_write_table() {
        let (session, _out) = session_with_input("");
        let table = Table::new(
            vec![
                Column::new("a", vec![1.0.into(), 2.0.into(), 3.0.into()]),
                Column::new("b", vec![4.0.into(), 5.0.into(), 6.0.into()]),
            ],
            true,
        );
        let range = session
            .borrow_mut()
            .write_value("A1", &Value::Table(table))
            .unwrap();
        assert_eq!(range.range.to_string(), "A1:B4");
    }

    #[test]
    fn test_fetch_range_reads_cache() {
        let (session, out) = session_with_input("ignored by the stub\n\n");
        let values = fetch_range(&session, "A1:A2", |chunk| {
            assert_eq!(chunk, "ignored by the stub\n");
            let mut s = session.borrow_mut();
            s.store("0!A1".into(), Scalar::Number(5.0));
            s.store("0!A2".into(), Scalar::text("x"));
            Ok(())
        })
        .unwrap();

        assert_eq!(values, vec![Scalar::Number(5.0), Scalar::text("x")]);
        assert_eq!(session.borrow().state(), LoopState::Idle);
        assert_eq!(
            out.frames(),
            vec![Frame::DataRequest(SheetRange::parse("A1:A2").unwrap())]
        );
    }

    #[test]
    fn test_fetch_empty_reply_is_missing_data() {
        let (session, _out) = session_with_input("\n");
        let err = fetch_range(&session, "B2", |_| Ok(())).unwrap_err();
        assert!(matches!(err, BridgeError::MissingData(key) if key == "0!B2"));
    }

    #[test]
    fn test_fetch_failed_reply_is_reported() {
        let (session, out) = session_with_input("bad\n\n");
        let err = fetch_range(&session, "A1", |_| Err(ScriptFailure::new("syntax"))).unwrap_err();
        assert!(matches!(err, BridgeError::MissingData(_)));
        assert_eq!(out.frames()[1], Frame::error("syntax"));
    }

    #[test]
    fn test_fetch_at_end_of_input() {
        let (session, _out) = session_with_input("partial\n");
        let err = fetch_range(&session, "A1", |_| Ok(())).unwrap_err();
        assert!(matches!(err, BridgeError::ChannelClosed));
        assert_eq!(session.borrow().state(), LoopState::Idle);
    }

    #[test]
    fn test_nested_fetch_is_rejected() {
        let (session, out) = session_with_input("\n");
        session.borrow_mut().store("0!A1".into(), Scalar::Number(1.0));

        let values = fetch_range(&session, "A1", |_| {
            let err = session.borrow_mut().begin_fetch("A2").unwrap_err();
            assert!(matches!(err, BridgeError::NestedDataRequest));
            Ok(())
        })
        .unwrap();

        assert_eq!(values, vec![Scalar::Number(1.0)]);
        // Only the outer request reached the host
        assert_eq!(out.frames().len(), 1);
    }
}
