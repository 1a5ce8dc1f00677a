//! The lock-step execution loop.
//!
//! Lines from the host are collected until a blank line, then run as one
//! chunk. Every chunk ends with exactly one closing frame: command-complete
//! on success, a function result for calls, or an error diagnostic.

use grid_bridge_protocol::{Frame, InboundChunk};

use crate::dispatch::dispatch;
use crate::engine::{ScriptEngine, ScriptFailure};
use crate::error::Result;
use crate::session::{LoopState, SharedSession};

pub struct ExecutionLoop<E> {
    session: SharedSession,
    engine: E,
}

impl<E: ScriptEngine> ExecutionLoop<E> {
    pub fn new(session: SharedSession, engine: E) -> Self {
        Self { session, engine }
    }

    pub fn session(&self) -> &SharedSession {
        &self.session
    }

    pub fn engine_mut(&mut self) -> &mut E {
        &mut self.engine
    }

    /// Run source outside the line protocol, e.g. startup scripts.
    ///
    /// No closing frame is sent.
    pub fn execute_source(&mut self, source: &str) -> std::result::Result<(), ScriptFailure> {
        self.session.borrow_mut().set_state(LoopState::Executing);
        let outcome = self.engine.execute(source);
        self.session.borrow_mut().set_state(LoopState::Idle);
        outcome
    }

    /// Serve the host until its input ends.
    ///
    /// A chunk left unterminated at end of input is still run. Only channel
    /// I/O failures end the loop early.
    pub fn run(&mut self) -> Result<()> {
        tracing::info!("execution loop started");

        loop {
            let line = self.session.borrow_mut().read_line()?;
            match line {
                Some(line) => self.feed(&line)?,
                None => {
                    if self.session.borrow().state() == LoopState::Accumulating {
                        self.execute_buffered()?;
                    }
                    tracing::info!("host input closed, stopping");
                    return Ok(());
                }
            }
        }
    }

    /// Advance the state machine by one input line
    pub fn feed(&mut self, line: &str) -> Result<()> {
        let state = self.session.borrow().state();

        match (state, line.is_empty()) {
            (LoopState::Idle, true) => Ok(()),
            (LoopState::Accumulating, true) => self.execute_buffered(),
            (_, false) => {
                let mut session = self.session.borrow_mut();
                session.buffer_mut().push_line(line);
                session.set_state(LoopState::Accumulating);
                Ok(())
            }
            (LoopState::Executing | LoopState::AwaitingData, true) => {
                tracing::warn!("blank line while {state:?}, ignored");
                Ok(())
            }
        }
    }

    fn execute_buffered(&mut self) -> Result<()> {
        let chunk = {
            let mut session = self.session.borrow_mut();
            session.set_state(LoopState::Executing);
            session.buffer_mut().take()
        };

        let outcome = match InboundChunk::parse(&chunk) {
            Ok(InboundChunk::Script(source)) => self.run_script(&source),
            Ok(InboundChunk::Call { name, args }) => {
                let result = dispatch(&self.session, &mut self.engine, &name, &args);
                self.session.borrow_mut().send(Frame::FunctionResult(result))
            }
            Err(e) => {
                tracing::warn!("rejected chunk: {e}");
                self.session.borrow_mut().send(Frame::error(&e))
            }
        };

        self.session.borrow_mut().set_state(LoopState::Idle);
        outcome
    }

    fn run_script(&mut self, source: &str) -> Result<()> {
        tracing::debug!("executing {} line chunk", source.lines().count());

        let closing = match self.engine.execute(source) {
            Ok(()) => Frame::CommandComplete,
            Err(failure) => {
                tracing::warn!("chunk failed: {failure}");
                Frame::error(&failure)
            }
        };
        self.session.borrow_mut().send(closing)
    }
}
