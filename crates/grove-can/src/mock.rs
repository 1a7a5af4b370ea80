//! In-memory transport and clock for tests
//!
//! Both halves are cheap handles over shared state, so a test can keep a
//! [`MockHandle`] or a clone of the [`MockClock`] after moving the other end
//! into the driver.

use std::collections::VecDeque;
use std::io;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::command::COMMAND_TERMINATOR;
use crate::transport::{Clock, Transport, LINE_TERMINATOR};

/// Produces the module's reply to one write call
pub type Responder = Box<dyn FnMut(&[u8]) -> Vec<u8> + Send>;

#[derive(Default)]
struct MockState {
    incoming: VecDeque<u8>,
    written: Vec<u8>,
    lines: Vec<String>,
    endless: Option<u8>,
    fail_writes: bool,
    responder: Option<Responder>,
}

/// Transport half handed to the driver
pub struct MockTransport {
    state: Arc<Mutex<MockState>>,
}

/// Test-side handle to the same transport state
#[derive(Clone)]
pub struct MockHandle {
    state: Arc<Mutex<MockState>>,
}

impl MockTransport {
    /// Create a connected transport/handle pair
    pub fn new() -> (Self, MockHandle) {
        let state = Arc::new(Mutex::new(MockState::default()));
        (
            Self {
                state: Arc::clone(&state),
            },
            MockHandle { state },
        )
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        lock(&self.state)
    }

    fn record_write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let mut state = self.state();
        if state.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "mock write failure"));
        }
        state.written.extend_from_slice(bytes);
        if let Some(mut responder) = state.responder.take() {
            let reply = responder(bytes);
            state.incoming.extend(reply);
            state.responder = Some(responder);
        }
        Ok(())
    }
}

impl Transport for MockTransport {
    fn bytes_available(&mut self) -> io::Result<bool> {
        let state = self.state();
        Ok(state.endless.is_some() || !state.incoming.is_empty())
    }

    fn read_byte(&mut self) -> io::Result<Option<u8>> {
        let mut state = self.state();
        match state.incoming.pop_front() {
            Some(byte) => Ok(Some(byte)),
            None => Ok(state.endless),
        }
    }

    fn write_bytes(&mut self, bytes: &[u8]) -> io::Result<()> {
        self.record_write(bytes)
    }

    fn write_line(&mut self, line: &str) -> io::Result<()> {
        let mut bytes = line.as_bytes().to_vec();
        bytes.extend_from_slice(LINE_TERMINATOR);
        self.record_write(&bytes)?;
        self.state().lines.push(line.to_string());
        Ok(())
    }
}

impl MockHandle {
    /// Queue bytes for the driver to read
    pub fn push_incoming(&self, bytes: &[u8]) {
        lock(&self.state).incoming.extend(bytes.iter().copied());
    }

    /// Bytes queued but not yet read
    pub fn pending_incoming(&self) -> usize {
        lock(&self.state).incoming.len()
    }

    /// Everything written so far
    pub fn written(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Drain and return everything written so far
    pub fn take_written(&self) -> Vec<u8> {
        std::mem::take(&mut lock(&self.state).written)
    }

    /// Text lines written through `write_line`
    pub fn lines(&self) -> Vec<String> {
        lock(&self.state).lines.clone()
    }

    /// After the queue empties, keep producing `byte` forever
    pub fn set_endless(&self, byte: Option<u8>) {
        lock(&self.state).endless = byte;
    }

    /// Make every write fail with `BrokenPipe`
    pub fn fail_writes(&self, fail: bool) {
        lock(&self.state).fail_writes = fail;
    }

    /// Install a reply generator invoked on every write
    pub fn set_responder<F>(&self, responder: F)
    where
        F: FnMut(&[u8]) -> Vec<u8> + Send + 'static,
    {
        lock(&self.state).responder = Some(Box::new(responder));
    }

    /// Acknowledge every `AT+` command line with `OK\r\n`
    pub fn ack_commands(&self) {
        self.set_responder(|written| {
            if written.starts_with(b"AT+") && written.ends_with(LINE_TERMINATOR) {
                COMMAND_TERMINATOR.to_vec()
            } else {
                Vec::new()
            }
        });
    }
}

fn lock(state: &Mutex<MockState>) -> MutexGuard<'_, MockState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Manually driven clock; optionally advances on every read
#[derive(Debug, Clone, Default)]
pub struct MockClock {
    now: Arc<AtomicU64>,
    step: Arc<AtomicU64>,
}

impl MockClock {
    /// Clock frozen at 0 ms
    pub fn new() -> Self {
        Self::default()
    }

    /// Clock that moves forward `step_ms` each time it is read, so blocking
    /// loops terminate without real time passing
    pub fn auto_advance(step_ms: u64) -> Self {
        let clock = Self::default();
        clock.step.store(step_ms, Ordering::SeqCst);
        clock
    }

    /// Move time forward
    pub fn advance(&self, ms: u64) {
        self.now.fetch_add(ms, Ordering::SeqCst);
    }

    /// Current time without triggering auto-advance
    pub fn peek(&self) -> u64 {
        self.now.load(Ordering::SeqCst)
    }
}

impl Clock for MockClock {
    fn now_ms(&self) -> u64 {
        let step = self.step.load(Ordering::SeqCst);
        self.now.fetch_add(step, Ordering::SeqCst) + step
    }
}
