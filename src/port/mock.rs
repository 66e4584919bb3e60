//! Mock serial link for testing.
//!
//! Provides a `MockSerialPort` that simulates a board without hardware. Output
//! can be preloaded, or scripted as one-shot replies that fire when the agent
//! writes an exact byte sequence or pulses the reset line.

use super::error::PortError;
use super::traits::{ControlLines, PortConfiguration, PortOpener, PortReader, SerialPortAdapter};
use parking_lot::{Condvar, Mutex};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

/// How long a mock reader waits for data before reporting an empty poll.
const MOCK_POLL: Duration = Duration::from_millis(5);

/// A scripted reply that fires once.
#[derive(Debug)]
struct Reply {
    trigger: Trigger,
    output: Vec<u8>,
}

#[derive(Debug, PartialEq, Eq)]
enum Trigger {
    /// The agent wrote exactly these bytes in one call.
    Write(Vec<u8>),
    /// RTS went from high to low.
    ResetPulse,
}

/// Inner state of the mock board, shared between the adapter and readers.
#[derive(Debug, Default)]
struct MockPortState {
    /// Bytes the board will emit, in order.
    read_queue: VecDeque<u8>,
    /// Log of all writes, one entry per call.
    write_log: Vec<Vec<u8>>,
    /// History of control line changes.
    control_log: Vec<ControlLines>,
    /// Pending one-shot replies.
    replies: Vec<Reply>,
    /// Current line levels.
    lines: ControlLines,
    /// Set when the link was lost.
    closed: bool,
}

impl MockPortState {
    fn fire(&mut self, trigger: &Trigger) {
        if let Some(index) = self.replies.iter().position(|r| &r.trigger == trigger) {
            let reply = self.replies.remove(index);
            self.read_queue.extend(reply.output);
        }
    }
}

#[derive(Debug, Default)]
struct Shared {
    state: Mutex<MockPortState>,
    data_ready: Condvar,
}

/// Mock serial link simulating a board.
///
/// # Example
/// ```
/// use lua_board_agent::port::{MockSerialPort, SerialPortAdapter};
///
/// let mut port = MockSerialPort::new("MOCK0");
/// port.reply_on_write(b"print(1)\r\n", b"print(1)\r\n1\r\n/ > \r\n");
///
/// port.write_bytes(b"print(1)\r\n").unwrap();
/// assert_eq!(port.available_bytes(), 19);
/// assert_eq!(port.get_write_log(), vec![b"print(1)\r\n".to_vec()]);
/// ```
#[derive(Clone)]
pub struct MockSerialPort {
    /// The port name/identifier.
    name: String,
    shared: Arc<Shared>,
}

impl MockSerialPort {
    /// Create a new mock link with the given name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            shared: Arc::new(Shared::default()),
        }
    }

    /// Enqueue bytes the board emits immediately.
    pub fn enqueue_read(&self, data: &[u8]) {
        let mut state = self.shared.state.lock();
        state.read_queue.extend(data);
        self.shared.data_ready.notify_all();
    }

    /// Emit `output` once the agent writes exactly `written` in a single call.
    pub fn reply_on_write(&self, written: &[u8], output: &[u8]) {
        let mut state = self.shared.state.lock();
        state.replies.push(Reply {
            trigger: Trigger::Write(written.to_vec()),
            output: output.to_vec(),
        });
    }

    /// Emit `output` once the agent releases RTS after asserting it.
    pub fn reply_on_reset(&self, output: &[u8]) {
        let mut state = self.shared.state.lock();
        state.replies.push(Reply {
            trigger: Trigger::ResetPulse,
            output: output.to_vec(),
        });
    }

    /// Simulate the device disappearing. Readers fail once the queue is empty.
    pub fn disconnect(&self) {
        let mut state = self.shared.state.lock();
        state.closed = true;
        self.shared.data_ready.notify_all();
    }

    /// Get a copy of all data written to the port.
    pub fn get_write_log(&self) -> Vec<Vec<u8>> {
        self.shared.state.lock().write_log.clone()
    }

    /// All written bytes, concatenated.
    pub fn written_bytes(&self) -> Vec<u8> {
        self.shared.state.lock().write_log.concat()
    }

    /// Clear the write log.
    pub fn clear_write_log(&self) {
        self.shared.state.lock().write_log.clear();
    }

    /// History of control line levels set by the agent.
    pub fn control_log(&self) -> Vec<ControlLines> {
        self.shared.state.lock().control_log.clone()
    }

    /// Number of scripted replies that have not fired yet.
    pub fn pending_replies(&self) -> usize {
        self.shared.state.lock().replies.len()
    }

    /// Number of live handles on this board: adapters and readers, this one
    /// included.
    pub fn handles(&self) -> usize {
        Arc::strong_count(&self.shared)
    }

    /// Get the number of bytes the board has emitted but nobody read yet.
    pub fn available_bytes(&self) -> usize {
        self.shared.state.lock().read_queue.len()
    }
}

impl SerialPortAdapter for MockSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(PortError::Closed);
        }
        state.write_log.push(data.to_vec());
        state.fire(&Trigger::Write(data.to_vec()));
        self.shared.data_ready.notify_all();
        Ok(())
    }

    fn set_control_lines(&mut self, lines: ControlLines) -> Result<(), PortError> {
        let mut state = self.shared.state.lock();
        if state.closed {
            return Err(PortError::Closed);
        }
        let released = state.lines.rts && !lines.rts;
        state.lines = lines;
        state.control_log.push(lines);
        if released {
            state.fire(&Trigger::ResetPulse);
            self.shared.data_ready.notify_all();
        }
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn PortReader>, PortError> {
        Ok(Box::new(MockReader {
            shared: Arc::clone(&self.shared),
        }))
    }
}

impl PortOpener for MockSerialPort {
    /// Hand out another handle when asked for this board's name.
    fn open(
        &self,
        port_name: &str,
        _config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        if port_name == self.name {
            Ok(Box::new(self.clone()))
        } else {
            Err(PortError::not_found(port_name))
        }
    }
}

impl std::fmt::Debug for MockSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MockSerialPort")
            .field("name", &self.name)
            .field("available_bytes", &self.available_bytes())
            .finish()
    }
}

/// Reader half of the mock link.
struct MockReader {
    shared: Arc<Shared>,
}

impl PortReader for MockReader {
    fn read_byte(&mut self) -> Result<Option<u8>, PortError> {
        let mut state = self.shared.state.lock();
        if state.read_queue.is_empty() && !state.closed {
            self.shared.data_ready.wait_for(&mut state, MOCK_POLL);
        }
        match state.read_queue.pop_front() {
            Some(byte) => Ok(Some(byte)),
            None if state.closed => Err(PortError::Closed),
            None => Ok(None),
        }
    }
}
