//! Line-oriented board protocol.
//!
//! A [`BoardChannel`] is the exclusive right to talk to the board: it borrows
//! the link writer and the byte queue mutably, so no two protocol operations
//! (command/response, file transfer, reset) can interleave. Replies are read
//! from the queue the stream inspector feeds, never from the link directly.
//!
//! ```text
//! link ──> inspector ──> ByteQueue ──> BoardChannel ──> link (writes)
//!              │
//!              └──> EventBus
//! ```

pub mod command;
pub mod queue;
pub mod transfer;

pub use command::is_prompt;
pub use queue::{byte_queue, ByteQueue, QueueFeeder, DEFAULT_QUEUE_CAPACITY};
pub use transfer::{encode_frame, ChunkSize};

use crate::error::{AgentError, AgentResult};
use crate::port::{ControlLines, SerialPortAdapter};
use std::time::Duration;
use tracing::{trace, warn};

/// Tunables shared by every protocol operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChannelSettings {
    /// Payload bytes per transfer frame.
    pub chunk_size: ChunkSize,
    /// How long to let stray output arrive before draining it.
    pub settle: Duration,
}

impl Default for ChannelSettings {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::MAX,
            settle: Duration::from_millis(200),
        }
    }
}

/// Exclusive access to the board for one protocol exchange.
pub struct BoardChannel<'a> {
    port: &'a mut dyn SerialPortAdapter,
    queue: &'a mut ByteQueue,
    settings: ChannelSettings,
}

impl<'a> BoardChannel<'a> {
    pub fn new(
        port: &'a mut dyn SerialPortAdapter,
        queue: &'a mut ByteQueue,
        settings: ChannelSettings,
    ) -> Self {
        Self {
            port,
            queue,
            settings,
        }
    }

    pub fn settings(&self) -> ChannelSettings {
        self.settings
    }

    /// Write raw bytes to the board.
    pub fn write(&mut self, data: &[u8]) -> AgentResult<()> {
        trace!(len = data.len(), "tx");
        Ok(self.port.write_bytes(data)?)
    }

    /// Read one line from the board.
    pub async fn read_line(&mut self) -> AgentResult<String> {
        self.queue.read_line().await
    }

    /// Let the board settle, then discard anything it sent.
    pub async fn drain(&mut self) -> usize {
        self.queue.drain(self.settings.settle).await
    }

    /// Read the board's local echo of `command`.
    ///
    /// Any other line means the board is not where we think it is; nothing
    /// further is read in that case.
    async fn expect_echo(&mut self, command: &str) -> AgentResult<()> {
        let echo = self.queue.read_line().await?;
        if echo == command {
            Ok(())
        } else {
            warn!(expected = command, received = %echo, "echo mismatch");
            Err(AgentError::desync(command, echo))
        }
    }

    /// Drive the modem control lines.
    pub fn set_control_lines(&mut self, lines: ControlLines) -> AgentResult<()> {
        Ok(self.port.set_control_lines(lines)?)
    }
}

impl std::fmt::Debug for BoardChannel<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BoardChannel")
            .field("port", &self.port.name())
            .field("queued", &self.queue.len())
            .field("settings", &self.settings)
            .finish()
    }
}
