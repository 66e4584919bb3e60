//! Chunked file transfer.
//!
//! The console has no file primitive, so files travel as frames: one length
//! byte followed by that many payload bytes, a zero length ending the
//! transfer. The side receiving frames paces the sender with a `C` cue line.
//!
//! ```text
//! agent                         board
//!   io.receive("/f")\r   ──>
//!                        <──    io.receive("/f")     (echo)
//!                        <──    C
//!   [n] payload          ──>
//!                        <──    C
//!   [0]                  ──>
//!                        <──    true
//! ```

use super::{is_prompt, BoardChannel};
use crate::error::{AgentError, AgentResult};
use tracing::{debug, trace, warn};

/// Cue line the board sends when it is ready for the next frame.
const CUE: &str = "C";

/// Cue the agent sends when it is ready for the next frame.
const CUE_REQUEST: &[u8] = b"C\n";

/// Acknowledgment the board prints after storing a file.
const WRITE_ACK: &str = "true";

/// Payload size of a transfer frame.
///
/// The length travels in a single byte, so only 1..=255 is representable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ChunkSize(u8);

impl ChunkSize {
    /// The largest frame the length byte can describe.
    pub const MAX: ChunkSize = ChunkSize(u8::MAX);

    /// Validate a configured chunk size.
    pub fn new(size: usize) -> AgentResult<Self> {
        match u8::try_from(size) {
            Ok(0) | Err(_) => Err(AgentError::InvalidChunkSize(size)),
            Ok(size) => Ok(Self(size)),
        }
    }

    pub fn get(self) -> usize {
        usize::from(self.0)
    }
}

impl Default for ChunkSize {
    fn default() -> Self {
        Self::MAX
    }
}

impl TryFrom<usize> for ChunkSize {
    type Error = AgentError;

    fn try_from(size: usize) -> Result<Self, Self::Error> {
        Self::new(size)
    }
}

/// Build a frame for a payload of at most 255 bytes.
///
/// An empty payload yields the end-of-transfer frame.
pub fn encode_frame(payload: &[u8]) -> AgentResult<Vec<u8>> {
    let len = u8::try_from(payload.len()).map_err(|_| AgentError::InvalidChunkSize(payload.len()))?;
    let mut frame = Vec::with_capacity(payload.len() + 1);
    frame.push(len);
    frame.extend_from_slice(payload);
    Ok(frame)
}

impl BoardChannel<'_> {
    /// Store `data` at `path` on the board.
    ///
    /// Succeeds only when the board acknowledges the file with `true`.
    pub async fn write_file(&mut self, path: &str, data: &[u8]) -> AgentResult<()> {
        debug!(path, len = data.len(), "write file");
        let command = format!("io.receive(\"{path}\")");
        self.push_frames(&command, data).await?;

        let ack = self.read_line().await?;
        if ack != WRITE_ACK {
            warn!(path, received = %ack, "write not acknowledged");
            return Err(AgentError::desync(WRITE_ACK, ack));
        }
        self.drain().await;
        Ok(())
    }

    /// Fetch the file at `path` from the board.
    pub async fn read_file(&mut self, path: &str) -> AgentResult<Vec<u8>> {
        debug!(path, "read file");
        let command = format!("io.send(\"{path}\")");
        self.write(format!("{command}\r").as_bytes())?;
        self.expect_echo(&command).await?;

        let mut data = Vec::new();
        loop {
            self.write(CUE_REQUEST)?;
            let len = usize::from(self.queue.read_byte().await?);
            if len == 0 {
                break;
            }
            let chunk = self.queue.read_exact(len).await?;
            trace!(len, "frame in");
            data.extend_from_slice(&chunk);
        }

        self.drain().await;
        Ok(data)
    }

    /// Stream `code` to the board's `os.run()` loader and execute it.
    ///
    /// Nothing is written to the board's filesystem and there is no
    /// acknowledgment to wait for.
    pub async fn run_code(&mut self, code: &[u8]) -> AgentResult<()> {
        debug!(len = code.len(), "run code");
        self.push_frames("os.run()", code).await?;
        self.drain().await;
        Ok(())
    }

    /// Send `command`, then feed `data` frame by frame as the board cues.
    /// Returns the number of frames sent, the terminating one included.
    async fn push_frames(&mut self, command: &str, data: &[u8]) -> AgentResult<usize> {
        self.write(format!("{command}\r").as_bytes())?;
        self.expect_echo(command).await?;

        let mut chunks = data.chunks(self.settings.chunk_size.get());
        let mut frames = 0;
        loop {
            self.await_cue().await?;
            frames += 1;
            match chunks.next() {
                Some(chunk) => {
                    trace!(len = chunk.len(), "frame out");
                    self.write(&encode_frame(chunk)?)?;
                }
                None => {
                    self.write(&[0])?;
                    return Ok(frames);
                }
            }
        }
    }

    /// Wait for the board's `C` cue. Other chatter is skipped, but a prompt
    /// means the board left the transfer and nothing will cue us again.
    async fn await_cue(&mut self) -> AgentResult<()> {
        loop {
            let line = self.read_line().await?;
            if line == CUE {
                return Ok(());
            }
            if is_prompt(&line) {
                warn!(received = %line, "board returned to prompt during transfer");
                return Err(AgentError::desync(CUE, line));
            }
            trace!(%line, "skipping line while waiting for cue");
        }
    }
}
