//! Bounded byte queue between the stream inspector and protocol consumers.
//!
//! The inspector is the single producer and pushes from its own thread with
//! a blocking send: when the queue is full the inspector stalls, which in turn
//! stops it reading the link. Consumers read asynchronously, one byte or one
//! line at a time.

use crate::error::{AgentError, AgentResult};
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::trace;

/// Queue capacity used when nothing else is configured.
pub const DEFAULT_QUEUE_CAPACITY: usize = 10 * 1024;

/// Create a connected producer/consumer pair.
///
/// # Panics
///
/// Panics if `capacity` is zero.
pub fn byte_queue(capacity: usize) -> (QueueFeeder, ByteQueue) {
    let (tx, rx) = mpsc::channel(capacity);
    (QueueFeeder { tx }, ByteQueue { rx })
}

/// Producer half, owned by the inspector thread.
#[derive(Debug)]
pub struct QueueFeeder {
    tx: mpsc::Sender<u8>,
}

impl QueueFeeder {
    /// Push one byte, blocking while the queue is full.
    ///
    /// Returns `false` once the consumer is gone. Must not be called from
    /// inside an async task.
    pub fn push(&self, byte: u8) -> bool {
        self.tx.blocking_send(byte).is_ok()
    }
}

/// Consumer half, owned by the board session.
#[derive(Debug)]
pub struct ByteQueue {
    rx: mpsc::Receiver<u8>,
}

impl ByteQueue {
    /// Read the next byte.
    ///
    /// Fails with [`AgentError::LinkClosed`] once the producer has stopped and
    /// every queued byte was consumed.
    pub async fn read_byte(&mut self) -> AgentResult<u8> {
        self.rx.recv().await.ok_or(AgentError::LinkClosed)
    }

    /// Read exactly `len` bytes.
    pub async fn read_exact(&mut self, len: usize) -> AgentResult<Vec<u8>> {
        let mut bytes = Vec::with_capacity(len);
        while bytes.len() < len {
            bytes.push(self.read_byte().await?);
        }
        Ok(bytes)
    }

    /// Read one line, without its terminator.
    ///
    /// Carriage returns are dropped wherever they appear; the line ends at
    /// the first newline.
    pub async fn read_line(&mut self) -> AgentResult<String> {
        let mut line = Vec::new();
        loop {
            match self.read_byte().await? {
                b'\n' => break,
                b'\r' => {}
                byte => line.push(byte),
            }
        }
        let line = String::from_utf8_lossy(&line).into_owned();
        trace!(%line, "rx line");
        Ok(line)
    }

    /// Discard whatever the board sends during `settle`, plus anything
    /// already queued. Returns the number of bytes dropped.
    pub async fn drain(&mut self, settle: Duration) -> usize {
        if !settle.is_zero() {
            tokio::time::sleep(settle).await;
        }
        let mut dropped = 0;
        while self.rx.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            trace!(dropped, "drained stray bytes");
        }
        dropped
    }

    /// Number of bytes waiting to be consumed.
    pub fn len(&self) -> usize {
        self.rx.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rx.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(feeder: QueueFeeder, bytes: &'static [u8]) -> std::thread::JoinHandle<()> {
        std::thread::spawn(move || {
            for &byte in bytes {
                assert!(feeder.push(byte));
            }
        })
    }

    #[tokio::test]
    async fn test_read_line_strips_carriage_returns() {
        let (feeder, mut queue) = byte_queue(64);
        feed(feeder, b"he\rllo\r\nworld\n").join().unwrap();

        assert_eq!(queue.read_line().await.unwrap(), "hello");
        assert_eq!(queue.read_line().await.unwrap(), "world");
    }

    #[tokio::test]
    async fn test_closed_producer_reports_link_closed() {
        let (feeder, mut queue) = byte_queue(8);
        feed(feeder, b"ab").join().unwrap();

        assert_eq!(queue.read_exact(2).await.unwrap(), b"ab");
        assert!(matches!(
            queue.read_byte().await,
            Err(AgentError::LinkClosed)
        ));
    }

    #[tokio::test]
    async fn test_drain_discards_pending_bytes() {
        let (feeder, mut queue) = byte_queue(16);
        let handle = feed(feeder, b"noise");
        handle.join().unwrap();

        assert_eq!(queue.len(), 5);
        assert_eq!(queue.drain(Duration::ZERO).await, 5);
        assert!(queue.is_empty());
    }

    #[tokio::test]
    async fn test_full_queue_blocks_producer() {
        let (feeder, mut queue) = byte_queue(2);
        let handle = feed(feeder, b"abcd");

        tokio::time::sleep(Duration::from_millis(20)).await;
        assert_eq!(queue.len(), 2);
        assert!(!handle.is_finished());

        assert_eq!(queue.read_exact(4).await.unwrap(), b"abcd");
        tokio::task::spawn_blocking(move || handle.join().unwrap())
            .await
            .unwrap();
    }
}
