//! Unified engine error type.
//!
//! Link failures, protocol desynchronisation and boot timeouts all surface as
//! [`AgentError`]. Protocol-level failures are returned to the immediate
//! caller and never retried; link-level failures invalidate the session.

use crate::config::ConfigError;
use crate::firmware::FirmwareError;
use crate::port::PortError;
use std::time::Duration;
use thiserror::Error;

/// A specialized `Result` type for engine operations.
pub type AgentResult<T> = Result<T, AgentError>;

/// Errors produced by the board protocol engine.
#[derive(Debug, Error)]
pub enum AgentError {
    /// The serial link could not be opened; nothing else ran.
    #[error("Serial port '{port}' is unavailable: {source}")]
    PortUnavailable {
        port: String,
        #[source]
        source: PortError,
    },

    /// The link failed or was closed while an operation was in flight.
    #[error("Serial link closed")]
    LinkClosed,

    /// The board answered with something other than the expected echo or
    /// acknowledgment. The operation was abandoned without resynchronising.
    #[error("Protocol desync: expected {expected:?}, received {received:?}")]
    ProtocolDesync { expected: String, received: String },

    /// The board never reached its prompt-ready state after a reset.
    #[error("Board did not finish booting within {0:?}")]
    SequenceTimeout(Duration),

    /// A transfer chunk size that cannot be expressed in the one-byte length
    /// field.
    #[error("Invalid chunk size {0}: must be between 1 and 255")]
    InvalidChunkSize(usize),

    /// A byte queue that could never hold a byte.
    #[error("Invalid queue capacity 0: must be greater than zero")]
    InvalidQueueCapacity,

    /// An operation needs an attached board but none is.
    #[error("No board attached")]
    NotAttached,

    /// The configuration cannot drive a session.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Firmware download, extraction or flashing failed.
    #[error(transparent)]
    Firmware(#[from] FirmwareError),

    /// A write or control-line change on the link failed.
    #[error("Link error: {0}")]
    Port(PortError),

    /// Local filesystem error (assets, transfers to disk).
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl AgentError {
    /// Create a desync error from the expected and the received line.
    pub fn desync(expected: impl Into<String>, received: impl Into<String>) -> Self {
        Self::ProtocolDesync {
            expected: expected.into(),
            received: received.into(),
        }
    }

    /// Whether this error means the session can no longer be used.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::LinkClosed | Self::Port(_))
    }
}

impl From<PortError> for AgentError {
    fn from(err: PortError) -> Self {
        match err {
            PortError::Closed => AgentError::LinkClosed,
            other => AgentError::Port(other),
        }
    }
}
