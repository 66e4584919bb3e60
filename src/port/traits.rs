//! Core traits for the serial link abstraction.
//!
//! The link is split in two halves: the [`SerialPortAdapter`] owned by the
//! board session (writes and control lines) and a [`PortReader`] handed to the
//! stream inspector, which is the only component reading from the device.
//! Both real serial ports and the mock board implement these traits.

use super::error::PortError;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bit rate used by Lua RTOS consoles.
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Configuration parameters for a board link.
///
/// Framing is fixed to 8 data bits, no parity, one stop bit and no flow
/// control; only the bit rate and the reader poll interval are tunable.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// Baud rate (bits per second).
    pub baud_rate: u32,

    /// How long a single read may block before returning with no data.
    ///
    /// The reader reports an empty poll instead of an error so the inspector
    /// can check for control messages between bytes.
    pub read_poll: Duration,
}

impl Default for PortConfiguration {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_poll: Duration::from_millis(100),
        }
    }
}

/// Level of the modem control lines.
///
/// Both lines idle low; RTS is pulsed high to hard-reset ESP32 boards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ControlLines {
    /// Data Terminal Ready.
    pub dtr: bool,
    /// Request To Send.
    pub rts: bool,
}

impl ControlLines {
    /// Both lines low.
    pub const IDLE: Self = Self {
        dtr: false,
        rts: false,
    };

    /// RTS asserted, DTR low.
    pub const RESET: Self = Self {
        dtr: false,
        rts: true,
    };
}

/// Read half of a serial link.
pub trait PortReader: Send {
    /// Read a single byte.
    ///
    /// Returns `Ok(None)` when the poll interval elapsed without data, and an
    /// error once the link is closed or failed. Errors are terminal.
    fn read_byte(&mut self) -> Result<Option<u8>, PortError>;
}

/// Write half and control surface of a serial link.
pub trait SerialPortAdapter: Send + std::fmt::Debug {
    /// Get the name/path of this serial port.
    fn name(&self) -> &str;

    /// Write all bytes to the link.
    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PortError>;

    /// Drive the DTR and RTS lines.
    fn set_control_lines(&mut self, lines: ControlLines) -> Result<(), PortError>;

    /// Create the reader half of this link.
    ///
    /// The reader shares the underlying device with the adapter; closing the
    /// adapter alone does not stop a reader that is still held elsewhere.
    fn reader(&mut self) -> Result<Box<dyn PortReader>, PortError>;
}

/// Opens links by port name.
pub trait PortOpener: Send + Sync + std::fmt::Debug {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError>;
}
