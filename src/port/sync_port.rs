//! Serial link implementation over the `serialport` crate.
//!
//! Wraps `serialport::SerialPort` with our own [`SerialPortAdapter`] and
//! [`PortReader`] traits so the engine can be driven by a mock board in tests.

use super::error::PortError;
use super::traits::{ControlLines, PortConfiguration, PortOpener, PortReader, SerialPortAdapter};
use serde::Serialize;
use std::io::{ErrorKind, Read, Write};
use tracing::{debug, trace};

/// Serial link implementation wrapping `serialport::SerialPort`.
pub struct SyncSerialPort {
    /// The underlying serial port implementation.
    port: Box<dyn serialport::SerialPort>,
    /// The port name/path for identification.
    name: String,
}

impl SyncSerialPort {
    /// Open a board link with the given configuration.
    ///
    /// The port is opened 8N1 without flow control, and both control lines
    /// are driven low right away so the board is not held in reset.
    ///
    /// # Example
    /// ```no_run
    /// use lua_board_agent::port::{PortConfiguration, SyncSerialPort};
    ///
    /// let port = SyncSerialPort::open("/dev/ttyUSB0", &PortConfiguration::default())?;
    /// # Ok::<(), Box<dyn std::error::Error>>(())
    /// ```
    pub fn open(port_name: &str, config: &PortConfiguration) -> Result<Self, PortError> {
        if config.read_poll.is_zero() {
            return Err(PortError::config("read poll interval must be greater than zero"));
        }
        let mut port = serialport::new(port_name, config.baud_rate)
            .data_bits(serialport::DataBits::Eight)
            .flow_control(serialport::FlowControl::None)
            .parity(serialport::Parity::None)
            .stop_bits(serialport::StopBits::One)
            .timeout(config.read_poll)
            .open()
            .map_err(|e| match e.kind() {
                serialport::ErrorKind::NoDevice => PortError::not_found(port_name),
                serialport::ErrorKind::InvalidInput => PortError::config(e.to_string()),
                _ => PortError::Serial(e),
            })?;

        port.write_data_terminal_ready(false)?;
        port.write_request_to_send(false)?;

        debug!(port = port_name, baud = config.baud_rate, "serial link open");

        Ok(Self {
            port,
            name: port_name.to_string(),
        })
    }
}

/// Opens the system's serial ports.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPorts;

impl PortOpener for SystemPorts {
    fn open(
        &self,
        port_name: &str,
        config: &PortConfiguration,
    ) -> Result<Box<dyn SerialPortAdapter>, PortError> {
        Ok(Box::new(SyncSerialPort::open(port_name, config)?))
    }
}

impl SerialPortAdapter for SyncSerialPort {
    fn name(&self) -> &str {
        &self.name
    }

    fn write_bytes(&mut self, data: &[u8]) -> Result<(), PortError> {
        self.port.write_all(data)?;
        self.port.flush()?;
        Ok(())
    }

    fn set_control_lines(&mut self, lines: ControlLines) -> Result<(), PortError> {
        trace!(dtr = lines.dtr, rts = lines.rts, "control lines");
        self.port.write_data_terminal_ready(lines.dtr)?;
        self.port.write_request_to_send(lines.rts)?;
        Ok(())
    }

    fn reader(&mut self) -> Result<Box<dyn PortReader>, PortError> {
        let port = self.port.try_clone()?;
        Ok(Box::new(SyncPortReader { port }))
    }
}

impl std::fmt::Debug for SyncSerialPort {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncSerialPort")
            .field("name", &self.name)
            .field("baud_rate", &self.port.baud_rate())
            .finish()
    }
}

/// Reader half backed by a cloned port handle.
struct SyncPortReader {
    port: Box<dyn serialport::SerialPort>,
}

impl PortReader for SyncPortReader {
    fn read_byte(&mut self) -> Result<Option<u8>, PortError> {
        let mut buffer = [0u8; 1];
        match self.port.read(&mut buffer) {
            Ok(0) => Ok(None),
            Ok(_) => Ok(Some(buffer[0])),
            Err(e) if matches!(e.kind(), ErrorKind::TimedOut | ErrorKind::WouldBlock) => Ok(None),
            Err(e) if e.kind() == ErrorKind::Interrupted => Ok(None),
            Err(e) => Err(PortError::Io(e)),
        }
    }
}

/// A serial port discovered on the host.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct PortListing {
    /// System path of the port.
    pub name: String,
    /// USB vendor id, when the port is a USB device.
    pub vid: Option<u16>,
    /// USB product id, when the port is a USB device.
    pub pid: Option<u16>,
    pub manufacturer: Option<String>,
    pub product: Option<String>,
}

/// Enumerate the serial ports available on this host.
pub fn list_ports() -> Result<Vec<PortListing>, PortError> {
    let ports = serialport::available_ports()?;
    Ok(ports
        .into_iter()
        .map(|info| match info.port_type {
            serialport::SerialPortType::UsbPort(usb) => PortListing {
                name: info.port_name,
                vid: Some(usb.vid),
                pid: Some(usb.pid),
                manufacturer: usb.manufacturer,
                product: usb.product,
            },
            _ => PortListing {
                name: info.port_name,
                vid: None,
                pid: None,
                manufacturer: None,
                product: None,
            },
        })
        .collect())
}
