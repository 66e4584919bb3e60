//! Serial link abstraction.
//!
//! Provides the link traits used by the protocol engine, the `serialport`
//! backed implementation, and a scripted mock board for tests.

pub mod error;
pub mod mock;
pub mod sync_port;
pub mod traits;

pub use error::PortError;
pub use mock::MockSerialPort;
pub use sync_port::{list_ports, PortListing, SyncSerialPort, SystemPorts};
pub use traits::*;
