//! Lua Board Agent Library
//!
//! This library drives a Lua RTOS board over a serial link on behalf of a
//! visual programming IDE: attach and reset, console commands, chunked file
//! transfer, program launch, and classification of the board's unsolicited
//! output into notifications.
//!
//! # Modules
//!
//! - `port`: Serial link abstraction (real ports and a scripted mock board)
//! - `protocol`: Byte queue, command/response channel and file transfer
//! - `inspector`: Link reader thread and line classifier
//! - `boot`: Reset and boot sequencing
//! - `board`: Board session, info, listings and provisioning
//! - `event`: Board events and the notification bus
//! - `firmware`: Update check and upgrade pipeline
//! - `service`: Single active session front end
//! - `config`: Configuration management with TOML support
//! - `error`: Unified error handling

pub mod board;
pub mod boot;
pub mod config;
pub mod error;
pub mod event;
pub mod firmware;
pub mod inspector;
pub mod port;
pub mod protocol;
pub mod service;

// Re-export commonly used types for convenience
pub use board::{BoardInfo, BoardSession, DirectoryEntry, SessionSettings};
pub use error::{AgentError, AgentResult};
pub use event::{BoardEvent, EventBus, Notification, NotificationKind};
pub use port::{MockSerialPort, PortConfiguration, PortError, SerialPortAdapter, SyncSerialPort};
pub use protocol::{BoardChannel, ChannelSettings, ChunkSize};
pub use service::BoardService;

// Re-export config types
pub use config::{Config, ConfigError, ConfigLoader, ConfigResult};
