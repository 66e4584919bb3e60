//! Configuration schema definitions.
//!
//! This module defines the structure of the configuration file using serde.
//! All configuration sections are defined here with appropriate defaults.

use super::error::{ConfigError, ConfigResult};
use crate::board::SessionSettings;
use crate::port::{PortConfiguration, DEFAULT_BAUD_RATE};
use crate::protocol::{ChannelSettings, ChunkSize, DEFAULT_QUEUE_CAPACITY};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Serial link configuration
    pub serial: SerialConfig,
    /// Board protocol configuration
    pub board: BoardConfig,
    /// Firmware upgrade configuration
    pub firmware: FirmwareConfig,
    /// Logging configuration
    pub logging: LoggingConfig,
}

impl Config {
    /// Reject values the protocol engine cannot work with.
    pub fn validate(&self) -> ConfigResult<()> {
        ChunkSize::new(self.board.chunk_size)
            .map_err(|e| ConfigError::validation("board.chunk_size", e.to_string()))?;
        if self.serial.queue_capacity == 0 {
            return Err(ConfigError::validation(
                "serial.queue_capacity",
                "must be greater than zero",
            ));
        }
        if self.serial.read_poll_ms == 0 {
            return Err(ConfigError::validation(
                "serial.read_poll_ms",
                "must be greater than zero",
            ));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::validation(
                "serial.baud_rate",
                "must be greater than zero",
            ));
        }
        if self.board.boot_timeout_ms == 0 {
            return Err(ConfigError::validation(
                "board.boot_timeout_ms",
                "must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Session settings derived from the `[serial]` and `[board]` sections.
    pub fn session_settings(&self) -> ConfigResult<SessionSettings> {
        self.validate()?;
        let chunk_size = ChunkSize::new(self.board.chunk_size)
            .map_err(|e| ConfigError::validation("board.chunk_size", e.to_string()))?;

        Ok(SessionSettings {
            port: PortConfiguration {
                baud_rate: self.serial.baud_rate,
                read_poll: self.serial.read_poll(),
            },
            channel: ChannelSettings {
                chunk_size,
                settle: self.board.settle(),
            },
            queue_capacity: self.serial.queue_capacity,
            reset_pulse: self.board.reset_pulse(),
            boot_timeout: self.board.boot_timeout(),
            assets_dir: self.board.assets_dir.clone(),
        })
    }
}

/// Serial link configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SerialConfig {
    /// Bit rate of the board console
    pub baud_rate: u32,
    /// How long one link read may block, in milliseconds
    pub read_poll_ms: u64,
    /// Bytes buffered between the inspector and protocol operations
    pub queue_capacity: usize,
    /// Port aliases for convenience
    #[serde(default)]
    pub port_aliases: HashMap<String, String>,
}

impl Default for SerialConfig {
    fn default() -> Self {
        Self {
            baud_rate: DEFAULT_BAUD_RATE,
            read_poll_ms: 100,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            port_aliases: HashMap::new(),
        }
    }
}

impl SerialConfig {
    pub fn read_poll(&self) -> Duration {
        Duration::from_millis(self.read_poll_ms)
    }

    /// Resolve a port name through aliases
    pub fn resolve_port(&self, name: &str) -> String {
        self.port_aliases
            .get(name)
            .cloned()
            .unwrap_or_else(|| name.to_string())
    }
}

/// Board protocol configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BoardConfig {
    /// Payload bytes per transfer frame (1 to 255)
    pub chunk_size: usize,
    /// Limit for the board to reach its prompt after a reset
    pub boot_timeout_ms: u64,
    /// RTS pulse length for a hard reset
    pub reset_pulse_ms: u64,
    /// Quiet period before stray output is discarded
    pub settle_ms: u64,
    /// Directory holding `board-info.lua` and `lib/*.lua`
    pub assets_dir: PathBuf,
}

impl Default for BoardConfig {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::MAX.get(),
            boot_timeout_ms: 15_000,
            reset_pulse_ms: 10,
            settle_ms: 200,
            assets_dir: PathBuf::from("./boards/lua"),
        }
    }
}

impl BoardConfig {
    pub fn boot_timeout(&self) -> Duration {
        Duration::from_millis(self.boot_timeout_ms)
    }

    pub fn reset_pulse(&self) -> Duration {
        Duration::from_millis(self.reset_pulse_ms)
    }

    pub fn settle(&self) -> Duration {
        Duration::from_millis(self.settle_ms)
    }
}

/// Firmware upgrade configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FirmwareConfig {
    /// Firmware distribution server
    pub base_url: String,
    /// Board model requested from the server
    pub board: String,
    /// Archive download path, relative to `base_url`
    pub firmware_path: String,
    /// Latest build identifier path, relative to `base_url`
    pub last_build_path: String,
    /// Scratch directory for downloads (defaults to the data dir's `tmp`)
    pub work_dir: Option<PathBuf>,
    /// Flashing tool executable
    pub flasher_program: String,
    /// Flashing tool arguments; `{port}`, `{dir}` and `{board}` are substituted
    pub flasher_args: Vec<String>,
    /// Proxy for firmware downloads
    pub http_proxy: Option<String>,
}

impl Default for FirmwareConfig {
    fn default() -> Self {
        Self {
            base_url: "http://whitecatboard.org".to_string(),
            board: "WHITECAT-ESP32-N1".to_string(),
            firmware_path: "/firmwarev2.php".to_string(),
            last_build_path: "/lastbuildv2.php".to_string(),
            work_dir: None,
            flasher_program: "esptool.py".to_string(),
            flasher_args: default_flasher_args(),
            http_proxy: None,
        }
    }
}

fn default_flasher_args() -> Vec<String> {
    [
        "--chip",
        "esp32",
        "--port",
        "{port}",
        "--baud",
        "921600",
        "--before",
        "default_reset",
        "--after",
        "hard_reset",
        "write_flash",
        "-z",
        "--flash_mode",
        "qio",
        "--flash_freq",
        "80m",
        "--flash_size",
        "detect",
        "0x1000",
        "{dir}/bootloader.{board}.bin",
        "0x10000",
        "{dir}/lua_rtos.{board}.bin",
        "0x8000",
        "{dir}/partitions_singleapp.{board}.bin",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

impl FirmwareConfig {
    /// Where the firmware archive is downloaded from.
    pub fn firmware_url(&self) -> String {
        format!("{}{}?board={}", self.base_url, self.firmware_path, self.board)
    }

    /// Where the latest build identifier is published.
    pub fn last_build_url(&self) -> String {
        format!("{}{}", self.base_url, self.last_build_path)
    }

    /// Scratch directory, falling back to the platform data dir, then `./tmp`.
    pub fn resolved_work_dir(&self) -> PathBuf {
        self.work_dir
            .clone()
            .or_else(|| super::loader::get_data_dir().map(|dir| dir.join("tmp")))
            .unwrap_or_else(|| PathBuf::from("./tmp"))
    }
}

/// Logging configuration section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error"
    pub level: String,
    /// Log file path (optional)
    pub file: Option<PathBuf>,
    /// Log format: "json", "pretty", "compact"
    pub format: LogFormat,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            file: None,
            format: LogFormat::Pretty,
        }
    }
}

/// Log output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    /// JSON format
    Json,
    /// Pretty format with colors
    #[default]
    Pretty,
    /// Compact format
    Compact,
}
