//! Configuration module for the board agent.
//!
//! This module provides TOML-based configuration with environment variable overrides.
//!
//! # Configuration Resolution
//!
//! Configuration is loaded from the following locations (in order of priority):
//!
//! 1. `BOARD_AGENT_CONFIG` environment variable (explicit path)
//! 2. `./board-agent.toml` (current directory)
//! 3. `board-agent.toml` in the platform config directory
//!    (`~/.config/board-agent` on Linux, `%APPDATA%` on Windows)
//! 4. Built-in defaults (no file required)
//!
//! # Environment Overrides
//!
//! The pattern is: `BOARD_AGENT_<SECTION>_<KEY>`
//!
//! Examples:
//! - `BOARD_AGENT_SERIAL_BAUD_RATE=921600`
//! - `BOARD_AGENT_BOARD_BOOT_TIMEOUT_MS=30000`
//! - `BOARD_AGENT_LOGGING_LEVEL=debug`
//!
//! # Example
//!
//! ```rust,no_run
//! use lua_board_agent::config::ConfigLoader;
//!
//! let loader = ConfigLoader::load()?;
//! let config = loader.config();
//!
//! println!("Chunk size: {}", config.board.chunk_size);
//! # Ok::<(), lua_board_agent::config::ConfigError>(())
//! ```

mod error;
mod loader;
mod schema;

pub use error::{ConfigError, ConfigResult};
pub use loader::{
    get_config_dir, get_data_dir, get_default_config_path, resolve_config_path, ConfigLoader,
};
pub use schema::{BoardConfig, Config, FirmwareConfig, LogFormat, LoggingConfig, SerialConfig};
