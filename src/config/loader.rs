//! Configuration loader with file resolution and environment override support.

use super::error::{ConfigError, ConfigResult};
use super::schema::{Config, LogFormat};
use directories::ProjectDirs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

/// Environment variable prefix for overrides
const ENV_PREFIX: &str = "BOARD_AGENT";

/// Config file name
const CONFIG_FILE_NAME: &str = "board-agent.toml";

/// Environment variable for explicit config path
const CONFIG_PATH_ENV: &str = "BOARD_AGENT_CONFIG";

/// Configuration loader with resolution and override logic.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    /// Resolved config file path (if any)
    pub config_path: Option<PathBuf>,
    /// The loaded configuration
    pub config: Config,
}

impl ConfigLoader {
    /// Load configuration using standard resolution order.
    ///
    /// Resolution priority (highest to lowest):
    /// 1. `BOARD_AGENT_CONFIG` environment variable (explicit path)
    /// 2. `./board-agent.toml` (current directory)
    /// 3. `board-agent.toml` in the platform config directory
    /// 4. Built-in defaults (no file required)
    ///
    /// Environment variables override file values, and the result is
    /// validated.
    pub fn load() -> ConfigResult<Self> {
        let config_path = resolve_config_path();

        let mut config = if let Some(ref path) = config_path {
            load_from_file(path)?
        } else {
            Config::default()
        };

        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self { config_path, config })
    }

    /// Load configuration from a specific file path.
    pub fn load_from(path: impl AsRef<Path>) -> ConfigResult<Self> {
        let path = path.as_ref().to_path_buf();
        if !path.exists() {
            return Err(ConfigError::NotFound(path));
        }
        let mut config = load_from_file(&path)?;
        apply_env_overrides(&mut config)?;
        config.validate()?;

        Ok(Self {
            config_path: Some(path),
            config,
        })
    }

    /// Create a loader with default configuration (no file).
    pub fn with_defaults() -> Self {
        let mut config = Config::default();
        // Still apply env overrides even with defaults
        if apply_env_overrides(&mut config).is_err() || config.validate().is_err() {
            config = Config::default();
        }

        Self {
            config_path: None,
            config,
        }
    }

    /// Get the loaded configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Consume the loader and return the configuration.
    pub fn into_config(self) -> Config {
        self.config
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("org", "whitecatboard", "board-agent")
}

/// Platform config directory of the agent.
pub fn get_config_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().to_path_buf())
}

/// Platform data directory of the agent, home of downloaded firmware.
pub fn get_data_dir() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.data_dir().to_path_buf())
}

/// Get the default config file path for creating new config files.
pub fn get_default_config_path() -> Option<PathBuf> {
    get_config_dir().map(|d| d.join(CONFIG_FILE_NAME))
}

/// Resolve the configuration file path using standard locations.
pub fn resolve_config_path() -> Option<PathBuf> {
    // 1. Explicit environment variable
    if let Ok(path) = std::env::var(CONFIG_PATH_ENV) {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    // 2. Current directory
    let cwd_config = PathBuf::from(CONFIG_FILE_NAME);
    if cwd_config.exists() {
        return Some(cwd_config);
    }

    // 3. Platform config directory
    get_default_config_path().filter(|path| path.exists())
}

/// Load configuration from a file.
fn load_from_file(path: &Path) -> ConfigResult<Config> {
    let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
        path: path.to_path_buf(),
        source: e,
    })?;

    toml::from_str(&content).map_err(ConfigError::ParseError)
}

/// Read `BOARD_AGENT_<key>` and parse it, if set.
fn env_value<T: FromStr>(key: &str) -> ConfigResult<Option<T>> {
    let var = format!("{}_{}", ENV_PREFIX, key);
    match std::env::var(&var) {
        Ok(val) => val
            .parse()
            .map(Some)
            .map_err(|_| ConfigError::env_parse(var, format!("Invalid value '{}'", val))),
        Err(_) => Ok(None),
    }
}

/// Apply environment variable overrides to the configuration.
///
/// Environment variables follow the pattern: `BOARD_AGENT_<SECTION>_<KEY>`
/// For example:
/// - `BOARD_AGENT_SERIAL_BAUD_RATE=921600`
/// - `BOARD_AGENT_BOARD_CHUNK_SIZE=128`
/// - `BOARD_AGENT_FIRMWARE_BASE_URL=http://localhost:8082`
fn apply_env_overrides(config: &mut Config) -> ConfigResult<()> {
    // Serial overrides
    if let Some(val) = env_value("SERIAL_BAUD_RATE")? {
        config.serial.baud_rate = val;
    }
    if let Some(val) = env_value("SERIAL_READ_POLL_MS")? {
        config.serial.read_poll_ms = val;
    }
    if let Some(val) = env_value("SERIAL_QUEUE_CAPACITY")? {
        config.serial.queue_capacity = val;
    }

    // Board overrides
    if let Some(val) = env_value("BOARD_CHUNK_SIZE")? {
        config.board.chunk_size = val;
    }
    if let Some(val) = env_value("BOARD_BOOT_TIMEOUT_MS")? {
        config.board.boot_timeout_ms = val;
    }
    if let Some(val) = env_value("BOARD_RESET_PULSE_MS")? {
        config.board.reset_pulse_ms = val;
    }
    if let Some(val) = env_value("BOARD_SETTLE_MS")? {
        config.board.settle_ms = val;
    }
    if let Some(val) = env_value::<String>("BOARD_ASSETS_DIR")? {
        config.board.assets_dir = PathBuf::from(val);
    }

    // Firmware overrides
    if let Some(val) = env_value("FIRMWARE_BASE_URL")? {
        config.firmware.base_url = val;
    }
    if let Some(val) = env_value("FIRMWARE_BOARD")? {
        config.firmware.board = val;
    }
    if let Some(val) = env_value::<String>("FIRMWARE_WORK_DIR")? {
        config.firmware.work_dir = Some(PathBuf::from(val));
    }
    if let Some(val) = env_value("FIRMWARE_FLASHER_PROGRAM")? {
        config.firmware.flasher_program = val;
    }
    if let Some(val) = env_value("FIRMWARE_HTTP_PROXY")? {
        config.firmware.http_proxy = Some(val);
    }

    // Logging overrides
    if let Some(val) = env_value("LOGGING_LEVEL")? {
        config.logging.level = val;
    }
    if let Some(val) = env_value::<String>("LOGGING_FORMAT")? {
        config.logging.format = match val.to_lowercase().as_str() {
            "json" => LogFormat::Json,
            "pretty" => LogFormat::Pretty,
            "compact" => LogFormat::Compact,
            _ => {
                return Err(ConfigError::env_parse(
                    format!("{}_LOGGING_FORMAT", ENV_PREFIX),
                    "Expected json, pretty or compact",
                ))
            }
        };
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;
    use std::env;

    #[test]
    #[serial]
    fn test_default_loader() {
        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().serial.baud_rate, 115200);
        assert!(loader.config_path.is_none());
    }

    #[test]
    #[serial]
    fn test_env_override() {
        env::set_var("BOARD_AGENT_BOARD_CHUNK_SIZE", "64");
        env::set_var("BOARD_AGENT_LOGGING_FORMAT", "JSON");

        let loader = ConfigLoader::with_defaults();
        assert_eq!(loader.config().board.chunk_size, 64);
        assert_eq!(loader.config().logging.format, LogFormat::Json);

        // Clean up
        env::remove_var("BOARD_AGENT_BOARD_CHUNK_SIZE");
        env::remove_var("BOARD_AGENT_LOGGING_FORMAT");
    }

    #[test]
    #[serial]
    fn test_invalid_env_value() {
        env::set_var("BOARD_AGENT_SERIAL_BAUD_RATE", "fast");

        let mut config = Config::default();
        let err = apply_env_overrides(&mut config).unwrap_err();
        assert!(matches!(err, ConfigError::EnvParseError { .. }));

        env::remove_var("BOARD_AGENT_SERIAL_BAUD_RATE");
    }

    #[test]
    #[serial]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(
            &path,
            "[board]\nchunk_size = 100\n\n[serial.port_aliases]\nesp = \"/dev/ttyUSB0\"\n",
        )
        .unwrap();

        let loaded = ConfigLoader::load_from(&path).unwrap();
        assert_eq!(loaded.config().board.chunk_size, 100);
        assert_eq!(loaded.config().serial.resolve_port("esp"), "/dev/ttyUSB0");
        assert_eq!(loaded.config_path.as_deref(), Some(path.as_path()));
    }

    #[test]
    #[serial]
    fn test_out_of_range_file_value_is_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(CONFIG_FILE_NAME);
        std::fs::write(&path, "[board]\nchunk_size = 1024\n").unwrap();

        let err = ConfigLoader::load_from(&path).unwrap_err();
        assert!(matches!(err, ConfigError::ValidationError { .. }));
    }

    #[test]
    #[serial]
    fn test_missing_file() {
        let err = ConfigLoader::load_from("/nonexistent/board-agent.toml").unwrap_err();
        assert!(matches!(err, ConfigError::NotFound(_)));
    }
}
