//! Configuration module for minipc-led
//!
//! This module handles service configuration and the locations of the
//! files the service owns:
//! - Service settings (serial port, timings, retry policy, IPC endpoint)
//! - The persisted LED state file
//! - The IPC socket and the device lock file
//!
//! # App Data Location
//!
//! Application data is stored per user in the platform-appropriate location:
//! - **Linux**: `~/.local/share/dev.minipc.led/`
//! - **macOS**: `~/Library/Application Support/dev.minipc.led/`
//! - **Windows**: `%APPDATA%\dev.minipc.led\`
//!
//! Setting `MINIPC_LED_DATA_DIR` relocates the directory (portable installs
//! and tests).
//!
//! # Files
//!
//! - `service.json` - Service settings, every field optional
//! - `led_state.json` - Last applied LED configuration
//! - `logs/` - Daily rolling service logs
//!
//! # Example
//!
//! ```ignore
//! use minipc_led::config::ServiceConfig;
//!
//! let config = ServiceConfig::load_or_default();
//! println!("Using port {}", config.device.port);
//! ```

use crate::error::{LedError, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Application identifier for data directories
pub const APP_ID: &str = "dev.minipc.led";

/// Environment variable overriding the app data directory
pub const DATA_DIR_ENV: &str = "MINIPC_LED_DATA_DIR";

/// Service settings filename
pub const CONFIG_FILE: &str = "service.json";

/// Persisted LED state filename
pub const STATE_FILE: &str = "led_state.json";

/// IPC socket filename
pub const SOCKET_FILE: &str = "minipc-led.sock";

/// Name of the cross-process device lock
pub const DEFAULT_LOCK_NAME: &str = "minipc-led-device";

/// Default serial baud rate of the LED controller
pub const DEFAULT_BAUD_RATE: u32 = 115_200;

/// Default minimum delay between two device commands in milliseconds
pub const DEFAULT_SETTLE_DELAY_MS: u64 = 200;

/// Default wait after opening the port before the device accepts commands
pub const DEFAULT_HARDWARE_SETTLE_MS: u64 = 3_000;

/// Default bound on a single serial write in milliseconds
pub const DEFAULT_WRITE_TIMEOUT_MS: u64 = 2_000;

/// Default timeout for acquiring the device lock in milliseconds
///
/// Contention is not retried, so this bounds how long a connect waits
/// for another owner and must stay well below the client timeout.
pub const DEFAULT_LOCK_TIMEOUT_MS: u64 = 15_000;

/// Default overall timeout of an IPC request in milliseconds
pub const DEFAULT_CLIENT_TIMEOUT_MS: u64 = 30_000;

#[cfg(windows)]
const DEFAULT_PORT: &str = "COM3";
#[cfg(not(windows))]
const DEFAULT_PORT: &str = "/dev/ttyACM0";

// ==================== App Data Directory ====================

/// Get the application data directory path
pub fn app_data_dir() -> Option<PathBuf> {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return Some(PathBuf::from(dir));
    }
    dirs_next::data_dir().map(|p| p.join(APP_ID))
}

/// Ensure the app data directory exists
pub fn ensure_app_data_dir() -> Result<PathBuf> {
    let dir = app_data_dir().ok_or_else(|| {
        LedError::Config("Could not determine app data directory".to_string())
    })?;

    if !dir.exists() {
        std::fs::create_dir_all(&dir).map_err(|e| {
            LedError::Config(format!("Failed to create app data directory: {}", e))
        })?;
    }

    Ok(dir)
}

/// Get the path to the persisted LED state file
pub fn state_file_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(STATE_FILE))
}

/// Get the path to the service settings file
pub fn config_file_path() -> Option<PathBuf> {
    app_data_dir().map(|p| p.join(CONFIG_FILE))
}

/// Directory for runtime files (socket, lock)
///
/// Prefers the per-user runtime directory, falling back to the app data
/// directory and finally the system temp directory. An explicit
/// `MINIPC_LED_DATA_DIR` always wins so isolated instances never share a
/// socket.
pub fn runtime_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(DATA_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs_next::runtime_dir()
        .or_else(app_data_dir)
        .unwrap_or_else(std::env::temp_dir)
}

/// Default location of the IPC socket
pub fn default_socket_path() -> PathBuf {
    runtime_dir().join(SOCKET_FILE)
}

// ==================== Service Config ====================

/// Complete service configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ServiceConfig {
    /// Serial device settings
    #[serde(default)]
    pub device: DeviceConfig,

    /// Command pacing
    #[serde(default)]
    pub timing: TimingConfig,

    /// Connection retry policy
    #[serde(default)]
    pub connection: ConnectionConfig,

    /// IPC endpoint settings
    #[serde(default)]
    pub ipc: IpcConfig,

    /// Override for the state file location
    #[serde(default)]
    pub state_path: Option<PathBuf>,
}

impl ServiceConfig {
    /// Load settings from the default location
    ///
    /// A missing file yields defaults.
    pub fn load() -> Result<Self> {
        let path = config_file_path().ok_or_else(|| {
            LedError::Config("Could not determine config file path".to_string())
        })?;

        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(&path)
            .map_err(|e| LedError::Config(format!("Failed to read {:?}: {}", path, e)))?;

        serde_json::from_str(&content)
            .map_err(|e| LedError::Config(format!("Failed to parse {:?}: {}", path, e)))
    }

    /// Load settings, returning defaults on any error
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_else(|e| {
            tracing::warn!("Failed to load service config, using defaults: {}", e);
            Self::default()
        })
    }

    /// Save settings to the default location
    pub fn save(&self) -> Result<()> {
        let dir = ensure_app_data_dir()?;
        let path = dir.join(CONFIG_FILE);

        let content = serde_json::to_string_pretty(self)
            .map_err(|e| LedError::Config(format!("Failed to serialize config: {}", e)))?;

        std::fs::write(&path, content)
            .map_err(|e| LedError::Config(format!("Failed to write config: {}", e)))
    }

    /// Resolved state file path
    pub fn resolved_state_path(&self) -> Result<PathBuf> {
        if let Some(ref path) = self.state_path {
            return Ok(path.clone());
        }
        Ok(ensure_app_data_dir()?.join(STATE_FILE))
    }

    /// Resolved IPC socket path
    pub fn resolved_socket_path(&self) -> PathBuf {
        self.ipc
            .socket_path
            .clone()
            .unwrap_or_else(default_socket_path)
    }

    /// Resolved directory for the device lock file
    pub fn resolved_lock_dir(&self) -> PathBuf {
        self.device
            .lock_dir
            .clone()
            .unwrap_or_else(std::env::temp_dir)
    }
}

// ==================== Device Config ====================

/// Serial device settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeviceConfig {
    /// Serial port name (e.g. `/dev/ttyACM0` or `COM3`)
    #[serde(default = "default_port")]
    pub port: String,

    /// Baud rate
    #[serde(default = "default_baud_rate")]
    pub baud_rate: u32,

    /// Name of the cross-process device lock
    #[serde(default = "default_lock_name")]
    pub lock_name: String,

    /// Directory holding the lock file (system temp dir when unset)
    #[serde(default)]
    pub lock_dir: Option<PathBuf>,
}

fn default_port() -> String {
    DEFAULT_PORT.to_string()
}

fn default_baud_rate() -> u32 {
    DEFAULT_BAUD_RATE
}

fn default_lock_name() -> String {
    DEFAULT_LOCK_NAME.to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            port: default_port(),
            baud_rate: DEFAULT_BAUD_RATE,
            lock_name: default_lock_name(),
            lock_dir: None,
        }
    }
}

// ==================== Timing Config ====================

/// Command pacing required by the firmware
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimingConfig {
    /// Minimum delay between two commands (empirically 150-300ms)
    #[serde(default = "default_settle_delay_ms")]
    pub settle_delay_ms: u64,

    /// Wait after opening the port before the first command
    #[serde(default = "default_hardware_settle_ms")]
    pub hardware_settle_ms: u64,

    /// Bound on a single serial write
    #[serde(default = "default_write_timeout_ms")]
    pub write_timeout_ms: u64,

    /// How many times the anti-rainbow initialization runs after connecting
    #[serde(default = "default_init_passes")]
    pub init_passes: u32,
}

fn default_settle_delay_ms() -> u64 {
    DEFAULT_SETTLE_DELAY_MS
}

fn default_hardware_settle_ms() -> u64 {
    DEFAULT_HARDWARE_SETTLE_MS
}

fn default_write_timeout_ms() -> u64 {
    DEFAULT_WRITE_TIMEOUT_MS
}

fn default_init_passes() -> u32 {
    2
}

impl Default for TimingConfig {
    fn default() -> Self {
        Self {
            settle_delay_ms: DEFAULT_SETTLE_DELAY_MS,
            hardware_settle_ms: DEFAULT_HARDWARE_SETTLE_MS,
            write_timeout_ms: DEFAULT_WRITE_TIMEOUT_MS,
            init_passes: default_init_passes(),
        }
    }
}

impl TimingConfig {
    /// No delays at all; for the mock device and tests
    pub fn immediate() -> Self {
        Self {
            settle_delay_ms: 0,
            hardware_settle_ms: 0,
            write_timeout_ms: 1_000,
            init_passes: 1,
        }
    }

    pub fn settle_delay(&self) -> Duration {
        Duration::from_millis(self.settle_delay_ms)
    }

    pub fn hardware_settle(&self) -> Duration {
        Duration::from_millis(self.hardware_settle_ms)
    }

    pub fn write_timeout(&self) -> Duration {
        Duration::from_millis(self.write_timeout_ms)
    }
}

// ==================== Connection Config ====================

/// Retry policy for establishing the session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionConfig {
    /// Controller-level connect attempts
    #[serde(default = "default_connect_attempts")]
    pub connect_attempts: u32,

    /// Backoff between controller-level attempts
    #[serde(default = "default_connect_backoff_ms")]
    pub connect_backoff_ms: u64,

    /// Session-level retries inside one connect attempt
    #[serde(default = "default_session_retries")]
    pub session_retries: u32,

    /// Delay between session-level retries
    #[serde(default = "default_session_retry_delay_ms")]
    pub session_retry_delay_ms: u64,

    /// Timeout for acquiring the device lock
    #[serde(default = "default_lock_timeout_ms")]
    pub lock_timeout_ms: u64,
}

fn default_connect_attempts() -> u32 {
    3
}

fn default_connect_backoff_ms() -> u64 {
    2_000
}

fn default_session_retries() -> u32 {
    3
}

fn default_session_retry_delay_ms() -> u64 {
    1_000
}

fn default_lock_timeout_ms() -> u64 {
    DEFAULT_LOCK_TIMEOUT_MS
}

impl Default for ConnectionConfig {
    fn default() -> Self {
        Self {
            connect_attempts: default_connect_attempts(),
            connect_backoff_ms: default_connect_backoff_ms(),
            session_retries: default_session_retries(),
            session_retry_delay_ms: default_session_retry_delay_ms(),
            lock_timeout_ms: DEFAULT_LOCK_TIMEOUT_MS,
        }
    }
}

impl ConnectionConfig {
    /// Single attempt, no waiting; for tests
    pub fn single_attempt() -> Self {
        Self {
            connect_attempts: 1,
            connect_backoff_ms: 0,
            session_retries: 1,
            session_retry_delay_ms: 0,
            lock_timeout_ms: 200,
        }
    }

    pub fn connect_backoff(&self) -> Duration {
        Duration::from_millis(self.connect_backoff_ms)
    }

    pub fn session_retry_delay(&self) -> Duration {
        Duration::from_millis(self.session_retry_delay_ms)
    }

    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

// ==================== IPC Config ====================

/// IPC endpoint settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IpcConfig {
    /// Socket path (runtime dir when unset)
    #[serde(default)]
    pub socket_path: Option<PathBuf>,

    /// Overall client request timeout
    #[serde(default = "default_client_timeout_ms")]
    pub client_timeout_ms: u64,

    /// How long the server waits for a request frame after accepting
    #[serde(default = "default_request_read_timeout_ms")]
    pub request_read_timeout_ms: u64,
}

fn default_client_timeout_ms() -> u64 {
    DEFAULT_CLIENT_TIMEOUT_MS
}

fn default_request_read_timeout_ms() -> u64 {
    5_000
}

impl Default for IpcConfig {
    fn default() -> Self {
        Self {
            socket_path: None,
            client_timeout_ms: DEFAULT_CLIENT_TIMEOUT_MS,
            request_read_timeout_ms: default_request_read_timeout_ms(),
        }
    }
}

impl IpcConfig {
    pub fn client_timeout(&self) -> Duration {
        Duration::from_millis(self.client_timeout_ms)
    }

    pub fn request_read_timeout(&self) -> Duration {
        Duration::from_millis(self.request_read_timeout_ms)
    }
}

// ==================== Tests ====================
