//! Error handling for the minipc-led service
//!
//! This module defines the error type shared by the device, session, store
//! and IPC layers, and a Result alias for use throughout the crate.
//!
//! Errors never cross the IPC boundary as Rust values: the controller and
//! server convert them into [`crate::controller::CommandResult`] /
//! [`crate::ipc::IpcResponse`] data with a plain message and a separate
//! technical detail string.

use thiserror::Error;

/// Main error type for minipc-led operations
#[derive(Error, Debug)]
pub enum LedError {
    /// Serial I/O failure while talking to the device
    #[error("Transport error: {0}")]
    Transport(String),

    /// Errors reported by the serial port layer
    #[error("Serial port error: {0}")]
    Serial(#[from] tokio_serial::Error),

    /// The named device lock is held by another process
    #[error("Device lock '{lock}' is held by another process")]
    LockContention { lock: String },

    /// The OS refused to open the port because another handle holds it
    #[error("Access denied to port {port}: {message}")]
    AccessDenied { port: String, message: String },

    /// The port opened but the device did not respond to liveness commands
    #[error("Device verification failed: {0}")]
    Verification(String),

    /// An operation needed an open session but none exists
    #[error("Not connected to LED device")]
    NotConnected,

    /// State file could not be read or written
    #[error("Persistence error: {0}")]
    Persistence(String),

    /// Malformed or incompatible IPC payload
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Errors related to configuration loading/saving
    #[error("Configuration error: {0}")]
    Config(String),

    /// Timeout errors
    #[error("Timeout: {0}")]
    Timeout(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic errors with context
    #[error("{context}: {source}")]
    WithContext {
        context: String,
        #[source]
        source: Box<LedError>,
    },
}

impl LedError {
    /// Add context to an error
    pub fn with_context(self, context: impl Into<String>) -> Self {
        LedError::WithContext {
            context: context.into(),
            source: Box::new(self),
        }
    }

    /// Strip any context wrappers and return the underlying error
    pub fn root(&self) -> &LedError {
        match self {
            LedError::WithContext { source, .. } => source.root(),
            other => other,
        }
    }

    /// Whether this error means another process holds the device
    ///
    /// Covers both the cooperative named lock and an OS-level exclusive
    /// handle on the port.
    pub fn is_contention(&self) -> bool {
        matches!(
            self.root(),
            LedError::LockContention { .. } | LedError::AccessDenied { .. }
        )
    }

    /// Whether this error came from the transport (recoverable by reconnect)
    pub fn is_transport(&self) -> bool {
        matches!(
            self.root(),
            LedError::Transport(_) | LedError::Serial(_) | LedError::Io(_) | LedError::Timeout(_)
        )
    }
}

/// Result type alias for minipc-led operations
pub type Result<T> = std::result::Result<T, LedError>;

/// Extension trait for adding context to Results
pub trait ResultExt<T> {
    /// Add context to an error result
    fn context(self, context: impl Into<String>) -> Result<T>;
}

impl<T> ResultExt<T> for Result<T> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.with_context(context))
    }
}
