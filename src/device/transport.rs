//! Transport traits for the LED controller
//!
//! This module provides the seam between the command protocol and the
//! physical port, enabling both the real serial port (via tokio-serial) and
//! the in-memory mock device for testing.

use async_trait::async_trait;

use super::command::DeviceCommand;
use crate::error::Result;

/// An open, writable connection to the LED controller
///
/// The firmware never acknowledges commands, so a successful `send` only
/// means the bytes left the host. Implementations must be `Send` so the
/// session can move between tasks.
#[async_trait]
pub trait DeviceTransport: Send {
    /// Write one command
    async fn send(&mut self, command: &DeviceCommand) -> Result<()>;

    /// Flush and close the port; further sends fail
    async fn close(&mut self) -> Result<()>;

    /// Port this transport is attached to
    fn port_name(&self) -> &str;
}

/// Factory for transports
///
/// The session manager opens ports through this trait twice per attempt:
/// once for the probe-open and once for the long-lived connection.
#[async_trait]
pub trait PortOpener: Send + Sync {
    /// Open the named port
    ///
    /// Must return [`crate::LedError::AccessDenied`] when another handle
    /// holds the port exclusively.
    async fn open(&self, port: &str) -> Result<Box<dyn DeviceTransport>>;
}
