//! Session Connection Manager
//!
//! Owns exclusive access to the LED controller's port and walks the
//! connection state machine:
//!
//! ```text
//! Disconnected -> AcquiringLock -> LockHeld -> Verifying -> Connected
//!       ^                                                       |
//!       +------------------- disconnect / failure --------------+
//! ```
//!
//! Every failure releases what was acquired (port handle, named lock) and
//! goes back to `Disconnected`.
//!
//! # Connect Sequence
//!
//! 1. Acquire the named [`DeviceLock`] (generous timeout, 30 s by default)
//! 2. Probe-open the port and close it again; an access-denied probe means
//!    another process has the port, so the lock is released and the attempt
//!    retried
//! 3. Open the port for real and wait for the hardware to settle
//! 4. Verify liveness with a power off/on cycle
//! 5. Run the anti-rainbow initialization (`init_passes` times)
//!
//! The firmware never answers, so "verified" only means every write went
//! through without a transport error.

pub mod lock;

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

use crate::config::{ServiceConfig, TimingConfig};
use crate::device::{DeviceProtocol, PortOpener};
use crate::error::{LedError, Result, ResultExt};
use crate::types::{Brightness, Color, Pattern};

pub use lock::DeviceLock;

/// Position in the connection state machine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
pub enum SessionState {
    #[default]
    Disconnected,
    AcquiringLock,
    LockHeld,
    Verifying,
    Connected,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionState::Disconnected => write!(f, "Disconnected"),
            SessionState::AcquiringLock => write!(f, "Acquiring lock"),
            SessionState::LockHeld => write!(f, "Lock held"),
            SessionState::Verifying => write!(f, "Verifying"),
            SessionState::Connected => write!(f, "Connected"),
        }
    }
}

/// Why a connect ultimately failed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ConnectFailure {
    /// The named lock stayed held by another process
    LockContention,
    /// The OS refused the port because another handle has it
    AccessDenied,
    /// The port opened but liveness or initialization writes failed
    VerificationFailed,
    /// The port could not be opened at all (missing device, bad name)
    PortUnavailable,
}

impl ConnectFailure {
    /// Classify the error of one attempt
    pub fn classify(err: &LedError) -> Self {
        match err.root() {
            LedError::LockContention { .. } => ConnectFailure::LockContention,
            LedError::AccessDenied { .. } => ConnectFailure::AccessDenied,
            LedError::Verification(_) => ConnectFailure::VerificationFailed,
            _ => ConnectFailure::PortUnavailable,
        }
    }

    /// Whether another application holds the device
    pub fn is_contention(self) -> bool {
        matches!(
            self,
            ConnectFailure::LockContention | ConnectFailure::AccessDenied
        )
    }
}

impl std::fmt::Display for ConnectFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConnectFailure::LockContention => write!(f, "device lock held by another process"),
            ConnectFailure::AccessDenied => write!(f, "port in use by another process"),
            ConnectFailure::VerificationFailed => write!(f, "device did not accept commands"),
            ConnectFailure::PortUnavailable => write!(f, "port unavailable"),
        }
    }
}

/// Final error of [`SessionManager::connect`]
#[derive(Debug, Error)]
#[error("Connect to {port} failed after {attempts} attempt(s) ({failure}): {source}")]
pub struct ConnectError {
    pub port: String,
    pub failure: ConnectFailure,
    pub attempts: u32,
    #[source]
    pub source: LedError,
}

/// Snapshot of the session for status reports
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub is_open: bool,
    pub owns_lock: bool,
    pub port: Option<String>,
    pub state: SessionState,
}

/// Exclusive owner of the device connection
pub struct SessionManager {
    opener: Arc<dyn PortOpener>,
    lock: DeviceLock,
    timing: TimingConfig,
    lock_timeout: Duration,
    state: SessionState,
    protocol: Option<DeviceProtocol>,
    port: Option<String>,
}

impl SessionManager {
    pub fn new(
        opener: Arc<dyn PortOpener>,
        lock: DeviceLock,
        timing: TimingConfig,
        lock_timeout: Duration,
    ) -> Self {
        Self {
            opener,
            lock,
            timing,
            lock_timeout,
            state: SessionState::Disconnected,
            protocol: None,
            port: None,
        }
    }

    /// Build a session manager from service settings
    pub fn from_config(opener: Arc<dyn PortOpener>, config: &ServiceConfig) -> Self {
        let lock = DeviceLock::new(&config.resolved_lock_dir(), &config.device.lock_name);
        Self::new(
            opener,
            lock,
            config.timing.clone(),
            config.connection.lock_timeout(),
        )
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Connected && self.protocol.is_some()
    }

    /// Port of the open session
    pub fn port(&self) -> Option<&str> {
        self.port.as_deref()
    }

    pub fn info(&self) -> SessionInfo {
        SessionInfo {
            is_open: self.protocol.is_some(),
            owns_lock: self.lock.is_owned(),
            port: self.port.clone(),
            state: self.state,
        }
    }

    /// The command protocol of the open session
    pub fn protocol_mut(&mut self) -> Result<&mut DeviceProtocol> {
        if self.state != SessionState::Connected {
            return Err(LedError::NotConnected);
        }
        self.protocol.as_mut().ok_or(LedError::NotConnected)
    }

    /// Open a verified session on `port`
    ///
    /// Makes up to `max_retries` attempts (at least one) separated by
    /// `retry_delay`. Lock contention ends the retries early. Connecting to the port already open is a no-op; a
    /// different port closes the current session first.
    pub async fn connect(
        &mut self,
        port: &str,
        max_retries: u32,
        retry_delay: Duration,
    ) -> std::result::Result<(), ConnectError> {
        if self.is_connected() {
            if self.port.as_deref() == Some(port) {
                return Ok(());
            }
            self.disconnect().await;
        }

        let attempts = max_retries.max(1);
        let mut last_error = None;
        let mut made = 0;

        for attempt in 1..=attempts {
            made = attempt;
            tracing::info!("Connecting to {} (attempt {}/{})", port, attempt, attempts);

            match self.attempt(port).await {
                Ok(()) => {
                    tracing::info!("Session open on {}", port);
                    return Ok(());
                }
                Err(e) => {
                    tracing::warn!("Connect attempt {} on {} failed: {}", attempt, port, e);
                    self.cleanup().await;
                    let contended = matches!(e.root(), LedError::LockContention { .. });
                    last_error = Some(e);
                    // The lock wait already spent the retry budget
                    if contended {
                        break;
                    }
                }
            }

            if attempt < attempts && retry_delay > Duration::ZERO {
                tokio::time::sleep(retry_delay).await;
            }
        }

        let source = last_error.unwrap_or(LedError::NotConnected);
        Err(ConnectError {
            port: port.to_string(),
            failure: ConnectFailure::classify(&source),
            attempts: made,
            source,
        })
    }

    /// One pass through the state machine
    async fn attempt(&mut self, port: &str) -> Result<()> {
        self.state = SessionState::AcquiringLock;
        self.lock
            .acquire(self.lock_timeout)
            .await
            .context("Acquiring device lock")?;
        self.state = SessionState::LockHeld;

        // Probe-open: detects a foreign handle before committing
        let mut probe = self.opener.open(port).await?;
        probe.close().await?;
        drop(probe);

        let transport = self.opener.open(port).await?;
        let mut protocol = DeviceProtocol::new(transport, self.timing.clone());

        let settle = self.timing.hardware_settle();
        if settle > Duration::ZERO {
            tracing::debug!("Waiting {:?} for the hardware to settle", settle);
            tokio::time::sleep(settle).await;
        }

        self.state = SessionState::Verifying;
        if let Err(e) = Self::verify(&mut protocol, self.timing.init_passes).await {
            let _ = protocol.close().await;
            return Err(e);
        }

        self.protocol = Some(protocol);
        self.port = Some(port.to_string());
        self.state = SessionState::Connected;
        Ok(())
    }

    /// Liveness check followed by the anti-rainbow initialization
    async fn verify(protocol: &mut DeviceProtocol, init_passes: u32) -> Result<()> {
        protocol
            .power_cycle()
            .await
            .map_err(|e| LedError::Verification(format!("power cycle failed: {}", e)))?;

        for pass in 0..init_passes.max(1) {
            protocol
                .apply_all(Pattern::Solid, Color::BLACK, Brightness::from_percent(0))
                .await
                .map_err(|e| {
                    LedError::Verification(format!("initialization pass {} failed: {}", pass + 1, e))
                })?;
        }
        Ok(())
    }

    /// Close the session: best-effort power off, close the port, release the lock
    pub async fn disconnect(&mut self) {
        if let Some(protocol) = self.protocol.as_mut() {
            if let Err(e) = protocol.set_power(false).await {
                tracing::warn!("Power off during disconnect failed: {}", e);
            }
        }
        self.cleanup().await;
        tracing::info!("Session closed");
    }

    /// Drop a session whose transport failed, without talking to the device
    pub async fn abandon(&mut self) {
        tracing::warn!(
            "Abandoning session on {}",
            self.port.as_deref().unwrap_or("<none>")
        );
        self.cleanup().await;
    }

    /// Release everything acquired so far and return to `Disconnected`
    async fn cleanup(&mut self) {
        if let Some(mut protocol) = self.protocol.take() {
            if let Err(e) = protocol.close().await {
                tracing::warn!("Closing {} failed: {}", protocol.port_name(), e);
            }
        }
        self.lock.release();
        self.port = None;
        self.state = SessionState::Disconnected;
    }
}
