//! Mock LED Controller for Testing
//!
//! This module provides an in-memory model of the LED controller that can be
//! used to run the service and its tests without real hardware.
//!
//! # Features
//!
//! - **Command log**: every command written is recorded in its text form
//! - **Firmware model**: per-zone pattern, color, brightness and the sticky
//!   rainbow flag
//! - **Fault injection**: failing writes, access-denied and missing-port opens
//! - **Exclusive handles**: a second open while a handle is live is denied,
//!   like an OS-level exclusive lock
//!
//! # Rainbow Model
//!
//! The model reproduces the firmware quirk the protocol works around:
//! `RBW z 0` only clears the rainbow flag when a static pattern is already
//! selected on the zone. Sending it while an animated pattern is active
//! leaves rainbow mode on. Reset and power cycles do not clear the flag.
//!
//! # Example
//!
//! ```ignore
//! use minipc_led::device::mock::MockDevice;
//!
//! let device = MockDevice::new();
//! let opener = device.opener();
//! // hand `opener` to a SessionManager, then inspect:
//! assert!(device.commands().contains(&"RST".to_string()));
//! ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use super::command::DeviceCommand;
use super::transport::{DeviceTransport, PortOpener};
use crate::error::{LedError, Result};
use crate::types::{Color, Pattern, Zone};

/// Firmware-side state of one zone
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockZone {
    /// Selected pattern
    pub pattern: Pattern,
    /// Sticky rainbow flag
    pub rainbow: bool,
    /// Primary color
    pub color: Color,
    /// Auxiliary colors by slot
    pub aux_colors: HashMap<u8, Color>,
    /// Brightness level 0..=5
    pub brightness_level: u8,
}

impl Default for MockZone {
    fn default() -> Self {
        Self {
            pattern: Pattern::Off,
            rainbow: false,
            color: Color::BLACK,
            aux_colors: HashMap::new(),
            brightness_level: 0,
        }
    }
}

/// Injected failure for the next opens
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum OpenFault {
    AccessDenied,
    Missing,
}

#[derive(Debug, Default)]
struct MockDeviceState {
    log: Vec<String>,
    powered: bool,
    resets: u32,
    zones: HashMap<Zone, MockZone>,
    /// Writes still allowed before every write fails
    writes_remaining: Option<usize>,
    open_faults: Vec<OpenFault>,
    open_handles: usize,
    opens: u32,
}

/// Shared handle to a simulated LED controller
#[derive(Debug, Clone, Default)]
pub struct MockDevice {
    state: Arc<Mutex<MockDeviceState>>,
}

impl MockDevice {
    /// Create a powered-off device with all zones dark
    pub fn new() -> Self {
        Self::default()
    }

    /// A device that starts in the sticky rainbow mode on every zone
    pub fn stuck_in_rainbow() -> Self {
        let device = Self::new();
        {
            let mut state = device.lock();
            state.powered = true;
            for zone in Zone::ALL {
                state.zones.insert(
                    zone,
                    MockZone {
                        pattern: Pattern::Rainbow,
                        rainbow: true,
                        brightness_level: 5,
                        ..MockZone::default()
                    },
                );
            }
        }
        device
    }

    /// Port opener producing transports bound to this device
    pub fn opener(&self) -> MockPortOpener {
        MockPortOpener {
            device: self.clone(),
        }
    }

    /// Every command written, in order
    pub fn commands(&self) -> Vec<String> {
        self.lock().log.clone()
    }

    /// Forget the command log
    pub fn clear_commands(&self) {
        self.lock().log.clear();
    }

    /// Master power state
    pub fn powered(&self) -> bool {
        self.lock().powered
    }

    /// Number of reset tokens received
    pub fn resets(&self) -> u32 {
        self.lock().resets
    }

    /// Number of successful opens (probe-opens included)
    pub fn opens(&self) -> u32 {
        self.lock().opens
    }

    /// Handles currently open
    pub fn open_handles(&self) -> usize {
        self.lock().open_handles
    }

    /// Firmware state of a zone
    pub fn zone(&self, zone: Zone) -> MockZone {
        self.lock().zones.get(&zone).cloned().unwrap_or_default()
    }

    /// Whether the sticky rainbow flag is set on a zone
    pub fn rainbow_active(&self, zone: Zone) -> bool {
        self.zone(zone).rainbow
    }

    /// Allow `n` more writes, then fail every write
    pub fn fail_writes_after(&self, n: usize) {
        self.lock().writes_remaining = Some(n);
    }

    /// Fail every write (an unresponsive device)
    pub fn fail_all_writes(&self) {
        self.fail_writes_after(0);
    }

    /// Stop failing writes
    pub fn restore_writes(&self) {
        self.lock().writes_remaining = None;
    }

    /// Deny the next `n` opens as if another process held the port
    pub fn deny_next_opens(&self, n: usize) {
        let mut state = self.lock();
        state
            .open_faults
            .extend(std::iter::repeat(OpenFault::AccessDenied).take(n));
    }

    /// Fail the next `n` opens as if the port did not exist
    pub fn fail_next_opens(&self, n: usize) {
        let mut state = self.lock();
        state
            .open_faults
            .extend(std::iter::repeat(OpenFault::Missing).take(n));
    }

    fn lock(&self) -> MutexGuard<'_, MockDeviceState> {
        // A panicking test thread must not poison the model for the others
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn open(&self, port: &str) -> Result<()> {
        let mut state = self.lock();
        if !state.open_faults.is_empty() {
            return match state.open_faults.remove(0) {
                OpenFault::AccessDenied => Err(LedError::AccessDenied {
                    port: port.to_string(),
                    message: "port held by another handle".to_string(),
                }),
                OpenFault::Missing => Err(LedError::Transport(format!("{}: no such device", port))),
            };
        }
        if state.open_handles > 0 {
            return Err(LedError::AccessDenied {
                port: port.to_string(),
                message: "port already open".to_string(),
            });
        }
        state.open_handles += 1;
        state.opens += 1;
        Ok(())
    }

    fn release(&self) {
        let mut state = self.lock();
        state.open_handles = state.open_handles.saturating_sub(1);
    }

    fn apply(&self, command: &DeviceCommand) -> Result<()> {
        let mut state = self.lock();
        match state.writes_remaining {
            Some(0) => {
                return Err(LedError::Transport(format!(
                    "write of '{}' failed: device not responding",
                    command
                )))
            }
            Some(ref mut n) => *n -= 1,
            None => {}
        }
        state.log.push(command.encode());

        match *command {
            DeviceCommand::Reset => state.resets += 1,
            DeviceCommand::Power(on) => state.powered = on,
            DeviceCommand::Pattern(zone, pattern) => {
                let entry = state.zones.entry(zone).or_default();
                entry.pattern = pattern;
                if pattern.is_rainbow() {
                    entry.rainbow = true;
                }
            }
            DeviceCommand::Rainbow(zone, on) => {
                let entry = state.zones.entry(zone).or_default();
                if on {
                    entry.rainbow = true;
                } else if entry.pattern.is_static() {
                    entry.rainbow = false;
                }
            }
            DeviceCommand::Color(zone, color) => {
                state.zones.entry(zone).or_default().color = color;
            }
            DeviceCommand::AuxColor(zone, slot, color) => {
                state.zones.entry(zone).or_default().aux_colors.insert(slot, color);
            }
            DeviceCommand::Brightness(zone, level) => {
                state.zones.entry(zone).or_default().brightness_level = level;
            }
        }
        Ok(())
    }
}

/// Opens [`MockTransport`]s on a [`MockDevice`]
#[derive(Debug, Clone)]
pub struct MockPortOpener {
    device: MockDevice,
}

impl MockPortOpener {
    /// The device behind this opener
    pub fn device(&self) -> &MockDevice {
        &self.device
    }
}

#[async_trait]
impl PortOpener for MockPortOpener {
    async fn open(&self, port: &str) -> Result<Box<dyn DeviceTransport>> {
        self.device.open(port)?;
        tracing::debug!("Mock port {} opened", port);
        Ok(Box::new(MockTransport {
            device: self.device.clone(),
            port: port.to_string(),
            open: true,
        }))
    }
}

/// Transport writing into a [`MockDevice`]
#[derive(Debug)]
pub struct MockTransport {
    device: MockDevice,
    port: String,
    open: bool,
}

#[async_trait]
impl DeviceTransport for MockTransport {
    async fn send(&mut self, command: &DeviceCommand) -> Result<()> {
        if !self.open {
            return Err(LedError::Transport(format!("{} is closed", self.port)));
        }
        self.device.apply(command)
    }

    async fn close(&mut self) -> Result<()> {
        if self.open {
            self.open = false;
            self.device.release();
        }
        Ok(())
    }

    fn port_name(&self) -> &str {
        &self.port
    }
}

impl Drop for MockTransport {
    fn drop(&mut self) {
        if self.open {
            self.device.release();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_exclusive_open() {
        let device = MockDevice::new();
        let opener = device.opener();

        let mut first = opener.open("mock0").await.unwrap();
        let second = opener.open("mock0").await;
        assert!(matches!(second, Err(LedError::AccessDenied { .. })));

        first.close().await.unwrap();
        assert_eq!(device.open_handles(), 0);
        assert!(opener.open("mock0").await.is_ok());
    }

    #[tokio::test]
    async fn test_dropped_transport_releases_handle() {
        let device = MockDevice::new();
        {
            let _transport = device.opener().open("mock0").await.unwrap();
            assert_eq!(device.open_handles(), 1);
        }
        assert_eq!(device.open_handles(), 0);
    }

    #[tokio::test]
    async fn test_injected_open_faults() {
        let device = MockDevice::new();
        device.deny_next_opens(1);
        device.fail_next_opens(1);
        let opener = device.opener();

        assert!(matches!(
            opener.open("mock0").await,
            Err(LedError::AccessDenied { .. })
        ));
        assert!(matches!(
            opener.open("mock0").await,
            Err(LedError::Transport(_))
        ));
        assert!(opener.open("mock0").await.is_ok());
    }

    #[tokio::test]
    async fn test_rainbow_sticks_when_disabled_out_of_order() {
        let device = MockDevice::stuck_in_rainbow();
        let mut transport = device.opener().open("mock0").await.unwrap();

        // Disable first, then select static: rainbow survives
        transport
            .send(&DeviceCommand::Rainbow(Zone::Skull, false))
            .await
            .unwrap();
        transport
            .send(&DeviceCommand::Pattern(Zone::Skull, Pattern::Solid))
            .await
            .unwrap();
        assert!(device.rainbow_active(Zone::Skull));

        // Static first, then disable: rainbow clears
        transport
            .send(&DeviceCommand::Rainbow(Zone::Skull, false))
            .await
            .unwrap();
        assert!(!device.rainbow_active(Zone::Skull));
        assert!(device.rainbow_active(Zone::Eyes));
    }

    #[tokio::test]
    async fn test_write_failures() {
        let device = MockDevice::new();
        let mut transport = device.opener().open("mock0").await.unwrap();
        device.fail_all_writes();

        assert!(transport.send(&DeviceCommand::Reset).await.is_err());
        assert!(device.commands().is_empty());

        device.restore_writes();
        transport.send(&DeviceCommand::Reset).await.unwrap();
        assert_eq!(device.resets(), 1);
    }
}
