//! Command Executor / Controller
//!
//! Turns user intents (connect, set a zone, turn everything off, ...) into
//! device sequences plus state updates, and reports the outcome as a
//! [`CommandResult`]. Errors never escape as Rust errors: every operation
//! returns a result value with a user-facing message and, on failure, a
//! technical detail string.
//!
//! The store is only updated after the device accepted the whole sequence,
//! so a hardware failure leaves the persisted state untouched. A transport
//! failure also drops the session; the next device request reconnects.

use crossbeam_channel::{Receiver, Sender};
use serde::Serialize;
use serde_json::json;
use tokio::sync::watch;

use crate::config::ConnectionConfig;
use crate::device::{DeviceProtocol, ZoneApply};
use crate::error::LedError;
use crate::session::{ConnectError, ConnectFailure, SessionInfo, SessionManager};
use crate::store::{StateEvent, StateStore};
use crate::types::{Brightness, Color, ConnectionStatus, GlobalState, Pattern, Zone};

/// Message for connect failures caused by another process
pub const CONTENTION_MESSAGE: &str = "Another application is using the LED device";

/// Message for device operations without a session
pub const NOT_CONNECTED_MESSAGE: &str = "Not connected to LED device";

/// Default color used by `turn_on`
const TURN_ON_COLOR: Color = Color::WHITE;

// ==================== Results & Events ====================

/// Outcome of a controller operation
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommandResult {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_details: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
}

impl CommandResult {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            error_details: None,
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            error_details: Some(details.into()),
            data: None,
        }
    }

    pub fn with_data(mut self, data: serde_json::Value) -> Self {
        self.data = Some(data);
        self
    }
}

/// Connection and state snapshot
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusReport {
    pub connected: bool,
    pub connection_status: ConnectionStatus,
    pub session: SessionInfo,
    pub state: GlobalState,
}

/// Notification for observers (the IPC server, UIs)
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum ControllerEvent {
    ConnectionChanged {
        connected: bool,
        port: Option<String>,
    },
    StatusChanged { message: String },
    StateChanged { state: GlobalState },
}

// ==================== Controller ====================

/// Sequences device commands and keeps the store in step with the hardware
pub struct LedController {
    session: SessionManager,
    store: StateStore,
    store_events: Receiver<StateEvent>,
    connection: ConnectionConfig,
    default_port: String,
    status: ConnectionStatus,
    subscribers: Vec<Sender<ControllerEvent>>,
    snapshot: watch::Sender<StatusReport>,
}

impl LedController {
    pub fn new(
        session: SessionManager,
        mut store: StateStore,
        connection: ConnectionConfig,
        default_port: impl Into<String>,
    ) -> Self {
        let store_events = store.subscribe();
        let initial = StatusReport {
            connected: session.is_connected(),
            connection_status: ConnectionStatus::Disconnected,
            session: session.info(),
            state: store.snapshot(),
        };
        Self {
            session,
            store,
            store_events,
            connection,
            default_port: default_port.into(),
            status: ConnectionStatus::Disconnected,
            subscribers: Vec::new(),
            snapshot: watch::channel(initial).0,
        }
    }

    /// Port used when a request does not name one
    pub fn default_port(&self) -> &str {
        &self.default_port
    }

    pub fn is_connected(&self) -> bool {
        self.session.is_connected()
    }

    pub fn connection_status(&self) -> ConnectionStatus {
        self.status
    }

    /// Receive controller events
    pub fn subscribe(&mut self) -> Receiver<ControllerEvent> {
        let (tx, rx) = crossbeam_channel::unbounded();
        self.subscribers.push(tx);
        rx
    }

    /// Current state as believed by the store
    pub fn state(&self) -> GlobalState {
        self.store.snapshot()
    }

    pub fn status(&self) -> StatusReport {
        StatusReport {
            connected: self.session.is_connected(),
            connection_status: self.status,
            session: self.session.info(),
            state: self.store.snapshot(),
        }
    }

    /// Status as of the last published change
    ///
    /// Readers never wait for a running device sequence; during one they
    /// see the state from before it.
    pub fn status_watch(&self) -> watch::Receiver<StatusReport> {
        self.snapshot.subscribe()
    }

    // ==================== Connection ====================

    /// Open a session and restore the persisted state
    ///
    /// `None` uses the default port.
    pub async fn connect(&mut self, port: Option<&str>) -> CommandResult {
        let port = port.unwrap_or(self.default_port.as_str()).to_string();

        if self.session.is_connected() && self.session.port() == Some(port.as_str()) {
            return CommandResult::ok(format!("Already connected to {}", port));
        }

        self.set_status(ConnectionStatus::Connecting, format!("Connecting to {}...", port));

        let attempts = self.connection.connect_attempts.max(1);
        let mut last_error: Option<ConnectError> = None;

        for attempt in 1..=attempts {
            let result = self
                .session
                .connect(
                    &port,
                    self.connection.session_retries,
                    self.connection.session_retry_delay(),
                )
                .await;

            match result {
                Ok(()) => {
                    last_error = None;
                    break;
                }
                Err(e) => {
                    tracing::warn!("Connect attempt {}/{} failed: {}", attempt, attempts, e);
                    let contended = e.failure == ConnectFailure::LockContention;
                    last_error = Some(e);
                    if contended {
                        break;
                    }
                }
            }

            if attempt < attempts {
                tokio::time::sleep(self.connection.connect_backoff()).await;
            }
        }

        if let Some(err) = last_error {
            let message = if err.failure.is_contention() {
                CONTENTION_MESSAGE.to_string()
            } else {
                format!("Failed to connect to {}", port)
            };
            self.set_status(ConnectionStatus::Error, message.clone());
            return CommandResult::failure(message, err.to_string())
                .with_data(json!({ "failure": err.failure }));
        }

        self.set_status(ConnectionStatus::Connected, format!("Connected to {}", port));
        self.emit(ControllerEvent::ConnectionChanged {
            connected: true,
            port: Some(port.clone()),
        });

        self.store.load();
        let restored = self.restore().await;
        self.forward_store_events();
        self.publish_status();

        match restored {
            Ok(count) => CommandResult::ok(format!("Connected to {}", port))
                .with_data(json!({ "port": port, "restoredZones": count })),
            Err(e) => {
                let result = CommandResult {
                    success: true,
                    message: format!("Connected to {}, but restoring the LED state failed", port),
                    error_details: Some(e.to_string()),
                    data: Some(json!({ "port": port })),
                };
                self.handle_device_error(&e).await;
                result
            }
        }
    }

    /// Replay every lit zone from the store; returns the number replayed
    async fn restore(&mut self) -> Result<usize, LedError> {
        let state = self.store.snapshot();
        if !state.leds_enabled {
            tracing::debug!("LEDs disabled in saved state, nothing to restore");
            return Ok(0);
        }

        let protocol = self.session.protocol_mut()?;
        protocol.set_power(true).await?;

        let mut count = 0;
        for zone in Zone::ALL {
            let record = state.zone(zone);
            if !record.needs_restore() {
                continue;
            }
            let apply = ZoneApply::solid(zone, record.color, record.brightness)
                .with_pattern(record.pattern);
            protocol.apply_zone(&apply).await?;
            count += 1;
        }
        tracing::info!("Restored {} zone(s)", count);
        Ok(count)
    }

    /// Close the session
    pub async fn disconnect(&mut self) -> CommandResult {
        if self.session.state() == crate::session::SessionState::Disconnected {
            return CommandResult::ok("Already disconnected");
        }
        self.session.disconnect().await;
        self.set_status(ConnectionStatus::Disconnected, "Disconnected");
        self.emit(ControllerEvent::ConnectionChanged {
            connected: false,
            port: None,
        });
        CommandResult::ok("Disconnected")
    }

    // ==================== LED Operations ====================

    /// Solid color on one zone
    pub async fn set_zone_color(
        &mut self,
        zone: Zone,
        color: Color,
        brightness: Brightness,
    ) -> CommandResult {
        self.set_zone(ZoneApply::solid(zone, color, brightness)).await
    }

    /// Full configuration of one zone
    pub async fn set_zone(&mut self, apply: ZoneApply) -> CommandResult {
        let leds_enabled = self.store.snapshot().leds_enabled;

        let outcome = match self.session.protocol_mut() {
            Ok(protocol) => Self::apply_zone_powered(protocol, &apply, !leds_enabled).await,
            Err(e) => Err(e),
        };

        if let Err(e) = outcome {
            return self.device_failure(&format!("set {}", apply.zone), e).await;
        }

        let brightness = apply.brightness.quantized();
        let enabled = apply.pattern != Pattern::Off;
        let mut persisted = self
            .store
            .set_zone(apply.zone, apply.primary, brightness, apply.pattern, enabled);
        if persisted.is_ok() {
            persisted = self.store.set_global_enabled(true);
        }

        let result = CommandResult::ok(format!(
            "{} set to {} {} at {}",
            apply.zone.display_name(),
            apply.pattern.display_name(),
            apply.primary,
            brightness
        ))
        .with_data(json!({
            "zone": apply.zone,
            "pattern": apply.pattern,
            "color": apply.primary.to_hex(),
            "brightness": brightness.percent(),
        }));
        self.finish(result, persisted)
    }

    /// Switch the master power on first when the LEDs were off
    async fn apply_zone_powered(
        protocol: &mut DeviceProtocol,
        apply: &ZoneApply,
        power_on: bool,
    ) -> crate::error::Result<()> {
        if power_on {
            protocol.set_power(true).await?;
        }
        protocol.apply_zone(apply).await
    }

    /// Same solid color on every zone
    pub async fn set_all_zones(&mut self, color: Color, brightness: Brightness) -> CommandResult {
        let outcome = match self.session.protocol_mut() {
            Ok(protocol) => protocol.apply_all(Pattern::Solid, color, brightness).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            return self.device_failure("set all zones", e).await;
        }

        let brightness = brightness.quantized();
        let mut persisted = self
            .store
            .set_all_zones(color, brightness, Pattern::Solid, true);
        if persisted.is_ok() {
            persisted = self.store.set_global_enabled(true);
        }

        let result = CommandResult::ok(format!("All zones set to {} at {}", color, brightness))
            .with_data(json!({
                "color": color.to_hex(),
                "brightness": brightness.percent(),
            }));
        self.finish(result, persisted)
    }

    /// Extended shutdown sequence; every zone dark and LEDs disabled
    pub async fn turn_off(&mut self) -> CommandResult {
        let outcome = match self.session.protocol_mut() {
            Ok(protocol) => protocol.blackout().await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            return self.device_failure("turn off the LEDs", e).await;
        }

        let persisted = self.store.set_all_off();
        self.finish(CommandResult::ok("LEDs turned off"), persisted)
    }

    /// Power on with full white on every zone
    pub async fn turn_on(&mut self) -> CommandResult {
        let outcome = match self.session.protocol_mut() {
            Ok(protocol) => protocol.power_on_default(TURN_ON_COLOR, Brightness::FULL).await,
            Err(e) => Err(e),
        };
        if let Err(e) = outcome {
            return self.device_failure("turn on the LEDs", e).await;
        }

        let mut persisted =
            self.store
                .set_all_zones(TURN_ON_COLOR, Brightness::FULL, Pattern::Solid, true);
        if persisted.is_ok() {
            persisted = self.store.set_global_enabled(true);
        }
        self.finish(CommandResult::ok("LEDs turned on"), persisted)
    }

    // ==================== Helpers ====================

    /// Fail the result if the store write failed, then publish events
    ///
    /// The device change stands either way; only a saved change is
    /// reported as a success.
    fn finish(
        &mut self,
        mut result: CommandResult,
        persisted: crate::error::Result<bool>,
    ) -> CommandResult {
        if let Err(e) = persisted {
            tracing::warn!("LED state not saved: {}", e);
            result.success = false;
            result.message = format!("{}, but the LED state could not be saved", result.message);
            result.error_details = Some(e.to_string());
        }
        self.forward_store_events();
        self.publish_status();
        result
    }

    /// Turn a device error into a failure result
    async fn device_failure(&mut self, action: &str, err: LedError) -> CommandResult {
        if matches!(err.root(), LedError::NotConnected) {
            return CommandResult::failure(NOT_CONNECTED_MESSAGE, err.to_string());
        }
        tracing::error!("Failed to {}: {}", action, err);
        self.handle_device_error(&err).await;
        CommandResult::failure(format!("Failed to {}", action), err.to_string())
    }

    /// Drop the session after a transport failure
    async fn handle_device_error(&mut self, err: &LedError) {
        if !err.is_transport() {
            return;
        }
        self.session.abandon().await;
        self.set_status(ConnectionStatus::Error, "Connection to the LED device lost");
        self.emit(ControllerEvent::ConnectionChanged {
            connected: false,
            port: None,
        });
    }

    fn set_status(&mut self, status: ConnectionStatus, message: impl Into<String>) {
        self.status = status;
        let message = message.into();
        tracing::info!("{}", message);
        self.emit(ControllerEvent::StatusChanged { message });
    }

    /// Republish global store changes as `StateChanged`
    fn forward_store_events(&mut self) {
        let states: Vec<GlobalState> = self
            .store_events
            .try_iter()
            .filter_map(|event| match event {
                StateEvent::GlobalChanged(state) => Some(state),
                StateEvent::ZoneChanged(_) => None,
            })
            .collect();
        for state in states {
            self.emit(ControllerEvent::StateChanged { state });
        }
    }

    fn emit(&mut self, event: ControllerEvent) {
        self.subscribers.retain(|tx| tx.send(event.clone()).is_ok());
        self.publish_status();
    }

    fn publish_status(&self) {
        self.snapshot.send_replace(self.status());
    }
}
