//! IPC Server
//!
//! Accepts connections on a Unix domain socket and runs each request
//! against the shared [`LedController`]. The controller sits behind one
//! async mutex, which is the single critical section for every
//! device-touching operation: requests from different clients never
//! interleave their command sequences. `GetStatus` stays outside of it and
//! answers from the controller's last published status.
//!
//! One request per connection: read a frame, answer with a frame, close.
//! The accept loop hands every connection to its own task, so a slow
//! client never blocks the others.
//!
//! # Fire-and-forget
//!
//! `TurnOn` and `TurnOffAll` are answered with "accepted" right away; the
//! sequence runs in a background task that takes the critical section like
//! any other request. Their outcome shows up in `GetStatus` under
//! `recentEvents`.

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::json;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};

use super::framing::{read_frame_bytes, write_frame};
use super::protocol::{
    CommandType, ConnectConfig, IpcRequest, IpcResponse, SetAllZonesConfig, SetZoneConfig,
    PROTOCOL_VERSION,
};
use crate::controller::{CommandResult, ControllerEvent, LedController, StatusReport};
use crate::error::{LedError, Result};

/// Number of controller events kept for `GetStatus`
pub const RECENT_EVENT_CAPACITY: usize = 16;

/// A controller event with the time it was observed
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecentEvent {
    pub timestamp: DateTime<Utc>,
    pub event: ControllerEvent,
}

type RecentEvents = Arc<std::sync::Mutex<VecDeque<RecentEvent>>>;

/// Triggers a graceful server shutdown
#[derive(Debug, Clone)]
pub struct ShutdownHandle {
    tx: Arc<watch::Sender<bool>>,
}

impl ShutdownHandle {
    pub fn shutdown(&self) {
        // Receivers may already be gone when the server exited on its own
        let _ = self.tx.send(true);
    }
}

/// State shared by every connection task
struct ServerContext {
    controller: Arc<Mutex<LedController>>,
    status: watch::Receiver<StatusReport>,
    recent_events: RecentEvents,
    shutdown: ShutdownHandle,
    read_timeout: Duration,
}

/// The service's IPC endpoint
pub struct IpcServer {
    socket_path: PathBuf,
    context: Arc<ServerContext>,
    shutdown_rx: watch::Receiver<bool>,
}

impl IpcServer {
    /// Wrap a controller; starts forwarding its events into the recent-events ring
    pub fn new(mut controller: LedController, socket_path: PathBuf, read_timeout: Duration) -> Self {
        let events = controller.subscribe();
        let status = controller.status_watch();
        let recent_events: RecentEvents = Arc::default();
        spawn_event_forwarder(events, recent_events.clone());

        let (tx, shutdown_rx) = watch::channel(false);
        Self {
            socket_path,
            context: Arc::new(ServerContext {
                controller: Arc::new(Mutex::new(controller)),
                status,
                recent_events,
                shutdown: ShutdownHandle { tx: Arc::new(tx) },
                read_timeout,
            }),
            shutdown_rx,
        }
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// The shared controller (the critical section)
    pub fn controller(&self) -> Arc<Mutex<LedController>> {
        self.context.controller.clone()
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        self.context.shutdown.clone()
    }

    /// Bind the socket, replacing a stale socket file
    ///
    /// Fails when another server answers on the path.
    pub async fn bind(&self) -> Result<UnixListener> {
        if tokio::fs::metadata(&self.socket_path).await.is_ok() {
            if UnixStream::connect(&self.socket_path).await.is_ok() {
                return Err(LedError::Config(format!(
                    "Socket {} is already in use. Is the LED service already running?",
                    self.socket_path.display()
                )));
            }
            tracing::debug!("Removing stale socket {:?}", self.socket_path);
            tokio::fs::remove_file(&self.socket_path).await?;
        }

        if let Some(parent) = self.socket_path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }

        let listener = UnixListener::bind(&self.socket_path).map_err(|e| {
            LedError::Config(format!("Failed to bind {}: {}", self.socket_path.display(), e))
        })?;
        tracing::info!("IPC server listening on {:?}", self.socket_path);
        Ok(listener)
    }

    /// Bind and serve until shut down
    pub async fn run(self) -> Result<()> {
        let listener = self.bind().await?;
        self.serve(listener).await
    }

    /// Serve on an already bound listener until shut down
    ///
    /// On exit the device session is closed and the socket file removed.
    pub async fn serve(mut self, listener: UnixListener) -> Result<()> {
        loop {
            tokio::select! {
                accepted = listener.accept() => match accepted {
                    Ok((stream, _addr)) => {
                        let context = self.context.clone();
                        tokio::spawn(async move {
                            if let Err(e) = handle_connection(stream, context).await {
                                tracing::error!("Error handling connection: {}", e);
                            }
                        });
                    }
                    Err(e) => {
                        tracing::error!("Error accepting connection: {}", e);
                    }
                },
                changed = self.shutdown_rx.changed() => {
                    if changed.is_err() || *self.shutdown_rx.borrow() {
                        break;
                    }
                }
            }
        }

        tracing::info!("IPC server shutting down");
        self.context.controller.lock().await.disconnect().await;
        if let Err(e) = tokio::fs::remove_file(&self.socket_path).await {
            tracing::warn!("Failed to remove socket {:?}: {}", self.socket_path, e);
        }
        Ok(())
    }
}

/// Drain controller events into the log and the recent-events ring
///
/// Runs on its own thread and ends when the controller is dropped.
fn spawn_event_forwarder(
    events: crossbeam_channel::Receiver<ControllerEvent>,
    recent: RecentEvents,
) {
    let spawned = std::thread::Builder::new()
        .name("led-events".to_string())
        .spawn(move || {
            for event in events.iter() {
                tracing::debug!("Controller event: {:?}", event);
                let mut ring = recent.lock().unwrap_or_else(|e| e.into_inner());
                if ring.len() == RECENT_EVENT_CAPACITY {
                    ring.pop_front();
                }
                ring.push_back(RecentEvent {
                    timestamp: Utc::now(),
                    event,
                });
            }
        });
    if let Err(e) = spawned {
        tracing::error!("Failed to start event forwarder: {}", e);
    }
}

async fn handle_connection(mut stream: UnixStream, context: Arc<ServerContext>) -> Result<()> {
    let body = match tokio::time::timeout(context.read_timeout, read_frame_bytes(&mut stream)).await
    {
        Ok(body) => body?,
        Err(_) => {
            tracing::debug!("Client sent no request within {:?}", context.read_timeout);
            return Ok(());
        }
    };

    let response = match serde_json::from_slice::<IpcRequest>(&body) {
        Ok(request) => {
            tracing::debug!("Received {} ({})", request.command_type, request.command_id);
            process_request(request, &context).await
        }
        Err(e) => {
            tracing::warn!("Malformed request: {}", e);
            let command_id = serde_json::from_slice::<serde_json::Value>(&body)
                .ok()
                .and_then(|v| v.get("commandId").and_then(|id| id.as_str()).map(String::from))
                .unwrap_or_default();
            IpcResponse::failure(command_id, "Malformed request", Some(e.to_string()))
        }
    };

    write_frame(&mut stream, &response).await
}

async fn process_request(request: IpcRequest, context: &Arc<ServerContext>) -> IpcResponse {
    let id = request.command_id.clone();

    if request.version != PROTOCOL_VERSION {
        return IpcResponse::failure(
            id,
            format!(
                "Unsupported protocol version {} (service speaks {})",
                request.version, PROTOCOL_VERSION
            ),
            None,
        );
    }

    match request.command_type {
        CommandType::Ping => IpcResponse::ok(id, "pong").with_data(json!({
            "protocolVersion": PROTOCOL_VERSION,
            "serviceVersion": env!("CARGO_PKG_VERSION"),
        })),

        CommandType::Connect => match request.configuration_or_default::<ConnectConfig>() {
            Ok(config) => {
                let mut controller = context.controller.lock().await;
                IpcResponse::from_result(id, controller.connect(config.port.as_deref()).await)
            }
            Err(e) => invalid(id, e),
        },

        CommandType::Disconnect => {
            let mut controller = context.controller.lock().await;
            IpcResponse::from_result(id, controller.disconnect().await)
        }

        CommandType::GetStatus => {
            let report = context.status.borrow().clone();
            let recent: Vec<RecentEvent> = context
                .recent_events
                .lock()
                .unwrap_or_else(|e| e.into_inner())
                .iter()
                .cloned()
                .collect();

            let message = if report.connected {
                "Connected"
            } else {
                "Disconnected"
            };
            let mut data = serde_json::to_value(&report).unwrap_or_default();
            if let Some(object) = data.as_object_mut() {
                object.insert(
                    "recentEvents".to_string(),
                    serde_json::to_value(recent).unwrap_or_default(),
                );
            }
            IpcResponse::ok(id, message).with_data(data)
        }

        CommandType::SetZone => match request.configuration::<SetZoneConfig>() {
            Ok(config) => {
                let mut controller = context.controller.lock().await;
                let result = match ensure_connected(&mut controller).await {
                    Some(failure) => failure,
                    None => controller.set_zone(config.to_apply()).await,
                };
                IpcResponse::from_result(id, result)
            }
            Err(e) => invalid(id, e),
        },

        CommandType::SetAllZones => match request.configuration::<SetAllZonesConfig>() {
            Ok(config) => {
                let mut controller = context.controller.lock().await;
                let result = match ensure_connected(&mut controller).await {
                    Some(failure) => failure,
                    None => controller.set_all_zones(config.color, config.brightness).await,
                };
                IpcResponse::from_result(id, result)
            }
            Err(e) => invalid(id, e),
        },

        CommandType::TurnOn | CommandType::TurnOffAll => {
            let command = request.command_type;
            let controller = context.controller.clone();
            tokio::spawn(async move {
                let mut controller = controller.lock().await;
                let result = match ensure_connected(&mut controller).await {
                    Some(failure) => failure,
                    None if command == CommandType::TurnOn => controller.turn_on().await,
                    None => controller.turn_off().await,
                };
                if result.success {
                    tracing::info!("{} finished: {}", command, result.message);
                } else {
                    tracing::warn!(
                        "{} failed: {} ({})",
                        command,
                        result.message,
                        result.error_details.as_deref().unwrap_or("")
                    );
                }
            });
            IpcResponse::ok(id, format!("{} accepted", command))
        }

        CommandType::Shutdown => {
            context.shutdown.shutdown();
            IpcResponse::ok(id, "Shutting down")
        }
    }
}

/// Connect with the default port when no session is open
///
/// Returns the failed connect result, or `None` when a session is ready.
async fn ensure_connected(controller: &mut LedController) -> Option<CommandResult> {
    if controller.is_connected() {
        return None;
    }
    tracing::info!("No device session, connecting before the request");
    let result = controller.connect(None).await;
    if result.success {
        None
    } else {
        Some(result)
    }
}

fn invalid(id: String, err: LedError) -> IpcResponse {
    IpcResponse::failure(id, "Invalid request", Some(err.to_string()))
}
