//! # minipc-led: Serial LED Session Service
//!
//! Owns the serial connection to a mini-PC's LED controller and exposes it
//! to any number of UI processes over a local socket. The firmware is
//! write-only and has a sticky rainbow mode, so every change goes through
//! a fixed, order-sensitive command sequence with settle delays between
//! commands.
//!
//! ## Architecture
//!
//! ```text
//! UI -> IpcClient -> IpcServer -> LedController -> SessionManager -> device
//!                                      |
//!                                  StateStore
//! ```
//!
//! - **Device**: text commands, the serial/mock transports and the
//!   anti-rainbow sequences
//! - **Session**: exclusive port ownership behind a named cross-process lock
//! - **Store**: the persisted belief about the hardware, restored on reconnect
//! - **Controller**: user intents in, `CommandResult`s out
//! - **IPC**: length-prefixed JSON over a Unix domain socket
//! - **Communication**: crossbeam channels for store and controller events
//!
//! ## Configuration
//!
//! Settings and state live in the platform data directory under
//! `dev.minipc.led` (see [`config`]).
//!
//! ## Example
//!
//! ```ignore
//! use minipc_led::{
//!     config::ServiceConfig,
//!     controller::LedController,
//!     device::SerialPortOpener,
//!     ipc::IpcServer,
//!     session::SessionManager,
//!     store::StateStore,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = ServiceConfig::load_or_default();
//!     let opener = Arc::new(SerialPortOpener::new(config.device.baud_rate));
//!     let session = SessionManager::from_config(opener, &config);
//!     let store = StateStore::open(config.resolved_state_path()?);
//!     let controller = LedController::new(
//!         session,
//!         store,
//!         config.connection.clone(),
//!         config.device.port.clone(),
//!     );
//!
//!     let server = IpcServer::new(
//!         controller,
//!         config.resolved_socket_path(),
//!         config.ipc.request_read_timeout(),
//!     );
//!     server.run().await?;
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod controller;
pub mod device;
pub mod error;
#[cfg(unix)]
pub mod ipc;
pub mod session;
pub mod store;
pub mod types;

// Re-export commonly used types
pub use config::ServiceConfig;
pub use controller::{CommandResult, ControllerEvent, LedController, StatusReport};
pub use device::{DeviceProtocol, ZoneApply};
pub use error::{LedError, Result};
pub use session::{ConnectFailure, SessionManager};
pub use store::{StateEvent, StateStore};
pub use types::{Brightness, Color, ConnectionStatus, GlobalState, Pattern, Zone, ZoneState};
