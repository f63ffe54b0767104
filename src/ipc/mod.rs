//! Local request/response channel between UI processes and the service
//!
//! - [`protocol`] - request/response types
//! - [`framing`] - length-prefixed JSON frames
//! - [`server`] - the service side, owning the controller
//! - [`client`] - the UI side

pub mod client;
pub mod framing;
pub mod protocol;
pub mod server;

pub use client::IpcClient;
pub use protocol::{CommandType, IpcRequest, IpcResponse, PROTOCOL_VERSION};
pub use server::{IpcServer, ShutdownHandle};
