//! LED controller access
//!
//! - [`command`] - the firmware's text commands
//! - [`transport`] - traits over an open port and a port factory
//! - [`serial`] - the real USB-serial transport
//! - [`mock`] - in-memory device model (feature `mock-device`)
//! - [`protocol`] - the order-sensitive command sequences

pub mod command;
#[cfg(any(test, feature = "mock-device"))]
pub mod mock;
pub mod protocol;
pub mod serial;
pub mod transport;

pub use command::DeviceCommand;
pub use protocol::{DeviceProtocol, ZoneApply};
pub use serial::SerialPortOpener;
pub use transport::{DeviceTransport, PortOpener};
