//! Serial port transport
//!
//! Opens the LED controller's USB-serial port with tokio-serial and writes
//! the text commands. On Unix the port is opened in exclusive mode so a
//! second handle is refused by the OS; on Windows COM ports are exclusive
//! anyway.

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;
use tokio_serial::{DataBits, Parity, SerialPort, SerialPortBuilderExt, SerialStream, StopBits};

use super::command::DeviceCommand;
use super::transport::{DeviceTransport, PortOpener};
use crate::error::{LedError, Result};

/// Opens real serial ports
#[derive(Debug, Clone)]
pub struct SerialPortOpener {
    baud_rate: u32,
}

impl SerialPortOpener {
    pub fn new(baud_rate: u32) -> Self {
        Self { baud_rate }
    }

    /// Map an open error onto the session's failure classes
    fn classify_open_error(port: &str, err: tokio_serial::Error) -> LedError {
        let description = err.description.to_lowercase();

        if let tokio_serial::ErrorKind::Io(kind) = &err.kind {
            if *kind == std::io::ErrorKind::PermissionDenied
                && std::path::Path::new(port).exists()
            {
                return LedError::AccessDenied {
                    port: port.to_string(),
                    message: err.description,
                };
            }
        }

        if description.contains("busy") || description.contains("access is denied") {
            return LedError::AccessDenied {
                port: port.to_string(),
                message: err.description,
            };
        }

        if matches!(err.kind, tokio_serial::ErrorKind::NoDevice) {
            return LedError::Transport(format!("{}: {}", port, err.description));
        }

        LedError::Serial(err)
    }
}

#[async_trait]
impl PortOpener for SerialPortOpener {
    async fn open(&self, port: &str) -> Result<Box<dyn DeviceTransport>> {
        let mut stream = tokio_serial::new(port, self.baud_rate)
            .data_bits(DataBits::Eight)
            .parity(Parity::None)
            .stop_bits(StopBits::One)
            .open_native_async()
            .map_err(|e| Self::classify_open_error(port, e))?;

        #[cfg(unix)]
        stream.set_exclusive(true)?;

        // The controller only listens once DTR is asserted
        stream.write_data_terminal_ready(true)?;

        tracing::debug!("Opened serial port {} at {} baud", port, self.baud_rate);

        Ok(Box::new(SerialTransport {
            port: port.to_string(),
            stream: Some(stream),
        }))
    }
}

/// An open serial connection to the controller
pub struct SerialTransport {
    port: String,
    stream: Option<SerialStream>,
}

#[async_trait]
impl DeviceTransport for SerialTransport {
    async fn send(&mut self, command: &DeviceCommand) -> Result<()> {
        let stream = self
            .stream
            .as_mut()
            .ok_or_else(|| LedError::Transport(format!("{} is closed", self.port)))?;

        let line = command.to_line();
        stream
            .write_all(line.as_bytes())
            .await
            .map_err(|e| LedError::Transport(format!("write to {} failed: {}", self.port, e)))?;
        stream
            .flush()
            .await
            .map_err(|e| LedError::Transport(format!("flush of {} failed: {}", self.port, e)))
    }

    async fn close(&mut self) -> Result<()> {
        if let Some(mut stream) = self.stream.take() {
            if let Err(e) = stream.flush().await {
                tracing::warn!("Flush on close of {} failed: {}", self.port, e);
            }
            tracing::debug!("Closed serial port {}", self.port);
        }
        Ok(())
    }

    fn port_name(&self) -> &str {
        &self.port
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_busy_port() {
        let err = tokio_serial::Error::new(
            tokio_serial::ErrorKind::Unknown,
            "Device or resource busy",
        );
        let classified = SerialPortOpener::classify_open_error("/dev/ttyACM0", err);
        assert!(classified.is_contention());
    }

    #[test]
    fn test_classify_missing_port() {
        let err = tokio_serial::Error::new(tokio_serial::ErrorKind::NoDevice, "No such device");
        let classified = SerialPortOpener::classify_open_error("/dev/does-not-exist", err);
        assert!(matches!(classified, LedError::Transport(_)));
    }

    #[tokio::test]
    async fn test_open_missing_port_fails() {
        let opener = SerialPortOpener::new(115_200);
        let result = opener.open("/dev/minipc-led-does-not-exist").await;
        assert!(result.is_err());
        assert!(!result.err().map(|e| e.is_contention()).unwrap_or(true));
    }
}
