//! IPC Client
//!
//! Talks to the service over its Unix socket. Every request opens a fresh
//! connection, writes one frame and waits for one frame back, all bounded
//! by the client timeout. The client never touches the serial port.

use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::net::UnixStream;

use super::framing::{read_frame, write_frame};
use super::protocol::{
    CommandType, ConnectConfig, IpcRequest, IpcResponse, SetAllZonesConfig, SetZoneConfig,
};
use crate::config::ServiceConfig;
use crate::error::{LedError, Result};
use crate::types::{Brightness, Color, Pattern, Zone};

/// Client for the LED service
#[derive(Debug, Clone)]
pub struct IpcClient {
    socket_path: PathBuf,
    timeout: Duration,
}

impl IpcClient {
    pub fn new(socket_path: impl Into<PathBuf>, timeout: Duration) -> Self {
        Self {
            socket_path: socket_path.into(),
            timeout,
        }
    }

    /// Client for the socket and timeout in the service settings
    pub fn from_config(config: &ServiceConfig) -> Self {
        Self::new(config.resolved_socket_path(), config.ipc.client_timeout())
    }

    pub fn socket_path(&self) -> &Path {
        &self.socket_path
    }

    /// Send one request and wait for its response
    pub async fn send(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let response = tokio::time::timeout(self.timeout, self.exchange(request))
            .await
            .map_err(|_| {
                LedError::Timeout(format!(
                    "No response to {} within {:?}",
                    request.command_type, self.timeout
                ))
            })??;

        if response.command_id != request.command_id {
            return Err(LedError::Protocol(format!(
                "Response for '{}' does not match request '{}'",
                response.command_id, request.command_id
            )));
        }
        Ok(response)
    }

    async fn exchange(&self, request: &IpcRequest) -> Result<IpcResponse> {
        let mut stream = UnixStream::connect(&self.socket_path)
            .await
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::NotFound => LedError::Transport(format!(
                    "LED service is not running (socket not found at {})",
                    self.socket_path.display()
                )),
                std::io::ErrorKind::ConnectionRefused => LedError::Transport(format!(
                    "LED service is not running (connection refused at {})",
                    self.socket_path.display()
                )),
                _ => LedError::Io(e),
            })?;

        tracing::debug!("-> {} ({})", request.command_type, request.command_id);
        write_frame(&mut stream, request).await?;
        read_frame(&mut stream).await
    }

    // ==================== Convenience Wrappers ====================

    pub async fn ping(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::new(CommandType::Ping)).await
    }

    pub async fn connect(&self, port: Option<String>) -> Result<IpcResponse> {
        let request =
            IpcRequest::new(CommandType::Connect).with_configuration(&ConnectConfig { port })?;
        self.send(&request).await
    }

    pub async fn disconnect(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::new(CommandType::Disconnect)).await
    }

    pub async fn get_status(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::new(CommandType::GetStatus)).await
    }

    pub async fn set_zone(&self, config: &SetZoneConfig) -> Result<IpcResponse> {
        let request = IpcRequest::new(CommandType::SetZone).with_configuration(config)?;
        self.send(&request).await
    }

    /// Solid color on one zone
    pub async fn set_zone_color(
        &self,
        zone: Zone,
        color: Color,
        brightness: Brightness,
    ) -> Result<IpcResponse> {
        self.set_zone(&SetZoneConfig {
            zone,
            pattern: Pattern::Solid,
            color,
            secondary_color: None,
            tertiary_color: None,
            brightness,
        })
        .await
    }

    pub async fn set_all_zones(&self, color: Color, brightness: Brightness) -> Result<IpcResponse> {
        let request = IpcRequest::new(CommandType::SetAllZones)
            .with_configuration(&SetAllZonesConfig { color, brightness })?;
        self.send(&request).await
    }

    pub async fn turn_on(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::new(CommandType::TurnOn)).await
    }

    pub async fn turn_off(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::new(CommandType::TurnOffAll)).await
    }

    pub async fn shutdown(&self) -> Result<IpcResponse> {
        self.send(&IpcRequest::new(CommandType::Shutdown)).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_service_not_running() {
        let dir = tempfile::tempdir().unwrap();
        let client = IpcClient::new(dir.path().join("missing.sock"), Duration::from_secs(1));

        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, LedError::Transport(_)));
        assert!(err.to_string().contains("not running"));
    }

    #[tokio::test]
    async fn test_timeout_on_silent_server() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("silent.sock");
        let listener = tokio::net::UnixListener::bind(&path).unwrap();
        let _server = tokio::spawn(async move {
            let (_stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
        });

        let client = IpcClient::new(&path, Duration::from_millis(100));
        let err = client.ping().await.unwrap_err();
        assert!(matches!(err, LedError::Timeout(_)));
    }
}
