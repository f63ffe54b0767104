//! Common test utilities and helpers

#![allow(dead_code)] // Test utilities may not all be used in every test file

pub mod builders;
pub mod mock_helpers;

use minipc_led::config::{ConnectionConfig, ServiceConfig, TimingConfig};
use minipc_led::controller::LedController;
use minipc_led::device::mock::MockDevice;
use minipc_led::session::SessionManager;
use minipc_led::store::StateStore;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;

/// Port name used with the mock device
pub const MOCK_PORT: &str = "mock0";

/// Create a test timeout duration
pub fn test_timeout() -> Duration {
    Duration::from_secs(5)
}

/// An isolated service environment: temp dir, mock device, fast timings
pub struct TestRig {
    pub dir: TempDir,
    pub device: MockDevice,
    pub config: ServiceConfig,
}

impl TestRig {
    pub fn new() -> Self {
        Self::with_device(MockDevice::new())
    }

    pub fn with_device(device: MockDevice) -> Self {
        let dir = tempfile::tempdir().expect("create temp dir");

        let mut config = ServiceConfig::default();
        config.device.port = MOCK_PORT.to_string();
        config.device.lock_dir = Some(dir.path().to_path_buf());
        config.timing = TimingConfig::immediate();
        config.connection = ConnectionConfig::single_attempt();
        config.ipc.socket_path = Some(dir.path().join("led.sock"));
        config.ipc.client_timeout_ms = 5_000;
        config.state_path = Some(dir.path().join("led_state.json"));

        Self {
            dir,
            device,
            config,
        }
    }

    pub fn state_path(&self) -> PathBuf {
        self.config
            .resolved_state_path()
            .expect("state path is configured")
    }

    pub fn socket_path(&self) -> PathBuf {
        self.config.resolved_socket_path()
    }

    /// A session manager sharing this rig's lock and device
    pub fn session(&self) -> SessionManager {
        SessionManager::from_config(Arc::new(self.device.opener()), &self.config)
    }

    pub fn store(&self) -> StateStore {
        StateStore::open(self.state_path())
    }

    pub fn controller(&self) -> LedController {
        LedController::new(
            self.session(),
            self.store(),
            self.config.connection.clone(),
            MOCK_PORT,
        )
    }

    /// A controller that is already connected
    pub async fn connected_controller(&self) -> LedController {
        let mut controller = self.controller();
        let result = controller.connect(None).await;
        assert!(result.success, "connect failed: {:?}", result);
        controller
    }
}
