//! Mock device and server helpers

use minipc_led::device::mock::MockDevice;
use minipc_led::ipc::{IpcClient, IpcServer, ShutdownHandle};
use minipc_led::types::Zone;
use tokio::task::JoinHandle;

use super::TestRig;

/// Command keywords (`PAT`, `RBW`, ...) of a command log
pub fn command_kinds(commands: &[String]) -> Vec<&str> {
    commands
        .iter()
        .map(|c| c.split_whitespace().next().unwrap_or(""))
        .collect()
}

/// Assert no zone is left in the sticky rainbow mode
pub fn assert_rainbow_cleared(device: &MockDevice) {
    for zone in Zone::ALL {
        assert!(
            !device.rainbow_active(zone),
            "{} is still in rainbow mode",
            zone
        );
    }
}

/// A running server bound to the rig's socket
pub struct RunningServer {
    pub client: IpcClient,
    pub shutdown: ShutdownHandle,
    pub handle: JoinHandle<minipc_led::Result<()>>,
}

impl RunningServer {
    /// Stop the server and wait for it to exit
    pub async fn stop(self) {
        self.shutdown.shutdown();
        self.handle
            .await
            .expect("server task panicked")
            .expect("server returned an error");
    }
}

/// Bind a server on the rig's socket and serve in the background
pub async fn start_server(rig: &TestRig) -> RunningServer {
    let server = IpcServer::new(
        rig.controller(),
        rig.socket_path(),
        rig.config.ipc.request_read_timeout(),
    );
    let listener = server.bind().await.expect("bind IPC socket");
    let shutdown = server.shutdown_handle();
    let handle = tokio::spawn(server.serve(listener));

    RunningServer {
        client: IpcClient::from_config(&rig.config),
        shutdown,
        handle,
    }
}
