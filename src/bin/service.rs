//! minipc-led service - Main Entry Point
//!
//! Owns the LED controller's serial port and serves UI requests over the
//! local IPC socket until Ctrl-C or a `Shutdown` request.

#[cfg(unix)]
use anyhow::Context;
#[cfg(unix)]
use clap::Parser;
#[cfg(unix)]
use minipc_led::{
    config::{self, ServiceConfig},
    controller::LedController,
    device::{PortOpener, SerialPortOpener},
    ipc::IpcServer,
    session::SessionManager,
    store::StateStore,
};
#[cfg(unix)]
use std::{path::PathBuf, sync::Arc};
#[cfg(unix)]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(unix)]
#[derive(Parser, Debug)]
#[command(name = "minipc-led-service")]
#[command(version, about = "Serial LED session service", long_about = None)]
struct Args {
    /// Serial port of the LED controller (overrides service.json)
    #[arg(long, env = "MINIPC_LED_PORT")]
    port: Option<String>,

    /// IPC socket path (overrides service.json)
    #[arg(long)]
    socket: Option<PathBuf>,

    /// Drive the in-memory device model instead of a serial port
    #[cfg(feature = "mock-device")]
    #[arg(long)]
    mock: bool,

    /// Do not connect to the device at startup
    #[arg(long)]
    no_connect: bool,
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    let _log_guard = init_logging();

    tracing::info!("Starting minipc-led service {}", env!("CARGO_PKG_VERSION"));

    let mut config = ServiceConfig::load_or_default();
    if let Some(port) = args.port.clone() {
        config.device.port = port;
    }
    if let Some(socket) = args.socket.clone() {
        config.ipc.socket_path = Some(socket);
    }

    let opener = port_opener(&args, &mut config);

    std::fs::create_dir_all(config.resolved_lock_dir()).with_context(|| {
        format!(
            "Failed to create lock directory {}",
            config.resolved_lock_dir().display()
        )
    })?;

    let session = SessionManager::from_config(opener, &config);
    let store = StateStore::open(config.resolved_state_path()?);
    let controller = LedController::new(
        session,
        store,
        config.connection.clone(),
        config.device.port.clone(),
    );
    let server = IpcServer::new(
        controller,
        config.resolved_socket_path(),
        config.ipc.request_read_timeout(),
    );

    // Bind before connecting so a second instance fails fast
    let listener = server.bind().await.context("Failed to start IPC server")?;

    if !args.no_connect {
        let result = server.controller().lock().await.connect(None).await;
        if result.success {
            tracing::info!("{}", result.message);
        } else {
            tracing::warn!(
                "Initial connect failed, will retry on the first request: {} ({})",
                result.message,
                result.error_details.unwrap_or_default()
            );
        }
    }

    let shutdown = server.shutdown_handle();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        shutdown.shutdown();
    });

    server.serve(listener).await?;
    tracing::info!("minipc-led service stopped");
    Ok(())
}

/// Serial port opener, or the mock device with `--mock`
#[cfg(unix)]
#[cfg_attr(not(feature = "mock-device"), allow(unused_variables))]
fn port_opener(args: &Args, config: &mut ServiceConfig) -> Arc<dyn PortOpener> {
    #[cfg(feature = "mock-device")]
    if args.mock {
        tracing::warn!("Using the in-memory mock device");
        config.timing = config::TimingConfig::immediate();
        return Arc::new(minipc_led::device::mock::MockDevice::new().opener());
    }
    Arc::new(SerialPortOpener::new(config.device.baud_rate))
}

/// Console output plus a daily log file in the app data directory
#[cfg(unix)]
fn init_logging() -> Option<tracing_appender::non_blocking::WorkerGuard> {
    let (file_writer, guard) = match config::ensure_app_data_dir() {
        Ok(dir) => {
            let appender = tracing_appender::rolling::daily(dir.join("logs"), "service.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            (Some(writer), Some(guard))
        }
        Err(_) => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,minipc_led=debug")),
        )
        .with(tracing_subscriber::fmt::layer())
        .with(file_writer.map(|writer| {
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer)
        }))
        .init();

    guard
}

#[cfg(not(unix))]
fn main() {
    eprintln!("minipc-led-service needs Unix domain sockets and is not available on this platform");
    std::process::exit(1);
}
