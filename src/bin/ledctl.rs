//! ledctl - command line client for the minipc-led service
//!
//! Sends one request per invocation, prints the response message (and the
//! response data with `--json`), and exits non-zero when the service
//! reports a failure.

#[cfg(unix)]
use clap::{Parser, Subcommand};
#[cfg(unix)]
use minipc_led::{
    config::ServiceConfig,
    ipc::{protocol::SetZoneConfig, IpcClient, IpcResponse},
    types::{Brightness, Color, Pattern, Zone},
};
#[cfg(unix)]
use std::path::PathBuf;
#[cfg(unix)]
use std::time::Duration;
#[cfg(unix)]
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(unix)]
#[derive(Parser, Debug)]
#[command(name = "ledctl")]
#[command(version, about = "Control the minipc-led service", long_about = None)]
struct Cli {
    /// IPC socket path (defaults to the service's socket)
    #[arg(long, global = true)]
    socket: Option<PathBuf>,

    /// Request timeout in seconds
    #[arg(long, global = true)]
    timeout: Option<u64>,

    /// Print the response data as JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[cfg(unix)]
#[derive(Subcommand, Debug)]
enum Command {
    /// Check that the service is running
    Ping,
    /// Show connection status and LED state
    Status,
    /// Connect to the LED device
    Connect {
        /// Serial port (service default when omitted)
        #[arg(long)]
        port: Option<String>,
    },
    /// Release the LED device
    Disconnect,
    /// Configure one zone
    SetZone {
        /// Zone: skull, eyes, front or underglow
        zone: Zone,
        /// Color: name, #RRGGBB or 0xRRGGBB
        color: Color,
        /// Brightness in percent
        #[arg(long, short, default_value_t = 100)]
        brightness: u8,
        /// Pattern name or code
        #[arg(long, short, default_value = "solid")]
        pattern: Pattern,
        /// Second color for pulse-train patterns
        #[arg(long)]
        secondary: Option<Color>,
        /// Third color for pulse-train patterns
        #[arg(long)]
        tertiary: Option<Color>,
    },
    /// Set every zone to one solid color
    SetAll {
        color: Color,
        #[arg(long, short, default_value_t = 100)]
        brightness: u8,
    },
    /// Power on with white on every zone
    On,
    /// Turn every zone off
    Off,
    /// Stop the service
    Shutdown,
}

#[cfg(unix)]
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = ServiceConfig::load_or_default();
    let socket = cli
        .socket
        .clone()
        .unwrap_or_else(|| config.resolved_socket_path());
    let timeout = cli
        .timeout
        .map(Duration::from_secs)
        .unwrap_or_else(|| config.ipc.client_timeout());
    let client = IpcClient::new(socket, timeout);

    let response = match cli.command {
        Command::Ping => client.ping().await?,
        Command::Status => client.get_status().await?,
        Command::Connect { port } => client.connect(port).await?,
        Command::Disconnect => client.disconnect().await?,
        Command::SetZone {
            zone,
            color,
            brightness,
            pattern,
            secondary,
            tertiary,
        } => {
            client
                .set_zone(&SetZoneConfig {
                    zone,
                    pattern,
                    color,
                    secondary_color: secondary,
                    tertiary_color: tertiary,
                    brightness: Brightness::from_percent(brightness),
                })
                .await?
        }
        Command::SetAll { color, brightness } => {
            client
                .set_all_zones(color, Brightness::from_percent(brightness))
                .await?
        }
        Command::On => client.turn_on().await?,
        Command::Off => client.turn_off().await?,
        Command::Shutdown => client.shutdown().await?,
    };

    print_response(&response, cli.json)?;
    if !response.success {
        std::process::exit(1);
    }
    Ok(())
}

#[cfg(unix)]
fn print_response(response: &IpcResponse, json: bool) -> anyhow::Result<()> {
    if response.success {
        println!("{}", response.message);
    } else {
        eprintln!("error: {}", response.message);
        if let Some(ref details) = response.error_details {
            eprintln!("  {}", details);
        }
    }
    if json {
        if let Some(ref data) = response.data {
            println!("{}", serde_json::to_string_pretty(data)?);
        }
    }
    Ok(())
}

#[cfg(not(unix))]
fn main() {
    eprintln!("ledctl needs Unix domain sockets and is not available on this platform");
    std::process::exit(1);
}
