//! Command-line client for VelocityDRIVE serial devices.
//!
//! # Usage
//!
//! ```bash
//! # List currently connected devices
//! mup1-cli list
//!
//! # Issue a CORECONF GET against a specific device
//! mup1-cli get /dev/ttyACM0 /c
//!
//! # Refresh and print a device's projected info
//! mup1-cli query /dev/ttyACM0
//! ```

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use mup1_core::{ConnectionConfig, DeviceRegistry, RegistryConfig};
use mup1_proto::CoapMethod;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// VelocityDRIVE serial device client
#[derive(Parser, Debug)]
#[command(name = "mup1-cli")]
#[command(about = "MUP1/CORECONF client for VelocityDRIVE serial devices")]
#[command(version)]
struct Args {
    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Scan `/dev` once, connect every discovered endpoint, and print the
    /// resulting device list.
    Scan,
    /// Print the last known info for every registered device.
    List,
    /// Issue a CORECONF GET against one device.
    Get {
        /// Serial device path, e.g. `/dev/ttyACM0`.
        path: PathBuf,
        /// CORECONF URI, e.g. `/c` or `/c?d=a`.
        uri: String,
    },
    /// Refresh and print one device's projected info (`GET /c?d=a`).
    Query {
        /// Serial device path, e.g. `/dev/ttyACM0`.
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let args = Args::parse();
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&args.log_level));
    tracing_subscriber::registry().with(fmt::layer()).with(filter).init();

    let registry = DeviceRegistry::new(RegistryConfig::default());

    match args.command {
        Command::Scan => {
            registry.scan().await?;
            for info in registry.all().await {
                report_device(&info);
            }
        },
        Command::List => {
            for info in registry.all().await {
                report_device(&info);
            }
        },
        Command::Get { path, uri } => {
            registry.connect(path.clone(), ConnectionConfig::default().baud_rate).await?;
            let payload = registry.execute(&path, CoapMethod::Get, &uri, None).await?;
            tracing::info!(?payload, "response");
        },
        Command::Query { path } => {
            registry.connect(path.clone(), ConnectionConfig::default().baud_rate).await?;
            if let Some(handle) = registry.handle(&path).await {
                let info = handle.query_device_info().await?;
                tracing::info!(?info, "device info");
            }
        },
    }

    Ok(())
}

fn report_device(info: &mup1_core::DeviceInfo) {
    tracing::info!(
        path = %info.path.display(),
        baud_rate = info.baud_rate,
        connected = info.connected,
        "device"
    );
}
