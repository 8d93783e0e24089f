//! peerbank server binary.
//!
//! Parses the command line, wires up logging, loads the ledger and serves
//! the banking protocol until interrupted.

use anyhow::{bail, Context, Result};
use clap::Parser;
use peerbank::config::{DurabilityPolicy, NodeConfig};
use peerbank::ledger::Ledger;
use peerbank::server::Server;
use peerbank::store::SnapshotStore;
use std::fs::File;
use std::net::{IpAddr, Ipv4Addr, UdpSocket};
use std::ops::RangeInclusive;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

/// Ports reserved for the banking protocol.
const PORT_RANGE: RangeInclusive<u16> = 65_525..=65_535;

#[derive(Parser, Debug)]
#[command(
    name = "peerbank",
    version,
    about = "Single bank node in a peer-to-peer banking network"
)]
struct Cli {
    /// Port to listen on (65525-65535)
    #[arg(long, default_value_t = 65_525)]
    port: u16,

    /// This bank's IPv4 address; autodetected when omitted
    #[arg(long)]
    ip: Option<Ipv4Addr>,

    /// Idle timeout for client connections, in seconds
    #[arg(long, default_value_t = 5)]
    timeout: u64,

    /// File holding the persistent ledger state
    #[arg(long, default_value = "bank_data.json")]
    datafile: PathBuf,

    /// Log file; log lines also go to the console
    #[arg(long, default_value = "bank_node.log")]
    logfile: PathBuf,

    /// What a failed state write does to the running operation
    #[arg(long, value_enum, default_value_t = DurabilityPolicy::BestEffort)]
    durability: DurabilityPolicy,

    /// Maximum simultaneous client connections
    #[arg(long, default_value_t = 64)]
    max_connections: usize,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli.logfile)?;

    if !PORT_RANGE.contains(&cli.port) {
        bail!(
            "port {} is outside the allowed range {}-{}",
            cli.port,
            PORT_RANGE.start(),
            PORT_RANGE.end()
        );
    }

    let bank_addr = match cli.ip {
        Some(ip) => ip,
        None => detect_local_ip().unwrap_or_else(|e| {
            tracing::error!(
                "cannot autodetect the local IP address ({}), falling back to 127.0.0.1",
                e
            );
            Ipv4Addr::LOCALHOST
        }),
    };

    let config = NodeConfig {
        port: cli.port,
        bank_addr,
        idle_timeout: Duration::from_secs(cli.timeout),
        data_file: cli.datafile,
        durability: cli.durability,
        max_connections: cli.max_connections,
    };
    tracing::info!(
        "starting bank node {} on port {}",
        config.bank_addr,
        config.port
    );

    let store = SnapshotStore::new(&config.data_file);
    let ledger = Arc::new(Ledger::open(store, config.durability));
    let server = Server::bind(&config, ledger)
        .await
        .context("failed to bind the listening socket")?;

    tokio::select! {
        result = server.run() => result,
        _ = tokio::signal::ctrl_c() => {
            tracing::info!("interrupt received, shutting down");
            Ok(())
        }
    }
}

/// Log to the console and the logfile, filtered by `RUST_LOG` with `info`
/// as the default level.
fn init_logging(logfile: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let file = File::options()
        .create(true)
        .append(true)
        .open(logfile)
        .with_context(|| format!("failed to open log file {}", logfile.display()))?;

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(Arc::new(file)),
        )
        .init();

    Ok(())
}

/// The address this host would use to reach the public internet.
/// Connecting a UDP socket sends no packets; it only makes the kernel pick
/// a route and a source address.
fn detect_local_ip() -> std::io::Result<Ipv4Addr> {
    let socket = UdpSocket::bind("0.0.0.0:0")?;
    socket.connect("8.8.8.8:80")?;
    match socket.local_addr()?.ip() {
        IpAddr::V4(ip) => Ok(ip),
        IpAddr::V6(ip) => Err(std::io::Error::other(format!(
            "expected an IPv4 source address, got {}",
            ip
        ))),
    }
}
