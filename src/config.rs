//! Runtime configuration for a bank node.

use clap::ValueEnum;
use std::net::Ipv4Addr;
use std::path::PathBuf;
use std::time::Duration;

/// What a failed snapshot write does to the operation that triggered it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, ValueEnum)]
pub enum DurabilityPolicy {
    /// Log the failure and let the operation succeed; memory stays
    /// authoritative for the rest of the run.
    #[default]
    BestEffort,
    /// Fail the operation. The client sees a generic application error.
    Strict,
}

/// Everything the node needs from the outside: where to listen, which bank
/// it is, how patient to be with clients, and where state lives.
///
/// The command line layer builds one of these; tests build them directly.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// TCP port to listen on. 0 binds an ephemeral port.
    pub port: u16,
    /// This bank's own IPv4 address, as embedded in account identifiers.
    pub bank_addr: Ipv4Addr,
    /// Idle timeout for client connections.
    pub idle_timeout: Duration,
    /// Path of the JSON state file.
    pub data_file: PathBuf,
    /// Snapshot write failure handling.
    pub durability: DurabilityPolicy,
    /// Maximum simultaneous client connections.
    pub max_connections: usize,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            port: 65_525,
            bank_addr: Ipv4Addr::LOCALHOST,
            idle_timeout: Duration::from_secs(5),
            data_file: PathBuf::from("bank_data.json"),
            durability: DurabilityPolicy::default(),
            max_connections: 64,
        }
    }
}
