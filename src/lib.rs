//! peerbank is a single bank node in a peer-to-peer banking network.
//!
//! Each node is one bank, identified by its own IPv4 address. Clients open
//! a TCP connection and issue one command per line (`BC`, `AC`, `AD`, `AW`,
//! `AB`, `AR`, `BA`, `BN`); every command gets exactly one response line
//! back, with rejections rendered as `ER <message>`. Account state lives in
//! a [`ledger::Ledger`] and survives restarts through a JSON snapshot file.

pub mod config;
pub mod ledger;
pub mod protocol;
pub mod server;
pub mod session;
pub mod store;

pub use config::{DurabilityPolicy, NodeConfig};
pub use ledger::{Ledger, LedgerError};
pub use protocol::Dispatcher;
pub use server::Server;
pub use store::SnapshotStore;
