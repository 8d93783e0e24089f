//! Snapshot persistence for the ledger state.
//!
//! The whole bank state is one small JSON object, rewritten in full after
//! every mutation. Loading tolerates missing and partial files; a file that
//! cannot be read or parsed is moved aside instead of overwritten.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Lowest account number this bank issues.
pub const FIRST_ACCOUNT: u32 = 10_000;
/// Highest account number this bank issues.
pub const LAST_ACCOUNT: u32 = 99_999;

fn default_last_account() -> u32 {
    FIRST_ACCOUNT - 1
}

/// Serializable bank state: the issue counter plus the live accounts.
///
/// On disk this is a single object such as
/// `{"last_account":10001,"accounts":{"10000":500,"10001":0}}`.
/// Each field falls back to its default when absent, so a partial file
/// still loads.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LedgerState {
    /// Last issued account number; 9999 means nothing has been issued yet.
    #[serde(default = "default_last_account")]
    pub last_account: u32,

    /// Account number to balance, in whole currency units.
    #[serde(default)]
    pub accounts: HashMap<u32, u64>,
}

impl Default for LedgerState {
    fn default() -> Self {
        Self {
            last_account: default_last_account(),
            accounts: HashMap::new(),
        }
    }
}

/// Errors raised by the snapshot store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Full-rewrite JSON store for [`LedgerState`].
pub struct SnapshotStore {
    path: PathBuf,
}

impl SnapshotStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Path of the state file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the state file.
    ///
    /// A missing file is a fresh start. A file that cannot be read or
    /// parsed is quarantined to `<path>.corrupt` so its bytes survive, and
    /// the bank starts from empty state.
    pub fn load(&self) -> LedgerState {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                tracing::info!(
                    "no state file at {}, starting with an empty ledger",
                    self.path.display()
                );
                return LedgerState::default();
            }
            Err(e) => {
                tracing::error!("cannot read state file {}: {}", self.path.display(), e);
                self.quarantine();
                return LedgerState::default();
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(state) => {
                tracing::info!("loaded ledger state from {}", self.path.display());
                state
            }
            Err(e) => {
                tracing::error!("state file {} is corrupt: {}", self.path.display(), e);
                self.quarantine();
                LedgerState::default()
            }
        }
    }

    /// Rewrite the state file with the given state.
    pub fn save(&self, state: &LedgerState) -> Result<(), StoreError> {
        let json = serde_json::to_string(state)?;
        fs::write(&self.path, json)?;
        Ok(())
    }

    /// Move a bad state file to `<path>.corrupt` rather than losing it on
    /// the next save.
    fn quarantine(&self) {
        let mut target = self.path.as_os_str().to_owned();
        target.push(".corrupt");
        match fs::rename(&self.path, &target) {
            Ok(()) => tracing::warn!(
                "quarantined unusable state file as {}",
                Path::new(&target).display()
            ),
            Err(e) => tracing::warn!(
                "could not quarantine state file {}: {}",
                self.path.display(),
                e
            ),
        }
    }
}
