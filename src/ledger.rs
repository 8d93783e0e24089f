//! The account ledger.
//!
//! All account state sits behind one `RwLock`: mutations take the write
//! half and rewrite the snapshot file before releasing it, queries take the
//! read half and never touch the disk.

use crate::config::DurabilityPolicy;
use crate::store::{LedgerState, SnapshotStore, StoreError, LAST_ACCOUNT};
use thiserror::Error;
use tokio::sync::RwLock;

/// Errors surfaced by ledger operations.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("Account does not exist")]
    AccountNotFound,

    #[error("Insufficient funds")]
    InsufficientFunds,

    #[error("Cannot remove an account that still holds funds")]
    NonZeroBalance,

    #[error("Bank cannot open any more accounts")]
    CapacityExceeded,

    #[error("Balance overflow on account {0}")]
    BalanceOverflow(u32),

    #[error("Storage error: {0}")]
    Storage(#[from] StoreError),
}

impl LedgerError {
    /// Whether the error message is meant for the client. Infrastructure
    /// faults are not, and get masked behind a generic response.
    pub fn is_client_visible(&self) -> bool {
        !matches!(
            self,
            LedgerError::BalanceOverflow(_) | LedgerError::Storage(_)
        )
    }
}

/// One bank's accounts, persisted through a [`SnapshotStore`].
pub struct Ledger {
    state: RwLock<LedgerState>,
    store: SnapshotStore,
    durability: DurabilityPolicy,
}

impl Ledger {
    /// Load the ledger from the store, starting empty when the store says
    /// there is nothing usable.
    pub fn open(store: SnapshotStore, durability: DurabilityPolicy) -> Self {
        let state = store.load();
        Self {
            state: RwLock::new(state),
            store,
            durability,
        }
    }

    /// Create a new zero-balance account and return its number.
    ///
    /// Numbers are issued sequentially from 10000 and never reused, so a
    /// bank can run out even with accounts removed along the way.
    pub async fn create_account(&self) -> Result<u32, LedgerError> {
        let mut state = self.state.write().await;
        if state.last_account >= LAST_ACCOUNT {
            return Err(LedgerError::CapacityExceeded);
        }
        state.last_account += 1;
        let number = state.last_account;
        state.accounts.insert(number, 0);
        self.persist(&state)?;
        tracing::info!("created account {}", number);
        Ok(number)
    }

    /// Add `amount` to an account balance.
    pub async fn deposit(&self, number: u32, amount: u64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let balance = state
            .accounts
            .get_mut(&number)
            .ok_or(LedgerError::AccountNotFound)?;
        *balance = balance
            .checked_add(amount)
            .ok_or(LedgerError::BalanceOverflow(number))?;
        self.persist(&state)?;
        tracing::info!("deposited {} into account {}", amount, number);
        Ok(())
    }

    /// Subtract `amount` from an account balance.
    pub async fn withdraw(&self, number: u32, amount: u64) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        let balance = state
            .accounts
            .get_mut(&number)
            .ok_or(LedgerError::AccountNotFound)?;
        if *balance < amount {
            return Err(LedgerError::InsufficientFunds);
        }
        *balance -= amount;
        self.persist(&state)?;
        tracing::info!("withdrew {} from account {}", amount, number);
        Ok(())
    }

    /// Current balance of an account, or `None` if it does not exist.
    pub async fn balance(&self, number: u32) -> Option<u64> {
        self.state.read().await.accounts.get(&number).copied()
    }

    /// Delete an account. Only an account holding nothing may go.
    pub async fn remove_account(&self, number: u32) -> Result<(), LedgerError> {
        let mut state = self.state.write().await;
        match state.accounts.get(&number) {
            None => return Err(LedgerError::AccountNotFound),
            Some(&balance) if balance != 0 => return Err(LedgerError::NonZeroBalance),
            Some(_) => {}
        }
        state.accounts.remove(&number);
        self.persist(&state)?;
        tracing::info!("removed account {}", number);
        Ok(())
    }

    /// Sum of all balances. Wide enough that 90000 full accounts cannot
    /// overflow it.
    pub async fn total_amount(&self) -> u128 {
        self.state
            .read()
            .await
            .accounts
            .values()
            .map(|&balance| u128::from(balance))
            .sum()
    }

    /// Number of live accounts.
    pub async fn client_count(&self) -> usize {
        self.state.read().await.accounts.len()
    }

    /// Rewrite the snapshot while the write guard is still held.
    ///
    /// The in-memory mutation is never rolled back. Under best-effort
    /// durability a failed write is logged and the operation still
    /// succeeds; under strict durability the operation fails.
    fn persist(&self, state: &LedgerState) -> Result<(), LedgerError> {
        match self.store.save(state) {
            Ok(()) => Ok(()),
            Err(e) => match self.durability {
                DurabilityPolicy::BestEffort => {
                    tracing::error!(
                        "failed to persist ledger state to {}: {}",
                        self.store.path().display(),
                        e
                    );
                    Ok(())
                }
                DurabilityPolicy::Strict => Err(LedgerError::Storage(e)),
            },
        }
    }
}
