//! In-memory ledger.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::instrument;

use super::{CallRecord, CreditStore, Debit, StoreError};

#[derive(Debug, Clone, Copy)]
struct ClientRow {
    client_id: i64,
    balance: i64,
}

#[derive(Debug, Default)]
struct Inner {
    clients: HashMap<String, ClientRow>,
    calls: Vec<CallRecord>,
    next_id: i64,
}

/// In-memory ledger.
///
/// Uses `Arc<RwLock<..>>` for thread-safe access; debits take the write lock
/// for the whole check-and-decrement. Useful for tests and throwaway
/// instances. Clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct MemoryCreditStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryCreditStore {
    /// Create a new empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a ledger holding a single client.
    pub fn with_client(token: impl Into<String>, balance: i64) -> Self {
        let store = Self::new();
        store.write().insert(token.into(), balance);
        store
    }

    /// Snapshot of every call record appended so far.
    pub fn calls(&self) -> Vec<CallRecord> {
        self.read().calls.clone()
    }

    /// Number of registered clients.
    pub fn len(&self) -> usize {
        self.read().clients.len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().clients.is_empty()
    }

    fn read(&self) -> RwLockReadGuard<'_, Inner> {
        self.inner.read().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn write(&self) -> RwLockWriteGuard<'_, Inner> {
        self.inner.write().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Inner {
    fn insert(&mut self, token: String, balance: i64) -> bool {
        if self.clients.contains_key(&token) {
            return false;
        }
        self.next_id += 1;
        self.clients.insert(
            token,
            ClientRow {
                client_id: self.next_id,
                balance,
            },
        );
        true
    }
}

impl CreditStore for MemoryCreditStore {
    fn balance(&self, token: &str) -> Result<Option<i64>, StoreError> {
        Ok(self.read().clients.get(token).map(|row| row.balance))
    }

    #[instrument(skip_all)]
    fn try_debit(&self, token: &str) -> Result<Debit, StoreError> {
        let mut guard = self.write();
        let Some(row) = guard.clients.get_mut(token) else {
            return Ok(Debit::UnknownToken);
        };
        if row.balance <= 0 {
            return Ok(Debit::Insufficient {
                balance: row.balance,
            });
        }
        row.balance -= 1;
        Ok(Debit::Charged {
            client_id: row.client_id,
            remaining: row.balance,
        })
    }

    #[instrument(skip(self, token))]
    fn credit(&self, token: &str, amount: i64) -> Result<Option<i64>, StoreError> {
        let mut guard = self.write();
        let Some(row) = guard.clients.get_mut(token) else {
            return Ok(None);
        };
        row.balance = row
            .balance
            .checked_add(amount)
            .ok_or(StoreError::Overflow {
                client_id: row.client_id,
            })?;
        Ok(Some(row.balance))
    }

    fn record_calls(&self, calls: &[CallRecord]) -> Result<(), StoreError> {
        self.write().calls.extend_from_slice(calls);
        Ok(())
    }

    fn register(&self, token: &str, initial_balance: i64) -> Result<bool, StoreError> {
        Ok(self.write().insert(token.to_string(), initial_balance))
    }

    fn name(&self) -> &str {
        "memory"
    }
}
