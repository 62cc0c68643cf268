//! Credit ledger: durable token → balance mapping plus the call log.

pub mod memory;
pub mod sqlite;

use chrono::{DateTime, Utc};
use serde::Serialize;

pub use self::memory::MemoryCreditStore;
pub use self::sqlite::SqliteCreditStore;

/// Errors raised by a ledger backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Applying a credit would overflow the balance column.
    #[error("Balance overflow for client {client_id}")]
    Overflow { client_id: i64 },
}

impl StoreError {
    /// The ledger refused the data itself (e.g. a call for a client that no
    /// longer exists). Retrying the same write will fail the same way.
    pub fn is_constraint_violation(&self) -> bool {
        matches!(
            self,
            Self::Database(rusqlite::Error::SqliteFailure(err, _))
                if err.code == rusqlite::ErrorCode::ConstraintViolation
        )
    }
}

/// One served content request, appended to the call log.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CallRecord {
    pub client_id: i64,
    pub timestamp: DateTime<Utc>,
}

impl CallRecord {
    pub fn now(client_id: i64) -> Self {
        Self {
            client_id,
            timestamp: Utc::now(),
        }
    }
}

/// Outcome of a conditional debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Debit {
    /// One credit was taken; `remaining` is the balance after the debit.
    Charged { client_id: i64, remaining: i64 },
    /// The client exists but has no credit left. Nothing was written.
    Insufficient { balance: i64 },
    /// No client holds this token. Nothing was written.
    UnknownToken,
}

/// Storage contract the metering core depends on.
///
/// Implementations must make [`CreditStore::try_debit`] a single atomic
/// check-and-decrement: two concurrent debits against a balance of 1 must
/// yield exactly one `Charged`.
pub trait CreditStore: Send + Sync {
    /// Current balance for `token`, or `None` if no client holds it.
    fn balance(&self, token: &str) -> Result<Option<i64>, StoreError>;

    /// Take one credit from `token` if and only if its balance is positive.
    fn try_debit(&self, token: &str) -> Result<Debit, StoreError>;

    /// Add `amount` (which may be negative) to the balance. Returns the new
    /// balance, or `None` if no client holds `token`.
    fn credit(&self, token: &str, amount: i64) -> Result<Option<i64>, StoreError>;

    /// Append call records to the audit log.
    fn record_calls(&self, calls: &[CallRecord]) -> Result<(), StoreError>;

    /// Create a client with an initial balance. Existing clients are left
    /// untouched; returns whether a new client was created.
    fn register(&self, token: &str, initial_balance: i64) -> Result<bool, StoreError>;

    /// Get the name of this storage backend.
    fn name(&self) -> &str;
}
