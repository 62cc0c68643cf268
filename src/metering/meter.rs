use std::sync::Arc;

use tokio::sync::mpsc;

use crate::ledger::{CallRecord, CreditStore, Debit, StoreError};

/// Outcome of a metering operation that did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum MeteringError {
    #[error("Unknown auth token")]
    UnknownToken,

    #[error("Insufficient credit (balance {balance})")]
    InsufficientCredit { balance: i64 },

    /// Only raised when non-positive credits are rejected by configuration.
    #[error("Credit amount must be positive, got {0}")]
    InvalidAmount(i64),

    #[error(transparent)]
    Store(#[from] StoreError),
}

/// A successful debit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consumed {
    pub client_id: i64,
    /// Balance left after this request was billed.
    pub remaining: i64,
}

/// Authorization and metering core.
///
/// Gates each content request on the caller's credit balance, debits one
/// credit per served request and hands a call record to the call logger.
pub struct Meter {
    store: Arc<dyn CreditStore>,
    calls_tx: mpsc::UnboundedSender<CallRecord>,
    reject_non_positive_credit: bool,
}

impl Meter {
    pub fn new(store: Arc<dyn CreditStore>, calls_tx: mpsc::UnboundedSender<CallRecord>) -> Self {
        Self {
            store,
            calls_tx,
            reject_non_positive_credit: false,
        }
    }

    /// Refuse credits of zero or less instead of applying them.
    pub fn reject_non_positive_credit(mut self, reject: bool) -> Self {
        self.reject_non_positive_credit = reject;
        self
    }

    pub fn store(&self) -> &Arc<dyn CreditStore> {
        &self.store
    }

    /// Check the balance, take one credit and record the call.
    ///
    /// The check and the debit are a single conditional update in the store,
    /// so concurrent requests on one token can never overspend it. Recording
    /// the call is best-effort: a failure is logged and the request still
    /// succeeds.
    pub fn check_and_consume(&self, token: &str) -> Result<Consumed, MeteringError> {
        match self.store.try_debit(token)? {
            Debit::Charged {
                client_id,
                remaining,
            } => {
                tracing::debug!(client_id, remaining, "Credit consumed");
                if self.calls_tx.send(CallRecord::now(client_id)).is_err() {
                    tracing::warn!(client_id, "Call logger unavailable, call not recorded");
                }
                Ok(Consumed {
                    client_id,
                    remaining,
                })
            }
            Debit::Insufficient { balance } => {
                tracing::info!(balance, "Rejecting request: insufficient credit");
                Err(MeteringError::InsufficientCredit { balance })
            }
            Debit::UnknownToken => Err(MeteringError::UnknownToken),
        }
    }

    /// Add `amount` to the balance and return the new balance.
    pub fn credit(&self, token: &str, amount: i64) -> Result<i64, MeteringError> {
        if amount <= 0 {
            if self.reject_non_positive_credit {
                return Err(MeteringError::InvalidAmount(amount));
            }
            tracing::warn!(amount, "Applying non-positive credit");
        }

        let balance = self
            .store
            .credit(token, amount)?
            .ok_or(MeteringError::UnknownToken)?;
        tracing::info!(amount, balance, "Credit added");
        Ok(balance)
    }

    /// Current balance, read-only.
    pub fn balance(&self, token: &str) -> Result<i64, MeteringError> {
        self.store
            .balance(token)?
            .ok_or(MeteringError::UnknownToken)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
