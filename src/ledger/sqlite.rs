use rusqlite::{OptionalExtension, Transaction, TransactionBehavior, params};

use super::{CallRecord, CreditStore, Debit, StoreError};
use crate::db::Database;

/// Timestamp layout for `api_calls.timestamp`.
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S%.3f";

/// Ledger backed by the `clients` and `api_calls` tables.
#[derive(Clone)]
pub struct SqliteCreditStore {
    db: Database,
}

impl SqliteCreditStore {
    pub fn new(db: Database) -> Self {
        Self { db }
    }

    pub fn db(&self) -> &Database {
        &self.db
    }
}

impl CreditStore for SqliteCreditStore {
    fn balance(&self, token: &str) -> Result<Option<i64>, StoreError> {
        let balance = self.db.with_conn(|conn| {
            conn.query_row(
                "SELECT token_balance FROM clients WHERE auth_token = ?1",
                params![token],
                |row| row.get(0),
            )
            .optional()
        })?;
        Ok(balance)
    }

    fn try_debit(&self, token: &str) -> Result<Debit, StoreError> {
        let debit = self.db.with_conn(|conn| {
            // The balance guard lives in the WHERE clause, so the check and the
            // decrement are one statement even across processes sharing the file.
            let charged = conn
                .query_row(
                    "UPDATE clients SET token_balance = token_balance - 1 \
                     WHERE auth_token = ?1 AND token_balance > 0 \
                     RETURNING client_id, token_balance",
                    params![token],
                    |row| {
                        Ok(Debit::Charged {
                            client_id: row.get(0)?,
                            remaining: row.get(1)?,
                        })
                    },
                )
                .optional()?;

            if let Some(debit) = charged {
                return Ok(debit);
            }

            let balance: Option<i64> = conn
                .query_row(
                    "SELECT token_balance FROM clients WHERE auth_token = ?1",
                    params![token],
                    |row| row.get(0),
                )
                .optional()?;

            Ok(match balance {
                Some(balance) => Debit::Insufficient { balance },
                None => Debit::UnknownToken,
            })
        })?;
        Ok(debit)
    }

    fn credit(&self, token: &str, amount: i64) -> Result<Option<i64>, StoreError> {
        self.db
            .with_conn(|conn| {
                // SQLite silently promotes overflowing integer sums to REAL, so
                // the new balance is computed here and written back explicitly.
                let tx = Transaction::new_unchecked(conn, TransactionBehavior::Immediate)?;

                let current: Option<(i64, i64)> = tx
                    .query_row(
                        "SELECT client_id, token_balance FROM clients WHERE auth_token = ?1",
                        params![token],
                        |row| Ok((row.get(0)?, row.get(1)?)),
                    )
                    .optional()?;

                let Some((client_id, balance)) = current else {
                    return Ok(Ok(None));
                };

                let Some(updated) = balance.checked_add(amount) else {
                    return Ok(Err(StoreError::Overflow { client_id }));
                };

                tx.execute(
                    "UPDATE clients SET token_balance = ?1 WHERE client_id = ?2",
                    params![updated, client_id],
                )?;
                tx.commit()?;
                Ok(Ok(Some(updated)))
            })?
    }

    fn record_calls(&self, calls: &[CallRecord]) -> Result<(), StoreError> {
        self.db.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;
            {
                let mut insert_stmt = tx.prepare_cached(
                    "INSERT INTO api_calls (client_id, timestamp) VALUES (?1, ?2)",
                )?;
                for call in calls {
                    insert_stmt.execute(params![
                        call.client_id,
                        call.timestamp.format(TIMESTAMP_FORMAT).to_string(),
                    ])?;
                }
            }
            tx.commit()
        })?;
        Ok(())
    }

    fn register(&self, token: &str, initial_balance: i64) -> Result<bool, StoreError> {
        let inserted = self.db.with_conn(|conn| {
            conn.execute(
                "INSERT INTO clients (auth_token, token_balance) VALUES (?1, ?2) \
                 ON CONFLICT(auth_token) DO NOTHING",
                params![token, initial_balance],
            )
        })?;
        Ok(inserted == 1)
    }

    fn name(&self) -> &str {
        "sqlite"
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
