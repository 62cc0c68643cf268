use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;

use crate::ledger::{CallRecord, CreditStore};

/// Maximum number of records to buffer before flushing, regardless of timer.
const BATCH_SIZE: usize = 100;

/// How often to flush buffered records even if the batch is not full.
const FLUSH_INTERVAL: Duration = Duration::from_secs(1);

/// Records kept for retry after failed flushes; older ones are dropped first.
const MAX_PENDING: usize = 10_000;

/// Spawn a background task that reads `CallRecord` values from the channel
/// and batch-appends them to the ledger's call log.
///
/// The task exits once every sender is dropped and the remaining records
/// have been flushed, so awaiting the returned handle drains the log.
pub fn spawn_call_logger(
    store: Arc<dyn CreditStore>,
    mut rx: mpsc::UnboundedReceiver<CallRecord>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut buffer: Vec<CallRecord> = Vec::with_capacity(BATCH_SIZE);
        let mut interval = tokio::time::interval(FLUSH_INTERVAL);
        // Don't pile up ticks while we're busy flushing.
        interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                record = rx.recv() => {
                    match record {
                        Some(r) => {
                            buffer.push(r);
                            if buffer.len() >= BATCH_SIZE {
                                flush_batch(store.as_ref(), &mut buffer);
                            }
                        }
                        None => {
                            if !buffer.is_empty() {
                                flush_batch(store.as_ref(), &mut buffer);
                            }
                            tracing::info!(unflushed = buffer.len(), "Call logger shutting down");
                            break;
                        }
                    }
                }
                _ = interval.tick() => {
                    if !buffer.is_empty() {
                        flush_batch(store.as_ref(), &mut buffer);
                    }
                }
            }
        }
    })
}

/// Append a batch of call records in one store call.
///
/// If the batch is refused, records are retried one at a time. Records the
/// ledger rejects outright are dropped; the rest stay buffered for the next
/// attempt.
fn flush_batch(store: &dyn CreditStore, buffer: &mut Vec<CallRecord>) {
    let count = buffer.len();

    match store.record_calls(buffer) {
        Ok(()) => {
            buffer.clear();
            tracing::debug!(count, "Flushed call batch");
        }
        Err(e) => {
            tracing::warn!(count, error = %e, "Call batch failed, retrying records individually");
            flush_individually(store, buffer);
            if buffer.len() > MAX_PENDING {
                let dropped = buffer.len() - MAX_PENDING;
                buffer.drain(..dropped);
                tracing::warn!(dropped, "Call log backlog full, dropping oldest records");
            }
        }
    }
}

fn flush_individually(store: &dyn CreditStore, buffer: &mut Vec<CallRecord>) {
    let mut written = 0usize;
    let mut store_down = false;

    buffer.retain(|record| {
        if store_down {
            return true;
        }
        match store.record_calls(std::slice::from_ref(record)) {
            Ok(()) => {
                written += 1;
                false
            }
            Err(e) if e.is_constraint_violation() => {
                tracing::warn!(
                    client_id = record.client_id,
                    error = %e,
                    "Dropping call record rejected by the ledger"
                );
                false
            }
            Err(e) => {
                tracing::error!(error = %e, "Failed to flush call records");
                store_down = true;
                true
            }
        }
    });

    tracing::debug!(written, pending = buffer.len(), "Individual call flush finished");
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
