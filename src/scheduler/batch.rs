//! Fan-out coordinator: probe a batch of targets under a concurrency ceiling.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use crate::db::{CheckOutcome, CheckRecord, DbError, Store, Target};
use crate::probe::Probe;

/// Probe every target concurrently, bounded by `concurrency`, and commit
/// one check record per target in a single transaction.
///
/// A panic while probing one target does not abort the batch; that target
/// is still recorded as DOWN with no response time. Dropping the returned
/// future (scheduler stop) aborts all in-flight probes and commits nothing.
///
/// Returns the number of records committed.
pub async fn run_batch(
    store: &Store,
    prober: Arc<dyn Probe>,
    targets: Vec<Target>,
    concurrency: usize,
) -> Result<usize, DbError> {
    if targets.is_empty() {
        return Ok(0);
    }

    let semaphore = Arc::new(Semaphore::new(concurrency.max(1)));
    let mut probes = JoinSet::new();
    let mut task_targets = HashMap::new();

    for target in targets {
        let semaphore = semaphore.clone();
        let prober = prober.clone();
        let target_id = target.id;

        let handle = probes.spawn(async move {
            // Wait for a free slot before probing
            let _permit = match semaphore.acquire_owned().await {
                Ok(permit) => permit,
                Err(_) => return (CheckOutcome::down(), Utc::now()),
            };

            let outcome = prober.probe(&target.url).await;
            (outcome, Utc::now())
        });
        task_targets.insert(handle.id(), target_id);
    }

    let mut records = Vec::with_capacity(task_targets.len());

    while let Some(joined) = probes.join_next_with_id().await {
        match joined {
            Ok((task_id, (outcome, timestamp))) => {
                let target_id = task_targets[&task_id];
                records.push(CheckRecord {
                    target_id,
                    status: outcome.status,
                    response_time_ms: outcome.response_time_ms,
                    timestamp,
                });
            }
            Err(join_error) => {
                // A probe task panicked; the target still gets a record
                let target_id = task_targets[&join_error.id()];
                tracing::error!("Probe task for target {} failed: {}", target_id, join_error);
                records.push(CheckRecord {
                    target_id,
                    status: crate::db::CheckStatus::Down,
                    response_time_ms: None,
                    timestamp: Utc::now(),
                });
            }
        }
    }

    store.append_records(&records)?;
    Ok(records.len())
}

/// Probe a single target on demand, outside the schedule.
///
/// Returns `None` when the target no longer exists in the directory;
/// otherwise records the outcome and returns the new record.
pub async fn probe_one(
    store: &Store,
    prober: &dyn Probe,
    target_id: i64,
) -> Result<Option<CheckRecord>, DbError> {
    let target = match store.get_target(target_id) {
        Ok(target) => target,
        Err(DbError::NotFound) => return Ok(None),
        Err(e) => return Err(e),
    };

    let outcome = prober.probe(&target.url).await;
    let record = CheckRecord {
        target_id: target.id,
        status: outcome.status,
        response_time_ms: outcome.response_time_ms,
        timestamp: Utc::now(),
    };

    store.append_records(std::slice::from_ref(&record))?;
    Ok(Some(record))
}
