//! Fault Detector & Resubmitter
//!
//! Runs on every collection timeout. A worker that claimed tasks (start
//! marker present) without a live heartbeat (alive key absent) has
//! vanished; its claimed labels are rebuilt from the retained task set and
//! pushed back onto the shared list, and the stale markers are removed in
//! the same batch. When the queue is empty, nothing is claimed, and slots
//! are still missing, the missing slots themselves are resubmitted; this
//! is the silently-lost-result case.
//!
//! Resubmission is at-least-once by design; the collector's delivered-slot
//! gate absorbs any duplicate that results.

use std::collections::HashSet;

use crate::protocol::{
    alive_pattern, alive_prefix, key_suffix, queue_key, start_pattern, start_prefix, JobId,
    StartMarker,
};
use crate::store::{Store, StoreOp};

use super::producer::PreparedTasks;
use super::types::DispatchError;

/// One fault-check tick.
pub async fn check(
    store: &dyn Store,
    queue: &str,
    job: &JobId,
    prepared: &PreparedTasks,
    done: &HashSet<u64>,
) -> Result<(), DispatchError> {
    let started_keys = store.keys(&start_pattern(queue, job)).await?;
    let alive_keys = store.keys(&alive_pattern(queue, job)).await?;

    let start_pre = start_prefix(queue, job);
    let alive_pre = alive_prefix(queue, job);
    let alive: HashSet<&str> = alive_keys
        .iter()
        .filter_map(|key| key_suffix(key, &alive_pre))
        .collect();

    let faulted: Vec<String> = started_keys
        .iter()
        .filter(|key| {
            key_suffix(key, &start_pre).map_or(false, |token| !alive.contains(token))
        })
        .cloned()
        .collect();

    if !faulted.is_empty() {
        resubmit_abandoned(store, queue, job, prepared, faulted).await
    } else if started_keys.is_empty()
        && (done.len() as u64) < prepared.expected_slots as u64
        && store.llen(&queue_key(queue)).await? == 0
    {
        resubmit_missing(store, queue, job, prepared, done).await
    } else {
        Ok(())
    }
}

/// Recovers the claims of vanished workers: reads the markers, deletes
/// them, and re-pushes one chunk per marker with the original labels,
/// all in one atomic batch.
async fn resubmit_abandoned(
    store: &dyn Store,
    queue: &str,
    job: &JobId,
    prepared: &PreparedTasks,
    faulted: Vec<String>,
) -> Result<(), DispatchError> {
    let markers = store.mget(&faulted).await?;

    let mut ops = vec![StoreOp::Del {
        keys: faulted.clone(),
    }];
    let mut resubmitted: Vec<String> = Vec::new();

    for raw in markers.into_iter().flatten() {
        let marker: StartMarker = match serde_json::from_str(&raw) {
            Ok(marker) => marker,
            Err(err) => {
                tracing::warn!(job = %job, error = %err, "unparseable start marker dropped");
                continue;
            }
        };
        if marker.labels.is_empty() {
            continue;
        }
        let chunk = prepared.rebuild_chunk(job, &marker.labels);
        if chunk.entries.is_empty() {
            continue;
        }
        ops.push(StoreOp::RPush {
            list: queue_key(queue),
            value: serde_json::to_string(&chunk)?,
        });
        resubmitted.extend(marker.labels);
    }

    store.exec_batch(ops).await?;
    tracing::warn!(
        job = %job,
        tasks = ?resubmitted,
        "worker fault detected; abandoned tasks resubmitted"
    );
    Ok(())
}

/// Queue empty, nothing claimed, job incomplete: re-push one chunk per
/// missing slot from the retained task set.
async fn resubmit_missing(
    store: &dyn Store,
    queue: &str,
    job: &JobId,
    prepared: &PreparedTasks,
    done: &HashSet<u64>,
) -> Result<(), DispatchError> {
    let mut ops = Vec::new();
    let mut missing: Vec<u64> = Vec::new();

    for slot in 1..=prepared.expected_slots as u64 {
        if done.contains(&slot) {
            continue;
        }
        let chunk = prepared.rebuild_chunk(job, &[slot.to_string()]);
        if chunk.entries.is_empty() {
            continue;
        }
        ops.push(StoreOp::RPush {
            list: queue_key(queue),
            value: serde_json::to_string(&chunk)?,
        });
        missing.push(slot);
    }

    if ops.is_empty() {
        return Ok(());
    }

    store.exec_batch(ops).await?;
    tracing::warn!(
        job = %job,
        slots = ?missing,
        "queue empty with no active workers; missing slots resubmitted"
    );
    Ok(())
}
