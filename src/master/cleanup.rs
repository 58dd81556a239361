//! Cleanup / Interrupt Handler
//!
//! Runs on normal completion, caller interrupt, and collection error. The
//! shared list is snapshotted and deleted in one atomic batch together
//! with this job's start markers; chunks belonging to other masters are
//! then pushed back, so coexistence on a shared queue survives any exit
//! path. The queue-level keys (`Q.live`, `Q.count`) are never touched.

use crate::protocol::{env_key, out_key, queue_key, start_pattern, JobId, TaskChunk};
use crate::store::{Store, StoreOp, StoreReply};

use super::types::DispatchError;

/// Removes every trace of one job from the store, preserving other
/// masters' pending chunks.
pub async fn run(store: &dyn Store, queue: &str, job: &JobId) -> Result<(), DispatchError> {
    let list = queue_key(queue);
    let start_keys = store.keys(&start_pattern(queue, job)).await?;

    let mut ops = vec![
        StoreOp::LRange {
            list: list.clone(),
            start: 0,
            stop: -1,
        },
        StoreOp::Del {
            keys: vec![list.clone()],
        },
    ];
    if !start_keys.is_empty() {
        ops.push(StoreOp::Del { keys: start_keys });
    }

    let replies = store.exec_batch(ops).await?;
    let snapshot = replies
        .into_iter()
        .next()
        .map(StoreReply::into_list)
        .unwrap_or_default();

    let mut restore = Vec::new();
    for raw in snapshot {
        let keep = match serde_json::from_str::<TaskChunk>(&raw) {
            Ok(chunk) => chunk.job != *job,
            // Unknown producer; leave it on the queue.
            Err(_) => true,
        };
        if keep {
            restore.push(StoreOp::RPush {
                list: list.clone(),
                value: raw,
            });
        }
    }
    let preserved = restore.len();
    if !restore.is_empty() {
        store.exec_batch(restore).await?;
    }

    store
        .del(&[env_key(queue, job), out_key(queue, job)])
        .await?;

    tracing::debug!(job = %job, preserved, "job state cleaned up");
    Ok(())
}
