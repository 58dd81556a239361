//! Task Producer
//!
//! Materializes the caller's argument tuples into a 1-indexed task
//! sequence, seeds each tuple with its RNG stream, groups consecutive
//! indices into chunks, and pushes them tail-ward onto the shared list in
//! index order through one atomic batch.

use serde_json::{json, Value};

use crate::protocol::{queue_key, ChunkEntry, JobId, TaskChunk, SEED_KEY};
use crate::store::{Store, StoreOp};

use super::seed::SeedSource;
use super::types::DispatchError;

/// The prepared task set for one job. Retained by the master for the whole
/// collection so abandoned or lost work can be rebuilt and resubmitted.
pub struct PreparedTasks {
    pub chunks: Vec<TaskChunk>,
    /// Number of task indices (`N`).
    pub total_tasks: usize,
    /// Number of output slots the collector waits for (`M`): the chunk
    /// count under two-level reduction, else `N`.
    pub expected_slots: usize,
}

impl PreparedTasks {
    /// All retained entries carrying a label.
    pub fn entries_for_label(&self, label: &str) -> Vec<ChunkEntry> {
        self.chunks
            .iter()
            .flat_map(|chunk| chunk.entries.iter())
            .filter(|entry| entry.label == label)
            .cloned()
            .collect()
    }

    /// Rebuilds one chunk covering the given labels, preserving them as
    /// entry keys. Used by the fault paths.
    pub fn rebuild_chunk(&self, job: &JobId, labels: &[String]) -> TaskChunk {
        let entries = labels
            .iter()
            .flat_map(|label| self.entries_for_label(label))
            .collect();
        TaskChunk {
            job: job.clone(),
            entries,
        }
    }
}

/// Builds the seeded, labeled, chunked task sequence.
pub fn prepare(
    job: &JobId,
    args: &[Value],
    chunk_size: usize,
    two_level: bool,
    seeds: &mut dyn SeedSource,
) -> PreparedTasks {
    let total = args.len();
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::new();

    let mut index = 0;
    let mut chunk_no = 0u64;
    while index < total {
        chunk_no += 1;
        let end = (index + chunk_size).min(total);
        let entries = (index..end)
            .map(|i| {
                let task_index = (i + 1) as u64;
                let label = if two_level { chunk_no } else { task_index };
                ChunkEntry {
                    label: label.to_string(),
                    args: seed_args(&args[i], seeds.next_stream()),
                }
            })
            .collect();
        chunks.push(TaskChunk {
            job: job.clone(),
            entries,
        });
        index = end;
    }

    let expected_slots = if two_level { chunks.len() } else { total };
    PreparedTasks {
        chunks,
        total_tasks: total,
        expected_slots,
    }
}

/// Appends the RNG stream under the reserved key. Non-object tuples are
/// wrapped so the seed has somewhere to live.
fn seed_args(args: &Value, seed: Value) -> Value {
    match args {
        Value::Object(map) => {
            let mut seeded = map.clone();
            seeded.insert(SEED_KEY.to_string(), seed);
            Value::Object(seeded)
        }
        other => json!({ "value": other, SEED_KEY: seed }),
    }
}

/// Pushes every chunk onto the shared list, in index order, atomically.
pub async fn push_chunks(
    store: &dyn Store,
    queue: &str,
    prepared: &PreparedTasks,
) -> Result<(), DispatchError> {
    if prepared.chunks.is_empty() {
        return Ok(());
    }

    let list = queue_key(queue);
    let mut ops = Vec::with_capacity(prepared.chunks.len());
    for chunk in &prepared.chunks {
        ops.push(StoreOp::RPush {
            list: list.clone(),
            value: serde_json::to_string(chunk)?,
        });
    }
    store.exec_batch(ops).await?;
    Ok(())
}
