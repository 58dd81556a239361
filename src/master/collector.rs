//! Result Collector & Reducer
//!
//! Blocks on the job's result list and folds every delivered slot through
//! the combine. A pop timeout hands control to the fault detector, then
//! collection resumes. Slots already delivered are dropped before they
//! reach the accumulator, which makes duplicate delivery from the
//! resubmission paths harmless.

use std::collections::{BTreeMap, HashSet};
use std::time::Duration;

use serde_json::Value;

use crate::protocol::{out_key, JobId, ResultChunk};
use crate::registry::CombineFn;
use crate::store::Store;

use super::faults;
use super::producer::PreparedTasks;
use super::types::{DispatchError, SlotError};

/// Folds delivered values into the running result.
///
/// Ordered mode (single-level reduction) buffers out-of-order slots and
/// folds the contiguous prefix as it becomes available, so an
/// order-sensitive combine sees slots 1..M in sequence. Unordered mode
/// (two-level reduction) folds in arrival order.
pub struct Accumulator {
    combine: CombineFn,
    ordered: bool,
    pending: BTreeMap<u64, Value>,
    next: u64,
    acc: Option<Value>,
    errors: Vec<SlotError>,
}

impl Accumulator {
    pub fn new(combine: CombineFn, ordered: bool) -> Self {
        Self {
            combine,
            ordered,
            pending: BTreeMap::new(),
            next: 1,
            acc: None,
            errors: Vec::new(),
        }
    }

    /// Feeds one delivered slot.
    pub fn deliver(&mut self, slot: u64, value: Value) {
        if self.ordered {
            self.pending.insert(slot, value);
            while let Some(next_value) = self.pending.remove(&self.next) {
                let slot = self.next;
                self.fold(slot, next_value);
                self.next += 1;
            }
        } else {
            self.fold(slot, value);
        }
    }

    fn fold(&mut self, slot: u64, value: Value) {
        match self.acc.take() {
            None => self.acc = Some(value),
            Some(acc) => match (self.combine)(acc.clone(), value) {
                Ok(folded) => self.acc = Some(folded),
                Err(err) => {
                    tracing::warn!(slot, error = %err, "combine failed; slot recorded");
                    self.errors.push(SlotError {
                        slot,
                        message: err.to_string(),
                    });
                    self.acc = Some(acc);
                }
            },
        }
    }

    /// Final value and the captured combine errors.
    pub fn finish(self) -> (Option<Value>, Vec<SlotError>) {
        (self.acc, self.errors)
    }
}

/// Runs the collection loop until every expected slot has arrived.
pub async fn collect(
    store: &dyn Store,
    queue: &str,
    job: &JobId,
    prepared: &PreparedTasks,
    ft_interval: Duration,
    acc: &mut Accumulator,
) -> Result<(), DispatchError> {
    let out = out_key(queue, job);
    let expected = prepared.expected_slots as u64;
    let mut done: HashSet<u64> = HashSet::new();

    while (done.len() as u64) < expected {
        match store.brpop(&out, ft_interval).await? {
            Some(raw) => {
                let chunk: ResultChunk = match serde_json::from_str(&raw) {
                    Ok(chunk) => chunk,
                    Err(err) => {
                        tracing::warn!(job = %job, error = %err, "unparseable result dropped");
                        continue;
                    }
                };
                let Some(slot) = chunk.slot_number() else {
                    tracing::warn!(job = %job, slot = %chunk.slot, "non-numeric slot dropped");
                    continue;
                };
                if slot == 0 || slot > expected {
                    tracing::warn!(job = %job, slot, "out-of-range slot dropped");
                    continue;
                }
                if !done.insert(slot) {
                    tracing::debug!(job = %job, slot, "duplicate delivery dropped");
                    continue;
                }
                acc.deliver(slot, chunk.value);
            }
            None => {
                faults::check(store, queue, job, prepared, &done).await?;
            }
        }
    }

    Ok(())
}
