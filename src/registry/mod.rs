//! Queue Registry
//!
//! Per-master configuration for the active queue: chunking, explicit
//! exports, worker packages, the reduction mode, and the fault-tolerance
//! interval. One registry belongs to one master context; registration
//! fills it in and teardown clears the queue it points at.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use serde_json::Value;

#[cfg(test)]
mod tests;

/// Master-side combine: folds the next delivered value into the
/// accumulator. The first delivered value seeds the accumulator, so the
/// function is never called with an empty one.
pub type CombineFn = Arc<dyn Fn(Value, Value) -> anyhow::Result<Value> + Send + Sync>;

/// Worker-side reduction mode.
///
/// Two-level reduction runs a combine inside each worker over its chunk
/// and a global combine on the master over the per-chunk results.
#[derive(Clone, Default)]
pub enum Reduce {
    /// Single-level: every task index is its own output slot.
    #[default]
    None,
    /// Two-level, reusing the combine handed to `submit`.
    Same,
    /// Two-level with a dedicated reduction.
    Explicit(ReduceSpec),
}

impl Reduce {
    /// Whether chunks collapse into one output slot each.
    pub fn is_two_level(&self) -> bool {
        !matches!(self, Reduce::None)
    }
}

/// A dedicated two-level reduction: the master-side fold plus the
/// serialized form shipped to workers inside the envelope. The blob must
/// arrive already stripped of master-side state.
#[derive(Clone)]
pub struct ReduceSpec {
    pub func: CombineFn,
    pub worker_blob: Value,
}

/// Smallest accepted fault-tolerance interval.
pub const MIN_FT_INTERVAL: Duration = Duration::from_secs(3);

/// Default fault-tolerance interval.
pub const DEFAULT_FT_INTERVAL: Duration = Duration::from_secs(30);

/// Default cap on the serialized envelope.
pub const DEFAULT_MAX_ENVELOPE_BYTES: usize = 500 * 1024 * 1024;

/// Configuration for the active queue.
#[derive(Clone)]
pub struct QueueConfig {
    /// Queue name; the prefix of every key this master touches.
    pub queue: String,
    /// Maximum task indices per pushed chunk.
    pub chunk_size: usize,
    /// Names always exported into job envelopes, beyond per-job exports.
    pub export: BTreeSet<String>,
    /// Packages workers load before executing a task body.
    pub packages: Vec<String>,
    /// Worker-side reduction mode.
    pub reduce: Reduce,
    /// Blocking-pop timeout and fault-check period.
    pub ft_interval: Duration,
    /// Cap on the serialized envelope size.
    pub max_envelope_bytes: usize,
}

impl QueueConfig {
    pub fn new(queue: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            chunk_size: 1,
            export: BTreeSet::new(),
            packages: Vec::new(),
            reduce: Reduce::None,
            ft_interval: DEFAULT_FT_INTERVAL,
            max_envelope_bytes: DEFAULT_MAX_ENVELOPE_BYTES,
        }
    }

    /// Sets the chunk size. Zero is lifted to one.
    pub fn set_chunk_size(&mut self, size: usize) {
        if size == 0 {
            tracing::warn!("chunk size 0 requested; using 1");
        }
        self.chunk_size = size.max(1);
    }

    /// Sets the fault-tolerance interval, clamped to the minimum.
    pub fn set_ft_interval(&mut self, interval: Duration) {
        if interval < MIN_FT_INTERVAL {
            tracing::warn!(
                "fault-tolerance interval {:?} below minimum; using {:?}",
                interval,
                MIN_FT_INTERVAL
            );
        }
        self.ft_interval = interval.max(MIN_FT_INTERVAL);
    }

    pub fn set_reduce(&mut self, reduce: Reduce) {
        self.reduce = reduce;
    }

    /// Overrides the envelope size cap.
    pub fn set_max_envelope_bytes(&mut self, bytes: usize) {
        self.max_envelope_bytes = bytes;
    }

    pub fn set_export<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.export = names.into_iter().map(Into::into).collect();
    }

    pub fn set_packages<I, S>(&mut self, packages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages = packages.into_iter().map(Into::into).collect();
    }
}
