//! Public types of the master coordinator.

use serde_json::Value;
use std::collections::BTreeMap;
use thiserror::Error;

use crate::envelope::EnvelopeError;
use crate::registry::CombineFn;
use crate::store::StoreError;

/// Constant identifier reported by `info(Name)`.
pub const SYSTEM_NAME: &str = "redispatch";

/// Errors surfaced by submission and queue management.
#[derive(Debug, Error)]
pub enum DispatchError {
    /// The store could not be reached at registration.
    #[error("store unavailable: {0}")]
    StoreUnavailable(String),

    /// A store operation failed mid-job.
    #[error(transparent)]
    Store(#[from] StoreError),

    /// Envelope construction failed; nothing was written.
    #[error(transparent)]
    Envelope(#[from] EnvelopeError),

    /// The combine rejected a delivered value and the job policy is
    /// `Stop`.
    #[error("combine failed at slot {slot}: {message}")]
    Combine { slot: u64, message: String },

    /// The caller interrupted the submission; cleanup already ran.
    #[error("submission interrupted")]
    Interrupted,

    /// A value produced by this master failed to serialize.
    #[error("wire serialization failed: {0}")]
    Wire(#[from] serde_json::Error),
}

/// What a captured combine error does to the final return.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ErrorPolicy {
    /// The first captured combine error fails the submission after the
    /// drain completes.
    #[default]
    Stop,
    /// Combine errors ride along in the outcome as slot markers.
    Pass,
}

/// One job submission: the opaque task body, the caller's scope, and the
/// combine folding results back together.
#[derive(Clone)]
pub struct JobSpec {
    /// Pre-serialized task body; never inspected by the master.
    pub expr: Value,
    /// Ordered argument tuples, one per task.
    pub args: Vec<Value>,
    /// The caller's variable bindings, used to resolve exports.
    pub bindings: BTreeMap<String, Value>,
    /// Free symbols of `expr`, produced by external introspection.
    pub free_symbols: Vec<String>,
    /// Per-job explicit exports.
    pub export: Vec<String>,
    /// Symbols excluded from auto-discovery.
    pub no_export: Vec<String>,
    /// Packages required on top of the registry-wide list.
    pub packages: Vec<String>,
    /// Master-side fold over delivered results.
    pub combine: CombineFn,
    /// Serialized form of `combine` for workers; required when the
    /// registry reduce mode is `Same`.
    pub combine_blob: Option<Value>,
    /// Combine-error policy.
    pub error_policy: ErrorPolicy,
}

impl JobSpec {
    pub fn new(expr: Value, combine: CombineFn) -> Self {
        Self {
            expr,
            args: Vec::new(),
            bindings: BTreeMap::new(),
            free_symbols: Vec::new(),
            export: Vec::new(),
            no_export: Vec::new(),
            packages: Vec::new(),
            combine,
            combine_blob: None,
            error_policy: ErrorPolicy::default(),
        }
    }

    pub fn with_args(mut self, args: Vec<Value>) -> Self {
        self.args = args;
        self
    }

    pub fn with_bindings(mut self, bindings: BTreeMap<String, Value>) -> Self {
        self.bindings = bindings;
        self
    }

    pub fn with_free_symbols<I, S>(mut self, symbols: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.free_symbols = symbols.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_export<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.export = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_no_export<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.no_export = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_packages<I, S>(mut self, packages: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.packages = packages.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_combine_blob(mut self, blob: Value) -> Self {
        self.combine_blob = Some(blob);
        self
    }

    pub fn with_error_policy(mut self, policy: ErrorPolicy) -> Self {
        self.error_policy = policy;
        self
    }
}

/// A combine failure recorded against its output slot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SlotError {
    pub slot: u64,
    pub message: String,
}

/// The reduced result of a completed job.
///
/// `value` is `None` only for empty jobs. Under `ErrorPolicy::Pass` the
/// captured combine errors ride along here instead of failing the call.
#[derive(Debug, Clone)]
pub struct JobOutcome {
    pub value: Option<Value>,
    pub combine_errors: Vec<SlotError>,
}

/// Items reported by `info`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InfoItem {
    /// Advisory worker count from `Q.count`.
    Workers,
    /// Constant system identifier.
    Name,
    /// Build version.
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InfoValue {
    Workers(usize),
    Name(&'static str),
    Version(&'static str),
}

/// Advisory queue statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct QueueStats {
    /// Chunks waiting on the shared list.
    pub pending_chunks: usize,
    /// Advisory worker count, when any worker has written it.
    pub workers: Option<usize>,
}
