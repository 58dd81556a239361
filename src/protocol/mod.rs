//! Wire Contract
//!
//! Defines the key schema and value shapes shared between a master and the
//! workers pulling from its queue. Everything a worker needs to honor lives
//! here: key construction, the task chunk and result chunk formats, and the
//! start-marker shape used for fault detection.
//!
//! ## Key Schema
//! All keys for a queue share the queue name `Q` as prefix:
//!
//! - `Q`: shared FIFO list of pending task chunks (RPUSH to enqueue,
//!   BRPOP to consume).
//! - `Q.live`: empty-string sentinel; exists while some master has the
//!   queue registered.
//! - `Q.count`: advisory worker count, written by workers.
//! - `Q.env.J`: serialized job envelope for job `J`.
//! - `Q.out.J`: result list for job `J`.
//! - `Q.start.J.<tok>`: start marker listing the labels a worker claimed.
//! - `Q.alive.J.<tok>`: worker heartbeat; the master only observes
//!   existence and never writes these.
//!
//! ## Heartbeat contract
//! Workers must refresh their `Q.alive.J.<tok>` key at an interval of at
//! most `ft_interval / 3`. A start marker whose alive key is missing at a
//! fault-check tick is treated as abandoned and its tasks are resubmitted.

use std::collections::BTreeMap;
use std::fmt;

use serde::de::{self, Deserializer};
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;


/// Reserved argument key carrying the per-task RNG stream seed.
///
/// The task producer appends this to every argument tuple so worker-side
/// execution is reproducible independent of worker count.
pub const SEED_KEY: &str = "__rng_stream";

/// Workers must refresh their alive key at least this many times per
/// fault-tolerance interval.
pub const HEARTBEAT_SAFETY_FACTOR: u32 = 3;

/// Unique identifier for one job submission.
/// Wrapper around a hyphen-free UUID so the ID stays safe as a key suffix
/// (alphanumeric only).
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct JobId(pub String);

impl JobId {
    /// Generates a new random job ID.
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// --- Key construction ---

/// Key of the shared pending-task list.
pub fn queue_key(queue: &str) -> String {
    queue.to_string()
}

/// Liveness sentinel key for a registered queue.
pub fn live_key(queue: &str) -> String {
    format!("{}.live", queue)
}

/// Advisory worker-count key.
pub fn count_key(queue: &str) -> String {
    format!("{}.count", queue)
}

/// Envelope key for one job.
pub fn env_key(queue: &str, job: &JobId) -> String {
    format!("{}.env.{}", queue, job)
}

/// Result-list key for one job.
pub fn out_key(queue: &str, job: &JobId) -> String {
    format!("{}.out.{}", queue, job)
}

/// Pattern matching every envelope key on the queue.
pub fn env_pattern(queue: &str) -> String {
    format!("{}.env.*", queue)
}

/// Pattern matching every result list on the queue.
pub fn out_pattern(queue: &str) -> String {
    format!("{}.out.*", queue)
}

/// Prefix of start-marker keys for one job. The part after the prefix is
/// the worker-chosen token.
pub fn start_prefix(queue: &str, job: &JobId) -> String {
    format!("{}.start.{}.", queue, job)
}

/// Pattern matching every start marker for one job.
pub fn start_pattern(queue: &str, job: &JobId) -> String {
    format!("{}.start.{}.*", queue, job)
}

/// Prefix of alive keys for one job.
pub fn alive_prefix(queue: &str, job: &JobId) -> String {
    format!("{}.alive.{}.", queue, job)
}

/// Pattern matching every alive key for one job.
pub fn alive_pattern(queue: &str, job: &JobId) -> String {
    format!("{}.alive.{}.*", queue, job)
}

/// Extracts the worker token from a marker key, given the prefix the key
/// was scanned under. Returns `None` when the key does not carry it.
pub fn key_suffix<'a>(key: &'a str, prefix: &str) -> Option<&'a str> {
    key.strip_prefix(prefix).filter(|s| !s.is_empty())
}

// --- Wire values ---

/// One labeled argument tuple inside a task chunk.
///
/// The label is the task index (as a string) under single-level reduction,
/// or the shared output-slot number under two-level reduction. Labels may
/// repeat within a chunk, which is why chunks carry an ordered list of
/// entries rather than a map.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ChunkEntry {
    pub label: String,
    pub args: Value,
}

/// The unit pushed onto the shared pending-task list.
///
/// Workers route on `job`: a chunk whose job differs from the one they have
/// loaded makes them fetch `Q.env.<job>` and re-seed their environment
/// before executing the entries.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TaskChunk {
    #[serde(rename = "ID")]
    pub job: JobId,
    #[serde(rename = "argsList")]
    pub entries: Vec<ChunkEntry>,
}

impl TaskChunk {
    /// Distinct labels in this chunk, in first-appearance order.
    pub fn labels(&self) -> Vec<String> {
        let mut seen = Vec::new();
        for entry in &self.entries {
            if !seen.contains(&entry.label) {
                seen.push(entry.label.clone());
            }
        }
        seen
    }
}

/// Value a worker writes under its start marker key: the labels it has
/// claimed from a popped chunk. The master reads these back to rebuild and
/// resubmit abandoned work.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StartMarker {
    pub labels: Vec<String>,
}

/// One delivered result: a single-entry `{ slot → value }` map on the wire.
///
/// The slot identifies the output bucket; under two-level reduction a whole
/// chunk collapses into one slot, otherwise slot equals task index.
#[derive(Debug, Clone, PartialEq)]
pub struct ResultChunk {
    pub slot: String,
    pub value: Value,
}

impl ResultChunk {
    pub fn new(slot: impl Into<String>, value: Value) -> Self {
        Self {
            slot: slot.into(),
            value,
        }
    }

    /// Parses the slot label as a slot number.
    pub fn slot_number(&self) -> Option<u64> {
        self.slot.parse().ok()
    }
}

impl Serialize for ResultChunk {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.slot, &self.value)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for ResultChunk {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let entries = BTreeMap::<String, Value>::deserialize(deserializer)?;
        let mut iter = entries.into_iter();
        let (slot, value) = iter
            .next()
            .ok_or_else(|| de::Error::custom("result chunk holds no slot"))?;
        if iter.next().is_some() {
            return Err(de::Error::custom(
                "result chunk must hold exactly one slot",
            ));
        }
        Ok(Self { slot, value })
    }
}
