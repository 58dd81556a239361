//! Elastic Work-Queue Master
//!
//! This library implements the master side of an elastic work-queue
//! protocol over a Redis-compatible key/value store. A master submits a
//! job of many independent tasks, streams them onto a shared list,
//! collects results in arbitrary order, resubmits work whose workers
//! vanished, and folds everything into an in-order reduction, with an
//! optional two-level combine (once on each worker, once on the master).
//!
//! ## Architecture Modules
//! The crate is composed of five loosely coupled subsystems:
//!
//! - **`store`**: The store facade. A typed trait over the key/value
//!   primitives (strings, lists, scans, atomic batches) with a Redis
//!   implementation and an in-process one with identical semantics.
//! - **`protocol`**: The wire contract shared with workers: the key
//!   schema, task chunk and result chunk shapes, and the start-marker
//!   format driving fault detection.
//! - **`registry`**: Per-master queue configuration: chunking, exports,
//!   packages, the reduction mode, and the fault-tolerance interval.
//! - **`envelope`**: The job envelope builder. Resolves the caller's
//!   bindings into the serialized context workers load before executing
//!   a task body.
//! - **`master`**: The coordinator. Produces seeded task chunks, collects
//!   and reduces results under a fault detector, and cleans the job out
//!   of the store on every exit path, preserving other masters' work.

pub mod envelope;
pub mod master;
pub mod protocol;
pub mod registry;
pub mod store;

pub use envelope::{Envelope, EnvelopeError};
pub use master::{
    DispatchError, ErrorPolicy, InfoItem, InfoValue, JobOutcome, JobSpec, Master, QueueStats,
    RegisterOptions, SeedSource, SlotError, StreamSeeds,
};
pub use protocol::{ChunkEntry, JobId, ResultChunk, StartMarker, TaskChunk};
pub use registry::{CombineFn, QueueConfig, Reduce, ReduceSpec};
pub use store::{MemoryStore, RedisStore, Store, StoreError};
