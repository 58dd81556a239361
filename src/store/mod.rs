//! Store Facade
//!
//! A thin, typed view over the shared key/value store. The master never
//! talks to the store directly; every component goes through the [`Store`]
//! trait so the coordinator logic is independent of where the store lives.
//!
//! ## Implementations
//! - [`RedisStore`]: the production path, backed by a Redis-compatible
//!   server via an async connection manager.
//! - [`MemoryStore`]: an in-process store with identical semantics,
//!   including a blocking `brpop`. Used by the test harness and by the
//!   demo binary when no server is configured.
//!
//! Values are opaque serialized blobs; the facade never inspects them.
//! Batches execute atomically (pipeline + MULTI/EXEC on Redis, one
//! critical section in memory) and return replies in submission order.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

pub mod memory;
pub mod redis;

#[cfg(test)]
mod tests;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

/// Errors surfaced by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached at registration time.
    #[error("store connection failed: {0}")]
    ConnectionFailed(String),

    /// A command failed after the connection was established.
    #[error("store operation failed: {0}")]
    Operation(String),
}

impl From<::redis::RedisError> for StoreError {
    fn from(err: ::redis::RedisError) -> Self {
        StoreError::Operation(err.to_string())
    }
}

/// One buffered command inside a batch.
#[derive(Debug, Clone)]
pub enum StoreOp {
    Set { key: String, value: String },
    Del { keys: Vec<String> },
    RPush { list: String, value: String },
    LRange { list: String, start: isize, stop: isize },
}

/// Reply to one batched command, in submission order. Only `LRange`
/// produces data; everything else acknowledges.
#[derive(Debug, Clone, PartialEq)]
pub enum StoreReply {
    Done,
    List(Vec<String>),
}

impl StoreReply {
    /// Unwraps a list reply, treating anything else as empty.
    pub fn into_list(self) -> Vec<String> {
        match self {
            StoreReply::List(items) => items,
            StoreReply::Done => Vec::new(),
        }
    }
}

/// The primitive operations the coordinator needs from the shared store.
#[async_trait]
pub trait Store: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    async fn del(&self, keys: &[String]) -> Result<(), StoreError>;

    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Keys matching a glob pattern. Only the trailing-`*` form is used by
    /// the coordinator.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Multi-get; absent keys come back as `None` in position.
    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError>;

    /// Appends to the tail of a list.
    async fn rpush(&self, list: &str, value: &str) -> Result<(), StoreError>;

    /// Blocking tail pop with timeout. `None` means the timeout elapsed
    /// with nothing to pop.
    async fn brpop(&self, list: &str, timeout: Duration) -> Result<Option<String>, StoreError>;

    async fn llen(&self, list: &str) -> Result<usize, StoreError>;

    async fn lrange(
        &self,
        list: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError>;

    /// Executes a buffered command sequence atomically, returning one reply
    /// per command in submission order.
    async fn exec_batch(&self, ops: Vec<StoreOp>) -> Result<Vec<StoreReply>, StoreError>;
}
