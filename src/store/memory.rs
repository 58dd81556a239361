//! In-process store facade.
//!
//! Mirrors the remote store's semantics on local maps so the coordinator
//! can run (and be tested) without a server. Strings and lists live in
//! separate keyspaces the way the coordinator uses them; a shared mutex
//! gives batches the same all-or-nothing behavior MULTI/EXEC provides,
//! and a notifier wakes blocked `brpop` callers when a push lands.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Notify;
use tokio::time::Instant;

use super::{Store, StoreError, StoreOp, StoreReply};

#[derive(Default)]
pub struct MemoryStore {
    strings: DashMap<String, String>,
    lists: DashMap<String, VecDeque<String>>,
    // Held for the synchronous part of every operation; batches stay
    // invisible to concurrent poppers until they complete.
    guard: Mutex<()>,
    pushed: Notify,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn matches(key: &str, pattern: &str) -> bool {
        match pattern.strip_suffix('*') {
            Some(prefix) => key.starts_with(prefix),
            None => key == pattern,
        }
    }

    fn pop_tail(&self, list: &str) -> Option<String> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut items = self.lists.get_mut(list)?;
        let value = items.pop_back();
        if items.is_empty() {
            drop(items);
            self.lists.remove(list);
        }
        value
    }

    fn apply(&self, op: &StoreOp) -> StoreReply {
        match op {
            StoreOp::Set { key, value } => {
                self.strings.insert(key.clone(), value.clone());
                StoreReply::Done
            }
            StoreOp::Del { keys } => {
                for key in keys {
                    self.strings.remove(key);
                    self.lists.remove(key);
                }
                StoreReply::Done
            }
            StoreOp::RPush { list, value } => {
                self.lists
                    .entry(list.clone())
                    .or_default()
                    .push_back(value.clone());
                StoreReply::Done
            }
            StoreOp::LRange { list, start, stop } => {
                let items = self
                    .lists
                    .get(list)
                    .map(|l| range_of(&l, *start, *stop))
                    .unwrap_or_default();
                StoreReply::List(items)
            }
        }
    }
}

/// Resolves Redis-style inclusive range indices (negative counts from the
/// tail) against a list.
fn range_of(items: &VecDeque<String>, start: isize, stop: isize) -> Vec<String> {
    let len = items.len() as isize;
    if len == 0 {
        return Vec::new();
    }
    let norm = |i: isize| -> isize {
        if i < 0 {
            len + i
        } else {
            i
        }
    };
    let start = norm(start).max(0);
    let stop = norm(stop).min(len - 1);
    if start > stop || start >= len {
        return Vec::new();
    }
    items
        .iter()
        .skip(start as usize)
        .take((stop - start + 1) as usize)
        .cloned()
        .collect()
}

#[async_trait]
impl Store for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.strings.get(key).map(|v| v.clone()))
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        self.strings.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        for key in keys {
            self.strings.remove(key);
            self.lists.remove(key);
        }
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.strings.contains_key(key) || self.lists.contains_key(key))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        let mut found: Vec<String> = self
            .strings
            .iter()
            .map(|e| e.key().clone())
            .chain(self.lists.iter().map(|e| e.key().clone()))
            .filter(|key| Self::matches(key, pattern))
            .collect();
        found.sort();
        found.dedup();
        Ok(found)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(keys
            .iter()
            .map(|key| self.strings.get(key).map(|v| v.clone()))
            .collect())
    }

    async fn rpush(&self, list: &str, value: &str) -> Result<(), StoreError> {
        {
            let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
            self.lists
                .entry(list.to_string())
                .or_default()
                .push_back(value.to_string());
        }
        self.pushed.notify_waiters();
        Ok(())
    }

    async fn brpop(&self, list: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let deadline = Instant::now() + timeout;

        loop {
            // Register for wakeups before checking, so a push between the
            // check and the await is not missed.
            let notified = self.pushed.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(value) = self.pop_tail(list) {
                return Ok(Some(value));
            }

            let now = Instant::now();
            if now >= deadline {
                return Ok(None);
            }

            tokio::select! {
                _ = &mut notified => {}
                _ = tokio::time::sleep_until(deadline) => return Ok(None),
            }
        }
    }

    async fn llen(&self, list: &str) -> Result<usize, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self.lists.get(list).map(|l| l.len()).unwrap_or(0))
    }

    async fn lrange(
        &self,
        list: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
        Ok(self
            .lists
            .get(list)
            .map(|l| range_of(&l, start, stop))
            .unwrap_or_default())
    }

    async fn exec_batch(&self, ops: Vec<StoreOp>) -> Result<Vec<StoreReply>, StoreError> {
        let replies = {
            let _held = self.guard.lock().unwrap_or_else(|e| e.into_inner());
            ops.iter().map(|op| self.apply(op)).collect()
        };
        self.pushed.notify_waiters();
        Ok(replies)
    }
}
