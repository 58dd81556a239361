//! Redis-backed store facade.
//!
//! Wraps an async connection manager (which reconnects on its own) and maps
//! each facade primitive onto the corresponding Redis command. Batches run
//! as a pipeline wrapped in MULTI/EXEC so they execute atomically.

use std::time::Duration;

use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;

use super::{Store, StoreError, StoreOp, StoreReply};

pub struct RedisStore {
    conn: ConnectionManager,
}

impl RedisStore {
    /// Connects to the server. Fails fast when it is unreachable, so
    /// registration surfaces the outage immediately.
    pub async fn connect(url: &str) -> Result<Self, StoreError> {
        let client =
            redis::Client::open(url).map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        let conn = ConnectionManager::new(client)
            .await
            .map_err(|e| StoreError::ConnectionFailed(e.to_string()))?;

        Ok(Self { conn })
    }

    /// Builds a connection URL from host/port and an optional password.
    pub fn url(host: &str, port: u16, password: Option<&str>) -> String {
        match password {
            Some(pass) => format!("redis://:{}@{}:{}", pass, host, port),
            None => format!("redis://{}:{}", host, port),
        }
    }
}

#[async_trait]
impl Store for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn del(&self, keys: &[String]) -> Result<(), StoreError> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut conn = self.conn.clone();
        conn.del::<_, ()>(keys).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        let mut conn = self.conn.clone();
        let found: bool = conn.exists(key).await?;
        Ok(found)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let keys: Vec<String> = conn.keys(pattern).await?;
        Ok(keys)
    }

    async fn mget(&self, keys: &[String]) -> Result<Vec<Option<String>>, StoreError> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut conn = self.conn.clone();
        let values: Vec<Option<String>> = redis::cmd("MGET")
            .arg(keys)
            .query_async(&mut conn)
            .await?;
        Ok(values)
    }

    async fn rpush(&self, list: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.conn.clone();
        conn.rpush::<_, _, ()>(list, value).await?;
        Ok(())
    }

    async fn brpop(&self, list: &str, timeout: Duration) -> Result<Option<String>, StoreError> {
        let mut conn = self.conn.clone();
        let timeout_secs = timeout.as_secs().max(1) as usize;

        // BRPOP replies with a (key, value) pair, or nil on timeout.
        let popped: Option<(String, String)> = redis::cmd("BRPOP")
            .arg(list)
            .arg(timeout_secs)
            .query_async(&mut conn)
            .await?;

        Ok(popped.map(|(_, value)| value))
    }

    async fn llen(&self, list: &str) -> Result<usize, StoreError> {
        let mut conn = self.conn.clone();
        let len: usize = conn.llen(list).await?;
        Ok(len)
    }

    async fn lrange(
        &self,
        list: &str,
        start: isize,
        stop: isize,
    ) -> Result<Vec<String>, StoreError> {
        let mut conn = self.conn.clone();
        let items: Vec<String> = conn.lrange(list, start, stop).await?;
        Ok(items)
    }

    async fn exec_batch(&self, ops: Vec<StoreOp>) -> Result<Vec<StoreReply>, StoreError> {
        if ops.is_empty() {
            return Ok(Vec::new());
        }

        let mut conn = self.conn.clone();
        let mut pipe = redis::pipe();
        pipe.atomic();

        // Only LRANGE produces a reply we keep; everything else is ignored
        // so the pipeline result is a uniform list of string lists.
        let mut list_replies = 0;
        for op in &ops {
            match op {
                StoreOp::Set { key, value } => {
                    pipe.set(key, value).ignore();
                }
                StoreOp::Del { keys } => {
                    if !keys.is_empty() {
                        pipe.del(keys).ignore();
                    }
                }
                StoreOp::RPush { list, value } => {
                    pipe.rpush(list, value).ignore();
                }
                StoreOp::LRange { list, start, stop } => {
                    pipe.lrange(list, *start, *stop);
                    list_replies += 1;
                }
            }
        }

        let lists: Vec<Vec<String>> = if list_replies == 0 {
            pipe.query_async::<_, ()>(&mut conn).await?;
            Vec::new()
        } else {
            pipe.query_async(&mut conn).await?
        };

        let mut lists = lists.into_iter();
        let replies = ops
            .iter()
            .map(|op| match op {
                StoreOp::LRange { .. } => StoreReply::List(lists.next().unwrap_or_default()),
                _ => StoreReply::Done,
            })
            .collect();

        Ok(replies)
    }
}
