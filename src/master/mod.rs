//! Master Coordinator
//!
//! The caller-facing side of the work-queue protocol. A [`Master`] owns
//! one store connection and the registry for one queue; `submit` drives a
//! job through its whole lifecycle:
//!
//! 1. build and store the envelope (fails fast, nothing written on error),
//! 2. seed, chunk, and push the task sequence,
//! 3. collect results under the fault detector until every slot arrives,
//! 4. clean the job out of the store, preserving other masters' chunks.
//!
//! The master is single-threaded and cooperative: the only suspension
//! point is the blocking pop on the result list. Interrupts arrive
//! through a cancellation token and take the same cleanup path as normal
//! completion.

use std::sync::Arc;

use tokio_util::sync::CancellationToken;

use crate::envelope::{self, EnvelopeError, EnvelopeRequest};
use crate::protocol::{
    count_key, env_key, env_pattern, live_key, out_pattern, queue_key, JobId,
};
use crate::registry::{CombineFn, QueueConfig, Reduce};
use crate::store::{RedisStore, Store, StoreError};

pub mod cleanup;
pub mod collector;
pub mod faults;
pub mod producer;
pub mod seed;
pub mod types;


pub use collector::Accumulator;
pub use producer::PreparedTasks;
pub use seed::{SeedCheckpoint, SeedSource, StreamSeeds};
pub use types::{
    DispatchError, ErrorPolicy, InfoItem, InfoValue, JobOutcome, JobSpec, QueueStats, SlotError,
    SYSTEM_NAME,
};

use collector::collect;
use serde_json::Value;
use std::time::Duration;

/// Connection and queue options for registration.
#[derive(Debug, Clone)]
pub struct RegisterOptions {
    pub queue: String,
    pub host: String,
    pub port: u16,
    pub password: Option<String>,
}

impl RegisterOptions {
    pub fn new(queue: impl Into<String>, host: impl Into<String>) -> Self {
        Self {
            queue: queue.into(),
            host: host.into(),
            port: 6379,
            password: None,
        }
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_password(mut self, password: impl Into<String>) -> Self {
        self.password = Some(password.into());
        self
    }

    fn url(&self) -> String {
        RedisStore::url(&self.host, self.port, self.password.as_deref())
    }
}

/// One master context: a store connection plus the registry for its queue.
pub struct Master {
    store: Arc<dyn Store>,
    config: QueueConfig,
    seeds: Box<dyn SeedSource>,
}

impl Master {
    /// Opens the store and registers the queue. Fails with
    /// `StoreUnavailable` when the server cannot be reached.
    pub async fn register(opts: RegisterOptions) -> Result<Self, DispatchError> {
        let store = RedisStore::connect(&opts.url()).await.map_err(|err| match err {
            StoreError::ConnectionFailed(msg) => DispatchError::StoreUnavailable(msg),
            other => DispatchError::Store(other),
        })?;
        Self::with_store(Arc::new(store), opts.queue).await
    }

    /// Registers a queue on an already-open store. This is how tests and
    /// single-process deployments run against [`crate::store::MemoryStore`].
    pub async fn with_store(
        store: Arc<dyn Store>,
        queue: impl Into<String>,
    ) -> Result<Self, DispatchError> {
        let config = QueueConfig::new(queue);

        let live = live_key(&config.queue);
        if !store.exists(&live).await? {
            store.set(&live, "").await?;
        }
        tracing::info!(queue = %config.queue, "queue registered");

        Ok(Self {
            store,
            config,
            seeds: Box::new(StreamSeeds::new()),
        })
    }

    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    pub fn set_chunk_size(&mut self, size: usize) {
        self.config.set_chunk_size(size);
    }

    pub fn set_reduce(&mut self, reduce: Reduce) {
        self.config.set_reduce(reduce);
    }

    pub fn set_export<I, S>(&mut self, names: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.set_export(names);
    }

    pub fn set_packages<I, S>(&mut self, packages: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.set_packages(packages);
    }

    pub fn set_ft_interval(&mut self, interval: Duration) {
        self.config.set_ft_interval(interval);
    }

    pub fn set_max_envelope_bytes(&mut self, bytes: usize) {
        self.config.set_max_envelope_bytes(bytes);
    }

    /// Replaces the per-task seed source, e.g. for reproducible runs.
    pub fn set_seed_source(&mut self, seeds: Box<dyn SeedSource>) {
        self.seeds = seeds;
    }

    /// Tears the queue down: the shared list, the liveness sentinel, the
    /// worker counter, and every job envelope and result list under the
    /// queue prefix. Idempotent; workers polling a removed queue stop on
    /// their own once `Q.live` is gone.
    pub async fn remove_queue(&self) -> Result<(), DispatchError> {
        let queue = &self.config.queue;

        let mut keys = vec![queue_key(queue), count_key(queue), live_key(queue)];
        keys.extend(self.store.keys(&env_pattern(queue)).await?);
        keys.extend(self.store.keys(&out_pattern(queue)).await?);
        self.store.del(&keys).await?;

        tracing::info!(queue = %queue, "queue removed");
        Ok(())
    }

    pub async fn info(&self, item: InfoItem) -> Result<InfoValue, DispatchError> {
        match item {
            InfoItem::Workers => {
                let raw = self.store.get(&count_key(&self.config.queue)).await?;
                let workers = raw.and_then(|s| s.trim().parse().ok()).unwrap_or(0);
                Ok(InfoValue::Workers(workers))
            }
            InfoItem::Name => Ok(InfoValue::Name(SYSTEM_NAME)),
            InfoItem::Version => Ok(InfoValue::Version(env!("CARGO_PKG_VERSION"))),
        }
    }

    /// Advisory queue statistics.
    pub async fn stats(&self) -> Result<QueueStats, DispatchError> {
        let pending = self.store.llen(&queue_key(&self.config.queue)).await?;
        let workers = self
            .store
            .get(&count_key(&self.config.queue))
            .await?
            .and_then(|s| s.trim().parse().ok());
        Ok(QueueStats {
            pending_chunks: pending,
            workers,
        })
    }

    /// Submits a job and blocks until its reduced result is complete.
    pub async fn submit(&mut self, job: JobSpec) -> Result<JobOutcome, DispatchError> {
        self.submit_with_token(job, CancellationToken::new()).await
    }

    /// Like [`Master::submit`], but interruptible: cancelling the token
    /// aborts collection, runs cleanup, and surfaces `Interrupted`.
    pub async fn submit_with_token(
        &mut self,
        job: JobSpec,
        token: CancellationToken,
    ) -> Result<JobOutcome, DispatchError> {
        let queue = self.config.queue.clone();
        let job_id = JobId::new();
        let checkpoint = self.seeds.checkpoint();

        let two_level = self.config.reduce.is_two_level();
        let (master_combine, worker_combine) = self.resolve_combine(&job)?;

        // Envelope first: a build failure must leave no job keys behind.
        let mut packages = self.config.packages.clone();
        for package in &job.packages {
            if !packages.contains(package) {
                packages.push(package.clone());
            }
        }
        let sealed = envelope::build(EnvelopeRequest {
            expr: &job.expr,
            bindings: &job.bindings,
            free_symbols: &job.free_symbols,
            export: &job.export,
            no_export: &job.no_export,
            process_export: &self.config.export,
            packages,
            combine: worker_combine,
            max_bytes: self.config.max_envelope_bytes,
        })?;

        self.store
            .set(&env_key(&queue, &job_id), &sealed.serialized)
            .await?;

        let prepared = producer::prepare(
            &job_id,
            &job.args,
            self.config.chunk_size,
            two_level,
            self.seeds.as_mut(),
        );
        producer::push_chunks(self.store.as_ref(), &queue, &prepared).await?;

        tracing::info!(
            job = %job_id,
            tasks = prepared.total_tasks,
            chunks = prepared.chunks.len(),
            "job submitted"
        );

        let mut acc = Accumulator::new(master_combine, !two_level);
        let collected = tokio::select! {
            result = collect(
                self.store.as_ref(),
                &queue,
                &job_id,
                &prepared,
                self.config.ft_interval,
                &mut acc,
            ) => result,
            _ = token.cancelled() => {
                tracing::warn!(job = %job_id, "submission interrupted");
                Err(DispatchError::Interrupted)
            }
        };

        // Cleanup runs on every exit path; a collection error still wins
        // over a cleanup error when both happen.
        let cleaned = cleanup::run(self.store.as_ref(), &queue, &job_id).await;
        self.seeds.restore(checkpoint);
        collected?;
        cleaned?;

        let (value, combine_errors) = acc.finish();
        if job.error_policy == ErrorPolicy::Stop {
            if let Some(first) = combine_errors.first() {
                return Err(DispatchError::Combine {
                    slot: first.slot,
                    message: first.message.clone(),
                });
            }
        }
        Ok(JobOutcome {
            value,
            combine_errors,
        })
    }

    /// Picks the master-side fold and the worker-side combine blob from
    /// the registry's reduce mode and the job's combine.
    fn resolve_combine(
        &self,
        job: &JobSpec,
    ) -> Result<(CombineFn, Option<Value>), DispatchError> {
        match &self.config.reduce {
            Reduce::None => Ok((job.combine.clone(), None)),
            Reduce::Same => {
                let blob = job
                    .combine_blob
                    .clone()
                    .ok_or(EnvelopeError::MissingCombine)?;
                Ok((job.combine.clone(), Some(blob)))
            }
            Reduce::Explicit(spec) => Ok((spec.func.clone(), Some(spec.worker_blob.clone()))),
        }
    }
}
