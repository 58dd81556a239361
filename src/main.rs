//! Demo master.
//!
//! Submits one sum job against a queue and prints the reduced result.
//! With `--redis <url>` (or `REDIS_URL` in the environment) it runs
//! against a live server and expects external workers; without one it
//! runs on the in-process store and spawns a few demo workers that honor
//! the wire contract, so the whole lifecycle can be watched locally.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Value};

use redispatch::protocol::{
    alive_prefix, env_key, out_key, queue_key, start_prefix, ResultChunk, StartMarker, TaskChunk,
};
use redispatch::{
    CombineFn, Envelope, JobSpec, Master, MemoryStore, RedisStore, Store,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .init();

    let args: Vec<String> = std::env::args().collect();

    let mut redis_url = std::env::var("REDIS_URL").ok();
    let mut queue = "demo".to_string();
    let mut tasks = 10usize;
    let mut chunk_size = 1usize;
    let mut workers = 2usize;

    let mut i = 1;
    while i < args.len() {
        match args[i].as_str() {
            "--redis" => {
                redis_url = Some(args[i + 1].clone());
                i += 2;
            }
            "--queue" => {
                queue = args[i + 1].clone();
                i += 2;
            }
            "--tasks" => {
                tasks = args[i + 1].parse()?;
                i += 2;
            }
            "--chunk" => {
                chunk_size = args[i + 1].parse()?;
                i += 2;
            }
            "--workers" => {
                workers = args[i + 1].parse()?;
                i += 2;
            }
            "--help" | "-h" => {
                eprintln!(
                    "Usage: {} [--redis <url>] [--queue <name>] [--tasks <n>] [--chunk <n>] [--workers <n>]",
                    args[0]
                );
                return Ok(());
            }
            _ => {
                i += 1;
            }
        }
    }

    let store: Arc<dyn Store> = match &redis_url {
        Some(url) => {
            tracing::info!("Connecting to {}", url);
            Arc::new(RedisStore::connect(url).await?)
        }
        None => {
            tracing::info!("No server configured; using the in-process store");
            let store = Arc::new(MemoryStore::new());
            for n in 0..workers {
                spawn_demo_worker(store.clone(), queue.clone(), format!("demo-{n}"));
            }
            store
        }
    };

    let mut master = Master::with_store(store, queue).await?;
    master.set_chunk_size(chunk_size);

    let sum: CombineFn = Arc::new(|acc, v| {
        let a = acc.as_i64().ok_or_else(|| anyhow::anyhow!("non-numeric accumulator"))?;
        let b = v.as_i64().ok_or_else(|| anyhow::anyhow!("non-numeric value"))?;
        Ok(json!(a + b))
    });

    let job = JobSpec::new(json!({"op": "identity"}), sum)
        .with_args((1..=tasks).map(|i| json!({ "i": i })).collect());

    tracing::info!("Submitting {} tasks (chunk size {})", tasks, chunk_size);
    let outcome = master.submit(job).await?;

    println!("result: {}", outcome.value.unwrap_or(Value::Null));

    master.remove_queue().await?;
    Ok(())
}

/// A minimal worker honoring the wire contract: pop a chunk, claim it
/// with a start marker and heartbeat, evaluate each entry, push one
/// result per slot, clear the markers.
fn spawn_demo_worker(store: Arc<MemoryStore>, queue: String, token: String) {
    tokio::spawn(async move {
        loop {
            let Ok(popped) = store.brpop(&queue_key(&queue), Duration::from_millis(100)).await
            else {
                return;
            };
            let Some(raw) = popped else { continue };
            let Ok(chunk) = serde_json::from_str::<TaskChunk>(&raw) else {
                continue;
            };
            let job = chunk.job.clone();

            let Ok(Some(env_raw)) = store.get(&env_key(&queue, &job)).await else {
                continue;
            };
            let Ok(envelope) = serde_json::from_str::<Envelope>(&env_raw) else {
                continue;
            };

            let labels = chunk.labels();
            let start_key = format!("{}{}", start_prefix(&queue, &job), token);
            let alive_key = format!("{}{}", alive_prefix(&queue, &job), token);
            let marker = StartMarker {
                labels: labels.clone(),
            };
            let _ = store
                .set(&start_key, &serde_json::to_string(&marker).unwrap_or_default())
                .await;
            let _ = store.set(&alive_key, "").await;

            for label in labels {
                // The demo task body echoes the tuple's index.
                let values: Vec<i64> = chunk
                    .entries
                    .iter()
                    .filter(|entry| entry.label == label)
                    .filter_map(|entry| entry.args["i"].as_i64())
                    .collect();
                let value = if envelope.combine.is_some() {
                    json!(values.iter().sum::<i64>())
                } else {
                    json!(values.first().copied().unwrap_or(0))
                };
                let result = ResultChunk::new(label, value);
                if let Ok(serialized) = serde_json::to_string(&result) {
                    let _ = store.rpush(&out_key(&queue, &job), &serialized).await;
                }
            }

            let _ = store.del(&[start_key, alive_key]).await;
        }
    });
}
