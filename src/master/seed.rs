//! Per-task RNG stream seeds.
//!
//! Each task tuple carries a seed blob derived from a position in a
//! logical stream, so worker-side randomness is reproducible no matter
//! how tasks land on workers. The master checkpoints the stream position
//! before a submission and restores it during cleanup.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde_json::Value;

/// Producer of per-task seed blobs.
pub trait SeedSource: Send {
    /// The next seed in the stream.
    fn next_stream(&mut self) -> Value;

    /// Current stream position, for later restore.
    fn checkpoint(&self) -> SeedCheckpoint;

    /// Rewinds to a previously taken checkpoint.
    fn restore(&mut self, at: SeedCheckpoint);
}

/// Opaque stream position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SeedCheckpoint(u64);

/// Default seed source: a counter over a fixed base, each position
/// expanded into a 16-byte hex blob through a seeded generator.
pub struct StreamSeeds {
    base: u64,
    pos: u64,
}

impl StreamSeeds {
    /// A fresh stream with a random base.
    pub fn new() -> Self {
        Self::from_base(rand::random())
    }

    /// A stream with a fixed base, for reproducible submissions.
    pub fn from_base(base: u64) -> Self {
        Self { base, pos: 0 }
    }
}

impl Default for StreamSeeds {
    fn default() -> Self {
        Self::new()
    }
}

impl SeedSource for StreamSeeds {
    fn next_stream(&mut self) -> Value {
        self.pos += 1;
        let mut rng =
            StdRng::seed_from_u64(self.base ^ self.pos.wrapping_mul(0x9E37_79B9_7F4A_7C15));
        let bytes: [u8; 16] = rng.gen();
        Value::String(bytes.iter().map(|b| format!("{:02x}", b)).collect())
    }

    fn checkpoint(&self) -> SeedCheckpoint {
        SeedCheckpoint(self.pos)
    }

    fn restore(&mut self, at: SeedCheckpoint) {
        self.pos = at.0;
    }
}
