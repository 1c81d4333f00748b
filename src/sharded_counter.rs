//! Sharded counter for the FUSE read path's hit-every-request statistics.
//!
//! `FuseMetrics::record_read` runs on every `read` callback, from every
//! dispatch thread, so its two counters are the most contended fields in
//! the metrics module. Spreading increments across shards avoids every
//! concurrent reader fighting over one cache line.

use std::sync::atomic::{AtomicU64, Ordering};

/// Number of shards for statistics counters.
/// Using 64 shards provides good concurrency reduction while keeping memory overhead low.
/// Each shard is 8 bytes, so 64 shards = 512 bytes per counter.
const STATS_SHARDS: usize = 64;

/// Sharded counter to reduce contention under high concurrency.
/// Uses a thread-local counter to select shards, avoiding atomic contention
/// while working correctly in async contexts where tasks migrate between threads.
#[derive(Debug)]
pub struct ShardedCounter {
    shards: Vec<AtomicU64>,
}

impl ShardedCounter {
    /// Create a new sharded counter with all shards initialized to 0.
    pub fn new() -> Self {
        let mut shards = Vec::with_capacity(STATS_SHARDS);
        for _ in 0..STATS_SHARDS {
            shards.push(AtomicU64::new(0));
        }
        Self { shards }
    }

    /// Increment a counter shard by one using round-robin selection via a
    /// thread-local counter.
    #[inline]
    pub fn increment(&self) {
        self.add(1);
    }

    /// Add an arbitrary amount to a counter shard, e.g. a byte count from a
    /// single read, rather than a fixed per-call increment.
    #[inline]
    pub fn add(&self, amount: u64) {
        thread_local! {
            static COUNTER: std::cell::Cell<u64> = const { std::cell::Cell::new(0) };
        }

        let shard_idx = COUNTER.with(|c| {
            let val = c.get();
            c.set(val.wrapping_add(1));
            (val as usize) % STATS_SHARDS
        });

        self.shards[shard_idx].fetch_add(amount, Ordering::Relaxed);
    }

    /// Sum all shards to get the total count.
    pub fn sum(&self) -> u64 {
        self.shards
            .iter()
            .map(|shard| shard.load(Ordering::Relaxed))
            .sum()
    }
}

impl Default for ShardedCounter {
    fn default() -> Self {
        Self::new()
    }
}
