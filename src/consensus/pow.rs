// Proof of Work implementation

use crate::core::{meets_difficulty, Block};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How often the search loop polls its cancel token
const CANCEL_POLL_INTERVAL: u64 = 1024;

/// Shared flag that interrupts a running nonce search
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Proof of Work miner
#[derive(Debug, Clone, Copy)]
pub struct Miner {
    /// Required number of leading zero hex characters
    pub difficulty: u32,
}

impl Miner {
    /// Create a new miner for a fixed difficulty
    pub fn new(difficulty: u32) -> Self {
        Self { difficulty }
    }

    /// Mine a block by incrementing its nonce until the hash qualifies.
    ///
    /// Deterministic for identical inputs. On success `block.nonce` and
    /// `block.hash` hold the winning values; on cancellation the block is left
    /// at the last nonce tried and `success` is false.
    pub fn mine(&self, block: &mut Block, cancel: &CancelToken) -> MiningResult {
        let start_time = Instant::now();
        let mut attempts = 0u64;

        loop {
            block.hash = block.recompute_hash();
            attempts += 1;

            if meets_difficulty(&block.hash, self.difficulty) {
                return MiningResult {
                    success: true,
                    nonce: block.nonce,
                    hash: block.hash.clone(),
                    attempts,
                    duration: start_time.elapsed(),
                };
            }

            if attempts % CANCEL_POLL_INTERVAL == 0 && cancel.is_cancelled() {
                log::debug!(
                    "Mining of block {} cancelled after {} attempts",
                    block.index,
                    attempts
                );
                return MiningResult {
                    success: false,
                    nonce: block.nonce,
                    hash: block.hash.clone(),
                    attempts,
                    duration: start_time.elapsed(),
                };
            }

            // Progress indicator every 100k attempts
            if attempts % 100_000 == 0 {
                let elapsed = start_time.elapsed();
                log::debug!(
                    "Mining attempts: {} ({:.1} KH/s)",
                    attempts,
                    attempts as f64 / elapsed.as_secs_f64() / 1000.0
                );
            }

            block.nonce = block.nonce.wrapping_add(1);
        }
    }

    /// Verify that a block satisfies PoW and that its hash matches its content
    pub fn verify(&self, block: &Block) -> bool {
        block.has_valid_hash() && meets_difficulty(&block.hash, self.difficulty)
    }
}

/// Mining result
#[derive(Debug)]
pub struct MiningResult {
    /// Whether a qualifying nonce was found
    pub success: bool,
    /// The nonce that was found
    pub nonce: u64,
    /// The resulting hash
    pub hash: String,
    /// Number of attempts
    pub attempts: u64,
    /// Time taken
    pub duration: Duration,
}

impl MiningResult {
    /// Calculate hash rate (hashes per second)
    pub fn hash_rate(&self) -> f64 {
        self.attempts as f64 / self.duration.as_secs_f64()
    }
}
