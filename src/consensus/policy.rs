// Difficulty and reward policy

/// Tunable consensus parameters consulted by the ledger.
///
/// Alternative strategies (e.g. retargeting) implement this trait without
/// touching ledger internals.
pub trait ConsensusPolicy: Send + Sync {
    /// Leading zero hex characters required for the block at `height`
    fn difficulty_at(&self, height: u64) -> u32;

    /// Reward paid to the miner of the block at `height`
    fn reward_at(&self, height: u64) -> f64;
}

/// Constant difficulty and reward
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FixedPolicy {
    pub difficulty: u32,
    pub mining_reward: f64,
}

impl FixedPolicy {
    pub fn new(difficulty: u32, mining_reward: f64) -> Self {
        Self {
            difficulty: difficulty.max(1),
            mining_reward,
        }
    }
}

impl Default for FixedPolicy {
    fn default() -> Self {
        Self::new(4, 10.0)
    }
}

impl ConsensusPolicy for FixedPolicy {
    fn difficulty_at(&self, _height: u64) -> u32 {
        self.difficulty.max(1)
    }

    fn reward_at(&self, _height: u64) -> f64 {
        self.mining_reward
    }
}
