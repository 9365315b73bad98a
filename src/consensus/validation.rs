// Block and chain validation

use crate::consensus::{ConsensusPolicy, Miner};
use crate::core::Block;
use thiserror::Error;

/// Reason a block or candidate chain was rejected
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("block index {found} does not follow predecessor index {expected_after}")]
    IndexMismatch { expected_after: u64, found: u64 },
    #[error("previous hash does not match predecessor hash")]
    PreviousHashMismatch,
    #[error("stored hash does not match block content")]
    HashMismatch,
    #[error("hash does not carry {difficulty} leading zeros")]
    InsufficientWork { difficulty: u32 },
    #[error("genesis block differs from the local genesis")]
    GenesisMismatch,
    #[error("candidate chain has {candidate} blocks, local chain has {local}")]
    ChainTooShort { candidate: usize, local: usize },
    #[error("chain is empty")]
    EmptyChain,
}

/// Block validator bound to a consensus policy
pub struct BlockValidator<'a> {
    policy: &'a dyn ConsensusPolicy,
}

impl<'a> BlockValidator<'a> {
    pub fn new(policy: &'a dyn ConsensusPolicy) -> Self {
        Self { policy }
    }

    /// Validate `candidate` as the direct successor of `predecessor`
    pub fn validate_successor(
        &self,
        candidate: &Block,
        predecessor: &Block,
    ) -> Result<(), ValidationError> {
        if predecessor.index + 1 != candidate.index {
            return Err(ValidationError::IndexMismatch {
                expected_after: predecessor.index,
                found: candidate.index,
            });
        }

        if predecessor.hash != candidate.previous_hash {
            return Err(ValidationError::PreviousHashMismatch);
        }

        if !candidate.has_valid_hash() {
            return Err(ValidationError::HashMismatch);
        }

        let difficulty = self.policy.difficulty_at(candidate.index);
        if !Miner::new(difficulty).verify(candidate) {
            return Err(ValidationError::InsufficientWork { difficulty });
        }

        Ok(())
    }

    /// Validate a whole chain rooted at `genesis`
    pub fn validate_chain(&self, chain: &[Block], genesis: &Block) -> Result<(), ValidationError> {
        let first = chain.first().ok_or(ValidationError::EmptyChain)?;

        if first != genesis || !first.has_valid_hash() {
            return Err(ValidationError::GenesisMismatch);
        }

        for pair in chain.windows(2) {
            self.validate_successor(&pair[1], &pair[0])?;
        }

        Ok(())
    }
}
