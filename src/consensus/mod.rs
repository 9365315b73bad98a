// Consensus: proof-of-work, policy and validation

pub mod policy;
pub mod pow;
pub mod validation;

pub use policy::{ConsensusPolicy, FixedPolicy};
pub use pow::{CancelToken, Miner, MiningResult};
pub use validation::{BlockValidator, ValidationError};
