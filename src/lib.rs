// Flood ledger
// Proof-of-work ledger replicated between peers by flood gossip

pub mod cli;
pub mod config;
pub mod consensus;
pub mod core;
pub mod ledger;
pub mod network;
pub mod node;
pub mod wallet;

// Re-exports for convenience
pub use cli::{Cli, CliHandler};
pub use config::{ConfigError, NodeConfig};
pub use consensus::{CancelToken, ConsensusPolicy, FixedPolicy, Miner, ValidationError};
pub use self::core::{Block, Transaction};
pub use ledger::{ChainSnapshot, Ledger, LedgerError, LedgerEvent};
pub use network::{GossipNetwork, Message, MessageType, PeerError};
pub use node::{Node, NodeError};
pub use wallet::{KeyPair, Secp256k1Verifier, SignatureVerifier};
