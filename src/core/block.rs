// Block data structures

use crate::core::{canonical_json, sha256_hex, Transaction};
use serde::{Deserialize, Serialize};

/// `previousHash` of the genesis block
pub const GENESIS_PREVIOUS_HASH: &str = "0";

/// Block - an ordered batch of transactions sealed by proof-of-work
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub index: u64,
    pub transactions: Vec<Transaction>,
    /// Seconds since the Unix epoch
    pub timestamp: f64,
    pub previous_hash: String,
    pub nonce: u64,
    pub hash: String,
}

/// The hashed fields of a block
#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct BlockContent<'a> {
    index: u64,
    transactions: &'a [Transaction],
    timestamp: f64,
    previous_hash: &'a str,
    nonce: u64,
}

impl Block {
    /// Build a block with `nonce = 0` and its initial hash.
    ///
    /// The hash is not yet valid under any difficulty; see `Miner::mine`.
    pub fn seal(
        index: u64,
        transactions: Vec<Transaction>,
        timestamp: f64,
        previous_hash: impl Into<String>,
    ) -> Self {
        let mut block = Self {
            index,
            transactions,
            timestamp,
            previous_hash: previous_hash.into(),
            nonce: 0,
            hash: String::new(),
        };
        block.hash = block.recompute_hash();
        block
    }

    /// Create the genesis block
    pub fn genesis(timestamp: f64) -> Self {
        Self::seal(0, Vec::new(), timestamp, GENESIS_PREVIOUS_HASH)
    }

    /// SHA256 over the canonical JSON of the five content fields
    pub fn recompute_hash(&self) -> String {
        let content = BlockContent {
            index: self.index,
            transactions: &self.transactions,
            timestamp: self.timestamp,
            previous_hash: &self.previous_hash,
            nonce: self.nonce,
        };
        sha256_hex(canonical_json(&content).as_bytes())
    }

    /// Check the stored hash against the content
    pub fn has_valid_hash(&self) -> bool {
        self.hash == self.recompute_hash()
    }

    /// Check if this is the genesis block
    pub fn is_genesis(&self) -> bool {
        self.index == 0 && self.previous_hash == GENESIS_PREVIOUS_HASH
    }

    /// Whether the block carries the given transaction
    pub fn contains(&self, tx: &Transaction) -> bool {
        self.transactions.iter().any(|t| t == tx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_txs() -> Vec<Transaction> {
        vec![
            Transaction::reward("Alice", 10.0, 1_600_000_000.0),
            Transaction {
                from: "Alice".to_string(),
                to: "Bob".to_string(),
                amount: 5.0,
                timestamp: 1_600_000_100.0,
                signature: None,
                public_key: None,
            },
        ]
    }

    #[test]
    fn test_seal_sets_consistent_hash() {
        let block = Block::seal(1, sample_txs(), 1_600_000_200.0, "abc");

        assert_eq!(block.nonce, 0);
        assert_eq!(block.hash.len(), 64);
        assert!(block.has_valid_hash());
    }

    #[test]
    fn test_hash_is_deterministic() {
        let a = Block::seal(1, sample_txs(), 1_600_000_200.0, "abc");
        let b = Block::seal(1, sample_txs(), 1_600_000_200.0, "abc");
        assert_eq!(a.hash, b.hash);
    }

    #[test]
    fn test_hash_changes_with_nonce() {
        let mut block = Block::seal(1, sample_txs(), 1_600_000_200.0, "abc");
        let before = block.recompute_hash();
        block.nonce += 1;
        assert_ne!(before, block.recompute_hash());
        assert!(!block.has_valid_hash());
    }

    #[test]
    fn test_hash_covers_transactions() {
        let mut block = Block::seal(1, sample_txs(), 1_600_000_200.0, "abc");
        block.transactions[1].amount += 1.0;
        assert!(!block.has_valid_hash());
    }

    #[test]
    fn test_genesis_block() {
        let genesis = Block::genesis(0.0);
        assert!(genesis.is_genesis());
        assert_eq!(genesis.previous_hash, "0");
        assert!(genesis.transactions.is_empty());
        assert_eq!(genesis, Block::genesis(0.0));
    }

    #[test]
    fn test_wire_format() {
        let block = Block::genesis(0.0);
        let json = serde_json::to_value(&block).unwrap();

        for key in ["index", "transactions", "timestamp", "previousHash", "nonce", "hash"] {
            assert!(json.get(key).is_some(), "missing {key}");
        }

        let parsed: Block = serde_json::from_value(json).unwrap();
        assert_eq!(parsed, block);
    }
}
