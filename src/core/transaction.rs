// Transaction data structures

use crate::core::{canonical_json, sha256_hex};
use serde::{Deserialize, Serialize};

/// Sender address used for mining reward payouts
pub const NETWORK_SENDER: &str = "network";

/// A value transfer between two addresses.
///
/// `timestamp` is stamped when the transaction is accepted and is never part
/// of the signed payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub timestamp: f64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
    /// Hex-encoded public key of the sender
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<String>,
}

/// The part of a transaction covered by the sender's signature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SignedPayload {
    pub from: String,
    pub to: String,
    pub amount: f64,
}

impl SignedPayload {
    pub fn new(from: impl Into<String>, to: impl Into<String>, amount: f64) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            amount,
        }
    }

    /// Canonical message string that gets signed and verified
    pub fn canonical(&self) -> String {
        canonical_json(self)
    }
}

impl Transaction {
    /// Mining reward payout
    pub fn reward(to: impl Into<String>, amount: f64, timestamp: f64) -> Self {
        Self {
            from: NETWORK_SENDER.to_string(),
            to: to.into(),
            amount,
            timestamp,
            signature: None,
            public_key: None,
        }
    }

    /// Check if this is a reward payout
    pub fn is_reward(&self) -> bool {
        self.from == NETWORK_SENDER
    }

    /// Payload the sender signed
    pub fn payload(&self) -> SignedPayload {
        SignedPayload::new(self.from.clone(), self.to.clone(), self.amount)
    }

    /// Content key used for duplicate suppression in gossip
    pub fn content_hash(&self) -> String {
        sha256_hex(canonical_json(self).as_bytes())
    }
}
