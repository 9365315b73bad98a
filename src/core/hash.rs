// Hashing and canonical encoding utilities

use serde::Serialize;
use sha2::{Digest, Sha256};

/// Canonical JSON encoding: object keys sorted, no whitespace.
///
/// Goes through `serde_json::Value`, whose map type is ordered by key, so the
/// output does not depend on struct field order.
pub fn canonical_json<T: Serialize>(value: &T) -> String {
    let value = serde_json::to_value(value).expect("plain data always converts to a JSON value");
    value.to_string()
}

/// Single SHA256 hash
pub fn sha256_hash(data: &[u8]) -> [u8; 32] {
    let hash = Sha256::digest(data);
    let mut result = [0u8; 32];
    result.copy_from_slice(&hash);
    result
}

/// SHA256 as a lowercase hex string
pub fn sha256_hex(data: &[u8]) -> String {
    hex::encode(sha256_hash(data))
}

/// RIPEMD160(SHA256(data)) - used for address generation
pub fn hash160(data: &[u8]) -> [u8; 20] {
    use ripemd::{Digest as RipemdDigest, Ripemd160};
    let sha = Sha256::digest(data);
    let ripemd = Ripemd160::digest(sha);
    let mut result = [0u8; 20];
    result.copy_from_slice(&ripemd);
    result
}

/// Number of leading `'0'` characters in a hex digest
pub fn leading_zero_hex(hash: &str) -> usize {
    hash.chars().take_while(|c| *c == '0').count()
}

/// Check that a hex digest carries at least `difficulty` leading zeros
pub fn meets_difficulty(hash: &str, difficulty: u32) -> bool {
    leading_zero_hex(hash) >= difficulty as usize
}
