// Signature verification capability consumed by the ledger

use crate::core::sha256_hash;
use secp256k1::{ecdsa::Signature, Message, PublicKey, Secp256k1, VerifyOnly};

/// Verifies that `signature` over `message` was produced by `public_key`
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &[u8], message: &str, signature: &str) -> bool;
}

/// secp256k1 ECDSA verifier.
///
/// Expects a SEC1-encoded public key and a hex-encoded 64-byte compact
/// signature over SHA256(message). Any decoding failure counts as a failed
/// verification.
pub struct Secp256k1Verifier {
    secp: Secp256k1<VerifyOnly>,
}

impl Secp256k1Verifier {
    pub fn new() -> Self {
        Self {
            secp: Secp256k1::verification_only(),
        }
    }
}

impl Default for Secp256k1Verifier {
    fn default() -> Self {
        Self::new()
    }
}

impl SignatureVerifier for Secp256k1Verifier {
    fn verify(&self, public_key: &[u8], message: &str, signature: &str) -> bool {
        let Ok(public_key) = PublicKey::from_slice(public_key) else {
            return false;
        };
        let Ok(sig_bytes) = hex::decode(signature) else {
            return false;
        };
        let Ok(signature) = Signature::from_compact(&sig_bytes) else {
            return false;
        };

        let digest = Message::from_digest(sha256_hash(message.as_bytes()));
        self.secp.verify_ecdsa(&digest, &signature, &public_key).is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::SignedPayload;
    use crate::wallet::KeyPair;

    #[test]
    fn test_verify_own_signature() {
        let alice = KeyPair::generate();
        let message = SignedPayload::new("Alice", "Bob", 50.0).canonical();
        let signature = alice.sign(&message);

        let verifier = Secp256k1Verifier::new();
        assert!(verifier.verify(&alice.public_key.serialize(), &message, &signature));
    }

    #[test]
    fn test_reject_other_key() {
        let alice = KeyPair::generate();
        let mallory = KeyPair::generate();
        let message = SignedPayload::new("Alice", "Bob", 50.0).canonical();
        let signature = alice.sign(&message);

        let verifier = Secp256k1Verifier::new();
        assert!(!verifier.verify(&mallory.public_key.serialize(), &message, &signature));
    }

    #[test]
    fn test_reject_tampered_payload() {
        let alice = KeyPair::generate();
        let signature = alice.sign(&SignedPayload::new("Alice", "Bob", 50.0).canonical());
        let tampered = SignedPayload::new("Alice", "Bob", 51.0).canonical();

        let verifier = Secp256k1Verifier::new();
        assert!(!verifier.verify(&alice.public_key.serialize(), &tampered, &signature));
    }

    #[test]
    fn test_reject_garbage() {
        let alice = KeyPair::generate();
        let verifier = Secp256k1Verifier::new();

        assert!(!verifier.verify(b"not a key", "m", "00"));
        assert!(!verifier.verify(&alice.public_key.serialize(), "m", "not hex"));
        assert!(!verifier.verify(&alice.public_key.serialize(), "m", "abcd"));
    }
}
