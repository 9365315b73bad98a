// Key management

use crate::core::{hash160, sha256_hash, SignedPayload};
use rand::rngs::OsRng;
use secp256k1::{Message, PublicKey, Secp256k1, SecretKey};
use serde::{Deserialize, Serialize};

/// Ledger address derived from a public key
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Address(pub String);

impl Address {
    /// Create address from public key bytes: hex(RIPEMD160(SHA256(pubkey)))
    pub fn from_pubkey(pubkey: &[u8]) -> Self {
        Self(hex::encode(hash160(pubkey)))
    }

    /// Get address string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A transaction ready for submission: payload plus its signature fields
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedTransfer {
    pub from: String,
    pub to: String,
    pub amount: f64,
    pub signature: String,
    pub public_key: String,
}

/// Key pair
#[derive(Clone)]
pub struct KeyPair {
    pub secret_key: SecretKey,
    pub public_key: PublicKey,
    pub address: Address,
}

impl KeyPair {
    /// Generate a new key pair
    pub fn generate() -> Self {
        let secp = Secp256k1::new();
        let mut rng = OsRng;

        let secret_key = SecretKey::new(&mut rng);
        Self::from_secret_key(&secp, secret_key)
    }

    /// Restore from a hex-encoded secret key
    pub fn from_secret_hex(secret: &str) -> Result<Self, String> {
        let bytes =
            hex::decode(secret.trim()).map_err(|e| format!("Invalid secret key hex: {}", e))?;
        let secret_key =
            SecretKey::from_slice(&bytes).map_err(|e| format!("Invalid secret key: {}", e))?;
        Ok(Self::from_secret_key(&Secp256k1::new(), secret_key))
    }

    fn from_secret_key<C: secp256k1::Signing>(secp: &Secp256k1<C>, secret_key: SecretKey) -> Self {
        let public_key = secret_key.public_key(secp);
        let address = Address::from_pubkey(&public_key.serialize());

        Self {
            secret_key,
            public_key,
            address,
        }
    }

    /// Hex-encoded secret key
    pub fn secret_hex(&self) -> String {
        hex::encode(self.secret_key.secret_bytes())
    }

    /// Hex-encoded compressed public key, as carried in `publicKey`
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.public_key.serialize())
    }

    /// Sign a message: compact ECDSA over SHA256(message), hex-encoded
    pub fn sign(&self, message: &str) -> String {
        let secp = Secp256k1::signing_only();
        let digest = Message::from_digest(sha256_hash(message.as_bytes()));
        let signature = secp.sign_ecdsa(&digest, &self.secret_key);
        hex::encode(signature.serialize_compact())
    }

    /// Sign a transfer from `from` (usually this key's address) to `to`
    pub fn sign_transfer(&self, from: &str, to: &str, amount: f64) -> SignedTransfer {
        let payload = SignedPayload::new(from, to, amount);
        SignedTransfer {
            from: payload.from.clone(),
            to: payload.to.clone(),
            amount,
            signature: self.sign(&payload.canonical()),
            public_key: self.public_key_hex(),
        }
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
        f.debug_struct("KeyPair").field("address", &self.address).finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_address_is_hash160_hex() {
        let kp = KeyPair::generate();
        assert_eq!(kp.address.as_str().len(), 40);
        assert_eq!(kp.address, Address::from_pubkey(&kp.public_key.serialize()));
    }

    #[test]
    fn test_secret_roundtrip() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_secret_hex(&kp.secret_hex()).unwrap();
        assert_eq!(restored.public_key, kp.public_key);
        assert_eq!(restored.address, kp.address);
    }

    #[test]
    fn test_invalid_secret() {
        assert!(KeyPair::from_secret_hex("zz").is_err());
        assert!(KeyPair::from_secret_hex("00").is_err());
    }

    #[test]
    fn test_sign_transfer_fields() {
        let kp = KeyPair::generate();
        let transfer = kp.sign_transfer("Alice", "Bob", 50.0);

        assert_eq!(transfer.from, "Alice");
        assert_eq!(transfer.signature.len(), 128);
        assert_eq!(transfer.public_key, kp.public_key_hex());
    }
}
