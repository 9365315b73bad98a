// Keys, signing and signature verification

mod keys;
mod signer;

pub use keys::{Address, KeyPair, SignedTransfer};
pub use signer::{Secp256k1Verifier, SignatureVerifier};
