//! The signing collaborator.
//!
//! The ledger never assumes a specific algorithm; it calls whatever signer
//! was injected at construction. An Ed25519 implementation is provided for
//! deployments without an external signing service.

use ed25519_dalek::{Signer as DalekSigner, SigningKey};
use rand::RngCore;

/// Abstract signer over ledger record bytes.
pub trait Signer: Send + Sync {
    fn sign(&self, message: &[u8]) -> Vec<u8>;
    fn verify(&self, message: &[u8], signature: &[u8]) -> bool;
}

/// Ed25519 signer holding a local key pair.
pub struct Ed25519Signer {
    signing_key: SigningKey,
}

impl Ed25519Signer {
    /// Generate a fresh key pair from the OS entropy source.
    pub fn generate() -> Self {
        let mut bytes = [0u8; 32];
        rand::rngs::OsRng.fill_bytes(&mut bytes);
        Self::from_bytes(bytes)
    }

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self {
            signing_key: SigningKey::from_bytes(&bytes),
        }
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.signing_key.verifying_key().to_bytes()
    }
}

impl Signer for Ed25519Signer {
    fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }

    fn verify(&self, message: &[u8], signature: &[u8]) -> bool {
        let Ok(signature) = ed25519_dalek::Signature::from_slice(signature) else {
            return false;
        };
        self.signing_key
            .verifying_key()
            .verify_strict(message, &signature)
            .is_ok()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_round_trip() {
        let signer = Ed25519Signer::from_bytes([7u8; 32]);
        let message = b"record bytes";
        let signature = signer.sign(message);
        assert!(signer.verify(message, &signature));
        assert!(!signer.verify(b"other bytes", &signature));
    }

    #[test]
    fn malformed_signatures_fail_verification() {
        let signer = Ed25519Signer::generate();
        assert!(!signer.verify(b"message", b"short"));
    }

    #[test]
    fn key_derivation_is_deterministic() {
        let a = Ed25519Signer::from_bytes([1u8; 32]);
        let b = Ed25519Signer::from_bytes([1u8; 32]);
        assert_eq!(a.verifying_key_bytes(), b.verifying_key_bytes());
    }
}
