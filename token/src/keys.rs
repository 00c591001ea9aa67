//! Account keys
//!
//! An account's id is its ed25519 verifying key, so anything signed by the
//! account can be checked against the id alone.

use crate::error::PermitError;
use custody_core::Address;
use ed25519_dalek::{Signature, Signer, SigningKey, Verifier, VerifyingKey};
use rand::rngs::OsRng;
use sha2::{Digest, Sha256};

/// Key pair for signing permits
#[derive(Clone)]
pub struct Keypair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl Keypair {
    /// Generate new random keypair
    pub fn generate() -> Self {
        let signing_key = SigningKey::generate(&mut OsRng);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Deterministic keypair from a seed phrase (scenario accounts, fixtures)
    pub fn from_seed(seed: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(b"custody-key:");
        hasher.update(seed.as_bytes());
        let secret: [u8; 32] = hasher.finalize().into();

        let signing_key = SigningKey::from_bytes(&secret);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Account id controlled by this key
    pub fn address(&self) -> Address {
        Address::new(self.verifying_key.to_bytes())
    }

    /// Get public key as hex string
    pub fn public_key_hex(&self) -> String {
        hex::encode(self.verifying_key.as_bytes())
    }

    /// Sign message
    pub fn sign(&self, message: &[u8]) -> Vec<u8> {
        self.signing_key.sign(message).to_bytes().to_vec()
    }
}

impl std::fmt::Debug for Keypair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Keypair")
            .field("address", &self.address())
            .finish_non_exhaustive()
    }
}

/// Verify that `signer` signed `message`
pub fn verify(signer: &Address, message: &[u8], signature_bytes: &[u8]) -> Result<(), PermitError> {
    let verifying_key =
        VerifyingKey::from_bytes(signer.as_bytes()).map_err(|_| PermitError::InvalidPublicKey)?;

    let sig_array: [u8; 64] = signature_bytes
        .try_into()
        .map_err(|_| PermitError::InvalidSignature)?;

    let signature = Signature::from_bytes(&sig_array);

    verifying_key
        .verify(message, &signature)
        .map_err(|_| PermitError::InvalidSignature)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let message = b"test message";

        let signature = keypair.sign(message);

        assert!(verify(&keypair.address(), message, &signature).is_ok());
        assert_eq!(keypair.public_key_hex().len(), 64);
    }

    #[test]
    fn test_invalid_signature() {
        let keypair = Keypair::from_seed("alice");
        let signature = keypair.sign(b"test message");

        assert_eq!(
            verify(&keypair.address(), b"wrong message", &signature),
            Err(PermitError::InvalidSignature)
        );
        assert_eq!(
            verify(&keypair.address(), b"test message", &signature[..10]),
            Err(PermitError::InvalidSignature)
        );
    }

    #[test]
    fn test_seeded_keys_are_stable() {
        assert_eq!(
            Keypair::from_seed("bob").address(),
            Keypair::from_seed("bob").address()
        );
        assert_ne!(
            Keypair::from_seed("bob").address(),
            Keypair::from_seed("carol").address()
        );
    }
}
