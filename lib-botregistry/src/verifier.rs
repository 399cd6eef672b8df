//! Signature Verification
//!
//! The registry never handles private keys. Hosts plug in the scheme their
//! chain uses; ed25519 is the default.

use ed25519_dalek::{Signature, VerifyingKey};
use lib_types::PublicKey;

use crate::errors::{RegistryError, RegistryResult};

/// Checks a signature over a registry signing message
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> RegistryResult<()>;
}

/// Strict ed25519 verification (RFC 8032, no malleable signatures)
#[derive(Debug, Clone, Copy, Default)]
pub struct Ed25519Verifier;

impl SignatureVerifier for Ed25519Verifier {
    fn verify(&self, public_key: &PublicKey, message: &[u8], signature: &[u8]) -> RegistryResult<()> {
        let key = VerifyingKey::from_bytes(public_key.as_bytes())
            .map_err(|e| RegistryError::InvalidSignature(format!("public key {}: {}", public_key, e)))?;
        let sig = Signature::from_slice(signature)
            .map_err(|e| RegistryError::InvalidSignature(format!("malformed signature: {}", e)))?;
        key.verify_strict(message, &sig)
            .map_err(|_| RegistryError::InvalidSignature(format!("signature does not match key {}", public_key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ed25519_dalek::{Signer, SigningKey};

    fn keypair(seed: u8) -> (SigningKey, PublicKey) {
        let signing = SigningKey::from_bytes(&[seed; 32]);
        let public = PublicKey::new(signing.verifying_key().to_bytes());
        (signing, public)
    }

    #[test]
    fn test_valid_signature_accepted() {
        let (signing, public) = keypair(1);
        let sig = signing.sign(b"message").to_bytes();
        assert!(Ed25519Verifier.verify(&public, b"message", &sig).is_ok());
    }

    #[test]
    fn test_wrong_message_rejected() {
        let (signing, public) = keypair(1);
        let sig = signing.sign(b"message").to_bytes();
        assert!(matches!(
            Ed25519Verifier.verify(&public, b"other", &sig),
            Err(RegistryError::InvalidSignature(_))
        ));
    }

    #[test]
    fn test_wrong_key_rejected() {
        let (signing, _) = keypair(1);
        let (_, other) = keypair(2);
        let sig = signing.sign(b"message").to_bytes();
        assert!(Ed25519Verifier.verify(&other, b"message", &sig).is_err());
    }

    #[test]
    fn test_malformed_signature_rejected() {
        let (_, public) = keypair(1);
        assert!(Ed25519Verifier.verify(&public, b"message", &[0u8; 10]).is_err());
    }
}
