//! ECDSA signature implementation
//!
//! Uses the secp256k1 curve for transaction signing. Public keys travel as
//! SEC1 compressed points, signatures as 64-byte `r || s`.

use k256::ecdsa::signature::{Signer, Verifier};
use k256::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand::rngs::OsRng;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::Hash;

/// Address prefix for human-facing identifiers
pub const ADDRESS_PREFIX: &str = "RH";

/// Signature errors
#[derive(Debug, Error)]
pub enum SignatureError {
    #[error("Invalid public key")]
    InvalidPublicKey,
    #[error("Invalid private key")]
    InvalidPrivateKey,
}

/// secp256k1 private key
#[derive(Clone)]
pub struct PrivateKey(SigningKey);

impl std::fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PrivateKey([REDACTED])")
    }
}

/// SEC1-encoded public key (33 bytes compressed)
#[derive(Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublicKey(pub Vec<u8>);

impl PrivateKey {
    /// Generate a new random private key
    pub fn generate() -> Self {
        PrivateKey(SigningKey::random(&mut OsRng))
    }

    /// Create from 32 bytes
    pub fn from_bytes(bytes: &[u8; 32]) -> Result<Self, SignatureError> {
        SigningKey::from_slice(bytes)
            .map(PrivateKey)
            .map_err(|_| SignatureError::InvalidPrivateKey)
    }

    /// Get the corresponding public key
    pub fn public_key(&self) -> PublicKey {
        let point = self.0.verifying_key().to_encoded_point(true);
        PublicKey(point.as_bytes().to_vec())
    }

    /// Sign a message hash, returning `r || s`
    pub fn sign(&self, message: &Hash) -> Vec<u8> {
        let signature: Signature = self.0.sign(&message.0);
        signature.to_bytes().to_vec()
    }

    /// Export to bytes
    pub fn to_bytes(&self) -> [u8; 32] {
        self.0.to_bytes().into()
    }
}

impl PublicKey {
    /// Create from SEC1 bytes, rejecting points not on the curve
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, SignatureError> {
        VerifyingKey::from_sec1_bytes(bytes).map_err(|_| SignatureError::InvalidPublicKey)?;
        Ok(PublicKey(bytes.to_vec()))
    }

    /// Verify a signature over a message hash
    pub fn verify(&self, message: &Hash, signature: &[u8]) -> bool {
        let verifying_key = match VerifyingKey::from_sec1_bytes(&self.0) {
            Ok(vk) => vk,
            Err(_) => return false,
        };

        let sig = match Signature::from_slice(signature) {
            Ok(s) => s,
            Err(_) => return false,
        };

        verifying_key.verify(&message.0, &sig).is_ok()
    }

    /// Convert to address with checksum
    pub fn to_address(&self) -> String {
        // Address = "RH" + Base58(SHA256(pubkey)[0:20] || checksum[0:4])
        let hash = super::hash_bytes(&self.0);
        let addr_bytes = &hash.0[0..20];

        let checksum = super::double_hash(addr_bytes);

        let mut with_checksum = Vec::with_capacity(24);
        with_checksum.extend_from_slice(addr_bytes);
        with_checksum.extend_from_slice(&checksum.0[0..4]);

        format!("{}{}", ADDRESS_PREFIX, bs58::encode(&with_checksum).into_string())
    }

    /// Base58 form used when displaying a key
    pub fn to_base58(&self) -> String {
        bs58::encode(&self.0).into_string()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_bytes;

    #[test]
    fn test_public_key_is_compressed() {
        let private = PrivateKey::generate();
        let public = private.public_key();
        assert_eq!(public.0.len(), 33);
        assert!(PublicKey::from_bytes(&public.0).is_ok());
    }

    #[test]
    fn test_sign_verify() {
        let private = PrivateKey::generate();
        let public = private.public_key();

        let message = hash_bytes(b"test message");
        let signature = private.sign(&message);

        assert_eq!(signature.len(), 64);
        assert!(public.verify(&message, &signature));
    }

    #[test]
    fn test_wrong_key_fails() {
        let private1 = PrivateKey::generate();
        let public2 = PrivateKey::generate().public_key();

        let message = hash_bytes(b"test message");
        let signature = private1.sign(&message);

        assert!(!public2.verify(&message, &signature));
    }

    #[test]
    fn test_wrong_message_fails() {
        let private = PrivateKey::generate();
        let public = private.public_key();

        let signature = private.sign(&hash_bytes(b"message 1"));

        assert!(!public.verify(&hash_bytes(b"message 2"), &signature));
    }

    #[test]
    fn test_garbage_inputs_fail_closed() {
        let message = hash_bytes(b"m");
        assert!(!PublicKey(vec![1, 2, 3]).verify(&message, &[0u8; 64]));

        let public = PrivateKey::generate().public_key();
        assert!(!public.verify(&message, &[]));
        assert!(PublicKey::from_bytes(&[0u8; 33]).is_err());
    }

    #[test]
    fn test_address_generation() {
        let public = PrivateKey::generate().public_key();
        let address = public.to_address();

        assert!(address.starts_with(ADDRESS_PREFIX));
        assert_eq!(address, public.to_address());
    }

    #[test]
    fn test_base58_display() {
        let public = PrivateKey::generate().public_key();
        let encoded = public.to_base58();

        assert_eq!(bs58::decode(&encoded).into_vec().unwrap(), public.0);
    }

    #[test]
    fn test_key_serialization() {
        let private = PrivateKey::generate();
        let recovered = PrivateKey::from_bytes(&private.to_bytes()).unwrap();

        assert_eq!(private.public_key(), recovered.public_key());
    }
}
