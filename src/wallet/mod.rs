//! Wallet module - Key handling and transfer signing
//!
//! The wallet never touches consensus: it only builds signed transactions
//! that a node will verify on submission.

use crate::crypto::{PrivateKey, PublicKey};
use crate::validation::{Transaction, TransactionError};
use thiserror::Error;

/// Wallet errors
#[derive(Debug, Error)]
pub enum WalletError {
    #[error("Invalid private key")]
    InvalidPrivateKey,
    #[error("Transaction error: {0}")]
    Transaction(#[from] TransactionError),
}

/// A signing key with its derived public key and address
#[derive(Debug, Clone)]
pub struct KeyPair {
    private_key: PrivateKey,
    pub public_key: PublicKey,
    pub address: String,
}

impl KeyPair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        Self::from_private_key(PrivateKey::generate())
    }

    /// Import from raw private key bytes
    pub fn from_private_key_bytes(bytes: &[u8; 32]) -> Result<Self, WalletError> {
        let private_key = PrivateKey::from_bytes(bytes).map_err(|_| WalletError::InvalidPrivateKey)?;
        Ok(Self::from_private_key(private_key))
    }

    /// Import from a 64-character hex private key
    pub fn from_private_key_hex(hex_str: &str) -> Result<Self, WalletError> {
        let bytes: [u8; 32] = hex::decode(hex_str.trim())
            .ok()
            .and_then(|bytes| bytes.try_into().ok())
            .ok_or(WalletError::InvalidPrivateKey)?;
        Self::from_private_key_bytes(&bytes)
    }

    fn from_private_key(private_key: PrivateKey) -> Self {
        let public_key = private_key.public_key();
        let address = public_key.to_address();
        Self {
            private_key,
            public_key,
            address,
        }
    }

    pub fn private_key_hex(&self) -> String {
        hex::encode(self.private_key.to_bytes())
    }

    /// Build and sign a transfer stamped with the current time
    pub fn transfer(
        &self,
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
    ) -> Result<Transaction, WalletError> {
        let mut tx = Transaction::new(sender, receiver, amount, self.public_key.clone())?;
        tx.sign(&self.private_key)?;
        Ok(tx)
    }
}
