//! Transaction structure and validation
//!
//! Account-to-account transfers signed with ECDSA.

use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

use crate::crypto::{hash_bytes, Hash, PrivateKey, PublicKey};

/// Transaction errors
#[derive(Debug, Error, PartialEq)]
pub enum TransactionError {
    #[error("Transaction is already signed")]
    AlreadySigned,
    #[error("Invalid amount: {0}")]
    InvalidAmount(f64),
}

/// A signed transfer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    /// Sender identifier (address)
    pub sender: String,
    /// Receiver identifier (address)
    pub receiver: String,
    /// Amount transferred
    pub amount: f64,
    /// Creation time (seconds since Unix epoch)
    pub timestamp: u64,
    /// Key the sender declares the signature was made with
    pub public_key: PublicKey,
    /// `r || s`, empty until signed
    pub signature: Vec<u8>,
}

impl Transaction {
    /// Create an unsigned transaction stamped with the current time
    pub fn new(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
        public_key: PublicKey,
    ) -> Result<Self, TransactionError> {
        let timestamp = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();

        Self::with_timestamp(sender, receiver, amount, timestamp, public_key)
    }

    /// Create an unsigned transaction with an explicit timestamp
    pub fn with_timestamp(
        sender: impl Into<String>,
        receiver: impl Into<String>,
        amount: f64,
        timestamp: u64,
        public_key: PublicKey,
    ) -> Result<Self, TransactionError> {
        if !amount.is_finite() || amount < 0.0 {
            return Err(TransactionError::InvalidAmount(amount));
        }

        Ok(Self {
            sender: sender.into(),
            receiver: receiver.into(),
            amount,
            timestamp,
            public_key,
            signature: Vec::new(),
        })
    }

    /// Calculate transaction hash (signature and public key excluded)
    pub fn hash(&self) -> Hash {
        hash_bytes(&self.to_bytes_for_signing())
    }

    /// Canonical encoding of {sender, receiver, amount, timestamp}
    fn to_bytes_for_signing(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(
            4 + self.sender.len() + 4 + self.receiver.len() + 8 + 8,
        );

        bytes.extend_from_slice(&(self.sender.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.sender.as_bytes());

        bytes.extend_from_slice(&(self.receiver.len() as u32).to_le_bytes());
        bytes.extend_from_slice(self.receiver.as_bytes());

        bytes.extend_from_slice(&self.amount.to_bits().to_le_bytes());
        bytes.extend_from_slice(&self.timestamp.to_le_bytes());

        bytes
    }

    /// Attach a signature over the transaction hash. Signatures are never replaced.
    pub fn sign(&mut self, private_key: &PrivateKey) -> Result<(), TransactionError> {
        if self.is_signed() {
            return Err(TransactionError::AlreadySigned);
        }
        self.signature = private_key.sign(&self.hash());
        Ok(())
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_empty()
    }

    /// Amount must be a finite, non-negative number
    pub fn has_valid_amount(&self) -> bool {
        self.amount.is_finite() && self.amount >= 0.0
    }

    /// Verify the signature against the declared public key
    pub fn verify(&self) -> bool {
        self.is_signed() && self.public_key.verify(&self.hash(), &self.signature)
    }
}
