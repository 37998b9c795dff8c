//! Cryptography module - SHA-256 hashing, ECDSA signatures, Merkle roots

mod ecdsa;
mod hash;
mod merkle;

pub use ecdsa::*;
pub use hash::*;
pub use merkle::*;
