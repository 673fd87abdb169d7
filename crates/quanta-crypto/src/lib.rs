//! Quanta Crypto - Signing and hashing primitives for the Quanta ledger.
//!
//! This crate provides:
//! - Ed25519 keypairs and verification for transactions and block headers
//! - Blake3 helpers, including the one-time key hash used for replay protection

pub mod ed25519;
pub mod error;
pub mod hash;

pub use ed25519::{batch_verify, verify, verify_header, verify_transaction, Keypair};
pub use error::CryptoError;
pub use hash::{hash, hash_multi, hash_with_domain, pubkey_hash};
