//! Quanta Types - Core type definitions for the Quanta ledger.
//!
//! This crate provides the fundamental types shared by every other crate:
//! - Hashes (32-byte, blake3 digests)
//! - Addresses (Q-prefixed, checksummed public-key digests)
//! - Transactions (one envelope, one variant per kind)
//! - Blocks and block headers
//! - Per-address ledger state
//! - Chain parameters and genesis configuration

pub mod address;
pub mod address_state;
pub mod block;
pub mod chain_params;
pub mod error;
pub mod genesis;
pub mod hash;
pub mod signature;
pub mod transaction;

#[cfg(feature = "serde")]
mod serialization;

pub use address::Address;
pub use address_state::AddressState;
pub use block::{Block, BlockHeader};
pub use chain_params::ChainParams;
pub use error::TypesError;
pub use genesis::{GenesisAlloc, GenesisConfig, GenesisStaker};
pub use hash::Hash;
pub use signature::{PublicKey, Signature};
pub use transaction::{Transaction, TransactionKind, TransactionType};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        Address, AddressState, Block, BlockHeader, ChainParams, GenesisConfig, Hash, PublicKey,
        Signature, Transaction, TransactionKind, TransactionType, TypesError,
    };
}
