use quanta_types::Hash;
use thiserror::Error;

/// Errors that can occur in chain and ledger operations.
///
/// Everything except `ChainInconsistency` is a rejection of one input; the
/// node keeps running. `ChainInconsistency` means committed state can no
/// longer be trusted and halts every further mutation.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ChainError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Malformed transaction: {0}")]
    MalformedTransaction(String),

    #[error("Invalid signature: {0}")]
    SignatureInvalid(String),

    #[error("One-time key reused: {address} index {ots_key_index}")]
    ReplayedOneTimeKey { address: String, ots_key_index: u64 },

    #[error("Insufficient balance: required {required}, have {available}")]
    InsufficientBalance { required: u64, available: u64 },

    #[error("Unknown parent block: {0}")]
    UnknownParentBlock(Hash),

    #[error("Stake ineligible: {0}")]
    StakeIneligible(String),

    #[error("Chain inconsistency: {0}")]
    ChainInconsistency(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed block: {0}")]
    MalformedBlock(String),

    #[error("Duplicate block: {0}")]
    DuplicateBlock(Hash),

    #[error("Duplicate transaction: {0}")]
    DuplicateTransaction(Hash),

    #[error("Transaction pool full ({0} entries)")]
    PoolFull(usize),

    #[error("Storage error: {0}")]
    Storage(String),
}

impl ChainError {
    /// Only an inconsistency between committed state and the chain is fatal.
    pub fn is_fatal(&self) -> bool {
        matches!(self, ChainError::ChainInconsistency(_))
    }
}

impl From<quanta_storage::StorageError> for ChainError {
    fn from(e: quanta_storage::StorageError) -> Self {
        match e {
            quanta_storage::StorageError::NotFound(what) => ChainError::NotFound(what),
            other => ChainError::Storage(other.to_string()),
        }
    }
}

impl From<quanta_crypto::CryptoError> for ChainError {
    fn from(e: quanta_crypto::CryptoError) -> Self {
        ChainError::SignatureInvalid(e.to_string())
    }
}

impl From<quanta_consensus::ConsensusError> for ChainError {
    fn from(e: quanta_consensus::ConsensusError) -> Self {
        ChainError::StakeIneligible(e.to_string())
    }
}

impl From<quanta_types::TypesError> for ChainError {
    fn from(e: quanta_types::TypesError) -> Self {
        use quanta_types::TypesError;
        match e {
            TypesError::InvalidAddressFormat(_)
            | TypesError::InvalidAddressChecksum(_)
            | TypesError::InvalidHex(_) => ChainError::InvalidAddress(e.to_string()),
            other => ChainError::MalformedTransaction(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_only_inconsistency_is_fatal() {
        assert!(ChainError::ChainInconsistency("x".into()).is_fatal());
        assert!(!ChainError::MalformedBlock("x".into()).is_fatal());
        assert!(!ChainError::Storage("x".into()).is_fatal());
    }

    #[test]
    fn test_storage_not_found_maps_to_not_found() {
        let e: ChainError = quanta_storage::StorageError::NotFound("addr".into()).into();
        assert_eq!(e, ChainError::NotFound("addr".into()));
    }

    #[test]
    fn test_address_errors_map_to_invalid_address() {
        let e: ChainError = quanta_types::TypesError::InvalidAddressChecksum("Qab".into()).into();
        assert!(matches!(e, ChainError::InvalidAddress(_)));
    }
}
