use thiserror::Error;

/// Errors that can occur in consensus operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConsensusError {
    #[error("Insufficient stake: {amount} below minimum {minimum}")]
    InsufficientStake { amount: u64, minimum: u64 },

    #[error("Invalid activation epoch {activation}: must be after current epoch {current}")]
    InvalidActivationEpoch { activation: u64, current: u64 },

    #[error("Validator already exists: {0}")]
    ValidatorAlreadyExists(String),

    #[error("Validator not found: {0}")]
    ValidatorNotFound(String),

    #[error("Validator already terminating: {0}")]
    AlreadyTerminating(String),

    #[error("Invalid epoch: expected > {current}, got {actual}")]
    InvalidEpoch { current: u64, actual: u64 },

    #[error("Total stake overflows")]
    StakeOverflow,
}
