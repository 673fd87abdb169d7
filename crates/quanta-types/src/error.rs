use thiserror::Error;

/// Errors that can occur in type operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TypesError {
    #[error("Invalid address format: {0}")]
    InvalidAddressFormat(String),

    #[error("Invalid address checksum: {0}")]
    InvalidAddressChecksum(String),

    #[error("Invalid hash length: expected 32, got {0}")]
    InvalidHashLength(usize),

    #[error("Invalid signature length: expected {expected}, got {actual}")]
    InvalidSignatureLength { expected: usize, actual: usize },

    #[error("Invalid public key length: expected {expected}, got {actual}")]
    InvalidPublicKeyLength { expected: usize, actual: usize },

    #[error("Invalid hex: {0}")]
    InvalidHex(String),

    #[error("Balance overflow: {balance} + {amount}")]
    BalanceOverflow { balance: u64, amount: u64 },

    #[error("Balance underflow: {balance} - {amount}")]
    BalanceUnderflow { balance: u64, amount: u64 },

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Invalid chain parameters: {0}")]
    InvalidChainParams(String),

    #[error("Invalid genesis: {0}")]
    InvalidGenesis(String),
}

impl From<hex::FromHexError> for TypesError {
    fn from(e: hex::FromHexError) -> Self {
        TypesError::InvalidHex(e.to_string())
    }
}

impl From<borsh::io::Error> for TypesError {
    fn from(e: borsh::io::Error) -> Self {
        TypesError::Serialization(e.to_string())
    }
}
