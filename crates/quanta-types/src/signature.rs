use crate::address::Address;
use crate::error::TypesError;
use crate::hash::Hash;
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;

/// Signature bytes (64) produced by the signing scheme.
#[derive(Clone, Copy, PartialEq, Eq, Hash, BorshSerialize, BorshDeserialize)]
pub struct Signature([u8; 64]);

impl Signature {
    pub const LEN: usize = 64;

    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != Self::LEN {
            return Err(TypesError::InvalidSignatureLength {
                expected: Self::LEN,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 64];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// An all-zero signature marks an unsigned transaction.
    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl Default for Signature {
    fn default() -> Self {
        Self([0u8; 64])
    }
}

impl fmt::Debug for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Signature({}...)", hex::encode(&self.0[..8]))
    }
}

/// Public key bytes (32).
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct PublicKey([u8; 32]);

impl PublicKey {
    pub const LEN: usize = 32;

    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn from_slice(slice: &[u8]) -> Result<Self, TypesError> {
        if slice.len() != Self::LEN {
            return Err(TypesError::InvalidPublicKeyLength {
                expected: Self::LEN,
                actual: slice.len(),
            });
        }
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(slice);
        Ok(Self(bytes))
    }

    /// Derive the address owned by this key
    pub fn to_address(&self) -> Address {
        Address::from_public_key(self)
    }

    /// Digest of the key, used to key per-key OTS watermarks.
    pub fn digest(&self) -> Hash {
        Hash::compute(&self.0)
    }

    pub fn is_zero(&self) -> bool {
        self.0.iter().all(|&b| b == 0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({}...)", hex::encode(&self.0[..8]))
    }
}

impl fmt::LowerHex for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_signature_zero() {
        let sig = Signature::from_bytes([1u8; 64]);
        assert!(!sig.is_zero());
        assert!(Signature::default().is_zero());
    }

    #[test]
    fn test_signature_from_slice_length() {
        assert!(Signature::from_slice(&[1u8; 64]).is_ok());
        assert_eq!(
            Signature::from_slice(&[1u8; 10]),
            Err(TypesError::InvalidSignatureLength { expected: 64, actual: 10 })
        );
    }

    #[test]
    fn test_public_key_address_and_digest() {
        let pk = PublicKey::from_bytes([1u8; 32]);
        assert_eq!(pk.to_address(), Address::from_public_key(&pk));
        assert_eq!(pk.digest(), Hash::compute(&[1u8; 32]));
        assert!(PublicKey::from_slice(&[0u8; 31]).is_err());
    }
}
