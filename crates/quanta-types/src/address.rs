use crate::error::TypesError;
use crate::hash::Hash;
use crate::signature::PublicKey;
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;
use std::str::FromStr;

/// Ledger address: the blake3 digest of a public key.
///
/// # Encoding
/// `Q` + hex(digest) + hex(checksum), where the checksum is the first four
/// bytes of `blake3(digest)`. The encoded form is always 73 ASCII characters
/// and is the only form accepted from the outside world.
#[derive(
    Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, BorshSerialize, BorshDeserialize,
)]
pub struct Address([u8; 32]);

impl Address {
    pub const LEN: usize = 32;
    pub const PREFIX: char = 'Q';
    pub const CHECKSUM_LEN: usize = 4;
    /// Length of the encoded form: prefix + hex digest + hex checksum.
    pub const ENCODED_LEN: usize = 1 + 2 * (Self::LEN + Self::CHECKSUM_LEN);

    pub const fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    pub const fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Derive the address owned by a public key.
    pub fn from_public_key(public_key: &PublicKey) -> Self {
        Self(*Hash::compute(public_key.as_bytes()).as_bytes())
    }

    /// Decode the raw encoded bytes a client sent (e.g. a query field).
    pub fn from_encoded(encoded: &[u8]) -> Result<Self, TypesError> {
        let s = std::str::from_utf8(encoded)
            .map_err(|_| TypesError::InvalidAddressFormat("not valid UTF-8".to_string()))?;
        s.parse()
    }

    /// Cheap shape check used before a lookup: prefix and length only.
    pub fn looks_like_address(encoded: &[u8]) -> bool {
        encoded.len() == Self::ENCODED_LEN && encoded.first() == Some(&(Self::PREFIX as u8))
    }

    fn checksum(&self) -> [u8; 4] {
        let digest = Hash::compute(&self.0);
        let mut out = [0u8; 4];
        out.copy_from_slice(&digest.as_bytes()[..Self::CHECKSUM_LEN]);
        out
    }

    /// Encoded, checksummed representation.
    pub fn encode(&self) -> String {
        format!(
            "{}{}{}",
            Self::PREFIX,
            hex::encode(self.0),
            hex::encode(self.checksum())
        )
    }
}

impl fmt::Display for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.encode())
    }
}

impl fmt::Debug for Address {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Address({}{}..)", Self::PREFIX, hex::encode(&self.0[..6]))
    }
}

impl FromStr for Address {
    type Err = TypesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let body = s.strip_prefix(Self::PREFIX).ok_or_else(|| {
            TypesError::InvalidAddressFormat(format!("missing '{}' prefix", Self::PREFIX))
        })?;

        if s.len() != Self::ENCODED_LEN {
            return Err(TypesError::InvalidAddressFormat(format!(
                "expected {} characters, got {}",
                Self::ENCODED_LEN,
                s.len()
            )));
        }

        let raw = hex::decode(body)?;
        let (digest, checksum) = raw.split_at(Self::LEN);

        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(digest);
        let address = Self(bytes);

        if address.checksum() != checksum {
            return Err(TypesError::InvalidAddressChecksum(s.to_string()));
        }

        Ok(address)
    }
}

impl AsRef<[u8]> for Address {
    fn as_ref(&self) -> &[u8] {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Address {
        Address::from_public_key(&PublicKey::from_bytes([7u8; 32]))
    }

    #[test]
    fn test_address_from_public_key_is_deterministic() {
        let pk = PublicKey::from_bytes([42u8; 32]);
        assert_eq!(Address::from_public_key(&pk), Address::from_public_key(&pk));
        assert_ne!(
            Address::from_public_key(&pk),
            Address::from_public_key(&PublicKey::from_bytes([43u8; 32]))
        );
    }

    #[test]
    fn test_address_encoding_shape() {
        let encoded = sample().encode();
        assert_eq!(encoded.len(), Address::ENCODED_LEN);
        assert_eq!(encoded.len(), 73);
        assert!(encoded.starts_with('Q'));
        assert!(Address::looks_like_address(encoded.as_bytes()));
    }

    #[test]
    fn test_address_roundtrip() {
        let addr = sample();
        let parsed: Address = addr.to_string().parse().unwrap();
        assert_eq!(addr, parsed);
        assert_eq!(Address::from_encoded(addr.encode().as_bytes()).unwrap(), addr);
    }

    #[test]
    fn test_address_rejects_bad_checksum() {
        let mut encoded = sample().encode().into_bytes();
        let last = encoded.len() - 1;
        encoded[last] = if encoded[last] == b'0' { b'1' } else { b'0' };
        let err = Address::from_encoded(&encoded).unwrap_err();
        assert!(matches!(err, TypesError::InvalidAddressChecksum(_)));
    }

    #[test]
    fn test_address_rejects_malformed() {
        assert!(Address::from_str("").is_err());
        assert!(Address::from_str("invalid").is_err());
        assert!(Address::from_str("Q1234").is_err());

        // Right length, wrong prefix
        let encoded = sample().encode();
        let wrong_prefix = format!("Z{}", &encoded[1..]);
        assert!(Address::from_str(&wrong_prefix).is_err());

        // Right length, not hex
        let not_hex = format!("Q{}", "z".repeat(72));
        assert!(matches!(
            Address::from_str(&not_hex),
            Err(TypesError::InvalidHex(_))
        ));
    }

    #[test]
    fn test_address_from_encoded_rejects_non_utf8() {
        assert!(Address::from_encoded(&[0xff, 0xfe]).is_err());
    }
}
