use quanta_types::{Hash, PublicKey};

/// Blake3 hashing utilities.

/// Compute blake3 hash of data
pub fn hash(data: &[u8]) -> Hash {
    Hash::compute(data)
}

/// Compute blake3 hash of multiple data slices
pub fn hash_multi(data: &[&[u8]]) -> Hash {
    Hash::compute_multi(data)
}

/// Hash with a domain separator
pub fn hash_with_domain(data: &[u8], domain: &str) -> Hash {
    hash_multi(&[domain.as_bytes(), data])
}

const PUBKEY_DOMAIN: &str = "quanta/ots-key";

/// One-time key hash: identifies a (public key, OTS index) pair.
///
/// Recorded in the sender's `used_pubkey_hashes` once consumed.
pub fn pubkey_hash(public_key: &PublicKey, ots_key_index: u64) -> Hash {
    let mut keyed = [0u8; 40];
    keyed[..32].copy_from_slice(public_key.as_bytes());
    keyed[32..].copy_from_slice(&ots_key_index.to_le_bytes());
    hash_with_domain(&keyed, PUBKEY_DOMAIN)
}
