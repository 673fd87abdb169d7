use crate::error::CryptoError;
use ed25519_dalek::{Signer, Verifier};
use quanta_types::{Address, BlockHeader, PublicKey, Signature, Transaction};
use rand::rngs::OsRng;
use std::fmt;
use zeroize::Zeroizing;

/// Ed25519 keypair for transaction and block signing.
/// The signing key is zeroized on drop.
pub struct Keypair {
    signing_key: ed25519_dalek::SigningKey,
}

impl Keypair {
    /// Generate a new random keypair
    pub fn generate() -> Self {
        let mut csprng = OsRng;
        let signing_key = ed25519_dalek::SigningKey::generate(&mut csprng);
        Self { signing_key }
    }

    /// Create from a 32-byte seed
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = ed25519_dalek::SigningKey::from_bytes(seed);
        Self { signing_key }
    }

    /// Create from a hex-encoded 32-byte seed (validator key files).
    pub fn from_hex(seed_hex: &str) -> Result<Self, CryptoError> {
        let bytes = Zeroizing::new(
            hex::decode(seed_hex.trim().trim_start_matches("0x"))
                .map_err(|_| CryptoError::InvalidPrivateKey)?,
        );
        let seed: [u8; 32] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidSeedLength(bytes.len()))?;
        let seed = Zeroizing::new(seed);
        Ok(Self::from_seed(&seed))
    }

    pub fn public_key(&self) -> PublicKey {
        PublicKey::from_bytes(self.signing_key.verifying_key().to_bytes())
    }

    /// Get the address derived from this keypair
    pub fn address(&self) -> Address {
        self.public_key().to_address()
    }

    /// Sign a message
    pub fn sign(&self, message: &[u8]) -> Signature {
        Signature::from_bytes(self.signing_key.sign(message).to_bytes())
    }

    /// Sign a transaction in place. The signature covers `txhash()`.
    pub fn sign_transaction(&self, tx: &mut Transaction) {
        tx.signature = self.sign(tx.txhash().as_bytes());
    }

    /// Sign a block header in place. The signature covers `compute_hash()`.
    pub fn sign_header(&self, header: &mut BlockHeader) {
        header.signature = self.sign(header.compute_hash().as_bytes());
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Keypair({})", self.address())
    }
}

impl Clone for Keypair {
    fn clone(&self) -> Self {
        let seed = Zeroizing::new(self.signing_key.to_bytes());
        Self::from_seed(&seed)
    }
}

/// Verify an ed25519 signature.
pub fn verify(
    public_key: &PublicKey,
    message: &[u8],
    signature: &Signature,
) -> Result<(), CryptoError> {
    let pk = ed25519_dalek::VerifyingKey::from_bytes(public_key.as_bytes())
        .map_err(|_| CryptoError::InvalidPublicKey)?;
    let sig = ed25519_dalek::Signature::from_bytes(signature.as_bytes());
    pk.verify(message, &sig)
        .map_err(|_| CryptoError::VerificationFailed)
}

/// Verify a transaction: the sender address must derive from the key and
/// the signature must cover `txhash()`.
pub fn verify_transaction(tx: &Transaction) -> Result<(), CryptoError> {
    if tx.public_key.to_address() != tx.addr_from {
        return Err(CryptoError::AddressMismatch(tx.addr_from.to_string()));
    }
    verify(&tx.public_key, tx.txhash().as_bytes(), &tx.signature)
}

/// Verify a block header's producer signature and producer address.
pub fn verify_header(header: &BlockHeader) -> Result<(), CryptoError> {
    if header.producer_public_key.to_address() != header.producer {
        return Err(CryptoError::AddressMismatch(header.producer.to_string()));
    }
    verify(
        &header.producer_public_key,
        header.compute_hash().as_bytes(),
        &header.signature,
    )
}

/// Batch verify multiple signatures.
/// Returns Ok(()) if ALL signatures are valid, Err otherwise.
pub fn batch_verify(items: &[(PublicKey, Vec<u8>, Signature)]) -> Result<(), CryptoError> {
    let mut messages: Vec<&[u8]> = Vec::with_capacity(items.len());
    let mut signatures = Vec::with_capacity(items.len());
    let mut public_keys = Vec::with_capacity(items.len());

    for (pk, msg, sig) in items {
        messages.push(msg);
        signatures.push(ed25519_dalek::Signature::from_bytes(sig.as_bytes()));
        public_keys.push(
            ed25519_dalek::VerifyingKey::from_bytes(pk.as_bytes())
                .map_err(|_| CryptoError::InvalidPublicKey)?,
        );
    }

    ed25519_dalek::verify_batch(&messages, &signatures, &public_keys)
        .map_err(|_| CryptoError::VerificationFailed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use quanta_types::Hash;

    #[test]
    fn test_keypair_from_seed() {
        let kp1 = Keypair::from_seed(&[42u8; 32]);
        let kp2 = Keypair::from_seed(&[42u8; 32]);
        assert_eq!(kp1.public_key(), kp2.public_key());
        assert_eq!(kp1.address(), kp2.address());
        assert_eq!(kp1.clone().address(), kp1.address());
    }

    #[test]
    fn test_keypair_from_hex() {
        let kp = Keypair::from_hex(&"07".repeat(32)).unwrap();
        assert_eq!(kp.public_key(), Keypair::from_seed(&[7u8; 32]).public_key());
        assert_eq!(Keypair::from_hex("0707").unwrap_err(), CryptoError::InvalidSeedLength(2));
        assert!(Keypair::from_hex("zz").is_err());
    }

    #[test]
    fn test_sign_and_verify() {
        let keypair = Keypair::generate();
        let signature = keypair.sign(b"Hello, Quanta!");
        assert!(!signature.is_zero());
        assert!(verify(&keypair.public_key(), b"Hello, Quanta!", &signature).is_ok());
        assert_eq!(
            verify(&keypair.public_key(), b"Wrong message", &signature),
            Err(CryptoError::VerificationFailed)
        );
    }

    #[test]
    fn test_transaction_signature() {
        let kp = Keypair::from_seed(&[1u8; 32]);
        let to = Keypair::from_seed(&[2u8; 32]).address();
        let mut tx = Transaction::transfer(kp.public_key(), to, 10, 1, 0);
        kp.sign_transaction(&mut tx);
        assert!(verify_transaction(&tx).is_ok());

        // Changing a signed field invalidates the signature
        let mut tampered = tx.clone();
        tampered.fee = 2;
        assert!(verify_transaction(&tampered).is_err());

        // Sender must match the key
        let mut spoofed = tx.clone();
        spoofed.addr_from = to;
        assert!(matches!(
            verify_transaction(&spoofed),
            Err(CryptoError::AddressMismatch(_))
        ));
    }

    #[test]
    fn test_header_signature() {
        let kp = Keypair::from_seed(&[3u8; 32]);
        let mut header = BlockHeader::new(Hash::compute(b"parent"), 1, 100, kp.public_key(), 50);
        kp.sign_header(&mut header);
        assert!(verify_header(&header).is_ok());

        header.block_reward = 51;
        assert!(verify_header(&header).is_err());
    }

    #[test]
    fn test_batch_verify() {
        let keypairs: Vec<Keypair> = (0..5u8).map(|i| Keypair::from_seed(&[i; 32])).collect();
        let items: Vec<(PublicKey, Vec<u8>, Signature)> = keypairs
            .iter()
            .enumerate()
            .map(|(i, kp)| {
                let msg = format!("Message {}", i).into_bytes();
                let sig = kp.sign(&msg);
                (kp.public_key(), msg, sig)
            })
            .collect();
        assert!(batch_verify(&items).is_ok());

        let mut invalid = items.clone();
        invalid[2].2 = Signature::from_bytes([0u8; 64]);
        assert!(batch_verify(&invalid).is_err());
    }
}
