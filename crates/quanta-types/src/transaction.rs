use crate::address::Address;
use crate::hash::Hash;
use crate::signature::{PublicKey, Signature};
use borsh::{BorshDeserialize, BorshSerialize};
use std::fmt;

/// Transaction type tag, as reported to clients.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "SCREAMING_SNAKE_CASE"))]
pub enum TransactionType {
    Transfer,
    Stake,
    Destake,
    CoinBase,
}

impl TransactionType {
    fn tag(&self) -> u8 {
        match self {
            TransactionType::Transfer => 0,
            TransactionType::Stake => 1,
            TransactionType::Destake => 2,
            TransactionType::CoinBase => 3,
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Transfer => write!(f, "TRANSFER"),
            TransactionType::Stake => write!(f, "STAKE"),
            TransactionType::Destake => write!(f, "DESTAKE"),
            TransactionType::CoinBase => write!(f, "COINBASE"),
        }
    }
}

/// Kind-specific payload of a transaction.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
#[cfg_attr(feature = "serde", serde(rename_all = "snake_case"))]
pub enum TransactionKind {
    /// Move `amount` from the sender to `addr_to`.
    Transfer { addr_to: Address, amount: u64 },
    /// Lock `amount` of the sender's balance as stake from `activation_epoch`.
    Stake { activation_epoch: u64, amount: u64 },
    /// Stop validating at the next epoch boundary; stake is released then.
    Destake,
    /// Block reward claim. The amount comes from the enclosing block header.
    CoinBase,
}

impl TransactionKind {
    pub fn tx_type(&self) -> TransactionType {
        match self {
            TransactionKind::Transfer { .. } => TransactionType::Transfer,
            TransactionKind::Stake { .. } => TransactionType::Stake,
            TransactionKind::Destake => TransactionType::Destake,
            TransactionKind::CoinBase => TransactionType::CoinBase,
        }
    }
}

/// A signed ledger transaction.
///
/// The envelope fields are shared by every kind. `txhash` covers every
/// field except `signature`, and the signature is made over `txhash`.
#[derive(Clone, Debug, PartialEq, Eq, BorshSerialize, BorshDeserialize)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct Transaction {
    /// Originating address (must be derived from `public_key`)
    pub addr_from: Address,
    /// Signing public key
    pub public_key: PublicKey,
    /// Signature over `txhash()`
    pub signature: Signature,
    /// One-time key index; strictly increasing per public key
    pub ots_key_index: u64,
    /// Fee credited to the block producer
    pub fee: u64,
    /// Kind-specific payload
    pub kind: TransactionKind,
}

impl Transaction {
    /// Create an unsigned transaction originating from `public_key`'s address.
    pub fn new(public_key: PublicKey, ots_key_index: u64, fee: u64, kind: TransactionKind) -> Self {
        Self {
            addr_from: public_key.to_address(),
            public_key,
            signature: Signature::default(),
            ots_key_index,
            fee,
            kind,
        }
    }

    /// Shorthand for an unsigned transfer.
    pub fn transfer(
        public_key: PublicKey,
        addr_to: Address,
        amount: u64,
        fee: u64,
        ots_key_index: u64,
    ) -> Self {
        Self::new(public_key, ots_key_index, fee, TransactionKind::Transfer { addr_to, amount })
    }

    /// Shorthand for an unsigned stake.
    pub fn stake(
        public_key: PublicKey,
        amount: u64,
        activation_epoch: u64,
        fee: u64,
        ots_key_index: u64,
    ) -> Self {
        Self::new(
            public_key,
            ots_key_index,
            fee,
            TransactionKind::Stake { activation_epoch, amount },
        )
    }

    /// Shorthand for an unsigned coinbase claim.
    pub fn coinbase(public_key: PublicKey, ots_key_index: u64) -> Self {
        Self::new(public_key, ots_key_index, 0, TransactionKind::CoinBase)
    }

    /// Content hash over the canonical fields (signature excluded).
    pub fn txhash(&self) -> Hash {
        let mut data = Vec::with_capacity(160);
        data.push(self.kind.tx_type().tag());
        data.extend_from_slice(self.addr_from.as_bytes());
        data.extend_from_slice(self.public_key.as_bytes());
        data.extend_from_slice(&self.ots_key_index.to_le_bytes());
        data.extend_from_slice(&self.fee.to_le_bytes());
        match &self.kind {
            TransactionKind::Transfer { addr_to, amount } => {
                data.extend_from_slice(addr_to.as_bytes());
                data.extend_from_slice(&amount.to_le_bytes());
            }
            TransactionKind::Stake { activation_epoch, amount } => {
                data.extend_from_slice(&activation_epoch.to_le_bytes());
                data.extend_from_slice(&amount.to_le_bytes());
            }
            TransactionKind::Destake | TransactionKind::CoinBase => {}
        }
        Hash::compute(&data)
    }

    pub fn tx_type(&self) -> TransactionType {
        self.kind.tx_type()
    }

    pub fn is_coinbase(&self) -> bool {
        matches!(self.kind, TransactionKind::CoinBase)
    }

    /// Stake or Destake: changes the validator set.
    pub fn is_staking(&self) -> bool {
        matches!(self.kind, TransactionKind::Stake { .. } | TransactionKind::Destake)
    }

    /// Amount moved out of the sender's balance, excluding the fee.
    pub fn amount(&self) -> u64 {
        match &self.kind {
            TransactionKind::Transfer { amount, .. } => *amount,
            TransactionKind::Stake { amount, .. } => *amount,
            TransactionKind::Destake | TransactionKind::CoinBase => 0,
        }
    }

    /// Total debit from the sender (`amount + fee`), `None` on overflow.
    pub fn total_debit(&self) -> Option<u64> {
        self.amount().checked_add(self.fee)
    }

    /// Receiving address, for kinds that have one.
    pub fn addr_to(&self) -> Option<Address> {
        match &self.kind {
            TransactionKind::Transfer { addr_to, .. } => Some(*addr_to),
            _ => None,
        }
    }

    pub fn is_signed(&self) -> bool {
        !self.signature.is_zero()
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} {{ hash: {}, from: {:?}, amount: {}, fee: {}, ots: {} }}",
            self.tx_type(),
            self.txhash().short(),
            self.addr_from,
            self.amount(),
            self.fee,
            self.ots_key_index
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pk() -> PublicKey {
        PublicKey::from_bytes([2u8; 32])
    }

    fn dest() -> Address {
        Address::from_public_key(&PublicKey::from_bytes([3u8; 32]))
    }

    #[test]
    fn test_transfer_fields() {
        let tx = Transaction::transfer(pk(), dest(), 125, 19, 13);
        assert_eq!(tx.tx_type(), TransactionType::Transfer);
        assert_eq!(tx.addr_from, pk().to_address());
        assert_eq!(tx.amount(), 125);
        assert_eq!(tx.total_debit(), Some(144));
        assert_eq!(tx.addr_to(), Some(dest()));
        assert!(!tx.is_signed());
    }

    #[test]
    fn test_txhash_excludes_signature() {
        let mut tx = Transaction::transfer(pk(), dest(), 10, 1, 0);
        let before = tx.txhash();
        tx.signature = Signature::from_bytes([9u8; 64]);
        assert_eq!(before, tx.txhash());
    }

    #[test]
    fn test_txhash_covers_every_canonical_field() {
        let base = Transaction::transfer(pk(), dest(), 10, 1, 0);

        let mut other = base.clone();
        other.ots_key_index = 1;
        assert_ne!(base.txhash(), other.txhash());

        let mut other = base.clone();
        other.fee = 2;
        assert_ne!(base.txhash(), other.txhash());

        let mut other = base.clone();
        other.kind = TransactionKind::Transfer { addr_to: dest(), amount: 11 };
        assert_ne!(base.txhash(), other.txhash());

        let stake = Transaction::stake(pk(), 10, 1, 1, 0);
        assert_ne!(base.txhash(), stake.txhash());
    }

    #[test]
    fn test_total_debit_overflow() {
        let tx = Transaction::transfer(pk(), dest(), u64::MAX, 1, 0);
        assert_eq!(tx.total_debit(), None);
    }

    #[test]
    fn test_coinbase_has_no_amount() {
        let tx = Transaction::coinbase(pk(), 0);
        assert!(tx.is_coinbase());
        assert!(!tx.is_staking());
        assert_eq!(tx.amount(), 0);
        assert_eq!(tx.addr_to(), None);
    }

    #[test]
    fn test_borsh_roundtrip_keeps_hash() {
        let tx = Transaction::stake(pk(), 500, 3, 2, 7);
        let bytes = borsh::to_vec(&tx).unwrap();
        let decoded: Transaction = borsh::from_slice(&bytes).unwrap();
        assert_eq!(decoded.txhash(), tx.txhash());
    }
}
