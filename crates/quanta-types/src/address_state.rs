use crate::error::TypesError;
use crate::hash::Hash;
use borsh::{BorshDeserialize, BorshSerialize};
use std::collections::BTreeMap;

/// Ledger state of a single address (stored in the address column).
///
/// The zero value is the state of an address that has never been seen.
#[derive(Clone, Debug, PartialEq, Eq, Default, BorshSerialize, BorshDeserialize)]
pub struct AddressState {
    /// Number of transactions this address originated
    pub nonce: u64,
    /// Spendable balance
    pub balance: u64,
    /// One-time key hashes already consumed, in first-use order
    pub used_pubkey_hashes: Vec<Hash>,
    /// Hashes of transactions touching this address, oldest first
    pub tx_hashes: Vec<Hash>,
    /// Highest OTS index used, keyed by public key digest
    pub ots_watermarks: BTreeMap<Hash, u64>,
}

impl AddressState {
    /// Create a new empty state
    pub fn new() -> Self {
        Self::default()
    }

    /// State holding only a balance (genesis allocations).
    pub fn with_balance(balance: u64) -> Self {
        Self {
            balance,
            ..Self::default()
        }
    }

    /// Never used: nonce 0, no balance, no history.
    pub fn is_empty(&self) -> bool {
        self.nonce == 0
            && self.balance == 0
            && self.used_pubkey_hashes.is_empty()
            && self.tx_hashes.is_empty()
    }

    pub fn increment_nonce(&mut self) {
        self.nonce += 1;
    }

    /// Add to the balance, failing instead of wrapping.
    pub fn credit(&mut self, amount: u64) -> Result<(), TypesError> {
        self.balance = self
            .balance
            .checked_add(amount)
            .ok_or(TypesError::BalanceOverflow { balance: self.balance, amount })?;
        Ok(())
    }

    /// Subtract from the balance, failing instead of going negative.
    pub fn debit(&mut self, amount: u64) -> Result<(), TypesError> {
        self.balance = self
            .balance
            .checked_sub(amount)
            .ok_or(TypesError::BalanceUnderflow { balance: self.balance, amount })?;
        Ok(())
    }

    pub fn has_used_pubkey(&self, pubkey_hash: &Hash) -> bool {
        self.used_pubkey_hashes.contains(pubkey_hash)
    }

    /// Record a consumed one-time key. Recording twice is a no-op.
    pub fn record_pubkey(&mut self, pubkey_hash: Hash) {
        if !self.has_used_pubkey(&pubkey_hash) {
            self.used_pubkey_hashes.push(pubkey_hash);
        }
    }

    pub fn ots_watermark(&self, key_digest: &Hash) -> Option<u64> {
        self.ots_watermarks.get(key_digest).copied()
    }

    /// Raise the watermark for a key; lower values are ignored.
    pub fn raise_ots_watermark(&mut self, key_digest: Hash, index: u64) {
        let entry = self.ots_watermarks.entry(key_digest).or_insert(index);
        if *entry < index {
            *entry = index;
        }
    }

    pub fn has_tx(&self, txhash: &Hash) -> bool {
        self.tx_hashes.contains(txhash)
    }

    /// Append a transaction hash to the history (deduplicated).
    pub fn push_tx(&mut self, txhash: Hash) {
        if !self.has_tx(&txhash) {
            self.tx_hashes.push(txhash);
        }
    }

    /// Most recent `window` transaction hashes, most recent first.
    pub fn latest_tx_hashes(&self, window: usize) -> Vec<Hash> {
        self.tx_hashes.iter().rev().take(window).copied().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_state() {
        let state = AddressState::new();
        assert!(state.is_empty());
        assert_eq!(state.balance, 0);
        assert_eq!(state.nonce, 0);
    }

    #[test]
    fn test_credit_and_debit() {
        let mut state = AddressState::with_balance(10);
        state.credit(5).unwrap();
        assert_eq!(state.balance, 15);
        state.debit(15).unwrap();
        assert_eq!(state.balance, 0);

        assert_eq!(
            state.debit(1),
            Err(TypesError::BalanceUnderflow { balance: 0, amount: 1 })
        );
        assert_eq!(state.balance, 0);

        let mut full = AddressState::with_balance(u64::MAX);
        assert!(full.credit(1).is_err());
        assert_eq!(full.balance, u64::MAX);
    }

    #[test]
    fn test_pubkey_recording_is_a_set() {
        let mut state = AddressState::new();
        let h = Hash::compute(b"a");
        state.record_pubkey(h);
        state.record_pubkey(h);
        assert_eq!(state.used_pubkey_hashes, vec![h]);
        assert!(state.has_used_pubkey(&h));
    }

    #[test]
    fn test_ots_watermark_only_rises() {
        let mut state = AddressState::new();
        let key = Hash::compute(b"pk");
        assert_eq!(state.ots_watermark(&key), None);
        state.raise_ots_watermark(key, 5);
        state.raise_ots_watermark(key, 3);
        assert_eq!(state.ots_watermark(&key), Some(5));
        state.raise_ots_watermark(key, 9);
        assert_eq!(state.ots_watermark(&key), Some(9));
    }

    #[test]
    fn test_latest_tx_hashes_most_recent_first() {
        let mut state = AddressState::new();
        let hashes: Vec<Hash> = (0u8..5).map(|i| Hash::compute(&[i])).collect();
        for h in &hashes {
            state.push_tx(*h);
        }
        assert_eq!(state.latest_tx_hashes(2), vec![hashes[4], hashes[3]]);
        assert_eq!(state.latest_tx_hashes(10).len(), 5);
        assert!(state.latest_tx_hashes(0).is_empty());
    }
}
