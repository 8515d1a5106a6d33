use std::collections::{HashMap, HashSet};

use crate::error::TxError;
use crate::types::coin::Coin;
use crate::types::transaction::{InputId, Transaction};

/// The UTXO set: `(tx_id, output_index) -> Coin`.
#[derive(Debug, Clone, Default)]
pub struct State {
    pub coins: HashMap<InputId, Coin>,
}

impl State {
    pub fn new() -> Self {
        Self { coins: HashMap::new() }
    }

    /// Apply a transaction, letting this state transition.
    ///
    /// Signature-to-owner matching is greedy: for each distinct input owner
    /// we consume the first remaining signature that verifies, independent
    /// of signature order. Returns the transaction fee.
    pub fn process_transaction(&mut self, tx: &Transaction, check_balance: bool) -> Result<i64, TxError> {
        let mut input_coins = Vec::with_capacity(tx.input_ids.len());
        for input_id in &tx.input_ids {
            match self.coins.get(input_id) {
                Some(coin) => input_coins.push(*coin),
                None => return Err(TxError::CoinNotFound),
            }
        }

        let mut seen_inputs = HashSet::with_capacity(tx.input_ids.len());
        for input_id in &tx.input_ids {
            if !seen_inputs.insert(*input_id) {
                return Err(TxError::DupCoin);
            }
        }

        let owners: HashSet<_> = input_coins.iter().map(|c| c.owner).collect();
        let signed_data = tx.signed_data();
        let mut remaining_sigs: Vec<_> = tx.sigs.clone();
        for owner in owners {
            let Some(pos) = remaining_sigs.iter().position(|sig| owner.verify(sig, &signed_data)) else {
                return Err(TxError::InvalidSig);
            };
            remaining_sigs.remove(pos);
        }

        let total_in: i64 = input_coins.iter().map(|c| c.value as i64).sum();
        let total_out: i64 = tx.outputs.iter().map(|c| c.value as i64).sum();
        let fee = total_in - total_out;

        if check_balance && fee < 0 {
            return Err(TxError::Unbalance);
        }

        for input_id in &tx.input_ids {
            self.coins.remove(input_id);
        }
        for (i, coin) in tx.outputs.iter().enumerate() {
            self.coins.insert((tx.id(), i as u8), *coin);
        }

        Ok(fee)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash_of_null, PrivateKey};

    #[test]
    fn spend_valid_coin() {
        let sk = PrivateKey::generate();
        let pk = sk.public_key();
        let mut state = State::new();
        let seed_id = hash_of_null();
        state.coins.insert((seed_id, 0), Coin::new(pk, 100));

        let mut tx = Transaction::new(vec![(seed_id, 0)], vec![Coin::new(pk, 90)]);
        let sig = sk.sign(&tx.signed_data());
        tx.add_signature(sig);

        let fee = state.process_transaction(&tx, true).unwrap();
        assert_eq!(fee, 10);
        assert!(!state.coins.contains_key(&(seed_id, 0)));
        assert!(state.coins.contains_key(&(tx.id(), 0)));
    }

    #[test]
    fn missing_coin_errors() {
        let pk = PrivateKey::generate().public_key();
        let mut state = State::new();
        let tx = Transaction::new(vec![(hash_of_null(), 0)], vec![Coin::new(pk, 1)]);
        let err = state.process_transaction(&tx, true).unwrap_err();
        assert!(matches!(err, TxError::CoinNotFound));
    }

    #[test]
    fn bad_signature_errors() {
        let sk = PrivateKey::generate();
        let other_sk = PrivateKey::generate();
        let pk = sk.public_key();
        let mut state = State::new();
        let seed_id = hash_of_null();
        state.coins.insert((seed_id, 0), Coin::new(pk, 100));

        let mut tx = Transaction::new(vec![(seed_id, 0)], vec![Coin::new(pk, 90)]);
        let sig = other_sk.sign(&tx.signed_data());
        tx.add_signature(sig);

        let err = state.process_transaction(&tx, true).unwrap_err();
        assert!(matches!(err, TxError::InvalidSig));
    }

    #[test]
    fn unbalanced_transaction_rejected_when_checked() {
        let sk = PrivateKey::generate();
        let pk = sk.public_key();
        let mut state = State::new();
        let seed_id = hash_of_null();
        state.coins.insert((seed_id, 0), Coin::new(pk, 100));

        let mut tx = Transaction::new(vec![(seed_id, 0)], vec![Coin::new(pk, 200)]);
        let sig = sk.sign(&tx.signed_data());
        tx.add_signature(sig);

        assert!(matches!(state.process_transaction(&tx, true), Err(TxError::Unbalance)));
    }

    #[test]
    fn reward_transaction_skips_balance_check() {
        let pk = PrivateKey::generate().public_key();
        let mut state = State::new();
        let tx = Transaction::new(vec![], vec![Coin::new(pk, 1000)]);
        let fee = state.process_transaction(&tx, false).unwrap();
        assert_eq!(fee, -1000);
    }
}
