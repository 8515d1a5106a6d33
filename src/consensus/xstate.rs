use std::time::{SystemTime, UNIX_EPOCH};

use crate::consensus::params::{
    self, Threshold, BLOCK_INTERVAL, INIT_REWARD, REWARD_UPDATE_INTERVAL, THRESHOLD_UPDATE_INTERVAL,
};
use crate::consensus::state::State;
use crate::crypto::{hash_of_null, Hash};
use crate::error::{BlockError, TxError};
use crate::types::block::Block;

/// A [`State`] extended with block-level transition and mining metadata.
#[derive(Debug, Clone)]
pub struct ExtendedState {
    pub state: State,
    pub age: u64,
    pub reward: u64,
    pub threshold: Threshold,
    pub latest_id: Hash,
    pub latest_timestamp: u32,
    pub last_threshold_update: Option<u32>,
}

impl ExtendedState {
    pub fn new() -> Self {
        Self {
            state: State::new(),
            age: 0,
            reward: INIT_REWARD,
            threshold: params::init_threshold(),
            latest_id: hash_of_null(),
            latest_timestamp: 0,
            last_threshold_update: None,
        }
    }

    /// Apply a block. `block.prev_id` must equal `self.latest_id` — a
    /// violation is a programmer error upstream (the caller is expected to
    /// have resolved the correct predecessor state), so it's asserted, not
    /// surfaced as a `BlockError`.
    pub fn process_block(&mut self, block: &Block) -> Result<(), BlockError> {
        assert_eq!(self.latest_id, block.prev_id);

        let now = now_secs();
        if !(self.latest_timestamp <= block.timestamp && block.timestamp <= now) {
            return Err(BlockError::InvalidTimestamp);
        }

        if !(block.id() < self.threshold) {
            return Err(BlockError::InvalidNonce);
        }

        if block.txs.len() > Block::MAX_TXS {
            return Err(BlockError::InvalidTxCount);
        }

        let coins_backup = self.state.coins.clone();

        let mut total_fee: i64 = 0;
        for (i, tx) in block.txs.iter().enumerate() {
            match self.state.process_transaction(tx, i != 0) {
                Ok(fee) => total_fee += fee,
                Err(source) => {
                    self.state.coins = coins_backup;
                    return Err(BlockError::InvalidTx { index: i, source });
                }
            }
        }

        if total_fee + self.reward as i64 != 0 {
            self.state.coins = coins_backup;
            return Err(BlockError::Unbalance);
        }

        self.latest_id = block.id();
        self.latest_timestamp = block.timestamp;
        self.grow();

        Ok(())
    }

    /// Apply a standalone transaction directly to the underlying UTXO set,
    /// bypassing block-level bookkeeping. Used by the miner to validate and
    /// pack candidate transactions before a block is ever assembled.
    pub fn process_transaction(&mut self, tx: &crate::types::Transaction, check_balance: bool) -> Result<i64, TxError> {
        self.state.process_transaction(tx, check_balance)
    }

    /// Record a block this node just mined itself, without re-validating it
    /// (the miner already confirmed the nonce against `self.threshold`
    /// before assembling it). Mirrors the miner's post-success bookkeeping,
    /// which updates metadata and calls `grow` directly instead of routing
    /// back through `process_block`.
    pub fn record_own_block(&mut self, reward_tx: &crate::types::Transaction, block_id: Hash, timestamp: u32) -> Result<(), TxError> {
        self.process_transaction(reward_tx, false)?;
        self.latest_id = block_id;
        self.latest_timestamp = timestamp;
        self.grow();
        Ok(())
    }

    /// Advance `age` by one, retargeting the threshold and halving the
    /// reward on their respective schedules.
    fn grow(&mut self) {
        self.age += 1;

        if self.age == 1 {
            self.last_threshold_update = Some(self.latest_timestamp);
            return;
        }

        if self.age % THRESHOLD_UPDATE_INTERVAL == 1 {
            let last_update = self.last_threshold_update.expect("threshold update recorded after first grow");
            let observed = (self.latest_timestamp - last_update) as u64;
            let expected = BLOCK_INTERVAL * THRESHOLD_UPDATE_INTERVAL;
            self.threshold = params::retarget(&self.threshold, observed, expected);
            self.last_threshold_update = Some(self.latest_timestamp);
        }

        if self.age % REWARD_UPDATE_INTERVAL == 0 {
            self.reward /= 2;
        }
    }
}

impl Default for ExtendedState {
    fn default() -> Self {
        Self::new()
    }
}

fn now_secs() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as u32
}

/// A transaction error surfaced while checking a standalone transaction,
/// e.g. by the miner before packing it into a block.
pub type StandaloneTxError = TxError;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;
    use crate::types::coin::Coin;
    use crate::types::transaction::Transaction;

    fn mine_one(xstate: &mut ExtendedState, owner: crate::crypto::PublicKey) -> Block {
        let reward_tx = Transaction::new(vec![], vec![Coin::new(owner, xstate.reward)]);
        let mut block = Block::new(xstate.latest_id);
        block.add_transaction(reward_tx);
        block.update_timestamp();
        if block.timestamp < xstate.latest_timestamp {
            block.timestamp = xstate.latest_timestamp;
        }
        // brute-force a valid nonce; threshold is generous enough for tests to terminate quickly
        for nonce in 0u32.. {
            block.set_nonce(nonce.to_be_bytes());
            if block.id() < xstate.threshold {
                break;
            }
        }
        xstate.process_block(&block).unwrap();
        block
    }

    #[test]
    fn reward_transaction_must_balance() {
        let owner = PrivateKey::generate().public_key();
        let mut xstate = ExtendedState::new();
        mine_one(&mut xstate, owner);
        assert_eq!(xstate.age, 1);
        assert_eq!(xstate.last_threshold_update, Some(xstate.latest_timestamp));
    }

    #[test]
    fn reward_halves_on_schedule() {
        let owner = PrivateKey::generate().public_key();
        let mut xstate = ExtendedState::new();
        for _ in 0..REWARD_UPDATE_INTERVAL {
            mine_one(&mut xstate, owner);
        }
        assert_eq!(xstate.reward, INIT_REWARD / 2);
    }

    #[test]
    fn stale_timestamp_rejected() {
        let owner = PrivateKey::generate().public_key();
        let mut xstate = ExtendedState::new();
        let block = mine_one(&mut xstate, owner);
        let mut next = Block::new(block.id());
        next.add_transaction(Transaction::new(vec![], vec![Coin::new(owner, xstate.reward)]));
        next.timestamp = 0; // before latest_timestamp
        next.set_nonce([0, 0, 0, 0]);
        let err = xstate.process_block(&next).unwrap_err();
        assert!(matches!(err, BlockError::InvalidTimestamp));
    }
}
