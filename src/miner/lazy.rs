//! A single-threaded miner that paces its nonce attempts to approximate a
//! target hash rate instead of spinning as fast as possible. Grounded on
//! `kmacoin/atnode/workers/miners/lazyminer.py`.

use std::sync::Arc;
use std::time::{Duration, Instant};

use log::info;
use rand::RngCore;

use crate::consensus::ExtendedState;
use crate::consensus::params::Threshold;
use crate::crypto::hash_of_null;
use crate::node::{Node, QueuedBlock, ValidObject};
use crate::types::{Block, Coin, Transaction};

/// Paces `attempt` calls to average `1/hash_rate` seconds each, by sleeping
/// the attempt's fair share minus however long the last attempt actually
/// took. A handful of calibration attempts warm this estimate up before the
/// miner starts doing real work.
struct Pacer {
    attempt_time_cost: f64,
    sleep_time: f64,
}

impl Pacer {
    fn new(hash_rate: u64) -> Self {
        let attempt_time_cost = 1.0 / hash_rate.max(1) as f64;
        let mut pacer = Self { attempt_time_cost, sleep_time: attempt_time_cost };

        let mut calibration_block = Block::new(hash_of_null());
        for _ in 0..3 {
            pacer.paced_attempt(&mut calibration_block, &hash_of_null());
        }
        pacer
    }

    fn paced_attempt(&mut self, block: &mut Block, threshold: &Threshold) -> bool {
        let start = Instant::now();
        std::thread::sleep(Duration::from_secs_f64(self.sleep_time.max(0.0)));
        let found = attempt(block, threshold);
        self.sleep_time += self.attempt_time_cost - start.elapsed().as_secs_f64();
        found
    }
}

fn attempt(block: &mut Block, threshold: &Threshold) -> bool {
    let mut nonce = [0u8; Block::NONCE_FSZ];
    rand::thread_rng().fill_bytes(&mut nonce);
    block.set_nonce(nonce);
    block.id() < *threshold
}

pub fn run(node: Arc<Node>) {
    let mut pacer = Pacer::new(node.hash_rate);
    let owner = node.owner.public_key();

    let mut height: i64 = -1;
    let mut tmp_block = Block::new(hash_of_null());
    let mut latest_state = ExtendedState::new();
    let mut found = false;
    let mut reward: u64 = 0;

    loop {
        if height < node.block_height() as i64 || found {
            if !found {
                // Another miner beat us to it: the transactions we'd packed
                // (everything but the reward, at index 0) are still good.
                for tx in tmp_block.txs.drain(..).skip(1) {
                    node.tx_queue.push((tx, None));
                }

                latest_state = match node.get_latest_state() {
                    Ok(s) => s,
                    Err(_) => {
                        std::thread::sleep(Duration::from_millis(50));
                        continue;
                    }
                };
                tmp_block = Block::new(latest_state.latest_id);
                height = latest_state.age as i64;
            }

            reward = latest_state.reward;
            tmp_block.add_transaction(reward_transaction(owner, reward));
        }

        let mut reward_changed = false;
        while tmp_block.txs.len() < Block::MAX_TXS {
            let Some((tx, _partner)) = node.tx_queue.try_pop() else { break };
            match latest_state.process_transaction(&tx, true) {
                Ok(fee) => {
                    tmp_block.add_transaction(tx.clone());
                    node.valid_obj_queue.push(ValidObject::Transaction(tx, None));
                    if fee != 0 {
                        reward = (reward as i64 + fee) as u64;
                        reward_changed = true;
                    }
                }
                Err(_) => continue,
            }
        }

        if reward_changed {
            tmp_block.replace_transaction(0, reward_transaction(owner, reward));
        }

        tmp_block.update_timestamp();
        found = pacer.paced_attempt(&mut tmp_block, &latest_state.threshold);

        if found {
            if node.verbose {
                info!(target: "kma_coin::miner", "mined block at height {}, reward {reward}", height + 1);
            }

            node.block_queue.push(QueuedBlock { block: tmp_block.clone(), partner: None });

            height += 1;
            if latest_state.record_own_block(&tmp_block.txs[0], tmp_block.id(), tmp_block.timestamp).is_err() {
                // The reward transaction we just mined can't fail to apply
                // against the state that produced it; this would indicate a
                // bug elsewhere, not a condition to recover from here.
                unreachable!("freshly mined reward transaction rejected by its own state");
            }
            tmp_block = Block::new(tmp_block.id());
        }
    }
}

fn reward_transaction(owner: crate::crypto::PublicKey, reward: u64) -> Transaction {
    Transaction::new(vec![], vec![Coin::new(owner, reward)])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attempt_against_max_threshold_always_succeeds() {
        let mut block = Block::new(hash_of_null());
        assert!(attempt(&mut block, &[0xff; 32]));
    }

    #[test]
    fn attempt_against_null_threshold_essentially_never_succeeds() {
        let mut block = Block::new(hash_of_null());
        assert!(!attempt(&mut block, &hash_of_null()));
    }

    #[test]
    fn pacer_calibrates_sleep_time_near_attempt_cost() {
        let pacer = Pacer::new(1_000_000);
        assert!(pacer.sleep_time.is_finite());
        assert!(pacer.sleep_time >= 0.0);
        assert!(pacer.attempt_time_cost > 0.0);
    }

    #[test]
    fn pacer_clamps_a_zero_hash_rate_to_one() {
        let pacer = Pacer::new(0);
        assert_eq!(pacer.attempt_time_cost, 1.0);
    }
}
