//! An optional hook notified whenever a block is added to the tree, for
//! tools like a block-tree visualizer. Mirrors `Node.vis_block_q` in the
//! reference implementation, generalized into a small trait instead of a
//! queue with a single hardcoded consumer.

use crate::crypto::{Hash, PublicKey};

pub trait BlockEventSink: Send + Sync {
    fn on_block(&self, block_id: Hash, prev_id: Hash, reward_owner: PublicKey);
}

/// The default sink: does nothing.
pub struct NullSink;

impl BlockEventSink for NullSink {
    fn on_block(&self, _block_id: Hash, _prev_id: Hash, _reward_owner: PublicKey) {}
}
