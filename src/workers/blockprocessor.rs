//! Applies incoming blocks to the tree and hands accepted ones off to the
//! broadcaster. Grounded on `kmacoin/atnode/workers/blockprocessor.py`.

use std::sync::Arc;

use log::info;

use crate::error::Error;
use crate::node::{self, Node, ValidObject};

pub fn run(node: Arc<Node>) {
    loop {
        let queued = node.block_queue.pop();
        let block = queued.block.clone();

        match node.add_block(queued.block, true, queued.partner.clone()) {
            Ok(true) => {
                if node.verbose {
                    info!(
                        target: "kma_coin::workers::blockprocessor",
                        "accepted block {}... at height {}",
                        &hex::encode(block.id())[..node.hexlen],
                        node.block_height(),
                    );
                }
                node.valid_obj_queue.push(ValidObject::Block(block, queued.partner));
            }
            Ok(false) => {
                // Duplicate, or an orphan already queued by `add_block` itself.
            }
            Err(Error::Block(err)) => node::log_invalid_block(&node, &block, &err),
            Err(_) => {
                // IO/persistence failure; nothing useful to relay.
            }
        }
    }
}
