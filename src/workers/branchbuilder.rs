//! Walks backward from an orphan block, requesting missing ancestors from
//! whichever peer sent it, then re-queues the whole branch oldest-first once
//! it connects to the known tree. Grounded on
//! `kmacoin/atnode/workers/branchbuilder.py`.

use std::collections::VecDeque;
use std::sync::Arc;

use crate::node::{ClientCmd, Node, QueuedBlock};

pub fn run(node: Arc<Node>) {
    loop {
        let queued = node.orphan_queue.pop();
        let Some(partner) = queued.partner.clone() else {
            // No one to ask for the missing ancestors; nothing to do.
            continue;
        };

        if !node.client_cmd_queues.lock().expect("client queues mutex poisoned").contains(&partner) {
            continue;
        }

        if let Some(branch) = fetch_missing_ancestors(&node, queued.block, &partner) {
            for block in branch {
                node.block_queue.push(QueuedBlock { block, partner: Some(partner.clone()) });
            }
        }
    }
}

/// Repeatedly request `block.prev_id`, then each further ancestor's own
/// `prev_id`, until one is already known to the tree. Returns the branch
/// oldest-first (the connecting ancestor's child first, `block` last), or
/// `None` if the link broke or the peer couldn't supply an ancestor.
fn fetch_missing_ancestors(
    node: &Arc<Node>,
    block: crate::types::Block,
    partner: &crate::node::ClientHandle,
) -> Option<Vec<crate::types::Block>> {
    let mut chain = VecDeque::new();
    let mut next_id = block.prev_id;
    chain.push_back(block);

    loop {
        if node.block_tree.lock().expect("block tree mutex poisoned").has_block(&next_id) {
            return Some(chain.into_iter().collect());
        }

        let (reply_tx, reply_rx) = std::sync::mpsc::channel();
        if partner.tx.send(ClientCmd::ReqBlock(next_id, reply_tx)).is_err() {
            return None;
        }

        match reply_rx.recv() {
            Ok(Some(ancestor)) => {
                // Suppress re-gossip once this ancestor also arrives the
                // ordinary way (INF_BLOCK), since we're about to re-queue it.
                node.block_id_pool.add_id(ancestor.id());
                next_id = ancestor.prev_id;
                chain.push_front(ancestor);
            }
            _ => return None,
        }
    }
}
