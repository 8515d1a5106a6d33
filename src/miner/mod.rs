//! Pluggable block miners. `Node::miner_module` selects an implementation by
//! name; only `lazy` (a single-threaded, self-pacing miner) is shipped here,
//! mirroring `kmacoin/atnode/workers/miners/lazyminer.py` — the reference
//! implementation also ships `doublespender`/`systemfreezer` adversarial
//! miners for testing protocol robustness, which are out of scope for a node.

pub mod lazy;

use std::sync::Arc;

use log::warn;

use crate::node::Node;

pub fn run(node: Arc<Node>) {
    match node.miner_module.as_str() {
        "lazy" => lazy::run(node),
        other => {
            warn!(target: "kma_coin::miner", "unknown miner module {other:?}, falling back to lazy");
            lazy::run(node);
        }
    }
}
