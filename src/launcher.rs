//! Gets a node ready to operate: replays any locally persisted chain,
//! synchronizes with the network, then spawns every worker thread. Grounded
//! on `kmacoin/atnode/workers/nodelauncher.py`.

use std::net::TcpStream;
use std::sync::Arc;

use log::{info, warn};

use crate::miner;
use crate::node::Node;
use crate::wire::protocol::*;
use crate::wire::{Addr, KmaSocket};
use crate::workers::{addressprocessor, blockprocessor, branchbuilder, broadcaster, listener, peeradder};

pub fn run(node: Arc<Node>) {
    match node.resume_from_disk() {
        Ok(count) => {
            if node.verbose && count > 0 {
                info!(target: "kma_coin::launcher", "resumed {count} blocks from disk");
            }
        }
        Err(e) => {
            warn!(target: "kma_coin::launcher", "data directory is corrupt, refusing to start: {e}");
            return;
        }
    }

    if node.has_no_unconnected_addresses() {
        if node.verbose {
            info!(target: "kma_coin::launcher", "no initial peer addresses given, starting as the only node");
        }
    } else {
        synchronize(&node);
    }

    if node.verbose {
        if let Ok(state) = node.get_latest_state() {
            info!(
                target: "kma_coin::launcher",
                "height {}, reward {}, threshold {}...",
                state.age,
                state.reward,
                &hex::encode(state.threshold)[..node.hexlen],
            );
        }
    }

    spawn_worker(&node, "addressprocessor", addressprocessor::run);
    spawn_worker(&node, "blockprocessor", blockprocessor::run);
    spawn_worker(&node, "branchbuilder", branchbuilder::run);
    spawn_worker(&node, "broadcaster", broadcaster::run);
    spawn_worker(&node, "peeradder", peeradder::run);
    spawn_worker(&node, "listener", listener::run);
    spawn_worker(&node, "miner", miner::run);
}

fn spawn_worker(node: &Arc<Node>, name: &'static str, f: fn(Arc<Node>)) {
    let node = Arc::clone(node);
    std::thread::Builder::new()
        .name(name.to_string())
        .spawn(move || f(node))
        .expect("failed to spawn worker thread");
}

/// Keep asking an unconnected address for blocks past our current height
/// until one returns none, then grab its address book and stop. On failure,
/// drop that address and try another; give up once none are left.
fn synchronize(node: &Arc<Node>) {
    loop {
        let Some(addr) = node.try_pop_unconnected_address() else {
            warn!(target: "kma_coin::launcher", "no more peers to try, synchronization failed");
            return;
        };

        if node.verbose {
            info!(target: "kma_coin::launcher", "trying to synchronize with {}:{}", addr.0, addr.1);
        }

        match sync_once(node, &addr) {
            Ok(true) => {
                node.add_unconnected_address(addr);
                if node.verbose {
                    info!(target: "kma_coin::launcher", "synchronization complete");
                }
                return;
            }
            Ok(false) => {
                // More blocks to fetch; this address stays a candidate for
                // the next round (which may pick it again).
                node.add_unconnected_address(addr);
            }
            Err(()) => {
                warn!(target: "kma_coin::launcher", "error synchronizing with {}:{}", addr.0, addr.1);
            }
        }
    }
}

/// Returns `Ok(true)` once `addr` reports it has no further blocks and its
/// address book has been merged in; `Ok(false)` if blocks were applied but
/// more may remain.
fn sync_once(node: &Arc<Node>, addr: &Addr) -> Result<bool, ()> {
    let stream = connect(addr, node.connection_timeout).map_err(|_| ())?;
    let mut socket = KmaSocket::new(stream);
    socket.set_timeout(Some(node.connection_timeout)).map_err(|_| ())?;

    socket.send_type_code(REQ_BLOCKS).map_err(|_| ())?;
    socket.send_block_height(node.block_height() as u32).map_err(|_| ())?;

    let blocks = socket.recv_block_list().map_err(|_| ())?;
    if blocks.is_empty() {
        socket.send_type_code(REQ_ADDR_LIST).map_err(|_| ())?;
        let addrs = socket.recv_addr_list().map_err(|_| ())?;
        let added = addrs.into_iter().filter(|a| node.add_unconnected_address(a.clone())).count();
        if node.verbose {
            info!(target: "kma_coin::launcher", "{added} addresses added");
        }
        return Ok(true);
    }

    if node.verbose {
        info!(target: "kma_coin::launcher", "adding {} blocks", blocks.len());
    }
    for block in blocks {
        node.add_block(block, true, None).map_err(|_| ())?;
    }
    Ok(false)
}

fn connect(addr: &Addr, timeout: std::time::Duration) -> std::io::Result<TcpStream> {
    use std::net::ToSocketAddrs;
    let socket_addr = (addr.0.as_str(), addr.1)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "unresolvable address"))?;
    TcpStream::connect_timeout(&socket_addr, timeout)
}
