//! Opens new outbound peer links until `min_peers` is satisfied. Each logical
//! link uses two sockets to the same peer — one becomes our server (reading
//! what the peer sends), the other our client (writing what we send) — swapped
//! into place via a `REQ_TOKEN`/`REQ_SWAP_ROLES` handshake. Grounded on
//! `kmacoin/atnode/workers/peeradder.py`.

use std::net::TcpStream;
use std::sync::{Arc, Mutex};

use log::{info, warn};

use crate::node::Node;
use crate::wire::protocol::*;
use crate::wire::{Addr, KmaSocket};
use crate::workers::{client, server};

pub fn run(node: Arc<Node>) {
    loop {
        node.wait_for_peer_shortage();
        let addr = node.pop_random_unconnected_address();

        node.peers_smp.acquire();
        node.peers_smp.acquire();

        if !try_connect(&node, &addr) {
            node.peers_smp.release();
            node.peers_smp.release();
        }
    }
}

/// Attempt the full handshake against `addr`. Returns `true` if both worker
/// threads were spawned (the two acquired permits are now owned by them);
/// `false` if anything failed (the caller releases both permits itself).
fn try_connect(node: &Arc<Node>, addr: &Addr) -> bool {
    let Ok(stream1) = connect(addr, node.connection_timeout) else { return false };
    let Ok(stream2) = connect(addr, node.connection_timeout) else { return false };

    let mut s1 = KmaSocket::new(stream1);
    let mut s2 = KmaSocket::new(stream2);
    if s1.set_timeout(Some(node.connection_timeout)).is_err() || s2.set_timeout(Some(node.connection_timeout)).is_err() {
        return false;
    }

    if handshake(node, &mut s1, &mut s2).is_err() {
        return false;
    }

    if s1.set_timeout(Some(node.peer_timeout)).is_err() || s2.set_timeout(Some(node.peer_timeout)).is_err() {
        return false;
    }

    if !node.add_connected_address(addr.clone()) {
        return false;
    }

    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
    let handle = node.next_client_handle(cmd_tx);
    node.register_client(handle.clone());

    let own_link = Arc::new(Mutex::new(Some(handle.clone())));

    if node.verbose {
        info!(target: "kma_coin::workers::peeradder", "connected to {}:{}", addr.0, addr.1);
    }

    let node_for_client = Arc::clone(node);
    let addr_for_client = Some(addr.clone());
    std::thread::spawn(move || client::run(node_for_client, s2, addr_for_client, cmd_rx, handle));

    let node_for_server = Arc::clone(node);
    std::thread::spawn(move || server::run(node_for_server, s1, false, false, own_link));

    true
}

fn connect(addr: &Addr, timeout: std::time::Duration) -> std::io::Result<TcpStream> {
    use std::net::ToSocketAddrs;
    let socket_addr = (addr.0.as_str(), addr.1)
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| std::io::Error::new(std::io::ErrorKind::AddrNotAvailable, "unresolvable address"))?;
    TcpStream::connect_timeout(&socket_addr, timeout)
}

/// `s2` requests a token; `s1` swaps roles using it. On success `s1` has
/// become a server for this link and `s2` is free to become our client.
fn handshake(node: &Node, s1: &mut KmaSocket, s2: &mut KmaSocket) -> Result<(), ()> {
    s2.send_type_code(REQ_TOKEN).map_err(|_| ())?;
    let token = s2.recv_token().map_err(|_| ())?;

    s1.send_type_code(REQ_SWAP_ROLES).map_err(|_| ())?;
    s1.send_token(token).map_err(|_| ())?;
    s1.send_address(node.public_addr.as_ref()).map_err(|_| ())?;

    match s1.recv_type_code().map_err(|_| ())? {
        REP_PROCEED => Ok(()),
        _ => {
            warn!(target: "kma_coin::workers::peeradder", "peer refused role swap");
            Err(())
        }
    }
}
