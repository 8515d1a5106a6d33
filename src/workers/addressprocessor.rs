//! Validates addresses seen over the network before they're trusted enough
//! to broadcast onward or use as a peer-adder candidate. Grounded on
//! `kmacoin/atnode/workers/addressprocessor.py`.

use std::net::{TcpStream, ToSocketAddrs};
use std::sync::Arc;

use crate::node::{Node, ValidObject};
use crate::wire::protocol::*;
use crate::wire::{Addr, KmaSocket};

pub fn run(node: Arc<Node>) {
    loop {
        let queued = node.addr_queue.pop();

        if queued.typecode == REQ_SWAP_ROLES {
            // This address arrived because a peer just connected to us with
            // it as their public address; it's already proven reachable by
            // that same connection, but we still confirm independently
            // before relaying it onward.
            if is_reachable(&queued.addr, node.connection_timeout) {
                node.valid_obj_queue.push(ValidObject::Address(queued.addr, queued.partner));
            }
            continue;
        }

        if node.is_connected(&queued.addr) || node.is_unconnected(&queued.addr) {
            continue;
        }

        if is_reachable(&queued.addr, node.connection_timeout) && node.add_unconnected_address(queued.addr.clone()) {
            node.valid_obj_queue.push(ValidObject::Address(queued.addr, queued.partner));
        }
    }
}

fn is_reachable(addr: &Addr, timeout: std::time::Duration) -> bool {
    let Ok(Some(socket_addr)) = (addr.0.as_str(), addr.1).to_socket_addrs().map(|mut i| i.next()) else {
        return false;
    };
    let Ok(stream) = TcpStream::connect_timeout(&socket_addr, timeout) else { return false };
    let mut socket = KmaSocket::new(stream);
    if socket.set_timeout(Some(timeout)).is_err() {
        return false;
    }
    socket.send_type_code(PING).is_ok() && matches!(socket.recv_type_code(), Ok(PONG))
}
