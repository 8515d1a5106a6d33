//! Accepts incoming connections and spawns a server thread for each one.
//! Grounded on `kmacoin/atnode/workers/listener.py`.

use std::net::TcpListener;
use std::sync::{Arc, Mutex};

use log::warn;

use crate::node::Node;
use crate::wire::KmaSocket;
use crate::workers::server;

pub fn run(node: Arc<Node>) {
    let Some(addr) = &node.listening_addr else {
        return;
    };

    let listener = match TcpListener::bind((addr.0.as_str(), addr.1)) {
        Ok(l) => l,
        Err(e) => {
            warn!(target: "kma_coin::workers::listener", "failed to bind {}:{}: {e}", addr.0, addr.1);
            return;
        }
    };

    for stream in listener.incoming() {
        let stream = match stream {
            Ok(s) => s,
            Err(e) => {
                warn!(target: "kma_coin::workers::listener", "accept failed: {e}");
                continue;
            }
        };

        node.peers_smp.acquire();

        let socket = KmaSocket::new(stream);
        if let Err(e) = socket.set_timeout(Some(node.connection_timeout)) {
            warn!(target: "kma_coin::workers::listener", "failed to set connection timeout: {e}");
            node.peers_smp.release();
            continue;
        }

        let node2 = Arc::clone(&node);
        std::thread::spawn(move || {
            server::run(node2, socket, true, true, Arc::new(Mutex::new(None)));
        });
    }
}
