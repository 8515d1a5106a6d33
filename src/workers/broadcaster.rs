//! Relays validated transactions, blocks and addresses to every peer except
//! the one they arrived from. Grounded on `kmacoin/atnode/workers/broadcaster.py`.

use std::sync::Arc;

use rand::seq::IteratorRandom;

use crate::node::{ClientCmd, ClientHandle, Node, ValidObject};
use crate::types::{Block, Transaction};
use crate::wire::protocol::*;
use crate::wire::Addr;

/// The reference implementation gossips a freshly learned address to at most
/// this many peers, rather than flooding the whole network with it.
const MAX_ADDRESS_BROADCAST_PEERS: usize = 2;

pub fn run(node: Arc<Node>) {
    loop {
        match node.valid_obj_queue.pop() {
            ValidObject::Transaction(tx, partner) => broadcast_transaction(&node, &tx, partner.as_ref()),
            ValidObject::Block(block, partner) => broadcast_block(&node, &block, partner.as_ref()),
            ValidObject::Address(addr, partner) => broadcast_address(&node, &addr, partner.as_ref()),
        }
    }
}

fn peers_excluding(node: &Node, exclude: Option<&ClientHandle>) -> Vec<ClientHandle> {
    node.client_cmd_queues
        .lock()
        .expect("client queues mutex poisoned")
        .iter()
        .filter(|h| exclude.map_or(true, |e| *h != e))
        .cloned()
        .collect()
}

fn broadcast_transaction(node: &Node, tx: &Transaction, partner: Option<&ClientHandle>) {
    let mut header = vec![INF_TRANSACTION];
    header.extend_from_slice(&tx.id());
    let body = tx.to_bytes();

    for peer in peers_excluding(node, partner) {
        let _ = peer.tx.send(ClientCmd::Inform(header.clone(), body.clone()));
    }
}

fn broadcast_block(node: &Node, block: &Block, partner: Option<&ClientHandle>) {
    let mut header = vec![INF_BLOCK];
    header.extend_from_slice(&block.id());
    let body = block.to_bytes();

    for peer in peers_excluding(node, partner) {
        let _ = peer.tx.send(ClientCmd::Inform(header.clone(), body.clone()));
    }
}

fn broadcast_address(node: &Node, addr: &Addr, partner: Option<&ClientHandle>) {
    let mut data = vec![INF_ADDR];
    encode_address(&mut data, Some(addr));

    let peers = peers_excluding(node, partner);
    let chosen: Vec<ClientHandle> =
        peers.into_iter().choose_multiple(&mut rand::thread_rng(), MAX_ADDRESS_BROADCAST_PEERS);

    for peer in chosen {
        let _ = peer.tx.send(ClientCmd::Send(data.clone()));
    }
}

fn encode_address(buf: &mut Vec<u8>, addr: Option<&Addr>) {
    match addr {
        None => buf.push(0),
        Some((host, port)) => {
            buf.push(host.len() as u8);
            buf.extend_from_slice(host.as_bytes());
            buf.extend_from_slice(&port.to_be_bytes());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::NodeConfig;
    use crate::crypto::PrivateKey;
    use std::sync::mpsc;

    #[test]
    fn encode_address_none_is_a_single_zero_byte() {
        let mut buf = Vec::new();
        encode_address(&mut buf, None);
        assert_eq!(buf, vec![0]);
    }

    #[test]
    fn encode_address_roundtrips_host_and_port() {
        let mut buf = Vec::new();
        let addr = ("127.0.0.1".to_string(), 4242u16);
        encode_address(&mut buf, Some(&addr));
        assert_eq!(buf[0] as usize, addr.0.len());
        assert_eq!(&buf[1..1 + addr.0.len()], addr.0.as_bytes());
        assert_eq!(&buf[1 + addr.0.len()..], &addr.1.to_be_bytes());
    }

    fn test_node() -> (tempfile::TempDir, Node) {
        let dir = tempfile::tempdir().unwrap();
        let node = Node::new(&NodeConfig::default(), dir.path().to_path_buf(), PrivateKey::generate());
        (dir, node)
    }

    #[test]
    fn peers_excluding_drops_the_named_handle() {
        let (_dir, node) = test_node();
        let (tx1, _rx1) = mpsc::channel();
        let (tx2, _rx2) = mpsc::channel();
        let h1 = node.next_client_handle(tx1);
        let h2 = node.next_client_handle(tx2);
        node.register_client(h1.clone());
        node.register_client(h2.clone());

        let remaining = peers_excluding(&node, Some(&h1));
        assert_eq!(remaining, vec![h2]);
    }

    #[test]
    fn peers_excluding_with_no_exclusion_returns_everyone() {
        let (_dir, node) = test_node();
        let (tx, _rx) = mpsc::channel();
        let h = node.next_client_handle(tx);
        node.register_client(h.clone());

        assert_eq!(peers_excluding(&node, None), vec![h]);
    }
}
