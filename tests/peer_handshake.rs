//! End-to-end handshake test: a manually driven "peer" performs the
//! `REQ_TOKEN`/`REQ_SWAP_ROLES` dance against a live `Listener`, mirroring
//! what `PeerAdder` does on the other side of a real connection.

use std::net::TcpStream;
use std::sync::Arc;
use std::time::Duration;

use kma_coin::config::NodeConfig;
use kma_coin::crypto::PrivateKey;
use kma_coin::node::Node;
use kma_coin::wire::protocol::*;
use kma_coin::wire::KmaSocket;
use kma_coin::workers::listener;

fn free_port() -> u16 {
    let listener = std::net::TcpListener::bind(("127.0.0.1", 0)).unwrap();
    listener.local_addr().unwrap().port()
}

#[test]
fn peeradder_handshake_registers_the_adders_public_address() {
    let port = free_port();
    let data_dir = tempfile::tempdir().unwrap();

    let mut config = NodeConfig::default();
    config.listening_address = Some(("127.0.0.1".to_string(), port));

    let node = Arc::new(Node::new(&config, data_dir.path().to_path_buf(), PrivateKey::generate()));

    let node_for_listener = Arc::clone(&node);
    std::thread::spawn(move || listener::run(node_for_listener));

    // Give the listener a moment to bind before connecting.
    std::thread::sleep(Duration::from_millis(100));

    let stream1 = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let stream2 = TcpStream::connect(("127.0.0.1", port)).unwrap();
    let mut s1 = KmaSocket::new(stream1);
    let mut s2 = KmaSocket::new(stream2);
    s1.set_timeout(Some(Duration::from_secs(5))).unwrap();
    s2.set_timeout(Some(Duration::from_secs(5))).unwrap();

    s2.send_type_code(REQ_TOKEN).unwrap();
    let token = s2.recv_token().unwrap();

    let public_addr = ("203.0.113.5".to_string(), 9000u16);
    s1.send_type_code(REQ_SWAP_ROLES).unwrap();
    s1.send_token(token).unwrap();
    s1.send_address(Some(&public_addr)).unwrap();

    let reply = s1.recv_type_code().unwrap();
    assert_eq!(reply, REP_PROCEED);

    // The listener side registers the address we handed it during the swap.
    std::thread::sleep(Duration::from_millis(50));
    assert!(node.is_connected(&public_addr));
}
