//! A server thread: the read side of a peer link, dispatching on the
//! incoming message's type code. Grounded on `kmacoin/atnode/workers/server.py`.

use std::sync::{Arc, Mutex};

use log::info;
use rand::RngCore;

use crate::crypto::Hash;
use crate::node::{ClientHandle, Node, QueuedAddr, QueuedBlock};
use crate::wire::protocol::*;
use crate::wire::KmaSocket;
use crate::workers::client;

/// Run a server loop on `socket` until the connection fails or hands itself
/// off to a client (`REQ_SWAP_ROLES`). `own_link` is this connection's own
/// peer-link slot: already filled in for a link established by the peer
/// adder, empty (to be filled by a future `REQ_SWAP_ROLES` against a token
/// we hand out) for one accepted by the listener.
pub fn run(
    node: Arc<Node>,
    mut socket: KmaSocket,
    mut allow_swap_roles: bool,
    mut allow_req_token: bool,
    own_link: Arc<Mutex<Option<ClientHandle>>>,
) {
    loop {
        let code = match socket.recv_type_code() {
            Ok(c) => c,
            Err(_) => break,
        };

        match code {
            PING => {
                if process_ping(&mut socket).is_err() {
                    break;
                }
            }
            REQ_TOKEN => match process_req_token(&node, &mut socket, allow_req_token, &own_link) {
                Ok(()) => allow_req_token = false,
                Err(()) => break,
            },
            REQ_SWAP_ROLES => {
                if !allow_swap_roles {
                    break;
                }
                // Ownership of `socket` moves to the spawned client thread on
                // success; this server role ends either way, so we return
                // instead of falling through to the release() below — the
                // peer-slot permit is inherited by that thread, not freed.
                match process_req_swap_roles(&node, socket, &own_link) {
                    Ok(()) => return,
                    Err(()) => break,
                }
            }
            INF_ADDR => {
                if process_inf_address(&node, &mut socket, &own_link).is_err() {
                    break;
                }
            }
            INF_TRANSACTION => {
                if process_inf_transaction(&node, &mut socket, &own_link).is_err() {
                    break;
                }
            }
            INF_BLOCK => {
                if process_inf_block(&node, &mut socket, &own_link).is_err() {
                    break;
                }
            }
            REQ_BLOCK => {
                if process_req_block(&node, &mut socket).is_err() {
                    break;
                }
            }
            REQ_BLOCKS => {
                if process_req_blocks(&node, &mut socket).is_err() {
                    break;
                }
            }
            REQ_ADDR_LIST => {
                if process_req_addr_list(&node, &mut socket).is_err() {
                    break;
                }
            }
            _ => break,
        }

        allow_swap_roles = false; // only the first message may request a role swap
    }

    node.peers_smp.release();
}

fn process_ping(socket: &mut KmaSocket) -> Result<(), ()> {
    socket.send_type_code(PONG).map_err(|_| ())
}

fn process_req_token(
    node: &Arc<Node>,
    socket: &mut KmaSocket,
    allow_req_token: bool,
    own_link: &Arc<Mutex<Option<ClientHandle>>>,
) -> Result<(), ()> {
    if !allow_req_token {
        return Err(());
    }

    let mut token = [0u8; TOKEN_FSZ];
    loop {
        rand::thread_rng().fill_bytes(&mut token);
        if node.token_pool.add(token, Arc::clone(own_link)) {
            break;
        }
    }

    socket.send_token(u32::from_be_bytes(token)).map_err(|_| ())
}

fn process_req_swap_roles(
    node: &Arc<Node>,
    mut socket: KmaSocket,
    own_link: &Arc<Mutex<Option<ClientHandle>>>,
) -> Result<(), ()> {
    let token = socket.recv_token().map_err(|_| ())?.to_be_bytes();
    let issuer_link = node.token_pool.pop(&token).map_err(|_| ())?;

    let addr = socket.recv_address().map_err(|_| ())?;
    if let Some(addr) = &addr {
        if !node.add_connected_address(addr.clone()) {
            return Err(());
        }
    }

    socket.send_type_code(REP_PROCEED).map_err(|_| ())?;

    let (cmd_tx, cmd_rx) = std::sync::mpsc::channel();
    let handle = node.next_client_handle(cmd_tx);
    *issuer_link.lock().expect("peer link mutex poisoned") = Some(handle.clone());
    // This socket's own link is never consulted again; it is about to stop
    // being a server. Only `issuer_link` (the socket that handed out the
    // token) is left pointing at the new client.
    let _ = own_link;
    node.register_client(handle.clone());

    if let Some(addr) = &addr {
        node.addr_queue.push(QueuedAddr { addr: addr.clone(), typecode: REQ_SWAP_ROLES, partner: Some(handle.clone()) });
    }

    if node.verbose {
        info!(target: "kma_coin::workers::server", "added peer at {:?}", addr);
    }

    let node2 = Arc::clone(node);
    std::thread::spawn(move || client::run(node2, socket, addr, cmd_rx, handle));
    Ok(())
}

fn process_inf_address(node: &Arc<Node>, socket: &mut KmaSocket, own_link: &Arc<Mutex<Option<ClientHandle>>>) -> Result<(), ()> {
    let addr = socket.recv_address().map_err(|_| ())?;
    if let Some(addr) = addr {
        if node.addr_pool.add(addr.clone(), ()) {
            let partner = own_link.lock().expect("peer link mutex poisoned").clone();
            node.addr_queue.push(QueuedAddr { addr, typecode: INF_ADDR, partner });
        }
    }
    Ok(())
}

fn process_inf_transaction(node: &Arc<Node>, socket: &mut KmaSocket, own_link: &Arc<Mutex<Option<ClientHandle>>>) -> Result<(), ()> {
    let tx_id: Hash = socket.recv_hash().map_err(|_| ())?;

    if node.tx_id_pool.add_id(tx_id) {
        socket.send_type_code(REP_PROCEED).map_err(|_| ())?;
        let tx = socket.recv_transaction().map_err(|_| ())?;
        let partner = own_link.lock().expect("peer link mutex poisoned").clone();
        node.tx_queue.push((tx, partner));
    } else {
        socket.send_type_code(REP_STOP).map_err(|_| ())?;
    }
    Ok(())
}

fn process_inf_block(node: &Arc<Node>, socket: &mut KmaSocket, own_link: &Arc<Mutex<Option<ClientHandle>>>) -> Result<(), ()> {
    let block_id: Hash = socket.recv_hash().map_err(|_| ())?;

    if node.block_id_pool.add_id(block_id) {
        socket.send_type_code(REP_PROCEED).map_err(|_| ())?;
        let block = socket.recv_block().map_err(|_| ())?;
        let partner = own_link.lock().expect("peer link mutex poisoned").clone();
        node.block_queue.push(QueuedBlock { block, partner });
    } else {
        socket.send_type_code(REP_STOP).map_err(|_| ())?;
    }
    Ok(())
}

fn process_req_block(node: &Arc<Node>, socket: &mut KmaSocket) -> Result<(), ()> {
    let block_id: Hash = socket.recv_hash().map_err(|_| ())?;
    let data = node.load_block_data(&block_id).map_err(|_| ())?;
    socket.send_raw(&data).map_err(|_| ())
}

fn process_req_blocks(node: &Arc<Node>, socket: &mut KmaSocket) -> Result<(), ()> {
    let height = socket.recv_block_height().map_err(|_| ())? as usize;

    let ids: Vec<Hash> = {
        let tree = node.block_tree.lock().expect("block tree mutex poisoned");
        let spine = tree.main_spine();
        let start = (height + 1).min(spine.len());
        let end = (start + MAX_BLOCKS).min(spine.len());
        spine[start..end].to_vec()
    };

    socket.send_block_list_len(ids.len()).map_err(|_| ())?;
    for id in ids {
        let data = node.load_block_data(&id).map_err(|_| ())?;
        socket.send_raw(&data).map_err(|_| ())?;
    }
    Ok(())
}

fn process_req_addr_list(node: &Arc<Node>, socket: &mut KmaSocket) -> Result<(), ()> {
    let mut addrs = node.known_addresses();
    addrs.truncate(MAX_ADDRS);
    socket.send_addr_list(&addrs).map_err(|_| ())
}
