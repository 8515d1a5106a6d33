//! A client thread: the write side of a peer link. Reads `ClientCmd`s off its
//! channel and executes them against the socket, so broadcasters and the
//! branch builder never block on peer I/O. Grounded on
//! `kmacoin/atnode/workers/client.py`.

use std::sync::Arc;

use crate::node::{ClientCmd, ClientHandle, Node};
use crate::wire::protocol::*;
use crate::wire::{Addr, KmaSocket};

pub fn run(
    node: Arc<Node>,
    mut socket: KmaSocket,
    peer_addr: Option<Addr>,
    cmd_rx: std::sync::mpsc::Receiver<ClientCmd>,
    own_handle: ClientHandle,
) {
    while let Ok(cmd) = cmd_rx.recv() {
        if execute(&mut socket, cmd).is_err() {
            break;
        }
    }

    // Either the channel closed (no one can send us anything more) or the
    // socket broke. Either way this link is finished: stop answering any
    // requests still queued, then release resources.
    while let Ok(cmd) = cmd_rx.try_recv() {
        if let ClientCmd::ReqBlock(_, reply) = cmd {
            let _ = reply.send(None);
        }
    }

    node.unregister_client(&own_handle);
    if let Some(addr) = &peer_addr {
        node.remove_connected_address(addr);
    }
    node.peers_smp.release();
}

fn execute(socket: &mut KmaSocket, cmd: ClientCmd) -> Result<(), ()> {
    match cmd {
        ClientCmd::Send(data) => socket.send_raw(&data).map_err(|_| ()),
        ClientCmd::Inform(data1, data2) => {
            socket
                .inform(move |s| s.send_raw(&data1), move |s| s.send_raw(&data2))
                .map(|_| ())
                .map_err(|_| ())
        }
        ClientCmd::ReqBlock(block_id, reply) => {
            let result = request_block(socket, &block_id);
            match result {
                Ok(block) => {
                    let _ = reply.send(block);
                    Ok(())
                }
                Err(()) => {
                    let _ = reply.send(None);
                    Err(())
                }
            }
        }
    }
}

fn request_block(socket: &mut KmaSocket, block_id: &crate::crypto::Hash) -> Result<Option<crate::types::Block>, ()> {
    socket.send_type_code(REQ_BLOCK).map_err(|_| ())?;
    socket.send_hash(block_id).map_err(|_| ())?;
    socket.recv_block().map(Some).map_err(|_| ())
}
