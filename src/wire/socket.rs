//! A `TcpStream` wrapped with the byte-exact framing the rest of the core
//! speaks: fixed-width integers, optional addresses, and whole
//! transactions/blocks.

use std::io::{self, Read, Write};
use std::net::TcpStream;
use std::time::Duration;

use crate::crypto::Hash;
use crate::types::{Block, Transaction};
use crate::wire::protocol::*;

pub struct KmaSocket {
    stream: TcpStream,
}

impl KmaSocket {
    pub fn new(stream: TcpStream) -> Self {
        Self { stream }
    }

    pub fn set_timeout(&self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream.set_read_timeout(timeout)?;
        self.stream.set_write_timeout(timeout)
    }

    pub fn peer_addr(&self) -> io::Result<std::net::SocketAddr> {
        self.stream.peer_addr()
    }

    pub fn try_clone(&self) -> io::Result<Self> {
        Ok(Self { stream: self.stream.try_clone()? })
    }

    /// Write pre-serialized bytes straight through, with no extra framing —
    /// used to relay a block's on-disk bytes without decoding them first.
    pub fn send_raw(&mut self, data: &[u8]) -> io::Result<()> {
        self.stream.write_all(data)
    }

    pub fn send_block_list_len(&mut self, len: usize) -> io::Result<()> {
        self.write_uint(len as u64, BLOCK_LIST_LEN_FSZ)
    }

    fn write_uint(&mut self, value: u64, width: usize) -> io::Result<()> {
        let bytes = value.to_be_bytes();
        self.stream.write_all(&bytes[bytes.len() - width..])
    }

    fn read_uint(&mut self, width: usize) -> io::Result<u64> {
        let mut buf = [0u8; 8];
        self.stream.read_exact(&mut buf[8 - width..])?;
        Ok(u64::from_be_bytes(buf))
    }

    pub fn send_type_code(&mut self, code: u8) -> io::Result<()> {
        self.stream.write_all(&[code])
    }

    pub fn recv_type_code(&mut self) -> io::Result<u8> {
        let mut buf = [0u8];
        self.stream.read_exact(&mut buf)?;
        Ok(buf[0])
    }

    pub fn send_token(&mut self, token: u32) -> io::Result<()> {
        self.write_uint(token as u64, TOKEN_FSZ)
    }

    pub fn recv_token(&mut self) -> io::Result<u32> {
        Ok(self.read_uint(TOKEN_FSZ)? as u32)
    }

    pub fn send_block_height(&mut self, height: u32) -> io::Result<()> {
        self.write_uint(height as u64, BLOCK_HEIGHT_FSZ)
    }

    pub fn recv_block_height(&mut self) -> io::Result<u32> {
        Ok(self.read_uint(BLOCK_HEIGHT_FSZ)? as u32)
    }

    pub fn send_hash(&mut self, hash: &Hash) -> io::Result<()> {
        self.stream.write_all(hash)
    }

    pub fn recv_hash(&mut self) -> io::Result<Hash> {
        let mut buf = [0u8; 32];
        self.stream.read_exact(&mut buf)?;
        Ok(buf)
    }

    /// `hostname_len == 0` encodes `None` (no address, e.g. an unreachable peer).
    pub fn send_address(&mut self, addr: Option<&Addr>) -> io::Result<()> {
        match addr {
            None => self.write_uint(0, HOSTNAME_LEN_FSZ),
            Some((host, port)) => {
                assert!(!host.is_empty() && host.len() <= MAX_HOSTNAME_LEN);
                self.write_uint(host.len() as u64, HOSTNAME_LEN_FSZ)?;
                self.stream.write_all(host.as_bytes())?;
                self.write_uint(*port as u64, 2)
            }
        }
    }

    pub fn recv_address(&mut self) -> io::Result<Option<Addr>> {
        let len = self.read_uint(HOSTNAME_LEN_FSZ)? as usize;
        if len == 0 {
            return Ok(None);
        }
        let mut host_bytes = vec![0u8; len];
        self.stream.read_exact(&mut host_bytes)?;
        let host = String::from_utf8(host_bytes)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
        let port = self.read_uint(2)? as u16;
        Ok(Some((host, port)))
    }

    pub fn send_addr_list(&mut self, addrs: &[Addr]) -> io::Result<()> {
        assert!(addrs.len() <= MAX_ADDRS);
        self.write_uint(addrs.len() as u64, ADDR_LIST_LEN_FSZ)?;
        for addr in addrs {
            self.send_address(Some(addr))?;
        }
        Ok(())
    }

    pub fn recv_addr_list(&mut self) -> io::Result<Vec<Addr>> {
        let count = self.read_uint(ADDR_LIST_LEN_FSZ)?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            match self.recv_address()? {
                Some(addr) => out.push(addr),
                None => return Err(io::Error::new(io::ErrorKind::InvalidData, "null address in address list")),
            }
        }
        Ok(out)
    }

    pub fn send_transaction(&mut self, tx: &Transaction) -> io::Result<()> {
        tx.write_to(&mut self.stream)
    }

    pub fn recv_transaction(&mut self) -> io::Result<Transaction> {
        Transaction::read_from(&mut self.stream)
    }

    pub fn send_block(&mut self, block: &Block) -> io::Result<()> {
        block.write_to(&mut self.stream)
    }

    pub fn recv_block(&mut self) -> io::Result<Block> {
        Block::read_from(&mut self.stream)
    }

    pub fn send_block_list(&mut self, blocks: &[Block]) -> io::Result<()> {
        assert!(blocks.len() <= MAX_BLOCKS);
        self.write_uint(blocks.len() as u64, BLOCK_LIST_LEN_FSZ)?;
        for block in blocks {
            self.send_block(block)?;
        }
        Ok(())
    }

    pub fn recv_block_list(&mut self) -> io::Result<Vec<Block>> {
        let count = self.read_uint(BLOCK_LIST_LEN_FSZ)?;
        let mut out = Vec::with_capacity(count as usize);
        for _ in 0..count {
            out.push(self.recv_block()?);
        }
        Ok(out)
    }

    /// Send `data1` using `write1`, then read a single reply byte. On
    /// `REP_PROCEED`, call `write2` to send `data2` and return `true`; on
    /// `REP_STOP`, return `false` without sending anything further.
    pub fn inform<F1, F2>(&mut self, write1: F1, write2: F2) -> io::Result<bool>
    where
        F1: FnOnce(&mut Self) -> io::Result<()>,
        F2: FnOnce(&mut Self) -> io::Result<()>,
    {
        write1(self)?;
        let mut reply = [0u8];
        self.stream.read_exact(&mut reply)?;
        match reply[0] {
            REP_PROCEED => {
                write2(self)?;
                Ok(true)
            }
            REP_STOP => Ok(false),
            other => Err(io::Error::new(io::ErrorKind::InvalidData, format!("unexpected reply code {other}"))),
        }
    }

    pub fn send_reply(&mut self, proceed: bool) -> io::Result<()> {
        self.stream.write_all(&[if proceed { REP_PROCEED } else { REP_STOP }])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;
    use std::thread;

    fn pair() -> (KmaSocket, KmaSocket) {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let client = thread::spawn(move || TcpStream::connect(addr).unwrap());
        let (server, _) = listener.accept().unwrap();
        (KmaSocket::new(server), KmaSocket::new(client.join().unwrap()))
    }

    #[test]
    fn address_roundtrip_including_none() {
        let (mut a, mut b) = pair();
        a.send_address(Some(&("example.org".to_string(), 4242))).unwrap();
        assert_eq!(b.recv_address().unwrap(), Some(("example.org".to_string(), 4242)));

        a.send_address(None).unwrap();
        assert_eq!(b.recv_address().unwrap(), None);
    }

    #[test]
    fn token_and_block_height_roundtrip() {
        let (mut a, mut b) = pair();
        a.send_token(0xdead_beef).unwrap();
        assert_eq!(b.recv_token().unwrap(), 0xdead_beef);

        a.send_block_height(12345).unwrap();
        assert_eq!(b.recv_block_height().unwrap(), 12345);
    }

    #[test]
    fn inform_stop_sends_nothing_further() {
        let (mut a, mut b) = pair();
        let writer = thread::spawn(move || {
            let proceeded = a.inform(|s| s.send_type_code(PING), |s| s.send_token(1)).unwrap();
            assert!(!proceeded);
        });
        assert_eq!(b.recv_type_code().unwrap(), PING);
        b.send_reply(false).unwrap();
        writer.join().unwrap();
    }

    #[test]
    fn inform_proceed_sends_second_payload() {
        let (mut a, mut b) = pair();
        let writer = thread::spawn(move || {
            let proceeded = a.inform(|s| s.send_type_code(REQ_TOKEN), |s| s.send_token(99)).unwrap();
            assert!(proceeded);
        });
        assert_eq!(b.recv_type_code().unwrap(), REQ_TOKEN);
        b.send_reply(true).unwrap();
        assert_eq!(b.recv_token().unwrap(), 99);
        writer.join().unwrap();
    }
}
