use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::crypto::{hash, Hash, HASH_SIZE};
use crate::types::transaction::Transaction;

pub const NONCE_SIZE: usize = 4;

/// A block. `id()` requires a nonce to have been set, mirroring the
/// reference implementation's assertion that an incomplete block can't be
/// serialized.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Block {
    pub timestamp: u32,
    pub nonce: Option<[u8; NONCE_SIZE]>,
    pub prev_id: Hash,
    pub txs: Vec<Transaction>,
}

impl Block {
    pub const TIMESTAMP_FSZ: usize = 4;
    pub const NONCE_FSZ: usize = NONCE_SIZE;
    pub const PREV_ID_FSZ: usize = HASH_SIZE;
    pub const TX_COUNT_FSZ: usize = 2;
    pub const ID_FSZ: usize = Self::PREV_ID_FSZ;

    pub const MAX_TXS: usize = u16::MAX as usize;

    pub fn new(prev_id: Hash) -> Self {
        Self { timestamp: now_secs(), nonce: None, prev_id, txs: Vec::new() }
    }

    pub fn update_timestamp(&mut self) {
        self.timestamp = now_secs();
    }

    pub fn add_transaction(&mut self, tx: Transaction) {
        self.txs.push(tx);
    }

    pub fn replace_transaction(&mut self, index: usize, tx: Transaction) {
        self.txs[index] = tx;
    }

    pub fn clear_transactions(&mut self) {
        self.txs.clear();
    }

    pub fn set_nonce(&mut self, nonce: [u8; NONCE_SIZE]) {
        self.nonce = Some(nonce);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("writing to a Vec never fails");
        buf
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let nonce = self.nonce.expect("block has no nonce set");
        assert!(self.txs.len() < Self::MAX_TXS);
        w.write_all(&self.timestamp.to_be_bytes())?;
        w.write_all(&nonce)?;
        w.write_all(&self.prev_id)?;
        w.write_all(&(self.txs.len() as u16).to_be_bytes())?;
        for tx in &self.txs {
            tx.write_to(w)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut timestamp_bytes = [0u8; Self::TIMESTAMP_FSZ];
        r.read_exact(&mut timestamp_bytes)?;
        let mut nonce = [0u8; Self::NONCE_FSZ];
        r.read_exact(&mut nonce)?;
        let mut prev_id = [0u8; Self::PREV_ID_FSZ];
        r.read_exact(&mut prev_id)?;
        let mut tx_count_bytes = [0u8; Self::TX_COUNT_FSZ];
        r.read_exact(&mut tx_count_bytes)?;
        let tx_count = u16::from_be_bytes(tx_count_bytes);

        let mut txs = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            txs.push(Transaction::read_from(r)?);
        }

        Ok(Self { timestamp: u32::from_be_bytes(timestamp_bytes), nonce: Some(nonce), prev_id, txs })
    }

    pub fn id(&self) -> Hash {
        hash(&self.to_bytes())
    }
}

fn now_secs() -> u32 {
    SystemTime::now().duration_since(UNIX_EPOCH).expect("system clock before epoch").as_secs() as u32
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::hash_of_null;

    #[test]
    fn roundtrip() {
        let mut block = Block::new(hash_of_null());
        block.set_nonce([1, 2, 3, 4]);
        let bytes = block.to_bytes();
        let decoded = Block::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(block.timestamp, decoded.timestamp);
        assert_eq!(block.prev_id, decoded.prev_id);
        assert_eq!(block.nonce, decoded.nonce);
        assert_eq!(block.id(), decoded.id());
    }

    #[test]
    #[should_panic]
    fn to_bytes_without_nonce_panics() {
        let block = Block::new(hash_of_null());
        let _ = block.to_bytes();
    }
}
