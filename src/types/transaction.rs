use std::io::{self, Read, Write};

use crate::crypto::{hash, Hash, HASH_SIZE, SIGNATURE_SIZE};
use crate::types::coin::Coin;

/// A reference to a coin created by some prior transaction: `(tx_id, output_index)`.
pub type InputId = (Hash, u8);

/// A transaction: destroys its inputs, creates its outputs.
///
/// `id()` is a pure function of the serialized bytes and is recomputed on
/// demand rather than cached, so a `Transaction` carries no interior
/// mutability and can be freely shared across worker threads.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    pub input_ids: Vec<InputId>,
    pub outputs: Vec<Coin>,
    pub sigs: Vec<[u8; SIGNATURE_SIZE]>,
}

impl Transaction {
    pub const INPUT_COUNT_FSZ: usize = 1;
    pub const OUTPUT_COUNT_FSZ: usize = 1;
    pub const SIG_COUNT_FSZ: usize = 1;
    pub const TX_ID_FSZ: usize = HASH_SIZE;
    pub const SEQ_FSZ: usize = 1;
    pub const SIG_FSZ: usize = SIGNATURE_SIZE;

    pub const MAX_INPUTS: usize = u8::MAX as usize;
    pub const MAX_OUTPUTS: usize = u8::MAX as usize;
    pub const MAX_SIGS: usize = u8::MAX as usize;
    pub const MAX_SEQ: usize = Self::MAX_OUTPUTS - 1;

    pub fn new(input_ids: Vec<InputId>, outputs: Vec<Coin>) -> Self {
        assert!(input_ids.len() <= Self::MAX_INPUTS);
        for &(_, seq) in &input_ids {
            assert!(seq as usize <= Self::MAX_SEQ);
        }
        assert!(outputs.len() <= Self::MAX_OUTPUTS);
        Self { input_ids, outputs, sigs: Vec::new() }
    }

    /// Data covered by signatures: `concat(inputs) ‖ concat(outputs)`.
    pub fn signed_data(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        for (tx_id, seq) in &self.input_ids {
            buf.extend_from_slice(tx_id);
            buf.push(*seq);
        }
        for coin in &self.outputs {
            coin.write_to(&mut buf).expect("writing to a Vec never fails");
        }
        buf
    }

    pub fn add_signature(&mut self, sig: [u8; SIGNATURE_SIZE]) {
        assert!(self.sigs.len() < self.input_ids.len());
        self.sigs.push(sig);
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::new();
        self.write_to(&mut buf).expect("writing to a Vec never fails");
        buf
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&[self.input_ids.len() as u8])?;
        w.write_all(&[self.outputs.len() as u8])?;
        w.write_all(&[self.sigs.len() as u8])?;
        w.write_all(&self.signed_data())?;
        for sig in &self.sigs {
            w.write_all(sig)?;
        }
        Ok(())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut counts = [0u8; 3];
        r.read_exact(&mut counts)?;
        let [ic, oc, sc] = counts;

        let mut input_ids = Vec::with_capacity(ic as usize);
        for _ in 0..ic {
            let mut tx_id = [0u8; Self::TX_ID_FSZ];
            r.read_exact(&mut tx_id)?;
            let mut seq = [0u8; Self::SEQ_FSZ];
            r.read_exact(&mut seq)?;
            input_ids.push((tx_id, seq[0]));
        }

        let mut outputs = Vec::with_capacity(oc as usize);
        for _ in 0..oc {
            outputs.push(Coin::read_from(r)?);
        }

        let mut tx = Transaction::new(input_ids, outputs);
        for _ in 0..sc {
            let mut sig = [0u8; Self::SIG_FSZ];
            r.read_exact(&mut sig)?;
            tx.add_signature(sig);
        }

        Ok(tx)
    }

    pub fn id(&self) -> Hash {
        hash(&self.to_bytes())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::{hash_of_null, PrivateKey};

    #[test]
    fn roundtrip() {
        let owner = PrivateKey::generate().public_key();
        let mut tx = Transaction::new(vec![(hash_of_null(), 0)], vec![Coin::new(owner, 10)]);
        tx.add_signature([7u8; Transaction::SIG_FSZ]);

        let bytes = tx.to_bytes();
        let decoded = Transaction::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(tx, decoded);
        assert_eq!(tx.id(), decoded.id());
    }

    #[test]
    fn reward_transaction_has_no_inputs() {
        let owner = PrivateKey::generate().public_key();
        let tx = Transaction::new(vec![], vec![Coin::new(owner, 1000)]);
        assert!(tx.input_ids.is_empty());
        assert!(tx.sigs.is_empty());
    }
}
