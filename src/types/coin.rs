use std::io::{self, Read, Write};

use crate::crypto::{PublicKey, PUBLIC_KEY_SIZE};

/// A coin: an amount of value owned by a public key. Immutable once created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Coin {
    pub owner: PublicKey,
    pub value: u64,
}

impl Coin {
    pub const OWNER_FSZ: usize = PUBLIC_KEY_SIZE;
    pub const VALUE_FSZ: usize = 4;
    pub const SIZE: usize = Self::OWNER_FSZ + Self::VALUE_FSZ;

    /// Coin value `0` on the wire denotes the maximum representable value.
    pub const MAX_VALUE: u64 = 1u64 << (8 * Self::VALUE_FSZ);

    pub fn new(owner: PublicKey, value: u64) -> Self {
        assert!(value > 0 && value <= Self::MAX_VALUE, "coin value out of range");
        Self { owner, value }
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(Self::SIZE);
        self.write_to(&mut buf).expect("writing to a Vec never fails");
        buf
    }

    pub fn write_to<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(self.owner.as_bytes())?;
        let wire_value = if self.value == Self::MAX_VALUE { 0 } else { self.value as u32 };
        w.write_all(&wire_value.to_be_bytes())
    }

    pub fn read_from<R: Read>(r: &mut R) -> io::Result<Self> {
        let mut owner_bytes = [0u8; Self::OWNER_FSZ];
        r.read_exact(&mut owner_bytes)?;
        let mut value_bytes = [0u8; Self::VALUE_FSZ];
        r.read_exact(&mut value_bytes)?;
        let mut value = u32::from_be_bytes(value_bytes) as u64;
        if value == 0 {
            value = Self::MAX_VALUE;
        }
        Ok(Self { owner: PublicKey::from_bytes(owner_bytes), value })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::PrivateKey;

    #[test]
    fn roundtrip() {
        let owner = PrivateKey::generate().public_key();
        let coin = Coin::new(owner, 42);
        let bytes = coin.to_bytes();
        assert_eq!(bytes.len(), Coin::SIZE);
        let decoded = Coin::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(coin, decoded);
    }

    #[test]
    fn max_value_encodes_as_zero() {
        let owner = PrivateKey::generate().public_key();
        let coin = Coin::new(owner, Coin::MAX_VALUE);
        let bytes = coin.to_bytes();
        assert_eq!(&bytes[Coin::OWNER_FSZ..], &[0, 0, 0, 0]);
        let decoded = Coin::read_from(&mut bytes.as_slice()).unwrap();
        assert_eq!(decoded.value, Coin::MAX_VALUE);
    }
}
