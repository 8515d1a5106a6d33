//! Abstract cryptographic operations used by the rest of the core.
//!
//! The hash and signature primitives are deliberately kept behind this
//! narrow surface: everything above only calls `hash`, `sign`, `verify` and
//! moves fixed-size byte arrays around. Swapping SHA-256 or P-192 for
//! something else means touching only this module.

use ecdsa::signature::{Signer, Verifier};
use p192::ecdsa::{Signature, SigningKey, VerifyingKey};
use rand_core::OsRng;
use sha2::{Digest, Sha256};

/// Size in bytes of a hash digest.
pub const HASH_SIZE: usize = 32;

/// Size in bytes of a serialized public key (SEC1-compressed point).
pub const PUBLIC_KEY_SIZE: usize = 25;

/// Size in bytes of a serialized private key.
pub const PRIVATE_KEY_SIZE: usize = 24;

/// Size in bytes of a serialized signature.
pub const SIGNATURE_SIZE: usize = 48;

pub type Hash = [u8; HASH_SIZE];

/// The global hash function used throughout the core.
pub fn hash(input: &[u8]) -> Hash {
    let mut hasher = Sha256::new();
    hasher.update(input);
    hasher.finalize().into()
}

/// `H(0x00)`, the sentinel predecessor for the pre-genesis state.
pub fn hash_of_null() -> Hash {
    hash(&[0u8])
}

#[derive(Clone)]
pub struct PrivateKey(SigningKey);

#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PublicKey([u8; PUBLIC_KEY_SIZE]);

impl PrivateKey {
    pub fn generate() -> Self {
        Self(SigningKey::random(&mut OsRng))
    }

    pub fn public_key(&self) -> PublicKey {
        let point = VerifyingKey::from(&self.0).to_encoded_point(true);
        let mut bytes = [0u8; PUBLIC_KEY_SIZE];
        bytes.copy_from_slice(point.as_bytes());
        PublicKey(bytes)
    }

    pub fn sign(&self, data: &[u8]) -> [u8; SIGNATURE_SIZE] {
        let sig: Signature = self.0.sign(data);
        let mut bytes = [0u8; SIGNATURE_SIZE];
        bytes.copy_from_slice(&sig.to_bytes());
        bytes
    }

    pub fn to_bytes(&self) -> [u8; PRIVATE_KEY_SIZE] {
        let mut bytes = [0u8; PRIVATE_KEY_SIZE];
        bytes.copy_from_slice(&self.0.to_bytes());
        bytes
    }

    pub fn from_bytes(bytes: &[u8; PRIVATE_KEY_SIZE]) -> Option<Self> {
        SigningKey::from_bytes(bytes.into()).ok().map(Self)
    }
}

impl PublicKey {
    pub fn from_bytes(bytes: [u8; PUBLIC_KEY_SIZE]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; PUBLIC_KEY_SIZE] {
        &self.0
    }

    pub fn verify(&self, sig: &[u8; SIGNATURE_SIZE], signed_data: &[u8]) -> bool {
        let Ok(verifying_key) = VerifyingKey::from_sec1_bytes(&self.0) else { return false };
        let Ok(signature) = Signature::from_bytes(sig.into()) else { return false };
        verifying_key.verify(signed_data, &signature).is_ok()
    }
}

impl std::fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "PublicKey({})", hex::encode(self.0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_and_verify_roundtrip() {
        let sk = PrivateKey::generate();
        let pk = sk.public_key();
        let data = b"some signed data";
        let sig = sk.sign(data);
        assert!(pk.verify(&sig, data));
        assert!(!pk.verify(&sig, b"other data"));
    }

    #[test]
    fn private_key_roundtrip() {
        let sk = PrivateKey::generate();
        let bytes = sk.to_bytes();
        let sk2 = PrivateKey::from_bytes(&bytes).unwrap();
        assert_eq!(sk.public_key(), sk2.public_key());
    }

    #[test]
    fn hash_is_deterministic() {
        assert_eq!(hash(b"abc"), hash(b"abc"));
        assert_ne!(hash(b"abc"), hash(b"abd"));
    }
}

impl PartialEq for PrivateKey {
    fn eq(&self, other: &Self) -> bool {
        self.to_bytes() == other.to_bytes()
    }
}
