//! Core domain types used by the ink chain.
//!
//! This module defines strongly-typed hashes, key material, and signature
//! wrappers shared across the chain implementation. The goal is to avoid
//! "naked" strings and byte buffers in public APIs and instead use
//! domain-specific newtypes.
//!
//! Every hash in the system is a lowercase hex-encoded MD5 digest (32 hex
//! characters), because that is the digest the wire protocol fixes: block
//! hashes, shape fingerprints, and operation identities all travel as hex
//! strings and are compared byte-lexicographically.

use md5::{Digest, Md5};
use p384::ecdsa::{
    signature::{Signer, Verifier},
    Signature, SigningKey, VerifyingKey,
};
use serde::{Deserialize, Serialize};

pub mod block;
pub mod op;

pub use block::Block;
pub use op::{OpBody, Operation};

/// Number of hex characters in an encoded MD5 digest.
pub const HASH_HEX_LEN: usize = 32;

/// Computes the lowercase hex MD5 digest of `data`.
///
/// This is the content hash used for block hashes, shape fingerprints,
/// and operation identities. It is a protocol identifier, **not** a
/// collision-resistant commitment.
pub fn md5_hex(data: &[u8]) -> String {
    let mut hasher = Md5::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

/// Strongly-typed block hash (hex MD5 of the block's proof-of-work bytes).
///
/// Ordering is byte-lexicographic over the hex string, which is the order
/// the tip-selection tie-break uses.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct BlockHash(pub String);

impl BlockHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for BlockHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fingerprint of a shape: hex MD5 over (normalized path, fill, stroke).
///
/// Shape hashes identify shapes across the chain and are the target
/// reference of delete operations.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct ShapeHash(pub String);

impl ShapeHash {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ShapeHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Identity of an operation: hex MD5 over its canonical unsigned bytes.
///
/// Two operations with the same identity are the same operation; the
/// pending pool and per-chain uniqueness checks deduplicate on this.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct OpId(pub String);

impl OpId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for OpId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Errors raised while parsing or using key material.
#[derive(Debug)]
pub enum KeyError {
    /// The hex encoding itself is malformed.
    InvalidHex,
    /// The decoded bytes are not a valid P-384 key or signature.
    InvalidKey,
}

impl std::fmt::Display for KeyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyError::InvalidHex => write!(f, "malformed hex encoding"),
            KeyError::InvalidKey => write!(f, "not a valid P-384 key"),
        }
    }
}

impl std::error::Error for KeyError {}

/// Hex encoding of an uncompressed SEC1 P-384 public key point.
///
/// This is the identity of miners (block producers, ink accounts, pixel
/// owners) and of art nodes (operation submitters, delete provenance).
/// The type is opaque on the wire; [`PublicKeyHex::verifying_key`]
/// interprets it when a signature has to be checked.
#[derive(Clone, Debug, Eq, PartialEq, Ord, PartialOrd, Hash, Serialize, Deserialize)]
pub struct PublicKeyHex(pub String);

impl PublicKeyHex {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Decodes the hex SEC1 point into a verifying key.
    pub fn verifying_key(&self) -> Result<VerifyingKey, KeyError> {
        let bytes = hex::decode(&self.0).map_err(|_| KeyError::InvalidHex)?;
        VerifyingKey::from_sec1_bytes(&bytes).map_err(|_| KeyError::InvalidKey)
    }
}

impl std::fmt::Display for PublicKeyHex {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// Detached ECDSA/P-384 signature bytes (fixed-size encoding).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct SignatureBytes(pub Vec<u8>);

impl SignatureBytes {
    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    /// Verifies this signature over `msg` against `key`.
    pub fn verify(&self, key: &PublicKeyHex, msg: &[u8]) -> Result<(), KeyError> {
        let vk = key.verifying_key()?;
        let sig = Signature::from_slice(&self.0).map_err(|_| KeyError::InvalidKey)?;
        vk.verify(msg, &sig).map_err(|_| KeyError::InvalidKey)
    }
}

/// A P-384 key pair, parsed from the hex encoding of the 48-byte scalar.
///
/// Miners load theirs from the CLI; art nodes hand theirs to the miner
/// at session open so admitted operations can be signed on their behalf.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
}

impl KeyPair {
    /// Parses a key pair from the hex of the private scalar.
    pub fn from_hex(s: &str) -> Result<Self, KeyError> {
        let bytes = hex::decode(s).map_err(|_| KeyError::InvalidHex)?;
        let signing = SigningKey::from_slice(&bytes).map_err(|_| KeyError::InvalidKey)?;
        Ok(Self { signing })
    }

    /// Generates a fresh random key pair.
    pub fn generate() -> Self {
        Self {
            signing: SigningKey::random(&mut rand_core::OsRng),
        }
    }

    /// Hex encoding of the private scalar, suitable for [`KeyPair::from_hex`].
    pub fn to_hex(&self) -> String {
        hex::encode(self.signing.to_bytes())
    }

    /// The public half, encoded as an uncompressed SEC1 hex string.
    pub fn public(&self) -> PublicKeyHex {
        let point = self.signing.verifying_key().to_encoded_point(false);
        PublicKeyHex(hex::encode(point.as_bytes()))
    }

    /// Signs `msg`, returning the fixed-size signature encoding.
    pub fn sign(&self, msg: &[u8]) -> SignatureBytes {
        let sig: Signature = self.signing.sign(msg);
        SignatureBytes(sig.to_vec())
    }
}

impl std::fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Never print the scalar.
        f.debug_struct("KeyPair")
            .field("public", &self.public())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn md5_hex_is_deterministic_and_sized() {
        let a = md5_hex(b"ink");
        let b = md5_hex(b"ink");
        assert_eq!(a, b);
        assert_eq!(a.len(), HASH_HEX_LEN);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
    }

    #[test]
    fn block_hash_orders_byte_lexicographically() {
        let lo = BlockHash("0abc".to_string());
        let hi = BlockHash("1abc".to_string());
        assert!(lo < hi);
    }

    #[test]
    fn keypair_hex_roundtrip_preserves_public_key() {
        let kp = KeyPair::generate();
        let restored = KeyPair::from_hex(&kp.to_hex()).expect("hex roundtrip");
        assert_eq!(kp.public(), restored.public());
    }

    #[test]
    fn signature_verifies_for_signer_only() {
        let kp = KeyPair::generate();
        let other = KeyPair::generate();
        let sig = kp.sign(b"add shape");

        assert!(sig.verify(&kp.public(), b"add shape").is_ok());
        assert!(sig.verify(&kp.public(), b"delete shape").is_err());
        assert!(sig.verify(&other.public(), b"add shape").is_err());
    }

    #[test]
    fn bad_key_material_is_rejected() {
        assert!(matches!(KeyPair::from_hex("zz"), Err(KeyError::InvalidHex)));
        assert!(matches!(KeyPair::from_hex("00ff"), Err(KeyError::InvalidKey)));
        assert!(PublicKeyHex("deadbeef".to_string()).verifying_key().is_err());
    }
}
