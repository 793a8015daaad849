//! Block type, proof-of-work serialization, and difficulty rule.
//!
//! A block links to its parent by hash and bundles an ordered list of
//! operations (possibly empty, a *no-op block*). The block hash is the
//! hex MD5 of a fixed byte concatenation; a hash is acceptable when it
//! ends in the required number of zero hex digits. The difficulty rule
//! counts **suffix** zeros, matching the reference protocol.
//!
//! Materialized post-block state (ink accounts, canvas map, live shapes)
//! is not part of the block: it is recoverable by deterministic replay
//! and is kept by the chain store.

use serde::{Deserialize, Serialize};

use super::{md5_hex, BlockHash, Operation, PublicKeyHex};

/// Unit of the chain.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Block {
    /// Hash of the parent block (the genesis hash for depth-1 blocks).
    pub parent: BlockHash,

    /// Nonce found by the proof-of-work search.
    pub nonce: u32,

    /// Ordered operations included in this block; empty for no-op blocks.
    pub ops: Vec<Operation>,

    /// Public key of the miner that produced the block.
    pub producer: PublicKeyHex,

    /// Depth in the chain: parent depth + 1; the genesis block is depth 0.
    pub depth: u32,
}

impl Block {
    /// Returns `true` when the block carries no operations.
    pub fn is_noop(&self) -> bool {
        self.ops.is_empty()
    }

    /// The byte string the proof-of-work hash is computed over.
    ///
    /// Concatenation of: parent hash (ASCII hex), every operation record
    /// in order, producer key (ASCII hex), depth (u32 LE), nonce (u32 LE).
    pub fn pow_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(128);
        bytes.extend_from_slice(self.parent.as_str().as_bytes());
        for op in &self.ops {
            bytes.extend_from_slice(&op.record_bytes());
        }
        bytes.extend_from_slice(self.producer.as_str().as_bytes());
        bytes.extend_from_slice(&self.depth.to_le_bytes());
        bytes.extend_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    /// Computes the block's hash: hex MD5 over [`Block::pow_bytes`].
    pub fn compute_hash(&self) -> BlockHash {
        BlockHash(md5_hex(&self.pow_bytes()))
    }

    /// Canonical wire bytes (bincode 2 + serde, `standard()` config).
    pub fn canonical_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("blocks should always be serializable")
    }

    /// Decodes a block from its canonical wire bytes.
    pub fn from_canonical_bytes(bytes: &[u8]) -> Option<Self> {
        let cfg = bincode::config::standard();
        let (block, _): (Block, usize) = bincode::serde::decode_from_slice(bytes, cfg).ok()?;
        Some(block)
    }
}

/// Returns `true` when `hash` ends with at least `difficulty` zero hex digits.
pub fn meets_difficulty(hash: &BlockHash, difficulty: u8) -> bool {
    let suffix = hash
        .as_str()
        .chars()
        .rev()
        .take_while(|c| *c == '0')
        .count();
    suffix >= difficulty as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn dummy_block(nonce: u32) -> Block {
        Block {
            parent: BlockHash("0".repeat(32)),
            nonce,
            ops: Vec::new(),
            producer: PublicKeyHex("04ab".to_string()),
            depth: 1,
        }
    }

    #[test]
    fn hash_is_stable_for_same_fields() {
        let b = dummy_block(7);
        assert_eq!(b.compute_hash(), b.compute_hash());
    }

    #[test]
    fn hash_depends_on_nonce() {
        assert_ne!(dummy_block(1).compute_hash(), dummy_block(2).compute_hash());
    }

    #[test]
    fn difficulty_counts_suffix_zeros() {
        let h = BlockHash("ab0012cd00".to_string());
        assert!(meets_difficulty(&h, 0));
        assert!(meets_difficulty(&h, 1));
        assert!(meets_difficulty(&h, 2));
        assert!(!meets_difficulty(&h, 3));
    }

    #[test]
    fn zero_difficulty_accepts_any_hash() {
        assert!(meets_difficulty(&BlockHash("abcdef".to_string()), 0));
    }

    #[test]
    fn canonical_roundtrip_preserves_hash() {
        let b = dummy_block(42);
        let decoded = Block::from_canonical_bytes(&b.canonical_bytes()).expect("decode");
        assert_eq!(decoded.compute_hash(), b.compute_hash());
    }
}
