//! Materialized chain state and deterministic operation replay.
//!
//! The state after a block is fully determined by replaying every
//! operation from genesis: per-miner ink accounts, the per-pixel canvas
//! ownership map, the set of live (non-deleted) shapes, and the set of
//! every operation identity ever committed. [`ChainState::apply_block`]
//! is the single replay routine; block validation runs it against a
//! working copy and the store keeps the results it wants to cache.

use std::collections::{HashMap, HashSet};

use crate::config::NetSettings;
use crate::shape::{self, Pixel, ShapeSpec};
use crate::types::{Block, OpBody, OpId, Operation, PublicKeyHex, ShapeHash};

use super::error::{ArtError, ValidationError};

/// Per-miner ink bookkeeping.
///
/// Invariant at every committed block: `spent <= mined`; the spendable
/// balance is the difference.
#[derive(Clone, Copy, Debug, Default, Eq, PartialEq)]
pub struct InkAccount {
    pub mined: u32,
    pub spent: u32,
}

impl InkAccount {
    pub fn remaining(&self) -> u32 {
        self.mined - self.spent
    }
}

/// Ownership claim on a single canvas pixel.
///
/// A pixel belongs to `owner` while `count > 0`; overlapping shapes from
/// the same miner stack their claims.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct PixelClaim {
    pub owner: PublicKeyHex,
    pub count: u32,
}

/// A committed, not-yet-deleted shape.
#[derive(Clone, Debug)]
pub struct LiveShape {
    /// Identity of the add operation that committed the shape.
    pub op_id: OpId,
    /// The shape itself.
    pub spec: ShapeSpec,
    /// Ink the shape cost (refunded in full on delete).
    pub cost: u32,
    /// Every pixel the shape occupies.
    pub coverage: Vec<Pixel>,
    /// Art node that submitted the add; only it may delete the shape.
    pub art_node_key: PublicKeyHex,
    /// Miner whose ink paid and who owns the pixels.
    pub miner_key: PublicKeyHex,
}

/// Materialized view of the chain after some block.
#[derive(Clone, Debug, Default)]
pub struct ChainState {
    /// Ink account per miner key.
    pub inks: HashMap<PublicKeyHex, InkAccount>,
    /// Canvas ownership map.
    pub canvas: HashMap<Pixel, PixelClaim>,
    /// Live shapes keyed by fingerprint.
    pub shapes: HashMap<ShapeHash, LiveShape>,
    /// Identities of every operation committed on this chain.
    pub seen_ops: HashSet<OpId>,
}

impl ChainState {
    /// Spendable ink of `miner` (zero for unknown miners).
    pub fn ink_remaining(&self, miner: &PublicKeyHex) -> u32 {
        self.inks.get(miner).map(InkAccount::remaining).unwrap_or(0)
    }

    /// Fingerprints of the live shapes sponsored by `miner`.
    pub fn live_shapes_of(&self, miner: &PublicKeyHex) -> Vec<ShapeHash> {
        let mut hashes: Vec<ShapeHash> = self
            .shapes
            .iter()
            .filter(|(_, s)| &s.miner_key == miner)
            .map(|(h, _)| h.clone())
            .collect();
        hashes.sort();
        hashes
    }

    /// Checks candidate coverage for a conflict with another miner's
    /// pixels, returning the fingerprint of an overlapped shape.
    pub fn overlap_conflict(
        &self,
        pixels: impl Iterator<Item = Pixel>,
        miner: &PublicKeyHex,
    ) -> Option<ShapeHash> {
        for pixel in pixels {
            if let Some(claim) = self.canvas.get(&pixel) {
                if claim.count > 0 && &claim.owner != miner {
                    // Locate a live shape of that owner covering the pixel
                    // so the error can name what was hit.
                    return self
                        .shapes
                        .iter()
                        .find(|(_, s)| s.miner_key == claim.owner && s.coverage.contains(&pixel))
                        .map(|(h, _)| h.clone());
                }
            }
        }
        None
    }

    /// Credits `amount` mined ink to `producer`.
    pub fn award(&mut self, producer: &PublicKeyHex, amount: u32) {
        let account = self.inks.entry(producer.clone()).or_default();
        account.mined = account.mined.saturating_add(amount);
    }

    /// Validates `op` against this state and applies it.
    ///
    /// On any failure the state is left untouched and the error names
    /// the offending operation.
    pub fn apply_operation(
        &mut self,
        op: &Operation,
        settings: &NetSettings,
    ) -> Result<(), ValidationError> {
        let id = op.id();
        if self.seen_ops.contains(&id) {
            return Err(ValidationError::DuplicateOp(id));
        }

        match &op.body {
            OpBody::AddShape { shape, miner_key } => {
                let rendered =
                    shape::evaluate(&shape.path, &shape.fill, &shape.stroke, &settings.canvas)
                        .map_err(|e| ValidationError::Op(id.clone(), e.into()))?;
                let hash = rendered.hash();

                if self.shapes.contains_key(&hash) {
                    return Err(ValidationError::DuplicateShape(hash));
                }

                let remaining = self.ink_remaining(miner_key);
                if remaining < rendered.cost {
                    return Err(ValidationError::Op(
                        id,
                        ArtError::InsufficientInk(remaining),
                    ));
                }

                if let Some(hit) = self.overlap_conflict(rendered.coverage.pixels(), miner_key) {
                    return Err(ValidationError::Op(id, ArtError::ShapeOverlap(hit)));
                }

                let coverage: Vec<Pixel> = rendered.coverage.pixels().collect();
                for pixel in &coverage {
                    let claim = self.canvas.entry(*pixel).or_insert_with(|| PixelClaim {
                        owner: miner_key.clone(),
                        count: 0,
                    });
                    claim.count += 1;
                }

                let account = self.inks.entry(miner_key.clone()).or_default();
                account.spent += rendered.cost;

                self.shapes.insert(
                    hash,
                    LiveShape {
                        op_id: id.clone(),
                        spec: rendered.spec,
                        cost: rendered.cost,
                        coverage,
                        art_node_key: op.art_node_key.clone(),
                        miner_key: miner_key.clone(),
                    },
                );
                self.seen_ops.insert(id);
                Ok(())
            }

            OpBody::DeleteShape { target } => {
                let live = match self.shapes.get(target) {
                    Some(live) => live,
                    None => return Err(ValidationError::Op(id, ArtError::InvalidShapeHash)),
                };
                if live.art_node_key != op.art_node_key {
                    return Err(ValidationError::Op(id, ArtError::ShapeOwnerMismatch));
                }

                let live = self.shapes.remove(target).expect("presence checked above");
                for pixel in &live.coverage {
                    if let Some(claim) = self.canvas.get_mut(pixel) {
                        claim.count -= 1;
                        if claim.count == 0 {
                            self.canvas.remove(pixel);
                        }
                    }
                }

                // Full refund of the shape's cost to its sponsor.
                let account = self.inks.entry(live.miner_key.clone()).or_default();
                account.spent = account.spent.saturating_sub(live.cost);

                self.seen_ops.insert(id);
                Ok(())
            }
        }
    }

    /// Replays a whole block: every operation in order, then the
    /// producer's mining award.
    pub fn apply_block(
        &mut self,
        block: &Block,
        settings: &NetSettings,
    ) -> Result<(), ValidationError> {
        for op in &block.ops {
            self.apply_operation(op, settings)?;
        }
        self.award(&block.producer, settings.award_for(!block.is_noop()));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasSettings;
    use crate::types::KeyPair;

    fn dummy_settings() -> NetSettings {
        NetSettings {
            genesis_block_hash: "0".repeat(32),
            min_num_miner_connections: 1,
            ink_per_op_block: 5,
            ink_per_no_op_block: 1,
            heartbeat: 1_000,
            pow_difficulty_op_block: 0,
            pow_difficulty_no_op_block: 0,
            canvas: CanvasSettings {
                canvas_x_max: 1000,
                canvas_y_max: 1000,
            },
        }
    }

    fn add_op(art: &KeyPair, miner: &KeyPair, path: &str) -> Operation {
        Operation::signed(
            OpBody::AddShape {
                shape: ShapeSpec {
                    path: path.to_string(),
                    fill: "transparent".to_string(),
                    stroke: "red".to_string(),
                },
                miner_key: miner.public(),
            },
            art,
        )
    }

    fn delete_op(art: &KeyPair, target: ShapeHash) -> Operation {
        Operation::signed(OpBody::DeleteShape { target }, art)
    }

    #[test]
    fn add_charges_sponsor_and_claims_pixels() {
        let settings = dummy_settings();
        let art = KeyPair::generate();
        let miner = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner.public(), 20);

        // Horizontal 11-pixel segment: cost 11.
        let op = add_op(&art, &miner, "M 0 0 L 10 0");
        state.apply_operation(&op, &settings).expect("valid add");

        assert_eq!(state.ink_remaining(&miner.public()), 9);
        assert_eq!(state.canvas.len(), 11);
        assert_eq!(state.shapes.len(), 1);
        assert_eq!(state.live_shapes_of(&miner.public()).len(), 1);
    }

    #[test]
    fn insufficient_ink_carries_the_remaining_amount() {
        let settings = dummy_settings();
        let art = KeyPair::generate();
        let miner = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner.public(), 10);

        let op = add_op(&art, &miner, "M 0 0 L 10 0");
        let err = state.apply_operation(&op, &settings).unwrap_err();
        assert_eq!(err.to_art_error(), ArtError::InsufficientInk(10));
        // Failure leaves the state untouched.
        assert!(state.canvas.is_empty());
        assert!(state.seen_ops.is_empty());
    }

    #[test]
    fn overlap_with_other_miner_names_the_hit_shape() {
        let settings = dummy_settings();
        let art_a = KeyPair::generate();
        let art_b = KeyPair::generate();
        let miner_a = KeyPair::generate();
        let miner_b = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner_a.public(), 100);
        state.award(&miner_b.public(), 100);

        let first = add_op(&art_a, &miner_a, "M 0 0 L 10 0");
        state.apply_operation(&first, &settings).expect("first add");
        let first_hash = state.live_shapes_of(&miner_a.public())[0].clone();

        // Crosses the first segment at (5, 0).
        let crossing = add_op(&art_b, &miner_b, "M 5 0 L 5 5");
        let err = state.apply_operation(&crossing, &settings).unwrap_err();
        assert_eq!(err.to_art_error(), ArtError::ShapeOverlap(first_hash));
    }

    #[test]
    fn overlap_with_own_shapes_is_permitted() {
        let settings = dummy_settings();
        let art = KeyPair::generate();
        let miner = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner.public(), 100);

        state
            .apply_operation(&add_op(&art, &miner, "M 0 0 L 10 0"), &settings)
            .expect("first add");
        state
            .apply_operation(&add_op(&art, &miner, "M 5 0 L 5 5"), &settings)
            .expect("own overlap is fine");

        // The shared pixel is claimed twice.
        assert_eq!(state.canvas.get(&(5, 0)).map(|c| c.count), Some(2));
    }

    #[test]
    fn delete_refunds_cost_and_releases_pixels() {
        let settings = dummy_settings();
        let art = KeyPair::generate();
        let miner = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner.public(), 20);

        let add = add_op(&art, &miner, "M 0 0 L 10 0");
        state.apply_operation(&add, &settings).expect("add");
        let hash = state.live_shapes_of(&miner.public())[0].clone();
        assert_eq!(state.ink_remaining(&miner.public()), 9);

        let del = delete_op(&art, hash.clone());
        state.apply_operation(&del, &settings).expect("delete");

        assert_eq!(state.ink_remaining(&miner.public()), 20);
        assert!(state.canvas.is_empty());
        assert!(state.shapes.is_empty());
        // The delete's identity is still recorded.
        assert!(state.seen_ops.contains(&del.id()));
    }

    #[test]
    fn delete_by_other_art_node_is_owner_mismatch() {
        let settings = dummy_settings();
        let art_p = KeyPair::generate();
        let art_q = KeyPair::generate();
        let miner = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner.public(), 20);

        state
            .apply_operation(&add_op(&art_p, &miner, "M 0 0 L 10 0"), &settings)
            .expect("add");
        let hash = state.live_shapes_of(&miner.public())[0].clone();

        let err = state
            .apply_operation(&delete_op(&art_q, hash), &settings)
            .unwrap_err();
        assert_eq!(err.to_art_error(), ArtError::ShapeOwnerMismatch);
    }

    #[test]
    fn delete_of_unknown_shape_is_invalid_hash() {
        let settings = dummy_settings();
        let art = KeyPair::generate();

        let mut state = ChainState::default();
        let err = state
            .apply_operation(&delete_op(&art, ShapeHash("ff".repeat(16))), &settings)
            .unwrap_err();
        assert_eq!(err.to_art_error(), ArtError::InvalidShapeHash);
    }

    #[test]
    fn duplicate_operation_identity_is_rejected() {
        let settings = dummy_settings();
        let art = KeyPair::generate();
        let miner = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner.public(), 100);

        let op = add_op(&art, &miner, "M 0 0 L 10 0");
        state.apply_operation(&op, &settings).expect("first time");
        let err = state.apply_operation(&op, &settings).unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateOp(_)));
    }

    #[test]
    fn identical_live_shape_is_rejected_even_for_same_miner() {
        let settings = dummy_settings();
        let art_a = KeyPair::generate();
        let art_b = KeyPair::generate();
        let miner = KeyPair::generate();

        let mut state = ChainState::default();
        state.award(&miner.public(), 100);

        state
            .apply_operation(&add_op(&art_a, &miner, "M 0 0 L 10 0"), &settings)
            .expect("add");
        // Same shape, different submitter: distinct op identity, same
        // fingerprint.
        let err = state
            .apply_operation(&add_op(&art_b, &miner, "M 0 0 L 10 0"), &settings)
            .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateShape(_)));
    }

    #[test]
    fn block_replay_awards_by_block_kind() {
        let settings = dummy_settings();
        let miner = KeyPair::generate();
        let mut state = ChainState::default();

        let noop = Block {
            parent: crate::types::BlockHash("0".repeat(32)),
            nonce: 0,
            ops: Vec::new(),
            producer: miner.public(),
            depth: 1,
        };
        state.apply_block(&noop, &settings).expect("noop block");
        assert_eq!(state.ink_remaining(&miner.public()), 1);

        let art = KeyPair::generate();
        let op_block = Block {
            parent: noop.compute_hash(),
            nonce: 0,
            ops: vec![add_op(&art, &miner, "M 0 0")],
            producer: miner.public(),
            depth: 2,
        };
        state.apply_block(&op_block, &settings).expect("op block");
        // 1 (no-op award) - 1 (single-pixel shape) + 5 (op award).
        assert_eq!(state.ink_remaining(&miner.public()), 5);
    }
}
