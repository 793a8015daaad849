//! Block validation pipeline.
//!
//! Checks run in a strict order and the first failure aborts: depth
//! linkage, proof-of-work difficulty, operation signatures, then a full
//! replay of the operations against a working copy of the parent state
//! (which enforces identity uniqueness, ink sufficiency, the overlap
//! policy, and delete provenance). Parent existence is the store's
//! concern; callers hand in the parent's depth and state.

use crate::config::NetSettings;
use crate::types::{block::meets_difficulty, Block};

use super::error::ValidationError;
use super::state::ChainState;

/// Validates `block` against its parent and returns the post-block state.
pub fn validate_block(
    block: &Block,
    parent_depth: u32,
    parent_state: &ChainState,
    settings: &NetSettings,
) -> Result<ChainState, ValidationError> {
    let expected = parent_depth + 1;
    if block.depth != expected {
        return Err(ValidationError::DepthMismatch {
            expected,
            got: block.depth,
        });
    }

    let hash = block.compute_hash();
    if !meets_difficulty(&hash, settings.difficulty_for(!block.is_noop())) {
        return Err(ValidationError::DifficultyNotMet(hash));
    }

    for op in &block.ops {
        if op.verify_signature().is_err() {
            return Err(ValidationError::BadSignature(op.id()));
        }
    }

    let mut state = parent_state.clone();
    state.apply_block(block, settings)?;
    Ok(state)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::CanvasSettings;
    use crate::types::{BlockHash, KeyPair, OpBody, Operation, SignatureBytes};

    fn dummy_settings(difficulty: u8) -> NetSettings {
        NetSettings {
            genesis_block_hash: "0".repeat(32),
            min_num_miner_connections: 1,
            ink_per_op_block: 5,
            ink_per_no_op_block: 1,
            heartbeat: 1_000,
            pow_difficulty_op_block: difficulty,
            pow_difficulty_no_op_block: difficulty,
            canvas: CanvasSettings {
                canvas_x_max: 1000,
                canvas_y_max: 1000,
            },
        }
    }

    fn noop_block(parent: BlockHash, depth: u32, producer: &KeyPair) -> Block {
        Block {
            parent,
            nonce: 0,
            ops: Vec::new(),
            producer: producer.public(),
            depth,
        }
    }

    #[test]
    fn valid_noop_block_yields_awarded_state() {
        let settings = dummy_settings(0);
        let miner = KeyPair::generate();
        let genesis_state = ChainState::default();

        let block = noop_block(BlockHash("0".repeat(32)), 1, &miner);
        let state = validate_block(&block, 0, &genesis_state, &settings).expect("valid");
        assert_eq!(state.ink_remaining(&miner.public()), 1);
    }

    #[test]
    fn wrong_depth_is_rejected() {
        let settings = dummy_settings(0);
        let miner = KeyPair::generate();
        let block = noop_block(BlockHash("0".repeat(32)), 3, &miner);

        let err = validate_block(&block, 0, &ChainState::default(), &settings).unwrap_err();
        assert!(matches!(
            err,
            ValidationError::DepthMismatch { expected: 1, got: 3 }
        ));
    }

    #[test]
    fn difficulty_violation_is_rejected() {
        // Difficulty 8 makes a lucky hash effectively impossible; scan a
        // few nonces and expect every one of them to fail.
        let settings = dummy_settings(8);
        let miner = KeyPair::generate();
        let state = ChainState::default();

        for nonce in 0..16 {
            let mut block = noop_block(BlockHash("0".repeat(32)), 1, &miner);
            block.nonce = nonce;
            if meets_difficulty(&block.compute_hash(), 8) {
                continue;
            }
            let err = validate_block(&block, 0, &state, &settings).unwrap_err();
            assert!(matches!(err, ValidationError::DifficultyNotMet(_)));
        }
    }

    #[test]
    fn forged_op_signature_is_rejected() {
        let settings = dummy_settings(0);
        let miner = KeyPair::generate();
        let art = KeyPair::generate();

        let mut op = Operation::signed(
            OpBody::AddShape {
                shape: crate::shape::ShapeSpec {
                    path: "M 0 0".to_string(),
                    fill: "transparent".to_string(),
                    stroke: "red".to_string(),
                },
                miner_key: miner.public(),
            },
            &art,
        );
        op.signature = SignatureBytes(vec![0u8; 96]);

        let mut state = ChainState::default();
        state.award(&miner.public(), 100);

        let block = Block {
            parent: BlockHash("0".repeat(32)),
            nonce: 0,
            ops: vec![op],
            producer: miner.public(),
            depth: 1,
        };
        let err = validate_block(&block, 0, &state, &settings).unwrap_err();
        assert!(matches!(err, ValidationError::BadSignature(_)));
    }

    #[test]
    fn replay_failure_rejects_the_whole_block() {
        let settings = dummy_settings(0);
        let miner = KeyPair::generate();
        let art = KeyPair::generate();

        // No ink awarded yet: the add must fail, and with it the block.
        let op = Operation::signed(
            OpBody::AddShape {
                shape: crate::shape::ShapeSpec {
                    path: "M 0 0 L 10 0".to_string(),
                    fill: "transparent".to_string(),
                    stroke: "red".to_string(),
                },
                miner_key: miner.public(),
            },
            &art,
        );
        let block = Block {
            parent: BlockHash("0".repeat(32)),
            nonce: 0,
            ops: vec![op],
            producer: miner.public(),
            depth: 1,
        };

        let err = validate_block(&block, 0, &ChainState::default(), &settings).unwrap_err();
        assert!(matches!(err, ValidationError::Op(_, _)));
    }
}
