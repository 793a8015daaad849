//! Error types for validation and the art-node command surface.

use serde::{Deserialize, Serialize};

use crate::shape::ShapeError;
use crate::types::{BlockHash, OpId, ShapeHash};

/// Failure taxonomy surfaced to art nodes.
///
/// This is the complete set of errors an art-node call can observe. It
/// crosses the wire, so it is serializable; payloads carry the context
/// the caller needs (remaining ink, the offending string, the
/// overlapped shape).
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum ArtError {
    /// The miner cannot be reached, or a bounded wait expired.
    Disconnected,
    /// The sponsoring miner lacks the ink; carries the remaining amount.
    InsufficientInk(u32),
    /// The path string violates the grammar or the fill rules.
    InvalidShapePath(String),
    /// The path string exceeds the 128-byte limit.
    ShapeTooLong(String),
    /// No live shape carries the referenced hash.
    InvalidShapeHash,
    /// The referenced shape was added by a different art node.
    ShapeOwnerMismatch,
    /// A pen position lies outside the canvas.
    OutOfBounds,
    /// The shape's pixels collide with another miner's live shape.
    ShapeOverlap(ShapeHash),
    /// No block carries the referenced hash.
    InvalidBlockHash,
    /// The session named a miner key this miner does not hold.
    InvalidMinerKey,
}

impl std::fmt::Display for ArtError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ArtError::Disconnected => write!(f, "disconnected from miner"),
            ArtError::InsufficientInk(remaining) => {
                write!(f, "not enough ink to add shape [{remaining}]")
            }
            ArtError::InvalidShapePath(s) => write!(f, "bad shape svg string [{s}]"),
            ArtError::ShapeTooLong(s) => write!(f, "shape svg string too long [{s}]"),
            ArtError::InvalidShapeHash => write!(f, "invalid shape hash"),
            ArtError::ShapeOwnerMismatch => write!(f, "shape owned by someone else"),
            ArtError::OutOfBounds => write!(f, "shape is outside the bounds of the canvas"),
            ArtError::ShapeOverlap(hash) => {
                write!(f, "shape overlaps with a previously added shape [{hash}]")
            }
            ArtError::InvalidBlockHash => write!(f, "invalid block hash"),
            ArtError::InvalidMinerKey => write!(f, "invalid miner key"),
        }
    }
}

impl std::error::Error for ArtError {}

impl From<ShapeError> for ArtError {
    fn from(e: ShapeError) -> Self {
        match e {
            ShapeError::InvalidPath(s) => ArtError::InvalidShapePath(s),
            ShapeError::TooLong(s) => ArtError::ShapeTooLong(s),
            ShapeError::OutOfBounds => ArtError::OutOfBounds,
        }
    }
}

/// Reasons a block fails the validation pipeline.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum ValidationError {
    /// The block's parent is not in the store (candidate for parking).
    UnknownParent(BlockHash),
    /// Depth is not parent depth + 1.
    DepthMismatch { expected: u32, got: u32 },
    /// The block hash lacks the required trailing zeros.
    DifficultyNotMet(BlockHash),
    /// An operation's art-node signature does not verify.
    BadSignature(OpId),
    /// The operation identity already appears on the parent chain.
    DuplicateOp(OpId),
    /// An identical live shape already exists on the parent chain.
    DuplicateShape(ShapeHash),
    /// An operation failed replay against the parent state.
    Op(OpId, ArtError),
}

impl ValidationError {
    /// Maps an operation-level failure onto the art-facing taxonomy.
    ///
    /// Block-structural failures have no art-node meaning and collapse
    /// to `InvalidBlockHash`.
    pub fn to_art_error(&self) -> ArtError {
        match self {
            ValidationError::Op(_, e) => e.clone(),
            ValidationError::DuplicateShape(hash) => ArtError::ShapeOverlap(hash.clone()),
            _ => ArtError::InvalidBlockHash,
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValidationError::UnknownParent(h) => write!(f, "unknown parent block [{h}]"),
            ValidationError::DepthMismatch { expected, got } => {
                write!(f, "depth {got} does not extend parent (expected {expected})")
            }
            ValidationError::DifficultyNotMet(h) => {
                write!(f, "block hash does not meet difficulty [{h}]")
            }
            ValidationError::BadSignature(id) => {
                write!(f, "operation signature does not verify [{id}]")
            }
            ValidationError::DuplicateOp(id) => {
                write!(f, "operation already on chain [{id}]")
            }
            ValidationError::DuplicateShape(h) => {
                write!(f, "identical live shape already on chain [{h}]")
            }
            ValidationError::Op(id, e) => write!(f, "operation [{id}] rejected: {e}"),
        }
    }
}

impl std::error::Error for ValidationError {}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn art_error_display_carries_context() {
        assert_eq!(
            ArtError::InsufficientInk(10).to_string(),
            "not enough ink to add shape [10]"
        );
        assert_eq!(
            ArtError::ShapeOverlap(ShapeHash("ab".to_string())).to_string(),
            "shape overlaps with a previously added shape [ab]"
        );
    }

    #[test]
    fn shape_errors_map_onto_the_taxonomy() {
        let e: ArtError = ShapeError::TooLong("M".to_string()).into();
        assert!(matches!(e, ArtError::ShapeTooLong(_)));
        let e: ArtError = ShapeError::OutOfBounds.into();
        assert_eq!(e, ArtError::OutOfBounds);
    }

    #[test]
    fn op_validation_failures_surface_their_art_error() {
        let v = ValidationError::Op(OpId("x".to_string()), ArtError::InsufficientInk(3));
        assert_eq!(v.to_art_error(), ArtError::InsufficientInk(3));

        let v = ValidationError::DifficultyNotMet(BlockHash("0".to_string()));
        assert_eq!(v.to_art_error(), ArtError::InvalidBlockHash);
    }

    #[test]
    fn art_error_roundtrips_with_bincode2() {
        let e = ArtError::InvalidShapePath("M x".to_string());
        let cfg = bincode::config::standard();
        let bytes = bincode::serde::encode_to_vec(&e, cfg).expect("encode");
        let (decoded, _): (ArtError, usize) =
            bincode::serde::decode_from_slice(&bytes, cfg).expect("decode");
        assert_eq!(decoded, e);
    }
}
