//! Proof-of-work nonce search with cooperative cancellation.
//!
//! The search scans the 32-bit nonce space sequentially and re-hashes
//! the candidate block each trial. It is CPU-bound and runs on a
//! blocking thread; preemption happens through an atomic flag the
//! worker checks once per bucket of trials, so a cancel releases the
//! search promptly without per-trial synchronization cost.

use std::sync::atomic::{AtomicBool, Ordering};

use crate::config::POW_CANCEL_CHECK_INTERVAL;
use crate::types::{block::meets_difficulty, Block, BlockHash};

/// How a nonce search ended.
#[derive(Clone, Debug, Eq, PartialEq)]
pub enum PowOutcome {
    /// A satisfying nonce was found; the block's nonce field is set.
    Found { hash: BlockHash },
    /// The cancel flag was raised; the partial search is discarded.
    Cancelled,
    /// The whole 32-bit space was scanned without a hit; the caller
    /// refreshes the candidate and restarts.
    Exhausted,
}

/// Scans nonces until the block hash meets `difficulty`.
///
/// Checks `cancel` every [`POW_CANCEL_CHECK_INTERVAL`] trials. On
/// success the found nonce is left in `block.nonce`.
pub fn search_nonce(block: &mut Block, difficulty: u8, cancel: &AtomicBool) -> PowOutcome {
    let mut nonce: u32 = 0;
    loop {
        if nonce % POW_CANCEL_CHECK_INTERVAL == 0 && cancel.load(Ordering::Relaxed) {
            return PowOutcome::Cancelled;
        }

        block.nonce = nonce;
        let hash = block.compute_hash();
        if meets_difficulty(&hash, difficulty) {
            return PowOutcome::Found { hash };
        }

        nonce = match nonce.checked_add(1) {
            Some(next) => next,
            None => return PowOutcome::Exhausted,
        };
    }
}
