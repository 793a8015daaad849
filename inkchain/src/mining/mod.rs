//! Mining primitives: the pending pool and the nonce search.
//!
//! The async orchestration (preemption, publication, gossip) lives in
//! the miner binary; this module keeps the synchronous core so it can
//! be exercised directly in tests.

pub mod pool;
pub mod pow;

pub use pool::PendingPool;
pub use pow::{search_nonce, PowOutcome};
