//! Pending pool: operations waiting to be mined into a block.
//!
//! Operations enter when an art node submits them or when a reorg
//! displaces them from an abandoned branch, and leave when a block on
//! the tip chain carries them. The pool is a FIFO over arrival order,
//! deduplicated by operation identity, with a bounded failure budget:
//! an operation that keeps failing candidate validation across tip
//! changes is dropped and its last error kept for the art-node call
//! still waiting on it.

use std::collections::{HashMap, HashSet, VecDeque};

use crate::config::NetSettings;
use crate::consensus::{ArtError, ChainState};
use crate::types::{OpId, Operation};

/// Bound on remembered errors of dropped operations.
const DROPPED_ERRORS_KEPT: usize = 256;

struct PendingOp {
    op: Operation,
    id: OpId,
    failures: u32,
}

/// FIFO of operations not yet on the tip chain.
pub struct PendingPool {
    queue: Vec<PendingOp>,
    ids: HashSet<OpId>,
    max_failures: u32,
    dropped: HashMap<OpId, ArtError>,
    dropped_order: VecDeque<OpId>,
}

impl PendingPool {
    pub fn new(max_failures: u32) -> Self {
        Self {
            queue: Vec::new(),
            ids: HashSet::new(),
            max_failures,
            dropped: HashMap::new(),
            dropped_order: VecDeque::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn contains(&self, id: &OpId) -> bool {
        self.ids.contains(id)
    }

    /// Admits an operation; duplicates are ignored.
    pub fn admit(&mut self, op: Operation) -> bool {
        let id = op.id();
        if !self.ids.insert(id.clone()) {
            return false;
        }
        self.dropped.remove(&id);
        self.queue.push(PendingOp {
            op,
            id,
            failures: 0,
        });
        true
    }

    /// Returns displaced operations to the pool after a reorg.
    pub fn requeue(&mut self, ops: Vec<Operation>) {
        for op in ops {
            self.admit(op);
        }
    }

    /// Drops every operation whose identity appears in `included`
    /// (they are now committed on the tip chain).
    pub fn remove_included(&mut self, included: &HashSet<OpId>) {
        self.queue.retain(|pending| {
            if included.contains(&pending.id) {
                self.ids.remove(&pending.id);
                false
            } else {
                true
            }
        });
    }

    /// The last validation error of an operation the pool gave up on.
    pub fn dropped_error(&self, id: &OpId) -> Option<ArtError> {
        self.dropped.get(id).cloned()
    }

    fn record_dropped(&mut self, id: OpId, error: ArtError) {
        if self.dropped.len() >= DROPPED_ERRORS_KEPT {
            if let Some(oldest) = self.dropped_order.pop_front() {
                self.dropped.remove(&oldest);
            }
        }
        self.dropped_order.push_back(id.clone());
        self.dropped.insert(id, error);
    }

    /// Selects a candidate set for a mining job: greedy in arrival
    /// order, validated cumulatively against a working copy of the tip
    /// state. Failing operations stay pooled but burn one unit of their
    /// failure budget; over budget they are dropped with their error.
    pub fn select_candidates(
        &mut self,
        tip_state: &ChainState,
        settings: &NetSettings,
    ) -> Vec<Operation> {
        let mut working = tip_state.clone();
        let mut candidates = Vec::new();
        let mut dropped: Vec<(OpId, ArtError)> = Vec::new();

        for pending in &mut self.queue {
            match working.apply_operation(&pending.op, settings) {
                Ok(()) => candidates.push(pending.op.clone()),
                Err(e) => {
                    pending.failures += 1;
                    if pending.failures > self.max_failures {
                        dropped.push((pending.id.clone(), e.to_art_error()));
                    }
                }
            }
        }

        for (id, error) in dropped {
            self.ids.remove(&id);
            self.queue.retain(|p| p.id != id);
            self.record_dropped(id, error);
        }

        candidates
    }
}
