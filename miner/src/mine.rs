//! The mining loop: candidate assembly, preemptible proof-of-work,
//! publication.
//!
//! One job is bound to the current tip at a time. The nonce search runs
//! on a blocking thread; the loop preempts it (via the shared cancel
//! flag) whenever the tip moves, or when the pending pool gains an
//! operation while the current candidate is a no-op block. A found
//! block goes through the same import path as gossip, so a block that
//! lost a race simply fails to move the tip and its operations stay
//! pooled for the next candidate.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use inkchain::{search_nonce, Block, PowOutcome};

use crate::peers;
use crate::state::{ImportResult, SharedNode};

pub async fn run_mining_loop(ctx: SharedNode) {
    let mut tip_rx = ctx.tip_tx.subscribe();
    loop {
        // Mark the current tip as seen before snapshotting; a movement
        // that slips in between merely cancels one search early.
        let _ = tip_rx.borrow_and_update();

        let (parent, depth, ops) = {
            let store = ctx.store.read().await;
            let state = store.tip_state();
            let mut pool = ctx.pool.lock().await;
            let ops = pool.select_candidates(&state, store.settings());
            (store.tip().clone(), store.tip_depth() + 1, ops)
        };

        let noop = ops.is_empty();
        let difficulty = ctx.settings.difficulty_for(!noop);
        let candidate = Block {
            parent,
            nonce: 0,
            ops,
            producer: ctx.public_key.clone(),
            depth,
        };

        let cancel = Arc::new(AtomicBool::new(false));
        let search_cancel = cancel.clone();
        let started = Instant::now();
        let mut search = tokio::task::spawn_blocking(move || {
            let mut block = candidate;
            let outcome = search_nonce(&mut block, difficulty, &search_cancel);
            (block, outcome)
        });

        let joined = tokio::select! {
            res = &mut search => Some(res),
            _ = tip_rx.changed() => {
                cancel.store(true, Ordering::Relaxed);
                let _ = search.await;
                None
            }
            _ = ctx.pool_notify.notified(), if noop => {
                cancel.store(true, Ordering::Relaxed);
                let _ = search.await;
                None
            }
        };

        let Some(joined) = joined else {
            continue;
        };
        let (block, outcome) = match joined {
            Ok(pair) => pair,
            Err(e) => {
                warn!("mining worker failed: {e}");
                continue;
            }
        };

        match outcome {
            PowOutcome::Found { hash } => {
                ctx.metrics
                    .miner
                    .pow_seconds
                    .observe(started.elapsed().as_secs_f64());
                match ctx.import_block(block).await {
                    ImportResult::Accepted { blocks } => {
                        ctx.metrics.miner.blocks_mined.inc();
                        info!(block = %hash, depth, "mined block");
                        peers::forward_blocks(&ctx, &blocks, None).await;
                    }
                    other => {
                        // Raced by gossip between search end and import.
                        debug!(block = %hash, "mined block not accepted: {other:?}");
                    }
                }
            }
            PowOutcome::Exhausted => {
                debug!(depth, "nonce space exhausted, refreshing candidate");
            }
            PowOutcome::Cancelled => {}
        }
    }
}
