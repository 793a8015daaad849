//! Shared node state and the single block-import path.
//!
//! Every task (mining loop, peer readers, art-node handlers) works
//! against one [`NodeContext`]: settings, the key pair, the chain
//! store, the pending pool, the peer set, and the notification
//! channels. Block insertion goes through [`NodeContext::import_block`]
//! regardless of whether the block was mined locally or gossiped, so
//! pool maintenance and tip notifications cannot be skipped.

use std::collections::HashSet;
use std::sync::Arc;

use tokio::sync::{watch, Mutex, Notify, RwLock};

use inkchain::{
    Block, BlockHash, ChainStore, InsertOutcome, KeyPair, MetricsRegistry, MinerConfig,
    NetSettings, OpId, Operation, PendingPool, PublicKeyHex, ValidationError,
};

use crate::peers::Peers;

/// Snapshot of the tip published on the watch channel.
#[derive(Clone, Debug)]
pub struct TipInfo {
    pub hash: BlockHash,
    pub depth: u32,
    /// Monotonic counter; every tip movement bumps it.
    pub version: u64,
}

/// Result of importing a block into the local store.
#[derive(Debug)]
pub enum ImportResult {
    /// Accepted as new; `blocks` lists every hash that joined (the
    /// block itself plus adopted orphans), all of which gossip onward.
    Accepted { blocks: Vec<BlockHash> },
    /// Already known; nothing to do.
    Duplicate,
    /// Parent unknown; the caller should ask the sender for ancestors.
    Parked { missing_parent: BlockHash },
    /// Failed validation; gossip drops it silently.
    Rejected(ValidationError),
}

/// State shared by every task of the miner process.
pub struct NodeContext {
    pub settings: NetSettings,
    pub config: MinerConfig,
    pub keypair: KeyPair,
    pub public_key: PublicKeyHex,
    /// Our own peer listen address, announced in reverse-bind handshakes.
    pub peer_addr: String,
    pub store: RwLock<ChainStore>,
    pub pool: Mutex<PendingPool>,
    pub peers: Peers,
    pub metrics: Arc<MetricsRegistry>,
    pub tip_tx: watch::Sender<TipInfo>,
    pub pool_notify: Notify,
}

/// Thread-safe alias for `NodeContext`.
pub type SharedNode = Arc<NodeContext>;

impl NodeContext {
    pub fn new(
        settings: NetSettings,
        config: MinerConfig,
        keypair: KeyPair,
        peer_addr: String,
        metrics: Arc<MetricsRegistry>,
    ) -> SharedNode {
        let store = ChainStore::new(settings.clone(), config.max_orphans);
        let genesis = store.genesis_hash().clone();
        let (tip_tx, _) = watch::channel(TipInfo {
            hash: genesis,
            depth: 0,
            version: 0,
        });
        let public_key = keypair.public();
        let pool = PendingPool::new(config.max_op_failures);
        let peers = Peers::new(metrics.miner.peers_connected.clone());

        Arc::new(NodeContext {
            settings,
            config,
            keypair,
            public_key,
            peer_addr,
            store: RwLock::new(store),
            pool: Mutex::new(pool),
            peers,
            metrics,
            tip_tx,
            pool_notify: Notify::new(),
        })
    }

    /// Validates and inserts a block, then reconciles the pending pool
    /// and publishes the tip movement.
    pub async fn import_block(&self, block: Block) -> ImportResult {
        let (outcome, pool_work) = {
            let mut store = self.store.write().await;
            let outcome = match store.insert_block(block) {
                Ok(outcome) => outcome,
                Err(e) => {
                    self.metrics.miner.blocks_rejected.inc();
                    return ImportResult::Rejected(e);
                }
            };

            // Collect pool maintenance under the store lock: operations
            // now committed on the tip path leave the pool, displaced
            // ones come back.
            let pool_work = if let InsertOutcome::Accepted {
                tip_change: Some(change),
                ..
            } = &outcome
            {
                let mut included: HashSet<OpId> = HashSet::new();
                let mut cursor = change.new_tip.clone();
                while cursor != change.common_ancestor {
                    match store.get_block(&cursor) {
                        Some(b) => {
                            included.extend(b.ops.iter().map(Operation::id));
                            cursor = b.parent.clone();
                        }
                        None => break,
                    }
                }
                Some((
                    included,
                    change.displaced_ops.clone(),
                    change.is_reorg(),
                    change.new_tip.clone(),
                    store.tip_depth(),
                ))
            } else {
                None
            };
            (outcome, pool_work)
        };

        match outcome {
            InsertOutcome::Duplicate(_) => ImportResult::Duplicate,
            InsertOutcome::Parked { missing_parent } => ImportResult::Parked { missing_parent },
            InsertOutcome::Accepted { hash, adopted, .. } => {
                if let Some((included, displaced, is_reorg, new_tip, new_depth)) = pool_work {
                    {
                        let mut pool = self.pool.lock().await;
                        pool.remove_included(&included);
                        pool.requeue(displaced);
                    }
                    if is_reorg {
                        self.metrics.miner.reorgs.inc();
                    }
                    self.metrics.miner.chain_depth.set(new_depth as i64);
                    self.tip_tx.send_modify(|tip| {
                        tip.hash = new_tip;
                        tip.depth = new_depth;
                        tip.version += 1;
                    });
                    self.pool_notify.notify_waiters();
                }

                let mut blocks = vec![hash];
                blocks.extend(adopted);
                ImportResult::Accepted { blocks }
            }
        }
    }

    /// Admits a gossiped or locally submitted operation to the pool.
    ///
    /// Returns `true` when the operation is new here (and should gossip
    /// onward). Operations with bad signatures or already committed on
    /// the tip chain are not admitted.
    pub async fn admit_operation(&self, op: Operation) -> bool {
        if op.verify_signature().is_err() {
            return false;
        }

        let already_committed = {
            let store = self.store.read().await;
            let state = store.tip_state();
            state.seen_ops.contains(&op.id())
        };
        if already_committed {
            return false;
        }

        let admitted = {
            let mut pool = self.pool.lock().await;
            pool.admit(op)
        };
        if admitted {
            self.metrics.miner.ops_admitted.inc();
            self.pool_notify.notify_waiters();
        }
        admitted
    }
}
