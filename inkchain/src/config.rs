//! Configuration for an ink-miner node.
//!
//! Most protocol parameters are not chosen locally: the registry hands
//! them out at registration time as [`NetSettings`], and every miner on
//! a network must run with the same values for validation to agree.
//! [`MinerConfig`] collects the purely local knobs (listen addresses,
//! metrics exporter, tuning constants).

use std::net::SocketAddr;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Canvas dimensions shared by every miner on a network.
///
/// Valid pixel coordinates are `0 <= x < canvas_x_max` and
/// `0 <= y < canvas_y_max`.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct CanvasSettings {
    pub canvas_x_max: u32,
    pub canvas_y_max: u32,
}

/// Network-wide settings supplied by the registry at registration.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct NetSettings {
    /// Hash of the well-known genesis block.
    pub genesis_block_hash: String,

    /// Minimum number of peer connections a miner maintains; below this
    /// the peer-maintenance loop asks the registry for more addresses.
    pub min_num_miner_connections: u8,

    /// Ink awarded for mining a block that carries operations (>= 1).
    pub ink_per_op_block: u32,

    /// Ink awarded for mining a no-op block (>= 1).
    pub ink_per_no_op_block: u32,

    /// Milliseconds the registry allows between heartbeats.
    pub heartbeat: u32,

    /// Required trailing zero hex digits on op-block hashes.
    pub pow_difficulty_op_block: u8,

    /// Required trailing zero hex digits on no-op-block hashes.
    pub pow_difficulty_no_op_block: u8,

    /// Canvas dimensions.
    pub canvas: CanvasSettings,
}

impl NetSettings {
    /// Difficulty applicable to a block with the given operation count.
    pub fn difficulty_for(&self, has_ops: bool) -> u8 {
        if has_ops {
            self.pow_difficulty_op_block
        } else {
            self.pow_difficulty_no_op_block
        }
    }

    /// Ink award for a block with the given operation count.
    pub fn award_for(&self, has_ops: bool) -> u32 {
        if has_ops {
            self.ink_per_op_block
        } else {
            self.ink_per_no_op_block
        }
    }

    /// Interval between heartbeats sent to the registry: a fraction of
    /// the registry's timeout so an occasional delay does not evict us.
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(u64::from(self.heartbeat) / 2)
    }
}

/// Configuration for the Prometheus metrics exporter.
#[derive(Clone, Debug)]
pub struct MetricsConfig {
    /// Whether to run a `/metrics` HTTP exporter.
    pub enabled: bool,
    /// Address to bind the metrics HTTP server to.
    pub listen_addr: SocketAddr,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        // Safe to unwrap: fixed, valid address literal.
        let addr: SocketAddr = "127.0.0.1:9898"
            .parse()
            .expect("hard-coded metrics listen address should parse");
        Self {
            enabled: true,
            listen_addr: addr,
        }
    }
}

/// Local (non-consensus) configuration of a single miner process.
#[derive(Clone, Debug)]
pub struct MinerConfig {
    /// Metrics exporter settings.
    pub metrics: MetricsConfig,

    /// Distinct tips an operation may fail validation under before the
    /// pending pool drops it.
    pub max_op_failures: u32,

    /// Upper bound on parked orphan blocks awaiting a parent.
    pub max_orphans: usize,

    /// Bound on each peer's outbound message queue; a peer that cannot
    /// drain its queue is disconnected rather than buffered without limit.
    pub peer_queue_depth: usize,

    /// Default bound on an art-node call waiting for confirmation depth.
    pub confirm_timeout: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            metrics: MetricsConfig::default(),
            max_op_failures: 8,
            max_orphans: 1024,
            peer_queue_depth: 256,
            confirm_timeout: Duration::from_secs(120),
        }
    }
}

/// Nonce trials between checks of the mining job's cancel flag.
pub const POW_CANCEL_CHECK_INTERVAL: u32 = 1 << 12;

/// Depth interval at which the chain store pins a state snapshot.
pub const STATE_SNAPSHOT_INTERVAL: u32 = 64;

/// Number of most recent depths whose states stay materialized.
pub const STATE_RECENT_WINDOW: u32 = 16;
