//! Ink chain library crate.
//!
//! This crate provides the core building blocks for the BlockArt
//! ink-miner, a proof-of-work blockchain of drawing operations:
//!
//! - strongly-typed domain types (`types`),
//! - the shape engine: path grammar, rasterization, ink cost (`shape`),
//! - the block DAG, validation pipeline, and ink accounting (`consensus`),
//! - mining primitives: pending pool and nonce search (`mining`),
//! - Prometheus-based metrics (`metrics`),
//! - and node configuration (`config`).
//!
//! The `ink-miner` binary composes these pieces with a registry client,
//! peer gossip, and the art-node command server.

pub mod config;
pub mod consensus;
pub mod metrics;
pub mod mining;
pub mod shape;
pub mod types;

// Re-export top-level configuration types.
pub use config::{CanvasSettings, MetricsConfig, MinerConfig, NetSettings};

// Re-export "core" consensus types.
pub use consensus::{
    ArtError, ChainState, ChainStore, InkAccount, InsertOutcome, LiveShape, TipChange,
    ValidationError,
};

// Re-export mining primitives.
pub use mining::{search_nonce, PendingPool, PowOutcome};

// Re-export the shape engine surface.
pub use shape::{evaluate as evaluate_shape, RenderedShape, ShapeError, ShapeSpec};

// Re-export metrics registry and exporter.
pub use metrics::{run_prometheus_http_server, MetricsRegistry, MinerMetrics};

// Re-export domain types at the crate root for convenience.
pub use types::*;
