//! Prometheus metrics for the miner.

pub mod prometheus;

pub use self::prometheus::{run_prometheus_http_server, MetricsRegistry, MinerMetrics};
