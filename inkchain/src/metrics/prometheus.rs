//! Prometheus-backed metrics and HTTP exporter.
//!
//! This module defines a [`MetricsRegistry`] that owns a Prometheus
//! registry and a set of strongly-typed miner metrics, and an async
//! HTTP exporter that serves `/metrics` using `hyper`.

use std::{convert::Infallible, net::SocketAddr, sync::Arc};

use bytes::Bytes;
use http_body_util::Full;
use hyper::{
    body::Incoming, header, server::conn::http1, service::service_fn, Method, Request, Response,
    StatusCode,
};
use hyper_util::rt::TokioIo;
use tokio::net::TcpListener;

use prometheus::{
    self, Encoder, Histogram, HistogramOpts, IntCounter, IntGauge, Opts, Registry, TextEncoder,
};

/// Mining and gossip metrics.
///
/// These are registered into a [`Registry`] and updated from the mining
/// loop, the chain import path, and the peer fabric.
#[derive(Clone)]
pub struct MinerMetrics {
    /// Blocks this miner found and the store accepted.
    pub blocks_mined: IntCounter,
    /// Blocks received from peers and accepted as new.
    pub blocks_received: IntCounter,
    /// Blocks (gossiped or mined) the validation pipeline rejected.
    pub blocks_rejected: IntCounter,
    /// Operations admitted to the pending pool.
    pub ops_admitted: IntCounter,
    /// Tip changes that crossed branches.
    pub reorgs: IntCounter,
    /// Depth of the current tip.
    pub chain_depth: IntGauge,
    /// Currently connected peers.
    pub peers_connected: IntGauge,
    /// Wall-clock seconds spent per completed nonce search.
    pub pow_seconds: Histogram,
}

impl MinerMetrics {
    /// Registers miner metrics into the given `Registry`.
    pub fn register(registry: &Registry) -> Result<Self, prometheus::Error> {
        let blocks_mined = IntCounter::with_opts(Opts::new(
            "miner_blocks_mined",
            "Blocks found locally and accepted by the chain store",
        ))?;
        registry.register(Box::new(blocks_mined.clone()))?;

        let blocks_received = IntCounter::with_opts(Opts::new(
            "miner_blocks_received",
            "Blocks received from peers and accepted as new",
        ))?;
        registry.register(Box::new(blocks_received.clone()))?;

        let blocks_rejected = IntCounter::with_opts(Opts::new(
            "miner_blocks_rejected",
            "Blocks rejected by the validation pipeline",
        ))?;
        registry.register(Box::new(blocks_rejected.clone()))?;

        let ops_admitted = IntCounter::with_opts(Opts::new(
            "miner_ops_admitted",
            "Operations admitted to the pending pool",
        ))?;
        registry.register(Box::new(ops_admitted.clone()))?;

        let reorgs = IntCounter::with_opts(Opts::new(
            "miner_reorgs",
            "Tip changes that crossed branches",
        ))?;
        registry.register(Box::new(reorgs.clone()))?;

        let chain_depth = IntGauge::with_opts(Opts::new(
            "miner_chain_depth",
            "Depth of the current tip block",
        ))?;
        registry.register(Box::new(chain_depth.clone()))?;

        let peers_connected = IntGauge::with_opts(Opts::new(
            "miner_peers_connected",
            "Number of currently connected peers",
        ))?;
        registry.register(Box::new(peers_connected.clone()))?;

        let pow_seconds = Histogram::with_opts(
            HistogramOpts::new(
                "miner_pow_seconds",
                "Wall-clock time per completed nonce search in seconds",
            )
            .buckets(vec![0.001, 0.01, 0.05, 0.1, 0.5, 1.0, 5.0, 15.0, 60.0]),
        )?;
        registry.register(Box::new(pow_seconds.clone()))?;

        Ok(Self {
            blocks_mined,
            blocks_received,
            blocks_rejected,
            ops_admitted,
            reorgs,
            chain_depth,
            peers_connected,
            pow_seconds,
        })
    }
}

/// Wrapper around a Prometheus registry and the miner metrics.
///
/// This is the main handle you pass around in the node. It can be
/// wrapped in an [`Arc`] and shared across tasks.
#[derive(Clone)]
pub struct MetricsRegistry {
    registry: Registry,
    pub miner: MinerMetrics,
}

impl MetricsRegistry {
    /// Creates a new `MetricsRegistry` with a fresh underlying
    /// `Registry` and registers the miner metrics.
    pub fn new() -> Result<Self, prometheus::Error> {
        let registry = Registry::new_custom(Some("inkchain".to_string()), None)?;
        let miner = MinerMetrics::register(&registry)?;
        Ok(Self { registry, miner })
    }

    /// Encodes all metrics in this registry into the Prometheus text format.
    pub fn gather_text(&self) -> String {
        let metric_families = self.registry.gather();
        let mut buffer = Vec::new();
        let encoder = TextEncoder::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            eprintln!("failed to encode Prometheus metrics: {e}");
            return String::new();
        }
        String::from_utf8(buffer).unwrap_or_default()
    }
}

/// Runs an HTTP server that exposes Prometheus metrics.
///
/// The server listens on `addr` and serves `GET /metrics` with the
/// Prometheus text exposition format. All other paths return 404.
pub async fn run_prometheus_http_server(
    metrics: Arc<MetricsRegistry>,
    addr: SocketAddr,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let listener = TcpListener::bind(addr).await?;

    loop {
        let (stream, _) = listener.accept().await?;
        let io = TokioIo::new(stream);
        let metrics = metrics.clone();

        tokio::spawn(async move {
            let svc = service_fn(move |req| {
                let metrics = metrics.clone();
                handle_request(req, metrics)
            });

            if let Err(err) = http1::Builder::new().serve_connection(io, svc).await {
                eprintln!("prometheus HTTP server error: {err}");
            }
        });
    }
}

async fn handle_request(
    req: Request<Incoming>,
    metrics: Arc<MetricsRegistry>,
) -> Result<Response<Full<Bytes>>, Infallible> {
    match (req.method(), req.uri().path()) {
        (&Method::GET, "/metrics") => {
            let body = metrics.gather_text();
            Ok(Response::builder()
                .status(StatusCode::OK)
                .header(header::CONTENT_TYPE, "text/plain; version=0.0.4")
                .body(Full::new(Bytes::from(body)))
                .unwrap())
        }
        _ => Ok(Response::builder()
            .status(StatusCode::NOT_FOUND)
            .body(Full::new(Bytes::from("not found")))
            .unwrap()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use prometheus::Registry;

    #[test]
    fn miner_metrics_register_and_record() {
        let registry = Registry::new();
        let metrics = MinerMetrics::register(&registry).expect("register metrics");

        metrics.blocks_mined.inc();
        metrics.ops_admitted.inc();
        metrics.chain_depth.set(12);
        metrics.pow_seconds.observe(0.25);

        let metric_families = registry.gather();
        assert!(!metric_families.is_empty());
    }

    #[test]
    fn metrics_registry_gather_text_works() {
        let registry = MetricsRegistry::new().expect("create metrics registry");
        registry.miner.blocks_received.inc();
        let text = registry.gather_text();
        assert!(text.contains("miner_blocks_received"));
    }
}
