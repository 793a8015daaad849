// src/main.rs
//
// BlockArt ink-miner node:
//
// - registers with the registry and heartbeats it
// - maintains peer connections and gossips blocks/operations
// - mines op- and no-op blocks on the current tip
// - serves the art-node command surface
// - Prometheus metrics exporter on /metrics

mod artnode;
mod mine;
mod peers;
mod registry;
mod state;
mod wire;

use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::signal;
use tracing::info;

use inkchain::{run_prometheus_http_server, KeyPair, MetricsRegistry, MinerConfig};

use state::NodeContext;
use wire::MinerInfo;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUST_LOG").unwrap_or_else(|_| "miner=info,inkchain=info".to_string()),
        )
        .init();

    if let Err(e) = run().await {
        eprintln!("fatal error: {e}");
        std::process::exit(1);
    }
}

async fn run() -> Result<(), String> {
    let args: Vec<String> = std::env::args().collect();
    if args.len() != 5 {
        return Err(format!(
            "usage: {} <registry-addr> <keypair-hex> <peer-listen-port> <art-node-listen-port>",
            args.first().map(String::as_str).unwrap_or("miner")
        ));
    }
    let registry_addr = args[1].clone();
    let keypair = KeyPair::from_hex(&args[2]).map_err(|e| format!("bad key pair: {e}"))?;
    let peer_port: u16 = args[3]
        .parse()
        .map_err(|_| "peer listen port must be a number".to_string())?;
    let art_port: u16 = args[4]
        .parse()
        .map_err(|_| "art-node listen port must be a number".to_string())?;

    // Learn the address peers can reach us at by dialing the registry.
    let peer_addr = {
        let probe = TcpStream::connect(&registry_addr)
            .await
            .map_err(|e| format!("cannot reach registry {registry_addr}: {e}"))?;
        let local_ip = probe
            .local_addr()
            .map_err(|e| format!("cannot determine local address: {e}"))?
            .ip();
        format!("{local_ip}:{peer_port}")
    };

    // ---------------------------
    // Registration
    // ---------------------------

    let settings = registry::register(
        &registry_addr,
        MinerInfo {
            address: peer_addr.clone(),
            key: keypair.public(),
        },
    )
    .await
    .map_err(|e| format!("registration failed: {e}"))?;
    info!(
        canvas_x = settings.canvas.canvas_x_max,
        canvas_y = settings.canvas.canvas_y_max,
        "received network settings"
    );

    // ---------------------------
    // Metrics
    // ---------------------------

    let metrics = Arc::new(
        MetricsRegistry::new().map_err(|e| format!("failed to initialise metrics registry: {e}"))?,
    );
    let config = MinerConfig::default();
    if config.metrics.enabled {
        let metrics_clone = metrics.clone();
        let addr = config.metrics.listen_addr;
        tokio::spawn(async move {
            if let Err(e) = run_prometheus_http_server(metrics_clone, addr).await {
                eprintln!("metrics HTTP server error: {e}");
            }
        });
        info!("metrics exporter listening on http://{addr}/metrics");
    }

    // ---------------------------
    // Shared state + listeners
    // ---------------------------

    let ctx = NodeContext::new(settings, config, keypair, peer_addr.clone(), metrics);

    let peer_listener = TcpListener::bind(("0.0.0.0", peer_port))
        .await
        .map_err(|e| format!("failed to bind peer port {peer_port}: {e}"))?;
    let art_listener = TcpListener::bind(("127.0.0.1", art_port))
        .await
        .map_err(|e| format!("failed to bind art-node port {art_port}: {e}"))?;

    info!(peer = %peer_addr, art_port, "ink-miner listening");

    // ---------------------------
    // Tasks
    // ---------------------------

    tokio::spawn(registry::heartbeat_loop(ctx.clone(), registry_addr.clone()));
    tokio::spawn(peers::maintain_peers(ctx.clone(), registry_addr));
    tokio::spawn(peers::serve_peers(ctx.clone(), peer_listener));
    tokio::spawn(artnode::serve_art_nodes(ctx.clone(), art_listener));
    tokio::spawn(mine::run_mining_loop(ctx));

    shutdown_signal().await;
    Ok(())
}

/// Waits for Ctrl-C, used for graceful shutdown.
async fn shutdown_signal() {
    let _ = signal::ctrl_c().await;
    info!("shutdown signal received");
}
