//! Registry client: registration, heartbeats, peer discovery.
//!
//! The registry is the network's directory. A miner registers once at
//! startup (receiving the network settings), then heartbeats at a
//! fraction of the registry's timeout. Any registry RPC failure is
//! fatal: an evicted miner would silently fall off the network, so the
//! process exits instead.
//!
//! Each call opens its own connection; the registry protocol is
//! request/response and carries no session state.

use std::io;

use tokio::net::TcpStream;
use tracing::{debug, info};

use inkchain::{NetSettings, PublicKeyHex};

use crate::state::SharedNode;
use crate::wire::{read_frame, write_frame, MinerInfo, RegistryRequest, RegistryResponse};

/// One request/response exchange with the registry.
async fn call(registry_addr: &str, request: &RegistryRequest) -> io::Result<RegistryResponse> {
    let mut stream = TcpStream::connect(registry_addr).await?;
    write_frame(&mut stream, request).await?;
    read_frame(&mut stream).await
}

/// Registers this miner and returns the network settings.
pub async fn register(registry_addr: &str, info: MinerInfo) -> io::Result<NetSettings> {
    match call(registry_addr, &RegistryRequest::Register(info)).await? {
        RegistryResponse::Settings(settings) => {
            info!("registered with registry at {registry_addr}");
            Ok(settings)
        }
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected registry reply to Register: {other:?}"),
        )),
    }
}

/// Asks the registry for dialable peer addresses.
pub async fn get_nodes(registry_addr: &str, key: &PublicKeyHex) -> io::Result<Vec<String>> {
    match call(registry_addr, &RegistryRequest::GetNodes(key.clone())).await? {
        RegistryResponse::Nodes(addrs) => Ok(addrs),
        other => Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("unexpected registry reply to GetNodes: {other:?}"),
        )),
    }
}

/// Sends heartbeats forever; exits the process on the first failure.
pub async fn heartbeat_loop(ctx: SharedNode, registry_addr: String) {
    let interval = ctx.settings.heartbeat_interval();
    loop {
        tokio::time::sleep(interval).await;
        match call(
            &registry_addr,
            &RegistryRequest::Heartbeat(ctx.public_key.clone()),
        )
        .await
        {
            Ok(RegistryResponse::Ack) => {
                debug!("heartbeat acknowledged");
            }
            Ok(other) => {
                tracing::error!("unexpected registry reply to Heartbeat: {other:?}");
                std::process::exit(1);
            }
            Err(e) => {
                tracing::error!("heartbeat failed: {e}");
                std::process::exit(1);
            }
        }
    }
}
