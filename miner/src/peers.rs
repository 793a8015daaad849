//! Peer fabric: connection upkeep, gossip fan-out, chain catch-up.
//!
//! Every peer pairing is bidirectional: dialing a peer announces our
//! own listen address (`EstablishReverse`) so the remote dials back a
//! symmetric channel. Each connection runs one reader task and one
//! writer task; the writer drains a bounded queue and a peer whose
//! queue overflows is disconnected rather than buffered without limit.
//!
//! Gossip is announce-on-accept: whatever the local store accepts as
//! new (blocks or operations) forwards once to every connected peer
//! except the one that sent it. A block whose parent is missing parks
//! locally while a `ChainRequest` asks the sender for the ancestors.

use std::collections::HashMap;
use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use prometheus::IntGauge;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, info, warn};

use inkchain::BlockHash;

use crate::registry;
use crate::state::{ImportResult, SharedNode};
use crate::wire::{read_frame, write_frame, PeerMessage};

/// Interval of the peer maintenance loop.
const MAINTENANCE_INTERVAL: Duration = Duration::from_secs(5);

/// Connected peers, keyed by the address we dialed.
///
/// Only outbound connections are gossip targets; the remote's own
/// outbound channel covers the other direction.
pub struct Peers {
    inner: Mutex<HashMap<String, mpsc::Sender<PeerMessage>>>,
    gauge: IntGauge,
}

impl Peers {
    pub fn new(gauge: IntGauge) -> Self {
        Self {
            inner: Mutex::new(HashMap::new()),
            gauge,
        }
    }

    pub async fn count(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_connected(&self, addr: &str) -> bool {
        self.inner.lock().await.contains_key(addr)
    }

    async fn register(&self, addr: String, tx: mpsc::Sender<PeerMessage>) -> bool {
        let mut inner = self.inner.lock().await;
        if inner.contains_key(&addr) {
            return false;
        }
        inner.insert(addr, tx);
        self.gauge.set(inner.len() as i64);
        true
    }

    pub async fn remove(&self, addr: &str) {
        let mut inner = self.inner.lock().await;
        inner.remove(addr);
        self.gauge.set(inner.len() as i64);
    }

    /// Queues `msg` to every peer except `except`; peers that cannot
    /// keep up are dropped.
    pub async fn broadcast(&self, msg: &PeerMessage, except: Option<&str>) {
        let mut inner = self.inner.lock().await;
        let mut dead: Vec<String> = Vec::new();
        for (addr, tx) in inner.iter() {
            if Some(addr.as_str()) == except {
                continue;
            }
            if tx.try_send(msg.clone()).is_err() {
                dead.push(addr.clone());
            }
        }
        for addr in dead {
            warn!(peer = %addr, "peer queue overflow, disconnecting");
            inner.remove(&addr);
        }
        self.gauge.set(inner.len() as i64);
    }
}

/// Accepts inbound peer connections forever.
pub async fn serve_peers(ctx: SharedNode, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!(%remote, "inbound peer connection");
                let ctx = ctx.clone();
                tokio::spawn(run_inbound(ctx, stream));
            }
            Err(e) => {
                warn!("peer accept failed: {e}");
            }
        }
    }
}

/// Keeps the peer count at or above the configured minimum by asking
/// the registry for addresses and dialing them.
pub async fn maintain_peers(ctx: SharedNode, registry_addr: String) {
    let min = usize::from(ctx.settings.min_num_miner_connections);
    loop {
        if ctx.peers.count().await < min {
            let nodes = match registry::get_nodes(&registry_addr, &ctx.public_key).await {
                Ok(nodes) => nodes,
                Err(e) => {
                    // Registry RPC failures are fatal for the miner.
                    tracing::error!("registry GetNodes failed: {e}");
                    std::process::exit(1);
                }
            };
            for addr in nodes {
                if addr != ctx.peer_addr && !ctx.peers.is_connected(&addr).await {
                    tokio::spawn(connect_to_peer(ctx.clone(), addr));
                }
            }
        }
        tokio::time::sleep(MAINTENANCE_INTERVAL).await;
    }
}

/// Dials `addr`, performs the reverse-bind handshake, and runs the
/// connection until either side drops it.
///
/// Returns a boxed trait-object future rather than being declared
/// `async fn`: `connect_to_peer` and `handle_message` are mutually
/// recursive through `tokio::spawn` (`handle_message` spawns
/// `connect_to_peer`, which spawns the reader task that awaits
/// `handle_message`), and rustc's opaque-type Send inference cannot
/// resolve that cycle when every link is an anonymous `impl Future`.
/// Boxing this one link gives it a concrete, already-Send type.
pub fn connect_to_peer(ctx: SharedNode, addr: String) -> Pin<Box<dyn Future<Output = ()> + Send>> {
    Box::pin(async move {
        if addr == ctx.peer_addr || ctx.peers.is_connected(&addr).await {
            return;
        }

        let stream = match TcpStream::connect(&addr).await {
            Ok(stream) => stream,
            Err(e) => {
                debug!(peer = %addr, "dial failed: {e}");
                return;
            }
        };

        let (reader, writer) = stream.into_split();
        let (tx, rx) = mpsc::channel(ctx.config.peer_queue_depth);

        if !ctx.peers.register(addr.clone(), tx.clone()).await {
            // A racing dial won; drop this connection.
            return;
        }
        info!(peer = %addr, "connected");

        // Ask the remote to open the symmetric channel back to us.
        let _ = tx.try_send(PeerMessage::EstablishReverse(ctx.peer_addr.clone()));

        tokio::spawn(run_writer(ctx.clone(), addr.clone(), writer, rx));
        tokio::spawn(outbound_reader::run_outbound_reader(ctx, addr, reader, tx));
    })
}

/// Drains the peer's queue onto the socket.
async fn run_writer(
    ctx: SharedNode,
    addr: String,
    mut writer: OwnedWriteHalf,
    mut rx: mpsc::Receiver<PeerMessage>,
) {
    while let Some(msg) = rx.recv().await {
        if let Err(e) = write_frame(&mut writer, &msg).await {
            debug!(peer = %addr, "peer write failed: {e}");
            break;
        }
    }
    ctx.peers.remove(&addr).await;
}

/// Reads frames arriving on a connection we dialed.
///
/// Lives in its own submodule: it and `connect_to_peer` are mutually
/// recursive through `tokio::spawn`, and rustc's opaque-type Send
/// inference cannot resolve that cycle when both are declared in the
/// same scope.
mod outbound_reader {
    use tokio::net::tcp::OwnedReadHalf;
    use tokio::sync::mpsc;
    use tracing::debug;

    use crate::state::SharedNode;
    use crate::wire::{read_frame, PeerMessage};

    pub(super) async fn run_outbound_reader(
        ctx: SharedNode,
        addr: String,
        mut reader: OwnedReadHalf,
        reply: mpsc::Sender<PeerMessage>,
    ) {
        // We dialed this peer, so its identity is known from the start.
        let mut remote_listen = Some(addr.clone());
        loop {
            match read_frame::<PeerMessage, _>(&mut reader).await {
                Ok(msg) => super::handle_message(&ctx, msg, &reply, &mut remote_listen).await,
                Err(e) => {
                    debug!(peer = %addr, "peer read ended: {e}");
                    break;
                }
            }
        }
        ctx.peers.remove(&addr).await;
    }
}

/// Runs an inbound connection: replies flow through a queue of our own
/// so the reader never blocks on the socket.
async fn run_inbound(ctx: SharedNode, stream: TcpStream) {
    let (mut reader, writer) = stream.into_split();
    let (tx, mut rx) = mpsc::channel::<PeerMessage>(ctx.config.peer_queue_depth);

    tokio::spawn(async move {
        let mut writer = writer;
        while let Some(msg) = rx.recv().await {
            if write_frame(&mut writer, &msg).await.is_err() {
                break;
            }
        }
    });

    // Unknown until the remote introduces itself with EstablishReverse.
    let mut remote_listen: Option<String> = None;
    loop {
        match read_frame::<PeerMessage, _>(&mut reader).await {
            Ok(msg) => handle_message(&ctx, msg, &tx, &mut remote_listen).await,
            Err(_) => break,
        }
    }
}

/// Dispatches one peer message.
async fn handle_message(
    ctx: &SharedNode,
    msg: PeerMessage,
    reply: &mpsc::Sender<PeerMessage>,
    remote_listen: &mut Option<String>,
) {
    match msg {
        PeerMessage::EstablishReverse(addr) => {
            *remote_listen = Some(addr.clone());
            if !ctx.peers.is_connected(&addr).await {
                tokio::spawn(connect_to_peer(ctx.clone(), addr));
            }
        }

        PeerMessage::AnnounceBlock(block) => {
            match ctx.import_block(block).await {
                ImportResult::Accepted { blocks } => {
                    ctx.metrics.miner.blocks_received.inc();
                    forward_blocks(ctx, &blocks, remote_listen.as_deref()).await;
                }
                ImportResult::Parked { missing_parent } => {
                    let _ = reply.try_send(PeerMessage::ChainRequest(missing_parent));
                }
                ImportResult::Duplicate | ImportResult::Rejected(_) => {}
            }
        }

        PeerMessage::AnnounceOp(op) => {
            if ctx.admit_operation(op.clone()).await {
                ctx.peers
                    .broadcast(&PeerMessage::AnnounceOp(op), remote_listen.as_deref())
                    .await;
            }
        }

        PeerMessage::ChainRequest(hash) => {
            let chain = {
                let store = ctx.store.read().await;
                store.chain_to(&hash)
            };
            if let Some(blocks) = chain {
                let _ = reply.try_send(PeerMessage::SendChain(blocks));
            }
        }

        PeerMessage::SendChain(blocks) => {
            for block in blocks {
                if let ImportResult::Accepted { blocks } = ctx.import_block(block).await {
                    ctx.metrics.miner.blocks_received.inc();
                    forward_blocks(ctx, &blocks, remote_listen.as_deref()).await;
                }
            }
        }
    }
}

/// Gossips freshly accepted blocks to every peer except the sender.
pub async fn forward_blocks(ctx: &SharedNode, hashes: &[BlockHash], except: Option<&str>) {
    for hash in hashes {
        let block = {
            let store = ctx.store.read().await;
            store.get_block(hash).cloned()
        };
        if let Some(block) = block {
            ctx.peers
                .broadcast(&PeerMessage::AnnounceBlock(block), except)
                .await;
        }
    }
}
