//! Art-node command surface.
//!
//! One handler task per art-node session. A session opens by naming the
//! miner it expects and handing over the art node's key pair; admitted
//! operations are signed with that key on the art node's behalf.
//!
//! `AddShape` and `DeleteShape` pre-validate against the current tip so
//! immediate failure modes (bad grammar, bounds, overlap, ink) surface
//! before the operation enters the pending pool, then block until the
//! including block has the requested number of descendants on the tip.
//! The wait is bounded; expiry surfaces as *disconnected*.

use std::time::Duration;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, warn};

use inkchain::{
    evaluate_shape, ArtError, BlockHash, KeyPair, OpBody, Operation, OpId, ShapeHash,
};

use crate::state::SharedNode;
use crate::wire::{read_frame, write_frame, ArtRequest, ArtResponse, PeerMessage};

/// Poll interval while waiting on confirmations, so pool drops are
/// noticed between tip changes.
const CONFIRM_POLL: Duration = Duration::from_millis(500);

/// Accepts art-node sessions forever.
pub async fn serve_art_nodes(ctx: SharedNode, listener: TcpListener) {
    loop {
        match listener.accept().await {
            Ok((stream, remote)) => {
                debug!(%remote, "art-node session opened");
                let ctx = ctx.clone();
                tokio::spawn(handle_session(ctx, stream));
            }
            Err(e) => {
                warn!("art-node accept failed: {e}");
            }
        }
    }
}

async fn handle_session(ctx: SharedNode, mut stream: TcpStream) {
    let mut session: Option<KeyPair> = None;
    loop {
        let request = match read_frame::<ArtRequest, _>(&mut stream).await {
            Ok(request) => request,
            Err(_) => return,
        };
        let (response, close) = dispatch(&ctx, &mut session, request).await;
        if write_frame(&mut stream, &response).await.is_err() {
            return;
        }
        if close {
            return;
        }
    }
}

/// Handles one art-node command; the bool requests session close.
pub async fn dispatch(
    ctx: &SharedNode,
    session: &mut Option<KeyPair>,
    request: ArtRequest,
) -> (ArtResponse, bool) {
    match request {
        ArtRequest::Open {
            miner_key,
            art_node_keypair,
        } => {
            if miner_key != ctx.public_key {
                return (ArtResponse::Error(ArtError::InvalidMinerKey), false);
            }
            match KeyPair::from_hex(&art_node_keypair) {
                Ok(keypair) => {
                    *session = Some(keypair);
                    (ArtResponse::Canvas(ctx.settings.canvas), false)
                }
                Err(_) => (ArtResponse::Error(ArtError::InvalidMinerKey), false),
            }
        }

        ArtRequest::AddShape {
            validate_num,
            path,
            fill,
            stroke,
        } => {
            let Some(art) = session.as_ref() else {
                return (ArtResponse::Error(ArtError::InvalidMinerKey), false);
            };
            (add_shape(ctx, art, validate_num, &path, &fill, &stroke).await, false)
        }

        ArtRequest::DeleteShape {
            validate_num,
            shape_hash,
        } => {
            let Some(art) = session.as_ref() else {
                return (ArtResponse::Error(ArtError::InvalidMinerKey), false);
            };
            (delete_shape(ctx, art, validate_num, shape_hash).await, false)
        }

        ArtRequest::GetSvg(shape_hash) => {
            let store = ctx.store.read().await;
            let state = store.tip_state();
            match state.shapes.get(&shape_hash) {
                Some(live) => (ArtResponse::Svg(live.spec.svg_string()), false),
                None => (ArtResponse::Error(ArtError::InvalidShapeHash), false),
            }
        }

        ArtRequest::GetInk => {
            let store = ctx.store.read().await;
            let ink = store.tip_state().ink_remaining(&ctx.public_key);
            (ArtResponse::InkRemaining(ink), false)
        }

        ArtRequest::GetShapes(block_hash) => {
            let store = ctx.store.read().await;
            if block_hash == *store.genesis_hash() {
                return (ArtResponse::Shapes(Vec::new()), false);
            }
            match store.get_block(&block_hash) {
                Some(block) => {
                    let hashes: Vec<ShapeHash> = block
                        .ops
                        .iter()
                        .map(|op| match &op.body {
                            OpBody::AddShape { shape, .. } => shape.hash(),
                            OpBody::DeleteShape { target } => target.clone(),
                        })
                        .collect();
                    (ArtResponse::Shapes(hashes), false)
                }
                None => (ArtResponse::Error(ArtError::InvalidBlockHash), false),
            }
        }

        ArtRequest::GetGenesis => {
            let store = ctx.store.read().await;
            (ArtResponse::Genesis(store.genesis_hash().clone()), false)
        }

        ArtRequest::GetChildren(block_hash) => {
            let store = ctx.store.read().await;
            if !store.contains(&block_hash) {
                return (ArtResponse::Error(ArtError::InvalidBlockHash), false);
            }
            (ArtResponse::Children(store.children_of(&block_hash)), false)
        }

        ArtRequest::Close => {
            let store = ctx.store.read().await;
            let ink = store.tip_state().ink_remaining(&ctx.public_key);
            (ArtResponse::Closed { ink_remaining: ink }, true)
        }
    }
}

async fn add_shape(
    ctx: &SharedNode,
    art: &KeyPair,
    validate_num: u8,
    path: &str,
    fill: &str,
    stroke: &str,
) -> ArtResponse {
    let rendered = match evaluate_shape(path, fill, stroke, &ctx.settings.canvas) {
        Ok(rendered) => rendered,
        Err(e) => return ArtResponse::Error(e.into()),
    };
    let shape_hash = rendered.hash();

    // Immediate-failure modes against the current tip.
    {
        let store = ctx.store.read().await;
        let state = store.tip_state();
        if state.shapes.contains_key(&shape_hash) {
            return ArtResponse::Error(ArtError::ShapeOverlap(shape_hash));
        }
        let remaining = state.ink_remaining(&ctx.public_key);
        if remaining < rendered.cost {
            return ArtResponse::Error(ArtError::InsufficientInk(remaining));
        }
        if let Some(hit) = state.overlap_conflict(rendered.coverage.pixels(), &ctx.public_key) {
            return ArtResponse::Error(ArtError::ShapeOverlap(hit));
        }
    }

    let op = Operation::signed(
        OpBody::AddShape {
            shape: rendered.spec.clone(),
            miner_key: ctx.public_key.clone(),
        },
        art,
    );
    let op_id = op.id();

    match submit_and_wait(ctx, op, validate_num).await {
        Ok(block_hash) => {
            let ink_remaining = {
                let store = ctx.store.read().await;
                store.tip_state().ink_remaining(&ctx.public_key)
            };
            debug!(op = %op_id, block = %block_hash, "shape committed");
            ArtResponse::ShapeAdded {
                shape_hash,
                block_hash,
                ink_remaining,
            }
        }
        Err(e) => ArtResponse::Error(e),
    }
}

async fn delete_shape(
    ctx: &SharedNode,
    art: &KeyPair,
    validate_num: u8,
    shape_hash: ShapeHash,
) -> ArtResponse {
    // Existence and provenance against the current tip.
    {
        let store = ctx.store.read().await;
        let state = store.tip_state();
        match state.shapes.get(&shape_hash) {
            None => return ArtResponse::Error(ArtError::InvalidShapeHash),
            Some(live) if live.art_node_key != art.public() => {
                return ArtResponse::Error(ArtError::ShapeOwnerMismatch);
            }
            Some(_) => {}
        }
    }

    let op = Operation::signed(OpBody::DeleteShape { target: shape_hash }, art);

    match submit_and_wait(ctx, op, validate_num).await {
        Ok(_) => {
            let ink_remaining = {
                let store = ctx.store.read().await;
                store.tip_state().ink_remaining(&ctx.public_key)
            };
            ArtResponse::InkRemaining(ink_remaining)
        }
        Err(e) => ArtResponse::Error(e),
    }
}

/// Admits an operation, gossips it, and waits until the block carrying
/// it has at least `validate_num` descendants on the tip chain.
async fn submit_and_wait(
    ctx: &SharedNode,
    op: Operation,
    validate_num: u8,
) -> Result<BlockHash, ArtError> {
    let op_id = op.id();
    if ctx.admit_operation(op.clone()).await {
        ctx.peers
            .broadcast(&PeerMessage::AnnounceOp(op), None)
            .await;
    }
    wait_for_confirmation(ctx, &op_id, validate_num).await
}

async fn wait_for_confirmation(
    ctx: &SharedNode,
    op_id: &OpId,
    validate_num: u8,
) -> Result<BlockHash, ArtError> {
    let deadline = Instant::now() + ctx.config.confirm_timeout;
    let mut tip_rx: watch::Receiver<crate::state::TipInfo> = ctx.tip_tx.subscribe();

    loop {
        {
            let store = ctx.store.read().await;
            if let Some((block_hash, confirmations)) = store.op_confirmations(op_id) {
                if confirmations >= u32::from(validate_num) {
                    return Ok(block_hash);
                }
            }
        }
        {
            let pool = ctx.pool.lock().await;
            if let Some(error) = pool.dropped_error(op_id) {
                return Err(error);
            }
        }

        tokio::select! {
            changed = tip_rx.changed() => {
                if changed.is_err() {
                    return Err(ArtError::Disconnected);
                }
            }
            _ = tokio::time::sleep(CONFIRM_POLL) => {}
            _ = tokio::time::sleep_until(deadline) => {
                return Err(ArtError::Disconnected);
            }
        }

        if Instant::now() >= deadline {
            return Err(ArtError::Disconnected);
        }
    }
}
