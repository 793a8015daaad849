//! Wire protocol for all three RPC surfaces.
//!
//! Registry, peer, and art-node traffic all use the same framing: a
//! u32 little-endian length prefix followed by the bincode-2 encoding
//! of the message (`serde` integration, `standard()` config). Frames
//! above [`MAX_FRAME_BYTES`] are rejected before allocation so a
//! misbehaving peer cannot balloon memory.

use std::io;

use serde::{de::DeserializeOwned, Deserialize, Serialize};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use inkchain::{
    ArtError, Block, BlockHash, CanvasSettings, NetSettings, Operation, PublicKeyHex, ShapeHash,
};

/// Upper bound on a single frame.
pub const MAX_FRAME_BYTES: usize = 4 * 1024 * 1024;

/// Identity a miner registers with.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct MinerInfo {
    /// Address other miners can dial (peer listen address).
    pub address: String,
    /// The miner's public key.
    pub key: PublicKeyHex,
}

/// Requests a miner sends to the registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegistryRequest {
    /// Joins the network; answered with the network settings.
    Register(MinerInfo),
    /// Keep-alive; a missed one may evict the miner.
    Heartbeat(PublicKeyHex),
    /// Asks for dialable peer addresses.
    GetNodes(PublicKeyHex),
}

/// Registry answers.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum RegistryResponse {
    Settings(NetSettings),
    Ack,
    Nodes(Vec<String>),
}

/// Messages exchanged between miners.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum PeerMessage {
    /// Carries the dialer's listen address so the remote can open the
    /// symmetric channel back.
    EstablishReverse(String),
    /// Gossips a block the sender accepted as new.
    AnnounceBlock(Block),
    /// Gossips an operation the sender admitted as new.
    AnnounceOp(Operation),
    /// Asks for the ancestors of a block the sender is missing.
    ChainRequest(BlockHash),
    /// Answers a chain request, oldest block first.
    SendChain(Vec<Block>),
}

/// Commands an art node issues to its miner.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ArtRequest {
    /// Opens a session. The art node names the miner it expects and
    /// entrusts its own key pair so admitted operations can be signed.
    Open {
        miner_key: PublicKeyHex,
        art_node_keypair: String,
    },
    AddShape {
        validate_num: u8,
        path: String,
        fill: String,
        stroke: String,
    },
    DeleteShape {
        validate_num: u8,
        shape_hash: ShapeHash,
    },
    GetSvg(ShapeHash),
    GetInk,
    GetShapes(BlockHash),
    GetGenesis,
    GetChildren(BlockHash),
    Close,
}

/// Replies to art-node commands.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub enum ArtResponse {
    Canvas(CanvasSettings),
    ShapeAdded {
        shape_hash: ShapeHash,
        block_hash: BlockHash,
        ink_remaining: u32,
    },
    InkRemaining(u32),
    Svg(String),
    Shapes(Vec<ShapeHash>),
    Genesis(BlockHash),
    Children(Vec<BlockHash>),
    Closed {
        ink_remaining: u32,
    },
    Error(ArtError),
}

/// Writes one length-prefixed frame.
pub async fn write_frame<T, W>(writer: &mut W, msg: &T) -> io::Result<()>
where
    T: Serialize,
    W: AsyncWrite + Unpin,
{
    let cfg = bincode::config::standard();
    let body = bincode::serde::encode_to_vec(msg, cfg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if body.len() > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds size limit",
        ));
    }
    writer.write_u32_le(body.len() as u32).await?;
    writer.write_all(&body).await?;
    writer.flush().await?;
    Ok(())
}

/// Reads one length-prefixed frame.
pub async fn read_frame<T, R>(reader: &mut R) -> io::Result<T>
where
    T: DeserializeOwned,
    R: AsyncRead + Unpin,
{
    let len = reader.read_u32_le().await? as usize;
    if len > MAX_FRAME_BYTES {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "frame exceeds size limit",
        ));
    }
    let mut body = vec![0u8; len];
    reader.read_exact(&mut body).await?;

    let cfg = bincode::config::standard();
    let (msg, consumed): (T, usize) = bincode::serde::decode_from_slice(&body, cfg)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))?;
    if consumed != body.len() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            "trailing bytes in frame",
        ));
    }
    Ok(msg)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn frame_roundtrip_preserves_message() {
        let (mut client, mut server) = tokio::io::duplex(1024);

        let msg = RegistryRequest::Heartbeat(PublicKeyHex("04ab".to_string()));
        write_frame(&mut client, &msg).await.expect("write");

        let decoded: RegistryRequest = read_frame(&mut server).await.expect("read");
        match decoded {
            RegistryRequest::Heartbeat(key) => assert_eq!(key.as_str(), "04ab"),
            other => panic!("unexpected message: {other:?}"),
        }
    }

    #[tokio::test]
    async fn consecutive_frames_are_delimited() {
        let (mut client, mut server) = tokio::io::duplex(4096);

        write_frame(&mut client, &PeerMessage::EstablishReverse("a:1".into()))
            .await
            .expect("first");
        write_frame(&mut client, &PeerMessage::ChainRequest(BlockHash("ff".repeat(16))))
            .await
            .expect("second");

        let first: PeerMessage = read_frame(&mut server).await.expect("read first");
        let second: PeerMessage = read_frame(&mut server).await.expect("read second");
        assert!(matches!(first, PeerMessage::EstablishReverse(_)));
        assert!(matches!(second, PeerMessage::ChainRequest(_)));
    }

    #[tokio::test]
    async fn oversized_length_prefix_is_rejected() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::io::AsyncWriteExt::write_u32_le(&mut client, (MAX_FRAME_BYTES + 1) as u32)
            .await
            .expect("write length");

        let res: io::Result<PeerMessage> = read_frame(&mut server).await;
        assert!(res.is_err());
    }

    #[tokio::test]
    async fn garbage_body_is_invalid_data() {
        let (mut client, mut server) = tokio::io::duplex(64);

        tokio::io::AsyncWriteExt::write_u32_le(&mut client, 3).await.unwrap();
        tokio::io::AsyncWriteExt::write_all(&mut client, &[0xfe, 0xfe, 0xfe])
            .await
            .unwrap();

        let res: io::Result<RegistryResponse> = read_frame(&mut server).await;
        assert_eq!(res.unwrap_err().kind(), io::ErrorKind::InvalidData);
    }
}
