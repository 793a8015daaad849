//! Drawing operations and their signing rules.
//!
//! An operation is either an add-shape or a delete-shape, submitted and
//! signed by an art node. Add operations additionally name the sponsoring
//! miner whose ink account pays for the shape and who owns the covered
//! pixels; every validator needs that attribution to replay ink accounting.
//!
//! The canonical encoding is **bincode 2** via the `serde` integration
//! with an explicit `standard()` config. The operation identity is the
//! hex MD5 of the unsigned canonical bytes, and the art node's ECDSA
//! signature covers exactly those bytes.

use serde::{Deserialize, Serialize};

use crate::shape::ShapeSpec;

use super::{md5_hex, KeyError, KeyPair, OpId, PublicKeyHex, ShapeHash, SignatureBytes};

/// Payload of an operation, tagged by kind.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub enum OpBody {
    /// Adds a shape to the canvas, spending the sponsoring miner's ink.
    AddShape {
        /// The shape being drawn.
        shape: ShapeSpec,
        /// Miner whose ink pays for the shape and who owns its pixels.
        miner_key: PublicKeyHex,
    },

    /// Deletes a previously added shape, refunding its cost.
    DeleteShape {
        /// Fingerprint of the shape to remove.
        target: ShapeHash,
    },
}

/// A signed drawing operation as it appears in blocks and gossip.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
pub struct Operation {
    /// Tagged payload.
    pub body: OpBody,

    /// Public key of the art node that submitted the operation.
    ///
    /// Delete provenance is settled against this key: only the art node
    /// that added a shape may delete it.
    pub art_node_key: PublicKeyHex,

    /// Art node's ECDSA/P-384 signature over [`Operation::unsigned_bytes`].
    pub signature: SignatureBytes,
}

impl Operation {
    /// Canonical bytes covered by the signature and the identity hash.
    pub fn unsigned_bytes(body: &OpBody, art_node_key: &PublicKeyHex) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec((body, art_node_key), cfg)
            .expect("operation bodies should always be serializable")
    }

    /// Builds an operation signed with the submitting art node's key.
    pub fn signed(body: OpBody, art_node: &KeyPair) -> Self {
        let art_node_key = art_node.public();
        let signature = art_node.sign(&Self::unsigned_bytes(&body, &art_node_key));
        Self {
            body,
            art_node_key,
            signature,
        }
    }

    /// The operation's identity: hex MD5 over the unsigned canonical bytes.
    pub fn id(&self) -> OpId {
        OpId(md5_hex(&Self::unsigned_bytes(&self.body, &self.art_node_key)))
    }

    /// Checks the art node's signature against the operation contents.
    pub fn verify_signature(&self) -> Result<(), KeyError> {
        let bytes = Self::unsigned_bytes(&self.body, &self.art_node_key);
        self.signature.verify(&self.art_node_key, &bytes)
    }

    /// Full record bytes (including the signature), as concatenated into
    /// a block's proof-of-work serialization.
    pub fn record_bytes(&self) -> Vec<u8> {
        let cfg = bincode::config::standard();
        bincode::serde::encode_to_vec(self, cfg)
            .expect("operations should always be serializable")
    }
}
