//! Chain consensus: validation pipeline, materialized state, block DAG.

pub mod error;
pub mod state;
pub mod store;
pub mod validate;

pub use error::{ArtError, ValidationError};
pub use state::{ChainState, InkAccount, LiveShape, PixelClaim};
pub use store::{ChainStore, InsertOutcome, TipChange};
pub use validate::validate_block;
