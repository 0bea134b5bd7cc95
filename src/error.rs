//! Error types for SPV header processing

use thiserror::Error;

use crate::types::{BlockHash, Height};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SpvError {
    #[error("Header decode failed: {0}")]
    Decode(String),

    #[error("Invalid difficulty bits {bits:#010x}: exponent {exponent} outside [4, 32]")]
    InvalidDifficultyBits { bits: u32, exponent: u8 },

    #[error("Invalid header {hash} at batch index {index}")]
    InvalidHeader { hash: BlockHash, index: usize },

    #[error("Broken chain at batch index {index}: {hash} does not extend {expected_parent}")]
    BrokenChain {
        index: usize,
        hash: BlockHash,
        expected_parent: BlockHash,
    },

    #[error("Header {0} is already part of the chain")]
    DuplicateHeader(BlockHash),

    #[error("Height overflow: {height} + {offset} does not fit in a u64")]
    HeightOverflow { height: Height, offset: usize },

    #[error("Reorg detected: {0}")]
    ReorgDetected(ReorgSignal),

    #[error("Unsupported network: {0}")]
    UnsupportedNetwork(String),

    #[error("Chain integrity violated: {0}")]
    Integrity(Invariant),
}

/// Raised when a batch's declared parent is indexed at a height that
/// disagrees with the height the caller supplied for the batch.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("parent {parent} is indexed at height {indexed_height}, batch starts at {batch_head_height}")]
pub struct ReorgSignal {
    pub parent: BlockHash,
    pub indexed_height: Height,
    pub batch_head_height: Height,
}

/// Chain invariants checked by `SpvChain::validate`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Invariant {
    #[error("chain is empty")]
    EmptyChain,

    #[error("head header is indexed at {actual:?}, expected {expected}")]
    HeadHeightMismatch { expected: Height, actual: Option<Height> },

    #[error("tail header is indexed at {actual:?}, expected {expected}")]
    TailHeightMismatch { expected: Height, actual: Option<Height> },

    #[error("{0} orphan chunks still pending")]
    OrphansPending(usize),

    #[error("chain holds {headers} headers but spans {span} heights")]
    LengthMismatch { headers: usize, span: u64 },

    #[error("height index and hash index disagree at height {0}")]
    IndexMismatch(Height),
}

impl From<hex::FromHexError> for SpvError {
    fn from(err: hex::FromHexError) -> Self {
        SpvError::Decode(format!("invalid hex: {}", err))
    }
}

impl From<serde_json::Error> for SpvError {
    fn from(err: serde_json::Error) -> Self {
        SpvError::Decode(format!("invalid header record: {}", err))
    }
}

pub type Result<T> = std::result::Result<T, SpvError>;
