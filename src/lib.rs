//! # SPV Chain
//!
//! Header-chain engine for Simplified Payment Verification light clients.
//!
//! The crate ingests batches of block headers from untrusted, possibly
//! out-of-order sources, checks their linkage and proof of work, keeps the
//! best known chain in bounded memory, and verifies that transactions are
//! included in a block through Merkle proofs, without any block bodies.
//!
//! ## Architecture
//!
//! Leaves first:
//! - [`header`]: normalization of every accepted header shape into one
//!   canonical [`BlockHeader`]
//! - [`pow`]: compact target expansion and the header-validity predicate
//! - [`network`]: network names and genesis headers
//! - [`chain`]: the [`SpvChain`] state machine (orphans, reconnection, pruning)
//! - [`merkle`]: partial Merkle trees and transaction inclusion checks
//! - [`cache`], [`shared`], [`mining`]: header cache, thread-safe handle,
//!   nonce search for low-difficulty fixtures
//!
//! ## Design Principles
//!
//! 1. **Validate Before Mutating**: a rejected batch never leaves partial state
//! 2. **One Byte Order Rule**: hashes are stored in wire order and displayed reversed
//! 3. **Exact Version Pinning**: hashing dependencies are pinned to exact versions
//! 4. **No Fork Choice**: a single active branch plus an orphan buffer
//!
//! ## Usage
//!
//! ```rust
//! use spv_chain::{ChainConfig, Network, SpvChain};
//! use spv_chain::mining::{mine_header, HeaderTemplate};
//!
//! let mut chain = SpvChain::new(Network::Regtest, ChainConfig::default());
//! let template = HeaderTemplate::extending(&chain.root(), [1u8; 32]);
//! let header = mine_header(&template, 1_000_000).unwrap().unwrap();
//!
//! let accepted = chain.add_headers(vec![header.clone()], 1).unwrap();
//! assert_eq!(accepted.first_height, Some(1));
//! assert_eq!(chain.get_tip_hash(), Some(header.hash()));
//! ```

pub mod types;
pub mod constants;
pub mod error;
pub mod header;
pub mod pow;
pub mod network;
pub mod config;
pub mod chain;
pub mod merkle;
pub mod cache;
pub mod shared;
pub mod mining;

// Re-export commonly used types
pub use types::*;
pub use error::{Invariant, ReorgSignal, Result, SpvError};
pub use header::{get_corrected_hash, normalize_header, BlockHeader, HeaderInput, HeaderRecord};
pub use pow::{expand_target, meets_target, HeaderValidator, ProofOfWorkValidator};
pub use network::{genesis_header, BuiltinGenesis, GenesisProvider, Network};
pub use config::{ChainConfig, ReorgPolicy};
pub use chain::{AcceptedHeaders, SpvChain};
pub use merkle::{verify_transactions, MerkleBlock, MerkleBlockMessage, TransactionRef};
pub use cache::HeaderCache;
pub use shared::SharedSpvChain;
