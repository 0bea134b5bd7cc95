//! Thread-safe handle around [`SpvChain`]
//!
//! Writers hold the write lock for the whole of `add_headers` or `reset`,
//! so readers never observe a half-inserted batch.

use parking_lot::RwLock;
use std::sync::Arc;

use crate::chain::{AcceptedHeaders, SpvChain};
use crate::error::Result;
use crate::header::{BlockHeader, HeaderInput};
use crate::types::{BlockHash, Height};

/// Cloneable, shareable chain handle.
#[derive(Clone, Debug)]
pub struct SharedSpvChain {
    inner: Arc<RwLock<SpvChain>>,
}

impl SharedSpvChain {
    pub fn new(chain: SpvChain) -> Self {
        Self {
            inner: Arc::new(RwLock::new(chain)),
        }
    }

    pub fn add_headers<I, T>(&self, batch: I, batch_head_height: Height) -> Result<AcceptedHeaders>
    where
        I: IntoIterator<Item = T>,
        T: Into<HeaderInput>,
    {
        self.inner.write().add_headers(batch, batch_head_height)
    }

    pub fn reset(&self, from_height: i64) {
        self.inner.write().reset(from_height);
    }

    pub fn get_tip_hash(&self) -> Option<BlockHash> {
        self.inner.read().get_tip_hash()
    }

    pub fn get_tip_header(&self) -> Option<BlockHeader> {
        self.inner.read().get_tip_header()
    }

    pub fn tip_height(&self) -> Option<Height> {
        self.inner.read().tip_height()
    }

    pub fn get_header(&self, hash: &BlockHash) -> Option<BlockHeader> {
        self.inner.read().get_header(hash)
    }

    /// Run `f` against a consistent snapshot of the chain.
    pub fn read<R>(&self, f: impl FnOnce(&SpvChain) -> R) -> R {
        f(&self.inner.read())
    }
}

impl From<SpvChain> for SharedSpvChain {
    fn from(chain: SpvChain) -> Self {
        Self::new(chain)
    }
}
