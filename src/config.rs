//! # Chain Configuration
//!
//! Tunables for [`SpvChain`](crate::chain::SpvChain).

use serde::{Deserialize, Serialize};

use crate::constants::{DEFAULT_CONFIRMS_BEFORE_FINAL, DEFAULT_MAX_ORPHAN_CHUNKS};
use crate::error::Result;

/// What `add_headers` does when a batch's parent is indexed at a height
/// other than the one the caller supplied.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReorgPolicy {
    /// Log, report the signal in the result and keep going.
    Warn,
    /// Fail the batch with `SpvError::ReorgDetected` before any mutation.
    Reject,
}

/// SPV chain configuration.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainConfig {
    /// Headers kept in the active window; older ones are moved to the
    /// pruned tail and treated as final.
    pub confirms_before_final: usize,

    /// Handling of height disagreements between caller and chain.
    pub reorg_policy: ReorgPolicy,

    /// Orphan chunks kept before the oldest are evicted.
    pub max_orphan_chunks: usize,
}

impl Default for ChainConfig {
    fn default() -> Self {
        Self {
            confirms_before_final: DEFAULT_CONFIRMS_BEFORE_FINAL,
            reorg_policy: ReorgPolicy::Warn,
            max_orphan_chunks: DEFAULT_MAX_ORPHAN_CHUNKS,
        }
    }
}

impl ChainConfig {
    /// Create a config for testing (small window).
    pub fn for_testing() -> Self {
        Self {
            confirms_before_final: 2,
            reorg_policy: ReorgPolicy::Warn,
            max_orphan_chunks: 8,
        }
    }

    pub fn with_confirms(mut self, confirms_before_final: usize) -> Self {
        self.confirms_before_final = confirms_before_final;
        self
    }

    pub fn with_max_orphan_chunks(mut self, max_orphan_chunks: usize) -> Self {
        self.max_orphan_chunks = max_orphan_chunks;
        self
    }

    pub fn with_reorg_policy(mut self, reorg_policy: ReorgPolicy) -> Self {
        self.reorg_policy = reorg_policy;
        self
    }

    /// Parse from JSON; missing fields take their defaults.
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}
