//! # Header Cache
//!
//! Caller-owned LRU cache of connected headers, keyed by hash with a
//! height index on the side. Nothing in the chain consults it; the layer
//! above feeds it from [`AcceptedHeaders`] and drops entries on reorg.

use lru::LruCache;
use std::collections::HashMap;
use std::num::NonZeroUsize;

use crate::chain::{AcceptedHeaders, SpvChain};
use crate::header::BlockHeader;
use crate::types::{BlockHash, Height};

const DEFAULT_CAPACITY: NonZeroUsize = match NonZeroUsize::new(2048) {
    Some(n) => n,
    None => unreachable!(),
};

#[derive(Debug, Clone)]
struct CachedHeader {
    height: Height,
    header: BlockHeader,
}

/// LRU header cache.
pub struct HeaderCache {
    entries: LruCache<BlockHash, CachedHeader>,
    heights: HashMap<Height, BlockHash>,
}

impl HeaderCache {
    /// Create a cache holding up to `capacity` headers (zero means the default).
    pub fn new(capacity: usize) -> Self {
        let cap = NonZeroUsize::new(capacity).unwrap_or(DEFAULT_CAPACITY);
        Self {
            entries: LruCache::new(cap),
            heights: HashMap::new(),
        }
    }

    pub fn insert(&mut self, header: BlockHeader, height: Height) {
        let hash = header.hash();
        if let Some(previous) = self.heights.insert(height, hash) {
            if previous != hash {
                self.entries.pop(&previous);
            }
        }
        if let Some((old_hash, old)) = self.entries.push(hash, CachedHeader { height, header }) {
            if old.height != height || old_hash != hash {
                self.forget_height(old.height, &old_hash);
            }
        }
    }

    /// Cache every header a batch connected, including orphan chunks it
    /// reconnected. Orphan batches carry no heights and are skipped.
    /// Returns the number of headers cached.
    pub fn record(&mut self, accepted: &AcceptedHeaders) -> usize {
        let mut cached = 0;
        if let Some(first) = accepted.first_height {
            cached += self.insert_run(&accepted.headers, first);
        }
        if let Some(first) = accepted.reconnected_height {
            cached += self.insert_run(&accepted.reconnected, first);
        }
        cached
    }

    fn insert_run(&mut self, headers: &[BlockHeader], first: Height) -> usize {
        for (offset, header) in headers.iter().enumerate() {
            self.insert(header.clone(), first + offset as Height);
        }
        headers.len()
    }

    pub fn get(&mut self, hash: &BlockHash) -> Option<BlockHeader> {
        self.entries.get(hash).map(|entry| entry.header.clone())
    }

    pub fn get_by_height(&mut self, height: Height) -> Option<BlockHeader> {
        let hash = *self.heights.get(&height)?;
        self.get(&hash)
    }

    /// Drop every entry at `height` or above. Returns how many were removed.
    pub fn invalidate_from(&mut self, height: Height) -> usize {
        let stale: Vec<(Height, BlockHash)> = self
            .heights
            .iter()
            .filter(|(h, _)| **h >= height)
            .map(|(h, hash)| (*h, *hash))
            .collect();
        for (h, hash) in &stale {
            self.heights.remove(h);
            self.entries.pop(hash);
        }
        stale.len()
    }

    /// Load the last `n` headers of `chain`.
    pub fn warm(&mut self, chain: &SpvChain, n: usize) -> usize {
        let mut loaded = 0;
        for header in chain.get_last_headers(n) {
            if let Some(height) = chain.get_height(&header.hash()) {
                self.insert(header, height);
                loaded += 1;
            }
        }
        loaded
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.heights.clear();
    }

    fn forget_height(&mut self, height: Height, hash: &BlockHash) {
        if self.heights.get(&height) == Some(hash) {
            self.heights.remove(&height);
        }
    }
}

impl Default for HeaderCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ChainConfig;
    use crate::network::Network;

    fn header(n: u8) -> BlockHeader {
        BlockHeader::new(1, BlockHash::from_wire([n; 32]), [n; 32], 1_600_000_000, 0x207fffff, 0)
    }

    #[test]
    fn test_insert_and_lookup() {
        let mut cache = HeaderCache::new(4);
        let h = header(1);
        cache.insert(h.clone(), 10);
        assert_eq!(cache.get(&h.hash()), Some(h.clone()));
        assert_eq!(cache.get_by_height(10), Some(h));
        assert_eq!(cache.get_by_height(11), None);
    }

    #[test]
    fn test_eviction_clears_height() {
        let mut cache = HeaderCache::new(2);
        cache.insert(header(1), 1);
        cache.insert(header(2), 2);
        cache.insert(header(3), 3);
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.get_by_height(1), None);
        assert!(cache.get_by_height(3).is_some());
    }

    #[test]
    fn test_height_overwrite_replaces_entry() {
        let mut cache = HeaderCache::new(4);
        cache.insert(header(1), 5);
        cache.insert(header(2), 5);
        assert_eq!(cache.get(&header(1).hash()), None);
        assert_eq!(cache.get_by_height(5), Some(header(2)));
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_invalidate_from() {
        let mut cache = HeaderCache::new(8);
        for n in 1..=5u8 {
            cache.insert(header(n), u64::from(n));
        }
        assert_eq!(cache.invalidate_from(4), 2);
        assert_eq!(cache.len(), 3);
        assert!(cache.get_by_height(4).is_none());
        assert!(cache.get_by_height(3).is_some());
    }

    #[test]
    fn test_record_skips_orphans() {
        let mut cache = HeaderCache::new(8);
        let orphan = AcceptedHeaders {
            headers: vec![header(1)],
            ..Default::default()
        };
        assert_eq!(cache.record(&orphan), 0);

        let connected = AcceptedHeaders {
            headers: vec![header(1), header(2)],
            first_height: Some(7),
            ..Default::default()
        };
        assert_eq!(cache.record(&connected), 2);
        assert_eq!(cache.get_by_height(8), Some(header(2)));
    }

    #[test]
    fn test_record_includes_reconnected() {
        let mut cache = HeaderCache::new(8);
        let accepted = AcceptedHeaders {
            headers: vec![header(1)],
            first_height: Some(3),
            reconnected: vec![header(2), header(3)],
            reconnected_height: Some(4),
            ..Default::default()
        };
        assert_eq!(cache.record(&accepted), 3);
        assert_eq!(cache.get_by_height(5), Some(header(3)));
    }

    #[test]
    fn test_warm_from_chain() {
        let chain = SpvChain::new(Network::Regtest, ChainConfig::default());
        let mut cache = HeaderCache::default();
        assert_eq!(cache.warm(&chain, 10), 1);
        assert_eq!(cache.get_by_height(0), Some(chain.root()));
        cache.clear();
        assert!(cache.is_empty());
    }
}
