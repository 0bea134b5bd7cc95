//! # Header Chain
//!
//! The SPV header-chain state machine.
//!
//! The chain holds a single active branch anchored at a root header, a
//! read-only pruned tail of finalized headers, and a buffer of orphan
//! chunks: contiguous runs of valid headers whose parent is not the tip
//! yet. Orphan chunks are spliced onto the tip as soon as the gap closes,
//! so batches may arrive in any order.
//!
//! There is no cumulative-work fork choice. A batch whose parent sits
//! below the tip stays buffered as an orphan, and a height disagreement
//! between caller and chain is reported as a [`ReorgSignal`] (or rejected,
//! depending on [`ReorgPolicy`]) without rolling anything back.

use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt;

use tracing::{debug, info, warn};

use crate::config::{ChainConfig, ReorgPolicy};
use crate::error::{Invariant, ReorgSignal, Result, SpvError};
use crate::header::{normalize_header, BlockHeader, HeaderInput};
use crate::network::{genesis_header, GenesisProvider, Network};
use crate::pow::{HeaderValidator, ProofOfWorkValidator};
use crate::types::{BlockHash, Height};

/// Outcome of [`SpvChain::add_headers`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AcceptedHeaders {
    /// Headers inserted by this call, after overlap de-duplication.
    /// Orphan headers spliced in during reconnection are in `reconnected`.
    pub headers: Vec<BlockHeader>,
    /// Height of the first header when the batch connected to the tip;
    /// `None` when it was buffered as an orphan or nothing was inserted.
    pub first_height: Option<Height>,
    /// Set when the batch's parent is indexed at an unexpected height.
    pub reorg: Option<ReorgSignal>,
    /// Buffered orphan headers spliced onto the tip, in chain order.
    pub reconnected: Vec<BlockHeader>,
    /// Height of the first reconnected header.
    pub reconnected_height: Option<Height>,
}

impl AcceptedHeaders {
    pub fn is_empty(&self) -> bool {
        self.headers.is_empty()
    }

    pub fn is_orphan(&self) -> bool {
        !self.headers.is_empty() && self.first_height.is_none()
    }
}

/// SPV header chain.
pub struct SpvChain {
    network: Network,
    root: BlockHeader,
    start_block_height: Height,
    config: ChainConfig,
    validator: Box<dyn HeaderValidator>,
    /// Reorg-able window, oldest first.
    active: VecDeque<BlockHeader>,
    /// Finalized headers, oldest first. Precede `active` without a gap.
    pruned: Vec<BlockHeader>,
    /// Arrival order. Chunks that never connect (forks below the tip) stay
    /// until evicted past `max_orphan_chunks`.
    orphan_chunks: Vec<Vec<BlockHeader>>,
    orphan_hashes: HashSet<BlockHash>,
    height_by_hash: HashMap<BlockHash, Height>,
    hash_by_height: HashMap<Height, BlockHash>,
}

impl SpvChain {
    /// Chain anchored at the built-in genesis header of `network`.
    pub fn new(network: Network, config: ChainConfig) -> Self {
        Self::from_checkpoint(network, genesis_header(network), 0, config)
    }

    /// Chain anchored at an explicit header, placed at `height`.
    pub fn from_checkpoint(
        network: Network,
        root: BlockHeader,
        height: Height,
        config: ChainConfig,
    ) -> Self {
        let mut chain = SpvChain {
            network,
            root: root.clone(),
            start_block_height: height,
            config,
            validator: Box::new(ProofOfWorkValidator::new()),
            active: VecDeque::new(),
            pruned: Vec::new(),
            orphan_chunks: Vec::new(),
            orphan_hashes: HashSet::new(),
            height_by_hash: HashMap::new(),
            hash_by_height: HashMap::new(),
        };
        chain.append_active(vec![root], height);
        chain
    }

    /// Open a chain from a network name and/or an explicit start header.
    ///
    /// With a start header the chain is anchored there; an unknown or
    /// missing name then defaults to mainnet. Without one, the name must
    /// be a known network and `provider` supplies its genesis.
    pub fn open(
        name: Option<&str>,
        start: Option<(HeaderInput, Height)>,
        provider: &dyn GenesisProvider,
        config: ChainConfig,
    ) -> Result<Self> {
        let parsed = name.map(str::parse::<Network>);
        match start {
            Some((input, height)) => {
                let root = input.normalize()?;
                let network = match parsed {
                    Some(Ok(network)) => network,
                    Some(Err(_)) | None => Network::Mainnet,
                };
                Ok(Self::from_checkpoint(network, root, height, config))
            }
            None => {
                let network = match parsed {
                    Some(result) => result?,
                    None => {
                        return Err(SpvError::UnsupportedNetwork(
                            "no network name or start header".to_string(),
                        ))
                    }
                };
                Ok(Self::from_checkpoint(network, provider.genesis(network), 0, config))
            }
        }
    }

    /// Replace the header-validity predicate.
    pub fn with_validator(mut self, validator: impl HeaderValidator + 'static) -> Self {
        self.validator = Box::new(validator);
        self
    }

    // ========================================================================
    // INSERTION
    // ========================================================================

    /// AddHeaders: ℋ* × ℕ → ℋ*
    ///
    /// Insert a batch of headers whose first member the caller believes sits
    /// at `batch_head_height`.
    ///
    /// 1. Normalize every header
    /// 2. Strip a leading overlap with the chain (each stripped header bumps
    ///    `batch_head_height`) and check in-batch contiguity
    /// 3. The batch connects when its first parent is the tip, or, with no
    ///    tip, when `batch_head_height == start_block_height`; an unconnected
    ///    batch that is entirely buffered already is a no-op
    /// 4. Compare the parent's indexed height with `batch_head_height - 1`
    /// 5. Validate the whole batch: height range, no re-insertion, validator
    /// 6. Append (connected) or buffer as an orphan chunk, evicting the
    ///    oldest chunks past `max_orphan_chunks`
    /// 7. Splice orphan chunks that now extend the tip, oldest first
    /// 8. Prune the active window down to `confirms_before_final`
    ///
    /// Errors in steps 1-5 leave the chain untouched.
    pub fn add_headers<I, T>(&mut self, batch: I, batch_head_height: Height) -> Result<AcceptedHeaders>
    where
        I: IntoIterator<Item = T>,
        T: Into<HeaderInput>,
    {
        let mut headers = batch
            .into_iter()
            .map(|input| normalize_header(input))
            .collect::<Result<Vec<_>>>()?;

        let skipped = headers
            .iter()
            .take_while(|h| self.height_by_hash.contains_key(&h.hash()))
            .count();
        if skipped > 0 {
            debug!(skipped, "dropping headers already in the chain");
            headers.drain(..skipped);
        }
        let head_height = checked_height(batch_head_height, skipped)?;

        if headers.is_empty() {
            return Ok(AcceptedHeaders::default());
        }
        check_contiguity(&headers, skipped)?;

        let first_parent = headers[0].prev_block_hash();
        let connected = match self.active.back() {
            Some(tip) => first_parent == tip.hash(),
            None => head_height == self.start_block_height,
        };

        // Re-delivered orphans are a no-op unless they now connect.
        if !connected && headers.iter().all(|h| self.is_duplicate(&h.hash())) {
            debug!(count = headers.len(), "batch already buffered as orphans");
            return Ok(AcceptedHeaders::default());
        }

        let reorg = self.reorg_signal(first_parent, head_height);
        if let Some(signal) = &reorg {
            match self.config.reorg_policy {
                ReorgPolicy::Reject => return Err(SpvError::ReorgDetected(signal.clone())),
                ReorgPolicy::Warn => warn!(
                    parent = %signal.parent,
                    indexed_height = signal.indexed_height,
                    batch_head_height = signal.batch_head_height,
                    "reorg detected, continuing on the current branch"
                ),
            }
        }

        let first_height = if connected {
            let height = self.next_height()?;
            checked_height(height, headers.len() - 1)?;
            Some(height)
        } else {
            None
        };

        self.validate_batch(&headers, connected, skipped)?;

        // Nothing below can fail.
        self.detach_orphan_overlap(&headers);

        match first_height {
            Some(height) => {
                self.append_active(headers.clone(), height);
                info!(
                    count = headers.len(),
                    first_height = height,
                    tip = %headers[headers.len() - 1].hash(),
                    "headers connected"
                );
            }
            None => {
                for header in &headers {
                    self.orphan_hashes.insert(header.hash());
                }
                self.orphan_chunks.push(headers.clone());
                debug!(
                    count = headers.len(),
                    parent = %first_parent,
                    chunks = self.orphan_chunks.len(),
                    "buffered orphan chunk"
                );
                self.evict_orphans();
            }
        }

        let (reconnected_height, reconnected) = self.reconnect_orphans();
        self.prune();

        Ok(AcceptedHeaders {
            headers,
            first_height,
            reorg,
            reconnected,
            reconnected_height,
        })
    }

    fn reorg_signal(&self, parent: BlockHash, head_height: Height) -> Option<ReorgSignal> {
        let indexed_height = *self.height_by_hash.get(&parent)?;
        if head_height.checked_sub(1) == Some(indexed_height) {
            return None;
        }
        Some(ReorgSignal {
            parent,
            indexed_height,
            batch_head_height: head_height,
        })
    }

    /// Batch-wide checks that need chain state. `offset` is the number of
    /// stripped leading headers, so reported indices refer to the caller's
    /// batch.
    fn validate_batch(&self, headers: &[BlockHeader], connected: bool, offset: usize) -> Result<()> {
        if let Some(dup) = headers.iter().find(|h| self.height_by_hash.contains_key(&h.hash())) {
            return Err(SpvError::DuplicateHeader(dup.hash()));
        }

        let mut preceding: Vec<BlockHeader> = if connected {
            self.active.iter().cloned().collect()
        } else {
            Vec::with_capacity(headers.len())
        };
        for (i, header) in headers.iter().enumerate() {
            if !self.validator.validate(header, &preceding, self.network)? {
                return Err(SpvError::InvalidHeader {
                    hash: header.hash(),
                    index: offset + i,
                });
            }
            preceding.push(header.clone());
        }
        Ok(())
    }

    /// Remove from the orphan buffer every header that `headers` re-delivers,
    /// splitting chunks into the contiguous runs that remain.
    fn detach_orphan_overlap(&mut self, headers: &[BlockHeader]) {
        let incoming: HashSet<BlockHash> = headers
            .iter()
            .map(|h| h.hash())
            .filter(|h| self.orphan_hashes.contains(h))
            .collect();
        if incoming.is_empty() {
            return;
        }

        let mut chunks = Vec::with_capacity(self.orphan_chunks.len() + 1);
        for chunk in self.orphan_chunks.drain(..) {
            let mut run = Vec::new();
            for header in chunk {
                if incoming.contains(&header.hash()) {
                    if !run.is_empty() {
                        chunks.push(std::mem::take(&mut run));
                    }
                } else {
                    run.push(header);
                }
            }
            if !run.is_empty() {
                chunks.push(run);
            }
        }
        self.orphan_chunks = chunks;

        for hash in &incoming {
            self.orphan_hashes.remove(hash);
        }
        debug!(overlap = incoming.len(), "detached re-delivered orphan headers");
    }

    /// Splice orphan chunks onto the tip until none connects. Among
    /// candidates the chunk with the oldest first-header time wins.
    /// Returns the height of the first spliced header and the spliced
    /// headers in chain order.
    fn reconnect_orphans(&mut self) -> (Option<Height>, Vec<BlockHeader>) {
        let mut first_height = None;
        let mut reconnected = Vec::new();
        loop {
            let tip_hash = match self.active.back() {
                Some(tip) => tip.hash(),
                None => break,
            };
            let candidate = self
                .orphan_chunks
                .iter()
                .enumerate()
                .filter_map(|(i, chunk)| chunk.first().map(|first| (i, first)))
                .filter(|(_, first)| first.prev_block_hash() == tip_hash)
                .min_by_key(|(_, first)| first.time())
                .map(|(i, _)| i);
            let index = match candidate {
                Some(index) => index,
                None => break,
            };

            let height = match self.next_height().and_then(|height| {
                checked_height(height, self.orphan_chunks[index].len() - 1).map(|_| height)
            }) {
                Ok(height) => height,
                Err(err) => {
                    warn!(error = %err, "orphan chunk cannot be placed above the tip");
                    break;
                }
            };

            let chunk = self.orphan_chunks.remove(index);
            for header in &chunk {
                self.orphan_hashes.remove(&header.hash());
            }
            info!(count = chunk.len(), first_height = height, "reconnected orphan chunk");
            first_height.get_or_insert(height);
            reconnected.extend(chunk.iter().cloned());
            self.append_active(chunk, height);
        }
        (first_height, reconnected)
    }

    /// Drop the oldest orphan chunks beyond `max_orphan_chunks`.
    fn evict_orphans(&mut self) {
        let limit = self.config.max_orphan_chunks.max(1);
        if self.orphan_chunks.len() <= limit {
            return;
        }
        let excess = self.orphan_chunks.len() - limit;
        for chunk in self.orphan_chunks.drain(..excess) {
            for header in &chunk {
                self.orphan_hashes.remove(&header.hash());
            }
        }
        debug!(evicted = excess, chunks = self.orphan_chunks.len(), "evicted orphan chunks");
    }

    fn append_active(&mut self, headers: Vec<BlockHeader>, first_height: Height) {
        for (offset, header) in headers.into_iter().enumerate() {
            let height = first_height + offset as Height;
            self.height_by_hash.insert(header.hash(), height);
            self.hash_by_height.insert(height, header.hash());
            self.active.push_back(header);
        }
    }

    /// Move the oldest active headers to the pruned tail. The tip always
    /// stays in the active window.
    fn prune(&mut self) {
        let keep = self.config.confirms_before_final.max(1);
        let mut moved = 0;
        while self.active.len() > keep {
            match self.active.pop_front() {
                Some(header) => self.pruned.push(header),
                None => break,
            }
            moved += 1;
        }
        if moved > 0 {
            debug!(moved, pruned = self.pruned.len(), "pruned finalized headers");
        }
    }

    fn next_height(&self) -> Result<Height> {
        match self.tip_height() {
            Some(height) => checked_height(height, 1),
            None => Ok(self.start_block_height),
        }
    }

    // ========================================================================
    // LIFECYCLE
    // ========================================================================

    /// Drop every header and index. The root header and network are kept;
    /// the next connected batch must start at `max(0, from_height)`.
    pub fn reset(&mut self, from_height: i64) {
        self.active.clear();
        self.pruned.clear();
        self.orphan_chunks.clear();
        self.orphan_hashes.clear();
        self.height_by_hash.clear();
        self.hash_by_height.clear();
        self.start_block_height = from_height.max(0) as Height;
        info!(start_block_height = self.start_block_height, "chain reset");
    }

    /// Integrity self-check over the whole chain state.
    pub fn validate(&self) -> Result<()> {
        let total = self.pruned.len() + self.active.len();
        let head = self.pruned.first().or_else(|| self.active.front());
        let (head, tail) = match (head, self.active.back()) {
            (Some(head), Some(tail)) => (head, tail),
            _ => return Err(SpvError::Integrity(Invariant::EmptyChain)),
        };

        let head_height = self.height_by_hash.get(&head.hash()).copied();
        if head_height != Some(self.start_block_height) {
            return Err(SpvError::Integrity(Invariant::HeadHeightMismatch {
                expected: self.start_block_height,
                actual: head_height,
            }));
        }

        let expected_tail = self.start_block_height + (total - 1) as Height;
        let tail_height = self.height_by_hash.get(&tail.hash()).copied();
        if tail_height != Some(expected_tail) {
            return Err(SpvError::Integrity(Invariant::TailHeightMismatch {
                expected: expected_tail,
                actual: tail_height,
            }));
        }

        if !self.orphan_chunks.is_empty() {
            return Err(SpvError::Integrity(Invariant::OrphansPending(
                self.orphan_chunks.len(),
            )));
        }

        if self.height_by_hash.len() != total || self.hash_by_height.len() != total {
            return Err(SpvError::Integrity(Invariant::LengthMismatch {
                headers: total,
                span: self.hash_by_height.len() as u64,
            }));
        }

        for (offset, header) in self.pruned.iter().chain(self.active.iter()).enumerate() {
            let height = self.start_block_height + offset as Height;
            let by_height = self.hash_by_height.get(&height);
            let by_hash = self.height_by_hash.get(&header.hash());
            if by_height != Some(&header.hash()) || by_hash != Some(&height) {
                return Err(SpvError::Integrity(Invariant::IndexMismatch(height)));
            }
        }

        Ok(())
    }

    // ========================================================================
    // ACCESSORS
    // ========================================================================

    /// Active chain, optionally preceded by the pruned tail.
    pub fn get_longest_chain(&self, with_pruned: bool) -> Vec<BlockHeader> {
        let mut chain = Vec::with_capacity(self.active.len() + self.pruned.len());
        if with_pruned {
            chain.extend(self.pruned.iter().cloned());
        }
        chain.extend(self.active.iter().cloned());
        chain
    }

    pub fn get_tip_hash(&self) -> Option<BlockHash> {
        self.active.back().map(|h| h.hash())
    }

    pub fn get_tip_header(&self) -> Option<BlockHeader> {
        self.active.back().cloned()
    }

    pub fn tip_height(&self) -> Option<Height> {
        self.get_tip_hash()
            .and_then(|hash| self.height_by_hash.get(&hash).copied())
    }

    /// Header by hash, from the active chain or the pruned tail.
    pub fn get_header(&self, hash: &BlockHash) -> Option<BlockHeader> {
        let height = *self.height_by_hash.get(hash)?;
        self.get_header_by_height(height)
    }

    pub fn get_header_by_height(&self, height: Height) -> Option<BlockHeader> {
        let offset = usize::try_from(height.checked_sub(self.start_block_height)?).ok()?;
        if offset < self.pruned.len() {
            self.pruned.get(offset).cloned()
        } else {
            self.active.get(offset - self.pruned.len()).cloned()
        }
    }

    pub fn get_height(&self, hash: &BlockHash) -> Option<Height> {
        self.height_by_hash.get(hash).copied()
    }

    /// Last `n` headers, reaching into the pruned tail when the active
    /// window is shorter than `n`.
    pub fn get_last_headers(&self, n: usize) -> Vec<BlockHeader> {
        let from_active = n.min(self.active.len());
        let from_pruned = (n - from_active).min(self.pruned.len());
        let mut headers = Vec::with_capacity(from_active + from_pruned);
        headers.extend(self.pruned[self.pruned.len() - from_pruned..].iter().cloned());
        headers.extend(self.active.iter().skip(self.active.len() - from_active).cloned());
        headers
    }

    pub fn get_orphan_chunks(&self) -> Vec<Vec<BlockHeader>> {
        self.orphan_chunks.clone()
    }

    pub fn pruned_headers(&self) -> Vec<BlockHeader> {
        self.pruned.clone()
    }

    /// True when `hash` is in the chain or buffered as an orphan.
    pub fn is_duplicate(&self, hash: &BlockHash) -> bool {
        self.height_by_hash.contains_key(hash) || self.orphan_hashes.contains(hash)
    }

    pub fn start_block_height(&self) -> Height {
        self.start_block_height
    }

    pub fn network(&self) -> Network {
        self.network
    }

    pub fn root(&self) -> BlockHeader {
        self.root.clone()
    }

    pub fn config(&self) -> &ChainConfig {
        &self.config
    }
}

fn checked_height(height: Height, offset: usize) -> Result<Height> {
    (offset as Height)
        .checked_add(height)
        .ok_or(SpvError::HeightOverflow { height, offset })
}

/// In-batch parent-child check. Indices are shifted by `offset`.
fn check_contiguity(headers: &[BlockHeader], offset: usize) -> Result<()> {
    for (i, pair) in headers.windows(2).enumerate() {
        if !pair[1].is_child_of(&pair[0]) {
            return Err(SpvError::BrokenChain {
                index: offset + i + 1,
                hash: pair[1].hash(),
                expected_parent: pair[0].hash(),
            });
        }
    }
    Ok(())
}

impl fmt::Debug for SpvChain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SpvChain")
            .field("network", &self.network)
            .field("start_block_height", &self.start_block_height)
            .field("tip_height", &self.tip_height())
            .field("active", &self.active.len())
            .field("pruned", &self.pruned.len())
            .field("orphan_chunks", &self.orphan_chunks.len())
            .finish()
    }
}
