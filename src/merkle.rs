//! Merkle inclusion proofs
//!
//! A light client proves that a transaction belongs to a block by checking
//! a partial Merkle tree (the BIP37 `merkleblock` message) against the
//! Merkle root committed in a header it already trusts.

use bitcoin_hashes::{sha256d, Hash as _, HashEngine};
use tracing::debug;

use crate::constants::{HEADER_SIZE, MAX_MERKLE_BLOCK_SIZE};
use crate::error::{Result, SpvError};
use crate::header::{double_sha256, BlockHeader};
use crate::types::{Hash, Txid};

/// Merkle-block collaborator: a header plus a proof of which transactions
/// it commits to.
pub trait MerkleBlock {
    fn header(&self) -> &BlockHeader;

    /// The proof is well formed and hashes up to `header().merkle_root()`.
    fn valid_merkle_tree(&self) -> bool;

    /// `txid` is one of the transactions the proof marks as matched.
    fn has_transaction(&self, txid: &Txid) -> bool;
}

/// Transaction reference accepted by [`verify_transactions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransactionRef {
    Id(Txid),
    /// Display-order txid hex.
    Hex(String),
    /// Serialized transaction; its txid is the double SHA-256.
    Raw(Vec<u8>),
}

impl TransactionRef {
    pub fn txid(&self) -> Result<Txid> {
        match self {
            TransactionRef::Id(txid) => Ok(*txid),
            TransactionRef::Hex(s) => Txid::from_hex(s),
            TransactionRef::Raw(bytes) => Ok(Txid::from_wire(double_sha256(bytes))),
        }
    }
}

impl From<Txid> for TransactionRef {
    fn from(txid: Txid) -> Self {
        TransactionRef::Id(txid)
    }
}

impl From<&str> for TransactionRef {
    fn from(s: &str) -> Self {
        TransactionRef::Hex(s.to_string())
    }
}

impl From<String> for TransactionRef {
    fn from(s: String) -> Self {
        TransactionRef::Hex(s)
    }
}

impl From<Vec<u8>> for TransactionRef {
    fn from(bytes: Vec<u8>) -> Self {
        TransactionRef::Raw(bytes)
    }
}

/// VerifyTransactions: ℋ × 𝓜 × 𝒯* → {true, false}
///
/// True iff the Merkle block commits to the same Merkle root as `header`,
/// its tree is internally consistent, and every reference resolves to a
/// matched transaction. A malformed reference is a miss, not an error.
pub fn verify_transactions<M>(header: &BlockHeader, merkle_block: &M, txs: &[TransactionRef]) -> bool
where
    M: MerkleBlock + ?Sized,
{
    if merkle_block.header().merkle_root() != header.merkle_root() {
        debug!(header = %header.hash(), "merkle block commits to a different root");
        return false;
    }
    if !merkle_block.valid_merkle_tree() {
        debug!(header = %header.hash(), "merkle block tree is inconsistent");
        return false;
    }
    txs.iter().all(|tx| match tx.txid() {
        Ok(txid) => merkle_block.has_transaction(&txid),
        Err(err) => {
            debug!(error = %err, "unparseable transaction reference");
            false
        }
    })
}

/// Merkle root of `txids` in wire order. The last node of an odd level is
/// paired with itself; an empty list yields the zero hash.
pub fn compute_merkle_root(txids: &[Txid]) -> Hash {
    if txids.is_empty() {
        return [0u8; 32];
    }
    let mut level: Vec<Hash> = txids.iter().map(|t| t.to_wire()).collect();
    while level.len() > 1 {
        level = level
            .chunks(2)
            .map(|pair| hash_nodes(&pair[0], pair.get(1).unwrap_or(&pair[0])))
            .collect();
    }
    level[0]
}

fn hash_nodes(left: &Hash, right: &Hash) -> Hash {
    let mut engine = sha256d::Hash::engine();
    engine.input(left);
    engine.input(right);
    sha256d::Hash::from_engine(engine).into_inner()
}

// ============================================================================
// PARTIAL MERKLE TREE
// ============================================================================

/// Depth-first encoding of a pruned Merkle tree.
///
/// Each visited node contributes one flag bit (is it an ancestor of a
/// matched leaf?). Nodes that are not descended into contribute their
/// hash. Bits are packed least significant first.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PartialMerkleTree {
    pub total_transactions: u32,
    pub hashes: Vec<Hash>,
    pub flags: Vec<u8>,
}

impl PartialMerkleTree {
    /// Build the tree proving the `txids` whose `matches` entry is true.
    /// Missing `matches` entries count as unmatched.
    pub fn build(txids: &[Txid], matches: &[bool]) -> Self {
        let leaves: Vec<Hash> = txids.iter().map(|t| t.to_wire()).collect();
        let matched: Vec<bool> = (0..leaves.len())
            .map(|i| matches.get(i).copied().unwrap_or(false))
            .collect();

        let mut builder = TreeBuilder {
            leaves: &leaves,
            matched: &matched,
            bits: Vec::new(),
            hashes: Vec::new(),
        };
        if !leaves.is_empty() {
            builder.traverse(tree_height(leaves.len()), 0);
        }

        let mut flags = vec![0u8; (builder.bits.len() + 7) / 8];
        for (i, bit) in builder.bits.iter().enumerate() {
            if *bit {
                flags[i / 8] |= 1 << (i % 8);
            }
        }

        PartialMerkleTree {
            total_transactions: leaves.len() as u32,
            hashes: builder.hashes,
            flags,
        }
    }

    /// Walk the tree and return its root together with the matched txids.
    ///
    /// `None` when the encoding is malformed: no transactions, more hashes
    /// than transactions, running out of bits or hashes, bits or hashes left
    /// over, or identical sibling hashes (the duplicate-subtree ambiguity).
    pub fn extract_matches(&self) -> Option<(Hash, Vec<Txid>)> {
        let total = self.total_transactions as usize;
        if total == 0 || self.hashes.len() > total {
            return None;
        }
        if self.flags.len() * 8 < self.hashes.len() {
            return None;
        }

        let mut walker = TreeWalker {
            tree: self,
            bits_used: 0,
            hashes_used: 0,
            matched: Vec::new(),
        };
        let root = walker.traverse(tree_height(total), 0)?;

        if (walker.bits_used + 7) / 8 != self.flags.len() {
            return None;
        }
        if walker.hashes_used != self.hashes.len() {
            return None;
        }
        Some((root, walker.matched))
    }

    fn flag(&self, index: usize) -> Option<bool> {
        self.flags
            .get(index / 8)
            .map(|byte| byte & (1 << (index % 8)) != 0)
    }
}

/// Nodes at `height` for a tree over `total` leaves.
fn tree_width(total: usize, height: u32) -> usize {
    (total + (1usize << height) - 1) >> height
}

fn tree_height(total: usize) -> u32 {
    let mut height = 0;
    while tree_width(total, height) > 1 {
        height += 1;
    }
    height
}

struct TreeBuilder<'a> {
    leaves: &'a [Hash],
    matched: &'a [bool],
    bits: Vec<bool>,
    hashes: Vec<Hash>,
}

impl TreeBuilder<'_> {
    fn node_hash(&self, height: u32, pos: usize) -> Hash {
        if height == 0 {
            return self.leaves[pos];
        }
        let left = self.node_hash(height - 1, pos * 2);
        let right = if pos * 2 + 1 < tree_width(self.leaves.len(), height - 1) {
            self.node_hash(height - 1, pos * 2 + 1)
        } else {
            left
        };
        hash_nodes(&left, &right)
    }

    fn traverse(&mut self, height: u32, pos: usize) {
        let first = pos << height;
        let last = ((pos + 1) << height).min(self.leaves.len());
        let parent_of_match = self.matched[first..last].iter().any(|m| *m);
        self.bits.push(parent_of_match);

        if height == 0 || !parent_of_match {
            let hash = self.node_hash(height, pos);
            self.hashes.push(hash);
            return;
        }
        self.traverse(height - 1, pos * 2);
        if pos * 2 + 1 < tree_width(self.leaves.len(), height - 1) {
            self.traverse(height - 1, pos * 2 + 1);
        }
    }
}

struct TreeWalker<'a> {
    tree: &'a PartialMerkleTree,
    bits_used: usize,
    hashes_used: usize,
    matched: Vec<Txid>,
}

impl TreeWalker<'_> {
    fn traverse(&mut self, height: u32, pos: usize) -> Option<Hash> {
        let parent_of_match = self.tree.flag(self.bits_used)?;
        self.bits_used += 1;

        if height == 0 || !parent_of_match {
            let hash = *self.tree.hashes.get(self.hashes_used)?;
            self.hashes_used += 1;
            if height == 0 && parent_of_match {
                self.matched.push(Txid::from_wire(hash));
            }
            return Some(hash);
        }

        let left = self.traverse(height - 1, pos * 2)?;
        let total = self.tree.total_transactions as usize;
        let right = if pos * 2 + 1 < tree_width(total, height - 1) {
            let right = self.traverse(height - 1, pos * 2 + 1)?;
            if right == left {
                return None;
            }
            right
        } else {
            left
        };
        Some(hash_nodes(&left, &right))
    }
}

// ============================================================================
// MERKLEBLOCK MESSAGE
// ============================================================================

/// BIP37 `merkleblock` message: a header and a partial Merkle tree.
///
/// The tree is walked once on construction; `valid_merkle_tree` and
/// `has_transaction` answer from that result.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MerkleBlockMessage {
    header: BlockHeader,
    tree: PartialMerkleTree,
    extracted: Option<(Hash, Vec<Txid>)>,
}

impl MerkleBlockMessage {
    pub fn new(header: BlockHeader, tree: PartialMerkleTree) -> Self {
        let extracted = tree.extract_matches();
        MerkleBlockMessage {
            header,
            tree,
            extracted,
        }
    }

    /// Build a message for `header` proving the matched `txids`.
    pub fn from_txids(header: BlockHeader, txids: &[Txid], matches: &[bool]) -> Self {
        Self::new(header, PartialMerkleTree::build(txids, matches))
    }

    pub fn tree(&self) -> &PartialMerkleTree {
        &self.tree
    }

    /// Matched txids in tree order; empty for a malformed tree.
    pub fn matched_txids(&self) -> &[Txid] {
        match &self.extracted {
            Some((_, matched)) => matched.as_slice(),
            None => &[],
        }
    }

    /// Parse the wire encoding: header, u32 transaction count, var-int hash
    /// count, hashes, var-int flag byte count, flag bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() > MAX_MERKLE_BLOCK_SIZE {
            return Err(SpvError::Decode(format!(
                "merkle block of {} bytes exceeds {}",
                bytes.len(),
                MAX_MERKLE_BLOCK_SIZE
            )));
        }

        let mut reader = Reader::new(bytes);
        let header = BlockHeader::from_bytes(reader.take(HEADER_SIZE)?)?;
        let total_transactions = u32::from_le_bytes(reader.array::<4>()?);

        let hash_count = reader.var_int()?;
        if hash_count > (reader.remaining() / 32) as u64 {
            return Err(SpvError::Decode(format!(
                "merkle block declares {} hashes, only {} bytes left",
                hash_count,
                reader.remaining()
            )));
        }
        let mut hashes = Vec::with_capacity(hash_count as usize);
        for _ in 0..hash_count {
            hashes.push(reader.array::<32>()?);
        }

        let flag_len = reader.var_int()?;
        if flag_len > reader.remaining() as u64 {
            return Err(SpvError::Decode(format!(
                "merkle block declares {} flag bytes, only {} left",
                flag_len,
                reader.remaining()
            )));
        }
        let flags = reader.take(flag_len as usize)?.to_vec();

        if reader.remaining() != 0 {
            return Err(SpvError::Decode(format!(
                "{} trailing bytes after merkle block",
                reader.remaining()
            )));
        }

        Ok(Self::new(
            header,
            PartialMerkleTree {
                total_transactions,
                hashes,
                flags,
            },
        ))
    }

    pub fn from_hex(s: &str) -> Result<Self> {
        Self::from_bytes(&hex::decode(s)?)
    }

    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(
            HEADER_SIZE + 4 + 9 + self.tree.hashes.len() * 32 + 9 + self.tree.flags.len(),
        );
        out.extend_from_slice(&self.header.to_bytes());
        out.extend_from_slice(&self.tree.total_transactions.to_le_bytes());
        write_var_int(&mut out, self.tree.hashes.len() as u64);
        for hash in &self.tree.hashes {
            out.extend_from_slice(hash);
        }
        write_var_int(&mut out, self.tree.flags.len() as u64);
        out.extend_from_slice(&self.tree.flags);
        out
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }
}

impl MerkleBlock for MerkleBlockMessage {
    fn header(&self) -> &BlockHeader {
        &self.header
    }

    fn valid_merkle_tree(&self) -> bool {
        match &self.extracted {
            Some((root, _)) => *root == self.header.merkle_root(),
            None => false,
        }
    }

    fn has_transaction(&self, txid: &Txid) -> bool {
        self.matched_txids().contains(txid)
    }
}

struct Reader<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(bytes: &'a [u8]) -> Self {
        Reader { bytes, pos: 0 }
    }

    fn remaining(&self) -> usize {
        self.bytes.len() - self.pos
    }

    fn take(&mut self, len: usize) -> Result<&'a [u8]> {
        if len > self.remaining() {
            return Err(SpvError::Decode(format!(
                "merkle block truncated: need {} bytes at offset {}, have {}",
                len,
                self.pos,
                self.remaining()
            )));
        }
        let slice = &self.bytes[self.pos..self.pos + len];
        self.pos += len;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn var_int(&mut self) -> Result<u64> {
        let prefix = self.array::<1>()?[0];
        Ok(match prefix {
            0xfd => u64::from(u16::from_le_bytes(self.array::<2>()?)),
            0xfe => u64::from(u32::from_le_bytes(self.array::<4>()?)),
            0xff => u64::from_le_bytes(self.array::<8>()?),
            n => u64::from(n),
        })
    }
}

fn write_var_int(out: &mut Vec<u8>, value: u64) {
    if value < 0xfd {
        out.push(value as u8);
    } else if value <= 0xffff {
        out.push(0xfd);
        out.extend_from_slice(&(value as u16).to_le_bytes());
    } else if value <= 0xffff_ffff {
        out.push(0xfe);
        out.extend_from_slice(&(value as u32).to_le_bytes());
    } else {
        out.push(0xff);
        out.extend_from_slice(&value.to_le_bytes());
    }
}
