//! Block header codec
//!
//! Every header representation the engine accepts is normalized into one
//! canonical, immutable [`BlockHeader`] whose hash is computed exactly once.
//! The accepted shapes form a closed set ([`HeaderInput`]):
//!
//! - an already-canonical header
//! - an 80-byte serialized header
//! - a 160-character hex string of the same layout
//! - a loosely-typed record, either wire style (`prevHash`, `merkleRoot`,
//!   integer `bits`) or RPC style (`previousblockhash`, `merkleroot`, hex
//!   `bits`)
//!
//! Hashes inside records are display-order hex and are byte-reversed into
//! wire order on the way in.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fmt;

use crate::constants::{HEADER_HEX_LEN, HEADER_SIZE};
use crate::error::{Result, SpvError};
use crate::types::{BlockHash, Hash};

/// Canonical block header.
///
/// Fields are private: a header never changes after construction, which is
/// what makes caching the hash sound.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "WireHeaderRecord", try_from = "WireHeaderRecord")]
pub struct BlockHeader {
    version: i32,
    prev_block_hash: BlockHash,
    merkle_root: Hash,
    time: u32,
    bits: u32,
    nonce: u32,
    hash: BlockHash,
}

impl BlockHeader {
    /// Build a header and compute its hash.
    pub fn new(
        version: i32,
        prev_block_hash: BlockHash,
        merkle_root: Hash,
        time: u32,
        bits: u32,
        nonce: u32,
    ) -> Self {
        let mut header = BlockHeader {
            version,
            prev_block_hash,
            merkle_root,
            time,
            bits,
            nonce,
            hash: BlockHash::ZERO,
        };
        header.hash = BlockHash::from_wire(double_sha256(&header.to_bytes()));
        header
    }

    /// Parse the fixed 80-byte layout.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() != HEADER_SIZE {
            return Err(SpvError::Decode(format!(
                "header must be {} bytes, got {}",
                HEADER_SIZE,
                bytes.len()
            )));
        }

        let mut prev = [0u8; 32];
        prev.copy_from_slice(&bytes[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&bytes[36..68]);

        Ok(BlockHeader::new(
            read_u32_le(bytes, 0) as i32,
            BlockHash::from_wire(prev),
            merkle_root,
            read_u32_le(bytes, 68),
            read_u32_le(bytes, 72),
            read_u32_le(bytes, 76),
        ))
    }

    /// Parse a 160-character hex string of the 80-byte layout.
    pub fn from_hex(s: &str) -> Result<Self> {
        if s.len() != HEADER_HEX_LEN {
            return Err(SpvError::Decode(format!(
                "header hex must be {} characters, got {}",
                HEADER_HEX_LEN,
                s.len()
            )));
        }
        let bytes = hex::decode(s)?;
        BlockHeader::from_bytes(&bytes)
    }

    /// Serialize to the 80-byte layout (little-endian integers, hashes in wire order).
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..4].copy_from_slice(&(self.version as u32).to_le_bytes());
        bytes[4..36].copy_from_slice(self.prev_block_hash.as_wire());
        bytes[36..68].copy_from_slice(&self.merkle_root);
        bytes[68..72].copy_from_slice(&self.time.to_le_bytes());
        bytes[72..76].copy_from_slice(&self.bits.to_le_bytes());
        bytes[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.to_bytes())
    }

    pub fn version(&self) -> i32 {
        self.version
    }

    pub fn prev_block_hash(&self) -> BlockHash {
        self.prev_block_hash
    }

    /// Merkle root in wire order.
    pub fn merkle_root(&self) -> Hash {
        self.merkle_root
    }

    pub fn time(&self) -> u32 {
        self.time
    }

    pub fn bits(&self) -> u32 {
        self.bits
    }

    pub fn nonce(&self) -> u32 {
        self.nonce
    }

    pub fn hash(&self) -> BlockHash {
        self.hash
    }

    /// True when `self` directly extends `parent`.
    pub fn is_child_of(&self, parent: &BlockHeader) -> bool {
        self.prev_block_hash == parent.hash
    }
}

impl fmt::Debug for BlockHeader {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BlockHeader")
            .field("hash", &self.hash)
            .field("version", &self.version)
            .field("prev_block_hash", &self.prev_block_hash)
            .field("merkle_root", &get_corrected_hash(&self.merkle_root))
            .field("time", &self.time)
            .field("bits", &format_args!("{:#010x}", self.bits))
            .field("nonce", &self.nonce)
            .finish()
    }
}

/// Byte-reverse a raw 32-byte hash and render it as hex.
///
/// Headers carry hashes in wire order; every displayed or compared hash
/// string goes through this transformation.
pub fn get_corrected_hash(raw: &Hash) -> String {
    let mut reversed = *raw;
    reversed.reverse();
    hex::encode(reversed)
}

/// Double SHA-256 of `data`, in wire order.
pub(crate) fn double_sha256(data: &[u8]) -> Hash {
    let first = Sha256::digest(data);
    let second = Sha256::digest(first);
    let mut out = [0u8; 32];
    out.copy_from_slice(&second);
    out
}

fn read_u32_le(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

fn decode_display_hash(field: &str, s: &str) -> Result<Hash> {
    let bytes = hex::decode(s)
        .map_err(|e| SpvError::Decode(format!("{}: invalid hex: {}", field, e)))?;
    if bytes.len() != 32 {
        return Err(SpvError::Decode(format!(
            "{}: expected 32 bytes, got {}",
            field,
            bytes.len()
        )));
    }
    let mut wire = [0u8; 32];
    wire.copy_from_slice(&bytes);
    wire.reverse();
    Ok(wire)
}

// ============================================================================
// RECORD SHAPES
// ============================================================================

/// Header record with "wire" field names, as produced by P2P header decoders.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireHeaderRecord {
    pub version: i32,
    pub prev_hash: String,
    pub merkle_root: String,
    pub time: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl WireHeaderRecord {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl From<&BlockHeader> for WireHeaderRecord {
    fn from(header: &BlockHeader) -> Self {
        WireHeaderRecord {
            version: header.version,
            prev_hash: header.prev_block_hash.to_hex(),
            merkle_root: get_corrected_hash(&header.merkle_root),
            time: header.time,
            bits: header.bits,
            nonce: header.nonce,
        }
    }
}

impl From<BlockHeader> for WireHeaderRecord {
    fn from(header: BlockHeader) -> Self {
        WireHeaderRecord::from(&header)
    }
}

impl TryFrom<WireHeaderRecord> for BlockHeader {
    type Error = SpvError;

    fn try_from(record: WireHeaderRecord) -> Result<Self> {
        let prev = decode_display_hash("prevHash", &record.prev_hash)?;
        let merkle_root = decode_display_hash("merkleRoot", &record.merkle_root)?;
        Ok(BlockHeader::new(
            record.version,
            BlockHash::from_wire(prev),
            merkle_root,
            record.time,
            record.bits,
            record.nonce,
        ))
    }
}

/// Header record with node RPC field names (`getblockheader` output).
///
/// `previousblockhash` is absent for a genesis header. Fields the RPC adds
/// on top (height, confirmations, chainwork, ...) are ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RpcHeaderRecord {
    pub version: i32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub previousblockhash: Option<String>,
    pub merkleroot: String,
    pub time: u32,
    /// Compact target as a hex string, e.g. `"1e0ffff0"`.
    pub bits: String,
    pub nonce: u32,
}

impl RpcHeaderRecord {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

impl From<&BlockHeader> for RpcHeaderRecord {
    fn from(header: &BlockHeader) -> Self {
        let previousblockhash = if header.prev_block_hash == BlockHash::ZERO {
            None
        } else {
            Some(header.prev_block_hash.to_hex())
        };
        RpcHeaderRecord {
            version: header.version,
            previousblockhash,
            merkleroot: get_corrected_hash(&header.merkle_root),
            time: header.time,
            bits: format!("{:08x}", header.bits),
            nonce: header.nonce,
        }
    }
}

impl TryFrom<RpcHeaderRecord> for BlockHeader {
    type Error = SpvError;

    fn try_from(record: RpcHeaderRecord) -> Result<Self> {
        let prev = match record.previousblockhash.as_deref() {
            Some(s) => decode_display_hash("previousblockhash", s)?,
            None => [0u8; 32],
        };
        let merkle_root = decode_display_hash("merkleroot", &record.merkleroot)?;
        let bits = u32::from_str_radix(record.bits.trim_start_matches("0x"), 16)
            .map_err(|e| SpvError::Decode(format!("bits: invalid hex {:?}: {}", record.bits, e)))?;
        Ok(BlockHeader::new(
            record.version,
            BlockHash::from_wire(prev),
            merkle_root,
            record.time,
            bits,
            record.nonce,
        ))
    }
}

/// Either record shape. Deserializing tries the wire shape first, then RPC.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum HeaderRecord {
    Wire(WireHeaderRecord),
    Rpc(RpcHeaderRecord),
}

impl HeaderRecord {
    pub fn from_json(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }

    pub fn from_value(value: serde_json::Value) -> Result<Self> {
        Ok(serde_json::from_value(value)?)
    }
}

impl TryFrom<HeaderRecord> for BlockHeader {
    type Error = SpvError;

    fn try_from(record: HeaderRecord) -> Result<Self> {
        match record {
            HeaderRecord::Wire(wire) => BlockHeader::try_from(wire),
            HeaderRecord::Rpc(rpc) => BlockHeader::try_from(rpc),
        }
    }
}

// ============================================================================
// NORMALIZATION
// ============================================================================

/// Every representation `normalize_header` accepts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HeaderInput {
    Header(BlockHeader),
    Bytes(Vec<u8>),
    Hex(String),
    Record(HeaderRecord),
}

impl HeaderInput {
    pub fn normalize(self) -> Result<BlockHeader> {
        match self {
            HeaderInput::Header(header) => Ok(header),
            HeaderInput::Bytes(bytes) => BlockHeader::from_bytes(&bytes),
            HeaderInput::Hex(s) => BlockHeader::from_hex(&s),
            HeaderInput::Record(record) => BlockHeader::try_from(record),
        }
    }
}

/// Normalize any supported header representation.
pub fn normalize_header(input: impl Into<HeaderInput>) -> Result<BlockHeader> {
    input.into().normalize()
}

impl From<BlockHeader> for HeaderInput {
    fn from(header: BlockHeader) -> Self {
        HeaderInput::Header(header)
    }
}

impl From<&BlockHeader> for HeaderInput {
    fn from(header: &BlockHeader) -> Self {
        HeaderInput::Header(header.clone())
    }
}

impl From<Vec<u8>> for HeaderInput {
    fn from(bytes: Vec<u8>) -> Self {
        HeaderInput::Bytes(bytes)
    }
}

impl From<&[u8]> for HeaderInput {
    fn from(bytes: &[u8]) -> Self {
        HeaderInput::Bytes(bytes.to_vec())
    }
}

impl From<[u8; HEADER_SIZE]> for HeaderInput {
    fn from(bytes: [u8; HEADER_SIZE]) -> Self {
        HeaderInput::Bytes(bytes.to_vec())
    }
}

impl From<String> for HeaderInput {
    fn from(s: String) -> Self {
        HeaderInput::Hex(s)
    }
}

impl From<&str> for HeaderInput {
    fn from(s: &str) -> Self {
        HeaderInput::Hex(s.to_string())
    }
}

impl From<HeaderRecord> for HeaderInput {
    fn from(record: HeaderRecord) -> Self {
        HeaderInput::Record(record)
    }
}

impl From<WireHeaderRecord> for HeaderInput {
    fn from(record: WireHeaderRecord) -> Self {
        HeaderInput::Record(HeaderRecord::Wire(record))
    }
}

impl From<RpcHeaderRecord> for HeaderInput {
    fn from(record: RpcHeaderRecord) -> Self {
        HeaderInput::Record(HeaderRecord::Rpc(record))
    }
}
