//! Header format and chain constants

/// Serialized block header size: version(4) + prev(32) + merkle(32) + time(4) + bits(4) + nonce(4)
pub const HEADER_SIZE: usize = 80;

/// Hex-encoded header length
pub const HEADER_HEX_LEN: usize = HEADER_SIZE * 2;

/// Smallest compact-target exponent accepted by `expand_target`
pub const MIN_TARGET_EXPONENT: u8 = 4;

/// Largest compact-target exponent accepted by `expand_target`
pub const MAX_TARGET_EXPONENT: u8 = 32;

/// Mantissa mask for compact bits (sign bit stripped)
pub const COMPACT_MANTISSA_MASK: u32 = 0x007f_ffff;

/// Headers kept in the active (reorg-able) window before they are pruned
pub const DEFAULT_CONFIRMS_BEFORE_FINAL: usize = 100;

/// Orphan chunks buffered before the oldest is evicted
pub const DEFAULT_MAX_ORPHAN_CHUNKS: usize = 1024;

/// Maximum allowed header time drift into the future: 2 hours
pub const MAX_FUTURE_BLOCK_TIME: u32 = 2 * 60 * 60;

/// Easiest target used by regtest, devnet and low-difficulty networks
pub const REGTEST_BITS: u32 = 0x207f_ffff;

/// Main and test network genesis target
pub const MAINNET_GENESIS_BITS: u32 = 0x1e0f_fff0;

/// Genesis coinbase Merkle root in wire order, shared by every built-in network
/// (displayed as e0028eb9648db56b1ac77cf090b99048a8007e2bb64b68f092c03c7f56a662c7)
pub const GENESIS_MERKLE_ROOT: [u8; 32] = [
    0xc7, 0x62, 0xa6, 0x56, 0x7f, 0x3c, 0xc0, 0x92,
    0xf0, 0x68, 0x4b, 0xb6, 0x2b, 0x7e, 0x00, 0xa8,
    0x48, 0x90, 0xb9, 0x90, 0xf0, 0x7c, 0xc7, 0x1a,
    0x6b, 0xb5, 0x8d, 0x64, 0xb9, 0x8e, 0x02, 0xe0,
];

/// Maximum serialized size of a `merkleblock` message accepted for parsing
pub const MAX_MERKLE_BLOCK_SIZE: usize = 1_100_000;
