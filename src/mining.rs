//! Header mining for low-difficulty networks
//!
//! Regtest, devnet and the low-difficulty network accept targets easy
//! enough that a nonce can be found in a handful of attempts. Fixtures and
//! local tooling use this to build valid header chains.

use crate::error::Result;
use crate::header::BlockHeader;
use crate::pow::meets_target;
use crate::types::{BlockHash, Hash};

/// Header fields fixed before the nonce search.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HeaderTemplate {
    pub version: i32,
    pub prev_block_hash: BlockHash,
    pub merkle_root: Hash,
    pub time: u32,
    pub bits: u32,
}

impl HeaderTemplate {
    /// Template extending `parent`, one second later, same bits.
    pub fn extending(parent: &BlockHeader, merkle_root: Hash) -> Self {
        HeaderTemplate {
            version: parent.version(),
            prev_block_hash: parent.hash(),
            merkle_root,
            time: parent.time().wrapping_add(1),
            bits: parent.bits(),
        }
    }

    pub fn with_nonce(&self, nonce: u32) -> BlockHeader {
        BlockHeader::new(
            self.version,
            self.prev_block_hash,
            self.merkle_root,
            self.time,
            self.bits,
            nonce,
        )
    }
}

/// MineHeader: 𝒯 × ℕ → ℋ ∪ {⊥}
///
/// Try nonces `0..max_attempts` (capped at the nonce space) and return the
/// first header whose hash meets its own target, or `None` when every
/// attempt fails. Invalid bits are an error rather than a miss.
pub fn mine_header(template: &HeaderTemplate, max_attempts: u64) -> Result<Option<BlockHeader>> {
    let limit = max_attempts.min(u64::from(u32::MAX) + 1);
    for nonce in 0..limit {
        let candidate = template.with_nonce(nonce as u32);
        if meets_target(&candidate)? {
            return Ok(Some(candidate));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constants::REGTEST_BITS;
    use crate::error::SpvError;

    fn regtest_template() -> HeaderTemplate {
        HeaderTemplate {
            version: 1,
            prev_block_hash: BlockHash::ZERO,
            merkle_root: [9u8; 32],
            time: 1_417_713_400,
            bits: REGTEST_BITS,
        }
    }

    #[test]
    fn test_mine_header_regtest() {
        let header = mine_header(&regtest_template(), 10_000).unwrap().unwrap();
        assert!(meets_target(&header).unwrap());
        assert_eq!(header.time(), 1_417_713_400);
    }

    #[test]
    fn test_mine_header_exhausts_attempts() {
        let mut template = regtest_template();
        template.bits = 0x0400_0001;
        assert_eq!(mine_header(&template, 50).unwrap(), None);
        assert_eq!(mine_header(&template, 0).unwrap(), None);
    }

    #[test]
    fn test_mine_header_invalid_bits() {
        let mut template = regtest_template();
        template.bits = 0x2200_ffff;
        assert!(matches!(
            mine_header(&template, 10),
            Err(SpvError::InvalidDifficultyBits { .. })
        ));
    }

    #[test]
    fn test_extending_links_to_parent() {
        let parent = mine_header(&regtest_template(), 10_000).unwrap().unwrap();
        let child = mine_header(&HeaderTemplate::extending(&parent, [1u8; 32]), 10_000)
            .unwrap()
            .unwrap();
        assert!(child.is_child_of(&parent));
        assert_eq!(child.time(), parent.time() + 1);
    }
}
