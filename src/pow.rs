//! Proof of work: compact target expansion and header validity predicates

use std::time::{SystemTime, UNIX_EPOCH};
use tracing::debug;

use crate::constants::*;
use crate::error::{Result, SpvError};
use crate::header::BlockHeader;
use crate::network::Network;

/// ExpandTarget: ℕ₃₂ → 𝔹³²
///
/// Expand compact difficulty bits into a 32-byte big-endian target.
///
/// The format is `0xEEMMMMMM` where:
/// - `EE` is the exponent, the byte length of the target (must be 4..=32)
/// - `MMMMMM` is the mantissa with its sign bit (0x00800000) stripped
///
/// The target is all zeros except the four bytes `mantissa << 8`, written
/// big-endian at offset `32 - exponent`.
pub fn expand_target(bits: u32) -> Result<[u8; 32]> {
    let exponent = (bits >> 24) as u8;
    if !(MIN_TARGET_EXPONENT..=MAX_TARGET_EXPONENT).contains(&exponent) {
        return Err(SpvError::InvalidDifficultyBits { bits, exponent });
    }

    let mantissa = bits & COMPACT_MANTISSA_MASK;
    let offset = 32 - exponent as usize;

    let mut target = [0u8; 32];
    target[offset..offset + 4].copy_from_slice(&(mantissa << 8).to_be_bytes());
    Ok(target)
}

/// MeetsTarget: ℋ → {true, false}
///
/// Formula: reverse(SHA256(SHA256(header))) < ExpandTarget(header.bits),
/// both read as unsigned big-endian integers.
pub fn meets_target(header: &BlockHeader) -> Result<bool> {
    let target = expand_target(header.bits())?;
    // Byte arrays compare lexicographically, which is big-endian integer order
    Ok(header.hash().to_display_bytes() < target)
}

/// Header validity predicate injected into the chain.
///
/// `preceding` holds the headers before `header`: the in-batch predecessors
/// for an orphan batch, or the active chain followed by the in-batch
/// predecessors for a batch that extends the tip. `Ok(false)` rejects the
/// header as consensus-invalid; errors propagate unchanged.
pub trait HeaderValidator: Send + Sync {
    fn validate(
        &self,
        header: &BlockHeader,
        preceding: &[BlockHeader],
        network: Network,
    ) -> Result<bool>;
}

impl<F> HeaderValidator for F
where
    F: Fn(&BlockHeader, &[BlockHeader], Network) -> bool + Send + Sync,
{
    fn validate(
        &self,
        header: &BlockHeader,
        preceding: &[BlockHeader],
        network: Network,
    ) -> Result<bool> {
        Ok(self(header, preceding, network))
    }
}

/// Default validator: proof of work against the header's own bits, plus a
/// bound on how far in the future the header time may be.
///
/// Difficulty retargeting is not evaluated here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProofOfWorkValidator {
    pub max_future_drift: Option<u32>,
}

impl ProofOfWorkValidator {
    pub fn new() -> Self {
        Self {
            max_future_drift: Some(MAX_FUTURE_BLOCK_TIME),
        }
    }

    /// Proof of work only, no timestamp rule.
    pub fn without_time_check() -> Self {
        Self {
            max_future_drift: None,
        }
    }
}

impl Default for ProofOfWorkValidator {
    fn default() -> Self {
        Self::new()
    }
}

impl HeaderValidator for ProofOfWorkValidator {
    fn validate(
        &self,
        header: &BlockHeader,
        _preceding: &[BlockHeader],
        _network: Network,
    ) -> Result<bool> {
        if !meets_target(header)? {
            debug!(hash = %header.hash(), bits = header.bits(), "header hash above target");
            return Ok(false);
        }

        if let Some(drift) = self.max_future_drift {
            let now = SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0);
            if u64::from(header.time()) > now + u64::from(drift) {
                debug!(hash = %header.hash(), time = header.time(), "header time too far in the future");
                return Ok(false);
            }
        }

        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::BlockHash;

    fn bitcoin_genesis() -> BlockHeader {
        BlockHeader::from_hex(
            "0100000000000000000000000000000000000000000000000000000000000000000000003ba3edfd7a7b12b27ac72c3e67768f617fc81bc3888a51323a9fb8aa4b1e5e4a29ab5f49ffff001d1dac2b7c",
        )
        .unwrap()
    }

    #[test]
    fn test_expand_target_genesis_bits() {
        let target = expand_target(0x1d00ffff).unwrap();
        let mut expected = [0u8; 32];
        expected[4] = 0xff;
        expected[5] = 0xff;
        assert_eq!(target, expected);
    }

    #[test]
    fn test_expand_target_exponent_too_small() {
        for bits in [0x0000ffffu32, 0x0100ffff, 0x0200ffff, 0x0300ffff] {
            assert!(matches!(
                expand_target(bits),
                Err(SpvError::InvalidDifficultyBits { .. })
            ));
        }
    }

    #[test]
    fn test_expand_target_exponent_too_large() {
        let result = expand_target(0x2100ffff);
        assert_eq!(
            result,
            Err(SpvError::InvalidDifficultyBits {
                bits: 0x2100ffff,
                exponent: 0x21
            })
        );
        assert!(expand_target(0xff00ffff).is_err());
    }

    #[test]
    fn test_expand_target_exponent_4() {
        let target = expand_target(0x04123456).unwrap();
        assert_eq!(&target[..28], &[0u8; 28]);
        assert_eq!(&target[28..], &[0x12, 0x34, 0x56, 0x00]);
    }

    #[test]
    fn test_expand_target_exponent_32() {
        let target = expand_target(0x207fffff).unwrap();
        assert_eq!(&target[..4], &[0x7f, 0xff, 0xff, 0x00]);
        assert_eq!(&target[4..], &[0u8; 28]);
    }

    #[test]
    fn test_expand_target_strips_sign_bit() {
        assert_eq!(expand_target(0x1d80ffff).unwrap(), expand_target(0x1d00ffff).unwrap());
    }

    #[test]
    fn test_expand_target_zero_mantissa() {
        assert_eq!(expand_target(0x1d000000).unwrap(), [0u8; 32]);
    }

    #[test]
    fn test_meets_target_genesis() {
        assert!(meets_target(&bitcoin_genesis()).unwrap());
    }

    #[test]
    fn test_meets_target_too_hard() {
        let genesis = bitcoin_genesis();
        let hard = BlockHeader::new(
            genesis.version(),
            genesis.prev_block_hash(),
            genesis.merkle_root(),
            genesis.time(),
            0x04000001,
            genesis.nonce(),
        );
        assert!(!meets_target(&hard).unwrap());
    }

    #[test]
    fn test_meets_target_invalid_bits() {
        let header = BlockHeader::new(1, BlockHash::ZERO, [0u8; 32], 0, 0x0300ffff, 0);
        assert!(matches!(
            meets_target(&header),
            Err(SpvError::InvalidDifficultyBits { .. })
        ));
    }

    #[test]
    fn test_pow_validator_accepts_genesis() {
        let validator = ProofOfWorkValidator::new();
        assert!(validator
            .validate(&bitcoin_genesis(), &[], Network::Mainnet)
            .unwrap());
    }

    #[test]
    fn test_pow_validator_rejects_future_time() {
        let mut nonce = 0;
        let header = loop {
            let candidate = BlockHeader::new(1, BlockHash::ZERO, [0u8; 32], u32::MAX, 0x207fffff, nonce);
            if meets_target(&candidate).unwrap() {
                break candidate;
            }
            nonce += 1;
        };
        assert!(!ProofOfWorkValidator::new()
            .validate(&header, &[], Network::Regtest)
            .unwrap());
        assert!(ProofOfWorkValidator::without_time_check()
            .validate(&header, &[], Network::Regtest)
            .unwrap());
    }

    #[test]
    fn test_closure_validator() {
        let reject_all = |_: &BlockHeader, _: &[BlockHeader], _: Network| false;
        assert!(!reject_all
            .validate(&bitcoin_genesis(), &[], Network::Mainnet)
            .unwrap());
    }
}
