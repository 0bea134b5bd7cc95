//! Network selection and genesis headers

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::constants::*;
use crate::error::{Result, SpvError};
use crate::header::BlockHeader;
use crate::types::BlockHash;

/// Networks with a built-in genesis header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Network {
    Mainnet,
    Testnet,
    Devnet,
    Regtest,
    /// Low-difficulty test network
    LowDiff,
}

impl Network {
    pub const ALL: [Network; 5] = [
        Network::Mainnet,
        Network::Testnet,
        Network::Devnet,
        Network::Regtest,
        Network::LowDiff,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Network::Mainnet => "mainnet",
            Network::Testnet => "testnet",
            Network::Devnet => "devnet",
            Network::Regtest => "regtest",
            Network::LowDiff => "lowdiff",
        }
    }
}

impl fmt::Display for Network {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Network {
    type Err = SpvError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "mainnet" | "livenet" => Ok(Network::Mainnet),
            "testnet" => Ok(Network::Testnet),
            "devnet" => Ok(Network::Devnet),
            "regtest" => Ok(Network::Regtest),
            "lowdiff" => Ok(Network::LowDiff),
            _ => Err(SpvError::UnsupportedNetwork(s.to_string())),
        }
    }
}

/// Supplies the genesis header a chain is anchored on.
pub trait GenesisProvider {
    fn genesis(&self, network: Network) -> BlockHeader;
}

/// Genesis headers compiled into the crate.
#[derive(Debug, Clone, Copy, Default)]
pub struct BuiltinGenesis;

impl GenesisProvider for BuiltinGenesis {
    fn genesis(&self, network: Network) -> BlockHeader {
        genesis_header(network)
    }
}

/// Genesis header for `network`.
///
/// The field values are the network's, but the hash is double SHA-256
/// rather than X11, so it is not the block hash the real network uses.
/// Headers that name the real genesis as parent will not connect to it;
/// anchor such chains with [`SpvChain::from_checkpoint`](crate::chain::SpvChain::from_checkpoint).
pub fn genesis_header(network: Network) -> BlockHeader {
    let (version, time, bits, nonce) = match network {
        Network::Mainnet => (1, 1_390_095_618, MAINNET_GENESIS_BITS, 28_917_698),
        Network::Testnet => (1, 1_390_666_206, MAINNET_GENESIS_BITS, 3_861_367_235),
        Network::Devnet => (1, 1_417_713_337, REGTEST_BITS, 1_096_447),
        Network::Regtest => (1, 1_417_713_337, REGTEST_BITS, 1_096_447),
        Network::LowDiff => (0x2000_0000, 1_527_578_453, REGTEST_BITS, 2),
    };
    BlockHeader::new(version, BlockHash::ZERO, GENESIS_MERKLE_ROOT, time, bits, nonce)
}
