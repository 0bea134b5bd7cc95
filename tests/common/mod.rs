//! Fixture helpers shared by the integration tests
#![allow(dead_code)]

use spv_chain::mining::{mine_header, HeaderTemplate};
use spv_chain::*;

/// Mine `count` regtest headers extending `parent`.
pub fn mine_chain(parent: &BlockHeader, count: usize) -> Vec<BlockHeader> {
    let mut headers: Vec<BlockHeader> = Vec::with_capacity(count);
    let mut prev = parent.clone();
    for i in 0..count {
        let mut merkle_root = [0u8; 32];
        merkle_root[..8].copy_from_slice(&(i as u64).to_le_bytes());
        let template = HeaderTemplate::extending(&prev, merkle_root);
        let header = mine_header(&template, 1_000_000)
            .expect("regtest bits are valid")
            .expect("regtest target is reachable");
        prev = header.clone();
        headers.push(header);
    }
    headers
}

pub fn regtest_chain(confirms_before_final: usize) -> SpvChain {
    SpvChain::new(
        Network::Regtest,
        ChainConfig::default().with_confirms(confirms_before_final),
    )
}

/// Regtest chain plus `count` mined headers extending its genesis.
pub fn chain_with_fixture(confirms_before_final: usize, count: usize) -> (SpvChain, Vec<BlockHeader>) {
    let chain = regtest_chain(confirms_before_final);
    let headers = mine_chain(&chain.root(), count);
    (chain, headers)
}

/// Heights and hashes of the full chain, pruned tail included.
pub fn snapshot(chain: &SpvChain) -> Vec<(Height, BlockHash)> {
    chain
        .get_longest_chain(true)
        .iter()
        .map(|h| (chain.get_height(&h.hash()).unwrap_or(u64::MAX), h.hash()))
        .collect()
}
