//! Construction, configuration, caching and the shared handle

mod common;

use common::*;
use spv_chain::*;

struct FixedGenesis(BlockHeader);

impl GenesisProvider for FixedGenesis {
    fn genesis(&self, _network: Network) -> BlockHeader {
        self.0.clone()
    }
}

#[test]
fn test_open_uses_provider() {
    let custom = mine_chain(&genesis_header(Network::Regtest), 1).remove(0);
    let chain = SpvChain::open(
        Some("regtest"),
        None,
        &FixedGenesis(custom.clone()),
        ChainConfig::default(),
    )
    .unwrap();
    assert_eq!(chain.root(), custom);
    assert_eq!(chain.get_header_by_height(0), Some(custom));
}

#[test]
fn test_open_without_anchor_fails() {
    let result = SpvChain::open(Some("bogus"), None, &BuiltinGenesis, ChainConfig::default());
    assert_eq!(
        result.map(|_| ()),
        Err(SpvError::UnsupportedNetwork("bogus".to_string()))
    );
}

#[test]
fn test_open_from_rpc_checkpoint() {
    let checkpoint = genesis_header(Network::LowDiff);
    let record = header::RpcHeaderRecord::from(&checkpoint);
    let mut chain = SpvChain::open(
        Some("lowdiff"),
        Some((record.into(), 500)),
        &BuiltinGenesis,
        ChainConfig::default(),
    )
    .unwrap();
    assert_eq!(chain.network(), Network::LowDiff);
    assert_eq!(chain.get_height(&checkpoint.hash()), Some(500));

    let headers = mine_chain(&checkpoint, 2);
    let accepted = chain.add_headers(headers, 501).unwrap();
    assert_eq!(accepted.first_height, Some(501));
    assert!(chain.validate().is_ok());
}

#[test]
fn test_config_from_json_drives_pruning() {
    let config = ChainConfig::from_json(r#"{"confirms_before_final": 3}"#).unwrap();
    let mut chain = SpvChain::new(Network::Devnet, config);
    let headers = mine_chain(&chain.root(), 6);
    chain.add_headers(headers.clone(), 1).unwrap();
    assert_eq!(chain.get_longest_chain(false), headers[3..].to_vec());
    assert_eq!(chain.get_last_headers(4), headers[2..].to_vec());
}

#[test]
fn test_custom_validator_receives_network() {
    let mut chain = SpvChain::new(Network::Devnet, ChainConfig::default()).with_validator(
        |_: &BlockHeader, _: &[BlockHeader], network: Network| network == Network::Testnet,
    );
    let headers = mine_chain(&chain.root(), 1);
    assert!(matches!(
        chain.add_headers(headers, 1),
        Err(SpvError::InvalidHeader { index: 0, .. })
    ));
}

#[test]
fn test_cache_follows_accepted_batches() {
    let (mut chain, headers) = chain_with_fixture(100, 6);
    let mut cache = HeaderCache::new(16);

    let first = chain.add_headers(headers[..3].to_vec(), 1).unwrap();
    assert_eq!(cache.record(&first), 3);
    let orphan = chain.add_headers(headers[4..].to_vec(), 5).unwrap();
    assert_eq!(cache.record(&orphan), 0);

    assert_eq!(cache.get_by_height(2), Some(headers[1].clone()));
    assert_eq!(cache.get(&headers[2].hash()), Some(headers[2].clone()));
    assert_eq!(cache.get(&headers[5].hash()), None);

    assert_eq!(cache.invalidate_from(3), 1);
    assert_eq!(cache.get(&headers[2].hash()), None);
}

#[test]
fn test_cache_records_reconnected_orphans() {
    let (mut chain, headers) = chain_with_fixture(100, 5);
    let mut cache = HeaderCache::new(16);

    cache.record(&chain.add_headers(headers[3..].to_vec(), 4).unwrap());
    let accepted = chain.add_headers(headers[..3].to_vec(), 1).unwrap();
    assert_eq!(cache.record(&accepted), 5);
    assert_eq!(cache.get_by_height(5), Some(headers[4].clone()));
    assert_eq!(cache.get(&headers[3].hash()), Some(headers[3].clone()));
}

#[test]
fn test_cache_warm_after_reconnect() {
    let (mut chain, headers) = chain_with_fixture(100, 4);
    chain.add_headers(headers[2..].to_vec(), 3).unwrap();
    chain.add_headers(headers[..2].to_vec(), 1).unwrap();

    let mut cache = HeaderCache::new(3);
    assert_eq!(cache.warm(&chain, 3), 3);
    assert_eq!(cache.get_by_height(4), Some(headers[3].clone()));
    assert_eq!(cache.get_by_height(1), None);
}

#[test]
fn test_shared_chain_handle() {
    let (chain, headers) = chain_with_fixture(100, 3);
    let shared = SharedSpvChain::from(chain);
    let other = shared.clone();

    other.add_headers(headers.clone(), 1).unwrap();
    assert_eq!(shared.tip_height(), Some(3));
    assert_eq!(shared.get_header(&headers[0].hash()), Some(headers[0].clone()));
    assert_eq!(shared.read(|chain| chain.get_last_headers(2)), headers[1..].to_vec());

    shared.reset(10);
    assert_eq!(other.get_tip_header(), None);
    assert_eq!(other.read(|chain| chain.start_block_height()), 10);
}
