//! Header normalization and proof-of-work through the public API

use spv_chain::header::{RpcHeaderRecord, WireHeaderRecord};
use spv_chain::*;

#[test]
fn test_regtest_genesis_in_all_shapes() {
    let genesis = genesis_header(Network::Regtest);
    let wire_json = serde_json::to_string(&WireHeaderRecord::from(&genesis)).unwrap();
    let rpc_json = serde_json::to_string(&RpcHeaderRecord::from(&genesis)).unwrap();

    assert!(!rpc_json.contains("previousblockhash"));
    assert_eq!(normalize_header(HeaderRecord::from_json(&wire_json).unwrap()).unwrap(), genesis);
    assert_eq!(normalize_header(HeaderRecord::from_json(&rpc_json).unwrap()).unwrap(), genesis);
    assert_eq!(normalize_header(genesis.to_hex()).unwrap(), genesis);
    assert_eq!(normalize_header(genesis.to_bytes()).unwrap(), genesis);
}

#[test]
fn test_record_hashes_are_display_order() {
    let parent = genesis_header(Network::Testnet);
    let child = BlockHeader::new(1, parent.hash(), [0x11; 32], parent.time() + 60, parent.bits(), 7);
    let value = serde_json::json!({
        "version": 1,
        "previousblockhash": parent.hash().to_hex(),
        "merkleroot": get_corrected_hash(&[0x11; 32]),
        "time": parent.time() + 60,
        "bits": format!("{:08x}", parent.bits()),
        "nonce": 7,
        "height": 1,
        "confirmations": 12
    });
    let header = normalize_header(HeaderRecord::from_value(value).unwrap()).unwrap();
    assert_eq!(header, child);
    assert!(header.is_child_of(&parent));
}

#[test]
fn test_unrecognized_record_is_decode_error() {
    let result = HeaderRecord::from_value(serde_json::json!({ "hash": "00", "height": 3 }));
    assert!(matches!(result, Err(SpvError::Decode(_))));
}

#[test]
fn test_bad_hash_field_is_decode_error() {
    let mut record = WireHeaderRecord::from(&genesis_header(Network::Devnet));
    record.prev_hash = "abcd".to_string();
    assert!(matches!(normalize_header(record), Err(SpvError::Decode(_))));
}

#[test]
fn test_block_hash_display_roundtrip() {
    let hash = genesis_header(Network::Mainnet).hash();
    let parsed: BlockHash = hash.to_string().parse().unwrap();
    assert_eq!(parsed, hash);
    assert_eq!(get_corrected_hash(hash.as_wire()), hash.to_hex());
}

#[test]
fn test_target_zero_prefix_tracks_exponent() {
    for exponent in 4u32..=32 {
        let bits = (exponent << 24) | 0x00ff_ffff;
        let target = expand_target(bits).unwrap();
        let zeros = 32 - exponent as usize;
        assert!(target[..zeros].iter().all(|b| *b == 0), "exponent {exponent}");
        assert_eq!(target[zeros], 0x7f, "exponent {exponent}");
    }
    for exponent in [0u32, 1, 2, 3, 33, 0xff] {
        assert!(expand_target(exponent << 24 | 0x0000_ffff).is_err());
    }
}

#[test]
fn test_mainnet_genesis_target() {
    let target = expand_target(genesis_header(Network::Mainnet).bits()).unwrap();
    assert_eq!(&target[..2], &[0, 0]);
    assert_eq!(&target[2..6], &[0x0f, 0xff, 0xf0, 0x00]);
}
