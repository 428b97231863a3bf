//! Synthetic block headers.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::{to_hex, to_quantity};

/// Block number of the fixed header returned for `eth_getBlockByNumber`.
pub const FIXED_BLOCK_NUMBER: u64 = 0;

/// Seconds between synthetic chain heads.
pub const SECONDS_PER_BLOCK: u64 = 14;

const GAS_LIMIT: u64 = 30_000_000;
const LOGS_BLOOM_LEN: usize = 256;

/// An Ethereum block header in JSON-RPC form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BlockHeader {
    pub parent_hash: String,
    pub sha3_uncles: String,
    pub miner: String,
    pub state_root: String,
    pub transactions_root: String,
    pub receipts_root: String,
    pub logs_bloom: String,
    pub difficulty: String,
    pub number: String,
    pub gas_limit: String,
    pub gas_used: String,
    pub timestamp: String,
    pub extra_data: String,
    pub mix_hash: String,
    pub nonce: String,
    pub hash: String,
}

/// Deterministic hash of the synthetic block at `number`.
pub fn block_hash(number: u64) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(b"eth1-mock-rpc block");
    hasher.update(number.to_be_bytes());
    hasher.finalize().into()
}

fn header(number: u64, timestamp: u64) -> BlockHeader {
    let parent = number.checked_sub(1).map(block_hash).unwrap_or([0u8; 32]);
    let zero = to_hex(&[0u8; 32]);

    BlockHeader {
        parent_hash: to_hex(&parent),
        sha3_uncles: zero.clone(),
        miner: to_hex(&[0u8; 20]),
        state_root: zero.clone(),
        transactions_root: zero.clone(),
        receipts_root: zero.clone(),
        logs_bloom: to_hex(&[0u8; LOGS_BLOOM_LEN]),
        difficulty: to_quantity(1),
        number: to_quantity(number),
        gas_limit: to_quantity(GAS_LIMIT),
        gas_used: to_quantity(0),
        timestamp: to_quantity(timestamp),
        extra_data: "0x".to_string(),
        mix_hash: zero,
        nonce: to_hex(&[0u8; 8]),
        hash: to_hex(&block_hash(number)),
    }
}

/// The header served for every `eth_getBlockByNumber` request.
pub fn header_by_number() -> BlockHeader {
    header(FIXED_BLOCK_NUMBER, 0)
}

/// The header served for every `eth_getBlockByHash` request, stamped with the genesis time.
pub fn header_by_hash(genesis_time: u64) -> BlockHeader {
    header(FIXED_BLOCK_NUMBER, genesis_time)
}

/// The chain head pushed to subscribers after `block_num` earlier heads.
pub fn latest_chain_head(block_num: u64) -> BlockHeader {
    header(block_num, block_num * SECONDS_PER_BLOCK)
}
