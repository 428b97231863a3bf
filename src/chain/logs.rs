//! `DepositEvent` logs emitted by the deposit contract.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use super::header::block_hash;
use super::{DepositRecord, abi, to_hex, to_quantity};

/// Address the synthetic deposit contract is deployed at.
pub const DEPOSIT_CONTRACT_ADDRESS: &str = "0x4242424242424242424242424242424242424242";

/// keccak256("DepositEvent(bytes,bytes,bytes,bytes,bytes)")
pub const DEPOSIT_EVENT_TOPIC: &str =
    "0x649bbc62d0e31342afea4e5cd82d4049e7e1ee912fc0889aa790803be39038c5";

/// A log entry in JSON-RPC form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DepositLog {
    pub address: String,
    pub topics: Vec<String>,
    pub data: String,
    pub block_number: String,
    pub transaction_hash: String,
    pub transaction_index: String,
    pub block_hash: String,
    pub log_index: String,
    pub removed: bool,
}

/// Build one `DepositEvent` log per deposit, in order. Deposit `i` lands in block `i`.
pub fn deposit_event_logs(deposits: &[DepositRecord]) -> Vec<DepositLog> {
    deposits
        .iter()
        .enumerate()
        .map(|(index, deposit)| deposit_log(index as u64, deposit))
        .collect()
}

fn deposit_log(index: u64, deposit: &DepositRecord) -> DepositLog {
    let amount = deposit.amount.to_le_bytes();
    let merkle_index = index.to_le_bytes();
    let data = abi::encode_bytes_tuple(&[
        &deposit.pubkey,
        &deposit.withdrawal_credentials,
        &amount,
        &deposit.signature,
        &merkle_index,
    ]);

    let mut tx = Sha256::new();
    tx.update(b"eth1-mock-rpc deposit");
    tx.update(index.to_be_bytes());
    let transaction_hash: [u8; 32] = tx.finalize().into();

    DepositLog {
        address: DEPOSIT_CONTRACT_ADDRESS.to_string(),
        topics: vec![DEPOSIT_EVENT_TOPIC.to_string()],
        data: to_hex(&data),
        block_number: to_quantity(index),
        transaction_hash: to_hex(&transaction_hash),
        transaction_index: to_quantity(0),
        block_hash: to_hex(&block_hash(index)),
        log_index: to_quantity(0),
        removed: false,
    }
}
