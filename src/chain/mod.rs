//! Synthetic chain state served by the mock.
//!
//! Everything here is deterministic: the same deposit records always produce the
//! same logs, headers and roots, so a client under test sees a stable chain.
//!
//! ## Layout
//!
//! - `keystore`: loads deposit records from a (synthetic) encrypted keystore directory
//! - `cache`: JSON persistence of loaded records
//! - `logs`: `DepositEvent` logs as returned by `eth_getLogs`
//! - `header`: block headers and chain heads
//! - `deposit`: deposit count and deposit root as returned by `eth_call`
//! - `abi`: the small slice of ABI encoding the above need

pub mod abi;
pub mod cache;
pub mod deposit;
pub mod header;
pub mod keystore;
pub mod logs;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

pub use deposit::{deposit_count, deposit_root, pack_deposit_count};
pub use header::{BlockHeader, header_by_hash, header_by_number, latest_chain_head};
pub use logs::{DepositLog, deposit_event_logs};

/// Function selector of `get_deposit_count()` on the deposit contract.
pub const DEPOSIT_COUNT_SELECTOR: &str = "621fd130";

/// Function selector of `get_deposit_root()` on the deposit contract.
pub const DEPOSIT_ROOT_SELECTOR: &str = "c5f2892f";

/// A full validator deposit: 32 ETH, denominated in gwei.
pub const DEPOSIT_AMOUNT_GWEI: u64 = 32_000_000_000;

pub const PUBKEY_LEN: usize = 48;
pub const SIGNATURE_LEN: usize = 96;

/// Prefix byte of BLS withdrawal credentials.
const BLS_WITHDRAWAL_PREFIX: u8 = 0x00;

/// One validator deposit, as it would appear in a deposit contract call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepositRecord {
    #[serde(with = "hex_bytes")]
    pub pubkey: Vec<u8>,
    #[serde(with = "hex_bytes")]
    pub withdrawal_credentials: Vec<u8>,
    pub amount: u64,
    #[serde(with = "hex_bytes")]
    pub signature: Vec<u8>,
}

impl DepositRecord {
    /// Derive a deposit from a validator secret.
    ///
    /// The public key and signature are pseudo-random expansions of the secret, not
    /// real BLS values. Clients of the mock only check their shape.
    pub fn from_secret(secret: &[u8; 32]) -> Self {
        let pubkey = expand(secret, "eth1-mock-rpc 2024 validator pubkey", PUBKEY_LEN);
        let signature = expand(secret, "eth1-mock-rpc 2024 deposit signature", SIGNATURE_LEN);

        let mut withdrawal_credentials: Vec<u8> = Sha256::digest(&pubkey).to_vec();
        withdrawal_credentials[0] = BLS_WITHDRAWAL_PREFIX;

        Self {
            pubkey,
            withdrawal_credentials,
            amount: DEPOSIT_AMOUNT_GWEI,
            signature,
        }
    }
}

fn expand(secret: &[u8; 32], context: &str, len: usize) -> Vec<u8> {
    let key = blake3::derive_key(context, secret);
    let mut out = vec![0u8; len];
    blake3::Hasher::new_keyed(&key)
        .finalize_xof()
        .fill(&mut out);
    out
}

/// Format bytes as a `0x`-prefixed hex string.
pub fn to_hex(bytes: &[u8]) -> String {
    format!("0x{}", hex::encode(bytes))
}

/// Format an integer as an Ethereum JSON-RPC quantity (`0x` hex, no leading zeros).
pub fn to_quantity(value: u64) -> String {
    format!("{:#x}", value)
}

/// Serde adapter for `0x`-prefixed hex byte strings.
mod hex_bytes {
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&super::to_hex(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<u8>, D::Error> {
        let s = String::deserialize(deserializer)?;
        hex::decode(s.trim_start_matches("0x")).map_err(D::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deposit_from_secret_is_deterministic() {
        let a = DepositRecord::from_secret(&[7u8; 32]);
        let b = DepositRecord::from_secret(&[7u8; 32]);
        let c = DepositRecord::from_secret(&[8u8; 32]);

        assert_eq!(a, b);
        assert_ne!(a.pubkey, c.pubkey);
        assert_eq!(a.pubkey.len(), PUBKEY_LEN);
        assert_eq!(a.signature.len(), SIGNATURE_LEN);
        assert_eq!(a.withdrawal_credentials.len(), 32);
        assert_eq!(a.withdrawal_credentials[0], 0x00);
        assert_eq!(a.amount, DEPOSIT_AMOUNT_GWEI);
    }

    #[test]
    fn deposit_serializes_bytes_as_hex() {
        let deposit = DepositRecord::from_secret(&[1u8; 32]);
        let json = serde_json::to_value(&deposit).unwrap();

        let pubkey = json["pubkey"].as_str().unwrap();
        assert!(pubkey.starts_with("0x"));
        assert_eq!(pubkey.len(), 2 + PUBKEY_LEN * 2);

        let back: DepositRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back, deposit);
    }

    #[test]
    fn quantity_has_no_leading_zeros() {
        assert_eq!(to_quantity(0), "0x0");
        assert_eq!(to_quantity(255), "0xff");
    }
}
