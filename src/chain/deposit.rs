//! Deposit contract views: `get_deposit_count()` and `get_deposit_root()`.

use sha2::{Digest, Sha256};

use super::DepositRecord;
use super::abi;

pub type Root = [u8; 32];

/// Depth of the deposit contract's incremental Merkle tree.
pub const DEPOSIT_TREE_DEPTH: usize = 32;

/// The deposit count as the contract stores it: 8 bytes, little-endian.
pub fn deposit_count(deposits: &[DepositRecord]) -> [u8; 8] {
    (deposits.len() as u64).to_le_bytes()
}

/// ABI-encode a deposit count as the `bytes` return value of `get_deposit_count()`.
pub fn pack_deposit_count(count: &[u8]) -> Vec<u8> {
    abi::encode_bytes_tuple(&[count])
}

/// Root of the deposit tree over `deposits`, with the deposit count mixed in.
pub fn deposit_root(deposits: &[DepositRecord]) -> Root {
    let zero = zero_hashes();
    let mut layer: Vec<Root> = deposits.iter().map(deposit_data_root).collect();

    for zero_at_depth in zero.iter().take(DEPOSIT_TREE_DEPTH) {
        if layer.len() % 2 == 1 {
            layer.push(*zero_at_depth);
        }
        layer = layer.chunks(2).map(|pair| hash(&pair[0], &pair[1])).collect();
    }

    let root = layer.first().copied().unwrap_or(zero[DEPOSIT_TREE_DEPTH]);
    mix_in_length(&root, deposits.len() as u64)
}

/// SSZ hash tree root of a single `DepositData` container.
pub fn deposit_data_root(deposit: &DepositRecord) -> Root {
    let pubkey = merkleize_bytes(&deposit.pubkey);
    let credentials = merkleize_bytes(&deposit.withdrawal_credentials);
    let mut amount = [0u8; 32];
    amount[..8].copy_from_slice(&deposit.amount.to_le_bytes());
    let signature = merkleize_bytes(&deposit.signature);

    hash(&hash(&pubkey, &credentials), &hash(&amount, &signature))
}

/// Merkleize a fixed-size byte vector: pack into 32-byte chunks, pad the chunk count to
/// a power of two with zero chunks, and hash pairwise up to a single root.
fn merkleize_bytes(bytes: &[u8]) -> Root {
    let mut layer: Vec<Root> = bytes
        .chunks(32)
        .map(|chunk| {
            let mut out = [0u8; 32];
            out[..chunk.len()].copy_from_slice(chunk);
            out
        })
        .collect();

    if layer.is_empty() {
        return [0u8; 32];
    }
    layer.resize(layer.len().next_power_of_two(), [0u8; 32]);

    while layer.len() > 1 {
        layer = layer.chunks(2).map(|pair| hash(&pair[0], &pair[1])).collect();
    }
    layer[0]
}

fn mix_in_length(root: &Root, length: u64) -> Root {
    let mut len = [0u8; 32];
    len[..8].copy_from_slice(&length.to_le_bytes());
    hash(root, &len)
}

fn zero_hashes() -> [Root; DEPOSIT_TREE_DEPTH + 1] {
    let mut zero = [[0u8; 32]; DEPOSIT_TREE_DEPTH + 1];
    for depth in 1..=DEPOSIT_TREE_DEPTH {
        zero[depth] = hash(&zero[depth - 1], &zero[depth - 1]);
    }
    zero
}

fn hash(left: &[u8], right: &[u8]) -> Root {
    let mut hasher = Sha256::new();
    hasher.update(left);
    hasher.update(right);
    hasher.finalize().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn deposits(n: u8) -> Vec<DepositRecord> {
        (0..n).map(|i| DepositRecord::from_secret(&[i; 32])).collect()
    }

    #[test]
    fn empty_tree_matches_deposit_contract_genesis_root() {
        let root = deposit_root(&[]);
        assert_eq!(
            hex::encode(root),
            "d70a234731285c6804c2a4f56711ddb8c82c99740f207854891028af34e27e5e"
        );
    }

    #[test]
    fn root_changes_with_every_added_deposit() {
        let all = deposits(4);
        let roots: Vec<Root> = (0..=all.len()).map(|n| deposit_root(&all[..n])).collect();

        for pair in roots.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
        assert_eq!(deposit_root(&all[..2]), deposit_root(&deposits(2)));
    }

    #[test]
    fn single_deposit_root_is_leaf_hashed_against_zero_subtrees() {
        let one = deposits(1);
        let zero = zero_hashes();

        let mut node = deposit_data_root(&one[0]);
        for sibling in zero.iter().take(DEPOSIT_TREE_DEPTH) {
            node = hash(&node, sibling);
        }

        assert_eq!(deposit_root(&one), mix_in_length(&node, 1));
    }

    #[test]
    fn deposit_count_is_little_endian() {
        assert_eq!(deposit_count(&deposits(3)), [3, 0, 0, 0, 0, 0, 0, 0]);
    }

    #[test]
    fn packed_count_is_abi_bytes() {
        let packed = pack_deposit_count(&deposit_count(&deposits(5)));
        assert_eq!(packed.len(), 96);
        assert_eq!(packed[31], 0x20);
        assert_eq!(packed[63], 8);
        assert_eq!(packed[64], 5);
    }
}
