//! Minimal Solidity ABI encoding for tuples of dynamic `bytes`.

const WORD: usize = 32;

/// ABI-encode a tuple whose members are all `bytes`.
///
/// The head holds one offset per member; the tail holds each member as a length word
/// followed by its data right-padded to a word boundary.
pub fn encode_bytes_tuple(items: &[&[u8]]) -> Vec<u8> {
    let mut head = Vec::with_capacity(items.len() * WORD);
    let mut tail = Vec::new();
    let head_len = items.len() * WORD;

    for item in items {
        head.extend_from_slice(&word((head_len + tail.len()) as u64));
        tail.extend_from_slice(&word(item.len() as u64));
        tail.extend_from_slice(item);
        tail.resize(tail.len() + padding(item.len()), 0);
    }

    head.extend_from_slice(&tail);
    head
}

/// A big-endian, left-padded 32-byte word.
fn word(value: u64) -> [u8; WORD] {
    let mut out = [0u8; WORD];
    out[WORD - 8..].copy_from_slice(&value.to_be_bytes());
    out
}

fn padding(len: usize) -> usize {
    (WORD - len % WORD) % WORD
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encodes_single_bytes_member() {
        let encoded = encode_bytes_tuple(&[&[0x03, 0, 0, 0, 0, 0, 0, 0]]);

        assert_eq!(encoded.len(), 3 * WORD);
        assert_eq!(encoded[WORD - 1], 0x20, "offset of first member");
        assert_eq!(encoded[2 * WORD - 1], 8, "length of first member");
        assert_eq!(encoded[2 * WORD], 0x03);
        assert!(encoded[2 * WORD + 1..].iter().all(|b| *b == 0));
    }

    #[test]
    fn offsets_account_for_padded_members() {
        let first = [0xaau8; 48];
        let second = [0xbbu8; 8];
        let encoded = encode_bytes_tuple(&[&first, &second]);

        // head (2 words) + first (len word + 2 data words) + second (len word + 1 data word)
        assert_eq!(encoded.len(), 7 * WORD);
        assert_eq!(encoded[WORD - 1], 0x40);
        assert_eq!(encoded[2 * WORD - 1], 0x40 + 3 * WORD as u8);
    }
}
