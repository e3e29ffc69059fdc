//! Payload <-> block conversion.
//!
//! Tags have no length field, so the payload length is recovered on read by
//! trimming the zero padding added on write. A payload that really ends in a
//! zero byte loses that byte, and an all-zero block inside a payload ends a
//! read early. Both are logged on write and otherwise accepted.

use crate::error::TagError;

/// Bytes per NTAG page.
pub const BLOCK_SIZE: usize = 4;

pub type Block = [u8; BLOCK_SIZE];

/// All-zero block, used for clearing and as the end-of-data marker.
pub const EMPTY_BLOCK: Block = [0; BLOCK_SIZE];

/// A payload cut into zero-padded blocks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Encoded {
    pub blocks: Vec<Block>,
    /// Length of the payload before padding.
    pub original_len: usize,
}

impl Encoded {
    pub fn padded_len(&self) -> usize {
        self.blocks.len() * BLOCK_SIZE
    }

    pub fn padding(&self) -> usize {
        self.padded_len() - self.original_len
    }

    /// Index of the first all-zero block, if the payload itself contains one.
    ///
    /// Reads stop at such a block, so everything from there on is lost.
    pub fn interior_terminator(&self) -> Option<usize> {
        self.blocks.iter().position(is_terminator)
    }
}

pub fn encode(payload: &[u8]) -> Encoded {
    let blocks = payload
        .chunks(BLOCK_SIZE)
        .map(|chunk| {
            let mut block = EMPTY_BLOCK;
            block[..chunk.len()].copy_from_slice(chunk);
            block
        })
        .collect();

    Encoded {
        blocks,
        original_len: payload.len(),
    }
}

/// Concatenate blocks in address order and strip the trailing zero padding.
///
/// No blocks at all is `NoDataFound`; blocks that trim down to nothing is
/// `AllZero`.
pub fn decode(blocks: &[Block]) -> Result<Vec<u8>, TagError> {
    if blocks.is_empty() {
        return Err(TagError::NoDataFound);
    }

    let mut data: Vec<u8> = blocks.iter().flatten().copied().collect();
    let end = data.iter().rposition(|&b| b != 0).map_or(0, |i| i + 1);
    data.truncate(end);

    if data.is_empty() {
        return Err(TagError::AllZero);
    }
    Ok(data)
}

pub fn is_terminator(block: &Block) -> bool {
    *block == EMPTY_BLOCK
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pads_to_block_boundary() {
        let encoded = encode(b"hello");
        assert_eq!(encoded.blocks, vec![*b"hell", [b'o', 0, 0, 0]]);
        assert_eq!(encoded.original_len, 5);
        assert_eq!(encoded.padded_len(), 8);
        assert_eq!(encoded.padding(), 3);
    }

    #[test]
    fn aligned_payload_gets_no_padding() {
        let encoded = encode(&[1, 2, 3, 4, 5, 6, 7, 8]);
        assert_eq!(encoded.blocks.len(), 2);
        assert_eq!(encoded.padding(), 0);
    }

    #[test]
    fn padding_is_always_less_than_a_block() {
        for len in 0..=33usize {
            let payload: Vec<u8> = (1..=len).map(|i| i as u8).collect();
            let encoded = encode(&payload);
            assert!(encoded.padded_len() >= len);
            assert!(encoded.padded_len() - len < BLOCK_SIZE);
        }
    }

    #[test]
    fn empty_payload_encodes_to_nothing() {
        let encoded = encode(&[]);
        assert!(encoded.blocks.is_empty());
        assert_eq!(encoded.padded_len(), 0);
    }

    #[test]
    fn decode_reverses_encode() {
        for len in 1..=33usize {
            // no zero bytes, so trimming cannot eat payload
            let payload: Vec<u8> = (1..=len).map(|i| (i % 255) as u8 + 1).collect();
            assert_eq!(decode(&encode(&payload).blocks).unwrap(), payload, "len {len}");
        }
        let json = b"{\"id\":\"x\"}";
        assert_eq!(decode(&encode(json).blocks).unwrap(), json);
    }

    #[test]
    fn decode_strips_terminator_block() {
        let blocks = [*b"abcd", [b'e', 0, 0, 0], EMPTY_BLOCK];
        assert_eq!(decode(&blocks).unwrap(), b"abcde");
    }

    #[test]
    fn decode_keeps_interior_zero_bytes() {
        let blocks = [[b'a', 0, b'b', 0], [0, 0, 0, 0]];
        assert_eq!(decode(&blocks).unwrap(), vec![b'a', 0, b'b']);
    }

    #[test]
    fn trailing_zero_byte_is_lost() {
        let payload = [1, 2, 0];
        assert_eq!(decode(&encode(&payload).blocks).unwrap(), vec![1, 2]);
    }

    #[test]
    fn no_blocks_is_no_data_found() {
        assert!(matches!(decode(&[]), Err(TagError::NoDataFound)));
    }

    #[test]
    fn all_zero_blocks_are_all_zero() {
        assert!(matches!(decode(&[EMPTY_BLOCK]), Err(TagError::AllZero)));
        assert!(matches!(
            decode(&[EMPTY_BLOCK, EMPTY_BLOCK]),
            Err(TagError::AllZero)
        ));
    }

    #[test]
    fn finds_interior_terminator() {
        let mut payload = b"abcd".to_vec();
        payload.extend_from_slice(&[0, 0, 0, 0]);
        payload.extend_from_slice(b"efgh");
        assert_eq!(encode(&payload).interior_terminator(), Some(1));
        assert_eq!(encode(b"abcdefgh").interior_terminator(), None);
    }
}
