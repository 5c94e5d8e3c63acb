//! Minimal BER-TLV length handling
//!
//! Only what the OTA envelope and the GlobalPlatform data fields need: definite
//! lengths in short form below 128 and long form (`80 + n` followed by `n`
//! big-endian length bytes) otherwise.

use bytes::{BufMut, BytesMut};

/// Encode a length value into BER-TLV format
///
/// The long form uses the minimal big-endian encoding of `length`.
pub fn encode_length(length: usize) -> Vec<u8> {
    if length < 0x80 {
        return vec![length as u8];
    }

    let bytes = length.to_be_bytes();
    let skip = bytes.iter().take_while(|b| **b == 0).count();
    let significant = &bytes[skip..];

    let mut out = Vec::with_capacity(1 + significant.len());
    out.push(0x80 | significant.len() as u8);
    out.extend_from_slice(significant);
    out
}

/// Decode a BER-TLV length, returning the length and the number of bytes it occupied
///
/// Returns `None` for truncated input, the indefinite form, or a length that
/// does not fit in `usize`.
pub fn decode_length(input: &[u8]) -> Option<(usize, usize)> {
    let first = *input.first()?;
    if first < 0x80 {
        return Some((first as usize, 1));
    }

    let count = (first & 0x7F) as usize;
    if count == 0 || count > size_of::<usize>() {
        return None;
    }
    let bytes = input.get(1..1 + count)?;
    let length = bytes.iter().fold(0usize, |acc, b| (acc << 8) | *b as usize);
    Some((length, 1 + count))
}

/// Build `tag ++ length ++ value`
pub fn wrap(tag: &[u8], value: &[u8]) -> Vec<u8> {
    let length = encode_length(value.len());
    let mut buf = BytesMut::with_capacity(tag.len() + length.len() + value.len());
    buf.put_slice(tag);
    buf.put_slice(&length);
    buf.put_slice(value);
    buf.to_vec()
}
