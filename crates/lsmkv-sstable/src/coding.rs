//! Varint, fixed-width, and length-prefixed coding primitives, plus the checksum functions
//! used throughout the on-disk formats (blocks, the write-ahead log, and the manifest).

use integer_encoding::{VarInt, VarIntWriter};
use thiserror::Error;

/// A byte stream ended before a value it promised to contain could be fully decoded.
#[derive(Error, Debug, Clone, Copy, PartialEq, Eq)]
#[error("truncated or malformed encoding")]
pub struct BadEncoding;

pub fn put_varint32(out: &mut Vec<u8>, value: u32) {
    out.write_varint(value).expect("writing to a Vec never fails");
}

pub fn put_varint64(out: &mut Vec<u8>, value: u64) {
    out.write_varint(value).expect("writing to a Vec never fails");
}

pub fn get_varint32(input: &mut &[u8]) -> Result<u32, BadEncoding> {
    let (value, len) = u32::decode_var(input).ok_or(BadEncoding)?;
    *input = &input[len..];
    Ok(value)
}

pub fn get_varint64(input: &mut &[u8]) -> Result<u64, BadEncoding> {
    let (value, len) = u64::decode_var(input).ok_or(BadEncoding)?;
    *input = &input[len..];
    Ok(value)
}

pub fn put_fixed32(out: &mut Vec<u8>, value: u32) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn put_fixed64(out: &mut Vec<u8>, value: u64) {
    out.extend_from_slice(&value.to_le_bytes());
}

pub fn get_fixed32(input: &mut &[u8]) -> Result<u32, BadEncoding> {
    let bytes: [u8; 4] = input.get(..4).ok_or(BadEncoding)?.try_into().unwrap();
    *input = &input[4..];
    Ok(u32::from_le_bytes(bytes))
}

pub fn get_fixed64(input: &mut &[u8]) -> Result<u64, BadEncoding> {
    let bytes: [u8; 8] = input.get(..8).ok_or(BadEncoding)?.try_into().unwrap();
    *input = &input[8..];
    Ok(u64::from_le_bytes(bytes))
}

/// Writes a length-prefixed (varint32) byte slice.
pub fn put_length_prefixed_slice(out: &mut Vec<u8>, slice: &[u8]) {
    put_varint32(out, slice.len() as u32);
    out.extend_from_slice(slice);
}

/// Reads a length-prefixed (varint32) byte slice, returning the slice and the remaining input.
pub fn get_length_prefixed_slice<'a>(input: &mut &'a [u8]) -> Result<&'a [u8], BadEncoding> {
    let len = get_varint32(input)? as usize;
    let slice = input.get(..len).ok_or(BadEncoding)?;
    *input = &input[len..];
    Ok(slice)
}

/// CRC-32C (Castagnoli) over `data`.
#[must_use]
pub fn crc32c(data: &[u8]) -> u32 {
    crc32c::crc32c(data)
}

/// CRCs are masked before being stored on disk, rotating right by 15 bits and adding a
/// constant, so that CRCs of CRCs (e.g. a record consisting of only zero bytes) don't collide
/// with other common bit patterns found in log files.
const CRC_MASK_DELTA: u32 = 0xa282_ead8;

#[must_use]
pub fn mask_crc(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(CRC_MASK_DELTA)
}

#[must_use]
pub fn unmask_crc(masked: u32) -> u32 {
    masked.wrapping_sub(CRC_MASK_DELTA).rotate_left(15)
}

/// Length, in bytes, of the common prefix shared by `a` and `b`.
#[must_use]
pub fn common_prefix_len(a: &[u8], b: &[u8]) -> usize {
    a.iter().zip(b.iter()).take_while(|(x, y)| x == y).count()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn varint_round_trips() {
        for value in [0_u64, 1, 127, 128, 300, u32::MAX as u64, u64::MAX] {
            let mut buf = Vec::new();
            put_varint64(&mut buf, value);
            let mut slice = buf.as_slice();
            assert_eq!(get_varint64(&mut slice).unwrap(), value);
            assert!(slice.is_empty());
        }
    }

    #[test]
    fn truncated_varint_errors() {
        let buf = [0x80_u8]; // continuation bit set, but no following byte
        let mut slice = buf.as_slice();
        assert!(get_varint32(&mut slice).is_err());
    }

    #[test]
    fn crc_mask_round_trips() {
        let crc = crc32c(b"hello world");
        assert_eq!(unmask_crc(mask_crc(crc)), crc);
    }

    #[test]
    fn length_prefixed_slice_round_trips() {
        let mut buf = Vec::new();
        put_length_prefixed_slice(&mut buf, b"hello");
        put_length_prefixed_slice(&mut buf, b"world");
        let mut slice = buf.as_slice();
        assert_eq!(get_length_prefixed_slice(&mut slice).unwrap(), b"hello");
        assert_eq!(get_length_prefixed_slice(&mut slice).unwrap(), b"world");
        assert!(slice.is_empty());
    }
}
