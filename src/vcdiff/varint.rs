// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, most-significant group first.  Every byte except the last has
// bit 7 set.  Window header fields, instruction sizes and COPY addresses all
// use this encoding.

use std::io::{self, Read, Write};

use thiserror::Error;

/// Longest encoding of a `u64` (ceil(64 / 7)).
pub const MAX_VARINT_LEN: usize = 10;

/// If any of these bits are set before a shift, `<< 7` would lose data.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum VarIntError {
    /// Input ended before the terminating byte.  During interleaved decoding
    /// this only means more bytes are needed.
    #[error("varint underflow (truncated input)")]
    Underflow,
    #[error("varint overflow")]
    Overflow,
}

impl From<VarIntError> for io::Error {
    fn from(e: VarIntError) -> io::Error {
        io::Error::new(io::ErrorKind::InvalidData, e)
    }
}

/// Encode `num` right-aligned into `buf`, returning the encoded length.
/// The encoding occupies `buf[MAX_VARINT_LEN - len..]`.
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = MAX_VARINT_LEN;
    loop {
        i -= 1;
        buf[i] = (num as u8 & 0x7F) | 0x80;
        num >>= 7;
        if num == 0 {
            break;
        }
    }
    buf[MAX_VARINT_LEN - 1] &= 0x7F;
    MAX_VARINT_LEN - i
}

/// Append the encoding of `num` to an in-memory section.
#[inline]
pub fn push_u64(out: &mut Vec<u8>, num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    out.extend_from_slice(&buf[MAX_VARINT_LEN - len..]);
}

pub fn write_u64<W: Write>(w: &mut W, num: u64) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_u64(num, &mut buf);
    w.write_all(&buf[MAX_VARINT_LEN - len..])
}

/// Decode from the front of `data`, returning `(value, bytes_consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow);
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Decode a value that must fit in 32 bits (instruction sizes).
pub fn read_u32(data: &[u8]) -> Result<(u32, usize), VarIntError> {
    let (val, len) = read_u64(data)?;
    let val = u32::try_from(val).map_err(|_| VarIntError::Overflow)?;
    Ok((val, len))
}

/// Read one varint from a byte stream (window headers).
pub fn stream_read_u64<R: Read>(r: &mut R) -> io::Result<u64> {
    let mut val: u64 = 0;
    let mut byte = [0u8; 1];
    loop {
        r.read_exact(&mut byte)?;
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(VarIntError::Overflow.into());
        }
        val = (val << 7) | u64::from(byte[0] & 0x7F);
        if byte[0] & 0x80 == 0 {
            return Ok(val);
        }
    }
}

/// Encoded length of `num` in bytes.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}
