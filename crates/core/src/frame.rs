//! Length-prefixed framing.
//!
//! A frame is a variable-length header carrying a `usize`, followed by
//! that many payload bytes. The header uses 7-bit little-endian groups
//! with a continuation bit, so small values (the common case: bucket
//! counters, short sort-keys) cost a single byte.
//!
//! Buckets use the bare header as their prefix; versioned payloads use
//! the two-field pair frame so the version marker and the body can be
//! split back out unambiguously.

use crate::codec::CodecError;

/// Encode `value` as a variable-length header.
pub fn encode_header(mut value: usize) -> Vec<u8> {
    let mut out = Vec::with_capacity(2);
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return out;
        }
        out.push(byte | 0x80);
    }
}

/// Decode a header from the front of `data`.
///
/// Returns `(value, header_len)`. Fails with [`CodecError::Truncated`]
/// when the continuation bit runs past the end of the input.
pub fn decode_header(data: &[u8]) -> Result<(usize, usize), CodecError> {
    let mut value = 0usize;
    let mut shift = 0u32;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7f) as usize) << shift;
        if byte & 0x80 == 0 {
            return Ok((value, i + 1));
        }
        shift += 7;
        if shift >= usize::BITS {
            return Err(CodecError::Malformed("frame header overflows usize"));
        }
    }
    Err(CodecError::Truncated)
}

/// Frame `data` with its own length header.
pub fn encode(data: &[u8]) -> Vec<u8> {
    let mut out = encode_header(data.len());
    out.extend_from_slice(data);
    out
}

/// Split one frame from the front of `data`.
///
/// Returns the payload and the remaining bytes after it.
pub fn decode(data: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    let (len, header) = decode_header(data)?;
    let rest = &data[header..];
    if rest.len() < len {
        return Err(CodecError::Truncated);
    }
    Ok((&rest[..len], &rest[len..]))
}

/// Frame two fields into one buffer.
pub fn encode_pair(a: &[u8], b: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(a.len() + b.len() + 4);
    out.extend_from_slice(&encode_header(a.len()));
    out.extend_from_slice(a);
    out.extend_from_slice(&encode_header(b.len()));
    out.extend_from_slice(b);
    out
}

/// Split a pair frame back into its two fields.
///
/// Trailing bytes after the second field are malformed input.
pub fn decode_pair(data: &[u8]) -> Result<(&[u8], &[u8]), CodecError> {
    let (a, rest) = decode(data)?;
    let (b, rest) = decode(rest)?;
    if !rest.is_empty() {
        return Err(CodecError::Malformed("trailing bytes after pair frame"));
    }
    Ok((a, b))
}
