//! Variable-length quantity integers and fixed-width primitives.
//!
//! S7comm-plus encodes most integers as big-endian groups of 7 bits. Every
//! byte except the last carries the continuation bit `0x80`:
//!
//! | Value | Encoding |
//! |-------|----------|
//! | `0`   | `00` |
//! | `127` | `7F` |
//! | `128` | `81 00` |
//!
//! Signed values keep the sign in bit 6 of the first group. 32-bit values
//! use at most five groups. 64-bit values use at most eight standard groups;
//! a value that does not fit in 56 bits (unsigned) or 55 bits plus sign
//! (signed) is written as eight groups that all carry the continuation bit,
//! followed by one raw byte holding the low eight bits.
//!
//! All decoders return the value together with the number of bytes
//! consumed. A short read surfaces as
//! [`DecodeError::UnexpectedEndOfStream`].
//!
//! # Example
//!
//! ```
//! use s7commplus::vlq;
//!
//! let mut buf = Vec::new();
//! vlq::encode_u32(&mut buf, 128).unwrap();
//! assert_eq!(buf, [0x81, 0x00]);
//!
//! let (value, len) = vlq::decode_u32(&mut &buf[..]).unwrap();
//! assert_eq!((value, len), (128, 2));
//! ```

use std::io::{self, Read, Write};

use crate::error::DecodeError;

/// Result of a decode operation.
pub type DecodeResult<T> = std::result::Result<T, DecodeError>;

const CONTINUATION: u8 = 0x80;
const GROUP_MASK: u8 = 0x7F;
const SIGN_BIT: u8 = 0x40;

const MAX_GROUPS_32: usize = 5;
const MAX_GROUPS_64: usize = 8;

/// Encodes an unsigned 32-bit VLQ and returns the number of bytes written.
pub fn encode_u32<W: Write + ?Sized>(w: &mut W, value: u32) -> io::Result<usize> {
    encode_unsigned(w, u64::from(value), MAX_GROUPS_32)
}

/// Encodes a signed 32-bit VLQ and returns the number of bytes written.
pub fn encode_i32<W: Write + ?Sized>(w: &mut W, value: i32) -> io::Result<usize> {
    encode_signed(w, i64::from(value), MAX_GROUPS_32)
}

/// Encodes an unsigned 64-bit VLQ and returns the number of bytes written.
pub fn encode_u64<W: Write + ?Sized>(w: &mut W, value: u64) -> io::Result<usize> {
    if value >> 56 == 0 {
        return encode_unsigned(w, value, MAX_GROUPS_64);
    }
    let high = value >> 8;
    let mut buf = [0u8; 9];
    for (i, slot) in buf.iter_mut().take(MAX_GROUPS_64).enumerate() {
        let shift = 7 * (MAX_GROUPS_64 - 1 - i);
        *slot = ((high >> shift) as u8 & GROUP_MASK) | CONTINUATION;
    }
    buf[8] = value as u8;
    w.write_all(&buf)?;
    Ok(buf.len())
}

/// Encodes a signed 64-bit VLQ and returns the number of bytes written.
pub fn encode_i64<W: Write + ?Sized>(w: &mut W, value: i64) -> io::Result<usize> {
    if value.unsigned_abs() < 1 << 55 {
        return encode_signed(w, value, MAX_GROUPS_64);
    }
    let high = value >> 8;
    let mut buf = [0u8; 9];
    for (i, slot) in buf.iter_mut().take(MAX_GROUPS_64).enumerate() {
        let shift = 7 * (MAX_GROUPS_64 - 1 - i);
        *slot = ((high >> shift) as u8 & GROUP_MASK) | CONTINUATION;
    }
    buf[8] = value as u8;
    w.write_all(&buf)?;
    Ok(buf.len())
}

fn encode_unsigned<W: Write + ?Sized>(w: &mut W, value: u64, max_groups: usize) -> io::Result<usize> {
    let mut groups = 1;
    while groups < max_groups && value >> (7 * groups) != 0 {
        groups += 1;
    }
    write_groups(w, groups, |shift| (value >> shift) as u8)
}

fn encode_signed<W: Write + ?Sized>(w: &mut W, value: i64, max_groups: usize) -> io::Result<usize> {
    // Group count follows the magnitude, not the two's complement width.
    let mut magnitude = value.unsigned_abs();
    let mut groups = 1;
    while groups < max_groups && magnitude >= u64::from(SIGN_BIT) {
        magnitude >>= 7;
        groups += 1;
    }
    write_groups(w, groups, |shift| (value >> shift) as u8)
}

fn write_groups<W, F>(w: &mut W, groups: usize, group_at: F) -> io::Result<usize>
where
    W: Write + ?Sized,
    F: Fn(usize) -> u8,
{
    let mut buf = [0u8; MAX_GROUPS_64];
    for (i, slot) in buf.iter_mut().take(groups).enumerate() {
        let mut byte = group_at(7 * (groups - 1 - i)) & GROUP_MASK;
        if i + 1 < groups {
            byte |= CONTINUATION;
        }
        *slot = byte;
    }
    w.write_all(&buf[..groups])?;
    Ok(groups)
}

/// Decodes an unsigned 32-bit VLQ.
///
/// # Errors
///
/// Returns `DecodeError::VlqOverflow` if the groups do not fit in 32 bits.
pub fn decode_u32<R: Read + ?Sized>(r: &mut R) -> DecodeResult<(u32, usize)> {
    let mut value: u64 = 0;
    for consumed in 1..=MAX_GROUPS_32 {
        let byte = read_u8(r)?;
        value = (value << 7) | u64::from(byte & GROUP_MASK);
        if byte & CONTINUATION == 0 {
            let value = u32::try_from(value).map_err(|_| DecodeError::VlqOverflow { width: 32 })?;
            return Ok((value, consumed));
        }
    }
    Err(DecodeError::VlqOverflow { width: 32 })
}

/// Decodes a signed 32-bit VLQ.
pub fn decode_i32<R: Read + ?Sized>(r: &mut R) -> DecodeResult<(i32, usize)> {
    let (value, consumed, more) = decode_signed_groups(r, MAX_GROUPS_32)?;
    if more {
        return Err(DecodeError::VlqOverflow { width: 32 });
    }
    let value = i32::try_from(value).map_err(|_| DecodeError::VlqOverflow { width: 32 })?;
    Ok((value, consumed))
}

/// Decodes an unsigned 64-bit VLQ, including the nine byte form.
pub fn decode_u64<R: Read + ?Sized>(r: &mut R) -> DecodeResult<(u64, usize)> {
    let mut value: u64 = 0;
    for consumed in 1..=MAX_GROUPS_64 {
        let byte = read_u8(r)?;
        value = (value << 7) | u64::from(byte & GROUP_MASK);
        if byte & CONTINUATION == 0 {
            return Ok((value, consumed));
        }
    }
    let last = read_u8(r)?;
    Ok(((value << 8) | u64::from(last), MAX_GROUPS_64 + 1))
}

/// Decodes a signed 64-bit VLQ, including the nine byte form.
pub fn decode_i64<R: Read + ?Sized>(r: &mut R) -> DecodeResult<(i64, usize)> {
    let (value, consumed, more) = decode_signed_groups(r, MAX_GROUPS_64)?;
    if !more {
        return Ok((value, consumed));
    }
    let last = read_u8(r)?;
    Ok(((value << 8) | i64::from(last), consumed + 1))
}

/// Reads up to `max_groups` groups; the flag reports a continuation bit left
/// set on the final group.
fn decode_signed_groups<R: Read + ?Sized>(
    r: &mut R,
    max_groups: usize,
) -> DecodeResult<(i64, usize, bool)> {
    let first = read_u8(r)?;
    let mut value = i64::from(first & (SIGN_BIT - 1));
    if first & SIGN_BIT != 0 {
        value -= i64::from(SIGN_BIT);
    }
    let mut consumed = 1;
    let mut more = first & CONTINUATION != 0;
    while more && consumed < max_groups {
        let byte = read_u8(r)?;
        consumed += 1;
        value = (value << 7) | i64::from(byte & GROUP_MASK);
        more = byte & CONTINUATION != 0;
    }
    Ok((value, consumed, more))
}

/// Reads one byte.
pub fn read_u8<R: Read + ?Sized>(r: &mut R) -> DecodeResult<u8> {
    let mut buf = [0u8; 1];
    r.read_exact(&mut buf)?;
    Ok(buf[0])
}

/// Reads a big-endian `u16`.
pub fn read_u16<R: Read + ?Sized>(r: &mut R) -> DecodeResult<u16> {
    let mut buf = [0u8; 2];
    r.read_exact(&mut buf)?;
    Ok(u16::from_be_bytes(buf))
}

/// Reads a big-endian `u32`.
pub fn read_u32<R: Read + ?Sized>(r: &mut R) -> DecodeResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_be_bytes(buf))
}

/// Reads a little-endian `u32` (used by the tag description lists).
pub fn read_u32_le<R: Read + ?Sized>(r: &mut R) -> DecodeResult<u32> {
    let mut buf = [0u8; 4];
    r.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

/// Reads a big-endian `u64`.
pub fn read_u64<R: Read + ?Sized>(r: &mut R) -> DecodeResult<u64> {
    let mut buf = [0u8; 8];
    r.read_exact(&mut buf)?;
    Ok(u64::from_be_bytes(buf))
}

/// Reads exactly `len` bytes.
pub fn read_bytes<R: Read + ?Sized>(r: &mut R, len: usize) -> DecodeResult<Vec<u8>> {
    // Grow from the stream instead of trusting `len` for the allocation.
    let mut buf = Vec::new();
    let read = r.take(len as u64).read_to_end(&mut buf)?;
    if read != len {
        return Err(DecodeError::UnexpectedEndOfStream);
    }
    Ok(buf)
}

/// Writes one byte.
pub fn write_u8<W: Write + ?Sized>(w: &mut W, value: u8) -> io::Result<usize> {
    w.write_all(&[value])?;
    Ok(1)
}

/// Writes a big-endian `u16`.
pub fn write_u16<W: Write + ?Sized>(w: &mut W, value: u16) -> io::Result<usize> {
    w.write_all(&value.to_be_bytes())?;
    Ok(2)
}

/// Writes a big-endian `u32`.
pub fn write_u32<W: Write + ?Sized>(w: &mut W, value: u32) -> io::Result<usize> {
    w.write_all(&value.to_be_bytes())?;
    Ok(4)
}

/// Writes a little-endian `u32`.
pub fn write_u32_le<W: Write + ?Sized>(w: &mut W, value: u32) -> io::Result<usize> {
    w.write_all(&value.to_le_bytes())?;
    Ok(4)
}

/// Writes a big-endian `u64`.
pub fn write_u64<W: Write + ?Sized>(w: &mut W, value: u64) -> io::Result<usize> {
    w.write_all(&value.to_be_bytes())?;
    Ok(8)
}

/// Writes raw bytes.
pub fn write_bytes<W: Write + ?Sized>(w: &mut W, data: &[u8]) -> io::Result<usize> {
    w.write_all(data)?;
    Ok(data.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn enc_u32(v: u32) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_u32(&mut buf, v).unwrap();
        buf
    }

    fn enc_i32(v: i32) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_i32(&mut buf, v).unwrap();
        buf
    }

    fn enc_u64(v: u64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_u64(&mut buf, v).unwrap();
        buf
    }

    fn enc_i64(v: i64) -> Vec<u8> {
        let mut buf = Vec::new();
        encode_i64(&mut buf, v).unwrap();
        buf
    }

    #[test]
    fn test_u32_literal_vectors() {
        assert_eq!(enc_u32(0), [0x00]);
        assert_eq!(enc_u32(127), [0x7F]);
        assert_eq!(enc_u32(128), [0x81, 0x00]);
        assert_eq!(enc_u32(0x3FFF), [0xFF, 0x7F]);
        assert_eq!(enc_u32(0x4000), [0x81, 0x80, 0x00]);
        assert_eq!(enc_u32(u32::MAX), [0x8F, 0xFF, 0xFF, 0xFF, 0x7F]);
    }

    #[test]
    fn test_i32_literal_vectors() {
        assert_eq!(enc_i32(0), [0x00]);
        assert_eq!(enc_i32(63), [0x3F]);
        assert_eq!(enc_i32(64), [0x80, 0x40]);
        assert_eq!(enc_i32(-1), [0x7F]);
        assert_eq!(enc_i32(-63), [0x41]);
        // Magnitude 64 takes two groups even though 7 bits would suffice.
        assert_eq!(enc_i32(-64), [0xFF, 0x40]);
        assert_eq!(enc_i32(i32::MIN).len(), 5);
        assert_eq!(enc_i32(i32::MAX).len(), 5);
    }

    #[test]
    fn test_i32_extremes_round_trip() {
        for v in [i32::MIN, i32::MIN + 1, -65, -64, -1, 0, 1, 63, 64, i32::MAX] {
            let bytes = enc_i32(v);
            let (decoded, len) = decode_i32(&mut &bytes[..]).unwrap();
            assert_eq!(decoded, v);
            assert_eq!(len, bytes.len());
        }
    }

    #[test]
    fn test_u64_escape_boundary() {
        let below = (1u64 << 56) - 1;
        assert_eq!(enc_u64(below).len(), 8);
        assert_eq!(enc_u64(1u64 << 56).len(), 9);
        assert_eq!(enc_u64(u64::MAX), [0xFF; 9]);

        for v in [below, 1u64 << 56, u64::MAX, 0x0123_4567_89AB_CDEF] {
            let bytes = enc_u64(v);
            let (decoded, len) = decode_u64(&mut &bytes[..]).unwrap();
            assert_eq!((decoded, len), (v, bytes.len()));
        }
    }

    #[test]
    fn test_i64_escape_boundary() {
        let limit = 1i64 << 55;
        assert_eq!(enc_i64(limit - 1).len(), 8);
        assert_eq!(enc_i64(-(limit - 1)).len(), 8);
        assert_eq!(enc_i64(limit).len(), 9);
        assert_eq!(enc_i64(-limit).len(), 9);

        for v in [i64::MIN, i64::MAX, limit, -limit, limit - 1, -1, 0] {
            let bytes = enc_i64(v);
            let (decoded, len) = decode_i64(&mut &bytes[..]).unwrap();
            assert_eq!((decoded, len), (v, bytes.len()));
        }
    }

    #[test]
    fn test_decode_stops_at_final_group() {
        let data = [0x81, 0x00, 0xAA];
        let mut cursor = &data[..];
        let (value, len) = decode_u32(&mut cursor).unwrap();
        assert_eq!((value, len), (128, 2));
        assert_eq!(cursor, [0xAA]);
    }

    #[test]
    fn test_short_read() {
        let err = decode_u32(&mut &[0x81][..]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEndOfStream));

        let err = decode_u64(&mut &[0xFF; 8][..]).unwrap_err();
        assert!(matches!(err, DecodeError::UnexpectedEndOfStream));
    }

    #[test]
    fn test_u32_overflow() {
        let err = decode_u32(&mut &[0xFF; 6][..]).unwrap_err();
        assert!(matches!(err, DecodeError::VlqOverflow { width: 32 }));
    }

    #[test]
    fn test_32_bit_range_overflow() {
        let max = [0x8F, 0xFF, 0xFF, 0xFF, 0x7F];
        assert_eq!(decode_u32(&mut &max[..]).unwrap(), (u32::MAX, 5));

        // 5th group pushes the value past 32 bits
        let cases: [(&[u8], bool); 3] = [
            (&[0x9F, 0xFF, 0xFF, 0xFF, 0x7F], false),
            (&[0x88, 0x80, 0x80, 0x80, 0x00], true),
            (&[0xF7, 0x80, 0x80, 0x80, 0x00], true),
        ];
        for (bytes, signed) in cases {
            let err = if signed {
                decode_i32(&mut &bytes[..]).unwrap_err()
            } else {
                decode_u32(&mut &bytes[..]).unwrap_err()
            };
            assert!(matches!(err, DecodeError::VlqOverflow { width: 32 }), "{bytes:02X?}");
        }
    }

    #[test]
    fn test_fixed_width_helpers() {
        let mut buf = Vec::new();
        write_u16(&mut buf, 0x1234).unwrap();
        write_u32(&mut buf, 0xDEAD_BEEF).unwrap();
        write_u32_le(&mut buf, 0x0102_0304).unwrap();
        assert_eq!(
            buf,
            hex::decode("1234deadbeef04030201").unwrap()
        );

        let mut cursor = &buf[..];
        assert_eq!(read_u16(&mut cursor).unwrap(), 0x1234);
        assert_eq!(read_u32(&mut cursor).unwrap(), 0xDEAD_BEEF);
        assert_eq!(read_u32_le(&mut cursor).unwrap(), 0x0102_0304);
        assert!(read_bytes(&mut cursor, 1).is_err());
    }
}
