// Delta header integers: base-128, little-endian.
//
// Least-significant 7-bit group first.  Every byte except the last has
// bit 7 set.  A value always takes at least one byte.

use std::io::{self, Write};

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encode a `u64` into `buf`, returning the number of bytes used (1..=10).
#[inline]
pub fn encode_u64(mut num: u64, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    let mut i = 0;
    while num >= 0x80 {
        buf[i] = (num as u8) | 0x80;
        num >>= 7;
        i += 1;
    }
    buf[i] = num as u8;
    i + 1
}

/// Encode a `usize` into `buf`, returning the number of bytes used.
#[inline]
pub fn encode_usize(num: usize, buf: &mut [u8; MAX_VARINT_LEN]) -> usize {
    encode_u64(num as u64, buf)
}

/// Encode a `usize` and write it to a `Write` sink.
pub fn write_usize<W: Write>(w: &mut W, num: usize) -> io::Result<()> {
    let mut buf = [0u8; MAX_VARINT_LEN];
    let len = encode_usize(num, &mut buf);
    w.write_all(&buf[..len])
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decode a `u64` from the start of `data`.
/// Returns `(value, bytes_consumed)`.
pub fn read_u64(data: &[u8]) -> Result<(u64, usize), VarIntError> {
    let mut val: u64 = 0;
    for (i, &byte) in data.iter().enumerate() {
        let shift = 7 * i as u32;
        let group = u64::from(byte & 0x7F);
        if shift >= 64 || (shift > 0 && group >> (64 - shift) != 0) {
            return Err(VarIntError::Overflow);
        }
        val |= group << shift;
        if byte & 0x80 == 0 {
            return Ok((val, i + 1));
        }
    }
    Err(VarIntError::Underflow)
}

/// Decode a `usize` from the start of `data`.
pub fn read_usize(data: &[u8]) -> Result<(usize, usize), VarIntError> {
    let (val, len) = read_u64(data)?;
    let val = usize::try_from(val).map_err(|_| VarIntError::Overflow)?;
    Ok((val, len))
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Encoded byte-length of a `u64` value.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    bits.max(1).div_ceil(7) as usize
}

/// Encoded byte-length of a `usize` value.
#[inline]
pub fn sizeof_usize(num: usize) -> usize {
    sizeof_u64(num as u64)
}

// ---------------------------------------------------------------------------
// Error type
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VarIntError {
    /// Input ended before the terminating byte.
    Underflow,
    /// Value does not fit the target integer type.
    Overflow,
}

impl std::fmt::Display for VarIntError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            VarIntError::Underflow => write!(f, "size varint truncated"),
            VarIntError::Overflow => write!(f, "size varint does not fit"),
        }
    }
}

impl std::error::Error for VarIntError {}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn encoding_is_little_endian() {
        // 300 = 0b10_0101100: low group 0x2C first (with continuation), then 0x02.
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_u64(300, &mut buf);
        assert_eq!(&buf[..len], &[0xAC, 0x02]);
    }

    #[test]
    fn known_header_values() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = encode_usize(135, &mut buf);
        assert_eq!(&buf[..len], b"\x87\x01");
        let len = encode_usize(164_700, &mut buf);
        assert_eq!(&buf[..len], b"\xdc\x86\x0a");
    }

    #[test]
    fn single_byte_values() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for val in 0..=127u64 {
            assert_eq!(encode_u64(val, &mut buf), 1);
            assert_eq!(buf[0], val as u8);
        }
    }

    #[test]
    fn boundaries_and_sizeof() {
        let mut buf = [0u8; MAX_VARINT_LEN];
        for &val in &[0u64, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let len = encode_u64(val, &mut buf);
            let (decoded, consumed) = read_u64(&buf[..len]).unwrap();
            assert_eq!(decoded, val);
            assert_eq!(consumed, len);
            assert_eq!(sizeof_u64(val), len, "sizeof mismatch for {val}");
        }
    }

    #[test]
    fn trailing_bytes_are_not_consumed() {
        let (val, used) = read_usize(&[0x4D, 0x4E, 0x90]).unwrap();
        assert_eq!((val, used), (77, 1));
    }

    #[test]
    fn underflow_detection() {
        assert_eq!(read_u64(&[0x80, 0x80, 0x80]), Err(VarIntError::Underflow));
        assert_eq!(read_u64(&[]), Err(VarIntError::Underflow));
    }

    #[test]
    fn overflow_detection() {
        // Eleven continuation groups cannot fit 64 bits.
        let data = [0xFF; 11];
        assert_eq!(read_u64(&data), Err(VarIntError::Overflow));
        // Tenth group may only contribute one bit.
        let mut data = [0xFF; 10];
        data[9] = 0x02;
        assert_eq!(read_u64(&data), Err(VarIntError::Overflow));
    }

    #[test]
    fn write_then_read() {
        let mut out = Vec::new();
        write_usize(&mut out, 999_999).unwrap();
        assert_eq!(read_usize(&out).unwrap(), (999_999, out.len()));
    }
}
