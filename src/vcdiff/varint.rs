// VCDIFF variable-length integers (RFC 3284, Section 2).
//
// Base-128, big-endian: most-significant group first. Every byte but the
// last has bit 7 set. Unlike the BPS/UPS varint there is no per-byte bias,
// so `0x80 0x00` and `0x00` both decode to zero.

use crate::codec::ByteCursor;
use crate::error::{PatchError, Result};

/// Maximum encoded length for a 64-bit value (ceil(64/7) = 10).
pub const MAX_VARINT_LEN: usize = 10;

/// If any of these bits are set before a shift, the next `<< 7` overflows.
const U64_OVERFLOW_MASK: u64 = 0xFE00_0000_0000_0000;

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Read one integer from the cursor.
pub fn read_u64(c: &mut ByteCursor<'_>) -> Result<u64> {
    let mut val: u64 = 0;
    loop {
        let byte = c.read_u8()?;
        if val & U64_OVERFLOW_MASK != 0 {
            return Err(PatchError::invalid(format!(
                "VCDIFF integer overflows 64 bits at {:#X}",
                c.position() - 1
            )));
        }
        val = (val << 7) | u64::from(byte & 0x7F);
        if byte & 0x80 == 0 {
            return Ok(val);
        }
    }
}

/// Read one integer that must fit in `usize`.
pub fn read_usize(c: &mut ByteCursor<'_>) -> Result<usize> {
    let val = read_u64(c)?;
    usize::try_from(val)
        .map_err(|_| PatchError::invalid(format!("VCDIFF integer {val} does not fit in usize")))
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Append the encoding of `num` to `out`.
///
/// The decoder never needs this; it is used to build windows by hand in
/// tests, benches and the fuzz corpus.
pub fn write_u64(out: &mut Vec<u8>, mut num: u64) {
    let mut buf = [0u8; MAX_VARINT_LEN];
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
    out.extend_from_slice(&buf[i..]);
}

/// Encoded length of `num`.
#[inline]
pub fn sizeof_u64(num: u64) -> usize {
    let bits = 64 - num.leading_zeros();
    (bits.max(1).div_ceil(7) as usize).min(MAX_VARINT_LEN)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<u64> {
        read_u64(&mut ByteCursor::big_endian(bytes))
    }

    #[test]
    fn encoding_is_big_endian() {
        // 300 = (10) (0101100) = 0x82 0x2C
        let mut out = Vec::new();
        write_u64(&mut out, 300);
        assert_eq!(out, [0x82, 0x2C]);
        assert_eq!(decode(&out).unwrap(), 300);
    }

    #[test]
    fn lengths_match_sizeof() {
        for val in [0u64, 1, 127, 128, 16383, 16384, u32::MAX as u64, u64::MAX] {
            let mut out = Vec::new();
            write_u64(&mut out, val);
            assert_eq!(out.len(), sizeof_u64(val), "length of {val}");
            assert_eq!(decode(&out).unwrap(), val);
        }
    }

    #[test]
    fn single_byte_values() {
        for val in 0..=127u8 {
            assert_eq!(decode(&[val]).unwrap(), u64::from(val));
        }
    }

    #[test]
    fn redundant_leading_groups_are_accepted() {
        assert_eq!(decode(&[0x80, 0x80, 0x05]).unwrap(), 5);
    }

    #[test]
    fn overflow_is_invalid_data() {
        let data = [0xFF; 11];
        let mut terminated = data.to_vec();
        terminated.push(0x01);
        assert!(matches!(decode(&terminated), Err(PatchError::InvalidData(_))));
    }

    #[test]
    fn missing_terminator_is_truncation() {
        assert!(matches!(
            decode(&[0x80, 0x80, 0x80]),
            Err(PatchError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn cursor_advances_past_integer() {
        let data = [0x81, 0x00, 0x07];
        let mut c = ByteCursor::big_endian(&data);
        assert_eq!(read_usize(&mut c).unwrap(), 128);
        assert_eq!(c.position(), 2);
        assert_eq!(read_usize(&mut c).unwrap(), 7);
    }
}
