// Offset varint shared by BPS and UPS.
//
// Little-endian base-128 where the *high* bit marks the final byte, and
// every continuation adds the next power of 128 to the value so that no
// number has two encodings. `1` encodes as `0x81`, `128` as `0x00 0x80`.

use super::cursor::ByteCursor;
use crate::error::{PatchError, Result};

/// Read one offset varint.
pub fn read(cursor: &mut ByteCursor<'_>) -> Result<u64> {
    let mut value: u64 = 0;
    let mut shift: u64 = 1;
    loop {
        let byte = cursor.read_u8()?;
        value = u64::from(byte & 0x7F)
            .checked_mul(shift)
            .and_then(|v| v.checked_add(value))
            .ok_or_else(overflow)?;
        if byte & 0x80 != 0 {
            return Ok(value);
        }
        shift = shift.checked_mul(0x80).ok_or_else(overflow)?;
        value = value.checked_add(shift).ok_or_else(overflow)?;
    }
}

/// Read one offset varint that must fit in `usize`.
pub fn read_usize(cursor: &mut ByteCursor<'_>) -> Result<usize> {
    let value = read(cursor)?;
    usize::try_from(value).map_err(|_| overflow())
}

/// Read a signed delta: bit 0 is the sign, the rest the magnitude.
pub fn read_signed(cursor: &mut ByteCursor<'_>) -> Result<i64> {
    let raw = read(cursor)?;
    let magnitude = (raw >> 1) as i64;
    Ok(if raw & 1 != 0 { -magnitude } else { magnitude })
}

fn overflow() -> PatchError {
    PatchError::invalid("varint overflows 64 bits")
}

/// Append the encoding of `value` to `out`.
pub fn write(out: &mut Vec<u8>, mut value: u64) {
    loop {
        let low = (value & 0x7F) as u8;
        value >>= 7;
        if value == 0 {
            out.push(0x80 | low);
            return;
        }
        out.push(low);
        value -= 1;
    }
}

/// Append the encoding of a signed delta to `out`.
pub fn write_signed(out: &mut Vec<u8>, value: i64) {
    let raw = (value.unsigned_abs() << 1) | u64::from(value < 0);
    write(out, raw);
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode(bytes: &[u8]) -> Result<u64> {
        read(&mut ByteCursor::little_endian(bytes))
    }

    #[test]
    fn known_encodings() {
        assert_eq!(decode(&[0x80]).unwrap(), 0);
        assert_eq!(decode(&[0x81]).unwrap(), 1);
        assert_eq!(decode(&[0xFF]).unwrap(), 127);
        assert_eq!(decode(&[0x00, 0x80]).unwrap(), 128);
        assert_eq!(decode(&[0x7F, 0x80]).unwrap(), 255);
        assert_eq!(decode(&[0x00, 0x81]).unwrap(), 256);
    }

    #[test]
    fn write_matches_known_encodings() {
        for (value, expected) in [
            (0u64, vec![0x80]),
            (1, vec![0x81]),
            (128, vec![0x00, 0x80]),
            (256, vec![0x00, 0x81]),
            (16511, vec![0x7F, 0xFF]),
            (16512, vec![0x00, 0x00, 0x80]),
        ] {
            let mut out = Vec::new();
            write(&mut out, value);
            assert_eq!(out, expected, "encoding of {value}");
            assert_eq!(decode(&out).unwrap(), value);
        }
    }

    #[test]
    fn extremes_survive() {
        let mut out = Vec::new();
        write(&mut out, u64::MAX);
        assert_eq!(decode(&out).unwrap(), u64::MAX);
    }

    #[test]
    fn signed_deltas() {
        for value in [0i64, 1, -1, 63, -64, 1_000_000, -1_000_000] {
            let mut out = Vec::new();
            write_signed(&mut out, value);
            assert_eq!(
                read_signed(&mut ByteCursor::little_endian(&out)).unwrap(),
                value
            );
        }
    }

    #[test]
    fn missing_terminator_is_truncation() {
        assert!(matches!(
            decode(&[0x00, 0x00]),
            Err(PatchError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn overlong_input_is_rejected() {
        let bytes = [0x7Fu8; 12];
        let mut terminated = bytes.to_vec();
        terminated.push(0xFF);
        assert!(matches!(
            decode(&terminated),
            Err(PatchError::InvalidData(_))
        ));
    }
}
