// APS patches (GBA and N64 flavours).
//
// Header, little-endian unless noted:
//
// | Offset | Field                                            |
// |--------|--------------------------------------------------|
// | 0x00   | "APS10"                                          |
// | 0x05   | mode: 0 simple, 1 N64                            |
// | 0x06   | encoding                                         |
// | 0x07   | description, 50 bytes                            |
// | 0x39   | simple: target size (u32)                        |
// | 0x39   | N64: file format (0 = V64 byte-swapped)          |
// | 0x3A   | N64: cart id (u16 BE), country (u8)              |
// | 0x3D   | N64: source checksum, u32 BE                     |
// | 0x41   | N64: 9 reserved bytes, then target size (u32)    |
//
// Records follow until the end of the patch: a u32 target offset and a u8
// length with `length` literal bytes, or a zero length followed by a fill
// byte and a u8 run length.

use log::{debug, trace};

use crate::codec::{ByteCursor, Endian, TargetBuffer, declared_size};
use crate::engine::ApplyOptions;
use crate::error::{PatchError, Result};
use crate::formats::{PatchFormat, PatchInfo, header_text};

pub const MAGIC: &[u8] = b"APS1";

const MODE_OFFSET: usize = 0x05;
const DESCRIPTION: std::ops::Range<usize> = 0x07..0x39;
const MODE_HEADER_OFFSET: usize = 0x39;

/// N64 file format byte for byte-swapped (".v64") images.
pub const N64_FORMAT_V64: u8 = 0;

/// Source checksum position inside the (natively ordered) N64 header.
const N64_CHECKSUM_OFFSET: usize = 0x10;
const N64_HEADER_LEN: usize = 0x40;

/// APS header mode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mode {
    Simple,
    N64 {
        file_format: u8,
        cart_id: u16,
        country: u8,
        checksum: u32,
    },
}

#[derive(Debug, Clone)]
pub struct Header {
    pub mode: Mode,
    pub description: Option<String>,
    pub target_size: u32,
}

fn read_header(c: &mut ByteCursor<'_>) -> Result<Header> {
    let patch_prefix = c.read_bytes(MAGIC.len())?;
    if patch_prefix != MAGIC {
        return Err(PatchError::malformed("APS patch must start with \"APS1\""));
    }
    c.seek(MODE_OFFSET);
    let mode = c.read_u8()?;
    c.seek(DESCRIPTION.start);
    let description = header_text(c.read_bytes(DESCRIPTION.len())?);
    c.seek(MODE_HEADER_OFFSET);

    let mode = match mode {
        0 => Mode::Simple,
        1 => {
            let file_format = c.read_u8()?;
            c.set_endian(Endian::Big);
            let cart_id = c.read_u16()?;
            let country = c.read_u8()?;
            let checksum = c.read_u32()?;
            c.set_endian(Endian::Little);
            c.skip(9)?;
            Mode::N64 {
                file_format,
                cart_id,
                country,
                checksum,
            }
        }
        other => return Err(PatchError::malformed(format!("unknown APS mode {other}"))),
    };
    let target_size = c.read_u32()?;
    Ok(Header {
        mode,
        description,
        target_size,
    })
}

/// Checksum stored in the N64 header of `source`, reading a byte-swapped
/// image in native order. The source itself is left untouched.
pub fn n64_source_checksum(source: &[u8], file_format: u8) -> Result<u32> {
    let len = source.len().min(N64_HEADER_LEN);
    let mut header = source[..len].to_vec();
    if file_format == N64_FORMAT_V64 {
        for pair in header.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
    }
    let mut c = ByteCursor::big_endian(&header);
    c.seek(N64_CHECKSUM_OFFSET);
    c.read_u32()
}

fn next_record<'a>(c: &mut ByteCursor<'a>) -> Result<(usize, Record<'a>)> {
    let offset = c.read_u32()? as usize;
    let len = c.read_u8()?;
    let record = if len != 0 {
        Record::Literal(c.read_bytes(usize::from(len))?)
    } else {
        let value = c.read_u8()?;
        let len = c.read_u8()?;
        Record::Run { value, len }
    };
    Ok((offset, record))
}

enum Record<'a> {
    Literal(&'a [u8]),
    Run { value: u8, len: u8 },
}

pub fn apply(source: &[u8], patch: &[u8], opts: &ApplyOptions) -> Result<Vec<u8>> {
    let mut c = ByteCursor::little_endian(patch);
    let header = read_header(&mut c)?;
    debug!("aps: {:?}, target {} bytes", header.mode, header.target_size);

    if let Mode::N64 {
        file_format,
        checksum,
        ..
    } = header.mode
        && !opts.ignore_checksums
    {
        let actual = n64_source_checksum(source, file_format)?;
        if actual != checksum {
            return Err(PatchError::ChecksumMismatch {
                expected: checksum,
                actual,
            });
        }
    }

    let target_len = declared_size(u64::from(header.target_size))?;
    let mut target = TargetBuffer::seeded(source, target_len);
    while !c.is_eof() {
        match next_record(&mut c)? {
            (offset, Record::Literal(data)) => {
                trace!("aps: {} bytes at {offset:#X}", data.len());
                target.write(offset, data)?;
            }
            (offset, Record::Run { value, len }) => {
                trace!("aps: run of {len} x {value:#04X} at {offset:#X}");
                target.fill(offset, usize::from(len), value)?;
            }
        }
    }
    Ok(target.into_vec())
}

pub fn inspect(patch: &[u8]) -> Result<PatchInfo> {
    let mut c = ByteCursor::little_endian(patch);
    let header = read_header(&mut c)?;
    let mut info = PatchInfo::new(PatchFormat::Aps);
    info.variant = Some(
        match header.mode {
            Mode::Simple => "simple",
            Mode::N64 { .. } => "n64",
        }
        .to_string(),
    );
    info.description = header.description;
    info.target_size = Some(u64::from(header.target_size));
    while !c.is_eof() {
        next_record(&mut c)?;
        info.records += 1;
    }
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn simple_header(target_size: u32) -> Vec<u8> {
        let mut p = b"APS10".to_vec();
        p.push(0); // mode
        p.push(0); // encoding
        let mut description = [0u8; 50];
        description[..8].copy_from_slice(b"Test fix");
        p.extend_from_slice(&description);
        p.extend_from_slice(&target_size.to_le_bytes());
        p
    }

    fn n64_header(file_format: u8, checksum: u32, target_size: u32) -> Vec<u8> {
        let mut p = b"APS10".to_vec();
        p.push(1);
        p.push(0);
        p.extend_from_slice(&[0u8; 50]);
        p.push(file_format);
        p.extend_from_slice(b"NS"); // cart id
        p.push(b'E');
        p.extend_from_slice(&checksum.to_be_bytes());
        p.extend_from_slice(&[0u8; 9]);
        p.extend_from_slice(&target_size.to_le_bytes());
        p
    }

    fn n64_source() -> Vec<u8> {
        let mut rom = vec![0u8; 0x40];
        rom[0x10..0x14].copy_from_slice(&0x1234_5678u32.to_be_bytes());
        rom
    }

    #[test]
    fn header_offsets() {
        assert_eq!(simple_header(0).len(), 0x3D);
        assert_eq!(n64_header(1, 0, 0).len(), 0x4E);
    }

    #[test]
    fn simple_literal_and_run() {
        let mut patch = simple_header(6);
        patch.extend_from_slice(&1u32.to_le_bytes());
        patch.extend_from_slice(&[2, b'x', b'y']);
        patch.extend_from_slice(&4u32.to_le_bytes());
        patch.extend_from_slice(&[0, b'-', 2]);
        let out = apply(b"abcd", &patch, &ApplyOptions::default()).unwrap();
        assert_eq!(out, b"axyd--");
    }

    #[test]
    fn n64_checksum_native_order() {
        let mut patch = n64_header(1, 0x1234_5678, 0x40);
        patch.extend_from_slice(&0u32.to_le_bytes());
        patch.extend_from_slice(&[1, 0xAA]);
        let out = apply(&n64_source(), &patch, &ApplyOptions::default()).unwrap();
        assert_eq!(out[0], 0xAA);
        assert_eq!(out.len(), 0x40);
    }

    #[test]
    fn n64_checksum_byte_swapped_source() {
        let mut swapped = n64_source();
        for pair in swapped.chunks_exact_mut(2) {
            pair.swap(0, 1);
        }
        let patch = n64_header(N64_FORMAT_V64, 0x1234_5678, 0x40);
        let out = apply(&swapped, &patch, &ApplyOptions::default()).unwrap();
        // The swap only feeds the comparison; output is seeded unswapped.
        assert_eq!(out, swapped);
    }

    #[test]
    fn n64_checksum_mismatch_unless_ignored() {
        let patch = n64_header(1, 0xDEAD_BEEF, 0x40);
        assert_eq!(
            apply(&n64_source(), &patch, &ApplyOptions::default()),
            Err(PatchError::ChecksumMismatch {
                expected: 0xDEAD_BEEF,
                actual: 0x1234_5678,
            })
        );
        assert!(apply(&n64_source(), &patch, &ApplyOptions { ignore_checksums: true }).is_ok());
    }

    #[test]
    fn short_n64_source_is_truncation() {
        let patch = n64_header(1, 0, 4);
        assert!(matches!(
            apply(&[0; 8], &patch, &ApplyOptions::default()),
            Err(PatchError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn unknown_mode_and_magic() {
        let mut patch = simple_header(0);
        patch[MODE_OFFSET] = 7;
        assert!(matches!(
            apply(&[], &patch, &ApplyOptions::default()),
            Err(PatchError::MalformedHeader(_))
        ));
        assert!(matches!(
            apply(&[], b"IPS10", &ApplyOptions::default()),
            Err(PatchError::MalformedHeader(_))
        ));
    }

    #[test]
    fn record_past_target_size_is_bounds_violation() {
        let mut patch = simple_header(2);
        patch.extend_from_slice(&1u32.to_le_bytes());
        patch.extend_from_slice(&[2, 1, 2]);
        assert!(matches!(
            apply(&[0, 0], &patch, &ApplyOptions::default()),
            Err(PatchError::BoundsViolation { .. })
        ));
    }

    #[test]
    fn inspect_reports_mode_and_description() {
        let mut patch = simple_header(9);
        patch.extend_from_slice(&0u32.to_le_bytes());
        patch.extend_from_slice(&[0, 0xFF, 3]);
        let info = inspect(&patch).unwrap();
        assert_eq!(info.variant.as_deref(), Some("simple"));
        assert_eq!(info.description.as_deref(), Some("Test fix"));
        assert_eq!(info.target_size, Some(9));
        assert_eq!(info.records, 1);

        let info = inspect(&n64_header(1, 0, 0)).unwrap();
        assert_eq!(info.variant.as_deref(), Some("n64"));
    }
}
