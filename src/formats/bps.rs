// BPS patches (byuu's "beat" format).
//
// Layout: "BPS1", offset varints for source size, target size and metadata
// size, the metadata itself, then a command stream, then a 12-byte footer
// of little-endian CRC32s (source, target, patch).
//
// Each command varint carries the command in its low two bits and
// `length - 1` in the rest:
//
//   0  SourceRead  copy from the source at the current output offset
//   1  TargetRead  copy literal bytes from the patch
//   2  SourceCopy  copy from the source at a relative cursor
//   3  TargetCopy  copy from the output itself at a relative cursor
//
// The relative cursors move by a signed varint delta before each use and by
// `length` after. TargetCopy goes byte by byte because its source range may
// overlap the bytes it is producing.

use log::{debug, trace};

use crate::codec::{ByteCursor, TargetBuffer, crc32, declared_size, varint};
use crate::engine::ApplyOptions;
use crate::error::{PatchError, Result};
use crate::formats::{PatchFormat, PatchInfo, header_text};

pub const MAGIC: &[u8] = b"BPS1";

/// Three trailing CRC32 values.
pub const FOOTER_LEN: usize = 12;

const SOURCE_READ: u64 = 0;
const TARGET_READ: u64 = 1;
const SOURCE_COPY: u64 = 2;
const TARGET_COPY: u64 = 3;

/// Checksums stored at the end of a BPS or UPS patch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub source_crc32: u32,
    pub target_crc32: u32,
    pub patch_crc32: u32,
}

/// Validate magic and length, and split off the footer.
///
/// Returns the patch without its footer, plus the footer. Shared with UPS,
/// which uses the same framing.
pub(crate) fn split_footer<'a>(
    patch: &'a [u8],
    magic: &[u8],
    name: &str,
) -> Result<(&'a [u8], Footer)> {
    if patch.len() < magic.len() + FOOTER_LEN {
        return Err(PatchError::truncated(
            0,
            magic.len() + FOOTER_LEN,
            patch.len(),
        ));
    }
    if !patch.starts_with(magic) {
        return Err(PatchError::malformed(format!(
            "{name} patch must start with {:?}",
            String::from_utf8_lossy(magic)
        )));
    }
    let (body, footer) = patch.split_at(patch.len() - FOOTER_LEN);
    let mut c = ByteCursor::little_endian(footer);
    let footer = Footer {
        source_crc32: c.read_u32()?,
        target_crc32: c.read_u32()?,
        patch_crc32: c.read_u32()?,
    };
    Ok((body, footer))
}

/// Fail with `ChecksumMismatch` unless the source matches `expected`.
pub(crate) fn verify_source(source: &[u8], expected: u32, opts: &ApplyOptions) -> Result<()> {
    if opts.ignore_checksums {
        return Ok(());
    }
    let actual = crc32(source);
    if actual != expected {
        return Err(PatchError::ChecksumMismatch { expected, actual });
    }
    Ok(())
}

/// Header fields that precede the command stream.
#[derive(Debug, Clone)]
pub struct Header<'a> {
    pub source_size: u64,
    pub target_size: u64,
    pub metadata: &'a [u8],
}

fn read_header<'a>(body: &mut ByteCursor<'a>) -> Result<Header<'a>> {
    body.seek(MAGIC.len());
    let source_size = varint::read(body)?;
    let target_size = varint::read(body)?;
    let metadata_len = varint::read_usize(body)?;
    let metadata = body.read_bytes(metadata_len)?;
    Ok(Header {
        source_size,
        target_size,
        metadata,
    })
}

fn source_range(source: &[u8], offset: usize, len: usize) -> Result<&[u8]> {
    offset
        .checked_add(len)
        .and_then(|end| source.get(offset..end))
        .ok_or_else(|| PatchError::truncated(offset, len, source.len().saturating_sub(offset)))
}

fn apply_delta(cursor: usize, delta: i64, what: &str) -> Result<usize> {
    let moved = i128::from(cursor as u64) + i128::from(delta);
    usize::try_from(moved)
        .map_err(|_| PatchError::invalid(format!("BPS {what} cursor moved to {moved}")))
}

pub fn apply(source: &[u8], patch: &[u8], opts: &ApplyOptions) -> Result<Vec<u8>> {
    let (body, footer) = split_footer(patch, MAGIC, "BPS")?;
    verify_source(source, footer.source_crc32, opts)?;

    let mut c = ByteCursor::little_endian(body);
    let header = read_header(&mut c)?;
    debug!(
        "bps: source {} bytes, target {} bytes, {} bytes metadata",
        header.source_size,
        header.target_size,
        header.metadata.len()
    );

    let target_len = declared_size(header.target_size)?;
    let mut target = TargetBuffer::fixed(target_len);
    let mut output_offset = 0usize;
    let mut source_rel = 0usize;
    let mut target_rel = 0usize;

    while !c.is_eof() {
        let data = varint::read(&mut c)?;
        let len = usize::try_from(data >> 2)
            .ok()
            .and_then(|l| l.checked_add(1))
            .ok_or_else(|| PatchError::invalid("BPS command length overflows"))?;

        match data & 3 {
            SOURCE_READ => {
                trace!("bps: source read {len} at {output_offset:#X}");
                target.write(output_offset, source_range(source, output_offset, len)?)?;
            }
            TARGET_READ => {
                trace!("bps: target read {len} at {output_offset:#X}");
                target.write(output_offset, c.read_bytes(len)?)?;
            }
            SOURCE_COPY => {
                source_rel = apply_delta(source_rel, varint::read_signed(&mut c)?, "source")?;
                trace!("bps: source copy {len} from {source_rel:#X}");
                target.write(output_offset, source_range(source, source_rel, len)?)?;
                source_rel += len;
            }
            TARGET_COPY => {
                target_rel = apply_delta(target_rel, varint::read_signed(&mut c)?, "target")?;
                trace!("bps: target copy {len} from {target_rel:#X}");
                for i in 0..len {
                    let byte = target.get(target_rel + i)?;
                    target.write(output_offset + i, &[byte])?;
                }
                target_rel += len;
            }
            _ => unreachable!("command is two bits"),
        }
        output_offset += len;
    }

    Ok(target.into_vec())
}

pub fn inspect(patch: &[u8]) -> Result<PatchInfo> {
    let (body, footer) = split_footer(patch, MAGIC, "BPS")?;
    let mut c = ByteCursor::little_endian(body);
    let header = read_header(&mut c)?;

    let mut info = PatchInfo::new(PatchFormat::Bps);
    info.source_size = Some(header.source_size);
    info.target_size = Some(header.target_size);
    info.description = header_text(header.metadata);
    info.source_crc32 = Some(footer.source_crc32);
    info.target_crc32 = Some(footer.target_crc32);
    info.patch_crc32 = Some(footer.patch_crc32);

    while !c.is_eof() {
        let data = varint::read(&mut c)?;
        match data & 3 {
            TARGET_READ => {
                let len = usize::try_from(data >> 2)
                    .ok()
                    .and_then(|l| l.checked_add(1))
                    .ok_or_else(|| PatchError::invalid("BPS command length overflows"))?;
                c.skip(len)?;
            }
            SOURCE_COPY | TARGET_COPY => {
                varint::read(&mut c)?;
            }
            _ => {}
        }
        info.records += 1;
    }
    Ok(info)
}
