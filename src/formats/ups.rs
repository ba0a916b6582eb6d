// UPS patches.
//
// Same framing as BPS: "UPS1", input and output sizes as offset varints,
// a body, then three little-endian CRC32s. The body is a list of hunks:
// a varint skip, then XOR bytes up to a zero terminator. The output starts
// as the source (cut or zero-padded to the output size), so skipped bytes
// come through unchanged and patched bytes are XORed over the source.

use log::{debug, trace};

use crate::codec::{ByteCursor, TargetBuffer, declared_size, varint};
use crate::engine::ApplyOptions;
use crate::error::{PatchError, Result};
use crate::formats::bps::{split_footer, verify_source};
use crate::formats::{PatchFormat, PatchInfo};

pub const MAGIC: &[u8] = b"UPS1";

/// A single XOR hunk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Hunk<'a> {
    /// Bytes to skip before the first XOR byte.
    pub skip: usize,
    /// Non-zero XOR bytes, terminator excluded.
    pub xor: &'a [u8],
}

fn read_hunk<'a>(c: &mut ByteCursor<'a>) -> Result<Hunk<'a>> {
    let skip = varint::read_usize(c)?;
    let start = c.position();
    while c.read_u8()? != 0 {}
    let end = c.position() - 1;
    c.seek(start);
    let xor = c.read_bytes(end - start)?;
    c.skip(1)?;
    Ok(Hunk { skip, xor })
}

pub fn apply(source: &[u8], patch: &[u8], opts: &ApplyOptions) -> Result<Vec<u8>> {
    let (body, footer) = split_footer(patch, MAGIC, "UPS")?;
    verify_source(source, footer.source_crc32, opts)?;

    let mut c = ByteCursor::little_endian(body);
    c.seek(MAGIC.len());
    let input_size = varint::read(&mut c)?;
    let output_size = varint::read(&mut c)?;
    debug!("ups: input {input_size} bytes, output {output_size} bytes");

    let mut target = TargetBuffer::seeded(source, declared_size(output_size)?);
    let mut offset = 0usize;

    while !c.is_eof() {
        let hunk = read_hunk(&mut c)?;
        offset = offset
            .checked_add(hunk.skip)
            .ok_or_else(|| PatchError::invalid("UPS skip overflows"))?;
        trace!("ups: {} xor bytes at {offset:#X}", hunk.xor.len());
        for &byte in hunk.xor {
            target.xor(offset, byte)?;
            offset += 1;
        }
        // The terminator stands for an unchanged byte.
        offset = offset.saturating_add(1);
    }

    Ok(target.into_vec())
}

pub fn inspect(patch: &[u8]) -> Result<PatchInfo> {
    let (body, footer) = split_footer(patch, MAGIC, "UPS")?;
    let mut c = ByteCursor::little_endian(body);
    c.seek(MAGIC.len());

    let mut info = PatchInfo::new(PatchFormat::Ups);
    info.source_size = Some(varint::read(&mut c)?);
    info.target_size = Some(varint::read(&mut c)?);
    info.source_crc32 = Some(footer.source_crc32);
    info.target_crc32 = Some(footer.target_crc32);
    info.patch_crc32 = Some(footer.patch_crc32);
    while !c.is_eof() {
        read_hunk(&mut c)?;
        info.records += 1;
    }
    Ok(info)
}
