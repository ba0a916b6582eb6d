// MOD patches.
//
// The whole patch may be Yay0-compressed; if it starts with "Yay0" it is
// inflated first. Layout afterwards, big-endian:
//
//   4 bytes   ignored
//   u32       record count
//   records:  u32 target offset, u32 length, `length` literal bytes
//
// The output size is not stored. It is the larger of the source length and
// the furthest record end, found by walking the records once before any
// write.

use std::borrow::Cow;

use log::{debug, trace};

use crate::codec::{ByteCursor, TargetBuffer, declared_size, yay0};
use crate::engine::ApplyOptions;
use crate::error::{PatchError, Result};
use crate::formats::{PatchFormat, PatchInfo};

const COUNT_OFFSET: usize = 4;

/// Inflate a Yay0-wrapped patch; borrow a plain one.
fn unwrap_patch(patch: &[u8]) -> Result<Cow<'_, [u8]>> {
    if yay0::is_yay0(patch) {
        let inflated = yay0::decompress(patch)?;
        debug!("mod: yay0 patch inflated to {} bytes", inflated.len());
        Ok(Cow::Owned(inflated))
    } else {
        Ok(Cow::Borrowed(patch))
    }
}

/// Iterate `(offset, data)` records after the count field.
fn for_each_record<'a>(
    patch: &'a [u8],
    mut f: impl FnMut(usize, &'a [u8]) -> Result<()>,
) -> Result<u32> {
    let mut c = ByteCursor::big_endian(patch);
    c.seek(COUNT_OFFSET);
    let count = c.read_u32()?;
    for _ in 0..count {
        let offset = c.read_u32()? as usize;
        let len = c.read_u32()? as usize;
        f(offset, c.read_bytes(len)?)?;
    }
    Ok(count)
}

pub fn apply(source: &[u8], patch: &[u8], _opts: &ApplyOptions) -> Result<Vec<u8>> {
    let patch = unwrap_patch(patch)?;

    let mut target_len = source.len() as u64;
    let count = for_each_record(&patch, |offset, data| {
        target_len = target_len.max(offset as u64 + data.len() as u64);
        Ok(())
    })?;
    debug!("mod: {count} records, output {target_len} bytes");

    let mut target = TargetBuffer::seeded(source, declared_size(target_len)?);
    for_each_record(&patch, |offset, data| {
        trace!("mod: {} bytes at {offset:#X}", data.len());
        target.write(offset, data)
    })?;
    Ok(target.into_vec())
}

pub fn inspect(patch: &[u8]) -> Result<PatchInfo> {
    let compressed = yay0::is_yay0(patch);
    let patch = unwrap_patch(patch)?;
    let mut info = PatchInfo::new(PatchFormat::Mod);
    if compressed {
        info.variant = Some("yay0".to_string());
    }
    let mut high_water = 0u64;
    let count = for_each_record(&patch, |offset, data| {
        high_water = high_water.max(offset as u64 + data.len() as u64);
        Ok(())
    })?;
    info.records = u64::from(count);
    info.target_size = Some(high_water);
    Ok(info)
}

/// Build an uncompressed MOD patch from `(offset, bytes)` records.
pub fn encode(records: &[(u32, &[u8])]) -> Result<Vec<u8>> {
    let mut out = vec![0u8; COUNT_OFFSET];
    let count = u32::try_from(records.len())
        .map_err(|_| PatchError::invalid("too many MOD records"))?;
    out.extend_from_slice(&count.to_be_bytes());
    for (offset, data) in records {
        let len = u32::try_from(data.len())
            .map_err(|_| PatchError::invalid("MOD record longer than 4 GiB"))?;
        out.extend_from_slice(&offset.to_be_bytes());
        out.extend_from_slice(&len.to_be_bytes());
        out.extend_from_slice(data);
    }
    Ok(out)
}
