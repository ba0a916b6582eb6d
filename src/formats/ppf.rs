// PPF patches.
//
// A 56-byte header (magic "PPF", version digits, encoding, description)
// is skipped. When byte 5 is zero, a 1024-byte validation block follows
// and is skipped too. Records run to the end of the patch: a u64
// little-endian file offset, a u8 length and `length` literal bytes. The
// output is exactly the size of the source.

use log::{debug, trace, warn};

use crate::codec::{ByteCursor, TargetBuffer};
use crate::engine::ApplyOptions;
use crate::error::{PatchError, Result};
use crate::formats::{PatchFormat, PatchInfo, header_text};

pub const MAGIC: &[u8] = b"PPF";

pub const HEADER_LEN: usize = 56;
pub const VALIDATION_BLOCK_LEN: usize = 1024;

const VALIDATION_FLAG_OFFSET: usize = 5;
const DESCRIPTION: std::ops::Range<usize> = 6..56;

/// Offset, length and at least one data byte. Anything shorter ends the body.
const MIN_RECORD_LEN: usize = 10;

/// Where the first record starts.
fn body_start(patch: &[u8]) -> usize {
    match patch.get(VALIDATION_FLAG_OFFSET) {
        Some(0) => HEADER_LEN + VALIDATION_BLOCK_LEN,
        _ => HEADER_LEN,
    }
}

/// Walk every record, returning how many were seen.
fn for_each_record<'a>(
    patch: &'a [u8],
    mut f: impl FnMut(u64, &'a [u8]) -> Result<()>,
) -> Result<u64> {
    let mut c = ByteCursor::little_endian(patch);
    c.seek(body_start(patch));
    let mut count = 0;
    while !c.is_eof() {
        if c.remaining() < MIN_RECORD_LEN {
            warn!(
                "ppf: ignoring {} trailing bytes at {:#X}",
                c.remaining(),
                c.position()
            );
            break;
        }
        let offset = c.read_u64()?;
        let len = c.read_u8()?;
        f(offset, c.read_bytes(usize::from(len))?)?;
        count += 1;
    }
    Ok(count)
}

pub fn apply(source: &[u8], patch: &[u8], _opts: &ApplyOptions) -> Result<Vec<u8>> {
    let mut target = TargetBuffer::seeded(source, source.len());
    let capacity = source.len() as u64;
    let count = for_each_record(patch, |offset, data| {
        trace!("ppf: {} bytes at {offset:#X}", data.len());
        let at = usize::try_from(offset).map_err(|_| PatchError::BoundsViolation {
            offset,
            len: data.len() as u64,
            capacity,
        })?;
        target.write(at, data)
    })?;
    debug!("ppf: {count} records");
    Ok(target.into_vec())
}

pub fn inspect(patch: &[u8]) -> Result<PatchInfo> {
    let mut info = PatchInfo::new(PatchFormat::Ppf);
    if let Some(version) = patch.get(3..5) {
        info.variant = Some(String::from_utf8_lossy(version).into_owned());
    }
    info.description = patch.get(DESCRIPTION).and_then(header_text);
    let mut high_water = 0u64;
    info.records = for_each_record(patch, |offset, data| {
        high_water = high_water.max(offset.saturating_add(data.len() as u64));
        Ok(())
    })?;
    info.target_size = Some(high_water);
    Ok(info)
}
