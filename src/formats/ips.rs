// IPS patches.
//
// Layout: "PATCH", then records of a 24-bit big-endian offset and a 16-bit
// big-endian length followed by `length` literal bytes. A zero length
// introduces an RLE record: 16-bit run length and one fill byte. The body
// ends at the literal bytes "EOF".
//
// The terminator is recognised by looking at the bytes before decoding a
// record, so a record whose offset happens to be 0x454F46 ("EOF") cannot
// be expressed. That is how the format has always been read and is kept.
//
// The target starts as a copy of the source and may grow up to
// max(source length, 16 MiB). Its final length is the larger of the source
// length and the furthest byte written.

use log::{debug, trace};

use crate::codec::{ByteCursor, TargetBuffer};
use crate::engine::ApplyOptions;
use crate::error::{PatchError, Result};
use crate::formats::{PatchFormat, PatchInfo};

pub const MAGIC: &[u8] = b"PATCH";

const EOF_MARKER: &[u8] = b"EOF";

/// Lower bound on how far an IPS target may grow.
pub const MIN_CAPACITY: usize = 16 * 1024 * 1024;

/// One decoded IPS record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Record<'a> {
    Literal { offset: usize, data: &'a [u8] },
    Run { offset: usize, len: usize, value: u8 },
}

/// Sequential record reader over an IPS patch.
pub struct Records<'a> {
    cursor: ByteCursor<'a>,
}

impl<'a> Records<'a> {
    pub fn new(patch: &'a [u8]) -> Result<Self> {
        if !patch.starts_with(MAGIC) {
            return Err(PatchError::malformed("IPS patch must start with \"PATCH\""));
        }
        let mut cursor = ByteCursor::big_endian(patch);
        cursor.skip(MAGIC.len())?;
        Ok(Self { cursor })
    }

    /// Next record, or `None` at the "EOF" marker.
    pub fn next_record(&mut self) -> Result<Option<Record<'a>>> {
        if self.cursor.peek_matches(EOF_MARKER) {
            return Ok(None);
        }
        if self.cursor.is_eof() {
            return Err(PatchError::truncated(
                self.cursor.position(),
                EOF_MARKER.len(),
                0,
            ));
        }

        let offset = self.cursor.read_u24()? as usize;
        let len = self.cursor.read_u16()?;
        let record = if len == 0 {
            let len = usize::from(self.cursor.read_u16()?);
            let value = self.cursor.read_u8()?;
            Record::Run { offset, len, value }
        } else {
            Record::Literal {
                offset,
                data: self.cursor.read_bytes(usize::from(len))?,
            }
        };
        Ok(Some(record))
    }
}

/// Apply an IPS patch. IPS carries no checksums, so `_opts` is unused.
pub fn apply(source: &[u8], patch: &[u8], _opts: &ApplyOptions) -> Result<Vec<u8>> {
    let mut records = Records::new(patch)?;
    let mut target = TargetBuffer::growable(source, source.len().max(MIN_CAPACITY));
    let mut count = 0u64;

    while let Some(record) = records.next_record()? {
        match record {
            Record::Literal { offset, data } => {
                trace!("ips: literal {} bytes at {offset:#08X}", data.len());
                target.write(offset, data)?;
            }
            Record::Run { offset, len, value } => {
                trace!("ips: run of {len} x {value:#04X} at {offset:#08X}");
                target.fill(offset, len, value)?;
            }
        }
        count += 1;
    }

    debug!("ips: {count} records, output {} bytes", target.len());
    Ok(target.into_vec())
}

pub fn inspect(patch: &[u8]) -> Result<PatchInfo> {
    let mut records = Records::new(patch)?;
    let mut info = PatchInfo::new(PatchFormat::Ips);
    let mut high_water = 0u64;
    while let Some(record) = records.next_record()? {
        let end = match record {
            Record::Literal { offset, data } => offset + data.len(),
            Record::Run { offset, len, .. } => offset + len,
        };
        high_water = high_water.max(end as u64);
        info.records += 1;
    }
    // Without the source only a lower bound on the output is known.
    info.target_size = Some(high_water);
    Ok(info)
}
