// Yay0 decompression (Nintendo N64-era LZ77 variant).
//
// Header, all big-endian:
//
// | Offset | Field                                   |
// |--------|-----------------------------------------|
// | 0x0    | magic "Yay0"                            |
// | 0x4    | decompressed size                       |
// | 0x8    | offset of the 16-bit length/distance pairs |
// | 0xC    | offset of the literal ("chunk") bytes   |
// | 0x10   | control bits, 32-bit words, MSB first   |
//
// A set control bit copies one literal byte. A clear bit consumes a pair:
// the top nibble is the length (0 means "next chunk byte + 18", otherwise
// nibble + 2) and the low 12 bits are the back-reference distance minus 1.
// Back-references may overlap the bytes they produce, so they are copied
// one byte at a time.

use log::debug;

use super::cursor::{ByteCursor, declared_size};
use crate::error::{PatchError, Result};

pub const MAGIC: &[u8; 4] = b"Yay0";

/// Parsed Yay0 header.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Header {
    pub decompressed_size: u32,
    pub pair_offset: u32,
    pub chunk_offset: u32,
}

/// True if `data` starts with the Yay0 magic.
pub fn is_yay0(data: &[u8]) -> bool {
    data.starts_with(MAGIC)
}

pub fn read_header(data: &[u8]) -> Result<Header> {
    let mut c = ByteCursor::big_endian(data);
    if c.read_array::<4>()? != *MAGIC {
        return Err(PatchError::malformed("missing Yay0 magic"));
    }
    Ok(Header {
        decompressed_size: c.read_u32()?,
        pair_offset: c.read_u32()?,
        chunk_offset: c.read_u32()?,
    })
}

/// Upper bound on the up-front reservation; the rest grows on demand.
const MAX_PREALLOC: usize = 1 << 20;

/// Decompress a complete Yay0 buffer.
pub fn decompress(data: &[u8]) -> Result<Vec<u8>> {
    let header = read_header(data)?;
    let size = declared_size(u64::from(header.decompressed_size))?;
    debug!(
        "yay0: {size} bytes, pairs at {:#X}, chunks at {:#X}",
        header.pair_offset, header.chunk_offset
    );

    let mut bits = ByteCursor::big_endian(data);
    bits.seek(0x10);
    let mut pairs = ByteCursor::big_endian(data);
    pairs.seek(header.pair_offset as usize);
    let mut chunks = ByteCursor::big_endian(data);
    chunks.seek(header.chunk_offset as usize);

    let mut out = Vec::with_capacity(size.min(MAX_PREALLOC));
    let mut word: u32 = 0;
    let mut bits_left = 0u32;

    while out.len() < size {
        if bits_left == 0 {
            word = bits.read_u32()?;
            bits_left = 32;
        }

        if word & 0x8000_0000 != 0 {
            out.push(chunks.read_u8()?);
        } else {
            let pair = pairs.read_u16()?;
            let distance = usize::from(pair & 0x0FFF) + 1;
            let length = match pair >> 12 {
                0 => usize::from(chunks.read_u8()?) + 18,
                n => usize::from(n) + 2,
            };
            let mut from = out.len().checked_sub(distance).ok_or_else(|| {
                PatchError::invalid(format!(
                    "yay0 back-reference distance {distance} before start of output at {}",
                    out.len()
                ))
            })?;
            // Clip a final run that would overshoot the declared size.
            let length = length.min(size - out.len());
            for _ in 0..length {
                let byte = out[from];
                out.push(byte);
                from += 1;
            }
        }

        word <<= 1;
        bits_left -= 1;
    }

    Ok(out)
}
