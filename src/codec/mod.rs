// Shared primitives used by the patch decoders.
//
// - `cursor`:  endian-aware `ByteCursor` reader and bounded `TargetBuffer`
// - `crc32`:   CRC-32 (crc32fast) used for source verification
// - `varint`:  BPS/UPS offset varint
// - `yay0`:    Yay0 LZ77 decompressor (MOD pre-pass)

pub mod crc32;
pub mod cursor;
pub mod varint;
pub mod yay0;

pub use crc32::{Crc32, crc32};
pub use cursor::{ByteCursor, Endian, MAX_TARGET_SIZE, TargetBuffer, declared_size};
