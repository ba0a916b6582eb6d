// Sequential byte reader and bounded target writer.
//
// `ByteCursor` walks a borrowed patch buffer with an explicit position and
// a switchable byte order. Several cursors may run over the same buffer at
// once (VCDIFF reads its data, instruction and address sections that way).
//
// `TargetBuffer` is the write side: a byte vector with a hard capacity.
// Writes past the capacity fail with `BoundsViolation` instead of growing.

use crate::error::{PatchError, Result};

/// Largest target size a patch header may declare (2 GiB).
pub const MAX_TARGET_SIZE: u64 = 1 << 31;

/// Convert a size read from a patch header into an allocation length.
pub fn declared_size(size: u64) -> Result<usize> {
    if size > MAX_TARGET_SIZE {
        return Err(PatchError::invalid(format!(
            "declared size {size} exceeds limit of {MAX_TARGET_SIZE} bytes"
        )));
    }
    usize::try_from(size)
        .map_err(|_| PatchError::invalid(format!("declared size {size} does not fit in memory")))
}

/// Byte order used by the multi-byte reads of a [`ByteCursor`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endian {
    Big,
    Little,
}

// ---------------------------------------------------------------------------
// ByteCursor
// ---------------------------------------------------------------------------

/// Endian-aware sequential reader over a byte slice.
#[derive(Debug, Clone)]
pub struct ByteCursor<'a> {
    data: &'a [u8],
    pos: usize,
    endian: Endian,
}

impl<'a> ByteCursor<'a> {
    pub fn new(data: &'a [u8], endian: Endian) -> Self {
        Self {
            data,
            pos: 0,
            endian,
        }
    }

    pub fn big_endian(data: &'a [u8]) -> Self {
        Self::new(data, Endian::Big)
    }

    pub fn little_endian(data: &'a [u8]) -> Self {
        Self::new(data, Endian::Little)
    }

    /// Current byte offset into the underlying buffer.
    #[inline]
    pub fn position(&self) -> usize {
        self.pos
    }

    /// Move to an absolute offset. Seeking past the end is allowed; the
    /// next read reports the truncation.
    #[inline]
    pub fn seek(&mut self, pos: usize) {
        self.pos = pos;
    }

    /// Advance by `n` bytes, failing if that would leave the buffer.
    pub fn skip(&mut self, n: usize) -> Result<()> {
        self.ensure(n)?;
        self.pos += n;
        Ok(())
    }

    #[inline]
    pub fn endian(&self) -> Endian {
        self.endian
    }

    #[inline]
    pub fn set_endian(&mut self, endian: Endian) {
        self.endian = endian;
    }

    /// Total length of the underlying buffer.
    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes left between the position and the end of the buffer.
    #[inline]
    pub fn remaining(&self) -> usize {
        self.data.len().saturating_sub(self.pos)
    }

    #[inline]
    pub fn is_eof(&self) -> bool {
        self.pos >= self.data.len()
    }

    /// True if the bytes at the current position equal `expected`.
    /// Does not move the cursor.
    pub fn peek_matches(&self, expected: &[u8]) -> bool {
        self.data
            .get(self.pos..)
            .is_some_and(|rest| rest.starts_with(expected))
    }

    fn ensure(&self, needed: usize) -> Result<()> {
        if self.remaining() < needed {
            return Err(PatchError::truncated(self.pos, needed, self.remaining()));
        }
        Ok(())
    }

    /// Borrow the next `n` bytes and advance past them.
    pub fn read_bytes(&mut self, n: usize) -> Result<&'a [u8]> {
        self.ensure(n)?;
        let bytes = &self.data[self.pos..self.pos + n];
        self.pos += n;
        Ok(bytes)
    }

    pub fn read_array<const N: usize>(&mut self) -> Result<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.read_bytes(N)?);
        Ok(out)
    }

    #[inline]
    pub fn read_u8(&mut self) -> Result<u8> {
        self.ensure(1)?;
        let b = self.data[self.pos];
        self.pos += 1;
        Ok(b)
    }

    pub fn read_u16(&mut self) -> Result<u16> {
        let b = self.read_array::<2>()?;
        Ok(match self.endian {
            Endian::Big => u16::from_be_bytes(b),
            Endian::Little => u16::from_le_bytes(b),
        })
    }

    pub fn read_u24(&mut self) -> Result<u32> {
        let [a, b, c] = self.read_array::<3>()?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes([0, a, b, c]),
            Endian::Little => u32::from_le_bytes([a, b, c, 0]),
        })
    }

    pub fn read_u32(&mut self) -> Result<u32> {
        let b = self.read_array::<4>()?;
        Ok(match self.endian {
            Endian::Big => u32::from_be_bytes(b),
            Endian::Little => u32::from_le_bytes(b),
        })
    }

    pub fn read_u64(&mut self) -> Result<u64> {
        let b = self.read_array::<8>()?;
        Ok(match self.endian {
            Endian::Big => u64::from_be_bytes(b),
            Endian::Little => u64::from_le_bytes(b),
        })
    }
}

// ---------------------------------------------------------------------------
// TargetBuffer
// ---------------------------------------------------------------------------

/// Output buffer with a hard capacity.
///
/// A fixed buffer has a final length set up front; bytes never written
/// read back as zero. A growable buffer starts at its seed length and
/// extends (zero-filled) as writes land further out, up to the capacity;
/// its final length is therefore the larger of the seed length and the
/// highest byte written. Memory is only committed as writes land, so a
/// large declared size costs nothing until it is filled.
#[derive(Debug, Clone)]
pub struct TargetBuffer {
    data: Vec<u8>,
    min_len: usize,
    capacity: usize,
}

impl TargetBuffer {
    /// Zero-filled buffer of exactly `len` bytes.
    pub fn fixed(len: usize) -> Self {
        Self {
            data: Vec::new(),
            min_len: len,
            capacity: len,
        }
    }

    /// Buffer of exactly `len` bytes, pre-filled with as much of `seed`
    /// as fits.
    pub fn seeded(seed: &[u8], len: usize) -> Self {
        Self {
            data: seed[..seed.len().min(len)].to_vec(),
            min_len: len,
            capacity: len,
        }
    }

    /// Buffer holding `seed`, allowed to grow up to `capacity` bytes.
    pub fn growable(seed: &[u8], capacity: usize) -> Self {
        Self {
            data: seed.to_vec(),
            min_len: seed.len(),
            capacity: capacity.max(seed.len()),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len().max(self.min_len)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Validate a write of `len` bytes at `offset` and make room for it.
    fn reserve_range(&mut self, offset: usize, len: usize) -> Result<usize> {
        let end = offset
            .checked_add(len)
            .filter(|&end| end <= self.capacity)
            .ok_or(PatchError::BoundsViolation {
                offset: offset as u64,
                len: len as u64,
                capacity: self.capacity as u64,
            })?;
        if end > self.data.len() {
            self.data.resize(end, 0);
        }
        Ok(end)
    }

    /// Copy `bytes` into the buffer at `offset`.
    pub fn write(&mut self, offset: usize, bytes: &[u8]) -> Result<()> {
        let end = self.reserve_range(offset, bytes.len())?;
        self.data[offset..end].copy_from_slice(bytes);
        Ok(())
    }

    /// Set `len` bytes starting at `offset` to `value`.
    pub fn fill(&mut self, offset: usize, len: usize, value: u8) -> Result<()> {
        let end = self.reserve_range(offset, len)?;
        self.data[offset..end].fill(value);
        Ok(())
    }

    /// XOR `value` into the byte at `offset`.
    pub fn xor(&mut self, offset: usize, value: u8) -> Result<()> {
        self.reserve_range(offset, 1)?;
        self.data[offset] ^= value;
        Ok(())
    }

    /// Read back a byte that is already part of the buffer.
    pub fn get(&self, offset: usize) -> Result<u8> {
        match self.data.get(offset) {
            Some(&byte) => Ok(byte),
            None if offset < self.min_len => Ok(0),
            None => Err(PatchError::truncated(offset, 1, 0)),
        }
    }

    /// Bytes up to the highest one written. The unwritten zero tail of a
    /// fixed buffer is not included.
    pub fn as_slice(&self) -> &[u8] {
        &self.data
    }

    pub fn into_vec(mut self) -> Vec<u8> {
        if self.data.len() < self.min_len {
            self.data.resize(self.min_len, 0);
        }
        self.data
    }
}
