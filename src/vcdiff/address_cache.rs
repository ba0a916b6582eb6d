// VCDIFF address cache (RFC 3284, Section 5.3).
//
// NEAR and SAME caches that let COPY instructions encode their address
// relative to recently used ones. Default sizes only (s_near = 4,
// s_same = 3), which gives nine address modes:
//
//   0      VCD_SELF  absolute varint
//   1      VCD_HERE  here - varint
//   2..5   NEAR      near[mode - 2] + varint
//   6..8   SAME      same[(mode - 6) * 256 + byte]
//
// Every decoded address, whatever its mode, goes through `update`, which
// writes the next NEAR slot round-robin and the SAME slot `addr % 768`.

use super::varint;
use crate::codec::ByteCursor;
use crate::error::{PatchError, Result};

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address relative to "here" (current position in address space).
pub const VCD_HERE: u8 = 1;

pub const S_NEAR: usize = 4;
pub const S_SAME: usize = 3;
pub const SAME_LEN: usize = S_SAME * 256;

/// First SAME mode.
const SAME_START: u8 = 2 + S_NEAR as u8;
/// Number of address modes.
pub const MODE_COUNT: u8 = SAME_START + S_SAME as u8;

/// NEAR/SAME address cache for one decode session.
#[derive(Clone)]
pub struct AddressCache {
    near: [u64; S_NEAR],
    same: Box<[u64; SAME_LEN]>,
    next_slot: usize,
}

impl AddressCache {
    pub fn new() -> Self {
        Self {
            near: [0; S_NEAR],
            same: Box::new([0; SAME_LEN]),
            next_slot: 0,
        }
    }

    /// Reset to all zeros. Called at the start of each window.
    pub fn init(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    #[inline]
    pub fn update(&mut self, addr: u64) {
        self.near[self.next_slot] = addr;
        self.next_slot = (self.next_slot + 1) % S_NEAR;
        self.same[(addr % SAME_LEN as u64) as usize] = addr;
    }

    /// Decode one COPY address.
    ///
    /// `addrs` is the window's address section; `here` is the current
    /// position in the address space (copy segment length plus target
    /// bytes decoded so far). The result is always below `here`.
    pub fn decode(&mut self, mode: u8, addrs: &mut ByteCursor<'_>, here: u64) -> Result<u64> {
        let addr = match mode {
            VCD_SELF => varint::read_u64(addrs)?,
            VCD_HERE => {
                let distance = varint::read_u64(addrs)?;
                here.checked_sub(distance).ok_or_else(|| {
                    PatchError::invalid(format!("VCD_HERE distance {distance} exceeds position {here}"))
                })?
            }
            m if m < SAME_START => {
                let offset = varint::read_u64(addrs)?;
                self.near[usize::from(m - 2)]
                    .checked_add(offset)
                    .ok_or_else(|| PatchError::invalid("NEAR address overflows"))?
            }
            m if m < MODE_COUNT => {
                let byte = addrs.read_u8()?;
                self.same[usize::from(m - SAME_START) * 256 + usize::from(byte)]
            }
            m => return Err(PatchError::invalid(format!("address mode {m} out of range"))),
        };

        if addr >= here {
            return Err(PatchError::invalid(format!(
                "COPY address {addr} not below current position {here}"
            )));
        }

        self.update(addr);
        Ok(addr)
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}
