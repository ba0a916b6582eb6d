// VCDIFF file header and per-window header (RFC 3284, Section 4).
//
// File header:  magic (4) | hdr_ind (1) | [app header length + bytes]
// Window:       win_ind (1) | [copy len, copy offset] | enc_len | target len
//               | del_ind (1) | data len | inst len | addr len | [adler32 (4)]
//
// Secondary compression and custom code tables are refused with
// `UnsupportedFeature`, as is any window whose sections are compressed.

use bitflags::bitflags;

use super::varint;
use crate::codec::{ByteCursor, MAX_TARGET_SIZE};
use crate::error::{PatchError, Result};

pub const VCDIFF_MAGIC: [u8; 4] = [0xD6, 0xC3, 0xC4, 0x00];

bitflags! {
    /// File header indicator (`hdr_ind`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct HeaderIndicator: u8 {
        const SECONDARY = 1 << 0;
        const CODETABLE = 1 << 1;
        const APPHEADER = 1 << 2;
    }
}

bitflags! {
    /// Window indicator (`win_ind`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WindowIndicator: u8 {
        const SOURCE = 1 << 0;
        const TARGET = 1 << 1;
        const ADLER32 = 1 << 2;
    }
}

bitflags! {
    /// Delta indicator (`del_ind`): which sections are secondary-compressed.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 1 << 0;
        const INSTCOMP = 1 << 1;
        const ADDRCOMP = 1 << 2;
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

/// Parsed VCDIFF file header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FileHeader {
    pub indicator: HeaderIndicator,
    /// Application-defined header data (xdelta3 stores file names here).
    pub app_header: Option<Vec<u8>>,
}

impl FileHeader {
    /// Append the encoded header to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&VCDIFF_MAGIC);
        let mut indicator = self.indicator;
        indicator.set(HeaderIndicator::APPHEADER, self.app_header.is_some());
        out.push(indicator.bits());
        if let Some(data) = &self.app_header {
            varint::write_u64(out, data.len() as u64);
            out.extend_from_slice(data);
        }
    }

    pub fn decode(c: &mut ByteCursor<'_>) -> Result<Self> {
        let magic = c.read_array::<4>()?;
        if magic[..3] != VCDIFF_MAGIC[..3] {
            return Err(PatchError::malformed(format!(
                "invalid VCDIFF magic {:02X} {:02X} {:02X}",
                magic[0], magic[1], magic[2]
            )));
        }
        if magic[3] != 0x00 {
            return Err(PatchError::malformed(format!(
                "unsupported VCDIFF version {:#04X}",
                magic[3]
            )));
        }

        let raw = c.read_u8()?;
        let indicator = HeaderIndicator::from_bits(raw).ok_or_else(|| {
            PatchError::malformed(format!("invalid header indicator bits {raw:#04X}"))
        })?;
        if indicator.contains(HeaderIndicator::SECONDARY) {
            return Err(PatchError::UnsupportedFeature(
                "VCDIFF secondary compression".into(),
            ));
        }
        if indicator.contains(HeaderIndicator::CODETABLE) {
            return Err(PatchError::UnsupportedFeature(
                "VCDIFF custom code table".into(),
            ));
        }

        let app_header = if indicator.contains(HeaderIndicator::APPHEADER) {
            let len = varint::read_usize(c)?;
            Some(c.read_bytes(len)?.to_vec())
        } else {
            None
        };

        Ok(Self {
            indicator,
            app_header,
        })
    }
}

// ---------------------------------------------------------------------------
// Per-window header
// ---------------------------------------------------------------------------

/// Parsed VCDIFF per-window header.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WindowHeader {
    pub indicator: WindowIndicator,
    /// Length of the source/target copy segment.
    pub copy_window_len: u64,
    /// Offset of the copy segment in the source, or in the target so far.
    pub copy_window_offset: u64,
    /// Length of the rest of the window encoding. Not enforced.
    pub enc_len: u64,
    pub target_window_len: u64,
    pub delta_indicator: DeltaIndicator,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    /// Adler-32 of the target window, when present.
    pub adler32: Option<u32>,
}

impl WindowHeader {
    #[inline]
    pub fn has_copy_window(&self) -> bool {
        self.indicator
            .intersects(WindowIndicator::SOURCE | WindowIndicator::TARGET)
    }

    /// `enc_len` as an encoder would write it for the current fields.
    pub fn compute_enc_len(&self) -> u64 {
        let mut len = varint::sizeof_u64(self.target_window_len) as u64 + 1;
        len += varint::sizeof_u64(self.data_len) as u64;
        len += varint::sizeof_u64(self.inst_len) as u64;
        len += varint::sizeof_u64(self.addr_len) as u64;
        len += self.data_len + self.inst_len + self.addr_len;
        if self.adler32.is_some() {
            len += 4;
        }
        len
    }

    /// Append the encoded header to `out`.
    pub fn encode(&self, out: &mut Vec<u8>) {
        let mut indicator = self.indicator;
        indicator.set(WindowIndicator::ADLER32, self.adler32.is_some());
        out.push(indicator.bits());
        if self.has_copy_window() {
            varint::write_u64(out, self.copy_window_len);
            varint::write_u64(out, self.copy_window_offset);
        }
        varint::write_u64(out, self.enc_len);
        varint::write_u64(out, self.target_window_len);
        out.push(self.delta_indicator.bits());
        varint::write_u64(out, self.data_len);
        varint::write_u64(out, self.inst_len);
        varint::write_u64(out, self.addr_len);
        if let Some(sum) = self.adler32 {
            out.extend_from_slice(&sum.to_be_bytes());
        }
    }

    pub fn decode(c: &mut ByteCursor<'_>) -> Result<Self> {
        let at = c.position();
        let raw = c.read_u8()?;
        let indicator = WindowIndicator::from_bits(raw).ok_or_else(|| {
            PatchError::malformed(format!("invalid window indicator bits {raw:#04X} at {at:#X}"))
        })?;
        if indicator.contains(WindowIndicator::SOURCE | WindowIndicator::TARGET) {
            return Err(PatchError::malformed(
                "VCD_SOURCE and VCD_TARGET are mutually exclusive",
            ));
        }

        let (copy_window_len, copy_window_offset) =
            if indicator.intersects(WindowIndicator::SOURCE | WindowIndicator::TARGET) {
                (varint::read_u64(c)?, varint::read_u64(c)?)
            } else {
                (0, 0)
            };

        let enc_len = varint::read_u64(c)?;
        let target_window_len = varint::read_u64(c)?;
        if target_window_len > MAX_TARGET_SIZE {
            return Err(PatchError::invalid(format!(
                "target window of {target_window_len} bytes exceeds {MAX_TARGET_SIZE}"
            )));
        }

        let raw = c.read_u8()?;
        let delta_indicator = DeltaIndicator::from_bits(raw).ok_or_else(|| {
            PatchError::malformed(format!("invalid delta indicator bits {raw:#04X}"))
        })?;
        if !delta_indicator.is_empty() {
            return Err(PatchError::UnsupportedFeature(format!(
                "VCDIFF compressed sections ({delta_indicator:?})"
            )));
        }

        let data_len = varint::read_u64(c)?;
        let inst_len = varint::read_u64(c)?;
        let addr_len = varint::read_u64(c)?;

        let adler32 = if indicator.contains(WindowIndicator::ADLER32) {
            Some(u32::from_be_bytes(c.read_array::<4>()?))
        } else {
            None
        };

        Ok(Self {
            indicator,
            copy_window_len,
            copy_window_offset,
            enc_len,
            target_window_len,
            delta_indicator,
            data_len,
            inst_len,
            addr_len,
            adler32,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn decode_file(bytes: &[u8]) -> Result<FileHeader> {
        FileHeader::decode(&mut ByteCursor::big_endian(bytes))
    }

    fn decode_window(bytes: &[u8]) -> Result<WindowHeader> {
        WindowHeader::decode(&mut ByteCursor::big_endian(bytes))
    }

    #[test]
    fn file_header_minimal() {
        let mut buf = Vec::new();
        FileHeader::default().encode(&mut buf);
        assert_eq!(buf, [0xD6, 0xC3, 0xC4, 0x00, 0x00]);
        assert_eq!(decode_file(&buf).unwrap(), FileHeader::default());
    }

    #[test]
    fn file_header_with_app_header() {
        let hdr = FileHeader {
            indicator: HeaderIndicator::APPHEADER,
            app_header: Some(b"game.sfc//game.xdelta/".to_vec()),
        };
        let mut buf = Vec::new();
        hdr.encode(&mut buf);
        let mut c = ByteCursor::big_endian(&buf);
        assert_eq!(FileHeader::decode(&mut c).unwrap(), hdr);
        assert!(c.is_eof());
    }

    #[test]
    fn secondary_and_code_table_are_unsupported() {
        for bit in [0x01, 0x02, 0x03] {
            let data = [0xD6, 0xC3, 0xC4, 0x00, bit];
            assert!(matches!(
                decode_file(&data),
                Err(PatchError::UnsupportedFeature(_))
            ));
        }
    }

    #[test]
    fn bad_magic_version_and_bits() {
        assert!(matches!(
            decode_file(&[0, 0, 0, 0, 0]),
            Err(PatchError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_file(&[0xD6, 0xC3, 0xC4, 0x01, 0]),
            Err(PatchError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_file(&[0xD6, 0xC3, 0xC4, 0x00, 0xF0]),
            Err(PatchError::MalformedHeader(_))
        ));
        assert!(matches!(
            decode_file(&[0xD6, 0xC3]),
            Err(PatchError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn window_header_with_source_and_checksum() {
        let mut wh = WindowHeader {
            indicator: WindowIndicator::SOURCE,
            copy_window_len: 65536,
            copy_window_offset: 1024,
            target_window_len: 4096,
            data_len: 1000,
            inst_len: 500,
            addr_len: 200,
            adler32: Some(0xAABB_CCDD),
            ..Default::default()
        };
        wh.enc_len = wh.compute_enc_len();
        let mut buf = Vec::new();
        wh.encode(&mut buf);
        assert_eq!(&buf[buf.len() - 4..], &[0xAA, 0xBB, 0xCC, 0xDD]);

        let decoded = decode_window(&buf).unwrap();
        assert_eq!(decoded.copy_window_len, 65536);
        assert_eq!(decoded.copy_window_offset, 1024);
        assert_eq!(decoded.adler32, Some(0xAABB_CCDD));
        assert!(decoded.indicator.contains(WindowIndicator::ADLER32 | WindowIndicator::SOURCE));
    }

    #[test]
    fn compressed_sections_are_unsupported() {
        let wh = WindowHeader {
            target_window_len: 1,
            delta_indicator: DeltaIndicator::INSTCOMP,
            ..Default::default()
        };
        let mut buf = Vec::new();
        wh.encode(&mut buf);
        assert!(matches!(
            decode_window(&buf),
            Err(PatchError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn source_and_target_together_are_rejected() {
        assert!(matches!(
            decode_window(&[0x03]),
            Err(PatchError::MalformedHeader(_))
        ));
    }

    #[test]
    fn window_over_size_limit_is_rejected() {
        let wh = WindowHeader {
            target_window_len: MAX_TARGET_SIZE + 1,
            ..Default::default()
        };
        let mut buf = Vec::new();
        wh.encode(&mut buf);
        assert!(matches!(
            decode_window(&buf),
            Err(PatchError::InvalidData(_))
        ));
    }

    #[test]
    fn window_above_xdelta3_default_limit_parses() {
        let wh = WindowHeader {
            target_window_len: 64 << 20,
            ..Default::default()
        };
        let mut buf = Vec::new();
        wh.encode(&mut buf);
        assert_eq!(decode_window(&buf).unwrap().target_window_len, 64 << 20);
    }
}
