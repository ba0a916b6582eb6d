// VCDIFF decoder: window parsing and instruction execution.
//
// Parse the file header, then for each window:
//   1. window header (copy segment, target length, section lengths)
//   2. borrow the data, instruction and address sections, which follow the
//      header back to back; the main cursor ends up after the address
//      section, where the next window starts
//   3. run the instruction section through the default code table
//   4. check the window produced exactly its declared length, and compare
//      the Adler-32 if one was stored
//
// The address space of a window is its copy segment followed by the target
// window under construction. COPY reads that may overlap the bytes they are
// producing are done one byte at a time.

use std::borrow::Cow;

use log::{debug, trace, warn};

use super::address_cache::AddressCache;
use super::code_table::{self, Half, InstKind};
use super::header::{FileHeader, WindowHeader, WindowIndicator};
use super::varint;
use crate::codec::{ByteCursor, TargetBuffer, declared_size};
use crate::engine::ApplyOptions;
use crate::error::{PatchError, Result};
use crate::formats::{PatchFormat, PatchInfo, header_text};

// ---------------------------------------------------------------------------
// Decode session
// ---------------------------------------------------------------------------

/// State for one `apply` call: the source, the output so far and the
/// address cache reused (and reset) for every window.
struct Session<'s> {
    source: &'s [u8],
    output: Vec<u8>,
    cache: AddressCache,
    verify_checksums: bool,
}

/// The three sections of one window.
struct Sections<'a> {
    data: ByteCursor<'a>,
    inst: ByteCursor<'a>,
    addr: ByteCursor<'a>,
}

impl<'s> Session<'s> {
    fn new(source: &'s [u8], opts: &ApplyOptions) -> Self {
        Self {
            source,
            output: Vec::new(),
            cache: AddressCache::new(),
            verify_checksums: !opts.ignore_checksums,
        }
    }

    /// Resolve the window's copy segment: a slice of the source, or of the
    /// output produced by earlier windows.
    fn copy_segment(&self, header: &WindowHeader) -> Result<Cow<'s, [u8]>> {
        if !header.has_copy_window() {
            return Ok(Cow::Borrowed(&[]));
        }
        let from_target = header.indicator.contains(WindowIndicator::TARGET);
        let base: &[u8] = if from_target {
            &self.output
        } else {
            self.source
        };
        let range = usize::try_from(header.copy_window_offset)
            .ok()
            .zip(usize::try_from(header.copy_window_len).ok())
            .and_then(|(offset, len)| Some(offset..offset.checked_add(len)?))
            .filter(|r| r.end <= base.len())
            .ok_or_else(|| PatchError::TruncatedInput {
                offset: header.copy_window_offset,
                needed: header.copy_window_len,
                available: (base.len() as u64).saturating_sub(header.copy_window_offset),
            })?;

        let source: &'s [u8] = self.source;
        Ok(if from_target {
            Cow::Owned(self.output[range].to_vec())
        } else {
            Cow::Borrowed(&source[range])
        })
    }

    /// Decode one window from `c` and append it to the output.
    fn window(&mut self, c: &mut ByteCursor<'_>, index: u64) -> Result<()> {
        let header = WindowHeader::decode(c)?;
        debug!(
            "vcdiff: window {index}: {:?} copy {}@{}, target {} bytes, sections {}/{}/{}",
            header.indicator,
            header.copy_window_len,
            header.copy_window_offset,
            header.target_window_len,
            header.data_len,
            header.inst_len,
            header.addr_len
        );

        let mut sections = Sections {
            data: ByteCursor::big_endian(c.read_bytes(section_len(header.data_len)?)?),
            inst: ByteCursor::big_endian(c.read_bytes(section_len(header.inst_len)?)?),
            addr: ByteCursor::big_endian(c.read_bytes(section_len(header.addr_len)?)?),
        };

        let segment = self.copy_segment(&header)?;
        let target_len = declared_size(header.target_window_len)?;
        let mut target = TargetBuffer::growable(&[], target_len);

        self.cache.init();
        let table = code_table::default_code_table();
        while !sections.inst.is_eof() {
            let opcode = sections.inst.read_u8()?;
            let entry = &table[usize::from(opcode)];
            for half in [entry.first, entry.second] {
                if half.kind != InstKind::Noop {
                    self.execute(half, &mut sections, &segment, &mut target)?;
                }
            }
        }

        if target.len() != target_len {
            return Err(PatchError::invalid(format!(
                "window {index} produced {} bytes, header declares {target_len}",
                target.len()
            )));
        }

        if let Some(expected) = header.adler32
            && self.verify_checksums
        {
            let actual = adler32(target.as_slice());
            if actual != expected {
                warn!(
                    "vcdiff: window {index} adler32 mismatch: expected {expected:#010X}, got {actual:#010X}"
                );
            }
        }

        self.output.extend_from_slice(target.as_slice());
        Ok(())
    }

    fn execute(
        &mut self,
        half: Half,
        s: &mut Sections<'_>,
        segment: &[u8],
        target: &mut TargetBuffer,
    ) -> Result<()> {
        let size = match half.size {
            0 => varint::read_usize(&mut s.inst)?,
            n => usize::from(n),
        };
        let pos = target.len();

        match half.kind {
            InstKind::Noop => {}
            InstKind::Add => {
                trace!("vcdiff: ADD {size} at {pos}");
                target.write(pos, s.data.read_bytes(size)?)?;
            }
            InstKind::Run => {
                let byte = s.data.read_u8()?;
                trace!("vcdiff: RUN {size} x {byte:#04X} at {pos}");
                target.fill(pos, size, byte)?;
            }
            InstKind::Copy(mode) => {
                let here = segment.len() as u64 + pos as u64;
                let addr = self.cache.decode(mode, &mut s.addr, here)?;
                trace!("vcdiff: COPY {size} from {addr} (mode {mode}) at {pos}");
                copy(segment, target, addr, size)?;
            }
        }
        Ok(())
    }
}

/// Copy `size` bytes from `addr` in the window's address space to the end
/// of `target`.
fn copy(segment: &[u8], target: &mut TargetBuffer, addr: u64, size: usize) -> Result<()> {
    let pos = target.len();
    let seg_len = segment.len() as u64;

    // Entirely inside the copy segment: no overlap with the output.
    if let Some(end) = addr.checked_add(size as u64)
        && end <= seg_len
    {
        return target.write(pos, &segment[addr as usize..end as usize]);
    }

    for i in 0..size {
        let a = addr + i as u64;
        let byte = if a < seg_len {
            segment[a as usize]
        } else {
            target.get((a - seg_len) as usize)?
        };
        target.write(pos + i, &[byte])?;
    }
    Ok(())
}

fn section_len(len: u64) -> Result<usize> {
    usize::try_from(len)
        .map_err(|_| PatchError::invalid(format!("section length {len} does not fit in usize")))
}

// ---------------------------------------------------------------------------
// Adler-32
// ---------------------------------------------------------------------------

pub fn adler32(data: &[u8]) -> u32 {
    #[cfg(feature = "adler32")]
    {
        let mut hasher = simd_adler32::Adler32::new();
        hasher.write(data);
        hasher.finish()
    }
    #[cfg(not(feature = "adler32"))]
    {
        const MOD_ADLER: u32 = 65521;
        let mut a: u32 = 1;
        let mut b: u32 = 0;
        for &byte in data {
            a = (a + u32::from(byte)) % MOD_ADLER;
            b = (b + a) % MOD_ADLER;
        }
        (b << 16) | a
    }
}

// ---------------------------------------------------------------------------
// Entry points
// ---------------------------------------------------------------------------

/// Apply a VCDIFF delta to `source`.
pub fn apply(source: &[u8], patch: &[u8], opts: &ApplyOptions) -> Result<Vec<u8>> {
    let mut c = ByteCursor::big_endian(patch);
    let header = FileHeader::decode(&mut c)?;
    if let Some(app) = &header.app_header {
        debug!("vcdiff: application header of {} bytes", app.len());
    }

    let mut session = Session::new(source, opts);
    let mut windows = 0u64;
    while !c.is_eof() {
        session.window(&mut c, windows)?;
        windows += 1;
    }
    debug!("vcdiff: {windows} windows, output {} bytes", session.output.len());
    Ok(session.output)
}

/// Walk the file and window headers without decoding instructions.
pub fn inspect(patch: &[u8]) -> Result<PatchInfo> {
    let mut c = ByteCursor::big_endian(patch);
    let header = FileHeader::decode(&mut c)?;

    let mut info = PatchInfo::new(PatchFormat::Vcdiff);
    if let Some(app) = &header.app_header {
        info.variant = Some("appheader".to_string());
        info.description = header_text(app);
    }

    let mut target_size = 0u64;
    let mut source_size = None;
    while !c.is_eof() {
        let window = WindowHeader::decode(&mut c)?;
        c.skip(section_len(window.data_len)?)?;
        c.skip(section_len(window.inst_len)?)?;
        c.skip(section_len(window.addr_len)?)?;

        if window.indicator.contains(WindowIndicator::SOURCE) {
            let end = window
                .copy_window_offset
                .saturating_add(window.copy_window_len);
            source_size = Some(source_size.unwrap_or(0u64).max(end));
        }
        target_size = target_size.saturating_add(window.target_window_len);
        info.records += 1;
    }
    info.source_size = source_size;
    info.target_size = Some(target_size);
    Ok(info)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::header::HeaderIndicator;

    /// Hand-assemble a single-window delta.
    fn delta(
        copy: Option<(WindowIndicator, u64, u64)>,
        target_len: u64,
        data: &[u8],
        inst: &[u8],
        addr: &[u8],
        adler: Option<u32>,
    ) -> Vec<u8> {
        let mut out = Vec::new();
        FileHeader::default().encode(&mut out);
        push_window(&mut out, copy, target_len, data, inst, addr, adler);
        out
    }

    fn push_window(
        out: &mut Vec<u8>,
        copy: Option<(WindowIndicator, u64, u64)>,
        target_len: u64,
        data: &[u8],
        inst: &[u8],
        addr: &[u8],
        adler: Option<u32>,
    ) {
        let (indicator, copy_window_len, copy_window_offset) =
            copy.unwrap_or((WindowIndicator::empty(), 0, 0));
        let mut wh = WindowHeader {
            indicator,
            copy_window_len,
            copy_window_offset,
            target_window_len: target_len,
            data_len: data.len() as u64,
            inst_len: inst.len() as u64,
            addr_len: addr.len() as u64,
            adler32: adler,
            ..Default::default()
        };
        wh.enc_len = wh.compute_enc_len();
        wh.encode(out);
        out.extend_from_slice(data);
        out.extend_from_slice(inst);
        out.extend_from_slice(addr);
    }

    fn run(source: &[u8], patch: &[u8]) -> Result<Vec<u8>> {
        apply(source, patch, &ApplyOptions::default())
    }

    // Opcodes from the default table.
    const ADD_1: u8 = 2;
    const ADD_VAR: u8 = 1;
    const RUN_VAR: u8 = 0;
    const COPY_SELF_4: u8 = 20;
    const COPY_HERE_6: u8 = 38;
    const COPY_SELF_VAR: u8 = 19;

    #[test]
    fn add_then_overlapping_here_copy() {
        // ADD 'x', then COPY 6 from HERE - 1: a run of seven 'x'.
        let patch = delta(None, 7, b"x", &[ADD_1, COPY_HERE_6], &[1], None);
        assert_eq!(run(&[], &patch).unwrap(), b"xxxxxxx");
    }

    #[test]
    fn same_thing_through_a_double_opcode() {
        // 177 = ADD(1) + COPY(6, mode 1).
        let patch = delta(None, 7, b"x", &[177], &[1], None);
        assert_eq!(run(&[], &patch).unwrap(), b"xxxxxxx");
    }

    #[test]
    fn run_and_add_with_varint_sizes() {
        let patch = delta(None, 25, &[0xAB, b'h', b'i'], &[RUN_VAR, 23, ADD_VAR, 2], &[], None);
        let mut expected = vec![0xAB; 23];
        expected.extend_from_slice(b"hi");
        assert_eq!(run(&[], &patch).unwrap(), expected);
    }

    #[test]
    fn source_copy() {
        let source = b"ABCDEFGHIJKLMNOP";
        let patch = delta(
            Some((WindowIndicator::SOURCE, 16, 0)),
            8,
            &[],
            &[COPY_SELF_VAR, 8],
            &[4],
            None,
        );
        assert_eq!(run(source, &patch).unwrap(), b"EFGHIJKL");
    }

    #[test]
    fn copy_segment_offset_is_honoured() {
        let source = b"0123456789";
        let patch = delta(
            Some((WindowIndicator::SOURCE, 4, 6)),
            4,
            &[],
            &[COPY_SELF_4],
            &[0],
            None,
        );
        assert_eq!(run(source, &patch).unwrap(), b"6789");
    }

    #[test]
    fn target_window_copies_earlier_output() {
        let mut patch = Vec::new();
        FileHeader::default().encode(&mut patch);
        push_window(&mut patch, None, 4, b"abcd", &[5], &[], None);
        push_window(
            &mut patch,
            Some((WindowIndicator::TARGET, 4, 0)),
            4,
            &[],
            &[COPY_SELF_4],
            &[0],
            None,
        );
        assert_eq!(run(&[], &patch).unwrap(), b"abcdabcd");
    }

    #[test]
    fn app_header_is_skipped() {
        let mut patch = Vec::new();
        FileHeader {
            indicator: HeaderIndicator::APPHEADER,
            app_header: Some(b"rom.bin//rom.xdelta/".to_vec()),
        }
        .encode(&mut patch);
        push_window(&mut patch, None, 1, b"z", &[ADD_1], &[], None);
        assert_eq!(run(&[], &patch).unwrap(), b"z");
        let info = inspect(&patch).unwrap();
        assert_eq!(info.description.as_deref(), Some("rom.bin//rom.xdelta/"));
        assert_eq!(info.records, 1);
    }

    #[test]
    fn header_only_yields_empty_output() {
        let mut patch = Vec::new();
        FileHeader::default().encode(&mut patch);
        assert_eq!(run(b"src", &patch).unwrap(), Vec::<u8>::new());
    }

    #[test]
    fn short_window_is_invalid() {
        let patch = delta(None, 5, b"x", &[ADD_1], &[], None);
        assert!(matches!(run(&[], &patch), Err(PatchError::InvalidData(_))));
    }

    #[test]
    fn overlong_window_is_bounds_violation() {
        let patch = delta(None, 1, b"xy", &[ADD_1, ADD_1], &[], None);
        assert!(matches!(
            run(&[], &patch),
            Err(PatchError::BoundsViolation { .. })
        ));
    }

    #[test]
    fn copy_from_the_future_is_invalid() {
        let patch = delta(None, 4, &[], &[COPY_SELF_4], &[0], None);
        assert!(matches!(run(&[], &patch), Err(PatchError::InvalidData(_))));
    }

    #[test]
    fn missing_source_segment_is_truncation() {
        let patch = delta(
            Some((WindowIndicator::SOURCE, 8, 0)),
            4,
            &[],
            &[COPY_SELF_4],
            &[0],
            None,
        );
        assert!(matches!(
            run(b"abc", &patch),
            Err(PatchError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn section_lengths_past_end_are_truncation() {
        let mut patch = delta(None, 2, b"ab", &[ADD_1, ADD_1], &[], None);
        patch.truncate(patch.len() - 1);
        assert!(matches!(
            run(&[], &patch),
            Err(PatchError::TruncatedInput { .. })
        ));
    }

    #[test]
    fn adler32_mismatch_only_warns() {
        let good = adler32(b"ok");
        let patch = delta(None, 2, b"ok", &[ADD_1, ADD_1], &[], Some(good));
        assert_eq!(run(&[], &patch).unwrap(), b"ok");
        let patch = delta(None, 2, b"ok", &[ADD_1, ADD_1], &[], Some(good ^ 1));
        assert_eq!(run(&[], &patch).unwrap(), b"ok");
    }

    #[test]
    fn adler32_reference_values() {
        assert_eq!(adler32(b""), 1);
        assert_eq!(adler32(b"Wikipedia"), 0x11E6_0398);
    }

    #[test]
    fn secondary_compression_fails_immediately() {
        let patch = [0xD6, 0xC3, 0xC4, 0x00, 0x01, 0xFF, 0xFF];
        assert!(matches!(
            run(&[], &patch),
            Err(PatchError::UnsupportedFeature(_))
        ));
    }

    #[test]
    fn inspect_sums_windows() {
        let mut patch = Vec::new();
        FileHeader::default().encode(&mut patch);
        push_window(&mut patch, None, 3, b"abc", &[4], &[], None);
        push_window(
            &mut patch,
            Some((WindowIndicator::SOURCE, 4, 10)),
            4,
            &[],
            &[COPY_SELF_4],
            &[0],
            None,
        );
        let info = inspect(&patch).unwrap();
        assert_eq!(info.records, 2);
        assert_eq!(info.target_size, Some(7));
        assert_eq!(info.source_size, Some(14));
        assert_eq!(info.variant, None);
    }
}
