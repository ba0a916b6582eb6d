// Record-oriented patch formats and the shared format descriptor.
//
// - `ips`:        IPS ("PATCH" ... "EOF"), literal and RLE records
// - `bps`:        BPS ("BPS1"), four copy commands, CRC32 footer
// - `ups`:        UPS ("UPS1"), XOR hunks, CRC32 footer
// - `aps`:        APS ("APS10"), simple and N64 modes
// - `mod_patch`:  MOD record list, optionally Yay0-compressed
// - `ppf`:        PPF literal records
//
// VCDIFF lives in its own module tree (`crate::vcdiff`).

pub mod aps;
pub mod bps;
pub mod ips;
pub mod mod_patch;
pub mod ppf;
pub mod ups;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::error::PatchError;

// ---------------------------------------------------------------------------
// PatchFormat
// ---------------------------------------------------------------------------

/// Every patch format the engine can apply.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PatchFormat {
    Ips,
    Bps,
    Ups,
    Aps,
    Mod,
    Ppf,
    Vcdiff,
}

impl PatchFormat {
    pub const ALL: [PatchFormat; 7] = [
        PatchFormat::Ips,
        PatchFormat::Bps,
        PatchFormat::Ups,
        PatchFormat::Aps,
        PatchFormat::Mod,
        PatchFormat::Ppf,
        PatchFormat::Vcdiff,
    ];

    /// Short lowercase name.
    pub fn name(self) -> &'static str {
        match self {
            Self::Ips => "ips",
            Self::Bps => "bps",
            Self::Ups => "ups",
            Self::Aps => "aps",
            Self::Mod => "mod",
            Self::Ppf => "ppf",
            Self::Vcdiff => "vcdiff",
        }
    }

    /// File extensions (without dot) that select this format.
    pub fn extensions(self) -> &'static [&'static str] {
        match self {
            Self::Ips => &["ips"],
            Self::Bps => &["bps"],
            Self::Ups => &["ups"],
            Self::Aps => &["aps"],
            Self::Mod => &["mod"],
            Self::Ppf => &["ppf"],
            Self::Vcdiff => &["xdelta", "vcdiff"],
        }
    }

    /// Look up a format by file extension. Case-insensitive; a leading
    /// dot is ignored.
    pub fn from_extension(ext: &str) -> Result<Self, PatchError> {
        let ext = ext.strip_prefix('.').unwrap_or(ext).to_ascii_lowercase();
        Self::ALL
            .into_iter()
            .find(|f| f.extensions().contains(&ext.as_str()))
            .ok_or(PatchError::UnsupportedFormat(ext))
    }

    /// Look up a format from the extension of a patch file name.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, PatchError> {
        let path = path.as_ref();
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .ok_or_else(|| PatchError::UnsupportedFormat(path.display().to_string()))?;
        Self::from_extension(ext)
    }

    /// Best-effort identification from leading magic bytes.
    ///
    /// MOD patches have no magic of their own; only a Yay0-compressed one
    /// is recognised.
    pub fn detect(patch: &[u8]) -> Option<Self> {
        let signatures: [(&[u8], PatchFormat); 7] = [
            (ips::MAGIC, PatchFormat::Ips),
            (bps::MAGIC, PatchFormat::Bps),
            (ups::MAGIC, PatchFormat::Ups),
            (aps::MAGIC, PatchFormat::Aps),
            (ppf::MAGIC, PatchFormat::Ppf),
            (&crate::codec::yay0::MAGIC[..], PatchFormat::Mod),
            (&crate::vcdiff::VCDIFF_MAGIC[..3], PatchFormat::Vcdiff),
        ];
        signatures
            .iter()
            .find(|(magic, _)| patch.starts_with(magic))
            .map(|&(_, format)| format)
    }
}

impl fmt::Display for PatchFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for PatchFormat {
    type Err = PatchError;

    /// Accepts a format name or any of its extensions.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_extension(s)
    }
}

// ---------------------------------------------------------------------------
// PatchInfo
// ---------------------------------------------------------------------------

/// Header facts about a patch, gathered without applying it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PatchInfo {
    pub format: PatchFormat,
    /// Format variant or mode, e.g. "n64" for APS.
    pub variant: Option<String>,
    /// Free-form text carried by the patch (APS/PPF description, BPS
    /// metadata, VCDIFF application header).
    pub description: Option<String>,
    pub source_size: Option<u64>,
    pub target_size: Option<u64>,
    pub source_crc32: Option<u32>,
    pub target_crc32: Option<u32>,
    pub patch_crc32: Option<u32>,
    /// Records (IPS, APS, MOD, PPF), commands (BPS), hunks (UPS) or
    /// windows (VCDIFF).
    pub records: u64,
}

impl PatchInfo {
    pub fn new(format: PatchFormat) -> Self {
        Self {
            format,
            variant: None,
            description: None,
            source_size: None,
            target_size: None,
            source_crc32: None,
            target_crc32: None,
            patch_crc32: None,
            records: 0,
        }
    }
}

/// Decode fixed-width header text, dropping NUL padding and whitespace.
pub(crate) fn header_text(bytes: &[u8]) -> Option<String> {
    let end = bytes.iter().position(|&b| b == 0).unwrap_or(bytes.len());
    let text = String::from_utf8_lossy(&bytes[..end]).trim().to_string();
    (!text.is_empty()).then_some(text)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extensions_map_to_formats() {
        assert_eq!(PatchFormat::from_extension("ips").unwrap(), PatchFormat::Ips);
        assert_eq!(PatchFormat::from_extension(".BPS").unwrap(), PatchFormat::Bps);
        assert_eq!(
            PatchFormat::from_extension("xdelta").unwrap(),
            PatchFormat::Vcdiff
        );
        assert_eq!(
            PatchFormat::from_extension("VcDiff").unwrap(),
            PatchFormat::Vcdiff
        );
    }

    #[test]
    fn unknown_extension_is_unsupported() {
        assert_eq!(
            PatchFormat::from_extension(".zzz"),
            Err(PatchError::UnsupportedFormat("zzz".into()))
        );
        assert!(matches!(
            PatchFormat::from_path("notes"),
            Err(PatchError::UnsupportedFormat(_))
        ));
    }

    #[test]
    fn from_path_uses_last_extension() {
        assert_eq!(
            PatchFormat::from_path("hacks/Super Game (v1.1).ups").unwrap(),
            PatchFormat::Ups
        );
        assert_eq!(
            PatchFormat::from_path("a.tar.ppf").unwrap(),
            PatchFormat::Ppf
        );
    }

    #[test]
    fn every_format_round_trips_through_its_name() {
        for format in PatchFormat::ALL {
            assert_eq!(format.name().parse::<PatchFormat>().unwrap(), format);
        }
    }

    #[test]
    fn detect_by_magic() {
        assert_eq!(PatchFormat::detect(b"PATCHEOF"), Some(PatchFormat::Ips));
        assert_eq!(PatchFormat::detect(b"BPS1...."), Some(PatchFormat::Bps));
        assert_eq!(PatchFormat::detect(b"UPS1...."), Some(PatchFormat::Ups));
        assert_eq!(PatchFormat::detect(b"APS10..."), Some(PatchFormat::Aps));
        assert_eq!(PatchFormat::detect(b"PPF30..."), Some(PatchFormat::Ppf));
        assert_eq!(PatchFormat::detect(b"Yay0...."), Some(PatchFormat::Mod));
        assert_eq!(
            PatchFormat::detect(&[0xD6, 0xC3, 0xC4, 0x00, 0x00]),
            Some(PatchFormat::Vcdiff)
        );
        assert_eq!(PatchFormat::detect(b"\0\0\0\0"), None);
    }

    #[test]
    fn header_text_trims_padding() {
        assert_eq!(header_text(b"My Hack  \0\0\0junk"), Some("My Hack".into()));
        assert_eq!(header_text(b"\0\0\0"), None);
    }
}
