// File-level helpers for applying patches.
//
// `apply_file()` reads the source and patch fully into memory, resolves
// the format from the patch path when none is given, applies, and writes
// the output through a `BufWriter`. The `*_loaded` variants take a patch
// the caller has already read. Optionally computes a SHA-256 of the
// output (feature-gated behind `file-io`).

use std::ffi::OsString;
use std::fs::File;
use std::io::{self, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, info};
#[cfg(feature = "file-io")]
use sha2::Digest;

use crate::codec::crc32;
use crate::engine::{ApplyOptions, apply_patch_with};
use crate::error::PatchError;
use crate::formats::PatchFormat;

// ---------------------------------------------------------------------------
// Stats
// ---------------------------------------------------------------------------

/// Statistics returned by `apply_file()`.
#[derive(Debug, Clone)]
pub struct ApplyStats {
    /// Format the patch was applied as.
    pub format: PatchFormat,
    /// Source file size in bytes.
    pub source_size: u64,
    /// Patch file size in bytes.
    pub patch_size: u64,
    /// Patched output size in bytes.
    pub output_size: u64,
    /// CRC32 of the patched output.
    pub output_crc32: u32,
    /// SHA-256 of the patched output (if `file-io` feature is enabled).
    pub output_sha256: Option<[u8; 32]>,
}

impl ApplyStats {
    pub(crate) fn describe(format: PatchFormat, source: &[u8], patch: &[u8], output: &[u8]) -> Self {
        Self {
            format,
            source_size: source.len() as u64,
            patch_size: patch.len() as u64,
            output_size: output.len() as u64,
            output_crc32: crc32(output),
            output_sha256: sha256(output),
        }
    }
}

#[cfg(feature = "file-io")]
fn sha256(data: &[u8]) -> Option<[u8; 32]> {
    Some(sha2::Sha256::digest(data).into())
}

#[cfg(not(feature = "file-io"))]
fn sha256(_data: &[u8]) -> Option<[u8; 32]> {
    None
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

/// Error type for file-level operations.
#[derive(Debug)]
pub enum ApplyError {
    /// I/O error (file open, read, write).
    Io(io::Error),
    /// The patch could not be applied.
    Patch(PatchError),
}

impl std::fmt::Display for ApplyError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io(e) => write!(f, "I/O error: {e}"),
            Self::Patch(e) => write!(f, "{e}"),
        }
    }
}

impl std::error::Error for ApplyError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Patch(e) => Some(e),
        }
    }
}

impl From<io::Error> for ApplyError {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<PatchError> for ApplyError {
    fn from(e: PatchError) -> Self {
        Self::Patch(e)
    }
}

// ---------------------------------------------------------------------------
// Default buffer size
// ---------------------------------------------------------------------------

const BUF_SIZE: usize = 64 * 1024; // 64 KiB

// ---------------------------------------------------------------------------
// apply_file
// ---------------------------------------------------------------------------

/// Apply the patch at `patch_path` to the file at `source_path`, writing
/// the result to `output_path`.
///
/// When `format` is `None` it is taken from the patch file's extension.
/// The output file is only created once the patch applied cleanly.
pub fn apply_file(
    source_path: &Path,
    patch_path: &Path,
    format: Option<PatchFormat>,
    output_path: &Path,
    opts: &ApplyOptions,
) -> Result<ApplyStats, ApplyError> {
    let format = match format {
        Some(f) => f,
        None => PatchFormat::from_path(patch_path)?,
    };

    let patch = std::fs::read(patch_path)?;
    debug!("read {} ({} bytes)", patch_path.display(), patch.len());
    apply_loaded(source_path, &patch, format, output_path, opts)
}

/// `apply_file()` for a patch that is already in memory.
pub fn apply_loaded(
    source_path: &Path,
    patch: &[u8],
    format: PatchFormat,
    output_path: &Path,
    opts: &ApplyOptions,
) -> Result<ApplyStats, ApplyError> {
    let source = std::fs::read(source_path)?;
    debug!("read {} ({} bytes)", source_path.display(), source.len());

    let output = apply_patch_with(&source, patch, format, opts)?;

    let mut writer = BufWriter::with_capacity(BUF_SIZE, File::create(output_path)?);
    writer.write_all(&output)?;
    writer.flush()?;
    info!(
        "wrote {} bytes to {}",
        output.len(),
        output_path.display()
    );

    Ok(ApplyStats::describe(format, &source, patch, &output))
}

/// Apply in memory only and report what the output would be, without
/// writing anything.
pub fn check_file(
    source_path: &Path,
    patch_path: &Path,
    format: Option<PatchFormat>,
    opts: &ApplyOptions,
) -> Result<ApplyStats, ApplyError> {
    let format = match format {
        Some(f) => f,
        None => PatchFormat::from_path(patch_path)?,
    };
    let patch = std::fs::read(patch_path)?;
    check_loaded(source_path, &patch, format, opts)
}

/// `check_file()` for a patch that is already in memory.
pub fn check_loaded(
    source_path: &Path,
    patch: &[u8],
    format: PatchFormat,
    opts: &ApplyOptions,
) -> Result<ApplyStats, ApplyError> {
    let source = std::fs::read(source_path)?;
    let output = apply_patch_with(&source, patch, format, opts)?;
    Ok(ApplyStats::describe(format, &source, patch, &output))
}

/// `"<stem> (Patched).<ext>"` next to the source file.
pub fn default_output_path(source_path: &Path) -> PathBuf {
    let mut name = source_path
        .file_stem()
        .map(OsString::from)
        .unwrap_or_default();
    name.push(" (Patched)");
    if let Some(ext) = source_path.extension() {
        name.push(".");
        name.push(ext);
    }
    source_path.with_file_name(name)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
