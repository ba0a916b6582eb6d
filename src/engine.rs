// Patch engine: picks a decoder for a format and runs it.
//
// Every decoder has the same shape, `(source, patch, &ApplyOptions) ->
// Result<Vec<u8>>`, and never calls another decoder. The engine is the
// only place that maps a `PatchFormat` to one.

use log::debug;

use crate::error::Result;
use crate::formats::{PatchFormat, PatchInfo, aps, bps, ips, mod_patch, ppf, ups};
use crate::vcdiff;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Caller-supplied switches for one apply call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOptions {
    /// Skip source checksum verification (BPS, UPS, APS N64, VCDIFF
    /// Adler-32). Bounds and truncation checks still apply.
    pub ignore_checksums: bool,
}

impl ApplyOptions {
    pub fn ignoring_checksums(ignore_checksums: bool) -> Self {
        Self { ignore_checksums }
    }
}

// ---------------------------------------------------------------------------
// Apply
// ---------------------------------------------------------------------------

/// Apply `patch` to `source`, producing the target.
///
/// On error no partial output is returned.
pub fn apply_patch(
    source: &[u8],
    patch: &[u8],
    format: PatchFormat,
    ignore_checksums: bool,
) -> Result<Vec<u8>> {
    apply_patch_with(
        source,
        patch,
        format,
        &ApplyOptions::ignoring_checksums(ignore_checksums),
    )
}

/// [`apply_patch`] with an options struct.
pub fn apply_patch_with(
    source: &[u8],
    patch: &[u8],
    format: PatchFormat,
    opts: &ApplyOptions,
) -> Result<Vec<u8>> {
    debug!(
        "applying {format} patch: source {} bytes, patch {} bytes{}",
        source.len(),
        patch.len(),
        if opts.ignore_checksums {
            ", checksums ignored"
        } else {
            ""
        }
    );
    let decode = match format {
        PatchFormat::Ips => ips::apply,
        PatchFormat::Bps => bps::apply,
        PatchFormat::Ups => ups::apply,
        PatchFormat::Aps => aps::apply,
        PatchFormat::Mod => mod_patch::apply,
        PatchFormat::Ppf => ppf::apply,
        PatchFormat::Vcdiff => vcdiff::apply,
    };
    let target = decode(source, patch, opts)?;
    debug!("{format} patch produced {} bytes", target.len());
    Ok(target)
}

/// Resolve the format from a patch file name, then apply.
///
/// An unrecognised extension fails with `UnsupportedFormat` before the
/// patch is looked at.
pub fn apply_patch_by_name(
    source: &[u8],
    patch: &[u8],
    patch_name: &str,
    ignore_checksums: bool,
) -> Result<Vec<u8>> {
    let format = PatchFormat::from_path(patch_name)?;
    apply_patch(source, patch, format, ignore_checksums)
}

// ---------------------------------------------------------------------------
// Inspect
// ---------------------------------------------------------------------------

/// Read a patch's header facts without applying it. No source is needed
/// and no checksum is verified.
pub fn inspect_patch(patch: &[u8], format: PatchFormat) -> Result<PatchInfo> {
    match format {
        PatchFormat::Ips => ips::inspect(patch),
        PatchFormat::Bps => bps::inspect(patch),
        PatchFormat::Ups => ups::inspect(patch),
        PatchFormat::Aps => aps::inspect(patch),
        PatchFormat::Mod => mod_patch::inspect(patch),
        PatchFormat::Ppf => ppf::inspect(patch),
        PatchFormat::Vcdiff => vcdiff::inspect(patch),
    }
}
