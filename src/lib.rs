//! Rompatch: apply binary patches in the common ROM-hacking formats.
//!
//! Supported formats: IPS, BPS, UPS, APS (simple and N64), MOD (optionally
//! Yay0-compressed), PPF and VCDIFF (RFC 3284, as written by xdelta3).
//!
//! The crate provides:
//! - One decoder per format (`formats`, `vcdiff`)
//! - Shared byte-level primitives (`codec`)
//! - A dispatcher keyed by `PatchFormat` (`engine`)
//! - File-oriented helpers (`io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```
//! use rompatch::{PatchFormat, apply_patch};
//!
//! let source = b"hello old world";
//! let patch = b"PATCH\x00\x00\x06\x00\x03newEOF";
//! let target = apply_patch(source, patch, PatchFormat::Ips, false).unwrap();
//! assert_eq!(target, b"hello new world");
//! ```

pub mod codec;
pub mod engine;
pub mod error;
pub mod formats;
pub mod io;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;

pub use engine::{ApplyOptions, apply_patch, apply_patch_by_name, apply_patch_with, inspect_patch};
pub use error::{PatchError, Result};
pub use formats::{PatchFormat, PatchInfo};
