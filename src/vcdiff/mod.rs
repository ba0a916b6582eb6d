// VCDIFF delta decoding (RFC 3284), default code table only.
//
// - `varint`:         big-endian base-128 integers
// - `address_cache`:  NEAR/SAME caches for COPY addresses
// - `code_table`:     the default 256-entry instruction table
// - `header`:         file and window headers
// - `decoder`:        window reconstruction

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod header;
pub mod varint;

pub use address_cache::AddressCache;
pub use code_table::{CodeTable, CodeTableEntry, InstKind, default_code_table};
pub use decoder::{adler32, apply, inspect};
pub use header::{FileHeader, HeaderIndicator, VCDIFF_MAGIC, WindowHeader, WindowIndicator};
