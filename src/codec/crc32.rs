// CRC-32 (IEEE 802.3, reflected polynomial 0xEDB88320) over `crc32fast`.
//
// BPS and UPS footers and the CLI output report all use this variant.

/// Incremental CRC-32 hasher.
#[derive(Clone, Default)]
pub struct Crc32 {
    inner: crc32fast::Hasher,
}

impl Crc32 {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn update(&mut self, data: &[u8]) {
        self.inner.update(data);
    }

    /// Checksum of everything fed so far. The hasher stays usable.
    pub fn finish(&self) -> u32 {
        self.inner.clone().finalize()
    }
}

impl std::fmt::Debug for Crc32 {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Crc32").field("value", &self.finish()).finish()
    }
}

/// CRC-32 of a whole buffer.
pub fn crc32(data: &[u8]) -> u32 {
    crc32fast::hash(data)
}
