//! CRC32 accumulator — thin wrapper over [`crc32fast::Hasher`].
//!
//! Both checksum channels the format requires (`streaming_crc32` over
//! framed item bytes, `contents_crc32` over payload bytes only, `index_crc32`
//! over the decompressed Index Region) are running sums computed
//! incrementally as bytes are written or read; this type is the one thing
//! all three have in common.

use crc32fast::Hasher;

#[derive(Debug, Default)]
pub struct RunningCrc32 {
    hasher: Hasher,
}

impl RunningCrc32 {
    pub fn new() -> Self {
        Self { hasher: Hasher::new() }
    }

    #[inline]
    pub fn update(&mut self, bytes: &[u8]) {
        self.hasher.update(bytes);
    }

    pub fn finalize(self) -> u32 {
        self.hasher.finalize()
    }
}

/// One-shot CRC32 over a full byte slice, for spots where there is no
/// running state to thread through (e.g. verifying a fully-buffered chunk).
pub fn crc32(bytes: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(bytes);
    h.finalize()
}
