//! Archive-level framing: the 4-byte [`ArchiveHeader`] magic and the
//! 16-byte [`ArchiveFooter`] trailer, plus the [`Structure`] enum they
//! jointly encode.
//!
//! On-disk layout, all fields little-endian:
//!
//! ```text
//! ArchiveHeader (4 bytes)
//!   BE F6 F2 9D   streaming-only
//!   BE F6 F1 9E   index-only
//!   BE F6 F0 9F   both
//!
//! ArchiveFooter (16 bytes, present unless streaming-only)
//!   0   4   index_crc32            u32le
//!   4   8   index_region_location  u64le
//!  12   1   footer_checksum        sum(index_region_location bytes) mod 256
//!  13   3   EE E9 CF
//! ```

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use std::io::{self, Read, Write};

use crate::error::{PoafError, Result};

pub const HEADER_SIZE: usize = 4;
pub const FOOTER_SIZE: usize = 16;
pub const FOOTER_SIGNATURE: [u8; 3] = [0xee, 0xe9, 0xcf];

const MAGIC_STREAMING_ONLY: [u8; 4] = [0xbe, 0xf6, 0xf2, 0x9d];
const MAGIC_INDEX_ONLY: [u8; 4] = [0xbe, 0xf6, 0xf1, 0x9e];
const MAGIC_BOTH: [u8; 4] = [0xbe, 0xf6, 0xf0, 0x9f];

/// Which of the two regions an archive carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Structure {
    StreamingOnly,
    IndexOnly,
    Both,
}

impl Structure {
    #[inline]
    pub fn has_data_region(self) -> bool {
        !matches!(self, Structure::IndexOnly)
    }

    #[inline]
    pub fn has_index_region(self) -> bool {
        !matches!(self, Structure::StreamingOnly)
    }

    pub fn magic(self) -> [u8; 4] {
        match self {
            Structure::StreamingOnly => MAGIC_STREAMING_ONLY,
            Structure::IndexOnly => MAGIC_INDEX_ONLY,
            Structure::Both => MAGIC_BOTH,
        }
    }

    pub fn from_magic(buf: &[u8; 4]) -> Result<Self> {
        match *buf {
            MAGIC_STREAMING_ONLY => Ok(Structure::StreamingOnly),
            MAGIC_INDEX_ONLY => Ok(Structure::IndexOnly),
            MAGIC_BOTH => Ok(Structure::Both),
            other => Err(PoafError::NotAnArchive(format!("unrecognized archive header {other:02x?}"))),
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveHeader {
    pub structure: Structure,
}

impl ArchiveHeader {
    pub fn new(structure: Structure) -> Self {
        Self { structure }
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_all(&self.structure.magic())
    }

    pub fn read<R: Read>(mut r: R) -> Result<Self> {
        let mut buf = [0u8; HEADER_SIZE];
        r.read_exact(&mut buf)?;
        Ok(Self { structure: Structure::from_magic(&buf)? })
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ArchiveFooter {
    pub index_crc32: u32,
    pub index_region_location: u64,
}

impl ArchiveFooter {
    fn footer_checksum(index_region_location: u64) -> u8 {
        let bytes = index_region_location.to_le_bytes();
        bytes.iter().fold(0u8, |acc, &b| acc.wrapping_add(b))
    }

    pub fn write<W: Write>(&self, mut w: W) -> io::Result<()> {
        w.write_u32::<LittleEndian>(self.index_crc32)?;
        w.write_u64::<LittleEndian>(self.index_region_location)?;
        w.write_u8(Self::footer_checksum(self.index_region_location))?;
        w.write_all(&FOOTER_SIGNATURE)
    }

    /// Parse and validate a 16-byte footer. `file_end` is the archive's
    /// total length, used to bounds-check `index_region_location`.
    pub fn read<R: Read>(mut r: R, file_end: u64) -> Result<Self> {
        let mut buf = [0u8; FOOTER_SIZE];
        r.read_exact(&mut buf)?;

        if buf[13..16] != FOOTER_SIGNATURE {
            return Err(PoafError::NotAnArchive("footer signature mismatch".into()));
        }

        let index_crc32 = u32::from_le_bytes(buf[0..4].try_into().unwrap());
        let index_region_location = u64::from_le_bytes(buf[4..12].try_into().unwrap());
        let stored_checksum = buf[12];
        if stored_checksum != Self::footer_checksum(index_region_location) {
            return Err(PoafError::MalformedInput("footer_checksum mismatch".into()));
        }

        let footer_start = file_end.saturating_sub(FOOTER_SIZE as u64);
        if !(HEADER_SIZE as u64 <= index_region_location && index_region_location < footer_start) {
            return Err(PoafError::MalformedInput(format!(
                "index_region_location {index_region_location} out of bounds [4, {footer_start})"
            )));
        }

        Ok(Self { index_crc32, index_region_location })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_roundtrip() {
        for structure in [Structure::StreamingOnly, Structure::IndexOnly, Structure::Both] {
            let mut buf = Vec::new();
            ArchiveHeader::new(structure).write(&mut buf).unwrap();
            let parsed = ArchiveHeader::read(&buf[..]).unwrap();
            assert_eq!(parsed.structure, structure);
        }
    }

    #[test]
    fn rejects_unknown_magic() {
        let buf = [0xbe, 0xf6, 0xf2, 0x9e];
        assert!(ArchiveHeader::read(&buf[..]).is_err());
    }

    #[test]
    fn empty_archive_footer_matches_spec_example() {
        // From §8: write 0 items, default options ->
        // BEF6F09F 0300 0300 00000000 0600000000000000 06 EEE9CF
        let footer = ArchiveFooter { index_crc32: 0, index_region_location: 6 };
        let mut buf = Vec::new();
        footer.write(&mut buf).unwrap();
        assert_eq!(buf, vec![0, 0, 0, 0, 6, 0, 0, 0, 0, 0, 0, 0, 6, 0xee, 0xe9, 0xcf]);
    }
}
