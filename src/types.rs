//! Structural types shared by the writer and both readers: [`FileType`], the
//! packed `type_and_name_size` field, and the item views each reader hands
//! back to its caller.

use crate::error::{PoafError, Result};

pub const MAX_NAME_SIZE: usize = 0x3fff; // 14 bits
pub const CHUNK_SENTINEL: u16 = 0xffff;
pub const ITEM_SIGNATURE: [u8; 2] = [0xdc, 0xac];
pub const SYMLINK_TARGET_LIMIT: usize = 4095;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FileType {
    RegularFile = 0,
    PosixExecutable = 1,
    Directory = 2,
    Symlink = 3,
}

impl FileType {
    pub fn from_u8(v: u8) -> Result<Self> {
        match v {
            0 => Ok(FileType::RegularFile),
            1 => Ok(FileType::PosixExecutable),
            2 => Ok(FileType::Directory),
            3 => Ok(FileType::Symlink),
            other => Err(PoafError::MalformedInput(format!("unknown file type {other}"))),
        }
    }

    #[inline]
    pub fn as_u8(self) -> u8 {
        self as u8
    }
}

/// Pack a file type and name length into the on-disk `type_and_name_size`
/// field: top 2 bits are the file type, low 14 bits are `name_size`.
pub fn pack_type_and_name_size(file_type: FileType, name_size: usize) -> Result<u16> {
    if name_size == 0 || name_size > MAX_NAME_SIZE {
        return Err(PoafError::InvalidArchivePath(format!(
            "name_size {name_size} out of range [1, {MAX_NAME_SIZE}]"
        )));
    }
    Ok(((file_type.as_u8() as u16) << 14) | name_size as u16)
}

/// Unpack `type_and_name_size` into (file_type, name_size).
pub fn unpack_type_and_name_size(raw: u16) -> Result<(FileType, usize)> {
    let file_type = FileType::from_u8((raw >> 14) as u8)?;
    let name_size = (raw & MAX_NAME_SIZE as u16) as usize;
    if name_size == 0 {
        return Err(PoafError::MalformedInput("name_size must not be zero".into()));
    }
    Ok((file_type, name_size))
}

/// One item as delivered by a reader during iteration, before its contents
/// have necessarily been fully consumed.
#[derive(Debug, Clone)]
pub struct Item {
    pub name: String,
    pub file_type: FileType,
    pub file_size: u64,
    /// Populated eagerly for symlinks; `None` for every other file type.
    pub symlink_target: Option<String>,
    pub done: bool,
}

impl Item {
    pub fn new(name: String, file_type: FileType) -> Self {
        Self { name, file_type, file_size: 0, symlink_target: None, done: file_type == FileType::Directory }
    }
}

/// A fully-parsed `IndexItem`, with the seeking metadata `IndexReader`
/// computes as it walks the Index Region (§4.5).
#[derive(Debug, Clone)]
pub struct IndexItem {
    pub name: String,
    pub file_type: FileType,
    pub contents_crc32: u32,
    pub jump_location: u64,
    pub file_size: u64,
    /// Absolute offset of the DEFLATE stream containing this item.
    pub stream_start: u64,
    /// Decompressed bytes to discard after opening that stream before the
    /// item's own contents begin.
    pub skip_bytes_until_contents: u64,
}
