//! Random-access reading via the Index Region (§4.5).
//!
//! Unlike [`StreamingReader`](crate::streaming_reader::StreamingReader), which
//! owns its source exclusively and reads it once in order, `IndexReader`
//! hands out independent [`ItemReader`]s that may be opened in any order and
//! interleaved freely — the single-threaded-cooperative model in the format's
//! resource section allows this as long as nothing reads concurrently.
//! [`SharedView`](crate::byte_source::SharedView) makes that safe: every
//! `ItemReader` reseeks the shared source before each of its own reads, so
//! their logical positions stay independent even though the file handle is
//! not duplicated.

use std::cell::RefCell;
use std::io::{Read, Seek, SeekFrom};
use std::rc::Rc;

use crate::byte_source::SharedView;
use crate::deflate::DecodeStream;
use crate::error::{PoafError, Result};
use crate::header::{ArchiveFooter, ArchiveHeader, Structure, FOOTER_SIZE, HEADER_SIZE};
use crate::path;
use crate::types::{self, FileType, IndexItem};

/// Reads the Index Region of a "both" or "index-only" archive and opens
/// individual items by seeking directly to their `jump_location`.
#[derive(Debug)]
pub struct IndexReader<S: Read + Seek> {
    source: Rc<RefCell<S>>,
    index_view: SharedView<S>,
    decoder: DecodeStream,
    index_crc32: crate::crc::RunningCrc32,
    expected_index_crc32: u32,
    structure: Structure,
    index_region_location: u64,
    stream_start: u64,
    skip_bytes_since_stream_start: u64,
    exhausted: bool,
}

impl<S: Read + Seek> IndexReader<S> {
    pub fn open(source: S) -> Result<Self> {
        let source = Rc::new(RefCell::new(source));

        let header = {
            let mut s = source.borrow_mut();
            ArchiveHeader::read(&mut *s)?
        };
        if !header.structure.has_index_region() {
            return Err(PoafError::IncompatibleInput("archive has no Index Region to read randomly".into()));
        }

        let file_end = {
            let mut s = source.borrow_mut();
            s.seek(SeekFrom::End(0))?
        };
        let footer = {
            let mut s = source.borrow_mut();
            s.seek(SeekFrom::Start(file_end.saturating_sub(FOOTER_SIZE as u64)))?;
            ArchiveFooter::read(&mut *s, file_end)?
        };

        let index_region_end = file_end - FOOTER_SIZE as u64;
        let index_view = SharedView::new(Rc::clone(&source), footer.index_region_location, index_region_end);

        Ok(Self {
            source,
            index_view,
            decoder: DecodeStream::new(),
            index_crc32: crate::crc::RunningCrc32::new(),
            expected_index_crc32: footer.index_crc32,
            structure: header.structure,
            index_region_location: footer.index_region_location,
            stream_start: HEADER_SIZE as u64,
            skip_bytes_since_stream_start: 0,
            exhausted: false,
        })
    }

    /// Decode and return the next [`IndexItem`], or `None` once the Index
    /// Region is exhausted (after verifying `index_crc32` and that the
    /// decoded region was consumed exactly).
    pub fn next(&mut self) -> Result<Option<IndexItem>> {
        if self.exhausted {
            return Ok(None);
        }

        let fields = self.decoder.read_decompressed(&mut self.index_view, 22)?;
        if fields.is_empty() {
            if !self.decoder.eos() {
                return Err(PoafError::MalformedInput("Index Region ended without a terminating DEFLATE stream end".into()));
            }
            self.finish_and_verify()?;
            return Ok(None);
        }
        if fields.len() != 22 {
            return Err(PoafError::MalformedInput("truncated IndexItem fixed fields".into()));
        }

        let contents_crc32 = u32::from_le_bytes(fields[0..4].try_into().unwrap());
        let jump_location = u64::from_le_bytes(fields[4..12].try_into().unwrap());
        let file_size = u64::from_le_bytes(fields[12..20].try_into().unwrap());
        let type_and_name_size = u16::from_le_bytes(fields[20..22].try_into().unwrap());
        let (file_type, name_size) = types::unpack_type_and_name_size(type_and_name_size)?;

        let name_bytes = self.decoder.read_decompressed(&mut self.index_view, name_size)?;
        if name_bytes.len() != name_size {
            return Err(PoafError::MalformedInput("truncated IndexItem name".into()));
        }
        let name = String::from_utf8(name_bytes.clone())
            .map_err(|_| PoafError::InvalidArchivePath("item name is not valid UTF-8".into()))?;
        path::validate_name(&name)?;

        self.index_crc32.update(&fields);
        self.index_crc32.update(&name_bytes);

        if jump_location > 0 {
            self.stream_start = jump_location;
            self.skip_bytes_since_stream_start = 0;
        } else if self.structure == Structure::Both {
            self.skip_bytes_since_stream_start += 4 + name_size as u64;
        }

        let item = IndexItem {
            name,
            file_type,
            contents_crc32,
            jump_location,
            file_size,
            stream_start: self.stream_start,
            skip_bytes_until_contents: self.skip_bytes_since_stream_start,
        };

        self.skip_bytes_since_stream_start += file_size;
        if self.structure == Structure::Both {
            self.skip_bytes_since_stream_start += 2 * ((file_size / 0xffff) + 1) + 4;
        }

        Ok(Some(item))
    }

    fn finish_and_verify(&mut self) -> Result<()> {
        self.exhausted = true;
        if self.index_view.remaining() != 0 {
            return Err(PoafError::MalformedInput("Index Region has unconsumed trailing bytes".into()));
        }
        let computed = std::mem::take(&mut self.index_crc32).finalize();
        if computed != self.expected_index_crc32 {
            log::warn!("index_crc32 mismatch: footer says {:#010x}, computed {:#010x}", self.expected_index_crc32, computed);
            return Err(PoafError::MalformedInput("index_crc32 mismatch".into()));
        }
        Ok(())
    }

    /// Open an independent reader over `item`'s contents. May be called in
    /// any order, any number of times, interleaved with `next()` calls.
    pub fn open_item(&self, item: &IndexItem) -> Result<ItemReader<S>> {
        let mut view = SharedView::new(Rc::clone(&self.source), item.stream_start, self.index_region_location);
        let mut decoder = DecodeStream::new();
        decoder.skip_decompressed(&mut view, item.skip_bytes_until_contents)?;
        Ok(ItemReader {
            view,
            decoder,
            structure: self.structure,
            item: item.clone(),
            bytes_delivered: 0,
            done: item.file_size == 0 && item.file_type == FileType::Directory,
        })
    }
}

/// An open, independently-positioned reader over one item's contents.
pub struct ItemReader<S: Read + Seek> {
    view: SharedView<S>,
    decoder: DecodeStream,
    structure: Structure,
    item: IndexItem,
    bytes_delivered: u64,
    done: bool,
}

impl<S: Read + Seek> ItemReader<S> {
    pub fn item(&self) -> &IndexItem {
        &self.item
    }

    pub fn done(&self) -> bool {
        self.done
    }

    /// Read the next chunk of contents. In "both" mode this is exactly one
    /// on-disk chunk (stripping its 2-byte size prefix); in index-only mode
    /// it is up to 0xffff bytes of the unframed raw contents. Returns an
    /// empty vec once `done()`.
    pub fn read_chunk(&mut self) -> Result<Vec<u8>> {
        if self.done {
            return Ok(Vec::new());
        }
        match self.structure {
            Structure::Both => {
                let size_bytes = self.decoder.read_decompressed(&mut self.view, 2)?;
                if size_bytes.len() != 2 {
                    return Err(PoafError::MalformedInput("truncated chunk_size".into()));
                }
                let chunk_size = u16::from_le_bytes([size_bytes[0], size_bytes[1]]) as usize;
                let payload = self.decoder.read_decompressed(&mut self.view, chunk_size)?;
                if payload.len() != chunk_size {
                    return Err(PoafError::MalformedInput("truncated chunk payload".into()));
                }
                self.bytes_delivered += payload.len() as u64;
                if chunk_size < 0xffff {
                    self.done = true;
                }
                Ok(payload)
            }
            Structure::IndexOnly => {
                let remaining = self.item.file_size.saturating_sub(self.bytes_delivered);
                if remaining == 0 {
                    self.done = true;
                    return Ok(Vec::new());
                }
                let want = remaining.min(0xffff) as usize;
                let payload = self.decoder.read_decompressed(&mut self.view, want)?;
                if payload.len() != want {
                    return Err(PoafError::MalformedInput("truncated item contents".into()));
                }
                self.bytes_delivered += payload.len() as u64;
                if self.bytes_delivered >= self.item.file_size {
                    self.done = true;
                }
                Ok(payload)
            }
            Structure::StreamingOnly => unreachable!("IndexReader never opens on streaming-only archives"),
        }
    }

    pub fn read_to_end(&mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        while !self.done {
            out.extend(self.read_chunk()?);
        }
        Ok(out)
    }

    /// Read, validate and return this item's symlink target.
    pub fn read_symlink_target(&mut self) -> Result<String> {
        let bytes = self.read_to_end()?;
        let target = std::str::from_utf8(&bytes)
            .map_err(|_| PoafError::InvalidArchivePath("symlink target is not valid UTF-8".into()))?;
        let validated = path::validate_symlink_target(target, &self.item.name)?;
        Ok(String::from_utf8(validated).expect("validated target is UTF-8"))
    }
}
