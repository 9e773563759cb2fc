//! Sequential, single-pass reading of the Data Region (§4.4).
//!
//! `StreamingReader` never seeks: it owns its source outright and reads it
//! exactly once, forward. A stream split shows up mid-item, between an
//! item's framing header and its first content chunk, as the underlying
//! DEFLATE decoder reporting end-of-stream with zero bytes produced while
//! `read_from_item` is reaching for that chunk's size field; the reader
//! swaps in a fresh decoder seeded with the old one's `unused_input` and
//! keeps going. A *different* end-of-stream — hit while idle, between two
//! items — means the Data Region is over; everything after that point (the
//! compressed Index Region and the footer, for "both" archives) is still
//! sitting unread on the same source, and `close()` can walk it without
//! ever seeking.

use std::io::{self, Read};

use crate::crc::RunningCrc32;
use crate::deflate::DecodeStream;
use crate::error::{PoafError, Result};
use crate::header::{ArchiveFooter, ArchiveHeader, Structure, FOOTER_SIZE};
use crate::path;
use crate::types::{self, FileType, Item, ITEM_SIGNATURE};

/// Counts bytes pulled from the wrapped source so splits can be located in
/// absolute archive offsets without ever seeking.
#[derive(Debug)]
struct CountingReader<R: Read> {
    inner: R,
    count: u64,
}

impl<R: Read> Read for CountingReader<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let n = self.inner.read(buf)?;
        self.count += n as u64;
        Ok(n)
    }
}

#[derive(Debug)]
struct CurrentItem {
    name_bytes: Vec<u8>,
    type_and_name_size: u16,
    streaming_crc: RunningCrc32,
    contents_crc: RunningCrc32,
    file_size: u64,
    jump_location: u64,
    opened: bool,
    item_done: bool,
}

/// Reads items from the Data Region in archive order. For "both" archives,
/// optionally cross-checks the predicted index it accumulates along the way
/// against the real Index Region and footer at `close()`.
#[derive(Debug)]
pub struct StreamingReader<S: Read> {
    source: CountingReader<S>,
    structure: Structure,
    decoder: DecodeStream,
    header_size: u64,
    predicted_index: Vec<u8>,
    predicted_index_crc32: RunningCrc32,
    current: Option<CurrentItem>,
    done: bool,
}

impl<S: Read> StreamingReader<S> {
    pub fn open(mut source: S) -> Result<Self> {
        let header = ArchiveHeader::read(&mut source)?;
        if !header.structure.has_data_region() {
            return Err(PoafError::IncompatibleInput("archive has no Data Region to stream".into()));
        }
        Ok(Self {
            source: CountingReader { inner: source, count: 0 },
            structure: header.structure,
            decoder: DecodeStream::new(),
            header_size: crate::header::HEADER_SIZE as u64,
            predicted_index: Vec::new(),
            predicted_index_crc32: RunningCrc32::new(),
            current: None,
            done: false,
        })
    }

    fn archive_offset(&self) -> u64 {
        self.header_size + self.source.count
    }

    /// Decode the next item's framing, returning `None` once the Data
    /// Region is exhausted. For directories and symlinks the single body
    /// chunk is consumed eagerly and `item.done` is already true.
    pub fn next(&mut self) -> Result<Option<Item>> {
        if self.done {
            return Ok(None);
        }
        if let Some(cur) = &self.current {
            if !cur.item_done {
                return Err(PoafError::IncompatibleInput(
                    "the previous item's contents must be fully read before calling next()".into(),
                ));
            }
        }
        self.current = None;

        let header_bytes = self.decoder.read_decompressed(&mut self.source, 4)?;
        if header_bytes.is_empty() {
            if !self.decoder.eos() {
                return Err(PoafError::MalformedInput("Data Region ended mid-read".into()));
            }
            self.done = true;
            return Ok(None);
        }
        if header_bytes.len() != 4 {
            return Err(PoafError::MalformedInput("truncated StreamingItem header".into()));
        }
        if header_bytes[0..2] != ITEM_SIGNATURE {
            return Err(PoafError::MalformedInput(format!("bad StreamingItem signature {:02x?}", &header_bytes[0..2])));
        }
        let type_and_name_size = u16::from_le_bytes([header_bytes[2], header_bytes[3]]);
        let (file_type, name_size) = types::unpack_type_and_name_size(type_and_name_size)?;

        let mut streaming_crc = RunningCrc32::new();
        streaming_crc.update(&header_bytes);

        let name_bytes = self.decoder.read_decompressed(&mut self.source, name_size)?;
        if name_bytes.len() != name_size {
            return Err(PoafError::MalformedInput("truncated StreamingItem name".into()));
        }
        streaming_crc.update(&name_bytes);
        let name = String::from_utf8(name_bytes.clone())
            .map_err(|_| PoafError::InvalidArchivePath("item name is not valid UTF-8".into()))?;
        path::validate_name(&name)?;

        let mut cur = CurrentItem {
            name_bytes,
            type_and_name_size,
            streaming_crc,
            contents_crc: RunningCrc32::new(),
            file_size: 0,
            jump_location: 0,
            opened: false,
            item_done: false,
        };

        let mut item = Item::new(name, file_type);

        match file_type {
            FileType::Directory => {
                let payload = self.pull_chunk(&mut cur)?;
                if !payload.is_empty() {
                    return Err(PoafError::MalformedInput("directory item must have empty contents".into()));
                }
                item.done = true;
            }
            FileType::Symlink => {
                let payload = self.pull_chunk(&mut cur)?;
                let target_str = std::str::from_utf8(&payload)
                    .map_err(|_| PoafError::InvalidArchivePath("symlink target is not valid UTF-8".into()))?;
                let validated = path::validate_symlink_target(target_str, &item.name)?;
                item.symlink_target = Some(String::from_utf8(validated).expect("validated target is UTF-8"));
                item.done = true;
            }
            FileType::RegularFile | FileType::PosixExecutable => {
                // Body is pulled on demand via `read_from_item`.
            }
        }

        item.file_size = cur.file_size;
        self.current = Some(cur);
        Ok(Some(item))
    }

    /// Read the next chunk of `item`'s contents (regular files and
    /// executables only — directories and symlinks are fully read by
    /// `next()`). `limit`, if given, bounds the chunk size this call will
    /// accept; a larger on-disk chunk is reported as `ItemContentsTooLong`
    /// rather than silently truncated.
    pub fn read_from_item(&mut self, item: &mut Item, limit: Option<usize>) -> Result<Vec<u8>> {
        let mut cur = self.current.take().ok_or_else(|| {
            PoafError::IncompatibleInput("read_from_item called with no item open".into())
        })?;
        if cur.item_done {
            self.current = Some(cur);
            return Ok(Vec::new());
        }

        let result = self.pull_chunk_checked(&mut cur, limit);
        item.file_size = cur.file_size;
        item.done = cur.item_done;
        self.current = Some(cur);
        result
    }

    fn pull_chunk_checked(&mut self, cur: &mut CurrentItem, limit: Option<usize>) -> Result<Vec<u8>> {
        let chunk_size = self.peek_chunk_size(cur)?;
        if let Some(limit) = limit {
            if chunk_size > limit {
                return Err(PoafError::ItemContentsTooLong(format!(
                    "chunk of {chunk_size} bytes exceeds the {limit}-byte read_from_item limit"
                )));
            }
        }
        self.finish_pulling_chunk(cur, chunk_size)
    }

    fn pull_chunk(&mut self, cur: &mut CurrentItem) -> Result<Vec<u8>> {
        let chunk_size = self.peek_chunk_size(cur)?;
        self.finish_pulling_chunk(cur, chunk_size)
    }

    /// Read the 2-byte `chunk_size` field, handling a mid-item stream split
    /// if one is legal at this point (§4.4).
    fn peek_chunk_size(&mut self, cur: &mut CurrentItem) -> Result<usize> {
        let size_bytes = self.decoder.read_decompressed(&mut self.source, 2)?;
        if size_bytes.len() == 2 {
            return Ok(u16::from_le_bytes([size_bytes[0], size_bytes[1]]) as usize);
        }
        if size_bytes.is_empty() && self.decoder.eos() && !cur.opened && cur.file_size == 0 {
            let split_offset = self.archive_offset() - self.decoder.unused_input().len() as u64;
            log::trace!("mid-item stream split detected, new stream starts at offset {split_offset}");
            self.decoder = DecodeStream::seeded(self.decoder.unused_input().to_vec());
            cur.jump_location = split_offset;
            let retried = self.decoder.read_decompressed(&mut self.source, 2)?;
            if retried.len() != 2 {
                return Err(PoafError::MalformedInput("truncated chunk_size after stream split".into()));
            }
            return Ok(u16::from_le_bytes([retried[0], retried[1]]) as usize);
        }
        Err(PoafError::MalformedInput("truncated chunk_size".into()))
    }

    fn finish_pulling_chunk(&mut self, cur: &mut CurrentItem, chunk_size: usize) -> Result<Vec<u8>> {
        cur.opened = true;
        let payload = self.decoder.read_decompressed(&mut self.source, chunk_size)?;
        if payload.len() != chunk_size {
            return Err(PoafError::MalformedInput("truncated chunk payload".into()));
        }

        let mut chunk_header = Vec::with_capacity(2 + payload.len());
        chunk_header.extend_from_slice(&(chunk_size as u16).to_le_bytes());
        chunk_header.extend_from_slice(&payload);
        cur.streaming_crc.update(&chunk_header);
        cur.contents_crc.update(&payload);
        cur.file_size += payload.len() as u64;

        if chunk_size < 0xffff {
            self.finish_item(cur)?;
        }
        Ok(payload)
    }

    fn finish_item(&mut self, cur: &mut CurrentItem) -> Result<()> {
        let trailer = self.decoder.read_decompressed(&mut self.source, 4)?;
        if trailer.len() != 4 {
            return Err(PoafError::MalformedInput("truncated streaming_crc32 trailer".into()));
        }
        let stored = u32::from_le_bytes(trailer.try_into().unwrap());
        let computed = std::mem::take(&mut cur.streaming_crc).finalize();
        if stored != computed {
            return Err(PoafError::MalformedInput("streaming_crc32 mismatch".into()));
        }

        if self.structure == Structure::Both {
            let contents_crc32 = std::mem::take(&mut cur.contents_crc).finalize();
            let mut raw = Vec::with_capacity(22 + cur.name_bytes.len());
            raw.extend_from_slice(&contents_crc32.to_le_bytes());
            raw.extend_from_slice(&cur.jump_location.to_le_bytes());
            raw.extend_from_slice(&cur.file_size.to_le_bytes());
            raw.extend_from_slice(&cur.type_and_name_size.to_le_bytes());
            raw.extend_from_slice(&cur.name_bytes);
            self.predicted_index_crc32.update(&raw);
            self.predicted_index.extend_from_slice(&raw);
        }

        cur.item_done = true;
        Ok(())
    }

    /// Finish the read. For streaming-only archives, requires that the
    /// underlying source is now fully exhausted. For "both" archives,
    /// decodes the real Index Region and footer from the same source (no
    /// seek) and verifies them byte-for-byte against what was predicted
    /// while streaming the Data Region.
    pub fn close(mut self) -> Result<()> {
        if let Some(cur) = &self.current {
            if !cur.item_done {
                return Err(PoafError::IncompatibleInput("close() called with an item still open".into()));
            }
        }

        match self.structure {
            Structure::StreamingOnly => {
                if !self.decoder.unused_input().is_empty() {
                    return Err(PoafError::MalformedInput("unexpected trailing bytes after Data Region".into()));
                }
                let mut probe = [0u8; 1];
                if self.source.read(&mut probe)? != 0 {
                    return Err(PoafError::MalformedInput("unexpected trailing bytes after Data Region".into()));
                }
                Ok(())
            }
            Structure::Both => self.verify_index_region(),
            Structure::IndexOnly => unreachable!("StreamingReader never opens on index-only archives"),
        }
    }

    fn verify_index_region(&mut self) -> Result<()> {
        let index_region_location = self.archive_offset();

        let mut index_decoder = DecodeStream::seeded(self.decoder.unused_input().to_vec());
        let mut actual = Vec::new();
        loop {
            let chunk = index_decoder.read_decompressed(&mut self.source, 4096)?;
            if chunk.is_empty() {
                break;
            }
            actual.extend_from_slice(&chunk);
        }
        if !index_decoder.eos() {
            return Err(PoafError::MalformedInput("Index Region did not terminate cleanly".into()));
        }
        if actual != self.predicted_index {
            log::warn!("Index Region diverges from the one predicted while streaming the Data Region");
            return Err(PoafError::MalformedInput(
                "reconstructed Index Region does not match the predicted one built while streaming".into(),
            ));
        }
        let index_crc32 = std::mem::take(&mut self.predicted_index_crc32).finalize();

        let mut footer_source = index_decoder.unused_input().to_vec();
        while footer_source.len() < FOOTER_SIZE {
            let mut buf = [0u8; 256];
            let n = self.source.read(&mut buf)?;
            if n == 0 {
                break;
            }
            footer_source.extend_from_slice(&buf[..n]);
        }
        if footer_source.len() != FOOTER_SIZE {
            return Err(PoafError::MalformedInput("truncated ArchiveFooter".into()));
        }
        // The bounds check inside `ArchiveFooter::read` wants the file's total
        // length, which isn't known here without seeking; a synthetic bound
        // that trivially satisfies it is fine because the real check below
        // compares the footer's claimed location against the offset this
        // reader independently observed while streaming.
        let synthetic_file_end = index_region_location + FOOTER_SIZE as u64 + 1;
        let footer = ArchiveFooter::read(&footer_source[..], synthetic_file_end)?;

        if footer.index_region_location != index_region_location {
            log::warn!(
                "footer claims index_region_location {} but streaming observed {}",
                footer.index_region_location,
                index_region_location
            );
            return Err(PoafError::MalformedInput("ArchiveFooter.index_region_location does not match observed offset".into()));
        }
        if footer.index_crc32 != index_crc32 {
            log::warn!("footer index_crc32 does not match the reconstructed Index Region");
            return Err(PoafError::MalformedInput("ArchiveFooter.index_crc32 does not match the reconstructed Index Region".into()));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::writer::{Writer, WriterOptions};
    use std::io::Cursor;

    fn build(structure: Structure) -> Vec<u8> {
        let mut buf = Vec::new();
        let options = WriterOptions { structure, ..WriterOptions::default() };
        let mut w = Writer::new(&mut buf, options).unwrap();
        w.add("a.txt", FileType::RegularFile, Cursor::new(b"hello world".to_vec())).unwrap();
        w.add("dir", FileType::Directory, Cursor::new(Vec::new())).unwrap();
        w.add("link", FileType::Symlink, Cursor::new(b"a.txt".to_vec())).unwrap();
        w.close().unwrap();
        buf
    }

    #[test]
    fn reads_items_in_order_streaming_only() {
        let buf = build(Structure::StreamingOnly);
        let mut r = StreamingReader::open(Cursor::new(buf)).unwrap();

        let mut item = r.next().unwrap().unwrap();
        assert_eq!(item.name, "a.txt");
        let mut content = Vec::new();
        loop {
            let chunk = r.read_from_item(&mut item, None).unwrap();
            if chunk.is_empty() && item.done {
                break;
            }
            content.extend(chunk);
        }
        assert_eq!(content, b"hello world");

        let dir = r.next().unwrap().unwrap();
        assert!(dir.done);
        assert_eq!(dir.file_type, FileType::Directory);

        let link = r.next().unwrap().unwrap();
        assert_eq!(link.symlink_target.as_deref(), Some("a.txt"));

        assert!(r.next().unwrap().is_none());
        r.close().unwrap();
    }

    #[test]
    fn rejects_bad_signature() {
        let mut buf = build(Structure::StreamingOnly);
        // Corrupt the first byte of the first item's framing, well past the header.
        let corrupt_at = buf.len() - 2;
        buf[corrupt_at] ^= 0xff;
        let mut r = StreamingReader::open(Cursor::new(buf)).unwrap();
        // Depending on where the corruption lands this may surface as a CRC
        // mismatch or a signature mismatch; either is a MalformedInput.
        let mut saw_error = false;
        loop {
            match r.next() {
                Ok(Some(mut item)) => {
                    if matches!(item.file_type, FileType::RegularFile | FileType::PosixExecutable) {
                        loop {
                            match r.read_from_item(&mut item, None) {
                                Ok(chunk) if chunk.is_empty() && item.done => break,
                                Ok(_) => continue,
                                Err(_) => {
                                    saw_error = true;
                                    break;
                                }
                            }
                        }
                    }
                    if saw_error {
                        break;
                    }
                }
                Ok(None) => break,
                Err(_) => {
                    saw_error = true;
                    break;
                }
            }
        }
        assert!(saw_error);
    }
}
