//! The archive writer (§4.3).
//!
//! One pass over the caller's items, two running DEFLATE encoders (Data
//! Region, Index Region), and a side buffer that holds the compressed Index
//! Region until the Data Region is known to be finished.

use std::io::{self, Read, Seek, SeekFrom, Write};

use crate::crc::RunningCrc32;
use crate::deflate::EncodeStream;
use crate::error::{PoafError, Result};
use crate::header::{ArchiveFooter, ArchiveHeader, Structure};
use crate::path;
use crate::types::{self, FileType, ITEM_SIGNATURE, SYMLINK_TARGET_LIMIT};

/// Tuning knobs for a [`Writer`]. `stream_split_threshold` is evaluated in
/// compressed bytes; `index_spill_threshold` is evaluated in uncompressed
/// index bytes buffered so far.
#[derive(Debug, Clone, Copy)]
pub struct WriterOptions {
    pub structure: Structure,
    pub compression_level: u32,
    pub stream_split_threshold: u64,
    pub index_spill_threshold: u64,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            structure: Structure::Both,
            compression_level: 6,
            stream_split_threshold: 1 << 20,
            index_spill_threshold: 4 << 20,
        }
    }
}

const CHUNK_READ_SIZE: usize = 0xffff;

/// Where the compressed Index Region lives while the Data Region is still
/// being written. Stays in memory until it grows past
/// `index_spill_threshold`, then moves to a temp file that is removed again
/// on drop regardless of how the writer's lifetime ends.
enum IndexSink {
    Memory(Vec<u8>),
    Spilled(tempfile::NamedTempFile),
}

impl IndexSink {
    fn new() -> Self {
        IndexSink::Memory(Vec::new())
    }

    fn write_all(&mut self, bytes: &[u8], spill_threshold: u64) -> io::Result<()> {
        match self {
            IndexSink::Memory(buf) => {
                buf.extend_from_slice(bytes);
                if buf.len() as u64 > spill_threshold {
                    let mut tmp = tempfile::NamedTempFile::new()?;
                    tmp.write_all(buf)?;
                    *self = IndexSink::Spilled(tmp);
                }
                Ok(())
            }
            IndexSink::Spilled(tmp) => tmp.write_all(bytes),
        }
    }

    fn into_reader(self) -> io::Result<Box<dyn Read>> {
        match self {
            IndexSink::Memory(buf) => Ok(Box::new(io::Cursor::new(buf))),
            IndexSink::Spilled(mut tmp) => {
                tmp.seek(SeekFrom::Start(0))?;
                Ok(Box::new(tmp))
            }
        }
    }
}

/// Writes items into a POAF archive in a single forward pass.
///
/// `add` may be called any number of times, in any item order, followed by
/// exactly one call to `close`. Dropping a `Writer` without calling `close`
/// leaves a truncated, unreadable archive — there is no finalize-on-drop.
pub struct Writer<W: Write> {
    output: W,
    options: WriterOptions,
    archive_offset: u64,

    data_encoder: Option<EncodeStream>,
    compressed_since_stream_start: u64,

    index_encoder: Option<EncodeStream>,
    index_crc32: RunningCrc32,
    index_sink: IndexSink,

    closed: bool,
}

impl<W: Write> Writer<W> {
    pub fn new(mut output: W, options: WriterOptions) -> Result<Self> {
        log::debug!("opening archive writer with structure {:?}", options.structure);
        ArchiveHeader::new(options.structure).write(&mut output)?;

        let data_encoder = if options.structure.has_data_region() {
            Some(EncodeStream::new(options.compression_level))
        } else {
            None
        };
        let index_encoder =
            if options.structure.has_index_region() { Some(EncodeStream::new(options.compression_level)) } else { None };

        Ok(Self {
            output,
            archive_offset: crate::header::HEADER_SIZE as u64,
            data_encoder,
            compressed_since_stream_start: 0,
            index_encoder,
            index_crc32: RunningCrc32::new(),
            index_sink: IndexSink::new(),
            options,
            closed: false,
        })
    }

    /// Add one item. `contents` is ignored for directories, read eagerly and
    /// validated as a path for symlinks, and streamed chunk-by-chunk for
    /// regular files and executables.
    pub fn add<R: Read>(&mut self, name: &str, file_type: FileType, contents: R) -> Result<()> {
        if self.closed {
            return Err(PoafError::IncompatibleInput("writer is already closed".into()));
        }
        let name_bytes = path::validate_name(name)?;
        let type_and_name_size = types::pack_type_and_name_size(file_type, name_bytes.len())?;

        if self.options.structure == Structure::IndexOnly {
            self.add_index_only(name, name_bytes, file_type, type_and_name_size, contents)
        } else {
            self.add_framed(name, name_bytes, file_type, type_and_name_size, contents)
        }
    }

    /// Finish the Data Region (if any), append the compressed Index Region
    /// and footer (if any), and flush `output`. Calling `close` again after
    /// success is a harmless no-op.
    pub fn close(&mut self) -> Result<()> {
        if self.closed {
            return Ok(());
        }

        if let Some(enc) = self.data_encoder.take() {
            let tail = enc.finish()?;
            self.output.write_all(&tail)?;
            self.archive_offset += tail.len() as u64;
        }

        if self.options.structure.has_index_region() {
            let enc = self.index_encoder.take().expect("index encoder present for indexed structures");
            let tail = enc.finish()?;
            self.index_sink.write_all(&tail, self.options.index_spill_threshold)?;

            let index_region_location = self.archive_offset;
            let mut reader = std::mem::replace(&mut self.index_sink, IndexSink::new()).into_reader()?;
            let copied = io::copy(&mut reader, &mut self.output)?;
            self.archive_offset += copied;

            let footer = ArchiveFooter {
                index_crc32: std::mem::take(&mut self.index_crc32).finalize(),
                index_region_location,
            };
            footer.write(&mut self.output)?;
        }

        self.output.flush()?;
        self.closed = true;
        Ok(())
    }

    // -- Data Region bookkeeping (StreamingOnly / Both) ---------------------

    fn write_data(&mut self, raw: &[u8]) -> Result<()> {
        let enc = self.data_encoder.as_mut().expect("data region active");
        let compressed = enc.compress_all(raw)?;
        self.output.write_all(&compressed)?;
        self.archive_offset += compressed.len() as u64;
        self.compressed_since_stream_start += compressed.len() as u64;
        Ok(())
    }

    fn write_chunk_framed(&mut self, streaming_crc: &mut RunningCrc32, payload: &[u8]) -> Result<()> {
        debug_assert!(payload.len() <= 0xffff);
        let mut chunk_header = Vec::with_capacity(2 + payload.len());
        chunk_header.extend_from_slice(&(payload.len() as u16).to_le_bytes());
        chunk_header.extend_from_slice(payload);
        streaming_crc.update(&chunk_header);
        self.write_data(&chunk_header)
    }

    /// Split the Data Region here if the threshold has been reached. Must
    /// only be called right before the first nonempty content chunk of an
    /// item — never before a chunk belonging to an item whose total content
    /// is empty, and never a second time for the same item (§6.2).
    fn maybe_split(&mut self) -> Result<u64> {
        if self.compressed_since_stream_start < self.options.stream_split_threshold {
            return Ok(0);
        }
        let old = self.data_encoder.take().expect("data region active");
        let tail = old.finish()?;
        self.output.write_all(&tail)?;
        self.archive_offset += tail.len() as u64;
        self.data_encoder = Some(EncodeStream::new(self.options.compression_level));
        self.compressed_since_stream_start = 0;
        log::trace!("splitting data stream at offset {}", self.archive_offset);
        Ok(self.archive_offset)
    }

    fn add_framed(
        &mut self,
        name: &str,
        name_bytes: Vec<u8>,
        file_type: FileType,
        type_and_name_size: u16,
        mut contents: impl Read,
    ) -> Result<()> {
        let mut header_bytes = Vec::with_capacity(4 + name_bytes.len());
        header_bytes.extend_from_slice(&ITEM_SIGNATURE);
        header_bytes.extend_from_slice(&type_and_name_size.to_le_bytes());
        header_bytes.extend_from_slice(&name_bytes);

        let mut streaming_crc = RunningCrc32::new();
        streaming_crc.update(&header_bytes);
        self.write_data(&header_bytes)?;

        let mut contents_crc = RunningCrc32::new();
        let mut file_size = 0u64;
        let has_index_region = self.options.structure.has_index_region();
        let mut jump_location = 0u64;

        match file_type {
            FileType::Directory => {
                // Deterministically empty: never a split candidate (§6.2).
                self.write_chunk_framed(&mut streaming_crc, &[])?;
            }
            FileType::Symlink => {
                let target = read_symlink_target(&mut contents)?;
                let target_str =
                    std::str::from_utf8(&target).map_err(|_| PoafError::InvalidArchivePath("symlink target is not valid UTF-8".into()))?;
                let validated = path::validate_symlink_target(target_str, name)?;
                if has_index_region {
                    jump_location = self.maybe_split()?;
                }
                self.write_chunk_framed(&mut streaming_crc, &validated)?;
                contents_crc.update(&validated);
                file_size += validated.len() as u64;
            }
            FileType::RegularFile | FileType::PosixExecutable => {
                let mut buf = vec![0u8; CHUNK_READ_SIZE];
                let mut first = true;
                loop {
                    let n = fill_or_eof(&mut contents, &mut buf)?;
                    if first {
                        if has_index_region && n > 0 {
                            jump_location = self.maybe_split()?;
                        }
                        first = false;
                    }
                    self.write_chunk_framed(&mut streaming_crc, &buf[..n])?;
                    contents_crc.update(&buf[..n]);
                    file_size += n as u64;
                    if n < CHUNK_READ_SIZE {
                        break;
                    }
                }
            }
        }

        let streaming_crc32 = streaming_crc.finalize();
        self.write_data(&streaming_crc32.to_le_bytes())?;

        if has_index_region {
            self.emit_index_item(contents_crc.finalize(), jump_location, file_size, type_and_name_size, &name_bytes)?;
        }
        Ok(())
    }

    // -- Index-only items ----------------------------------------------------

    fn add_index_only(
        &mut self,
        name: &str,
        name_bytes: Vec<u8>,
        file_type: FileType,
        type_and_name_size: u16,
        mut contents: impl Read,
    ) -> Result<()> {
        let jump_location = self.archive_offset;
        let mut enc = EncodeStream::new(self.options.compression_level);
        let mut contents_crc = RunningCrc32::new();
        let mut file_size = 0u64;

        match file_type {
            FileType::Directory => {}
            FileType::Symlink => {
                let target = read_symlink_target(&mut contents)?;
                let target_str =
                    std::str::from_utf8(&target).map_err(|_| PoafError::InvalidArchivePath("symlink target is not valid UTF-8".into()))?;
                let validated = path::validate_symlink_target(target_str, name)?;
                contents_crc.update(&validated);
                file_size = validated.len() as u64;
                let compressed = enc.compress_all(&validated)?;
                self.write_raw(&compressed)?;
            }
            FileType::RegularFile | FileType::PosixExecutable => {
                let mut buf = vec![0u8; CHUNK_READ_SIZE];
                loop {
                    let n = contents.read(&mut buf)?;
                    if n == 0 {
                        break;
                    }
                    contents_crc.update(&buf[..n]);
                    file_size += n as u64;
                    let compressed = enc.compress_all(&buf[..n])?;
                    self.write_raw(&compressed)?;
                }
            }
        }

        let tail = enc.finish()?;
        self.write_raw(&tail)?;

        self.emit_index_item(contents_crc.finalize(), jump_location, file_size, type_and_name_size, &name_bytes)
    }

    fn write_raw(&mut self, compressed: &[u8]) -> Result<()> {
        self.output.write_all(compressed)?;
        self.archive_offset += compressed.len() as u64;
        Ok(())
    }

    // -- Index Region ---------------------------------------------------------

    fn emit_index_item(
        &mut self,
        contents_crc32: u32,
        jump_location: u64,
        file_size: u64,
        type_and_name_size: u16,
        name: &[u8],
    ) -> Result<()> {
        let mut raw = Vec::with_capacity(4 + 8 + 8 + 2 + name.len());
        raw.extend_from_slice(&contents_crc32.to_le_bytes());
        raw.extend_from_slice(&jump_location.to_le_bytes());
        raw.extend_from_slice(&file_size.to_le_bytes());
        raw.extend_from_slice(&type_and_name_size.to_le_bytes());
        raw.extend_from_slice(name);

        self.index_crc32.update(&raw);
        let enc = self.index_encoder.as_mut().expect("index encoder present");
        let compressed = enc.compress_all(&raw)?;
        self.index_sink.write_all(&compressed, self.options.index_spill_threshold)?;
        Ok(())
    }
}

fn fill_or_eof<R: Read>(r: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match r.read(&mut buf[filled..])? {
            0 => break,
            n => filled += n,
        }
    }
    Ok(filled)
}

fn read_symlink_target<R: Read>(contents: &mut R) -> Result<Vec<u8>> {
    let mut buf = Vec::new();
    contents.take(SYMLINK_TARGET_LIMIT as u64 + 1).read_to_end(&mut buf)?;
    Ok(buf)
}
