//! Top-level entry points for reading an archive, dispatching to
//! [`StreamingReader`] or [`IndexReader`] based on the caller's needs and
//! what the archive's [`Structure`] actually offers.

use std::io::{Read, Seek};

use crate::error::{PoafError, Result};
use crate::header::{ArchiveHeader, Structure};
use crate::index_reader::IndexReader;
use crate::streaming_reader::StreamingReader;

/// Open `source` for sequential reading. Works on any `Read`, seekable or
/// not. Fails with `IncompatibleInput` on an index-only archive, which has
/// no Data Region to stream.
pub fn open_streaming<S: Read>(source: S) -> Result<StreamingReader<S>> {
    StreamingReader::open(source)
}

/// Open `source` for random access via its Index Region. Requires `Seek`
/// and fails with `IncompatibleInput` on a streaming-only archive.
pub fn open_index<S: Read + Seek>(source: S) -> Result<IndexReader<S>> {
    IndexReader::open(source)
}

/// How a caller would like to read an archive whose structure isn't known
/// ahead of time.
#[derive(Debug, Clone, Copy)]
pub struct OpenOptions {
    /// Prefer random access (`IndexReader`) when the archive and the
    /// source both support it.
    pub prefer_index: bool,
    /// Fail instead of silently falling back to streaming when random
    /// access isn't available.
    pub require_index: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self { prefer_index: false, require_index: false }
    }
}

/// Either an [`IndexReader`] or a [`StreamingReader`], chosen by `open`
/// according to archive structure, source seekability, and `OpenOptions`.
#[derive(Debug)]
pub enum Reader<S: Read + Seek> {
    Index(IndexReader<S>),
    Streaming(StreamingReader<S>),
}

/// Peek the archive's structure without disturbing the rest of the source,
/// then hand back a reader of the kind the caller asked for. `source` must
/// be `Seek` because peeking the header and then constructing either reader
/// both need to start again from offset 0.
pub fn open<S: Read + Seek>(mut source: S, options: OpenOptions) -> Result<Reader<S>> {
    use std::io::SeekFrom;

    let header = ArchiveHeader::read(&mut source)?;
    source.seek(SeekFrom::Start(0))?;

    let can_index = header.structure.has_index_region();
    let can_stream = header.structure.has_data_region();

    if options.require_index && !can_index {
        return Err(PoafError::IncompatibleInput("archive has no Index Region and random access was required".into()));
    }

    let use_index = can_index && (options.require_index || (options.prefer_index || !can_stream));

    if use_index {
        Ok(Reader::Index(IndexReader::open(source)?))
    } else if can_stream {
        Ok(Reader::Streaming(StreamingReader::open(source)?))
    } else {
        Err(PoafError::IncompatibleInput(format!("archive structure {:?} supports neither request", header.structure)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FileType;
    use crate::writer::{Writer, WriterOptions};
    use std::io::Cursor;

    #[test]
    fn open_prefers_streaming_by_default_for_both() {
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf, WriterOptions::default()).unwrap();
        w.add("x", FileType::RegularFile, Cursor::new(b"y".to_vec())).unwrap();
        w.close().unwrap();

        match open(Cursor::new(buf), OpenOptions::default()).unwrap() {
            Reader::Streaming(_) => {}
            Reader::Index(_) => panic!("expected streaming reader"),
        }
    }

    #[test]
    fn open_honors_prefer_index() {
        let mut buf = Vec::new();
        let mut w = Writer::new(&mut buf, WriterOptions::default()).unwrap();
        w.add("x", FileType::RegularFile, Cursor::new(b"y".to_vec())).unwrap();
        w.close().unwrap();

        let options = OpenOptions { prefer_index: true, require_index: false };
        match open(Cursor::new(buf), options).unwrap() {
            Reader::Index(_) => {}
            Reader::Streaming(_) => panic!("expected index reader"),
        }
    }

    #[test]
    fn open_falls_back_to_streaming_for_streaming_only() {
        let mut buf = Vec::new();
        let options = WriterOptions { structure: Structure::StreamingOnly, ..WriterOptions::default() };
        let mut w = Writer::new(&mut buf, options).unwrap();
        w.add("x", FileType::RegularFile, Cursor::new(b"y".to_vec())).unwrap();
        w.close().unwrap();

        match open(Cursor::new(buf), OpenOptions { prefer_index: true, require_index: false }).unwrap() {
            Reader::Streaming(_) => {}
            Reader::Index(_) => panic!("streaming-only archives have no Index Region"),
        }
    }

    #[test]
    fn open_rejects_require_index_on_streaming_only() {
        let mut buf = Vec::new();
        let options = WriterOptions { structure: Structure::StreamingOnly, ..WriterOptions::default() };
        let mut w = Writer::new(&mut buf, options).unwrap();
        w.add("x", FileType::RegularFile, Cursor::new(b"y".to_vec())).unwrap();
        w.close().unwrap();

        let err = open(Cursor::new(buf), OpenOptions { prefer_index: false, require_index: true }).unwrap_err();
        assert!(matches!(err, PoafError::IncompatibleInput(_)));
    }
}
