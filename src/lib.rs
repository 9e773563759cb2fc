//! POAF: a seekable container format over concatenated raw-DEFLATE streams.
//!
//! An archive is always readable two ways. Its **Data Region** is a plain
//! concatenation of raw-DEFLATE streams carrying framed `StreamingItem`
//! records in write order — read it forward with [`StreamingReader`] and you
//! never need to know where one compressed stream ends and the next begins;
//! the decoder tells you. Its **Index Region** is a second, separately
//! compressed stream of fixed-layout `IndexItem` records that point back
//! into the Data Region (or, for index-only archives, straight at raw
//! per-item streams) — read it with [`IndexReader`] for random access
//! without decompressing anything you don't ask for.
//!
//! Which regions an archive has is fixed for its whole lifetime and encoded
//! in the 4-byte magic at offset 0 ([`Structure`]): `streaming-only`,
//! `index-only`, or `both`. [`Writer`] produces exactly one region layout
//! per archive; [`open`] inspects the magic and hands back whichever reader
//! the caller asked for, or an [`PoafError::IncompatibleInput`] if the
//! archive can't satisfy it.
//!
//! ```no_run
//! use poaf::{Writer, WriterOptions, StreamingReader, FileType};
//! use std::io::Cursor;
//!
//! let mut archive = Vec::new();
//! let mut w = Writer::new(&mut archive, WriterOptions::default())?;
//! w.add("hello.txt", FileType::RegularFile, Cursor::new(b"hi".to_vec()))?;
//! w.close()?;
//!
//! let mut r = StreamingReader::open(Cursor::new(archive))?;
//! while let Some(mut item) = r.next()? {
//!     while !item.done {
//!         let _chunk = r.read_from_item(&mut item, None)?;
//!     }
//! }
//! r.close()?;
//! # Ok::<(), poaf::PoafError>(())
//! ```

pub mod byte_source;
pub mod crc;
pub mod deflate;
pub mod error;
pub mod header;
pub mod index_reader;
pub mod path;
pub mod reader;
pub mod streaming_reader;
pub mod types;
pub mod writer;

pub use error::{PoafError, Result};
pub use header::{ArchiveFooter, ArchiveHeader, Structure};
pub use index_reader::{IndexReader, ItemReader};
pub use reader::{open, open_index, open_streaming, OpenOptions, Reader};
pub use streaming_reader::StreamingReader;
pub use types::{FileType, IndexItem, Item};
pub use writer::{Writer, WriterOptions};
