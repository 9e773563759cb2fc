//! Error taxonomy shared by the writer and both readers.
//!
//! Every malformed input raises one of these variants — never a panic, never
//! a bare `io::Error` passed straight through from a decode path. Low-level
//! `flate2` failures are folded into [`PoafError::MalformedInput`] with a
//! short cause string at the point they cross the crate boundary.

use std::io;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum PoafError {
    /// Header or footer magic does not match any known archive variant.
    #[error("not a poaf archive: {0}")]
    NotAnArchive(String),

    /// A structural invariant was violated: bad item signature, truncated
    /// record, out-of-bounds location, CRC mismatch, or invalid DEFLATE.
    #[error("malformed input: {0}")]
    MalformedInput(String),

    /// A name or symlink target failed path validation (§4.1).
    #[error("invalid archive path: {0}")]
    InvalidArchivePath(String),

    /// The archive lacks the structure a reader requires, e.g. random
    /// access requested on a streaming-only archive.
    #[error("incompatible input: {0}")]
    IncompatibleInput(String),

    /// A single `read_from_item` call was asked to return more bytes than
    /// its caller-supplied limit allows.
    #[error("item contents too long: {0}")]
    ItemContentsTooLong(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, PoafError>;

impl From<flate2::CompressError> for PoafError {
    fn from(e: flate2::CompressError) -> Self {
        PoafError::MalformedInput(format!("deflate compression error: {e}"))
    }
}

impl From<flate2::DecompressError> for PoafError {
    fn from(e: flate2::DecompressError) -> Self {
        PoafError::MalformedInput(format!("deflate decompression error: {e}"))
    }
}
