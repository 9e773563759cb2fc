//! Raw (headerless, windowed) DEFLATE stream management.
//!
//! This is built directly on `flate2`'s low-level [`Compress`]/[`Decompress`]
//! types rather than its `Read`/`Write` wrappers, because the format needs
//! two things those wrappers don't expose: precise knowledge of how many
//! compressed bytes were consumed to produce a given amount of output, and
//! the leftover bytes after a stream's `Status::StreamEnd` — the start of
//! whatever comes next in the same byte source.

use flate2::{Compress, Compression, Decompress, FlushCompress, FlushDecompress, Status};
use std::io::Read;

use crate::error::Result;

const CHUNK: usize = 8192;

/// One raw-DEFLATE encoder. The writer drives one of these per Data Region
/// stream and one more for the Index Region.
pub struct EncodeStream {
    compress: Compress,
}

impl EncodeStream {
    pub fn new(level: u32) -> Self {
        Self { compress: Compress::new(Compression::new(level), false) }
    }

    /// Compress all of `input`, returning every compressed byte produced.
    /// Does not flush or end the stream — more input may follow.
    pub fn compress_all(&mut self, input: &[u8]) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        let mut consumed_total = 0usize;
        while consumed_total < input.len() {
            let mut tmp = vec![0u8; CHUNK];
            let before_in = self.compress.total_in();
            let before_out = self.compress.total_out();
            self.compress.compress(&input[consumed_total..], &mut tmp, FlushCompress::None)?;
            let consumed = (self.compress.total_in() - before_in) as usize;
            let produced = (self.compress.total_out() - before_out) as usize;
            out.extend_from_slice(&tmp[..produced]);
            consumed_total += consumed;
        }
        Ok(out)
    }

    /// Flush the encoder to completion and consume it, returning the final
    /// compressed bytes. After this the stream is fully terminated; a new
    /// [`EncodeStream`] must be created for whatever follows.
    pub fn finish(mut self) -> Result<Vec<u8>> {
        let mut out = Vec::new();
        loop {
            let mut tmp = vec![0u8; CHUNK];
            let before_out = self.compress.total_out();
            let status = self.compress.compress(&[], &mut tmp, FlushCompress::Finish)?;
            let produced = (self.compress.total_out() - before_out) as usize;
            out.extend_from_slice(&tmp[..produced]);
            if status == Status::StreamEnd {
                break;
            }
        }
        Ok(out)
    }
}

/// One raw-DEFLATE decoder, plus the bookkeeping needed to detect and
/// survive a stream boundary mid-read.
pub struct DecodeStream {
    decompress: Decompress,
    /// Compressed bytes already pulled from the source but not yet fed to
    /// `decompress` (because the previous call returned before consuming
    /// all of it — flate2 never needs more than it was given to make
    /// progress, so this only shrinks).
    pending: Vec<u8>,
    eos: bool,
    /// Valid once `eos` is true: bytes belonging to whatever stream follows.
    unused_input: Vec<u8>,
}

impl DecodeStream {
    pub fn new() -> Self {
        Self { decompress: Decompress::new(false), pending: Vec::new(), eos: false, unused_input: Vec::new() }
    }

    /// Start a decoder that is pre-seeded with bytes already pulled from the
    /// source by a previous (now-finished) decoder — the `unused_input`
    /// handoff §4.2 describes.
    pub fn seeded(carryover: Vec<u8>) -> Self {
        Self { decompress: Decompress::new(false), pending: carryover, eos: false, unused_input: Vec::new() }
    }

    #[inline]
    pub fn eos(&self) -> bool {
        self.eos
    }

    #[inline]
    pub fn unused_input(&self) -> &[u8] {
        &self.unused_input
    }

    /// Read up to `n` decompressed bytes, pulling more compressed input from
    /// `source` as needed. Returns fewer than `n` bytes only when EOS is
    /// reached (check `eos()`) or `source` is exhausted first.
    pub fn read_decompressed<R: Read>(&mut self, source: &mut R, n: usize) -> Result<Vec<u8>> {
        let mut out = Vec::with_capacity(n);
        while out.len() < n && !self.eos {
            if self.pending.is_empty() {
                let mut chunk = [0u8; CHUNK];
                let read = source.read(&mut chunk)?;
                if read == 0 {
                    break;
                }
                self.pending.extend_from_slice(&chunk[..read]);
            }

            let mut tmp = vec![0u8; n - out.len()];
            let before_in = self.decompress.total_in();
            let before_out = self.decompress.total_out();
            let status = self.decompress.decompress(&self.pending, &mut tmp, FlushDecompress::None)?;
            let consumed = (self.decompress.total_in() - before_in) as usize;
            let produced = (self.decompress.total_out() - before_out) as usize;

            out.extend_from_slice(&tmp[..produced]);
            self.pending.drain(0..consumed);

            if status == Status::StreamEnd {
                self.eos = true;
                self.unused_input = std::mem::take(&mut self.pending);
            }
        }
        Ok(out)
    }

    /// Decode and discard exactly `n` decompressed bytes (used by
    /// `IndexReader::open_item` to skip to an item's contents).
    pub fn skip_decompressed<R: Read>(&mut self, source: &mut R, n: u64) -> Result<()> {
        let mut remaining = n;
        while remaining > 0 {
            let chunk = remaining.min(CHUNK as u64) as usize;
            let got = self.read_decompressed(source, chunk)?;
            if got.is_empty() {
                return Err(crate::error::PoafError::MalformedInput(
                    "unexpected end of stream while skipping to item contents".into(),
                ));
            }
            remaining -= got.len() as u64;
        }
        Ok(())
    }
}

impl Default for DecodeStream {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for DecodeStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DecodeStream")
            .field("pending", &self.pending)
            .field("eos", &self.eos)
            .field("unused_input", &self.unused_input)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    #[test]
    fn roundtrip_single_stream() {
        let data = b"the quick brown fox jumps over the lazy dog".repeat(100);
        let mut enc = EncodeStream::new(6);
        let mut compressed = enc.compress_all(&data).unwrap();
        compressed.extend(enc.finish().unwrap());

        let mut dec = DecodeStream::new();
        let mut src = Cursor::new(compressed);
        let out = dec.read_decompressed(&mut src, data.len()).unwrap();
        assert_eq!(out, data);
    }

    #[test]
    fn empty_stream_is_two_bytes_and_decodes_to_nothing() {
        let enc = EncodeStream::new(6);
        let compressed = enc.finish().unwrap();
        assert_eq!(compressed, vec![0x03, 0x00]);

        let mut dec = DecodeStream::new();
        let mut src = Cursor::new(compressed);
        let out = dec.read_decompressed(&mut src, 100).unwrap();
        assert!(out.is_empty());
        assert!(dec.eos());
    }

    #[test]
    fn reports_unused_input_across_concatenated_streams() {
        let mut enc1 = EncodeStream::new(6);
        let mut first = enc1.compress_all(b"first").unwrap();
        first.extend(enc1.finish().unwrap());

        let mut enc2 = EncodeStream::new(6);
        let mut second = enc2.compress_all(b"second!!").unwrap();
        second.extend(enc2.finish().unwrap());

        let mut both = first.clone();
        both.extend(second.clone());

        let mut dec = DecodeStream::new();
        let mut src = Cursor::new(both);
        let out = dec.read_decompressed(&mut src, 5).unwrap();
        assert_eq!(out, b"first");
        assert!(dec.eos());

        let mut dec2 = DecodeStream::seeded(dec.unused_input().to_vec());
        let out2 = dec2.read_decompressed(&mut src, 8).unwrap();
        assert_eq!(out2, b"second!!");
    }
}
