//! A bounded, shareable byte source over a random-access (`Read + Seek`)
//! underlying file.
//!
//! [`SharedView`] wraps an `Rc<RefCell<S>>` rather than requiring `S: Clone`,
//! so several independent views over the same file can be live and read from
//! at once — each reseeks the shared handle to its own logical position
//! before every read, so their positions never interfere with one another as
//! long as nothing reads concurrently.

use std::cell::RefCell;
use std::io::{self, Read, Seek, SeekFrom};
use std::rc::Rc;

/// A `[start, end)` window over a source shared with other views of the same
/// underlying file. Reseeks before every read, so several `SharedView`s may
/// be live and read from independently.
#[derive(Debug)]
pub struct SharedView<S: Read + Seek> {
    inner: Rc<RefCell<S>>,
    pos: u64,
    end: u64,
}

impl<S: Read + Seek> SharedView<S> {
    pub fn new(inner: Rc<RefCell<S>>, start: u64, end: u64) -> Self {
        Self { inner, pos: start, end }
    }

    pub fn remaining(&self) -> u64 {
        self.end.saturating_sub(self.pos)
    }
}

impl<S: Read + Seek> Read for SharedView<S> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let room = self.remaining();
        if room == 0 {
            return Ok(0);
        }
        let want = (buf.len() as u64).min(room) as usize;
        let mut src = self.inner.borrow_mut();
        src.seek(SeekFrom::Start(self.pos))?;
        let n = src.read(&mut buf[..want])?;
        self.pos += n as u64;
        Ok(n)
    }
}
