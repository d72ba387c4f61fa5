//! Sequential writer over a file's extent.
//!
//! Data is buffered one block at a time; each full block is encrypted and
//! written at its position in the extent. [`FileStream::close`] is the
//! commit point: it writes the final partial block (merging with the bytes
//! already stored past the written length) and grows the logical size if
//! the stream wrote past it. A stream dropped without `close` leaves its
//! full blocks on disk but never updates the catalog.

use log::debug;

use super::{FileEntry, Wfs};
use crate::device::SectorDevice;
use crate::{Error, Result};

/// Writer returned by [`Wfs::open_stream`].
#[derive(Debug)]
pub struct FileStream<'a, D: SectorDevice> {
    wfs: &'a mut Wfs<D>,
    file: &'a mut FileEntry,
    buf: Vec<u8>,
    filled: usize,
    next_block: u32,
    written: u64,
}

impl<'a, D: SectorDevice> FileStream<'a, D> {
    pub(super) fn new(wfs: &'a mut Wfs<D>, file: &'a mut FileEntry) -> Self {
        let block_size = wfs.block_size() as usize;
        Self {
            wfs,
            file,
            buf: vec![0u8; block_size],
            filled: 0,
            next_block: 0,
            written: 0,
        }
    }

    /// Bytes accepted so far.
    pub fn written(&self) -> u64 {
        self.written
    }

    /// Append `data`. Fails without writing anything if it would run past
    /// the end of the extent.
    pub fn write(&mut self, mut data: &[u8]) -> Result<()> {
        let wanted = self.written + data.len() as u64;
        if wanted > self.file.size_on_disk {
            return Err(Error::CapacityExceeded {
                wanted,
                available: self.file.size_on_disk,
            });
        }
        while !data.is_empty() {
            let n = data.len().min(self.buf.len() - self.filled);
            self.buf[self.filled..self.filled + n].copy_from_slice(&data[..n]);
            self.filled += n;
            self.written += n as u64;
            data = &data[n..];
            if self.filled == self.buf.len() {
                self.flush_block()?;
            }
        }
        Ok(())
    }

    /// Commit the stream and return the number of bytes written.
    pub fn close(mut self) -> Result<u64> {
        if self.filled > 0 {
            let block = self.file.first_block + self.next_block;
            let mut merged = vec![0u8; self.buf.len()];
            self.wfs.read_block(block, &mut merged)?;
            merged[..self.filled].copy_from_slice(&self.buf[..self.filled]);
            self.wfs.write_block(block, &merged)?;
            self.filled = 0;
        }
        if self.written > self.file.size {
            self.wfs.set_size(&mut *self.file, self.written)?;
        }
        debug!("{}: stream closed after {:#x} bytes", self.file.path, self.written);
        Ok(self.written)
    }

    fn flush_block(&mut self) -> Result<()> {
        let block = self.file.first_block + self.next_block;
        self.wfs.write_block(block, &self.buf)?;
        self.next_block += 1;
        self.filled = 0;
        Ok(())
    }
}
