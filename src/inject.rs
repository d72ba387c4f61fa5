//! In-place replacement of a file's contents.
//!
//! Injection overwrites the allocated extent of an existing entry; it never
//! allocates. The sequence is:
//!
//! 1. Resolve the path ([`Error::PathNotFound`]).
//! 2. Check the declared length against the size on disk
//!    ([`Error::CapacityExceeded`]). Nothing has been written yet.
//! 3. Copy the source in [`CHUNK_SIZE`] chunks through a [`FileStream`]
//!    ([`Error::TruncatedInput`] if the source ends early).
//! 4. Close the stream, then shrink the logical size if the new content is
//!    shorter than the old.
//!
//! A failure in step 3 leaves the blocks written so far in place; there is
//! no rollback.
//!
//! [`FileStream`]: crate::fs::FileStream

use std::io::{ErrorKind, Read};

use log::{debug, info};

use crate::device::SectorDevice;
use crate::fs::{FileEntry, Wfs};
use crate::{Error, Result};

/// Bytes read from the source per iteration.
pub const CHUNK_SIZE: usize = 0x2000;

/// Outcome of a successful injection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InjectReport {
    /// Bytes copied from the source.
    pub written: u64,
    /// Logical size before injection.
    pub previous_size: u64,
    /// Logical size after injection.
    pub size: u64,
    /// Allocated extent, unchanged by injection.
    pub size_on_disk: u64,
}

/// Resolve `path` and check that `len` bytes fit its extent.
pub fn resolve_target<D: SectorDevice>(wfs: &Wfs<D>, path: &str, len: u64) -> Result<FileEntry> {
    let file = wfs
        .get_file(path)
        .ok_or_else(|| Error::PathNotFound(path.to_owned()))?;
    check_capacity(&file, len)?;
    Ok(file)
}

/// Fail with [`Error::CapacityExceeded`] if `len` exceeds the extent of `file`.
pub fn check_capacity(file: &FileEntry, len: u64) -> Result<()> {
    if len > file.size_on_disk() {
        return Err(Error::CapacityExceeded {
            wanted: len,
            available: file.size_on_disk(),
        });
    }
    Ok(())
}

/// Overwrite the entry at `path` with exactly `len` bytes read from `source`.
pub fn inject<D: SectorDevice, R: Read>(
    wfs: &mut Wfs<D>,
    path: &str,
    mut source: R,
    len: u64,
) -> Result<InjectReport> {
    let mut file = resolve_target(wfs, path, len)?;
    let previous_size = file.size();

    let mut stream = wfs.open_stream(&mut file);
    let mut chunk = vec![0u8; CHUNK_SIZE];
    let mut remaining = len;
    while remaining > 0 {
        let want = usize::try_from(remaining).map_or(chunk.len(), |r| r.min(chunk.len()));
        let read = match source.read(&mut chunk[..want]) {
            Ok(0) => {
                return Err(Error::TruncatedInput {
                    expected: len,
                    available: len - remaining,
                });
            }
            Ok(n) => n,
            Err(e) if e.kind() == ErrorKind::Interrupted => continue,
            Err(e) => return Err(e.into()),
        };
        stream.write(&chunk[..read])?;
        remaining -= read as u64;
    }
    let written = stream.close()?;
    debug!("{path}: copied {written:#x} bytes");

    if written < previous_size {
        wfs.resize(&mut file, written)?;
    }
    info!(
        "injected {written} bytes into {path} (size {previous_size} -> {}, {} on disk)",
        file.size(),
        file.size_on_disk()
    );
    Ok(InjectReport {
        written,
        previous_size,
        size: file.size(),
        size_on_disk: file.size_on_disk(),
    })
}
