//! Catalog header - the entry table stored in block 0 of a volume.
//!
//! ## Layout (block 0, 0x1000 bytes, encrypted as one unit at sector 0)
//! ```text
//! [0x00] Version          (u32 BE, 0x01010800)
//! [0x04] Log2BlockSize    (u32 BE, 12..=16)
//! [0x08] EntryCount       (u32 BE, <= 31)
//! [0x0C] Reserved         (u32)
//! [0x10] Hash             (32 bytes, SHA-256 of the block with this field zeroed)
//! [0x30] Reserved         (16 bytes)
//! [0x40] EntryTable       (EntryCount × 0x80 bytes)
//! ```
//!
//! ## Entry (0x80 bytes)
//! ```text
//! [0x00] FirstBlock   - block index of the extent (u32 BE, >= 1)
//! [0x04] Size         - logical size in bytes (u32 BE)
//! [0x08] SizeOnDisk   - allocated extent in bytes, whole blocks (u32 BE)
//! [0x0C] Reserved     (u32)
//! [0x10] Path         - absolute, null-terminated (0x70 bytes)
//! ```
//!
//! ## Notes
//! * Extents are contiguous runs of blocks; each block is one encryption
//!   unit addressed by its first sector.
//! * `Size <= SizeOnDisk` always holds for a valid header.

use std::io::Cursor;

use sha2::{Digest, Sha256};

use crate::utils::{be_u32, bytesa, magic_u32, null_string, put_be_u32};
use crate::{Error, Result};

/// Version word identifying a volume header.
pub const WFS_VERSION: u32 = 0x0101_0800;
/// Size of the header block in bytes.
pub const HEADER_BLOCK_SIZE: usize = 0x1000;

const HASH_OFFSET: usize = 0x10;
const HASH_LEN: usize = 0x20;
const ENTRY_TABLE_OFFSET: usize = 0x40;
const ENTRY_SIZE: usize = 0x80;
const PATH_OFFSET: usize = 0x10;
const PATH_LEN: usize = ENTRY_SIZE - PATH_OFFSET;

const MIN_LOG2_BLOCK_SIZE: u32 = 12;
const MAX_LOG2_BLOCK_SIZE: u32 = 16;

/// Maximum number of entries a header block can hold.
pub const MAX_ENTRIES: usize = (HEADER_BLOCK_SIZE - ENTRY_TABLE_OFFSET) / ENTRY_SIZE;

/// One file recorded in the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogEntry {
    /// Absolute path, e.g. `/sys/title/update.bin`.
    pub path: String,
    /// Block index of the first extent block.
    pub first_block: u32,
    /// Logical size in bytes.
    pub size: u32,
    /// Allocated extent in bytes.
    pub size_on_disk: u32,
}

impl CatalogEntry {
    /// Number of blocks in the extent.
    pub fn block_count(&self, log2_block_size: u32) -> u32 {
        self.size_on_disk >> log2_block_size
    }
}

/// Parsed header block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Catalog {
    pub log2_block_size: u32,
    pub entries: Vec<CatalogEntry>,
}

impl Catalog {
    pub fn new(log2_block_size: u32) -> Self {
        Self {
            log2_block_size,
            entries: Vec::new(),
        }
    }

    pub fn block_size(&self) -> u32 {
        1 << self.log2_block_size
    }

    /// Parse and validate a decrypted header block.
    pub fn parse(block: &[u8]) -> Result<Self> {
        if block.len() != HEADER_BLOCK_SIZE {
            return Err(Error::InvalidRange);
        }
        let mut r = Cursor::new(block);
        magic_u32(&mut r, WFS_VERSION)?;
        let log2_block_size = be_u32(&mut r)?;
        let entry_count = be_u32(&mut r)? as usize;
        let _reserved = be_u32(&mut r)?;
        let hash = bytesa::<HASH_LEN>(&mut r)?;

        if hash != checksum(block) {
            return Err(Error::BadChecksum);
        }
        if !(MIN_LOG2_BLOCK_SIZE..=MAX_LOG2_BLOCK_SIZE).contains(&log2_block_size) {
            return Err(Error::Parse("unsupported block size"));
        }
        if entry_count > MAX_ENTRIES {
            return Err(Error::Parse("entry count exceeds header capacity"));
        }

        let block_mask = (1u32 << log2_block_size) - 1;
        let mut entries = Vec::with_capacity(entry_count);
        for i in 0..entry_count {
            let raw = &block[ENTRY_TABLE_OFFSET + i * ENTRY_SIZE..][..ENTRY_SIZE];
            let mut r = Cursor::new(raw);
            let first_block = be_u32(&mut r)?;
            let size = be_u32(&mut r)?;
            let size_on_disk = be_u32(&mut r)?;
            let path = null_string(&raw[PATH_OFFSET..])?;

            if first_block == 0 {
                return Err(Error::Parse("extent overlaps the header block"));
            }
            if size > size_on_disk {
                return Err(Error::Parse("logical size exceeds size on disk"));
            }
            if size_on_disk & block_mask != 0 {
                return Err(Error::Parse("size on disk is not block aligned"));
            }
            if !path.starts_with('/') {
                return Err(Error::Parse("entry path is not absolute"));
            }
            entries.push(CatalogEntry {
                path,
                first_block,
                size,
                size_on_disk,
            });
        }

        Ok(Self {
            log2_block_size,
            entries,
        })
    }

    /// Serialize into a header block with a fresh checksum.
    pub fn to_block(&self) -> Result<Vec<u8>> {
        if self.entries.len() > MAX_ENTRIES {
            return Err(Error::Parse("entry count exceeds header capacity"));
        }
        let mut block = vec![0u8; HEADER_BLOCK_SIZE];
        put_be_u32(&mut block, 0x00, WFS_VERSION);
        put_be_u32(&mut block, 0x04, self.log2_block_size);
        put_be_u32(&mut block, 0x08, self.entries.len() as u32);

        for (i, entry) in self.entries.iter().enumerate() {
            let off = ENTRY_TABLE_OFFSET + i * ENTRY_SIZE;
            put_be_u32(&mut block, off, entry.first_block);
            put_be_u32(&mut block, off + 0x4, entry.size);
            put_be_u32(&mut block, off + 0x8, entry.size_on_disk);
            let path = entry.path.as_bytes();
            // Keep room for the terminator.
            if path.len() >= PATH_LEN {
                return Err(Error::InvalidRange);
            }
            block[off + PATH_OFFSET..off + PATH_OFFSET + path.len()].copy_from_slice(path);
        }

        let hash = checksum(&block);
        block[HASH_OFFSET..HASH_OFFSET + HASH_LEN].copy_from_slice(&hash);
        Ok(block)
    }

    /// Find an entry by path. A missing leading `/` is tolerated.
    pub fn position(&self, path: &str) -> Option<usize> {
        let path = path.strip_prefix('/').unwrap_or(path);
        self.entries
            .iter()
            .position(|e| e.path.strip_prefix('/') == Some(path))
    }
}

/// Whether `block` decrypted to a valid header.
pub fn is_valid_header(block: &[u8]) -> bool {
    Catalog::parse(block).is_ok()
}

fn checksum(block: &[u8]) -> [u8; HASH_LEN] {
    let mut hasher = Sha256::new();
    hasher.update(&block[..HASH_OFFSET]);
    hasher.update([0u8; HASH_LEN]);
    hasher.update(&block[HASH_OFFSET + HASH_LEN..]);
    hasher.finalize().into()
}
