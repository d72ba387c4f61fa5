//! Filesystem session over a keyed device.
//!
//! [`Wfs`] mounts an [`EncryptedDevice`] by reading and validating the
//! catalog header in block 0, then resolves paths to [`FileEntry`] handles.
//! The full WFS directory tree and allocator are not implemented; a volume
//! is a flat catalog of files, each owning a contiguous extent of blocks.
//! That is all in-place recryption and injection need: both only rewrite
//! blocks that are already allocated.
//!
//! Every block is one encryption unit, addressed by its first sector. With
//! 4 KiB blocks a block spans 8, 2 or 1 sectors depending on the geometry.

pub mod catalog;
pub mod stream;

use log::debug;

use crate::device::{EncryptedDevice, Geometry, SectorDevice};
use crate::{Error, Result};

use catalog::{Catalog, HEADER_BLOCK_SIZE};
pub use stream::FileStream;

/// Handle to one catalog entry.
///
/// A handle is a snapshot; it is kept current by the [`Wfs`] methods that
/// take it by `&mut`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileEntry {
    index: usize,
    path: String,
    first_block: u32,
    size: u64,
    size_on_disk: u64,
}

impl FileEntry {
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Logical size in bytes.
    pub fn size(&self) -> u64 {
        self.size
    }

    /// Bytes that can be written without changing the allocation.
    pub fn size_on_disk(&self) -> u64 {
        self.size_on_disk
    }

    pub fn first_block(&self) -> u32 {
        self.first_block
    }
}

/// A mounted volume.
#[derive(Debug)]
pub struct Wfs<D> {
    device: EncryptedDevice<D>,
    catalog: Catalog,
}

impl<D: SectorDevice> Wfs<D> {
    /// Mount `device`, validating the header and every extent.
    pub fn open(mut device: EncryptedDevice<D>) -> Result<Self> {
        let geometry = device.geometry();
        if HEADER_BLOCK_SIZE as u32 % geometry.sector_size() != 0 {
            return Err(Error::Parse("sector size exceeds header block size"));
        }
        let mut header = vec![0u8; HEADER_BLOCK_SIZE];
        device.read_unit(0, &mut header)?;
        let catalog = Catalog::parse(&header)?;

        let total_blocks = geometry.byte_len() >> catalog.log2_block_size;
        for entry in &catalog.entries {
            let end = entry.first_block as u64 + entry.block_count(catalog.log2_block_size) as u64;
            if end > total_blocks {
                return Err(Error::InvalidRange);
            }
        }
        debug!(
            "mounted volume: {} entries, block size {:#x}",
            catalog.entries.len(),
            catalog.block_size()
        );
        Ok(Self { device, catalog })
    }

    pub fn catalog(&self) -> &Catalog {
        &self.catalog
    }

    pub fn geometry(&self) -> Geometry {
        self.device.geometry()
    }

    pub fn block_size(&self) -> u32 {
        self.catalog.block_size()
    }

    /// Resolve `path` to a handle. Returns [`None`] if not found.
    pub fn get_file(&self, path: &str) -> Option<FileEntry> {
        let index = self.catalog.position(path)?;
        let entry = &self.catalog.entries[index];
        Some(FileEntry {
            index,
            path: entry.path.clone(),
            first_block: entry.first_block,
            size: entry.size as u64,
            size_on_disk: entry.size_on_disk as u64,
        })
    }

    /// Set the logical size of `file`. The extent is left untouched.
    pub fn resize(&mut self, file: &mut FileEntry, size: u64) -> Result<()> {
        if size > file.size_on_disk {
            return Err(Error::CapacityExceeded {
                wanted: size,
                available: file.size_on_disk,
            });
        }
        self.set_size(file, size)
    }

    /// Open a sequential writer over the extent of `file`.
    ///
    /// The writer mutably borrows both the session and the handle, so a
    /// handle can never have two writers at once.
    pub fn open_stream<'a>(&'a mut self, file: &'a mut FileEntry) -> FileStream<'a, D> {
        FileStream::new(self, file)
    }

    /// Every block owned by an extent, in catalog order.
    ///
    /// Block 0 is not included: only its first [`HEADER_BLOCK_SIZE`] bytes
    /// are in use, and they form their own unit. See [`Wfs::read_header`].
    pub fn extent_blocks(&self) -> Vec<u32> {
        let log2 = self.catalog.log2_block_size;
        self.catalog
            .entries
            .iter()
            .flat_map(|entry| entry.first_block..entry.first_block + entry.block_count(log2))
            .collect()
    }

    /// Read and decrypt the header unit as stored on disk.
    pub fn read_header(&mut self) -> Result<Vec<u8>> {
        let mut header = vec![0u8; HEADER_BLOCK_SIZE];
        self.device.read_unit(0, &mut header)?;
        Ok(header)
    }

    /// First sector of `block`.
    pub fn block_sector(&self, block: u32) -> Result<u32> {
        let shift = self.catalog.log2_block_size - self.geometry().log2_sector_size;
        block.checked_mul(1 << shift).ok_or(Error::InvalidRange)
    }

    /// Read and decrypt one block.
    pub fn read_block(&mut self, block: u32, buf: &mut [u8]) -> Result<()> {
        let sector = self.checked_block_sector(block, buf.len())?;
        self.device.read_unit(sector, buf)
    }

    /// Encrypt and write one block.
    pub fn write_block(&mut self, block: u32, data: &[u8]) -> Result<()> {
        let sector = self.checked_block_sector(block, data.len())?;
        self.device.write_unit(sector, data)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()
    }

    /// Unmount, returning the keyed device.
    pub fn into_device(self) -> EncryptedDevice<D> {
        self.device
    }

    fn checked_block_sector(&self, block: u32, len: usize) -> Result<u32> {
        if len != self.block_size() as usize {
            return Err(Error::InvalidRange);
        }
        self.block_sector(block)
    }

    /// Record a new logical size and rewrite the header block.
    fn set_size(&mut self, file: &mut FileEntry, size: u64) -> Result<()> {
        let size32 = u32::try_from(size).map_err(|_| Error::InvalidRange)?;
        let entry = self
            .catalog
            .entries
            .get_mut(file.index)
            .ok_or(Error::InvalidRange)?;
        entry.size = size32;
        file.size = size;

        let header = self.catalog.to_block()?;
        self.device.write_unit(0, &header)?;
        debug!("{}: logical size set to {size:#x}", file.path);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::device::RawImage;
    use crate::test_support::{MemDevice, TestEntry, build_image, mount, read_extent, test_key};

    fn volume() -> Wfs<MemDevice> {
        let key = test_key(9);
        let image = build_image(
            Geometry::new(9, 0x100),
            &key,
            &[
                TestEntry::new("/update/patch.bin", 1, 0x1800, 0x2000).fill(0x5C),
                TestEntry::new("/sys/config.xml", 3, 0x10, 0x1000),
            ],
        );
        mount(image, &key)
    }

    #[test]
    fn resolves_paths_to_handles() {
        let wfs = volume();
        let file = wfs.get_file("update/patch.bin").unwrap();
        assert_eq!(file.path(), "/update/patch.bin");
        assert_eq!(file.size(), 0x1800);
        assert_eq!(file.size_on_disk(), 0x2000);
        assert_eq!(file.first_block(), 1);
        assert!(wfs.get_file("/update/missing.bin").is_none());
    }

    #[test]
    fn extent_blocks_follow_catalog_order() {
        let mut wfs = volume();
        assert_eq!(wfs.extent_blocks(), vec![1, 2, 3]);
        assert_eq!(wfs.block_sector(3).unwrap(), 24);
        assert!(Catalog::parse(&wfs.read_header().unwrap()).is_ok());
    }

    #[test]
    fn resize_is_bounded_and_persisted() {
        let mut wfs = volume();
        let mut file = wfs.get_file("/update/patch.bin").unwrap();
        assert!(matches!(
            wfs.resize(&mut file, 0x2001),
            Err(Error::CapacityExceeded {
                wanted: 0x2001,
                available: 0x2000
            })
        ));
        wfs.resize(&mut file, 0x100).unwrap();
        assert_eq!(file.size(), 0x100);

        // Remount from the rewritten header.
        let wfs = Wfs::open(wfs.into_device()).unwrap();
        let file = wfs.get_file("update/patch.bin").unwrap();
        assert_eq!(file.size(), 0x100);
        assert_eq!(file.size_on_disk(), 0x2000);
    }

    #[test]
    fn resize_keeps_extent_contents() {
        let mut wfs = volume();
        let mut file = wfs.get_file("/update/patch.bin").unwrap();
        wfs.resize(&mut file, 0x10).unwrap();
        let data = read_extent(&mut wfs, &file);
        assert!(data.iter().all(|&b| b == 0x5C));
    }

    #[test]
    fn extent_past_device_end_is_rejected() {
        let key = test_key(3);
        let image = build_image(
            Geometry::new(12, 4),
            &key,
            &[TestEntry::new("/big", 2, 0, 0x3000)],
        );
        let raw = RawImage::new(Cursor::new(image)).unwrap();
        let device = raw.into_device(Geometry::new(12, 4)).unwrap();
        assert!(matches!(
            Wfs::open(EncryptedDevice::new(device, key)),
            Err(Error::InvalidRange)
        ));
    }
}
