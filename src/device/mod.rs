//! Sector devices backed by raw image files.
//!
//! A raw image goes through three stages:
//!
//! 1. [`RawImage`] - an opened file whose geometry is still unknown. It only
//!    supports probing reads, which is all geometry detection needs.
//! 2. [`FileDevice`] - the same file bound to a detected [`Geometry`],
//!    addressable in whole sectors through [`SectorDevice`].
//! 3. [`EncryptedDevice`] - a sector device bound to a [`DeviceKey`];
//!    reads decrypt and writes encrypt, with the IV derived from position.
//!
//! The only way from stage 1 to stage 2 is a geometry, and the only
//! trustworthy geometry comes from [`geometry::detect_geometry`], so no
//! sector I/O can happen on an image whose geometry was never established.

pub mod geometry;

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use crate::crypto::sector::{decrypt_sectors, encrypt_sectors, sector_iv};
use crate::keys::DeviceKey;
use crate::{Error, Result};

/// Sector size and count of a device.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Geometry {
    pub log2_sector_size: u32,
    pub sectors_count: u32,
}

impl Geometry {
    pub const fn new(log2_sector_size: u32, sectors_count: u32) -> Self {
        Self {
            log2_sector_size,
            sectors_count,
        }
    }

    pub const fn sector_size(&self) -> u32 {
        1 << self.log2_sector_size
    }

    /// Total addressable bytes.
    pub const fn byte_len(&self) -> u64 {
        (self.sectors_count as u64) << self.log2_sector_size
    }

    /// IV for a unit of `unit_len` bytes starting at `sector_address`.
    pub fn iv(&self, unit_len: u32, sector_address: u32) -> [u8; 16] {
        sector_iv(
            unit_len,
            sector_address,
            self.sectors_count,
            self.sector_size(),
        )
    }

    /// Number of sectors covered by `len` bytes, if `len` is sector aligned.
    fn sectors_in(&self, len: usize) -> Option<u32> {
        let size = self.sector_size() as usize;
        if len % size != 0 {
            return None;
        }
        u32::try_from(len / size).ok()
    }

    /// Reject runs that are unaligned or end past the last sector.
    fn check_run(&self, sector_address: u32, len: usize) -> Result<()> {
        let count = self.sectors_in(len).ok_or(Error::InvalidRange)?;
        match sector_address.checked_add(count) {
            Some(end) if end <= self.sectors_count => Ok(()),
            _ => Err(Error::InvalidRange),
        }
    }
}

/// A device addressable in whole sectors.
pub trait SectorDevice {
    fn geometry(&self) -> Geometry;

    /// Read `buf.len()` bytes starting at `sector_address`.
    ///
    /// `buf.len()` must be a multiple of the sector size.
    fn read_sectors(&mut self, sector_address: u32, buf: &mut [u8]) -> Result<()>;

    /// Write `data` starting at `sector_address`.
    ///
    /// `data.len()` must be a multiple of the sector size.
    fn write_sectors(&mut self, sector_address: u32, data: &[u8]) -> Result<()>;

    fn flush(&mut self) -> Result<()>;
}

/// An opened image whose geometry has not been detected yet.
#[derive(Debug)]
pub struct RawImage<F> {
    inner: F,
    len: u64,
}

impl RawImage<File> {
    /// Open an image file. `writable` opens it for in-place modification.
    pub fn open(path: impl AsRef<Path>, writable: bool) -> Result<Self> {
        let path = path.as_ref();
        let file = OpenOptions::new()
            .read(true)
            .write(writable)
            .open(path)
            .map_err(|source| Error::Open {
                what: "wfs image",
                path: path.to_path_buf(),
                source,
            })?;
        Self::new(file)
    }
}

impl<F: Read + Seek> RawImage<F> {
    pub fn new(mut inner: F) -> Result<Self> {
        let len = inner.seek(SeekFrom::End(0))?;
        Ok(Self { inner, len })
    }

    /// Image length in bytes.
    pub fn len(&self) -> u64 {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read raw (still encrypted) bytes at `offset`.
    pub fn read_at(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        match offset.checked_add(buf.len() as u64) {
            Some(end) if end <= self.len => {}
            _ => return Err(Error::InvalidRange),
        }
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf)?;
        Ok(())
    }

    /// Bind the image to `geometry`, which must fit inside the file.
    pub fn into_device(self, geometry: Geometry) -> Result<FileDevice<F>> {
        if geometry.byte_len() > self.len || geometry.sectors_count == 0 {
            return Err(Error::InvalidRange);
        }
        Ok(FileDevice {
            inner: self.inner,
            geometry,
        })
    }
}

/// A raw image file with a known geometry.
#[derive(Debug)]
pub struct FileDevice<F> {
    inner: F,
    geometry: Geometry,
}

impl<F> FileDevice<F> {
    /// Consume the device, returning the inner file.
    pub fn into_inner(self) -> F {
        self.inner
    }
}

impl<F: Read + Write + Seek> SectorDevice for FileDevice<F> {
    fn geometry(&self) -> Geometry {
        self.geometry
    }

    fn read_sectors(&mut self, sector_address: u32, buf: &mut [u8]) -> Result<()> {
        self.geometry.check_run(sector_address, buf.len())?;
        let offset = (sector_address as u64) << self.geometry.log2_sector_size;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.read_exact(buf)?;
        Ok(())
    }

    fn write_sectors(&mut self, sector_address: u32, data: &[u8]) -> Result<()> {
        self.geometry.check_run(sector_address, data.len())?;
        let offset = (sector_address as u64) << self.geometry.log2_sector_size;
        self.inner.seek(SeekFrom::Start(offset))?;
        self.inner.write_all(data)?;
        Ok(())
    }

    fn flush(&mut self) -> Result<()> {
        self.inner.flush()?;
        Ok(())
    }
}

/// A sector device bound to one storage key.
///
/// Each read or write is one encryption unit: a run of whole sectors
/// encrypted as a single AES-CBC message whose IV encodes the run length,
/// its first sector and the device geometry. A unit must therefore always
/// be read back with the same start sector and length it was written with.
#[derive(Debug)]
pub struct EncryptedDevice<D> {
    device: D,
    key: DeviceKey,
}

impl<D: SectorDevice> EncryptedDevice<D> {
    pub fn new(device: D, key: DeviceKey) -> Self {
        Self { device, key }
    }

    pub fn geometry(&self) -> Geometry {
        self.device.geometry()
    }

    /// Read and decrypt one unit starting at `sector_address`.
    pub fn read_unit(&mut self, sector_address: u32, buf: &mut [u8]) -> Result<()> {
        let iv = self.unit_iv(sector_address, buf.len())?;
        self.device.read_sectors(sector_address, buf)?;
        decrypt_sectors(buf, self.key.as_bytes(), &iv)
    }

    /// Encrypt and write one unit starting at `sector_address`.
    pub fn write_unit(&mut self, sector_address: u32, data: &[u8]) -> Result<()> {
        let iv = self.unit_iv(sector_address, data.len())?;
        let mut encrypted = data.to_vec();
        encrypt_sectors(&mut encrypted, self.key.as_bytes(), &iv)?;
        self.device.write_sectors(sector_address, &encrypted)
    }

    pub fn flush(&mut self) -> Result<()> {
        self.device.flush()
    }

    /// Consume the device, returning the unkeyed sector device.
    pub fn into_inner(self) -> D {
        self.device
    }

    fn unit_iv(&self, sector_address: u32, len: usize) -> Result<[u8; 16]> {
        let unit_len = u32::try_from(len).map_err(|_| Error::InvalidRange)?;
        Ok(self.geometry().iv(unit_len, sector_address))
    }
}
