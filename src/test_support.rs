//! Builders for keyed in-memory volumes used across the unit tests.

use std::io::Cursor;

use crate::device::geometry::detect_geometry;
use crate::device::{EncryptedDevice, FileDevice, Geometry, RawImage};
use crate::fs::catalog::{Catalog, CatalogEntry};
use crate::fs::{FileEntry, Wfs};
use crate::keys::{DeviceKey, OTP_SIZE, SEEPROM_SIZE};

pub(crate) type MemDevice = FileDevice<Cursor<Vec<u8>>>;

pub(crate) fn test_key(seed: u8) -> DeviceKey {
    DeviceKey::new(std::array::from_fn(|i| seed.wrapping_mul(31).wrapping_add(i as u8)))
}

/// One catalog entry, optionally with its whole extent filled with a byte.
pub(crate) struct TestEntry {
    path: &'static str,
    first_block: u32,
    size: u32,
    size_on_disk: u32,
    fill: Option<u8>,
}

impl TestEntry {
    pub(crate) fn new(path: &'static str, first_block: u32, size: u32, size_on_disk: u32) -> Self {
        Self {
            path,
            first_block,
            size,
            size_on_disk,
            fill: None,
        }
    }

    pub(crate) fn fill(mut self, byte: u8) -> Self {
        self.fill = Some(byte);
        self
    }
}

/// Lay out a 4 KiB-block volume with `entries` and return the encrypted image.
pub(crate) fn build_image(geometry: Geometry, key: &DeviceKey, entries: &[TestEntry]) -> Vec<u8> {
    let image = vec![0u8; geometry.byte_len() as usize];
    let device = RawImage::new(Cursor::new(image))
        .unwrap()
        .into_device(geometry)
        .unwrap();
    let mut device = EncryptedDevice::new(device, key.clone());

    let mut catalog = Catalog::new(12);
    for entry in entries {
        catalog.entries.push(CatalogEntry {
            path: entry.path.to_owned(),
            first_block: entry.first_block,
            size: entry.size,
            size_on_disk: entry.size_on_disk,
        });
    }
    device.write_unit(0, &catalog.to_block().unwrap()).unwrap();

    let sectors_per_block = 0x1000 >> geometry.log2_sector_size;
    for entry in entries {
        let Some(byte) = entry.fill else { continue };
        for i in 0..entry.size_on_disk / 0x1000 {
            let sector = (entry.first_block + i) * sectors_per_block;
            device.write_unit(sector, &[byte; 0x1000]).unwrap();
        }
    }
    device.into_inner().into_inner().into_inner()
}

/// Detect and mount an in-memory image.
pub(crate) fn mount(image: Vec<u8>, key: &DeviceKey) -> Wfs<MemDevice> {
    let mut raw = RawImage::new(Cursor::new(image)).unwrap();
    let geometry = detect_geometry(&mut raw, key).unwrap();
    let device = raw.into_device(geometry).unwrap();
    Wfs::open(EncryptedDevice::new(device, key.clone())).unwrap()
}

/// Decrypt the whole extent of `file`.
pub(crate) fn read_extent(wfs: &mut Wfs<MemDevice>, file: &FileEntry) -> Vec<u8> {
    let block_size = wfs.block_size() as usize;
    let mut out = vec![0u8; file.size_on_disk() as usize];
    for (i, chunk) in out.chunks_mut(block_size).enumerate() {
        wfs.read_block(file.first_block() + i as u32, chunk).unwrap();
    }
    out
}

/// An OTP dump whose MLC key is `mlc_key` and whose other bytes derive from `seed`.
pub(crate) fn otp_with_mlc_key(mlc_key: &DeviceKey, seed: u8) -> Vec<u8> {
    let mut data: Vec<u8> = (0..OTP_SIZE).map(|i| (i as u8).wrapping_add(seed)).collect();
    data[0x180..0x190].copy_from_slice(mlc_key.as_bytes());
    data
}

pub(crate) fn seeprom_dump(seed: u8) -> Vec<u8> {
    (0..SEEPROM_SIZE).map(|i| (i as u8) ^ seed).collect()
}
