//! Re-encryption of a volume from one console key to another.
//!
//! Recryption copies every allocated unit of the source volume (the header
//! unit and every extent block) to the same sector address of the
//! destination, decrypting under the source key and encrypting under the
//! destination key. Unallocated space of the destination is not touched.
//!
//! [`run`] drives a whole invocation of `wfs-recryptor` from a [`Config`].

use std::fs::{self, File};
use std::io::BufReader;

use log::{debug, info};

use crate::config::{Config, DeviceConfig, InjectionConfig};
use crate::device::geometry::detect_geometry;
use crate::device::{EncryptedDevice, FileDevice, Geometry, RawImage, SectorDevice};
use crate::fs::{FileEntry, Wfs};
use crate::inject::{InjectReport, inject, resolve_target};
use crate::keys::DeviceKey;
use crate::{Error, Result};

/// Outcome of [`run`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    /// Geometry shared by both images.
    pub geometry: Geometry,
    /// Units copied, or [`None`] when recryption was skipped.
    pub recrypted_units: Option<usize>,
    pub injection: Option<InjectReport>,
}

/// Copy every allocated unit of `source` into `destination`.
///
/// Returns the number of units written. Both devices must have the same
/// geometry, since the IV of every unit depends on it.
pub fn recrypt<S: SectorDevice, T: SectorDevice>(
    source: &mut Wfs<S>,
    destination: &mut EncryptedDevice<T>,
) -> Result<usize> {
    if source.geometry() != destination.geometry() {
        return Err(Error::GeometryMismatch);
    }

    let header = source.read_header()?;
    destination.write_unit(0, &header)?;

    let blocks = source.extent_blocks();
    let mut buf = vec![0u8; source.block_size() as usize];
    for &block in &blocks {
        source.read_block(block, &mut buf)?;
        destination.write_unit(source.block_sector(block)?, &buf)?;
    }
    debug!("recrypted header and {} extent blocks", blocks.len());
    Ok(blocks.len() + 1)
}

/// Run a full recryption and/or injection as described by `config`.
///
/// Everything that can be checked up front is checked before the
/// destination is written: keys, geometries, and for an injection the
/// target path, its capacity and the length of the replacement file.
pub fn run(config: &Config) -> Result<RunReport> {
    let source_key = config.source.load_key(config.mode)?;
    let destination_key = config.destination.load_key(config.mode)?;

    let source = open_device(&config.source, source_key, false)?;
    let mut destination = open_device(&config.destination, destination_key, true)?;
    let replacement = config
        .injection
        .as_ref()
        .map(Replacement::open)
        .transpose()?;

    let recrypted_units = if config.inject_only {
        None
    } else {
        let mut source = Wfs::open(source)?;
        if let Some(replacement) = &replacement {
            // The destination catalog will be a copy of this one.
            replacement.check(&source)?;
        }
        let units = recrypt(&mut source, &mut destination)?;
        destination.flush()?;
        info!("recrypted {units} units");
        Some(units)
    };

    let mut wfs = Wfs::open(destination)?;
    let injection = match replacement {
        Some(replacement) => {
            replacement.check(&wfs)?;
            let reader = BufReader::new(replacement.file);
            Some(inject(
                &mut wfs,
                &replacement.config.path,
                reader,
                replacement.len,
            )?)
        }
        None => None,
    };
    wfs.flush()?;

    Ok(RunReport {
        geometry: wfs.geometry(),
        recrypted_units,
        injection,
    })
}

fn open_device(
    side: &DeviceConfig,
    key: DeviceKey,
    writable: bool,
) -> Result<EncryptedDevice<FileDevice<File>>> {
    let mut raw = RawImage::open(&side.image, writable)?;
    let geometry = detect_geometry(&mut raw, &key)?;
    info!(
        "{}: {} sectors of {:#x} bytes",
        side.image.display(),
        geometry.sectors_count,
        geometry.sector_size()
    );
    Ok(EncryptedDevice::new(raw.into_device(geometry)?, key))
}

/// The opened replacement source and the number of bytes to take from it.
struct Replacement<'a> {
    config: &'a InjectionConfig,
    file: File,
    len: u64,
    /// Length of a regular file. Pipes and other streams have none, so a
    /// short one is only caught by the copy loop.
    available: Option<u64>,
}

impl<'a> Replacement<'a> {
    fn open(config: &'a InjectionConfig) -> Result<Self> {
        let open_error = |source| Error::Open {
            what: "file to inject",
            path: config.file.clone(),
            source,
        };
        // Checked before opening: opening a FIFO blocks until a writer shows up.
        let metadata = fs::metadata(&config.file).map_err(open_error)?;
        let available = metadata.is_file().then(|| metadata.len());
        let len = match (config.size, available) {
            (Some(size), _) => size,
            (None, Some(available)) => available,
            (None, None) => {
                return Err(Error::ModeConflict(format!(
                    "{} is not a regular file, --inject-size is required",
                    config.file.display()
                )));
            }
        };
        let file = File::open(&config.file).map_err(open_error)?;
        Ok(Self {
            config,
            file,
            len,
            available,
        })
    }

    fn check<D: SectorDevice>(&self, wfs: &Wfs<D>) -> Result<FileEntry> {
        let target = resolve_target(wfs, &self.config.path, self.len)?;
        if let Some(available) = self.available.filter(|&a| self.len > a) {
            return Err(Error::TruncatedInput {
                expected: self.len,
                available,
            });
        }
        Ok(target)
    }
}
