//! Sector size and count detection.
//!
//! Neither value is stored in plaintext anywhere. The header block is
//! encrypted with an IV that embeds the device geometry, so the geometry is
//! recovered by trial: decrypt the header under each candidate and keep the
//! first one that yields a structurally valid catalog header.
//!
//! Candidates are the three sector sizes Wii U storage uses (512, 2048 and
//! 4096 bytes), each paired with the sector count implied by the image
//! length.

use std::io::{Read, Seek};

use log::debug;

use super::{Geometry, RawImage};
use crate::crypto::sector::decrypt_sectors;
use crate::fs::catalog::{HEADER_BLOCK_SIZE, is_valid_header};
use crate::keys::DeviceKey;
use crate::{Error, Result};

/// log2 of every sector size a device may use, in probing order.
pub const LOG2_SECTOR_SIZES: [u32; 3] = [9, 11, 12];

/// Candidate geometries for an image of `image_len` bytes.
///
/// Hypotheses that cannot hold the header block, or whose sector count
/// does not fit in 32 bits, are skipped.
pub fn candidates(image_len: u64) -> Vec<Geometry> {
    LOG2_SECTOR_SIZES
        .iter()
        .filter_map(|&log2| {
            let count = u32::try_from(image_len >> log2).ok()?;
            let geometry = Geometry::new(log2, count);
            (geometry.byte_len() >= HEADER_BLOCK_SIZE as u64).then_some(geometry)
        })
        .collect()
}

/// Return the first candidate whose decrypted probe satisfies `is_valid`.
///
/// `decrypt` turns a hypothesis into the plaintext it would imply. It is
/// injected so the search can be exercised without any file I/O.
pub fn find_geometry<I, F, V>(candidates: I, mut decrypt: F, is_valid: V) -> Result<Geometry>
where
    I: IntoIterator<Item = Geometry>,
    F: FnMut(Geometry) -> Result<Vec<u8>>,
    V: Fn(&[u8]) -> bool,
{
    for geometry in candidates {
        let plain = decrypt(geometry)?;
        if is_valid(&plain) {
            return Ok(geometry);
        }
        debug!(
            "geometry hypothesis rejected: sector size {:#x}, {} sectors",
            geometry.sector_size(),
            geometry.sectors_count
        );
    }
    Err(Error::GeometryDetection)
}

/// Detect the geometry of `image` under `key`.
///
/// Fails with [`Error::GeometryDetection`] when no hypothesis decrypts to a
/// valid header, which means a wrong key or a corrupted image.
pub fn detect_geometry<F: Read + Seek>(
    image: &mut RawImage<F>,
    key: &DeviceKey,
) -> Result<Geometry> {
    if image.len() < HEADER_BLOCK_SIZE as u64 {
        return Err(Error::GeometryDetection);
    }
    let mut encrypted = vec![0u8; HEADER_BLOCK_SIZE];
    image.read_at(0, &mut encrypted)?;

    let geometry = find_geometry(
        candidates(image.len()),
        |geometry| {
            let mut plain = encrypted.clone();
            decrypt_sectors(
                &mut plain,
                key.as_bytes(),
                &geometry.iv(HEADER_BLOCK_SIZE as u32, 0),
            )?;
            Ok(plain)
        },
        is_valid_header,
    )?;
    debug!(
        "detected geometry: sector size {:#x}, {} sectors",
        geometry.sector_size(),
        geometry.sectors_count
    );
    Ok(geometry)
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;

    use super::*;
    use crate::test_support::{TestEntry, build_image, test_key};

    #[test]
    fn candidates_follow_image_length() {
        let c = candidates(0x10_0000);
        assert_eq!(
            c,
            vec![
                Geometry::new(9, 0x800),
                Geometry::new(11, 0x200),
                Geometry::new(12, 0x100),
            ]
        );
        assert!(candidates(0x800).is_empty());
    }

    #[test]
    fn search_returns_first_valid_hypothesis() {
        let all = vec![
            Geometry::new(9, 4),
            Geometry::new(11, 2),
            Geometry::new(12, 1),
        ];
        let mut tried = Vec::new();
        let found = find_geometry(
            all.clone(),
            |g| {
                tried.push(g);
                Ok(vec![g.log2_sector_size as u8])
            },
            |plain| plain[0] >= 11,
        )
        .unwrap();
        assert_eq!(found, Geometry::new(11, 2));
        assert_eq!(tried, &all[..2]);
    }

    #[test]
    fn search_fails_when_nothing_matches() {
        let result = find_geometry(
            [Geometry::new(9, 8)],
            |_| Ok(vec![0u8; 16]),
            |_| false,
        );
        assert!(matches!(result, Err(Error::GeometryDetection)));
    }

    #[test]
    fn search_propagates_decrypt_errors() {
        let result = find_geometry(
            [Geometry::new(9, 8)],
            |_| Err(Error::InvalidRange),
            |_| true,
        );
        assert!(matches!(result, Err(Error::InvalidRange)));
    }

    #[test]
    fn detects_each_sector_size() {
        for log2 in LOG2_SECTOR_SIZES {
            let geometry = Geometry::new(log2, (0x40000u32) >> log2);
            let key = test_key(0x21);
            let image = build_image(geometry, &key, &[TestEntry::new("/a", 1, 0x10, 0x1000)]);

            let mut raw = RawImage::new(Cursor::new(image)).unwrap();
            assert_eq!(detect_geometry(&mut raw, &key).unwrap(), geometry);
            // Detection does not depend on earlier calls.
            assert_eq!(detect_geometry(&mut raw, &key).unwrap(), geometry);
        }
    }

    #[test]
    fn wrong_key_fails_detection() {
        let geometry = Geometry::new(9, 0x200);
        let image = build_image(geometry, &test_key(1), &[]);
        let mut raw = RawImage::new(Cursor::new(image)).unwrap();
        assert!(matches!(
            detect_geometry(&mut raw, &test_key(2)),
            Err(Error::GeometryDetection)
        ));
    }

    #[test]
    fn tiny_image_fails_detection() {
        let mut raw = RawImage::new(Cursor::new(vec![0u8; 0x200])).unwrap();
        assert!(matches!(
            detect_geometry(&mut raw, &test_key(1)),
            Err(Error::GeometryDetection)
        ));
    }
}
