//! Key material for Wii U storage encryption.
//!
//! Wii U storage keys are not stored anywhere on the device's filesystem;
//! they are derived from two per-console secret dumps:
//!
//! * **OTP** (one-time-programmable fuses, 0x400 bytes) holds the MLC key
//!   directly, plus the key used to wrap the USB key seed.
//! * **SEEPROM** (serial EEPROM, 0x200 bytes) holds the USB key seed.
//!
//! Internal storage (MLC) uses the OTP key as-is. External storage (USB)
//! uses the SEEPROM seed encrypted with the OTP seed key, so a USB key is
//! bound to both dumps of the same console.
//!
//! Which derivation applies is chosen explicitly by [`KeyMode`]; it is never
//! guessed from the contents of the dumps.

use std::fmt;
use std::fs;
use std::path::Path;

use crate::crypto::ecb::encrypt_block_ecb;
use crate::error::{BlobKind, LoadFailure};
use crate::{Error, Result};

/// Size of an OTP dump.
pub const OTP_SIZE: usize = 0x400;
/// Size of a SEEPROM dump.
pub const SEEPROM_SIZE: usize = 0x200;

const OTP_MLC_KEY_OFFSET: usize = 0x180;
const OTP_USB_SEED_KEY_OFFSET: usize = 0x130;
const SEEPROM_USB_SEED_OFFSET: usize = 0xB0;

/// Storage mode a key is derived for.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeyMode {
    /// Internal eMMC storage; key comes from the OTP alone.
    Mlc,
    /// External USB storage; key comes from SEEPROM + OTP.
    Usb,
}

impl fmt::Display for KeyMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            KeyMode::Mlc => write!(f, "mlc"),
            KeyMode::Usb => write!(f, "usb"),
        }
    }
}

/// A 128-bit storage encryption key.
///
/// `Debug` never prints the key bytes.
#[derive(Clone, PartialEq, Eq)]
pub struct DeviceKey([u8; 16]);

impl DeviceKey {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for DeviceKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("DeviceKey(..)")
    }
}

/// OTP fuse dump.
#[derive(Clone)]
pub struct Otp {
    data: Box<[u8; OTP_SIZE]>,
}

impl Otp {
    /// Validate a raw dump. The only structural rule is the fixed size.
    ///
    /// Only full [`OTP_SIZE`] dumps are accepted. A 32-byte file holding
    /// just the key bank is rejected with [`LoadFailure::Size`], since the
    /// MLC key and the USB seed key live at fixed offsets of the full dump.
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, LoadFailure> {
        let data: Box<[u8; OTP_SIZE]> = data
            .to_vec()
            .into_boxed_slice()
            .try_into()
            .map_err(|d: Box<[u8]>| LoadFailure::Size {
                expected: OTP_SIZE,
                actual: d.len(),
            })?;
        Ok(Self { data })
    }

    /// Load and validate an OTP dump from `path`.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_blob(path.as_ref(), BlobKind::Otp, Self::from_bytes)
    }

    /// The MLC storage key.
    pub fn mlc_key(&self) -> DeviceKey {
        DeviceKey(self.key_at(OTP_MLC_KEY_OFFSET))
    }

    /// The key wrapping the SEEPROM USB key seed.
    fn usb_seed_encryption_key(&self) -> [u8; 16] {
        self.key_at(OTP_USB_SEED_KEY_OFFSET)
    }

    fn key_at(&self, offset: usize) -> [u8; 16] {
        let mut key = [0u8; 16];
        key.copy_from_slice(&self.data[offset..offset + 16]);
        key
    }
}

impl fmt::Debug for Otp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Otp(..)")
    }
}

/// SEEPROM dump.
#[derive(Clone)]
pub struct Seeprom {
    usb_key_seed: [u8; 16],
}

impl Seeprom {
    /// Validate a raw dump. The only structural rule is the fixed size.
    pub fn from_bytes(data: &[u8]) -> std::result::Result<Self, LoadFailure> {
        if data.len() != SEEPROM_SIZE {
            return Err(LoadFailure::Size {
                expected: SEEPROM_SIZE,
                actual: data.len(),
            });
        }
        let mut usb_key_seed = [0u8; 16];
        usb_key_seed.copy_from_slice(&data[SEEPROM_USB_SEED_OFFSET..SEEPROM_USB_SEED_OFFSET + 16]);
        Ok(Self { usb_key_seed })
    }

    /// Load and validate a SEEPROM dump from `path`.
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self> {
        load_blob(path.as_ref(), BlobKind::Seeprom, Self::from_bytes)
    }

    /// The USB storage key, bound to the OTP of the same console.
    pub fn usb_key(&self, otp: &Otp) -> DeviceKey {
        DeviceKey(encrypt_block_ecb(
            &self.usb_key_seed,
            &otp.usb_seed_encryption_key(),
        ))
    }
}

impl fmt::Debug for Seeprom {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Seeprom(..)")
    }
}

/// Derive the MLC key from an OTP dump.
pub fn derive_mlc_key(otp: &Otp) -> DeviceKey {
    otp.mlc_key()
}

/// Derive the USB key from a SEEPROM dump and the OTP of the same console.
pub fn derive_usb_key(seeprom: &Seeprom, otp: &Otp) -> DeviceKey {
    seeprom.usb_key(otp)
}

fn load_blob<T>(
    path: &Path,
    kind: BlobKind,
    parse: impl FnOnce(&[u8]) -> std::result::Result<T, LoadFailure>,
) -> Result<T> {
    let blob = fs::read(path)
        .map_err(LoadFailure::Io)
        .and_then(|data| parse(&data))
        .map_err(|reason| Error::Load {
            kind,
            path: path.to_path_buf(),
            reason,
        })?;
    log::debug!("loaded {kind} from {}", path.display());
    Ok(blob)
}

#[cfg(test)]
mod tests {
    use std::fs;

    use super::*;

    fn otp_bytes(fill: u8) -> Vec<u8> {
        let mut data: Vec<u8> = (0..OTP_SIZE).map(|i| i as u8 ^ fill).collect();
        data[OTP_MLC_KEY_OFFSET..OTP_MLC_KEY_OFFSET + 16].fill(0x11);
        data
    }

    fn seeprom_bytes() -> Vec<u8> {
        (0..SEEPROM_SIZE).map(|i| (i * 7) as u8).collect()
    }

    #[test]
    fn mlc_key_is_read_from_bank_offset() {
        let otp = Otp::from_bytes(&otp_bytes(0)).unwrap();
        assert_eq!(derive_mlc_key(&otp).as_bytes(), &[0x11; 16]);
    }

    #[test]
    fn derivation_is_deterministic() {
        let otp = Otp::from_bytes(&otp_bytes(0x3C)).unwrap();
        let seeprom = Seeprom::from_bytes(&seeprom_bytes()).unwrap();
        assert_eq!(derive_mlc_key(&otp), derive_mlc_key(&otp.clone()));
        assert_eq!(
            derive_usb_key(&seeprom, &otp),
            derive_usb_key(&seeprom.clone(), &otp.clone())
        );
    }

    #[test]
    fn usb_key_differs_from_mlc_key() {
        let otp = Otp::from_bytes(&otp_bytes(0)).unwrap();
        let seeprom = Seeprom::from_bytes(&seeprom_bytes()).unwrap();
        assert_ne!(derive_usb_key(&seeprom, &otp), derive_mlc_key(&otp));
    }

    #[test]
    fn usb_key_depends_on_otp() {
        let seeprom = Seeprom::from_bytes(&seeprom_bytes()).unwrap();
        let a = Otp::from_bytes(&otp_bytes(0x00)).unwrap();
        let b = Otp::from_bytes(&otp_bytes(0xFF)).unwrap();
        assert_ne!(derive_usb_key(&seeprom, &a), derive_usb_key(&seeprom, &b));
    }

    #[test]
    fn usb_key_wraps_seed_with_otp_key() {
        let otp_data = otp_bytes(0);
        let otp = Otp::from_bytes(&otp_data).unwrap();
        let seeprom_data = seeprom_bytes();
        let seeprom = Seeprom::from_bytes(&seeprom_data).unwrap();

        let seed: [u8; 16] = seeprom_data[0xB0..0xC0].try_into().unwrap();
        let wrap: [u8; 16] = otp_data[0x130..0x140].try_into().unwrap();
        assert_eq!(
            derive_usb_key(&seeprom, &otp).as_bytes(),
            &encrypt_block_ecb(&seed, &wrap)
        );
    }

    #[test]
    fn wrong_sizes_are_rejected() {
        assert!(matches!(
            Otp::from_bytes(&[0u8; 32]),
            Err(LoadFailure::Size {
                expected: OTP_SIZE,
                actual: 32
            })
        ));
        assert!(matches!(
            Seeprom::from_bytes(&[0u8; SEEPROM_SIZE + 1]),
            Err(LoadFailure::Size { .. })
        ));
    }

    #[test]
    fn load_errors_name_kind_and_path() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("missing.otp");
        let err = Otp::load_from_file(&missing).unwrap_err();
        match &err {
            Error::Load { kind, path, reason } => {
                assert_eq!(*kind, BlobKind::Otp);
                assert_eq!(path, &missing);
                assert!(matches!(reason, LoadFailure::Io(_)));
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert!(err.to_string().contains("missing.otp"));

        let short = dir.path().join("short.seeprom");
        fs::write(&short, [0u8; 0x100]).unwrap();
        assert!(matches!(
            Seeprom::load_from_file(&short),
            Err(Error::Load {
                kind: BlobKind::Seeprom,
                reason: LoadFailure::Size { .. },
                ..
            })
        ));
    }

    #[test]
    fn debug_output_hides_key_material() {
        let otp = Otp::from_bytes(&otp_bytes(0)).unwrap();
        assert_eq!(format!("{:?}", otp.mlc_key()), "DeviceKey(..)");
        assert_eq!(format!("{otp:?}"), "Otp(..)");
    }
}
