//! AES-128-CBC encryption of sector runs.
//!
//! Wii U storage encrypts each filesystem block (a run of whole sectors)
//! as one CBC message. The IV is not stored anywhere; it is rebuilt from
//! the block's position and the device geometry:
//!
//! ```text
//! [0x00] unit length in bytes   (u32 BE)
//! [0x04] first sector address   (u32 BE)
//! [0x08] device sector count    (u32 BE)
//! [0x0C] device sector size     (u32 BE)
//! ```
//!
//! Because the sector address is part of the IV, ciphertext cannot be moved
//! between positions, and because the geometry is part of it too, a header
//! only decrypts correctly under the right sector size/count hypothesis.

use aes::Aes128;
use cbc::cipher::block_padding::NoPadding;
use cbc::cipher::generic_array::GenericArray;
use cbc::cipher::{BlockDecryptMut, BlockEncryptMut, KeyIvInit};

use crate::utils::put_be_u32;
use crate::{Error, Result};

type Aes128CbcEnc = cbc::Encryptor<Aes128>;
type Aes128CbcDec = cbc::Decryptor<Aes128>;

/// Build the IV for a unit of `unit_len` bytes starting at `sector_address`.
pub fn sector_iv(unit_len: u32, sector_address: u32, sectors_count: u32, sector_size: u32) -> [u8; 16] {
    let mut iv = [0u8; 16];
    put_be_u32(&mut iv, 0x0, unit_len);
    put_be_u32(&mut iv, 0x4, sector_address);
    put_be_u32(&mut iv, 0x8, sectors_count);
    put_be_u32(&mut iv, 0xC, sector_size);
    iv
}

/// Encrypt `data` in place. `data.len()` must be a multiple of 16.
pub fn encrypt_sectors(data: &mut [u8], key: &[u8; 16], iv: &[u8; 16]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(Error::InvalidRange);
    }
    let len = data.len();
    Aes128CbcEnc::new(GenericArray::from_slice(key), GenericArray::from_slice(iv))
        .encrypt_padded_mut::<NoPadding>(data, len)
        .map_err(|_| Error::InvalidRange)?;
    Ok(())
}

/// Decrypt `data` in place. `data.len()` must be a multiple of 16.
pub fn decrypt_sectors(data: &mut [u8], key: &[u8; 16], iv: &[u8; 16]) -> Result<()> {
    if data.len() % 16 != 0 {
        return Err(Error::InvalidRange);
    }
    Aes128CbcDec::new(GenericArray::from_slice(key), GenericArray::from_slice(iv))
        .decrypt_padded_mut::<NoPadding>(data)
        .map_err(|_| Error::InvalidRange)?;
    Ok(())
}
