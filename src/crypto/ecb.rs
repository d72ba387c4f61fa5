//! AES-128-ECB on a single block.
//!
//! Only used to wrap the SEEPROM USB key seed with the OTP-resident seed
//! encryption key, so no chaining or padding is involved.

use aes::Aes128;
use aes::cipher::generic_array::GenericArray;
use aes::cipher::{BlockEncrypt, KeyInit};

/// Encrypt one 16-byte block with AES-128-ECB.
pub fn encrypt_block_ecb(block: &[u8; 16], key: &[u8; 16]) -> [u8; 16] {
    let cipher = Aes128::new(GenericArray::from_slice(key));
    let mut out = GenericArray::clone_from_slice(block);
    cipher.encrypt_block(&mut out);
    let mut result = [0u8; 16];
    result.copy_from_slice(&out);
    result
}
