//! **wfskit** - re-key and patch encrypted Wii U WFS storage images.
//!
//! # Layers
//! | Module | Role |
//! |--------|------|
//! | [`keys`]     | OTP / SEEPROM dumps and MLC / USB key derivation |
//! | [`crypto`]   | AES-128 primitives for key wrapping and sector units |
//! | [`device`]   | Raw images, geometry detection, keyed sector I/O |
//! | [`fs`]       | Volume session: catalog, file handles, write streams |
//! | [`inject`]   | In-place replacement of a file's contents |
//! | [`recrypt`]  | Source-to-destination re-encryption and the full run |
//! | [`config`]   | Validated run configuration |
//! | [`cli`]      | Command-line surface of `wfs-recryptor` |

pub mod cli;
pub mod config;
pub mod crypto;
pub mod device;
pub mod error;
pub mod fs;
pub mod inject;
pub mod keys;
pub mod recrypt;
pub(crate) mod utils;

#[cfg(test)]
pub(crate) mod test_support;

pub use error::{Error, Result};
