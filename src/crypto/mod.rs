//! Cryptographic primitives for Wii U storage.
//!
//! All functions accept already-derived key material; deriving keys from
//! OTP/SEEPROM dumps is handled by [`crate::keys`].
//!
//! ## Submodules
//!
//! | Module | Purpose |
//! |--------|---------|
//! | [`ecb`] | AES-128-ECB single-block encryption (USB key seed wrapping) |
//! | [`sector`] | AES-128-CBC encryption of sector runs with a position-bound IV |
//!
//! ## Key hierarchy (brief)
//!
//! ```text
//! otp.bin (0x400)
//!   ├── 0x180 mlc key ───────────────────────────────┐
//!   └── 0x130 usb seed encryption key ──┐            │
//! seeprom.bin (0x200)                   │ AES-ECB    │
//!   └── 0x0B0 usb key seed ─────────────┴─► usb key  │
//!                                            │       │
//!                                            ▼       ▼
//!                             AES-CBC per block, IV = (len, sector, count, sector size)
//! ```

pub mod ecb;
pub mod sector;
