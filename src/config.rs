//! Validated run configuration.
//!
//! [`Config`] is built once from the parsed [`Cli`] and never changes
//! afterwards. Every combination of options that cannot describe a
//! meaningful run is rejected here with [`Error::ModeConflict`], before any
//! file is touched.

use std::path::PathBuf;

use log::debug;

use crate::cli::Cli;
use crate::keys::{DeviceKey, KeyMode, Otp, Seeprom, derive_mlc_key, derive_usb_key};
use crate::{Error, Result};

/// Files describing one side of the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceConfig {
    pub image: PathBuf,
    pub otp: PathBuf,
    /// Present exactly when the mode is [`KeyMode::Usb`].
    pub seeprom: Option<PathBuf>,
}

impl DeviceConfig {
    /// Load the dumps of this side and derive its storage key.
    pub fn load_key(&self, mode: KeyMode) -> Result<DeviceKey> {
        let otp = Otp::load_from_file(&self.otp)?;
        let key = match mode {
            KeyMode::Mlc => derive_mlc_key(&otp),
            KeyMode::Usb => {
                let path = self.seeprom.as_ref().ok_or_else(|| {
                    Error::ModeConflict("usb mode needs a SEEPROM dump".to_owned())
                })?;
                derive_usb_key(&Seeprom::load_from_file(path)?, &otp)
            }
        };
        debug!("derived {mode} key for {}", self.image.display());
        Ok(key)
    }
}

/// The replacement requested with `--inject-*`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InjectionConfig {
    /// Target path inside the volume.
    pub path: String,
    /// Local file providing the new contents.
    pub file: PathBuf,
    /// Bytes to copy; [`None`] means the whole file.
    pub size: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub mode: KeyMode,
    pub source: DeviceConfig,
    pub destination: DeviceConfig,
    pub injection: Option<InjectionConfig>,
    /// Skip recryption; only meaningful with an injection.
    pub inject_only: bool,
}

impl TryFrom<Cli> for Config {
    type Error = Error;

    fn try_from(cli: Cli) -> Result<Self> {
        let mode = match (cli.mlc, cli.usb) {
            (true, false) => KeyMode::Mlc,
            (false, true) => KeyMode::Usb,
            (true, true) => return Err(conflict("--mlc and --usb are mutually exclusive")),
            (false, false) => return Err(conflict("one of --mlc or --usb is required")),
        };

        match mode {
            KeyMode::Usb => {
                if cli.srcseeprom.is_none() {
                    return Err(conflict("--usb requires --srcseeprom"));
                }
                if cli.dstseeprom.is_none() {
                    return Err(conflict("--usb requires --dstseeprom"));
                }
            }
            KeyMode::Mlc => {
                if cli.srcseeprom.is_some() || cli.dstseeprom.is_some() {
                    return Err(conflict("--srcseeprom/--dstseeprom are only used with --usb"));
                }
            }
        }

        if cli.srcimage == cli.dstimage {
            return Err(conflict("--srcimage and --dstimage must be different files"));
        }

        let injection = match (cli.inject_path, cli.inject_file) {
            (Some(path), Some(file)) => Some(InjectionConfig {
                path,
                file,
                size: cli.inject_size,
            }),
            (Some(_), None) => return Err(conflict("--inject-path requires --inject-file")),
            (None, Some(_)) => return Err(conflict("--inject-file requires --inject-path")),
            (None, None) => {
                if cli.inject_size.is_some() {
                    return Err(conflict("--inject-size requires --inject-path"));
                }
                if cli.inject_only {
                    return Err(conflict("--inject-only requires --inject-path"));
                }
                None
            }
        };

        Ok(Self {
            mode,
            source: DeviceConfig {
                image: cli.srcimage,
                otp: cli.srcotp,
                seeprom: cli.srcseeprom,
            },
            destination: DeviceConfig {
                image: cli.dstimage,
                otp: cli.dstotp,
                seeprom: cli.dstseeprom,
            },
            injection,
            inject_only: cli.inject_only,
        })
    }
}

fn conflict(msg: &str) -> Error {
    Error::ModeConflict(msg.to_owned())
}
