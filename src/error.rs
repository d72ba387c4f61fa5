//! Library-wide error and result types.

use std::fmt;
use std::io;
use std::path::PathBuf;

/// Result alias used throughout wfskit.
pub type Result<T> = std::result::Result<T, Error>;

/// Which secret blob a [`Error::Load`] refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobKind {
    Otp,
    Seeprom,
}

impl fmt::Display for BlobKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobKind::Otp => write!(f, "OTP"),
            BlobKind::Seeprom => write!(f, "SEEPROM"),
        }
    }
}

/// Why a secret blob was rejected.
#[derive(Debug)]
pub enum LoadFailure {
    /// The file could not be opened or read.
    Io(io::Error),
    /// The file does not have the fixed size of its blob kind.
    Size { expected: usize, actual: usize },
}

impl fmt::Display for LoadFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoadFailure::Io(e) => write!(f, "{e}"),
            LoadFailure::Size { expected, actual } => {
                write!(f, "expected {expected:#x} bytes, found {actual:#x}")
            }
        }
    }
}

/// All errors the library can produce.
///
/// Every variant is terminal for a run; nothing in the crate retries.
#[derive(Debug)]
pub enum Error {
    /// An OTP or SEEPROM file is missing, unreadable or malformed.
    Load {
        kind: BlobKind,
        path: PathBuf,
        reason: LoadFailure,
    },
    /// An image or replacement file could not be opened.
    Open {
        what: &'static str,
        path: PathBuf,
        source: io::Error,
    },
    /// The storage mode or option combination is inconsistent.
    ModeConflict(String),
    /// No sector size/count hypothesis decrypted to a valid header.
    GeometryDetection,
    /// Source and destination devices were detected with different geometries.
    GeometryMismatch,
    /// The requested entry does not exist in the filesystem.
    PathNotFound(String),
    /// The replacement content does not fit the entry's allocated extent.
    CapacityExceeded { wanted: u64, available: u64 },
    /// The replacement source holds fewer bytes than the declared length.
    TruncatedInput { expected: u64, available: u64 },
    /// A magic/version field did not match the expected value.
    BadMagic,
    /// A header checksum did not match its contents.
    BadChecksum,
    /// An offset or size would address outside the valid region.
    InvalidRange,
    /// A structural constraint was violated (message describes which one).
    Parse(&'static str),
    /// An underlying I/O operation failed.
    Io(io::Error),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Load { kind, path, reason } => {
                write!(f, "failed to open {kind} {}: {reason}", path.display())
            }
            Error::Open { what, path, source } => {
                write!(f, "failed to open {what} {}: {source}", path.display())
            }
            Error::ModeConflict(s) => write!(f, "{s}"),
            Error::GeometryDetection => write!(
                f,
                "failed to detect device geometry (wrong key or corrupted image)"
            ),
            Error::GeometryMismatch => {
                write!(f, "source and destination images have different geometries")
            }
            Error::PathNotFound(p) => write!(f, "didn't find file {p} in wfs"),
            Error::CapacityExceeded { wanted, available } => write!(
                f,
                "file to inject too big (wanted size: {wanted} bytes, available size: {available})"
            ),
            Error::TruncatedInput {
                expected,
                available,
            } => write!(
                f,
                "failed to read file to inject (declared {expected} bytes, only {available} readable)"
            ),
            Error::BadMagic => write!(f, "bad magic value"),
            Error::BadChecksum => write!(f, "header checksum mismatch"),
            Error::InvalidRange => write!(f, "invalid offset or size"),
            Error::Parse(s) => write!(f, "parse error: {s}"),
            Error::Io(e) => write!(f, "I/O error: {e}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e)
            | Error::Open { source: e, .. }
            | Error::Load {
                reason: LoadFailure::Io(e),
                ..
            } => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

#[cfg(test)]
mod tests {
    use std::error::Error as _;

    use super::*;

    #[test]
    fn wrapped_io_errors_are_exposed_as_source() {
        let open = Error::Open {
            what: "wfs image",
            path: "dst.img".into(),
            source: io::Error::new(io::ErrorKind::NotFound, "gone"),
        };
        assert_eq!(open.source().unwrap().to_string(), "gone");

        let load = Error::Load {
            kind: BlobKind::Otp,
            path: "dst.otp".into(),
            reason: LoadFailure::Io(io::Error::new(io::ErrorKind::PermissionDenied, "denied")),
        };
        assert_eq!(load.source().unwrap().to_string(), "denied");

        let size = Error::Load {
            kind: BlobKind::Otp,
            path: "dst.otp".into(),
            reason: LoadFailure::Size {
                expected: 0x400,
                actual: 32,
            },
        };
        assert!(size.source().is_none());
        assert_eq!(
            size.to_string(),
            "failed to open OTP dst.otp: expected 0x400 bytes, found 0x20"
        );
    }
}
