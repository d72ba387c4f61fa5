//! Command-line surface.

use std::path::PathBuf;

use clap::Parser;

/// Re-encrypt a WFS image from one console's key to another's, optionally
/// replacing the contents of one file on the way.
#[derive(Debug, Clone, Parser)]
#[command(name = "wfs-recryptor", version, about, long_about = None)]
pub struct Cli {
    /// Source WFS image
    #[arg(long, value_name = "PATH")]
    pub srcimage: PathBuf,

    /// Destination WFS image, rewritten in place
    #[arg(long, value_name = "PATH")]
    pub dstimage: PathBuf,

    /// OTP dump of the source console
    #[arg(long, value_name = "PATH")]
    pub srcotp: PathBuf,

    /// OTP dump of the destination console
    #[arg(long, value_name = "PATH")]
    pub dstotp: PathBuf,

    /// SEEPROM dump of the source console (USB only)
    #[arg(long, value_name = "PATH")]
    pub srcseeprom: Option<PathBuf>,

    /// SEEPROM dump of the destination console (USB only)
    #[arg(long, value_name = "PATH")]
    pub dstseeprom: Option<PathBuf>,

    /// Images are internal MLC storage
    #[arg(long)]
    pub mlc: bool,

    /// Images are external USB storage
    #[arg(long)]
    pub usb: bool,

    /// File inside the volume whose contents are replaced
    #[arg(long, value_name = "WFS_PATH")]
    pub inject_path: Option<String>,

    /// Local file holding the replacement contents
    #[arg(long, value_name = "PATH")]
    pub inject_file: Option<PathBuf>,

    /// Bytes to copy from --inject-file [default: its length]
    #[arg(long, value_name = "BYTES")]
    pub inject_size: Option<u64>,

    /// Skip recryption and only inject into the destination image
    #[arg(long)]
    pub inject_only: bool,
}
