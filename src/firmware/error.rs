//! Firmware upgrade errors.

use thiserror::Error;

/// Errors from downloading, unpacking or flashing firmware.
#[derive(Debug, Error)]
pub enum FirmwareError {
    /// The HTTP request itself failed.
    #[error("Firmware download failed: {0}")]
    Download(#[from] reqwest::Error),

    /// The server answered with a non-success status.
    #[error("Firmware server returned {status} for {url}")]
    HttpStatus { url: String, status: u16 },

    /// The downloaded archive could not be read.
    #[error("Invalid firmware archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    /// The flashing tool could not be started or reported failure.
    #[error("Flasher '{program}' failed: {message}")]
    Flasher { program: String, message: String },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for firmware operations.
pub type FirmwareResult<T> = Result<T, FirmwareError>;
