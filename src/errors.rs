// SPDX-License-Identifier: GPL-3.0-only

//! Error types for the exporter
//!
//! Errors are split by where they can happen:
//! - [`StartupError`]: fatal, raised before any export worker starts
//! - [`RecordingError`]: reading the recording container
//! - [`ExportError`]: encoding or writing a single frame (never fatal)

use std::fmt;
use std::path::PathBuf;

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;

/// Main application error type
#[derive(Debug, Clone)]
pub enum AppError {
    /// Startup errors (arguments, paths, container open, output layout)
    Startup(StartupError),
    /// Recording read errors after startup
    Recording(RecordingError),
}

/// Fatal errors raised from the initialization path
#[derive(Debug, Clone)]
pub enum StartupError {
    /// Input path missing, not a regular file, or not a recording
    InvalidInput(PathBuf),
    /// Recording container could not be opened
    OpenFailed(RecordingError),
    /// Output root already exists
    OutputExists(PathBuf),
    /// Output directory could not be created
    OutputDirectory { path: PathBuf, message: String },
    /// Color track uses a codec other than MJPEG
    UnsupportedColorFormat(String),
    /// Depth or infrared track uses an unknown sample layout
    UnsupportedSampleFormat(String),
    /// Transform requested without usable calibration
    MissingCalibration(String),
    /// Export worker thread could not be spawned
    WorkerSpawn(String),
}

/// Recording container errors
#[derive(Debug, Clone)]
pub enum RecordingError {
    /// Underlying I/O failure
    Io(String),
    /// File is not a Matroska container
    NotMatroska(String),
    /// Element structure is broken or truncated
    Malformed(String),
    /// A block could not be turned into an image
    InvalidBlock(String),
    /// Calibration attachment could not be parsed
    Calibration(String),
}

/// Per-frame export errors
#[derive(Debug, Clone)]
pub enum ExportError {
    /// Buffer length does not match the stream geometry
    GeometryMismatch { expected: usize, actual: usize },
    /// Payload type does not fit the stream encoder
    UnexpectedPayload(&'static str),
    /// Image encoding failed
    EncodingFailed(String),
    /// File write failed
    WriteFailed { path: PathBuf, message: String },
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Startup(e) => write!(f, "Startup error: {}", e),
            AppError::Recording(e) => write!(f, "Recording error: {}", e),
        }
    }
}

impl fmt::Display for StartupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StartupError::InvalidInput(path) => {
                write!(f, "Can't find input recording: {}", path.display())
            }
            StartupError::OpenFailed(e) => write!(f, "Failed to open recording: {}", e),
            StartupError::OutputExists(path) => {
                write!(f, "Output directory already exists: {}", path.display())
            }
            StartupError::OutputDirectory { path, message } => write!(
                f,
                "Can't create output directory {}: {}",
                path.display(),
                message
            ),
            StartupError::UnsupportedColorFormat(codec) => {
                write!(f, "Unsupported color format: {} (expected MJPEG)", codec)
            }
            StartupError::UnsupportedSampleFormat(msg) => {
                write!(f, "Unsupported sample format: {}", msg)
            }
            StartupError::MissingCalibration(msg) => {
                write!(f, "Depth transform unavailable: {}", msg)
            }
            StartupError::WorkerSpawn(msg) => write!(f, "Failed to start export worker: {}", msg),
        }
    }
}

impl fmt::Display for RecordingError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RecordingError::Io(msg) => write!(f, "I/O error: {}", msg),
            RecordingError::NotMatroska(msg) => write!(f, "Not a Matroska file: {}", msg),
            RecordingError::Malformed(msg) => write!(f, "Malformed container: {}", msg),
            RecordingError::InvalidBlock(msg) => write!(f, "Invalid block: {}", msg),
            RecordingError::Calibration(msg) => write!(f, "Invalid calibration: {}", msg),
        }
    }
}

impl fmt::Display for ExportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExportError::GeometryMismatch { expected, actual } => write!(
                f,
                "Frame has {} samples, stream geometry expects {}",
                actual, expected
            ),
            ExportError::UnexpectedPayload(expected) => {
                write!(f, "Unexpected payload, expected {}", expected)
            }
            ExportError::EncodingFailed(msg) => write!(f, "Encoding failed: {}", msg),
            ExportError::WriteFailed { path, message } => {
                write!(f, "Failed to write {}: {}", path.display(), message)
            }
        }
    }
}

impl std::error::Error for AppError {}
impl std::error::Error for StartupError {}
impl std::error::Error for RecordingError {}
impl std::error::Error for ExportError {}

impl From<StartupError> for AppError {
    fn from(e: StartupError) -> Self {
        AppError::Startup(e)
    }
}

impl From<RecordingError> for AppError {
    fn from(e: RecordingError) -> Self {
        AppError::Recording(e)
    }
}

impl From<std::io::Error> for RecordingError {
    fn from(e: std::io::Error) -> Self {
        if e.kind() == std::io::ErrorKind::UnexpectedEof {
            RecordingError::Malformed("unexpected end of file".to_string())
        } else {
            RecordingError::Io(e.to_string())
        }
    }
}

impl From<serde_json::Error> for RecordingError {
    fn from(e: serde_json::Error) -> Self {
        RecordingError::Calibration(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_eof_maps_to_malformed() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        assert!(matches!(
            RecordingError::from(io),
            RecordingError::Malformed(_)
        ));
    }

    #[test]
    fn test_startup_error_display() {
        let err = AppError::from(StartupError::InvalidInput(PathBuf::from("missing.mkv")));
        assert_eq!(
            err.to_string(),
            "Startup error: Can't find input recording: missing.mkv"
        );
    }
}
