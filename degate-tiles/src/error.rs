//! Errors of the tile storage layer.

use degate::errors::{DegateError, ErrorKind};
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Errors that can occur while creating, mapping or loading tiles
#[derive(Debug, Error)]
pub enum TileError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("Cannot map {}: {source}", path.display())]
    Mapping {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Cannot create directory {}: {source}", path.display())]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("Request for {requested} bytes exceeds the tile cache limit of {max} bytes")]
    CacheOversubscribed { requested: u64, max: u64 },

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("Invalid operation: {0}")]
    InvalidOperation(String),
}

impl From<TileError> for DegateError {
    fn from(err: TileError) -> Self {
        match err {
            TileError::Io(io_err) => DegateError::from(io_err),
            TileError::Mapping { .. } => DegateError::new(&err.to_string(), ErrorKind::MappingError),
            TileError::DirectoryCreation { .. } => {
                DegateError::new(&err.to_string(), ErrorKind::FileAccessError)
            }
            TileError::CacheOversubscribed { .. } => {
                DegateError::new(&err.to_string(), ErrorKind::CacheOversubscribed)
            }
            TileError::Decode(msg) => DegateError::new(&msg, ErrorKind::DecodeError),
            TileError::InvalidOperation(msg) => DegateError::new(&msg, ErrorKind::InvalidOperation),
        }
    }
}

impl From<DegateError> for TileError {
    fn from(err: DegateError) -> Self {
        match err.kind() {
            ErrorKind::IOError
            | ErrorKind::FileNotFound
            | ErrorKind::PermissionDenied
            | ErrorKind::FileAccessError
            | ErrorKind::MappingError => TileError::Io(io::Error::other(err.message().to_string())),
            ErrorKind::DecodeError => TileError::Decode(err.message().to_string()),
            _ => TileError::InvalidOperation(err.message().to_string()),
        }
    }
}

impl From<image::ImageError> for TileError {
    fn from(err: image::ImageError) -> Self {
        match err {
            image::ImageError::IoError(io_err) => TileError::Io(io_err),
            other => TileError::Decode(other.to_string()),
        }
    }
}

impl From<tiff::TiffError> for TileError {
    fn from(err: tiff::TiffError) -> Self {
        match err {
            tiff::TiffError::IoError(io_err) => TileError::Io(io_err),
            other => TileError::Decode(other.to_string()),
        }
    }
}

/// Result type for tile operations
pub type TileResult<T> = Result<T, TileError>;
