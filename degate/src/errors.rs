use backtrace::Backtrace;
use std::error::Error;
use std::fmt::{Debug, Display, Formatter};
use std::result::Result;

use crate::common::{atomic, Atomic};

/// Error kinds for Degate operations.
///
/// Each kind names a category of recoverable failure. Programming errors
/// (broken quadtree structure, cache accounting drift, out-of-bounds pixel
/// access) are not represented here: they panic at the point of detection.
///
/// # Examples
///
/// ```rust
/// use degate::errors::{DegateError, DegateResult, ErrorKind};
///
/// fn open_tile() -> DegateResult<()> {
///     Err(DegateError::new("tile file is missing", ErrorKind::FileNotFound))
/// }
///
/// assert_eq!(open_tile().unwrap_err().kind(), &ErrorKind::FileNotFound);
/// ```
#[derive(Debug, PartialEq, Eq, Clone)]
pub enum ErrorKind {
    // IO and storage
    /// Generic IO error
    IOError,
    /// The file was not found
    FileNotFound,
    /// Permission denied for file operation
    PermissionDenied,
    /// Error accessing a file or directory
    FileAccessError,
    /// A file could not be memory mapped
    MappingError,

    // Cache admission
    /// A single request exceeds the whole tile cache budget
    CacheOversubscribed,

    // Image data
    /// A source image could not be decoded
    DecodeError,

    // Operation and validation
    /// The operation is not valid in the current context
    InvalidOperation,
    /// A value failed validation
    ValidationError,
    /// The requested element was not found
    NotFound,

    /// Error from an extension crate, named by its category (e.g. "tiles")
    Extension(String),

    /// Internal error (usually indicates a bug)
    InternalError,
}

impl Display for ErrorKind {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            ErrorKind::IOError => write!(f, "IO error"),
            ErrorKind::FileNotFound => write!(f, "File not found"),
            ErrorKind::PermissionDenied => write!(f, "Permission denied"),
            ErrorKind::FileAccessError => write!(f, "File access error"),
            ErrorKind::MappingError => write!(f, "Memory mapping error"),
            ErrorKind::CacheOversubscribed => write!(f, "Cache oversubscribed"),
            ErrorKind::DecodeError => write!(f, "Decode error"),
            ErrorKind::InvalidOperation => write!(f, "Invalid operation"),
            ErrorKind::ValidationError => write!(f, "Validation error"),
            ErrorKind::NotFound => write!(f, "Not found"),
            ErrorKind::Extension(name) => write!(f, "{} error", name),
            ErrorKind::InternalError => write!(f, "Internal error"),
        }
    }
}

/// Custom Degate error type.
///
/// `DegateError` carries a message, an [`ErrorKind`], an optional cause and a
/// backtrace captured at construction. The backtrace is captured unresolved
/// and only symbolized when the error is debug-printed.
#[derive(Clone)]
pub struct DegateError {
    message: String,
    error_kind: ErrorKind,
    cause: Option<Box<DegateError>>,
    backtrace: Atomic<Backtrace>,
}

impl DegateError {
    /// Creates a new `DegateError` with the specified message and error kind.
    pub fn new(message: &str, error_kind: ErrorKind) -> Self {
        DegateError {
            message: message.to_string(),
            error_kind,
            cause: None,
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    /// Creates a new `DegateError` chained to the error that caused it.
    pub fn new_with_cause(message: &str, error_kind: ErrorKind, cause: DegateError) -> Self {
        DegateError {
            message: message.to_string(),
            error_kind,
            cause: Some(Box::new(cause)),
            backtrace: atomic(Backtrace::new_unresolved()),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn kind(&self) -> &ErrorKind {
        &self.error_kind
    }

    pub fn cause(&self) -> Option<&DegateError> {
        self.cause.as_deref()
    }
}

impl Display for DegateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl Debug for DegateError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match &self.cause {
            Some(cause) => write!(f, "{} ({})\nCaused by: {:?}", self.message, self.error_kind, cause),
            None => {
                let mut backtrace = self.backtrace.write();
                backtrace.resolve();
                write!(f, "{} ({})\n{:?}", self.message, self.error_kind, *backtrace)
            }
        }
    }
}

impl Error for DegateError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match &self.cause {
            Some(cause) => Some(cause.as_ref()),
            None => None,
        }
    }
}

/// `DegateResult<T>` is shorthand for `Result<T, DegateError>`.
pub type DegateResult<T> = Result<T, DegateError>;

impl From<std::io::Error> for DegateError {
    fn from(err: std::io::Error) -> Self {
        let error_kind = match err.kind() {
            std::io::ErrorKind::NotFound => ErrorKind::FileNotFound,
            std::io::ErrorKind::PermissionDenied => ErrorKind::PermissionDenied,
            _ => ErrorKind::IOError,
        };
        DegateError::new(&format!("IO error: {}", err), error_kind)
    }
}

impl From<String> for DegateError {
    fn from(msg: String) -> Self {
        DegateError::new(&msg, ErrorKind::InternalError)
    }
}

impl From<&str> for DegateError {
    fn from(msg: &str) -> Self {
        DegateError::new(msg, ErrorKind::InternalError)
    }
}
