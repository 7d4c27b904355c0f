/// Error types for the geolookup library
use std::fmt;

/// Result type alias for reader operations
pub type Result<T> = std::result::Result<T, MmdbError>;

/// Main error type for database parsing and lookups
///
/// "Not found" is never an error: lookups report it as `Ok(None)`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MmdbError {
    /// I/O errors while loading a database file
    Io(String),

    /// The metadata marker does not occur anywhere in the file
    MetadataNotFound,

    /// The metadata block could not be decoded or is not a map
    InvalidMetadata(String),

    /// The bytes do not follow the expected binary layout
    /// (out of bounds offsets, unsupported record size, bad type sizes)
    InvalidFormat(String),

    /// The reader has been closed and holds no database
    Closed,
}

impl MmdbError {
    pub(crate) fn out_of_bounds(offset: usize, len: usize) -> Self {
        MmdbError::InvalidFormat(format!(
            "offset out of bounds: {} (buffer length {})",
            offset, len
        ))
    }
}

impl fmt::Display for MmdbError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MmdbError::Io(msg) => write!(f, "I/O error: {}", msg),
            MmdbError::MetadataNotFound => write!(f, "Format error: metadata marker not found"),
            MmdbError::InvalidMetadata(msg) => write!(f, "Format error: invalid metadata: {}", msg),
            MmdbError::InvalidFormat(msg) => write!(f, "Format error: {}", msg),
            MmdbError::Closed => write!(f, "Format error: database not loaded"),
        }
    }
}

impl std::error::Error for MmdbError {}

impl From<std::io::Error> for MmdbError {
    fn from(err: std::io::Error) -> Self {
        MmdbError::Io(err.to_string())
    }
}
