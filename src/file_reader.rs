//! Database file loading with automatic gzip decompression
//!
//! Downloaded GeoIP databases are frequently distributed as `.mmdb.gz`.
//! Files ending in `.gz` (case-insensitive) are decompressed into memory;
//! everything else is read as-is.
//!
//! # Example
//!
//! ```rust,no_run
//! use geolookup::file_reader;
//!
//! let bytes = file_reader::read_database("GeoLite2-City.mmdb.gz")?;
//! println!("{} bytes after decompression", bytes.len());
//! # Ok::<(), std::io::Error>(())
//! ```

use flate2::read::GzDecoder;
use std::fs::{self, File};
use std::io::{self, BufReader, Read};
use std::path::Path;

/// Buffer size for reading compressed files (128KB)
const BUFFER_SIZE: usize = 128 * 1024;

/// Read a whole database file into memory
///
/// # Errors
///
/// Returns an error if:
/// - The file doesn't exist
/// - Permission denied
/// - Invalid gzip data (for .gz files)
pub fn read_database<P: AsRef<Path>>(path: P) -> io::Result<Vec<u8>> {
    let path = path.as_ref();

    if is_gzip_path(path) {
        let file = File::open(path)?;
        read_gzip(file)
    } else {
        fs::read(path)
    }
}

/// Decompress a gzip stream fully into memory
pub fn read_gzip<R: Read>(reader: R) -> io::Result<Vec<u8>> {
    let mut decoder = GzDecoder::new(BufReader::with_capacity(BUFFER_SIZE, reader));
    let mut out = Vec::new();
    decoder.read_to_end(&mut out)?;
    Ok(out)
}

/// Check whether a path names a gzip-compressed file
pub fn is_gzip_path(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("gz"))
        .unwrap_or(false)
}
