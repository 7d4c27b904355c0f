//! Thread-safe database reader
//!
//! A [`Reader`] owns the whole database file (in memory or memory-mapped),
//! its parsed metadata and the derived layout values. Lookups share a read
//! lock; [`Reader::close`] takes the write lock and drops everything, after
//! which every lookup reports the reader as closed.

use crate::data_section::{DecodedValue, Decoder};
use crate::error::{MmdbError, Result};
use crate::file_reader;
use crate::mmdb::{Metadata, MmdbHeader, SearchTree};
use memmap2::Mmap;
use std::fs::File;
use std::net::{IpAddr, Ipv4Addr, Ipv6Addr};
use std::path::Path;
use std::sync::{PoisonError, RwLock, RwLockReadGuard};
use tracing::instrument;

/// Storage for database data - either owned or memory-mapped
enum DatabaseStorage {
    Owned(Vec<u8>),
    Mmap(Mmap),
}

impl DatabaseStorage {
    fn as_slice(&self) -> &[u8] {
        match self {
            DatabaseStorage::Owned(v) => v.as_slice(),
            DatabaseStorage::Mmap(m) => &m[..],
        }
    }
}

/// Everything a loaded reader owns; dropped as a unit on close
struct LoadedDatabase {
    data: DatabaseStorage,
    header: MmdbHeader,
}

/// Record found for an IP address
#[derive(Debug, Clone, PartialEq)]
pub struct LookupResult {
    /// Decoded record value
    pub data: DecodedValue,
    /// Network prefix length (CIDR)
    pub prefix_len: u8,
    /// Matched network in CIDR notation, e.g. "1.2.3.0/24"
    pub network: String,
}

/// MMDB database reader
///
/// Safe to share between threads (`Arc<Reader>`); all lookups take `&self`.
///
/// # Examples
///
/// ```no_run
/// use geolookup::Reader;
///
/// let reader = Reader::open("GeoLite2-Country.mmdb")?;
/// let country = reader.lookup_country("1.1.1.1".parse()?);
/// println!("country: {}", country);
/// reader.close();
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
pub struct Reader {
    state: RwLock<Option<LoadedDatabase>>,
}

impl Reader {
    /// Load a database file fully into memory
    ///
    /// Files ending in `.gz` are decompressed first.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let bytes = file_reader::read_database(path)
            .map_err(|e| MmdbError::Io(format!("Failed to read {}: {}", path.display(), e)))?;
        Self::from_storage(DatabaseStorage::Owned(bytes))
    }

    /// Open a database file using memory mapping
    ///
    /// The file must not be truncated or rewritten in place while mapped;
    /// replace it atomically (rename) when updating.
    #[instrument(skip_all, fields(path = %path.as_ref().display()))]
    pub fn open_mmap<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let file = File::open(path)
            .map_err(|e| MmdbError::Io(format!("Failed to open {}: {}", path.display(), e)))?;

        let mmap = unsafe { Mmap::map(&file) }
            .map_err(|e| MmdbError::Io(format!("Failed to mmap {}: {}", path.display(), e)))?;

        Self::from_storage(DatabaseStorage::Mmap(mmap))
    }

    /// Create a reader from raw database bytes
    pub fn from_bytes(data: Vec<u8>) -> Result<Self> {
        Self::from_storage(DatabaseStorage::Owned(data))
    }

    fn from_storage(data: DatabaseStorage) -> Result<Self> {
        let header = MmdbHeader::from_file(data.as_slice())?;

        tracing::debug!(
            size = data.as_slice().len(),
            database_type = %header.metadata.database_type,
            "opened MMDB database"
        );

        Ok(Self {
            state: RwLock::new(Some(LoadedDatabase { data, header })),
        })
    }

    /// Readers never leave partial state behind, so a poisoned lock is
    /// still consistent.
    fn read_state(&self) -> RwLockReadGuard<'_, Option<LoadedDatabase>> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether the reader still holds a database
    pub fn is_loaded(&self) -> bool {
        self.read_state().is_some()
    }

    /// Metadata of the loaded database, `None` after close
    pub fn metadata(&self) -> Option<Metadata> {
        self.read_state()
            .as_ref()
            .map(|loaded| loaded.header.metadata.clone())
    }

    /// Look up the raw record for an IP address
    ///
    /// Returns `Ok(None)` when the address is not in the database and
    /// `Err(MmdbError::Closed)` when the reader has been closed.
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<LookupResult>> {
        // Mapped addresses report their network in IPv4 terms
        let ip = ip.to_canonical();
        let guard = self.read_state();
        let loaded = guard.as_ref().ok_or(MmdbError::Closed)?;
        let data = loaded.data.as_slice();

        let tree = SearchTree::new(data, &loaded.header);
        let found = match tree.lookup(ip)? {
            Some(found) => found,
            None => return Ok(None),
        };

        let decoder = Decoder::new(data, loaded.header.data_section_offset);
        let (value, _) = decoder.decode(found.data_offset)?;

        Ok(Some(LookupResult {
            data: value,
            prefix_len: found.prefix_len,
            network: network_cidr(ip, found.prefix_len),
        }))
    }

    /// Drop the database and make the reader permanently inert
    ///
    /// Waits for in-flight lookups to finish. Calling it again is a no-op.
    pub fn close(&self) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if state.take().is_some() {
            tracing::debug!("closed MMDB database");
        }
    }
}

impl std::fmt::Debug for Reader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Reader")
            .field("metadata", &self.metadata())
            .finish()
    }
}

/// Format the network containing `ip` with the given prefix length
pub fn network_cidr(ip: IpAddr, prefix_len: u8) -> String {
    match ip {
        IpAddr::V4(ipv4) => {
            let prefix_len = prefix_len.min(32);
            let mask = if prefix_len == 0 {
                0u32
            } else {
                !0u32 << (32 - prefix_len)
            };
            let network = Ipv4Addr::from(u32::from(ipv4) & mask);
            format!("{}/{}", network, prefix_len)
        }
        IpAddr::V6(ipv6) => {
            let prefix_len = prefix_len.min(128);
            let mask = if prefix_len == 0 {
                0u128
            } else {
                !0u128 << (128 - prefix_len)
            };
            let network = Ipv6Addr::from(u128::from(ipv6) & mask);
            format!("{}/{}", network, prefix_len)
        }
    }
}
