//! geolookup - GeoIP lookups over MaxMind DB files
//!
//! A small, safe reader for the MaxMind DB (MMDB) binary format, built for
//! IP-geolocation based access control. Database files come from third
//! parties, so every read is bounds checked and corrupt data degrades to
//! errors or empty results, never to panics.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use geolookup::Reader;
//!
//! let reader = Reader::open("GeoLite2-City.mmdb")?;
//! let ip = "81.2.69.142".parse()?;
//!
//! println!("country: {}", reader.lookup_country(ip));
//! let city = reader.lookup_city(ip);
//! println!("{} ({}, {})", city.city, city.latitude, city.longitude);
//!
//! // Raw record access
//! if let Some(result) = reader.lookup(ip)? {
//!     println!("{} -> {}", result.network, result.data.to_json());
//! }
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────┐
//! │  MMDB File Layout                    │
//! ├──────────────────────────────────────┤
//! │  1. Search tree (binary trie)        │
//! │  2. 16-byte zero separator           │
//! │  3. Data section (self-describing)   │
//! │  4. Metadata marker + metadata map   │
//! └──────────────────────────────────────┘
//! ```
//!
//! Opening parses the metadata once. Each lookup walks the trie
//! (`mmdb::tree`), decodes the record (`data_section`) and, for the typed
//! helpers, extracts known fields (`fields`).

#![warn(missing_docs)]
#![warn(clippy::all)]

/// Data section value decoding
pub mod data_section;
/// Error types
pub mod error;
/// Typed field extraction for country, ASN, city and WHOIS lookups
pub mod fields;
/// Database file loading with gzip support
pub mod file_reader;
/// MMDB format internals: metadata and search tree
pub mod mmdb;
/// Thread-safe database reader
pub mod reader;

// Re-exports for Rust consumers
pub use crate::data_section::{DecodedValue, Decoder};
pub use crate::error::{MmdbError, Result};
pub use crate::fields::{AsnInfo, CityInfo, WhoisInfo};
pub use crate::mmdb::Metadata;
pub use crate::reader::{LookupResult, Reader};

/// Library version string
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
