//! MaxMind DB (MMDB) format internals
//!
//! The MMDB format uses a binary trie for IP address lookups followed by
//! a data section of self-describing values and a trailing metadata map.
//!
//! ## Architecture
//!
//! - **types**: MMDB-specific constants and record sizes
//! - **format**: Metadata location and parsing
//! - **tree**: Search tree traversal for IP lookups
//!
//! Value decoding lives in `crate::data_section`.

pub mod format;
pub mod tree;
pub mod types;

pub use format::{find_metadata_marker, Metadata, MmdbHeader};
pub use tree::{SearchTree, TreeMatch};
pub use types::{node_size_bytes, RecordSize, METADATA_MARKER};
