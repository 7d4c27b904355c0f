//! MMDB Binary Format Parsing
//!
//! Locates the metadata block at the end of the file and derives the
//! layout values every lookup depends on.
//!
//! Design:
//! - Find the LAST metadata marker (reverse slice search, no allocation)
//! - Decode the metadata map with permissive field coercion
//! - Derive node size and data section offset once, at open time

use super::types::{node_size_bytes, DATA_SECTION_SEPARATOR_SIZE, METADATA_MARKER};
use crate::data_section::{DecodedValue, Decoder};
use crate::error::{MmdbError, Result};
use serde::Serialize;
use std::collections::BTreeMap;

/// Database metadata
///
/// Only `node_count`, `record_size` and `ip_version` matter for lookups;
/// the rest is informational.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Metadata {
    /// Number of nodes in the search tree
    pub node_count: u32,
    /// Record size in bits (24, 28, or 32 for walkable databases)
    pub record_size: u16,
    /// IP version of the tree (4 or 6)
    pub ip_version: u16,
    /// Database type, e.g. "GeoLite2-City"
    pub database_type: String,
    /// Build time as seconds since the Unix epoch
    pub build_epoch: u64,
    /// Locale codes the records may contain names for
    pub languages: Vec<String>,
    /// Descriptions keyed by language
    pub description: BTreeMap<String, String>,
    /// Binary format major version
    pub binary_format_major_version: u16,
    /// Binary format minor version
    pub binary_format_minor_version: u16,
}

impl Metadata {
    /// Build metadata from a decoded metadata map
    ///
    /// Missing or mistyped fields fall back to zero/empty values.
    pub fn from_value(value: &DecodedValue) -> Result<Self> {
        let map = value
            .as_map()
            .ok_or_else(|| MmdbError::InvalidMetadata("metadata is not a map".to_string()))?;

        let uint = |key: &str| map.get(key).and_then(DecodedValue::as_u64).unwrap_or(0);
        let string = |key: &str| {
            map.get(key)
                .and_then(DecodedValue::as_str)
                .unwrap_or_default()
                .to_string()
        };

        let languages = map
            .get("languages")
            .and_then(DecodedValue::as_array)
            .map(|items| {
                items
                    .iter()
                    .filter_map(DecodedValue::as_str)
                    .map(str::to_string)
                    .collect()
            })
            .unwrap_or_default();

        let description = map
            .get("description")
            .and_then(DecodedValue::as_map)
            .map(|entries| {
                entries
                    .iter()
                    .filter_map(|(lang, text)| Some((lang.clone(), text.as_str()?.to_string())))
                    .collect()
            })
            .unwrap_or_default();

        Ok(Metadata {
            node_count: narrow_u32(uint("node_count")),
            record_size: narrow_u16(uint("record_size")),
            ip_version: narrow_u16(uint("ip_version")),
            database_type: string("database_type"),
            build_epoch: uint("build_epoch"),
            languages,
            description,
            binary_format_major_version: narrow_u16(uint("binary_format_major_version")),
            binary_format_minor_version: narrow_u16(uint("binary_format_minor_version")),
        })
    }
}

fn narrow_u16(value: u64) -> u16 {
    u16::try_from(value).unwrap_or(u16::MAX)
}

fn narrow_u32(value: u64) -> u32 {
    u32::try_from(value).unwrap_or(u32::MAX)
}

/// Parsed MMDB header: metadata plus the derived layout values
#[derive(Debug, Clone)]
pub struct MmdbHeader {
    /// Decoded metadata
    pub metadata: Metadata,
    /// Bytes per search tree node
    pub node_size: usize,
    /// Absolute offset of the data section (after the 16-byte separator)
    pub data_section_offset: usize,
}

impl MmdbHeader {
    /// Parse the metadata block of an MMDB file
    pub fn from_file(data: &[u8]) -> Result<Self> {
        let marker_offset = find_metadata_marker(data)?;

        // Metadata comes AFTER the marker; pointers inside it are relative
        // to the metadata start.
        let metadata_start = marker_offset + METADATA_MARKER.len();
        let decoder = Decoder::new(data, metadata_start);
        let (value, _) = decoder
            .decode(metadata_start)
            .map_err(|e| MmdbError::InvalidMetadata(format!("failed to decode metadata: {}", e)))?;

        let metadata = Metadata::from_value(&value)?;
        let node_size = node_size_bytes(metadata.record_size);
        let data_section_offset = (metadata.node_count as usize)
            .saturating_mul(node_size)
            .saturating_add(DATA_SECTION_SEPARATOR_SIZE);

        tracing::debug!(
            node_count = metadata.node_count,
            record_size = metadata.record_size,
            ip_version = metadata.ip_version,
            database_type = %metadata.database_type,
            data_section_offset,
            "parsed MMDB metadata"
        );

        Ok(MmdbHeader {
            metadata,
            node_size,
            data_section_offset,
        })
    }

    /// Size of the search tree (node section) in bytes
    pub fn tree_size(&self) -> usize {
        self.data_section_offset - DATA_SECTION_SEPARATOR_SIZE
    }
}

/// Find the metadata marker in an MMDB file (zero allocation)
///
/// The marker bytes may also occur inside record data, so this returns
/// the LAST occurrence.
pub fn find_metadata_marker(data: &[u8]) -> Result<usize> {
    memchr::memmem::rfind(data, METADATA_MARKER).ok_or(MmdbError::MetadataNotFound)
}
