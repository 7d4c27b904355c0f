//! MMDB-specific Type Definitions

/// MMDB metadata marker: "\xAB\xCD\xEFMaxMind.com"
pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

/// Size of the zero separator between the search tree and the data section
pub const DATA_SECTION_SEPARATOR_SIZE: usize = 16;

/// Bytes per search tree node (two records) for a record size in bits
///
/// `record_size * 2 / 8`, plus one when the record size is not a
/// multiple of 4.
pub fn node_size_bytes(record_size: u16) -> usize {
    let bits = record_size as usize * 2;
    let mut size = bits / 8;
    if record_size % 4 != 0 {
        size += 1;
    }
    size
}

/// Record size in bits
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordSize {
    /// 24-bit records (3 bytes per record, 6 bytes per node)
    Bits24 = 24,
    /// 28-bit records (3.5 bytes per record, 7 bytes per node)
    Bits28 = 28,
    /// 32-bit records (4 bytes per record, 8 bytes per node)
    Bits32 = 32,
}

impl RecordSize {
    /// Create from bit size, `None` for sizes the tree reader cannot walk
    pub fn from_bits(bits: u16) -> Option<Self> {
        match bits {
            24 => Some(RecordSize::Bits24),
            28 => Some(RecordSize::Bits28),
            32 => Some(RecordSize::Bits32),
            _ => None,
        }
    }
}
