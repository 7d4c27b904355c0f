//! MMDB data section decoding
//!
//! Decodes the self-describing value encoding used by both the metadata
//! block and the per-record payloads of a MaxMind DB file.
//!
//! # Supported Types
//!
//! - **Pointer** (1): resolved transparently, never surfaced as a value
//! - **String** (2): UTF-8 text data
//! - **Double** (3): 64-bit floating point (IEEE 754)
//! - **Bytes** (4): Raw byte arrays
//! - **Uint16** (5), **Uint32** (6), **Uint64** (9): variable width unsigned
//! - **Map** (7): Key-value pairs (string keys)
//! - **Int32** (8): Signed 32-bit integers
//! - **Uint128** (10): Arbitrary precision unsigned integers
//! - **Array** (11): Ordered lists of values
//! - **Bool** (14): Boolean values
//! - **Float** (15): 32-bit floating point (IEEE 754)
//!
//! # Format
//!
//! Every value starts with a control byte. The top 3 bits hold the type;
//! type 0 means the real type is `7 + next byte`. The low 5 bits hold the
//! payload size, with 29, 30 and 31 escaping to 1, 2 and 3 extra size
//! bytes respectively.
//!
//! See: https://maxmind.github.io/MaxMind-DB/

use crate::error::{MmdbError, Result};
use num_bigint::BigUint;
use serde_json::json;
use std::cell::Cell;
use std::collections::BTreeMap;

const TYPE_EXTENDED: u16 = 0;
const TYPE_POINTER: u16 = 1;
const TYPE_STRING: u16 = 2;
const TYPE_DOUBLE: u16 = 3;
const TYPE_BYTES: u16 = 4;
const TYPE_UINT16: u16 = 5;
const TYPE_UINT32: u16 = 6;
const TYPE_MAP: u16 = 7;
const TYPE_INT32: u16 = 8;
const TYPE_UINT64: u16 = 9;
const TYPE_UINT128: u16 = 10;
const TYPE_ARRAY: u16 = 11;
const TYPE_BOOL: u16 = 14;
const TYPE_FLOAT: u16 = 15;

/// Maximum nesting of maps, arrays and pointer hops before giving up
const MAX_DEPTH: usize = 512;

/// Maximum number of values a single `decode` call may produce, including
/// values reached repeatedly through pointers
const MAX_VALUES: usize = 1 << 20;

/// A decoded MMDB value
///
/// Closed set of the shapes the format can produce. Pointers are resolved
/// during decoding and therefore have no variant of their own.
#[derive(Debug, Clone, PartialEq)]
pub enum DecodedValue {
    /// UTF-8 string
    String(String),
    /// IEEE 754 double precision float
    Double(f64),
    /// Raw byte array
    Bytes(Vec<u8>),
    /// Unsigned 16-bit integer
    Uint16(u16),
    /// Unsigned 32-bit integer
    Uint32(u32),
    /// Unsigned 64-bit integer
    Uint64(u64),
    /// Unsigned integer of arbitrary width
    Uint128(BigUint),
    /// Signed 32-bit integer
    Int32(i32),
    /// Key-value map
    Map(BTreeMap<String, DecodedValue>),
    /// Array of values
    Array(Vec<DecodedValue>),
    /// Boolean value
    Bool(bool),
    /// IEEE 754 single precision float
    Float(f32),
    /// Value with a type tag this decoder does not understand
    Ignored {
        /// Type tag as read from the control byte(s)
        type_tag: u16,
        /// Number of payload bytes skipped
        size: usize,
    },
}

impl DecodedValue {
    /// Look up a key if this value is a map
    pub fn get(&self, key: &str) -> Option<&DecodedValue> {
        match self {
            DecodedValue::Map(map) => map.get(key),
            _ => None,
        }
    }

    /// Follow a chain of map keys, e.g. `["city", "names", "en"]`
    pub fn path(&self, keys: &[&str]) -> Option<&DecodedValue> {
        keys.iter().try_fold(self, |value, key| value.get(key))
    }

    /// Borrow the string if this value is a string
    pub fn as_str(&self) -> Option<&str> {
        match self {
            DecodedValue::String(s) => Some(s),
            _ => None,
        }
    }

    /// Coerce any unsigned (or non-negative signed) integer into a u64
    pub fn as_u64(&self) -> Option<u64> {
        match self {
            DecodedValue::Uint16(n) => Some(*n as u64),
            DecodedValue::Uint32(n) => Some(*n as u64),
            DecodedValue::Uint64(n) => Some(*n),
            DecodedValue::Uint128(n) => u64::try_from(n).ok(),
            DecodedValue::Int32(n) => u64::try_from(*n).ok(),
            _ => None,
        }
    }

    /// Coerce floats and integers into an f64
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            DecodedValue::Double(d) => Some(*d),
            DecodedValue::Float(f) => Some(*f as f64),
            DecodedValue::Int32(n) => Some(*n as f64),
            other => other.as_u64().map(|n| n as f64),
        }
    }

    /// Borrow the elements if this value is an array
    pub fn as_array(&self) -> Option<&[DecodedValue]> {
        match self {
            DecodedValue::Array(items) => Some(items),
            _ => None,
        }
    }

    /// Borrow the entries if this value is a map
    pub fn as_map(&self) -> Option<&BTreeMap<String, DecodedValue>> {
        match self {
            DecodedValue::Map(map) => Some(map),
            _ => None,
        }
    }

    /// Convert into a JSON value for display
    ///
    /// Arbitrary precision integers become decimal strings; ignored values
    /// become `null`.
    pub fn to_json(&self) -> serde_json::Value {
        match self {
            DecodedValue::String(s) => json!(s),
            DecodedValue::Double(d) => json!(d),
            DecodedValue::Bytes(b) => json!(b),
            DecodedValue::Uint16(u) => json!(u),
            DecodedValue::Uint32(u) => json!(u),
            DecodedValue::Uint64(u) => json!(u),
            DecodedValue::Uint128(u) => json!(u.to_string()),
            DecodedValue::Int32(i) => json!(i),
            DecodedValue::Bool(b) => json!(b),
            DecodedValue::Float(f) => json!(f),
            DecodedValue::Map(entries) => {
                let mut map = serde_json::Map::new();
                for (k, v) in entries {
                    map.insert(k.clone(), v.to_json());
                }
                serde_json::Value::Object(map)
            }
            DecodedValue::Array(items) => {
                serde_json::Value::Array(items.iter().map(DecodedValue::to_json).collect())
            }
            DecodedValue::Ignored { .. } => serde_json::Value::Null,
        }
    }
}

/// Data section decoder
///
/// Decodes values from a buffer. Pointer values are interpreted relative
/// to `pointer_base`, which is the start of the data section for records
/// and the start of the metadata block for metadata.
pub struct Decoder<'a> {
    buffer: &'a [u8],
    pointer_base: usize,
    budget: Cell<usize>,
}

impl<'a> Decoder<'a> {
    /// Create a decoder
    ///
    /// # Arguments
    /// * `buffer` - The whole buffer pointers may reach into
    /// * `pointer_base` - Offset in `buffer` that pointer values are relative to
    pub fn new(buffer: &'a [u8], pointer_base: usize) -> Self {
        Self {
            buffer,
            pointer_base,
            budget: Cell::new(MAX_VALUES),
        }
    }

    /// Decode the value at `offset`
    ///
    /// Returns the value and the offset just past its encoding. When the
    /// value at `offset` is a pointer, the returned offset is the one
    /// after the pointer itself, not after the value it points to.
    pub fn decode(&self, offset: usize) -> Result<(DecodedValue, usize)> {
        self.budget.set(MAX_VALUES);
        self.decode_at(offset, 0)
    }

    fn decode_at(&self, offset: usize, depth: usize) -> Result<(DecodedValue, usize)> {
        if depth > MAX_DEPTH {
            return Err(MmdbError::InvalidFormat(format!(
                "maximum data nesting depth {} exceeded at offset {}",
                MAX_DEPTH, offset
            )));
        }

        let budget = self.budget.get();
        if budget == 0 {
            return Err(MmdbError::InvalidFormat(format!(
                "more than {} values in one record at offset {}",
                MAX_VALUES, offset
            )));
        }
        self.budget.set(budget - 1);

        let ctrl = self.byte(offset)?;
        let mut cursor = offset + 1;
        let mut type_tag = (ctrl >> 5) as u16;

        if type_tag == TYPE_POINTER {
            return self.decode_pointer(ctrl, cursor, depth);
        }

        if type_tag == TYPE_EXTENDED {
            type_tag = self.byte(cursor)? as u16 + 7;
            cursor += 1;
        }

        let (size, cursor) = self.decode_size(ctrl & 0x1F, cursor)?;

        match type_tag {
            TYPE_STRING => Ok(self.decode_string(cursor, size)),
            TYPE_DOUBLE => {
                let bytes = self.fixed_width::<8>(cursor, size, "double")?;
                Ok((DecodedValue::Double(f64::from_be_bytes(bytes)), cursor + 8))
            }
            TYPE_BYTES => {
                let bytes = self.bytes(cursor, size)?;
                Ok((DecodedValue::Bytes(bytes.to_vec()), cursor + size))
            }
            TYPE_UINT16 => {
                let n = self.decode_uint(cursor, size, 2)?;
                Ok((DecodedValue::Uint16(n as u16), cursor + size))
            }
            TYPE_UINT32 => {
                let n = self.decode_uint(cursor, size, 4)?;
                Ok((DecodedValue::Uint32(n as u32), cursor + size))
            }
            TYPE_UINT64 => {
                let n = self.decode_uint(cursor, size, 8)?;
                Ok((DecodedValue::Uint64(n), cursor + size))
            }
            TYPE_INT32 => self.decode_int32(cursor, size),
            TYPE_UINT128 => {
                let bytes = self.bytes(cursor, size)?;
                Ok((
                    DecodedValue::Uint128(BigUint::from_bytes_be(bytes)),
                    cursor + size,
                ))
            }
            TYPE_MAP => self.decode_map(cursor, size, depth),
            TYPE_ARRAY => self.decode_array(cursor, size, depth),
            TYPE_BOOL => Ok((DecodedValue::Bool(size != 0), cursor)),
            TYPE_FLOAT => {
                let bytes = self.fixed_width::<4>(cursor, size, "float")?;
                Ok((DecodedValue::Float(f32::from_be_bytes(bytes)), cursor + 4))
            }
            _ => {
                self.bytes(cursor, size)?;
                Ok((DecodedValue::Ignored { type_tag, size }, cursor + size))
            }
        }
    }

    /// Resolve a pointer and decode its target
    ///
    /// Layout: `001SSVVV` followed by SS+1 bytes. For widths 1-3 the VVV
    /// bits are the most significant bits of the pointer value.
    fn decode_pointer(
        &self,
        ctrl: u8,
        cursor: usize,
        depth: usize,
    ) -> Result<(DecodedValue, usize)> {
        let width = ((ctrl >> 3) & 0x3) as usize + 1;
        let bytes = self.bytes(cursor, width)?;
        let high = (ctrl & 0x7) as usize;
        let raw = bytes
            .iter()
            .fold(0usize, |acc, &b| (acc << 8) | b as usize);

        let pointer = match width {
            1 => (high << 8) | raw,
            2 => ((high << 16) | raw) + 2048,
            3 => ((high << 24) | raw) + 526_336,
            _ => raw,
        };

        let target = self
            .pointer_base
            .checked_add(pointer)
            .ok_or_else(|| MmdbError::out_of_bounds(pointer, self.buffer.len()))?;

        let (value, _) = self.decode_at(target, depth + 1)?;
        Ok((value, cursor + width))
    }

    fn decode_size(&self, size_bits: u8, cursor: usize) -> Result<(usize, usize)> {
        match size_bits {
            0..=28 => Ok((size_bits as usize, cursor)),
            29 => {
                let b = self.bytes(cursor, 1)?;
                Ok((29 + b[0] as usize, cursor + 1))
            }
            30 => {
                let b = self.bytes(cursor, 2)?;
                Ok((285 + u16::from_be_bytes([b[0], b[1]]) as usize, cursor + 2))
            }
            _ => {
                let b = self.bytes(cursor, 3)?;
                let extra = ((b[0] as usize) << 16) | ((b[1] as usize) << 8) | b[2] as usize;
                Ok((65_821 + extra, cursor + 3))
            }
        }
    }

    /// Strings tolerate truncation: a payload running past the buffer
    /// decodes to an empty string.
    fn decode_string(&self, cursor: usize, size: usize) -> (DecodedValue, usize) {
        let next = cursor.saturating_add(size);
        match self.bytes(cursor, size) {
            Ok(bytes) => (
                DecodedValue::String(String::from_utf8_lossy(bytes).into_owned()),
                next,
            ),
            Err(_) => (DecodedValue::String(String::new()), next),
        }
    }

    fn decode_uint(&self, cursor: usize, size: usize, max_bytes: usize) -> Result<u64> {
        if size > max_bytes {
            return Err(MmdbError::InvalidFormat(format!(
                "invalid size {} for a {}-bit unsigned integer at offset {}",
                size,
                max_bytes * 8,
                cursor
            )));
        }
        let bytes = self.bytes(cursor, size)?;
        Ok(bytes.iter().fold(0u64, |acc, &b| (acc << 8) | b as u64))
    }

    fn decode_int32(&self, cursor: usize, size: usize) -> Result<(DecodedValue, usize)> {
        let raw = self.decode_uint(cursor, size, 4)?;
        let bytes = self.bytes(cursor, size)?;

        let value = if size > 0 && size < 4 && bytes[0] & 0x80 != 0 {
            (raw as i64 - (1i64 << (size * 8))) as i32
        } else {
            raw as u32 as i32
        };

        Ok((DecodedValue::Int32(value), cursor + size))
    }

    fn decode_map(
        &self,
        mut cursor: usize,
        count: usize,
        depth: usize,
    ) -> Result<(DecodedValue, usize)> {
        let mut map = BTreeMap::new();

        for _ in 0..count {
            let (key, next) = self.decode_at(cursor, depth + 1)?;
            let (value, next) = self.decode_at(next, depth + 1)?;
            cursor = next;

            if let DecodedValue::String(key) = key {
                map.insert(key, value);
            }
        }

        Ok((DecodedValue::Map(map), cursor))
    }

    fn decode_array(
        &self,
        mut cursor: usize,
        count: usize,
        depth: usize,
    ) -> Result<(DecodedValue, usize)> {
        // Every element takes at least one byte
        let remaining = self.buffer.len().saturating_sub(cursor);
        let mut array = Vec::with_capacity(count.min(remaining));

        for _ in 0..count {
            let (value, next) = self.decode_at(cursor, depth + 1)?;
            array.push(value);
            cursor = next;
        }

        Ok((DecodedValue::Array(array), cursor))
    }

    fn fixed_width<const N: usize>(
        &self,
        cursor: usize,
        size: usize,
        kind: &str,
    ) -> Result<[u8; N]> {
        if size != N {
            return Err(MmdbError::InvalidFormat(format!(
                "invalid size {} for {} at offset {} (expected {})",
                size, kind, cursor, N
            )));
        }
        let mut out = [0u8; N];
        out.copy_from_slice(self.bytes(cursor, N)?);
        Ok(out)
    }

    fn byte(&self, offset: usize) -> Result<u8> {
        self.buffer
            .get(offset)
            .copied()
            .ok_or_else(|| MmdbError::out_of_bounds(offset, self.buffer.len()))
    }

    fn bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        offset
            .checked_add(len)
            .and_then(|end| self.buffer.get(offset..end))
            .ok_or_else(|| MmdbError::out_of_bounds(offset, self.buffer.len()))
    }
}
