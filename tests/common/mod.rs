//! Minimal MMDB writer for tests
//!
//! Builds real MaxMind DB files in memory: a search tree with 24, 28 or
//! 32-bit records, the 16-byte separator, a data section and the trailing
//! metadata map.

#![allow(dead_code)]

use geolookup::DecodedValue;
use num_bigint::BigUint;
use std::collections::BTreeMap;
use std::net::IpAddr;

pub const METADATA_MARKER: &[u8] = b"\xAB\xCD\xEFMaxMind.com";

#[derive(Clone, Copy)]
enum Slot {
    Empty,
    Node(u32),
    Data(u32),
}

pub struct MmdbWriter {
    ip_version: u16,
    record_size: u16,
    nodes: Vec<[Slot; 2]>,
    data: Vec<u8>,
    pub database_type: String,
    pub languages: Vec<String>,
    pub description: BTreeMap<String, String>,
    pub build_epoch: u64,
}

impl MmdbWriter {
    pub fn new(ip_version: u16, record_size: u16) -> Self {
        Self {
            ip_version,
            record_size,
            nodes: Vec::new(),
            data: Vec::new(),
            database_type: "Test-DB".to_string(),
            languages: vec!["en".to_string()],
            description: BTreeMap::from([("en".to_string(), "test database".to_string())]),
            build_epoch: 1_700_000_000,
        }
    }

    /// Append already-encoded bytes to the data section, returning their offset
    pub fn push_raw(&mut self, bytes: &[u8]) -> u32 {
        let offset = self.data.len() as u32;
        self.data.extend_from_slice(bytes);
        offset
    }

    /// Encode a value into the data section, returning its offset
    pub fn push_value(&mut self, value: &DecodedValue) -> u32 {
        let mut bytes = Vec::new();
        encode(value, &mut bytes);
        self.push_raw(&bytes)
    }

    /// Map a network ("1.2.3.0/24", "2001:db8::/32") to a new record
    pub fn insert(&mut self, cidr: &str, value: &DecodedValue) {
        let offset = self.push_value(value);
        self.insert_offset(cidr, offset);
    }

    /// Map a network to an existing data section offset
    pub fn insert_offset(&mut self, cidr: &str, offset: u32) {
        let (bits, prefix_len) = self.network_bits(cidr);
        assert!(prefix_len > 0, "prefix length must be at least 1");

        if self.nodes.is_empty() {
            self.nodes.push([Slot::Empty; 2]);
        }

        let mut node = 0usize;
        for i in 0..prefix_len - 1 {
            let bit = ((bits >> (127 - i)) & 1) as usize;
            let slot = self.nodes[node][bit];
            node = match slot {
                Slot::Node(next) => next as usize,
                inherited => {
                    let next = self.nodes.len();
                    self.nodes.push([inherited; 2]);
                    self.nodes[node][bit] = Slot::Node(next as u32);
                    next
                }
            };
        }

        let bit = ((bits >> (127 - (prefix_len - 1))) & 1) as usize;
        self.nodes[node][bit] = Slot::Data(offset);
    }

    /// Network address bits left-aligned in a u128 plus the tree depth
    fn network_bits(&self, cidr: &str) -> (u128, usize) {
        let (addr, len) = cidr.split_once('/').expect("CIDR notation");
        let addr: IpAddr = addr.parse().expect("valid address");
        let len: usize = len.parse().expect("valid prefix length");

        match (addr, self.ip_version) {
            (IpAddr::V4(v4), 4) => ((u32::from(v4) as u128) << 96, len),
            (IpAddr::V4(v4), _) => (u128::from(v4.to_ipv6_mapped()), len + 96),
            (IpAddr::V6(v6), 6) => (u128::from(v6), len),
            (IpAddr::V6(_), _) => panic!("IPv6 network in an IPv4 database"),
        }
    }

    pub fn node_count(&self) -> u32 {
        self.nodes.len() as u32
    }

    fn record_value(&self, slot: Slot) -> u32 {
        let node_count = self.node_count();
        match slot {
            Slot::Empty => node_count,
            Slot::Node(n) => n,
            Slot::Data(offset) => node_count + 16 + offset,
        }
    }

    pub fn build(&self) -> Vec<u8> {
        let mut out = Vec::new();

        for node in &self.nodes {
            let left = self.record_value(node[0]);
            let right = self.record_value(node[1]);
            write_node(&mut out, self.record_size, left, right);
        }

        out.extend_from_slice(&[0u8; 16]);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(METADATA_MARKER);
        encode(&self.metadata(), &mut out);
        out
    }

    pub fn metadata(&self) -> DecodedValue {
        let description = self
            .description
            .iter()
            .map(|(k, v)| (k.clone(), DecodedValue::String(v.clone())))
            .collect();

        map(vec![
            ("node_count", DecodedValue::Uint32(self.node_count())),
            ("record_size", DecodedValue::Uint16(self.record_size)),
            ("ip_version", DecodedValue::Uint16(self.ip_version)),
            ("database_type", string(&self.database_type)),
            (
                "languages",
                DecodedValue::Array(self.languages.iter().map(|l| string(l)).collect()),
            ),
            ("description", DecodedValue::Map(description)),
            ("binary_format_major_version", DecodedValue::Uint16(2)),
            ("binary_format_minor_version", DecodedValue::Uint16(0)),
            ("build_epoch", DecodedValue::Uint64(self.build_epoch)),
        ])
    }
}

fn write_node(out: &mut Vec<u8>, record_size: u16, left: u32, right: u32) {
    match record_size {
        24 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        28 => {
            out.extend_from_slice(&left.to_be_bytes()[1..]);
            out.push((((left >> 24) & 0x0F) << 4) as u8 | ((right >> 24) & 0x0F) as u8);
            out.extend_from_slice(&right.to_be_bytes()[1..]);
        }
        32 => {
            out.extend_from_slice(&left.to_be_bytes());
            out.extend_from_slice(&right.to_be_bytes());
        }
        other => panic!("unsupported record size {}", other),
    }
}

pub fn string(s: &str) -> DecodedValue {
    DecodedValue::String(s.to_string())
}

pub fn map(entries: Vec<(&str, DecodedValue)>) -> DecodedValue {
    DecodedValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.to_string(), v))
            .collect(),
    )
}

/// `{"names": {"en": name}}`
pub fn names(name: &str) -> DecodedValue {
    map(vec![("names", map(vec![("en", string(name))]))])
}

/// Encode a value in MMDB data section format
pub fn encode(value: &DecodedValue, out: &mut Vec<u8>) {
    match value {
        DecodedValue::String(s) => {
            control(2, s.len(), out);
            out.extend_from_slice(s.as_bytes());
        }
        DecodedValue::Double(d) => {
            control(3, 8, out);
            out.extend_from_slice(&d.to_be_bytes());
        }
        DecodedValue::Bytes(b) => {
            control(4, b.len(), out);
            out.extend_from_slice(b);
        }
        DecodedValue::Uint16(n) => uint(5, *n as u64, out),
        DecodedValue::Uint32(n) => uint(6, *n as u64, out),
        DecodedValue::Map(entries) => {
            control(7, entries.len(), out);
            for (key, value) in entries {
                encode(&DecodedValue::String(key.clone()), out);
                encode(value, out);
            }
        }
        DecodedValue::Int32(n) => {
            control(8, 4, out);
            out.extend_from_slice(&n.to_be_bytes());
        }
        DecodedValue::Uint64(n) => uint(9, *n, out),
        DecodedValue::Uint128(n) => {
            let bytes = if *n == BigUint::default() {
                Vec::new()
            } else {
                n.to_bytes_be()
            };
            control(10, bytes.len(), out);
            out.extend_from_slice(&bytes);
        }
        DecodedValue::Array(items) => {
            control(11, items.len(), out);
            for item in items {
                encode(item, out);
            }
        }
        DecodedValue::Bool(b) => control(14, *b as usize, out),
        DecodedValue::Float(f) => {
            control(15, 4, out);
            out.extend_from_slice(&f.to_be_bytes());
        }
        DecodedValue::Ignored { .. } => panic!("cannot encode an ignored value"),
    }
}

/// Unsigned integer with leading zero bytes stripped
fn uint(type_id: u8, n: u64, out: &mut Vec<u8>) {
    let bytes = n.to_be_bytes();
    let skip = bytes.iter().take_while(|&&b| b == 0).count();
    control(type_id, 8 - skip, out);
    out.extend_from_slice(&bytes[skip..]);
}

/// Control byte, extended type byte and size escape bytes
pub fn control(type_id: u8, size: usize, out: &mut Vec<u8>) {
    let (first, ext) = if type_id <= 7 {
        (type_id << 5, None)
    } else {
        (0u8, Some(type_id - 7))
    };

    let (size_bits, extra): (u8, Vec<u8>) = if size < 29 {
        (size as u8, vec![])
    } else if size < 285 {
        (29, vec![(size - 29) as u8])
    } else if size < 65_821 {
        (30, ((size - 285) as u16).to_be_bytes().to_vec())
    } else {
        (31, ((size - 65_821) as u32).to_be_bytes()[1..].to_vec())
    };

    out.push(first | size_bits);
    if let Some(ext) = ext {
        out.push(ext);
    }
    out.extend_from_slice(&extra);
}

/// Pointer to a data section offset using the narrowest encoding
pub fn pointer(target: u32) -> Vec<u8> {
    if target < 2048 {
        vec![0x20 | ((target >> 8) & 0x7) as u8, target as u8]
    } else if target < 526_336 {
        let v = target - 2048;
        vec![0x28 | ((v >> 16) & 0x7) as u8, (v >> 8) as u8, v as u8]
    } else if target < 134_744_064 {
        let v = target - 526_336;
        vec![0x30 | ((v >> 24) & 0x7) as u8, (v >> 16) as u8, (v >> 8) as u8, v as u8]
    } else {
        let mut bytes = vec![0x38];
        bytes.extend_from_slice(&target.to_be_bytes());
        bytes
    }
}
