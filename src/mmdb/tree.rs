//! MMDB Search Tree Traversal
//!
//! Implements binary trie traversal for IP address lookups.
//! Each node contains two records (left for bit 0, right for bit 1) that
//! hold either:
//! - Another node index (continue traversal)
//! - `node_count` exactly (address not in the database)
//! - A value above `node_count` (pointer into the data section)

use super::format::MmdbHeader;
use super::types::{RecordSize, DATA_SECTION_SEPARATOR_SIZE};
use crate::error::{MmdbError, Result};
use std::cmp::Ordering;
use std::net::IpAddr;

/// Result of a successful trie walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeMatch {
    /// Absolute offset of the record's value in the file buffer
    pub data_offset: usize,
    /// Network prefix length (IPv4 lengths for IPv4 inputs)
    pub prefix_len: u8,
}

/// Search tree for IP address lookups
pub struct SearchTree<'a> {
    /// The raw file data containing the tree
    data: &'a [u8],
    /// Parsed header information
    header: &'a MmdbHeader,
}

impl<'a> SearchTree<'a> {
    /// Create a new search tree
    pub fn new(data: &'a [u8], header: &'a MmdbHeader) -> Self {
        Self { data, header }
    }

    /// Look up an IP address
    ///
    /// IPv4 inputs are walked in their IPv4-mapped IPv6 form. In an IPv4
    /// database they start at bit 96, skipping the mapped prefix.
    /// `::ffff:a.b.c.d` inputs are treated exactly like `a.b.c.d`.
    ///
    /// Returns `Ok(None)` when the address is not in the database.
    pub fn lookup(&self, ip: IpAddr) -> Result<Option<TreeMatch>> {
        let metadata = &self.header.metadata;
        let record_size = RecordSize::from_bits(metadata.record_size).ok_or_else(|| {
            MmdbError::InvalidFormat(format!(
                "unsupported record size: {} bits",
                metadata.record_size
            ))
        })?;

        let (bits, is_v4) = match ip.to_canonical() {
            IpAddr::V4(addr) => (u128::from(addr.to_ipv6_mapped()), true),
            IpAddr::V6(addr) => (u128::from(addr), false),
        };
        let start_bit = if is_v4 && metadata.ip_version == 4 {
            96
        } else {
            0
        };

        let node_count = metadata.node_count;
        let mut node = 0u32;

        for bit_index in start_bit..128usize {
            if node >= node_count {
                return Ok(None);
            }

            let bit = ((bits >> (127 - bit_index)) & 1) as usize;
            let record = self.read_record(record_size, node, bit)?;

            match record.cmp(&node_count) {
                Ordering::Equal => return Ok(None),
                Ordering::Less => node = record,
                Ordering::Greater => {
                    let depth = bit_index + 1;
                    let prefix_len = if is_v4 {
                        depth.saturating_sub(96)
                    } else {
                        depth
                    };
                    return Ok(Some(TreeMatch {
                        data_offset: self.resolve_data_offset(record)?,
                        prefix_len: prefix_len as u8,
                    }));
                }
            }
        }

        Ok(None)
    }

    /// Read a record from a node
    ///
    /// Each node contains two records. `side` determines which:
    /// - 0 = left record (for IP bit 0)
    /// - 1 = right record (for IP bit 1)
    fn read_record(&self, record_size: RecordSize, node: u32, side: usize) -> Result<u32> {
        let node_offset = (node as usize)
            .checked_mul(self.header.node_size)
            .ok_or_else(|| MmdbError::out_of_bounds(usize::MAX, self.data.len()))?;

        match record_size {
            RecordSize::Bits24 => {
                let b = self.tree_bytes(node_offset + side * 3, 3)?;
                Ok(((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32)
            }
            RecordSize::Bits28 => {
                // [left 24 bits][left high nibble | right high nibble][right 24 bits]
                let b = self.tree_bytes(node_offset, 7)?;
                if side == 0 {
                    let high = ((b[3] >> 4) & 0x0F) as u32;
                    Ok((high << 24) | ((b[0] as u32) << 16) | ((b[1] as u32) << 8) | b[2] as u32)
                } else {
                    let high = (b[3] & 0x0F) as u32;
                    Ok((high << 24) | ((b[4] as u32) << 16) | ((b[5] as u32) << 8) | b[6] as u32)
                }
            }
            RecordSize::Bits32 => {
                let b = self.tree_bytes(node_offset + side * 4, 4)?;
                Ok(u32::from_be_bytes([b[0], b[1], b[2], b[3]]))
            }
        }
    }

    /// Bounds-checked slice of the node section
    fn tree_bytes(&self, offset: usize, len: usize) -> Result<&'a [u8]> {
        let tree_end = self.header.tree_size().min(self.data.len());
        offset
            .checked_add(len)
            .filter(|&end| end <= tree_end)
            .map(|end| &self.data[offset..end])
            .ok_or_else(|| MmdbError::out_of_bounds(offset, tree_end))
    }

    /// Convert a data pointer record into an absolute buffer offset
    ///
    /// `data_section_offset + (record - node_count) - 16`
    fn resolve_data_offset(&self, record: u32) -> Result<usize> {
        let relative = (record - self.header.metadata.node_count) as usize;
        let offset = self
            .header
            .data_section_offset
            .checked_add(relative)
            .and_then(|o| o.checked_sub(DATA_SECTION_SEPARATOR_SIZE))
            .filter(|&o| o < self.data.len())
            .ok_or_else(|| {
                MmdbError::InvalidFormat(format!(
                    "data pointer {} resolves outside the file (node_count = {})",
                    record, self.header.metadata.node_count
                ))
            })?;
        Ok(offset)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mmdb::format::Metadata;
    use crate::mmdb::types::node_size_bytes;
    use std::net::{Ipv4Addr, Ipv6Addr};

    fn header(node_count: u32, record_size: u16, ip_version: u16) -> MmdbHeader {
        let node_size = node_size_bytes(record_size);
        MmdbHeader {
            metadata: Metadata {
                node_count,
                record_size,
                ip_version,
                ..Metadata::default()
            },
            node_size,
            data_section_offset: node_count as usize * node_size + 16,
        }
    }

    #[test]
    fn test_read_24bit_record() {
        let mut data = vec![0u8; 100];
        data[..6].copy_from_slice(&[0x00, 0x00, 0x01, 0x00, 0x00, 0x02]);
        let header = header(10, 24, 6);
        let tree = SearchTree::new(&data, &header);

        assert_eq!(tree.read_record(RecordSize::Bits24, 0, 0).unwrap(), 1);
        assert_eq!(tree.read_record(RecordSize::Bits24, 0, 1).unwrap(), 2);
    }

    #[test]
    fn test_read_28bit_record_nibble_splicing() {
        // Node 1 (offset 7): left 0xABCDEF with high nibble 0x1,
        // right 0x123456 with high nibble 0x2
        let mut data = vec![0u8; 100];
        data[7..14].copy_from_slice(&[0xAB, 0xCD, 0xEF, 0x12, 0x12, 0x34, 0x56]);
        let header = header(10, 28, 6);
        let tree = SearchTree::new(&data, &header);

        assert_eq!(tree.read_record(RecordSize::Bits28, 1, 0).unwrap(), 0x1AB_CDEF);
        assert_eq!(tree.read_record(RecordSize::Bits28, 1, 1).unwrap(), 0x212_3456);

        // The high nibble of the middle byte belongs to the left record only
        data[10] = 0xF0;
        let tree = SearchTree::new(&data, &header);
        assert_eq!(tree.read_record(RecordSize::Bits28, 1, 0).unwrap(), 0xFAB_CDEF);
        assert_eq!(tree.read_record(RecordSize::Bits28, 1, 1).unwrap(), 0x012_3456);
    }

    #[test]
    fn test_read_32bit_record() {
        let mut data = vec![0u8; 100];
        data[8..16].copy_from_slice(&[0xDE, 0xAD, 0xBE, 0xEF, 0x00, 0x00, 0x01, 0x00]);
        let header = header(10, 32, 6);
        let tree = SearchTree::new(&data, &header);

        assert_eq!(tree.read_record(RecordSize::Bits32, 1, 0).unwrap(), 0xDEAD_BEEF);
        assert_eq!(tree.read_record(RecordSize::Bits32, 1, 1).unwrap(), 256);
    }

    #[test]
    fn test_record_past_tree_is_error() {
        let data = vec![0u8; 100];
        let header = header(2, 24, 6);
        let tree = SearchTree::new(&data, &header);
        assert!(tree.read_record(RecordSize::Bits24, 2, 0).is_err());
    }

    #[test]
    fn test_resolve_data_offset() {
        let data = vec![0u8; 1000];
        let header = header(100, 24, 6);
        let tree = SearchTree::new(&data, &header);

        // data section starts at 100 * 6 + 16 = 616
        assert_eq!(tree.resolve_data_offset(116).unwrap(), 616);
        assert_eq!(tree.resolve_data_offset(200).unwrap(), 700);
        assert_eq!(tree.resolve_data_offset(101).unwrap(), 601);
        assert!(tree.resolve_data_offset(2000).is_err());
    }

    #[test]
    fn test_zero_nodes_is_not_found() {
        let data = vec![0u8; 32];
        let header = header(0, 24, 4);
        let tree = SearchTree::new(&data, &header);

        let ip = IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4));
        assert_eq!(tree.lookup(ip).unwrap(), None);
        assert_eq!(tree.lookup(IpAddr::V6(Ipv6Addr::LOCALHOST)).unwrap(), None);
    }

    #[test]
    fn test_unsupported_record_size() {
        let data = vec![0u8; 32];
        let header = header(1, 16, 4);
        let tree = SearchTree::new(&data, &header);

        let err = tree.lookup(IpAddr::V4(Ipv4Addr::LOCALHOST)).unwrap_err();
        assert!(err.to_string().contains("unsupported record size"));
    }

    #[test]
    fn test_record_equal_to_node_count_is_not_found() {
        // One node: left -> not found, right -> first data byte
        let mut data = vec![0u8; 6 + 16 + 4];
        data[..3].copy_from_slice(&[0, 0, 1]);
        data[3..6].copy_from_slice(&[0, 0, 17]);
        let header = header(1, 24, 4);
        let tree = SearchTree::new(&data, &header);

        let low = IpAddr::V4(Ipv4Addr::new(10, 0, 0, 1));
        let high = IpAddr::V4(Ipv4Addr::new(200, 0, 0, 1));
        assert_eq!(tree.lookup(low).unwrap(), None);
        assert_eq!(
            tree.lookup(high).unwrap(),
            Some(TreeMatch {
                data_offset: 22,
                prefix_len: 1
            })
        );
    }

    #[test]
    fn test_mapped_input_in_ipv4_tree_starts_at_bit_96() {
        // One node: left -> not found, right -> first data byte
        let mut data = vec![0u8; 6 + 16 + 1];
        data[..3].copy_from_slice(&[0, 0, 1]);
        data[3..6].copy_from_slice(&[0, 0, 17]);
        let header = header(1, 24, 4);
        let tree = SearchTree::new(&data, &header);

        let high: IpAddr = "::ffff:200.0.0.1".parse().unwrap();
        let low: IpAddr = "::ffff:10.0.0.1".parse().unwrap();
        assert_eq!(
            tree.lookup(high).unwrap(),
            Some(TreeMatch {
                data_offset: 22,
                prefix_len: 1
            })
        );
        assert_eq!(tree.lookup(low).unwrap(), None);
    }

    #[test]
    fn test_ipv4_in_ipv6_tree_walks_mapped_prefix() {
        // 97 nodes following ::ffff:0:0/96 and then a leading 0 bit; every
        // node on the path points to the next, off-path records are "not found".
        let node_count = 97u32;
        let header = header(node_count, 32, 6);
        let mut data = vec![0u8; 97 * 8 + 16 + 1];
        let mapped = u128::from(Ipv4Addr::new(1, 0, 0, 0).to_ipv6_mapped());

        for node in 0..97usize {
            let bit = ((mapped >> (127 - node)) & 1) as usize;
            let next = if node == 96 { node_count + 16 } else { node as u32 + 1 };
            for side in 0..2 {
                let value = if side == bit { next } else { node_count };
                let at = node * 8 + side * 4;
                data[at..at + 4].copy_from_slice(&value.to_be_bytes());
            }
        }

        let tree = SearchTree::new(&data, &header);
        let found = tree
            .lookup(IpAddr::V4(Ipv4Addr::new(1, 2, 3, 4)))
            .unwrap()
            .unwrap();
        assert_eq!(found.data_offset, 97 * 8 + 16);
        assert_eq!(found.prefix_len, 1);

        let mapped_input = IpAddr::V6(Ipv4Addr::new(1, 2, 3, 4).to_ipv6_mapped());
        assert_eq!(tree.lookup(mapped_input).unwrap(), Some(found));

        assert_eq!(tree.lookup(IpAddr::V4(Ipv4Addr::new(128, 0, 0, 1))).unwrap(), None);
    }
}
