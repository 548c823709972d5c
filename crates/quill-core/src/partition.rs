//! Deterministic partitioning of a UUID keyspace for parallel batch scans.
//!
//! A periodic maintenance task over a large table can be split into `count`
//! independently-schedulable jobs, each scanning a disjoint range of the
//! primary key space. Correctness comes from the ranges being contiguous and
//! non-overlapping, so no cross-worker coordination or locking is needed.
//!
//! Ranges are computed over the first 8 hex digits of the UUID interpreted
//! as a 32-bit unsigned integer, which is how UUIDs sort in their textual
//! and binary representations.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::{CoreError, Result};

/// Size of the 32-bit prefix space: one past `0xFFFF_FFFF`.
const PREFIX_SPACE: u64 = 1 << 32;

/// Descriptor of one slice of the keyspace: slice `index` of `count`.
///
/// A pure value with no persistent identity; batch tasks carry it in their
/// props as `{ partition_index, partition_count }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Partition {
    /// Zero-based slice index.
    pub index: u32,
    /// Total number of slices.
    pub count: u32,
}

/// Inclusive UUID bounds of a partition, usable directly in a SQL
/// `BETWEEN` over the primary key.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyRange {
    /// Smallest UUID in the partition.
    pub lower: Uuid,
    /// Largest UUID in the partition.
    pub upper: Uuid,
}

impl KeyRange {
    /// Whether the key falls inside this range.
    pub fn contains(&self, id: Uuid) -> bool {
        id >= self.lower && id <= self.upper
    }
}

impl Partition {
    /// Creates a validated partition descriptor.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPartition` when `count` is zero or
    /// `index` is out of range. These are programming errors and are never
    /// retried.
    pub fn new(index: u32, count: u32) -> Result<Self> {
        if count == 0 || index >= count {
            return Err(CoreError::InvalidPartition { index, count });
        }
        Ok(Self { index, count })
    }

    /// The inclusive UUID range covered by this partition.
    ///
    /// For `count` slices the prefix space divides into spans of
    /// `0x1_0000_0000 / count`; the last slice absorbs the remainder so the
    /// union always covers the full space with no gaps or overlaps.
    pub fn key_range(&self) -> KeyRange {
        let span = PREFIX_SPACE / u64::from(self.count);
        let lower = span * u64::from(self.index);
        let upper = if self.index == self.count - 1 {
            PREFIX_SPACE - 1
        } else {
            span * u64::from(self.index + 1) - 1
        };

        KeyRange {
            lower: uuid_with_prefix(lower as u32, 0x00),
            upper: uuid_with_prefix(upper as u32, 0xFF),
        }
    }

    /// Resolves an optional partition request into an optional range.
    ///
    /// `None` means the caller wants a full, unpartitioned scan.
    ///
    /// # Errors
    ///
    /// Returns `CoreError::InvalidPartition` for out-of-range descriptors.
    pub fn range_for(partition: Option<Partition>) -> Result<Option<KeyRange>> {
        match partition {
            None => Ok(None),
            Some(p) => Partition::new(p.index, p.count).map(|p| Some(p.key_range())),
        }
    }
}

/// Builds a UUID whose first four bytes are `prefix` and whose remaining
/// twelve bytes are all `fill`.
fn uuid_with_prefix(prefix: u32, fill: u8) -> Uuid {
    let mut bytes = [fill; 16];
    bytes[..4].copy_from_slice(&prefix.to_be_bytes());
    Uuid::from_bytes(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn prefix_of(id: Uuid) -> u32 {
        u32::from_be_bytes(id.as_bytes()[..4].try_into().unwrap())
    }

    #[test]
    fn ranges_cover_space_without_gaps_or_overlaps() {
        for count in [1u32, 2, 3, 16, 100] {
            let mut next_expected: u64 = 0;

            for index in 0..count {
                let range = Partition::new(index, count).unwrap().key_range();
                let lower = u64::from(prefix_of(range.lower));
                let upper = u64::from(prefix_of(range.upper));

                assert_eq!(lower, next_expected, "gap or overlap at {index}/{count}");
                assert!(upper >= lower);
                next_expected = upper + 1;
            }

            assert_eq!(next_expected, PREFIX_SPACE, "space not fully covered for count {count}");
        }
    }

    #[test]
    fn sampled_keys_map_to_exactly_one_partition() {
        let count = 16;
        let ranges: Vec<KeyRange> =
            (0..count).map(|i| Partition::new(i, count).unwrap().key_range()).collect();

        for _ in 0..256 {
            let id = Uuid::new_v4();
            let owners = ranges.iter().filter(|r| r.contains(id)).count();
            assert_eq!(owners, 1, "key {id} owned by {owners} partitions");
        }
    }

    #[test]
    fn three_way_split_matches_known_boundaries() {
        let p0 = Partition::new(0, 3).unwrap().key_range();
        let p1 = Partition::new(1, 3).unwrap().key_range();
        let p2 = Partition::new(2, 3).unwrap().key_range();

        assert_eq!(prefix_of(p0.lower), 0x0000_0000);
        assert_eq!(prefix_of(p0.upper), 0x5555_5554);
        assert_eq!(prefix_of(p1.lower), 0x5555_5555);
        assert_eq!(prefix_of(p1.upper), 0xAAAA_AAA9);
        assert_eq!(prefix_of(p2.lower), 0xAAAA_AAAA);
        assert_eq!(prefix_of(p2.upper), 0xFFFF_FFFF);
    }

    #[test]
    fn single_partition_spans_everything() {
        let range = Partition::new(0, 1).unwrap().key_range();
        assert_eq!(range.lower, Uuid::nil());
        assert_eq!(range.upper, Uuid::from_u128(u128::MAX));
    }

    #[test]
    fn absent_partition_means_full_scan() {
        assert!(Partition::range_for(None).unwrap().is_none());
    }

    #[test]
    fn invalid_descriptors_rejected() {
        assert!(matches!(
            Partition::new(0, 0),
            Err(CoreError::InvalidPartition { index: 0, count: 0 })
        ));
        assert!(matches!(
            Partition::new(3, 3),
            Err(CoreError::InvalidPartition { index: 3, count: 3 })
        ));
        assert!(matches!(
            Partition::range_for(Some(Partition { index: 9, count: 2 })),
            Err(CoreError::InvalidPartition { .. })
        ));
    }

    #[test]
    fn range_bounds_are_inclusive() {
        let range = Partition::new(1, 3).unwrap().key_range();
        assert!(range.contains(range.lower));
        assert!(range.contains(range.upper));
    }
}
