//! Content keys for array samples and the write-side deduplication map.

use std::collections::HashMap;

use super::Location;
use crate::util::PlainOldDataType;

/// 128-bit MurmurHash3 digest of encoded sample bytes.
pub type SampleDigest = [u8; 16];

/// Digest of encoded sample bytes.
#[inline]
pub fn compute_digest(data: &[u8]) -> SampleDigest {
    murmur3::hash128_bytes(data)
}

/// Identity of an array sample's content.
///
/// Two samples with equal keys are treated as byte-identical. Keys order by
/// byte count, then original POD, read POD and digest.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SampleKey {
    pub num_bytes: u64,
    /// POD the sample was written with.
    pub orig_pod: PlainOldDataType,
    /// POD the sample is read as; equals `orig_pod` unless converted.
    pub read_pod: PlainOldDataType,
    pub digest: SampleDigest,
}

impl SampleKey {
    /// Key of encoded bytes written as `pod`.
    pub fn from_data(data: &[u8], pod: PlainOldDataType) -> Self {
        Self::from_digest(compute_digest(data), data.len() as u64, pod)
    }

    pub fn from_digest(digest: SampleDigest, num_bytes: u64, pod: PlainOldDataType) -> Self {
        Self { num_bytes, orig_pod: pod, read_pod: pod, digest }
    }

    /// Same content read back as another POD.
    pub fn read_as(mut self, pod: PlainOldDataType) -> Self {
        self.read_pod = pod;
        self
    }

    /// Digest as lowercase hex.
    pub fn digest_hex(&self) -> String {
        self.digest.iter().map(|b| format!("{:02x}", b)).collect()
    }
}

/// Counters reported by [`DedupMap`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DedupStats {
    pub hits: u64,
    pub misses: u64,
    /// Bytes not written thanks to hits.
    pub bytes_saved: u64,
}

/// Session-scoped map from sample content to the data block holding it.
///
/// Lives only as long as one write session and is never persisted.
#[derive(Debug, Default)]
pub struct DedupMap {
    map: HashMap<SampleKey, Location>,
    stats: DedupStats,
}

impl DedupMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Look up a key, counting a hit or a miss.
    pub fn lookup(&mut self, key: &SampleKey) -> Option<Location> {
        match self.map.get(key) {
            Some(loc) => {
                self.stats.hits += 1;
                self.stats.bytes_saved += key.num_bytes;
                Some(*loc)
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    pub fn insert(&mut self, key: SampleKey, location: Location) {
        self.map.insert(key, location);
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn stats(&self) -> DedupStats {
        self.stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_content_same_key() {
        let a = SampleKey::from_data(b"abcdef", PlainOldDataType::Float32);
        let b = SampleKey::from_data(b"abcdef", PlainOldDataType::Float32);
        assert_eq!(a, b);

        let other_pod = SampleKey::from_data(b"abcdef", PlainOldDataType::Int32);
        assert_ne!(a, other_pod);
        assert_ne!(a, SampleKey::from_data(b"abcdeg", PlainOldDataType::Float32));
    }

    #[test]
    fn test_key_order() {
        let small = SampleKey::from_data(b"zz", PlainOldDataType::Float64);
        let large = SampleKey::from_data(b"aaa", PlainOldDataType::Uint8);
        assert!(small < large);
        let converted = small.read_as(PlainOldDataType::Float16);
        // Float16 sorts before Float64.
        assert!(converted < small);
        assert_eq!(converted.orig_pod, PlainOldDataType::Float64);
    }

    #[test]
    fn test_dedup_map_counts() {
        let mut map = DedupMap::new();
        let key = SampleKey::from_data(&[1, 2, 3, 4], PlainOldDataType::Uint8);
        assert_eq!(map.lookup(&key), None);
        map.insert(key, Location::data(64));
        assert_eq!(map.lookup(&key), Some(Location::data(64)));
        assert_eq!(map.len(), 1);
        assert_eq!(map.stats(), DedupStats { hits: 1, misses: 1, bytes_saved: 4 });
    }

    #[test]
    fn test_digest_hex() {
        let key = SampleKey::from_data(&[], PlainOldDataType::Uint8);
        assert_eq!(key.digest_hex(), "0".repeat(32));
    }
}
