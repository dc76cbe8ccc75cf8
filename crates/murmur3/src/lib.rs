//! MurmurHash3 x64_128.
//!
//! Original algorithm by Austin Appleby (public domain). Input is consumed in
//! 16-byte little-endian blocks; [`Murmur3`] accepts data in arbitrary pieces
//! and produces the same digest as hashing the concatenation in one call.

const C1: u64 = 0x87c3_7b91_1142_53d5;
const C2: u64 = 0x4cf5_ad43_2745_937f;

/// Incremental MurmurHash3 x64_128 hasher.
#[derive(Clone, Debug)]
pub struct Murmur3 {
    h1: u64,
    h2: u64,
    tail: [u8; 16],
    tail_len: usize,
    total_len: u64,
}

impl Default for Murmur3 {
    fn default() -> Self {
        Self::with_seed(0)
    }
}

impl Murmur3 {
    /// Create a hasher with seed 0.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a hasher with an explicit seed.
    pub fn with_seed(seed: u32) -> Self {
        Self {
            h1: seed as u64,
            h2: seed as u64,
            tail: [0; 16],
            tail_len: 0,
            total_len: 0,
        }
    }

    /// Feed more bytes into the hash.
    pub fn update(&mut self, mut data: &[u8]) {
        self.total_len += data.len() as u64;

        if self.tail_len > 0 {
            let take = (16 - self.tail_len).min(data.len());
            self.tail[self.tail_len..self.tail_len + take].copy_from_slice(&data[..take]);
            self.tail_len += take;
            data = &data[take..];
            if self.tail_len < 16 {
                return;
            }
            let block = self.tail;
            self.block(&block);
            self.tail_len = 0;
        }

        let mut blocks = data.chunks_exact(16);
        for block in &mut blocks {
            let mut b = [0u8; 16];
            b.copy_from_slice(block);
            self.block(&b);
        }
        let rest = blocks.remainder();
        self.tail[..rest.len()].copy_from_slice(rest);
        self.tail_len = rest.len();
    }

    #[inline]
    fn block(&mut self, block: &[u8; 16]) {
        let mut k1 = u64::from_le_bytes([
            block[0], block[1], block[2], block[3], block[4], block[5], block[6], block[7],
        ]);
        let mut k2 = u64::from_le_bytes([
            block[8], block[9], block[10], block[11], block[12], block[13], block[14], block[15],
        ]);

        k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
        self.h1 ^= k1;
        self.h1 = self
            .h1
            .rotate_left(27)
            .wrapping_add(self.h2)
            .wrapping_mul(5)
            .wrapping_add(0x52dc_e729);

        k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
        self.h2 ^= k2;
        self.h2 = self
            .h2
            .rotate_left(31)
            .wrapping_add(self.h1)
            .wrapping_mul(5)
            .wrapping_add(0x3849_5ab5);
    }

    /// Finish and return the 128-bit hash as `(h1, h2)`.
    pub fn finish(&self) -> (u64, u64) {
        let mut h1 = self.h1;
        let mut h2 = self.h2;
        let tail = &self.tail[..self.tail_len];

        // The tail is folded in little-endian order, bytes 8.. into k2.
        let mut k1: u64 = 0;
        let mut k2: u64 = 0;
        for (i, &byte) in tail.iter().enumerate() {
            if i < 8 {
                k1 ^= (byte as u64) << (8 * i);
            } else {
                k2 ^= (byte as u64) << (8 * (i - 8));
            }
        }
        if tail.len() > 8 {
            k2 = k2.wrapping_mul(C2).rotate_left(33).wrapping_mul(C1);
            h2 ^= k2;
        }
        if !tail.is_empty() {
            k1 = k1.wrapping_mul(C1).rotate_left(31).wrapping_mul(C2);
            h1 ^= k1;
        }

        h1 ^= self.total_len;
        h2 ^= self.total_len;

        h1 = h1.wrapping_add(h2);
        h2 = h2.wrapping_add(h1);

        h1 = fmix64(h1);
        h2 = fmix64(h2);

        h1 = h1.wrapping_add(h2);
        h2 = h2.wrapping_add(h1);

        (h1, h2)
    }

    /// Finish and return the hash as 16 little-endian bytes (`h1` then `h2`).
    pub fn finish_bytes(&self) -> [u8; 16] {
        let (h1, h2) = self.finish();
        let mut out = [0u8; 16];
        out[..8].copy_from_slice(&h1.to_le_bytes());
        out[8..].copy_from_slice(&h2.to_le_bytes());
        out
    }
}

#[inline]
fn fmix64(mut h: u64) -> u64 {
    h ^= h >> 33;
    h = h.wrapping_mul(0xff51_afd7_ed55_8ccd);
    h ^= h >> 33;
    h = h.wrapping_mul(0xc4ce_b9fe_1a85_ec53);
    h ^= h >> 33;
    h
}

/// One-shot MurmurHash3 x64_128 with seed 0.
#[inline]
pub fn hash128(data: &[u8]) -> (u64, u64) {
    let mut hasher = Murmur3::new();
    hasher.update(data);
    hasher.finish()
}

/// One-shot hash as 16 little-endian bytes.
#[inline]
pub fn hash128_bytes(data: &[u8]) -> [u8; 16] {
    let mut hasher = Murmur3::new();
    hasher.update(data);
    hasher.finish_bytes()
}
