// Polynomial rolling hash over fixed-size blocks, plus the byte comparison
// helpers used to verify and extend matches.
//
// The hash is `sum(b[i] * 257^(n-1-i)) mod 2^23`.  Because 2^23 divides 2^32,
// every intermediate step can use wrapping `u32` arithmetic and mask at the
// end without changing the result.

/// Polynomial base.
pub const HASH_MULT: u32 = 257;

/// Number of significant hash bits.
pub const HASH_BITS: u32 = 23;

/// Mask applied after every hash step (modulus 2^23).
pub const HASH_MASK: u32 = (1 << HASH_BITS) - 1;

/// Rolling hash for a fixed block size.
#[derive(Clone)]
pub struct RollingHash {
    block_size: usize,
    /// `remove[b] = b * MULT^(block_size - 1)`, the contribution of a byte
    /// about to leave the window.
    remove: [u32; 256],
}

impl RollingHash {
    /// Build the hasher and its removal table.
    ///
    /// # Panics
    /// Panics when `block_size` is zero.
    pub fn new(block_size: usize) -> Self {
        assert!(block_size > 0, "rolling hash block size must be non-zero");

        let mut mult_pow: u32 = 1;
        for _ in 1..block_size {
            mult_pow = mult_pow.wrapping_mul(HASH_MULT) & HASH_MASK;
        }

        let mut remove = [0u32; 256];
        for (b, slot) in remove.iter_mut().enumerate() {
            *slot = (b as u32).wrapping_mul(mult_pow) & HASH_MASK;
        }

        Self { block_size, remove }
    }

    #[inline]
    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Hash the first `block_size` bytes of `window` from scratch.
    ///
    /// # Panics
    /// Panics when `window` is shorter than the block size.
    #[inline]
    pub fn hash(&self, window: &[u8]) -> u32 {
        window[..self.block_size].iter().fold(0u32, |h, &b| {
            h.wrapping_mul(HASH_MULT).wrapping_add(u32::from(b)) & HASH_MASK
        })
    }

    /// Slide the window one byte: drop `leaving`, append `entering`.
    #[inline(always)]
    pub fn update(&self, old: u32, leaving: u8, entering: u8) -> u32 {
        old.wrapping_sub(self.remove[leaving as usize])
            .wrapping_mul(HASH_MULT)
            .wrapping_add(u32::from(entering))
            & HASH_MASK
    }
}

impl std::fmt::Debug for RollingHash {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RollingHash")
            .field("block_size", &self.block_size)
            .finish_non_exhaustive()
    }
}

// ---------------------------------------------------------------------------
// Match comparison
// ---------------------------------------------------------------------------

#[inline(always)]
fn load_u64(bytes: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(bytes);
    u64::from_le_bytes(buf)
}

/// Length of the common prefix of `s1` and `s2`.
///
/// Compares eight bytes at a time; with little-endian loads the first
/// differing byte is always the lowest set byte of the XOR.
#[inline]
pub fn forward_match(s1: &[u8], s2: &[u8]) -> usize {
    let n = s1.len().min(s2.len());
    let (s1, s2) = (&s1[..n], &s2[..n]);

    let mut i = 0;
    for (a, b) in s1.chunks_exact(8).zip(s2.chunks_exact(8)) {
        let xor = load_u64(a) ^ load_u64(b);
        if xor != 0 {
            return i + (xor.trailing_zeros() / 8) as usize;
        }
        i += 8;
    }
    while i < n && s1[i] == s2[i] {
        i += 1;
    }
    i
}

/// Length of the common suffix of `s1` and `s2`.
#[inline]
pub fn backward_match(s1: &[u8], s2: &[u8]) -> usize {
    let n = s1.len().min(s2.len());
    let (s1, s2) = (&s1[s1.len() - n..], &s2[s2.len() - n..]);

    let mut matched = 0;
    for (a, b) in s1.rchunks_exact(8).zip(s2.rchunks_exact(8)) {
        let xor = load_u64(a) ^ load_u64(b);
        if xor != 0 {
            return matched + (xor.leading_zeros() / 8) as usize;
        }
        matched += 8;
    }
    while matched < n && s1[n - 1 - matched] == s2[n - 1 - matched] {
        matched += 1;
    }
    matched
}

/// Number of leading bytes of `data` equal to `byte`.
#[inline]
pub fn find_run_length(data: &[u8], byte: u8) -> usize {
    let pattern = u64::from_le_bytes([byte; 8]);
    let mut i = 0;
    for chunk in data.chunks_exact(8) {
        let xor = load_u64(chunk) ^ pattern;
        if xor != 0 {
            return i + (xor.trailing_zeros() / 8) as usize;
        }
        i += 8;
    }
    while i < data.len() && data[i] == byte {
        i += 1;
    }
    i
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reference_hash(data: &[u8]) -> u32 {
        let mut h: u64 = 0;
        for &b in data {
            h = (h * u64::from(HASH_MULT) + u64::from(b)) % (1 << HASH_BITS);
        }
        h as u32
    }

    #[test]
    fn hash_matches_reference_polynomial() {
        let rh = RollingHash::new(16);
        let data: Vec<u8> = (0..16).map(|i| (i * 37 + 11) as u8).collect();
        assert_eq!(rh.hash(&data), reference_hash(&data));
        assert_eq!(rh.hash(&[0u8; 16]), 0);
    }

    #[test]
    fn hash_ignores_bytes_past_block() {
        let rh = RollingHash::new(4);
        assert_eq!(rh.hash(b"abcdXYZ"), rh.hash(b"abcd"));
    }

    #[test]
    fn update_equals_fresh_hash() {
        let rh = RollingHash::new(16);
        let data: Vec<u8> = (0..1000u32).map(|i| (i.wrapping_mul(2_654_435_761) >> 13) as u8).collect();
        let mut h = rh.hash(&data);
        for pos in 1..=data.len() - 16 {
            h = rh.update(h, data[pos - 1], data[pos + 15]);
            assert_eq!(h, rh.hash(&data[pos..]), "mismatch at {pos}");
        }
    }

    #[test]
    fn hash_stays_within_mask() {
        let rh = RollingHash::new(16);
        let h = rh.hash(&[0xFF; 16]);
        assert_eq!(h & !HASH_MASK, 0);
        assert_eq!(rh.update(h, 0xFF, 0x00) & !HASH_MASK, 0);
    }

    #[test]
    fn block_size_one() {
        let rh = RollingHash::new(1);
        assert_eq!(rh.hash(b"A"), u32::from(b'A'));
        assert_eq!(rh.update(u32::from(b'A'), b'A', b'B'), u32::from(b'B'));
    }

    #[test]
    #[should_panic(expected = "non-zero")]
    fn zero_block_size_panics() {
        let _ = RollingHash::new(0);
    }

    #[test]
    fn forward_match_cases() {
        assert_eq!(forward_match(b"", b""), 0);
        assert_eq!(forward_match(b"abcdef", b"abcxef"), 3);
        assert_eq!(forward_match(b"abc", b"abcdef"), 3);
        for boundary in [0, 7, 8, 9, 16, 31, 64] {
            let a = vec![0x42u8; boundary + 5];
            let mut b = a.clone();
            b[boundary] = 0xFF;
            assert_eq!(forward_match(&a, &b), boundary, "boundary {boundary}");
        }
    }

    #[test]
    fn backward_match_cases() {
        assert_eq!(backward_match(b"", b"x"), 0);
        assert_eq!(backward_match(b"xxabc", b"yabc"), 3);
        assert_eq!(backward_match(b"abc", b"zzabc"), 3);
        for boundary in [0, 7, 8, 9, 16, 31, 64] {
            let a = vec![0x42u8; boundary + 5];
            let mut b = a.clone();
            b[4] = 0xFF;
            assert_eq!(backward_match(&a, &b), boundary, "boundary {boundary}");
        }
    }

    #[test]
    fn run_length_cases() {
        assert_eq!(find_run_length(&[], 0), 0);
        assert_eq!(find_run_length(&[1, 2, 3], 0), 0);
        assert_eq!(find_run_length(&[0xAA; 1024], 0xAA), 1024);
        for boundary in [1, 7, 8, 9, 16, 33] {
            let mut data = vec![0x42u8; boundary + 5];
            data[boundary] = 0xFF;
            assert_eq!(find_run_length(&data, 0x42), boundary, "boundary {boundary}");
        }
    }
}
