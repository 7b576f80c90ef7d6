// Block hash index.
//
// Blocks live in an arena in insertion order; each entry links to the
// previous block that landed in the same bucket, and the bucket table holds
// the most recent block number.  Stored value 0 means "empty" so that a
// freshly zeroed table needs no sentinel fill.

use super::rolling::{RollingHash, backward_match, forward_match};

/// Smallest bucket table.
const MIN_BUCKETS: usize = 16;

/// Largest bucket table; hashes only carry 23 bits.
const MAX_BUCKETS: usize = 1 << 23;

/// A verified match in the combined dictionary + target address space.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Match {
    /// Chunk-relative start of the matched target bytes.
    pub target_start: usize,
    /// Address of the matched bytes (dictionary first, then target).
    pub source_addr: u64,
    pub len: usize,
}

impl Match {
    #[inline]
    pub fn target_end(&self) -> usize {
        self.target_start + self.len
    }
}

/// The bytes a COPY may read: the dictionary followed by the current chunk.
#[derive(Debug, Clone, Copy)]
pub struct CombinedSpace<'a> {
    pub dictionary: &'a [u8],
    pub target: &'a [u8],
}

impl<'a> CombinedSpace<'a> {
    pub fn new(dictionary: &'a [u8], target: &'a [u8]) -> Self {
        Self { dictionary, target }
    }

    /// Address of `target[pos]`.
    #[inline]
    pub fn here(&self, pos: usize) -> u64 {
        (self.dictionary.len() + pos) as u64
    }

    /// Number of bytes starting at `addr` that equal `target[target_pos..]`.
    /// Continues from the dictionary end into the target.
    pub fn forward_match(&self, addr: u64, target_pos: usize) -> usize {
        let want = &self.target[target_pos..];
        let dict_len = self.dictionary.len();
        let addr = addr as usize;

        if addr < dict_len {
            let src = &self.dictionary[addr..];
            let n = forward_match(src, want);
            if n < src.len() || n == want.len() {
                return n;
            }
            return n + forward_match(self.target, &want[n..]);
        }
        forward_match(&self.target[addr - dict_len..], want)
    }

    /// Number of bytes before `addr` that equal the `max` bytes before
    /// `target[target_pos]`, walking backwards.
    pub fn backward_match(&self, addr: u64, target_pos: usize, max: usize) -> usize {
        let want = &self.target[target_pos - max..target_pos];
        let dict_len = self.dictionary.len();
        let addr = addr as usize;

        if addr > dict_len {
            let src = &self.target[..addr - dict_len];
            let n = backward_match(src, want);
            if n < src.len() || n == want.len() {
                return n;
            }
            return n + backward_match(self.dictionary, &want[..want.len() - n]);
        }
        backward_match(&self.dictionary[..addr], want)
    }
}

#[derive(Debug, Clone, Copy)]
struct BlockEntry {
    hash: u32,
    /// Previous block number + 1 in the same bucket, or 0.
    prev: u32,
    offset: u64,
}

/// Hash index over the blocks of one buffer.
#[derive(Debug)]
pub struct BlockHashIndex {
    /// `buckets[h & mask]` = most recent block number + 1, or 0.
    buckets: Vec<u32>,
    blocks: Vec<BlockEntry>,
    mask: u32,
    block_size: usize,
    /// Added to block offsets to place them in the combined address space.
    bias: u64,
    /// Next aligned offset not yet indexed by `add_blocks_through`.
    next_offset: usize,
    max_probes: usize,
}

impl BlockHashIndex {
    /// Size the bucket table for `expected_blocks` entries.
    pub fn new(expected_blocks: usize, block_size: usize, bias: u64, max_probes: usize) -> Self {
        let buckets = expected_blocks
            .clamp(MIN_BUCKETS, MAX_BUCKETS)
            .next_power_of_two();
        Self {
            buckets: vec![0; buckets],
            blocks: Vec::new(),
            mask: (buckets - 1) as u32,
            block_size,
            bias,
            next_offset: 0,
            max_probes,
        }
    }

    /// Drop every block, keeping allocations.
    pub fn reset(&mut self) {
        self.buckets.fill(0);
        self.blocks.clear();
        self.next_offset = 0;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.blocks.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.blocks.is_empty()
    }

    #[inline]
    pub fn bias(&self) -> u64 {
        self.bias
    }

    /// Record a block with a precomputed hash at buffer offset `offset`.
    pub fn add_block(&mut self, hash: u32, offset: usize) {
        // Block numbers are stored as u32 + 1.
        if self.blocks.len() >= u32::MAX as usize {
            return;
        }
        let bucket = (hash & self.mask) as usize;
        self.blocks.push(BlockEntry {
            hash,
            prev: self.buckets[bucket],
            offset: offset as u64,
        });
        self.buckets[bucket] = self.blocks.len() as u32;
    }

    /// Index every aligned block fully contained in `data`.
    pub fn add_all_blocks(&mut self, hasher: &RollingHash, data: &[u8]) {
        self.blocks.reserve(data.len() / self.block_size);
        self.add_blocks_through(hasher, data, data.len());
    }

    /// Index every aligned block of `data` that starts before `limit` and
    /// has not been indexed yet.
    pub fn add_blocks_through(&mut self, hasher: &RollingHash, data: &[u8], limit: usize) {
        let bs = self.block_size;
        while self.next_offset < limit && self.next_offset + bs <= data.len() {
            let off = self.next_offset;
            self.add_block(hasher.hash(&data[off..off + bs]), off);
            self.next_offset += bs;
        }
    }

    /// Longest verified match for the block at `target_pos` whose hash is
    /// `hash`.
    ///
    /// Walks the bucket newest first, so among equally long matches the most
    /// recent block wins.  Backward extension stops at `unencoded_start`.
    pub fn find_best_match(
        &self,
        space: &CombinedSpace<'_>,
        hash: u32,
        target_pos: usize,
        unencoded_start: usize,
        min_len: usize,
    ) -> Option<Match> {
        let here = space.here(target_pos);
        let mut link = self.buckets[(hash & self.mask) as usize];
        let mut best: Option<Match> = None;
        let mut probes = 0;

        while link != 0 && probes < self.max_probes {
            let entry = self.blocks[(link - 1) as usize];
            link = entry.prev;
            probes += 1;

            if entry.hash != hash {
                continue;
            }
            let addr = self.bias + entry.offset;
            if addr >= here {
                continue;
            }

            let fwd = space.forward_match(addr, target_pos);
            if fwd < self.block_size {
                continue;
            }
            let max_back = (target_pos - unencoded_start).min(addr as usize);
            let back = space.backward_match(addr, target_pos, max_back);
            let len = back + fwd;

            if best.is_none_or(|b| len > b.len) {
                best = Some(Match {
                    target_start: target_pos - back,
                    source_addr: addr - back as u64,
                    len,
                });
            }
        }

        best.filter(|m| m.len >= min_len)
    }
}
