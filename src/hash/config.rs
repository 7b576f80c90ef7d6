// Matcher tuning constants.
//
// The block size doubles as the minimum COPY length: a match is only found
// through an indexed block, so anything shorter cannot be reported anyway.

/// Width of an indexed block and of the rolling hash window.
pub const BLOCK_SIZE: usize = 16;

/// Shortest match turned into a COPY.
pub const MIN_MATCH: usize = BLOCK_SIZE;

/// Shortest run of identical bytes turned into a RUN.
pub const MIN_RUN: usize = 8;

/// Maximum number of bucket entries inspected per lookup.
pub const MAX_PROBES: usize = 64;

/// Default target chunk (and window) size: 1 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 1 << 20;

/// Largest chunk size accepted by `EncodeOptions::with_chunk_size_mib`.
pub const MAX_CHUNK_SIZE: usize = 64 << 20;

/// Matcher parameters.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatcherConfig {
    /// Indexed block width; must be non-zero.
    pub block_size: usize,
    /// Shortest accepted COPY.
    pub min_match: usize,
    /// Shortest accepted RUN.
    pub min_run: usize,
    /// Bucket chain walk limit.
    pub max_probes: usize,
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            block_size: BLOCK_SIZE,
            min_match: MIN_MATCH,
            min_run: MIN_RUN,
            max_probes: MAX_PROBES,
        }
    }
}
