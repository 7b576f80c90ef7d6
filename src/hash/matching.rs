// Greedy block matcher.
//
// For each chunk of the target the engine walks positions left to right,
// keeping the rolling hash of the block at the cursor.  At every position it
// asks both the dictionary index and the chunk's own index for the longest
// match, falls back to RUN detection and otherwise leaves the byte as a
// pending literal.  Pending literals are flushed (with embedded runs split
// out) whenever a COPY or RUN is emitted and at the end of the chunk.

use super::config::MatcherConfig;
use super::rolling::{RollingHash, find_run_length};
use super::table::{BlockHashIndex, CombinedSpace, Match};

/// Receives the instruction stream of one window.
///
/// `copy` gets the resolved bytes as well as the address so that the sink can
/// keep a running checksum without re-reading the dictionary.
pub trait InstructionSink {
    fn add(&mut self, data: &[u8]);
    fn run(&mut self, byte: u8, len: usize);
    fn copy(&mut self, addr: u64, data: &[u8]);
}

/// Matcher state for one encoding session.
///
/// The dictionary index is built once; the target index is rebuilt for every
/// chunk.
pub struct MatchEngine<'d> {
    config: MatcherConfig,
    hasher: RollingHash,
    dictionary: &'d [u8],
    dictionary_index: BlockHashIndex,
    target_index: BlockHashIndex,
}

impl<'d> MatchEngine<'d> {
    /// Index `dictionary` and size the per-chunk index for `chunk_size`.
    ///
    /// # Panics
    /// Panics when `config.block_size` is zero.
    pub fn new(config: MatcherConfig, dictionary: &'d [u8], chunk_size: usize) -> Self {
        let hasher = RollingHash::new(config.block_size);
        let bs = config.block_size;

        let mut dictionary_index =
            BlockHashIndex::new(dictionary.len() / bs, bs, 0, config.max_probes);
        dictionary_index.add_all_blocks(&hasher, dictionary);
        let target_index = BlockHashIndex::new(
            chunk_size / bs,
            bs,
            dictionary.len() as u64,
            config.max_probes,
        );

        log::debug!(
            "indexed {} dictionary blocks ({} bytes, block size {bs})",
            dictionary_index.len(),
            dictionary.len()
        );

        Self {
            config,
            hasher,
            dictionary,
            dictionary_index,
            target_index,
        }
    }

    #[inline]
    pub fn config(&self) -> &MatcherConfig {
        &self.config
    }

    #[inline]
    pub fn dictionary(&self) -> &'d [u8] {
        self.dictionary
    }

    /// Encode one chunk as ADD/RUN/COPY instructions into `sink`.
    ///
    /// Addresses are in the space formed by the dictionary followed by this
    /// chunk.
    pub fn encode_chunk<S: InstructionSink>(&mut self, chunk: &[u8], sink: &mut S) {
        self.target_index.reset();

        let space = CombinedSpace::new(self.dictionary, chunk);
        let bs = self.config.block_size;
        let mut pos = 0;
        let mut unencoded = 0;
        let mut hash: Option<u32> = None;

        while pos + bs <= chunk.len() {
            self.target_index
                .add_blocks_through(&self.hasher, chunk, pos);
            let h = match hash {
                Some(h) => h,
                None => self.hasher.hash(&chunk[pos..]),
            };

            if let Some(m) = self.best_match(&space, h, pos, unencoded) {
                self.emit_literals(&chunk[unencoded..m.target_start], sink);
                log::trace!(
                    "match at {}: {} bytes from {}",
                    m.target_start,
                    m.len,
                    m.source_addr
                );
                sink.copy(m.source_addr, &chunk[m.target_start..m.target_end()]);
                pos = m.target_end();
                unencoded = pos;
                hash = None;
                continue;
            }

            let byte = chunk[pos];
            let run = find_run_length(&chunk[pos..], byte);
            if run >= self.config.min_run {
                self.emit_literals(&chunk[unencoded..pos], sink);
                sink.run(byte, run);
                pos += run;
                unencoded = pos;
                hash = None;
                continue;
            }

            hash = (pos + bs < chunk.len()).then(|| self.hasher.update(h, byte, chunk[pos + bs]));
            pos += 1;
        }

        self.emit_literals(&chunk[unencoded..], sink);
    }

    /// Better of the dictionary and target matches; the target wins ties.
    fn best_match(
        &self,
        space: &CombinedSpace<'_>,
        hash: u32,
        pos: usize,
        unencoded: usize,
    ) -> Option<Match> {
        let min = self.config.min_match;
        let dict = self
            .dictionary_index
            .find_best_match(space, hash, pos, unencoded, min);
        let target = self
            .target_index
            .find_best_match(space, hash, pos, unencoded, min);

        match (dict, target) {
            (Some(d), Some(t)) => Some(if t.len >= d.len { t } else { d }),
            (d, t) => t.or(d),
        }
    }

    /// Flush literals, turning embedded runs of `min_run` or more into RUN.
    fn emit_literals<S: InstructionSink>(&self, data: &[u8], sink: &mut S) {
        let mut start = 0;
        let mut i = 0;
        while i < data.len() {
            let run = find_run_length(&data[i..], data[i]);
            if run >= self.config.min_run {
                if start < i {
                    sink.add(&data[start..i]);
                }
                sink.run(data[i], run);
                start = i + run;
            }
            i += run;
        }
        if start < data.len() {
            sink.add(&data[start..]);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Op {
        Add(Vec<u8>),
        Run(u8, usize),
        Copy(u64, usize),
    }

    #[derive(Default)]
    struct Recorder {
        ops: Vec<Op>,
    }

    impl InstructionSink for Recorder {
        fn add(&mut self, data: &[u8]) {
            self.ops.push(Op::Add(data.to_vec()));
        }
        fn run(&mut self, byte: u8, len: usize) {
            self.ops.push(Op::Run(byte, len));
        }
        fn copy(&mut self, addr: u64, data: &[u8]) {
            self.ops.push(Op::Copy(addr, data.len()));
        }
    }

    /// Replay recorded instructions the way a decoder would.
    fn replay(dict: &[u8], ops: &[Op]) -> Vec<u8> {
        let mut out: Vec<u8> = Vec::new();
        for op in ops {
            match op {
                Op::Add(d) => out.extend_from_slice(d),
                Op::Run(b, n) => out.extend(std::iter::repeat_n(*b, *n)),
                Op::Copy(addr, n) => {
                    for k in 0..*n as u64 {
                        let a = (addr + k) as usize;
                        let b = if a < dict.len() { dict[a] } else { out[a - dict.len()] };
                        out.push(b);
                    }
                }
            }
        }
        out
    }

    fn encode(dict: &[u8], target: &[u8]) -> Vec<Op> {
        let mut engine = MatchEngine::new(MatcherConfig::default(), dict, target.len());
        let mut rec = Recorder::default();
        engine.encode_chunk(target, &mut rec);
        assert_eq!(replay(dict, &rec.ops), target);
        rec.ops
    }

    fn pseudo_random(len: usize, seed: u32) -> Vec<u8> {
        let mut x = seed.max(1);
        (0..len)
            .map(|_| {
                x ^= x << 13;
                x ^= x >> 17;
                x ^= x << 5;
                x as u8
            })
            .collect()
    }

    #[test]
    fn identical_input_is_one_copy() {
        let dict = pseudo_random(4096, 7);
        let ops = encode(&dict, &dict);
        assert_eq!(ops, [Op::Copy(0, 4096)]);
    }

    #[test]
    fn unrelated_input_is_one_add() {
        let dict = pseudo_random(512, 1);
        let target = pseudo_random(300, 99);
        let ops = encode(&dict, &target);
        assert_eq!(ops, [Op::Add(target)]);
    }

    #[test]
    fn short_tail_and_runs_in_literals() {
        let dict = b"unrelated dictionary bytes".to_vec();
        let mut target = b"ab".to_vec();
        target.extend([0u8; 12]);
        target.extend(b"cd");
        let ops = encode(&dict, &target);
        assert_eq!(
            ops,
            [
                Op::Add(b"ab".to_vec()),
                Op::Run(0, 12),
                Op::Add(b"cd".to_vec()),
            ]
        );
    }

    #[test]
    fn long_run_becomes_run() {
        let dict = pseudo_random(64, 3);
        let mut target = b"hello".to_vec();
        target.extend([0x41u8; 100]);
        let ops = encode(&dict, &target);
        assert_eq!(ops[0], Op::Add(target[..5].to_vec()));
        assert_eq!(ops[1], Op::Run(0x41, 100));
        assert_eq!(ops.len(), 2);
    }

    #[test]
    fn insertion_splits_into_two_copies() {
        let mut dict = pseudo_random(2048, 5);
        // Keep the match edges from extending into the inserted text.
        dict[999] = 0;
        dict[1000] = 0;
        let mut target = dict[..1000].to_vec();
        target.extend(b"INSERTED");
        target.extend_from_slice(&dict[1000..]);
        let ops = encode(&dict, &target);
        assert_eq!(ops.len(), 3, "{ops:?}");
        assert_eq!(ops[0], Op::Copy(0, 1000));
        assert_eq!(ops[1], Op::Add(b"INSERTED".to_vec()));
        assert_eq!(ops[2], Op::Copy(1000, 1048));
    }

    #[test]
    fn repeated_target_pattern_uses_self_copies() {
        let dict = pseudo_random(256, 21);
        let pattern = pseudo_random(50, 77);
        let target: Vec<u8> = pattern.iter().copied().cycle().take(50 * 1000).collect();
        let ops = encode(&dict, &target);
        let copied: usize = ops
            .iter()
            .map(|op| match op {
                Op::Copy(addr, n) => {
                    assert!(*addr >= dict.len() as u64);
                    *n
                }
                _ => 0,
            })
            .sum();
        assert!(copied > target.len() - 100, "copied only {copied}");
    }

    #[test]
    fn target_match_wins_tie() {
        // The same 32 bytes exist in the dictionary and earlier in the
        // target; both matches are equally long.
        let mut block = pseudo_random(32, 123);
        block[0] = 1;
        block[31] = 2;
        let mut dict = b"dictionary-head!".to_vec();
        dict.extend_from_slice(&block);
        let mut target = block.clone();
        target.extend(b"-separator-bytes");
        target.extend_from_slice(&block);
        let ops = encode(&dict, &target);
        let last = ops.last().unwrap();
        assert_eq!(*last, Op::Copy(dict.len() as u64, 32));
    }

    #[test]
    fn copies_never_reference_here_or_later() {
        let dict = pseudo_random(100, 8);
        let target = vec![7u8; 10]
            .into_iter()
            .chain(pseudo_random(200, 8))
            .chain(pseudo_random(200, 8))
            .collect::<Vec<_>>();
        let mut engine = MatchEngine::new(MatcherConfig::default(), &dict, target.len());
        let mut rec = Recorder::default();
        engine.encode_chunk(&target, &mut rec);

        let mut here = dict.len() as u64;
        for op in &rec.ops {
            match op {
                Op::Add(d) => here += d.len() as u64,
                Op::Run(_, n) => here += *n as u64,
                Op::Copy(addr, n) => {
                    assert!(*addr < here);
                    here += *n as u64;
                }
            }
        }
        assert_eq!(replay(&dict, &rec.ops), target);
    }

    #[test]
    fn engine_is_reusable_across_chunks() {
        let dict = pseudo_random(1024, 42);
        let mut engine = MatchEngine::new(MatcherConfig::default(), &dict, 256);
        for start in [0usize, 256, 512, 768] {
            let chunk = &dict[start..start + 256];
            let mut rec = Recorder::default();
            engine.encode_chunk(chunk, &mut rec);
            assert_eq!(rec.ops, [Op::Copy(start as u64, 256)]);
        }
    }

    #[test]
    fn empty_chunk_emits_nothing() {
        let dict = pseudo_random(64, 2);
        let ops = encode(&dict, &[]);
        assert!(ops.is_empty());
    }
}
