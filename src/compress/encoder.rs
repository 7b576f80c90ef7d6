// Streaming delta encoder.
//
// DeltaEncoder provides a streaming API for delta compression:
//   - The dictionary is indexed once upfront (MatchEngine reused across chunks)
//   - Target data is fed in pieces via write_target()
//   - Each full chunk becomes one window and is written immediately
//   - Only one target chunk is buffered at a time

use std::io::{self, Write};

use thiserror::Error;

use crate::hash::config::{DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE, MatcherConfig};
use crate::hash::matching::MatchEngine;
use crate::source::ByteSource;
use crate::vcdiff::code_table::{CodeTable, InstructionMap};
use crate::vcdiff::encoder::{WindowEncoder, WindowStats};
use crate::vcdiff::header::{FILE_HEADER_LEN, FileHeader, Format};

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the delta encoder.
#[derive(Debug, Clone)]
pub struct EncodeOptions {
    /// Target bytes per window.
    pub chunk_size: usize,
    /// Write the interleaved ('S') layout instead of three sections.
    pub interleaved: bool,
    /// Emit an Adler-32 checksum per window.
    pub checksum: bool,
    /// Instruction code table; `None` uses the RFC 3284 default.  The decoder
    /// must be given the same table.
    pub code_table: Option<CodeTable>,
}

impl Default for EncodeOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            interleaved: false,
            checksum: false,
            code_table: None,
        }
    }
}

impl EncodeOptions {
    /// Set the chunk size in MiB (1 through 64).
    pub fn with_chunk_size_mib(self, mib: usize) -> Result<Self, EncodeError> {
        if !(1..=MAX_CHUNK_SIZE >> 20).contains(&mib) {
            return Err(EncodeError::InvalidOptions(format!(
                "chunk size must be 1..={} MiB, got {mib}",
                MAX_CHUNK_SIZE >> 20
            )));
        }
        self.with_chunk_size(mib << 20)
    }

    /// Set the chunk size in bytes.
    pub fn with_chunk_size(mut self, bytes: usize) -> Result<Self, EncodeError> {
        self.chunk_size = bytes;
        self.validate()?;
        Ok(self)
    }

    pub fn with_interleaved(mut self, interleaved: bool) -> Self {
        self.interleaved = interleaved;
        self
    }

    pub fn with_checksum(mut self, checksum: bool) -> Self {
        self.checksum = checksum;
        self
    }

    pub fn with_code_table(mut self, table: CodeTable) -> Self {
        self.code_table = Some(table);
        self
    }

    /// Layout the options select.
    pub fn format(&self) -> Format {
        if self.interleaved {
            Format::Interleaved
        } else {
            Format::Standard
        }
    }

    fn validate(&self) -> Result<(), EncodeError> {
        if self.chunk_size == 0 || self.chunk_size > MAX_CHUNK_SIZE {
            return Err(EncodeError::InvalidOptions(format!(
                "chunk size must be 1..={MAX_CHUNK_SIZE} bytes, got {}",
                self.chunk_size
            )));
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Errors and stats
// ---------------------------------------------------------------------------

#[derive(Debug, Error)]
pub enum EncodeError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("dictionary is empty")]
    EmptyDictionary,
    #[error("target is empty")]
    EmptyTarget,
    #[error("invalid options: {0}")]
    InvalidOptions(String),
}

/// Totals for one encoding session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EncodeStats {
    pub windows: u64,
    pub target_bytes: u64,
    /// Bytes written to the sink, file header included.
    pub delta_bytes: u64,
    pub instructions: WindowStats,
}

// ---------------------------------------------------------------------------
// DeltaEncoder
// ---------------------------------------------------------------------------

/// Streaming delta encoder.
///
/// Indexes the dictionary once upfront, then processes target data in
/// chunks.  The file header is written together with the first window, so a
/// session that never sees target bytes writes nothing.
///
/// # Example
/// ```no_run
/// use vcdelta::compress::encoder::{DeltaEncoder, EncodeOptions};
/// let dictionary = b"original data";
/// let mut output = Vec::new();
/// let mut enc = DeltaEncoder::new(&mut output, dictionary, EncodeOptions::default()).unwrap();
/// enc.write_target(b"modified data").unwrap();
/// enc.finish().unwrap();
/// ```
pub struct DeltaEncoder<'d, W: Write> {
    writer: W,
    engine: MatchEngine<'d>,
    map: InstructionMap,
    format: Format,
    checksum: bool,
    chunk_size: usize,
    buffer: Vec<u8>,
    header_written: bool,
    stats: EncodeStats,
}

impl<'d, W: Write> DeltaEncoder<'d, W> {
    /// Create a new streaming encoder and index `dictionary`.
    pub fn new(writer: W, dictionary: &'d [u8], opts: EncodeOptions) -> Result<Self, EncodeError> {
        if dictionary.is_empty() {
            return Err(EncodeError::EmptyDictionary);
        }
        opts.validate()?;

        let table = match &opts.code_table {
            Some(table) => table,
            None => CodeTable::default_table(),
        };
        let map = InstructionMap::new(table);
        let engine = MatchEngine::new(MatcherConfig::default(), dictionary, opts.chunk_size);

        Ok(Self {
            writer,
            engine,
            map,
            format: opts.format(),
            checksum: opts.checksum,
            chunk_size: opts.chunk_size,
            buffer: Vec::new(),
            header_written: false,
            stats: EncodeStats::default(),
        })
    }

    /// Feed target data to the encoder.
    ///
    /// Data is buffered internally.  Whenever the buffer reaches the chunk
    /// size, a complete window is encoded and written to the output.
    pub fn write_target(&mut self, data: &[u8]) -> Result<(), EncodeError> {
        let mut offset = 0usize;

        // Complete a partially buffered chunk first.
        if !self.buffer.is_empty() {
            let need = self.chunk_size - self.buffer.len();
            let take = need.min(data.len());
            self.buffer.extend_from_slice(&data[..take]);
            offset += take;

            if self.buffer.len() == self.chunk_size {
                let chunk = std::mem::take(&mut self.buffer);
                self.encode_window(&chunk)?;
                self.buffer = chunk;
                self.buffer.clear();
            }
        }

        // Fast path: encode full chunks directly from caller-provided input.
        while offset + self.chunk_size <= data.len() {
            let end = offset + self.chunk_size;
            self.encode_window(&data[offset..end])?;
            offset = end;
        }

        if offset < data.len() {
            self.buffer.extend_from_slice(&data[offset..]);
        }

        Ok(())
    }

    /// Flush the trailing partial chunk and return the writer with the
    /// session totals.
    pub fn finish(mut self) -> Result<(W, EncodeStats), EncodeError> {
        if !self.buffer.is_empty() {
            let rest = std::mem::take(&mut self.buffer);
            self.encode_window(&rest)?;
        }
        if self.stats.windows == 0 {
            return Err(EncodeError::EmptyTarget);
        }
        self.writer.flush()?;
        Ok((self.writer, self.stats))
    }

    /// Totals so far.
    pub fn stats(&self) -> &EncodeStats {
        &self.stats
    }

    fn encode_window(&mut self, chunk: &[u8]) -> Result<(), EncodeError> {
        if !self.header_written {
            FileHeader::new(self.format).encode(&mut self.writer)?;
            self.header_written = true;
            self.stats.delta_bytes += FILE_HEADER_LEN as u64;
        }

        let dictionary_len = self.engine.dictionary().len() as u64;
        let mut we = WindowEncoder::new(&self.map, self.format, dictionary_len, self.checksum);
        self.engine.encode_chunk(chunk, &mut we);
        let window_stats = *we.stats();
        let bytes = we.finish();
        self.writer.write_all(&bytes)?;

        log::debug!(
            "window {}: {} target bytes -> {} delta bytes ({} adds, {} runs, {} copies)",
            self.stats.windows,
            chunk.len(),
            bytes.len(),
            window_stats.adds,
            window_stats.runs,
            window_stats.copies
        );

        self.stats.windows += 1;
        self.stats.target_bytes += chunk.len() as u64;
        self.stats.delta_bytes += bytes.len() as u64;
        self.stats.instructions.merge(&window_stats);
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Encode `target` against `dictionary` into `sink`.
///
/// Both sources are read from position 0.  Empty inputs are rejected before
/// anything is written.
pub fn encode<D, T, W>(
    dictionary: &mut D,
    target: &mut T,
    sink: W,
    opts: &EncodeOptions,
) -> Result<EncodeStats, EncodeError>
where
    D: ByteSource + ?Sized,
    T: ByteSource + ?Sized,
    W: Write,
{
    if dictionary.is_empty() {
        return Err(EncodeError::EmptyDictionary);
    }
    if target.is_empty() {
        return Err(EncodeError::EmptyTarget);
    }
    opts.validate()?;

    let owned = if dictionary.as_slice().is_none() {
        Some(dictionary.buffer_all()?)
    } else {
        None
    };
    let dict: &[u8] = match &owned {
        Some(buf) => buf.as_slice(),
        None => dictionary.as_slice().unwrap_or_default(),
    };

    let mut enc = DeltaEncoder::new(sink, dict, opts.clone())?;
    target.set_position(0)?;
    let step = usize::try_from(target.len()).map_or(opts.chunk_size, |n| n.min(opts.chunk_size));
    let mut buf = vec![0u8; step];
    loop {
        match target.read_bounded(&mut buf)? {
            0 => break,
            n => enc.write_target(&buf[..n])?,
        }
    }
    let (_, stats) = enc.finish()?;
    Ok(stats)
}

/// Encode in-memory inputs and return the delta.
pub fn encode_all(
    dictionary: &[u8],
    target: &[u8],
    opts: &EncodeOptions,
) -> Result<Vec<u8>, EncodeError> {
    if dictionary.is_empty() {
        return Err(EncodeError::EmptyDictionary);
    }
    if target.is_empty() {
        return Err(EncodeError::EmptyTarget);
    }
    let mut enc = DeltaEncoder::new(Vec::new(), dictionary, opts.clone())?;
    enc.write_target(target)?;
    let (out, _) = enc.finish()?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::MemorySource;
    use crate::vcdiff::header::{SDCH_VERSION, VCDIFF_MAGIC};

    #[test]
    fn options_defaults_and_builders() {
        let opts = EncodeOptions::default();
        assert_eq!(opts.chunk_size, 1 << 20);
        assert_eq!(opts.format(), Format::Standard);
        assert!(!opts.checksum);

        let opts = opts.with_chunk_size_mib(4).unwrap().with_interleaved(true);
        assert_eq!(opts.chunk_size, 4 << 20);
        assert_eq!(opts.format(), Format::Interleaved);

        assert!(EncodeOptions::default().with_chunk_size_mib(0).is_err());
        assert!(EncodeOptions::default().with_chunk_size_mib(65).is_err());
        assert!(EncodeOptions::default().with_chunk_size(0).is_err());
        assert_eq!(EncodeOptions::default().with_chunk_size(1).unwrap().chunk_size, 1);
    }

    #[test]
    fn empty_inputs_write_nothing() {
        let mut out = Vec::new();
        let err = encode(
            &mut MemorySource::new(b""),
            &mut MemorySource::new(b"target"),
            &mut out,
            &EncodeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::EmptyDictionary));

        let err = encode(
            &mut MemorySource::new(b"dictionary"),
            &mut MemorySource::new(b""),
            &mut out,
            &EncodeOptions::default(),
        )
        .unwrap_err();
        assert!(matches!(err, EncodeError::EmptyTarget));
        assert!(out.is_empty());

        let enc = DeltaEncoder::new(&mut out, b"dictionary", EncodeOptions::default()).unwrap();
        assert!(matches!(enc.finish(), Err(EncodeError::EmptyTarget)));
        assert!(out.is_empty());
    }

    #[test]
    fn header_carries_the_format_byte() {
        let delta = encode_all(b"dictionary", b"target", &EncodeOptions::default()).unwrap();
        assert_eq!(&delta[..3], &VCDIFF_MAGIC);
        assert_eq!(delta[3], 0);
        assert_eq!(delta[4], 0);

        let opts = EncodeOptions::default().with_interleaved(true);
        let delta = encode_all(b"dictionary", b"target", &opts).unwrap();
        assert_eq!(delta[3], SDCH_VERSION);
    }

    #[test]
    fn one_window_per_chunk() {
        let dictionary = b"the quick brown fox jumps over the lazy dog";
        let target: Vec<u8> = (0..1000u32).map(|i| (i % 251) as u8).collect();
        let opts = EncodeOptions::default().with_chunk_size(300).unwrap();

        let mut out = Vec::new();
        let stats = encode(
            &mut MemorySource::new(dictionary),
            &mut MemorySource::new(&target),
            &mut out,
            &opts,
        )
        .unwrap();
        assert_eq!(stats.windows, 4);
        assert_eq!(stats.target_bytes, 1000);
        assert_eq!(stats.delta_bytes, out.len() as u64);
    }

    #[test]
    fn streaming_pieces_match_one_shot() {
        let dictionary: Vec<u8> = (0..4096u32).map(|i| (i * 7 % 256) as u8).collect();
        let mut target = dictionary.clone();
        target[100..110].copy_from_slice(b"0123456789");
        let opts = EncodeOptions::default().with_chunk_size(1000).unwrap();

        let one_shot = encode_all(&dictionary, &target, &opts).unwrap();

        let mut enc = DeltaEncoder::new(Vec::new(), &dictionary, opts).unwrap();
        for piece in target.chunks(333) {
            enc.write_target(piece).unwrap();
        }
        let (streamed, stats) = enc.finish().unwrap();
        assert_eq!(streamed, one_shot);
        assert_eq!(stats.windows, 5);
    }

    #[test]
    fn identical_input_is_mostly_copies() {
        let dictionary: Vec<u8> = (0..10_000u32).map(|i| (i.wrapping_mul(31) >> 3) as u8).collect();
        let delta = encode_all(&dictionary, &dictionary, &EncodeOptions::default()).unwrap();
        assert!(delta.len() < 64, "delta is {} bytes", delta.len());
    }
}
