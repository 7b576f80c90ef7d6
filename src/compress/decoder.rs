// Streaming delta decoder.
//
// DeltaDecoder drives the window reader over a delta stream:
//   - The file header is validated once by start()
//   - Windows are decoded one at a time and written to any `impl Write`
//   - A window reaches the sink only after it fully validates
//   - Progress tracking (bytes decoded, windows decoded)

use std::io::{Read, Write};

use crate::hash::config::MAX_CHUNK_SIZE;
use crate::source::ByteSource;
use crate::vcdiff::code_table::CodeTable;
use crate::vcdiff::decoder::{DecodeError, WindowContext, WindowReader};
use crate::vcdiff::header::{FileHeader, Format, WindowHeader};

/// Default read step for interleaved window bodies.
pub const DEFAULT_READ_SIZE: usize = 64 * 1024;

// ---------------------------------------------------------------------------
// Options
// ---------------------------------------------------------------------------

/// Configuration for the delta decoder.
#[derive(Debug, Clone)]
pub struct DecodeOptions {
    /// Check per-window Adler-32 checksums when present.
    pub verify_checksum: bool,
    /// Bytes pulled from the reader per step for interleaved bodies.
    pub read_size: usize,
    /// Largest target window accepted.
    pub max_target_window: u64,
    /// Code table the delta was written with; `None` means the default.
    pub code_table: Option<CodeTable>,
}

impl Default for DecodeOptions {
    fn default() -> Self {
        Self {
            verify_checksum: true,
            read_size: DEFAULT_READ_SIZE,
            max_target_window: MAX_CHUNK_SIZE as u64,
            code_table: None,
        }
    }
}

impl DecodeOptions {
    pub fn with_verify_checksum(mut self, verify: bool) -> Self {
        self.verify_checksum = verify;
        self
    }

    pub fn with_read_size(mut self, read_size: usize) -> Self {
        self.read_size = read_size.max(1);
        self
    }

    pub fn with_code_table(mut self, table: CodeTable) -> Self {
        self.code_table = Some(table);
        self
    }
}

// ---------------------------------------------------------------------------
// DeltaDecoder
// ---------------------------------------------------------------------------

/// Streaming delta decoder with progress tracking.
///
/// Only one decoded window is in memory at a time.
pub struct DeltaDecoder<'d, R: Read> {
    reader: R,
    dictionary: &'d [u8],
    opts: DecodeOptions,
    format: Option<Format>,
    windows: WindowReader,
    bytes_decoded: u64,
    windows_decoded: u64,
}

impl<'d, R: Read> DeltaDecoder<'d, R> {
    pub fn new(dictionary: &'d [u8], reader: R, opts: DecodeOptions) -> Self {
        Self {
            reader,
            dictionary,
            opts,
            format: None,
            windows: WindowReader::new(),
            bytes_decoded: 0,
            windows_decoded: 0,
        }
    }

    /// Read and validate the file header.  Idempotent.
    pub fn start(&mut self) -> Result<Format, DecodeError> {
        if let Some(format) = self.format {
            return Ok(format);
        }
        let header = FileHeader::decode(&mut self.reader)?;
        log::debug!("delta format: {:?}", header.format);
        self.format = Some(header.format);
        Ok(header.format)
    }

    /// Layout of the stream, once started.
    pub fn format(&self) -> Option<Format> {
        self.format
    }

    /// Decode the next window, writing its output to `sink`.
    ///
    /// Returns `Some(window_size)` if a window was decoded, or `None` at the
    /// end of the stream.
    pub fn decode_next<W: Write>(&mut self, sink: &mut W) -> Result<Option<u64>, DecodeError> {
        let format = self.format.ok_or(DecodeError::NotStarted)?;
        let Some(header) = WindowHeader::decode(&mut self.reader)? else {
            return Ok(None);
        };
        header.validate(self.dictionary.len() as u64, self.opts.max_target_window)?;

        let table = match &self.opts.code_table {
            Some(table) => table,
            None => CodeTable::default_table(),
        };
        let ctx = WindowContext {
            dictionary: self.dictionary,
            format,
            table,
            verify_checksum: self.opts.verify_checksum,
            read_size: self.opts.read_size,
        };
        let window = self.windows.decode(&mut self.reader, &header, &ctx)?;
        sink.write_all(&window).map_err(DecodeError::Io)?;

        let window_size = window.len() as u64;
        log::debug!(
            "window {}: {} delta body bytes -> {window_size} target bytes",
            self.windows_decoded,
            header.body_len()
        );
        self.bytes_decoded += window_size;
        self.windows_decoded += 1;
        Ok(Some(window_size))
    }

    /// Decode all remaining windows into `sink`, starting the stream if
    /// needed.  Returns the total number of bytes decoded.
    pub fn decode_to<W: Write>(&mut self, sink: &mut W) -> Result<u64, DecodeError> {
        self.start()?;
        while self.decode_next(sink)?.is_some() {}
        Ok(self.bytes_decoded)
    }

    /// Total bytes decoded so far.
    pub fn bytes_decoded(&self) -> u64 {
        self.bytes_decoded
    }

    /// Number of windows decoded so far.
    pub fn windows_decoded(&self) -> u64 {
        self.windows_decoded
    }

    pub fn into_inner(self) -> R {
        self.reader
    }
}

// ---------------------------------------------------------------------------
// Convenience functions
// ---------------------------------------------------------------------------

/// Decode `delta` against `dictionary` into `sink`.
pub fn decode<D, R, W>(
    dictionary: &mut D,
    delta: R,
    mut sink: W,
    opts: &DecodeOptions,
) -> Result<u64, DecodeError>
where
    D: ByteSource + ?Sized,
    R: Read,
    W: Write,
{
    let owned = if dictionary.as_slice().is_none() {
        Some(dictionary.buffer_all()?)
    } else {
        None
    };
    let dict: &[u8] = match &owned {
        Some(buf) => buf.as_slice(),
        None => dictionary.as_slice().unwrap_or_default(),
    };

    let mut decoder = DeltaDecoder::new(dict, delta, opts.clone());
    let total = decoder.decode_to(&mut sink)?;
    sink.flush().map_err(DecodeError::Io)?;
    Ok(total)
}

/// Decode an in-memory delta.
pub fn decode_all(
    dictionary: &[u8],
    delta: &[u8],
    opts: &DecodeOptions,
) -> Result<Vec<u8>, DecodeError> {
    let mut out = Vec::new();
    DeltaDecoder::new(dictionary, delta, opts.clone()).decode_to(&mut out)?;
    Ok(out)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
