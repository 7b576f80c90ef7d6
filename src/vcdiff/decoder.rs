// VCDIFF decoder: instruction replay and window reconstruction.
//
// `BodyDecoder` replays one window's instructions against the dictionary
// segment and the bytes the window has produced so far.  Standard windows
// are decoded from three complete sections.  Interleaved windows are decoded
// from a single buffer that may end in the middle of an instruction; the
// decoder then rolls back to the start of that half-instruction and reports
// that it needs more input.
//
// `WindowReader` pulls a window body off a byte stream, feeding interleaved
// bodies to the `BodyDecoder` in `read_size` pieces.

use std::io::{self, Read};

use simd_adler32::Adler32;
use thiserror::Error;

use super::address_cache::{AddressCache, AddressCacheError};
use super::code_table::{CodeTable, Instruction};
use super::header::{Format, WindowHeader};
use super::instructions::InstructionDecoder;

#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("I/O error: {0}")]
    Io(io::Error),

    #[error("delta stream ended unexpectedly")]
    Truncated,

    #[error("not a VCDIFF stream: magic {0:02X?}")]
    InvalidMagic([u8; 3]),

    #[error("unsupported VCDIFF version byte {0:#04X}")]
    UnsupportedVersion(u8),

    #[error("unsupported header indicator {0:#04X}")]
    UnsupportedHeaderIndicator(u8),

    #[error("invalid window header: {0}")]
    InvalidWindow(String),

    #[error("windows copying from earlier target data are not supported")]
    UnsupportedTargetWindow,

    #[error("source segment {pos}+{len} exceeds dictionary of {dictionary_len} bytes")]
    SourceSegmentOutOfRange {
        pos: u64,
        len: u64,
        dictionary_len: u64,
    },

    #[error("target window of {len} bytes exceeds the {max} byte limit")]
    WindowTooLarge { len: u64, max: u64 },

    #[error("invalid instruction: {0}")]
    InvalidInstruction(String),

    #[error("COPY address out of range")]
    AddressOutOfRange,

    #[error("window decoded to {actual} bytes, header declares {expected}")]
    LengthMismatch { expected: u64, actual: u64 },

    #[error("checksum mismatch: expected {expected:#010X}, got {actual:#010X}")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("delta header has not been read; call start() first")]
    NotStarted,
}

impl From<io::Error> for DecodeError {
    fn from(e: io::Error) -> Self {
        if e.kind() == io::ErrorKind::UnexpectedEof {
            DecodeError::Truncated
        } else {
            DecodeError::Io(e)
        }
    }
}

impl From<AddressCacheError> for DecodeError {
    fn from(e: AddressCacheError) -> Self {
        match e {
            AddressCacheError::Underflow => DecodeError::Truncated,
            AddressCacheError::OutOfRange => DecodeError::AddressOutOfRange,
            AddressCacheError::Overflow => {
                DecodeError::InvalidInstruction("COPY address varint overflow".into())
            }
        }
    }
}

/// Where a window body decode stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BodyStatus {
    /// Every byte handed in was consumed at an instruction boundary.
    Drained,
    /// The bytes end inside an instruction; feed more and call again.
    NeedInput,
}

/// Replays one window's instructions.
pub struct BodyDecoder<'a> {
    /// The window's source segment of the dictionary.
    segment: &'a [u8],
    target_len: usize,
    out: Vec<u8>,
    insts: InstructionDecoder<'a>,
    cache: AddressCache,
}

impl<'a> BodyDecoder<'a> {
    pub fn new(segment: &'a [u8], target_len: usize, table: &'a CodeTable) -> Self {
        Self {
            segment,
            target_len,
            out: Vec::with_capacity(target_len),
            insts: InstructionDecoder::new(table),
            cache: AddressCache::with_sizes(table.near_size(), table.same_size()),
        }
    }

    /// Bytes produced so far.
    pub fn output(&self) -> &[u8] {
        &self.out
    }

    /// Decode a standard window from its complete sections.
    pub fn decode_standard(
        &mut self,
        data: &[u8],
        inst: &[u8],
        addr: &[u8],
    ) -> Result<(), DecodeError> {
        let (mut dp, mut ip, mut ap) = (0usize, 0usize, 0usize);

        while let Some(instruction) = self.insts.next(inst, &mut ip)? {
            let payload = match instruction {
                Instruction::Copy { .. } => &addr[ap..],
                _ => &data[dp..],
            };
            let consumed = self
                .execute(instruction, payload)?
                .ok_or(DecodeError::Truncated)?;
            match instruction {
                Instruction::Copy { .. } => ap += consumed,
                _ => dp += consumed,
            }
        }

        if ip != inst.len() || self.insts.has_pending() {
            return Err(DecodeError::Truncated);
        }
        if dp != data.len() || ap != addr.len() {
            return Err(DecodeError::InvalidInstruction(format!(
                "{} data and {} address bytes left unused",
                data.len() - dp,
                addr.len() - ap
            )));
        }
        Ok(())
    }

    /// Decode as much of an interleaved body as `buf[*pos..]` allows.
    ///
    /// On return `*pos` sits on an instruction boundary: either the end of
    /// the buffer or the start of a half-instruction whose bytes are not all
    /// present yet.  Bytes before `*pos` are no longer needed.
    pub fn decode_interleaved(
        &mut self,
        buf: &[u8],
        pos: &mut usize,
    ) -> Result<BodyStatus, DecodeError> {
        loop {
            let snapshot = (*pos, self.insts);
            let Some(instruction) = self.insts.next(buf, pos)? else {
                return Ok(if *pos == buf.len() && !self.insts.has_pending() {
                    BodyStatus::Drained
                } else {
                    BodyStatus::NeedInput
                });
            };
            match self.execute(instruction, &buf[*pos..])? {
                Some(consumed) => *pos += consumed,
                None => {
                    (*pos, self.insts) = snapshot;
                    return Ok(BodyStatus::NeedInput);
                }
            }
        }
    }

    /// Check the window's length and checksum and hand over its bytes.
    pub fn finish(self, checksum: Option<u32>) -> Result<Vec<u8>, DecodeError> {
        if self.out.len() != self.target_len {
            return Err(DecodeError::LengthMismatch {
                expected: self.target_len as u64,
                actual: self.out.len() as u64,
            });
        }
        if let Some(expected) = checksum {
            let mut hasher = Adler32::new();
            hasher.write(&self.out);
            let actual = hasher.finish();
            if actual != expected {
                return Err(DecodeError::ChecksumMismatch { expected, actual });
            }
        }
        Ok(self.out)
    }

    /// Execute one instruction whose payload starts at `payload[0]`.
    ///
    /// Returns the number of payload bytes consumed, or `None` when the
    /// payload is incomplete.  Nothing is mutated in that case.
    fn execute(
        &mut self,
        instruction: Instruction,
        payload: &[u8],
    ) -> Result<Option<usize>, DecodeError> {
        let size = instruction.size() as usize;
        if size > self.target_len - self.out.len() {
            return Err(DecodeError::InvalidInstruction(format!(
                "{instruction:?} overruns the {} byte target window",
                self.target_len
            )));
        }

        match instruction {
            Instruction::Add { .. } => {
                let Some(bytes) = payload.get(..size) else {
                    return Ok(None);
                };
                self.out.extend_from_slice(bytes);
                Ok(Some(size))
            }
            Instruction::Run { .. } => {
                let Some(&byte) = payload.first() else {
                    return Ok(None);
                };
                self.out.resize(self.out.len() + size, byte);
                Ok(Some(1))
            }
            Instruction::Copy { mode, .. } => {
                let here = (self.segment.len() + self.out.len()) as u64;
                let (addr, consumed) = match self.cache.decode(mode, payload, here) {
                    Ok(v) => v,
                    Err(AddressCacheError::Underflow) => return Ok(None),
                    Err(e) => return Err(e.into()),
                };
                self.copy(addr as usize, size);
                Ok(Some(consumed))
            }
        }
    }

    /// COPY `size` bytes from `addr` in the combined address space.  The
    /// dictionary part is served first, then the target part.
    fn copy(&mut self, addr: usize, size: usize) {
        let seg_len = self.segment.len();
        let mut left = size;
        let mut target_addr = 0;

        if addr < seg_len {
            let n = left.min(seg_len - addr);
            self.out.extend_from_slice(&self.segment[addr..addr + n]);
            left -= n;
        } else {
            target_addr = addr - seg_len;
        }

        if left == 0 {
            return;
        }
        if target_addr + left <= self.out.len() {
            self.out.extend_from_within(target_addr..target_addr + left);
        } else {
            // Overlapping copy: later bytes repeat earlier output.
            for i in target_addr..target_addr + left {
                let byte = self.out[i];
                self.out.push(byte);
            }
        }
    }
}

/// Settings a `WindowReader` needs from the session.
#[derive(Debug, Clone, Copy)]
pub struct WindowContext<'a> {
    pub dictionary: &'a [u8],
    pub format: Format,
    pub table: &'a CodeTable,
    pub verify_checksum: bool,
    /// Bytes read per step when streaming an interleaved body.
    pub read_size: usize,
}

/// Reads window bodies off a stream, reusing its section buffers.
#[derive(Debug, Default)]
pub struct WindowReader {
    data: Vec<u8>,
    inst: Vec<u8>,
    addr: Vec<u8>,
}

impl WindowReader {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the body that follows `header` and return the window's bytes.
    pub fn decode<R: Read>(
        &mut self,
        reader: &mut R,
        header: &WindowHeader,
        ctx: &WindowContext<'_>,
    ) -> Result<Vec<u8>, DecodeError> {
        let segment = match header.source_segment {
            Some(seg) => seg
                .pos
                .checked_add(seg.len)
                .filter(|&end| end <= ctx.dictionary.len() as u64)
                .map(|end| &ctx.dictionary[seg.pos as usize..end as usize])
                .ok_or(DecodeError::SourceSegmentOutOfRange {
                    pos: seg.pos,
                    len: seg.len,
                    dictionary_len: ctx.dictionary.len() as u64,
                })?,
            None => &[],
        };
        let target_len = usize::try_from(header.target_window_len).map_err(|_| {
            DecodeError::WindowTooLarge {
                len: header.target_window_len,
                max: usize::MAX as u64,
            }
        })?;

        let mut body = BodyDecoder::new(segment, target_len, ctx.table);

        if ctx.format == Format::Interleaved && header.has_interleaved_body() {
            self.stream_interleaved(reader, header.inst_len, ctx.read_size.max(1), &mut body)?;
        } else {
            read_section(reader, header.data_len, &mut self.data)?;
            read_section(reader, header.inst_len, &mut self.inst)?;
            read_section(reader, header.addr_len, &mut self.addr)?;
            body.decode_standard(&self.data, &self.inst, &self.addr)?;
        }

        let checksum = header.adler32.filter(|_| ctx.verify_checksum);
        body.finish(checksum)
    }

    fn stream_interleaved<R: Read>(
        &mut self,
        reader: &mut R,
        inst_len: u64,
        read_size: usize,
        body: &mut BodyDecoder<'_>,
    ) -> Result<(), DecodeError> {
        self.inst.clear();
        let mut remaining = inst_len;
        let mut status = BodyStatus::Drained;

        while remaining > 0 {
            let step = remaining.min(read_size as u64);
            let start = self.inst.len();
            let got = reader.by_ref().take(step).read_to_end(&mut self.inst)?;
            if (got as u64) < step {
                return Err(DecodeError::Truncated);
            }
            debug_assert_eq!(self.inst.len(), start + got);
            remaining -= step;

            let mut pos = 0;
            status = body.decode_interleaved(&self.inst, &mut pos)?;
            self.inst.drain(..pos);
        }

        if status == BodyStatus::NeedInput {
            return Err(DecodeError::Truncated);
        }
        Ok(())
    }
}

/// Read exactly `len` bytes into `buf` without trusting `len` for the
/// allocation size.
fn read_section<R: Read>(reader: &mut R, len: u64, buf: &mut Vec<u8>) -> Result<(), DecodeError> {
    buf.clear();
    let got = reader.by_ref().take(len).read_to_end(buf)?;
    if (got as u64) < len {
        return Err(DecodeError::Truncated);
    }
    Ok(())
}
