// VCDIFF window encoder: instruction encoding and window emission.
//
// Collects the ADD/RUN/COPY stream produced by the matcher for one window,
// chooses opcodes through an `InstructionMap`, encodes COPY addresses with the
// window's address cache and lays the result out either as three sections
// (standard) or as a single instruction section (interleaved).

use simd_adler32::Adler32;

use super::address_cache::AddressCache;
use super::code_table::{Instruction, InstructionMap};
use super::header::{Format, SourceSegment, WindowHeader};
use super::varint;
use crate::hash::matching::InstructionSink;

/// Per-window instruction counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WindowStats {
    pub adds: u64,
    pub runs: u64,
    pub copies: u64,
    pub add_bytes: u64,
    pub run_bytes: u64,
    pub copy_bytes: u64,
}

impl WindowStats {
    pub fn merge(&mut self, other: &WindowStats) {
        self.adds += other.adds;
        self.runs += other.runs;
        self.copies += other.copies;
        self.add_bytes += other.add_bytes;
        self.run_bytes += other.run_bytes;
        self.copy_bytes += other.copy_bytes;
    }
}

/// Accumulates instructions for a single window and emits encoded bytes.
pub struct WindowEncoder<'m> {
    map: &'m InstructionMap,
    format: Format,
    /// DATA section: literal bytes for ADD and RUN (standard layout only).
    data: Vec<u8>,
    /// INST section: opcodes and explicit sizes, plus every payload in the
    /// interleaved layout.
    inst: Vec<u8>,
    /// ADDR section: encoded COPY addresses (standard layout only).
    addr: Vec<u8>,
    cache: AddressCache,
    /// Offset in `inst` of the last implicit-size single opcode, which the
    /// next instruction may fold into a double.
    last_opcode: Option<usize>,
    dictionary_len: u64,
    target_len: u64,
    checksum: Option<Adler32>,
    stats: WindowStats,
}

impl<'m> WindowEncoder<'m> {
    /// Start a window that copies from the whole dictionary.
    pub fn new(map: &'m InstructionMap, format: Format, dictionary_len: u64, checksum: bool) -> Self {
        Self {
            map,
            format,
            data: Vec::new(),
            inst: Vec::new(),
            addr: Vec::new(),
            cache: map.address_cache(),
            last_opcode: None,
            dictionary_len,
            target_len: 0,
            checksum: checksum.then(Adler32::new),
            stats: WindowStats::default(),
        }
    }

    /// Current position in the combined dictionary + target address space.
    #[inline]
    pub fn here(&self) -> u64 {
        self.dictionary_len + self.target_len
    }

    /// Target bytes described so far.
    #[inline]
    pub fn target_len(&self) -> u64 {
        self.target_len
    }

    #[inline]
    pub fn stats(&self) -> &WindowStats {
        &self.stats
    }

    /// Finalize the window and return header + sections.
    pub fn finish(self) -> Vec<u8> {
        let source = (self.dictionary_len > 0).then_some(SourceSegment {
            len: self.dictionary_len,
            pos: 0,
        });
        let header = WindowHeader::for_sections(
            source,
            self.target_len,
            (
                self.data.len() as u64,
                self.inst.len() as u64,
                self.addr.len() as u64,
            ),
            self.checksum.map(|h| h.finish()),
        );

        let mut out = Vec::with_capacity(32 + self.data.len() + self.inst.len() + self.addr.len());
        header.push_to(&mut out);
        out.extend_from_slice(&self.data);
        out.extend_from_slice(&self.inst);
        out.extend_from_slice(&self.addr);
        out
    }

    #[inline]
    fn data_out(&mut self) -> &mut Vec<u8> {
        match self.format {
            Format::Standard => &mut self.data,
            Format::Interleaved => &mut self.inst,
        }
    }

    #[inline]
    fn addr_out(&mut self) -> &mut Vec<u8> {
        match self.format {
            Format::Standard => &mut self.addr,
            Format::Interleaved => &mut self.inst,
        }
    }

    /// Write the opcode (and explicit size) for `inst`, folding it into the
    /// previous opcode when the table has a matching double.
    fn emit_opcode(&mut self, inst: Instruction) {
        if let Some(at) = self.last_opcode.take()
            && let Some(double) = self.map.double(self.inst[at], &inst)
        {
            self.inst[at] = double;
            return;
        }

        let single = self.map.single(&inst);
        let at = self.inst.len();
        self.inst.push(single.opcode);
        if single.explicit_size {
            varint::push_u64(&mut self.inst, u64::from(inst.size()));
        } else {
            self.last_opcode = Some(at);
        }
    }
}

impl InstructionSink for WindowEncoder<'_> {
    fn add(&mut self, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        self.emit_opcode(Instruction::Add {
            size: data.len() as u32,
        });
        self.data_out().extend_from_slice(data);
        if let Some(h) = self.checksum.as_mut() {
            h.write(data);
        }
        self.target_len += data.len() as u64;
        self.stats.adds += 1;
        self.stats.add_bytes += data.len() as u64;
    }

    fn run(&mut self, byte: u8, len: usize) {
        if len == 0 {
            return;
        }
        self.emit_opcode(Instruction::Run { size: len as u32 });
        self.data_out().push(byte);
        if let Some(h) = self.checksum.as_mut() {
            let block = [byte; 256];
            let mut left = len;
            while left > 0 {
                let n = left.min(block.len());
                h.write(&block[..n]);
                left -= n;
            }
        }
        self.target_len += len as u64;
        self.stats.runs += 1;
        self.stats.run_bytes += len as u64;
    }

    fn copy(&mut self, addr: u64, data: &[u8]) {
        if data.is_empty() {
            return;
        }
        let here = self.here();
        let (mode, encoded) = self.cache.encode(addr, here);
        self.emit_opcode(Instruction::Copy {
            size: data.len() as u32,
            mode,
        });
        self.addr_out().extend_from_slice(encoded.as_bytes());
        if let Some(h) = self.checksum.as_mut() {
            h.write(data);
        }
        self.target_len += data.len() as u64;
        self.stats.copies += 1;
        self.stats.copy_bytes += data.len() as u64;
        log::trace!("COPY {} bytes from {addr} (mode {mode})", data.len());
    }
}
