// Instruction stream decoding.
//
// Turns opcode bytes (plus explicit sizes) back into ADD/RUN/COPY
// instructions using a code table.  The decoder never owns the bytes: callers
// hand it the instruction buffer and a cursor on every call, which lets the
// interleaved body decoder grow and compact its buffer between calls.

use super::code_table::{CodeTable, InstKind, Instruction};
use super::decoder::DecodeError;
use super::varint::{self, VarIntError};

/// Second half of a double opcode that has not been returned yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct PendingHalf {
    kind: InstKind,
    size: u8,
    mode: u8,
}

/// Stateful opcode reader.
///
/// `Copy` so that a caller can snapshot it before decoding an instruction and
/// roll back if the instruction's payload turns out to be incomplete.
#[derive(Debug, Clone, Copy)]
pub struct InstructionDecoder<'t> {
    table: &'t CodeTable,
    pending: Option<PendingHalf>,
}

impl<'t> InstructionDecoder<'t> {
    pub fn new(table: &'t CodeTable) -> Self {
        Self {
            table,
            pending: None,
        }
    }

    /// Forget any pending half-instruction.  Done at every window start.
    pub fn reset(&mut self) {
        self.pending = None;
    }

    /// True when a double opcode has been consumed but its second half has
    /// not been returned yet.
    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    /// Decode the next instruction from `inst[*pos..]`.
    ///
    /// - `Ok(Some(_))`: `*pos` is advanced past the opcode and any explicit
    ///   size.
    /// - `Ok(None)`: end of data.  Either nothing is left, or the bytes for
    ///   the next half-instruction are incomplete; `*pos` is left at the start
    ///   of that half-instruction and a pending second half is kept.
    /// - `Err(_)`: the stream is malformed.
    pub fn next(
        &mut self,
        inst: &[u8],
        pos: &mut usize,
    ) -> Result<Option<Instruction>, DecodeError> {
        if let Some(half) = self.pending {
            let Some((size, consumed)) = read_size(half.size, &inst[*pos..])? else {
                return Ok(None);
            };
            *pos += consumed;
            self.pending = None;
            return Ok(Instruction::from_half(half.kind, size, half.mode));
        }

        let mut cursor = *pos;
        loop {
            let Some(&opcode) = inst.get(cursor) else {
                return Ok(None);
            };
            let entry = self.table.entry(opcode);

            let (first, second) = match (entry.inst1, entry.inst2) {
                (InstKind::Noop, InstKind::Noop) => {
                    // NOOP/NOOP opcodes carry nothing.
                    cursor += 1;
                    *pos = cursor;
                    continue;
                }
                (InstKind::Noop, kind) => ((kind, entry.size2, entry.mode2), None),
                (kind, InstKind::Noop) => ((kind, entry.size1, entry.mode1), None),
                (kind, kind2) => (
                    (kind, entry.size1, entry.mode1),
                    Some(PendingHalf {
                        kind: kind2,
                        size: entry.size2,
                        mode: entry.mode2,
                    }),
                ),
            };

            let Some((size, consumed)) = read_size(first.1, &inst[cursor + 1..])? else {
                return Ok(None);
            };
            *pos = cursor + 1 + consumed;
            self.pending = second;
            return Ok(Instruction::from_half(first.0, size, first.2));
        }
    }
}

/// Resolve a table size, reading an explicit varint when it is zero.
/// `Ok(None)` means the varint is incomplete.
#[inline]
fn read_size(table_size: u8, data: &[u8]) -> Result<Option<(u32, usize)>, DecodeError> {
    if table_size != 0 {
        return Ok(Some((u32::from(table_size), 0)));
    }
    match varint::read_u32(data) {
        Ok(v) => Ok(Some(v)),
        Err(VarIntError::Underflow) => Ok(None),
        Err(VarIntError::Overflow) => Err(DecodeError::InvalidInstruction(
            "instruction size does not fit in 32 bits".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vcdiff::code_table::CodeTableEntry;

    fn decode_all(bytes: &[u8]) -> Vec<Instruction> {
        let mut dec = InstructionDecoder::new(CodeTable::default_table());
        let mut pos = 0;
        let mut out = Vec::new();
        while let Some(inst) = dec.next(bytes, &mut pos).unwrap() {
            out.push(inst);
        }
        assert_eq!(pos, bytes.len());
        out
    }

    #[test]
    fn implicit_and_explicit_sizes() {
        // ADD(5), RUN explicit 300, COPY explicit 20 mode 1
        let bytes = [6, 0, 0x82, 0x2C, 35, 20];
        assert_eq!(
            decode_all(&bytes),
            [
                Instruction::Add { size: 5 },
                Instruction::Run { size: 300 },
                Instruction::Copy { size: 20, mode: 1 },
            ]
        );
    }

    #[test]
    fn double_opcode_yields_two_instructions() {
        // 163 = ADD(1) + COPY(4, mode 0); 255 = COPY(4, mode 8) + ADD(1)
        assert_eq!(
            decode_all(&[163, 255]),
            [
                Instruction::Add { size: 1 },
                Instruction::Copy { size: 4, mode: 0 },
                Instruction::Copy { size: 4, mode: 8 },
                Instruction::Add { size: 1 },
            ]
        );
    }

    #[test]
    fn truncated_size_rewinds_to_opcode() {
        let mut dec = InstructionDecoder::new(CodeTable::default_table());
        let mut pos = 0;
        let bytes = [6, 1, 0x82];
        assert_eq!(dec.next(&bytes, &mut pos).unwrap(), Some(Instruction::Add { size: 5 }));
        assert_eq!(dec.next(&bytes, &mut pos).unwrap(), None);
        assert_eq!(pos, 1);

        let complete = [6, 1, 0x82, 0x2C];
        assert_eq!(
            dec.next(&complete, &mut pos).unwrap(),
            Some(Instruction::Add { size: 300 })
        );
        assert_eq!(pos, 4);
    }

    #[test]
    fn pending_second_half_survives_end_of_data() {
        let mut entries = *CodeTable::default_table().entries();
        // ADD(2) followed by an explicit-size RUN.
        entries[254] = CodeTableEntry::double((InstKind::Add, 2, 0), (InstKind::Run, 0, 0));
        let table = CodeTable::new(entries, 4, 3).unwrap();
        let mut dec = InstructionDecoder::new(&table);
        let mut pos = 0;

        let partial = [254];
        assert_eq!(dec.next(&partial, &mut pos).unwrap(), Some(Instruction::Add { size: 2 }));
        assert_eq!(dec.next(&partial, &mut pos).unwrap(), None);
        assert!(dec.has_pending());
        assert_eq!(pos, 1);

        let full = [254, 40];
        assert_eq!(dec.next(&full, &mut pos).unwrap(), Some(Instruction::Run { size: 40 }));
        assert!(!dec.has_pending());
    }

    #[test]
    fn oversized_explicit_size_is_an_error() {
        let mut dec = InstructionDecoder::new(CodeTable::default_table());
        let mut pos = 0;
        let bytes = [1, 0x90, 0x80, 0x80, 0x80, 0x00];
        assert!(matches!(
            dec.next(&bytes, &mut pos),
            Err(DecodeError::InvalidInstruction(_))
        ));
    }

    #[test]
    fn noop_opcodes_are_skipped() {
        let mut entries = *CodeTable::default_table().entries();
        entries[18] = CodeTableEntry::default();
        let table = CodeTable::new(entries, 4, 3).unwrap();
        let mut dec = InstructionDecoder::new(&table);
        let mut pos = 0;
        let bytes = [18, 18, 2];
        assert_eq!(dec.next(&bytes, &mut pos).unwrap(), Some(Instruction::Add { size: 1 }));
        assert_eq!(pos, 3);
    }
}
