// VCDIFF instruction code table (RFC 3284, Section 5.4 - 5.6).
//
// Each of the 256 opcodes describes one or two instructions.  A size of zero
// in an entry means the size follows the opcode as a varint.  The encoder
// side is served by `InstructionMap`, an inverse index over whatever table
// the session uses; the decoder side lives in `instructions`.

use std::collections::HashMap;
use std::sync::LazyLock;

use thiserror::Error;

use super::address_cache::{AddressCache, DEFAULT_NEAR_SIZE, DEFAULT_SAME_SIZE};

/// Smallest COPY size the default table gives an implicit-size opcode.
pub const MIN_COPY_SIZE: u8 = 4;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum InstKind {
    #[default]
    Noop,
    Add,
    Run,
    Copy,
}

/// A decoded (or to-be-encoded) instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Instruction {
    /// Append `size` literal bytes.
    Add { size: u32 },
    /// Repeat one literal byte `size` times.
    Run { size: u32 },
    /// Copy `size` bytes from an address encoded in `mode`.
    Copy { size: u32, mode: u8 },
}

impl Instruction {
    #[inline]
    pub fn size(&self) -> u32 {
        match *self {
            Instruction::Add { size } | Instruction::Run { size } | Instruction::Copy { size, .. } => {
                size
            }
        }
    }

    #[inline]
    fn slot(&self) -> usize {
        match *self {
            Instruction::Add { .. } => 0,
            Instruction::Run { .. } => 1,
            Instruction::Copy { mode, .. } => 2 + mode as usize,
        }
    }

    /// Build the instruction described by one half of a table entry.
    /// Returns `None` for NOOP halves.
    #[inline]
    pub fn from_half(kind: InstKind, size: u32, mode: u8) -> Option<Self> {
        match kind {
            InstKind::Noop => None,
            InstKind::Add => Some(Instruction::Add { size }),
            InstKind::Run => Some(Instruction::Run { size }),
            InstKind::Copy => Some(Instruction::Copy { size, mode }),
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CodeTableEntry {
    pub inst1: InstKind,
    pub size1: u8,
    pub mode1: u8,
    pub inst2: InstKind,
    pub size2: u8,
    pub mode2: u8,
}

impl CodeTableEntry {
    pub const fn single(inst: InstKind, size: u8, mode: u8) -> Self {
        Self {
            inst1: inst,
            size1: size,
            mode1: mode,
            inst2: InstKind::Noop,
            size2: 0,
            mode2: 0,
        }
    }

    pub const fn double(first: (InstKind, u8, u8), second: (InstKind, u8, u8)) -> Self {
        Self {
            inst1: first.0,
            size1: first.1,
            mode1: first.2,
            inst2: second.0,
            size2: second.1,
            mode2: second.2,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum CodeTableError {
    #[error("near_size + same_size = {0} leaves no room in a mode byte")]
    TooManyModes(usize),
    #[error("opcode {opcode} uses COPY mode {mode}, table only has {mode_count} modes")]
    ModeOutOfRange { opcode: u8, mode: u8, mode_count: usize },
    #[error("no explicit-size opcode for {kind:?} (mode {mode})")]
    MissingExplicitSize { kind: InstKind, mode: u8 },
}

/// A full 256-entry code table together with the address cache shape its
/// COPY modes assume.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CodeTable {
    entries: [CodeTableEntry; 256],
    near_size: u8,
    same_size: u8,
}

static DEFAULT_TABLE: LazyLock<CodeTable> = LazyLock::new(CodeTable::rfc3284);

impl CodeTable {
    /// Validate and wrap a custom table.
    ///
    /// Every COPY mode must exist in the address cache, and every instruction
    /// the encoder may need (ADD, RUN, COPY in each mode) must have a single
    /// opcode with an explicit size so that arbitrary sizes stay encodable.
    pub fn new(
        entries: [CodeTableEntry; 256],
        near_size: u8,
        same_size: u8,
    ) -> Result<Self, CodeTableError> {
        let modes = near_size as usize + same_size as usize;
        if modes > 253 {
            return Err(CodeTableError::TooManyModes(modes));
        }
        let mode_count = 2 + modes;

        for (opcode, e) in entries.iter().enumerate() {
            for (kind, mode) in [(e.inst1, e.mode1), (e.inst2, e.mode2)] {
                if kind == InstKind::Copy && mode as usize >= mode_count {
                    return Err(CodeTableError::ModeOutOfRange {
                        opcode: opcode as u8,
                        mode,
                        mode_count,
                    });
                }
            }
        }

        let has_explicit = |kind: InstKind, mode: u8| {
            entries.iter().any(|e| {
                e.inst1 == kind
                    && e.size1 == 0
                    && e.inst2 == InstKind::Noop
                    && (kind != InstKind::Copy || e.mode1 == mode)
            })
        };
        for kind in [InstKind::Add, InstKind::Run] {
            if !has_explicit(kind, 0) {
                return Err(CodeTableError::MissingExplicitSize { kind, mode: 0 });
            }
        }
        for mode in 0..mode_count as u8 {
            if !has_explicit(InstKind::Copy, mode) {
                return Err(CodeTableError::MissingExplicitSize {
                    kind: InstKind::Copy,
                    mode,
                });
            }
        }

        Ok(Self {
            entries,
            near_size,
            same_size,
        })
    }

    /// The shared default table.
    pub fn default_table() -> &'static CodeTable {
        &DEFAULT_TABLE
    }

    /// Build the RFC 3284 default table (Section 5.6).
    pub fn rfc3284() -> Self {
        use InstKind::{Add, Copy, Run};

        const ADD_SIZES: u8 = 17;
        const CPY_SIZES: u8 = 15;
        const NEAR_MODES: u8 = DEFAULT_NEAR_SIZE;
        const CPY_MODES: u8 = 2 + DEFAULT_NEAR_SIZE + DEFAULT_SAME_SIZE;
        const ADDCOPY_ADD_MAX: u8 = 4;
        const ADDCOPY_NEAR_CPY_MAX: u8 = 6;
        const ADDCOPY_SAME_CPY_MAX: u8 = 4;
        const COPYADD_NEAR_CPY_MAX: u8 = 4;
        const COPYADD_SAME_CPY_MAX: u8 = 4;

        let mut entries = Vec::with_capacity(256);
        entries.push(CodeTableEntry::single(Run, 0, 0));
        entries.push(CodeTableEntry::single(Add, 0, 0));
        for size in 1..=ADD_SIZES {
            entries.push(CodeTableEntry::single(Add, size, 0));
        }
        for mode in 0..CPY_MODES {
            entries.push(CodeTableEntry::single(Copy, 0, mode));
            for size in MIN_COPY_SIZE..MIN_COPY_SIZE + CPY_SIZES {
                entries.push(CodeTableEntry::single(Copy, size, mode));
            }
        }
        for mode in 0..CPY_MODES {
            let cpy_max = if mode < 2 + NEAR_MODES {
                ADDCOPY_NEAR_CPY_MAX
            } else {
                ADDCOPY_SAME_CPY_MAX
            };
            for add_size in 1..=ADDCOPY_ADD_MAX {
                for cpy_size in MIN_COPY_SIZE..=cpy_max {
                    entries.push(CodeTableEntry::double(
                        (Add, add_size, 0),
                        (Copy, cpy_size, mode),
                    ));
                }
            }
        }
        for mode in 0..CPY_MODES {
            let cpy_max = if mode < 2 + NEAR_MODES {
                COPYADD_NEAR_CPY_MAX
            } else {
                COPYADD_SAME_CPY_MAX
            };
            for cpy_size in MIN_COPY_SIZE..=cpy_max {
                entries.push(CodeTableEntry::double((Copy, cpy_size, mode), (Add, 1, 0)));
            }
        }
        debug_assert_eq!(entries.len(), 256);

        let mut table = [CodeTableEntry::default(); 256];
        table.copy_from_slice(&entries);
        Self {
            entries: table,
            near_size: DEFAULT_NEAR_SIZE,
            same_size: DEFAULT_SAME_SIZE,
        }
    }

    #[inline]
    pub fn entry(&self, opcode: u8) -> &CodeTableEntry {
        &self.entries[opcode as usize]
    }

    pub fn entries(&self) -> &[CodeTableEntry; 256] {
        &self.entries
    }

    #[inline]
    pub fn near_size(&self) -> u8 {
        self.near_size
    }

    #[inline]
    pub fn same_size(&self) -> u8 {
        self.same_size
    }

    #[inline]
    pub fn mode_count(&self) -> usize {
        2 + self.near_size as usize + self.same_size as usize
    }
}

impl Default for CodeTable {
    fn default() -> Self {
        Self::default_table().clone()
    }
}

/// The opcode chosen for a single instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SingleOpcode {
    pub opcode: u8,
    /// The size must follow the opcode as a varint.
    pub explicit_size: bool,
}

/// Encoder-side inverse of a [`CodeTable`].
///
/// Answers two questions: which opcode encodes an instruction on its own,
/// and whether an instruction can be folded into the previously written
/// opcode to form a double.
#[derive(Debug, Clone)]
pub struct InstructionMap {
    /// `single[slot][size]`, slot 0 = ADD, 1 = RUN, 2 + mode = COPY.
    single: Vec<[Option<u8>; 256]>,
    /// Explicit-size opcode per slot.
    explicit: Vec<u8>,
    /// `(first opcode, slot, size) -> double opcode`.
    double: HashMap<(u8, usize, u8), u8>,
    near_size: u8,
    same_size: u8,
}

impl InstructionMap {
    pub fn new(table: &CodeTable) -> Self {
        let slots = 2 + table.mode_count();
        let mut single = vec![[None; 256]; slots];
        let slot_of = |kind: InstKind, mode: u8| match kind {
            InstKind::Noop => None,
            InstKind::Add => Some(0),
            InstKind::Run => Some(1),
            InstKind::Copy => Some(2 + mode as usize),
        };

        for (opcode, e) in table.entries().iter().enumerate() {
            if e.inst2 != InstKind::Noop {
                continue;
            }
            if let Some(slot) = slot_of(e.inst1, e.mode1) {
                let cell = &mut single[slot][e.size1 as usize];
                if cell.is_none() {
                    *cell = Some(opcode as u8);
                }
            }
        }

        let mut double = HashMap::new();
        for (opcode, e) in table.entries().iter().enumerate() {
            if e.inst2 == InstKind::Noop || e.size1 == 0 || e.size2 == 0 {
                continue;
            }
            let (Some(slot1), Some(slot2)) = (slot_of(e.inst1, e.mode1), slot_of(e.inst2, e.mode2))
            else {
                continue;
            };
            if let Some(first) = single[slot1][e.size1 as usize] {
                double.entry((first, slot2, e.size2)).or_insert(opcode as u8);
            }
        }

        // CodeTable::new guarantees every slot an explicit-size opcode.
        let explicit = single.iter().map(|row| row[0].unwrap_or_default()).collect();

        Self {
            single,
            explicit,
            double,
            near_size: table.near_size(),
            same_size: table.same_size(),
        }
    }

    /// A fresh address cache shaped for this table's COPY modes.
    pub fn address_cache(&self) -> AddressCache {
        AddressCache::with_sizes(self.near_size, self.same_size)
    }

    /// Opcode for `inst` alone, preferring an implicit size.
    pub fn single(&self, inst: &Instruction) -> SingleOpcode {
        let slot = inst.slot();
        let size = inst.size();
        if size > 0
            && size < 256
            && let Some(opcode) = self.single[slot][size as usize]
        {
            return SingleOpcode {
                opcode,
                explicit_size: false,
            };
        }
        SingleOpcode {
            opcode: self.explicit[slot],
            explicit_size: true,
        }
    }

    /// Double opcode combining the instruction written as `first` with `inst`.
    pub fn double(&self, first: u8, inst: &Instruction) -> Option<u8> {
        let size = u8::try_from(inst.size()).ok()?;
        self.double.get(&(first, inst.slot(), size)).copied()
    }
}
