// VCDIFF file header and per-window header encoding/decoding (RFC 3284).
//
// The file header is the magic, a version/format byte and a header indicator
// that must be zero.  Version 0x00 is plain RFC 3284; 'S' marks a stream in
// which windows may use the interleaved (SDCH) body layout.

use std::io::{self, Read, Write};

use bitflags::bitflags;

use super::decoder::DecodeError;
use super::varint;

pub const VCDIFF_MAGIC: [u8; 3] = [0xD6, 0xC3, 0xC4];

/// Magic + version byte + header indicator.
pub const FILE_HEADER_LEN: usize = 5;

/// Version byte of an interleaved-capable stream.
pub const SDCH_VERSION: u8 = b'S';

bitflags! {
    /// Window indicator byte (`win_ind`).
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct WinIndicator: u8 {
        const SOURCE = 1 << 0;
        const TARGET = 1 << 1;
        /// A 4-byte Adler-32 of the window's target bytes follows the
        /// section lengths.
        const CHECKSUM = 1 << 2;
    }
}

bitflags! {
    /// Delta indicator byte (`del_ind`).  No secondary compressor is
    /// supported, so any set bit is rejected.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct DeltaIndicator: u8 {
        const DATACOMP = 1 << 0;
        const INSTCOMP = 1 << 1;
        const ADDRCOMP = 1 << 2;
    }
}

/// Body layout family of a delta stream.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Format {
    /// Separate data, instruction and address sections.
    #[default]
    Standard,
    /// A single instruction section carrying sizes, addresses and literals
    /// inline, in emission order.
    Interleaved,
}

impl Format {
    pub const fn version_byte(self) -> u8 {
        match self {
            Format::Standard => 0x00,
            Format::Interleaved => SDCH_VERSION,
        }
    }

    pub const fn from_version_byte(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(Format::Standard),
            SDCH_VERSION => Some(Format::Interleaved),
            _ => None,
        }
    }
}

// ---------------------------------------------------------------------------
// File header
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct FileHeader {
    pub format: Format,
}

impl FileHeader {
    pub fn new(format: Format) -> Self {
        Self { format }
    }

    pub fn to_bytes(&self) -> [u8; FILE_HEADER_LEN] {
        [
            VCDIFF_MAGIC[0],
            VCDIFF_MAGIC[1],
            VCDIFF_MAGIC[2],
            self.format.version_byte(),
            0x00,
        ]
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        w.write_all(&self.to_bytes())
    }

    /// Read and validate the five header bytes.
    pub fn decode<R: Read>(r: &mut R) -> Result<Self, DecodeError> {
        let mut buf = [0u8; FILE_HEADER_LEN];
        r.read_exact(&mut buf)?;

        if buf[..3] != VCDIFF_MAGIC {
            return Err(DecodeError::InvalidMagic([buf[0], buf[1], buf[2]]));
        }
        let format =
            Format::from_version_byte(buf[3]).ok_or(DecodeError::UnsupportedVersion(buf[3]))?;
        // Secondary compressors, custom code tables and application headers
        // are all announced here; none of them are supported.
        if buf[4] != 0 {
            return Err(DecodeError::UnsupportedHeaderIndicator(buf[4]));
        }

        Ok(Self { format })
    }
}

// ---------------------------------------------------------------------------
// Per-window header
// ---------------------------------------------------------------------------

/// The slice of the dictionary a window copies from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceSegment {
    pub len: u64,
    pub pos: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct WindowHeader {
    pub win_ind: WinIndicator,
    /// Present iff `win_ind` has SOURCE.
    pub source_segment: Option<SourceSegment>,
    /// Redundant length of everything after this field.
    pub delta_len: u64,
    pub target_window_len: u64,
    pub delta_ind: DeltaIndicator,
    pub data_len: u64,
    pub inst_len: u64,
    pub addr_len: u64,
    pub adler32: Option<u32>,
}

impl WindowHeader {
    /// Build a header for a window over `source_segment` whose sections have
    /// already been produced.  Sets the indicator bits and `delta_len`.
    pub fn for_sections(
        source_segment: Option<SourceSegment>,
        target_window_len: u64,
        section_lens: (u64, u64, u64),
        adler32: Option<u32>,
    ) -> Self {
        let mut win_ind = WinIndicator::empty();
        win_ind.set(WinIndicator::SOURCE, source_segment.is_some());
        win_ind.set(WinIndicator::CHECKSUM, adler32.is_some());

        let (data_len, inst_len, addr_len) = section_lens;
        let mut hdr = Self {
            win_ind,
            source_segment,
            delta_len: 0,
            target_window_len,
            delta_ind: DeltaIndicator::empty(),
            data_len,
            inst_len,
            addr_len,
            adler32,
        };
        hdr.delta_len = hdr.compute_delta_len();
        hdr
    }

    #[inline]
    pub fn has_checksum(&self) -> bool {
        self.win_ind.contains(WinIndicator::CHECKSUM)
    }

    /// Source segment length, or 0 when the window has none.
    #[inline]
    pub fn source_len(&self) -> u64 {
        self.source_segment.map_or(0, |s| s.len)
    }

    /// In an 'S' stream a window with empty data and address sections
    /// carries everything in its instruction section.
    #[inline]
    pub fn has_interleaved_body(&self) -> bool {
        self.data_len == 0 && self.addr_len == 0
    }

    /// Total size of the three sections following the header.
    #[inline]
    pub fn body_len(&self) -> u64 {
        self.data_len + self.inst_len + self.addr_len
    }

    /// Expected value of `delta_len`:
    ///   sizeof(target_window_len) + 1 (delta_ind) +
    ///   sizeof(data_len) + sizeof(inst_len) + sizeof(addr_len) +
    ///   [4 if checksum] + data_len + inst_len + addr_len
    pub fn compute_delta_len(&self) -> u64 {
        let mut len = varint::sizeof_u64(self.target_window_len) as u64;
        len += 1;
        len += varint::sizeof_u64(self.data_len) as u64;
        len += varint::sizeof_u64(self.inst_len) as u64;
        len += varint::sizeof_u64(self.addr_len) as u64;
        if self.has_checksum() {
            len += 4;
        }
        len.saturating_add(self.data_len)
            .saturating_add(self.inst_len)
            .saturating_add(self.addr_len)
    }

    /// Append the header to an in-memory buffer.
    ///
    /// Layout:
    /// 1. win_ind
    /// 2. [src_seg_len, src_seg_pos] if SOURCE
    /// 3. delta_len, target_window_len (varints)
    /// 4. del_ind (1 byte)
    /// 5. data_len, inst_len, addr_len (varints)
    /// 6. [adler32] (4 bytes, big-endian) if CHECKSUM
    pub fn push_to(&self, out: &mut Vec<u8>) {
        out.push(self.win_ind.bits());
        if let Some(seg) = self.source_segment {
            varint::push_u64(out, seg.len);
            varint::push_u64(out, seg.pos);
        }
        varint::push_u64(out, self.delta_len);
        varint::push_u64(out, self.target_window_len);
        out.push(self.delta_ind.bits());
        varint::push_u64(out, self.data_len);
        varint::push_u64(out, self.inst_len);
        varint::push_u64(out, self.addr_len);
        if let Some(cksum) = self.adler32 {
            out.extend_from_slice(&cksum.to_be_bytes());
        }
    }

    pub fn encode<W: Write>(&self, w: &mut W) -> io::Result<()> {
        let mut buf = Vec::with_capacity(64);
        self.push_to(&mut buf);
        w.write_all(&buf)
    }

    /// Parse a window header.  Returns `None` on a clean end of stream
    /// (no bytes left where the next window would start).
    pub fn decode<R: Read>(r: &mut R) -> Result<Option<Self>, DecodeError> {
        let mut byte = [0u8; 1];
        loop {
            match r.read(&mut byte) {
                Ok(0) => return Ok(None),
                Ok(_) => break,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
                Err(e) => return Err(e.into()),
            }
        }

        let win_ind = WinIndicator::from_bits(byte[0]).ok_or_else(|| {
            DecodeError::InvalidWindow(format!("unknown window indicator bits {:#04X}", byte[0]))
        })?;
        if win_ind.contains(WinIndicator::SOURCE | WinIndicator::TARGET) {
            return Err(DecodeError::InvalidWindow(
                "SOURCE and TARGET are mutually exclusive".into(),
            ));
        }
        if win_ind.contains(WinIndicator::TARGET) {
            return Err(DecodeError::UnsupportedTargetWindow);
        }

        let source_segment = if win_ind.contains(WinIndicator::SOURCE) {
            let len = varint::stream_read_u64(r)?;
            let pos = varint::stream_read_u64(r)?;
            Some(SourceSegment { len, pos })
        } else {
            None
        };

        let delta_len = varint::stream_read_u64(r)?;
        let target_window_len = varint::stream_read_u64(r)?;

        r.read_exact(&mut byte)?;
        let delta_ind = DeltaIndicator::from_bits_retain(byte[0]);
        if !delta_ind.is_empty() {
            return Err(DecodeError::InvalidWindow(format!(
                "delta indicator {:#04X}: compressed sections are not supported",
                byte[0]
            )));
        }

        let data_len = varint::stream_read_u64(r)?;
        let inst_len = varint::stream_read_u64(r)?;
        let addr_len = varint::stream_read_u64(r)?;

        let adler32 = if win_ind.contains(WinIndicator::CHECKSUM) {
            let mut buf = [0u8; 4];
            r.read_exact(&mut buf)?;
            Some(u32::from_be_bytes(buf))
        } else {
            None
        };

        let hdr = Self {
            win_ind,
            source_segment,
            delta_len,
            target_window_len,
            delta_ind,
            data_len,
            inst_len,
            addr_len,
            adler32,
        };

        let expected = hdr.compute_delta_len();
        if delta_len != expected {
            return Err(DecodeError::InvalidWindow(format!(
                "delta length mismatch: header says {delta_len}, sections add up to {expected}"
            )));
        }

        Ok(Some(hdr))
    }

    /// Check the header against the session's dictionary and window limit.
    pub fn validate(&self, dictionary_len: u64, max_target_window: u64) -> Result<(), DecodeError> {
        if let Some(seg) = self.source_segment {
            let fits = seg
                .pos
                .checked_add(seg.len)
                .is_some_and(|end| end <= dictionary_len);
            if !fits {
                return Err(DecodeError::SourceSegmentOutOfRange {
                    pos: seg.pos,
                    len: seg.len,
                    dictionary_len,
                });
            }
        }
        if self.target_window_len > max_target_window {
            return Err(DecodeError::WindowTooLarge {
                len: self.target_window_len,
                max: max_target_window,
            });
        }
        Ok(())
    }
}
