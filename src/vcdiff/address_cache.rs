// VCDIFF address cache (RFC 3284, Section 5.3).
//
// COPY addresses are encoded relative to one of the NEAR slots, relative to
// the current position, as an absolute value, or as a one-byte index into the
// SAME table.  Encoder and decoder mutate identical caches in the same order,
// so the state never has to be transmitted.

use thiserror::Error;

use super::varint::{self, MAX_VARINT_LEN};

/// Absolute address.
pub const VCD_SELF: u8 = 0;
/// Address is `here - value`.
pub const VCD_HERE: u8 = 1;
/// First NEAR mode; NEAR slot `i` is mode `VCD_FIRST_NEAR + i`.
pub const VCD_FIRST_NEAR: u8 = 2;

pub const DEFAULT_NEAR_SIZE: u8 = 4;
pub const DEFAULT_SAME_SIZE: u8 = 3;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum AddressCacheError {
    /// The address bytes are not all available yet.
    #[error("address section underflow")]
    Underflow,
    /// The decoded address is negative or not behind the current position.
    #[error("COPY address out of range")]
    OutOfRange,
    #[error("varint overflow in COPY address")]
    Overflow,
}

/// NEAR/SAME address cache.
///
/// With the default sizes (near 4, same 3) there are 9 modes:
///   0      SELF
///   1      HERE
///   2..5   NEAR  `near[mode - 2] + value`
///   6..8   SAME  `same[(mode - 6) * 256 + byte]`
#[derive(Debug, Clone)]
pub struct AddressCache {
    near: Vec<u64>,
    same: Vec<u64>,
    next_slot: usize,
}

impl AddressCache {
    pub fn new() -> Self {
        Self::with_sizes(DEFAULT_NEAR_SIZE, DEFAULT_SAME_SIZE)
    }

    pub fn with_sizes(near_size: u8, same_size: u8) -> Self {
        Self {
            near: vec![0; near_size as usize],
            same: vec![0; same_size as usize * 256],
            next_slot: 0,
        }
    }

    /// Zero both caches.  Done at the start of every window.
    pub fn reset(&mut self) {
        self.near.fill(0);
        self.same.fill(0);
        self.next_slot = 0;
    }

    #[inline]
    pub fn near_size(&self) -> usize {
        self.near.len()
    }

    #[inline]
    pub fn same_size(&self) -> usize {
        self.same.len() / 256
    }

    /// Number of address modes, `2 + near_size + same_size`.
    #[inline]
    pub fn mode_count(&self) -> usize {
        2 + self.near_size() + self.same_size()
    }

    #[inline]
    fn first_same_mode(&self) -> usize {
        2 + self.near_size()
    }

    /// Record `addr` in the next NEAR slot and in its SAME bucket.
    #[inline]
    pub fn update(&mut self, addr: u64) {
        if !self.near.is_empty() {
            self.near[self.next_slot] = addr;
            self.next_slot = (self.next_slot + 1) % self.near.len();
        }
        if !self.same.is_empty() {
            let idx = (addr % self.same.len() as u64) as usize;
            self.same[idx] = addr;
        }
    }

    /// Choose the cheapest mode for `addr` and update the cache.
    ///
    /// A SAME hit always wins since it costs a single byte.  Otherwise the
    /// smallest value among SELF, HERE and every NEAR slot is emitted.
    pub fn encode(&mut self, addr: u64, here: u64) -> (u8, EncodedAddr) {
        debug_assert!(addr < here, "COPY address {addr} not behind {here}");

        if !self.same.is_empty() {
            let slot = (addr % self.same.len() as u64) as usize;
            if self.same[slot] == addr {
                let mode = (self.first_same_mode() + slot / 256) as u8;
                self.update(addr);
                return (mode, EncodedAddr::SameByte((slot % 256) as u8));
            }
        }

        let mut best_mode = VCD_SELF;
        let mut best_value = addr;

        let here_value = here - addr;
        if here_value < best_value {
            best_mode = VCD_HERE;
            best_value = here_value;
        }

        for (i, &near) in self.near.iter().enumerate() {
            if addr >= near && addr - near < best_value {
                best_mode = VCD_FIRST_NEAR + i as u8;
                best_value = addr - near;
            }
        }

        self.update(addr);
        (best_mode, EncodedAddr::varint(best_value))
    }

    /// Decode the address for a COPY in `mode` from the front of `data`.
    ///
    /// Returns `(address, bytes_consumed)`.  The cache is only updated when
    /// decoding succeeds, so an `Underflow` can be retried once more bytes
    /// arrive.
    pub fn decode(
        &mut self,
        mode: u8,
        data: &[u8],
        here: u64,
    ) -> Result<(u64, usize), AddressCacheError> {
        let mode = mode as usize;
        let first_same = self.first_same_mode();

        let (addr, consumed) = if mode < first_same {
            let (value, consumed) = varint::read_u64(data).map_err(|e| match e {
                varint::VarIntError::Underflow => AddressCacheError::Underflow,
                varint::VarIntError::Overflow => AddressCacheError::Overflow,
            })?;
            let addr = match mode {
                0 => value,
                1 => here
                    .checked_sub(value)
                    .ok_or(AddressCacheError::OutOfRange)?,
                _ => self.near[mode - 2]
                    .checked_add(value)
                    .ok_or(AddressCacheError::OutOfRange)?,
            };
            (addr, consumed)
        } else if mode < self.mode_count() {
            let &byte = data.first().ok_or(AddressCacheError::Underflow)?;
            (self.same[(mode - first_same) * 256 + byte as usize], 1)
        } else {
            return Err(AddressCacheError::OutOfRange);
        };

        if addr >= here {
            return Err(AddressCacheError::OutOfRange);
        }

        self.update(addr);
        Ok((addr, consumed))
    }
}

impl Default for AddressCache {
    fn default() -> Self {
        Self::new()
    }
}

/// Wire form of an address chosen by [`AddressCache::encode`].
#[derive(Debug, Clone, Copy)]
pub enum EncodedAddr {
    /// SELF, HERE and NEAR modes.
    VarInt { bytes: [u8; MAX_VARINT_LEN], len: usize },
    /// SAME modes.
    SameByte(u8),
}

impl EncodedAddr {
    fn varint(value: u64) -> Self {
        let mut buf = [0u8; MAX_VARINT_LEN];
        let len = varint::encode_u64(value, &mut buf);
        let mut bytes = [0u8; MAX_VARINT_LEN];
        bytes[..len].copy_from_slice(&buf[MAX_VARINT_LEN - len..]);
        EncodedAddr::VarInt { bytes, len }
    }

    pub fn as_bytes(&self) -> &[u8] {
        match self {
            EncodedAddr::VarInt { bytes, len } => &bytes[..*len],
            EncodedAddr::SameByte(b) => std::slice::from_ref(b),
        }
    }

    pub fn len(&self) -> usize {
        self.as_bytes().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
