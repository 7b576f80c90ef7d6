// VCDIFF format implementation (RFC 3284).
//
// Both the standard three-section window layout and the interleaved layout
// (version byte 'S') are supported, with optional per-window Adler-32.
//
// # Modules
//
// - `varint`: Variable-length integer encoding (base-128, big-endian)
// - `address_cache`: NEAR/SAME address cache for COPY instruction addresses
// - `code_table`: Instruction code tables and the encoder's opcode map
// - `instructions`: Opcode stream decoding
// - `header`: File header and per-window header encoding/decoding
// - `encoder`: Instruction encoding and window emission
// - `decoder`: Window body replay

pub mod address_cache;
pub mod code_table;
pub mod decoder;
pub mod encoder;
pub mod header;
pub mod instructions;
pub mod varint;

// Re-export key types for convenience.
pub use address_cache::AddressCache;
pub use code_table::{CodeTable, CodeTableEntry, CodeTableError, InstKind, Instruction};
pub use decoder::{BodyDecoder, BodyStatus, DecodeError};
pub use encoder::{WindowEncoder, WindowStats};
pub use header::{FileHeader, Format, VCDIFF_MAGIC, WindowHeader};
pub use instructions::InstructionDecoder;
