// Session-level delta encoding and decoding.
//
// This module provides the streaming API built on the VCDIFF and hash
// modules:
//
// - `encoder`: DeltaEncoder: dictionary indexed once, target in chunks
// - `decoder`: DeltaDecoder: window-at-a-time decoding with progress tracking

pub mod decoder;
pub mod encoder;

pub use decoder::{DecodeOptions, DeltaDecoder, decode, decode_all};
pub use encoder::{DeltaEncoder, EncodeError, EncodeOptions, EncodeStats, encode, encode_all};
