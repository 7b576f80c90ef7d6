//! vcdelta: block-hash VCDIFF (RFC 3284) delta encoding/decoding.
//!
//! The crate provides:
//! - A rolling-hash block matcher (`hash`)
//! - The VCDIFF wire format, standard and interleaved layouts (`vcdiff`)
//! - Streaming session APIs (`compress`)
//! - Random-access byte sources (`source`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use vcdelta::compress::decoder::{self, DecodeOptions};
//! use vcdelta::compress::encoder::{self, EncodeOptions};
//!
//! let dictionary = b"hello old world";
//! let target = b"hello new world";
//!
//! let delta = encoder::encode_all(dictionary, target, &EncodeOptions::default()).unwrap();
//! let decoded = decoder::decode_all(dictionary, &delta, &DecodeOptions::default()).unwrap();
//! assert_eq!(decoded, target);
//! ```

pub mod compress;
pub mod hash;
pub mod source;
pub mod vcdiff;

#[cfg(feature = "cli")]
pub mod cli;
