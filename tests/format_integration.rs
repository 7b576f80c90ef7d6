// Wire-format tests: exact bytes for small deltas, header fields of encoded
// windows, and rejection of streams this decoder does not accept.

use std::io::Cursor;

use vcdelta::compress::decoder::{DecodeOptions, decode_all};
use vcdelta::compress::encoder::{EncodeOptions, encode_all};
use vcdelta::vcdiff::decoder::DecodeError;
use vcdelta::vcdiff::header::{
    FILE_HEADER_LEN, FileHeader, Format, SourceSegment, VCDIFF_MAGIC, WinIndicator, WindowHeader,
};

const DICT: &[u8] = b"0123456789";

/// Every window header in `delta`, in stream order.
fn window_headers(delta: &[u8]) -> Vec<WindowHeader> {
    let mut cursor = Cursor::new(delta);
    FileHeader::decode(&mut cursor).unwrap();
    let mut headers = Vec::new();
    while let Some(header) = WindowHeader::decode(&mut cursor).unwrap() {
        let skip = cursor.position() + header.body_len();
        cursor.set_position(skip);
        headers.push(header);
    }
    assert_eq!(cursor.position(), delta.len() as u64);
    headers
}

fn decode(delta: &[u8]) -> Result<Vec<u8>, DecodeError> {
    decode_all(DICT, delta, &DecodeOptions::default())
}

// ---------------------------------------------------------------------------
// Exact encodings
// ---------------------------------------------------------------------------

#[test]
fn standard_literal_window_bytes() {
    let delta = encode_all(DICT, b"abc", &EncodeOptions::default()).unwrap();
    #[rustfmt::skip]
    let expected = [
        0xD6, 0xC3, 0xC4, 0x00, 0x00,
        0x01, 10, 0,      // SOURCE, segment len, segment pos
        9, 3, 0x00,       // delta_len, target len, delta indicator
        3, 1, 0,          // data, inst, addr lengths
        b'a', b'b', b'c',
        4,                // ADD size 3
    ];
    assert_eq!(delta, expected);
}

#[test]
fn interleaved_literal_window_bytes() {
    let opts = EncodeOptions::default().with_interleaved(true);
    let delta = encode_all(DICT, b"abc", &opts).unwrap();
    #[rustfmt::skip]
    let expected = [
        0xD6, 0xC3, 0xC4, b'S', 0x00,
        0x01, 10, 0,
        9, 3, 0x00,
        0, 4, 0,
        4, b'a', b'b', b'c',
    ];
    assert_eq!(delta, expected);
}

#[test]
fn checksum_window_bytes() {
    let opts = EncodeOptions::default().with_checksum(true);
    let delta = encode_all(DICT, b"abc", &opts).unwrap();
    #[rustfmt::skip]
    let expected = [
        0xD6, 0xC3, 0xC4, 0x00, 0x00,
        0x05, 10, 0,
        13, 3, 0x00,
        3, 1, 0,
        0x02, 0x4D, 0x01, 0x27, // Adler-32 of "abc", big-endian
        b'a', b'b', b'c',
        4,
    ];
    assert_eq!(delta, expected);
}

#[test]
fn file_header_roundtrip() {
    for format in [Format::Standard, Format::Interleaved] {
        let bytes = FileHeader::new(format).to_bytes();
        assert_eq!(bytes[..3], VCDIFF_MAGIC);
        assert_eq!(bytes.len(), FILE_HEADER_LEN);
        let parsed = FileHeader::decode(&mut &bytes[..]).unwrap();
        assert_eq!(parsed.format, format);
    }
    assert_eq!(FileHeader::new(Format::Interleaved).to_bytes()[3], b'S');
}

// ---------------------------------------------------------------------------
// Encoded window headers
// ---------------------------------------------------------------------------

fn sample_target() -> Vec<u8> {
    let mut target = Vec::new();
    for i in 0..50u8 {
        target.extend_from_slice(b"the quick brown fox jumps over the lazy dog ");
        target.push(i);
        target.extend(std::iter::repeat_n(i, 12));
    }
    target
}

#[test]
fn interleaved_windows_have_empty_data_and_addr_sections() {
    let dictionary = b"the quick brown fox jumps over the lazy dog, twice: the quick brown fox";
    let target = sample_target();
    let opts = EncodeOptions::default()
        .with_interleaved(true)
        .with_chunk_size(500)
        .unwrap();
    let delta = encode_all(dictionary, &target, &opts).unwrap();
    assert_eq!(delta[3], b'S');

    let headers = window_headers(&delta);
    assert_eq!(headers.len(), target.len().div_ceil(500));
    for h in &headers {
        assert_eq!(h.data_len, 0);
        assert_eq!(h.addr_len, 0);
        assert!(h.inst_len > 0);
        assert_eq!(
            h.source_segment,
            Some(SourceSegment {
                len: dictionary.len() as u64,
                pos: 0
            })
        );
        assert!(!h.has_checksum());
    }
    let total: u64 = headers.iter().map(|h| h.target_window_len).sum();
    assert_eq!(total, target.len() as u64);
}

#[test]
fn standard_windows_use_separate_sections() {
    let dictionary = b"the quick brown fox jumps over the lazy dog, twice: the quick brown fox";
    let target = sample_target();
    let delta = encode_all(dictionary, &target, &EncodeOptions::default()).unwrap();
    let headers = window_headers(&delta);
    assert_eq!(headers.len(), 1);
    let h = &headers[0];
    assert!(h.data_len > 0);
    assert!(h.addr_len > 0);
    assert_eq!(h.target_window_len, target.len() as u64);
}

#[test]
fn checksum_bit_is_set_on_every_window() {
    let target = sample_target();
    let opts = EncodeOptions::default()
        .with_checksum(true)
        .with_chunk_size(300)
        .unwrap();
    let delta = encode_all(DICT, &target, &opts).unwrap();
    for h in window_headers(&delta) {
        assert!(h.win_ind.contains(WinIndicator::CHECKSUM | WinIndicator::SOURCE));
        assert!(h.adler32.is_some());
    }
}

// ---------------------------------------------------------------------------
// Hand-built streams
// ---------------------------------------------------------------------------

fn standard_abc() -> Vec<u8> {
    encode_all(DICT, b"abc", &EncodeOptions::default()).unwrap()
}

#[test]
fn window_without_source_segment_decodes() {
    #[rustfmt::skip]
    let delta = [
        0xD6, 0xC3, 0xC4, 0x00, 0x00,
        0x00,
        9, 3, 0x00,
        3, 1, 0,
        b'x', b'y', b'z',
        4,
    ];
    assert_eq!(decode(&delta).unwrap(), b"xyz");
}

#[test]
fn target_windows_are_rejected() {
    let mut delta = standard_abc();
    delta[FILE_HEADER_LEN] = WinIndicator::TARGET.bits();
    assert!(matches!(decode(&delta), Err(DecodeError::UnsupportedTargetWindow)));
}

#[test]
fn unknown_window_indicator_bits_are_rejected() {
    let mut delta = standard_abc();
    delta[FILE_HEADER_LEN] = 0x09;
    assert!(matches!(decode(&delta), Err(DecodeError::InvalidWindow(_))));
}

#[test]
fn compressed_sections_are_rejected() {
    let mut delta = standard_abc();
    // win_ind, seg len, seg pos, delta_len, target len, then delta_ind.
    delta[FILE_HEADER_LEN + 5] = 0x01;
    assert!(matches!(decode(&delta), Err(DecodeError::InvalidWindow(_))));
}

#[test]
fn inconsistent_delta_length_is_rejected() {
    let mut delta = standard_abc();
    delta[FILE_HEADER_LEN + 3] = 10;
    assert!(matches!(decode(&delta), Err(DecodeError::InvalidWindow(_))));
}

#[test]
fn unsupported_versions_are_rejected() {
    let mut delta = standard_abc();
    delta[3] = 0x01;
    assert!(matches!(decode(&delta), Err(DecodeError::UnsupportedVersion(0x01))));
}

#[test]
fn header_indicator_must_be_zero() {
    for indicator in [0x01, 0x02, 0x04] {
        let mut delta = standard_abc();
        delta[4] = indicator;
        assert!(matches!(
            decode(&delta),
            Err(DecodeError::UnsupportedHeaderIndicator(i)) if i == indicator
        ));
    }
}

#[test]
fn bad_magic_is_rejected() {
    let mut delta = standard_abc();
    delta[0] = 0xD5;
    assert!(matches!(
        decode(&delta),
        Err(DecodeError::InvalidMagic([0xD5, 0xC3, 0xC4]))
    ));
}

#[test]
fn trailing_partial_window_is_truncated() {
    let mut delta = standard_abc();
    delta.push(0x01);
    assert!(matches!(decode(&delta), Err(DecodeError::Truncated)));
}
