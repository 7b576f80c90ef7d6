#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::compress::decoder::{self, DecodeOptions};
use vcdelta::compress::encoder::{self, EncodeOptions};

fuzz_target!(|data: &[u8]| {
    if data.len() < 4 {
        return;
    }

    // First byte: layout flags.  Second: chunk size.  Third: split point.
    let flags = data[0];
    let chunk_size = 1 + data[1] as usize * 64;
    let split = 3 + (data[2] as usize % (data.len() - 3));
    let dictionary = &data[3..split];
    let target = &data[split..];
    if dictionary.is_empty() || target.is_empty() {
        return;
    }

    let Ok(opts) = EncodeOptions::default()
        .with_interleaved(flags & 1 != 0)
        .with_checksum(flags & 2 != 0)
        .with_chunk_size(chunk_size)
    else {
        return;
    };

    let delta = encoder::encode_all(dictionary, target, &opts).unwrap();
    let dopts = DecodeOptions::default().with_read_size(1 + (flags >> 2) as usize);
    let decoded = decoder::decode_all(dictionary, &delta, &dopts).unwrap();
    assert_eq!(decoded, target);
});
