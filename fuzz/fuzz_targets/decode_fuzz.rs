#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::compress::decoder::{self, DecodeOptions};

fuzz_target!(|data: &[u8]| {
    // Arbitrary bytes must only ever produce errors, never panics.
    let opts = DecodeOptions::default().with_read_size(7);
    let _ = decoder::decode_all(&[], data, &opts);

    // Also fuzz with a non-empty dictionary.
    if data.len() >= 2 {
        let split = data.len() / 2;
        let (dictionary, delta) = data.split_at(split);
        let _ = decoder::decode_all(dictionary, delta, &opts);
    }
});
