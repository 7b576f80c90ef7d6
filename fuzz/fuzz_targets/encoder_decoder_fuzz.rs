#![no_main]
use libfuzzer_sys::fuzz_target;
use vcdelta::compress::decoder::{self, DecodeOptions};
use vcdelta::hash::matching::InstructionSink;
use vcdelta::vcdiff::code_table::{CodeTable, InstructionMap};
use vcdelta::vcdiff::encoder::WindowEncoder;
use vcdelta::vcdiff::header::{FileHeader, Format};

// Drive the window encoder with instructions chosen by the input, then
// check the decoder rebuilds the same target.
fuzz_target!(|data: &[u8]| {
    if data.len() < 3 {
        return;
    }
    let format = if data[0] & 1 != 0 {
        Format::Interleaved
    } else {
        Format::Standard
    };
    let split = 2 + (data[1] as usize % (data.len() - 2));
    let dictionary = &data[2..split];
    let ops = &data[split..];

    let map = InstructionMap::new(CodeTable::default_table());
    let mut we = WindowEncoder::new(&map, format, dictionary.len() as u64, data[0] & 2 != 0);
    let mut target = Vec::new();

    for op in ops.chunks(3) {
        let len = 1 + op.get(1).copied().unwrap_or(0) as usize % 40;
        let combined_len = dictionary.len() + target.len();
        match op[0] % 3 {
            0 => {
                let lit: Vec<u8> = op.iter().copied().cycle().take(len).collect();
                we.add(&lit);
                target.extend_from_slice(&lit);
            }
            1 => {
                let byte = op.get(2).copied().unwrap_or(0);
                we.run(byte, len);
                target.extend(std::iter::repeat_n(byte, len));
            }
            _ if combined_len > 0 => {
                let addr = op.get(2).copied().unwrap_or(0) as usize % combined_len;
                for i in 0..len {
                    let a = addr + i;
                    let b = if a < dictionary.len() {
                        dictionary[a]
                    } else {
                        target[a - dictionary.len()]
                    };
                    target.push(b);
                }
                let start = target.len() - len;
                we.copy(addr as u64, &target[start..]);
            }
            _ => {}
        }
    }
    if target.is_empty() {
        return;
    }

    let mut delta = FileHeader::new(format).to_bytes().to_vec();
    delta.extend_from_slice(&we.finish());
    let decoded = decoder::decode_all(dictionary, &delta, &DecodeOptions::default()).unwrap();
    assert_eq!(decoded, target);
});
