use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};
use std::fs;
use std::path::Path;
use vcdelta::compress::decoder::{self, DecodeOptions};
use vcdelta::compress::encoder::{self, EncodeOptions};
use vcdelta::hash::rolling::RollingHash;
use vcdelta::hash::table::BlockHashIndex;

fn gen_data(size: usize, seed: u64) -> Vec<u8> {
    let mut s = seed;
    let mut out = Vec::with_capacity(size);
    for _ in 0..size {
        s = s.wrapping_mul(6364136223846793005).wrapping_add(1);
        out.push((s >> 33) as u8);
    }
    out
}

fn mutate(base: &[u8], stride: usize) -> Vec<u8> {
    let mut out = base.to_vec();
    for i in (0..out.len()).step_by(stride.max(1)) {
        out[i] = out[i].wrapping_add(1);
    }
    out
}

fn layouts() -> [(&'static str, EncodeOptions); 2] {
    [
        ("standard", EncodeOptions::default()),
        ("interleaved", EncodeOptions::default().with_interleaved(true)),
    ]
}

fn write_ratio_snapshot() {
    let dictionary = gen_data(2 * 1024 * 1024, 123);
    let mut csv = String::from("stride,layout,delta_bytes,target_bytes,ratio\n");
    for stride in [256usize, 1024, 4096, 16384] {
        let target = mutate(&dictionary, stride);
        for (name, opts) in layouts() {
            let delta = encoder::encode_all(&dictionary, &target, &opts).unwrap();
            let ratio = delta.len() as f64 / target.len() as f64;
            csv.push_str(&format!(
                "{stride},{name},{},{},{ratio}\n",
                delta.len(),
                target.len()
            ));
        }
    }
    let out_dir = Path::new("target/criterion/custom_reports");
    let _ = fs::create_dir_all(out_dir);
    let _ = fs::write(out_dir.join("ratio_snapshot.csv"), csv);
}

fn bench_encoding_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("encoding_speed_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let dictionary = gen_data(size, 1);
        let target = mutate(&dictionary, 1024);
        g.throughput(Throughput::Bytes(size as u64));
        for (name, opts) in layouts() {
            g.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    let delta =
                        encoder::encode_all(black_box(&dictionary), black_box(&target), &opts)
                            .unwrap();
                    black_box(delta);
                });
            });
        }
    }
    g.finish();
}

fn bench_decoding_speed(c: &mut Criterion) {
    let mut g = c.benchmark_group("decoding_speed_mb_s");
    for size in [64 * 1024usize, 1024 * 1024, 8 * 1024 * 1024] {
        let dictionary = gen_data(size, 2);
        let target = mutate(&dictionary, 2048);
        g.throughput(Throughput::Bytes(size as u64));
        for (name, opts) in layouts() {
            let delta = encoder::encode_all(&dictionary, &target, &opts).unwrap();
            let dopts = DecodeOptions::default();
            g.bench_with_input(BenchmarkId::new(name, size), &size, |b, _| {
                b.iter(|| {
                    let out = decoder::decode_all(black_box(&dictionary), black_box(&delta), &dopts)
                        .unwrap();
                    black_box(out);
                });
            });
        }
    }
    g.finish();
}

fn bench_ratio_vs_stride(c: &mut Criterion) {
    write_ratio_snapshot();
    let mut g = c.benchmark_group("compression_ratio_vs_stride");
    let dictionary = gen_data(2 * 1024 * 1024, 3);
    for stride in [256usize, 1024, 4096, 16384] {
        let target = mutate(&dictionary, stride);
        let opts = EncodeOptions::default();
        g.bench_with_input(BenchmarkId::from_parameter(stride), &stride, |b, _| {
            b.iter(|| {
                let delta = encoder::encode_all(&dictionary, &target, &opts).unwrap();
                let ratio = delta.len() as f64 / target.len() as f64;
                black_box(ratio);
            });
        });
    }
    g.finish();
}

fn bench_block_index(c: &mut Criterion) {
    let mut g = c.benchmark_group("block_index_build");
    for size in [256 * 1024usize, 4 * 1024 * 1024] {
        let data = gen_data(size, 4);
        g.throughput(Throughput::Bytes(size as u64));
        g.bench_with_input(BenchmarkId::from_parameter(size), &size, |b, _| {
            let rolling = RollingHash::new(16);
            b.iter(|| {
                let mut index = BlockHashIndex::new(size / 16, 16, 0, 64);
                index.add_all_blocks(&rolling, black_box(&data));
                black_box(index.len());
            });
        });
    }
    g.finish();
}

criterion_group!(
    benches,
    bench_encoding_speed,
    bench_decoding_speed,
    bench_ratio_vs_stride,
    bench_block_index
);
criterion_main!(benches);
