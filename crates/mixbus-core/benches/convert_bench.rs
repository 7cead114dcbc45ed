use criterion::{black_box, criterion_group, criterion_main, Criterion};
use mixbus_core::convert::FormatConverter;
use mixbus_core::format::{AudioFormat, SampleFormat};

fn bench_stereo_passthrough(c: &mut Criterion) {
    let fmt = AudioFormat::new(SampleFormat::S16LE, 48_000, 2);
    let mut converter = FormatConverter::new(fmt, fmt, 1024);
    let input = vec![0u8; 1024 * fmt.frame_bytes()];
    let mut out = Vec::new();

    c.bench_function("convert stereo s16 passthrough 1024 frames", |b| {
        b.iter(|| {
            out.clear();
            converter.process(black_box(&input), &mut out);
        });
    });
}

fn bench_5_1_to_stereo_resample(c: &mut Criterion) {
    let in_fmt = AudioFormat::new(SampleFormat::S16LE, 48_000, 6);
    let out_fmt = AudioFormat::new(SampleFormat::S16LE, 44_100, 2);
    let mut converter = FormatConverter::new(in_fmt, out_fmt, 1024);
    let input = vec![0u8; 1024 * in_fmt.frame_bytes()];
    let mut out = Vec::new();

    c.bench_function("convert 5.1->stereo with resample 1024 frames", |b| {
        b.iter(|| {
            out.clear();
            converter.process(black_box(&input), &mut out);
        });
    });
}

criterion_group!(benches, bench_stereo_passthrough, bench_5_1_to_stereo_resample);
criterion_main!(benches);
