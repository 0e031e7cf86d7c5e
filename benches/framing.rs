//! Benchmarks for the conversion and framing hot path
//!
//! Run with: cargo bench

use adcstream_rs::convert::{combine, UnitConverter};
use adcstream_rs::framer::TelemetryFramer;
use adcstream_rs::types::{BufferSlot, Calibration, Channel, ChannelId, FrameValue, SampleBuffer};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

fn filled_buffer(size: usize) -> SampleBuffer {
    let mut buffer = SampleBuffer::new(ChannelId(0), BufferSlot::One, size);
    let block: Vec<u16> = (0..size as u16).collect();
    buffer.fill(&block);
    buffer
}

fn bench_calibration(c: &mut Criterion) {
    let mut group = c.benchmark_group("calibration");
    let channel = Channel {
        id: ChannelId(0),
        adc_channel: 9,
        calibration: Calibration {
            offset: -120,
            gain: 3,
        },
    };

    for size in [1usize, 64, 1024].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let buffer = filled_buffer(size);
            let mut converter = UnitConverter::new();
            b.iter(|| {
                black_box(converter.convert(black_box(&buffer), &channel).unwrap());
            });
        });
    }

    group.finish();
}

fn bench_framing(c: &mut Criterion) {
    let mut group = c.benchmark_group("framing");

    group.bench_function("unsigned", |b| {
        let mut framer = TelemetryFramer::new();
        b.iter(|| black_box(framer.frame(FrameValue::Unsigned(black_box(123_456)))));
    });

    group.bench_function("signed_negative", |b| {
        let mut framer = TelemetryFramer::new();
        b.iter(|| black_box(framer.frame(FrameValue::Signed(black_box(-40)))));
    });

    group.finish();
}

fn bench_full_round(c: &mut Criterion) {
    // Convert two channels, combine, frame: one differential round minus I/O
    let channel = Channel {
        id: ChannelId(0),
        adc_channel: 9,
        calibration: Calibration::default(),
    };
    let buffer_a = filled_buffer(1);
    let buffer_b = filled_buffer(1);

    c.bench_function("differential_round", |b| {
        let mut converter = UnitConverter::new();
        let mut framer = TelemetryFramer::new();
        b.iter(|| {
            let a = converter.convert(black_box(&buffer_a), &channel).unwrap();
            let v = converter.convert(black_box(&buffer_b), &channel).unwrap();
            black_box(framer.frame(FrameValue::Signed(combine(a, v))))
        });
    });
}

criterion_group!(benches, bench_calibration, bench_framing, bench_full_round);
criterion_main!(benches);
