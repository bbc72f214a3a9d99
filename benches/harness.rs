use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use flow_eval::metrics::{AggregationStrategy, ErrorSample, MetricAggregator};
use flow_eval::{forward_interpolate, FlowField, Image, PaddingMode, SizePadder};
use ndarray::Array3;

fn swirl(height: usize, width: usize) -> FlowField {
    let (cy, cx) = (height as f32 / 2.0, width as f32 / 2.0);
    let data = Array3::from_shape_fn((2, height, width), |(c, y, x)| {
        let (dy, dx) = (y as f32 - cy, x as f32 - cx);
        if c == 0 {
            -dy * 0.05 + 1.5
        } else {
            dx * 0.05 - 0.5
        }
    });
    FlowField::new(data).unwrap()
}

fn bench_padding(c: &mut Criterion) {
    let mut group = c.benchmark_group("padding");
    // Sintel and KITTI frame sizes.
    let sizes = [
        (436, 1024, PaddingMode::Centered),
        (375, 1242, PaddingMode::BottomAligned),
    ];
    for (h, w, mode) in sizes {
        let image = Image::zeros(h, w);
        group.throughput(Throughput::Elements((h * w) as u64));
        let id = BenchmarkId::new("pad_pair", format!("{}x{}", h, w));
        group.bench_with_input(id, &image, |b, image| {
            let padder = SizePadder::new(image.dims(), 8, mode).unwrap();
            b.iter(|| black_box(padder.pad(&[image, image]).unwrap()));
        });
    }
    group.finish();
}

fn bench_forward_interpolate(c: &mut Criterion) {
    let mut group = c.benchmark_group("forward_interpolate");
    // Low-resolution flow is 1/8 of the frame.
    for &(h, w) in &[(55, 128), (47, 156), (110, 256)] {
        let flow = swirl(h, w);
        group.throughput(Throughput::Elements((h * w) as u64));
        let id = BenchmarkId::from_parameter(format!("{}x{}", h, w));
        group.bench_with_input(id, &flow, |b, flow| {
            b.iter(|| black_box(forward_interpolate(flow)));
        });
    }
    group.finish();
}

fn bench_aggregation(c: &mut Criterion) {
    let pixels = 436 * 1024;
    let epe: Vec<f32> = (0..pixels).map(|i| (i % 97) as f32 * 0.1).collect();

    c.bench_function("aggregate_sintel_frame", |b| {
        b.iter(|| {
            let mut aggregator = MetricAggregator::new(AggregationStrategy::PooledPixels);
            aggregator.add_sample(ErrorSample::new(epe.clone(), None, None).unwrap());
            black_box(aggregator.finalize().unwrap())
        });
    });
}

criterion_group!(benches, bench_padding, bench_forward_interpolate, bench_aggregation);
criterion_main!(benches);
