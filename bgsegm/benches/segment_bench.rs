use bgsegm::{ViBe, ViBeParams};
use criterion::{black_box, criterion_group, criterion_main, Criterion};
use image::{GrayImage, Rgb, RgbImage};

const WIDTH: u32 = 320;
const HEIGHT: u32 = 240;

fn noisy_frame(seed: u32) -> RgbImage {
    // Cheap deterministic texture; the model only compares color tuples.
    RgbImage::from_fn(WIDTH, HEIGHT, |x, y| {
        let v = (x * 7 + y * 13 + seed * 31) % 17;
        Rgb([(80 + v) as u8, (90 + v) as u8, (100 + v) as u8])
    })
}

fn bench_segment(c: &mut Criterion) {
    let seed_frame = noisy_frame(0);
    let frame = noisy_frame(1);
    let mut vibe = ViBe::new(
        WIDTH,
        HEIGHT,
        ViBeParams {
            seed: Some(42),
            ..ViBeParams::default()
        },
    );
    let mut mask = GrayImage::new(WIDTH, HEIGHT);
    vibe.segment(&seed_frame, &mut mask).unwrap();

    c.bench_function("segment_320x240", |b| {
        b.iter(|| vibe.segment(black_box(&frame), &mut mask).unwrap())
    });
}

fn bench_update(c: &mut Criterion) {
    let seed_frame = noisy_frame(0);
    let frame = noisy_frame(1);
    let mut vibe = ViBe::new(
        WIDTH,
        HEIGHT,
        ViBeParams {
            seed: Some(42),
            ..ViBeParams::default()
        },
    );
    let mut mask = GrayImage::new(WIDTH, HEIGHT);
    vibe.segment(&seed_frame, &mut mask).unwrap();
    let update_mask = GrayImage::new(WIDTH, HEIGHT);

    c.bench_function("update_320x240", |b| {
        b.iter(|| vibe.update(black_box(&frame), &update_mask).unwrap())
    });
}

criterion_group!(benches, bench_segment, bench_update);
criterion_main!(benches);
