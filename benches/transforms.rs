use criterion::{Criterion, black_box, criterion_group, criterion_main};
use qr_relay::models::{PixelBuffer, Preprocess, Rotation, TransformDescriptor};
use qr_relay::utils::grayscale::to_grayscale;
use qr_relay::utils::transform::{apply, contrast_stretch, crop_center, rotate, upscale_nearest};

fn gray_frame(width: usize, height: usize) -> PixelBuffer {
    let data = (0..width * height).map(|i| (i % 251) as u8).collect();
    PixelBuffer::from_gray(width, height, data).unwrap()
}

fn bench_to_grayscale_640x480(c: &mut Criterion) {
    let frame = PixelBuffer::from_rgb(640, 480, vec![128u8; 640 * 480 * 3]).unwrap();
    c.bench_function("to_grayscale_640x480", |b| b.iter(|| to_grayscale(black_box(&frame))));
}

fn bench_to_grayscale_1920x1080(c: &mut Criterion) {
    let frame = PixelBuffer::from_rgb(1920, 1080, vec![128u8; 1920 * 1080 * 3]).unwrap();
    c.bench_function("to_grayscale_1920x1080", |b| b.iter(|| to_grayscale(black_box(&frame))));
}

fn bench_crop_center_640x480(c: &mut Criterion) {
    let frame = gray_frame(640, 480);
    c.bench_function("crop_center_070_640x480", |b| {
        b.iter(|| crop_center(black_box(&frame), black_box(0.7)))
    });
}

fn bench_rotate_640x480(c: &mut Criterion) {
    let frame = gray_frame(640, 480);
    c.bench_function("rotate_90_640x480", |b| {
        b.iter(|| rotate(black_box(&frame), black_box(Rotation::Deg90)))
    });
}

fn bench_upscale_640x480(c: &mut Criterion) {
    let frame = gray_frame(640, 480);
    c.bench_function("upscale_2_5_640x480", |b| {
        b.iter(|| upscale_nearest(black_box(&frame), black_box(2.5)))
    });
}

fn bench_contrast_stretch_640x480(c: &mut Criterion) {
    let frame = gray_frame(640, 480);
    c.bench_function("contrast_stretch_640x480", |b| {
        b.iter(|| contrast_stretch(black_box(&frame)))
    });
}

fn bench_apply_worst_descriptor(c: &mut Criterion) {
    let frame = gray_frame(640, 480);
    let descriptor = TransformDescriptor {
        crop: 0.85,
        rotation: Rotation::Deg270,
        scale: 2.5,
        preprocess: Preprocess::ContrastInverted,
    };
    c.bench_function("apply_crop_rotate_scale_invert_640x480", |b| {
        b.iter(|| apply(black_box(&frame), black_box(&descriptor)))
    });
}

criterion_group!(
    benches,
    bench_to_grayscale_640x480,
    bench_to_grayscale_1920x1080,
    bench_crop_center_640x480,
    bench_rotate_640x480,
    bench_upscale_640x480,
    bench_contrast_stretch_640x480,
    bench_apply_worst_descriptor
);
criterion_main!(benches);
