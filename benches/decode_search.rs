use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use qr_relay::decoder::DecodeEngine;
use qr_relay::models::PixelBuffer;
use qr_relay::tools::{
    bench_limit_from_env, dataset_images, dataset_root_from_env, load_pixel_buffer, smoke_from_env,
};
use qrcode::{Color, QrCode};

fn symbol(text: &str, module_px: usize) -> PixelBuffer {
    let code = QrCode::new(text.as_bytes()).unwrap();
    let modules = code.width();
    let colors = code.to_colors();
    let side = (modules + 8) * module_px;
    let mut data = vec![255u8; side * side];
    for (i, color) in colors.iter().enumerate() {
        if *color != Color::Dark {
            continue;
        }
        let x0 = (i % modules + 4) * module_px;
        let y0 = (i / modules + 4) * module_px;
        for y in y0..y0 + module_px {
            data[y * side + x0..y * side + x0 + module_px].fill(0);
        }
    }
    PixelBuffer::from_gray(side, side, data).unwrap()
}

fn bench_live_attempt(c: &mut Criterion) {
    let engine = DecodeEngine::new();
    let frame = symbol("QR123", 6);
    c.bench_function("decode_live_clean_symbol", |b| {
        b.iter(|| engine.decode_live(black_box(&frame)))
    });
}

fn bench_search_first_hit(c: &mut Criterion) {
    let engine = DecodeEngine::new();
    let frame = symbol("QR123", 6);
    c.bench_function("search_clean_symbol", |b| b.iter(|| engine.search(black_box(&frame))));
}

/// Every one of the 108 attempts runs on a frame with nothing in it
fn bench_search_exhausted(c: &mut Criterion) {
    let mut group = c.benchmark_group("search_exhausted");
    group.sample_size(10);
    let engine = DecodeEngine::new();
    for (w, h) in [(160, 120), (320, 240)] {
        let frame = PixelBuffer::from_gray(w, h, vec![200u8; w * h]).unwrap();
        group.bench_with_input(BenchmarkId::from_parameter(format!("{w}x{h}")), &frame, |b, frame| {
            b.iter(|| engine.search(black_box(frame)))
        });
    }
    group.finish();
}

fn bench_dataset(c: &mut Criterion) {
    let root = dataset_root_from_env();
    if !root.exists() {
        println!("Warning: No test images found at {:?}", root);
        return;
    }
    let images = dataset_images(&root, bench_limit_from_env().or(Some(5)), smoke_from_env());
    if images.is_empty() {
        println!("Warning: No test images found under {:?}", root);
        return;
    }

    let engine = DecodeEngine::new();
    let mut group = c.benchmark_group("dataset_search");
    group.sample_size(10);
    for path in images {
        let Ok(frame) = load_pixel_buffer(&path) else {
            continue;
        };
        let name = path.strip_prefix(&root).unwrap_or(&path).to_string_lossy().into_owned();
        group.bench_with_input(BenchmarkId::new("search", name), &frame, |b, frame| {
            b.iter(|| engine.search(black_box(frame)))
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_live_attempt,
    bench_search_first_hit,
    bench_search_exhausted,
    bench_dataset
);
criterion_main!(benches);
