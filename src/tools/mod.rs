//! File and dataset helpers shared by the CLI and the benches

use std::collections::BTreeMap;
use std::env;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use image::GenericImageView;

use crate::decoder::DecodeEngine;
use crate::models::PixelBuffer;

const IMAGE_EXTENSIONS: &[&str] = &["png", "jpg", "jpeg", "gif", "bmp"];

/// `QR_MAX_DIM`: downscale loaded images so the longer side fits. `0` or unset disables.
fn max_dim_from_env() -> Option<u32> {
    env::var("QR_MAX_DIM")
        .ok()
        .and_then(|v| v.trim().parse::<u32>().ok())
        .filter(|&v| v > 0)
}

/// Load an image file as an RGB pixel buffer, honouring `QR_MAX_DIM`
pub fn load_pixel_buffer(path: &Path) -> Result<PixelBuffer, image::ImageError> {
    let img = image::open(path)?;
    let img = match max_dim_from_env() {
        Some(max_dim) if img.dimensions().0.max(img.dimensions().1) > max_dim => {
            img.resize(max_dim, max_dim, image::imageops::FilterType::Triangle)
        }
        _ => img,
    };
    let rgb = img.to_rgb8();
    let (width, height) = rgb.dimensions();
    PixelBuffer::from_rgb(width as usize, height as usize, rgb.into_raw()).map_err(|err| {
        image::ImageError::Parameter(image::error::ParameterError::from_kind(
            image::error::ParameterErrorKind::Generic(err.to_string()),
        ))
    })
}

/// Default dataset root from `QR_DATASET_ROOT`
pub fn dataset_root_from_env() -> PathBuf {
    env::var("QR_DATASET_ROOT")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("benches/images"))
}

/// Image limit from `QR_BENCH_LIMIT`; unset or `0` means the whole dataset
pub fn bench_limit_from_env() -> Option<usize> {
    env::var("QR_BENCH_LIMIT")
        .ok()
        .and_then(|v| v.trim().parse::<usize>().ok())
        .filter(|&v| v > 0)
}

/// Smoke flag from `QR_SMOKE`
pub fn smoke_from_env() -> bool {
    matches!(
        env::var("QR_SMOKE").as_deref(),
        Ok("1") | Ok("true") | Ok("TRUE") | Ok("yes") | Ok("YES")
    )
}

/// Sorted dataset image paths, optionally restricted to `_smoke.txt` and truncated
pub fn dataset_images(root: &Path, limit: Option<usize>, smoke: bool) -> Vec<PathBuf> {
    let mut images = if smoke {
        load_smoke_list(root).unwrap_or_else(|| collect_images(root))
    } else {
        collect_images(root)
    };
    images.sort();
    if let Some(limit) = limit {
        images.truncate(limit);
    }
    images
}

fn load_smoke_list(root: &Path) -> Option<Vec<PathBuf>> {
    let contents = fs::read_to_string(root.join("_smoke.txt")).ok()?;
    let paths: Vec<PathBuf> = contents
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(|line| {
            let candidate = Path::new(line);
            if candidate.is_absolute() {
                candidate.to_path_buf()
            } else {
                root.join(candidate)
            }
        })
        .filter(|path| path.exists())
        .collect();
    if paths.is_empty() { None } else { Some(paths) }
}

fn is_image(path: &Path) -> bool {
    path.extension()
        .map(|ext| ext.to_string_lossy().to_lowercase())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.as_str()))
}

fn collect_images(root: &Path) -> Vec<PathBuf> {
    let mut stack = vec![root.to_path_buf()];
    let mut images = Vec::new();
    while let Some(dir) = stack.pop() {
        let Ok(entries) = fs::read_dir(&dir) else {
            continue;
        };
        for path in entries.flatten().map(|entry| entry.path()) {
            if path.is_dir() {
                stack.push(path);
            } else if is_image(&path) {
                images.push(path);
            }
        }
    }
    images
}

/// Per-category decode statistics
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CategoryRate {
    /// Images tried
    pub total: usize,
    /// Images that produced a payload
    pub decoded: usize,
    /// Sum of search attempts over decoded images
    pub attempts: usize,
    /// Wall time spent decoding
    pub elapsed: Duration,
}

impl CategoryRate {
    /// Percentage of images decoded
    pub fn rate(&self) -> f64 {
        if self.total == 0 {
            0.0
        } else {
            self.decoded as f64 * 100.0 / self.total as f64
        }
    }
}

/// Decode rate over a dataset, grouped by the image's parent directory
#[derive(Debug, Clone, Default)]
pub struct ReadingRateReport {
    /// Category name to statistics
    pub categories: BTreeMap<String, CategoryRate>,
    /// Images that could not be loaded
    pub unreadable: Vec<PathBuf>,
}

impl ReadingRateReport {
    /// Mean of the per-category rates
    pub fn average_rate(&self) -> f64 {
        if self.categories.is_empty() {
            return 0.0;
        }
        self.categories.values().map(CategoryRate::rate).sum::<f64>() / self.categories.len() as f64
    }
}

fn category_of(path: &Path) -> String {
    path.parent()
        .and_then(Path::file_name)
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| "root".to_string())
}

/// Run the full decode search over every path
pub fn measure_reading_rate(engine: &DecodeEngine, paths: &[PathBuf]) -> ReadingRateReport {
    let mut report = ReadingRateReport::default();
    for path in paths {
        let buffer = match load_pixel_buffer(path) {
            Ok(buffer) => buffer,
            Err(err) => {
                tracing::warn!(path = %path.display(), error = %err, "skipping unreadable image");
                report.unreadable.push(path.clone());
                continue;
            }
        };
        let entry = report.categories.entry(category_of(path)).or_default();
        let start = Instant::now();
        let outcome = engine.search(&buffer);
        entry.elapsed += start.elapsed();
        entry.total += 1;
        if let Ok(outcome) = outcome {
            entry.decoded += 1;
            entry.attempts += outcome.attempts;
        }
    }
    report
}

/// Count the QR codes labelled in a BoofCV-format ground-truth file.
///
/// Handles the `SETS` layout (one line of 8 floats per code) and the legacy
/// layout (four 2-float corner lines per code). Unreadable files count as 0.
pub fn parse_expected_qr_count(txt_path: &Path) -> usize {
    let Ok(content) = fs::read_to_string(txt_path) else {
        return 0;
    };

    fn numeric_tokens(line: &str) -> Option<usize> {
        let mut count = 0usize;
        for token in line.split_whitespace() {
            token.parse::<f64>().ok()?;
            count += 1;
        }
        (count > 0).then_some(count)
    }

    let mut saw_sets = false;
    let mut full_lines = 0usize;
    let mut corner_lines = 0usize;
    for line in content.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        if line.eq_ignore_ascii_case("SETS") {
            saw_sets = true;
            full_lines = 0;
            continue;
        }
        match numeric_tokens(line) {
            Some(n) if n >= 8 => full_lines += 1,
            Some(2) if !saw_sets => corner_lines += 1,
            _ => {}
        }
    }

    if saw_sets || full_lines > 0 {
        full_lines
    } else {
        corner_lines / 4
    }
}
