//! Criterion microbenches for labelset parsing and rasterization.
//!
//! Run with: `cargo bench`
//!
//! These benchmarks measure the performance of:
//! - COCO JSON parsing and writing (from_coco_str, to_coco_string)
//! - mask rasterization (Annotation::derive_mask)
//! - RLE decoding and contour tracing (Rle::decode, rle_to_points)

use criterion::{criterion_group, criterion_main, Criterion, Throughput};
use std::hint::black_box;
use std::path::Path;

use labelset::formats::coco::{from_coco_str, to_coco_string};
use labelset::formats::rle::{rle_to_points, Rle};
use labelset::geometry::Point;
use labelset::Annotation;

const COCO_FIXTURE: &str = r#"{
  "images": [
    {"id": 1, "file_name": "image001.jpg", "width": 640, "height": 480},
    {"id": 2, "file_name": "image002.jpg", "width": 800, "height": 600},
    {"id": 3, "file_name": "image003.jpg", "width": 64, "height": 64}
  ],
  "categories": [
    {"id": 1, "name": "person"},
    {"id": 2, "name": "car"},
    {"id": 3, "name": "dog"}
  ],
  "annotations": [
    {"id": 1, "image_id": 1, "category_id": 1, "bbox": [64, 96, 256, 288]},
    {"id": 2, "image_id": 1, "category_id": 2, "bbox": [192, 48, 256, 144],
     "segmentation": [[192, 48, 448, 48, 448, 192, 320, 160, 192, 192]]},
    {"id": 3, "image_id": 2, "category_id": 3,
     "segmentation": [[160, 180, 480, 180, 480, 540, 160, 540]]},
    {"id": 4, "image_id": 3, "category_id": 3,
     "segmentation": {"size": [64, 64], "counts": [1300, 10, 54, 10, 54, 10, 54, 10, 54, 10, 54, 10, 54, 10, 54, 10, 54, 10, 54, 10, 2210]}},
    {"id": 5, "image_id": 3, "category_id": 1}
  ]
}"#;

/// A ring of `n` points around (320, 240).
fn star_polygon(n: usize) -> Vec<Point> {
    (0..n)
        .map(|i| {
            let angle = i as f64 / n as f64 * std::f64::consts::TAU;
            let radius = if i % 2 == 0 { 200.0 } else { 90.0 };
            Point::new(320.0 + radius * angle.cos(), 240.0 + radius * angle.sin())
        })
        .collect()
}

/// Column-major RLE for a filled disc in a `size x size` image.
fn disc_rle(size: u32) -> Rle {
    let center = size as f64 / 2.0;
    let radius = size as f64 / 3.0;
    let mut counts = Vec::new();
    let mut current = false;
    let mut run = 0u32;
    for x in 0..size {
        for y in 0..size {
            let (dx, dy) = (x as f64 + 0.5 - center, y as f64 + 0.5 - center);
            let inside = dx * dx + dy * dy <= radius * radius;
            if inside != current {
                counts.push(run);
                run = 0;
                current = inside;
            }
            run += 1;
        }
    }
    counts.push(run);
    Rle::new(size, size, counts)
}

fn bench_coco_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("coco_parse");
    group.throughput(Throughput::Bytes(COCO_FIXTURE.len() as u64));

    group.bench_function("from_coco_str", |b| {
        b.iter(|| {
            let ds = from_coco_str(black_box(COCO_FIXTURE), Path::new("images")).unwrap();
            black_box(ds)
        })
    });

    group.finish();
}

fn bench_coco_write(c: &mut Criterion) {
    let dataset = from_coco_str(COCO_FIXTURE, Path::new("images")).unwrap();
    let mut group = c.benchmark_group("coco_write");

    group.bench_function("to_coco_string", |b| {
        b.iter(|| {
            let json = to_coco_string(black_box(&dataset)).unwrap();
            black_box(json)
        })
    });

    group.finish();
}

/// Even-odd fill cost grows with edge count and image area.
fn bench_derive_mask(c: &mut Criterion) {
    let mut group = c.benchmark_group("derive_mask");

    for n in [8usize, 64, 512] {
        let annotation = Annotation::segmentation(1u64, star_polygon(n)).unwrap();
        group.throughput(Throughput::Elements(640 * 480));
        group.bench_function(format!("polygon_{n}_640x480"), |b| {
            b.iter(|| black_box(annotation.derive_mask(640, 480).unwrap()))
        });
    }

    group.finish();
}

fn bench_rle(c: &mut Criterion) {
    let rle = disc_rle(256);
    let mut group = c.benchmark_group("rle");
    group.throughput(Throughput::Elements(256 * 256));

    group.bench_function("decode_256", |b| {
        b.iter(|| black_box(black_box(&rle).decode().unwrap()))
    });
    group.bench_function("rle_to_points_256", |b| {
        b.iter(|| black_box(rle_to_points(black_box(&rle)).unwrap()))
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_coco_parse,
    bench_coco_write,
    bench_derive_mask,
    bench_rle
);
criterion_main!(benches);
