#![allow(dead_code)]

use std::fs;
use std::path::Path;

use image::{Rgb, RgbImage};

pub fn bmp_bytes(width: u32, height: u32) -> Vec<u8> {
    let row_stride = (width * 3).div_ceil(4) * 4;
    let pixel_array_size = row_stride * height;
    let file_size = 54 + pixel_array_size;

    let mut bytes = Vec::with_capacity(file_size as usize);
    bytes.extend_from_slice(b"BM");
    bytes.extend_from_slice(&file_size.to_le_bytes());
    bytes.extend_from_slice(&[0, 0, 0, 0]);
    bytes.extend_from_slice(&54u32.to_le_bytes());

    bytes.extend_from_slice(&40u32.to_le_bytes());
    bytes.extend_from_slice(&(width as i32).to_le_bytes());
    bytes.extend_from_slice(&(height as i32).to_le_bytes());
    bytes.extend_from_slice(&1u16.to_le_bytes());
    bytes.extend_from_slice(&24u16.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&pixel_array_size.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&2835u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());
    bytes.extend_from_slice(&0u32.to_le_bytes());

    bytes.resize(file_size as usize, 0);
    bytes
}

/// Writes a black BMP; enough for header-only dimension reads.
pub fn write_bmp(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    fs::write(path, bmp_bytes(width, height)).expect("write bmp file");
}

/// Writes a decodable PNG whose red channel encodes `x` and green `y`, so a
/// cropped copy can be checked pixel by pixel.
pub fn write_png(path: &Path, width: u32, height: u32) {
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("create parent dir");
    }
    let img = RgbImage::from_fn(width, height, |x, y| Rgb([x as u8, y as u8, 0]));
    img.save(path).expect("write png file");
}

/// A COCO file with two 100x80 images, two categories and three
/// annotations: a detection, a polygon segmentation and an RLE mask.
pub const SAMPLE_COCO: &str = r#"{
  "images": [
    {"id": 1, "file_name": "a.png", "width": 100, "height": 80},
    {"id": 2, "file_name": "b.png", "width": 100, "height": 80}
  ],
  "categories": [
    {"id": 0, "name": "cat"},
    {"id": 1, "name": "dog"}
  ],
  "annotations": [
    {"id": 10, "image_id": 1, "category_id": 0, "bbox": [10, 20, 30, 40]},
    {"id": 11, "image_id": 1, "category_id": 1,
     "segmentation": [[50, 10, 70, 10, 70, 30, 50, 30]]},
    {"id": 12, "image_id": 2, "category_id": 0,
     "segmentation": {"size": [80, 100], "counts": [163, 3, 77, 3, 77, 3, 7674]}}
  ]
}"#;

/// Writes `SAMPLE_COCO` as `annotations.json` plus its two images into `dir`.
pub fn write_sample_coco(dir: &Path) {
    fs::create_dir_all(dir).expect("create coco dir");
    fs::write(dir.join("annotations.json"), SAMPLE_COCO).expect("write coco json");
    write_png(&dir.join("a.png"), 100, 80);
    write_png(&dir.join("b.png"), 100, 80);
}

/// Writes a YOLO manifest at `dir/data.yaml` with images under
/// `dir/images` and labels mirrored under `dir/labels`.
pub fn write_sample_yolo(dir: &Path) {
    write_bmp(&dir.join("images/img_a.bmp"), 100, 100);
    write_bmp(&dir.join("images/img_b.bmp"), 200, 100);
    write_bmp(&dir.join("images/img_c.bmp"), 50, 50);

    fs::write(
        dir.join("data.yaml"),
        "path: images\nnames:\n  0: person\n  1: bicycle\n",
    )
    .expect("write data yaml");

    fs::create_dir_all(dir.join("labels")).expect("create labels dir");
    fs::write(
        dir.join("labels/img_a.txt"),
        "0 0.1 0.1 0.9 0.1 0.9 0.9 0.1 0.9\n",
    )
    .expect("write label file a");
    fs::write(
        dir.join("labels/img_b.txt"),
        "1 0.5 0.5 0.5 0.5\n0 0.25 0.5 0.1 0.2\n",
    )
    .expect("write label file b");
    // img_c intentionally has no label file.
}
