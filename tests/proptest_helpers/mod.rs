#![allow(dead_code)]

use std::collections::BTreeMap;

use labelset::dataset::{DatasetParts, ImageRecord};
use labelset::geometry::{BBox, Point};
use labelset::{Annotation, ClassId, ClassTaxonomy, Dataset};
use proptest::prelude::*;
use proptest::strategy::BoxedStrategy;
use proptest::test_runner::{Config as ProptestConfig, FileFailurePersistence};

pub const EPS_COCO: f64 = 1e-10;

/// YOLO writes six decimals of a normalized coordinate.
pub fn eps_yolo(image_w: u32, image_h: u32) -> f64 {
    image_w.max(image_h) as f64 * 1e-6
}

pub fn proptest_config() -> ProptestConfig {
    let cases = std::env::var("PROPTEST_CASES")
        .ok()
        .and_then(|v| v.parse::<u32>().ok())
        .unwrap_or(64);

    let mut config = ProptestConfig::with_failure_persistence(FileFailurePersistence::WithSource(
        "proptest-regressions",
    ));
    config.cases = cases;
    config.max_shrink_iters = 1024;
    config
}

/// What an annotation means independent of ids: which image (by file name),
/// which class (by name), and its geometry.
#[derive(Clone, Debug, PartialEq)]
pub struct AnnSem {
    pub image_file: String,
    pub class_name: String,
    pub bbox: Option<[f64; 4]>,
    pub points: Option<Vec<(f64, f64)>>,
}

/// Annotation semantics sorted so datasets with different ids compare.
pub fn ann_semantics(dataset: &Dataset) -> Vec<AnnSem> {
    let file_by_id: BTreeMap<_, _> = dataset
        .images()
        .map(|(id, record)| (id, record.file_name.clone()))
        .collect();

    let mut out: Vec<AnnSem> = dataset
        .annotations()
        .map(|(_, image_id, ann)| AnnSem {
            image_file: file_by_id.get(&image_id).cloned().unwrap_or_default(),
            class_name: dataset.class_name(ann.class_id).unwrap_or("").to_string(),
            bbox: ann.bbox().map(|b| [b.x, b.y, b.width, b.height]),
            points: ann
                .points()
                .map(|pts| pts.iter().map(|p| (p.x, p.y)).collect()),
        })
        .collect();
    out.sort_by(|a, b| {
        (&a.image_file, &a.class_name)
            .cmp(&(&b.image_file, &b.class_name))
            .then(a.bbox.partial_cmp(&b.bbox).unwrap_or(std::cmp::Ordering::Equal))
    });
    out
}

pub fn assert_semantics_close(left: &[AnnSem], right: &[AnnSem], eps: f64) -> Result<(), String> {
    if left.len() != right.len() {
        return Err(format!(
            "annotation count differs: {} vs {}",
            left.len(),
            right.len()
        ));
    }
    for (a, b) in left.iter().zip(right) {
        if a.image_file != b.image_file || a.class_name != b.class_name {
            return Err(format!("annotation owner or class differs: {a:?} vs {b:?}"));
        }
        match (&a.bbox, &b.bbox) {
            (Some(x), Some(y)) => {
                if x.iter().zip(y).any(|(p, q)| (p - q).abs() > eps) {
                    return Err(format!("bbox differs: {x:?} vs {y:?}"));
                }
            }
            (None, None) => {}
            _ => return Err(format!("bbox presence differs: {a:?} vs {b:?}")),
        }
        match (&a.points, &b.points) {
            (Some(x), Some(y)) => {
                if x.len() != y.len() {
                    return Err(format!("point count differs: {} vs {}", x.len(), y.len()));
                }
                for (p, q) in x.iter().zip(y) {
                    if (p.0 - q.0).abs() > eps || (p.1 - q.1).abs() > eps {
                        return Err(format!("point differs: {p:?} vs {q:?}"));
                    }
                }
            }
            (None, None) => {}
            _ => return Err(format!("polygon presence differs: {a:?} vs {b:?}")),
        }
    }
    Ok(())
}

/// A box strictly inside a `width x height` image.
pub fn arb_bbox_within(width: u32, height: u32) -> BoxedStrategy<BBox> {
    let w = width as f64;
    let h = height as f64;
    (0.0..w - 2.0, 0.0..h - 2.0)
        .prop_flat_map(move |(x, y)| (Just(x), Just(y), 1.0..(w - x), 1.0..(h - y)))
        .prop_map(|(x, y, bw, bh)| BBox::new(x, y, bw, bh))
        .boxed()
}

/// A triangle or a quadrilateral inside the image.
///
/// Vertices are drawn from the quadrants of a random box (the triangle's
/// third vertex from the lower half) so the polygon never degenerates.
/// `min_points` of 4 rules out triangles.
pub fn arb_polygon_within(width: u32, height: u32, min_points: usize) -> BoxedStrategy<Vec<Point>> {
    let quads = arb_bbox_within(width, height)
        .prop_flat_map(|b| {
            let (x0, y0, x1, y1) = (b.xmin(), b.ymin(), b.xmax(), b.ymax());
            let mx = (x0 + x1) / 2.0;
            let my = (y0 + y1) / 2.0;
            (
                (x0..mx, y0..my),
                (mx..x1, y0..my),
                (mx..x1, my..y1),
                (x0..mx, my..y1),
            )
        })
        .prop_map(|(a, b, c, d)| {
            vec![
                Point::new(a.0, a.1),
                Point::new(b.0, b.1),
                Point::new(c.0, c.1),
                Point::new(d.0, d.1),
            ]
        });
    if min_points >= 4 {
        return quads.boxed();
    }

    let triangles = arb_bbox_within(width, height)
        .prop_flat_map(|b| {
            let (x0, y0, x1, y1) = (b.xmin(), b.ymin(), b.xmax(), b.ymax());
            let mx = (x0 + x1) / 2.0;
            let my = (y0 + y1) / 2.0;
            ((x0..mx, y0..my), (mx..x1, y0..my), (x0..x1, my..y1))
        })
        .prop_map(|(a, b, c)| {
            vec![
                Point::new(a.0, a.1),
                Point::new(b.0, b.1),
                Point::new(c.0, c.1),
            ]
        });
    prop_oneof![triangles, quads].boxed()
}

#[derive(Clone, Debug)]
enum ShapeSpec {
    Detection(BBox),
    Segmentation(Vec<Point>),
}

fn arb_shape(width: u32, height: u32, min_points: usize) -> BoxedStrategy<ShapeSpec> {
    prop_oneof![
        arb_bbox_within(width, height).prop_map(ShapeSpec::Detection),
        arb_polygon_within(width, height, min_points).prop_map(ShapeSpec::Segmentation),
    ]
    .boxed()
}

/// A dataset of 1..=`max_images` images with detections and polygon
/// segmentations (triangles included) on every class of a small taxonomy.
pub fn arb_dataset(max_images: usize, max_anns_per_image: usize) -> BoxedStrategy<Dataset> {
    arb_dataset_with(max_images, max_anns_per_image, 3)
}

/// Like [`arb_dataset`] but every polygon has at least four points, the
/// shortest segmentation COCO can carry.
pub fn arb_coco_dataset(max_images: usize, max_anns_per_image: usize) -> BoxedStrategy<Dataset> {
    arb_dataset_with(max_images, max_anns_per_image, 4)
}

fn arb_dataset_with(
    max_images: usize,
    max_anns_per_image: usize,
    min_points: usize,
) -> BoxedStrategy<Dataset> {
    let class_count = 1usize..=4;
    let images = prop::collection::vec((8u32..=256, 8u32..=256), 1..=max_images);

    (class_count, images)
        .prop_flat_map(move |(classes, dims)| {
            let per_image: Vec<_> = dims
                .iter()
                .map(|&(w, h)| {
                    prop::collection::vec(
                        (0..classes as u64, arb_shape(w, h, min_points)),
                        0..=max_anns_per_image,
                    )
                })
                .collect();
            (Just(classes), Just(dims), per_image)
        })
        .prop_map(|(classes, dims, per_image)| {
            let taxonomy = ClassTaxonomy::from_pairs(
                (0..classes as u64).map(|id| (ClassId(id), format!("class_{id}"))),
            )
            .expect("unique class names");
            let mut parts = DatasetParts::new(taxonomy, "/data");
            let mut next_ann = 0u64;
            for (index, ((w, h), anns)) in dims.into_iter().zip(per_image).enumerate() {
                let image_id = index as u64;
                parts.add_image(image_id, ImageRecord::new(format!("img_{index:03}.png"), w, h));
                for (class_id, shape) in anns {
                    let annotation = match shape {
                        ShapeSpec::Detection(bbox) => Annotation::detection(class_id, bbox),
                        ShapeSpec::Segmentation(points) => {
                            Annotation::segmentation(class_id, points)
                        }
                    }
                    .expect("generated geometry is valid");
                    parts.add_annotation(next_ann, image_id, annotation);
                    next_ann += 1;
                }
            }
            Dataset::from_parts(parts).expect("generated dataset is consistent")
        })
        .boxed()
}

/// The same registries rooted at `data_path`.
pub fn rebased(dataset: &Dataset, data_path: &std::path::Path) -> Dataset {
    let mut parts = DatasetParts::new(dataset.taxonomy().clone(), data_path);
    for (id, record) in dataset.images() {
        parts.add_image(id, record.clone());
    }
    for (id, image_id, ann) in dataset.annotations() {
        parts.add_annotation(id, image_id, ann.clone());
    }
    Dataset::from_parts(parts).expect("rebased dataset is consistent")
}
