//! COCO JSON reader and writer.
//!
//! # Format reference
//!
//! COCO boxes are `[x, y, width, height]` with `(x, y)` the top-left corner
//! in pixels, which is also how [`BBox`] stores them, so no conversion is
//! needed. Segmentations come in three encodings, all accepted on read:
//!
//! - polygons: `[[x0, y0, x1, y1, ...], ...]` (a single flat list is also
//!   accepted)
//! - uncompressed RLE: `{"size": [h, w], "counts": [u32, ...]}`
//! - compressed RLE: `{"size": [h, w], "counts": "..."}`
//!
//! Every encoding ends up as one point list. Several polygons, or an RLE
//! mask with several regions, are flattened into a single polygon. That is
//! lossy: separate regions are joined into one outline.
//!
//! # Deterministic output
//!
//! The writer sorts every list by id and always writes polygons, so saving
//! the same dataset twice produces identical bytes.

use std::fs::File;
use std::io::{BufReader, BufWriter};
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use super::rle::{rle_to_points, Rle};
use crate::annotation::Annotation;
use crate::dataset::{ClassTaxonomy, Dataset, DatasetParts, ImageRecord};
use crate::error::LabelsetError;
use crate::geometry::{BBox, Point};

/// Minimum number of points a COCO segmentation must resolve to.
pub const MIN_COCO_POINTS: usize = 4;

// ============================================================================
// COCO schema types (internal to this module)
// ============================================================================

#[derive(Debug, Serialize, Deserialize)]
struct CocoDataset {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    info: Option<CocoInfo>,

    #[serde(default)]
    licenses: Vec<CocoLicense>,

    images: Vec<CocoImage>,

    annotations: Vec<CocoAnnotation>,

    categories: Vec<CocoCategory>,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct CocoInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    description: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    version: Option<String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    year: Option<u32>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoLicense {
    id: u64,
    #[serde(default)]
    name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    url: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoImage {
    id: u64,
    width: u32,
    height: u32,
    file_name: String,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoCategory {
    id: u64,
    name: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    supercategory: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
struct CocoAnnotation {
    id: u64,
    image_id: u64,
    category_id: u64,

    /// `[x, y, width, height]`, top-left corner.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bbox: Option<[f64; 4]>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    area: Option<f64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    iscrowd: Option<u8>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    segmentation: Option<CocoSegmentation>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum CocoSegmentation {
    Polygons(Vec<Vec<f64>>),
    Flat(Vec<f64>),
    CompressedRle { size: [u32; 2], counts: String },
    UncompressedRle { size: [u32; 2], counts: Vec<u32> },
}

// ============================================================================
// Public API
// ============================================================================

/// Reads a dataset from a COCO JSON file.
///
/// `images_path` becomes the dataset's data path; image payloads are not
/// touched and dimensions are taken from the file.
///
/// # Errors
/// `CocoJsonParse` for invalid JSON or missing required keys,
/// `MalformedAnnotation` for degenerate geometry, `FormatViolation` for an
/// inconsistent category list.
pub fn read_coco_json(json_path: &Path, images_path: &Path) -> Result<Dataset, LabelsetError> {
    let file = File::open(json_path).map_err(LabelsetError::Io)?;
    let reader = BufReader::new(file);

    let coco: CocoDataset =
        serde_json::from_reader(reader).map_err(|source| LabelsetError::CocoJsonParse {
            path: json_path.to_path_buf(),
            source,
        })?;

    let dataset = coco_to_dataset(coco, json_path, images_path)?;
    tracing::info!(
        path = %json_path.display(),
        images = dataset.len(),
        annotations = dataset.annotation_count(),
        "loaded COCO dataset"
    );
    Ok(dataset)
}

/// Writes a dataset to a COCO JSON file.
///
/// Annotations whose owning image is no longer registered are still
/// written; `image_id` keeps pointing at the missing image.
pub fn write_coco_json(path: &Path, dataset: &Dataset) -> Result<(), LabelsetError> {
    let coco = dataset_to_coco(dataset)?;

    let file = File::create(path).map_err(LabelsetError::Io)?;
    let writer = BufWriter::new(file);

    serde_json::to_writer_pretty(writer, &coco).map_err(|source| LabelsetError::CocoJsonWrite {
        path: path.to_path_buf(),
        source,
    })?;
    tracing::info!(
        path = %path.display(),
        images = coco.images.len(),
        annotations = coco.annotations.len(),
        "wrote COCO dataset"
    );
    Ok(())
}

/// Reads a dataset from a COCO JSON string.
///
/// Useful for testing without file I/O.
pub fn from_coco_str(json: &str, images_path: &Path) -> Result<Dataset, LabelsetError> {
    let source_path = PathBuf::from("<string>");
    let coco: CocoDataset =
        serde_json::from_str(json).map_err(|source| LabelsetError::CocoJsonParse {
            path: source_path.clone(),
            source,
        })?;
    coco_to_dataset(coco, &source_path, images_path)
}

/// Writes a dataset to a COCO JSON string.
pub fn to_coco_string(dataset: &Dataset) -> Result<String, LabelsetError> {
    serde_json::to_string_pretty(&dataset_to_coco(dataset)?).map_err(|source| {
        LabelsetError::CocoJsonWrite {
            path: PathBuf::from("<string>"),
            source,
        }
    })
}

// ============================================================================
// Conversion: COCO -> Dataset
// ============================================================================

fn coco_to_dataset(
    coco: CocoDataset,
    json_path: &Path,
    images_path: &Path,
) -> Result<Dataset, LabelsetError> {
    let mut taxonomy = ClassTaxonomy::new();
    for category in coco.categories {
        taxonomy
            .insert(category.id.into(), category.name)
            .map_err(|conflict| LabelsetError::FormatViolation {
                path: json_path.to_path_buf(),
                message: conflict.to_string(),
            })?;
    }

    let mut parts = DatasetParts::new(taxonomy, images_path);
    for image in coco.images {
        parts.add_image(
            image.id,
            ImageRecord::new(image.file_name, image.width, image.height),
        );
    }

    for ann in coco.annotations {
        let id = ann.id;
        let image_id = ann.image_id;
        let annotation = convert_annotation(ann).map_err(|err| match err {
            LabelsetError::MalformedAnnotation { message } => {
                LabelsetError::malformed(format!("annotation {id}: {message}"))
            }
            other => other,
        })?;
        parts.add_annotation(id, image_id, annotation);
    }

    Dataset::from_parts(parts)
}

fn convert_annotation(ann: CocoAnnotation) -> Result<Annotation, LabelsetError> {
    let bbox = ann.bbox.map(|[x, y, w, h]| BBox::new(x, y, w, h));
    let points = match ann.segmentation {
        Some(segmentation) => segmentation_points(segmentation)?,
        None => None,
    };

    let annotation = match (points, bbox) {
        (Some(points), bbox) => {
            if points.len() < MIN_COCO_POINTS {
                return Err(LabelsetError::malformed(format!(
                    "segmentation resolves to {} point(s), need at least {MIN_COCO_POINTS}",
                    points.len()
                )));
            }
            match bbox {
                Some(bbox) => Annotation::segmentation_with_bbox(ann.category_id, points, bbox)?,
                None => Annotation::segmentation(ann.category_id, points)?,
            }
        }
        (None, Some(bbox)) => Annotation::detection(ann.category_id, bbox)?,
        (None, None) => Annotation::classification(ann.category_id),
    };

    Ok(match ann.area {
        Some(area) if annotation.has_box() => annotation.with_area(area),
        _ => annotation,
    })
}

/// Resolves a segmentation to one point list. `None` for an empty
/// segmentation (`[]` or `[[]]`).
fn segmentation_points(
    segmentation: CocoSegmentation,
) -> Result<Option<Vec<Point>>, LabelsetError> {
    let points = match segmentation {
        CocoSegmentation::Flat(coords) => flat_to_points(&coords)?,
        CocoSegmentation::Polygons(rings) => {
            let non_empty = rings.iter().filter(|ring| !ring.is_empty()).count();
            if non_empty > 1 {
                tracing::warn!(
                    polygons = non_empty,
                    "segmentation has several polygons; flattening into one"
                );
            }
            let mut points = Vec::new();
            for ring in &rings {
                points.extend(flat_to_points(ring)?);
            }
            points
        }
        CocoSegmentation::UncompressedRle {
            size: [height, width],
            counts,
        } => rle_to_points(&Rle::new(height, width, counts))?,
        CocoSegmentation::CompressedRle {
            size: [height, width],
            counts,
        } => rle_to_points(&Rle::from_compressed(height, width, &counts)?)?,
    };

    Ok((!points.is_empty()).then_some(points))
}

fn flat_to_points(coords: &[f64]) -> Result<Vec<Point>, LabelsetError> {
    if coords.len() % 2 != 0 {
        return Err(LabelsetError::malformed(format!(
            "polygon has an odd number of coordinates ({})",
            coords.len()
        )));
    }
    Ok(coords
        .chunks_exact(2)
        .map(|pair| Point::new(pair[0], pair[1]))
        .collect())
}

// ============================================================================
// Conversion: Dataset -> COCO
// ============================================================================

/// # Errors
/// `MalformedAnnotation` for a polygon too short for the COCO loader, so
/// nothing is written that cannot be read back.
fn dataset_to_coco(dataset: &Dataset) -> Result<CocoDataset, LabelsetError> {
    let info = Some(CocoInfo {
        description: Some("Exported by labelset".to_string()),
        version: Some(env!("CARGO_PKG_VERSION").to_string()),
        year: None,
    });

    let images: Vec<CocoImage> = dataset
        .images()
        .map(|(id, record)| CocoImage {
            id: id.as_u64(),
            width: record.width,
            height: record.height,
            file_name: record.file_name.clone(),
        })
        .collect();

    let categories: Vec<CocoCategory> = dataset
        .taxonomy()
        .iter()
        .map(|(id, name)| CocoCategory {
            id: id.as_u64(),
            name: name.to_string(),
            supercategory: None,
        })
        .collect();

    // Registries iterate in ascending id order already.
    let annotations: Vec<CocoAnnotation> = dataset
        .annotations()
        .map(|(id, image_id, ann)| {
            let segmentation = match ann.points() {
                Some(points) if points.len() < MIN_COCO_POINTS => {
                    return Err(LabelsetError::malformed(format!(
                        "annotation {id}: {} point(s) cannot be saved as COCO, need at least {MIN_COCO_POINTS}",
                        points.len()
                    )));
                }
                Some(points) => {
                    CocoSegmentation::Polygons(vec![points.iter().flat_map(|p| [p.x, p.y]).collect()])
                }
                None => CocoSegmentation::Polygons(Vec::new()),
            };
            Ok(CocoAnnotation {
                id: id.as_u64(),
                image_id: image_id.as_u64(),
                category_id: ann.class_id.as_u64(),
                bbox: ann.bbox().map(|b| [b.x, b.y, b.width, b.height]),
                area: ann.area(),
                iscrowd: Some(0),
                segmentation: Some(segmentation),
            })
        })
        .collect::<Result<_, LabelsetError>>()?;

    Ok(CocoDataset {
        info,
        licenses: Vec::new(),
        images,
        annotations,
        categories,
    })
}

// ============================================================================
// Tests
// ============================================================================
