//! Ultralytics-style YOLO reader and writer.
//!
//! A YOLO dataset is a YAML manifest plus one text file of labels per image:
//!
//! ```yaml
//! path: images        # image directory, relative to this file
//! names:
//!   0: cat
//!   1: dog
//! ```
//!
//! Each label line is `class_id` followed by normalized `[0, 1]`
//! coordinates. Four coordinates are a box (`cx cy w h`); six or more are a
//! polygon `x1 y1 x2 y2 ...`. YOLO files carry no ids, so image and
//! annotation ids are assigned from 0 in file-name order on every load.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::fs;
use std::path::{Component, Path, PathBuf};

use serde::{Deserialize, Serialize};
use walkdir::WalkDir;

use crate::annotation::Annotation;
use crate::dataset::{ClassId, ClassTaxonomy, Dataset, DatasetParts, ImageRecord};
use crate::error::LabelsetError;
use crate::geometry::{BBox, Normalized, Point};
use crate::store::read_image_dimensions;

const IMAGE_EXTENSIONS: [&str; 5] = ["jpg", "jpeg", "png", "bmp", "webp"];
const LABEL_EXTENSION: &str = "txt";

#[derive(Debug, Deserialize)]
struct DataYaml {
    #[serde(default)]
    path: Option<PathBuf>,
    names: DataYamlNames,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum DataYamlNames {
    Sequence(Vec<String>),
    Mapping(BTreeMap<u64, String>),
}

#[derive(Debug, Serialize)]
struct DataYamlOut {
    path: String,
    names: BTreeMap<u64, String>,
}

/// Geometry of one parsed label line, still in normalized space.
#[derive(Debug, PartialEq)]
pub enum YoloShape {
    Box(BBox<Normalized>),
    Polygon(Vec<Point<Normalized>>),
}

/// One parsed label line.
#[derive(Debug, PartialEq)]
pub struct YoloLabelRow {
    pub class_id: ClassId,
    pub shape: YoloShape,
}

/// Reads a YOLO dataset from its manifest.
///
/// Images without a label file are kept with no annotations.
///
/// # Errors
/// `YoloManifestParse` for a broken manifest, `YoloLabelParse` for a bad
/// label line or an unknown class id, `ImageDimensionRead` if an image
/// header cannot be read.
pub fn read_yolo(yaml_path: &Path) -> Result<Dataset, LabelsetError> {
    let manifest = read_manifest(yaml_path)?;
    let manifest_dir = manifest_parent(yaml_path);
    let images_dir = match &manifest.path {
        Some(path) => manifest_dir.join(path),
        None => manifest_dir.to_path_buf(),
    };
    if !images_dir.is_dir() {
        return Err(LabelsetError::FormatViolation {
            path: yaml_path.to_path_buf(),
            message: format!("image directory '{}' does not exist", images_dir.display()),
        });
    }

    let taxonomy = taxonomy_from_names(manifest.names, yaml_path)?;
    let image_files = collect_images(&images_dir)?;

    let mut parts = DatasetParts::new(taxonomy.clone(), images_dir.clone());
    let mut next_annotation_id: u64 = 0;

    for (index, image_path) in image_files.iter().enumerate() {
        let image_id = index as u64;
        let file_name = image_path
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_default();
        let (width, height) = read_image_dimensions(image_path)?;
        parts.add_image(image_id, ImageRecord::new(file_name, width, height));

        let Some(label_path) = find_label_for_image(image_path) else {
            tracing::debug!(image = %image_path.display(), "no label file; image kept unannotated");
            continue;
        };

        let content = fs::read_to_string(&label_path).map_err(LabelsetError::Io)?;
        for (line_idx, line) in content.lines().enumerate() {
            let line_num = line_idx + 1;
            let Some(row) = parse_label_line(line, &label_path, line_num)? else {
                continue;
            };

            if !taxonomy.contains(row.class_id) {
                return Err(LabelsetError::YoloLabelParse {
                    path: label_path.clone(),
                    line: line_num,
                    message: format!(
                        "class_id {} is not in the manifest's {} class(es)",
                        row.class_id,
                        taxonomy.len()
                    ),
                });
            }

            let annotation = row_to_annotation(row, width, height).map_err(|err| match err {
                LabelsetError::MalformedAnnotation { message } => {
                    LabelsetError::malformed(format!("{}:{line_num}: {message}", label_path.display()))
                }
                other => other,
            })?;
            parts.add_annotation(next_annotation_id, image_id, annotation);
            next_annotation_id += 1;
        }
    }

    let dataset = Dataset::from_parts(parts)?;
    tracing::info!(
        path = %yaml_path.display(),
        images = dataset.len(),
        annotations = dataset.annotation_count(),
        "loaded YOLO dataset"
    );
    Ok(dataset)
}

/// Writes a dataset as YOLO labels plus a manifest at `yaml_path`.
///
/// Label files go next to the images under the dataset's data path, one per
/// registered image (empty if it has no writable annotation). Segmentations
/// are written as polygons and detections as boxes. Classification-only
/// annotations have no YOLO form and are skipped with a warning. Image
/// payloads are not touched.
///
/// # Errors
/// `FormatViolation` if an annotation's class is missing from the taxonomy;
/// nothing is written in that case.
pub fn write_yolo(yaml_path: &Path, dataset: &Dataset) -> Result<(), LabelsetError> {
    for (id, _, annotation) in dataset.annotations() {
        if !dataset.taxonomy().contains(annotation.class_id) {
            return Err(LabelsetError::FormatViolation {
                path: yaml_path.to_path_buf(),
                message: format!(
                    "annotation {id} uses class {} which has no name",
                    annotation.class_id
                ),
            });
        }
    }

    let mut skipped = 0usize;
    for (image_id, record) in dataset.images() {
        let label_path = dataset
            .data_path()
            .join(&record.file_name)
            .with_extension(LABEL_EXTENSION);
        if let Some(parent) = label_path.parent() {
            fs::create_dir_all(parent).map_err(LabelsetError::Io)?;
        }

        let (width, height) = (record.width as f64, record.height as f64);
        let mut body = String::new();
        for (_, annotation) in dataset.annotations_for_image(image_id)? {
            match format_label_line(annotation, width, height) {
                Some(line) => {
                    let _ = writeln!(body, "{line}");
                }
                None => skipped += 1,
            }
        }
        fs::write(&label_path, body).map_err(LabelsetError::Io)?;
    }

    if skipped > 0 {
        tracing::warn!(
            skipped,
            "classification-only annotations have no YOLO form and were not written"
        );
    }
    let orphans = dataset.find_orphan_annotations().len();
    if orphans > 0 {
        tracing::warn!(orphans, "annotations without a registered image were not written");
    }

    write_manifest(yaml_path, dataset)?;
    tracing::info!(
        path = %yaml_path.display(),
        images = dataset.len(),
        "wrote YOLO dataset"
    );
    Ok(())
}

/// Parses one label line. Blank lines yield `None`.
pub fn parse_label_line(
    line: &str,
    file_path: &Path,
    line_num: usize,
) -> Result<Option<YoloLabelRow>, LabelsetError> {
    let trimmed = line.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let parse_error = |message: String| LabelsetError::YoloLabelParse {
        path: file_path.to_path_buf(),
        line: line_num,
        message,
    };

    let mut tokens = trimmed.split_whitespace();
    let class_token = tokens.next().unwrap_or_default();
    let class_id = class_token.parse::<u64>().map_err(|_| {
        parse_error(format!(
            "invalid class_id '{class_token}'; expected non-negative integer"
        ))
    })?;

    let coords = tokens
        .map(|raw| {
            raw.parse::<f64>().map_err(|_| {
                parse_error(format!("invalid coordinate '{raw}'; expected floating-point number"))
            })
        })
        .collect::<Result<Vec<f64>, _>>()?;

    let shape = match coords.len() {
        4 => YoloShape::Box(BBox::from_cxcywh(coords[0], coords[1], coords[2], coords[3])),
        n if n >= 6 && n % 2 == 0 => YoloShape::Polygon(
            coords
                .chunks_exact(2)
                .map(|pair| Point::new(pair[0], pair[1]))
                .collect(),
        ),
        n => {
            return Err(parse_error(format!(
                "expected 4 box values or an even number (at least 6) of polygon values, found {n}"
            )))
        }
    };

    Ok(Some(YoloLabelRow {
        class_id: ClassId::new(class_id),
        shape,
    }))
}

fn row_to_annotation(row: YoloLabelRow, width: u32, height: u32) -> Result<Annotation, LabelsetError> {
    let (w, h) = (width as f64, height as f64);
    match row.shape {
        YoloShape::Box(bbox) => Annotation::detection(row.class_id, bbox.to_pixel(w, h)),
        YoloShape::Polygon(points) => Annotation::segmentation(
            row.class_id,
            points.iter().map(|p| p.to_pixel(w, h)).collect(),
        ),
    }
}

fn format_label_line(annotation: &Annotation, width: f64, height: f64) -> Option<String> {
    let class_id = annotation.class_id;
    if let Some(points) = annotation.points() {
        let mut line = class_id.to_string();
        for point in points {
            let p = point.to_normalized(width, height);
            let _ = write!(line, " {:.6} {:.6}", p.x, p.y);
        }
        return Some(line);
    }
    let bbox = annotation.bbox()?;
    let (cx, cy, w, h) = bbox.to_normalized(width, height).to_cxcywh();
    Some(format!("{class_id} {cx:.6} {cy:.6} {w:.6} {h:.6}"))
}

fn read_manifest(yaml_path: &Path) -> Result<DataYaml, LabelsetError> {
    let data = fs::read_to_string(yaml_path).map_err(LabelsetError::Io)?;
    serde_yaml::from_str(&data).map_err(|source| LabelsetError::YoloManifestParse {
        path: yaml_path.to_path_buf(),
        source,
    })
}

fn write_manifest(yaml_path: &Path, dataset: &Dataset) -> Result<(), LabelsetError> {
    let manifest_dir = manifest_parent(yaml_path);
    let data_path = dataset.data_path();
    let relative = data_path.strip_prefix(manifest_dir).unwrap_or(data_path);
    let path = match relative.to_string_lossy().replace('\\', "/") {
        empty if empty.is_empty() => ".".to_string(),
        other => other,
    };

    let manifest = DataYamlOut {
        path,
        names: dataset
            .taxonomy()
            .iter()
            .map(|(id, name)| (id.as_u64(), name.to_string()))
            .collect(),
    };
    let yaml = serde_yaml::to_string(&manifest).map_err(|source| {
        LabelsetError::YoloManifestWrite {
            path: yaml_path.to_path_buf(),
            source,
        }
    })?;

    fs::create_dir_all(manifest_dir).map_err(LabelsetError::Io)?;
    fs::write(yaml_path, yaml).map_err(LabelsetError::Io)
}

/// Directory holding the manifest; `.` for a bare file name.
fn manifest_parent(yaml_path: &Path) -> &Path {
    match yaml_path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    }
}

fn taxonomy_from_names(
    names: DataYamlNames,
    yaml_path: &Path,
) -> Result<ClassTaxonomy, LabelsetError> {
    let pairs: Vec<(ClassId, String)> = match names {
        DataYamlNames::Sequence(names) => names
            .into_iter()
            .enumerate()
            .map(|(index, name)| (ClassId::new(index as u64), name))
            .collect(),
        DataYamlNames::Mapping(mapping) => mapping
            .into_iter()
            .map(|(id, name)| (ClassId::new(id), name))
            .collect(),
    };
    ClassTaxonomy::from_pairs(pairs).map_err(|conflict| LabelsetError::FormatViolation {
        path: yaml_path.to_path_buf(),
        message: conflict.to_string(),
    })
}

/// Image files directly inside `dir`, sorted by file name.
fn collect_images(dir: &Path) -> Result<Vec<PathBuf>, LabelsetError> {
    let mut files = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(true)
        .sort_by_file_name()
    {
        let entry = entry.map_err(|source| LabelsetError::FormatViolation {
            path: dir.to_path_buf(),
            message: format!("failed while listing images: {source}"),
        })?;
        if entry.file_type().is_file() && has_extension(entry.path(), &IMAGE_EXTENSIONS) {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

fn has_extension(path: &Path, allowed: &[&str]) -> bool {
    let Some(ext) = path.extension().and_then(|ext| ext.to_str()) else {
        return false;
    };
    allowed
        .iter()
        .any(|allowed_ext| ext.eq_ignore_ascii_case(allowed_ext))
}

/// `<stem>.txt` next to the image, else the same name under the `labels/`
/// tree that mirrors the nearest `images/` ancestor.
fn find_label_for_image(image_path: &Path) -> Option<PathBuf> {
    let sibling = image_path.with_extension(LABEL_EXTENSION);
    if sibling.is_file() {
        return Some(sibling);
    }
    let mirrored = mirror_into_labels(image_path)?.with_extension(LABEL_EXTENSION);
    mirrored.is_file().then_some(mirrored)
}

fn mirror_into_labels(image_path: &Path) -> Option<PathBuf> {
    let components: Vec<Component<'_>> = image_path.components().collect();
    let position = components
        .iter()
        .rposition(|c| c.as_os_str().eq_ignore_ascii_case("images"))?;
    let mut mirrored = PathBuf::new();
    for (index, component) in components.iter().enumerate() {
        if index == position {
            mirrored.push("labels");
        } else {
            mirrored.push(component.as_os_str());
        }
    }
    Some(mirrored)
}
