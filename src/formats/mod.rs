//! On-disk interchange formats.
//!
//! Each adapter translates a whole file (or manifest plus label tree) into a
//! freshly constructed [`Dataset`], and back. Loads are all-or-nothing: an
//! error anywhere in the source means no dataset is returned.

pub mod coco;
pub mod rle;
pub mod yolo;

use std::fmt;
use std::path::Path;
use std::str::FromStr;

use crate::dataset::Dataset;
use crate::error::LabelsetError;

/// A supported interchange format.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Format {
    /// COCO JSON (`--images` names the image directory).
    Coco,
    /// YOLO YAML manifest with per-image label files.
    Yolo,
}

impl Format {
    /// Loads a dataset. `images` is required for COCO, whose JSON does not
    /// say where the images live; it defaults to the JSON file's directory.
    pub fn load(self, input: &Path, images: Option<&Path>) -> Result<Dataset, LabelsetError> {
        match self {
            Format::Coco => {
                let images = match images {
                    Some(dir) => dir.to_path_buf(),
                    None => input
                        .parent()
                        .map(Path::to_path_buf)
                        .unwrap_or_default(),
                };
                coco::read_coco_json(input, &images)
            }
            Format::Yolo => {
                if images.is_some() {
                    tracing::warn!("--images is ignored for YOLO; the manifest's path is used");
                }
                yolo::read_yolo(input)
            }
        }
    }

    pub fn save(self, output: &Path, dataset: &Dataset) -> Result<(), LabelsetError> {
        match self {
            Format::Coco => coco::write_coco_json(output, dataset),
            Format::Yolo => yolo::write_yolo(output, dataset),
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Format::Coco => write!(f, "coco"),
            Format::Yolo => write!(f, "yolo"),
        }
    }
}

impl FromStr for Format {
    type Err = LabelsetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "coco" | "coco-json" => Ok(Format::Coco),
            "yolo" | "yolov8" => Ok(Format::Yolo),
            other => Err(LabelsetError::UnsupportedFormat(format!(
                "'{other}' (supported: coco, yolo)"
            ))),
        }
    }
}
