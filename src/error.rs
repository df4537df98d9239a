use std::path::PathBuf;
use thiserror::Error;

use crate::report::CheckReport;

/// The main error type for labelset operations.
#[derive(Debug, Error)]
pub enum LabelsetError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Malformed annotation: {message}")]
    MalformedAnnotation { message: String },

    #[error("Unknown {kind} id {id}")]
    UnknownId { kind: IdKind, id: u64 },

    #[error("Image not found on disk: {path}")]
    ImageNotFound { path: PathBuf },

    #[error("Invalid split ratios: {message}")]
    InvalidRatio { message: String },

    #[error("Invalid crop of image {image_id}: {message}")]
    InvalidCrop { image_id: u64, message: String },

    #[error("Inconsistent dataset: {message}")]
    InvalidDataset { message: String },

    #[error("Format violation in {path}: {message}")]
    FormatViolation { path: PathBuf, message: String },

    #[error("Failed to parse COCO JSON from {path}: {source}")]
    CocoJsonParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to write COCO JSON to {path}: {source}")]
    CocoJsonWrite {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Failed to parse YOLO manifest {path}: {source}")]
    YoloManifestParse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write YOLO manifest {path}: {source}")]
    YoloManifestWrite {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Invalid YOLO label at {path}:{line}: {message}")]
    YoloLabelParse {
        path: PathBuf,
        line: usize,
        message: String,
    },

    #[error("Failed to read image dimensions from {path}: {source}")]
    ImageDimensionRead {
        path: PathBuf,
        #[source]
        source: imagesize::ImageError,
    },

    #[error("Image codec error for {path}: {source}")]
    ImageCodec {
        path: PathBuf,
        #[source]
        source: image::ImageError,
    },

    #[error("Dataset check failed with {error_count} error(s) and {warning_count} warning(s)")]
    CheckFailed {
        error_count: usize,
        warning_count: usize,
        report: CheckReport,
    },

    #[error("Unsupported format: {0}")]
    UnsupportedFormat(String),
}

/// Which registry an unknown id was looked up in.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdKind {
    Image,
    Annotation,
    Class,
}

impl std::fmt::Display for IdKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            IdKind::Image => write!(f, "image"),
            IdKind::Annotation => write!(f, "annotation"),
            IdKind::Class => write!(f, "class"),
        }
    }
}

/// Coarse classification of a [`LabelsetError`].
///
/// Callers that only care about the failure category (e.g. "the source file
/// is broken" vs. "the id does not exist") match on this instead of on the
/// individual variants.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ErrorKind {
    MalformedAnnotation,
    UnknownId,
    ImageNotFound,
    InvalidRatio,
    InvalidCrop,
    FormatViolation,
    Io,
    Usage,
}

impl LabelsetError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            LabelsetError::MalformedAnnotation { .. } => ErrorKind::MalformedAnnotation,
            LabelsetError::UnknownId { .. } => ErrorKind::UnknownId,
            LabelsetError::ImageNotFound { .. } => ErrorKind::ImageNotFound,
            LabelsetError::InvalidRatio { .. } => ErrorKind::InvalidRatio,
            LabelsetError::InvalidCrop { .. } => ErrorKind::InvalidCrop,
            LabelsetError::FormatViolation { .. }
            | LabelsetError::InvalidDataset { .. }
            | LabelsetError::CocoJsonParse { .. }
            | LabelsetError::YoloManifestParse { .. }
            | LabelsetError::YoloLabelParse { .. }
            | LabelsetError::ImageDimensionRead { .. } => ErrorKind::FormatViolation,
            LabelsetError::Io(_)
            | LabelsetError::CocoJsonWrite { .. }
            | LabelsetError::YoloManifestWrite { .. }
            | LabelsetError::ImageCodec { .. } => ErrorKind::Io,
            LabelsetError::CheckFailed { .. } | LabelsetError::UnsupportedFormat(_) => {
                ErrorKind::Usage
            }
        }
    }

    pub(crate) fn malformed(message: impl Into<String>) -> Self {
        LabelsetError::MalformedAnnotation {
            message: message.into(),
        }
    }

    pub(crate) fn unknown_image(id: impl Into<u64>) -> Self {
        LabelsetError::UnknownId {
            kind: IdKind::Image,
            id: id.into(),
        }
    }

    pub(crate) fn unknown_annotation(id: impl Into<u64>) -> Self {
        LabelsetError::UnknownId {
            kind: IdKind::Annotation,
            id: id.into(),
        }
    }

    pub(crate) fn unknown_class(id: impl Into<u64>) -> Self {
        LabelsetError::UnknownId {
            kind: IdKind::Class,
            id: id.into(),
        }
    }
}
