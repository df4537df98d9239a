//! Access to image payloads.
//!
//! The dataset model never touches pixels directly. Operations that need
//! them (decoding, cropping, copying, existence checks) go through an
//! [`ImageStore`], so the aggregate can be exercised against an in-memory
//! store in tests and against the filesystem in production.

use std::fs;
use std::path::Path;

use image::DynamicImage;

use crate::error::LabelsetError;
use crate::geometry::CropRect;

/// Image decode/encode collaborator.
pub trait ImageStore {
    /// Returns true if a payload exists at `path`.
    fn exists(&self, path: &Path) -> bool;

    /// Reads `(width, height)` without decoding pixels where possible.
    fn dimensions(&self, path: &Path) -> Result<(u32, u32), LabelsetError>;

    /// Decodes the payload at `path`.
    fn decode(&self, path: &Path) -> Result<DynamicImage, LabelsetError>;

    /// Encodes `image` over the payload at `path`.
    fn write(&self, path: &Path, image: &DynamicImage) -> Result<(), LabelsetError>;

    /// Replaces the payload at `path` with its `rect` sub-image.
    fn crop(&self, path: &Path, rect: CropRect) -> Result<(), LabelsetError> {
        let cropped = self.decode(path)?.crop_imm(rect.left, rect.top, rect.width(), rect.height());
        self.write(path, &cropped)
    }

    /// Copies the payload at `from` to `to`, creating parent directories.
    fn copy(&self, from: &Path, to: &Path) -> Result<(), LabelsetError>;
}

/// [`ImageStore`] backed by the local filesystem and the `image` codecs.
#[derive(Clone, Copy, Debug, Default)]
pub struct FsImageStore;

impl ImageStore for FsImageStore {
    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn dimensions(&self, path: &Path) -> Result<(u32, u32), LabelsetError> {
        read_image_dimensions(path)
    }

    fn decode(&self, path: &Path) -> Result<DynamicImage, LabelsetError> {
        if !path.is_file() {
            return Err(LabelsetError::ImageNotFound {
                path: path.to_path_buf(),
            });
        }
        image::open(path).map_err(|source| LabelsetError::ImageCodec {
            path: path.to_path_buf(),
            source,
        })
    }

    fn write(&self, path: &Path, image: &DynamicImage) -> Result<(), LabelsetError> {
        image.save(path).map_err(|source| LabelsetError::ImageCodec {
            path: path.to_path_buf(),
            source,
        })
    }

    fn copy(&self, from: &Path, to: &Path) -> Result<(), LabelsetError> {
        if !from.is_file() {
            return Err(LabelsetError::ImageNotFound {
                path: from.to_path_buf(),
            });
        }
        if let Some(parent) = to.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(from, to)?;
        Ok(())
    }
}

/// Reads image dimensions from the file header.
pub(crate) fn read_image_dimensions(path: &Path) -> Result<(u32, u32), LabelsetError> {
    let size = imagesize::size(path).map_err(|source| LabelsetError::ImageDimensionRead {
        path: path.to_path_buf(),
        source,
    })?;

    let width: u32 = size
        .width
        .try_into()
        .map_err(|_| LabelsetError::FormatViolation {
            path: path.to_path_buf(),
            message: format!("image width {} does not fit in u32", size.width),
        })?;

    let height: u32 = size
        .height
        .try_into()
        .map_err(|_| LabelsetError::FormatViolation {
            path: path.to_path_buf(),
            message: format!("image height {} does not fit in u32", size.height),
        })?;

    Ok((width, height))
}
