//! In-place crops that keep annotation geometry aligned with the pixels.
//!
//! Crops run in two phases. Every payload is decoded and cropped in memory
//! first, then the results are written back, and the registries change
//! only once every write has succeeded. A failed crop therefore leaves the
//! dataset as it was. Callers that need the original payloads should
//! [`Dataset::copy_dataset`] first.

use std::path::PathBuf;

use image::DynamicImage;

use super::{Dataset, ImageId};
use crate::error::LabelsetError;
use crate::geometry::{BBox, CropRect};
use crate::store::ImageStore;

impl Dataset {
    /// Crops one image to `rect` and shifts its annotations by
    /// `(-left, -top)`. The stored dimensions become the rect's size.
    ///
    /// # Errors
    /// `UnknownId` for an unregistered image, `InvalidCrop` for an empty rect
    /// or one that extends past the image.
    pub fn crop_single_image<S: ImageStore + ?Sized>(
        &mut self,
        store: &S,
        id: ImageId,
        rect: CropRect,
    ) -> Result<(), LabelsetError> {
        self.check_crop(id, rect)?;
        self.commit_crops(store, &[(id, rect)])
    }

    /// Crops every image to the same `rect`.
    ///
    /// All images are checked against `rect` before any payload is touched,
    /// and either every image is cropped or none is.
    pub fn crop_multiple_images<S: ImageStore + ?Sized>(
        &mut self,
        store: &S,
        rect: CropRect,
    ) -> Result<(), LabelsetError> {
        let plan: Vec<(ImageId, CropRect)> = self.image_ids().map(|id| (id, rect)).collect();
        for (id, rect) in &plan {
            self.check_crop(*id, *rect)?;
        }
        self.commit_crops(store, &plan)
    }

    /// Crops each image to the union of its annotation boxes grown by
    /// `margin` pixels and clamped to the image.
    ///
    /// Box edges are widened to whole pixels (floor for left/top, ceil for
    /// right/bottom). After the shift, detection boxes are intersected with
    /// the new image bounds and polygon boxes are rebuilt from their points.
    /// Images without any boxed annotation are skipped. Returns the rect
    /// applied to each cropped image.
    pub fn crop_images_by_annotations<S: ImageStore + ?Sized>(
        &mut self,
        store: &S,
        margin: u32,
    ) -> Result<Vec<(ImageId, CropRect)>, LabelsetError> {
        let mut plan = Vec::new();
        for id in self.image_ids() {
            let Some(extent) = self.annotation_extent(id)? else {
                tracing::debug!(image_id = id.as_u64(), "no boxed annotations; skipping crop");
                continue;
            };

            let record = self.image(id)?;
            let (width, height) = (record.width as f64, record.height as f64);
            let margin = margin as f64;

            let left = (extent.xmin() - margin).floor().clamp(0.0, width);
            let top = (extent.ymin() - margin).floor().clamp(0.0, height);
            let right = (extent.xmax() + margin).ceil().clamp(left, width);
            let bottom = (extent.ymax() + margin).ceil().clamp(top, height);
            let rect = CropRect::new(left as u32, top as u32, right as u32, bottom as u32);

            if rect.is_empty() {
                tracing::warn!(
                    image_id = id.as_u64(),
                    "annotations lie outside the image; skipping crop"
                );
                continue;
            }
            plan.push((id, rect));
        }

        self.commit_crops(store, &plan)?;

        for (id, rect) in &plan {
            let owned: Vec<_> = self.annotation_ids_for_image(*id)?.iter().copied().collect();
            for ann_id in owned {
                if let Some(annotation) = self.annotations.get_mut(&ann_id) {
                    annotation.clip_bbox(rect.width() as f64, rect.height() as f64);
                }
            }
        }

        tracing::info!(cropped = plan.len(), margin, "cropped images by annotations");
        Ok(plan)
    }

    /// Crops every planned payload, then updates the registries.
    ///
    /// Decoding happens for all images before the first write. If a write
    /// fails, the payloads already rewritten get their decoded originals
    /// back and the registries are left alone.
    fn commit_crops<S: ImageStore + ?Sized>(
        &mut self,
        store: &S,
        plan: &[(ImageId, CropRect)],
    ) -> Result<(), LabelsetError> {
        let mut staged: Vec<(PathBuf, DynamicImage, DynamicImage)> = Vec::with_capacity(plan.len());
        for (id, rect) in plan {
            let path = self.image_path(*id)?;
            let original = store.decode(&path)?;
            let cropped = original.crop_imm(rect.left, rect.top, rect.width(), rect.height());
            staged.push((path, original, cropped));
        }

        for (written, (path, _, cropped)) in staged.iter().enumerate() {
            if let Err(err) = store.write(path, cropped) {
                for (path, original, _) in &staged[..written] {
                    if let Err(restore) = store.write(path, original) {
                        tracing::error!(
                            path = %path.display(),
                            error = %restore,
                            "could not restore image after failed crop"
                        );
                    }
                }
                return Err(err);
            }
        }

        for (id, rect) in plan {
            self.apply_crop(*id, *rect);
        }
        Ok(())
    }

    /// Union of the boxes of an image's annotations, if any have one.
    fn annotation_extent(&self, id: ImageId) -> Result<Option<BBox>, LabelsetError> {
        let extent = self
            .annotations_for_image(id)?
            .into_iter()
            .filter_map(|(_, annotation)| annotation.bbox().copied())
            .filter(BBox::is_finite)
            .reduce(|acc, bbox| acc.union(&bbox));
        Ok(extent)
    }

    fn check_crop(&self, id: ImageId, rect: CropRect) -> Result<(), LabelsetError> {
        let record = self.image(id)?;
        if rect.is_empty() {
            return Err(LabelsetError::InvalidCrop {
                image_id: id.as_u64(),
                message: format!("crop {rect:?} is empty"),
            });
        }
        if !rect.fits_within(record.width, record.height) {
            return Err(LabelsetError::InvalidCrop {
                image_id: id.as_u64(),
                message: format!(
                    "crop {rect:?} extends past the {}x{} image",
                    record.width, record.height
                ),
            });
        }
        Ok(())
    }

    /// Registry half of a crop; the payload has already been rewritten.
    fn apply_crop(&mut self, id: ImageId, rect: CropRect) {
        if let Some(record) = self.images.get_mut(&id) {
            record.width = rect.width();
            record.height = rect.height();
        }

        let (dx, dy) = (-(rect.left as f64), -(rect.top as f64));
        if let Some(ann_ids) = self.index.get(&id) {
            for ann_id in ann_ids {
                if let Some(annotation) = self.annotations.get_mut(ann_id) {
                    annotation.translate(dx, dy);
                }
            }
        }

        tracing::debug!(image_id = id.as_u64(), ?rect, "cropped image");
    }
}
