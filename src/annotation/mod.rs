//! The annotation model.
//!
//! An [`Annotation`] is a class label plus optional geometry. Rather than a
//! classification → detection → segmentation inheritance chain, the
//! capabilities are composed: a box is optional, a polygon is optional, and
//! a polygon always comes with a box that encloses it. [`AnnotationKind`]
//! names the resulting variant and [`Annotation::has_polygon`] is the
//! capability check used for mask derivation and area computation.

mod mask;

pub use mask::Mask;

use crate::dataset::ClassId;
use crate::error::LabelsetError;
use crate::geometry::{BBox, Point};

/// Minimum number of vertices of a segmentation polygon.
pub const MIN_POLYGON_POINTS: usize = 3;

/// Tolerance used when checking that a box encloses its polygon.
pub const ENCLOSURE_EPS: f64 = 1e-6;

/// Which capabilities an annotation carries.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum AnnotationKind {
    /// A class label with no geometry.
    Classification,
    /// A class label with an axis-aligned box.
    Detection,
    /// A class label with a polygon and its enclosing box.
    Segmentation,
}

/// Where an annotation's area comes from.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum AreaSource {
    /// Derived from the geometry on every read: the polygon if there is
    /// one, otherwise the box.
    Computed,
    /// A trusted value supplied by the source data (e.g. COCO's `area`).
    Explicit(f64),
}

/// A labeled region of an image.
#[derive(Clone, Debug, PartialEq)]
pub struct Annotation {
    pub class_id: ClassId,
    bbox: Option<BBox>,
    points: Option<Vec<Point>>,
    area: AreaSource,
}

impl Annotation {
    /// An image-level label with no geometry.
    pub fn classification(class_id: impl Into<ClassId>) -> Self {
        Self {
            class_id: class_id.into(),
            bbox: None,
            points: None,
            area: AreaSource::Computed,
        }
    }

    /// A box annotation.
    ///
    /// # Errors
    /// `MalformedAnnotation` if the box is not finite or has a non-positive
    /// width or height.
    pub fn detection(class_id: impl Into<ClassId>, bbox: BBox) -> Result<Self, LabelsetError> {
        check_box(&bbox)?;
        Ok(Self {
            class_id: class_id.into(),
            bbox: Some(bbox),
            points: None,
            area: AreaSource::Computed,
        })
    }

    /// A polygon annotation whose box is the min/max extent of its points.
    ///
    /// # Errors
    /// `MalformedAnnotation` for fewer than three points or non-finite
    /// coordinates.
    pub fn segmentation(
        class_id: impl Into<ClassId>,
        points: Vec<Point>,
    ) -> Result<Self, LabelsetError> {
        check_polygon(&points)?;
        let bbox = BBox::enclosing(&points)
            .ok_or_else(|| LabelsetError::malformed("segmentation polygon has no points"))?;
        Ok(Self {
            class_id: class_id.into(),
            bbox: Some(bbox),
            points: Some(points),
            area: AreaSource::Computed,
        })
    }

    /// A polygon annotation with a box supplied by the source data.
    ///
    /// The box is kept as given so that it round-trips; use
    /// [`Annotation::box_encloses_points`] to detect a stale box.
    pub fn segmentation_with_bbox(
        class_id: impl Into<ClassId>,
        points: Vec<Point>,
        bbox: BBox,
    ) -> Result<Self, LabelsetError> {
        check_polygon(&points)?;
        if !bbox.is_finite() {
            return Err(LabelsetError::malformed(format!(
                "segmentation box {bbox:?} has non-finite coordinates"
            )));
        }
        Ok(Self {
            class_id: class_id.into(),
            bbox: Some(bbox),
            points: Some(points),
            area: AreaSource::Computed,
        })
    }

    /// Replaces the computed area with a trusted external value.
    pub fn with_area(mut self, area: f64) -> Self {
        self.area = AreaSource::Explicit(area);
        self
    }

    pub fn kind(&self) -> AnnotationKind {
        match (&self.points, &self.bbox) {
            (Some(_), _) => AnnotationKind::Segmentation,
            (None, Some(_)) => AnnotationKind::Detection,
            (None, None) => AnnotationKind::Classification,
        }
    }

    pub fn has_box(&self) -> bool {
        self.bbox.is_some()
    }

    pub fn has_polygon(&self) -> bool {
        self.points.is_some()
    }

    pub fn bbox(&self) -> Option<&BBox> {
        self.bbox.as_ref()
    }

    pub fn points(&self) -> Option<&[Point]> {
        self.points.as_deref()
    }

    pub fn area_source(&self) -> AreaSource {
        self.area
    }

    /// The annotation's area: the explicit value if one was supplied,
    /// otherwise the polygon's shoelace area, otherwise the box area.
    /// Classification annotations have no area.
    pub fn area(&self) -> Option<f64> {
        match self.area {
            AreaSource::Explicit(area) => Some(area),
            AreaSource::Computed => self.computed_area(),
        }
    }

    /// The area implied by the geometry, ignoring any explicit value.
    pub fn computed_area(&self) -> Option<f64> {
        match (&self.points, &self.bbox) {
            (Some(points), _) => Some(polygon_area(points)),
            (None, Some(bbox)) => Some(bbox.area()),
            (None, None) => None,
        }
    }

    pub fn set_area(&mut self, area: f64) {
        self.area = AreaSource::Explicit(area);
    }

    /// Drops an explicit area so it is derived from the geometry again.
    pub fn recompute_area(&mut self) {
        self.area = AreaSource::Computed;
    }

    /// Returns false if the annotation has a polygon with a vertex outside
    /// its box.
    pub fn box_encloses_points(&self) -> bool {
        match (&self.points, &self.bbox) {
            (Some(points), Some(bbox)) => points.iter().all(|p| bbox.contains(p, ENCLOSURE_EPS)),
            _ => true,
        }
    }

    /// Rebuilds the box from the polygon extent. No-op without a polygon.
    pub fn refresh_bbox_from_points(&mut self) {
        if let Some(bbox) = self.points.as_deref().and_then(BBox::enclosing) {
            self.bbox = Some(bbox);
        }
    }

    /// Rasterizes the annotation onto an image of the given size.
    ///
    /// Segmentations fill their polygon (even-odd rule), detections fill
    /// their box and classifications produce an empty mask.
    ///
    /// # Errors
    /// `MalformedAnnotation` if the polygon has fewer than three points.
    pub fn derive_mask(&self, width: u32, height: u32) -> Result<Mask, LabelsetError> {
        let mut mask = Mask::new(width, height);
        match (&self.points, &self.bbox) {
            (Some(points), _) => {
                check_polygon(points)?;
                mask.fill_polygon(points);
            }
            (None, Some(bbox)) => mask.fill_box(bbox),
            (None, None) => {}
        }
        Ok(mask)
    }

    /// Shifts the box and every polygon point by `(dx, dy)`.
    pub(crate) fn translate(&mut self, dx: f64, dy: f64) {
        if let Some(bbox) = self.bbox.as_mut() {
            *bbox = bbox.translated(dx, dy);
        }
        if let Some(points) = self.points.as_mut() {
            for point in points.iter_mut() {
                *point = point.translated(dx, dy);
            }
        }
    }

    /// Fits the box to `[0, width] x [0, height]` after a crop.
    ///
    /// A polygon keeps its points and its box becomes their extent, so the
    /// box still encloses them even where they spill past the bounds. A box
    /// without a polygon is intersected with the bounds.
    pub(crate) fn clip_bbox(&mut self, width: f64, height: f64) {
        if self.points.is_some() {
            self.refresh_bbox_from_points();
        } else if let Some(bbox) = self.bbox.as_mut() {
            *bbox = bbox.clipped_to(width, height);
        }
    }
}

/// Absolute shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point]) -> f64 {
    if points.len() < MIN_POLYGON_POINTS {
        return 0.0;
    }
    let twice: f64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x * b.y - b.x * a.y)
        .sum();
    twice.abs() / 2.0
}

fn check_box(bbox: &BBox) -> Result<(), LabelsetError> {
    if !bbox.is_finite() {
        return Err(LabelsetError::malformed(format!(
            "box {bbox:?} has non-finite coordinates"
        )));
    }
    if !bbox.has_positive_size() {
        return Err(LabelsetError::malformed(format!(
            "box {bbox:?} has non-positive width or height"
        )));
    }
    Ok(())
}

fn check_polygon(points: &[Point]) -> Result<(), LabelsetError> {
    if points.len() < MIN_POLYGON_POINTS {
        return Err(LabelsetError::malformed(format!(
            "segmentation polygon needs at least {MIN_POLYGON_POINTS} points, got {}",
            points.len()
        )));
    }
    if let Some(bad) = points.iter().find(|p| !p.is_finite()) {
        return Err(LabelsetError::malformed(format!(
            "segmentation point {bad:?} is not finite"
        )));
    }
    Ok(())
}
