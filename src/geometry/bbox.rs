//! Axis-aligned boxes in `(x, y, width, height)` form.

use super::point::Point;
use super::space::{Normalized, Pixel};

/// An axis-aligned bounding box stored as top-left corner plus size.
///
/// The constructor does not reject negative sizes so that malformed source
/// data can be represented and reported; [`BBox::has_positive_size`] is the
/// check adapters use before trusting a box.
pub struct BBox<TSpace = Pixel> {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    _space: std::marker::PhantomData<TSpace>,
}

impl<TSpace> BBox<TSpace> {
    #[inline]
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
            _space: std::marker::PhantomData,
        }
    }

    /// Builds a box from its corner coordinates.
    #[inline]
    pub fn from_xyxy(xmin: f64, ymin: f64, xmax: f64, ymax: f64) -> Self {
        Self::new(xmin, ymin, xmax - xmin, ymax - ymin)
    }

    /// Builds a box from its center and size, the YOLO detection layout.
    #[inline]
    pub fn from_cxcywh(cx: f64, cy: f64, width: f64, height: f64) -> Self {
        Self::new(cx - width / 2.0, cy - height / 2.0, width, height)
    }

    /// Smallest box containing every point, or `None` for an empty slice.
    pub fn enclosing(points: &[Point<TSpace>]) -> Option<Self> {
        let first = points.first()?;
        let (mut xmin, mut ymin, mut xmax, mut ymax) = (first.x, first.y, first.x, first.y);
        for p in &points[1..] {
            xmin = xmin.min(p.x);
            ymin = ymin.min(p.y);
            xmax = xmax.max(p.x);
            ymax = ymax.max(p.y);
        }
        Some(Self::from_xyxy(xmin, ymin, xmax, ymax))
    }

    #[inline]
    pub fn xmin(&self) -> f64 {
        self.x
    }

    #[inline]
    pub fn ymin(&self) -> f64 {
        self.y
    }

    #[inline]
    pub fn xmax(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn ymax(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn area(&self) -> f64 {
        self.width * self.height
    }

    /// Returns `(cx, cy, width, height)`.
    #[inline]
    pub fn to_cxcywh(&self) -> (f64, f64, f64, f64) {
        (
            self.x + self.width / 2.0,
            self.y + self.height / 2.0,
            self.width,
            self.height,
        )
    }

    #[inline]
    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.width.is_finite() && self.height.is_finite()
    }

    #[inline]
    pub fn has_positive_size(&self) -> bool {
        self.width > 0.0 && self.height > 0.0
    }

    /// Returns true if `point` lies inside the box, allowing `eps` slack on
    /// every side.
    pub fn contains(&self, point: &Point<TSpace>, eps: f64) -> bool {
        point.x >= self.xmin() - eps
            && point.x <= self.xmax() + eps
            && point.y >= self.ymin() - eps
            && point.y <= self.ymax() + eps
    }

    /// Smallest box containing both boxes.
    pub fn union(&self, other: &Self) -> Self {
        Self::from_xyxy(
            self.xmin().min(other.xmin()),
            self.ymin().min(other.ymin()),
            self.xmax().max(other.xmax()),
            self.ymax().max(other.ymax()),
        )
    }

    #[inline]
    pub fn translated(&self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy, self.width, self.height)
    }

    /// Intersects the box with `[0, width] x [0, height]`.
    ///
    /// A box entirely outside the bounds collapses to zero size at the
    /// nearest edge rather than going negative.
    pub fn clipped_to(&self, width: f64, height: f64) -> Self {
        if !self.is_finite() {
            return *self;
        }
        let width = width.max(0.0);
        let height = height.max(0.0);
        let xmin = self.xmin().clamp(0.0, width);
        let ymin = self.ymin().clamp(0.0, height);
        let xmax = self.xmax().clamp(xmin, width.max(xmin));
        let ymax = self.ymax().clamp(ymin, height.max(ymin));
        Self::from_xyxy(xmin, ymin, xmax, ymax)
    }
}

impl BBox<Pixel> {
    pub fn to_normalized(&self, image_width: f64, image_height: f64) -> BBox<Normalized> {
        BBox::new(
            self.x / image_width,
            self.y / image_height,
            self.width / image_width,
            self.height / image_height,
        )
    }
}

impl BBox<Normalized> {
    pub fn to_pixel(&self, image_width: f64, image_height: f64) -> BBox<Pixel> {
        BBox::new(
            self.x * image_width,
            self.y * image_height,
            self.width * image_width,
            self.height * image_height,
        )
    }
}

// Manual impls so the space marker needs no bounds of its own.
impl<TSpace> Clone for BBox<TSpace> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<TSpace> Copy for BBox<TSpace> {}

impl<TSpace> PartialEq for BBox<TSpace> {
    fn eq(&self, other: &Self) -> bool {
        self.x == other.x
            && self.y == other.y
            && self.width == other.width
            && self.height == other.height
    }
}

impl<TSpace> std::fmt::Debug for BBox<TSpace> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BBox")
            .field("x", &self.x)
            .field("y", &self.y)
            .field("width", &self.width)
            .field("height", &self.height)
            .finish()
    }
}

impl<TSpace> Default for BBox<TSpace> {
    fn default() -> Self {
        Self::new(0.0, 0.0, 0.0, 0.0)
    }
}

/// A crop region in whole pixels: `left <= x < right`, `top <= y < bottom`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn is_empty(&self) -> bool {
        self.width() == 0 || self.height() == 0
    }

    /// Returns true if the rect lies within an image of the given size.
    pub fn fits_within(&self, width: u32, height: u32) -> bool {
        self.right <= width && self.bottom <= height
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn corners_follow_from_xywh() {
        let bbox: BBox = BBox::new(10.0, 20.0, 90.0, 60.0);
        assert_eq!(bbox.xmax(), 100.0);
        assert_eq!(bbox.ymax(), 80.0);
        assert_eq!(bbox.area(), 5400.0);
    }

    #[test]
    fn enclosing_uses_min_max_extent() {
        let points: Vec<Point> = vec![
            Point::new(10.0, 10.0),
            Point::new(90.0, 10.0),
            Point::new(90.0, 90.0),
            Point::new(10.0, 90.0),
        ];
        let bbox = BBox::enclosing(&points).unwrap();
        assert_eq!(bbox, BBox::new(10.0, 10.0, 80.0, 80.0));
        assert!(BBox::<Pixel>::enclosing(&[]).is_none());
    }

    #[test]
    fn cxcywh_conversions_agree() {
        let bbox: BBox<Normalized> = BBox::from_cxcywh(0.5, 0.5, 0.2, 0.4);
        assert!((bbox.x - 0.4).abs() < 1e-12);
        assert!((bbox.y - 0.3).abs() < 1e-12);
        let (cx, cy, w, h) = bbox.to_cxcywh();
        assert!((cx - 0.5).abs() < 1e-12);
        assert!((cy - 0.5).abs() < 1e-12);
        assert_eq!((w, h), (0.2, 0.4));
    }

    #[test]
    fn clipping_keeps_inner_boxes_and_trims_outer_ones() {
        let inner: BBox = BBox::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(inner.clipped_to(20.0, 20.0), inner);

        let spill: BBox = BBox::new(-5.0, 15.0, 10.0, 10.0);
        assert_eq!(spill.clipped_to(20.0, 20.0), BBox::new(0.0, 15.0, 5.0, 5.0));

        let outside: BBox = BBox::new(30.0, 30.0, 5.0, 5.0);
        let clipped = outside.clipped_to(20.0, 20.0);
        assert_eq!(clipped.width, 0.0);
        assert_eq!(clipped.height, 0.0);
    }

    #[test]
    fn union_covers_both() {
        let a: BBox = BBox::new(0.0, 0.0, 10.0, 10.0);
        let b: BBox = BBox::new(20.0, 5.0, 5.0, 20.0);
        assert_eq!(a.union(&b), BBox::from_xyxy(0.0, 0.0, 25.0, 25.0));
    }

    #[test]
    fn non_finite_box_is_returned_unclipped() {
        let bbox: BBox<Normalized> = BBox::new(f64::NAN, 0.0, 0.5, 0.5);
        let clipped = bbox.clipped_to(1.0, 1.0);
        assert!(clipped.x.is_nan());
        assert_eq!(clipped.width, 0.5);
    }

    #[test]
    fn crop_rect_size() {
        let rect = CropRect::new(15, 15, 35, 40);
        assert_eq!(rect.width(), 20);
        assert_eq!(rect.height(), 25);
        assert!(!rect.is_empty());
        assert!(rect.fits_within(35, 40));
        assert!(!rect.fits_within(34, 40));
        assert!(CropRect::new(10, 0, 10, 5).is_empty());
    }
}
