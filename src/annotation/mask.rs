//! Binary rasters and the fill rules that produce them.
//!
//! A pixel `(px, py)` belongs to a shape when its center `(px + 0.5, py + 0.5)`
//! does. Polygons use the even-odd rule, which is also what the shoelace
//! area in [`polygon_area`](super::polygon_area) measures for simple
//! polygons, so mask pixel counts and computed areas agree up to
//! discretization.

use image::{GrayImage, Luma};

use crate::geometry::{BBox, Point};

const ON: Luma<u8> = Luma([255]);
const OFF: Luma<u8> = Luma([0]);

/// A binary raster the size of an image.
#[derive(Clone, Debug, PartialEq)]
pub struct Mask {
    raster: GrayImage,
}

impl Mask {
    /// Creates an empty mask.
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            raster: GrayImage::from_pixel(width, height, OFF),
        }
    }

    pub fn width(&self) -> u32 {
        self.raster.width()
    }

    pub fn height(&self) -> u32 {
        self.raster.height()
    }

    /// Returns whether `(x, y)` is set. Out-of-range pixels are unset.
    pub fn get(&self, x: u32, y: u32) -> bool {
        x < self.width() && y < self.height() && self.raster.get_pixel(x, y)[0] != 0
    }

    /// Sets `(x, y)`. Out-of-range pixels are ignored.
    pub fn set(&mut self, x: u32, y: u32) {
        if x < self.width() && y < self.height() {
            self.raster.put_pixel(x, y, ON);
        }
    }

    /// Number of set pixels.
    pub fn count(&self) -> u64 {
        self.raster.pixels().filter(|p| p[0] != 0).count() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.raster.pixels().all(|p| p[0] == 0)
    }

    /// The mask as an 8-bit image (0 or 255), ready for an overlay layer.
    pub fn as_image(&self) -> &GrayImage {
        &self.raster
    }

    pub fn into_image(self) -> GrayImage {
        self.raster
    }

    /// Fills every pixel whose center lies in `bbox`.
    pub fn fill_box(&mut self, bbox: &BBox) {
        let (x0, x1) = covered_span(bbox.xmin(), bbox.xmax(), self.width());
        let (y0, y1) = covered_span(bbox.ymin(), bbox.ymax(), self.height());
        for y in y0..y1 {
            for x in x0..x1 {
                self.raster.put_pixel(x, y, ON);
            }
        }
    }

    /// Fills the interior of a closed polygon with a center-sampled
    /// even-odd scanline.
    pub fn fill_polygon(&mut self, points: &[Point]) {
        if points.len() < 3 {
            return;
        }

        let mut crossings: Vec<f64> = Vec::with_capacity(points.len());
        for py in 0..self.height() {
            let yc = py as f64 + 0.5;
            crossings.clear();

            for (i, a) in points.iter().enumerate() {
                let b = &points[(i + 1) % points.len()];
                // Half-open on y so a vertex shared by two edges counts once.
                let spans = (a.y <= yc && yc < b.y) || (b.y <= yc && yc < a.y);
                if spans {
                    let t = (yc - a.y) / (b.y - a.y);
                    crossings.push(a.x + t * (b.x - a.x));
                }
            }

            crossings.sort_by(|l, r| l.total_cmp(r));
            for pair in crossings.chunks_exact(2) {
                let (x0, x1) = covered_span(pair[0], pair[1], self.width());
                for px in x0..x1 {
                    self.raster.put_pixel(px, py, ON);
                }
            }
        }
    }
}

/// Pixel index range `[start, end)` whose centers fall in `[lo, hi)`,
/// clamped to `[0, limit)`.
fn covered_span(lo: f64, hi: f64, limit: u32) -> (u32, u32) {
    if !(lo.is_finite() && hi.is_finite()) || hi <= lo {
        return (0, 0);
    }
    let clamp = |v: f64| v.clamp(0.0, limit as f64) as u32;
    (clamp((lo - 0.5).ceil()), clamp((hi - 0.5).ceil()))
}
