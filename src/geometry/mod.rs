//! Geometry primitives shared by annotations, adapters and transforms.
//!
//! Everything in the dataset model lives in pixel space with the origin at
//! the top-left corner. [`Normalized`] geometry only appears at the YOLO
//! boundary and is converted on the way in and out.

mod bbox;
mod point;
mod space;

pub use bbox::{BBox, CropRect};
pub use point::Point;
pub use space::{Normalized, Pixel};
