//! COCO run-length encoded masks.
//!
//! COCO stores crowd and mask-style segmentations as alternating runs of
//! background and foreground pixels, walked in column-major order (down each
//! column, then to the next column), always starting with a background run.
//! The counts come either as a plain integer list or compressed into an
//! ASCII string (the `pycocotools` text encoding).
//!
//! Decoded masks are reduced to boundary points by tracing the outer
//! contour of every 8-connected component and keeping only the corners,
//! where the chain direction changes. Hole boundaries are not traced.

use crate::annotation::Mask;
use crate::error::LabelsetError;
use crate::geometry::Point;

/// Run counts with the mask size, `[height, width]` as COCO orders it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Rle {
    pub height: u32,
    pub width: u32,
    pub counts: Vec<u32>,
}

impl Rle {
    pub fn new(height: u32, width: u32, counts: Vec<u32>) -> Self {
        Self {
            height,
            width,
            counts,
        }
    }

    /// Decodes the compressed text form of the counts.
    ///
    /// Each value is a little-endian sequence of 5-bit groups offset by 48
    /// (`'0'`); bit 0x20 marks a continuation and bit 0x10 of the last group
    /// is the sign. From the fourth value on, values are deltas against the
    /// value two positions back.
    pub fn from_compressed(height: u32, width: u32, counts: &str) -> Result<Self, LabelsetError> {
        let bytes = counts.as_bytes();
        let total = i64::from(height) * i64::from(width);
        let mut decoded: Vec<i64> = Vec::new();
        let mut pos = 0;

        while pos < bytes.len() {
            let mut value: i64 = 0;
            let mut shift = 0u32;
            loop {
                let Some(&byte) = bytes.get(pos) else {
                    return Err(LabelsetError::malformed(
                        "compressed RLE counts end mid-value",
                    ));
                };
                if !(48..48 + 64).contains(&byte) {
                    return Err(LabelsetError::malformed(format!(
                        "invalid character {:?} in compressed RLE counts",
                        byte as char
                    )));
                }
                if shift >= 60 {
                    return Err(LabelsetError::malformed(
                        "compressed RLE value is too large",
                    ));
                }
                let group = i64::from(byte - 48);
                value |= (group & 0x1f) << shift;
                shift += 5;
                pos += 1;
                if group & 0x20 == 0 {
                    if group & 0x10 != 0 {
                        value |= -1i64 << shift;
                    }
                    break;
                }
            }
            if decoded.len() > 2 {
                value = value
                    .checked_add(decoded[decoded.len() - 2])
                    .ok_or_else(|| LabelsetError::malformed("compressed RLE value overflows"))?;
            }
            if value < 0 || value > total {
                return Err(LabelsetError::malformed(format!(
                    "RLE run length {value} is out of range for a {width}x{height} mask"
                )));
            }
            decoded.push(value);
        }

        let counts = decoded
            .into_iter()
            .map(|v| {
                u32::try_from(v).map_err(|_| {
                    LabelsetError::malformed(format!("RLE run length {v} is out of range"))
                })
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self::new(height, width, counts))
    }

    /// Expands the runs into a mask.
    ///
    /// # Errors
    /// `MalformedAnnotation` if the runs cover more pixels than the mask
    /// holds. Runs that stop short leave the rest of the mask empty.
    pub fn decode(&self) -> Result<Mask, LabelsetError> {
        let total = u64::from(self.height) * u64::from(self.width);
        let covered: u64 = self.counts.iter().map(|c| u64::from(*c)).sum();
        if covered > total {
            return Err(LabelsetError::malformed(format!(
                "RLE runs cover {covered} pixels but the mask is {}x{}",
                self.width, self.height
            )));
        }

        let mut mask = Mask::new(self.width, self.height);
        if self.height == 0 {
            return Ok(mask);
        }
        let height = u64::from(self.height);
        let mut offset = 0u64;
        for (i, run) in self.counts.iter().enumerate() {
            let run = u64::from(*run);
            if i % 2 == 1 {
                for index in offset..offset + run {
                    mask.set((index / height) as u32, (index % height) as u32);
                }
            }
            offset += run;
        }
        Ok(mask)
    }
}

/// Clockwise neighbour offsets with y pointing down, starting east.
const NEIGHBOURS: [(i64, i64); 8] = [
    (1, 0),
    (1, 1),
    (0, 1),
    (-1, 1),
    (-1, 0),
    (-1, -1),
    (0, -1),
    (1, -1),
];

/// Outer contours of every 8-connected foreground component, in raster
/// order of each component's top-left pixel. Each contour is reduced to
/// the pixels where the boundary turns.
pub fn trace_contours(mask: &Mask) -> Vec<Vec<Point>> {
    let (width, height) = (mask.width(), mask.height());
    let mut labelled = vec![false; width as usize * height as usize];
    let mut contours = Vec::new();

    for y in 0..height {
        for x in 0..width {
            let slot = y as usize * width as usize + x as usize;
            if !mask.get(x, y) || labelled[slot] {
                continue;
            }
            label_component(mask, &mut labelled, (x, y));
            let chain = trace_boundary(mask, (i64::from(x), i64::from(y)));
            contours.push(
                corners(&chain)
                    .into_iter()
                    .map(|(px, py)| Point::new(px as f64, py as f64))
                    .collect(),
            );
        }
    }
    contours
}

/// Decodes an RLE mask and flattens every traced contour into one point
/// list. Disjoint regions end up merged into a single polygon.
pub fn rle_to_points(rle: &Rle) -> Result<Vec<Point>, LabelsetError> {
    let mask = rle.decode()?;
    let contours = trace_contours(&mask);
    if contours.len() > 1 {
        tracing::warn!(
            contours = contours.len(),
            "RLE mask has several regions; flattening contours into one polygon"
        );
    }
    Ok(contours.into_iter().flatten().collect())
}

fn is_set(mask: &Mask, (x, y): (i64, i64)) -> bool {
    x >= 0
        && y >= 0
        && x < i64::from(mask.width())
        && y < i64::from(mask.height())
        && mask.get(x as u32, y as u32)
}

fn label_component(mask: &Mask, labelled: &mut [bool], seed: (u32, u32)) {
    let width = mask.width() as usize;
    let mut stack = vec![(i64::from(seed.0), i64::from(seed.1))];
    labelled[seed.1 as usize * width + seed.0 as usize] = true;
    while let Some((x, y)) = stack.pop() {
        for (dx, dy) in NEIGHBOURS {
            let next = (x + dx, y + dy);
            if !is_set(mask, next) {
                continue;
            }
            let slot = next.1 as usize * width + next.0 as usize;
            if !labelled[slot] {
                labelled[slot] = true;
                stack.push(next);
            }
        }
    }
}

/// Moore-neighbour tracing from the component's top-left pixel, whose west
/// neighbour is always background. Stops when the walk re-enters the start
/// pixel heading to the same second pixel.
fn trace_boundary(mask: &Mask, start: (i64, i64)) -> Vec<(i64, i64)> {
    let mut chain = vec![start];
    let mut current = start;
    let mut backtrack = (start.0 - 1, start.1);
    let limit = 4 * (u64::from(mask.width()) + 1) * (u64::from(mask.height()) + 1);

    for _ in 0..limit {
        let Some(from) = direction_to(current, backtrack) else {
            break;
        };
        let mut previous = backtrack;
        let mut found = None;
        for step in 1..=8 {
            let (dx, dy) = NEIGHBOURS[(from + step) % 8];
            let candidate = (current.0 + dx, current.1 + dy);
            if is_set(mask, candidate) {
                found = Some((candidate, previous));
                break;
            }
            previous = candidate;
        }

        // Isolated pixel.
        let Some((next, next_backtrack)) = found else {
            break;
        };
        if current == start && chain.len() > 1 && next == chain[1] {
            break;
        }
        if next != start || chain.len() == 1 {
            chain.push(next);
        }
        current = next;
        backtrack = next_backtrack;
    }

    if chain.len() > 1 && chain.last() == Some(&start) {
        chain.pop();
    }
    chain
}

fn direction_to(from: (i64, i64), to: (i64, i64)) -> Option<usize> {
    let delta = (to.0 - from.0, to.1 - from.1);
    NEIGHBOURS.iter().position(|d| *d == delta)
}

/// Drops chain pixels that continue in the same direction as the step
/// before them.
fn corners(chain: &[(i64, i64)]) -> Vec<(i64, i64)> {
    let n = chain.len();
    if n < 3 {
        return chain.to_vec();
    }
    (0..n)
        .filter(|&i| {
            let prev = chain[(i + n - 1) % n];
            let here = chain[i];
            let next = chain[(i + 1) % n];
            (here.0 - prev.0, here.1 - prev.1) != (next.0 - here.0, next.1 - here.1)
        })
        .map(|i| chain[i])
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pts(points: &[Point]) -> Vec<(f64, f64)> {
        points.iter().map(|p| (p.x, p.y)).collect()
    }

    #[test]
    fn decode_is_column_major() {
        // 3x2 mask (h=3, w=2): column 0 = [0, 1, 1], column 1 = [1, 0, 0].
        let rle = Rle::new(3, 2, vec![1, 3, 2]);
        let mask = rle.decode().unwrap();
        assert!(!mask.get(0, 0));
        assert!(mask.get(0, 1));
        assert!(mask.get(0, 2));
        assert!(mask.get(1, 0));
        assert!(!mask.get(1, 1));
        assert_eq!(mask.count(), 3);
    }

    #[test]
    fn decode_rejects_overlong_runs() {
        let rle = Rle::new(2, 2, vec![1, 4]);
        assert!(rle.decode().is_err());
    }

    #[test]
    fn compressed_counts_decode() {
        let rle = Rle::from_compressed(3, 2, "131").unwrap();
        assert_eq!(rle.counts, vec![1, 3, 1]);
        assert_eq!(rle.decode().unwrap().count(), 3);
    }

    #[test]
    fn compressed_counts_with_continuation_and_deltas() {
        // 'P' carries the continuation bit with zero payload; '1' supplies
        // the next five bits.
        let rle = Rle::from_compressed(10, 10, "P1").unwrap();
        assert_eq!(rle.counts, vec![32]);

        // The fourth value onwards is relative to the value two back.
        let rle = Rle::from_compressed(10, 10, "5234").unwrap();
        assert_eq!(rle.counts, vec![5, 2, 3, 6]);

        // 'O' has the sign bit set and decodes to -1.
        let rle = Rle::from_compressed(10, 10, "523O").unwrap();
        assert_eq!(rle.counts, vec![5, 2, 3, 1]);
    }

    #[test]
    fn compressed_counts_reject_bad_input() {
        assert!(Rle::from_compressed(2, 2, "1 ").is_err());
        assert!(Rle::from_compressed(2, 2, "P").is_err());
    }

    #[test]
    fn compressed_counts_reject_runaway_values() {
        let counts = "ooooooooooo?".repeat(200);
        let err = Rle::from_compressed(480, 640, &counts).unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::MalformedAnnotation);

        // Each delta stays small but the running value outgrows the mask.
        let err = Rle::from_compressed(2, 2, "1111111111").unwrap_err();
        assert!(err.to_string().contains("out of range"), "{err}");
    }

    #[test]
    fn square_traces_to_its_corners() {
        let mut mask = Mask::new(6, 6);
        for y in 1..4 {
            for x in 2..5 {
                mask.set(x, y);
            }
        }
        let contours = trace_contours(&mask);
        assert_eq!(contours.len(), 1);
        assert_eq!(
            pts(&contours[0]),
            vec![(2.0, 1.0), (4.0, 1.0), (4.0, 3.0), (2.0, 3.0)]
        );
    }

    #[test]
    fn single_pixel_is_one_point() {
        let mut mask = Mask::new(3, 3);
        mask.set(1, 1);
        let contours = trace_contours(&mask);
        assert_eq!(pts(&contours[0]), vec![(1.0, 1.0)]);
    }

    #[test]
    fn diagonal_neighbours_are_one_component() {
        let mut mask = Mask::new(4, 4);
        mask.set(0, 0);
        mask.set(1, 1);
        mask.set(2, 2);
        let contours = trace_contours(&mask);
        assert_eq!(contours.len(), 1);
        let traced = pts(&contours[0]);
        assert_eq!(traced[0], (0.0, 0.0));
        assert!(traced.contains(&(2.0, 2.0)));
    }

    #[test]
    fn disjoint_regions_are_flattened() {
        // h=4, w=4; column 0 rows 0-1 set, column 3 rows 2-3 set.
        let rle = Rle::new(4, 4, vec![0, 2, 12, 2]);
        let points = rle_to_points(&rle).unwrap();
        assert_eq!(
            pts(&points),
            vec![(0.0, 0.0), (0.0, 1.0), (3.0, 2.0), (3.0, 3.0)]
        );
    }

    #[test]
    fn traced_square_becomes_a_valid_segmentation() {
        let rle = Rle::new(5, 5, vec![6, 3, 2, 3, 2, 3, 6]);
        let points = rle_to_points(&rle).unwrap();
        assert_eq!(
            pts(&points),
            vec![(1.0, 1.0), (3.0, 1.0), (3.0, 3.0), (1.0, 3.0)]
        );
    }
}
