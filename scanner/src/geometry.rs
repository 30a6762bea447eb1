//! Detection-zone geometry: the centered square, canonical corner order and
//! containment of axis-aligned rectangles.

use imageproc::point::Point;

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ZoneError {
    #[error("detection square side {side} does not fit a {width}x{height} frame (max {max})")]
    TooLarge {
        side: u32,
        width: u32,
        height: u32,
        max: u32,
    },
}

/// Four corners in canonical order:
///
/// ```text
/// 0   1
/// 3   2
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OrderedRect([Point<i32>; 4]);

impl OrderedRect {
    /// Canonicalize the corners of a convex quadrilateral.
    ///
    /// Top-left has the smallest `x + y`, bottom-right the largest. Top-right
    /// has the smallest `y - x`, bottom-left the largest. Ties go to the
    /// earliest input point.
    pub fn from_corners(points: [Point<i32>; 4]) -> Self {
        let sum = |p: &Point<i32>| p.x + p.y;
        let diff = |p: &Point<i32>| p.y - p.x;

        OrderedRect([
            first_min_by_key(&points, sum),
            first_min_by_key(&points, diff),
            first_max_by_key(&points, sum),
            first_max_by_key(&points, diff),
        ])
    }

    pub fn corners(&self) -> &[Point<i32>; 4] {
        &self.0
    }

    pub fn top_left(&self) -> Point<i32> {
        self.0[0]
    }

    pub fn top_right(&self) -> Point<i32> {
        self.0[1]
    }

    pub fn bottom_right(&self) -> Point<i32> {
        self.0[2]
    }

    pub fn bottom_left(&self) -> Point<i32> {
        self.0[3]
    }

    /// Whether `inner` lies fully inside `self`.
    ///
    /// Only the diagonal corners are compared, so the answer is exact for
    /// axis-aligned rectangles and an approximation for rotated ones.
    pub fn contains(&self, inner: &OrderedRect) -> bool {
        let (outer_tl, outer_br) = (self.top_left(), self.bottom_right());
        let (inner_tl, inner_br) = (inner.top_left(), inner.bottom_right());

        inner_tl.x >= outer_tl.x
            && inner_tl.y >= outer_tl.y
            && inner_br.x <= outer_br.x
            && inner_br.y <= outer_br.y
    }

    /// `(x, y, width, height)` spanned by the diagonal corners, clamped at zero.
    pub fn bounds(&self) -> (u32, u32, u32, u32) {
        let (tl, br) = (self.top_left(), self.bottom_right());
        let x = tl.x.max(0) as u32;
        let y = tl.y.max(0) as u32;
        let w = (br.x - tl.x).max(0) as u32;
        let h = (br.y - tl.y).max(0) as u32;
        (x, y, w, h)
    }
}

/// Same as [`OrderedRect::from_corners`].
pub fn order_corners(points: [Point<i32>; 4]) -> OrderedRect {
    OrderedRect::from_corners(points)
}

/// The detection square of side `side` centered on a `width` x `height` frame.
pub fn detection_square(width: u32, height: u32, side: u32) -> Result<OrderedRect, ZoneError> {
    let max = width.min(height);
    if side > max {
        return Err(ZoneError::TooLarge {
            side,
            width,
            height,
            max,
        });
    }

    let (cx, cy) = ((width / 2) as i32, (height / 2) as i32);
    let half = (side / 2) as i32;
    // Anchor on the top-left so the square spans exactly `side` pixels.
    let (left, top) = ((cx - half).max(0), (cy - half).max(0));
    let (right, bottom) = (left + side as i32, top + side as i32);

    Ok(OrderedRect([
        Point::new(left, top),
        Point::new(right, top),
        Point::new(right, bottom),
        Point::new(left, bottom),
    ]))
}

/// Shoelace area of a closed polygon.
pub fn polygon_area(points: &[Point<i32>]) -> f64 {
    if points.len() < 3 {
        return 0.0;
    }
    let twice: i64 = points
        .iter()
        .zip(points.iter().cycle().skip(1))
        .map(|(a, b)| a.x as i64 * b.y as i64 - b.x as i64 * a.y as i64)
        .sum();
    (twice as f64 / 2.0).abs()
}

fn first_min_by_key(points: &[Point<i32>; 4], key: impl Fn(&Point<i32>) -> i32) -> Point<i32> {
    let mut best = points[0];
    for p in &points[1..] {
        if key(p) < key(&best) {
            best = *p;
        }
    }
    best
}

fn first_max_by_key(points: &[Point<i32>; 4], key: impl Fn(&Point<i32>) -> i32) -> Point<i32> {
    let mut best = points[0];
    for p in &points[1..] {
        if key(p) > key(&best) {
            best = *p;
        }
    }
    best
}
