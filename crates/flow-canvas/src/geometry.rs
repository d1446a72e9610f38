//! Geometry and routing primitives for the canvas
//!
//! Pure functions over graph-space coordinates. Connection endpoints are
//! anchored on component borders with the perimeter functions, and bend
//! insertion uses `nearest_segment_index` to decide where a new bend goes.
//! Inputs are assumed to be finite; none of these functions fail.

use serde::{Deserialize, Serialize};

/// A point in graph space
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// This point moved by `(dx, dy)`
    pub fn offset(self, dx: f64, dy: f64) -> Self {
        Self::new(self.x + dx, self.y + dy)
    }

    /// Midpoint between this point and `other`
    pub fn midpoint(self, other: Point) -> Self {
        Self::new((self.x + other.x) / 2.0, (self.y + other.y) / 2.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

/// Axis-aligned rectangle, `(x, y)` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle of the given size whose top-left corner is `origin`
    pub fn at(origin: Point, width: f64, height: f64) -> Self {
        Self::new(origin.x, origin.y, width, height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    pub fn center(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    /// Whether the two rectangles overlap (touching edges count)
    pub fn intersects(&self, other: &Rect) -> bool {
        self.x <= other.right()
            && other.x <= self.right()
            && self.y <= other.bottom()
            && other.y <= self.bottom()
    }

    pub fn contains(&self, p: Point) -> bool {
        p.x >= self.x && p.x <= self.right() && p.y >= self.y && p.y <= self.bottom()
    }

    /// Smallest rectangle containing both
    pub fn union(&self, other: &Rect) -> Rect {
        let x = self.x.min(other.x);
        let y = self.y.min(other.y);
        let right = self.right().max(other.right());
        let bottom = self.bottom().max(other.bottom());
        Rect::new(x, y, right - x, bottom - y)
    }

    /// Grow the rectangle by `dx` on the left and right, `dy` on top and bottom
    pub fn expand(&self, dx: f64, dy: f64) -> Rect {
        Rect::new(
            self.x - dx,
            self.y - dy,
            self.width + 2.0 * dx,
            self.height + 2.0 * dy,
        )
    }
}

/// A circle in graph space
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Circle {
    pub center: Point,
    pub radius: f64,
}

impl Circle {
    pub const fn new(center: Point, radius: f64) -> Self {
        Self { center, radius }
    }
}

/// Outline of a component used for endpoint anchoring
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Shape {
    Rect(Rect),
    Circle(Circle),
}

impl Shape {
    pub fn center(&self) -> Point {
        match self {
            Shape::Rect(r) => r.center(),
            Shape::Circle(c) => c.center,
        }
    }

    /// Point on the outline along the ray from the center toward `toward`
    pub fn perimeter_point(&self, toward: Point) -> Point {
        match self {
            Shape::Rect(r) => perimeter_point_on_rect(toward, r),
            Shape::Circle(c) => perimeter_point_on_circle(toward, c),
        }
    }

    pub fn bounds(&self) -> Rect {
        match self {
            Shape::Rect(r) => *r,
            Shape::Circle(c) => Rect::new(
                c.center.x - c.radius,
                c.center.y - c.radius,
                2.0 * c.radius,
                2.0 * c.radius,
            ),
        }
    }
}

pub fn distance_squared(p: Point, q: Point) -> f64 {
    let dx = p.x - q.x;
    let dy = p.y - q.y;
    dx * dx + dy * dy
}

pub fn distance(p: Point, q: Point) -> f64 {
    distance_squared(p, q).sqrt()
}

/// Distance from `p` to the segment `(start, end)`
///
/// The projection is clamped to the segment. A zero-length segment is
/// treated as the single point `start`.
pub fn distance_to_point_segment(p: Point, start: Point, end: Point) -> f64 {
    let length_squared = distance_squared(start, end);
    if length_squared == 0.0 {
        return distance(p, start);
    }

    let t = ((p.x - start.x) * (end.x - start.x) + (p.y - start.y) * (end.y - start.y))
        / length_squared;
    let t = t.clamp(0.0, 1.0);

    let projection = Point::new(
        start.x + t * (end.x - start.x),
        start.y + t * (end.y - start.y),
    );
    distance(p, projection)
}

/// Index `i` of the segment `(polyline[i], polyline[i + 1])` closest to `p`
///
/// Ties resolve to the lowest index. A polyline with fewer than two points
/// has no segments and yields 0.
pub fn nearest_segment_index(p: Point, polyline: &[Point]) -> usize {
    polyline
        .windows(2)
        .enumerate()
        .map(|(i, seg)| (i, distance_to_point_segment(p, seg[0], seg[1])))
        .fold(None, |best: Option<(usize, f64)>, (i, d)| match best {
            Some((_, best_d)) if best_d <= d => best,
            _ => Some((i, d)),
        })
        .map(|(i, _)| i)
        .unwrap_or(0)
}

/// Point on the circle boundary along the ray from its center toward `toward`
///
/// When `toward` coincides with the center the ray is undefined; the
/// rightmost boundary point is returned.
pub fn perimeter_point_on_circle(toward: Point, circle: &Circle) -> Point {
    let dx = toward.x - circle.center.x;
    let dy = toward.y - circle.center.y;
    let length = (dx * dx + dy * dy).sqrt();
    if length == 0.0 {
        return circle.center.offset(circle.radius, 0.0);
    }

    circle
        .center
        .offset(circle.radius * dx / length, circle.radius * dy / length)
}

/// Point on the rectangle border along the ray from its center toward `toward`
pub fn perimeter_point_on_rect(toward: Point, rect: &Rect) -> Point {
    let center = rect.center();
    let dx = toward.x - center.x;
    let dy = toward.y - center.y;
    if dx == 0.0 && dy == 0.0 {
        return center;
    }

    let half_width = rect.width / 2.0;
    let half_height = rect.height / 2.0;
    let tx = if dx != 0.0 {
        half_width / dx.abs()
    } else {
        f64::INFINITY
    };
    let ty = if dy != 0.0 {
        half_height / dy.abs()
    } else {
        f64::INFINITY
    };
    let t = tx.min(ty);

    center.offset(dx * t, dy * t)
}

/// Path description for a polyline: `M x y L x y ...`
pub fn line_path(points: &[Point]) -> String {
    let mut path = String::new();
    for (i, p) in points.iter().enumerate() {
        if i > 0 {
            path.push(' ');
        }
        let command = if i == 0 { 'M' } else { 'L' };
        path.push_str(&format!("{}{} {}", command, p.x, p.y));
    }
    path
}

/// Smallest rectangle containing every point
pub fn bounding_box(points: &[Point]) -> Option<Rect> {
    let first = points.first()?;
    let mut min_x = first.x;
    let mut min_y = first.y;
    let mut max_x = first.x;
    let mut max_y = first.y;

    for p in &points[1..] {
        min_x = min_x.min(p.x);
        min_y = min_y.min(p.y);
        max_x = max_x.max(p.x);
        max_y = max_y.max(p.y);
    }

    Some(Rect::new(min_x, min_y, max_x - min_x, max_y - min_y))
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPSILON: f64 = 1e-9;

    #[test]
    fn test_distance() {
        assert_eq!(distance_squared(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 25.0);
        assert_eq!(distance(Point::new(0.0, 0.0), Point::new(3.0, 4.0)), 5.0);
    }

    #[test]
    fn test_distance_to_segment_clamps() {
        let start = Point::new(0.0, 0.0);
        let end = Point::new(10.0, 0.0);

        // Perpendicular foot inside the segment
        assert_eq!(distance_to_point_segment(Point::new(5.0, 3.0), start, end), 3.0);
        // Beyond the end, distance to the endpoint
        assert_eq!(distance_to_point_segment(Point::new(13.0, 4.0), start, end), 5.0);
        // Before the start
        assert_eq!(distance_to_point_segment(Point::new(-3.0, -4.0), start, end), 5.0);
    }

    #[test]
    fn test_distance_to_degenerate_segment() {
        let p = Point::new(3.0, 4.0);
        let q = Point::new(0.0, 0.0);
        assert_eq!(distance_to_point_segment(p, q, q), 5.0);
    }

    #[test]
    fn test_nearest_segment_index() {
        let polyline = [
            Point::new(0.0, 0.0),
            Point::new(100.0, 0.0),
            Point::new(100.0, 100.0),
            Point::new(0.0, 100.0),
        ];
        assert_eq!(nearest_segment_index(Point::new(50.0, 5.0), &polyline), 0);
        assert_eq!(nearest_segment_index(Point::new(95.0, 50.0), &polyline), 1);
        assert_eq!(nearest_segment_index(Point::new(40.0, 98.0), &polyline), 2);
    }

    #[test]
    fn test_nearest_segment_index_short_polyline() {
        assert_eq!(nearest_segment_index(Point::new(1.0, 1.0), &[]), 0);
        assert_eq!(nearest_segment_index(Point::new(1.0, 1.0), &[Point::new(0.0, 0.0)]), 0);
    }

    #[test]
    fn test_perimeter_point_on_circle_lies_on_circle() {
        let circle = Circle::new(Point::new(12.5, -7.0), 24.0);
        let targets = [
            Point::new(100.0, 0.0),
            Point::new(-50.0, 33.0),
            Point::new(12.5, 500.0),
            Point::new(12.6, -7.0),
            Point::new(-1e6, -1e6),
        ];
        for target in targets {
            let p = perimeter_point_on_circle(target, &circle);
            assert!((distance(p, circle.center) - circle.radius).abs() < EPSILON);
        }
    }

    #[test]
    fn test_perimeter_point_on_circle_faces_target() {
        let circle = Circle::new(Point::new(0.0, 0.0), 10.0);
        let p = perimeter_point_on_circle(Point::new(0.0, 50.0), &circle);
        assert!((p.x - 0.0).abs() < EPSILON);
        assert!((p.y - 10.0).abs() < EPSILON);
    }

    #[test]
    fn test_perimeter_point_on_rect() {
        let rect = Rect::new(0.0, 0.0, 100.0, 50.0);

        let right = perimeter_point_on_rect(Point::new(500.0, 25.0), &rect);
        assert_eq!(right, Point::new(100.0, 25.0));

        let top = perimeter_point_on_rect(Point::new(50.0, -300.0), &rect);
        assert_eq!(top, Point::new(50.0, 0.0));

        // Diagonal ray exits through the shorter half-extent
        let corner = perimeter_point_on_rect(Point::new(150.0, 125.0), &rect);
        assert!((corner.y - 50.0).abs() < EPSILON);
        assert!((corner.x - 75.0).abs() < EPSILON);
    }

    #[test]
    fn test_line_path() {
        let path = line_path(&[Point::new(0.0, 0.0), Point::new(10.5, 2.0), Point::new(20.0, -4.0)]);
        assert_eq!(path, "M0 0 L10.5 2 L20 -4");
        assert_eq!(line_path(&[]), "");
    }

    #[test]
    fn test_bounding_box() {
        let bbox = bounding_box(&[Point::new(5.0, -2.0), Point::new(-3.0, 8.0), Point::new(1.0, 1.0)])
            .unwrap();
        assert_eq!(bbox, Rect::new(-3.0, -2.0, 8.0, 10.0));
        assert!(bounding_box(&[]).is_none());
    }

    #[test]
    fn test_rect_intersects_and_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(10.0, 5.0, 5.0, 5.0);
        let c = Rect::new(20.0, 20.0, 1.0, 1.0);
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
        assert_eq!(a.union(&c), Rect::new(0.0, 0.0, 21.0, 21.0));
        assert_eq!(a.expand(1.0, 2.0), Rect::new(-1.0, -2.0, 12.0, 14.0));
    }
}
