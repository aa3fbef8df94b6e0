use std::f64::consts::TAU;

use crate::point::Point;

/// Segment count used when a circle is approximated as a polygon.
pub const DEFAULT_CIRCLE_SEGMENTS: usize = 32;

/// Areas below this are treated as degenerate geometry.
pub const MIN_AREA: f64 = 1e-9;

/// Polygon area by the shoelace formula. Fewer than 3 vertices have no area.
pub fn area(vertices: &[Point]) -> f64 {
    if vertices.len() < 3 {
        return 0.0;
    }

    let n = vertices.len();
    let mut sum = 0.0;
    for i in 0..n {
        let a = vertices[i];
        let b = vertices[(i + 1) % n];
        sum += a.x * b.y - b.x * a.y;
    }

    sum.abs() / 2.0
}

/// Arithmetic mean of the vertices, or `None` for an empty slice.
pub fn centroid(vertices: &[Point]) -> Option<Point> {
    if vertices.is_empty() {
        return None;
    }

    let n = vertices.len() as f64;
    let (sx, sy) = vertices
        .iter()
        .fold((0.0, 0.0), |(sx, sy), p| (sx + p.x, sy + p.y));

    Some(Point::new(sx / n, sy / n))
}

/// Approximate a circle with `segments` points evenly spaced over [0, 2π),
/// counter-clockwise starting on the positive x axis.
pub fn circle_to_polygon(center: Point, radius: f64, segments: usize) -> Vec<Point> {
    (0..segments)
        .map(|i| {
            let angle = TAU * i as f64 / segments as f64;
            Point::new(
                center.x + radius * angle.cos(),
                center.y + radius * angle.sin(),
            )
        })
        .collect()
}

/// Shift every vertex set so the minimum x and y across all of them is zero.
pub fn normalize(sets: &[Vec<Point>]) -> Vec<Vec<Point>> {
    let mut all = sets.iter().flatten();
    let Some(first) = all.next() else {
        return sets.to_vec();
    };

    let (min_x, min_y) = all.fold((first.x, first.y), |(mx, my), p| (mx.min(p.x), my.min(p.y)));

    sets.iter()
        .map(|set| {
            set.iter()
                .map(|p| Point::new(p.x - min_x, p.y - min_y))
                .collect()
        })
        .collect()
}
