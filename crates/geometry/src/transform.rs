use crate::point::Point;

/// Place local vertices into the parent frame: scale each axis, rotate by
/// `rotation_deg` counter-clockwise, then translate by `insertion`.
///
/// The order matters: with non-uniform scale, rotating before scaling gives
/// a different shape.
pub fn transform(
    vertices: &[Point],
    insertion: Point,
    rotation_deg: f64,
    scale_x: f64,
    scale_y: f64,
) -> Vec<Point> {
    let affine = Affine::from_insert(insertion, rotation_deg, scale_x, scale_y);
    vertices.iter().map(|p| affine.apply(*p)).collect()
}

/// 2D affine map `(x, y) -> (a*x + b*y + c, d*x + e*y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Affine {
    pub const IDENTITY: Affine = Affine {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 0.0,
        e: 1.0,
        f: 0.0,
    };

    /// Block insertion transform, same operation order as [`transform`].
    pub fn from_insert(insertion: Point, rotation_deg: f64, scale_x: f64, scale_y: f64) -> Self {
        let (sin, cos) = rotation_deg.to_radians().sin_cos();
        Self {
            a: scale_x * cos,
            b: -scale_y * sin,
            c: insertion.x,
            d: scale_x * sin,
            e: scale_y * cos,
            f: insertion.y,
        }
    }

    /// Returns the map that applies `inner` first and then `self`.
    pub fn compose(&self, inner: &Affine) -> Affine {
        Affine {
            a: self.a * inner.a + self.b * inner.d,
            b: self.a * inner.b + self.b * inner.e,
            c: self.a * inner.c + self.b * inner.f + self.c,
            d: self.d * inner.a + self.e * inner.d,
            e: self.d * inner.b + self.e * inner.e,
            f: self.d * inner.c + self.e * inner.f + self.f,
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.b * p.y + self.c,
            self.d * p.x + self.e * p.y + self.f,
        )
    }

    pub fn apply_all(&self, vertices: &[Point]) -> Vec<Point> {
        vertices.iter().map(|p| self.apply(*p)).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const EPS: f64 = 1e-9;

    fn assert_close(a: Point, b: Point) {
        assert!(
            (a.x - b.x).abs() < EPS && (a.y - b.y).abs() < EPS,
            "{:?} != {:?}",
            a,
            b
        );
    }

    #[test]
    fn test_identity_transform() {
        let vertices = vec![
            Point::new(1.5, -2.0),
            Point::new(100.0, 3.25),
            Point::new(-7.0, 0.0),
        ];
        let out = transform(&vertices, Point::ORIGIN, 0.0, 1.0, 1.0);
        assert_eq!(out, vertices);
    }

    #[test]
    fn test_rotate_quarter_turn() {
        let out = transform(&[Point::new(1.0, 0.0)], Point::ORIGIN, 90.0, 1.0, 1.0);
        assert_close(out[0], Point::new(0.0, 1.0));
    }

    #[test]
    fn test_scale_then_rotate_then_translate() {
        // (1, 1) scaled by (2, 1) is (2, 1); rotated 90° is (-1, 2); moved by (10, 20).
        let out = transform(&[Point::new(1.0, 1.0)], Point::new(10.0, 20.0), 90.0, 2.0, 1.0);
        assert_close(out[0], Point::new(9.0, 22.0));
    }

    #[test]
    fn test_compose_matches_sequential_application() {
        let parent = Affine::from_insert(Point::new(100.0, 50.0), 30.0, 2.0, 0.5);
        let child = Affine::from_insert(Point::new(-3.0, 7.0), -45.0, 1.5, 3.0);
        let p = Point::new(4.0, -1.0);

        let sequential = parent.apply(child.apply(p));
        let composed = parent.compose(&child).apply(p);
        assert_close(composed, sequential);
    }

    #[test]
    fn test_identity_is_neutral() {
        let t = Affine::from_insert(Point::new(1.0, 2.0), 15.0, 3.0, 4.0);
        assert_eq!(Affine::IDENTITY.compose(&t), t);
        assert_eq!(t.compose(&Affine::IDENTITY), t);
    }
}
