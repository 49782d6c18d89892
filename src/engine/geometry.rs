//! Page-space geometry shared by engines and the session

use serde::{Deserialize, Serialize};

/// A point in page or raster space
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Point {
    pub x: f32,
    pub y: f32,
}

impl Point {
    #[must_use]
    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    #[must_use]
    pub fn transform(self, m: &Matrix) -> Self {
        Self {
            x: self.x * m.a + self.y * m.c + m.e,
            y: self.x * m.b + self.y * m.d + m.f,
        }
    }
}

/// Axis-aligned rectangle, `x0 <= x1` and `y0 <= y1` for non-empty rects
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Rect {
    pub x0: f32,
    pub y0: f32,
    pub x1: f32,
    pub y1: f32,
}

impl Rect {
    #[must_use]
    pub const fn new(x0: f32, y0: f32, x1: f32, y1: f32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> f32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> f32 {
        self.y1 - self.y0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    #[must_use]
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        Rect {
            x0: self.x0.min(other.x0),
            y0: self.y0.min(other.y0),
            x1: self.x1.max(other.x1),
            y1: self.y1.max(other.y1),
        }
    }

    /// Bounding box of the four transformed corners
    #[must_use]
    pub fn transform(&self, m: &Matrix) -> Rect {
        let corners = [
            Point::new(self.x0, self.y0).transform(m),
            Point::new(self.x1, self.y0).transform(m),
            Point::new(self.x0, self.y1).transform(m),
            Point::new(self.x1, self.y1).transform(m),
        ];
        let mut out = Rect::new(corners[0].x, corners[0].y, corners[0].x, corners[0].y);
        for c in &corners[1..] {
            out.x0 = out.x0.min(c.x);
            out.y0 = out.y0.min(c.y);
            out.x1 = out.x1.max(c.x);
            out.y1 = out.y1.max(c.y);
        }
        out
    }

    /// Smallest integer rectangle covering this one
    #[must_use]
    pub fn round_out(&self) -> IRect {
        IRect {
            x0: self.x0.floor() as i32,
            y0: self.y0.floor() as i32,
            x1: self.x1.ceil() as i32,
            y1: self.y1.ceil() as i32,
        }
    }
}

/// Integer rectangle in raster space
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub struct IRect {
    pub x0: i32,
    pub y0: i32,
    pub x1: i32,
    pub y1: i32,
}

impl IRect {
    #[must_use]
    pub const fn new(x0: i32, y0: i32, x1: i32, y1: i32) -> Self {
        Self { x0, y0, x1, y1 }
    }

    #[must_use]
    pub fn width(&self) -> i32 {
        self.x1 - self.x0
    }

    #[must_use]
    pub fn height(&self) -> i32 {
        self.y1 - self.y0
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.x0 >= self.x1 || self.y0 >= self.y1
    }

    #[must_use]
    pub fn intersect(&self, other: &IRect) -> IRect {
        IRect {
            x0: self.x0.max(other.x0),
            y0: self.y0.max(other.y0),
            x1: self.x1.min(other.x1),
            y1: self.y1.min(other.y1),
        }
    }
}

/// Quadrilateral, corners named as in MuPDF (upper/lower, left/right)
#[derive(Clone, Copy, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Quad {
    pub ul: Point,
    pub ur: Point,
    pub ll: Point,
    pub lr: Point,
}

impl Quad {
    #[must_use]
    pub fn from_rect(r: &Rect) -> Self {
        Self {
            ul: Point::new(r.x0, r.y0),
            ur: Point::new(r.x1, r.y0),
            ll: Point::new(r.x0, r.y1),
            lr: Point::new(r.x1, r.y1),
        }
    }

    #[must_use]
    pub fn bounds(&self) -> Rect {
        let xs = [self.ul.x, self.ur.x, self.ll.x, self.lr.x];
        let ys = [self.ul.y, self.ur.y, self.ll.y, self.lr.y];
        Rect {
            x0: xs.iter().copied().fold(f32::INFINITY, f32::min),
            y0: ys.iter().copied().fold(f32::INFINITY, f32::min),
            x1: xs.iter().copied().fold(f32::NEG_INFINITY, f32::max),
            y1: ys.iter().copied().fold(f32::NEG_INFINITY, f32::max),
        }
    }

    #[must_use]
    pub fn center(&self) -> Point {
        Point::new(
            (self.ul.x + self.ur.x + self.ll.x + self.lr.x) / 4.0,
            (self.ul.y + self.ur.y + self.ll.y + self.lr.y) / 4.0,
        )
    }
}

/// Affine transform `[a b c d e f]`, row-vector convention as in MuPDF
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Matrix {
    pub a: f32,
    pub b: f32,
    pub c: f32,
    pub d: f32,
    pub e: f32,
    pub f: f32,
}

impl Default for Matrix {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix {
    pub const IDENTITY: Matrix = Matrix {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    #[must_use]
    pub const fn new_scale(sx: f32, sy: f32) -> Self {
        Self {
            a: sx,
            b: 0.0,
            c: 0.0,
            d: sy,
            e: 0.0,
            f: 0.0,
        }
    }

    #[must_use]
    pub const fn new_translate(tx: f32, ty: f32) -> Self {
        Self {
            a: 1.0,
            b: 0.0,
            c: 0.0,
            d: 1.0,
            e: tx,
            f: ty,
        }
    }

    /// `self` followed by `other`
    #[must_use]
    pub fn concat(&self, other: &Matrix) -> Matrix {
        Matrix {
            a: self.a * other.a + self.b * other.c,
            b: self.a * other.b + self.b * other.d,
            c: self.c * other.a + self.d * other.c,
            d: self.c * other.b + self.d * other.d,
            e: self.e * other.a + self.f * other.c + other.e,
            f: self.e * other.b + self.f * other.d + other.f,
        }
    }

    /// Post-multiplies a scale, keeping any translation proportional
    #[must_use]
    pub fn post_scale(&self, sx: f32, sy: f32) -> Matrix {
        self.concat(&Matrix::new_scale(sx, sy))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scale_then_translate_maps_corners() {
        let m = Matrix::new_translate(-10.0, -20.0).post_scale(2.0, 3.0);
        let r = Rect::new(10.0, 20.0, 110.0, 220.0).transform(&m);
        assert_eq!(r, Rect::new(0.0, 0.0, 200.0, 600.0));
    }

    #[test]
    fn round_out_covers_fractional_edges() {
        let r = Rect::new(0.2, 0.7, 10.1, 19.9).round_out();
        assert_eq!(r, IRect::new(0, 0, 11, 20));
    }

    #[test]
    fn union_ignores_empty_rects() {
        let a = Rect::new(1.0, 1.0, 2.0, 2.0);
        assert_eq!(Rect::default().union(&a), a);
        assert_eq!(a.union(&Rect::new(5.0, 0.0, 6.0, 3.0)), Rect::new(1.0, 0.0, 6.0, 3.0));
    }

    #[test]
    fn quad_bounds_of_rotated_quad() {
        let q = Quad {
            ul: Point::new(5.0, 0.0),
            ur: Point::new(10.0, 5.0),
            ll: Point::new(0.0, 5.0),
            lr: Point::new(5.0, 10.0),
        };
        assert_eq!(q.bounds(), Rect::new(0.0, 0.0, 10.0, 10.0));
        assert_eq!(q.center(), Point::new(5.0, 5.0));
    }
}
