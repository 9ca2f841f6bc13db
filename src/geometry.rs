//! Floating-point geometry for image extents.
//!
//! Image space is y-up: `origin` is the bottom-left corner of a [`Rect`].

/// A point in image space.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

/// A width/height pair in image units.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }
}

/// Axis-aligned rectangle in image space.
///
/// The infinite rectangle ([`Rect::infinite`]) is the extent of generator
/// images that have not been cropped.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Rect {
    pub origin: Point,
    pub size: Size,
}

const INFINITE_ORIGIN: f64 = f64::MIN / 2.0;
const INFINITE_SIZE: f64 = f64::MAX;

impl Rect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            origin: Point::new(x, y),
            size: Size::new(width, height),
        }
    }

    /// The rectangle covering the whole plane.
    pub const fn infinite() -> Self {
        Self::new(INFINITE_ORIGIN, INFINITE_ORIGIN, INFINITE_SIZE, INFINITE_SIZE)
    }

    /// Whether this is the rectangle covering the whole plane.
    pub fn is_infinite(&self) -> bool {
        self.size.width >= INFINITE_SIZE || self.size.height >= INFINITE_SIZE
    }

    /// Whether the rectangle encloses no area.
    pub fn is_empty(&self) -> bool {
        !(self.size.width > 0.0 && self.size.height > 0.0)
    }

    #[inline]
    pub fn min_x(&self) -> f64 {
        self.origin.x
    }

    #[inline]
    pub fn min_y(&self) -> f64 {
        self.origin.y
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.origin.x + self.size.width
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.origin.y + self.size.height
    }

    /// Half-open containment: the min edges are inside, the max edges are not.
    pub fn contains(&self, p: Point) -> bool {
        if self.is_infinite() {
            return true;
        }
        p.x >= self.min_x() && p.x < self.max_x() && p.y >= self.min_y() && p.y < self.max_y()
    }

    /// Overlap of two rectangles; empty (zero-sized) if they do not overlap.
    pub fn intersection(&self, other: &Rect) -> Rect {
        if self.is_infinite() {
            return *other;
        }
        if other.is_infinite() {
            return *self;
        }
        let x0 = self.min_x().max(other.min_x());
        let y0 = self.min_y().max(other.min_y());
        let x1 = self.max_x().min(other.max_x());
        let y1 = self.max_y().min(other.max_y());
        if x1 <= x0 || y1 <= y0 {
            return Rect::new(x0, y0, 0.0, 0.0);
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }

    /// Smallest rectangle containing both. Empty rectangles are ignored.
    pub fn union(&self, other: &Rect) -> Rect {
        if self.is_infinite() || other.is_infinite() {
            return Rect::infinite();
        }
        if self.is_empty() {
            return *other;
        }
        if other.is_empty() {
            return *self;
        }
        let x0 = self.min_x().min(other.min_x());
        let y0 = self.min_y().min(other.min_y());
        let x1 = self.max_x().max(other.max_x());
        let y1 = self.max_y().max(other.max_y());
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

/// 2D affine transform mapping `(x, y)` to
/// `(a*x + c*y + tx, b*x + d*y + ty)`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct AffineTransform {
    pub a: f64,
    pub b: f64,
    pub c: f64,
    pub d: f64,
    pub tx: f64,
    pub ty: f64,
}

impl Default for AffineTransform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl AffineTransform {
    pub const IDENTITY: Self = Self {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        tx: 0.0,
        ty: 0.0,
    };

    pub const fn translation(tx: f64, ty: f64) -> Self {
        Self {
            tx,
            ty,
            ..Self::IDENTITY
        }
    }

    pub const fn scale(sx: f64, sy: f64) -> Self {
        Self {
            a: sx,
            d: sy,
            ..Self::IDENTITY
        }
    }

    pub fn apply(&self, p: Point) -> Point {
        Point::new(
            self.a * p.x + self.c * p.y + self.tx,
            self.b * p.x + self.d * p.y + self.ty,
        )
    }

    /// Inverse transform, or `None` if the matrix is singular.
    pub fn invert(&self) -> Option<Self> {
        let det = self.a * self.d - self.b * self.c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        let a = self.d / det;
        let b = -self.b / det;
        let c = -self.c / det;
        let d = self.a / det;
        Some(Self {
            a,
            b,
            c,
            d,
            tx: -(a * self.tx + c * self.ty),
            ty: -(b * self.tx + d * self.ty),
        })
    }

    /// Bounding box of the transformed rectangle. The infinite rectangle
    /// stays infinite.
    pub fn apply_to_rect(&self, r: &Rect) -> Rect {
        if r.is_infinite() {
            return Rect::infinite();
        }
        let corners = [
            self.apply(Point::new(r.min_x(), r.min_y())),
            self.apply(Point::new(r.max_x(), r.min_y())),
            self.apply(Point::new(r.min_x(), r.max_y())),
            self.apply(Point::new(r.max_x(), r.max_y())),
        ];
        let mut x0 = f64::INFINITY;
        let mut y0 = f64::INFINITY;
        let mut x1 = f64::NEG_INFINITY;
        let mut y1 = f64::NEG_INFINITY;
        for p in corners {
            x0 = x0.min(p.x);
            y0 = y0.min(p.y);
            x1 = x1.max(p.x);
            y1 = y1.max(p.y);
        }
        Rect::new(x0, y0, x1 - x0, y1 - y0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn intersection_and_union() {
        let a = Rect::new(0.0, 0.0, 10.0, 10.0);
        let b = Rect::new(5.0, 5.0, 10.0, 10.0);
        assert_eq!(a.intersection(&b), Rect::new(5.0, 5.0, 5.0, 5.0));
        assert_eq!(a.union(&b), Rect::new(0.0, 0.0, 15.0, 15.0));
        assert!(a.intersection(&Rect::new(20.0, 20.0, 1.0, 1.0)).is_empty());
        assert_eq!(Rect::infinite().intersection(&a), a);
        assert!(Rect::infinite().union(&a).is_infinite());
    }

    #[test]
    fn contains_is_half_open() {
        let r = Rect::new(0.0, 0.0, 2.0, 2.0);
        assert!(r.contains(Point::new(0.0, 0.0)));
        assert!(r.contains(Point::new(1.5, 1.5)));
        assert!(!r.contains(Point::new(2.0, 1.0)));
        assert!(Rect::infinite().contains(Point::new(-1e300, 1e300)));
    }

    #[test]
    fn transform_roundtrip() {
        let t = AffineTransform {
            tx: 5.0,
            ty: -1.0,
            ..AffineTransform::scale(2.0, 3.0)
        };
        let p = t.apply(Point::new(1.0, 1.0));
        assert_eq!(p, Point::new(7.0, 2.0));
        let back = t.invert().unwrap().apply(p);
        assert!((back.x - 1.0).abs() < 1e-12);
        assert!((back.y - 1.0).abs() < 1e-12);
        assert!(AffineTransform::scale(0.0, 1.0).invert().is_none());
    }

    #[test]
    fn transformed_rect_bounds() {
        let r = Rect::new(0.0, 0.0, 4.0, 2.0);
        let flipped = AffineTransform::scale(-1.0, 2.0).apply_to_rect(&r);
        assert_eq!(flipped, Rect::new(-4.0, 0.0, 4.0, 4.0));
        assert!(
            AffineTransform::translation(1.0, 1.0)
                .apply_to_rect(&Rect::infinite())
                .is_infinite()
        );
    }
}
