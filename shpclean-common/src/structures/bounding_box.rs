/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 11/03/2024
Last Modified: 18/04/2024
License: MIT
*/
use crate::structures::Point2D;

/// Axis-aligned minimum bounding rectangle.
///
/// A default box is "inside out" (min = +inf, max = -inf) so that the
/// first `expand_to` call snaps it onto real data; this mirrors how a
/// running extent is accumulated while streaming records.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct BoundingBox {
    pub min_x: f64,
    pub min_y: f64,
    pub max_x: f64,
    pub max_y: f64,
}

impl Default for BoundingBox {
    fn default() -> BoundingBox {
        BoundingBox {
            min_x: f64::INFINITY,
            min_y: f64::INFINITY,
            max_x: f64::NEG_INFINITY,
            max_y: f64::NEG_INFINITY,
        }
    }
}

impl BoundingBox {
    pub fn new(min_x: f64, min_y: f64, max_x: f64, max_y: f64) -> BoundingBox {
        BoundingBox {
            min_x,
            min_y,
            max_x,
            max_y,
        }
    }

    pub fn from_points(points: &[Point2D]) -> BoundingBox {
        let mut bb = BoundingBox::default();
        for p in points {
            bb.expand_to(p.x, p.y);
        }
        bb
    }

    pub fn is_empty(&self) -> bool {
        self.min_x > self.max_x || self.min_y > self.max_y
    }

    pub fn expand_to(&mut self, x: f64, y: f64) {
        if x < self.min_x {
            self.min_x = x;
        }
        if x > self.max_x {
            self.max_x = x;
        }
        if y < self.min_y {
            self.min_y = y;
        }
        if y > self.max_y {
            self.max_y = y;
        }
    }

    pub fn expand_by(&mut self, other: &BoundingBox) {
        if other.is_empty() {
            return;
        }
        self.expand_to(other.min_x, other.min_y);
        self.expand_to(other.max_x, other.max_y);
    }

    /// Tests whether `other` lies entirely inside this box. Boundaries
    /// count as inside.
    pub fn contains_bounds(&self, other: &BoundingBox) -> bool {
        other.min_x >= self.min_x
            && other.min_x <= self.max_x
            && other.max_x >= self.min_x
            && other.max_x <= self.max_x
            && other.min_y >= self.min_y
            && other.min_y <= self.max_y
            && other.max_y >= self.min_y
            && other.max_y <= self.max_y
    }
}

#[cfg(test)]
mod test {
    use super::BoundingBox;
    use crate::structures::Point2D;

    #[test]
    fn test_expand_to() {
        let mut bb = BoundingBox::default();
        assert!(bb.is_empty());
        bb.expand_to(2.0, 3.0);
        bb.expand_to(-1.0, 7.0);
        assert_eq!(bb, BoundingBox::new(-1.0, 3.0, 2.0, 7.0));
    }

    #[test]
    fn test_contains_bounds() {
        let outer = BoundingBox::from_points(&[Point2D::new(0.0, 0.0), Point2D::new(10.0, 10.0)]);
        let inner = BoundingBox::from_points(&[Point2D::new(2.0, 2.0), Point2D::new(8.0, 8.0)]);
        assert!(outer.contains_bounds(&inner));
        assert!(!inner.contains_bounds(&outer));
        // shared edges still count as contained
        assert!(outer.contains_bounds(&outer.clone()));
    }
}
