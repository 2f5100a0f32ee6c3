/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 11/03/2024
Last Modified: 18/04/2024
License: MIT
*/
use std::fmt;

/// A 2-D point, with x and y fields.
#[derive(Default, Clone, Copy, Debug, PartialEq)]
pub struct Point2D {
    pub x: f64,
    pub y: f64,
}

impl Point2D {
    pub fn new(x: f64, y: f64) -> Point2D {
        Point2D { x, y }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl fmt::Display for Point2D {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "(x: {}, y: {})", self.x, self.y)
    }
}
