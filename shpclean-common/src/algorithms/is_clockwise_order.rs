/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 14/03/2024
Last Modified: 14/03/2024
License: MIT
*/
use crate::structures::Point2D;

/// Checks whether a sequence of Point2D is in clockwise order.
///
/// Based on the method described by Paul Bourke, March 1998:
/// http://paulbourke.net/geometry/clockwise/index.html
pub fn is_clockwise_order(points: &[Point2D]) -> bool {
    // a closing vertex that repeats the first is not a legitimate point
    let num_points = if points.len() > 1 && points[0] == points[points.len() - 1] {
        points.len() - 1
    } else {
        points.len()
    };

    if num_points < 3 {
        return false; // degenerate ring
    }

    // cross product of each adjacent edge pair tells convexity
    let mut cross = vec![0f64; num_points];
    for j in 0..num_points {
        let n1 = if j == 0 { num_points - 1 } else { j - 1 };
        let n2 = j;
        let n3 = if j == num_points - 1 { 0 } else { j + 1 };
        cross[j] = (points[n2].x - points[n1].x) * (points[n3].y - points[n2].y)
            - (points[n2].y - points[n1].y) * (points[n3].x - points[n2].x);
    }

    let test_sign = cross[0] >= 0f64;
    let is_convex = cross
        .iter()
        .skip(1)
        .all(|&c| (c >= 0f64) == test_sign);

    if is_convex {
        // for a convex ring a positive cross product means counter-clockwise
        return !test_sign;
    }

    // concave case: fall back on the signed area
    let mut area = 0f64;
    for j in 0..num_points {
        let n2 = if j < num_points - 1 { j + 1 } else { 0 };
        area += (points[j].x * points[n2].y) - (points[n2].x * points[j].y);
    }
    // a positive signed area indicates counter-clockwise order
    area / 2.0 < 0f64
}
