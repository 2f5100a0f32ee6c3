/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 14/03/2024
Last Modified: 14/03/2024
License: MIT
*/
use crate::structures::Point2D;

/// Tests whether `p` lies on the surface bounded by the closed ring
/// `ring` (interior or boundary of the ring's edge set), using the
/// non-zero winding rule.
pub fn point_on_ring_surface(p: Point2D, ring: &[Point2D]) -> bool {
    winding_number(p, ring) != 0
}

fn winding_number(p: Point2D, ring: &[Point2D]) -> i32 {
    let mut wn = 0i32;
    if ring.len() < 2 {
        return 0;
    }
    for j in 0..ring.len() - 1 {
        let v0 = ring[j];
        let v1 = ring[j + 1];
        if v0.y <= p.y {
            if v1.y > p.y {
                // an upward crossing
                if is_left(v0, v1, p) > 0f64 {
                    wn += 1;
                }
            }
        } else if v1.y <= p.y {
            // a downward crossing
            if is_left(v0, v1, p) < 0f64 {
                wn -= 1;
            }
        }
    }
    wn
}

/// Tests if point `p` is left (>0), on (=0), or right (<0) of the
/// infinite line through `p0` and `p1`.
fn is_left(p0: Point2D, p1: Point2D, p: Point2D) -> f64 {
    (p1.x - p0.x) * (p.y - p0.y) - (p.x - p0.x) * (p1.y - p0.y)
}
