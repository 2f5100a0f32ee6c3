/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 08/04/2024
Last Modified: 02/06/2024
License: MIT
*/
use shpclean_common::algorithms::is_clockwise_order;
use shpclean_common::structures::Point2D;
use shpclean_vector::{Geometry, PointString, PolygonPart};

/// Outcome of a repair attempt.
pub enum MakeValid {
    /// The geometry was fixed (or was fine) and nothing was lost.
    Repaired(Geometry),
    /// A usable geometry came out, but parts had to be thrown away.
    Discarded(Geometry),
    /// No usable geometry could be produced.
    Failed,
}

/// Seam for the geometry-validity collaborator. The repair loop only
/// ever talks to this trait, so a topological engine can replace the
/// structural one without touching the orchestration.
pub trait ValidityEngine {
    /// `Ok` for a valid geometry, `Err(reason)` otherwise. ESRI mode
    /// relaxes the interior-ring winding rule.
    fn check(&self, geom: &Geometry, esri: bool) -> Result<(), String>;

    /// Attempts to produce a valid geometry from an invalid one.
    fn make_valid(&self, geom: Geometry) -> MakeValid;
}

/// Structural validity: finiteness, part sizes, ring closure, ring area
/// and interior winding. No self-intersection analysis.
pub struct StructuralValidity;

fn all_finite(ps: &PointString) -> bool {
    ps.points.iter().all(|p| p.is_finite())
        && ps.z.iter().all(|v| v.is_finite())
        && ps.m.iter().all(|v| v.is_finite())
}

/// Twice the signed shoelace area; zero means a degenerate ring.
fn ring_area2(points: &[Point2D]) -> f64 {
    let mut sum = 0.0;
    for i in 0..points.len() {
        let a = points[i];
        let b = points[(i + 1) % points.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    sum
}

fn check_ring(ring: &PointString) -> Result<(), String> {
    if !all_finite(ring) {
        return Err("Invalid Coordinate".to_string());
    }
    if ring.len() < 4 {
        return Err("Too few points in Ring".to_string());
    }
    if !ring.is_closed() {
        return Err("Ring not closed".to_string());
    }
    if ring_area2(&ring.points) == 0.0 {
        return Err("Zero-area Ring".to_string());
    }
    Ok(())
}

impl ValidityEngine for StructuralValidity {
    fn check(&self, geom: &Geometry, esri: bool) -> Result<(), String> {
        match geom {
            Geometry::Point { x, y, z, m } => {
                if !(x.is_finite() && y.is_finite() && z.is_finite() && m.is_finite()) {
                    return Err("Invalid Coordinate".to_string());
                }
                Ok(())
            }
            Geometry::MultiPoint(ps) => {
                if ps.is_empty() {
                    return Err("Empty Geometry".to_string());
                }
                if !all_finite(ps) {
                    return Err("Invalid Coordinate".to_string());
                }
                Ok(())
            }
            Geometry::MultiLineString(lines) => {
                if lines.is_empty() {
                    return Err("Empty Geometry".to_string());
                }
                for line in lines {
                    if !all_finite(line) {
                        return Err("Invalid Coordinate".to_string());
                    }
                    if line.len() < 2 {
                        return Err("Too few points in Linestring".to_string());
                    }
                }
                Ok(())
            }
            Geometry::MultiPolygon(polys) => {
                if polys.is_empty() {
                    return Err("Empty Geometry".to_string());
                }
                for poly in polys {
                    check_ring(&poly.exterior)?;
                    for hole in &poly.holes {
                        check_ring(hole)?;
                        // shapefile convention winds holes opposite to
                        // their exterior; ESRI tooling does not care
                        if !esri && is_clockwise_order(&hole.points) {
                            return Err(
                                "Interior Ring wound in the same direction as the Exterior"
                                    .to_string(),
                            );
                        }
                    }
                }
                Ok(())
            }
        }
    }

    fn make_valid(&self, geom: Geometry) -> MakeValid {
        match geom {
            Geometry::Point { x, y, z, m } => {
                if x.is_finite() && y.is_finite() && z.is_finite() && m.is_finite() {
                    MakeValid::Repaired(Geometry::Point { x, y, z, m })
                } else {
                    MakeValid::Failed
                }
            }
            Geometry::MultiPoint(ps) => {
                let mut kept = PointString::with_capacity(ps.len());
                for i in 0..ps.len() {
                    if ps.points[i].is_finite() && ps.z[i].is_finite() && ps.m[i].is_finite() {
                        kept.push(ps.points[i].x, ps.points[i].y, ps.z[i], ps.m[i]);
                    }
                }
                if kept.is_empty() {
                    MakeValid::Failed
                } else if kept.len() < ps.len() {
                    MakeValid::Discarded(Geometry::MultiPoint(kept))
                } else {
                    MakeValid::Repaired(Geometry::MultiPoint(kept))
                }
            }
            Geometry::MultiLineString(lines) => {
                let total = lines.len();
                let kept: Vec<PointString> = lines
                    .into_iter()
                    .filter(|line| all_finite(line) && line.len() >= 2)
                    .collect();
                if kept.is_empty() {
                    MakeValid::Failed
                } else if kept.len() < total {
                    MakeValid::Discarded(Geometry::MultiLineString(kept))
                } else {
                    MakeValid::Repaired(Geometry::MultiLineString(kept))
                }
            }
            Geometry::MultiPolygon(polys) => {
                let mut discarded = false;
                let mut kept = Vec::with_capacity(polys.len());
                for poly in polys {
                    let exterior = match repair_ring(poly.exterior) {
                        Some(r) => r,
                        None => {
                            discarded = true;
                            continue;
                        }
                    };
                    let mut holes = Vec::with_capacity(poly.holes.len());
                    for hole in poly.holes {
                        match repair_ring(hole) {
                            Some(r) => holes.push(r),
                            None => discarded = true,
                        }
                    }
                    kept.push(PolygonPart { exterior, holes });
                }
                if kept.is_empty() {
                    MakeValid::Failed
                } else if discarded {
                    MakeValid::Discarded(Geometry::MultiPolygon(kept))
                } else {
                    MakeValid::Repaired(Geometry::MultiPolygon(kept))
                }
            }
        }
    }
}

/// Closes an open ring; degenerate or non-finite rings are dropped.
fn repair_ring(mut ring: PointString) -> Option<PointString> {
    if !all_finite(&ring) {
        return None;
    }
    if !ring.is_closed() && !ring.is_empty() {
        let first = ring.points[0];
        ring.push(first.x, first.y, ring.z[0], ring.m[0]);
    }
    if ring.len() < 4 || ring_area2(&ring.points) == 0.0 {
        return None;
    }
    Some(ring)
}

#[cfg(test)]
mod test {
    use super::*;
    use shpclean_vector::PolygonPart;

    fn ring(closed: bool) -> PointString {
        let mut ps = PointString::default();
        ps.push(0.0, 0.0, 0.0, 0.0);
        ps.push(0.0, 4.0, 0.0, 0.0);
        ps.push(4.0, 4.0, 0.0, 0.0);
        ps.push(4.0, 0.0, 0.0, 0.0);
        if closed {
            ps.push(0.0, 0.0, 0.0, 0.0);
        }
        ps
    }

    #[test]
    fn test_check_accepts_clean_polygon() {
        let geom = Geometry::MultiPolygon(vec![PolygonPart {
            exterior: ring(true),
            holes: vec![],
        }]);
        assert!(StructuralValidity.check(&geom, false).is_ok());
    }

    #[test]
    fn test_check_rejects_open_ring() {
        let geom = Geometry::MultiPolygon(vec![PolygonPart {
            exterior: ring(false),
            holes: vec![],
        }]);
        assert_eq!(
            StructuralValidity.check(&geom, false).unwrap_err(),
            "Ring not closed"
        );
    }

    #[test]
    fn test_check_rejects_nan() {
        let geom = Geometry::Point {
            x: f64::NAN,
            y: 0.0,
            z: 0.0,
            m: 0.0,
        };
        assert_eq!(
            StructuralValidity.check(&geom, false).unwrap_err(),
            "Invalid Coordinate"
        );
    }

    #[test]
    fn test_esri_mode_tolerates_same_winding_hole() {
        // hole wound clockwise like the exterior
        let geom = Geometry::MultiPolygon(vec![PolygonPart {
            exterior: ring(true),
            holes: vec![{
                let mut h = PointString::default();
                h.push(1.0, 1.0, 0.0, 0.0);
                h.push(1.0, 2.0, 0.0, 0.0);
                h.push(2.0, 2.0, 0.0, 0.0);
                h.push(2.0, 1.0, 0.0, 0.0);
                h.push(1.0, 1.0, 0.0, 0.0);
                h
            }],
        }]);
        assert!(StructuralValidity.check(&geom, false).is_err());
        assert!(StructuralValidity.check(&geom, true).is_ok());
    }

    #[test]
    fn test_make_valid_closes_ring() {
        let geom = Geometry::MultiPolygon(vec![PolygonPart {
            exterior: ring(false),
            holes: vec![],
        }]);
        match StructuralValidity.make_valid(geom) {
            MakeValid::Repaired(Geometry::MultiPolygon(polys)) => {
                assert!(polys[0].exterior.is_closed());
                assert_eq!(polys[0].exterior.len(), 5);
            }
            _ => panic!("expected a clean repair"),
        }
    }

    #[test]
    fn test_make_valid_reports_discarded_parts() {
        let degenerate = {
            let mut ps = PointString::default();
            ps.push(0.0, 0.0, 0.0, 0.0);
            ps.push(1.0, 1.0, 0.0, 0.0);
            ps
        };
        let geom = Geometry::MultiPolygon(vec![
            PolygonPart {
                exterior: ring(true),
                holes: vec![],
            },
            PolygonPart {
                exterior: degenerate,
                holes: vec![],
            },
        ]);
        match StructuralValidity.make_valid(geom) {
            MakeValid::Discarded(Geometry::MultiPolygon(polys)) => {
                assert_eq!(polys.len(), 1);
            }
            _ => panic!("expected a lossy repair"),
        }
    }

    #[test]
    fn test_make_valid_failure() {
        let geom = Geometry::Point {
            x: f64::INFINITY,
            y: 0.0,
            z: 0.0,
            m: 0.0,
        };
        assert!(matches!(
            StructuralValidity.make_valid(geom),
            MakeValid::Failed
        ));
    }
}
