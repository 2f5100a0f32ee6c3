/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 18/03/2024
Last Modified: 02/06/2024
License: MIT
*/
use shpclean_common::structures::{BoundingBox, Point2D};
use std::fmt;

/// The raw shape-type tag carried by a .shp file header and by every
/// non-null record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
#[repr(i32)]
pub enum ShapeType {
    Null = 0,
    Point = 1,
    PolyLine = 3,
    Polygon = 5,
    MultiPoint = 8,
    PointZ = 11,
    PolyLineZ = 13,
    PolygonZ = 15,
    MultiPointZ = 18,
    PointM = 21,
    PolyLineM = 23,
    PolygonM = 25,
    MultiPointM = 28,
}

impl ShapeType {
    pub fn from_int(value: i32) -> Option<ShapeType> {
        match value {
            0 => Some(ShapeType::Null),
            1 => Some(ShapeType::Point),
            3 => Some(ShapeType::PolyLine),
            5 => Some(ShapeType::Polygon),
            8 => Some(ShapeType::MultiPoint),
            11 => Some(ShapeType::PointZ),
            13 => Some(ShapeType::PolyLineZ),
            15 => Some(ShapeType::PolygonZ),
            18 => Some(ShapeType::MultiPointZ),
            21 => Some(ShapeType::PointM),
            23 => Some(ShapeType::PolyLineM),
            25 => Some(ShapeType::PolygonM),
            28 => Some(ShapeType::MultiPointM),
            _ => None,
        }
    }

    pub fn to_int(self) -> i32 {
        self as i32
    }

    /// The effective output family for this shape type. Multi-capable
    /// records always classify as their multi variant; a later
    /// structural check may narrow them again.
    pub fn family(self) -> GeometryFamily {
        match self {
            ShapeType::Null | ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => {
                GeometryFamily::Point
            }
            ShapeType::PolyLine | ShapeType::PolyLineZ | ShapeType::PolyLineM => {
                GeometryFamily::MultiLineString
            }
            ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM => {
                GeometryFamily::MultiPolygon
            }
            ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM => {
                GeometryFamily::MultiPoint
            }
        }
    }

    /// The prudential dimension class: a Z type is read as XYZM because
    /// its records may carry optional measures, an M type as XYM.
    pub fn dimension(self) -> DimensionClass {
        match self {
            ShapeType::PointZ
            | ShapeType::PolyLineZ
            | ShapeType::PolygonZ
            | ShapeType::MultiPointZ => DimensionClass::XYZM,
            ShapeType::PointM
            | ShapeType::PolyLineM
            | ShapeType::PolygonM
            | ShapeType::MultiPointM => DimensionClass::XYM,
            _ => DimensionClass::XY,
        }
    }

    pub fn label(self) -> &'static str {
        match self {
            ShapeType::Null => "NULL",
            ShapeType::Point => "POINT",
            ShapeType::PointZ => "POINT-Z",
            ShapeType::PointM => "POINT-M",
            ShapeType::PolyLine => "POLYLINE",
            ShapeType::PolyLineZ => "POLYLINE-Z",
            ShapeType::PolyLineM => "POLYLINE-M",
            ShapeType::Polygon => "POLYGON",
            ShapeType::PolygonZ => "POLYGON-Z",
            ShapeType::PolygonM => "POLYGON-M",
            ShapeType::MultiPoint => "MULTIPOINT",
            ShapeType::MultiPointZ => "MULTIPOINT-Z",
            ShapeType::MultiPointM => "MULTIPOINT-M",
        }
    }
}

impl fmt::Display for ShapeType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.label())
    }
}

/// Effective output family of a shapefile dataset.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeometryFamily {
    Point,
    MultiPoint,
    MultiLineString,
    MultiPolygon,
}

/// Coordinate dimension class adopted by decoded geometries.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DimensionClass {
    XY,
    XYZ,
    XYM,
    XYZM,
}

impl DimensionClass {
    pub fn has_z(self) -> bool {
        self == DimensionClass::XYZ || self == DimensionClass::XYZM
    }

    pub fn has_m(self) -> bool {
        self == DimensionClass::XYM || self == DimensionClass::XYZM
    }
}

/// An ordered vertex sequence with parallel z and m arrays; serves as a
/// polygon ring, a polyline part, or a multipoint payload.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PointString {
    pub points: Vec<Point2D>,
    pub z: Vec<f64>,
    pub m: Vec<f64>,
}

impl PointString {
    pub fn with_capacity(capacity: usize) -> PointString {
        PointString {
            points: Vec::with_capacity(capacity),
            z: Vec::with_capacity(capacity),
            m: Vec::with_capacity(capacity),
        }
    }

    pub fn push(&mut self, x: f64, y: f64, z: f64, m: f64) {
        self.points.push(Point2D::new(x, y));
        self.z.push(z);
        self.m.push(m);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn bounds(&self) -> BoundingBox {
        BoundingBox::from_points(&self.points)
    }

    /// Whether the sequence starts and ends on the same xy vertex.
    pub fn is_closed(&self) -> bool {
        match (self.points.first(), self.points.last()) {
            (Some(a), Some(b)) => a == b,
            _ => false,
        }
    }

    pub fn reverse(&mut self) {
        self.points.reverse();
        self.z.reverse();
        self.m.reverse();
    }
}

/// One polygon of a multipolygon: an exterior ring plus its holes.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PolygonPart {
    pub exterior: PointString,
    pub holes: Vec<PointString>,
}

/// An in-memory geometry value, produced by the decoder and consumed by
/// validation and the encoder; never cached between records.
#[derive(Clone, Debug, PartialEq)]
pub enum Geometry {
    Point { x: f64, y: f64, z: f64, m: f64 },
    MultiPoint(PointString),
    MultiLineString(Vec<PointString>),
    MultiPolygon(Vec<PolygonPart>),
}

/// Reported when a geometry's structure cannot be written back under a
/// given shape type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ShapeMismatch {
    pub expected: &'static str,
    pub actual: &'static str,
}

impl Geometry {
    pub fn bounds(&self) -> BoundingBox {
        let mut bb = BoundingBox::default();
        match self {
            Geometry::Point { x, y, .. } => bb.expand_to(*x, *y),
            Geometry::MultiPoint(ps) => bb.expand_by(&ps.bounds()),
            Geometry::MultiLineString(lines) => {
                for line in lines {
                    bb.expand_by(&line.bounds());
                }
            }
            Geometry::MultiPolygon(polys) => {
                for poly in polys {
                    bb.expand_by(&poly.exterior.bounds());
                    for hole in &poly.holes {
                        bb.expand_by(&hole.bounds());
                    }
                }
            }
        }
        bb
    }

    /// Structural label of this value under the given dimension class,
    /// e.g. "POLYGON-Z". Empty containers classify as "UNKNOWN".
    pub fn structural_label(&self, dims: DimensionClass) -> &'static str {
        let suffix = match dims {
            DimensionClass::XY => 0,
            DimensionClass::XYZ | DimensionClass::XYZM => 1,
            DimensionClass::XYM => 2,
        };
        // index 0 = plain, 1 = -Z, 2 = -M
        let table: [&'static str; 3] = match self {
            Geometry::Point { .. } => ["POINT", "POINT-Z", "POINT-M"],
            Geometry::MultiPoint(ps) if ps.len() == 1 => ["POINT", "POINT-Z", "POINT-M"],
            Geometry::MultiPoint(ps) if !ps.is_empty() => {
                ["MULTIPOINT", "MULTIPOINT-Z", "MULTIPOINT-M"]
            }
            Geometry::MultiLineString(lines) if !lines.is_empty() => {
                ["POLYLINE", "POLYLINE-Z", "POLYLINE-M"]
            }
            Geometry::MultiPolygon(polys) if !polys.is_empty() => {
                ["POLYGON", "POLYGON-Z", "POLYGON-M"]
            }
            _ => return "UNKNOWN",
        };
        table[suffix]
    }

    /// Verifies that this geometry's structure and dimension class are
    /// writable under `shape`. Both the silent encoding path and the
    /// verbose repair report consume this one check.
    pub fn check_shape(&self, shape: ShapeType, dims: DimensionClass) -> Result<(), ShapeMismatch> {
        let family_ok = match shape.family() {
            GeometryFamily::Point => match self {
                Geometry::Point { .. } => true,
                Geometry::MultiPoint(ps) => ps.len() == 1,
                _ => false,
            },
            GeometryFamily::MultiPoint => match self {
                Geometry::Point { .. } => true,
                Geometry::MultiPoint(ps) => !ps.is_empty(),
                _ => false,
            },
            GeometryFamily::MultiLineString => {
                matches!(self, Geometry::MultiLineString(lines) if !lines.is_empty())
            }
            GeometryFamily::MultiPolygon => {
                matches!(self, Geometry::MultiPolygon(polys) if !polys.is_empty())
            }
        };
        let dims_ok = match shape.dimension() {
            DimensionClass::XY => dims == DimensionClass::XY,
            // a Z shape accepts both Z-only and ZM payloads
            DimensionClass::XYZM => dims == DimensionClass::XYZ || dims == DimensionClass::XYZM,
            DimensionClass::XYM => dims == DimensionClass::XYM,
            DimensionClass::XYZ => dims == DimensionClass::XYZ,
        };
        if family_ok && dims_ok {
            return Ok(());
        }
        Err(ShapeMismatch {
            expected: shape.label(),
            actual: self.structural_label(dims),
        })
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_shape_type_round_trip() {
        for tag in [0, 1, 3, 5, 8, 11, 13, 15, 18, 21, 23, 25, 28] {
            let st = ShapeType::from_int(tag).unwrap();
            assert_eq!(st.to_int(), tag);
        }
        assert_eq!(ShapeType::from_int(2), None);
        assert_eq!(ShapeType::from_int(31), None);
    }

    #[test]
    fn test_prudential_dimensions() {
        assert_eq!(ShapeType::PolygonZ.dimension(), DimensionClass::XYZM);
        assert_eq!(ShapeType::PointM.dimension(), DimensionClass::XYM);
        assert_eq!(ShapeType::MultiPoint.dimension(), DimensionClass::XY);
    }

    #[test]
    fn test_check_shape() {
        let pt = Geometry::Point {
            x: 1.0,
            y: 2.0,
            z: 0.0,
            m: 0.0,
        };
        assert!(pt.check_shape(ShapeType::Point, DimensionClass::XY).is_ok());
        assert!(pt
            .check_shape(ShapeType::PointZ, DimensionClass::XYZM)
            .is_ok());
        let err = pt
            .check_shape(ShapeType::Polygon, DimensionClass::XY)
            .unwrap_err();
        assert_eq!(err.expected, "POLYGON");
        assert_eq!(err.actual, "POINT");
    }

    #[test]
    fn test_single_point_multipoint_is_interchangeable() {
        let mut ps = PointString::default();
        ps.push(3.0, 4.0, 0.0, 0.0);
        let geom = Geometry::MultiPoint(ps);
        assert!(geom
            .check_shape(ShapeType::Point, DimensionClass::XY)
            .is_ok());
        assert!(geom
            .check_shape(ShapeType::MultiPoint, DimensionClass::XY)
            .is_ok());
    }

    #[test]
    fn test_mismatch_labels() {
        let line = Geometry::MultiLineString(vec![{
            let mut ps = PointString::default();
            ps.push(0.0, 0.0, 0.0, 0.0);
            ps.push(1.0, 1.0, 0.0, 0.0);
            ps
        }]);
        let err = line
            .check_shape(ShapeType::PolygonZ, DimensionClass::XYZM)
            .unwrap_err();
        assert_eq!(err.expected, "POLYGON-Z");
        assert_eq!(err.actual, "POLYLINE-Z");
    }
}
