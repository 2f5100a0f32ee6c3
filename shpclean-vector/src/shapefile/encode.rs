/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 26/03/2024
Last Modified: 02/06/2024
License: MIT
*/
use crate::shapefile::geometry::{DimensionClass, Geometry, PointString, ShapeType};
use byteorder::{ByteOrder, LittleEndian};
use shpclean_common::algorithms::is_clockwise_order;
use shpclean_common::structures::BoundingBox;
use std::io::{Error, ErrorKind};

fn mismatch() -> Error {
    Error::new(ErrorKind::InvalidData, "mismatching Geometry type")
}

fn put_i32(buf: &mut [u8], pos: usize, v: i32) {
    LittleEndian::write_i32(&mut buf[pos..pos + 4], v);
}

fn put_f64(buf: &mut [u8], pos: usize, v: f64) {
    LittleEndian::write_f64(&mut buf[pos..pos + 8], v);
}

/// Encodes one geometry into a record payload under the given shape
/// type and dimension class.
///
/// `None` encodes as the 4-byte null-shape marker. Anything else is
/// first checked for structural compatibility with `shape`; polygons
/// additionally have their winding canonicalized (clockwise exteriors,
/// counter-clockwise holes) before sizing, so the output is always a
/// well-formed record of exactly the predicted length. A Z shape emits
/// its measure block only when the dimension class carries measures.
pub fn encode_record(
    geom: Option<&Geometry>,
    shape: ShapeType,
    dims: DimensionClass,
) -> Result<Vec<u8>, Error> {
    let geom = match geom {
        Some(g) => g,
        None => {
            let mut buf = vec![0u8; 4];
            put_i32(&mut buf, 0, ShapeType::Null.to_int());
            return Ok(buf);
        }
    };
    if geom.check_shape(shape, dims).is_err() {
        return Err(mismatch());
    }

    match shape {
        ShapeType::Point | ShapeType::PointZ | ShapeType::PointM => {
            Ok(encode_point(single_point(geom)?, shape))
        }
        ShapeType::MultiPoint | ShapeType::MultiPointZ | ShapeType::MultiPointM => {
            let points = multipoint_payload(geom)?;
            Ok(encode_multi(shape, dims, &[&points], false))
        }
        ShapeType::PolyLine | ShapeType::PolyLineZ | ShapeType::PolyLineM => match geom {
            Geometry::MultiLineString(lines) => {
                let parts: Vec<&PointString> = lines.iter().collect();
                Ok(encode_multi(shape, dims, &parts, true))
            }
            _ => Err(mismatch()),
        },
        ShapeType::Polygon | ShapeType::PolygonZ | ShapeType::PolygonM => match geom {
            Geometry::MultiPolygon(polys) => {
                // canonical winding before sizing
                let mut rings: Vec<PointString> = Vec::new();
                for poly in polys {
                    let mut exterior = poly.exterior.clone();
                    if !is_clockwise_order(&exterior.points) {
                        exterior.reverse();
                    }
                    rings.push(exterior);
                    for hole in &poly.holes {
                        let mut hole = hole.clone();
                        if is_clockwise_order(&hole.points) {
                            hole.reverse();
                        }
                        rings.push(hole);
                    }
                }
                let parts: Vec<&PointString> = rings.iter().collect();
                Ok(encode_multi(shape, dims, &parts, true))
            }
            _ => Err(mismatch()),
        },
        ShapeType::Null => {
            let mut buf = vec![0u8; 4];
            put_i32(&mut buf, 0, ShapeType::Null.to_int());
            Ok(buf)
        }
    }
}

fn single_point(geom: &Geometry) -> Result<(f64, f64, f64, f64), Error> {
    match geom {
        Geometry::Point { x, y, z, m } => Ok((*x, *y, *z, *m)),
        Geometry::MultiPoint(ps) if ps.len() == 1 => {
            Ok((ps.points[0].x, ps.points[0].y, ps.z[0], ps.m[0]))
        }
        _ => Err(mismatch()),
    }
}

fn multipoint_payload(geom: &Geometry) -> Result<PointString, Error> {
    match geom {
        Geometry::MultiPoint(ps) => Ok(ps.clone()),
        Geometry::Point { x, y, z, m } => {
            let mut ps = PointString::with_capacity(1);
            ps.push(*x, *y, *z, *m);
            Ok(ps)
        }
        _ => Err(mismatch()),
    }
}

fn encode_point((x, y, z, m): (f64, f64, f64, f64), shape: ShapeType) -> Vec<u8> {
    let size = match shape {
        ShapeType::Point => 20,
        ShapeType::PointZ => 36, // always carries its measure slot
        _ => 28,
    };
    let mut buf = vec![0u8; size];
    put_i32(&mut buf, 0, shape.to_int());
    put_f64(&mut buf, 4, x);
    put_f64(&mut buf, 12, y);
    match shape {
        ShapeType::PointZ => {
            put_f64(&mut buf, 20, z);
            put_f64(&mut buf, 28, m);
        }
        ShapeType::PointM => {
            put_f64(&mut buf, 20, m);
        }
        _ => (),
    }
    buf
}

/// Shared layout for the polyline, polygon and multipoint families:
/// tag, bbox, counts, optional part-start table, xy pairs, then the
/// optional Z and M blocks (each a min/max pair followed by one value
/// per vertex).
fn encode_multi(
    shape: ShapeType,
    dims: DimensionClass,
    parts: &[&PointString],
    with_part_table: bool,
) -> Vec<u8> {
    let num_parts = parts.len();
    let num_points: usize = parts.iter().map(|p| p.len()).sum();

    let shape_dims = shape.dimension();
    let z_block = shape_dims.has_z();
    let m_block = if z_block {
        dims.has_m()
    } else {
        shape_dims.has_m()
    };

    let header = if with_part_table {
        44 + 4 * num_parts
    } else {
        40
    };
    let mut size = header + 16 * num_points;
    if z_block {
        size += 16 + 8 * num_points;
    }
    if m_block {
        size += 16 + 8 * num_points;
    }
    let mut buf = vec![0u8; size];

    put_i32(&mut buf, 0, shape.to_int());
    let mut bb = BoundingBox::default();
    for part in parts {
        bb.expand_by(&part.bounds());
    }
    put_f64(&mut buf, 4, bb.min_x);
    put_f64(&mut buf, 12, bb.min_y);
    put_f64(&mut buf, 20, bb.max_x);
    put_f64(&mut buf, 28, bb.max_y);

    let mut ix;
    if with_part_table {
        put_i32(&mut buf, 36, num_parts as i32);
        put_i32(&mut buf, 40, num_points as i32);
        ix = 44;
        let mut start = 0i32;
        for part in parts {
            put_i32(&mut buf, ix, start);
            ix += 4;
            start += part.len() as i32;
        }
    } else {
        put_i32(&mut buf, 36, num_points as i32);
        ix = 40;
    }

    for part in parts {
        for pt in &part.points {
            put_f64(&mut buf, ix, pt.x);
            put_f64(&mut buf, ix + 8, pt.y);
            ix += 16;
        }
    }

    if z_block {
        ix = write_value_block(&mut buf, ix, parts, true);
    }
    if m_block {
        write_value_block(&mut buf, ix, parts, false);
    }
    buf
}

fn write_value_block(buf: &mut [u8], mut ix: usize, parts: &[&PointString], want_z: bool) -> usize {
    let mut min = f64::INFINITY;
    let mut max = f64::NEG_INFINITY;
    for part in parts {
        let vals = if want_z { &part.z } else { &part.m };
        for &v in vals {
            if v < min {
                min = v;
            }
            if v > max {
                max = v;
            }
        }
    }
    if min > max {
        min = 0.0;
        max = 0.0;
    }
    put_f64(buf, ix, min);
    put_f64(buf, ix + 8, max);
    ix += 16;
    for part in parts {
        let vals = if want_z { &part.z } else { &part.m };
        for &v in vals {
            put_f64(buf, ix, v);
            ix += 8;
        }
    }
    ix
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::shapefile::decode::decode_record;
    use crate::shapefile::geometry::PolygonPart;

    fn square(x0: f64, y0: f64, size: f64, clockwise: bool) -> PointString {
        let mut ps = PointString::default();
        ps.push(x0, y0, 0.0, 0.0);
        ps.push(x0, y0 + size, 0.0, 0.0);
        ps.push(x0 + size, y0 + size, 0.0, 0.0);
        ps.push(x0 + size, y0, 0.0, 0.0);
        ps.push(x0, y0, 0.0, 0.0);
        if !clockwise {
            ps.reverse();
        }
        ps
    }

    #[test]
    fn test_null_marker() {
        let buf = encode_record(None, ShapeType::Polygon, DimensionClass::XY).unwrap();
        assert_eq!(buf, vec![0u8; 4]);
    }

    #[test]
    fn test_point_sizes() {
        let pt = Geometry::Point {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            m: 4.0,
        };
        let buf = encode_record(Some(&pt), ShapeType::Point, DimensionClass::XY).unwrap();
        assert_eq!(buf.len(), 20);
        let buf = encode_record(Some(&pt), ShapeType::PointZ, DimensionClass::XYZM).unwrap();
        assert_eq!(buf.len(), 36);
        let buf = encode_record(Some(&pt), ShapeType::PointM, DimensionClass::XYM).unwrap();
        assert_eq!(buf.len(), 28);
    }

    #[test]
    fn test_point_z_always_carries_measure_slot() {
        let pt = Geometry::Point {
            x: 1.0,
            y: 2.0,
            z: 3.0,
            m: 4.0,
        };
        let buf = encode_record(Some(&pt), ShapeType::PointZ, DimensionClass::XYZ).unwrap();
        assert_eq!(buf.len(), 36);
        let back = decode_record(&buf, DimensionClass::XYZM).unwrap().unwrap();
        assert_eq!(
            back,
            Geometry::Point {
                x: 1.0,
                y: 2.0,
                z: 3.0,
                m: 4.0
            }
        );
    }

    #[test]
    fn test_type_mismatch() {
        let pt = Geometry::Point {
            x: 1.0,
            y: 2.0,
            z: 0.0,
            m: 0.0,
        };
        let err = encode_record(Some(&pt), ShapeType::Polygon, DimensionClass::XY).unwrap_err();
        assert_eq!(err.to_string(), "mismatching Geometry type");
    }

    #[test]
    fn test_polygon_size_and_winding() {
        // exterior supplied counter-clockwise, hole clockwise; both must
        // come out flipped
        let poly = Geometry::MultiPolygon(vec![PolygonPart {
            exterior: square(0.0, 0.0, 10.0, false),
            holes: vec![square(2.0, 2.0, 2.0, true)],
        }]);
        let buf = encode_record(Some(&poly), ShapeType::Polygon, DimensionClass::XY).unwrap();
        // 2 parts, 10 vertices
        assert_eq!(buf.len(), 44 + 4 * 2 + 16 * 10);

        let back = decode_record(&buf, DimensionClass::XY).unwrap().unwrap();
        match back {
            Geometry::MultiPolygon(polys) => {
                assert_eq!(polys.len(), 1);
                assert_eq!(polys[0].holes.len(), 1);
                assert!(is_clockwise_order(&polys[0].exterior.points));
                assert!(!is_clockwise_order(&polys[0].holes[0].points));
            }
            other => panic!("unexpected geometry: {:?}", other),
        }
    }

    #[test]
    fn test_polyline_zm_round_trip() {
        let mut line = PointString::default();
        line.push(0.0, 0.0, 1.0, 10.0);
        line.push(5.0, 5.0, 2.0, 11.0);
        line.push(9.0, 2.0, 3.0, 12.0);
        let geom = Geometry::MultiLineString(vec![line]);

        let buf = encode_record(Some(&geom), ShapeType::PolyLineZ, DimensionClass::XYZM).unwrap();
        // 1 part, 3 vertices, z and m blocks both present
        assert_eq!(buf.len(), 44 + 4 + 16 * 3 + (16 + 8 * 3) * 2);
        let back = decode_record(&buf, DimensionClass::XYZM).unwrap().unwrap();
        assert_eq!(back, geom);

        // Z-only payload omits the measure block
        let buf = encode_record(Some(&geom), ShapeType::PolyLineZ, DimensionClass::XYZ).unwrap();
        assert_eq!(buf.len(), 44 + 4 + 16 * 3 + 16 + 8 * 3);
    }

    #[test]
    fn test_multipoint_size() {
        let mut ps = PointString::default();
        ps.push(1.0, 1.0, 0.0, 7.0);
        ps.push(2.0, 2.0, 0.0, 8.0);
        let geom = Geometry::MultiPoint(ps);
        let buf = encode_record(Some(&geom), ShapeType::MultiPointM, DimensionClass::XYM).unwrap();
        assert_eq!(buf.len(), 40 + 16 * 2 + 16 + 8 * 2);
        let back = decode_record(&buf, DimensionClass::XYM).unwrap().unwrap();
        assert_eq!(back, geom);
    }
}
