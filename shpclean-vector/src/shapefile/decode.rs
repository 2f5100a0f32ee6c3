/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 25/03/2024
Last Modified: 02/06/2024
License: MIT
*/
use crate::shapefile::geometry::{DimensionClass, Geometry, PointString, ShapeType};
use crate::shapefile::rings::build_polygons;
use byteorder::{ByteOrder, LittleEndian};
use std::io::{Error, ErrorKind};

/// Measures at or below this sentinel mean "no data" and are read back
/// as plain zero.
const MEASURE_NO_DATA: f64 = 1e-38;

fn corrupt() -> Error {
    Error::new(
        ErrorKind::InvalidData,
        "corrupted shapefile / invalid format",
    )
}

fn read_i32(buf: &[u8], pos: usize) -> Result<i32, Error> {
    if pos + 4 > buf.len() {
        return Err(corrupt());
    }
    Ok(LittleEndian::read_i32(&buf[pos..pos + 4]))
}

fn read_f64(buf: &[u8], pos: usize) -> Result<f64, Error> {
    if pos + 8 > buf.len() {
        return Err(corrupt());
    }
    Ok(LittleEndian::read_f64(&buf[pos..pos + 8]))
}

/// Decodes one raw record payload into a geometry value.
///
/// A null-shape record yields `Ok(None)`. Coordinates always adopt the
/// caller's dimension class: a plain record read under XYZM simply
/// carries zeroed z and m, a Z record read under XY drops them. For the
/// Z and M record variants the optional trailing measure block is
/// detected by comparing the payload size, in 16-bit words, against the
/// two sizes the record's own counts allow; anything smaller than the
/// measureless size is corrupt.
pub fn decode_record(buf: &[u8], dims: DimensionClass) -> Result<Option<Geometry>, Error> {
    let tag = read_i32(buf, 0)?;
    let shape = ShapeType::from_int(tag).ok_or_else(corrupt)?;
    if shape == ShapeType::Null {
        return Ok(None);
    }

    let geom = match shape {
        ShapeType::Point => {
            let x = read_f64(buf, 4)?;
            let y = read_f64(buf, 12)?;
            Geometry::Point {
                x,
                y,
                z: 0.0,
                m: 0.0,
            }
        }
        ShapeType::PointZ => {
            let x = read_f64(buf, 4)?;
            let y = read_f64(buf, 12)?;
            let z = read_f64(buf, 20)?;
            // a 28-byte record carries no measure
            let m = if buf.len() <= 28 {
                0.0
            } else {
                normalize_m(read_f64(buf, 28)?)
            };
            Geometry::Point {
                x,
                y,
                z: if dims.has_z() { z } else { 0.0 },
                m: if dims.has_m() { m } else { 0.0 },
            }
        }
        ShapeType::PointM => {
            let x = read_f64(buf, 4)?;
            let y = read_f64(buf, 12)?;
            let m = normalize_m(read_f64(buf, 20)?);
            Geometry::Point {
                x,
                y,
                z: 0.0,
                m: if dims.has_m() { m } else { 0.0 },
            }
        }
        ShapeType::PolyLine | ShapeType::Polygon => {
            let parts = decode_parts(buf, dims, MeasureBlocks::None)?;
            if shape == ShapeType::Polygon {
                Geometry::MultiPolygon(build_polygons(parts))
            } else {
                Geometry::MultiLineString(parts)
            }
        }
        ShapeType::PolyLineZ | ShapeType::PolygonZ => {
            let parts = decode_parts(buf, dims, MeasureBlocks::ZAndMaybeM)?;
            if shape == ShapeType::PolygonZ {
                Geometry::MultiPolygon(build_polygons(parts))
            } else {
                Geometry::MultiLineString(parts)
            }
        }
        ShapeType::PolyLineM | ShapeType::PolygonM => {
            let parts = decode_parts(buf, dims, MeasureBlocks::MaybeM)?;
            if shape == ShapeType::PolygonM {
                Geometry::MultiPolygon(build_polygons(parts))
            } else {
                Geometry::MultiLineString(parts)
            }
        }
        ShapeType::MultiPoint => Geometry::MultiPoint(decode_points(buf, dims, MeasureBlocks::None)?),
        ShapeType::MultiPointZ => {
            Geometry::MultiPoint(decode_points(buf, dims, MeasureBlocks::ZAndMaybeM)?)
        }
        ShapeType::MultiPointM => {
            Geometry::MultiPoint(decode_points(buf, dims, MeasureBlocks::MaybeM)?)
        }
        ShapeType::Null => unreachable!(),
    };
    Ok(Some(geom))
}

fn normalize_m(m: f64) -> f64 {
    if m < MEASURE_NO_DATA {
        0.0
    } else {
        m
    }
}

#[derive(Clone, Copy, PartialEq)]
enum MeasureBlocks {
    None,
    ZAndMaybeM,
    MaybeM,
}

/// Reads the shared multi-part layout: part count at 36, point count at
/// 40, part-start table at 44, xy pairs after it, then the optional Z
/// and M blocks (each a min/max range followed by one value per point).
fn decode_parts(
    buf: &[u8],
    dims: DimensionClass,
    blocks: MeasureBlocks,
) -> Result<Vec<PointString>, Error> {
    let n = read_i32(buf, 36)?;
    let n1 = read_i32(buf, 40)?;
    if n <= 0 || n1 < 0 {
        return Err(corrupt());
    }
    let (n, n1) = (n as usize, n1 as usize);
    let base = 44 + n * 4;

    let sz = buf.len() / 2; // payload size in 16-bit words
    let has_m = match blocks {
        MeasureBlocks::None => {
            if base + n1 * 16 > buf.len() {
                return Err(corrupt());
            }
            false
        }
        MeasureBlocks::ZAndMaybeM => {
            let max_size = 38 + 2 * n + n1 * 16;
            let min_size = 30 + 2 * n + n1 * 12;
            if sz < min_size {
                return Err(corrupt());
            }
            sz == max_size
        }
        MeasureBlocks::MaybeM => {
            let max_size = 30 + 2 * n + n1 * 12;
            let min_size = 22 + 2 * n + n1 * 8;
            if sz < min_size {
                return Err(corrupt());
            }
            sz == max_size
        }
    };
    let base_z = base + n1 * 16 + 16;
    let base_m = match blocks {
        MeasureBlocks::ZAndMaybeM => base_z + n1 * 8 + 16,
        _ => base + n1 * 16 + 16,
    };

    let mut parts = Vec::with_capacity(n);
    let mut start = 0usize;
    for ind in 0..n {
        let end = if ind < n - 1 {
            let e = read_i32(buf, 44 + (ind + 1) * 4)?;
            if e < 0 {
                return Err(corrupt());
            }
            e as usize
        } else {
            n1
        };
        if end < start || end > n1 {
            return Err(corrupt());
        }
        let mut part = PointString::with_capacity(end - start);
        for iv in start..end {
            let x = read_f64(buf, base + iv * 16)?;
            let y = read_f64(buf, base + iv * 16 + 8)?;
            let z = if blocks == MeasureBlocks::ZAndMaybeM {
                read_f64(buf, base_z + iv * 8)?
            } else {
                0.0
            };
            let m = if has_m {
                normalize_m(read_f64(buf, base_m + iv * 8)?)
            } else {
                0.0
            };
            part.push(
                x,
                y,
                if dims.has_z() { z } else { 0.0 },
                if dims.has_m() { m } else { 0.0 },
            );
        }
        start = end;
        parts.push(part);
    }
    Ok(parts)
}

/// Multipoint layout: point count at 36, xy pairs at 40, optional Z and
/// M blocks after them.
fn decode_points(
    buf: &[u8],
    dims: DimensionClass,
    blocks: MeasureBlocks,
) -> Result<PointString, Error> {
    let n = read_i32(buf, 36)?;
    if n < 0 {
        return Err(corrupt());
    }
    let n = n as usize;

    let sz = buf.len() / 2;
    let has_m = match blocks {
        MeasureBlocks::None => {
            if 40 + n * 16 > buf.len() {
                return Err(corrupt());
            }
            false
        }
        MeasureBlocks::ZAndMaybeM => {
            let max_size = 36 + n * 16;
            let min_size = 28 + n * 12;
            if sz < min_size {
                return Err(corrupt());
            }
            sz == max_size
        }
        MeasureBlocks::MaybeM => {
            let max_size = 28 + n * 12;
            let min_size = 20 + n * 8;
            if sz < min_size {
                return Err(corrupt());
            }
            sz == max_size
        }
    };
    let base_z = 40 + n * 16 + 16;
    let base_m = match blocks {
        MeasureBlocks::ZAndMaybeM => base_z + n * 8 + 16,
        _ => 40 + n * 16 + 16,
    };

    let mut points = PointString::with_capacity(n);
    for iv in 0..n {
        let x = read_f64(buf, 40 + iv * 16)?;
        let y = read_f64(buf, 40 + iv * 16 + 8)?;
        let z = if blocks == MeasureBlocks::ZAndMaybeM {
            read_f64(buf, base_z + iv * 8)?
        } else {
            0.0
        };
        let m = if has_m {
            normalize_m(read_f64(buf, base_m + iv * 8)?)
        } else {
            0.0
        };
        points.push(
            x,
            y,
            if dims.has_z() { z } else { 0.0 },
            if dims.has_m() { m } else { 0.0 },
        );
    }
    Ok(points)
}

#[cfg(test)]
mod test {
    use super::*;

    fn put32(buf: &mut Vec<u8>, v: i32) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    fn put64(buf: &mut Vec<u8>, v: f64) {
        buf.extend_from_slice(&v.to_le_bytes());
    }

    #[test]
    fn test_null_shape() {
        let mut buf = Vec::new();
        put32(&mut buf, 0);
        let geom = decode_record(&buf, DimensionClass::XY).unwrap();
        assert!(geom.is_none());
    }

    #[test]
    fn test_unknown_tag() {
        let mut buf = Vec::new();
        put32(&mut buf, 99);
        assert!(decode_record(&buf, DimensionClass::XY).is_err());
    }

    #[test]
    fn test_point() {
        let mut buf = Vec::new();
        put32(&mut buf, 1);
        put64(&mut buf, 3.25);
        put64(&mut buf, -7.5);
        let geom = decode_record(&buf, DimensionClass::XY).unwrap().unwrap();
        assert_eq!(
            geom,
            Geometry::Point {
                x: 3.25,
                y: -7.5,
                z: 0.0,
                m: 0.0
            }
        );
    }

    #[test]
    fn test_point_z_without_measure() {
        // 28-byte PointZ record: x, y, z but no m slot
        let mut buf = Vec::new();
        put32(&mut buf, 11);
        put64(&mut buf, 1.0);
        put64(&mut buf, 2.0);
        put64(&mut buf, 9.0);
        let geom = decode_record(&buf, DimensionClass::XYZM).unwrap().unwrap();
        assert_eq!(
            geom,
            Geometry::Point {
                x: 1.0,
                y: 2.0,
                z: 9.0,
                m: 0.0
            }
        );
    }

    #[test]
    fn test_measure_sentinel_normalized() {
        let mut buf = Vec::new();
        put32(&mut buf, 21);
        put64(&mut buf, 1.0);
        put64(&mut buf, 2.0);
        put64(&mut buf, -1e40); // below the no-data sentinel
        let geom = decode_record(&buf, DimensionClass::XYM).unwrap().unwrap();
        assert_eq!(
            geom,
            Geometry::Point {
                x: 1.0,
                y: 2.0,
                z: 0.0,
                m: 0.0
            }
        );
    }

    fn polyline_two_parts() -> Vec<u8> {
        let mut buf = Vec::new();
        put32(&mut buf, 3);
        for _ in 0..4 {
            put64(&mut buf, 0.0); // bbox, not read by the decoder
        }
        put32(&mut buf, 2); // parts
        put32(&mut buf, 5); // total points
        put32(&mut buf, 0);
        put32(&mut buf, 3);
        for (x, y) in [(0.0, 0.0), (1.0, 0.0), (2.0, 0.0), (5.0, 5.0), (6.0, 5.0)] {
            put64(&mut buf, x);
            put64(&mut buf, y);
        }
        buf
    }

    #[test]
    fn test_polyline_part_split() {
        let geom = decode_record(&polyline_two_parts(), DimensionClass::XY)
            .unwrap()
            .unwrap();
        match geom {
            Geometry::MultiLineString(lines) => {
                assert_eq!(lines.len(), 2);
                assert_eq!(lines[0].len(), 3);
                assert_eq!(lines[1].len(), 2);
                assert_eq!(lines[1].points[0].x, 5.0);
            }
            other => panic!("unexpected geometry: {:?}", other),
        }
    }

    #[test]
    fn test_truncated_polyline_is_corrupt() {
        let mut buf = polyline_two_parts();
        buf.truncate(buf.len() - 8);
        assert!(decode_record(&buf, DimensionClass::XY).is_err());
    }

    // one clockwise ring, 5 vertices, as PolygonZ
    fn polygon_z(with_m: bool) -> Vec<u8> {
        let mut buf = Vec::new();
        put32(&mut buf, 15);
        for _ in 0..4 {
            put64(&mut buf, 0.0);
        }
        put32(&mut buf, 1);
        put32(&mut buf, 5);
        put32(&mut buf, 0);
        let pts = [(0.0, 0.0), (0.0, 4.0), (4.0, 4.0), (4.0, 0.0), (0.0, 0.0)];
        for (x, y) in pts {
            put64(&mut buf, x);
            put64(&mut buf, y);
        }
        put64(&mut buf, 1.0); // z range
        put64(&mut buf, 5.0);
        for i in 0..5 {
            put64(&mut buf, 1.0 + i as f64);
        }
        if with_m {
            put64(&mut buf, 10.0); // m range
            put64(&mut buf, 14.0);
            for i in 0..5 {
                put64(&mut buf, 10.0 + i as f64);
            }
        }
        buf
    }

    #[test]
    fn test_polygon_z_measure_inference() {
        // without the measure block the record sits at the Z-only size
        let geom = decode_record(&polygon_z(false), DimensionClass::XYZM)
            .unwrap()
            .unwrap();
        match geom {
            Geometry::MultiPolygon(polys) => {
                assert_eq!(polys.len(), 1);
                assert_eq!(polys[0].exterior.z[2], 3.0);
                assert!(polys[0].exterior.m.iter().all(|&m| m == 0.0));
            }
            other => panic!("unexpected geometry: {:?}", other),
        }
        // with the measure block the size matches the ZM maximum
        let geom = decode_record(&polygon_z(true), DimensionClass::XYZM)
            .unwrap()
            .unwrap();
        match geom {
            Geometry::MultiPolygon(polys) => {
                assert_eq!(polys[0].exterior.m[2], 12.0);
            }
            other => panic!("unexpected geometry: {:?}", other),
        }
    }

    #[test]
    fn test_polygon_z_below_minimum_size_is_corrupt() {
        let mut buf = polygon_z(false);
        buf.truncate(buf.len() - 16);
        assert!(decode_record(&buf, DimensionClass::XYZM).is_err());
    }

    #[test]
    fn test_multipoint_m() {
        let mut buf = Vec::new();
        put32(&mut buf, 28);
        for _ in 0..4 {
            put64(&mut buf, 0.0);
        }
        put32(&mut buf, 2);
        for (x, y) in [(1.0, 1.0), (2.0, 2.0)] {
            put64(&mut buf, x);
            put64(&mut buf, y);
        }
        put64(&mut buf, 7.0); // m range
        put64(&mut buf, 8.0);
        put64(&mut buf, 7.0);
        put64(&mut buf, 8.0);
        let geom = decode_record(&buf, DimensionClass::XYM).unwrap().unwrap();
        match geom {
            Geometry::MultiPoint(ps) => {
                assert_eq!(ps.len(), 2);
                assert_eq!(ps.m, vec![7.0, 8.0]);
            }
            other => panic!("unexpected geometry: {:?}", other),
        }
    }

    #[test]
    fn test_caller_dims_take_precedence() {
        // a Z record read under plain XY drops its z values
        let geom = decode_record(&polygon_z(false), DimensionClass::XY)
            .unwrap()
            .unwrap();
        match geom {
            Geometry::MultiPolygon(polys) => {
                assert!(polys[0].exterior.z.iter().all(|&z| z == 0.0));
            }
            other => panic!("unexpected geometry: {:?}", other),
        }
    }
}
