/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 25/03/2024
Last Modified: 30/05/2024
License: MIT
*/
use crate::shapefile::geometry::{PointString, PolygonPart};
use shpclean_common::algorithms::{is_clockwise_order, point_on_ring_surface};
use shpclean_common::structures::BoundingBox;

/// One candidate ring awaiting assembly. `mother` indexes the exterior
/// that claimed this ring as a hole; the ring slot is emptied when
/// ownership moves into a built polygon.
struct RingItem {
    ring: Option<PointString>,
    bounds: BoundingBox,
    is_exterior: bool,
    mother: Option<usize>,
}

/// Reassembles an unordered list of rings, decoded from a single
/// polygon-family record, into polygons with holes.
///
/// Shapefile winding convention: clockwise rings bound exteriors,
/// counter-clockwise rings bound holes (the inverse of ISO). Pairing is
/// deliberately cheap: an MBR nesting prefilter plus two sample points
/// of the candidate tested against the exterior's surface. The first
/// exterior to accept a hole keeps it. Rings that no exterior claims
/// are promoted to exteriors of their own, so no geometry is ever
/// dropped here; a full validity pass happens downstream.
pub fn build_polygons(rings: Vec<PointString>) -> Vec<PolygonPart> {
    let mut items: Vec<RingItem> = rings
        .into_iter()
        .map(|ring| {
            let bounds = ring.bounds();
            let is_exterior = is_clockwise_order(&ring.points);
            RingItem {
                ring: Some(ring),
                bounds,
                is_exterior,
                mother: None,
            }
        })
        .collect();

    // pairing pass: every exterior examines every still-orphan interior
    for ext in 0..items.len() {
        if !items[ext].is_exterior {
            continue;
        }
        for int in 0..items.len() {
            if items[int].is_exterior || items[int].mother.is_some() {
                continue;
            }
            if !items[ext].bounds.contains_bounds(&items[int].bounds) {
                continue;
            }
            if samples_fall_on_exterior(&items[ext], &items[int]) {
                items[int].mother = Some(ext);
            }
        }
    }

    // orphan interiors become exteriors in their own right
    for item in items.iter_mut() {
        if !item.is_exterior && item.mother.is_none() {
            item.is_exterior = true;
        }
    }

    // assembly pass: ring ownership transfers out of the collection
    let mut polygons = Vec::new();
    for ext in 0..items.len() {
        if !items[ext].is_exterior {
            continue;
        }
        let exterior = match items[ext].ring.take() {
            Some(r) => r,
            None => continue,
        };
        let mut poly = PolygonPart {
            exterior,
            holes: Vec::new(),
        };
        for int in 0..items.len() {
            if items[int].mother == Some(ext) {
                if let Some(hole) = items[int].ring.take() {
                    poly.holes.push(hole);
                }
            }
        }
        polygons.push(poly);
    }
    polygons
}

fn samples_fall_on_exterior(exterior: &RingItem, candidate: &RingItem) -> bool {
    let ext_ring = match &exterior.ring {
        Some(r) => r,
        None => return false,
    };
    let cand_ring = match &candidate.ring {
        Some(r) => r,
        None => return false,
    };
    if cand_ring.is_empty() {
        return false;
    }
    // two cheap samples: the first vertex and the midpoint vertex
    let first = cand_ring.points[0];
    let mid = cand_ring.points[cand_ring.len() / 2];
    point_on_ring_surface(first, &ext_ring.points)
        || point_on_ring_surface(mid, &ext_ring.points)
}
