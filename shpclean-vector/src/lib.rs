/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 18/03/2024
Last Modified: 02/06/2024
License: MIT
*/

// private sub-module defined in other files
pub mod shapefile;

// exports identifiers from private sub-modules in the current module namespace
pub use crate::shapefile::attributes::*;
pub use crate::shapefile::decode::decode_record;
pub use crate::shapefile::encode::encode_record;
pub use crate::shapefile::geometry::*;
pub use crate::shapefile::rings::build_polygons;
pub use crate::shapefile::{RecordRead, Shapefile, ShapefileHeader};
