/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 10/04/2024
Last Modified: 02/06/2024
License: MIT

NOTE: the scan / diagnose / repair orchestration. All reporting goes to
stderr; a triple that cannot be diagnosed fails alone, only a
directory-access failure or mid-repair input corruption stops the run.
*/
use crate::validity::{MakeValid, ValidityEngine};
use shpclean_common::structures::BoundingBox;
use shpclean_vector::{decode_record, encode_record, RecordRead, Shapefile};
use std::collections::BTreeMap;
use std::fs;
use std::io::Error;

pub struct RunConfig {
    pub in_dir: String,
    pub out_dir: Option<String>,
    pub validate: bool,
    pub esri: bool,
    pub force: bool,
}

#[derive(Default)]
pub struct RunStats {
    pub inspected: u32,
    pub malformed: u32,
    pub repaired: u32,
}

#[derive(Default)]
struct TripleFlags {
    shp: bool,
    shx: bool,
    dbf: bool,
}

/// Walks the input directory, diagnoses every complete .shp/.shx/.dbf
/// triple and, when an output directory is set, repairs the malformed
/// ones (all of them under `force`). A triple that cannot be diagnosed
/// ends that dataset only; the batch dies on a directory-access failure
/// or on input corruption discovered mid-repair.
pub fn scan_dir(cfg: &RunConfig, engine: &dyn ValidityEngine) -> Result<RunStats, Error> {
    let entries = match collect_triples(&cfg.in_dir) {
        Ok(groups) => groups,
        Err(e) => {
            eprintln!("Unable to access \"{}\"", cfg.in_dir);
            return Err(e);
        }
    };

    let mut stats = RunStats::default();
    for (name, flags) in &entries {
        if !(flags.shp && flags.shx && flags.dbf) {
            continue;
        }
        let stem_path = format!("{}/{}", cfg.in_dir, name);
        stats.inspected += 1;
        let invalid = match test_shapefile(&stem_path, cfg.validate, cfg.esri, engine) {
            Ok(invalid) => invalid,
            Err(_) => {
                // the dataset cannot even be read; nothing to repair
                stats.malformed += 1;
                continue;
            }
        };
        if invalid {
            stats.malformed += 1;
        }
        if let Some(out_dir) = &cfg.out_dir {
            if invalid || cfg.force {
                let out_path = format!("{}/{}", out_dir, name);
                eprintln!("\tAttempting to repair: {}.shp", out_path);
                let repair_failed = repair_shapefile(&stem_path, &out_path, cfg, engine)?;
                if repair_failed {
                    clean_files(&out_path);
                    eprintln!(
                        "\tFAILURE: automatic repair is impossible, manual repair required."
                    );
                } else {
                    stats.repaired += 1;
                    eprintln!("\tOK, successfully repaired.");
                }
            }
        }
    }
    Ok(stats)
}

fn collect_triples(in_dir: &str) -> Result<BTreeMap<String, TripleFlags>, Error> {
    let mut groups: BTreeMap<String, TripleFlags> = BTreeMap::new();
    for entry in fs::read_dir(in_dir)? {
        let entry = entry?;
        let name = entry.file_name().to_string_lossy().to_string();
        // the extension starts at the first dot
        let dot = match name.find('.') {
            Some(d) => d,
            None => continue,
        };
        let (stem, ext) = name.split_at(dot);
        let flags = groups.entry(stem.to_string()).or_default();
        if ext.eq_ignore_ascii_case(".shp") {
            flags.shp = true;
        } else if ext.eq_ignore_ascii_case(".shx") {
            flags.shx = true;
        } else if ext.eq_ignore_ascii_case(".dbf") {
            flags.dbf = true;
        }
    }
    Ok(groups)
}

/// Diagnoses one triple and reports every invalidity found. Returns
/// whether cleaning is required.
pub fn test_shapefile(
    stem: &str,
    validate: bool,
    esri: bool,
    engine: &dyn ValidityEngine,
) -> Result<bool, Error> {
    eprintln!("\nVerifying {}.shp", stem);
    let n_invalid = read_shp(stem, validate, esri, engine)?;
    if n_invalid > 0 {
        eprintln!(
            "\tfound {} invalidit{}: cleaning required.",
            n_invalid,
            if n_invalid > 1 { "ies" } else { "y" }
        );
        Ok(true)
    } else {
        eprintln!("\tfound to be already valid.");
        Ok(false)
    }
}

fn read_shp(
    stem: &str,
    validate: bool,
    esri: bool,
    engine: &dyn ValidityEngine,
) -> Result<u32, Error> {
    let mut shp = match Shapefile::open_read(stem) {
        Ok(shp) => shp,
        Err(e) => {
            eprint!(
                "\terror: cannot open shapefile '{}'\n\tcause: {}\n",
                stem, e
            );
            return Err(e);
        }
    };
    let mut n_invalid = 0u32;
    if shp.bbox_mismatch {
        eprintln!("\t\tHEADERS: found mismatching BBOX between .shx and .shp");
        n_invalid += 1;
    }

    let dims = shp.header.shape_type.dimension();
    let mut running = BoundingBox::default();
    let mut row = 0u32;
    loop {
        let read = match shp.read_record(row) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("\tERROR: {}", e);
                eprintln!("\tMalformed shapefile: quitting");
                return Err(e);
            }
        };
        let bbox = match read {
            RecordRead::Eof => break,
            RecordRead::Deleted => {
                eprintln!("\t\trow #{}: logical deletion found", row);
                n_invalid += 1;
                row += 1;
                continue;
            }
            RecordRead::Entity { bbox, .. } => bbox,
        };

        if validate {
            match decode_record(shp.record_data(), dims) {
                Err(_) => {
                    eprintln!("\t\trow #{}: unable to get a Geometry", row);
                    n_invalid += 1;
                }
                Ok(None) => (),
                Ok(Some(geom)) => {
                    let mbr = geom.bounds();
                    let declared = bbox.unwrap_or_default();
                    if mbr.min_x != declared.min_x
                        || mbr.min_y != declared.min_y
                        || mbr.max_x != declared.max_x
                        || mbr.max_y != declared.max_y
                    {
                        eprintln!("\t\trow #{}: mismatching BBOX", row);
                        n_invalid += 1;
                    }
                    if let Err(reason) = engine.check(&geom, esri) {
                        if reason.is_empty() {
                            eprintln!("\t\trow #{}: invalid Geometry (unknown reason)", row);
                        } else {
                            eprintln!("\t\trow #{}: {}", row, reason);
                        }
                        n_invalid += 1;
                    }
                }
            }
        }
        if let Some(bb) = bbox {
            running.expand_by(&bb);
        }
        row += 1;
    }

    let header = shp.header.extent;
    if running.min_x != header.min_x
        || running.min_y != header.min_y
        || running.max_x != header.max_x
        || running.max_y != header.max_y
    {
        eprintln!("\t\tHEADERS: found invalid BBOX");
        n_invalid += 1;
    }
    Ok(n_invalid)
}

/// Rewrites one triple into the output directory. Returns whether the
/// repair failed (rows degraded to null shapes, a shape mismatch, or
/// output I/O trouble); only corruption of the input mid-read is an
/// error, and that aborts the batch.
pub fn repair_shapefile(
    in_stem: &str,
    out_stem: &str,
    cfg: &RunConfig,
    engine: &dyn ValidityEngine,
) -> Result<bool, Error> {
    let mut input = match Shapefile::open_read(in_stem) {
        Ok(shp) => shp,
        Err(e) => {
            eprint!(
                "\t\terror: cannot open shapefile '{}'\n\t\tcause: {}\n",
                in_stem, e
            );
            return Ok(true);
        }
    };
    let shape = input.header.shape_type;
    let dims = shape.dimension();
    let fields = input.fields.clone();
    let mut output = match Shapefile::open_write(out_stem, shape, &fields) {
        Ok(shp) => shp,
        Err(e) => {
            eprint!(
                "\t\terror: cannot open shapefile '{}'\n\t\tcause: {}\n",
                out_stem, e
            );
            return Ok(true);
        }
    };
    let null_shape = encode_record(None, shape, dims)?;

    let mut repair_failed = false;
    let mut row = 0u32;
    loop {
        let read = match input.read_record(row) {
            Ok(r) => r,
            Err(e) => {
                eprintln!("\t\tERROR: {}", e);
                eprintln!("\t\tMalformed shapefile, impossible to repair: quitting");
                return Err(e);
            }
        };
        match read {
            RecordRead::Eof => break,
            RecordRead::Deleted => {
                row += 1;
                continue;
            }
            RecordRead::Entity { .. } => (),
        }

        if cfg.validate || cfg.force {
            let rebuilt = match decode_record(input.record_data(), dims) {
                Ok(None) => Some(null_shape.clone()),
                Err(_) => {
                    eprintln!("\t\tinput row #{}: unexpected NULL geometry", row);
                    repair_failed = true;
                    Some(null_shape.clone())
                }
                Ok(Some(geom)) => {
                    let geom = if cfg.validate && engine.check(&geom, cfg.esri).is_err() {
                        match engine.make_valid(geom) {
                            MakeValid::Failed => {
                                eprintln!(
                                    "\t\tinput row #{}: unexpected MakeValid failure",
                                    row
                                );
                                repair_failed = true;
                                None
                            }
                            MakeValid::Discarded(_) => {
                                eprintln!(
                                    "\t\tinput row #{}: MakeValid reports discarded elements",
                                    row
                                );
                                repair_failed = true;
                                None
                            }
                            MakeValid::Repaired(fixed) => {
                                match fixed.check_shape(shape, dims) {
                                    Ok(()) => Some(fixed),
                                    Err(mm) => {
                                        eprintln!(
                                            "\t\tinput row #{}: MakeValid returned an invalid SHAPE (expected {}, got {})",
                                            row, mm.expected, mm.actual
                                        );
                                        repair_failed = true;
                                        None
                                    }
                                }
                            }
                        }
                    } else {
                        Some(geom)
                    };
                    match geom {
                        None => Some(null_shape.clone()),
                        Some(geom) => match encode_record(Some(&geom), shape, dims) {
                            Ok(buf) => Some(buf),
                            Err(_) => {
                                eprintln!(
                                    "\tinput row #{}: mismatching Geometry type",
                                    row
                                );
                                None
                            }
                        },
                    }
                }
            };
            let buf = match rebuilt {
                Some(buf) => buf,
                None => return Ok(true),
            };
            let attr = input.attr_data().to_vec();
            if let Err(e) = output.write_record(&buf, &attr) {
                eprintln!("\t\tERROR: {}", e);
                return Ok(true);
            }
        } else {
            // passing geometries exactly as they were
            let buf = input.record_data().to_vec();
            let attr = input.attr_data().to_vec();
            if let Err(e) = output.write_record(&buf, &attr) {
                eprintln!("\t\tERROR: {}", e);
                return Ok(true);
            }
        }
        row += 1;
    }
    if let Err(e) = output.flush_headers() {
        eprintln!("\t\tERROR: {}", e);
        return Ok(true);
    }
    Ok(repair_failed)
}

/// Removes a partially written output triple.
pub fn clean_files(out_stem: &str) {
    for ext in ["shp", "shx", "dbf"] {
        let _ = fs::remove_file(format!("{}.{}", out_stem, ext));
    }
}
