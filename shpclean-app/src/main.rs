/*
This code is part of the shpclean shapefile diagnose & repair tool.
Created: 10/04/2024
Last Modified: 02/06/2024
License: MIT
*/
mod sanitize;
mod validity;

use crate::sanitize::{scan_dir, RunConfig};
use crate::validity::StructuralValidity;
use std::env;
use std::fs;
use std::process;

fn help() {
    eprintln!("\n\nusage: shpclean ARGLIST");
    eprintln!("=================================================================");
    eprintln!("-h or --help                      print this help message");
    eprintln!("-v or --version                   print version infos");
    eprintln!(
        "-idir or --in-dir   dir-path      directory expected to contain\n\
         \x20                                 all SHP to be checked"
    );
    eprintln!(
        "-odir or --out-dir  dir-path      <optional> directory where to\n\
         \x20                                 store all repaired SHPs\n"
    );
    eprintln!(
        "======================= optional args ===========================\n\
         -geom or --invalid-geoms          checks for invalid Geometries\n\
         -esri or --esri-flag              tolerates ESRI-like inner holes\n\
         -force or --force-repair          unconditionally repair\n"
    );
}

fn version() {
    eprintln!("\nVersion infos");
    eprintln!("===========================================");
    eprintln!("shpclean: {}\n", env!("CARGO_PKG_VERSION"));
}

fn main() {
    let args: Vec<String> = env::args().collect();
    let mut in_dir: Option<String> = None;
    let mut out_dir: Option<String> = None;
    let mut validate = false;
    let mut esri = false;
    let mut force = false;
    let mut error = false;

    let mut i = 1;
    while i < args.len() {
        let arg = &args[i];
        let flag = arg.to_lowercase();
        if arg == "-h" || flag == "--help" {
            help();
            process::exit(1);
        } else if arg == "-v" || flag == "--version" {
            version();
            process::exit(1);
        } else if flag == "-idir" || flag == "--in-dir" {
            i += 1;
            in_dir = args.get(i).cloned();
        } else if flag == "-odir" || flag == "--out-dir" {
            i += 1;
            out_dir = args.get(i).cloned();
        } else if flag == "-geom" || flag == "--invalid-geoms" {
            validate = true;
        } else if flag == "-esri" || flag == "--esri-flag" {
            esri = true;
        } else if flag == "-force" || flag == "--force-repair" {
            force = true;
        } else {
            eprintln!("unknown argument: {}", arg);
            error = true;
        }
        i += 1;
    }
    if error {
        help();
        process::exit(1);
    }
    let in_dir = match in_dir {
        Some(dir) => dir,
        None => {
            eprintln!("did you forget setting the --in-dir argument ?");
            help();
            process::exit(1);
        }
    };

    if let Some(dir) = &out_dir {
        if let Err(e) = fs::create_dir(dir) {
            eprint!(
                "ERROR: unable to create the output directory\n{}\n{}\n\n",
                dir, e
            );
            process::exit(1);
        }
    }

    eprintln!("\nInput dir: {}", in_dir);
    match &out_dir {
        Some(dir) => {
            eprintln!("Output dir: {}", dir);
            if force {
                eprintln!("Unconditionally repairing all Shapefiles");
            }
        }
        None => eprintln!("Only a diagnostic report will be reported"),
    }
    if validate {
        eprintln!(
            "Checking for invalid geometries ({} mode)",
            if esri { "ESRI" } else { "ISO/OGC" }
        );
    }

    let cfg = RunConfig {
        in_dir,
        out_dir,
        validate,
        esri,
        force,
    };
    let stats = match scan_dir(&cfg, &StructuralValidity) {
        Ok(stats) => stats,
        Err(_) => {
            eprintln!("\n... quitting ... some unexpected error occurred");
            process::exit(1);
        }
    };

    eprintln!("\n===========================================");
    eprintln!(
        "{} Shapefil{} ha{} been inspected.",
        stats.inspected,
        if stats.inspected > 1 { "es" } else { "e" },
        if stats.inspected > 1 { "ve" } else { "s" }
    );
    eprintln!(
        "{} malformed Shapefil{} ha{} been identified.",
        stats.malformed,
        if stats.malformed > 1 { "es" } else { "e" },
        if stats.malformed > 1 { "ve" } else { "s" }
    );
    eprintln!(
        "{} Shapefil{} ha{} been repaired.\n",
        stats.repaired,
        if stats.repaired > 1 { "es" } else { "e" },
        if stats.repaired > 1 { "ve" } else { "s" }
    );
}
