//! This is a module for integration tests of the blending system,
//! but with access to private fields and methods.
//!
//! Each test writes a small set of input files to a temporary
//! directory and runs a whole blend on them, as it would be run
//! from the command line.

use crate::cli::{GridBlendArgs, PointBlendArgs, RunArgs};
use crate::errors::{AlignmentError, ModelError};
use crate::model::{run_grid_blend, run_point_blend};
use crate::Float;
use float_cmp::approx_eq;
use std::{
    fs,
    path::{Path, PathBuf},
};
use tempfile::TempDir;

// 2020-09-13 12:00:00 UTC
const GEN: i64 = 1_599_998_400;
const GEN_TIME: &str = "20200913.1200";

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).unwrap();
    path
}

/// Rows of the output CSV split into cells, header first.
fn read_output(path: &Path) -> Vec<Vec<String>> {
    fs::read_to_string(path)
        .unwrap()
        .lines()
        .map(|line| line.split(',').map(str::to_string).collect())
        .collect()
}

fn cell(rows: &[Vec<String>], location: &str, lead_time: i64, column: &str) -> Float {
    let header = &rows[0];
    let column = header.iter().position(|h| h == column).unwrap();
    let lead_column = header.iter().position(|h| h == "lead_time").unwrap();

    rows[1..]
        .iter()
        .find(|row| row[0] == location && row[lead_column] == lead_time.to_string())
        .map(|row| row[column].parse().unwrap())
        .unwrap()
}

fn point_inputs(dir: &TempDir, config: &str) -> PointBlendArgs {
    let nwp = format!(
        "location_id,gen_time,valid_time,latitude,longitude,ghi,T2\n\
         G1,{g},{t0},42.5,-75.1,10.0,288.0\n\
         G1,{g},{t1},42.5,-75.1,200.0,289.0\n\
         G1,{g},{t2},42.5,-75.1,-9999,290.0\n\
         G2,{g},{t0},42.6,-75.0,20.0,287.0\n\
         G2,{g},{t1},42.6,-75.0,50.0,288.0\n\
         G2,{g},{t2},42.6,-75.0,60.0,289.0\n",
        g = GEN - 3600,
        t0 = GEN,
        t1 = GEN + 900,
        t2 = GEN + 1800,
    );

    let point = format!(
        "location_id,gen_time,valid_time,ghi\n\
         1,{g},{t1},100.0\n\
         1,{g},{t2},120.0\n\
         2,{g},{t1},2500.0\n\
         2,{g},{t2},\n",
        g = GEN,
        t1 = GEN + 900,
        t2 = GEN + 1800,
    );

    PointBlendArgs {
        config: write(dir, "config.yaml", config),
        nwp: write(dir, "nwp.csv", &nwp),
        point: write(dir, "point.csv", &point),
        site_list: write(dir, "site_list.csv", "int_id,stid\n1,ALBA\n2,BUFF\n"),
        grid_site_map: write(
            dir,
            "grid_site_map.json",
            r#"{"G1": {"ObsSites": ["ALBA", "BUFF"], "ObsDistance": [5.5, 8.0]}}"#,
        ),
        run: RunArgs {
            gen_time: GEN_TIME.to_string(),
            output: dir.path().join("blend.csv"),
            hourly_output: Some(dir.path().join("blend_hourly.csv")),
            climate_zone_file: Some(write(
                dir,
                "zones.csv",
                "grid_id,climateZone\nG1,4\nG2,-9\n",
            )),
        },
    }
}

const POINT_CONFIG: &str = r#"{
    "point_blend": {
        "lead_time_blending_weights": {"900": [0.7, 0.3], "1800": [0.0, 1.0]},
        "spatial_blending_weights": [[1, 0.9], [10, 0.1]]
    }
}"#;

#[test]
fn point_blend_run() {
    let dir = tempfile::tempdir().unwrap();
    let args = point_inputs(&dir, POINT_CONFIG);

    run_point_blend(&args).unwrap();

    let rows = read_output(&args.run.output);

    assert_eq!(
        rows[0],
        [
            "location_id",
            "latitude",
            "longitude",
            "climate_zone",
            "gen_time",
            "valid_time",
            "lead_time",
            "ghi",
            "T2"
        ]
    );
    // NWP valid time before the first point valid time is discarded
    assert_eq!(rows.len(), 5);
    assert_eq!(rows[1][4], GEN.to_string());

    // implausible BUFF value is ignored, ALBA at 5.5 km gives confidence 0.5
    assert!(approx_eq!(Float, cell(&rows, "G1", 900, "ghi"), 185.0, epsilon = 1e-6));
    // NWP missing, point value taken
    assert!(approx_eq!(Float, cell(&rows, "G1", 1800, "ghi"), 120.0, epsilon = 1e-6));
    assert!(approx_eq!(Float, cell(&rows, "G1", 1800, "T2"), 290.0, epsilon = 1e-6));

    // G2 is outside the region of interest
    assert!(approx_eq!(Float, cell(&rows, "G2", 900, "ghi"), -9999.0));
    assert!(approx_eq!(Float, cell(&rows, "G2", 900, "T2"), 288.0, epsilon = 1e-6));
    assert!(approx_eq!(Float, cell(&rows, "G2", 900, "climate_zone"), -9.0));

    let hourly = read_output(args.run.hourly_output.as_ref().unwrap());

    assert_eq!(hourly.len(), 3);
    assert!(approx_eq!(Float, cell(&hourly, "G1", 3600, "ghi"), 152.5, epsilon = 1e-6));
}

#[test]
fn point_blend_lead_time_mismatch() {
    let dir = tempfile::tempdir().unwrap();
    let args = point_inputs(
        &dir,
        r#"{"point_blend": {
            "lead_time_blending_weights": {"900": [0.7, 0.3], "2700": [0.0, 1.0]},
            "spatial_blending_weights": [[1, 0.9], [10, 0.1]]}}"#,
    );

    let result = run_point_blend(&args);

    assert!(matches!(
        result,
        Err(ModelError::Alignment(AlignmentError::LeadTimeMismatch {
            series: "point",
            configured: 2700,
            found: 1800
        }))
    ));
    assert!(!args.run.output.exists());
}

#[test]
fn point_blend_needs_its_section() {
    let dir = tempfile::tempdir().unwrap();
    let args = point_inputs(&dir, "resources:\n  threads: 2\n");

    assert!(matches!(
        run_point_blend(&args),
        Err(ModelError::Config(_))
    ));
}

const GRID_CONFIG: &str = r#"
grid_blend:
  blending_weights:
    ghi: {"900": [0.5, 0.5], "1800": [0.5, 0.5]}
  model_a:
    blend_vars: {SWDOWN: ghi}
  model_b:
    blend_vars: {DSWRF: ghi}
aggregation:
  incomplete: flag
"#;

#[test]
fn grid_blend_run() {
    let dir = tempfile::tempdir().unwrap();

    let model_a = format!(
        "location_id,gen_time,valid_time,latitude,longitude,SWDOWN\n\
         G1,{g},{t1},42.5,-75.1,300.0\n\
         G1,{g},{t2},42.5,-75.1,\n",
        g = GEN,
        t1 = GEN + 900,
        t2 = GEN + 1800,
    );

    // hourly samples describing the preceding hour
    let model_b = format!(
        "location_id,gen_time,valid_time,latitude,longitude,DSWRF\n\
         G1,{g},{t0},42.0,-75.0,100.0\n\
         G1,{g},{t1},42.0,-75.0,500.0\n",
        g = GEN - 3600,
        t0 = GEN,
        t1 = GEN + 3600,
    );

    let args = GridBlendArgs {
        config: write(&dir, "config.yaml", GRID_CONFIG),
        model_a: Some(write(&dir, "model_a.csv", &model_a)),
        model_b: Some(write(&dir, "model_b.csv", &model_b)),
        run: RunArgs {
            gen_time: GEN_TIME.to_string(),
            output: dir.path().join("blend.csv"),
            hourly_output: Some(dir.path().join("blend_hourly.csv")),
            climate_zone_file: None,
        },
    };

    run_grid_blend(&args).unwrap();

    let rows = read_output(&args.run.output);

    assert_eq!(
        rows[0],
        ["location_id", "latitude", "longitude", "gen_time", "valid_time", "lead_time", "ghi"]
    );
    // model A coordinates
    assert_eq!(rows[1][1], "42.5");

    // model B centred at 12:07:30 and 13:07:30 gives 150 at 12:15 and 250 at 12:30
    assert!(approx_eq!(Float, cell(&rows, "G1", 900, "ghi"), 225.0, epsilon = 1e-6));
    assert!(approx_eq!(Float, cell(&rows, "G1", 1800, "ghi"), 250.0, epsilon = 1e-6));

    let hourly = read_output(args.run.hourly_output.as_ref().unwrap());

    assert_eq!(hourly[0].last().unwrap(), "samples");
    assert_eq!(hourly[1].last().unwrap(), "2");
    assert!(approx_eq!(Float, cell(&hourly, "G1", 3600, "ghi"), 237.5, epsilon = 1e-6));
}

#[test]
fn grid_blend_without_model_a() {
    let dir = tempfile::tempdir().unwrap();

    let model_b = format!(
        "location_id,gen_time,valid_time,DSWRF\n\
         G1,{g},{t0},100.0\n\
         G1,{g},{t1},500.0\n",
        g = GEN - 3600,
        t0 = GEN,
        t1 = GEN + 3600,
    );

    let args = GridBlendArgs {
        config: write(&dir, "config.yaml", GRID_CONFIG),
        model_a: Some(dir.path().join("missing.csv")),
        model_b: Some(write(&dir, "model_b.csv", &model_b)),
        run: RunArgs {
            gen_time: GEN_TIME.to_string(),
            output: dir.path().join("blend.csv"),
            hourly_output: None,
            climate_zone_file: None,
        },
    };

    run_grid_blend(&args).unwrap();

    let rows = read_output(&args.run.output);

    assert!(approx_eq!(Float, cell(&rows, "G1", 900, "ghi"), 150.0, epsilon = 1e-6));
    assert!(approx_eq!(Float, cell(&rows, "G1", 1800, "ghi"), 250.0, epsilon = 1e-6));
    // no coordinates in any input
    assert_eq!(rows[1][1], "-9999");

    let args = GridBlendArgs {
        model_a: None,
        model_b: None,
        ..args
    };

    assert!(matches!(run_grid_blend(&args), Err(ModelError::Input(_))));
}

#[test]
fn grid_blend_lead_time_mismatch() {
    let dir = tempfile::tempdir().unwrap();

    // valid times off the configured lead times
    let model_a = format!(
        "location_id,gen_time,valid_time,SWDOWN\n\
         G1,{g},{t1},999.0\n\
         G1,{g},{t2},999.0\n",
        g = GEN,
        t1 = GEN + 450,
        t2 = GEN + 1350,
    );

    let model_b = format!(
        "location_id,gen_time,valid_time,DSWRF\n\
         G1,{g},{t0},100.0\n\
         G1,{g},{t1},500.0\n",
        g = GEN - 3600,
        t0 = GEN,
        t1 = GEN + 3600,
    );

    let args = GridBlendArgs {
        config: write(&dir, "config.yaml", GRID_CONFIG),
        model_a: Some(write(&dir, "model_a.csv", &model_a)),
        model_b: Some(write(&dir, "model_b.csv", &model_b)),
        run: RunArgs {
            gen_time: GEN_TIME.to_string(),
            output: dir.path().join("blend.csv"),
            hourly_output: None,
            climate_zone_file: None,
        },
    };

    assert!(matches!(
        run_grid_blend(&args),
        Err(ModelError::Alignment(AlignmentError::LeadTimeMismatch {
            configured: 900,
            found: 450,
            ..
        }))
    ));
    assert!(!args.run.output.exists());
}
