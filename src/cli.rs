/*
Copyright 2021 Jakub Lewandowski

This file is part of GHI Forecast Blending System (GHI-Blend).

GHI Forecast Blending System (GHI-Blend) is a free software: you can redistribute it and/or modify
it under the terms of the GNU General Public License as published by
the Free Software Foundation; either version 3 of the License, or
(at your option) any later version.

GHI Forecast Blending System (GHI-Blend) is distributed in the hope that it will be useful,
but WITHOUT ANY WARRANTY; without even the implied warranty of
MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
GNU General Public License for more details.

You should have received a copy of the GNU General Public License
along with GHI Forecast Blending System (GHI-Blend). If not, see https://www.gnu.org/licenses/.
*/

//! Command line interface of the blending system.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Multi-source solar irradiance forecast blender.
#[derive(Parser, Debug)]
#[command(
    name = "ghi-blend",
    version,
    about = "Blends gridded and point solar irradiance forecasts"
)]
pub struct Cli {
    /// Increase verbosity (-v debug, -vv trace).
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Blend to run.
    #[command(subcommand)]
    pub command: Command,
}

/// Available blends.
#[derive(Subcommand, Debug)]
pub enum Command {
    /// Blend gridded NWP forecast with point statcast forecast.
    PointBlend(PointBlendArgs),
    /// Blend two gridded NWP models.
    GridBlend(GridBlendArgs),
}

/// Arguments for the `point-blend` subcommand.
#[derive(clap::Args, Debug)]
pub struct PointBlendArgs {
    /// Path to YAML (or JSON) configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Gridded NWP forecast (CSV).
    #[arg(long)]
    pub nwp: PathBuf,

    /// Point statcast forecast (CSV).
    #[arg(long)]
    pub point: PathBuf,

    /// Mapping from integer site id to station id (CSV).
    #[arg(long)]
    pub site_list: PathBuf,

    /// Grid point to nearby sites map (JSON).
    #[arg(long)]
    pub grid_site_map: PathBuf,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments for the `grid-blend` subcommand.
#[derive(clap::Args, Debug)]
pub struct GridBlendArgs {
    /// Path to YAML (or JSON) configuration file.
    #[arg(short, long, default_value = "config.yaml")]
    pub config: PathBuf,

    /// Gridded forecast of model A (CSV). Skipped with a warning when absent.
    #[arg(long)]
    pub model_a: Option<PathBuf>,

    /// Gridded forecast of model B (CSV). Skipped with a warning when absent.
    #[arg(long)]
    pub model_b: Option<PathBuf>,

    #[command(flatten)]
    pub run: RunArgs,
}

/// Arguments shared by both blends.
#[derive(clap::Args, Debug)]
pub struct RunArgs {
    /// Generation time of the blended forecast (YYYYmmdd.HHMM).
    #[arg(short, long)]
    pub gen_time: String,

    /// Path of the blended output (CSV).
    #[arg(short, long)]
    pub output: PathBuf,

    /// Also write time-ending hourly averages to this path.
    #[arg(short = 'H', long)]
    pub hourly_output: Option<PathBuf>,

    /// Climate zone of each grid point (CSV), used to mask
    /// values outside the region of interest.
    #[arg(short = 'z', long)]
    pub climate_zone_file: Option<PathBuf>,
}
