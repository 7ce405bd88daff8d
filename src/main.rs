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

//! GHI Forecast Blending System (GHI-Blend) combines solar irradiance
//! forecasts from several sources into a single blended forecast
//! for every grid point and lead time of a forecast cycle.
//!
//! Two kinds of blends are supported:
//!
//! - gridded numerical weather prediction (NWP) with point-based
//! statistical nowcasts (statcast), weighted by lead time and by
//! the distance from grid point to the nearest forecast sites,
//! - two competing gridded NWP models, weighted by lead time only.
//!
//! In both cases missing values of one source are substituted
//! with the other source, so the blended forecast is as complete
//! as its inputs allow.

mod cli;
mod constants;
mod errors;
mod model;

use cap::Cap;
use clap::Parser;
use cli::Cli;
use env_logger::Env;
use log::{error, info};
use std::{alloc, process};

#[cfg(feature = "double_precision")]
type Float = f64;

#[cfg(not(feature = "double_precision"))]
type Float = f32;

/// Global allocator used by the system.
///
/// Use of static global allocator allows for capping the memory to the limit set by user
/// in configuration file and in effect provide better [OOM error](https://en.wikipedia.org/wiki/Out_of_memory) handling.
#[global_allocator]
static ALLOCATOR: Cap<alloc::System> = Cap::new(alloc::System, usize::MAX);

/// Log levels selectable with the verbosity flag.
const LOG_LEVELS: [&str; 3] = ["info", "debug", "trace"];

/// The main program function.
/// Prepares the runtime environment and calls the [`model::main`].
///
/// The `env_logger` is initiated before any other work so that
/// errors from configuration and input reading are reported.
/// A failed run ends with non-zero exit status.
fn main() {
    let cli = Cli::parse();

    let base_level = usize::from(cfg!(feature = "debug"));
    let level = LOG_LEVELS[(base_level + usize::from(cli.verbose)).min(LOG_LEVELS.len() - 1)];

    let logger_env = Env::new().filter_or("GHI_BLEND_LOG_LEVEL", level);

    env_logger::Builder::from_env(logger_env)
        .format_timestamp_millis()
        .init();

    match model::main(&cli.command) {
        Ok(_) => info!("Blending finished. Check the output files and log."),
        Err(err) => {
            error!("Blending failed with error: {}", err);
            process::exit(1);
        }
    }
}
