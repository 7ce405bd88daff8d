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

//! Module containing the actual blending system code.
//!
//! A run reads the configuration and input forecasts, aligns all sources
//! onto a common grid of locations and valid times, blends them on the
//! thread pool and writes the blended forecast, optionally masked by
//! climate zones and followed by its hourly averages.
//!
//! ## Point blend
//!
//! Gridded NWP forecast is blended with point statcast forecast.
//! Point forecast defines the valid times of the blend: NWP records earlier
//! than the first point valid time are discarded and the NWP forecast is
//! reindexed (not interpolated) onto point valid times, so NWP values stay
//! missing where NWP has no forecast. Lead times are measured from the
//! point forecast generation time and must match the configured ones exactly.
//!
//! ## Grid blend
//!
//! Forecasts of two gridded models are blended with lead-time weights only.
//! Model B is interpolated to the blend cadence first. Either model file
//! may be absent, then the other one is used alone.

mod aggregation;
mod alignment;
mod bisection;
mod blending;
mod configuration;
mod input;
mod masking;
mod output;
mod series;
mod spatial;
mod weights;

#[cfg(test)]
mod super_tests;

use crate::{
    cli::{Command, GridBlendArgs, PointBlendArgs, RunArgs},
    constants::GEN_TIME_FORMAT,
    errors::{InputError, ModelError},
    model::{
        configuration::Config,
        input::ForecastTable,
        series::{AlignedSeries, LocationId, LocationMeta},
    },
    ALLOCATOR,
};
use chrono::NaiveDateTime;
use log::{debug, info, warn};
use rayon::{ThreadPool, ThreadPoolBuilder};
use rustc_hash::FxHashMap;
use std::path::{Path, PathBuf};

/// Main model function, running the blend selected on the command line.
pub fn main(command: &Command) -> Result<(), ModelError> {
    match command {
        Command::PointBlend(args) => run_point_blend(args),
        Command::GridBlend(args) => run_grid_blend(args),
    }
}

/// Structure containing resources shared by both blends.
#[derive(Debug)]
pub struct Core {
    pub config: Config,
    pub threadpool: ThreadPool,
}

impl Core {
    /// Model [`Core`] constructor.
    ///
    /// Configuration is loaded and checked before any input is read,
    /// then the memory limit and thread pool are set from it.
    pub fn new(config_path: &Path) -> Result<Self, ModelError> {
        debug!("Reading configuration from {}", config_path.display());
        let config = Config::new_from_file(config_path)?;

        debug!("Setting memory limit");
        ALLOCATOR
            .set_limit(config.resources.memory_bytes()?)
            .map_err(|_| ModelError::MemoryLimit(config.resources.memory))?;

        debug!("Setting up ThreadPool");
        let threadpool = ThreadPoolBuilder::new()
            .num_threads(config.resources.threads as usize)
            .stack_size(2 * 1024 * 1024)
            .build()?;

        Ok(Core { config, threadpool })
    }
}

/// Parses generation time given as `YYYYmmdd.HHMM`.
fn parse_gen_time(text: &str) -> Result<NaiveDateTime, ModelError> {
    NaiveDateTime::parse_from_str(text.trim(), GEN_TIME_FORMAT)
        .map_err(|_| ModelError::GenTime(text.to_string()))
}

/// Location metadata keyed by location id.
fn metadata_map(locations: Vec<LocationMeta>) -> FxHashMap<LocationId, LocationMeta> {
    locations
        .into_iter()
        .map(|meta| (meta.id.clone(), meta))
        .collect()
}

fn run_point_blend(args: &PointBlendArgs) -> Result<(), ModelError> {
    info!("Preparing the point blend");

    let core = Core::new(&args.config)?;
    let gen_time = parse_gen_time(&args.run.gen_time)?;
    let config = core.config.point_blend()?;

    let site_map = input::read_grid_site_map(&args.grid_site_map)?;
    let nwp = input::read_forecast_table(&args.nwp, None)?;
    let site_ids = input::read_site_list(&args.site_list)?;
    let mut point = input::read_forecast_table(&args.point, Some(&site_ids))?.series;

    let point_variable = point
        .variable_index(&config.variable)
        .ok_or_else(|| InputError::MissingVariable(config.variable.clone()))?;
    let (lowest, highest) = config.point_value_range;
    let implausible = point.retain_values(point_variable, |v| (lowest..=highest).contains(&v));

    if implausible > 0 {
        warn!(
            "{} point forecast values outside [{}, {}] set to missing",
            implausible, lowest, highest
        );
    }

    let point_times = point.valid_times();
    let first_point_time = point_times
        .first()
        .copied()
        .ok_or_else(|| InputError::EmptyTable(args.point.display().to_string()))?;

    let mut nwp_series = nwp.series;
    nwp_series.retain_valid_times(|valid_time| valid_time >= first_point_time);

    if nwp_series.is_empty() {
        warn!("NWP forecast has no records at point valid times, point forecast is used alone");
    }

    info!("Aligning NWP forecast onto point forecast valid times");

    let nwp_aligned = alignment::align(&nwp_series, nwp_series.locations(), &point_times)
        .with_gen_time(point.gen_time());
    let point_aligned = alignment::align(&point, point.locations(), &point_times);

    let configured = config.lead_time_weights.lead_times();
    alignment::verify_lead_times("point", &configured, &point_aligned.lead_times())?;
    alignment::verify_lead_times("NWP", &configured, &nwp_aligned.lead_times())?;

    let unmatched = site_map
        .keys()
        .filter(|grid| nwp_aligned.location_index(grid).is_none())
        .count();
    if unmatched > 0 {
        debug!("{} grid points of the site map are not in NWP forecast", unmatched);
    }

    let blended = blending::point::blend_with_points(
        nwp_aligned,
        &point_aligned,
        &site_map,
        config,
        &core.threadpool,
    )?;

    let blended = blended.after(gen_time).with_gen_time(gen_time);

    write_outputs(&core.config, blended, metadata_map(nwp.locations), &args.run)
}

/// Reads a model forecast, tolerating its absence.
fn read_model(path: Option<&PathBuf>, model: &str) -> Result<Option<ForecastTable>, ModelError> {
    match path {
        Some(path) if path.is_file() => Ok(Some(input::read_forecast_table(path, None)?)),
        Some(path) => {
            warn!("Forecast of {} not found at {}", model, path.display());
            Ok(None)
        }
        None => {
            warn!("Forecast of {} not provided", model);
            Ok(None)
        }
    }
}

fn run_grid_blend(args: &GridBlendArgs) -> Result<(), ModelError> {
    info!("Preparing the grid blend");

    let core = Core::new(&args.config)?;
    let gen_time = parse_gen_time(&args.run.gen_time)?;
    let config = core.config.grid_blend()?;

    let model_a = read_model(args.model_a.as_ref(), "model A")?;
    let model_b = read_model(args.model_b.as_ref(), "model B")?;

    info!("Merging forecasts of model A and model B");

    let merged = blending::grid::merge_models(
        model_a.as_ref().map(|table| &table.series),
        model_b.as_ref().map(|table| &table.series),
        gen_time,
        config,
    )?;

    let blended = blending::grid::blend_models(&merged, config, &core.threadpool)?;

    // model A coordinates take precedence
    let mut metadata = FxHashMap::default();
    for table in [model_b, model_a].into_iter().flatten() {
        metadata.extend(metadata_map(table.locations));
    }

    write_outputs(&core.config, blended, metadata, &args.run)
}

/// Masks, writes and averages the blended forecast.
fn write_outputs(
    config: &Config,
    mut blended: AlignedSeries,
    mut metadata: FxHashMap<LocationId, LocationMeta>,
    run: &RunArgs,
) -> Result<(), ModelError> {
    if let Some(zone_file) = &run.climate_zone_file {
        let zones = input::read_climate_zones(zone_file)?;
        masking::apply_climate_zones(&mut blended, &mut metadata, &zones, &config.climate_zone);
    }

    info!("Writing output to {}", run.output.display());
    output::write_series(&run.output, &blended, &metadata, None)?;

    if let Some(hourly_path) = &run.hourly_output {
        info!("Writing hourly averages to {}", hourly_path.display());

        let hourly = aggregation::hourly_average(&blended, &config.aggregation)?;
        output::write_series(
            hourly_path,
            &hourly.series,
            &metadata,
            hourly.samples.as_deref(),
        )?;
    }

    Ok(())
}
