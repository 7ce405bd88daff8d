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

//! Blend of two gridded NWP models.
//!
//! Forecasts of model A and model B are first merged into one series
//! on a common grid of locations and valid times. Each blended variable
//! appears in it twice, with `_modelA` and `_modelB` suffixes, while
//! pass-through variables keep their names. The blend itself uses only
//! lead-time weights, separate for each variable.
//!
//! Either model may be absent, in which case its columns are all missing
//! and the output equals the other model.

use super::{blend_values, run_jobs, BlendStats};
use crate::{
    constants::{MODEL_A_SUFFIX, MODEL_B_SUFFIX},
    errors::{AlignmentError, BlendError, InputError, ModelError},
    model::{
        alignment::{align, resample, verify_lead_time_coverage, verify_lead_times},
        configuration::{GridBlend, ModelInput},
        series::{AlignedSeries, BlendedSeries, ForecastSeries, LocationId},
    },
    Float,
};
use chrono::{Duration, NaiveDateTime};
use log::{debug, info, warn};
use ndarray::Array2;
use rayon::ThreadPool;
use rustc_hash::FxHashSet;
use std::sync::Arc;

/// Name of a blended variable in the merged series.
pub fn merged_name(variable: &str, suffix: &str) -> String {
    format!("{}{}", variable, suffix)
}

/// Valid times of the blended forecast: generation time
/// plus each configured lead time.
pub fn canonical_times(gen_time: NaiveDateTime, config: &GridBlend) -> Vec<NaiveDateTime> {
    config
        .lead_times()
        .into_iter()
        .map(|lead_time| gen_time + Duration::seconds(lead_time))
        .collect()
}

/// Columns selected from a model forecast, as `(source, merged)` names.
fn model_columns(input: &ModelInput, suffix: &str) -> Vec<(String, String)> {
    let mut columns: Vec<(String, String)> = input
        .blend_vars
        .iter()
        .map(|(source, blend)| (source.clone(), merged_name(blend, suffix)))
        .collect();

    columns.extend(
        input
            .pass_through_vars
            .iter()
            .map(|variable| (variable.clone(), variable.clone())),
    );

    columns.extend(
        input
            .fall_back_vars
            .iter()
            .map(|(output, source)| (source.clone(), merged_name(output, suffix))),
    );

    columns
}

/// Lead times (in seconds) of a series measured from the run generation time.
fn lead_times_from(series: &ForecastSeries, gen_time: NaiveDateTime) -> Vec<i64> {
    series
        .valid_times()
        .into_iter()
        .map(|valid_time| (valid_time - gen_time).num_seconds())
        .collect()
}

/// Merges forecasts of both models onto the common grid.
///
/// Model B is resampled to the configured cadence before alignment.
/// Lead times of model A must be exactly the configured ones, while
/// resampled model B must cover all of them.
/// Locations are the union of both models, model A first.
/// Fall-back variables of model B fill the missing values of the
/// pass-through variables they stand in for.
pub fn merge_models(
    model_a: Option<&ForecastSeries>,
    model_b: Option<&ForecastSeries>,
    gen_time: NaiveDateTime,
    config: &GridBlend,
) -> Result<AlignedSeries, ModelError> {
    if model_a.is_none() && model_b.is_none() {
        return Err(InputError::NoSources.into());
    }

    let columns_a = model_columns(&config.model_a, MODEL_A_SUFFIX);
    let columns_b = model_columns(&config.model_b, MODEL_B_SUFFIX);

    let model_a = model_a.map(|series| series.select(&columns_a)).transpose()?;
    let model_b = match model_b {
        Some(series) => Some(resample(&series.select(&columns_b)?, &config.interpolation)?),
        None => None,
    };

    let configured = config.lead_times();

    if let Some(series) = &model_a {
        verify_lead_times("model A", &configured, &lead_times_from(series, gen_time))?;
    }
    if let Some(series) = &model_b {
        verify_lead_time_coverage("model B", &configured, &lead_times_from(series, gen_time))?;
    }

    let mut locations: Vec<LocationId> = vec![];
    let mut seen: FxHashSet<LocationId> = FxHashSet::default();

    for series in model_a.iter().chain(model_b.iter()) {
        for location in series.locations() {
            if seen.insert(location.clone()) {
                locations.push(location.clone());
            }
        }
    }

    let valid_times = canonical_times(gen_time, config);
    let shape = (locations.len(), valid_times.len());

    let mut fields: Vec<(String, Array2<Option<Float>>)> = vec![];

    for (series, columns, model) in [
        (&model_a, &columns_a, "model A"),
        (&model_b, &columns_b, "model B"),
    ] {
        match series {
            Some(series) => {
                let aligned = align(series, &locations, &valid_times);

                for (v, variable) in aligned.variables().iter().enumerate() {
                    fields.push((variable.clone(), aligned.field(v).to_owned()));
                }
            }
            None => {
                warn!("Forecast of {} is not available, using the other model only", model);

                for (_, variable) in columns.iter() {
                    fields.push((variable.clone(), Array2::from_elem(shape, None)));
                }
            }
        }
    }

    apply_fall_backs(&mut fields, config);

    Ok(AlignedSeries::from_fields(
        gen_time,
        locations,
        valid_times,
        fields,
    ))
}

/// Fills missing values of pass-through variables from their
/// model B fall-back variables, which are then removed.
fn apply_fall_backs(fields: &mut Vec<(String, Array2<Option<Float>>)>, config: &GridBlend) {
    for (output, _) in &config.model_b.fall_back_vars {
        let fall_back_name = merged_name(output, MODEL_B_SUFFIX);

        let position = match fields.iter().position(|(name, _)| *name == fall_back_name) {
            Some(position) => position,
            None => continue,
        };
        let (_, fall_back) = fields.remove(position);

        match fields.iter_mut().find(|(name, _)| name == output) {
            Some((_, field)) => {
                let mut filled = 0;

                field.zip_mut_with(&fall_back, |value, fall_back| {
                    if value.is_none() && fall_back.is_some() {
                        *value = *fall_back;
                        filled += 1;
                    }
                });

                debug!("Filled {} values of {} from model B", filled, output);
            }
            None => fields.push((output.clone(), fall_back)),
        }
    }
}

/// Blends merged forecasts of both models.
///
/// Every blended variable must have both `_modelA` and `_modelB` columns
/// in the merged series. The output holds blended variables under their
/// own names followed by all remaining (pass-through) variables.
pub fn blend_models(
    merged: &AlignedSeries,
    config: &GridBlend,
    threadpool: &ThreadPool,
) -> Result<BlendedSeries, BlendError> {
    let mut blend_columns = vec![];
    let mut used = FxHashSet::default();

    for variable in config.blending_weights.keys() {
        let mut indices = [0; 2];

        for (index, suffix) in indices.iter_mut().zip([MODEL_A_SUFFIX, MODEL_B_SUFFIX]) {
            let name = merged_name(variable, suffix);
            *index = merged
                .variable_index(&name)
                .ok_or(AlignmentError::MissingColumn(name))?;
            used.insert(*index);
        }

        blend_columns.push((variable.clone(), indices));
    }

    let weights = blend_columns
        .iter()
        .map(|(variable, _)| {
            let table = &config.blending_weights[variable];

            merged
                .lead_times()
                .into_iter()
                .map(|lead_time| table.lead_time_weights(lead_time))
                .collect::<Result<Vec<(Float, Float)>, _>>()
        })
        .collect::<Result<Vec<_>, _>>()?;

    info!(
        "Blending {} variables of model A and model B at {} grid points",
        blend_columns.len(),
        merged.locations().len()
    );

    let rows: Vec<Vec<(Vec<Option<Float>>, Vec<Option<Float>>)>> = (0..merged.locations().len())
        .map(|l| {
            blend_columns
                .iter()
                .map(|(_, [a, b])| {
                    (
                        merged.location_row(*a, l).to_vec(),
                        merged.location_row(*b, l).to_vec(),
                    )
                })
                .collect()
        })
        .collect();

    let rows = Arc::new(rows);
    let weights = Arc::new(weights);

    let results = run_jobs(
        threadpool,
        rows.len(),
        "Blended grid points",
        move |location| Ok(blend_location(&rows[location], &weights)),
    )?;

    let shape = (merged.locations().len(), merged.valid_times().len());
    let mut fields: Vec<(String, Array2<Option<Float>>)> = blend_columns
        .iter()
        .map(|(variable, _)| (variable.clone(), Array2::from_elem(shape, None)))
        .collect();

    let mut stats = BlendStats::default();

    for (location, (location_rows, location_stats)) in results.into_iter().enumerate() {
        for ((_, field), row) in fields.iter_mut().zip(location_rows) {
            for (slot, value) in field.row_mut(location).iter_mut().zip(row) {
                *slot = value;
            }
        }
        stats += location_stats;
    }

    stats.log("Grid blend");

    for (v, variable) in merged.variables().iter().enumerate() {
        if !used.contains(&v) {
            fields.push((variable.clone(), merged.field(v).to_owned()));
        }
    }

    Ok(AlignedSeries::from_fields(
        merged.gen_time(),
        merged.locations().to_vec(),
        merged.valid_times().to_vec(),
        fields,
    ))
}

/// Blended rows of all variables at one location.
fn blend_location(
    rows: &[(Vec<Option<Float>>, Vec<Option<Float>>)],
    weights: &[Vec<(Float, Float)>],
) -> (Vec<Vec<Option<Float>>>, BlendStats) {
    let mut stats = BlendStats::default();

    let blended = rows
        .iter()
        .zip(weights)
        .map(|((row_a, row_b), weights)| {
            row_a
                .iter()
                .zip(row_b)
                .zip(weights)
                .map(|((a, b), weights)| blend_values(*a, *b, *weights, &mut stats))
                .collect()
        })
        .collect();

    (blended, stats)
}
