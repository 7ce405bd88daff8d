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

//! Climate zone masking of the blended forecast.
//!
//! Grid points outside the region of interest carry a special climate
//! zone code. Selected variables are set to missing at those points,
//! all other variables are kept.

use super::{
    configuration::ClimateZone,
    series::{AlignedSeries, LocationId, LocationMeta},
};
use log::{debug, warn};
use rustc_hash::FxHashMap;

/// Attaches climate zones to location metadata and masks
/// configured variables outside the region of interest.
///
/// Returns the number of masked locations.
pub fn apply_climate_zones(
    series: &mut AlignedSeries,
    metadata: &mut FxHashMap<LocationId, LocationMeta>,
    zones: &FxHashMap<LocationId, i32>,
    config: &ClimateZone,
) -> usize {
    for (location, meta) in metadata.iter_mut() {
        meta.climate_zone = zones.get(location).copied();
    }

    let variables: Vec<usize> = config
        .masked_variables
        .iter()
        .filter_map(|name| {
            let index = series.variable_index(name);
            if index.is_none() {
                warn!("Masked variable {} is not in the blended forecast", name);
            }
            index
        })
        .collect();

    let empty_row = vec![None; series.valid_times().len()];
    let mut masked = 0;

    for l in 0..series.locations().len() {
        if zones.get(&series.locations()[l]) != Some(&config.outside_zone) {
            continue;
        }

        for &v in &variables {
            series.set_location_row(v, l, &empty_row);
        }
        masked += 1;
    }

    debug!(
        "Masked {} of {} locations outside the region of interest",
        masked,
        series.locations().len()
    );

    masked
}
