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

//! Module responsible for writing the blended forecast.
//!
//! Output is a CSV table with one row per location and valid time,
//! locations in the order of the blended series:
//!
//! ```text
//! location_id,latitude,longitude[,climate_zone],gen_time,valid_time,lead_time,<variables...>[,samples]
//! ```
//!
//! This is the only place where missing values become the `-9999` sentinel.

use super::series::{to_epoch_seconds, AlignedSeries, LocationId, LocationMeta};
use crate::{
    constants::{MISSING, OUTSIDE_ZONE},
    errors::OutputError,
    Float,
};
use log::debug;
use rustc_hash::FxHashMap;
use std::path::Path;

fn format_value(value: Option<Float>) -> String {
    value.unwrap_or(MISSING).to_string()
}

/// Writes the series with location metadata to a CSV file.
///
/// The climate zone column is written when any location has a zone.
/// Locations without a zone get the outside-zone code there.
/// The samples column is written when `samples` are given
/// (one count per valid time).
pub fn write_series(
    path: &Path,
    series: &AlignedSeries,
    metadata: &FxHashMap<LocationId, LocationMeta>,
    samples: Option<&[usize]>,
) -> Result<(), OutputError> {
    debug!("Writing {} locations to {}", series.locations().len(), path.display());

    let with_zones = metadata.values().any(|meta| meta.climate_zone.is_some());

    let mut out_file = csv::Writer::from_path(path)?;

    let mut header = vec!["location_id", "latitude", "longitude"];
    if with_zones {
        header.push("climate_zone");
    }
    header.extend(["gen_time", "valid_time", "lead_time"]);
    header.extend(series.variables().iter().map(String::as_str));
    if samples.is_some() {
        header.push("samples");
    }

    out_file.write_record(&header)?;

    let gen_time = to_epoch_seconds(series.gen_time()).to_string();

    for (l, location) in series.locations().iter().enumerate() {
        let meta = metadata.get(location);

        let mut location_fields = vec![
            location.clone(),
            format_value(meta.map(|m| m.latitude)),
            format_value(meta.map(|m| m.longitude)),
        ];
        if with_zones {
            // zone column has its own fill value
            let zone = meta.and_then(|m| m.climate_zone).unwrap_or(OUTSIDE_ZONE);
            location_fields.push(zone.to_string());
        }

        for (t, valid_time) in series.valid_times().iter().enumerate() {
            let mut record = location_fields.clone();

            record.push(gen_time.clone());
            record.push(to_epoch_seconds(*valid_time).to_string());
            record.push(series.lead_time(t).to_string());

            for v in 0..series.variables().len() {
                record.push(format_value(series.value(v, l, t)));
            }

            if let Some(samples) = samples {
                record.push(samples[t].to_string());
            }

            out_file.write_record(&record)?;
        }
    }

    out_file.flush()?;

    Ok(())
}
