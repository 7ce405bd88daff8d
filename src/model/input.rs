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

//! Module responsible for reading input files.
//!
//! Forecasts are read from CSV tables with a header:
//!
//! ```text
//! location_id,gen_time,valid_time[,latitude,longitude],<variables...>
//! ```
//!
//! Times are integer seconds since 1970-01-01 UTC. Empty cells, `NaN`
//! and the `-9999` sentinel are read as missing values. All other columns
//! are forecast variables.

use super::{
    series::{from_epoch_seconds, ForecastSeries, LocationId, LocationMeta},
    spatial::{GridToPointMap, Neighbours},
};
use crate::{constants::MISSING, errors::InputError, Float};
use csv::StringRecord;
use float_cmp::approx_eq;
use log::{debug, warn};
use rustc_hash::FxHashMap;
use serde::Deserialize;
use std::{fs::File, io::BufReader, path::Path};

const LOCATION_COLUMN: &str = "location_id";
const GEN_TIME_COLUMN: &str = "gen_time";
const VALID_TIME_COLUMN: &str = "valid_time";
const LATITUDE_COLUMN: &str = "latitude";
const LONGITUDE_COLUMN: &str = "longitude";

/// Forecast read from one file with the description of its locations.
#[derive(Clone, PartialEq, Debug)]
pub struct ForecastTable {
    pub series: ForecastSeries,

    /// Empty when the file has no coordinate columns.
    pub locations: Vec<LocationMeta>,
}

/// Positions of the fixed columns in the header.
struct Layout {
    location: usize,
    gen_time: usize,
    valid_time: usize,
    coordinates: Option<(usize, usize)>,
    variables: Vec<(usize, String)>,
}

impl Layout {
    fn new(headers: &StringRecord, file: &str) -> Result<Self, InputError> {
        let position = |column: &str| headers.iter().position(|h| h.trim() == column);
        let required = |column: &'static str| {
            position(column).ok_or_else(|| InputError::MissingColumn {
                file: file.to_string(),
                column,
            })
        };

        let location = required(LOCATION_COLUMN)?;
        let gen_time = required(GEN_TIME_COLUMN)?;
        let valid_time = required(VALID_TIME_COLUMN)?;

        let coordinates = match (position(LATITUDE_COLUMN), position(LONGITUDE_COLUMN)) {
            (Some(lat), Some(lon)) => Some((lat, lon)),
            _ => None,
        };

        let fixed = [
            LOCATION_COLUMN,
            GEN_TIME_COLUMN,
            VALID_TIME_COLUMN,
            LATITUDE_COLUMN,
            LONGITUDE_COLUMN,
        ];

        let variables = headers
            .iter()
            .enumerate()
            .filter(|(_, h)| !fixed.contains(&h.trim()))
            .map(|(i, h)| (i, h.trim().to_string()))
            .collect();

        Ok(Layout {
            location,
            gen_time,
            valid_time,
            coordinates,
            variables,
        })
    }
}

/// Parses a forecast value, returning `None` for missing ones.
pub fn parse_value(column: &str, text: &str) -> Result<Option<Float>, InputError> {
    let text = text.trim();

    if text.is_empty() {
        return Ok(None);
    }

    let value: Float = text.parse().map_err(|_| InputError::InvalidNumber {
        column: column.to_string(),
        value: text.to_string(),
    })?;

    if !value.is_finite() || approx_eq!(Float, value, MISSING, epsilon = 1e-3) {
        return Ok(None);
    }

    Ok(Some(value))
}

fn parse_seconds(column: &str, text: &str) -> Result<i64, InputError> {
    text.trim().parse().map_err(|_| InputError::InvalidNumber {
        column: column.to_string(),
        value: text.to_string(),
    })
}

/// Reads a forecast table.
///
/// When `site_ids` is given, location ids of the file are translated
/// through it and rows of unknown locations are skipped.
pub fn read_forecast_table(
    path: &Path,
    site_ids: Option<&FxHashMap<String, LocationId>>,
) -> Result<ForecastTable, InputError> {
    let file_name = path.display().to_string();
    debug!("Reading forecast from {}", file_name);

    let mut reader = csv::Reader::from_path(path)?;
    let layout = Layout::new(reader.headers()?, &file_name)?;

    let mut series: Option<ForecastSeries> = None;
    let mut locations: FxHashMap<LocationId, LocationMeta> = FxHashMap::default();
    let mut location_order = vec![];
    let mut skipped = 0;

    for record in reader.records() {
        let record = record?;
        let field = |i: usize| record.get(i).unwrap_or("");

        let raw_location = field(layout.location).trim();
        let location = match site_ids {
            Some(site_ids) => match site_ids.get(raw_location) {
                Some(site) => site.clone(),
                None => {
                    skipped += 1;
                    continue;
                }
            },
            None => raw_location.to_string(),
        };

        let gen_time = from_epoch_seconds(parse_seconds(
            GEN_TIME_COLUMN,
            field(layout.gen_time),
        )?)?;
        let valid_time = from_epoch_seconds(parse_seconds(
            VALID_TIME_COLUMN,
            field(layout.valid_time),
        )?)?;

        let forecast = series.get_or_insert_with(|| {
            ForecastSeries::new(
                gen_time,
                layout.variables.iter().map(|(_, name)| name.clone()).collect(),
            )
        });

        if forecast.gen_time() != gen_time {
            return Err(InputError::NonConstantGenTime {
                first: forecast.gen_time(),
                other: gen_time,
            });
        }

        let values = layout
            .variables
            .iter()
            .map(|(i, name)| parse_value(name, field(*i)))
            .collect::<Result<Vec<_>, _>>()?;

        forecast.insert(&location, valid_time, values)?;

        if let Some((lat, lon)) = layout.coordinates {
            if !locations.contains_key(&location) {
                let latitude = parse_value(LATITUDE_COLUMN, field(lat))?;
                let longitude = parse_value(LONGITUDE_COLUMN, field(lon))?;

                if let (Some(latitude), Some(longitude)) = (latitude, longitude) {
                    location_order.push(location.clone());
                    locations.insert(
                        location.clone(),
                        LocationMeta {
                            id: location,
                            latitude,
                            longitude,
                            climate_zone: None,
                        },
                    );
                }
            }
        }
    }

    if skipped > 0 {
        warn!(
            "Skipped {} rows of {} with locations missing from the site list",
            skipped, file_name
        );
    }

    let series = series.ok_or(InputError::EmptyTable(file_name))?;

    debug!(
        "Read {} records of {} variables at {} locations",
        series.len(),
        series.variables().len(),
        series.locations().len()
    );

    let locations = location_order
        .into_iter()
        .filter_map(|id| locations.remove(&id))
        .collect();

    Ok(ForecastTable { series, locations })
}

#[derive(Deserialize)]
struct SiteListRecord {
    int_id: String,
    stid: String,
}

/// Reads the mapping from integer site id used in point forecasts
/// to station id.
pub fn read_site_list(path: &Path) -> Result<FxHashMap<String, LocationId>, InputError> {
    debug!("Reading site list from {}", path.display());

    let mut reader = csv::Reader::from_path(path)?;
    let mut site_ids = FxHashMap::default();

    for record in reader.deserialize() {
        let record: SiteListRecord = record?;
        site_ids.insert(record.int_id.trim().to_string(), record.stid.trim().to_string());
    }

    if site_ids.is_empty() {
        return Err(InputError::EmptyTable(path.display().to_string()));
    }

    Ok(site_ids)
}

/// Reads the map of sites surrounding each grid point from JSON.
pub fn read_grid_site_map(path: &Path) -> Result<GridToPointMap, InputError> {
    debug!("Reading grid to point map from {}", path.display());

    let reader = BufReader::new(File::open(path)?);
    let site_map: FxHashMap<LocationId, Neighbours> = serde_json::from_reader(reader)?;

    for (grid, neighbours) in &site_map {
        neighbours.check(grid)?;
    }

    debug!("{} grid points have nearby sites", site_map.len());

    Ok(site_map)
}

#[derive(Deserialize)]
struct ClimateZoneRecord {
    grid_id: String,
    #[serde(rename = "climateZone")]
    climate_zone: i32,
}

/// Reads climate zone codes of grid points.
pub fn read_climate_zones(path: &Path) -> Result<FxHashMap<LocationId, i32>, InputError> {
    debug!("Reading climate zones from {}", path.display());

    let mut reader = csv::Reader::from_path(path)?;
    let mut zones = FxHashMap::default();

    for record in reader.deserialize() {
        let record: ClimateZoneRecord = record?;
        zones.insert(record.grid_id.trim().to_string(), record.climate_zone);
    }

    Ok(zones)
}
