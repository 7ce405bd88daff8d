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

//! Module with the forecast tables handled by the blending system.
//!
//! Forecasts enter as sparse [`ForecastSeries`], keyed by location
//! and valid time, exactly as they were read. Before blending each
//! source is aligned onto a common grid of locations and valid times,
//! giving a dense [`AlignedSeries`] in which every combination exists
//! and absent values are explicitly `None`.

use crate::{errors::InputError, Float};
use chrono::NaiveDateTime;
use ndarray::{s, Array2, Array3, ArrayView1, ArrayView2, Axis};
use rustc_hash::FxHashMap;
use std::collections::{BTreeMap, BTreeSet};

/// Identifier of a grid point or point forecast site.
pub type LocationId = String;

/// Converts seconds since 1970-01-01 UTC into a datetime.
pub fn from_epoch_seconds(seconds: i64) -> Result<NaiveDateTime, InputError> {
    NaiveDateTime::from_timestamp_opt(seconds, 0).ok_or(InputError::InvalidTimestamp(seconds))
}

/// Converts a datetime into seconds since 1970-01-01 UTC.
pub fn to_epoch_seconds(datetime: NaiveDateTime) -> i64 {
    datetime.timestamp()
}

/// Static description of a location.
#[derive(Clone, PartialEq, Debug)]
pub struct LocationMeta {
    pub id: LocationId,
    pub latitude: Float,
    pub longitude: Float,
    pub climate_zone: Option<i32>,
}

/// Sparse forecast table as read from one input file.
///
/// Every record holds the values of all forecast variables
/// for one location and valid time. The generation time
/// is shared by all records.
#[derive(Clone, PartialEq, Debug)]
pub struct ForecastSeries {
    gen_time: NaiveDateTime,
    variables: Vec<String>,
    locations: Vec<LocationId>,
    records: FxHashMap<LocationId, BTreeMap<NaiveDateTime, Vec<Option<Float>>>>,
}

impl ForecastSeries {
    pub fn new(gen_time: NaiveDateTime, variables: Vec<String>) -> Self {
        ForecastSeries {
            gen_time,
            variables,
            locations: vec![],
            records: FxHashMap::default(),
        }
    }

    /// Adds a record, refusing a second record for the same location and time.
    pub fn insert(
        &mut self,
        location: &str,
        valid_time: NaiveDateTime,
        values: Vec<Option<Float>>,
    ) -> Result<(), InputError> {
        if values.len() != self.variables.len() {
            return Err(InputError::RecordWidth {
                expected: self.variables.len(),
                found: values.len(),
            });
        }

        if !self.records.contains_key(location) {
            self.locations.push(location.to_string());
        }

        let location_records = self.records.entry(location.to_string()).or_default();

        if location_records.contains_key(&valid_time) {
            return Err(InputError::DuplicateRecord {
                location: location.to_string(),
                valid_time,
            });
        }

        location_records.insert(valid_time, values);

        Ok(())
    }

    pub fn gen_time(&self) -> NaiveDateTime {
        self.gen_time
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    /// Locations in order of their first appearance.
    pub fn locations(&self) -> &[LocationId] {
        &self.locations
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    /// Records of one location ordered by valid time.
    pub fn location_records(
        &self,
        location: &str,
    ) -> Option<&BTreeMap<NaiveDateTime, Vec<Option<Float>>>> {
        self.records.get(location)
    }

    #[cfg(test)]
    pub fn value(
        &self,
        location: &str,
        valid_time: NaiveDateTime,
        variable: usize,
    ) -> Option<Float> {
        self.records
            .get(location)?
            .get(&valid_time)?
            .get(variable)
            .copied()
            .flatten()
    }

    /// All distinct valid times in ascending order.
    pub fn valid_times(&self) -> Vec<NaiveDateTime> {
        self.records
            .values()
            .flat_map(|records| records.keys().copied())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect()
    }

    /// Lead times (in seconds) of all distinct valid times.
    pub fn lead_times(&self) -> Vec<i64> {
        self.valid_times()
            .into_iter()
            .map(|t| (t - self.gen_time).num_seconds())
            .collect()
    }

    /// Drops records for which the predicate on valid time is false.
    /// Locations are kept even when all their records are dropped.
    pub fn retain_valid_times<F: Fn(NaiveDateTime) -> bool>(&mut self, keep: F) {
        for records in self.records.values_mut() {
            records.retain(|valid_time, _| keep(*valid_time));
        }
    }

    /// Sets to missing all values of a variable for which the predicate is false.
    ///
    /// Returns the number of values that were removed.
    pub fn retain_values<F: Fn(Float) -> bool>(&mut self, variable: usize, keep: F) -> usize {
        let mut removed = 0;

        for values in self.records.values_mut().flat_map(BTreeMap::values_mut) {
            if let Some(value) = values[variable] {
                if !keep(value) {
                    values[variable] = None;
                    removed += 1;
                }
            }
        }

        removed
    }

    /// New series with selected variables, each renamed as given in `(source, target)`.
    pub fn select(&self, columns: &[(String, String)]) -> Result<ForecastSeries, InputError> {
        let indices = columns
            .iter()
            .map(|(source, _)| {
                self.variable_index(source)
                    .ok_or_else(|| InputError::MissingVariable(source.clone()))
            })
            .collect::<Result<Vec<usize>, InputError>>()?;

        let records = self
            .records
            .iter()
            .map(|(location, records)| {
                let selected = records
                    .iter()
                    .map(|(valid_time, values)| {
                        (*valid_time, indices.iter().map(|&i| values[i]).collect())
                    })
                    .collect();
                (location.clone(), selected)
            })
            .collect();

        Ok(ForecastSeries {
            gen_time: self.gen_time,
            variables: columns.iter().map(|(_, target)| target.clone()).collect(),
            locations: self.locations.clone(),
            records,
        })
    }

    /// Number of records.
    pub fn len(&self) -> usize {
        self.records.values().map(BTreeMap::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Dense forecast table on a grid of locations and valid times.
///
/// Values are stored in a 3D array indexed by
/// (variable, location, valid time). Valid times are
/// kept in ascending order.
#[derive(Clone, PartialEq, Debug)]
pub struct AlignedSeries {
    gen_time: NaiveDateTime,
    variables: Vec<String>,
    locations: Vec<LocationId>,
    location_index: FxHashMap<LocationId, usize>,
    valid_times: Vec<NaiveDateTime>,
    data: Array3<Option<Float>>,
}

/// Blended forecast, sharing the layout of aligned inputs.
pub type BlendedSeries = AlignedSeries;

impl AlignedSeries {
    /// Series with every value missing.
    pub fn new_missing(
        gen_time: NaiveDateTime,
        variables: Vec<String>,
        locations: Vec<LocationId>,
        valid_times: Vec<NaiveDateTime>,
    ) -> Self {
        let data = Array3::from_elem((variables.len(), locations.len(), valid_times.len()), None);

        Self::from_parts(gen_time, variables, locations, valid_times, data)
    }

    /// Series assembled from named fields of shape (location, valid time).
    ///
    /// All fields must share the shape given by `locations` and `valid_times`.
    pub fn from_fields(
        gen_time: NaiveDateTime,
        locations: Vec<LocationId>,
        valid_times: Vec<NaiveDateTime>,
        fields: Vec<(String, Array2<Option<Float>>)>,
    ) -> Self {
        let variables = fields.iter().map(|(name, _)| name.clone()).collect();
        let mut data = Array3::from_elem((fields.len(), locations.len(), valid_times.len()), None);

        for (i, (_, field)) in fields.iter().enumerate() {
            data.index_axis_mut(Axis(0), i).assign(field);
        }

        Self::from_parts(gen_time, variables, locations, valid_times, data)
    }

    fn from_parts(
        gen_time: NaiveDateTime,
        variables: Vec<String>,
        locations: Vec<LocationId>,
        valid_times: Vec<NaiveDateTime>,
        data: Array3<Option<Float>>,
    ) -> Self {
        let location_index = locations
            .iter()
            .enumerate()
            .map(|(i, location)| (location.clone(), i))
            .collect();

        AlignedSeries {
            gen_time,
            variables,
            locations,
            location_index,
            valid_times,
            data,
        }
    }

    pub fn gen_time(&self) -> NaiveDateTime {
        self.gen_time
    }

    pub fn variables(&self) -> &[String] {
        &self.variables
    }

    pub fn locations(&self) -> &[LocationId] {
        &self.locations
    }

    pub fn valid_times(&self) -> &[NaiveDateTime] {
        &self.valid_times
    }

    pub fn variable_index(&self, name: &str) -> Option<usize> {
        self.variables.iter().position(|v| v == name)
    }

    pub fn location_index(&self, location: &str) -> Option<usize> {
        self.location_index.get(location).copied()
    }

    pub fn value(&self, variable: usize, location: usize, time: usize) -> Option<Float> {
        self.data[[variable, location, time]]
    }

    pub fn set_value(
        &mut self,
        variable: usize,
        location: usize,
        time: usize,
        value: Option<Float>,
    ) {
        self.data[[variable, location, time]] = value;
    }

    /// Values of one variable at all locations and valid times.
    pub fn field(&self, variable: usize) -> ArrayView2<Option<Float>> {
        self.data.index_axis(Axis(0), variable)
    }

    /// Values of one variable at one location for all valid times.
    pub fn location_row(&self, variable: usize, location: usize) -> ArrayView1<Option<Float>> {
        self.data.slice(s![variable, location, ..])
    }

    /// Replaces values of one variable at one location.
    pub fn set_location_row(&mut self, variable: usize, location: usize, row: &[Option<Float>]) {
        for (slot, value) in self
            .data
            .slice_mut(s![variable, location, ..])
            .iter_mut()
            .zip(row)
        {
            *slot = *value;
        }
    }

    /// Lead time (in seconds) of the valid time with given index.
    pub fn lead_time(&self, time: usize) -> i64 {
        (self.valid_times[time] - self.gen_time).num_seconds()
    }

    pub fn lead_times(&self) -> Vec<i64> {
        (0..self.valid_times.len()).map(|t| self.lead_time(t)).collect()
    }

    /// Keeps only valid times strictly after given datetime.
    pub fn after(self, datetime: NaiveDateTime) -> Self {
        let kept: Vec<usize> = (0..self.valid_times.len())
            .filter(|&t| self.valid_times[t] > datetime)
            .collect();

        let valid_times = kept.iter().map(|&t| self.valid_times[t]).collect();
        let data = self.data.select(Axis(2), &kept);

        Self::from_parts(self.gen_time, self.variables, self.locations, valid_times, data)
    }

    /// Same series issued at a different generation time.
    pub fn with_gen_time(mut self, gen_time: NaiveDateTime) -> Self {
        self.gen_time = gen_time;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::{from_epoch_seconds, AlignedSeries, ForecastSeries};
    use crate::errors::InputError;
    use ndarray::Array2;

    fn series() -> ForecastSeries {
        let gen = from_epoch_seconds(1_600_000_000).unwrap();
        let mut series = ForecastSeries::new(gen, vec!["ghi".to_string(), "T2".to_string()]);

        series
            .insert(
                "0010020",
                from_epoch_seconds(1_600_003_600).unwrap(),
                vec![Some(300.0), Some(290.5)],
            )
            .unwrap();
        series
            .insert("0010020", from_epoch_seconds(1_600_000_900).unwrap(), vec![Some(120.0), None])
            .unwrap();
        series
            .insert("0020020", from_epoch_seconds(1_600_000_900).unwrap(), vec![None, Some(288.0)])
            .unwrap();

        series
    }

    #[test]
    fn sparse_lookups() {
        let series = series();

        assert_eq!(series.len(), 3);
        assert_eq!(series.locations(), ["0010020", "0020020"]);
        assert_eq!(series.lead_times(), vec![900, 3600]);
        assert_eq!(
            series.value("0010020", from_epoch_seconds(1_600_003_600).unwrap(), 1),
            Some(290.5)
        );
        assert_eq!(series.value("0020020", from_epoch_seconds(1_600_000_900).unwrap(), 0), None);
        assert_eq!(series.value("0030020", from_epoch_seconds(1_600_000_900).unwrap(), 0), None);
    }

    #[test]
    fn duplicate_records_are_refused() {
        let mut series = series();

        let result = series.insert(
            "0010020",
            from_epoch_seconds(1_600_000_900).unwrap(),
            vec![Some(1.0), Some(2.0)],
        );
        assert!(matches!(result, Err(InputError::DuplicateRecord { .. })));

        let result = series.insert(
            "0010020",
            from_epoch_seconds(1_600_001_800).unwrap(),
            vec![Some(1.0)],
        );
        assert!(matches!(result, Err(InputError::RecordWidth { expected: 2, found: 1 })));
    }

    #[test]
    fn implausible_values_removed() {
        let mut series = series();

        assert_eq!(series.retain_values(1, |t| t < 290.0), 1);
        assert_eq!(
            series.value("0010020", from_epoch_seconds(1_600_003_600).unwrap(), 1),
            None
        );
        assert_eq!(
            series.value("0020020", from_epoch_seconds(1_600_000_900).unwrap(), 1),
            Some(288.0)
        );
    }

    #[test]
    fn select_renames_columns() {
        let selected = series()
            .select(&[("T2".to_string(), "temperature".to_string())])
            .unwrap();

        assert_eq!(selected.variables(), ["temperature"]);
        assert_eq!(
            selected.value("0020020", from_epoch_seconds(1_600_000_900).unwrap(), 0),
            Some(288.0)
        );
        assert!(matches!(
            series().select(&[("RH".to_string(), "RH".to_string())]),
            Err(InputError::MissingVariable(_))
        ));
    }

    #[test]
    fn dense_series_filtering() {
        let gen = from_epoch_seconds(0).unwrap();
        let times: Vec<_> = [0, 900, 1800]
            .iter()
            .map(|&s| from_epoch_seconds(s).unwrap())
            .collect();
        let field = Array2::from_shape_vec((1, 3), vec![Some(1.0), None, Some(3.0)]).unwrap();

        let series = AlignedSeries::from_fields(
            gen,
            vec!["a".to_string()],
            times,
            vec![("ghi".to_string(), field)],
        );
        assert_eq!(series.lead_times(), vec![0, 900, 1800]);

        let series = series.after(gen);
        assert_eq!(series.lead_times(), vec![900, 1800]);
        assert_eq!(series.value(0, 0, 0), None);
        assert_eq!(series.value(0, 0, 1), Some(3.0));
        assert_eq!(series.location_index("a"), Some(0));
    }
}
