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

//! Module responsible for time-ending hourly averages of blended forecast.
//!
//! Every valid time belongs to the hourly bucket ending at the nearest
//! full hour not earlier than it, so the bucket labelled 13:00 holds
//! samples from `(12:00, 13:00]`. The hourly value is the mean of
//! non-missing samples of the bucket.
//!
//! A bucket with fewer samples than configured is incomplete and is
//! either dropped or kept with its sample count reported.

use super::{
    configuration::{Aggregation, IncompleteBuckets},
    series::{from_epoch_seconds, to_epoch_seconds, AlignedSeries},
};
use crate::{constants::HOUR, errors::InputError, Float};
use log::debug;
use ndarray::Array2;
use std::collections::BTreeMap;

/// Hourly averaged forecast.
#[derive(Clone, PartialEq, Debug)]
pub struct HourlySeries {
    pub series: AlignedSeries,

    /// Number of samples in each bucket, present when
    /// incomplete buckets are flagged instead of dropped.
    pub samples: Option<Vec<usize>>,
}

/// End (in seconds since epoch) of the hourly bucket holding given time.
fn bucket_end(seconds: i64) -> i64 {
    (seconds + HOUR - 1).div_euclid(HOUR) * HOUR
}

/// Averages the series into time-ending hourly buckets.
pub fn hourly_average(
    series: &AlignedSeries,
    config: &Aggregation,
) -> Result<HourlySeries, InputError> {
    let mut buckets: BTreeMap<i64, Vec<usize>> = BTreeMap::new();

    for (t, valid_time) in series.valid_times().iter().enumerate() {
        buckets
            .entry(bucket_end(to_epoch_seconds(*valid_time)))
            .or_default()
            .push(t);
    }

    let total = buckets.len();
    buckets.retain(|_, members| {
        members.len() >= config.min_samples || config.incomplete == IncompleteBuckets::Flag
    });

    debug!(
        "Averaging {} valid times into {} hourly buckets ({} dropped as incomplete)",
        series.valid_times().len(),
        buckets.len(),
        total - buckets.len()
    );

    let valid_times = buckets
        .keys()
        .map(|end| from_epoch_seconds(*end))
        .collect::<Result<Vec<_>, _>>()?;

    let shape = (series.locations().len(), buckets.len());
    let mut fields = Vec::with_capacity(series.variables().len());

    for (v, variable) in series.variables().iter().enumerate() {
        let source = series.field(v);
        let mut field = Array2::from_elem(shape, None);

        for (b, members) in buckets.values().enumerate() {
            for l in 0..shape.0 {
                let present: Vec<Float> = members.iter().filter_map(|&t| source[[l, t]]).collect();

                if !present.is_empty() {
                    field[[l, b]] = Some(present.iter().sum::<Float>() / present.len() as Float);
                }
            }
        }

        fields.push((variable.clone(), field));
    }

    let samples = match config.incomplete {
        IncompleteBuckets::Flag => Some(buckets.values().map(Vec::len).collect()),
        IncompleteBuckets::Drop => None,
    };

    Ok(HourlySeries {
        series: AlignedSeries::from_fields(
            series.gen_time(),
            series.locations().to_vec(),
            valid_times,
            fields,
        ),
        samples,
    })
}
