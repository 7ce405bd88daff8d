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

//! Module responsible for bringing forecasts onto a common time grid.
//!
//! Two operations are available. [`align`] is a pure reindex: the forecast
//! is placed on the Cartesian product of given locations and valid times
//! and every combination absent from the input is explicitly missing.
//! No value is ever fabricated by it.
//!
//! [`resample`] moves a coarse forecast (eg. hourly) to a finer cadence
//! with linear interpolation limited by the maximum gap. Samples can be
//! shifted forward by half of the cadence first, so that a value describing
//! the hour ending at 08:00 is centred between the 15-minute boundaries.
//! After interpolation only timestamps with zero seconds are kept, which
//! drops the half-cadence helper slots.

use super::{
    configuration::Interpolation,
    series::{from_epoch_seconds, to_epoch_seconds, AlignedSeries, ForecastSeries, LocationId},
};
use crate::{
    errors::{AlignmentError, InputError},
    Float,
};
use chrono::NaiveDateTime;
use log::debug;

/// Reindexes the series onto `locations` × `valid_times`.
///
/// Values are copied only for exact matches of location and valid time,
/// all other cells are `None`. Records at valid times outside the target
/// grid and locations not listed are discarded.
pub fn align(
    series: &ForecastSeries,
    locations: &[LocationId],
    valid_times: &[NaiveDateTime],
) -> AlignedSeries {
    let mut aligned = AlignedSeries::new_missing(
        series.gen_time(),
        series.variables().to_vec(),
        locations.to_vec(),
        valid_times.to_vec(),
    );

    for (l, location) in locations.iter().enumerate() {
        let records = match series.location_records(location) {
            Some(records) => records,
            None => continue,
        };

        for (t, valid_time) in valid_times.iter().enumerate() {
            if let Some(values) = records.get(valid_time) {
                for (v, value) in values.iter().enumerate() {
                    aligned.set_value(v, l, t, *value);
                }
            }
        }
    }

    aligned
}

/// Resamples the series to the configured cadence.
///
/// For every location a working grid is laid from its first to its last
/// (shifted) sample, with the step of half of the cadence when the centre
/// shift is enabled and of the whole cadence otherwise. A slot without
/// a sample is filled by linear interpolation when it lies between two
/// known values and no further than `max_gap` seconds from the nearer one.
/// Slots before the first and after the last known value stay missing.
/// Each variable is interpolated independently.
pub fn resample(
    series: &ForecastSeries,
    interpolation: &Interpolation,
) -> Result<ForecastSeries, InputError> {
    let shift = if interpolation.centre_shift {
        interpolation.cadence / 2
    } else {
        0
    };
    let step = if interpolation.centre_shift {
        interpolation.cadence / 2
    } else {
        interpolation.cadence
    };

    let variable_count = series.variables().len();
    let mut resampled = ForecastSeries::new(series.gen_time(), series.variables().to_vec());

    for location in series.locations() {
        let records = match series.location_records(location) {
            Some(records) if !records.is_empty() => records,
            _ => continue,
        };

        let samples: Vec<(i64, &Vec<Option<Float>>)> = records
            .iter()
            .map(|(valid_time, values)| (to_epoch_seconds(*valid_time) + shift, values))
            .collect();

        let (first, last) = (samples[0].0, samples[samples.len() - 1].0);
        let slots: Vec<i64> = (0..)
            .map(|i| first + i * step)
            .take_while(|slot| *slot <= last)
            .collect();

        let mut columns = Vec::with_capacity(variable_count);

        for v in 0..variable_count {
            let known: Vec<(i64, Float)> = samples
                .iter()
                .filter_map(|(time, values)| values[v].map(|value| (*time, value)))
                .collect();

            columns.push(interpolate_column(&known, &slots, interpolation.max_gap));
        }

        for (i, slot) in slots.iter().enumerate() {
            if slot.rem_euclid(60) != 0 {
                continue;
            }

            let values = columns.iter().map(|column| column[i]).collect();
            resampled.insert(location, from_epoch_seconds(*slot)?, values)?;
        }
    }

    debug!(
        "Resampled {} records to {} records with cadence {} s",
        series.len(),
        resampled.len(),
        interpolation.cadence
    );

    Ok(resampled)
}

/// Linear interpolation of known `(time, value)` samples at given slots.
///
/// Known samples must be in ascending order of time.
fn interpolate_column(known: &[(i64, Float)], slots: &[i64], max_gap: i64) -> Vec<Option<Float>> {
    let mut result = Vec::with_capacity(slots.len());
    let mut upper = 0;

    for &slot in slots {
        while upper < known.len() && known[upper].0 < slot {
            upper += 1;
        }

        if upper < known.len() && known[upper].0 == slot {
            result.push(Some(known[upper].1));
            continue;
        }

        if upper == 0 || upper == known.len() {
            result.push(None);
            continue;
        }

        let (time_lo, value_lo) = known[upper - 1];
        let (time_hi, value_hi) = known[upper];

        if (slot - time_lo).min(time_hi - slot) > max_gap {
            result.push(None);
            continue;
        }

        let fraction = (slot - time_lo) as Float / (time_hi - time_lo) as Float;
        result.push(Some(value_lo + (value_hi - value_lo) * fraction));
    }

    result
}

/// Checks if lead times found in a series are exactly the configured ones.
///
/// Both lists are compared as ordered sets, the first difference is reported.
pub fn verify_lead_times(
    series: &'static str,
    configured: &[i64],
    found: &[i64],
) -> Result<(), AlignmentError> {
    for (&configured, &found) in configured.iter().zip(found) {
        if configured != found {
            return Err(AlignmentError::LeadTimeMismatch {
                series,
                configured,
                found,
            });
        }
    }

    if configured.len() != found.len() {
        return Err(AlignmentError::LeadTimeCount {
            series,
            expected: configured.len(),
            found: found.len(),
        });
    }

    Ok(())
}

/// Checks if all configured lead times are present in a series.
///
/// Extra lead times of the series are allowed, missing ones are reported.
pub fn verify_lead_time_coverage(
    series: &'static str,
    configured: &[i64],
    found: &[i64],
) -> Result<(), AlignmentError> {
    let missing: Vec<i64> = configured
        .iter()
        .filter(|lead_time| found.binary_search(*lead_time).is_err())
        .copied()
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(AlignmentError::UncoveredLeadTimes { series, missing })
    }
}

#[cfg(test)]
mod tests {
    use super::{
        align, interpolate_column, resample, verify_lead_time_coverage, verify_lead_times,
    };
    use crate::errors::AlignmentError;
    use crate::model::configuration::Interpolation;
    use crate::model::series::{from_epoch_seconds, ForecastSeries};
    use crate::Float;
    use float_cmp::approx_eq;

    // 2020-09-13 12:00:00 UTC
    const GEN: i64 = 1_599_998_400;

    fn at(seconds: i64) -> chrono::NaiveDateTime {
        from_epoch_seconds(GEN + seconds).unwrap()
    }

    #[test]
    fn reindex_never_fabricates() {
        let mut series = ForecastSeries::new(at(0), vec!["ghi".to_string()]);
        series.insert("A", at(3600), vec![Some(400.0)]).unwrap();
        series.insert("B", at(900), vec![Some(150.0)]).unwrap();
        series.insert("B", at(7200), vec![Some(500.0)]).unwrap();

        let locations = vec!["A".to_string(), "B".to_string(), "C".to_string()];
        let times: Vec<_> = [900, 1800, 2700, 3600].iter().map(|&s| at(s)).collect();
        let aligned = align(&series, &locations, &times);

        assert_eq!(aligned.lead_times(), vec![900, 1800, 2700, 3600]);

        for (l, location) in locations.iter().enumerate() {
            for (t, time) in times.iter().enumerate() {
                assert_eq!(aligned.value(0, l, t), series.value(location, *time, 0));
            }
        }

        assert_eq!(aligned.value(0, 0, 3), Some(400.0));
        assert_eq!(aligned.value(0, 1, 0), Some(150.0));
        assert_eq!(aligned.value(0, 1, 1), None);
        assert_eq!(aligned.value(0, 2, 0), None);
    }

    #[test]
    fn interpolation_fills_bracketed_gaps() {
        let known = [(0, 0.0), (3600, 400.0)];
        let slots: Vec<i64> = (0..=4).map(|i| i * 900).collect();

        let column = interpolate_column(&known, &slots, 3600);
        let expected = [0.0, 100.0, 200.0, 300.0, 400.0];

        for (value, expected) in column.iter().zip(expected) {
            assert!(approx_eq!(Float, value.unwrap(), expected, epsilon = 1e-9));
        }
    }

    #[test]
    fn interpolation_respects_gap_limit() {
        let known = [(0, 0.0), (7200, 800.0)];
        let slots: Vec<i64> = (0..=8).map(|i| i * 900).collect();

        let column = interpolate_column(&known, &slots, 1800);

        assert_eq!(column[0], Some(0.0));
        assert!(approx_eq!(Float, column[2].unwrap(), 200.0, epsilon = 1e-9));
        assert_eq!(column[3], None);
        assert_eq!(column[4], None);
        assert_eq!(column[5], None);
        assert!(approx_eq!(Float, column[6].unwrap(), 600.0, epsilon = 1e-9));
        assert_eq!(column[8], Some(800.0));
    }

    #[test]
    fn interpolation_does_not_extrapolate() {
        let column = interpolate_column(&[(900, 10.0)], &[0, 900, 1800], 3600);

        assert_eq!(column, vec![None, Some(10.0), None]);
    }

    #[test]
    fn centred_resampling() {
        let mut series = ForecastSeries::new(at(0), vec!["ghi".to_string()]);
        series.insert("A", at(3600), vec![Some(100.0)]).unwrap();
        series.insert("A", at(7200), vec![Some(300.0)]).unwrap();

        let resampled = resample(&series, &Interpolation::default()).unwrap();

        // samples sit at 01:07:30 and 02:07:30, helper slots are dropped
        assert_eq!(resampled.lead_times(), vec![4500, 5400, 6300, 7200]);

        let expected = [125.0, 175.0, 225.0, 275.0];
        for (lead_time, expected) in [4500, 5400, 6300, 7200].iter().zip(expected) {
            let value = resampled.value("A", at(*lead_time), 0).unwrap();
            assert!(approx_eq!(Float, value, expected, epsilon = 1e-9));
        }
    }

    #[test]
    fn plain_resampling_keeps_samples() {
        let mut series = ForecastSeries::new(at(0), vec!["ghi".to_string(), "T2".to_string()]);
        series.insert("A", at(0), vec![Some(0.0), Some(280.0)]).unwrap();
        series.insert("A", at(3600), vec![Some(400.0), None]).unwrap();

        let interpolation = Interpolation {
            cadence: 900,
            max_gap: 3600,
            centre_shift: false,
        };
        let resampled = resample(&series, &interpolation).unwrap();

        assert_eq!(resampled.lead_times(), vec![0, 900, 1800, 2700, 3600]);
        assert_eq!(resampled.value("A", at(3600), 0), Some(400.0));
        assert_eq!(resampled.value("A", at(0), 1), Some(280.0));
        assert_eq!(resampled.value("A", at(1800), 1), None);
    }

    #[test]
    fn lead_time_verification() {
        assert!(verify_lead_times("point", &[900, 1800], &[900, 1800]).is_ok());

        assert!(matches!(
            verify_lead_times("point", &[900, 1800], &[900, 2700]),
            Err(AlignmentError::LeadTimeMismatch {
                configured: 1800,
                found: 2700,
                ..
            })
        ));

        assert!(matches!(
            verify_lead_times("nwp", &[900, 1800], &[900]),
            Err(AlignmentError::LeadTimeCount {
                expected: 2,
                found: 1,
                ..
            })
        ));
    }

    #[test]
    fn coverage_allows_extra_lead_times() {
        assert!(verify_lead_time_coverage("model B", &[900, 1800], &[0, 900, 1800, 2700]).is_ok());

        match verify_lead_time_coverage("model B", &[900, 1800, 2700], &[0, 900]) {
            Err(AlignmentError::UncoveredLeadTimes { missing, .. }) => {
                assert_eq!(missing, vec![1800, 2700])
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }
}
