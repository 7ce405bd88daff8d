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

//! Module with the blending weight tables.
//!
//! Two kinds of weights steer the blend. Lead-time weights are
//! a discrete table of weight pairs, one pair for every lead time
//! of the forecast cycle. Spatial weights form a piecewise-linear
//! curve of distance, describing how much the point forecast can be
//! trusted at a grid point of given distance from the nearest site.
//!
//! Both tables are validated when constructed, so a table that exists
//! is always consistent.

use super::bisection;
use crate::{
    errors::{ConfigError, RangeError},
    Float,
};
use serde::Deserialize;
use std::collections::BTreeMap;

/// Lead-time indexed pairs of blending weights.
///
/// The first weight of each pair applies to the first source
/// (the gridded forecast, or model A), the second weight to the
/// second source (the point forecast, or model B). Every pair
/// sums to exactly `1.0`.
#[derive(Clone, PartialEq, Debug)]
pub struct LeadTimeWeightTable {
    weights: BTreeMap<i64, (Float, Float)>,
}

impl LeadTimeWeightTable {
    /// Builds the table from its configuration form,
    /// with lead times (in seconds) stored as strings.
    pub fn new(raw: &BTreeMap<String, Vec<Float>>) -> Result<Self, ConfigError> {
        let mut weights = BTreeMap::new();

        for (key, pair) in raw {
            let lead_time = key
                .trim()
                .parse::<i64>()
                .map_err(|_| ConfigError::InvalidLeadTime(key.clone()))?;

            if pair.len() != 2 {
                return Err(ConfigError::WeightCount {
                    lead_time,
                    count: pair.len(),
                });
            }

            weights.insert(lead_time, (pair[0], pair[1]));
        }

        Self::from_pairs(weights)
    }

    /// Builds the table from already typed lead times and weight pairs.
    pub fn from_pairs(weights: BTreeMap<i64, (Float, Float)>) -> Result<Self, ConfigError> {
        if weights.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "Lead-time weight table cannot be empty",
            ));
        }

        for (&lead_time, &(first, second)) in &weights {
            for weight in [first, second] {
                if !(0.0..=1.0).contains(&weight) {
                    return Err(ConfigError::WeightOutOfRange(weight));
                }
            }

            if first + second != 1.0 {
                return Err(ConfigError::WeightSum {
                    lead_time,
                    sum: first + second,
                });
            }
        }

        Ok(LeadTimeWeightTable { weights })
    }

    /// Weight pair for the given lead time (in seconds).
    ///
    /// Lead times are discrete steps of the forecast cycle,
    /// so there is no interpolation between them.
    pub fn lead_time_weights(&self, lead_time: i64) -> Result<(Float, Float), ConfigError> {
        self.weights
            .get(&lead_time)
            .copied()
            .ok_or(ConfigError::UnknownLeadTime(lead_time))
    }

    /// Lead times of the table in ascending order.
    pub fn lead_times(&self) -> Vec<i64> {
        self.weights.keys().copied().collect()
    }
}

/// Policy for distances outside the spatial weight curve.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutOfRangeDistance {
    /// Distance outside the curve is an error.
    Reject,
    /// Distance outside the curve gets the weight of the nearest curve end.
    Clamp,
}

impl Default for OutOfRangeDistance {
    fn default() -> Self {
        OutOfRangeDistance::Reject
    }
}

/// Piecewise-linear curve of spatial weight against distance (in km).
#[derive(Clone, PartialEq, Debug)]
pub struct SpatialWeightCurve {
    distances: Vec<Float>,
    weights: Vec<Float>,
    out_of_range: OutOfRangeDistance,
}

impl SpatialWeightCurve {
    /// Builds the curve from `(distance, weight)` knots.
    ///
    /// Distances must be strictly increasing, weights must lie in `[0, 1]`.
    pub fn new(
        knots: &[(Float, Float)],
        out_of_range: OutOfRangeDistance,
    ) -> Result<Self, ConfigError> {
        if knots.len() < 2 {
            return Err(ConfigError::TooFewKnots(knots.len()));
        }

        for (i, &(distance, weight)) in knots.iter().enumerate() {
            if !distance.is_finite() {
                return Err(ConfigError::OutOfBounds(
                    "Spatial weight distances must be finite",
                ));
            }

            if !(0.0..=1.0).contains(&weight) {
                return Err(ConfigError::WeightOutOfRange(weight));
            }

            if i > 0 && distance <= knots[i - 1].0 {
                return Err(ConfigError::NonIncreasingDistance {
                    previous: knots[i - 1].0,
                    current: distance,
                });
            }
        }

        Ok(SpatialWeightCurve {
            distances: knots.iter().map(|knot| knot.0).collect(),
            weights: knots.iter().map(|knot| knot.1).collect(),
            out_of_range,
        })
    }

    /// Interpolates the weight at given distance (in km)
    /// linearly between the bracketing knots.
    pub fn spatial_weight(&self, distance: Float) -> Result<Float, RangeError> {
        let (min, max) = self.domain();
        let last = self.distances.len() - 1;

        if !(min..=max).contains(&distance) {
            return match self.out_of_range {
                OutOfRangeDistance::Clamp if distance < min => Ok(self.weights[0]),
                OutOfRangeDistance::Clamp if distance > max => Ok(self.weights[last]),
                _ => Err(RangeError::OutsideCurve { distance, min, max }),
            };
        }

        let lo = bisection::find_left_closest(&self.distances, &distance)
            .map_err(|_| RangeError::OutsideCurve { distance, min, max })?;

        if lo == last {
            return Ok(self.weights[last]);
        }

        let (dist_lo, weight_lo) = (self.distances[lo], self.weights[lo]);
        let (dist_hi, weight_hi) = (self.distances[lo + 1], self.weights[lo + 1]);
        let slope = (weight_hi - weight_lo) / (dist_hi - dist_lo);

        Ok(weight_lo + (distance - dist_lo) * slope)
    }

    /// Smallest and largest distance covered by the curve.
    pub fn domain(&self) -> (Float, Float) {
        (self.distances[0], self.distances[self.distances.len() - 1])
    }
}
