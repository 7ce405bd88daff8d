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

//! Module responsible for combining point forecasts
//! of sites surrounding a grid point.
//!
//! Each grid point that needs blending has a list of nearby
//! sites ordered by distance. Point forecasts of those sites
//! are merged into a single value with weights falling with
//! the inverse of distance (not its square), relative to the
//! distance of the nearest site.

use crate::{errors::InputError, model::series::LocationId, Float};
use float_cmp::approx_eq;
use rustc_hash::FxHashMap;
use serde::Deserialize;

/// Sites surrounding one grid point, nearest first.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct Neighbours {
    #[serde(rename = "ObsSites")]
    pub sites: Vec<LocationId>,

    #[serde(rename = "ObsDistance")]
    pub distances: Vec<Float>,
}

impl Neighbours {
    /// Checks if the site list can be used for blending.
    pub fn check(&self, grid: &str) -> Result<(), InputError> {
        let invalid = |reason| InputError::InvalidSiteMap {
            grid: grid.to_string(),
            reason,
        };

        if self.sites.is_empty() {
            return Err(invalid("no sites listed"));
        }

        if self.sites.len() != self.distances.len() {
            return Err(invalid("sites and distances differ in length"));
        }

        if self.distances.iter().any(|d| !d.is_finite() || *d < 0.0) {
            return Err(invalid("distances must be finite and non-negative"));
        }

        if self.distances.windows(2).any(|pair| pair[1] < pair[0]) {
            return Err(invalid("sites must be ordered by increasing distance"));
        }

        Ok(())
    }

    /// Distance (in km) to the nearest site.
    pub fn nearest_distance(&self) -> Float {
        self.distances[0]
    }
}

/// Static mapping from grid point to its nearby sites.
///
/// Grid points absent from the map are not blended.
pub type GridToPointMap = FxHashMap<LocationId, Neighbours>;

/// Normalised weights of sites at given distances.
///
/// Distances are divided by the smallest one and inverted,
/// then the inverted values are scaled to sum to one.
/// A site at zero distance takes the whole weight
/// (shared equally when several sites are co-located).
pub fn site_weights(distances: &[Float]) -> Vec<Float> {
    if distances.len() <= 1 {
        return vec![1.0; distances.len()];
    }

    let min_distance = distances.iter().copied().fold(Float::INFINITY, Float::min);

    if approx_eq!(Float, min_distance, 0.0, ulps = 2) {
        let colocated = distances
            .iter()
            .filter(|d| approx_eq!(Float, **d, 0.0, ulps = 2))
            .count();

        return distances
            .iter()
            .map(|d| {
                if approx_eq!(Float, *d, 0.0, ulps = 2) {
                    1.0 / colocated as Float
                } else {
                    0.0
                }
            })
            .collect();
    }

    let inverted: Vec<Float> = distances.iter().map(|d| 1.0 / (d / min_distance)).collect();
    let total: Float = inverted.iter().sum();

    inverted.iter().map(|w| w / total).collect()
}

/// Distance-weighted value of the point forecasts of nearby sites.
///
/// Sites with missing values are left out and the weights
/// are recomputed over the remaining ones. Returns `None`
/// when no site has a value.
pub fn blend_site_value(values: &[Option<Float>], distances: &[Float]) -> Option<Float> {
    let (present, present_distances): (Vec<Float>, Vec<Float>) = values
        .iter()
        .zip(distances)
        .filter_map(|(value, distance)| value.map(|v| (v, *distance)))
        .unzip();

    if present.is_empty() {
        return None;
    }

    let weights = site_weights(&present_distances);

    Some(present.iter().zip(&weights).map(|(v, w)| v * w).sum())
}

#[cfg(test)]
mod tests {
    use super::{blend_site_value, site_weights, Neighbours};
    use crate::Float;
    use float_cmp::approx_eq;

    #[test]
    fn single_site_takes_all_weight() {
        assert_eq!(site_weights(&[7.3]), vec![1.0]);
    }

    #[test]
    fn equal_distances_share_weight() {
        assert_eq!(site_weights(&[3.0, 3.0]), vec![0.5, 0.5]);
    }

    #[test]
    fn inverse_distance_weights() {
        let weights = site_weights(&[2.0, 4.0]);

        assert!(approx_eq!(Float, weights[0], 2.0 / 3.0, epsilon = 1e-12));
        assert!(approx_eq!(Float, weights[1], 1.0 / 3.0, epsilon = 1e-12));

        let blended = blend_site_value(&[Some(100.0), Some(50.0)], &[2.0, 4.0]).unwrap();
        assert!(approx_eq!(Float, blended, 250.0 / 3.0, epsilon = 1e-9));
    }

    #[test]
    fn colocated_site_takes_all_weight() {
        assert_eq!(site_weights(&[0.0, 2.0, 5.0]), vec![1.0, 0.0, 0.0]);
        assert_eq!(site_weights(&[0.0, 0.0, 5.0]), vec![0.5, 0.5, 0.0]);
    }

    #[test]
    fn missing_sites_are_renormalised() {
        let blended = blend_site_value(&[None, Some(50.0), Some(80.0)], &[1.0, 4.0, 4.0]);
        assert!(approx_eq!(Float, blended.unwrap(), 65.0, epsilon = 1e-9));

        assert_eq!(blend_site_value(&[None, None], &[1.0, 2.0]), None);
    }

    #[test]
    fn neighbours_check() {
        let valid = Neighbours {
            sites: vec!["ALBA".to_string(), "BUFF".to_string()],
            distances: vec![2.0, 4.5],
        };
        assert!(valid.check("0010020").is_ok());
        assert!(approx_eq!(Float, valid.nearest_distance(), 2.0));

        let unordered = Neighbours {
            sites: vec!["ALBA".to_string(), "BUFF".to_string()],
            distances: vec![4.5, 2.0],
        };
        assert!(unordered.check("0010020").is_err());

        let uneven = Neighbours {
            sites: vec!["ALBA".to_string()],
            distances: vec![2.0, 4.5],
        };
        assert!(uneven.check("0010020").is_err());
    }
}
