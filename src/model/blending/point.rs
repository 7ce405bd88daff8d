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

//! Blend of gridded NWP forecast with point statcast forecast.
//!
//! For every grid point listed in the grid-to-point map the point forecasts
//! of nearby sites are first merged into one value with inverse-distance
//! weights. Then the trust in that value is set from the distance to
//! the nearest site (spatial confidence) and from the lead time:
//!
//! ```text
//! point_weight = lead_time_point_weight * spatial_confidence
//! grid_weight  = 1 - point_weight
//! blended      = grid * grid_weight + point * point_weight
//! ```
//!
//! Grid points absent from the map keep the NWP value. Other variables of
//! the NWP forecast pass through unmodified.

use super::{blend_values, run_jobs, BlendStats};
use crate::{
    errors::BlendError,
    model::{
        configuration::PointBlend,
        series::{AlignedSeries, BlendedSeries},
        spatial::{blend_site_value, GridToPointMap},
        weights::SpatialWeightCurve,
    },
    Float,
};
use log::{debug, info};
use rayon::ThreadPool;
use std::sync::Arc;

/// Values needed to blend one grid point.
struct PointTask {
    grid_row: Vec<Option<Float>>,
    neighbours: Option<SiteRows>,
}

/// Point forecasts of sites surrounding a grid point, nearest first.
struct SiteRows {
    rows: Vec<Vec<Option<Float>>>,
    distances: Vec<Float>,
    nearest: Float,
}

/// Blends the NWP forecast with the point forecast.
///
/// Both series must share valid times and their lead times must be
/// measured from the same generation time (the point forecast one).
pub fn blend_with_points(
    mut nwp: AlignedSeries,
    point: &AlignedSeries,
    site_map: &GridToPointMap,
    config: &PointBlend,
    threadpool: &ThreadPool,
) -> Result<BlendedSeries, BlendError> {
    let variable = nwp
        .variable_index(&config.variable)
        .ok_or_else(|| BlendError::MissingVariable {
            variable: config.variable.clone(),
            series: "NWP",
        })?;
    let point_variable = point
        .variable_index(&config.variable)
        .ok_or_else(|| BlendError::MissingVariable {
            variable: config.variable.clone(),
            series: "point",
        })?;

    let point_weights = nwp
        .lead_times()
        .into_iter()
        .map(|lead_time| Ok(config.lead_time_weights.lead_time_weights(lead_time)?.1))
        .collect::<Result<Vec<Float>, BlendError>>()?;

    let tasks = prepare_tasks(&nwp, variable, point, point_variable, site_map);
    let blended_count = tasks.iter().filter(|t| t.neighbours.is_some()).count();

    info!(
        "Blending {} of {} grid points with point forecast",
        blended_count,
        tasks.len()
    );

    let tasks = Arc::new(tasks);
    let point_weights = Arc::new(point_weights);
    let curve = Arc::new(config.spatial_weights.clone());

    let results = run_jobs(
        threadpool,
        tasks.len(),
        "Blended grid points",
        move |location| blend_location(&tasks[location], &point_weights, &curve),
    )?;

    let mut stats = BlendStats::default();

    for (location, (row, location_stats)) in results.into_iter().enumerate() {
        nwp.set_location_row(variable, location, &row);
        stats += location_stats;
    }

    stats.log("Point blend");

    Ok(nwp)
}

/// Gathers per grid point rows of the blended variable.
fn prepare_tasks(
    nwp: &AlignedSeries,
    variable: usize,
    point: &AlignedSeries,
    point_variable: usize,
    site_map: &GridToPointMap,
) -> Vec<PointTask> {
    let empty_row = vec![None; nwp.valid_times().len()];
    let mut unknown_sites = 0;

    let tasks = nwp
        .locations()
        .iter()
        .enumerate()
        .map(|(l, location)| {
            let grid_row = nwp.location_row(variable, l).to_vec();

            let neighbours = site_map.get(location).map(|neighbours| {
                let rows = neighbours
                    .sites
                    .iter()
                    .map(|site| match point.location_index(site) {
                        Some(s) => point.location_row(point_variable, s).to_vec(),
                        None => {
                            unknown_sites += 1;
                            empty_row.clone()
                        }
                    })
                    .collect();

                SiteRows {
                    rows,
                    distances: neighbours.distances.clone(),
                    nearest: neighbours.nearest_distance(),
                }
            });

            PointTask {
                grid_row,
                neighbours,
            }
        })
        .collect();

    if unknown_sites > 0 {
        debug!(
            "{} references to sites without point forecast, treated as missing",
            unknown_sites
        );
    }

    tasks
}

/// Blended row of one grid point.
fn blend_location(
    task: &PointTask,
    point_weights: &[Float],
    curve: &SpatialWeightCurve,
) -> Result<(Vec<Option<Float>>, BlendStats), BlendError> {
    let mut stats = BlendStats::default();

    let neighbours = match &task.neighbours {
        Some(neighbours) => neighbours,
        None => return Ok((task.grid_row.clone(), stats)),
    };

    let spatial_confidence = curve.spatial_weight(neighbours.nearest)?;

    let row = task
        .grid_row
        .iter()
        .enumerate()
        .map(|(t, grid_value)| {
            let site_values: Vec<Option<Float>> =
                neighbours.rows.iter().map(|row| row[t]).collect();
            let point_value = blend_site_value(&site_values, &neighbours.distances);

            let point_weight = point_weights[t] * spatial_confidence;

            blend_values(
                *grid_value,
                point_value,
                (1.0 - point_weight, point_weight),
                &mut stats,
            )
        })
        .collect();

    Ok((row, stats))
}

#[cfg(test)]
mod tests {
    use super::blend_with_points;
    use crate::errors::{BlendError, RangeError};
    use crate::model::configuration::Config;
    use crate::model::series::{from_epoch_seconds, AlignedSeries};
    use crate::model::spatial::{GridToPointMap, Neighbours};
    use crate::Float;
    use float_cmp::approx_eq;
    use ndarray::Array2;
    use rayon::{ThreadPool, ThreadPoolBuilder};

    const GEN: i64 = 1_599_998_400;

    fn config() -> Config {
        Config::new_from_slice(
            br#"{"point_blend": {
                "lead_time_blending_weights": {"900": [0.7, 0.3], "1800": [0.0, 1.0]},
                "spatial_blending_weights": [[1, 0.9], [10, 0.1]]}}"#,
        )
        .unwrap()
    }

    fn threadpool() -> ThreadPool {
        ThreadPoolBuilder::new().num_threads(2).build().unwrap()
    }

    fn series(locations: &[&str], fields: Vec<(&str, Vec<Option<Float>>)>) -> AlignedSeries {
        let times = vec![
            from_epoch_seconds(GEN + 900).unwrap(),
            from_epoch_seconds(GEN + 1800).unwrap(),
        ];

        let fields = fields
            .into_iter()
            .map(|(name, values)| {
                (
                    name.to_string(),
                    Array2::from_shape_vec((locations.len(), 2), values).unwrap(),
                )
            })
            .collect();

        AlignedSeries::from_fields(
            from_epoch_seconds(GEN).unwrap(),
            locations.iter().map(|l| l.to_string()).collect(),
            times,
            fields,
        )
    }

    fn site_map(grid: &str, sites: &[&str], distances: &[Float]) -> GridToPointMap {
        let mut map = GridToPointMap::default();
        map.insert(
            grid.to_string(),
            Neighbours {
                sites: sites.iter().map(|s| s.to_string()).collect(),
                distances: distances.to_vec(),
            },
        );
        map
    }

    #[test]
    fn lead_time_and_spatial_weighting() {
        let nwp = series(
            &["G1"],
            vec![
                ("ghi", vec![Some(200.0), None]),
                ("T2", vec![Some(290.0), Some(291.0)]),
            ],
        );
        let point = series(&["S1"], vec![("ghi", vec![Some(100.0), Some(120.0)])]);

        // nearest site at 5.5 km gives spatial confidence 0.5
        let blended = blend_with_points(
            nwp,
            &point,
            &site_map("G1", &["S1"], &[5.5]),
            config().point_blend().unwrap(),
            &threadpool(),
        )
        .unwrap();

        assert!(approx_eq!(Float, blended.value(0, 0, 0).unwrap(), 185.0, epsilon = 1e-9));
        // missing grid value is replaced by the point value
        assert_eq!(blended.value(0, 0, 1), Some(120.0));
        // pass-through variable untouched
        assert_eq!(blended.value(1, 0, 0), Some(290.0));
        assert_eq!(blended.value(1, 0, 1), Some(291.0));
    }

    #[test]
    fn multiple_sites_and_unmapped_points() {
        let nwp = series(
            &["G1", "G2"],
            vec![("ghi", vec![Some(0.0), Some(0.0), Some(10.0), None])],
        );
        let point = series(
            &["S1", "S2"],
            vec![("ghi", vec![Some(100.0), Some(100.0), Some(50.0), None])],
        );

        let blended = blend_with_points(
            nwp,
            &point,
            &site_map("G1", &["S1", "S2"], &[2.0, 4.0]),
            config().point_blend().unwrap(),
            &threadpool(),
        )
        .unwrap();

        // sites merged to 83.33, confidence at 2 km is 0.8(2)
        let confidence = 0.9 - 0.8 / 9.0;
        let point_weight = 0.3 * confidence;
        let expected = 250.0 / 3.0 * point_weight;
        assert!(approx_eq!(Float, blended.value(0, 0, 0).unwrap(), expected, epsilon = 1e-9));

        // only S1 present at the second time, weights renormalised
        let point_weight = 1.0 * confidence;
        assert!(approx_eq!(
            Float,
            blended.value(0, 0, 1).unwrap(),
            100.0 * point_weight,
            epsilon = 1e-9
        ));

        // G2 has no nearby sites
        assert_eq!(blended.value(0, 1, 0), Some(10.0));
        assert_eq!(blended.value(0, 1, 1), None);
    }

    #[test]
    fn missing_source_returns_other_series() {
        let nwp = series(&["G1"], vec![("ghi", vec![None, None])]);
        let point = series(&["S1"], vec![("ghi", vec![Some(321.0), Some(123.0)])]);

        let blended = blend_with_points(
            nwp,
            &point,
            &site_map("G1", &["S1"], &[3.0]),
            config().point_blend().unwrap(),
            &threadpool(),
        )
        .unwrap();
        assert_eq!(blended.location_row(0, 0).to_vec(), vec![Some(321.0), Some(123.0)]);

        let nwp = series(&["G1"], vec![("ghi", vec![Some(11.0), Some(22.0)])]);
        let point = series(&["S1"], vec![("ghi", vec![None, None])]);

        let blended = blend_with_points(
            nwp,
            &point,
            &site_map("G1", &["S1"], &[3.0]),
            config().point_blend().unwrap(),
            &threadpool(),
        )
        .unwrap();
        assert_eq!(blended.location_row(0, 0).to_vec(), vec![Some(11.0), Some(22.0)]);
    }

    #[test]
    fn distance_outside_curve_fails() {
        let nwp = series(&["G1"], vec![("ghi", vec![Some(1.0), Some(2.0)])]);
        let point = series(&["S1"], vec![("ghi", vec![Some(1.0), Some(2.0)])]);

        let result = blend_with_points(
            nwp,
            &point,
            &site_map("G1", &["S1"], &[25.0]),
            config().point_blend().unwrap(),
            &threadpool(),
        );

        assert!(matches!(
            result,
            Err(BlendError::Range(RangeError::OutsideCurve { .. }))
        ));
    }

    #[test]
    fn unknown_lead_time_fails() {
        let nwp = series(&["G1"], vec![("ghi", vec![Some(1.0), Some(2.0)])]).after(
            from_epoch_seconds(GEN + 900).unwrap(),
        );
        let nwp = nwp.with_gen_time(from_epoch_seconds(GEN - 900).unwrap());
        let point = series(&["S1"], vec![("ghi", vec![Some(1.0), Some(2.0)])]);

        let result = blend_with_points(
            nwp,
            &point,
            &GridToPointMap::default(),
            config().point_blend().unwrap(),
            &threadpool(),
        );

        assert!(matches!(result, Err(BlendError::LeadTime(_))));
    }
}
