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

//! Module responsible for parsing and checking the configuration file.
//!
//! The configuration file uses [YAML](https://en.wikipedia.org/wiki/YAML)
//! and `serde` to enforce strong typing and automatic type checking.
//! As JSON is a subset of YAML, configuration written in JSON is read
//! the same way.
//!
//! Weight tables are converted into validated structures while loading,
//! so an inconsistent configuration stops the run before any input is read.
//! The loaded [`Config`] is immutable and passed explicitly to
//! the blending functions.

use super::weights::{LeadTimeWeightTable, OutOfRangeDistance, SpatialWeightCurve};
use crate::constants::{
    DEFAULT_CADENCE, DEFAULT_MAX_GAP, DEFAULT_MIN_SAMPLES, DEFAULT_VARIABLE, GHI_BOUNDS,
    OUTSIDE_ZONE,
};
use crate::{errors::ConfigError, Float};
use rustc_hash::FxHashSet;
use serde::Deserialize;
use std::{collections::BTreeMap, fs, path::Path};

/// _(Optional)_ Fields with information about
/// resources available for the system.
#[derive(Clone, PartialEq, PartialOrd, Debug, Deserialize)]
pub struct Resources {
    /// _(Optional)_ Thread count used for blending.
    /// The thread pool will use up to this number of workers.
    ///
    /// Cannot be less than `1`. Defaults to `1`.
    #[serde(default = "Resources::default_threads")]
    pub threads: u16,

    /// _(Optional)_ Heap memory limit in MB.
    /// Useful for enabling meaningful Out-of-memory error messages
    /// when large grids are blended.
    ///
    /// Cannot be less than `128`. Defaults to whole addressable-space.
    #[serde(default = "Resources::default_memory")]
    pub memory: usize,
}

impl Resources {
    fn default_threads() -> u16 {
        1
    }

    fn default_memory() -> usize {
        usize::MAX / (1024 * 1024)
    }

    /// Checks if thread count and memory limit are
    /// above limits.
    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.threads < 1 {
            return Err(ConfigError::OutOfBounds(
                "Available threads cannot be less than 1",
            ));
        }

        if self.memory < 128 {
            return Err(ConfigError::OutOfBounds(
                "Available memory cannot be less than 128 MB",
            ));
        }

        self.memory_bytes()?;

        Ok(())
    }

    /// Memory limit in bytes.
    pub fn memory_bytes(&self) -> Result<usize, ConfigError> {
        self.memory
            .checked_mul(1024 * 1024)
            .ok_or(ConfigError::OutOfBounds(
                "Available memory exceeds the addressable space",
            ))
    }
}

impl Default for Resources {
    fn default() -> Self {
        Resources {
            threads: Resources::default_threads(),
            memory: Resources::default_memory(),
        }
    }
}

/// Settings of the blend of gridded NWP with point statcast forecast.
#[derive(Clone, PartialEq, Debug)]
pub struct PointBlend {
    /// Pairs of (NWP, statcast) weights per lead time.
    pub lead_time_weights: LeadTimeWeightTable,

    /// Trust in statcast against distance to the nearest site.
    pub spatial_weights: SpatialWeightCurve,

    /// Name of the blended variable in both forecasts.
    pub variable: String,

    /// Statcast values outside this range are treated as missing.
    pub point_value_range: (Float, Float),
}

#[derive(Deserialize)]
struct RawPointBlend {
    lead_time_blending_weights: BTreeMap<String, Vec<Float>>,

    spatial_blending_weights: Vec<(Float, Float)>,

    #[serde(default = "default_variable")]
    variable: String,

    #[serde(default = "default_point_value_range")]
    point_value_range: (Float, Float),

    #[serde(default)]
    out_of_range_distance: OutOfRangeDistance,
}

fn default_variable() -> String {
    DEFAULT_VARIABLE.to_string()
}

fn default_point_value_range() -> (Float, Float) {
    GHI_BOUNDS
}

impl PointBlend {
    fn new(raw: RawPointBlend) -> Result<Self, ConfigError> {
        if raw.point_value_range.0 > raw.point_value_range.1 {
            return Err(ConfigError::OutOfBounds(
                "Lower bound of point values cannot exceed the upper bound",
            ));
        }

        Ok(PointBlend {
            lead_time_weights: LeadTimeWeightTable::new(&raw.lead_time_blending_weights)?,
            spatial_weights: SpatialWeightCurve::new(
                &raw.spatial_blending_weights,
                raw.out_of_range_distance,
            )?,
            variable: raw.variable,
            point_value_range: raw.point_value_range,
        })
    }
}

/// Variables taken from one of the blended gridded models.
#[derive(Clone, PartialEq, Debug, Default, Deserialize)]
pub struct ModelInput {
    /// Variables to blend, mapped from their name in the model
    /// forecast to the name of the blended variable.
    pub blend_vars: BTreeMap<String, String>,

    /// _(Optional)_ Variables copied unmodified to the output.
    #[serde(default)]
    pub pass_through_vars: Vec<String>,

    /// _(Optional)_ Pairs of `[output_name, variable]`: the variable
    /// of this model replaces the pass-through output of the other model
    /// when that is unavailable. Only model B can declare them.
    #[serde(default)]
    pub fall_back_vars: Vec<(String, String)>,
}

/// Settings of resampling a coarse forecast to the blended cadence.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Interpolation {
    /// Target cadence in seconds.
    #[serde(default = "Interpolation::default_cadence")]
    pub cadence: i64,

    /// Longest gap (in seconds) from a known sample that is filled.
    #[serde(default = "Interpolation::default_max_gap")]
    pub max_gap: i64,

    /// Shift samples by half of the cadence before interpolation,
    /// so that hourly values centre on the target boundaries.
    #[serde(default = "Interpolation::default_centre_shift")]
    pub centre_shift: bool,
}

impl Interpolation {
    fn default_cadence() -> i64 {
        DEFAULT_CADENCE
    }

    fn default_max_gap() -> i64 {
        DEFAULT_MAX_GAP
    }

    fn default_centre_shift() -> bool {
        true
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.cadence < 1 {
            return Err(ConfigError::OutOfBounds(
                "Interpolation cadence cannot be less than 1 s",
            ));
        }

        if self.max_gap < 0 {
            return Err(ConfigError::OutOfBounds(
                "Interpolation gap limit cannot be negative",
            ));
        }

        if self.centre_shift && self.cadence % 2 != 0 {
            return Err(ConfigError::OutOfBounds(
                "Interpolation cadence must be even when shifting samples by half of it",
            ));
        }

        Ok(())
    }
}

impl Default for Interpolation {
    fn default() -> Self {
        Interpolation {
            cadence: Interpolation::default_cadence(),
            max_gap: Interpolation::default_max_gap(),
            centre_shift: Interpolation::default_centre_shift(),
        }
    }
}

/// Settings of the blend of two gridded NWP models.
#[derive(Clone, PartialEq, Debug)]
pub struct GridBlend {
    /// Pairs of (model A, model B) weights per lead time for each blended variable.
    pub blending_weights: BTreeMap<String, LeadTimeWeightTable>,

    pub model_a: ModelInput,

    pub model_b: ModelInput,

    pub interpolation: Interpolation,
}

#[derive(Deserialize)]
struct RawGridBlend {
    blending_weights: BTreeMap<String, BTreeMap<String, Vec<Float>>>,

    model_a: ModelInput,

    model_b: ModelInput,

    #[serde(default)]
    interpolation: Interpolation,
}

impl GridBlend {
    fn new(raw: RawGridBlend) -> Result<Self, ConfigError> {
        raw.interpolation.check_bounds()?;

        if raw.blending_weights.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "At least one variable must have blending weights",
            ));
        }

        let mut blending_weights = BTreeMap::new();

        for (variable, table) in &raw.blending_weights {
            blending_weights.insert(variable.clone(), LeadTimeWeightTable::new(table)?);
        }

        let grid_blend = GridBlend {
            blending_weights,
            model_a: raw.model_a,
            model_b: raw.model_b,
            interpolation: raw.interpolation,
        };

        grid_blend.check_lead_times()?;
        grid_blend.check_variables()?;

        Ok(grid_blend)
    }

    /// Checks if all blended variables use the same lead times.
    fn check_lead_times(&self) -> Result<(), ConfigError> {
        let reference = self.lead_times();

        for (variable, table) in &self.blending_weights {
            if table.lead_times() != reference {
                return Err(ConfigError::LeadTimeSetMismatch(variable.clone()));
            }
        }

        Ok(())
    }

    /// Checks if every blended variable is provided by both models
    /// and output names do not collide.
    fn check_variables(&self) -> Result<(), ConfigError> {
        if self.model_a.blend_vars.len() != self.model_b.blend_vars.len() {
            return Err(ConfigError::BlendVarCount {
                model_a: self.model_a.blend_vars.len(),
                model_b: self.model_b.blend_vars.len(),
            });
        }

        for (model, input) in [("model_a", &self.model_a), ("model_b", &self.model_b)] {
            let provided: FxHashSet<&String> = input.blend_vars.values().collect();

            for variable in self.blending_weights.keys() {
                if !provided.contains(variable) {
                    return Err(ConfigError::UnmatchedVariable {
                        variable: variable.clone(),
                        model,
                    });
                }
            }

            for variable in provided {
                if !self.blending_weights.contains_key(variable) {
                    return Err(ConfigError::UnmatchedVariable {
                        variable: variable.clone(),
                        model,
                    });
                }
            }
        }

        if !self.model_a.fall_back_vars.is_empty() {
            return Err(ConfigError::OutOfBounds(
                "Fall-back variables can only be declared for model B",
            ));
        }

        let mut outputs: FxHashSet<&String> = self.blending_weights.keys().collect();

        for variable in self
            .model_a
            .pass_through_vars
            .iter()
            .chain(&self.model_b.pass_through_vars)
        {
            if !outputs.insert(variable) {
                return Err(ConfigError::DuplicateVariable(variable.clone()));
            }
        }

        Ok(())
    }

    /// Lead times (in seconds) shared by all blended variables.
    pub fn lead_times(&self) -> Vec<i64> {
        self.blending_weights
            .values()
            .next()
            .map(LeadTimeWeightTable::lead_times)
            .unwrap_or_default()
    }
}

/// What to do with hourly buckets holding too few samples.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IncompleteBuckets {
    /// Leave the bucket out of the hourly output.
    Drop,
    /// Keep the bucket and report its sample count.
    Flag,
}

/// _(Optional)_ Fields with hourly averaging settings.
#[derive(Copy, Clone, PartialEq, Eq, Debug, Deserialize)]
pub struct Aggregation {
    /// Buckets with fewer samples are incomplete.
    ///
    /// Cannot be less than `1`. Defaults to `2`.
    #[serde(default = "Aggregation::default_min_samples")]
    pub min_samples: usize,

    /// Defaults to `drop`.
    #[serde(default = "Aggregation::default_incomplete")]
    pub incomplete: IncompleteBuckets,
}

impl Aggregation {
    fn default_min_samples() -> usize {
        DEFAULT_MIN_SAMPLES
    }

    fn default_incomplete() -> IncompleteBuckets {
        IncompleteBuckets::Drop
    }

    pub fn check_bounds(&self) -> Result<(), ConfigError> {
        if self.min_samples < 1 {
            return Err(ConfigError::OutOfBounds(
                "Minimum samples in hourly bucket cannot be less than 1",
            ));
        }

        Ok(())
    }
}

impl Default for Aggregation {
    fn default() -> Self {
        Aggregation {
            min_samples: Aggregation::default_min_samples(),
            incomplete: Aggregation::default_incomplete(),
        }
    }
}

/// _(Optional)_ Fields with climate zone masking settings.
#[derive(Clone, PartialEq, Debug, Deserialize)]
pub struct ClimateZone {
    /// Zone code of grid points outside the region of interest.
    #[serde(default = "ClimateZone::default_outside_zone")]
    pub outside_zone: i32,

    /// Variables set to missing outside the region of interest.
    #[serde(default = "ClimateZone::default_masked_variables")]
    pub masked_variables: Vec<String>,
}

impl ClimateZone {
    fn default_outside_zone() -> i32 {
        OUTSIDE_ZONE
    }

    fn default_masked_variables() -> Vec<String> {
        vec![DEFAULT_VARIABLE.to_string()]
    }
}

impl Default for ClimateZone {
    fn default() -> Self {
        ClimateZone {
            outside_zone: ClimateZone::default_outside_zone(),
            masked_variables: ClimateZone::default_masked_variables(),
        }
    }
}

#[derive(Deserialize)]
struct ConfigFile {
    #[serde(default)]
    resources: Resources,

    point_blend: Option<RawPointBlend>,

    grid_blend: Option<RawGridBlend>,

    #[serde(default)]
    aggregation: Aggregation,

    #[serde(default)]
    climate_zone: ClimateZone,
}

/// Main config structure representing the fields in
/// configuration file.
#[derive(Clone, PartialEq, Debug)]
pub struct Config {
    pub resources: Resources,

    point_blend: Option<PointBlend>,

    grid_blend: Option<GridBlend>,

    pub aggregation: Aggregation,

    pub climate_zone: ClimateZone,
}

impl Config {
    /// Config structure constructor, responsible for
    /// deserializing configuration and checking it.
    pub fn new_from_file(file_path: &Path) -> Result<Config, ConfigError> {
        let data = fs::read(file_path)?;

        Config::new_from_slice(data.as_slice())
    }

    pub fn new_from_slice(data: &[u8]) -> Result<Config, ConfigError> {
        let file: ConfigFile = serde_yaml::from_slice(data)?;

        file.resources.check_bounds()?;
        file.aggregation.check_bounds()?;

        Ok(Config {
            resources: file.resources,
            point_blend: file.point_blend.map(PointBlend::new).transpose()?,
            grid_blend: file.grid_blend.map(GridBlend::new).transpose()?,
            aggregation: file.aggregation,
            climate_zone: file.climate_zone,
        })
    }

    pub fn point_blend(&self) -> Result<&PointBlend, ConfigError> {
        self.point_blend
            .as_ref()
            .ok_or(ConfigError::MissingSection("point_blend"))
    }

    pub fn grid_blend(&self) -> Result<&GridBlend, ConfigError> {
        self.grid_blend
            .as_ref()
            .ok_or(ConfigError::MissingSection("grid_blend"))
    }
}
