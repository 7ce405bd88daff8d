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

//! Module containing constants used by the blending system.

use crate::Float;

/// Sentinel stored in place of missing values in files.
///
/// Inside the system missing values are always `None`,
/// the sentinel exists only at the input and output boundary.
pub const MISSING: Float = -9999.0;

/// Climate zone code of grid points outside the region of interest.
pub const OUTSIDE_ZONE: i32 = -9;

/// Cadence (in seconds) of point forecasts and blended output.
pub const DEFAULT_CADENCE: i64 = 900;

/// Longest gap (in seconds) bridged when interpolating coarse forecasts.
pub const DEFAULT_MAX_GAP: i64 = 3600;

/// Length (in seconds) of the averaging bucket of hourly output.
pub const HOUR: i64 = 3600;

/// Smallest number of samples for an hourly bucket to be complete.
pub const DEFAULT_MIN_SAMPLES: usize = 2;

/// Plausible bounds (in W/m^2) of global horizontal irradiance
/// from point forecasts.
pub const GHI_BOUNDS: (Float, Float) = (0.0, 2000.0);

/// Name of the variable blended when none is configured.
pub const DEFAULT_VARIABLE: &str = "ghi";

/// Suffix of model A columns after merging the two models.
pub const MODEL_A_SUFFIX: &str = "_modelA";

/// Suffix of model B columns after merging the two models.
pub const MODEL_B_SUFFIX: &str = "_modelB";

/// Format of the generation time passed on the command line.
pub const GEN_TIME_FORMAT: &str = "%Y%m%d.%H%M";
