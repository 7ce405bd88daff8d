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

use crate::Float;
use chrono::NaiveDateTime;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelError {
    #[error("Error while reading configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("Error while creating ThreadPool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),

    #[error("Cannot cap the heap memory at {0} MB, more is already allocated")]
    MemoryLimit(usize),

    #[error("Error while reading input data: {0}")]
    Input(#[from] InputError),

    #[error("Input series are not aligned: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("Error while blending forecasts: {0}")]
    Blend(#[from] BlendError),

    #[error("Error while writing output: {0}")]
    Output(#[from] OutputError),

    #[error("Generation time {0} does not match format YYYYmmdd.HHMM")]
    GenTime(String),
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Cannot open configuration file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot deserialize configuration file: {0}")]
    CantDeserialize(#[from] serde_yaml::Error),

    #[error("Configuration component is out of bounds: {0}")]
    OutOfBounds(&'static str),

    #[error("Configuration section '{0}' is required for this run")]
    MissingSection(&'static str),

    #[error("Lead time '{0}' is not an integer number of seconds")]
    InvalidLeadTime(String),

    #[error("Lead time {lead_time} must have exactly two weights, found {count}")]
    WeightCount { lead_time: i64, count: usize },

    #[error("Weights for lead time {lead_time} must add up to 1 (not {sum})")]
    WeightSum { lead_time: i64, sum: Float },

    #[error("Weight {0} must be between 0 and 1")]
    WeightOutOfRange(Float),

    #[error("Spatial weight curve needs at least two points, found {0}")]
    TooFewKnots(usize),

    #[error("Distances must increase ({current} is not greater than {previous})")]
    NonIncreasingDistance { previous: Float, current: Float },

    #[error("No blending weights configured for lead time {0} s")]
    UnknownLeadTime(i64),

    #[error("Variable '{variable}' has no counterpart in {model} blend variables")]
    UnmatchedVariable {
        variable: String,
        model: &'static str,
    },

    #[error("Model A declares {model_a} blend variables but model B declares {model_b}")]
    BlendVarCount { model_a: usize, model_b: usize },

    #[error("Lead times of '{0}' differ from the lead times of other blend variables")]
    LeadTimeSetMismatch(String),

    #[error("Output variable '{0}' is declared more than once")]
    DuplicateVariable(String),
}

#[derive(Error, Debug)]
pub enum AlignmentError {
    #[error("Configured {expected} lead times but {series} series has {found}")]
    LeadTimeCount {
        series: &'static str,
        expected: usize,
        found: usize,
    },

    #[error("Configured lead time ({configured}) doesn't match {series} lead time ({found})")]
    LeadTimeMismatch {
        series: &'static str,
        configured: i64,
        found: i64,
    },

    #[error("Lead times {missing:?} are configured but absent from {series} series")]
    UncoveredLeadTimes {
        series: &'static str,
        missing: Vec<i64>,
    },

    #[error("Column '{0}' is missing after the sources were merged")]
    MissingColumn(String),
}

#[derive(Error, Debug, PartialEq)]
pub enum RangeError {
    #[error("Distance {distance} km is outside the spatial weight curve [{min}, {max}] km")]
    OutsideCurve {
        distance: Float,
        min: Float,
        max: Float,
    },
}

#[derive(Error, Debug)]
pub enum BlendError {
    #[error("Spatial weight unavailable: {0}")]
    Range(#[from] RangeError),

    #[error("Lead-time weight unavailable: {0}")]
    LeadTime(#[from] ConfigError),

    #[error("Blended variable '{variable}' is absent from {series} series")]
    MissingVariable {
        variable: String,
        series: &'static str,
    },

    #[error("Input series are not aligned: {0}")]
    Alignment(#[from] AlignmentError),

    #[error("Worker finished without returning the result for location {0}")]
    WorkerLost(usize),
}

#[derive(Error, Debug)]
pub enum InputError {
    #[error("Cannot open input file: {0}")]
    CantOpenFile(#[from] std::io::Error),

    #[error("Cannot parse CSV input: {0}")]
    Csv(#[from] csv::Error),

    #[error("Cannot parse JSON input: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Input file {file} lacks the required column '{column}'")]
    MissingColumn { file: String, column: &'static str },

    #[error("Input lacks the variable '{0}'")]
    MissingVariable(String),

    #[error("Cannot parse '{value}' in column '{column}' as a number")]
    InvalidNumber { column: String, value: String },

    #[error("Timestamp {0} is out of range")]
    InvalidTimestamp(i64),

    #[error("Generation time changes within one forecast ({first} and {other})")]
    NonConstantGenTime {
        first: NaiveDateTime,
        other: NaiveDateTime,
    },

    #[error("Location {location} has more than one record valid at {valid_time}")]
    DuplicateRecord {
        location: String,
        valid_time: NaiveDateTime,
    },

    #[error("Record has {found} values but the forecast declares {expected} variables")]
    RecordWidth { expected: usize, found: usize },

    #[error("Input file {0} contains no records")]
    EmptyTable(String),

    #[error("Grid point {grid} has an invalid list of nearby sites: {reason}")]
    InvalidSiteMap { grid: String, reason: &'static str },

    #[error("Neither model A nor model B forecast is available")]
    NoSources,
}

#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Cannot create output file: {0}")]
    CantCreateFile(#[from] std::io::Error),

    #[error("Cannot write CSV output: {0}")]
    Csv(#[from] csv::Error),
}

#[derive(Error, Debug, PartialEq, Eq)]
pub enum SearchError {
    #[error("Searched array is empty")]
    EmptyArray,

    #[error("Searched value is outside the array bounds")]
    OutOfBounds,
}
