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

//! Module containing the blending engine.
//!
//! Both blends share the same structure: a dense input series is split
//! by location, each location is blended independently on the thread pool
//! and the results are gathered back into the output series.
//!
//! A single blended value is always computed by [`blend_values`].
//! When one of the two sources is missing the other one is taken as is,
//! regardless of weights, so a value is missing in the output only when
//! both sources lack it.

pub mod grid;
pub mod point;

use crate::{errors::BlendError, Float};
use indicatif::{ProgressBar, ProgressStyle};
use log::{debug, error};
use rayon::ThreadPool;
use std::{
    ops::AddAssign,
    sync::{mpsc, Arc},
};

/// Counters of how the blended values were obtained.
#[derive(Copy, Clone, Eq, PartialEq, Debug, Default)]
pub struct BlendStats {
    /// Both sources present, weighted combination.
    pub blended: usize,
    /// Only one source present and taken outright.
    pub fallbacks: usize,
    /// Neither source present.
    pub missing: usize,
}

impl AddAssign for BlendStats {
    fn add_assign(&mut self, other: Self) {
        self.blended += other.blended;
        self.fallbacks += other.fallbacks;
        self.missing += other.missing;
    }
}

impl BlendStats {
    pub fn log(&self, blend: &str) {
        debug!(
            "{}: {} values blended, {} taken from a single source, {} missing",
            blend, self.blended, self.fallbacks, self.missing
        );
    }
}

/// Weighted combination of two values with the fallback
/// to the source that is present.
///
/// `weights` are the (first, second) source weights.
pub fn blend_values(
    first: Option<Float>,
    second: Option<Float>,
    weights: (Float, Float),
    stats: &mut BlendStats,
) -> Option<Float> {
    match (first, second) {
        (Some(first), Some(second)) => {
            stats.blended += 1;
            Some(first * weights.0 + second * weights.1)
        }
        (Some(value), None) | (None, Some(value)) => {
            stats.fallbacks += 1;
            Some(value)
        }
        (None, None) => {
            stats.missing += 1;
            None
        }
    }
}

/// Runs `job` for every index in `0..count` on the thread pool
/// and returns the results in the order of indices.
///
/// Results are sent back over the channel as the jobs finish.
/// All jobs are awaited even when some fail, then the first error
/// is returned.
pub fn run_jobs<T, F>(
    threadpool: &ThreadPool,
    count: usize,
    label: &'static str,
    job: F,
) -> Result<Vec<T>, BlendError>
where
    T: Send + 'static,
    F: Fn(usize) -> Result<T, BlendError> + Send + Sync + 'static,
{
    let job = Arc::new(job);
    let (tx, rx) = mpsc::channel();

    for index in 0..count {
        let tx = tx.clone();
        let job = Arc::clone(&job);

        threadpool.spawn(move || {
            // receiver lives until all senders are dropped
            let _ = tx.send((index, job(index)));
        });
    }

    drop(tx);

    let progress_bar = ProgressBar::new(count as u64);
    progress_bar.set_style(
        ProgressStyle::default_bar()
            .template("{prefix} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}")
            .progress_chars("#>-"),
    );
    progress_bar.set_prefix(label);

    let mut results: Vec<Option<T>> = (0..count).map(|_| None).collect();
    let mut first_error = None;

    for (index, result) in rx.iter() {
        match result {
            Ok(value) => results[index] = Some(value),
            Err(err) => {
                error!("Blending location {} failed: {}", index, err);
                first_error.get_or_insert(err);
            }
        }
        progress_bar.inc(1);
    }

    progress_bar.finish_with_message("done");

    if let Some(err) = first_error {
        return Err(err);
    }

    results
        .into_iter()
        .enumerate()
        .map(|(index, result)| result.ok_or(BlendError::WorkerLost(index)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::{blend_values, run_jobs, BlendStats};
    use crate::errors::BlendError;
    use crate::Float;
    use float_cmp::approx_eq;
    use rayon::ThreadPoolBuilder;

    #[test]
    fn weighted_when_both_present() {
        let mut stats = BlendStats::default();
        let blended = blend_values(Some(200.0), Some(100.0), (0.85, 0.15), &mut stats);

        assert!(approx_eq!(Float, blended.unwrap(), 185.0, epsilon = 1e-9));
        assert_eq!(stats.blended, 1);
    }

    #[test]
    fn fallback_ignores_weights() {
        let mut stats = BlendStats::default();

        assert_eq!(blend_values(None, Some(100.0), (1.0, 0.0), &mut stats), Some(100.0));
        assert_eq!(blend_values(Some(42.0), None, (0.0, 1.0), &mut stats), Some(42.0));
        assert_eq!(blend_values(None, None, (0.5, 0.5), &mut stats), None);

        assert_eq!(
            stats,
            BlendStats {
                blended: 0,
                fallbacks: 2,
                missing: 1
            }
        );
    }

    #[test]
    fn jobs_keep_order() {
        let threadpool = ThreadPoolBuilder::new().num_threads(3).build().unwrap();

        let squares = run_jobs(&threadpool, 50, "Test jobs", |i| Ok(i * i)).unwrap();

        assert_eq!(squares.len(), 50);
        assert!(squares.iter().enumerate().all(|(i, s)| *s == i * i));
    }

    #[test]
    fn failed_job_fails_the_run() {
        let threadpool = ThreadPoolBuilder::new().num_threads(2).build().unwrap();

        let result = run_jobs(&threadpool, 10, "Test jobs", |i| {
            if i == 7 {
                Err(BlendError::WorkerLost(i))
            } else {
                Ok(i)
            }
        });

        assert!(matches!(result, Err(BlendError::WorkerLost(7))));
    }
}
