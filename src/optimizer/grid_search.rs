//! Exhaustive grid search with cross-validation
//!
//! Every (candidate, fold) pair is an independent fit, so all of them run in
//! parallel on the rayon pool. A fit that fails scores `NaN` and the search
//! carries on; only a grid where every candidate failed is an error.

use super::search_space::{ParamGrid, ParamSet};
use crate::error::{BakeoffError, Result};
use crate::registry::Pipeline;
use crate::training::{CVResults, CrossValidator};
use ndarray::{Array1, Array2, Axis};
use rayon::prelude::*;
use serde::Serialize;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scores of one parameter combination across the folds
#[derive(Debug, Clone, Serialize)]
pub struct CandidateResult {
    pub params: ParamSet,
    pub fold_scores: Vec<f64>,
    pub mean_test_score: f64,
    pub std_test_score: f64,
    /// 1 is best; equal means share the lowest rank, NaN ranks last
    pub rank_test_score: usize,
    pub mean_fit_time_secs: f64,
}

/// Outcome of a grid search
#[derive(Debug, Clone)]
pub struct GridSearchResult {
    pub best_params: ParamSet,
    pub best_score: f64,
    pub best_index: usize,
    /// Best candidate refit on the whole training set
    pub best_estimator: Pipeline,
    pub cv_results: Vec<CandidateResult>,
    pub n_splits: usize,
    pub refit_time_secs: f64,
}

impl GridSearchResult {
    /// Accuracy of the refit best estimator
    pub fn score(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<f64> {
        self.best_estimator.score(x, y)
    }

    /// Standard deviation of the best candidate's fold scores
    pub fn best_std(&self) -> f64 {
        self.cv_results[self.best_index].std_test_score
    }
}

/// Grid search over a pipeline's hyperparameters
pub struct GridSearchCV {
    estimator: Pipeline,
    param_grid: ParamGrid,
    cv: CrossValidator,
}

impl GridSearchCV {
    pub fn new(estimator: Pipeline, param_grid: ParamGrid, cv: CrossValidator) -> Self {
        Self {
            estimator,
            param_grid,
            cv,
        }
    }

    /// Total number of fits the search performs, excluding the refit
    pub fn n_fits(&self) -> usize {
        self.param_grid.len() * self.cv.n_splits()
    }

    /// Run the search and refit the best candidate on all of `x`
    pub fn fit(&self, x: &Array2<f64>, y: &Array1<f64>) -> Result<GridSearchResult> {
        if x.nrows() != y.len() {
            return Err(BakeoffError::ShapeError {
                expected: format!("y length = {}", x.nrows()),
                actual: format!("y length = {}", y.len()),
            });
        }

        let candidates = self.param_grid.candidates()?;
        if candidates.is_empty() {
            return Err(BakeoffError::SearchError(
                "Parameter grid produced no candidates".to_string(),
            ));
        }
        let splits = self.cv.split(x.nrows(), Some(y))?;
        let n_splits = splits.len();

        info!(
            model = %self.estimator.kind(),
            n_candidates = candidates.len(),
            n_splits,
            n_fits = candidates.len() * n_splits,
            "Starting grid search"
        );

        let tasks: Vec<(usize, usize)> = (0..candidates.len())
            .flat_map(|c| (0..n_splits).map(move |f| (c, f)))
            .collect();

        let outcomes: Vec<(f64, f64)> = tasks
            .par_iter()
            .map(|&(c, f)| {
                let split = &splits[f];
                let start = Instant::now();
                let score = self
                    .estimator
                    .with_params(&candidates[c])
                    .and_then(|mut pipeline| {
                        let x_train = x.select(Axis(0), &split.train_indices);
                        let y_train = y.select(Axis(0), &split.train_indices);
                        pipeline.fit(&x_train, &y_train)?;

                        let x_test = x.select(Axis(0), &split.test_indices);
                        let y_test = y.select(Axis(0), &split.test_indices);
                        pipeline.score(&x_test, &y_test)
                    })
                    .unwrap_or_else(|e| {
                        warn!(
                            params = %candidates[c],
                            fold = f,
                            error = %e,
                            "Fit failed; score set to NaN"
                        );
                        f64::NAN
                    });
                (score, start.elapsed().as_secs_f64())
            })
            .collect();

        let mut cv_results: Vec<CandidateResult> = candidates
            .into_iter()
            .enumerate()
            .map(|(c, params)| {
                let chunk = &outcomes[c * n_splits..(c + 1) * n_splits];
                let scores: Vec<f64> = chunk.iter().map(|(s, _)| *s).collect();
                let fit_time = chunk.iter().map(|(_, t)| *t).sum::<f64>() / n_splits as f64;
                let summary = CVResults::from_scores(scores);

                debug!(
                    params = %params,
                    mean = summary.mean_score,
                    std = summary.std_score,
                    "Candidate scored"
                );

                CandidateResult {
                    params,
                    fold_scores: summary.scores,
                    mean_test_score: summary.mean_score,
                    std_test_score: summary.std_score,
                    rank_test_score: 0,
                    mean_fit_time_secs: fit_time,
                }
            })
            .collect();

        assign_ranks(&mut cv_results);

        let best_index = best_candidate(&cv_results).ok_or_else(|| {
            BakeoffError::SearchError(format!(
                "All {} candidates failed for {}",
                cv_results.len(),
                self.estimator.kind()
            ))
        })?;
        let best_params = cv_results[best_index].params.clone();
        let best_score = cv_results[best_index].mean_test_score;

        let refit_start = Instant::now();
        let mut best_estimator = self.estimator.with_params(&best_params)?;
        best_estimator.fit(x, y)?;
        let refit_time_secs = refit_start.elapsed().as_secs_f64();

        info!(
            model = %self.estimator.kind(),
            best_score,
            best_params = %best_params,
            "Grid search finished"
        );

        Ok(GridSearchResult {
            best_params,
            best_score,
            best_index,
            best_estimator,
            cv_results,
            n_splits,
            refit_time_secs,
        })
    }
}

/// First candidate with the highest non-NaN mean score
fn best_candidate(results: &[CandidateResult]) -> Option<usize> {
    let mut best: Option<usize> = None;
    for (i, r) in results.iter().enumerate() {
        if r.mean_test_score.is_nan() {
            continue;
        }
        match best {
            Some(b) if results[b].mean_test_score >= r.mean_test_score => {}
            _ => best = Some(i),
        }
    }
    best
}

fn assign_ranks(results: &mut [CandidateResult]) {
    let means: Vec<f64> = results.iter().map(|r| r.mean_test_score).collect();
    let n_valid = means.iter().filter(|m| !m.is_nan()).count();

    for (r, &mean) in results.iter_mut().zip(means.iter()) {
        r.rank_test_score = if mean.is_nan() {
            n_valid + 1
        } else {
            1 + means.iter().filter(|&&other| other > mean).count()
        };
    }
}
