//! Exhaustive grid search with k-fold cross-validation

use ndarray::{ArrayView2, Axis};
use rayon::prelude::*;

use super::model::{Hyperparameters, ModelBuilder, calculate_mae};
use crate::error::{PipelineError, Result};
use crate::traits::Regressor;

/// Candidate values per hyperparameter. Candidates are the cartesian product
/// in field order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchGrid {
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
}

impl Default for SearchGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![50, 100, 200],
            max_depth: vec![5, 10, 20],
            min_samples_split: vec![2, 5],
            min_samples_leaf: vec![1, 2],
        }
    }
}

impl SearchGrid {
    /// Every combination, `random_state` shared by all.
    pub fn candidates(&self, random_state: u64) -> Vec<Hyperparameters> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &min_samples_split in &self.min_samples_split {
                    for &min_samples_leaf in &self.min_samples_leaf {
                        out.push(Hyperparameters {
                            n_estimators,
                            max_depth: Some(max_depth),
                            min_samples_split,
                            min_samples_leaf,
                            random_state,
                        });
                    }
                }
            }
        }
        out
    }
}

/// Contiguous, unshuffled folds. The first `n % k` folds get one extra row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KFold {
    pub n_splits: usize,
}

impl KFold {
    pub fn new(n_splits: usize) -> Self {
        Self { n_splits }
    }

    /// `(train_rows, test_rows)` per fold.
    pub fn split(&self, n_samples: usize) -> Result<Vec<(Vec<usize>, Vec<usize>)>> {
        if self.n_splits < 2 {
            return Err(PipelineError::InvalidConfig(format!(
                "cross-validation needs at least 2 folds, got {}",
                self.n_splits
            )));
        }
        if self.n_splits > n_samples {
            return Err(PipelineError::InvalidConfig(format!(
                "cannot split {} samples into {} folds",
                n_samples, self.n_splits
            )));
        }

        let base = n_samples / self.n_splits;
        let extra = n_samples % self.n_splits;
        let mut start = 0;
        let mut folds = Vec::with_capacity(self.n_splits);
        for fold in 0..self.n_splits {
            let size = base + usize::from(fold < extra);
            let end = start + size;
            let test: Vec<usize> = (start..end).collect();
            let train: Vec<usize> = (0..start).chain(end..n_samples).collect();
            folds.push((train, test));
            start = end;
        }
        Ok(folds)
    }
}

/// Mean cross-validated score of one candidate.
#[derive(Debug, Clone, PartialEq)]
pub struct CandidateScore {
    pub hyperparameters: Hyperparameters,
    /// Negative mean absolute error per fold
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchOutcome {
    pub best: Hyperparameters,
    pub best_score: f64,
    /// Every candidate, in grid order
    pub results: Vec<CandidateScore>,
}

/// Score every grid candidate by k-fold negative MAE and return the best
/// hyperparameters. Ties go to the earlier candidate.
pub fn search(
    x: ArrayView2<'_, f64>,
    y: &[f64],
    grid: &SearchGrid,
    folds: usize,
    random_state: u64,
) -> Result<SearchOutcome> {
    let candidates = grid.candidates(random_state);
    if candidates.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "search grid has no candidates".to_string(),
        ));
    }
    let splits = KFold::new(folds).split(x.nrows())?;

    tracing::info!(
        "Searching {} candidates x {} folds",
        candidates.len(),
        splits.len()
    );

    let jobs: Vec<(usize, usize)> = (0..candidates.len())
        .flat_map(|c| (0..splits.len()).map(move |f| (c, f)))
        .collect();

    let scores: Vec<f64> = jobs
        .par_iter()
        .map(|&(c, f)| -> Result<f64> {
            let (train, test) = &splits[f];
            let x_train = x.select(Axis(0), train);
            let y_train: Vec<f64> = train.iter().map(|&r| y[r]).collect();
            let model = ModelBuilder::from_hyperparameters(candidates[c])
                .train(x_train.view(), &y_train)?;

            let x_test = x.select(Axis(0), test);
            let y_test: Vec<f64> = test.iter().map(|&r| y[r]).collect();
            Ok(-calculate_mae(&model.predict(x_test.view()), &y_test))
        })
        .collect::<Result<Vec<f64>>>()?;

    let results: Vec<CandidateScore> = candidates
        .iter()
        .zip(scores.chunks(splits.len()))
        .map(|(&hyperparameters, fold_scores)| CandidateScore {
            hyperparameters,
            fold_scores: fold_scores.to_vec(),
            mean_score: fold_scores.iter().sum::<f64>() / fold_scores.len() as f64,
        })
        .collect();

    let mut best = &results[0];
    for candidate in &results[1..] {
        if candidate.mean_score > best.mean_score {
            best = candidate;
        }
    }

    tracing::info!(
        "Best candidate ({}) scored {:.4}",
        best.hyperparameters,
        best.mean_score
    );

    Ok(SearchOutcome {
        best: best.hyperparameters,
        best_score: best.mean_score,
        results,
    })
}
