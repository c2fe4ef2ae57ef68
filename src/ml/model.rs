//! Bagged regression-tree forest

use ndarray::{ArrayView1, ArrayView2};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use super::tree::{RegressionTree, TreeParams};
use crate::traits::Regressor;

/// Forest hyperparameters, also the unit the grid search ranks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Hyperparameters {
    pub n_estimators: usize,
    /// `None` grows every tree until its leaves are pure or too small.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub random_state: u64,
}

impl Default for Hyperparameters {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: Some(10),
            min_samples_split: 2,
            min_samples_leaf: 1,
            random_state: 42,
        }
    }
}

impl std::fmt::Display for Hyperparameters {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "n_estimators={}, max_depth={}, min_samples_split={}, min_samples_leaf={}",
            self.n_estimators,
            self.max_depth
                .map(|d| d.to_string())
                .unwrap_or_else(|| "None".to_string()),
            self.min_samples_split,
            self.min_samples_leaf
        )
    }
}

/// A fitted forest: the mean of its trees' predictions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Forest {
    trees: Vec<RegressionTree>,
    n_features: usize,
    /// Number of samples used for training
    pub training_samples: usize,
    pub hyperparameters: Hyperparameters,
}

impl Forest {
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    fn predict_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        let total: f64 = self.trees.iter().map(|t| t.predict_row(row)).sum();
        total / self.trees.len() as f64
    }

    /// Get model information as a string
    pub fn info(&self) -> String {
        let deepest = self.trees.iter().map(RegressionTree::depth).max().unwrap_or(0);
        format!(
            "Forest(trees={}, features={}, samples={}, deepest={})",
            self.trees.len(),
            self.n_features,
            self.training_samples,
            deepest
        )
    }
}

impl Regressor for Forest {
    fn predict(&self, features: ArrayView2<'_, f64>) -> Vec<f64> {
        (0..features.nrows())
            .into_par_iter()
            .map(|i| self.predict_row(features.row(i)))
            .collect()
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}

/// Builder for training a model
#[derive(Debug, Clone, Default)]
pub struct ModelBuilder {
    hyperparameters: Hyperparameters,
}

impl ModelBuilder {
    /// Create a new model builder with default settings
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_hyperparameters(hyperparameters: Hyperparameters) -> Self {
        Self { hyperparameters }
    }

    pub fn n_estimators(mut self, n: usize) -> Self {
        self.hyperparameters.n_estimators = n;
        self
    }

    pub fn max_depth(mut self, depth: Option<usize>) -> Self {
        self.hyperparameters.max_depth = depth;
        self
    }

    pub fn min_samples_split(mut self, samples: usize) -> Self {
        self.hyperparameters.min_samples_split = samples;
        self
    }

    pub fn min_samples_leaf(mut self, samples: usize) -> Self {
        self.hyperparameters.min_samples_leaf = samples;
        self
    }

    pub fn random_state(mut self, seed: u64) -> Self {
        self.hyperparameters.random_state = seed;
        self
    }

    pub fn hyperparameters(&self) -> &Hyperparameters {
        &self.hyperparameters
    }

    /// Fit one tree per estimator, each on its own bootstrap sample.
    ///
    /// Tree seeds are drawn before any tree is fit, so the result does not
    /// depend on how rayon schedules the trees.
    pub fn train(&self, x: ArrayView2<'_, f64>, y: &[f64]) -> Result<Forest, TrainingError> {
        let hp = self.hyperparameters;
        let n = x.nrows();
        if n == 0 || y.is_empty() {
            return Err(TrainingError::InsufficientData(0));
        }
        if n != y.len() {
            return Err(TrainingError::MismatchedLengths {
                features: n,
                targets: y.len(),
            });
        }
        if hp.n_estimators == 0 {
            return Err(TrainingError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if hp.min_samples_leaf == 0 {
            return Err(TrainingError::InvalidParameter(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if hp.min_samples_split < 2 {
            return Err(TrainingError::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if let Some((row, col)) = x.indexed_iter().find(|(_, v)| !v.is_finite()).map(|(i, _)| i) {
            return Err(TrainingError::NonFiniteValue { row, column: col });
        }

        let params = TreeParams {
            max_depth: hp.max_depth,
            min_samples_split: hp.min_samples_split,
            min_samples_leaf: hp.min_samples_leaf,
        };
        let mut rng = StdRng::seed_from_u64(hp.random_state);
        let seeds: Vec<u64> = (0..hp.n_estimators).map(|_| rng.r#gen()).collect();

        let trees: Vec<RegressionTree> = seeds
            .par_iter()
            .map(|&seed| {
                let mut rng = StdRng::seed_from_u64(seed);
                let sample: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();
                RegressionTree::fit(x, y, &sample, &params)
            })
            .collect();

        tracing::debug!(
            "Fitted {} trees on {} samples x {} features",
            trees.len(),
            n,
            x.ncols()
        );

        Ok(Forest {
            trees,
            n_features: x.ncols(),
            training_samples: n,
            hyperparameters: hp,
        })
    }
}

/// Calculate mean absolute error
pub fn calculate_mae(predictions: &[f64], targets: &[f64]) -> f64 {
    if predictions.is_empty() || predictions.len() != targets.len() {
        return f64::MAX;
    }

    let sum_abs_error: f64 = predictions
        .iter()
        .zip(targets.iter())
        .map(|(p, t)| (p - t).abs())
        .sum();

    sum_abs_error / predictions.len() as f64
}

/// Errors that can occur during model training
#[derive(Debug, Clone, PartialEq)]
pub enum TrainingError {
    /// Not enough data to train
    InsufficientData(usize),
    /// Feature and target arrays have different lengths
    MismatchedLengths { features: usize, targets: usize },
    /// Hyperparameter outside its valid range
    InvalidParameter(String),
    /// NaN or infinite feature value
    NonFiniteValue { row: usize, column: usize },
}

impl std::fmt::Display for TrainingError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrainingError::InsufficientData(n) => {
                write!(f, "Insufficient data for training: {} samples", n)
            }
            TrainingError::MismatchedLengths { features, targets } => {
                write!(
                    f,
                    "Feature and target lengths mismatch: {} vs {}",
                    features, targets
                )
            }
            TrainingError::InvalidParameter(e) => write!(f, "Invalid hyperparameter: {}", e),
            TrainingError::NonFiniteValue { row, column } => {
                write!(f, "Non-finite feature value at row {}, column {}", row, column)
            }
        }
    }
}

impl std::error::Error for TrainingError {}

#[cfg(test)]
mod tests {
    use approx::assert_relative_eq;
    use ndarray::Array2;

    use super::*;

    /// Two noisy plateaus along the first feature.
    fn create_test_data(n: usize) -> (Array2<f64>, Vec<f64>) {
        let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
            0 => i as f64,
            1 => ((i * 7) % 5) as f64,
            _ => (i as f64 * 0.3).sin(),
        });
        let y = (0..n)
            .map(|i| if i < n / 2 { 10.0 } else { 40.0 } + (i % 3) as f64)
            .collect();
        (x, y)
    }

    #[test]
    fn test_model_builder_customization() {
        let builder = ModelBuilder::new()
            .n_estimators(7)
            .max_depth(None)
            .min_samples_split(4)
            .min_samples_leaf(2)
            .random_state(1);

        let hp = builder.hyperparameters();
        assert_eq!(hp.n_estimators, 7);
        assert_eq!(hp.max_depth, None);
        assert_eq!(hp.min_samples_split, 4);
        assert_eq!(hp.min_samples_leaf, 2);
        assert_eq!(hp.random_state, 1);
    }

    #[test]
    fn test_train_empty_data() {
        let x = Array2::<f64>::zeros((0, 2));
        let result = ModelBuilder::new().train(x.view(), &[]);

        assert!(matches!(result, Err(TrainingError::InsufficientData(0))));
    }

    #[test]
    fn test_train_mismatched_lengths() {
        let (x, _) = create_test_data(10);
        let result = ModelBuilder::new().train(x.view(), &[1.0; 5]);

        assert!(matches!(result, Err(TrainingError::MismatchedLengths { .. })));
    }

    #[test]
    fn test_train_zero_trees() {
        let (x, y) = create_test_data(10);
        let result = ModelBuilder::new().n_estimators(0).train(x.view(), &y);

        assert!(matches!(result, Err(TrainingError::InvalidParameter(_))));
    }

    #[test]
    fn test_train_rejects_nan() {
        let (mut x, y) = create_test_data(10);
        x[[4, 1]] = f64::NAN;
        let result = ModelBuilder::new().train(x.view(), &y);

        assert_eq!(result, Err(TrainingError::NonFiniteValue { row: 4, column: 1 }));
    }

    #[test]
    fn test_forest_learns_plateaus() {
        let (x, y) = create_test_data(60);
        let model = ModelBuilder::new().n_estimators(20).train(x.view(), &y).unwrap();

        let predictions = model.predict(x.view());
        assert_eq!(predictions.len(), 60);
        assert!(calculate_mae(&predictions, &y) < 3.0);
        assert_eq!(model.n_trees(), 20);
        assert_eq!(model.n_features(), 3);
    }

    #[test]
    fn test_same_seed_same_forest() {
        let (x, y) = create_test_data(40);
        let a = ModelBuilder::new().n_estimators(8).random_state(7).train(x.view(), &y).unwrap();
        let b = ModelBuilder::new().n_estimators(8).random_state(7).train(x.view(), &y).unwrap();

        assert_eq!(a, b);
        assert_eq!(a.predict(x.view()), b.predict(x.view()));
    }

    #[test]
    fn test_seed_changes_bootstrap() {
        let (x, y) = create_test_data(40);
        let a = ModelBuilder::new().n_estimators(8).random_state(1).train(x.view(), &y).unwrap();
        let b = ModelBuilder::new().n_estimators(8).random_state(2).train(x.view(), &y).unwrap();

        assert_ne!(a, b);
    }

    #[test]
    fn test_calculate_mae() {
        let predictions = vec![10.0, 20.0, 30.0];
        let targets = vec![12.0, 18.0, 33.0];

        // (2 + 2 + 3) / 3
        assert_relative_eq!(calculate_mae(&predictions, &targets), 7.0 / 3.0, epsilon = 1e-12);
        assert_eq!(calculate_mae(&[], &[]), f64::MAX);
    }

    #[test]
    fn test_model_info() {
        let (x, y) = create_test_data(30);
        let model = ModelBuilder::new().n_estimators(3).train(x.view(), &y).unwrap();

        let info = model.info();
        assert!(info.contains("trees=3"));
        assert!(info.contains("samples=30"));
    }

    #[test]
    fn test_hyperparameters_display() {
        let hp = Hyperparameters {
            max_depth: None,
            ..Hyperparameters::default()
        };
        assert_eq!(
            hp.to_string(),
            "n_estimators=100, max_depth=None, min_samples_split=2, min_samples_leaf=1"
        );
    }
}
