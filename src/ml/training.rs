//! Training and evaluation on a labeled set

use ndarray::ArrayView2;

use super::model::{Forest, Hyperparameters, ModelBuilder, TrainingError, calculate_mae};
use super::persistence::PersistedModel;
use super::split::{LabeledSet, train_test_split};
use crate::error::Result;
use crate::traits::{Clock, Regressor};

/// Held-out split settings for a validation run.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HoldOut {
    pub test_size: f64,
    pub shuffle: bool,
    pub random_state: u64,
}

/// Result of a training run
#[derive(Debug)]
pub struct TrainingResult {
    /// Held-out MAE, when a validation run was requested
    pub validation_mae: Option<f64>,
    /// Forest fitted on every labeled row, with its metadata
    pub persisted: PersistedModel,
}

/// Fit a forest on the whole set.
pub fn train(set: &LabeledSet, hyperparameters: &Hyperparameters) -> Result<Forest> {
    let forest = ModelBuilder::from_hyperparameters(*hyperparameters)
        .train(set.features.view(), &set.targets)?;
    Ok(forest)
}

/// Mean absolute error between rounded predictions and the true counts.
pub fn evaluate(model: &dyn Regressor, x: ArrayView2<'_, f64>, y: &[f64]) -> Result<f64> {
    if x.nrows() != y.len() {
        return Err(TrainingError::MismatchedLengths {
            features: x.nrows(),
            targets: y.len(),
        }
        .into());
    }
    if y.is_empty() {
        return Err(TrainingError::InsufficientData(0).into());
    }

    let rounded: Vec<f64> = model.predict(x).into_iter().map(f64::round).collect();
    Ok(calculate_mae(&rounded, y))
}

/// Fit on the training part of a held-out split and score the rest.
pub fn validate(set: &LabeledSet, hyperparameters: &Hyperparameters, hold_out: HoldOut) -> Result<f64> {
    let (train_part, test_part) = train_test_split(
        set,
        hold_out.test_size,
        hold_out.shuffle,
        hold_out.random_state,
    )?;
    let forest = train(&train_part, hyperparameters)?;
    evaluate(&forest, test_part.features.view(), &test_part.targets)
}

/// Optional validation run, then a final fit on every labeled row.
pub fn train_model(
    set: &LabeledSet,
    hyperparameters: &Hyperparameters,
    hold_out: Option<HoldOut>,
    clock: &dyn Clock,
) -> Result<TrainingResult> {
    let validation_mae = match hold_out {
        Some(hold_out) => {
            let mae = validate(set, hyperparameters, hold_out)?;
            tracing::info!("Validation MAE: {:.4}", mae);
            Some(mae)
        }
        None => None,
    };

    let forest = train(set, hyperparameters)?;
    tracing::info!("Trained {}", forest.info());

    let persisted = PersistedModel::new(forest, set.feature_names.clone(), validation_mae, clock);
    Ok(TrainingResult {
        validation_mae,
        persisted,
    })
}
