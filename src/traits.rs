//! Seams for the wall clock and for the fitted model.
//!
//! - `Clock`: stamps saved models; `FixedClock` pins it in tests
//! - `Regressor`: anything that maps a feature matrix to predictions

use chrono::{DateTime, Utc};
use ndarray::ArrayView2;

// ==================== Clock Trait ====================

pub trait Clock: Send + Sync {
    fn now_utc(&self) -> DateTime<Utc>;
}

#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now_utc(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Clock stopped at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FixedClock(pub DateTime<Utc>);

impl Clock for FixedClock {
    fn now_utc(&self) -> DateTime<Utc> {
        self.0
    }
}

// ==================== Regressor Trait ====================

/// A fitted model that predicts one value per feature row.
pub trait Regressor: Send + Sync {
    /// Predict every row of `features`. Column order must match training.
    fn predict(&self, features: ArrayView2<'_, f64>) -> Vec<f64>;

    /// Number of feature columns the model was fitted on.
    fn n_features(&self) -> usize;
}

/// Regressor that always predicts the same value. Useful to test the
/// reconciliation stage without fitting a forest.
#[derive(Debug, Clone, PartialEq)]
pub struct ConstantRegressor {
    pub value: f64,
    pub n_features: usize,
}

impl Regressor for ConstantRegressor {
    fn predict(&self, features: ArrayView2<'_, f64>) -> Vec<f64> {
        vec![self.value; features.nrows()]
    }

    fn n_features(&self) -> usize {
        self.n_features
    }
}
