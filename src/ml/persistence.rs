//! Saved forests
//!
//! A model file is the bincode encoding of [`PersistedModel`]: the forest plus
//! the feature columns it was fitted on, so `predict` can refuse a feature
//! table that was engineered with a different configuration.

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::model::{Forest, Hyperparameters};
use crate::traits::Clock;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersistedModel {
    /// File layout version, bumped whenever the encoded shape changes
    pub format: u32,
    pub trained_at: DateTime<Utc>,
    pub hyperparameters: Hyperparameters,
    /// Feature columns in training order
    pub feature_names: Vec<String>,
    pub training_samples: usize,
    /// Held-out MAE of rounded predictions, when `train --validate` ran
    pub validation_mae: Option<f64>,
    pub forest: Forest,
}

impl PersistedModel {
    pub const FORMAT: u32 = 1;

    pub fn new(
        forest: Forest,
        feature_names: Vec<String>,
        validation_mae: Option<f64>,
        clock: &dyn Clock,
    ) -> Self {
        Self {
            format: Self::FORMAT,
            trained_at: clock.now_utc(),
            hyperparameters: forest.hyperparameters,
            feature_names,
            training_samples: forest.training_samples,
            validation_mae,
            forest,
        }
    }

    /// Write the model, creating parent directories. The bytes go to a
    /// sibling `.part` file first and are renamed into place.
    pub fn save(&self, path: &Path) -> Result<(), PersistenceError> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| PersistenceError::io(parent, &e))?;
        }

        let bytes = bincode::serialize(self).map_err(|e| PersistenceError::Encode(e.to_string()))?;
        let staging = path.with_extension("part");
        fs::write(&staging, bytes).map_err(|e| PersistenceError::io(&staging, &e))?;
        fs::rename(&staging, path).map_err(|e| PersistenceError::io(path, &e))?;

        tracing::info!("Saved {} to {}", self.forest.info(), path.display());
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self, PersistenceError> {
        let bytes = fs::read(path).map_err(|e| match e.kind() {
            ErrorKind::NotFound => PersistenceError::Missing(path.to_path_buf()),
            _ => PersistenceError::io(path, &e),
        })?;

        let model: Self = bincode::deserialize(&bytes).map_err(|e| PersistenceError::Decode {
            path: path.to_path_buf(),
            detail: e.to_string(),
        })?;
        if model.format != Self::FORMAT {
            return Err(PersistenceError::UnsupportedFormat {
                found: model.format,
                supported: Self::FORMAT,
            });
        }

        tracing::debug!("Loaded model from {}", path.display());
        Ok(model)
    }

    /// The saved model only applies to features with the same columns in the
    /// same order.
    pub fn check_features(&self, names: &[String]) -> Result<(), PersistenceError> {
        if self.feature_names == names {
            return Ok(());
        }
        let first_difference = self
            .feature_names
            .iter()
            .zip(names)
            .position(|(a, b)| a != b)
            .unwrap_or_else(|| self.feature_names.len().min(names.len()));
        Err(PersistenceError::FeatureMismatch {
            expected: self.feature_names.len(),
            found: names.len(),
            first_difference,
        })
    }

    pub fn summary(&self) -> String {
        let mae = match self.validation_mae {
            Some(mae) => format!("{:.2}", mae),
            None => "not measured".to_string(),
        };
        format!(
            "{} fitted on {} weeks x {} features ({}), held-out MAE {}, trained {}",
            self.forest.info(),
            self.training_samples,
            self.feature_names.len(),
            self.hyperparameters,
            mae,
            self.trained_at.format("%Y-%m-%d %H:%M UTC")
        )
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PersistenceError {
    /// No model file at the path
    Missing(PathBuf),
    Io { path: PathBuf, detail: String },
    Encode(String),
    Decode { path: PathBuf, detail: String },
    /// Written by a build with a different file layout
    UnsupportedFormat { found: u32, supported: u32 },
    /// Feature columns differ from those the model was fitted on
    FeatureMismatch {
        expected: usize,
        found: usize,
        first_difference: usize,
    },
}

impl PersistenceError {
    fn io(path: &Path, error: &std::io::Error) -> Self {
        PersistenceError::Io {
            path: path.to_path_buf(),
            detail: error.to_string(),
        }
    }
}

impl std::fmt::Display for PersistenceError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PersistenceError::Missing(path) => {
                write!(f, "No saved model at {}, run `train` first", path.display())
            }
            PersistenceError::Io { path, detail } => write!(f, "{}: {}", path.display(), detail),
            PersistenceError::Encode(detail) => write!(f, "Could not encode model: {}", detail),
            PersistenceError::Decode { path, detail } => {
                write!(f, "{} is not a model file: {}", path.display(), detail)
            }
            PersistenceError::UnsupportedFormat { found, supported } => write!(
                f,
                "Model file format {} is not supported (this build reads format {})",
                found, supported
            ),
            PersistenceError::FeatureMismatch {
                expected,
                found,
                first_difference,
            } => write!(
                f,
                "Model was fitted on {} feature columns, got {} (first difference at column {})",
                expected, found, first_difference
            ),
        }
    }
}

impl std::error::Error for PersistenceError {}

#[cfg(test)]
mod tests {
    use chrono::TimeZone;
    use ndarray::Array2;
    use tempfile::tempdir;

    use super::*;
    use crate::ml::model::ModelBuilder;
    use crate::traits::{FixedClock, Regressor};

    fn names(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    fn fitted() -> PersistedModel {
        let x = Array2::from_shape_fn((20, 2), |(i, j)| (i * (j + 1)) as f64);
        let y: Vec<f64> = (0..20).map(|i| (i / 5) as f64).collect();
        let forest = ModelBuilder::new()
            .n_estimators(4)
            .train(x.view(), &y)
            .unwrap();
        let clock = FixedClock(Utc.with_ymd_and_hms(2024, 6, 15, 14, 30, 0).unwrap());

        PersistedModel::new(forest, names(&["city_sj", "station_avg_temp_c"]), Some(6.2), &clock)
    }

    #[test]
    fn test_new_copies_forest_metadata() {
        let model = fitted();

        assert_eq!(model.format, PersistedModel::FORMAT);
        assert_eq!(model.training_samples, 20);
        assert_eq!(model.hyperparameters.n_estimators, 4);
        assert_eq!(model.validation_mae, Some(6.2));
    }

    #[test]
    fn test_saved_model_predicts_the_same() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forest.bin");

        let model = fitted();
        model.save(&path).unwrap();
        let loaded = PersistedModel::load(&path).unwrap();

        assert_eq!(loaded.trained_at, model.trained_at);
        assert_eq!(loaded.feature_names, model.feature_names);
        assert_eq!(loaded.forest, model.forest);
        assert!(!path.with_extension("part").exists());

        let x = Array2::from_shape_fn((3, 2), |(i, j)| (i + j) as f64);
        assert_eq!(loaded.forest.predict(x.view()), model.forest.predict(x.view()));
    }

    #[test]
    fn test_save_creates_parent_dirs() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("07_model_output").join("forest.bin");

        fitted().save(&path).unwrap();
        assert!(path.exists());
    }

    #[test]
    fn test_load_missing_file() {
        let path = Path::new("/nonexistent/forest.bin");
        assert_eq!(
            PersistedModel::load(path).unwrap_err(),
            PersistenceError::Missing(path.to_path_buf())
        );
    }

    #[test]
    fn test_load_rejects_other_format() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forest.bin");

        let mut model = fitted();
        model.format = PersistedModel::FORMAT + 1;
        model.save(&path).unwrap();

        assert!(matches!(
            PersistedModel::load(&path),
            Err(PersistenceError::UnsupportedFormat { found: 2, supported: 1 })
        ));
    }

    #[test]
    fn test_load_rejects_garbage() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("forest.bin");
        fs::write(&path, b"city,year\n").unwrap();

        assert!(matches!(
            PersistedModel::load(&path),
            Err(PersistenceError::Decode { .. })
        ));
    }

    #[test]
    fn test_check_features() {
        let model = fitted();
        assert!(model.check_features(&names(&["city_sj", "station_avg_temp_c"])).is_ok());

        assert_eq!(
            model.check_features(&names(&["city_sj", "station_min_temp_c"])),
            Err(PersistenceError::FeatureMismatch {
                expected: 2,
                found: 2,
                first_difference: 1,
            })
        );
        assert_eq!(
            model.check_features(&names(&["city_sj"])),
            Err(PersistenceError::FeatureMismatch {
                expected: 2,
                found: 1,
                first_difference: 1,
            })
        );
    }

    #[test]
    fn test_summary() {
        let summary = fitted().summary();

        assert!(summary.contains("20 weeks x 2 features"));
        assert!(summary.contains("n_estimators=4"));
        assert!(summary.contains("held-out MAE 6.20"));
        assert!(summary.contains("2024-06-15 14:30 UTC"));
    }
}
