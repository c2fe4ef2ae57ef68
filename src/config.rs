use std::path::{Path, PathBuf};

use anyhow::Result;
use config::{Config, Environment, File};
use serde::Deserialize;

use crate::features::{CalendarSpec, ImputationPolicy, RollingFill, RollingSpec};
use crate::ml::{HoldOut, Hyperparameters, LabelAlignment, SearchGrid};
use crate::table::KeyColumns;

#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub data: DataConfig,
    pub features: FeatureConfig,
    pub split: SplitConfig,
    pub model: Hyperparameters,
    pub search: SearchConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DataConfig {
    pub features_train: PathBuf,
    pub features_test: PathBuf,
    pub labels_train: PathBuf,
    pub submission_format: PathBuf,
    pub output_dir: PathBuf,
    pub submission_name: String,
    /// Where `train` saves the fitted model and `predict` loads it from
    pub model_path: Option<PathBuf>,
}

impl DataConfig {
    pub fn submission_path(&self) -> PathBuf {
        self.output_dir.join(&self.submission_name)
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct FeatureConfig {
    pub group_column: String,
    pub year_column: String,
    pub week_column: String,
    pub sort_columns: Vec<String>,
    pub forwardfill_columns: Vec<String>,
    pub imputation: ImputationPolicy,
    pub rolling_columns: Vec<String>,
    pub rolling_windows: Vec<usize>,
    pub partial_windows: bool,
    pub rolling_fill: RollingFill,
    pub cyclical_week: bool,
    pub season_label: bool,
    pub week_cosine: bool,
    pub encoding_columns: Vec<String>,
    pub unused_columns: Vec<String>,
}

impl FeatureConfig {
    pub fn key_columns(&self) -> KeyColumns {
        KeyColumns {
            site: self.group_column.clone(),
            year: self.year_column.clone(),
            week: self.week_column.clone(),
        }
    }

    pub fn rolling_spec(&self) -> RollingSpec {
        RollingSpec {
            columns: self.rolling_columns.clone(),
            windows: self.rolling_windows.clone(),
            partial_windows: self.partial_windows,
        }
    }

    pub fn calendar_spec(&self) -> CalendarSpec {
        CalendarSpec {
            cyclical_week: self.cyclical_week,
            season_label: self.season_label,
            week_cosine: self.week_cosine,
        }
    }
}

impl Default for FeatureConfig {
    fn default() -> Self {
        Self {
            group_column: "city".to_string(),
            year_column: "year".to_string(),
            week_column: "weekofyear".to_string(),
            sort_columns: strings(&["city", "year", "weekofyear"]),
            forwardfill_columns: strings(&["ndvi_ne", "ndvi_nw", "ndvi_se", "ndvi_sw"]),
            imputation: ImputationPolicy::ForwardFillThenMean,
            rolling_columns: strings(&[
                "reanalysis_specific_humidity_g_per_kg",
                "reanalysis_dew_point_temp_k",
                "station_avg_temp_c",
                "station_min_temp_c",
            ]),
            rolling_windows: vec![2, 3, 4],
            partial_windows: true,
            rolling_fill: RollingFill::Mean,
            cyclical_week: true,
            season_label: false,
            week_cosine: false,
            encoding_columns: strings(&["city"]),
            unused_columns: strings(&["week_start_date"]),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SplitConfig {
    pub target_column: String,
    pub alignment: LabelAlignment,
    pub test_size: f64,
    pub shuffle: bool,
    pub random_state: u64,
}

impl SplitConfig {
    pub fn hold_out(&self) -> HoldOut {
        HoldOut {
            test_size: self.test_size,
            shuffle: self.shuffle,
            random_state: self.random_state,
        }
    }
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            target_column: "total_cases".to_string(),
            alignment: LabelAlignment::Key,
            test_size: 0.2,
            shuffle: false,
            random_state: 42,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct SearchConfig {
    pub folds: usize,
    pub n_estimators: Vec<usize>,
    pub max_depth: Vec<usize>,
    pub min_samples_split: Vec<usize>,
    pub min_samples_leaf: Vec<usize>,
}

impl SearchConfig {
    pub fn grid(&self) -> SearchGrid {
        SearchGrid {
            n_estimators: self.n_estimators.clone(),
            max_depth: self.max_depth.clone(),
            min_samples_split: self.min_samples_split.clone(),
            min_samples_leaf: self.min_samples_leaf.clone(),
        }
    }
}

fn strings(values: &[&str]) -> Vec<String> {
    values.iter().map(|s| s.to_string()).collect()
}

impl AppConfig {
    /// Layered load: built-in defaults, `config.toml` in the working
    /// directory, the user config directory, an explicit file, then
    /// `DENGUE__SECTION__KEY` environment variables.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        // Load .env file (silently ignore if not present)
        let _ = dotenvy::dotenv();

        let config_dir = dirs::config_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dengue-forecast");

        let mut builder = Config::builder()
            // 1. Load default values
            // Data
            .set_default("data.features_train", "data/01_raw/dengue_features_train.csv")?
            .set_default("data.features_test", "data/01_raw/dengue_features_test.csv")?
            .set_default("data.labels_train", "data/01_raw/dengue_labels_train.csv")?
            .set_default("data.submission_format", "data/01_raw/submission_format.csv")?
            .set_default("data.output_dir", "data/07_model_output")?
            .set_default("data.submission_name", "submission.csv")?
            .set_default("data.model_path", None::<String>)?
            // Features
            .set_default("features.group_column", "city")?
            .set_default("features.year_column", "year")?
            .set_default("features.week_column", "weekofyear")?
            .set_default("features.sort_columns", vec!["city", "year", "weekofyear"])?
            .set_default(
                "features.forwardfill_columns",
                vec!["ndvi_ne", "ndvi_nw", "ndvi_se", "ndvi_sw"],
            )?
            .set_default("features.imputation", "forward_fill_then_mean")?
            .set_default(
                "features.rolling_columns",
                vec![
                    "reanalysis_specific_humidity_g_per_kg",
                    "reanalysis_dew_point_temp_k",
                    "station_avg_temp_c",
                    "station_min_temp_c",
                ],
            )?
            .set_default("features.rolling_windows", vec![2i64, 3, 4])?
            .set_default("features.partial_windows", true)?
            .set_default("features.rolling_fill", "mean")?
            .set_default("features.cyclical_week", true)?
            .set_default("features.season_label", false)?
            .set_default("features.week_cosine", false)?
            .set_default("features.encoding_columns", vec!["city"])?
            .set_default("features.unused_columns", vec!["week_start_date"])?
            // Split
            .set_default("split.target_column", "total_cases")?
            .set_default("split.alignment", "key")?
            .set_default("split.test_size", 0.2)?
            .set_default("split.shuffle", false)?
            .set_default("split.random_state", 42)?
            // Model
            .set_default("model.n_estimators", 100)?
            .set_default("model.max_depth", 10)?
            .set_default("model.min_samples_split", 2)?
            .set_default("model.min_samples_leaf", 1)?
            .set_default("model.random_state", 42)?
            // Search
            .set_default("search.folds", 5)?
            .set_default("search.n_estimators", vec![50i64, 100, 200])?
            .set_default("search.max_depth", vec![5i64, 10, 20])?
            .set_default("search.min_samples_split", vec![2i64, 5])?
            .set_default("search.min_samples_leaf", vec![1i64, 2])?

            // 2. Load from local config file (optional, lowest priority)
            .add_source(File::from(PathBuf::from("config.toml")).required(false))

            // 3. Load from user config directory (optional, overrides local)
            .add_source(File::from(config_dir.join("config.toml")).required(false));

        // 4. Explicit --config file (must exist)
        if let Some(path) = explicit {
            builder = builder.add_source(File::from(path.to_path_buf()).required(true));
        }

        // 5. Environment variables (DENGUE__SPLIT__TEST_SIZE=...)
        let builder = builder.add_source(Environment::with_prefix("DENGUE").separator("__"));

        let s = builder.build()?;
        Ok(s.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    // ==================== Default Value Tests ====================

    #[test]
    fn test_feature_config_defaults() {
        let config = FeatureConfig::default();
        assert_eq!(config.sort_columns, vec!["city", "year", "weekofyear"]);
        assert_eq!(config.rolling_windows, vec![2, 3, 4]);
        assert_eq!(config.imputation, ImputationPolicy::ForwardFillThenMean);
        assert!(config.partial_windows);
        assert_eq!(config.rolling_fill, RollingFill::Mean);
        assert!(config.cyclical_week);
        assert!(!config.season_label);
    }

    #[test]
    fn test_split_config_defaults() {
        let config = SplitConfig::default();
        assert_eq!(config.target_column, "total_cases");
        assert_eq!(config.alignment, LabelAlignment::Key);
        assert_eq!(config.test_size, 0.2);
        assert!(!config.shuffle);
    }

    #[test]
    fn test_key_columns_from_feature_config() {
        let keys = FeatureConfig::default().key_columns();
        assert_eq!(keys, KeyColumns::default());
    }

    // ==================== Config Loading Tests ====================

    #[test]
    fn test_loaded_config_matches_struct_defaults() {
        let config = AppConfig::load(None).expect("Config should load");
        let defaults = FeatureConfig::default();

        assert_eq!(config.features.rolling_columns, defaults.rolling_columns);
        assert_eq!(config.features.forwardfill_columns, defaults.forwardfill_columns);
        assert_eq!(config.features.unused_columns, defaults.unused_columns);
        assert_eq!(config.features.rolling_fill, defaults.rolling_fill);
        assert_eq!(config.model.max_depth, Some(10));
        assert_eq!(config.search.grid(), SearchGrid::default());
        assert_eq!(config.search.folds, 5);
        assert!(config.data.model_path.is_none());
        assert_eq!(
            config.data.submission_path(),
            PathBuf::from("data/07_model_output/submission.csv")
        );
    }

    #[test]
    fn test_explicit_config_file_overrides_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("pipeline.toml");
        let mut file = std::fs::File::create(&path).unwrap();
        writeln!(
            file,
            r#"
[features]
imputation = "forward_fill_only"
rolling_windows = [3]
partial_windows = false
rolling_fill = "backward"
season_label = true

[model]
n_estimators = 7
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(&path)).expect("Config should load");

        assert_eq!(config.features.imputation, ImputationPolicy::ForwardFillOnly);
        assert_eq!(config.features.rolling_windows, vec![3]);
        assert!(!config.features.partial_windows);
        assert_eq!(config.features.rolling_fill, RollingFill::Backward);
        assert!(config.features.season_label);
        assert_eq!(config.model.n_estimators, 7);
        // Untouched keys keep their defaults
        assert_eq!(config.model.min_samples_split, 2);
        assert_eq!(config.features.group_column, "city");
    }

    #[test]
    fn test_missing_explicit_config_file() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/pipeline.toml")));
        assert!(result.is_err());
    }

    // ==================== Environment Variable Override Tests ====================

    /// Helper to safely set and remove environment variables in tests.
    fn with_env_var<F, R>(key: &str, value: &str, f: F) -> R
    where
        F: FnOnce() -> R,
    {
        // SAFETY: Test environment, the key is not read by any other test
        unsafe {
            std::env::set_var(key, value);
        }
        let result = f();
        unsafe {
            std::env::remove_var(key);
        }
        result
    }

    #[test]
    fn test_env_var_overrides_alignment() {
        let config = with_env_var("DENGUE__SPLIT__ALIGNMENT", "position", || {
            AppConfig::load(None).expect("Config should load")
        });

        assert_eq!(
            config.split.alignment,
            LabelAlignment::Position,
            "Environment variable should override split.alignment"
        );
    }
}
