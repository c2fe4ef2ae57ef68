//! Wiring of the feature stages and the data files they read

use polars::prelude::DataFrame;

use crate::config::{AppConfig, DataConfig, FeatureConfig};
use crate::error::Result;
use crate::features::{
    Encoding, add_calendar_features, add_rolling_means, drop_columns, ensure_numeric,
    fill_rolling_gaps, impute, merge, one_hot_encode, sort,
};
use crate::io::read_table;
use crate::ml::{LabelTable, LabeledSet, SubmissionTemplate, split};

/// The engineered frame, still carrying the origin column, and the fitted
/// category maps.
#[derive(Debug, Clone)]
pub struct EngineeredFeatures {
    pub frame: DataFrame,
    pub encoding: Encoding,
}

/// Runs every feature stage in order.
#[derive(Debug, Clone)]
pub struct FeaturePipeline {
    config: FeatureConfig,
}

impl FeaturePipeline {
    pub fn new(config: FeatureConfig) -> Self {
        Self { config }
    }

    /// Merge, sort, impute, roll, fill undefined rolling means, add calendar
    /// columns, prune, encode, then check that every column is numeric.
    ///
    /// Both partitions live in one frame from the merge on, so they always
    /// share column names and types once split apart again.
    pub fn run(&self, labeled: &DataFrame, unlabeled: &DataFrame) -> Result<EngineeredFeatures> {
        let cfg = &self.config;

        let merged = merge(labeled, unlabeled)?;
        let ordered = sort(&merged, &cfg.sort_columns)?;
        let imputed = impute(
            &ordered,
            &cfg.group_column,
            &cfg.forwardfill_columns,
            cfg.imputation,
        )?;
        let rolling = cfg.rolling_spec();
        let rolled = add_rolling_means(&imputed, &cfg.group_column, &rolling)?;
        let filled = fill_rolling_gaps(
            &rolled,
            &cfg.group_column,
            &rolling.output_columns(),
            cfg.rolling_fill,
        )?;
        let dated = add_calendar_features(&filled, &cfg.week_column, cfg.calendar_spec())?;

        let pruned = drop_columns(&dated.into_inner(), &cfg.unused_columns)?;
        let (frame, encoding) = one_hot_encode(&pruned, &cfg.encoding_columns)?;
        ensure_numeric(&frame)?;

        tracing::info!(
            "Engineered {} rows x {} columns",
            frame.height(),
            frame.width()
        );
        Ok(EngineeredFeatures { frame, encoding })
    }
}

/// The four input files.
#[derive(Debug, Clone)]
pub struct RawData {
    pub features_train: DataFrame,
    pub features_test: DataFrame,
    pub labels_train: DataFrame,
    pub submission_format: DataFrame,
}

impl RawData {
    pub fn load(data: &DataConfig) -> Result<Self> {
        Ok(Self {
            features_train: read_table(&data.features_train)?,
            features_test: read_table(&data.features_test)?,
            labels_train: read_table(&data.labels_train)?,
            submission_format: read_table(&data.submission_format)?,
        })
    }
}

/// Everything the commands need after feature engineering.
#[derive(Debug, Clone)]
pub struct Prepared {
    pub features: EngineeredFeatures,
    pub labeled: LabeledSet,
    pub template: SubmissionTemplate,
}

/// Engineer features and pair the labeled rows with their targets.
pub fn prepare(raw: &RawData, config: &AppConfig) -> Result<Prepared> {
    let keys = config.features.key_columns();
    let target = &config.split.target_column;

    let features = FeaturePipeline::new(config.features.clone())
        .run(&raw.features_train, &raw.features_test)?;
    let labels = LabelTable::from_table(&raw.labels_train, &keys, target)?;
    let labeled = split(
        &features.frame,
        &features.encoding,
        &labels,
        &keys,
        config.split.alignment,
    )?;
    let template = SubmissionTemplate::from_table(&raw.submission_format, &keys, target)?;

    Ok(Prepared {
        features,
        labeled,
        template,
    })
}
