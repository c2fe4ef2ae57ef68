//! Typed errors shared by every pipeline stage.

use polars::prelude::{DataType, PolarsError};
use thiserror::Error;

use crate::ml::model::TrainingError;
use crate::ml::persistence::PersistenceError;
use crate::table::RowKey;

/// Errors raised by the feature and prediction stages.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("unknown column `{0}`")]
    UnknownColumn(String),
    #[error("duplicate column `{0}`")]
    DuplicateColumn(String),
    #[error("schema mismatch: {0}")]
    SchemaMismatch(String),
    #[error("column `{column}` is {dtype}, expected a numeric column")]
    NonNumericColumn { column: String, dtype: DataType },
    #[error("column `{0}` holds floating point values and cannot be one-hot encoded")]
    NonCategoricalColumn(String),
    #[error("column `{column}` has a missing value at row {row}")]
    MissingValue { column: String, row: usize },
    #[error("week {0} is outside 1..=53")]
    InvalidWeek(i64),
    #[error("duplicate key {0}")]
    DuplicateKey(RowKey),
    #[error("no label for key {0}")]
    MissingLabel(RowKey),
    #[error("row count mismatch: {features} labeled feature rows vs {labels} label rows")]
    RowCountMismatch { features: usize, labels: usize },
    #[error("invalid target value at row {row}: {value}")]
    InvalidTarget { row: usize, value: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
    #[error(transparent)]
    Training(#[from] TrainingError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("CSV error in {path}: {source}")]
    Csv {
        path: String,
        #[source]
        source: csv::Error,
    },
    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
