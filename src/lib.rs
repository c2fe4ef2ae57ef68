//! Dengue Forecast Library
//!
//! Weekly dengue case forecasting per city: feature engineering over the
//! labeled and unlabeled observation tables, a bagged regression-tree
//! forest, and reconciliation of predictions onto a submission template.

pub mod config;
pub mod error;
pub mod features;
pub mod io;
pub mod ml;
pub mod pipeline;
pub mod table;
pub mod traits;

// Re-export commonly used types
pub use config::AppConfig;
pub use error::{PipelineError, Result};
pub use features::{Encoding, ImputationPolicy, OrderedTable, RollingFill};
pub use ml::{
    Forest, Hyperparameters, LabelAlignment, LabeledSet, PersistedModel, SearchGrid,
    SearchOutcome, Submission, SubmissionTemplate,
};
pub use pipeline::{EngineeredFeatures, FeaturePipeline, Prepared, RawData, prepare};
pub use table::{KeyColumns, ORIGIN_COLUMN, Origin, RowKey};
pub use traits::{Clock, FixedClock, Regressor, SystemClock};
