//! Feature engineering stages
//!
//! Each stage is a pure function from one frame to the next:
//! - `merge`: concatenation with origin tags, temporal sort
//! - `impute`: grouped forward-fill, mean imputation, filling undefined rolling means
//! - `rolling`: causal trailing means per group
//! - `calendar`: week-of-year encodings
//! - `prune`: dropping unused columns
//! - `encode`: one-hot encoding and the numeric check

pub mod calendar;
pub mod encode;
pub mod impute;
pub mod merge;
pub mod prune;
pub mod rolling;

pub use calendar::{CalendarSpec, Season, add_calendar_features};
pub use encode::{CategoryMap, Encoding, ensure_numeric, one_hot_encode};
pub use impute::{ImputationPolicy, RollingFill, fill_rolling_gaps, impute};
pub use merge::{OrderedTable, merge, sort};
pub use prune::drop_columns;
pub use rolling::{RollingSpec, add_rolling_means, rolling_column_name};
