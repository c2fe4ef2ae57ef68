//! Row keys and typed access to frame columns
//!
//! Every feature stage works on a polars [`DataFrame`]. Column order is kept
//! through the stages and becomes the order of the final feature matrix.

use std::fmt;

use polars::prelude::*;

use crate::error::{PipelineError, Result};

/// Name of the column that records which partition a row came from.
pub const ORIGIN_COLUMN: &str = "source";

/// Partition a row belongs to after merging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Origin {
    /// Rows with known case counts
    Labeled,
    /// Rows to be predicted
    Unlabeled,
}

impl Origin {
    pub fn as_str(&self) -> &'static str {
        match self {
            Origin::Labeled => "train",
            Origin::Unlabeled => "test",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "train" => Some(Origin::Labeled),
            "test" => Some(Origin::Unlabeled),
            _ => None,
        }
    }
}

/// Join key of one weekly observation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RowKey {
    pub site: String,
    pub year: i64,
    pub week: i64,
}

impl RowKey {
    pub fn new(site: impl Into<String>, year: i64, week: i64) -> Self {
        Self {
            site: site.into(),
            year,
            week,
        }
    }
}

impl fmt::Display for RowKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {}, {})", self.site, self.year, self.week)
    }
}

/// Names of the columns that make up a [`RowKey`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyColumns {
    pub site: String,
    pub year: String,
    pub week: String,
}

impl Default for KeyColumns {
    fn default() -> Self {
        Self {
            site: "city".to_string(),
            year: "year".to_string(),
            week: "weekofyear".to_string(),
        }
    }
}

pub fn has_column(frame: &DataFrame, name: &str) -> bool {
    frame.get_column_index(name).is_some()
}

/// Column by name; an absent column is [`PipelineError::UnknownColumn`].
pub fn column<'a>(frame: &'a DataFrame, name: &str) -> Result<&'a Series> {
    let index = frame
        .get_column_index(name)
        .ok_or_else(|| PipelineError::UnknownColumn(name.to_string()))?;
    Ok(frame.get_columns()[index].as_materialized_series())
}

pub fn column_names(frame: &DataFrame) -> Vec<String> {
    frame
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Integer and float columns; everything else needs encoding first.
pub fn is_numeric(dtype: &DataType) -> bool {
    dtype.is_integer() || dtype.is_float()
}

fn non_numeric(series: &Series) -> PipelineError {
    PipelineError::NonNumericColumn {
        column: series.name().to_string(),
        dtype: series.dtype().clone(),
    }
}

/// Numeric cells widened to `f64`, gaps kept.
pub fn floats(series: &Series) -> Result<Vec<Option<f64>>> {
    if !is_numeric(series.dtype()) {
        return Err(non_numeric(series));
    }
    let widened = series.cast(&DataType::Float64)?;
    Ok(widened.f64()?.into_iter().collect())
}

/// Integral cells, accepting whole-valued floats. Gaps are errors.
pub fn integers(series: &Series) -> Result<Vec<i64>> {
    let name = series.name().to_string();
    let missing = |row: usize| PipelineError::MissingValue {
        column: name.clone(),
        row,
    };

    if series.dtype().is_integer() {
        let values = series.cast(&DataType::Int64)?;
        return values
            .i64()?
            .into_iter()
            .enumerate()
            .map(|(row, v)| v.ok_or_else(|| missing(row)))
            .collect();
    }

    floats(series)?
        .into_iter()
        .enumerate()
        .map(|(row, v)| match v {
            Some(x) if x.fract() == 0.0 => Ok(x as i64),
            Some(_) => Err(non_numeric(series)),
            None => Err(missing(row)),
        })
        .collect()
}

/// Categorical view of every cell. Integers are read by their decimal text;
/// floats have no categorical view.
pub fn labels(series: &Series) -> Result<Vec<String>> {
    if series.dtype().is_float() {
        return Err(PipelineError::NonCategoricalColumn(series.name().to_string()));
    }
    let text = series.cast(&DataType::String)?;
    text.str()?
        .into_iter()
        .enumerate()
        .map(|(row, v)| {
            v.map(str::to_string)
                .ok_or_else(|| PipelineError::MissingValue {
                    column: series.name().to_string(),
                    row,
                })
        })
        .collect()
}

/// The key of every row, read from the three key columns.
pub fn key_rows(frame: &DataFrame, keys: &KeyColumns) -> Result<Vec<RowKey>> {
    let sites = labels(column(frame, &keys.site)?)?;
    zip_keys(sites, frame, keys)
}

/// Pair externally decoded site names with the year and week columns.
pub(crate) fn zip_keys(sites: Vec<String>, frame: &DataFrame, keys: &KeyColumns) -> Result<Vec<RowKey>> {
    let years = integers(column(frame, &keys.year)?)?;
    let weeks = integers(column(frame, &keys.week)?)?;
    Ok(sites
        .into_iter()
        .zip(years)
        .zip(weeks)
        .map(|((site, year), week)| RowKey::new(site, year, week))
        .collect())
}
