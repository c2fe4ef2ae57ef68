//! Merging the two partitions and ordering them in time

use std::collections::BTreeSet;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::table::{ORIGIN_COLUMN, Origin, column, column_names, has_column, is_numeric};

/// Concatenate labeled and unlabeled rows and tag each with its origin.
///
/// Labeled rows come first. Both frames must carry the same column names;
/// the unlabeled columns are realigned to the labeled column order. Integer
/// and float columns widen to float, text never mixes with numbers.
pub fn merge(labeled: &DataFrame, unlabeled: &DataFrame) -> Result<DataFrame> {
    if has_column(labeled, ORIGIN_COLUMN) || has_column(unlabeled, ORIGIN_COLUMN) {
        return Err(PipelineError::SchemaMismatch(format!(
            "input already carries an `{}` column",
            ORIGIN_COLUMN
        )));
    }

    let names = column_names(labeled);
    let left: BTreeSet<&str> = names.iter().map(String::as_str).collect();
    let right_names = column_names(unlabeled);
    let right: BTreeSet<&str> = right_names.iter().map(String::as_str).collect();
    if left != right {
        let only_left: Vec<&str> = left.difference(&right).copied().collect();
        let only_right: Vec<&str> = right.difference(&left).copied().collect();
        return Err(PipelineError::SchemaMismatch(format!(
            "columns only in labeled: {:?}, only in unlabeled: {:?}",
            only_left, only_right
        )));
    }

    for name in &names {
        let a = column(labeled, name)?.dtype();
        let b = column(unlabeled, name)?.dtype();
        if is_numeric(a) != is_numeric(b) {
            return Err(PipelineError::SchemaMismatch(format!(
                "column `{}` is {} in labeled rows and {} in unlabeled rows",
                name, a, b
            )));
        }
    }

    let aligned = unlabeled.select(names.clone())?;
    let tagged = |frame: DataFrame, origin: Origin| {
        frame
            .lazy()
            .with_column(lit(origin.as_str()).alias(ORIGIN_COLUMN))
    };
    let merged = concat(
        [
            tagged(labeled.clone(), Origin::Labeled),
            tagged(aligned, Origin::Unlabeled),
        ],
        UnionArgs {
            to_supertypes: true,
            ..Default::default()
        },
    )?
    .collect()?;

    tracing::debug!(
        "Merged {} labeled and {} unlabeled rows",
        labeled.height(),
        unlabeled.height()
    );
    Ok(merged)
}

/// A frame known to be sorted ascending by `keys`.
///
/// Only [`sort`] and [`OrderedTable::verify`] construct one, so the grouped
/// forward-fill and rolling stages can rely on time order within each group.
#[derive(Debug, Clone)]
pub struct OrderedTable {
    frame: DataFrame,
    keys: Vec<String>,
}

impl OrderedTable {
    /// Accept a frame that is already sorted by `keys`, without reordering.
    pub fn verify(frame: DataFrame, keys: &[String]) -> Result<Self> {
        let sorted = sort_frame(&frame, keys)?;
        if !sorted.equals_missing(&frame) {
            return Err(PipelineError::InvalidConfig(format!(
                "rows are out of order for keys {:?}",
                keys
            )));
        }
        Ok(Self {
            frame,
            keys: keys.to_vec(),
        })
    }

    pub fn frame(&self) -> &DataFrame {
        &self.frame
    }

    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    pub fn into_inner(self) -> DataFrame {
        self.frame
    }

    /// Wrap a frame derived from this one by a row-preserving transform.
    pub(crate) fn derive(&self, frame: DataFrame) -> Self {
        debug_assert_eq!(frame.height(), self.frame.height());
        Self {
            frame,
            keys: self.keys.clone(),
        }
    }
}

fn sort_frame(frame: &DataFrame, keys: &[String]) -> Result<DataFrame> {
    if keys.is_empty() {
        return Err(PipelineError::InvalidConfig(
            "at least one sort column is required".to_string(),
        ));
    }
    for key in keys {
        column(frame, key)?;
    }

    let options = SortMultipleOptions::default()
        .with_maintain_order(true)
        .with_nulls_last(true);
    Ok(frame.sort(keys.to_vec(), options)?)
}

/// Stable ascending sort by each key in sequence; ties keep input order and
/// missing keys sort last.
pub fn sort(frame: &DataFrame, keys: &[String]) -> Result<OrderedTable> {
    Ok(OrderedTable {
        frame: sort_frame(frame, keys)?,
        keys: keys.to_vec(),
    })
}
