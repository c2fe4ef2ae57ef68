//! Causal rolling means per group

use polars::prelude::*;

use super::merge::OrderedTable;
use crate::error::{PipelineError, Result};
use crate::table::{column, is_numeric};

/// Which columns get trailing means, over which window sizes.
#[derive(Debug, Clone, PartialEq)]
pub struct RollingSpec {
    pub columns: Vec<String>,
    pub windows: Vec<usize>,
    /// Average over the rows seen so far while a group is shorter than the
    /// window, instead of leaving the value undefined.
    pub partial_windows: bool,
}

impl RollingSpec {
    /// Every column [`add_rolling_means`] appends, in the order it appends them.
    pub fn output_columns(&self) -> Vec<String> {
        self.windows
            .iter()
            .flat_map(|&w| self.columns.iter().map(move |c| rolling_column_name(w, c)))
            .collect()
    }
}

/// Output column name for a window over `column`.
pub fn rolling_column_name(window: usize, column: &str) -> String {
    format!("rolling_avg_{}_{}", window, column)
}

/// Append one trailing-mean column per (window, source column) pair.
///
/// Each value only looks at the current row and earlier rows of the same
/// group. Missing source values are skipped; a mean needs one present value
/// with partial windows and a full window of present values otherwise.
/// Undefined means stay missing here; see [`super::fill_rolling_gaps`].
pub fn add_rolling_means(
    table: &OrderedTable,
    group_column: &str,
    spec: &RollingSpec,
) -> Result<OrderedTable> {
    if let Some(&window) = spec.windows.iter().find(|&&w| w == 0) {
        return Err(PipelineError::InvalidConfig(format!(
            "rolling window must be positive, got {}",
            window
        )));
    }

    let source = table.frame();
    column(source, group_column)?;
    for name in &spec.columns {
        let series = column(source, name)?;
        if !is_numeric(series.dtype()) {
            return Err(PipelineError::NonNumericColumn {
                column: name.clone(),
                dtype: series.dtype().clone(),
            });
        }
    }

    let mut means = Vec::new();
    for &window in &spec.windows {
        let options = RollingOptionsFixedWindow {
            window_size: window,
            min_periods: if spec.partial_windows { 1 } else { window },
            ..Default::default()
        };
        for name in &spec.columns {
            means.push(
                col(name.as_str())
                    .cast(DataType::Float64)
                    .rolling_mean(options.clone())
                    .over([col(group_column)])
                    .alias(rolling_column_name(window, name).as_str()),
            );
        }
    }
    if means.is_empty() {
        return Ok(table.clone());
    }
    let out = source.clone().lazy().with_columns(means).collect()?;

    let undefined: usize = spec
        .output_columns()
        .iter()
        .map(|name| column(&out, name).map(|s| s.null_count()))
        .sum::<Result<usize>>()?;
    tracing::debug!(
        "Added {} rolling columns over windows {:?}, {} means undefined",
        spec.windows.len() * spec.columns.len(),
        spec.windows,
        undefined
    );
    Ok(table.derive(out))
}
