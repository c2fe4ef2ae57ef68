//! Missing value imputation

use polars::prelude::*;
use serde::{Deserialize, Serialize};

use super::merge::OrderedTable;
use crate::error::Result;
use crate::table::column;

/// How gaps are filled after the temporal sort.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ImputationPolicy {
    /// Carry the last observation forward in the configured columns, then
    /// fill what is left in every float column with the column mean.
    #[default]
    ForwardFillThenMean,
    /// Carry the last observation forward in the configured columns and in
    /// every float column. Leading gaps stay missing.
    ForwardFillOnly,
}

/// How rolling means left undefined by full windows are filled.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RollingFill {
    /// Column mean over the whole frame
    #[default]
    Mean,
    /// Earliest defined mean of the same group, carried backward
    Backward,
    /// Leave them missing
    Leave,
}

/// Names of the float columns, in frame order.
fn float_columns(frame: &DataFrame) -> Vec<String> {
    frame
        .get_columns()
        .iter()
        .filter(|c| c.dtype().is_float())
        .map(|c| c.name().to_string())
        .collect()
}

/// Carry the last value forward without crossing a group boundary.
fn forward_fill(name: &str, group_column: &str) -> Expr {
    col(name)
        .fill_null_with_strategy(FillNullStrategy::Forward(None))
        .over([col(group_column)])
}

/// Fill gaps with the mean over every row of the frame.
fn mean_fill(name: &str) -> Expr {
    col(name).fill_null(col(name).mean())
}

/// Fill missing values per `policy`. Forward-fill never crosses groups.
pub fn impute(
    table: &OrderedTable,
    group_column: &str,
    forwardfill_columns: &[String],
    policy: ImputationPolicy,
) -> Result<OrderedTable> {
    let source = table.frame();
    column(source, group_column)?;
    for name in forwardfill_columns {
        column(source, name)?;
    }

    let floats = float_columns(source);
    let mut fill_targets: Vec<String> = forwardfill_columns.to_vec();
    if policy == ImputationPolicy::ForwardFillOnly {
        for name in &floats {
            if !fill_targets.contains(name) {
                fill_targets.push(name.clone());
            }
        }
    }

    let mut plan = source.clone().lazy();
    if !fill_targets.is_empty() {
        plan = plan.with_columns(
            fill_targets
                .iter()
                .map(|name| forward_fill(name, group_column))
                .collect::<Vec<_>>(),
        );
    }
    if policy == ImputationPolicy::ForwardFillThenMean && !floats.is_empty() {
        plan = plan.with_columns(floats.iter().map(|name| mean_fill(name)).collect::<Vec<_>>());
    }
    let out = plan.collect()?;

    let remaining: usize = out.get_columns().iter().map(|c| c.null_count()).sum();
    tracing::debug!(
        "Imputed {} columns with {:?}, {} cells still missing",
        fill_targets.len(),
        policy,
        remaining
    );
    Ok(table.derive(out))
}

/// Fill undefined values of the rolling columns per `fill`. Backward fill
/// never crosses groups.
pub fn fill_rolling_gaps(
    table: &OrderedTable,
    group_column: &str,
    rolling_columns: &[String],
    fill: RollingFill,
) -> Result<OrderedTable> {
    let source = table.frame();
    column(source, group_column)?;
    for name in rolling_columns {
        column(source, name)?;
    }

    let fills: Vec<Expr> = match fill {
        RollingFill::Mean => rolling_columns.iter().map(|name| mean_fill(name)).collect(),
        RollingFill::Backward => rolling_columns
            .iter()
            .map(|name| {
                col(name.as_str())
                    .fill_null_with_strategy(FillNullStrategy::Backward(None))
                    .over([col(group_column)])
            })
            .collect(),
        RollingFill::Leave => Vec::new(),
    };
    if fills.is_empty() {
        return Ok(table.clone());
    }
    let out = source.clone().lazy().with_columns(fills).collect()?;

    let remaining: usize = rolling_columns
        .iter()
        .map(|name| column(&out, name).map(|s| s.null_count()))
        .sum::<Result<usize>>()?;
    tracing::debug!(
        "Filled {} rolling columns with {:?}, {} values still missing",
        rolling_columns.len(),
        fill,
        remaining
    );
    Ok(table.derive(out))
}
