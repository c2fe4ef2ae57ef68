use polars::prelude::*;

use crate::error::Result;
use crate::table::column;

/// Remove the named columns. Every name must exist.
pub fn drop_columns(frame: &DataFrame, names: &[String]) -> Result<DataFrame> {
    let mut out = frame.clone();
    for name in names {
        column(&out, name)?;
        out = out.drop(name)?;
    }
    tracing::debug!("Dropped {} columns, {} remain", names.len(), out.width());
    Ok(out)
}
