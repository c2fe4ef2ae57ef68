//! CSV loading and submission export

use std::io::{Cursor, Read, Write};
use std::path::Path;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::ml::submission::Submission;

/// Cell spellings read as missing, on top of empty cells.
const MISSING_MARKERS: [&str; 14] = [
    "NA", "N/A", "n/a", "#N/A", "<NA>", "null", "NULL", "None", "NaN", "nan", "NAN", "-NaN",
    "-nan", "-NAN",
];

/// Load a CSV file with a header row.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let file = std::fs::File::open(path)?;
    let frame = read_table_from(file)?;
    tracing::debug!(
        "Loaded {} ({} rows x {} columns)",
        path.display(),
        frame.height(),
        frame.width()
    );
    Ok(frame)
}

/// Parse CSV from any reader.
///
/// Column types are inferred over every row. Missing markers and any float
/// that parses as NaN become nulls, and integer columns with gaps are
/// widened to float so that mean imputation reaches them.
pub fn read_table_from<R: Read>(mut reader: R) -> Result<DataFrame> {
    let mut bytes = Vec::new();
    reader.read_to_end(&mut bytes)?;

    let markers: Vec<PlSmallStr> = MISSING_MARKERS.iter().map(|m| (*m).into()).collect();
    let frame = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|options| {
            options.with_null_values(Some(NullValues::AllColumns(markers.clone())))
        })
        .into_reader_with_file_handle(Cursor::new(bytes))
        .finish()?;

    let cleanup: Vec<Expr> = frame
        .get_columns()
        .iter()
        .filter_map(|c| {
            let name = c.name().as_str();
            if c.dtype().is_float() {
                Some(col(name).fill_nan(lit(NULL)).cast(DataType::Float64))
            } else if c.dtype().is_integer() && c.null_count() > 0 {
                Some(col(name).cast(DataType::Float64))
            } else {
                None
            }
        })
        .collect();
    if cleanup.is_empty() {
        return Ok(frame);
    }
    Ok(frame.lazy().with_columns(cleanup).collect()?)
}

/// Write the reconciled submission, creating parent directories as needed.
pub fn write_submission(path: &Path, submission: &Submission) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let file = std::fs::File::create(path)?;
    write_submission_to(file, submission).map_err(|e| match e {
        PipelineError::Csv { source, .. } => PipelineError::Csv {
            path: path.display().to_string(),
            source,
        },
        other => other,
    })?;
    tracing::info!("Saved submission to {}", path.display());
    Ok(())
}

/// Write the submission as CSV into any writer. Unmatched rows get an empty
/// count cell.
pub fn write_submission_to<W: Write>(writer: W, submission: &Submission) -> Result<()> {
    let csv_error = |source: csv::Error| PipelineError::Csv {
        path: "<writer>".to_string(),
        source,
    };

    let mut wtr = csv::Writer::from_writer(writer);
    wtr.write_record(submission.header()).map_err(csv_error)?;
    for row in submission.rows() {
        let count = row.predicted.map(|c| c.to_string()).unwrap_or_default();
        wtr.write_record([
            row.key.site.clone(),
            row.key.year.to_string(),
            row.key.week.to_string(),
            count,
        ])
        .map_err(csv_error)?;
    }
    wtr.flush()?;
    Ok(())
}
