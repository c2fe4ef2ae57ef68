//! Scoring the unlabeled rows and laying the counts onto the template

use std::collections::{HashMap, HashSet};

use polars::prelude::DataFrame;

use crate::error::{PipelineError, Result};
use crate::features::Encoding;
use crate::table::{KeyColumns, Origin, RowKey, column_names, key_rows};
use crate::traits::Regressor;

use super::split::{feature_matrix, partition, row_keys};

/// Externally supplied output layout. Its rows and their order are kept as
/// they are.
#[derive(Debug, Clone, PartialEq)]
pub struct SubmissionTemplate {
    header: Vec<String>,
    keys: Vec<RowKey>,
}

impl SubmissionTemplate {
    /// Read the key columns of `frame`; the output header is the three key
    /// column names plus `target_column`.
    pub fn from_table(frame: &DataFrame, keys: &KeyColumns, target_column: &str) -> Result<Self> {
        let rows = key_rows(frame, keys)?;
        let mut seen = HashSet::with_capacity(rows.len());
        if let Some(duplicate) = rows.iter().find(|key| !seen.insert(*key)) {
            return Err(PipelineError::DuplicateKey(duplicate.clone()));
        }

        Ok(Self {
            header: vec![
                keys.site.clone(),
                keys.year.clone(),
                keys.week.clone(),
                target_column.to_string(),
            ],
            keys: rows,
        })
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }
}

/// One output row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SubmissionRow {
    pub key: RowKey,
    /// `None` when no unlabeled feature row carries this key
    pub predicted: Option<u64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Submission {
    header: Vec<String>,
    rows: Vec<SubmissionRow>,
    /// Template keys without a prediction, in template order
    pub unmatched: Vec<RowKey>,
    /// Predicted rows whose key is not in the template
    pub orphaned: usize,
}

impl Submission {
    pub fn header(&self) -> &[String] {
        &self.header
    }

    pub fn rows(&self) -> &[SubmissionRow] {
        &self.rows
    }

    pub fn is_complete(&self) -> bool {
        self.unmatched.is_empty()
    }
}

/// Round half away from zero, then clamp at zero.
pub fn round_count(prediction: f64) -> u64 {
    let rounded = prediction.round();
    if rounded.is_nan() || rounded <= 0.0 {
        0
    } else {
        rounded as u64
    }
}

/// Predict every unlabeled row and emit one count per template row, in
/// template order.
///
/// `feature_names` are the columns the model was trained on; the unlabeled
/// partition must carry exactly these, in this order.
pub fn predict_and_reconcile(
    model: &dyn Regressor,
    feature_names: &[String],
    features: &DataFrame,
    encoding: &Encoding,
    template: &SubmissionTemplate,
    keys: &KeyColumns,
) -> Result<Submission> {
    let unlabeled = partition(features, Origin::Unlabeled)?;
    if column_names(&unlabeled) != feature_names {
        return Err(PipelineError::SchemaMismatch(format!(
            "unlabeled rows carry {} columns, the model was trained on {}",
            unlabeled.width(),
            feature_names.len()
        )));
    }
    if model.n_features() != feature_names.len() {
        return Err(PipelineError::SchemaMismatch(format!(
            "model expects {} features, got {} names",
            model.n_features(),
            feature_names.len()
        )));
    }

    let row_keys = row_keys(&unlabeled, encoding, keys)?;
    let (matrix, _) = feature_matrix(&unlabeled)?;
    let predictions = model.predict(matrix.view());

    let mut by_key: HashMap<RowKey, u64> = HashMap::with_capacity(row_keys.len());
    for (key, &prediction) in row_keys.into_iter().zip(&predictions) {
        if by_key.contains_key(&key) {
            return Err(PipelineError::DuplicateKey(key));
        }
        by_key.insert(key, round_count(prediction));
    }

    let mut unmatched = Vec::new();
    let rows: Vec<SubmissionRow> = template
        .keys
        .iter()
        .map(|key| {
            let predicted = by_key.get(key).copied();
            if predicted.is_none() {
                unmatched.push(key.clone());
            }
            SubmissionRow {
                key: key.clone(),
                predicted,
            }
        })
        .collect();

    let template_keys: HashSet<&RowKey> = template.keys.iter().collect();
    let orphaned = by_key.keys().filter(|k| !template_keys.contains(k)).count();

    if !unmatched.is_empty() {
        tracing::warn!(
            "{} template rows have no prediction, first is {}",
            unmatched.len(),
            unmatched[0]
        );
    }
    if orphaned > 0 {
        tracing::warn!("{} predicted rows are not in the template", orphaned);
    }
    tracing::info!("Reconciled {} predictions onto {} template rows", predictions.len(), rows.len());

    Ok(Submission {
        header: template.header.clone(),
        rows,
        unmatched,
        orphaned,
    })
}
