//! Recovering the labeled partition and pairing it with its targets

use std::collections::HashMap;

use ndarray::{Array2, Axis};
use polars::prelude::*;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};

use crate::error::{PipelineError, Result};
use crate::features::Encoding;
use crate::table::{
    KeyColumns, ORIGIN_COLUMN, Origin, RowKey, column, column_names, floats, is_numeric, key_rows,
    labels, zip_keys,
};

/// How label rows are paired with labeled feature rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelAlignment {
    /// Join on (site, year, week).
    #[default]
    Key,
    /// Pair the i-th labeled row with the i-th label row.
    Position,
}

/// Target values keyed by row, in file order.
#[derive(Debug, Clone, PartialEq)]
pub struct LabelTable {
    keys: Vec<RowKey>,
    targets: Vec<f64>,
}

impl LabelTable {
    /// Read keys and the target column. Targets must be non-negative
    /// integers.
    pub fn from_table(frame: &DataFrame, keys: &KeyColumns, target_column: &str) -> Result<Self> {
        let targets = target_values(column(frame, target_column)?)?;
        Ok(Self {
            keys: key_rows(frame, keys)?,
            targets,
        })
    }

    pub fn len(&self) -> usize {
        self.keys.len()
    }

    pub fn is_empty(&self) -> bool {
        self.keys.is_empty()
    }

    pub fn keys(&self) -> &[RowKey] {
        &self.keys
    }

    pub fn targets(&self) -> &[f64] {
        &self.targets
    }

    fn index(&self) -> Result<HashMap<&RowKey, f64>> {
        let mut index = HashMap::with_capacity(self.keys.len());
        for (key, &target) in self.keys.iter().zip(&self.targets) {
            if index.insert(key, target).is_some() {
                return Err(PipelineError::DuplicateKey(key.clone()));
            }
        }
        Ok(index)
    }
}

fn target_values(series: &Series) -> Result<Vec<f64>> {
    if !is_numeric(series.dtype()) {
        let first = labels(series)?.into_iter().next().unwrap_or_default();
        return Err(PipelineError::InvalidTarget {
            row: 0,
            value: first,
        });
    }

    floats(series)?
        .into_iter()
        .enumerate()
        .map(|(row, value)| match value {
            Some(x) if x >= 0.0 && x.fract() == 0.0 => Ok(x),
            Some(x) => Err(PipelineError::InvalidTarget {
                row,
                value: x.to_string(),
            }),
            None => Err(PipelineError::InvalidTarget {
                row,
                value: "<missing>".to_string(),
            }),
        })
        .collect()
}

/// Rows of one partition, without the origin column.
pub fn partition(frame: &DataFrame, origin: Origin) -> Result<DataFrame> {
    let tags = labels(column(frame, ORIGIN_COLUMN)?)?;
    let mut mask = Vec::with_capacity(tags.len());
    for (row, tag) in tags.iter().enumerate() {
        match Origin::parse(tag) {
            Some(o) => mask.push(o == origin),
            None => {
                return Err(PipelineError::SchemaMismatch(format!(
                    "unknown origin tag `{}` at row {}",
                    tag, row
                )));
            }
        }
    }

    let mask = BooleanChunked::new("mask".into(), mask);
    Ok(frame.filter(&mask)?.drop(ORIGIN_COLUMN)?)
}

/// Reconstruct each row's key. An encoded site column is decoded through
/// its category map.
pub fn row_keys(frame: &DataFrame, encoding: &Encoding, keys: &KeyColumns) -> Result<Vec<RowKey>> {
    match encoding.get(&keys.site) {
        Some(map) => zip_keys(map.decode(frame)?, frame, keys),
        None => key_rows(frame, keys),
    }
}

/// Dense matrix of every column, in frame order. All columns must be
/// numeric and complete.
pub fn feature_matrix(frame: &DataFrame) -> Result<(Array2<f64>, Vec<String>)> {
    let n_rows = frame.height();
    let mut columns: Vec<Vec<f64>> = Vec::with_capacity(frame.width());
    for series in frame.get_columns().iter().map(|c| c.as_materialized_series()) {
        let name = series.name().to_string();
        let values = floats(series)?
            .into_iter()
            .enumerate()
            .map(|(row, value)| {
                value.ok_or_else(|| PipelineError::MissingValue {
                    column: name.clone(),
                    row,
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        columns.push(values);
    }

    let matrix = Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| columns[c][r]);
    Ok((matrix, column_names(frame)))
}

/// Labeled feature rows with aligned targets.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledSet {
    pub features: Array2<f64>,
    pub targets: Vec<f64>,
    pub keys: Vec<RowKey>,
    pub feature_names: Vec<String>,
}

impl LabeledSet {
    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Subset by row index, in the given order.
    pub fn select(&self, rows: &[usize]) -> Self {
        Self {
            features: self.features.select(Axis(0), rows),
            targets: rows.iter().map(|&r| self.targets[r]).collect(),
            keys: rows.iter().map(|&r| self.keys[r].clone()).collect(),
            feature_names: self.feature_names.clone(),
        }
    }
}

/// Labeled rows of the engineered table paired with their targets.
pub fn split(
    features: &DataFrame,
    encoding: &Encoding,
    labels: &LabelTable,
    keys: &KeyColumns,
    alignment: LabelAlignment,
) -> Result<LabeledSet> {
    let labeled = partition(features, Origin::Labeled)?;
    if labeled.height() != labels.len() {
        return Err(PipelineError::RowCountMismatch {
            features: labeled.height(),
            labels: labels.len(),
        });
    }

    let row_keys = row_keys(&labeled, encoding, keys)?;
    let targets = match alignment {
        LabelAlignment::Key => {
            let index = labels.index()?;
            row_keys
                .iter()
                .map(|key| {
                    index
                        .get(key)
                        .copied()
                        .ok_or_else(|| PipelineError::MissingLabel(key.clone()))
                })
                .collect::<Result<Vec<f64>>>()?
        }
        LabelAlignment::Position => {
            tracing::warn!("Pairing labels by row position; keys are not checked");
            labels.targets().to_vec()
        }
    };

    let (matrix, feature_names) = feature_matrix(&labeled)?;
    tracing::debug!(
        "Labeled set: {} rows x {} features",
        matrix.nrows(),
        matrix.ncols()
    );

    Ok(LabeledSet {
        features: matrix,
        targets,
        keys: row_keys,
        feature_names,
    })
}

/// Hold out `ceil(test_size * n)` rows. Without shuffling the tail is held
/// out; with shuffling a seeded permutation decides.
pub fn train_test_split(
    set: &LabeledSet,
    test_size: f64,
    shuffle: bool,
    random_state: u64,
) -> Result<(LabeledSet, LabeledSet)> {
    if !(test_size > 0.0 && test_size < 1.0) {
        return Err(PipelineError::InvalidConfig(format!(
            "test_size must be in (0, 1), got {}",
            test_size
        )));
    }

    let n = set.len();
    let n_test = (test_size * n as f64).ceil() as usize;
    if n_test == 0 || n_test >= n {
        return Err(PipelineError::InvalidConfig(format!(
            "test_size {} leaves no rows on one side of a {}-row split",
            test_size, n
        )));
    }

    let mut rows: Vec<usize> = (0..n).collect();
    if shuffle {
        let mut rng = StdRng::seed_from_u64(random_state);
        rows.shuffle(&mut rng);
    }
    let (train, test) = rows.split_at(n - n_test);
    Ok((set.select(train), set.select(test)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::features::one_hot_encode;

    fn keys() -> KeyColumns {
        KeyColumns::default()
    }

    /// Encoded frame: two labeled rows, one unlabeled row.
    fn engineered() -> (DataFrame, Encoding) {
        let frame = df!(
            "city" => ["sj", "iq", "sj"],
            "year" => [1990i64, 2000, 2008],
            "weekofyear" => [18i64, 26, 18],
            "temp" => [25.0, 27.0, 26.0],
            ORIGIN_COLUMN => ["train", "train", "test"],
        )
        .unwrap();
        one_hot_encode(&frame, &["city".to_string()]).unwrap()
    }

    fn labels(rows: Vec<(&str, i64, i64, i64)>) -> LabelTable {
        let frame = df!(
            "city" => rows.iter().map(|r| r.0).collect::<Vec<_>>(),
            "year" => rows.iter().map(|r| r.1).collect::<Vec<_>>(),
            "weekofyear" => rows.iter().map(|r| r.2).collect::<Vec<_>>(),
            "total_cases" => rows.iter().map(|r| r.3).collect::<Vec<_>>(),
        )
        .unwrap();
        LabelTable::from_table(&frame, &keys(), "total_cases").unwrap()
    }

    #[test]
    fn test_key_join_ignores_label_order() {
        let (frame, encoding) = engineered();
        let labels = labels(vec![("iq", 2000, 26, 7), ("sj", 1990, 18, 4)]);

        let set = split(&frame, &encoding, &labels, &keys(), LabelAlignment::Key).unwrap();

        assert_eq!(set.targets, vec![4.0, 7.0]);
        assert_eq!(set.keys[1], RowKey::new("iq", 2000, 26));
        assert_eq!(
            set.feature_names,
            vec!["city_sj", "city_iq", "year", "weekofyear", "temp"]
        );
        assert_eq!(set.features.dim(), (2, 5));
    }

    #[test]
    fn test_positional_join_trusts_order() {
        let (frame, encoding) = engineered();
        let labels = labels(vec![("iq", 2000, 26, 7), ("sj", 1990, 18, 4)]);

        let set = split(&frame, &encoding, &labels, &keys(), LabelAlignment::Position).unwrap();
        assert_eq!(set.targets, vec![7.0, 4.0]);
    }

    #[test]
    fn test_missing_label() {
        let (frame, encoding) = engineered();
        let labels = labels(vec![("iq", 2000, 27, 7), ("sj", 1990, 18, 4)]);

        let result = split(&frame, &encoding, &labels, &keys(), LabelAlignment::Key);
        assert!(matches!(result, Err(PipelineError::MissingLabel(_))));
    }

    #[test]
    fn test_duplicate_label_key() {
        let (frame, encoding) = engineered();
        let labels = labels(vec![("sj", 1990, 18, 7), ("sj", 1990, 18, 4)]);

        let result = split(&frame, &encoding, &labels, &keys(), LabelAlignment::Key);
        assert!(matches!(result, Err(PipelineError::DuplicateKey(_))));
    }

    #[test]
    fn test_row_count_mismatch_in_both_modes() {
        let (frame, encoding) = engineered();
        let labels = labels(vec![("sj", 1990, 18, 4)]);

        for alignment in [LabelAlignment::Key, LabelAlignment::Position] {
            let result = split(&frame, &encoding, &labels, &keys(), alignment);
            assert!(matches!(
                result,
                Err(PipelineError::RowCountMismatch {
                    features: 2,
                    labels: 1
                })
            ));
        }
    }

    #[test]
    fn test_negative_target_rejected() {
        let frame = df!(
            "city" => ["sj"],
            "year" => [1990i64],
            "weekofyear" => [18i64],
            "total_cases" => [-3i64],
        )
        .unwrap();
        let result = LabelTable::from_table(&frame, &keys(), "total_cases");
        assert!(matches!(result, Err(PipelineError::InvalidTarget { row: 0, .. })));
    }

    #[test]
    fn test_fractional_target_rejected() {
        let frame = df!(
            "city" => ["sj"],
            "year" => [1990i64],
            "weekofyear" => [18i64],
            "total_cases" => [2.5],
        )
        .unwrap();
        let result = LabelTable::from_table(&frame, &keys(), "total_cases");
        assert!(matches!(result, Err(PipelineError::InvalidTarget { .. })));
    }

    #[test]
    fn test_partition_drops_origin() {
        let (frame, _) = engineered();
        let test = partition(&frame, Origin::Unlabeled).unwrap();
        assert_eq!(test.height(), 1);
        assert!(!crate::table::has_column(&test, ORIGIN_COLUMN));
        assert_eq!(
            crate::table::integers(column(&test, "year").unwrap()).unwrap(),
            vec![2008]
        );
    }

    #[test]
    fn test_partition_rejects_unknown_tag() {
        let frame = df!("x" => [1.0], ORIGIN_COLUMN => ["validation"]).unwrap();
        assert!(matches!(
            partition(&frame, Origin::Labeled),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_feature_matrix_rejects_gaps() {
        let frame = df!("x" => [Some(1.0), None]).unwrap();
        assert!(matches!(
            feature_matrix(&frame),
            Err(PipelineError::MissingValue { row: 1, .. })
        ));

        let text = df!("x" => ["a"]).unwrap();
        assert!(matches!(
            feature_matrix(&text),
            Err(PipelineError::NonNumericColumn { .. })
        ));
    }

    fn numbered_set(n: usize) -> LabeledSet {
        LabeledSet {
            features: Array2::from_shape_fn((n, 1), |(i, _)| i as f64),
            targets: (0..n).map(|i| i as f64).collect(),
            keys: (0..n).map(|i| RowKey::new("sj", 1990, i as i64 + 1)).collect(),
            feature_names: vec!["x".to_string()],
        }
    }

    #[test]
    fn test_train_test_split_holds_out_tail() {
        let (train, test) = train_test_split(&numbered_set(10), 0.25, false, 42).unwrap();

        // ceil(2.5) = 3
        assert_eq!(train.targets, vec![0.0, 1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);
        assert_eq!(test.targets, vec![7.0, 8.0, 9.0]);
        assert_eq!(test.features.nrows(), 3);
    }

    #[test]
    fn test_train_test_split_shuffle_is_seeded() {
        let set = numbered_set(20);
        let (_, a) = train_test_split(&set, 0.2, true, 1).unwrap();
        let (_, b) = train_test_split(&set, 0.2, true, 1).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 4);
    }

    #[test]
    fn test_train_test_split_rejects_bad_size() {
        assert!(train_test_split(&numbered_set(10), 0.0, false, 0).is_err());
        assert!(train_test_split(&numbered_set(10), 1.0, false, 0).is_err());
        assert!(train_test_split(&numbered_set(1), 0.5, false, 0).is_err());
    }
}
