//! One-hot encoding of nominal columns and the numeric check that follows it

use std::collections::HashSet;

use polars::prelude::*;

use crate::error::{PipelineError, Result};
use crate::table::{ORIGIN_COLUMN, column, column_names, floats, has_column, is_numeric, labels};

/// Categories of one encoded column and the indicator column for each.
#[derive(Debug, Clone, PartialEq)]
pub struct CategoryMap {
    column: String,
    categories: Vec<String>,
    indicators: Vec<String>,
}

impl CategoryMap {
    fn fit(column: &str, values: &Series) -> Result<Self> {
        let mut seen = HashSet::new();
        let categories: Vec<String> = labels(values)?
            .into_iter()
            .filter(|value| seen.insert(value.clone()))
            .collect();

        let indicators = categories
            .iter()
            .map(|c| indicator_name(column, c))
            .collect();
        Ok(Self {
            column: column.to_string(),
            categories,
            indicators,
        })
    }

    pub fn column(&self) -> &str {
        &self.column
    }

    /// Categories in order of first appearance.
    pub fn categories(&self) -> &[String] {
        &self.categories
    }

    pub fn indicators(&self) -> &[String] {
        &self.indicators
    }

    pub fn indicator_for(&self, category: &str) -> Option<&str> {
        self.categories
            .iter()
            .position(|c| c == category)
            .map(|i| self.indicators[i].as_str())
    }

    pub fn category_for(&self, indicator: &str) -> Option<&str> {
        self.indicators
            .iter()
            .position(|c| c == indicator)
            .map(|i| self.categories[i].as_str())
    }

    /// Recover the category of every row from its indicator columns in an
    /// encoded frame. Exactly one indicator per row must be set.
    pub fn decode(&self, frame: &DataFrame) -> Result<Vec<String>> {
        let mut found: Vec<Option<&str>> = vec![None; frame.height()];
        for (category, indicator) in self.categories.iter().zip(&self.indicators) {
            let flags = floats(column(frame, indicator)?)?;
            for (row, flag) in flags.into_iter().enumerate() {
                if flag != Some(1.0) {
                    continue;
                }
                if found[row].is_some() {
                    return Err(PipelineError::SchemaMismatch(format!(
                        "row {} sets more than one `{}` indicator",
                        row, self.column
                    )));
                }
                found[row] = Some(category);
            }
        }

        found
            .into_iter()
            .enumerate()
            .map(|(row, category)| {
                category
                    .map(str::to_string)
                    .ok_or_else(|| PipelineError::MissingValue {
                        column: self.column.clone(),
                        row,
                    })
            })
            .collect()
    }
}

/// Indicator column name for one category.
pub fn indicator_name(column: &str, category: &str) -> String {
    format!("{}_{}", column, category)
}

/// Every category map fitted by [`one_hot_encode`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Encoding {
    maps: Vec<CategoryMap>,
}

impl Encoding {
    pub fn get(&self, column: &str) -> Option<&CategoryMap> {
        self.maps.iter().find(|m| m.column == column)
    }

    pub fn maps(&self) -> &[CategoryMap] {
        &self.maps
    }

    pub fn is_empty(&self) -> bool {
        self.maps.is_empty()
    }
}

/// Replace each listed column by one float indicator column per category,
/// placed where the source column was.
///
/// Categories are fitted on the whole frame, so both partitions end up with
/// the same indicator columns even when a category only occurs in one.
pub fn one_hot_encode(frame: &DataFrame, columns: &[String]) -> Result<(DataFrame, Encoding)> {
    let mut out = frame.clone();
    let mut encoding = Encoding::default();

    for name in columns {
        let map = CategoryMap::fit(name, column(&out, name)?)?;
        if let Some(taken) = map.indicators.iter().find(|i| has_column(&out, i)) {
            return Err(PipelineError::DuplicateColumn(taken.clone()));
        }

        let text = col(name.as_str()).cast(DataType::String);
        let indicators: Vec<Expr> = map
            .categories
            .iter()
            .zip(&map.indicators)
            .map(|(category, indicator)| {
                text.clone()
                    .eq(lit(category.as_str()))
                    .cast(DataType::Float64)
                    .alias(indicator.as_str())
            })
            .collect();

        let order: Vec<Expr> = column_names(&out)
            .into_iter()
            .flat_map(|existing| {
                if existing == *name {
                    map.indicators.clone()
                } else {
                    vec![existing]
                }
            })
            .map(|n| col(n.as_str()))
            .collect();

        out = out.lazy().with_columns(indicators).select(order).collect()?;

        tracing::debug!(
            "Encoded `{}` into {} indicator columns",
            name,
            map.categories.len()
        );
        encoding.maps.push(map);
    }

    Ok((out, encoding))
}

/// Every column except the origin tag must be numeric.
pub fn ensure_numeric(frame: &DataFrame) -> Result<()> {
    match frame
        .get_columns()
        .iter()
        .find(|c| c.name().as_str() != ORIGIN_COLUMN && !is_numeric(c.dtype()))
    {
        Some(c) => Err(PipelineError::NonNumericColumn {
            column: c.name().to_string(),
            dtype: c.dtype().clone(),
        }),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn frame() -> DataFrame {
        df!(
            "temp" => [1.0, 2.0, 3.0],
            "city" => ["sj", "iq", "sj"],
            "year" => [1990i64, 1990, 1991],
        )
        .unwrap()
    }

    fn names(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn values(frame: &DataFrame, name: &str) -> Vec<Option<f64>> {
        floats(column(frame, name).unwrap()).unwrap()
    }

    #[test]
    fn test_indicators_replace_source_in_place() {
        let (out, encoding) = one_hot_encode(&frame(), &names(&["city"])).unwrap();

        assert_eq!(column_names(&out), ["temp", "city_sj", "city_iq", "year"]);
        assert_eq!(values(&out, "city_sj"), vec![Some(1.0), Some(0.0), Some(1.0)]);
        assert_eq!(values(&out, "city_iq"), vec![Some(0.0), Some(1.0), Some(0.0)]);
        assert_eq!(column(&out, "city_sj").unwrap().dtype(), &DataType::Float64);

        let map = encoding.get("city").unwrap();
        assert_eq!(map.categories(), ["sj", "iq"]);
        assert_eq!(map.indicator_for("iq"), Some("city_iq"));
        assert_eq!(map.category_for("city_sj"), Some("sj"));
    }

    #[test]
    fn test_categories_keep_first_appearance_order() {
        let frame = df!("station" => ["C", "A", "C", "B"]).unwrap();
        let (out, encoding) = one_hot_encode(&frame, &names(&["station"])).unwrap();

        assert_eq!(encoding.get("station").unwrap().categories(), ["C", "A", "B"]);
        assert_eq!(column_names(&out), ["station_C", "station_A", "station_B"]);
    }

    #[test]
    fn test_decode_inverts_encoding() {
        let (out, encoding) = one_hot_encode(&frame(), &names(&["city"])).unwrap();
        let map = encoding.get("city").unwrap();

        assert_eq!(map.decode(&out).unwrap(), ["sj", "iq", "sj"]);
    }

    #[test]
    fn test_decode_rejects_ambiguous_rows() {
        let (mut out, encoding) = one_hot_encode(&frame(), &names(&["city"])).unwrap();
        out.with_column(Series::new("city_iq".into(), [1.0, 1.0, 0.0]))
            .unwrap();

        assert!(matches!(
            encoding.get("city").unwrap().decode(&out),
            Err(PipelineError::SchemaMismatch(_))
        ));
    }

    #[test]
    fn test_int_column_encoded_by_text() {
        let (out, _) = one_hot_encode(&frame(), &names(&["year"])).unwrap();
        assert!(has_column(&out, "year_1990"));
        assert!(has_column(&out, "year_1991"));
        assert_eq!(values(&out, "year_1991"), vec![Some(0.0), Some(0.0), Some(1.0)]);
    }

    #[test]
    fn test_float_column_rejected() {
        let result = one_hot_encode(&frame(), &names(&["temp"]));
        assert!(matches!(result, Err(PipelineError::NonCategoricalColumn(_))));
    }

    #[test]
    fn test_missing_category_rejected() {
        let frame = df!("city" => [Some("sj"), None]).unwrap();
        let result = one_hot_encode(&frame, &names(&["city"]));
        assert!(matches!(result, Err(PipelineError::MissingValue { row: 1, .. })));
    }

    #[test]
    fn test_indicator_name_collision_rejected() {
        let frame = df!(
            "city" => ["sj", "iq"],
            "city_sj" => [0.5, 0.5],
        )
        .unwrap();
        let result = one_hot_encode(&frame, &names(&["city"]));
        assert!(matches!(result, Err(PipelineError::DuplicateColumn(_))));
    }

    #[test]
    fn test_ensure_numeric_skips_origin() {
        let (mut out, _) = one_hot_encode(&frame(), &names(&["city"])).unwrap();
        out.with_column(Series::new(ORIGIN_COLUMN.into(), ["train", "train", "test"]))
            .unwrap();
        assert!(ensure_numeric(&out).is_ok());
        assert!(matches!(
            ensure_numeric(&frame()),
            Err(PipelineError::NonNumericColumn { .. })
        ));
    }
}
