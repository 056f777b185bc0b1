//! Label encoding of categorical columns.
//!
//! Each column maps its sorted distinct training labels to `0..n`. Numeric
//! columns sort their values numerically and text columns lexicographically.
//! The fitted encoder is applied unchanged to the test table.

use std::collections::{BTreeMap, HashMap};
use std::fs;
use std::path::Path;

use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::UnknownCategory;
use crate::error::{PipelineError, Result, ResultExt};
use crate::utils::{ensure_parent_dir, is_numeric_dtype};

/// Code written for a label that was not seen during fitting.
pub const UNKNOWN_CODE: i64 = -1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelKind {
    Numeric,
    Text,
}

/// Fitted labels of one column, in code order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnEncoding {
    pub kind: LabelKind,
    pub classes: Vec<String>,
}

impl ColumnEncoding {
    fn codes(&self) -> HashMap<&str, i64> {
        self.classes
            .iter()
            .enumerate()
            .map(|(code, label)| (label.as_str(), code as i64))
            .collect()
    }
}

/// Per-column label encoder fitted on the training table.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CategoryEncoder {
    columns: BTreeMap<String, ColumnEncoding>,
}

impl CategoryEncoder {
    /// Fit one encoding per column of `columns`.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ColumnNotFound`] if a column is absent
    /// - [`PipelineError::DataFormat`] if a column contains nulls
    pub fn fit(df: &DataFrame, columns: &[String]) -> Result<Self> {
        let mut encodings = BTreeMap::new();
        for name in columns {
            let column = df
                .column(name)
                .map_err(|_| PipelineError::ColumnNotFound(name.clone()))?;
            if column.null_count() > 0 {
                return Err(PipelineError::DataFormat(format!(
                    "categorical column '{}' contains {} null values",
                    name,
                    column.null_count()
                )));
            }
            let encoding = fit_column(column.as_materialized_series())
                .context(format!("Encoding column '{}'", name))?;
            encodings.insert(name.clone(), encoding);
        }
        Ok(Self { columns: encodings })
    }

    /// Replace every fitted column of `df` with its `Int64` codes, keeping the
    /// column position.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ColumnNotFound`] if a fitted column is absent
    /// - [`PipelineError::DataFormat`] if a label is unseen and `unknown` is
    ///   [`UnknownCategory::Error`]
    pub fn transform(&self, mut df: DataFrame, unknown: UnknownCategory) -> Result<DataFrame> {
        for (name, encoding) in &self.columns {
            let series = df
                .column(name)
                .map_err(|_| PipelineError::ColumnNotFound(name.clone()))?
                .as_materialized_series()
                .clone();
            let labels = labels_of(&series, encoding.kind)?;
            let codes = encoding.codes();

            let mut unseen: Vec<String> = Vec::new();
            let encoded: Vec<i64> = labels
                .iter()
                .map(|label| match label.as_deref().and_then(|l| codes.get(l)) {
                    Some(code) => *code,
                    None => {
                        let shown = label.clone().unwrap_or_else(|| "null".to_string());
                        if !unseen.contains(&shown) {
                            unseen.push(shown);
                        }
                        UNKNOWN_CODE
                    }
                })
                .collect();

            if !unseen.is_empty() {
                match unknown {
                    UnknownCategory::Error => {
                        return Err(PipelineError::DataFormat(format!(
                            "column '{}' has categories not seen during fitting: {}",
                            name,
                            unseen.join(", ")
                        )));
                    }
                    UnknownCategory::Sentinel => warn!(
                        column = %name,
                        unseen = ?unseen,
                        code = UNKNOWN_CODE,
                        "Categories not seen during fitting"
                    ),
                }
            }

            df.replace(name, Series::new(name.as_str().into(), encoded))?;
        }
        Ok(df)
    }

    /// Fit on `df` and encode it.
    pub fn fit_transform(df: DataFrame, columns: &[String]) -> Result<(Self, DataFrame)> {
        let encoder = Self::fit(&df, columns)?;
        let encoded = encoder.transform(df, UnknownCategory::Error)?;
        Ok((encoder, encoded))
    }

    /// Label to code, per column.
    pub fn mappings(&self) -> BTreeMap<String, BTreeMap<String, i64>> {
        self.columns
            .iter()
            .map(|(name, encoding)| {
                let map = encoding
                    .classes
                    .iter()
                    .enumerate()
                    .map(|(code, label)| (label.clone(), code as i64))
                    .collect();
                (name.clone(), map)
            })
            .collect()
    }

    pub fn encoding(&self, column: &str) -> Option<&ColumnEncoding> {
        self.columns.get(column)
    }

    /// Log every mapping at debug level.
    pub fn log_mappings(&self) {
        for (name, encoding) in &self.columns {
            let pairs: Vec<String> = encoding
                .classes
                .iter()
                .enumerate()
                .map(|(code, label)| format!("{}: {}", label, code))
                .collect();
            debug!(column = %name, mapping = %pairs.join(", "), "Label mapping");
        }
        info!(columns = self.columns.len(), "Label encoding fitted");
    }

    pub fn save(&self, path: &Path) -> Result<()> {
        ensure_parent_dir(path)?;
        let json = serde_json::to_string_pretty(self)?;
        fs::write(path, json).context(format!("Writing {}", path.display()))?;
        Ok(())
    }

    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).context(format!("Reading {}", path.display()))?;
        Ok(serde_json::from_str(&text)?)
    }
}

fn fit_column(series: &Series) -> Result<ColumnEncoding> {
    if is_numeric_dtype(series.dtype()) {
        let mut values: Vec<f64> = series
            .cast(&DataType::Float64)?
            .f64()?
            .into_no_null_iter()
            .collect();
        values.sort_by(|a, b| a.total_cmp(b));
        values.dedup();
        Ok(ColumnEncoding {
            kind: LabelKind::Numeric,
            classes: values.into_iter().map(format_number).collect(),
        })
    } else {
        let mut labels: Vec<String> = labels_of(series, LabelKind::Text)?
            .into_iter()
            .flatten()
            .collect();
        labels.sort();
        labels.dedup();
        Ok(ColumnEncoding {
            kind: LabelKind::Text,
            classes: labels,
        })
    }
}

/// Label strings of a column as they appear in the fitted classes.
fn labels_of(series: &Series, kind: LabelKind) -> Result<Vec<Option<String>>> {
    match kind {
        LabelKind::Numeric if is_numeric_dtype(series.dtype()) => Ok(series
            .cast(&DataType::Float64)?
            .f64()?
            .into_iter()
            .map(|v| v.map(format_number))
            .collect()),
        LabelKind::Numeric => Err(PipelineError::DataFormat(format!(
            "column '{}' was fitted as numeric but is {}",
            series.name(),
            series.dtype()
        ))),
        LabelKind::Text => Ok(series
            .cast(&DataType::String)?
            .str()?
            .into_iter()
            .map(|v| v.map(str::to_string))
            .collect()),
    }
}

/// `2017.0` becomes `"2017"` so integer labels read naturally.
fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{}", value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn codes(df: &DataFrame, column: &str) -> Vec<i64> {
        df.column(column)
            .unwrap()
            .i64()
            .unwrap()
            .into_no_null_iter()
            .collect()
    }

    #[test]
    fn test_codes_follow_sorted_labels() {
        let df = df! {
            "market_segment_type" => ["Online", "Corporate", "Offline", "Online", "Aviation"],
            "lead_time" => [1i64, 2, 3, 4, 5],
        }
        .unwrap();

        let (encoder, encoded) =
            CategoryEncoder::fit_transform(df, &["market_segment_type".to_string()]).unwrap();
        assert_eq!(codes(&encoded, "market_segment_type"), vec![3, 1, 2, 3, 0]);
        assert_eq!(
            encoded.get_column_names()[0].as_str(),
            "market_segment_type"
        );

        let mapping = &encoder.mappings()["market_segment_type"];
        assert_eq!(mapping["Aviation"], 0);
        assert_eq!(mapping["Online"], 3);
    }

    #[test]
    fn test_numeric_labels_sort_numerically() {
        let df = df! { "no_of_children" => [10i64, 2, 0, 2, 9] }.unwrap();
        let (encoder, encoded) =
            CategoryEncoder::fit_transform(df, &["no_of_children".to_string()]).unwrap();
        assert_eq!(codes(&encoded, "no_of_children"), vec![3, 1, 0, 1, 2]);
        assert_eq!(
            encoder.encoding("no_of_children").unwrap().classes,
            vec!["0", "2", "9", "10"]
        );
    }

    #[test]
    fn test_label_column_encodes_to_binary() {
        let df = df! {
            "booking_status" => ["Not_Canceled", "Canceled", "Not_Canceled"],
        }
        .unwrap();
        let (_, encoded) =
            CategoryEncoder::fit_transform(df, &["booking_status".to_string()]).unwrap();
        assert_eq!(codes(&encoded, "booking_status"), vec![1, 0, 1]);
    }

    #[test]
    fn test_unseen_label_sentinel_and_error() {
        let train = df! { "room" => ["A", "B"] }.unwrap();
        let test = df! { "room" => ["B", "C"] }.unwrap();
        let encoder = CategoryEncoder::fit(&train, &["room".to_string()]).unwrap();

        let encoded = encoder
            .transform(test.clone(), UnknownCategory::Sentinel)
            .unwrap();
        assert_eq!(codes(&encoded, "room"), vec![1, UNKNOWN_CODE]);

        let err = encoder.transform(test, UnknownCategory::Error).unwrap_err();
        assert_eq!(err.error_code(), "DATA_FORMAT");
        assert!(err.to_string().contains("C"));
    }

    #[test]
    fn test_missing_column_and_nulls() {
        let df = df! { "room" => [Some("A"), None] }.unwrap();
        let err = CategoryEncoder::fit(&df, &["meal".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");

        let err = CategoryEncoder::fit(&df, &["room".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "DATA_FORMAT");
    }

    #[test]
    fn test_save_and_load() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("processed/label_mappings.json");
        let df = df! { "room" => ["B", "A"], "year" => [2018i64, 2017] }.unwrap();
        let encoder =
            CategoryEncoder::fit(&df, &["room".to_string(), "year".to_string()]).unwrap();

        encoder.save(&path).unwrap();
        assert_eq!(CategoryEncoder::load(&path).unwrap(), encoder);
    }
}
