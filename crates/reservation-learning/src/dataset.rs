//! Conversion of processed tables into feature matrices.

use std::path::{Path, PathBuf};

use ndarray::Array2;
use polars::prelude::*;

use crate::error::{LearningError, Result};

/// A feature matrix with binary labels.
#[derive(Debug, Clone)]
pub struct Dataset {
    /// Row-major features, one column per entry of `feature_names`.
    pub features: Array2<f64>,
    /// Labels, each `0.0` or `1.0`.
    pub labels: Vec<f64>,
    pub feature_names: Vec<String>,
    pub label_column: String,
}

impl Dataset {
    /// Split `df` into features (every column except `label_column`, in table
    /// order) and labels.
    ///
    /// # Errors
    ///
    /// - [`LearningError::TargetNotFound`] if the label column is absent
    /// - [`LearningError::InvalidData`] if a feature is not numeric or a label
    ///   is not 0/1
    pub fn from_dataframe(df: &DataFrame, label_column: &str) -> Result<Self> {
        let names: Vec<String> = df
            .get_column_names()
            .iter()
            .map(|s| s.to_string())
            .collect();
        if !names.iter().any(|n| n == label_column) {
            return Err(LearningError::TargetNotFound(label_column.to_string()));
        }

        let feature_names: Vec<String> =
            names.into_iter().filter(|n| n != label_column).collect();
        let features = feature_matrix(df, &feature_names)?;

        let labels = numeric_column(df, label_column)?;
        validate_binary(&labels)?;

        Ok(Self {
            features,
            labels,
            feature_names,
            label_column: label_column.to_string(),
        })
    }

    /// Like [`from_dataframe`](Self::from_dataframe), but take exactly
    /// `feature_names`, in that order, ignoring any other column.
    pub fn with_features(
        df: &DataFrame,
        label_column: &str,
        feature_names: &[String],
    ) -> Result<Self> {
        if df.column(label_column).is_err() {
            return Err(LearningError::TargetNotFound(label_column.to_string()));
        }
        let features = feature_matrix(df, feature_names)?;
        let labels = numeric_column(df, label_column)?;
        validate_binary(&labels)?;

        Ok(Self {
            features,
            labels,
            feature_names: feature_names.to_vec(),
            label_column: label_column.to_string(),
        })
    }

    /// Read a CSV table with a header row and convert it.
    pub fn from_csv(path: impl AsRef<Path>, label_column: &str) -> Result<Self> {
        let df = read_table(path.as_ref())?;
        Self::from_dataframe(&df, label_column)
    }

    pub fn n_rows(&self) -> usize {
        self.features.nrows()
    }
}

/// Read a CSV table with a header row.
pub fn read_table(path: &Path) -> Result<DataFrame> {
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(10_000))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))?
        .finish()?;
    Ok(df)
}

/// Build a row-major matrix from the named columns, in the given order.
///
/// # Errors
///
/// Returns [`LearningError::InvalidData`] naming the first missing or
/// non-numeric column.
pub fn feature_matrix(df: &DataFrame, columns: &[String]) -> Result<Array2<f64>> {
    let n_rows = df.height();
    let n_cols = columns.len();
    let mut data = vec![0.0; n_rows * n_cols];

    for (j, name) in columns.iter().enumerate() {
        if df.column(name).is_err() {
            return Err(LearningError::InvalidData(format!(
                "feature column '{}' is missing",
                name
            )));
        }
        let values = numeric_column(df, name)?;
        for (i, v) in values.into_iter().enumerate() {
            data[i * n_cols + j] = v;
        }
    }

    Array2::from_shape_vec((n_rows, n_cols), data)
        .map_err(|e| LearningError::InvalidData(e.to_string()))
}

/// Read a column as `f64`, nulls becoming NaN.
pub(crate) fn numeric_column(df: &DataFrame, name: &str) -> Result<Vec<f64>> {
    let series = df.column(name)?.as_materialized_series();
    if !series.dtype().is_primitive_numeric() && !series.dtype().is_bool() {
        return Err(LearningError::InvalidData(format!(
            "column '{}' is not numeric ({})",
            name,
            series.dtype()
        )));
    }
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted
        .f64()?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect())
}

/// Check that every label is 0 or 1.
pub fn validate_binary(labels: &[f64]) -> Result<()> {
    if let Some(bad) = labels.iter().find(|v| **v != 0.0 && **v != 1.0) {
        return Err(LearningError::InvalidData(format!(
            "labels must be 0 or 1, found {}",
            bad
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_dataframe_splits_label() {
        let df = df![
            "lead_time" => [10i64, 200, 35],
            "avg_price_per_room" => [99.5, 120.0, 80.25],
            "booking_status" => [0i64, 1, 0],
        ]
        .unwrap();

        let ds = Dataset::from_dataframe(&df, "booking_status").unwrap();
        assert_eq!(ds.feature_names, vec!["lead_time", "avg_price_per_room"]);
        assert_eq!(ds.features.shape(), &[3, 2]);
        assert_eq!(ds.features[[1, 0]], 200.0);
        assert_eq!(ds.features[[2, 1]], 80.25);
        assert_eq!(ds.labels, vec![0.0, 1.0, 0.0]);
    }

    #[test]
    fn test_missing_label() {
        let df = df!["lead_time" => [1i64, 2]].unwrap();
        let err = Dataset::from_dataframe(&df, "booking_status").unwrap_err();
        assert!(matches!(err, LearningError::TargetNotFound(ref c) if c == "booking_status"));
    }

    #[test]
    fn test_non_binary_label() {
        let df = df![
            "lead_time" => [1i64, 2],
            "booking_status" => [0i64, 2],
        ]
        .unwrap();
        assert!(matches!(
            Dataset::from_dataframe(&df, "booking_status"),
            Err(LearningError::InvalidData(_))
        ));
    }

    #[test]
    fn test_string_feature_rejected() {
        let df = df![
            "room_type_reserved" => ["Room_Type 1", "Room_Type 4"],
            "booking_status" => [0i64, 1],
        ]
        .unwrap();
        let err = Dataset::from_dataframe(&df, "booking_status").unwrap_err();
        assert!(err.to_string().contains("room_type_reserved"));
    }

    #[test]
    fn test_feature_matrix_follows_requested_order() {
        let df = df![
            "a" => [1i64, 2],
            "b" => [3.0, 4.0],
        ]
        .unwrap();
        let x = feature_matrix(&df, &["b".to_string(), "a".to_string()]).unwrap();
        assert_eq!(x.row(0).to_vec(), vec![3.0, 1.0]);
        let err = feature_matrix(&df, &["c".to_string()]).unwrap_err();
        assert!(err.to_string().contains("'c'"));
    }

    #[test]
    fn test_with_features_reorders() {
        let df = df![
            "booking_status" => [1i64, 0],
            "b" => [3.0, 4.0],
            "a" => [1.0, 2.0],
        ]
        .unwrap();
        let ds = Dataset::with_features(&df, "booking_status", &["a".to_string(), "b".to_string()])
            .unwrap();
        assert_eq!(ds.features.row(1).to_vec(), vec![2.0, 4.0]);
        assert_eq!(ds.labels, vec![1.0, 0.0]);
    }

    #[test]
    fn test_nulls_become_nan() {
        let df = df![
            "lead_time" => [Some(1.0), None],
            "booking_status" => [0i64, 1],
        ]
        .unwrap();
        let ds = Dataset::from_dataframe(&df, "booking_status").unwrap();
        assert!(ds.features[[1, 0]].is_nan());
    }
}
