//! Shared utilities for the pipeline.
//!
//! Table I/O and column helpers used by ingestion and preprocessing.

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::debug;

use crate::error::{PipelineError, Result, ResultExt};

// =============================================================================
// Table I/O
// =============================================================================

/// Rows scanned to infer column types.
const INFER_SCHEMA_ROWS: usize = 10_000;

/// Read a CSV table with a header row.
///
/// # Errors
///
/// Returns [`PipelineError::Io`] if the file does not exist and
/// [`PipelineError::DataFormat`] if it cannot be parsed.
pub fn read_csv(path: &Path) -> Result<DataFrame> {
    if !path.is_file() {
        return Err(PipelineError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            format!("{} does not exist", path.display()),
        )));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(Some(INFER_SCHEMA_ROWS))
        .try_into_reader_with_file_path(Some(PathBuf::from(path)))
        .and_then(|reader| reader.finish())
        .map_err(|e| {
            PipelineError::DataFormat(format!("cannot parse {}: {}", path.display(), e))
        })?;

    debug!(path = %path.display(), rows = df.height(), columns = df.width(), "Read table");
    Ok(df)
}

/// Write `df` as CSV with a header row, creating parent directories and
/// replacing any existing file.
pub fn write_csv(df: &mut DataFrame, path: &Path) -> Result<()> {
    ensure_parent_dir(path)?;
    let mut file = File::create(path).context(format!("Creating {}", path.display()))?;
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(df)
        .context(format!("Writing {}", path.display()))?;

    debug!(path = %path.display(), rows = df.height(), "Wrote table");
    Ok(())
}

/// Create the parent directory of `path` if it has one.
pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        fs::create_dir_all(parent).context(format!("Creating {}", parent.display()))?;
    }
    Ok(())
}

// =============================================================================
// Column Utilities
// =============================================================================

/// Check if a DataType is numeric (integer or float).
#[inline]
pub fn is_numeric_dtype(dtype: &DataType) -> bool {
    dtype.is_primitive_numeric()
}

/// Column names of `df`, in order.
pub fn column_names(df: &DataFrame) -> Vec<String> {
    df.get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect()
}

/// Fail with [`PipelineError::ColumnNotFound`] naming the first of `columns`
/// that `df` lacks.
pub fn require_columns<'a, I>(df: &DataFrame, columns: I) -> Result<()>
where
    I: IntoIterator<Item = &'a String>,
{
    for column in columns {
        if df.column(column).is_err() {
            return Err(PipelineError::ColumnNotFound(column.clone()));
        }
    }
    Ok(())
}

/// Read a numeric column as `f64`, nulls becoming `None`.
pub fn float_values(df: &DataFrame, column: &str) -> Result<Vec<Option<f64>>> {
    let series = df
        .column(column)
        .map_err(|_| PipelineError::ColumnNotFound(column.to_string()))?
        .as_materialized_series();
    if !is_numeric_dtype(series.dtype()) {
        return Err(PipelineError::DataFormat(format!(
            "column '{}' is not numeric ({})",
            column,
            series.dtype()
        )));
    }
    let casted = series.cast(&DataType::Float64)?;
    Ok(casted.f64()?.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_write_then_read_creates_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/out/table.csv");
        let mut df = df! {
            "lead_time" => [10i64, 200, 35],
            "type_of_meal_plan" => ["Meal Plan 1", "Not Selected", "Meal Plan 1"],
        }
        .unwrap();

        write_csv(&mut df, &path).unwrap();
        let back = read_csv(&path).unwrap();
        assert_eq!(column_names(&back), vec!["lead_time", "type_of_meal_plan"]);
        assert_eq!(back.height(), 3);
    }

    #[test]
    fn test_read_missing_file_is_io_error() {
        let err = read_csv(Path::new("/nonexistent/raw.csv")).unwrap_err();
        assert_eq!(err.error_code(), "IO_ERROR");
    }

    #[test]
    fn test_require_columns() {
        let df = df! { "a" => [1i64], "b" => [2i64] }.unwrap();
        let present = vec!["a".to_string(), "b".to_string()];
        assert!(require_columns(&df, &present).is_ok());

        let missing = vec!["a".to_string(), "c".to_string()];
        let err = require_columns(&df, &missing).unwrap_err();
        assert!(matches!(err, PipelineError::ColumnNotFound(c) if c == "c"));
    }

    #[test]
    fn test_float_values_rejects_text() {
        let df = df! { "room" => ["Room_Type 1"] }.unwrap();
        assert_eq!(float_values(&df, "room").unwrap_err().error_code(), "DATA_FORMAT");

        let df = df! { "price" => [Some(1i64), None] }.unwrap();
        assert_eq!(float_values(&df, "price").unwrap(), vec![Some(1.0), None]);
    }
}
