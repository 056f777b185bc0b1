//! Skewness correction for numeric columns.

use polars::prelude::*;
use tracing::{debug, info};

use crate::error::Result;
use crate::utils::float_values;

/// Adjusted Fisher-Pearson sample skewness of the non-null, non-NaN values.
///
/// Returns `None` for fewer than 3 values, and `Some(0.0)` when all values
/// are equal.
pub fn sample_skewness(values: &[Option<f64>]) -> Option<f64> {
    let present: Vec<f64> = values.iter().flatten().copied().filter(|v| !v.is_nan()).collect();
    let n = present.len();
    if n < 3 {
        return None;
    }

    let n_f = n as f64;
    let mean = present.iter().sum::<f64>() / n_f;
    let (m2, m3) = present.iter().fold((0.0, 0.0), |(m2, m3), v| {
        let d = v - mean;
        (m2 + d * d, m3 + d * d * d)
    });
    let m2 = m2 / n_f;
    let m3 = m3 / n_f;

    // Rounding noise on a constant column.
    if m2 < 1e-14 {
        return Some(0.0);
    }

    let g1 = m3 / m2.powf(1.5);
    Some(g1 * (n_f * (n_f - 1.0)).sqrt() / (n_f - 2.0))
}

/// Replace each of `columns` whose skewness exceeds `threshold` with
/// `ln(1 + x)`, returning the table and the transformed column names.
///
/// Values at or below `-1` become `-inf` or NaN.
///
/// # Errors
///
/// Returns [`PipelineError::ColumnNotFound`](crate::PipelineError::ColumnNotFound)
/// for an absent column and
/// [`PipelineError::DataFormat`](crate::PipelineError::DataFormat) for a
/// non-numeric one.
pub fn deskew(df: DataFrame, columns: &[String], threshold: f64) -> Result<(DataFrame, Vec<String>)> {
    let mut selected = Vec::new();
    for name in columns {
        let values = float_values(&df, name)?;
        match sample_skewness(&values) {
            Some(skew) if skew > threshold => {
                debug!(column = %name, skew, threshold, "Column exceeds skewness threshold");
                selected.push(name.clone());
            }
            Some(skew) => debug!(column = %name, skew, "Column kept"),
            None => debug!(column = %name, "Skewness undefined, column kept"),
        }
    }

    let df = apply_log1p(df, &selected)?;
    info!(transformed = ?selected, "Skewness handling complete");
    Ok((df, selected))
}

/// Replace each of `columns` with `ln(1 + x)` as `Float64`.
pub fn apply_log1p(mut df: DataFrame, columns: &[String]) -> Result<DataFrame> {
    for name in columns {
        let transformed: Vec<Option<f64>> = float_values(&df, name)?
            .into_iter()
            .map(|v| v.map(f64::ln_1p))
            .collect();
        df.replace(name, Series::new(name.as_str().into(), transformed))?;
    }
    Ok(df)
}
