//! Random-forest feature selection and test-table alignment.

use polars::prelude::*;
use reservation_learning::dataset::feature_matrix;
use reservation_learning::{RandomForestClassifier, RandomForestParams};
use tracing::{debug, info};

use crate::error::{PipelineError, Result, ResultExt};
use crate::utils::{column_names, float_values, require_columns};

/// Outcome of [`select_features()`].
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSelection {
    /// Selected features, most important first.
    pub features: Vec<String>,
    /// Importance of every candidate feature, in descending order.
    pub importances: Vec<(String, f64)>,
}

/// Keep the `n` features a random forest ranks highest, followed by `label`.
///
/// Ties keep the original column order.
///
/// # Errors
///
/// - [`PipelineError::ColumnNotFound`] if `label` is absent
/// - [`PipelineError::InvalidConfig`] if `n` is zero or exceeds the number of
///   features
/// - [`PipelineError::Learning`] if the forest cannot be fitted
pub fn select_features(
    df: &DataFrame,
    label: &str,
    n: usize,
    random_state: u64,
) -> Result<(DataFrame, FeatureSelection)> {
    let labels: Vec<f64> = float_values(df, label)?
        .into_iter()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    let candidates: Vec<String> = column_names(df)
        .into_iter()
        .filter(|name| name != label)
        .collect();

    if n == 0 || n > candidates.len() {
        return Err(PipelineError::InvalidConfig(format!(
            "num_of_features is {} but {} features are available",
            n,
            candidates.len()
        )));
    }

    let x = feature_matrix(df, &candidates)?;
    let params = RandomForestParams {
        random_state,
        ..RandomForestParams::default()
    };
    let forest = RandomForestClassifier::fit(&params, x.view(), &labels)
        .context("Fitting feature-ranking forest")?;

    let mut importances: Vec<(String, f64)> = candidates
        .into_iter()
        .zip(forest.feature_importances().iter().copied())
        .collect();
    importances.sort_by(|a, b| b.1.total_cmp(&a.1));
    for (name, importance) in &importances {
        debug!(feature = %name, importance, "Feature importance");
    }

    let features: Vec<String> = importances
        .iter()
        .take(n)
        .map(|(name, _)| name.clone())
        .collect();
    let mut keep = features.clone();
    keep.push(label.to_string());
    let selected = df.select(keep)?;

    info!(selected = ?features, "Feature selection complete");
    Ok((
        selected,
        FeatureSelection {
            features,
            importances,
        },
    ))
}

/// Restrict `test` to `columns`, in that order.
///
/// # Errors
///
/// Returns [`PipelineError::ColumnNotFound`] naming the first absent column.
pub fn align_test(test: &DataFrame, columns: &[String]) -> Result<DataFrame> {
    require_columns(test, columns)?;
    Ok(test.select(columns.iter().map(String::as_str))?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    /// `signal` determines the label; `noise_*` are unrelated.
    fn frame(rows: usize) -> DataFrame {
        let signal: Vec<f64> = (0..rows).map(|i| (i % 10) as f64).collect();
        let noise_a: Vec<f64> = (0..rows).map(|i| ((i * 7919) % 13) as f64).collect();
        let noise_b: Vec<f64> = (0..rows).map(|i| ((i * 104_729) % 17) as f64).collect();
        let label: Vec<i64> = signal.iter().map(|s| i64::from(*s >= 5.0)).collect();
        df! {
            "noise_a" => noise_a,
            "signal" => signal,
            "noise_b" => noise_b,
            "booking_status" => label,
        }
        .unwrap()
    }

    #[test]
    fn test_selects_top_feature_and_appends_label() {
        let (selected, selection) = select_features(&frame(200), "booking_status", 1, 42).unwrap();
        assert_eq!(selection.features, vec!["signal".to_string()]);
        assert_eq!(column_names(&selected), vec!["signal", "booking_status"]);
        assert_eq!(selection.importances.len(), 3);
        assert!(
            selection
                .importances
                .windows(2)
                .all(|pair| pair[0].1 >= pair[1].1)
        );
    }

    #[test]
    fn test_selects_exactly_n_plus_label() {
        let (selected, _) = select_features(&frame(100), "booking_status", 2, 42).unwrap();
        assert_eq!(selected.width(), 3);
        assert_eq!(selected.get_column_names()[2].as_str(), "booking_status");
    }

    #[test]
    fn test_too_many_features_requested() {
        let err = select_features(&frame(50), "booking_status", 4, 42).unwrap_err();
        assert_eq!(err.error_code(), "INVALID_CONFIG");
    }

    #[test]
    fn test_align_test_follows_given_order() {
        let test = frame(10);
        let columns = vec![
            "signal".to_string(),
            "noise_a".to_string(),
            "booking_status".to_string(),
        ];
        let aligned = align_test(&test, &columns).unwrap();
        assert_eq!(column_names(&aligned), columns);
        assert_eq!(aligned.height(), 10);
    }

    #[test]
    fn test_align_test_missing_column() {
        let test = frame(10).drop("signal").unwrap();
        let err = align_test(&test, &["signal".to_string()]).unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
        assert!(err.to_string().contains("signal"));
    }
}
