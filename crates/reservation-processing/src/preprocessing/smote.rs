//! Synthetic minority oversampling (SMOTE).
//!
//! Every class smaller than the majority class receives synthetic rows until
//! the class counts are equal. A synthetic row lies on the segment between a
//! minority row and one of its `k` nearest minority neighbours (Euclidean
//! distance on the feature columns).

use ndarray::{Array2, ArrayView1};
use polars::prelude::*;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use reservation_learning::dataset::feature_matrix;
use tracing::{debug, info};

use crate::error::{PipelineError, Result};
use crate::utils::{column_names, float_values};

/// SMOTE oversampler.
#[derive(Debug, Clone)]
pub struct Smote {
    k_neighbors: usize,
    random_state: u64,
}

impl Smote {
    pub fn new(k_neighbors: usize, random_state: u64) -> Self {
        Self {
            k_neighbors: k_neighbors.max(1),
            random_state,
        }
    }

    /// Balance `df` on `label`.
    ///
    /// The output holds every feature column as `Float64` in the input order,
    /// followed by `label` as `Int64`. Original rows come first, in order,
    /// followed by the synthetic rows of each minority class in ascending
    /// label order.
    ///
    /// # Errors
    ///
    /// - [`PipelineError::ColumnNotFound`] if `label` is absent
    /// - [`PipelineError::DataFormat`] if a feature is not numeric, a label is
    ///   null, or a minority class has a single row
    pub fn fit_resample(&self, df: &DataFrame, label: &str) -> Result<DataFrame> {
        let labels: Vec<f64> = float_values(df, label)?
            .into_iter()
            .map(|v| {
                v.ok_or_else(|| {
                    PipelineError::DataFormat(format!("label column '{}' contains nulls", label))
                })
            })
            .collect::<Result<_>>()?;

        let feature_names: Vec<String> = column_names(df)
            .into_iter()
            .filter(|name| name != label)
            .collect();
        let features = feature_matrix(df, &feature_names)?;

        let mut classes: Vec<(f64, Vec<usize>)> = Vec::new();
        for (row, value) in labels.iter().enumerate() {
            match classes.iter_mut().find(|(class, _)| class == value) {
                Some((_, rows)) => rows.push(row),
                None => classes.push((*value, vec![row])),
            }
        }
        classes.sort_by(|a, b| a.0.total_cmp(&b.0));
        let majority = classes.iter().map(|(_, rows)| rows.len()).max().unwrap_or(0);

        let mut rng = StdRng::seed_from_u64(self.random_state);
        let mut synthetic: Vec<Vec<f64>> = Vec::new();
        let mut synthetic_labels: Vec<f64> = Vec::new();

        for (class, rows) in &classes {
            let needed = majority - rows.len();
            if needed == 0 {
                continue;
            }
            if rows.len() < 2 {
                return Err(PipelineError::DataFormat(format!(
                    "class {} has {} row(s); oversampling needs at least 2",
                    class,
                    rows.len()
                )));
            }

            let k = self.k_neighbors.min(rows.len() - 1);
            let neighbors = nearest_neighbors(&features, rows, k);
            debug!(class, rows = rows.len(), needed, k, "Generating synthetic rows");

            for _ in 0..needed {
                let pick = rng.gen_range(0..rows.len() * k);
                let (i, j) = (pick / k, pick % k);
                let base = features.row(rows[i]);
                let other = features.row(neighbors[i][j]);
                let gap: f64 = rng.r#gen();
                synthetic.push(interpolate(base, other, gap));
                synthetic_labels.push(*class);
            }
        }

        info!(
            rows_before = df.height(),
            synthetic = synthetic.len(),
            classes = classes.len(),
            "Balanced dataset created"
        );
        build_frame(&features, &feature_names, &labels, &synthetic, &synthetic_labels, label)
    }
}

/// Balance `df` on `label` with [`Smote`].
pub fn balance(df: &DataFrame, label: &str, k_neighbors: usize, random_state: u64) -> Result<DataFrame> {
    Smote::new(k_neighbors, random_state).fit_resample(df, label)
}

/// For each of `rows`, the `k` closest other rows of the same set (as row
/// indices of `features`), nearest first with ties broken by position.
fn nearest_neighbors(features: &Array2<f64>, rows: &[usize], k: usize) -> Vec<Vec<usize>> {
    rows.par_iter()
        .map(|&row| {
            let origin = features.row(row);
            let mut distances: Vec<(f64, usize)> = rows
                .iter()
                .filter(|&&other| other != row)
                .map(|&other| (squared_distance(origin, features.row(other)), other))
                .collect();
            distances.sort_by(|a, b| a.0.total_cmp(&b.0).then(a.1.cmp(&b.1)));
            distances.into_iter().take(k).map(|(_, other)| other).collect()
        })
        .collect()
}

fn squared_distance(a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>) -> f64 {
    a.iter().zip(b.iter()).map(|(x, y)| (x - y) * (x - y)).sum()
}

fn interpolate(base: ArrayView1<'_, f64>, other: ArrayView1<'_, f64>, gap: f64) -> Vec<f64> {
    base.iter()
        .zip(other.iter())
        .map(|(b, o)| b + gap * (o - b))
        .collect()
}

fn build_frame(
    features: &Array2<f64>,
    feature_names: &[String],
    labels: &[f64],
    synthetic: &[Vec<f64>],
    synthetic_labels: &[f64],
    label: &str,
) -> Result<DataFrame> {
    let mut columns: Vec<Column> = Vec::with_capacity(feature_names.len() + 1);
    for (j, name) in feature_names.iter().enumerate() {
        let values: Vec<f64> = features
            .column(j)
            .iter()
            .copied()
            .chain(synthetic.iter().map(|row| row[j]))
            .collect();
        columns.push(Column::new(name.as_str().into(), values));
    }
    let label_values: Vec<i64> = labels
        .iter()
        .chain(synthetic_labels)
        .map(|v| *v as i64)
        .collect();
    columns.push(Column::new(label.into(), label_values));
    Ok(DataFrame::new(columns)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn imbalanced() -> DataFrame {
        df! {
            "lead_time" => [1.0, 2.0, 3.0, 4.0, 5.0, 6.0, 7.0, 8.0, 50.0, 52.0, 54.0],
            "price" => [10.0, 11.0, 12.0, 13.0, 14.0, 15.0, 16.0, 17.0, 90.0, 95.0, 99.0],
            "booking_status" => [1i64, 1, 1, 1, 1, 1, 1, 1, 0, 0, 0],
        }
        .unwrap()
    }

    fn class_counts(df: &DataFrame) -> (usize, usize) {
        let labels = df.column("booking_status").unwrap().i64().unwrap();
        let ones = labels.into_no_null_iter().filter(|v| *v == 1).count();
        (df.height() - ones, ones)
    }

    #[test]
    fn test_classes_are_balanced() {
        let out = Smote::new(5, 42).fit_resample(&imbalanced(), "booking_status").unwrap();
        assert_eq!(out.height(), 16);
        assert_eq!(class_counts(&out), (8, 8));
        assert_eq!(
            column_names(&out),
            vec!["lead_time", "price", "booking_status"]
        );
    }

    #[test]
    fn test_synthetic_rows_stay_within_minority_hull() {
        let out = Smote::new(5, 42).fit_resample(&imbalanced(), "booking_status").unwrap();
        let lead = out.column("lead_time").unwrap().f64().unwrap();
        let price = out.column("price").unwrap().f64().unwrap();
        for row in 11..16 {
            let l = lead.get(row).unwrap();
            let p = price.get(row).unwrap();
            assert!((50.0..=54.0).contains(&l), "lead_time {}", l);
            assert!((90.0..=99.0).contains(&p), "price {}", p);
        }
    }

    #[test]
    fn test_original_rows_kept_in_order() {
        let input = imbalanced();
        let out = Smote::new(5, 42).fit_resample(&input, "booking_status").unwrap();
        let head = out.head(Some(11));
        let expected = input.column("lead_time").unwrap().f64().unwrap().clone();
        assert!(head.column("lead_time").unwrap().f64().unwrap().equal(&expected).all());
    }

    #[test]
    fn test_deterministic_for_seed() {
        let a = Smote::new(3, 7).fit_resample(&imbalanced(), "booking_status").unwrap();
        let b = Smote::new(3, 7).fit_resample(&imbalanced(), "booking_status").unwrap();
        assert!(a.equals(&b));
    }

    #[test]
    fn test_balance_matches_oversampler() {
        let direct = Smote::new(5, 42).fit_resample(&imbalanced(), "booking_status").unwrap();
        let via_fn = balance(&imbalanced(), "booking_status", 5, 42).unwrap();
        assert!(direct.equals(&via_fn));
    }

    #[test]
    fn test_balanced_input_unchanged_in_size() {
        let df = df! {
            "x" => [1.0, 2.0, 3.0, 4.0],
            "booking_status" => [0i64, 1, 0, 1],
        }
        .unwrap();
        let out = Smote::new(5, 42).fit_resample(&df, "booking_status").unwrap();
        assert_eq!(out.height(), 4);
    }

    #[test]
    fn test_single_row_minority_rejected() {
        let df = df! {
            "x" => [1.0, 2.0, 3.0],
            "booking_status" => [0i64, 1, 1],
        }
        .unwrap();
        let err = Smote::new(5, 42).fit_resample(&df, "booking_status").unwrap_err();
        assert_eq!(err.error_code(), "DATA_FORMAT");
    }

    #[test]
    fn test_missing_label() {
        let err = Smote::new(5, 42).fit_resample(&imbalanced(), "status").unwrap_err();
        assert_eq!(err.error_code(), "SCHEMA_ERROR");
    }
}
