//! Histogram binning of continuous features.
//!
//! Both tree ensembles search splits over per-feature bins rather than raw
//! values. A feature with at most `max_bin` distinct values gets one bin per
//! value (thresholds at the midpoints); otherwise thresholds are quantile
//! cuts of the sorted values.
//!
//! A row lands in bin `b` when exactly `b` thresholds are strictly below its
//! value, so `bin(v) <= b` holds exactly when `v <= thresholds[b]`. Trees
//! store the raw threshold and route `v <= threshold` left at prediction time,
//! which keeps binned training and raw inference consistent. NaN falls in
//! the last bin and always goes right.
//!
//! Thresholds come from finite values only. `-inf` (from `log1p(-1)`) then
//! sits in bin 0 and `+inf` in the last bin, both consistent with raw routing.

use ndarray::ArrayView2;

/// Fitted per-feature bin thresholds.
#[derive(Debug, Clone)]
pub(crate) struct BinMapper {
    thresholds: Vec<Vec<f64>>,
}

/// Column-major bin indices for a feature matrix.
#[derive(Debug, Clone)]
pub(crate) struct BinnedMatrix {
    columns: Vec<Vec<u8>>,
}

impl BinMapper {
    /// Compute thresholds for every column of `x`. `max_bin` must be in `2..=256`.
    pub(crate) fn fit(x: ArrayView2<'_, f64>, max_bin: usize) -> Self {
        let thresholds = x
            .columns()
            .into_iter()
            .map(|column| {
                let mut values: Vec<f64> = column.iter().copied().filter(|v| v.is_finite()).collect();
                values.sort_by(|a, b| a.total_cmp(b));
                feature_thresholds(&values, max_bin)
            })
            .collect();
        Self { thresholds }
    }

    pub(crate) fn n_bins(&self, feature: usize) -> usize {
        self.thresholds[feature].len() + 1
    }

    /// Raw value separating bin `bin` from bin `bin + 1`.
    pub(crate) fn threshold(&self, feature: usize, bin: usize) -> f64 {
        self.thresholds[feature][bin]
    }

    pub(crate) fn bin_value(&self, feature: usize, value: f64) -> u8 {
        let cuts = &self.thresholds[feature];
        if value.is_nan() {
            return cuts.len() as u8;
        }
        cuts.partition_point(|t| *t < value) as u8
    }

    pub(crate) fn transform(&self, x: ArrayView2<'_, f64>) -> BinnedMatrix {
        let columns = x
            .columns()
            .into_iter()
            .enumerate()
            .map(|(feature, column)| column.iter().map(|v| self.bin_value(feature, *v)).collect())
            .collect();
        BinnedMatrix { columns }
    }
}

impl BinnedMatrix {
    pub(crate) fn column(&self, feature: usize) -> &[u8] {
        &self.columns[feature]
    }

    pub(crate) fn n_features(&self) -> usize {
        self.columns.len()
    }
}

fn feature_thresholds(sorted: &[f64], max_bin: usize) -> Vec<f64> {
    let mut distinct: Vec<f64> = sorted.to_vec();
    distinct.dedup();

    if distinct.len() <= 1 {
        return Vec::new();
    }

    if distinct.len() <= max_bin {
        return distinct.windows(2).map(|w| w[0] + (w[1] - w[0]) / 2.0).collect();
    }

    let n = sorted.len();
    let mut cuts: Vec<f64> = (1..max_bin).map(|i| sorted[(i * n) / max_bin]).collect();
    cuts.dedup();
    // the largest value must stay right of every cut
    if cuts.last().is_some_and(|last| *last >= distinct[distinct.len() - 1]) {
        cuts.pop();
    }
    cuts
}
