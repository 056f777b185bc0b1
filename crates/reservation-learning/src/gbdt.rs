//! Gradient-boosted decision trees for binary classification.
//!
//! Trees are grown leaf-wise (best-first) on histogram bins, in the manner of
//! LightGBM: at every step the leaf with the largest split gain is split,
//! until `num_leaves` leaves exist or no leaf can be split. The loss is
//! logistic; raw scores start from the log-odds of the positive rate.
//!
//! For each round:
//!
//! ```text
//! p    = sigmoid(F)
//! g    = p - y
//! h    = max(p (1 - p), 1e-6)
//! gain = G_L²/(H_L+λ) + G_R²/(H_R+λ) - G²/(H+λ)
//! leaf = -G/(H+λ) * learning_rate
//! ```
//!
//! The child with fewer rows gets a fresh histogram; its sibling's histogram
//! is the parent's minus that one.

use ndarray::{ArrayView1, ArrayView2};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binning::{BinMapper, BinnedMatrix};
use crate::config::{BoostingType, GbdtParams};
use crate::dataset::validate_binary;
use crate::error::{LearningError, Result};
use crate::tree::Tree;

const MIN_HESSIAN: f64 = 1e-6;
const PROB_EPSILON: f64 = 1e-7;

/// A fitted boosted-tree binary classifier.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingClassifier {
    params: GbdtParams,
    base_score: f64,
    trees: Vec<Tree>,
    split_counts: Vec<f64>,
    n_features: usize,
}

#[derive(Debug, Clone, Copy, Default)]
struct BinStats {
    grad: f64,
    hess: f64,
    count: usize,
}

type Histogram = Vec<Vec<BinStats>>;

#[derive(Debug, Clone, Copy)]
struct LeafSplit {
    feature: usize,
    bin: usize,
    gain: f64,
    left: (f64, f64),
    right: (f64, f64),
}

struct OpenLeaf {
    node: usize,
    rows: Vec<usize>,
    depth: usize,
    hist: Histogram,
    best: Option<LeafSplit>,
}

/// Per-round view of the training data.
struct RoundContext<'a> {
    binned: &'a BinnedMatrix,
    mapper: &'a BinMapper,
    grad: &'a [f64],
    hess: &'a [f64],
    params: &'a GbdtParams,
}

impl GradientBoostingClassifier {
    /// Fit on `x` with labels `y` (each 0 or 1).
    ///
    /// # Errors
    ///
    /// - [`LearningError::InvalidConfig`] if `params` fail validation
    /// - [`LearningError::InvalidData`] on shape mismatch, empty input or
    ///   non-binary labels
    pub fn fit(params: &GbdtParams, x: ArrayView2<'_, f64>, y: &[f64]) -> Result<Self> {
        params.validate()?;
        if x.nrows() != y.len() {
            return Err(LearningError::InvalidData(format!(
                "feature matrix has {} rows but {} labels were given",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(LearningError::InvalidData(
                "cannot fit a boosted model on an empty table".to_string(),
            ));
        }
        validate_binary(y)?;

        let n = y.len();
        let n_features = x.ncols();
        let mapper = BinMapper::fit(x, params.max_bin);
        let binned = mapper.transform(x);

        let positive_rate =
            (y.iter().sum::<f64>() / n as f64).clamp(PROB_EPSILON, 1.0 - PROB_EPSILON);
        let base_score = (positive_rate / (1.0 - positive_rate)).ln();

        let mut scores = vec![base_score; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut split_counts = vec![0.0; n_features];
        let mut rng = StdRng::seed_from_u64(params.random_state);

        let mut grad = vec![0.0; n];
        let mut hess = vec![0.0; n];

        for iteration in 0..params.n_estimators {
            for i in 0..n {
                let p = sigmoid(scores[i]);
                grad[i] = p - y[i];
                hess[i] = (p * (1.0 - p)).max(MIN_HESSIAN);
            }

            let rows = match params.boosting_type {
                BoostingType::Goss if (iteration as f64) >= 1.0 / params.learning_rate => {
                    goss_sample(&mut grad, &mut hess, params, &mut rng)
                }
                _ => (0..n).collect(),
            };

            let ctx = RoundContext {
                binned: &binned,
                mapper: &mapper,
                grad: &grad,
                hess: &hess,
                params,
            };
            let tree = grow_tree(&ctx, rows);

            for feature in tree.split_features() {
                split_counts[feature] += 1.0;
            }
            for (i, row) in x.rows().into_iter().enumerate() {
                scores[i] += tree.predict_row(row);
            }
            trees.push(tree);
        }

        debug!(
            trees = trees.len(),
            boosting = params.boosting_type.as_str(),
            "Boosted model fitted"
        );

        Ok(Self {
            params: params.clone(),
            base_score,
            trees,
            split_counts,
            n_features,
        })
    }

    /// Raw log-odds for every row.
    pub fn predict_raw(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        if x.ncols() != self.n_features {
            return Err(LearningError::InvalidData(format!(
                "model expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(x.rows().into_iter().map(|row| self.raw_row(row)).collect())
    }

    /// Probability of class 1 for every row.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        Ok(self.predict_raw(x)?.into_iter().map(sigmoid).collect())
    }

    /// Predicted class (0 or 1) for every row, at the 0.5 probability boundary.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| if p > 0.5 { 1.0 } else { 0.0 })
            .collect())
    }

    /// Number of splits using each feature across all trees.
    pub fn feature_importances(&self) -> &[f64] {
        &self.split_counts
    }

    pub fn params(&self) -> &GbdtParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    fn raw_row(&self, row: ArrayView1<'_, f64>) -> f64 {
        self.base_score + self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>()
    }
}

fn sigmoid(x: f64) -> f64 {
    1.0 / (1.0 + (-x).exp())
}

/// Keep the `top_rate` share of rows with the largest |gradient| and a random
/// `other_rate` share of the rest, amplifying the latter's gradients and
/// hessians by `(1 - top_rate) / other_rate`. Returns the kept rows, sorted.
fn goss_sample(
    grad: &mut [f64],
    hess: &mut [f64],
    params: &GbdtParams,
    rng: &mut StdRng,
) -> Vec<usize> {
    let n = grad.len();
    let top_k = ((n as f64 * params.top_rate) as usize).clamp(1, n);
    let other_k = ((n as f64 * params.other_rate) as usize).min(n - top_k);

    let mut order: Vec<usize> = (0..n).collect();
    order.sort_by(|&a, &b| grad[b].abs().total_cmp(&grad[a].abs()));

    let mut rows: Vec<usize> = order[..top_k].to_vec();
    let rest = &order[top_k..];
    let amplification = (1.0 - params.top_rate) / params.other_rate;
    for pick in rand::seq::index::sample(rng, rest.len(), other_k).into_iter() {
        let r = rest[pick];
        grad[r] *= amplification;
        hess[r] *= amplification;
        rows.push(r);
    }
    rows.sort_unstable();
    rows
}

fn grow_tree(ctx: &RoundContext<'_>, rows: Vec<usize>) -> Tree {
    let params = ctx.params;
    let hist = build_histogram(ctx, &rows);
    let (g, h) = totals(&hist);
    let mut tree = Tree::new(leaf_value(g, h, params));

    let mut root = OpenLeaf {
        node: 0,
        rows,
        depth: 0,
        hist,
        best: None,
    };
    root.best = find_split(ctx, &root);
    let mut leaves = vec![root];

    while leaves.len() < params.num_leaves {
        let mut chosen: Option<(usize, f64)> = None;
        for (idx, leaf) in leaves.iter().enumerate() {
            let Some(split) = &leaf.best else {
                continue;
            };
            if chosen.is_none_or(|(_, gain)| split.gain > gain) {
                chosen = Some((idx, split.gain));
            }
        }
        let Some((idx, _)) = chosen else {
            break;
        };

        let leaf = leaves.swap_remove(idx);
        let Some(split) = leaf.best else {
            break;
        };

        let column = ctx.binned.column(split.feature);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = leaf
            .rows
            .into_iter()
            .partition(|&r| column[r] as usize <= split.bin);

        let (left_hist, right_hist) = if left_rows.len() <= right_rows.len() {
            let small = build_histogram(ctx, &left_rows);
            let large = subtract(&leaf.hist, &small);
            (small, large)
        } else {
            let small = build_histogram(ctx, &right_rows);
            let large = subtract(&leaf.hist, &small);
            (large, small)
        };

        let (left_node, right_node) = tree.split(
            leaf.node,
            split.feature,
            ctx.mapper.threshold(split.feature, split.bin),
            leaf_value(split.left.0, split.left.1, params),
            leaf_value(split.right.0, split.right.1, params),
        );

        for (node, rows, hist) in [
            (left_node, left_rows, left_hist),
            (right_node, right_rows, right_hist),
        ] {
            let mut child = OpenLeaf {
                node,
                rows,
                depth: leaf.depth + 1,
                hist,
                best: None,
            };
            child.best = find_split(ctx, &child);
            leaves.push(child);
        }
    }

    tree
}

fn leaf_value(grad: f64, hess: f64, params: &GbdtParams) -> f64 {
    -grad / (hess + params.reg_lambda) * params.learning_rate
}

fn build_histogram(ctx: &RoundContext<'_>, rows: &[usize]) -> Histogram {
    (0..ctx.binned.n_features())
        .into_par_iter()
        .map(|feature| {
            let mut bins = vec![BinStats::default(); ctx.mapper.n_bins(feature)];
            let column = ctx.binned.column(feature);
            for &r in rows {
                let slot = &mut bins[column[r] as usize];
                slot.grad += ctx.grad[r];
                slot.hess += ctx.hess[r];
                slot.count += 1;
            }
            bins
        })
        .collect()
}

fn subtract(parent: &Histogram, child: &Histogram) -> Histogram {
    parent
        .iter()
        .zip(child)
        .map(|(p, c)| {
            p.iter()
                .zip(c)
                .map(|(p, c)| BinStats {
                    grad: p.grad - c.grad,
                    hess: p.hess - c.hess,
                    count: p.count - c.count,
                })
                .collect()
        })
        .collect()
}

fn totals(hist: &Histogram) -> (f64, f64) {
    hist.first().map_or((0.0, 0.0), |bins| {
        bins.iter()
            .fold((0.0, 0.0), |(g, h), b| (g + b.grad, h + b.hess))
    })
}

fn find_split(ctx: &RoundContext<'_>, leaf: &OpenLeaf) -> Option<LeafSplit> {
    let params = ctx.params;
    if params.max_depth > 0 && leaf.depth as i64 >= params.max_depth {
        return None;
    }
    if leaf.rows.len() < 2 * params.min_child_samples.max(1) {
        return None;
    }

    let (g, h) = totals(&leaf.hist);
    let n = leaf.rows.len();
    let lambda = params.reg_lambda;
    let parent_score = g * g / (h + lambda);
    let mut best: Option<LeafSplit> = None;

    for (feature, bins) in leaf.hist.iter().enumerate() {
        let (mut gl, mut hl, mut cl) = (0.0, 0.0, 0usize);
        for (bin, stats) in bins.iter().enumerate().take(bins.len().saturating_sub(1)) {
            gl += stats.grad;
            hl += stats.hess;
            cl += stats.count;
            let (gr, hr, cr) = (g - gl, h - hl, n - cl);
            if cl < params.min_child_samples || cr < params.min_child_samples {
                continue;
            }
            if hl < params.min_child_weight || hr < params.min_child_weight {
                continue;
            }
            let gain = gl * gl / (hl + lambda) + gr * gr / (hr + lambda) - parent_score;
            if gain > 0.0 && best.is_none_or(|b| gain > b.gain) {
                best = Some(LeafSplit {
                    feature,
                    bin,
                    gain,
                    left: (gl, hl),
                    right: (gr, hr),
                });
            }
        }
    }

    best
}

static_assertions::assert_impl_all!(GradientBoostingClassifier: Send, Sync);

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::Array2;
    use rand::Rng;

    fn separable(n: usize, seed: u64) -> (Array2<f64>, Vec<f64>) {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut data = Vec::with_capacity(n * 2);
        let mut y = Vec::with_capacity(n);
        for _ in 0..n {
            let lead_time: f64 = rng.gen_range(0.0..400.0);
            let price: f64 = rng.gen_range(50.0..200.0);
            data.extend_from_slice(&[lead_time, price]);
            y.push(if lead_time > 150.0 { 1.0 } else { 0.0 });
        }
        (Array2::from_shape_vec((n, 2), data).unwrap(), y)
    }

    fn small_params() -> GbdtParams {
        GbdtParams {
            n_estimators: 30,
            num_leaves: 8,
            ..Default::default()
        }
    }

    #[test]
    fn test_learns_threshold() {
        let (x, y) = separable(400, 1);
        let model = GradientBoostingClassifier::fit(&small_params(), x.view(), &y).unwrap();
        let (xt, yt) = separable(200, 2);
        let pred = model.predict(xt.view()).unwrap();
        let correct = pred.iter().zip(&yt).filter(|(p, t)| p == t).count();
        assert!(correct as f64 / yt.len() as f64 > 0.95);
        assert!(model.feature_importances()[0] > 0.0);
    }

    #[test]
    fn test_goss_is_deterministic() {
        let (x, y) = separable(300, 5);
        let params = GbdtParams {
            boosting_type: BoostingType::Goss,
            learning_rate: 0.2,
            ..small_params()
        };
        let a = GradientBoostingClassifier::fit(&params, x.view(), &y).unwrap();
        let b = GradientBoostingClassifier::fit(&params, x.view(), &y).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.n_trees(), 30);
    }

    #[test]
    fn test_num_leaves_bound() {
        let (x, y) = separable(500, 9);
        let params = GbdtParams {
            n_estimators: 5,
            num_leaves: 4,
            min_child_samples: 1,
            ..Default::default()
        };
        let model = GradientBoostingClassifier::fit(&params, x.view(), &y).unwrap();
        assert!(model.trees.iter().all(|t| t.n_leaves() <= 4));
    }

    #[test]
    fn test_max_depth_one_gives_stumps() {
        let (x, y) = separable(200, 4);
        let params = GbdtParams {
            n_estimators: 3,
            max_depth: 1,
            ..Default::default()
        };
        let model = GradientBoostingClassifier::fit(&params, x.view(), &y).unwrap();
        assert!(model.trees.iter().all(|t| t.n_leaves() <= 2));
    }

    #[test]
    fn test_probabilities_in_unit_interval() {
        let (x, y) = separable(200, 11);
        let model = GradientBoostingClassifier::fit(&small_params(), x.view(), &y).unwrap();
        let proba = model.predict_proba(x.view()).unwrap();
        assert!(proba.iter().all(|p| (0.0..=1.0).contains(p)));
    }

    #[test]
    fn test_rejects_wrong_width() {
        let (x, y) = separable(100, 3);
        let model = GradientBoostingClassifier::fit(&small_params(), x.view(), &y).unwrap();
        let narrow = Array2::<f64>::zeros((2, 1));
        assert!(model.predict(narrow.view()).is_err());
    }

    #[test]
    fn test_rejects_non_binary_labels() {
        let x = Array2::<f64>::zeros((3, 1));
        let err = GradientBoostingClassifier::fit(&GbdtParams::default(), x.view(), &[0.0, 1.0, 2.0])
            .unwrap_err();
        assert!(matches!(err, LearningError::InvalidData(_)));
    }
}
