//! Random forest classifier used to rank features by importance.
//!
//! Trees are grown depth-first on histogram bins with weighted gini impurity.
//! Bootstrap resampling is expressed as per-row weights (how many times the
//! row was drawn), so every tree sees the same binned matrix. Each tree gets
//! its own seed drawn from `random_state`, which keeps the forest
//! deterministic regardless of how rayon schedules the trees.

use ndarray::ArrayView2;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::binning::{BinMapper, BinnedMatrix};
use crate::dataset::validate_binary;
use crate::error::{LearningError, Result};
use crate::tree::Tree;

/// Number of features examined at each split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MaxFeatures {
    /// `floor(sqrt(n_features))`, at least 1.
    #[default]
    Sqrt,
    /// `floor(log2(n_features))`, at least 1.
    Log2,
    All,
    Count(usize),
}

impl MaxFeatures {
    fn resolve(&self, n_features: usize) -> usize {
        let n = match self {
            MaxFeatures::Sqrt => (n_features as f64).sqrt() as usize,
            MaxFeatures::Log2 => (n_features as f64).log2() as usize,
            MaxFeatures::All => n_features,
            MaxFeatures::Count(k) => *k,
        };
        n.clamp(1, n_features.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RandomForestParams {
    pub n_estimators: usize,
    /// `None` grows until leaves are pure or too small to split.
    pub max_depth: Option<usize>,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub max_features: MaxFeatures,
    pub bootstrap: bool,
    pub max_bin: usize,
    pub random_state: u64,
}

impl Default for RandomForestParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            max_features: MaxFeatures::Sqrt,
            bootstrap: true,
            max_bin: 255,
            random_state: 42,
        }
    }
}

/// A fitted binary random forest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: RandomForestParams,
    trees: Vec<Tree>,
    importances: Vec<f64>,
    n_features: usize,
}

struct SplitCandidate {
    feature: usize,
    bin: usize,
    decrease: f64,
    left_value: f64,
    right_value: f64,
}

impl RandomForestClassifier {
    /// Fit a forest on `x` with labels `y` (each 0 or 1).
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidData`] on shape mismatch, empty input
    /// or non-binary labels and [`LearningError::InvalidConfig`] for invalid
    /// parameters.
    pub fn fit(params: &RandomForestParams, x: ArrayView2<'_, f64>, y: &[f64]) -> Result<Self> {
        if params.n_estimators == 0 {
            return Err(LearningError::InvalidConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if !(2..=256).contains(&params.max_bin) {
            return Err(LearningError::InvalidConfig(
                "max_bin must be between 2 and 256".to_string(),
            ));
        }
        if x.nrows() != y.len() {
            return Err(LearningError::InvalidData(format!(
                "feature matrix has {} rows but {} labels were given",
                x.nrows(),
                y.len()
            )));
        }
        if x.nrows() == 0 || x.ncols() == 0 {
            return Err(LearningError::InvalidData(
                "cannot fit a forest on an empty table".to_string(),
            ));
        }
        validate_binary(y)?;

        let n_features = x.ncols();
        let mapper = BinMapper::fit(x, params.max_bin);
        let binned = mapper.transform(x);
        let max_features = params.max_features.resolve(n_features);

        let mut seeder = StdRng::seed_from_u64(params.random_state);
        let seeds: Vec<u64> = (0..params.n_estimators).map(|_| seeder.r#gen()).collect();

        let grown: Vec<(Tree, Vec<f64>)> = seeds
            .par_iter()
            .map(|seed| grow_tree(&binned, &mapper, y, params, max_features, *seed))
            .collect();

        let mut importances = vec![0.0; n_features];
        let mut trees = Vec::with_capacity(grown.len());
        for (tree, tree_importances) in grown {
            let total: f64 = tree_importances.iter().sum();
            if total > 0.0 {
                for (acc, v) in importances.iter_mut().zip(&tree_importances) {
                    *acc += v / total;
                }
            }
            trees.push(tree);
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            for v in &mut importances {
                *v /= total;
            }
        }

        debug!(
            trees = trees.len(),
            leaves = trees.iter().map(Tree::n_leaves).sum::<usize>(),
            "Random forest fitted"
        );

        Ok(Self {
            params: params.clone(),
            trees,
            importances,
            n_features,
        })
    }

    /// Probability of class 1 for every row.
    pub fn predict_proba(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        self.check_width(x.ncols())?;
        let n_trees = self.trees.len() as f64;
        Ok(x.rows()
            .into_iter()
            .map(|row| self.trees.iter().map(|t| t.predict_row(row)).sum::<f64>() / n_trees)
            .collect())
    }

    /// Predicted class (0 or 1) for every row.
    pub fn predict(&self, x: ArrayView2<'_, f64>) -> Result<Vec<f64>> {
        Ok(self
            .predict_proba(x)?
            .into_iter()
            .map(|p| if p > 0.5 { 1.0 } else { 0.0 })
            .collect())
    }

    /// Mean decrease in impurity per feature, summing to 1 (all zeros when
    /// no tree could split).
    pub fn feature_importances(&self) -> &[f64] {
        &self.importances
    }

    pub fn params(&self) -> &RandomForestParams {
        &self.params
    }

    pub fn trees(&self) -> &[Tree] {
        &self.trees
    }

    fn check_width(&self, n_cols: usize) -> Result<()> {
        if n_cols != self.n_features {
            return Err(LearningError::InvalidData(format!(
                "model expects {} features, got {}",
                self.n_features, n_cols
            )));
        }
        Ok(())
    }
}

fn grow_tree(
    binned: &BinnedMatrix,
    mapper: &BinMapper,
    y: &[f64],
    params: &RandomForestParams,
    max_features: usize,
    seed: u64,
) -> (Tree, Vec<f64>) {
    let mut rng = StdRng::seed_from_u64(seed);
    let n = y.len();
    let n_features = binned.n_features();

    let mut weights = vec![0.0; n];
    if params.bootstrap {
        for _ in 0..n {
            weights[rng.gen_range(0..n)] += 1.0;
        }
    } else {
        weights.fill(1.0);
    }

    let rows: Vec<usize> = (0..n).filter(|&i| weights[i] > 0.0).collect();
    let (w0, w1) = class_weights(&rows, y, &weights);
    let mut tree = Tree::new(w1 / (w0 + w1));
    let mut importances = vec![0.0; n_features];
    let mut features: Vec<usize> = (0..n_features).collect();

    let mut stack = vec![(0usize, rows, 0usize)];
    while let Some((node, rows, depth)) = stack.pop() {
        let (w0, w1) = class_weights(&rows, y, &weights);
        if w0 == 0.0 || w1 == 0.0 {
            continue;
        }
        if params.max_depth.is_some_and(|d| depth >= d) {
            continue;
        }
        if rows.len() < params.min_samples_split {
            continue;
        }

        features.shuffle(&mut rng);
        let Some(best) = best_split(binned, mapper, y, &weights, &rows, &features, params, max_features)
        else {
            continue;
        };

        importances[best.feature] += best.decrease;
        let column = binned.column(best.feature);
        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .into_iter()
            .partition(|&r| column[r] as usize <= best.bin);
        let threshold = mapper.threshold(best.feature, best.bin);
        let (left, right) = tree.split(
            node,
            best.feature,
            threshold,
            best.left_value,
            best.right_value,
        );
        stack.push((right, right_rows, depth + 1));
        stack.push((left, left_rows, depth + 1));
    }

    (tree, importances)
}

fn class_weights(rows: &[usize], y: &[f64], weights: &[f64]) -> (f64, f64) {
    rows.iter().fold((0.0, 0.0), |(w0, w1), &r| {
        if y[r] == 1.0 {
            (w0, w1 + weights[r])
        } else {
            (w0 + weights[r], w1)
        }
    })
}

fn gini(w0: f64, w1: f64) -> f64 {
    let total = w0 + w1;
    if total <= 0.0 {
        return 0.0;
    }
    let p0 = w0 / total;
    let p1 = w1 / total;
    1.0 - p0 * p0 - p1 * p1
}

#[allow(clippy::too_many_arguments)]
fn best_split(
    binned: &BinnedMatrix,
    mapper: &BinMapper,
    y: &[f64],
    weights: &[f64],
    rows: &[usize],
    features: &[usize],
    params: &RandomForestParams,
    max_features: usize,
) -> Option<SplitCandidate> {
    let (p0, p1) = class_weights(rows, y, weights);
    let parent = (p0 + p1) * gini(p0, p1);
    let mut best: Option<SplitCandidate> = None;
    let mut visited = 0;

    for &feature in features {
        if visited >= max_features && best.is_some() {
            break;
        }

        let n_bins = mapper.n_bins(feature);
        if n_bins < 2 {
            continue;
        }
        // (weight of class 0, weight of class 1, row count) per bin
        let mut hist = vec![(0.0f64, 0.0f64, 0usize); n_bins];
        let column = binned.column(feature);
        for &r in rows {
            let slot = &mut hist[column[r] as usize];
            if y[r] == 1.0 {
                slot.1 += weights[r];
            } else {
                slot.0 += weights[r];
            }
            slot.2 += 1;
        }
        if hist.iter().filter(|h| h.2 > 0).count() < 2 {
            continue;
        }
        visited += 1;

        let (mut l0, mut l1, mut lc) = (0.0, 0.0, 0usize);
        for (bin, h) in hist.iter().enumerate().take(n_bins - 1) {
            l0 += h.0;
            l1 += h.1;
            lc += h.2;
            let (r0, r1, rc) = (p0 - l0, p1 - l1, rows.len() - lc);
            if lc < params.min_samples_leaf || rc < params.min_samples_leaf {
                continue;
            }
            let (wl, wr) = (l0 + l1, r0 + r1);
            if wl <= 0.0 || wr <= 0.0 {
                continue;
            }
            let decrease = parent - wl * gini(l0, l1) - wr * gini(r0, r1);
            if decrease > 1e-12 && best.as_ref().is_none_or(|b| decrease > b.decrease) {
                best = Some(SplitCandidate {
                    feature,
                    bin,
                    decrease,
                    left_value: l1 / wl,
                    right_value: r1 / wr,
                });
            }
        }
    }

    best
}

static_assertions::assert_impl_all!(RandomForestClassifier: Send, Sync);
