//! Randomized hyperparameter search with stratified cross-validation.
//!
//! Parameter draws are sampled up front from a seeded RNG, visiting the
//! distributions in sorted key order, so the set of candidates depends only
//! on `random_state`. Candidates are then scored in parallel and collected in
//! draw order. The best mean fold score wins; on ties the earlier draw wins.
//! The winner is refit on the whole training set.

use std::collections::BTreeMap;

use ndarray::{ArrayView2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::config::{GbdtParams, ParamDistribution, ParamValue, SearchConfig};
use crate::dataset::validate_binary;
use crate::error::{LearningError, Result};
use crate::gbdt::GradientBoostingClassifier;
use crate::metrics;

/// Train/validation row indices for one fold.
pub type Fold = (Vec<usize>, Vec<usize>);

/// Split row indices into `k` folds preserving the class ratio.
///
/// Rows of each class keep their original order and are cut into `k`
/// contiguous chunks whose sizes differ by at most one (earlier chunks get
/// the extra row). Validation fold `i` is the union of chunk `i` of every
/// class, in row order.
///
/// # Errors
///
/// Returns [`LearningError::InvalidData`] when `k < 2` or a class has fewer
/// than `k` rows.
pub fn stratified_kfold(y: &[f64], k: usize) -> Result<Vec<Fold>> {
    if k < 2 {
        return Err(LearningError::InvalidData(format!(
            "need at least 2 folds, got {}",
            k
        )));
    }

    let mut fold_of = vec![0usize; y.len()];
    for class in [0.0, 1.0] {
        let rows: Vec<usize> = (0..y.len()).filter(|&i| y[i] == class).collect();
        if rows.len() < k {
            return Err(LearningError::InvalidData(format!(
                "class {} has {} rows, fewer than cv={}",
                class,
                rows.len(),
                k
            )));
        }
        let base = rows.len() / k;
        let extra = rows.len() % k;
        let mut start = 0;
        for fold in 0..k {
            let size = base + usize::from(fold < extra);
            for &r in &rows[start..start + size] {
                fold_of[r] = fold;
            }
            start += size;
        }
    }

    Ok((0..k)
        .map(|fold| {
            let (valid, train): (Vec<usize>, Vec<usize>) =
                (0..y.len()).partition(|&i| fold_of[i] == fold);
            (train, valid)
        })
        .collect())
}

/// Cross-validation outcome of one parameter draw.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CandidateScore {
    /// Sampled values, by parameter name.
    pub sampled: BTreeMap<String, ParamValue>,
    pub params: GbdtParams,
    pub fold_scores: Vec<f64>,
    pub mean_score: f64,
}

/// Outcome of a search: the refit winner plus every candidate's scores.
#[derive(Debug, Clone)]
pub struct SearchResult {
    pub best_model: GradientBoostingClassifier,
    pub best_params: GbdtParams,
    pub best_score: f64,
    pub best_index: usize,
    pub candidates: Vec<CandidateScore>,
}

/// Randomized search over [`GradientBoostingClassifier`] hyperparameters.
#[derive(Debug, Clone)]
pub struct RandomizedSearchCv {
    base: GbdtParams,
    distributions: BTreeMap<String, ParamDistribution>,
    config: SearchConfig,
}

impl RandomizedSearchCv {
    /// Create a search. Parameters without a distribution keep their value
    /// from `base`.
    pub fn new(
        base: GbdtParams,
        distributions: BTreeMap<String, ParamDistribution>,
        config: SearchConfig,
    ) -> Result<Self> {
        config.validate()?;
        if distributions.is_empty() {
            return Err(LearningError::InvalidConfig(
                "param_distribution must not be empty".to_string(),
            ));
        }
        for (name, dist) in &distributions {
            dist.validate(name)?;
        }
        Ok(Self {
            base,
            distributions,
            config,
        })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Draw the candidate parameter sets.
    pub fn sample_candidates(&self) -> Result<Vec<(BTreeMap<String, ParamValue>, GbdtParams)>> {
        let mut rng = StdRng::seed_from_u64(self.config.random_state);
        (0..self.config.n_iter)
            .map(|_| {
                let mut params = self.base.clone();
                let mut sampled = BTreeMap::new();
                for (name, dist) in &self.distributions {
                    let value = dist.sample(&mut rng);
                    params.set(name, &value)?;
                    sampled.insert(name.clone(), value);
                }
                params.random_state = self.config.random_state;
                params.validate()?;
                Ok((sampled, params))
            })
            .collect()
    }

    /// Run the search on `x`/`y` and refit the best candidate.
    pub fn fit(&self, x: ArrayView2<'_, f64>, y: &[f64]) -> Result<SearchResult> {
        if x.nrows() != y.len() {
            return Err(LearningError::InvalidData(format!(
                "feature matrix has {} rows but {} labels were given",
                x.nrows(),
                y.len()
            )));
        }
        validate_binary(y)?;

        let folds = stratified_kfold(y, self.config.cv)?;
        let draws = self.sample_candidates()?;
        info!(
            "Fitting {} folds for each of {} candidates, totalling {} fits",
            self.config.cv,
            draws.len(),
            self.config.cv * draws.len()
        );

        let candidates = self.in_pool(|| {
            draws
                .into_par_iter()
                .map(|(sampled, params)| self.score_candidate(x, y, &folds, sampled, params))
                .collect::<Result<Vec<_>>>()
        })??;

        let mut best_index = 0;
        for (i, c) in candidates.iter().enumerate() {
            debug!(
                candidate = i,
                mean_score = c.mean_score,
                params = ?c.sampled,
                "Candidate scored"
            );
            if c.mean_score > candidates[best_index].mean_score {
                best_index = i;
            }
        }

        let best = &candidates[best_index];
        info!(
            "Best {} = {:.4} with {:?}",
            self.config.scoring.as_str(),
            best.mean_score,
            best.sampled
        );

        let best_params = best.params.clone();
        let best_score = best.mean_score;
        let best_model = self.in_pool(|| GradientBoostingClassifier::fit(&best_params, x, y))??;

        Ok(SearchResult {
            best_model,
            best_params,
            best_score,
            best_index,
            candidates,
        })
    }

    fn score_candidate(
        &self,
        x: ArrayView2<'_, f64>,
        y: &[f64],
        folds: &[Fold],
        sampled: BTreeMap<String, ParamValue>,
        params: GbdtParams,
    ) -> Result<CandidateScore> {
        let fold_scores = folds
            .iter()
            .map(|(train, valid)| {
                let x_train = x.select(Axis(0), train);
                let y_train: Vec<f64> = train.iter().map(|&i| y[i]).collect();
                let x_valid = x.select(Axis(0), valid);
                let y_valid: Vec<f64> = valid.iter().map(|&i| y[i]).collect();

                let model = GradientBoostingClassifier::fit(&params, x_train.view(), &y_train)?;
                let proba = model.predict_proba(x_valid.view())?;
                metrics::score(self.config.scoring, &y_valid, &proba)
            })
            .collect::<Result<Vec<f64>>>()?;
        let mean_score = fold_scores.iter().sum::<f64>() / fold_scores.len() as f64;
        Ok(CandidateScore {
            sampled,
            params,
            fold_scores,
            mean_score,
        })
    }

    /// Run `op` on a pool sized by `n_jobs` (-1 uses rayon's global pool).
    fn in_pool<T, F>(&self, op: F) -> Result<T>
    where
        T: Send,
        F: FnOnce() -> T + Send,
    {
        if self.config.n_jobs < 1 {
            return Ok(op());
        }
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(self.config.n_jobs as usize)
            .build()
            .map_err(|e| LearningError::TrainingFailed(format!("thread pool: {}", e)))?;
        Ok(pool.install(op))
    }
}
