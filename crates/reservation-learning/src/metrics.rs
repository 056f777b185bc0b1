//! Binary classification metrics.
//!
//! Class `1` is the positive class. Precision, recall and F1 fall back to
//! `0.0` when their denominator is zero.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::config::Scoring;
use crate::error::{LearningError, Result};

/// Metrics from model evaluation.
///
/// # Fields
///
/// - `accuracy`, `precision`, `recall`, `f1_score`: from hard predictions at
///   the 0.5 probability boundary
/// - `roc_auc`: from predicted probabilities; `None` if the evaluated labels
///   contain a single class
/// - `cv_score`: mean cross-validation score of the chosen hyperparameters,
///   when the model came out of a search
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metrics {
    pub accuracy: f64,
    pub precision: f64,
    pub recall: f64,
    pub f1_score: f64,
    pub roc_auc: Option<f64>,
    pub cv_score: Option<f64>,
}

impl Metrics {
    /// Compute every metric from labels, hard predictions and probabilities.
    pub fn compute(y_true: &[f64], y_pred: &[f64], y_proba: &[f64]) -> Self {
        Self {
            accuracy: accuracy(y_true, y_pred),
            precision: precision(y_true, y_pred),
            recall: recall(y_true, y_pred),
            f1_score: f1(y_true, y_pred),
            roc_auc: roc_auc(y_true, y_proba),
            cv_score: None,
        }
    }

    /// Name/value pairs for experiment tracking.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        let mut map = BTreeMap::new();
        map.insert("accuracy".to_string(), self.accuracy);
        map.insert("precision".to_string(), self.precision);
        map.insert("recall".to_string(), self.recall);
        map.insert("f1".to_string(), self.f1_score);
        if let Some(auc) = self.roc_auc {
            map.insert("roc_auc".to_string(), auc);
        }
        if let Some(cv) = self.cv_score {
            map.insert("cv_score".to_string(), cv);
        }
        map
    }
}

struct Confusion {
    tp: f64,
    fp: f64,
    tn: f64,
    fn_: f64,
}

fn confusion(y_true: &[f64], y_pred: &[f64]) -> Confusion {
    let mut c = Confusion {
        tp: 0.0,
        fp: 0.0,
        tn: 0.0,
        fn_: 0.0,
    };
    for (t, p) in y_true.iter().zip(y_pred) {
        match (*t == 1.0, *p == 1.0) {
            (true, true) => c.tp += 1.0,
            (false, true) => c.fp += 1.0,
            (false, false) => c.tn += 1.0,
            (true, false) => c.fn_ += 1.0,
        }
    }
    c
}

fn ratio(num: f64, den: f64) -> f64 {
    if den > 0.0 { num / den } else { 0.0 }
}

pub fn accuracy(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = confusion(y_true, y_pred);
    ratio(c.tp + c.tn, c.tp + c.tn + c.fp + c.fn_)
}

pub fn precision(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = confusion(y_true, y_pred);
    ratio(c.tp, c.tp + c.fp)
}

pub fn recall(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let c = confusion(y_true, y_pred);
    ratio(c.tp, c.tp + c.fn_)
}

pub fn f1(y_true: &[f64], y_pred: &[f64]) -> f64 {
    let p = precision(y_true, y_pred);
    let r = recall(y_true, y_pred);
    ratio(2.0 * p * r, p + r)
}

/// Area under the ROC curve via the rank-sum statistic, averaging ranks of
/// tied scores. `None` when only one class is present.
pub fn roc_auc(y_true: &[f64], scores: &[f64]) -> Option<f64> {
    let n_pos = y_true.iter().filter(|v| **v == 1.0).count();
    let n_neg = y_true.len() - n_pos;
    if n_pos == 0 || n_neg == 0 {
        return None;
    }

    let mut order: Vec<usize> = (0..scores.len()).collect();
    order.sort_by(|&a, &b| scores[a].total_cmp(&scores[b]));

    let mut ranks = vec![0.0; scores.len()];
    let mut i = 0;
    while i < order.len() {
        let mut j = i;
        while j + 1 < order.len() && scores[order[j + 1]] == scores[order[i]] {
            j += 1;
        }
        // ranks are 1-based
        let avg = (i + j) as f64 / 2.0 + 1.0;
        for k in i..=j {
            ranks[order[k]] = avg;
        }
        i = j + 1;
    }

    let pos_rank_sum: f64 = y_true
        .iter()
        .zip(&ranks)
        .filter(|(t, _)| **t == 1.0)
        .map(|(_, r)| r)
        .sum();
    let n_pos = n_pos as f64;
    let n_neg = n_neg as f64;
    Some((pos_rank_sum - n_pos * (n_pos + 1.0) / 2.0) / (n_pos * n_neg))
}

/// Score predictions with the given metric.
///
/// # Errors
///
/// Returns [`LearningError::InvalidData`] for `roc_auc` on single-class labels.
pub fn score(scoring: Scoring, y_true: &[f64], y_proba: &[f64]) -> Result<f64> {
    let y_pred: Vec<f64> = y_proba
        .iter()
        .map(|p| if *p > 0.5 { 1.0 } else { 0.0 })
        .collect();
    match scoring {
        Scoring::Accuracy => Ok(accuracy(y_true, &y_pred)),
        Scoring::Precision => Ok(precision(y_true, &y_pred)),
        Scoring::Recall => Ok(recall(y_true, &y_pred)),
        Scoring::F1 => Ok(f1(y_true, &y_pred)),
        Scoring::RocAuc => roc_auc(y_true, y_proba).ok_or_else(|| {
            LearningError::InvalidData(
                "roc_auc is undefined when only one class is present".to_string(),
            )
        }),
    }
}
