//! Configuration types for model fitting and hyperparameter search.
//!
//! This module provides [`GbdtParams`] (the boosted-tree hyperparameters),
//! [`ParamDistribution`] (what the randomized search samples from) and
//! [`SearchConfig`] with its builder.
//!
//! # Example
//!
//! ```
//! use reservation_learning::{Scoring, SearchConfig};
//!
//! let config = SearchConfig::builder()
//!     .n_iter(5)
//!     .cv(3)
//!     .scoring(Scoring::RocAuc)
//!     .random_state(42)
//!     .build()
//!     .expect("valid config");
//! ```

use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::error::LearningError;

/// Boosting strategy for [`GradientBoostingClassifier`](crate::GradientBoostingClassifier).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BoostingType {
    /// Every row contributes to every tree.
    #[default]
    Gbdt,
    /// Gradient-based one-side sampling: keep the rows with the largest
    /// gradients and a random sample of the rest.
    Goss,
}

impl BoostingType {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            BoostingType::Gbdt => "gbdt",
            BoostingType::Goss => "goss",
        }
    }
}

impl FromStr for BoostingType {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "gbdt" => Ok(BoostingType::Gbdt),
            "goss" => Ok(BoostingType::Goss),
            other => Err(LearningError::InvalidConfig(format!(
                "unsupported boosting_type '{}' (expected gbdt or goss)",
                other
            ))),
        }
    }
}

/// A single hyperparameter value as it appears in configuration and logs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ParamValue {
    Int(i64),
    Float(f64),
    Str(String),
}

impl ParamValue {
    fn as_f64(&self) -> Option<f64> {
        match self {
            ParamValue::Int(v) => Some(*v as f64),
            ParamValue::Float(v) => Some(*v),
            ParamValue::Str(_) => None,
        }
    }

    fn as_i64(&self) -> Option<i64> {
        match self {
            ParamValue::Int(v) => Some(*v),
            ParamValue::Float(v) if v.fract() == 0.0 => Some(*v as i64),
            _ => None,
        }
    }
}

impl fmt::Display for ParamValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParamValue::Int(v) => write!(f, "{}", v),
            ParamValue::Float(v) => write!(f, "{}", v),
            ParamValue::Str(v) => write!(f, "{}", v),
        }
    }
}

/// A distribution the randomized search draws one hyperparameter from.
///
/// In YAML:
///
/// ```yaml
/// n_estimators: { randint: [100, 500] }   # integers in [100, 500)
/// learning_rate: { uniform: [0.01, 0.2] } # floats in [0.01, 0.21)
/// boosting_type: { choice: [gbdt, goss] }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "DistributionSpec", into = "DistributionSpec")]
pub enum ParamDistribution {
    /// Uniform integers in `[low, high)`.
    Randint(i64, i64),
    /// Uniform floats in `[loc, loc + scale)`.
    Uniform(f64, f64),
    /// One of the listed values, uniformly.
    Choice(Vec<ParamValue>),
}

/// Single-key map form of [`ParamDistribution`], accepted by both YAML and
/// JSON readers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
enum DistributionSpec {
    Randint { randint: (i64, i64) },
    Uniform { uniform: (f64, f64) },
    Choice { choice: Vec<ParamValue> },
}

impl From<DistributionSpec> for ParamDistribution {
    fn from(spec: DistributionSpec) -> Self {
        match spec {
            DistributionSpec::Randint { randint: (low, high) } => Self::Randint(low, high),
            DistributionSpec::Uniform { uniform: (loc, scale) } => Self::Uniform(loc, scale),
            DistributionSpec::Choice { choice } => Self::Choice(choice),
        }
    }
}

impl From<ParamDistribution> for DistributionSpec {
    fn from(dist: ParamDistribution) -> Self {
        match dist {
            ParamDistribution::Randint(low, high) => Self::Randint { randint: (low, high) },
            ParamDistribution::Uniform(loc, scale) => Self::Uniform { uniform: (loc, scale) },
            ParamDistribution::Choice(choice) => Self::Choice { choice },
        }
    }
}

impl ParamDistribution {
    /// Draw one value.
    pub fn sample<R: Rng + ?Sized>(&self, rng: &mut R) -> ParamValue {
        match self {
            ParamDistribution::Randint(low, high) => ParamValue::Int(rng.gen_range(*low..*high)),
            ParamDistribution::Uniform(loc, scale) => {
                ParamValue::Float(loc + scale * rng.r#gen::<f64>())
            }
            ParamDistribution::Choice(values) => values[rng.gen_range(0..values.len())].clone(),
        }
    }

    /// Check that the distribution can be sampled.
    pub fn validate(&self, name: &str) -> Result<(), LearningError> {
        let ok = match self {
            ParamDistribution::Randint(low, high) => low < high,
            ParamDistribution::Uniform(_, scale) => *scale >= 0.0,
            ParamDistribution::Choice(values) => !values.is_empty(),
        };
        if ok {
            Ok(())
        } else {
            Err(LearningError::InvalidConfig(format!(
                "distribution for '{}' is empty or inverted: {:?}",
                name, self
            )))
        }
    }
}

/// Hyperparameters of the gradient-boosted classifier (LightGBM naming).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GbdtParams {
    /// Number of boosting rounds (trees).
    pub n_estimators: usize,
    /// Shrinkage applied to every leaf value.
    pub learning_rate: f64,
    /// Maximum number of leaves per tree.
    pub num_leaves: usize,
    /// Maximum tree depth; `<= 0` means unlimited.
    pub max_depth: i64,
    /// Minimum number of rows in a leaf.
    pub min_child_samples: usize,
    /// Minimum hessian sum in a leaf.
    pub min_child_weight: f64,
    /// L2 regularization on leaf values.
    pub reg_lambda: f64,
    /// Maximum histogram bins per feature.
    pub max_bin: usize,
    pub boosting_type: BoostingType,
    /// GOSS: fraction of rows kept by gradient magnitude.
    pub top_rate: f64,
    /// GOSS: fraction of rows sampled from the remainder.
    pub other_rate: f64,
    pub random_state: u64,
}

impl Default for GbdtParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            num_leaves: 31,
            max_depth: -1,
            min_child_samples: 20,
            min_child_weight: 1e-3,
            reg_lambda: 0.0,
            max_bin: 255,
            boosting_type: BoostingType::Gbdt,
            top_rate: 0.2,
            other_rate: 0.1,
            random_state: 42,
        }
    }
}

impl GbdtParams {
    /// Apply one named hyperparameter.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] for unknown names or values of
    /// the wrong type.
    pub fn set(&mut self, name: &str, value: &ParamValue) -> Result<(), LearningError> {
        let bad = || {
            LearningError::InvalidConfig(format!("invalid value '{}' for '{}'", value, name))
        };
        let as_count = || -> Result<usize, LearningError> {
            value
                .as_i64()
                .filter(|v| *v >= 0)
                .map(|v| v as usize)
                .ok_or_else(bad)
        };
        match name {
            "n_estimators" => self.n_estimators = as_count()?,
            "num_leaves" => self.num_leaves = as_count()?,
            "min_child_samples" => self.min_child_samples = as_count()?,
            "max_bin" => self.max_bin = as_count()?,
            "max_depth" => self.max_depth = value.as_i64().ok_or_else(bad)?,
            "learning_rate" => self.learning_rate = value.as_f64().ok_or_else(bad)?,
            "min_child_weight" => self.min_child_weight = value.as_f64().ok_or_else(bad)?,
            "reg_lambda" => self.reg_lambda = value.as_f64().ok_or_else(bad)?,
            "top_rate" => self.top_rate = value.as_f64().ok_or_else(bad)?,
            "other_rate" => self.other_rate = value.as_f64().ok_or_else(bad)?,
            "random_state" => self.random_state = as_count()? as u64,
            "boosting_type" => match value {
                ParamValue::Str(s) => self.boosting_type = s.parse()?,
                _ => return Err(bad()),
            },
            other => {
                return Err(LearningError::InvalidConfig(format!(
                    "unknown hyperparameter '{}'",
                    other
                )));
            }
        }
        Ok(())
    }

    /// Validate ranges.
    pub fn validate(&self) -> Result<(), LearningError> {
        if self.n_estimators == 0 {
            return Err(LearningError::InvalidConfig(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if self.num_leaves < 2 {
            return Err(LearningError::InvalidConfig(
                "num_leaves must be at least 2".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0) {
            return Err(LearningError::InvalidConfig(
                "learning_rate must be positive".to_string(),
            ));
        }
        if !(2..=256).contains(&self.max_bin) {
            return Err(LearningError::InvalidConfig(
                "max_bin must be between 2 and 256".to_string(),
            ));
        }
        if self.boosting_type == BoostingType::Goss
            && (self.top_rate <= 0.0
                || self.other_rate <= 0.0
                || self.top_rate + self.other_rate > 1.0)
        {
            return Err(LearningError::InvalidConfig(
                "goss requires top_rate > 0, other_rate > 0 and top_rate + other_rate <= 1"
                    .to_string(),
            ));
        }
        Ok(())
    }

    /// All hyperparameters as a name/value map, for logging and tracking.
    pub fn to_map(&self) -> BTreeMap<String, ParamValue> {
        let mut map = BTreeMap::new();
        map.insert("n_estimators".into(), ParamValue::Int(self.n_estimators as i64));
        map.insert("learning_rate".into(), ParamValue::Float(self.learning_rate));
        map.insert("num_leaves".into(), ParamValue::Int(self.num_leaves as i64));
        map.insert("max_depth".into(), ParamValue::Int(self.max_depth));
        map.insert(
            "min_child_samples".into(),
            ParamValue::Int(self.min_child_samples as i64),
        );
        map.insert("min_child_weight".into(), ParamValue::Float(self.min_child_weight));
        map.insert("reg_lambda".into(), ParamValue::Float(self.reg_lambda));
        map.insert("max_bin".into(), ParamValue::Int(self.max_bin as i64));
        map.insert(
            "boosting_type".into(),
            ParamValue::Str(self.boosting_type.as_str().to_string()),
        );
        map.insert("random_state".into(), ParamValue::Int(self.random_state as i64));
        map
    }
}

/// Metric used to rank search candidates.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scoring {
    #[default]
    Accuracy,
    RocAuc,
    F1,
    Precision,
    Recall,
}

impl Scoring {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Scoring::Accuracy => "accuracy",
            Scoring::RocAuc => "roc_auc",
            Scoring::F1 => "f1",
            Scoring::Precision => "precision",
            Scoring::Recall => "recall",
        }
    }
}

impl FromStr for Scoring {
    type Err = LearningError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "accuracy" => Ok(Scoring::Accuracy),
            "roc_auc" => Ok(Scoring::RocAuc),
            "f1" => Ok(Scoring::F1),
            "precision" => Ok(Scoring::Precision),
            "recall" => Ok(Scoring::Recall),
            other => Err(LearningError::InvalidConfig(format!(
                "unsupported scoring '{}'",
                other
            ))),
        }
    }
}

/// Settings of the randomized hyperparameter search.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchConfig {
    /// Number of parameter draws.
    pub n_iter: usize,

    /// Number of stratified cross-validation folds per draw. Must be at least 2.
    pub cv: usize,

    /// Metric used to rank candidates.
    #[serde(default)]
    pub scoring: Scoring,

    /// Seed for parameter draws and for every fitted estimator.
    #[serde(default = "default_random_state")]
    pub random_state: u64,

    /// Number of parallel jobs (default: -1 for all cores).
    ///
    /// - `-1`: Use all available CPU cores
    /// - `1`: Single-threaded
    /// - `n > 1`: Use exactly `n` cores
    #[serde(default = "default_n_jobs")]
    pub n_jobs: i32,
}

fn default_random_state() -> u64 {
    42
}

fn default_n_jobs() -> i32 {
    -1
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            n_iter: 4,
            cv: 2,
            scoring: Scoring::Accuracy,
            random_state: 42,
            n_jobs: -1,
        }
    }
}

impl SearchConfig {
    #[must_use]
    pub fn builder() -> SearchConfigBuilder {
        SearchConfigBuilder::default()
    }

    /// Validate the settings.
    pub fn validate(&self) -> Result<(), LearningError> {
        if self.n_iter == 0 {
            return Err(LearningError::InvalidConfig(
                "n_iter must be at least 1".to_string(),
            ));
        }
        if self.cv < 2 {
            return Err(LearningError::InvalidConfig(
                "cv must be at least 2".to_string(),
            ));
        }
        if self.n_jobs == 0 || self.n_jobs < -1 {
            return Err(LearningError::InvalidConfig(
                "n_jobs must be -1 or a positive number".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for [`SearchConfig`].
#[derive(Debug, Clone, Default)]
pub struct SearchConfigBuilder {
    config: SearchConfig,
}

impl SearchConfigBuilder {
    #[must_use]
    pub fn n_iter(mut self, n: usize) -> Self {
        self.config.n_iter = n;
        self
    }

    #[must_use]
    pub fn cv(mut self, folds: usize) -> Self {
        self.config.cv = folds;
        self
    }

    #[must_use]
    pub fn scoring(mut self, scoring: Scoring) -> Self {
        self.config.scoring = scoring;
        self
    }

    #[must_use]
    pub fn random_state(mut self, seed: u64) -> Self {
        self.config.random_state = seed;
        self
    }

    #[must_use]
    pub fn n_jobs(mut self, jobs: i32) -> Self {
        self.config.n_jobs = jobs;
        self
    }

    /// Build the configuration, validating all settings.
    ///
    /// # Errors
    ///
    /// Returns [`LearningError::InvalidConfig`] if `n_iter` is 0, `cv` is
    /// below 2 or `n_jobs` is neither -1 nor positive.
    pub fn build(self) -> Result<SearchConfig, LearningError> {
        self.config.validate()?;
        Ok(self.config)
    }
}

/// Distributions sampled when the configuration names none.
pub fn default_param_distribution() -> BTreeMap<String, ParamDistribution> {
    let mut dist = BTreeMap::new();
    dist.insert("n_estimators".to_string(), ParamDistribution::Randint(100, 500));
    dist.insert("max_depth".to_string(), ParamDistribution::Randint(5, 50));
    dist.insert("learning_rate".to_string(), ParamDistribution::Uniform(0.01, 0.2));
    dist.insert("num_leaves".to_string(), ParamDistribution::Randint(20, 100));
    dist.insert(
        "boosting_type".to_string(),
        ParamDistribution::Choice(vec![
            ParamValue::Str("gbdt".to_string()),
            ParamValue::Str("goss".to_string()),
        ]),
    );
    dist
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn test_default_search_config() {
        let config = SearchConfig::default();
        assert_eq!(config.n_iter, 4);
        assert_eq!(config.cv, 2);
        assert_eq!(config.scoring, Scoring::Accuracy);
        assert_eq!(config.random_state, 42);
    }

    #[test]
    fn test_invalid_cv() {
        let result = SearchConfig::builder().cv(1).build();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("cv"));
    }

    #[test]
    fn test_invalid_n_iter() {
        let result = SearchConfig::builder().n_iter(0).build();
        assert!(result.unwrap_err().to_string().contains("n_iter"));
    }

    #[test]
    fn test_scoring_round_trip_through_str() {
        for scoring in [
            Scoring::Accuracy,
            Scoring::RocAuc,
            Scoring::F1,
            Scoring::Precision,
            Scoring::Recall,
        ] {
            assert_eq!(scoring.as_str().parse::<Scoring>().unwrap(), scoring);
        }
        assert!("mse".parse::<Scoring>().is_err());
    }

    #[test]
    fn test_set_params() {
        let mut params = GbdtParams::default();
        params.set("n_estimators", &ParamValue::Int(250)).unwrap();
        params.set("learning_rate", &ParamValue::Float(0.05)).unwrap();
        params
            .set("boosting_type", &ParamValue::Str("goss".to_string()))
            .unwrap();
        params.set("max_depth", &ParamValue::Int(-1)).unwrap();

        assert_eq!(params.n_estimators, 250);
        assert_eq!(params.learning_rate, 0.05);
        assert_eq!(params.boosting_type, BoostingType::Goss);
        assert_eq!(params.max_depth, -1);
    }

    #[test]
    fn test_set_rejects_unknown_and_mistyped() {
        let mut params = GbdtParams::default();
        assert!(params.set("colsample", &ParamValue::Float(0.5)).is_err());
        assert!(params.set("n_estimators", &ParamValue::Float(1.5)).is_err());
        assert!(
            params
                .set("boosting_type", &ParamValue::Str("dart".to_string()))
                .is_err()
        );
    }

    #[test]
    fn test_distribution_samples_in_range() {
        let mut rng = StdRng::seed_from_u64(7);
        let randint = ParamDistribution::Randint(5, 50);
        let uniform = ParamDistribution::Uniform(0.01, 0.2);
        for _ in 0..200 {
            match randint.sample(&mut rng) {
                ParamValue::Int(v) => assert!((5..50).contains(&v)),
                other => panic!("unexpected {:?}", other),
            }
            match uniform.sample(&mut rng) {
                ParamValue::Float(v) => assert!((0.01..0.21).contains(&v)),
                other => panic!("unexpected {:?}", other),
            }
        }
    }

    #[test]
    fn test_distribution_from_yaml_shape() {
        let json = r#"{"randint": [100, 500]}"#;
        let dist: ParamDistribution = serde_json::from_str(json).unwrap();
        assert_eq!(dist, ParamDistribution::Randint(100, 500));

        let json = r#"{"choice": ["gbdt", "goss"]}"#;
        let dist: ParamDistribution = serde_json::from_str(json).unwrap();
        assert_eq!(
            dist,
            ParamDistribution::Choice(vec![
                ParamValue::Str("gbdt".to_string()),
                ParamValue::Str("goss".to_string())
            ])
        );
    }

    #[test]
    fn test_validate_distribution() {
        assert!(ParamDistribution::Randint(5, 5).validate("max_depth").is_err());
        assert!(ParamDistribution::Choice(vec![]).validate("boosting_type").is_err());
        assert!(ParamDistribution::Uniform(0.0, 1.0).validate("lr").is_ok());
    }

    #[test]
    fn test_default_distribution_applies_cleanly() {
        let mut rng = StdRng::seed_from_u64(42);
        let mut params = GbdtParams::default();
        for (name, dist) in default_param_distribution() {
            params.set(&name, &dist.sample(&mut rng)).unwrap();
        }
        params.validate().unwrap();
    }
}
