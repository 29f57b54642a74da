//! Tree-structured Parzen estimator hyperparameter search
//!
//! Parameters are sampled independently. After a number of random start-up
//! trials, observed trials are split into the best `gamma(n)` and the rest; a
//! Parzen estimator is fitted to each group and the candidate maximizing the
//! density ratio of the good over the bad group is proposed.

use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rand_distr::{Distribution, Normal};
use serde::Serialize;
use std::collections::BTreeMap;
use std::f64::consts::{PI, SQRT_2};

use super::classifier::ModelFamily;
use super::params::{CatBoostGrowPolicy, CatBoostParams, LightGbmParams, XgBoostParams};
use crate::config::SearchConfig;
use crate::error::{PipelineError, Result};
use crate::utils::logging::{create_main_progress_bar, finish_progress_bar};

const MAX_BELOW: usize = 25;
const MIN_TRUNCATION_MASS: f64 = 1e-12;
const SAMPLE_ATTEMPTS: usize = 100;

/// Domain of one searched parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ParamKind {
    /// Continuous range, sampled in log space when `log` is set
    Float { low: f64, high: f64, log: bool },
    /// Inclusive integer range
    Int { low: i64, high: i64 },
    /// Index into a fixed list of choices
    Categorical { choices: usize },
}

/// A named searched parameter
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ParamSpec {
    pub name: &'static str,
    pub kind: ParamKind,
}

impl ParamSpec {
    #[must_use]
    pub const fn float(name: &'static str, low: f64, high: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Float {
                low,
                high,
                log: false,
            },
        }
    }

    #[must_use]
    pub const fn log_float(name: &'static str, low: f64, high: f64) -> Self {
        Self {
            name,
            kind: ParamKind::Float {
                low,
                high,
                log: true,
            },
        }
    }

    #[must_use]
    pub const fn int(name: &'static str, low: i64, high: i64) -> Self {
        Self {
            name,
            kind: ParamKind::Int { low, high },
        }
    }

    #[must_use]
    pub const fn categorical(name: &'static str, choices: usize) -> Self {
        Self {
            name,
            kind: ParamKind::Categorical { choices },
        }
    }

    /// Continuous bounds the estimator works in
    fn internal_bounds(&self) -> (f64, f64) {
        match self.kind {
            ParamKind::Float { low, high, log } => {
                if log {
                    (low.ln(), high.ln())
                } else {
                    (low, high)
                }
            }
            ParamKind::Int { low, high } => (low as f64 - 0.5, high as f64 + 0.5),
            ParamKind::Categorical { choices } => (0.0, choices as f64),
        }
    }

    fn to_internal(&self, value: f64) -> f64 {
        match self.kind {
            ParamKind::Float { log: true, .. } => value.ln(),
            _ => value,
        }
    }

    fn from_internal(&self, value: f64) -> f64 {
        match self.kind {
            ParamKind::Float { low, high, log } => {
                let v = if log { value.exp() } else { value };
                v.clamp(low, high)
            }
            ParamKind::Int { low, high } => (value.round() as i64).clamp(low, high) as f64,
            ParamKind::Categorical { choices } => (value.floor() as usize).min(choices - 1) as f64,
        }
    }
}

/// Parameters searched for one family
#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpace {
    params: Vec<ParamSpec>,
}

impl SearchSpace {
    #[must_use]
    pub const fn new(params: Vec<ParamSpec>) -> Self {
        Self { params }
    }

    #[must_use]
    pub fn params(&self) -> &[ParamSpec] {
        &self.params
    }
}

/// Values proposed for one trial
#[derive(Debug, Clone, PartialEq)]
pub struct Trial {
    number: usize,
    values: BTreeMap<&'static str, f64>,
}

impl Trial {
    /// Trial number, starting at 0
    #[must_use]
    pub const fn number(&self) -> usize {
        self.number
    }

    fn value(&self, name: &str) -> Result<f64> {
        self.values
            .get(name)
            .copied()
            .ok_or_else(|| PipelineError::config(format!("trial has no value for '{name}'")))
    }

    /// Value of a float parameter
    ///
    /// # Errors
    /// Returns an error if the parameter was not searched
    pub fn float(&self, name: &str) -> Result<f64> {
        self.value(name)
    }

    /// Value of an integer parameter
    ///
    /// # Errors
    /// Returns an error if the parameter was not searched
    pub fn int(&self, name: &str) -> Result<i64> {
        Ok(self.value(name)?.round() as i64)
    }

    /// Chosen index of a categorical parameter
    ///
    /// # Errors
    /// Returns an error if the parameter was not searched
    pub fn choice(&self, name: &str) -> Result<usize> {
        Ok(self.value(name)? as usize)
    }

    fn count<T: TryFrom<i64>>(&self, name: &str) -> Result<T> {
        let value = self.int(name)?;
        T::try_from(value)
            .map_err(|_| PipelineError::config(format!("'{name}' = {value} is out of range")))
    }
}

fn std_normal_cdf(z: f64) -> f64 {
    // Abramowitz and Stegun 7.1.26
    let x = z.abs() / SQRT_2;
    let t = 1.0 / (1.0 + 0.327_591_1 * x);
    let poly = ((((1.061_405_429 * t - 1.453_152_027) * t + 1.421_413_741) * t - 0.284_496_736)
        * t
        + 0.254_829_592)
        * t;
    let erf = 1.0 - poly * (-x * x).exp();
    if z >= 0.0 { 0.5 * (1.0 + erf) } else { 0.5 * (1.0 - erf) }
}

fn log_sum_exp(terms: &[f64]) -> f64 {
    let max = terms.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    if max == f64::NEG_INFINITY {
        return max;
    }
    max + terms.iter().map(|t| (t - max).exp()).sum::<f64>().ln()
}

/// Truncated Gaussian mixture over a continuous range, with a wide prior
/// component centered in the range
#[derive(Debug, Clone)]
struct ParzenEstimator {
    mus: Vec<f64>,
    sigmas: Vec<f64>,
    low: f64,
    high: f64,
}

impl ParzenEstimator {
    fn fit(observations: &[f64], low: f64, high: f64) -> Self {
        let range = high - low;
        let mut mus = observations.to_vec();
        mus.push(0.5 * (low + high));
        let prior = mus.len() - 1;

        let mut order: Vec<usize> = (0..mus.len()).collect();
        order.sort_by(|&a, &b| mus[a].total_cmp(&mus[b]));
        let mut sigmas = vec![range; mus.len()];
        for (pos, &idx) in order.iter().enumerate() {
            let left = if pos == 0 { low } else { mus[order[pos - 1]] };
            let right = order.get(pos + 1).map_or(high, |&next| mus[next]);
            sigmas[idx] = (mus[idx] - left).max(right - mus[idx]);
        }
        sigmas[prior] = range;

        let min_sigma = range / (1.0 + observations.len() as f64).min(100.0);
        for sigma in &mut sigmas {
            *sigma = sigma.clamp(min_sigma, range);
        }
        Self {
            mus,
            sigmas,
            low,
            high,
        }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        let component = rng.random_range(0..self.mus.len());
        let (mu, sigma) = (self.mus[component], self.sigmas[component]);
        if let Ok(normal) = Normal::new(mu, sigma) {
            for _ in 0..SAMPLE_ATTEMPTS {
                let x = normal.sample(rng);
                if (self.low..=self.high).contains(&x) {
                    return x;
                }
            }
        }
        mu.clamp(self.low, self.high)
    }

    fn log_pdf(&self, x: f64) -> f64 {
        let log_weight = -(self.mus.len() as f64).ln();
        let terms: Vec<f64> = self
            .mus
            .iter()
            .zip(&self.sigmas)
            .map(|(&mu, &sigma)| {
                let z = (x - mu) / sigma;
                let mass = std_normal_cdf((self.high - mu) / sigma)
                    - std_normal_cdf((self.low - mu) / sigma);
                log_weight - 0.5 * z * z - sigma.ln() - 0.5 * (2.0 * PI).ln()
                    - mass.max(MIN_TRUNCATION_MASS).ln()
            })
            .collect();
        log_sum_exp(&terms)
    }
}

/// Smoothed category frequencies
#[derive(Debug, Clone)]
struct CategoricalEstimator {
    weights: Vec<f64>,
}

impl CategoricalEstimator {
    fn fit(observations: &[f64], choices: usize) -> Self {
        let mut weights = vec![1.0 / choices as f64; choices];
        for &obs in observations {
            weights[(obs as usize).min(choices - 1)] += 1.0;
        }
        let total: f64 = weights.iter().sum();
        for w in &mut weights {
            *w /= total;
        }
        Self { weights }
    }

    fn sample(&self, rng: &mut StdRng) -> f64 {
        let mut u: f64 = rng.random_range(0.0..1.0);
        for (idx, &w) in self.weights.iter().enumerate() {
            if u < w {
                return idx as f64;
            }
            u -= w;
        }
        (self.weights.len() - 1) as f64
    }

    fn log_pdf(&self, x: f64) -> f64 {
        self.weights[(x as usize).min(self.weights.len() - 1)].ln()
    }
}

/// Candidate with the best good-to-bad density ratio
fn propose(
    rng: &mut StdRng,
    n_candidates: usize,
    spec: &ParamSpec,
    below: &[f64],
    above: &[f64],
) -> f64 {
    let (low, high) = spec.internal_bounds();
    let candidates: Vec<(f64, f64)> = match spec.kind {
        ParamKind::Categorical { choices } => {
            let good = CategoricalEstimator::fit(below, choices);
            let bad = CategoricalEstimator::fit(above, choices);
            (0..n_candidates)
                .map(|_| {
                    let x = good.sample(rng);
                    (x, good.log_pdf(x) - bad.log_pdf(x))
                })
                .collect()
        }
        _ => {
            let good = ParzenEstimator::fit(below, low, high);
            let bad = ParzenEstimator::fit(above, low, high);
            (0..n_candidates)
                .map(|_| {
                    let x = good.sample(rng);
                    (x, good.log_pdf(x) - bad.log_pdf(x))
                })
                .collect()
        }
    };
    candidates
        .into_iter()
        .max_by(|a, b| a.1.total_cmp(&b.1))
        .map_or(0.5 * (low + high), |(x, _)| x)
}

/// Sequential TPE sampler maximizing the objective
#[derive(Debug)]
pub struct TpeSampler {
    space: SearchSpace,
    rng: StdRng,
    n_startup_trials: usize,
    n_ei_candidates: usize,
    history: Vec<(Trial, f64)>,
}

impl TpeSampler {
    #[must_use]
    pub fn new(space: SearchSpace, config: &SearchConfig) -> Self {
        Self {
            space,
            rng: StdRng::seed_from_u64(config.seed),
            n_startup_trials: config.n_startup_trials,
            n_ei_candidates: config.n_ei_candidates.max(1),
            history: Vec::new(),
        }
    }

    /// Number of observed trials
    #[must_use]
    pub fn num_observed(&self) -> usize {
        self.history.len()
    }

    /// Number of trials in the good group for `n` observations
    fn n_below(n: usize) -> usize {
        n.div_ceil(10).clamp(1, MAX_BELOW)
    }

    /// Propose the next trial
    pub fn suggest(&mut self) -> Trial {
        let number = self.history.len();
        let mut values = BTreeMap::new();
        let use_prior = self.history.len() < self.n_startup_trials.max(2);

        let mut ranked: Vec<&(Trial, f64)> = self.history.iter().collect();
        ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
        let split = Self::n_below(ranked.len()).min(ranked.len());

        for spec in self.space.params.clone() {
            let (low, high) = spec.internal_bounds();
            let internal = if use_prior {
                match spec.kind {
                    ParamKind::Categorical { choices } => self.rng.random_range(0..choices) as f64,
                    _ => self.rng.random_range(low..=high),
                }
            } else {
                let observed = |group: &[&(Trial, f64)]| -> Vec<f64> {
                    group
                        .iter()
                        .filter_map(|(t, _)| t.values.get(spec.name))
                        .map(|&v| spec.to_internal(v))
                        .collect()
                };
                let (below, above) = ranked.split_at(split);
                let (below, above) = (observed(below), observed(above));
                propose(&mut self.rng, self.n_ei_candidates, &spec, &below, &above)
            };
            values.insert(spec.name, spec.from_internal(internal));
        }
        Trial { number, values }
    }

    /// Record the objective value of a trial
    pub fn observe(&mut self, trial: Trial, score: f64) {
        self.history.push((trial, score));
    }
}

/// Parameter sets that can be tuned by the search
pub trait Tunable: Sized + Clone + Serialize {
    /// Parameters searched and their domains
    fn search_space() -> SearchSpace;

    /// Copy of `self` with the trial's values applied, validated
    ///
    /// # Errors
    /// Returns an error if a value is missing or the result is invalid
    fn with_trial(&self, trial: &Trial) -> Result<Self>;
}

impl Tunable for LightGbmParams {
    fn search_space() -> SearchSpace {
        SearchSpace::new(vec![
            ParamSpec::log_float("learning_rate", 0.01, 0.1),
            ParamSpec::int("max_depth", 3, 8),
            ParamSpec::int("num_leaves", 16, 256),
            ParamSpec::log_float("lambda_l1", 1e-3, 10.0),
            ParamSpec::log_float("lambda_l2", 1e-3, 10.0),
            ParamSpec::float("colsample_bytree", 0.3, 1.0),
            ParamSpec::float("colsample_bynode", 0.3, 1.0),
            ParamSpec::float("bagging_fraction", 0.5, 1.0),
            ParamSpec::int("min_data_in_leaf", 10, 100),
        ])
    }

    fn with_trial(&self, trial: &Trial) -> Result<Self> {
        let params = Self {
            learning_rate: trial.float("learning_rate")?,
            max_depth: trial.count("max_depth")?,
            num_leaves: trial.count("num_leaves")?,
            lambda_l1: trial.float("lambda_l1")?,
            lambda_l2: trial.float("lambda_l2")?,
            colsample_bytree: trial.float("colsample_bytree")?,
            colsample_bynode: trial.float("colsample_bynode")?,
            bagging_fraction: trial.float("bagging_fraction")?,
            min_data_in_leaf: trial.count("min_data_in_leaf")?,
            ..self.clone()
        };
        params.validate()?;
        Ok(params)
    }
}

impl Tunable for XgBoostParams {
    fn search_space() -> SearchSpace {
        SearchSpace::new(vec![
            ParamSpec::log_float("learning_rate", 0.01, 0.2),
            ParamSpec::int("max_depth", 3, 8),
            ParamSpec::log_float("lambda", 1e-3, 10.0),
            ParamSpec::log_float("alpha", 1e-3, 10.0),
            ParamSpec::float("subsample", 0.4, 1.0),
            ParamSpec::float("colsample_bytree", 0.4, 1.0),
            ParamSpec::float("colsample_bylevel", 0.4, 1.0),
            ParamSpec::float("colsample_bynode", 0.4, 1.0),
        ])
    }

    fn with_trial(&self, trial: &Trial) -> Result<Self> {
        let params = Self {
            learning_rate: trial.float("learning_rate")?,
            max_depth: trial.count("max_depth")?,
            lambda: trial.float("lambda")?,
            alpha: trial.float("alpha")?,
            subsample: trial.float("subsample")?,
            colsample_bytree: trial.float("colsample_bytree")?,
            colsample_bylevel: trial.float("colsample_bylevel")?,
            colsample_bynode: trial.float("colsample_bynode")?,
            ..self.clone()
        };
        params.validate()?;
        Ok(params)
    }
}

/// Border counts offered to the CatBoost-style search
pub const BORDER_COUNT_CHOICES: [usize; 2] = [128, 256];

impl Tunable for CatBoostParams {
    fn search_space() -> SearchSpace {
        SearchSpace::new(vec![
            ParamSpec::float("learning_rate", 0.01, 0.08),
            ParamSpec::float("l2_leaf_reg", 1.0, 20.0),
            ParamSpec::float("random_strength", 0.0, 5.0),
            ParamSpec::int("depth", 2, 8),
            ParamSpec::float("bagging_temperature", 0.0, 10.0),
            ParamSpec::categorical("border_count", BORDER_COUNT_CHOICES.len()),
            ParamSpec::categorical("grow_policy", CatBoostGrowPolicy::ALL.len()),
            ParamSpec::int("min_data_in_leaf", 8, 40),
        ])
    }

    fn with_trial(&self, trial: &Trial) -> Result<Self> {
        let border = trial.choice("border_count")?;
        let policy = trial.choice("grow_policy")?;
        let params = Self {
            learning_rate: trial.float("learning_rate")?,
            l2_leaf_reg: trial.float("l2_leaf_reg")?,
            random_strength: trial.float("random_strength")?,
            depth: trial.count("depth")?,
            bagging_temperature: trial.float("bagging_temperature")?,
            border_count: BORDER_COUNT_CHOICES
                .get(border)
                .copied()
                .ok_or_else(|| PipelineError::config(format!("border_count choice {border}")))?,
            grow_policy: CatBoostGrowPolicy::ALL
                .get(policy)
                .copied()
                .ok_or_else(|| PipelineError::config(format!("grow_policy choice {policy}")))?,
            min_data_in_leaf: trial.count("min_data_in_leaf")?,
            ..self.clone()
        };
        params.validate()?;
        Ok(params)
    }
}

/// One evaluated trial
#[derive(Debug, Clone, Serialize)]
pub struct TrialRecord {
    pub number: usize,
    pub params: serde_json::Value,
    pub score: f64,
}

/// Outcome of a search
#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub family: ModelFamily,
    pub best_trial: usize,
    pub best_score: f64,
    pub best_params: serde_json::Value,
    pub trials: Vec<TrialRecord>,
}

/// Maximize an objective over a family's search space
///
/// # Arguments
/// * `family` - Family being tuned, for reporting
/// * `base` - Parameters left untouched by the search
/// * `config` - Trial budget and sampler settings
/// * `objective` - Score of a parameter set, higher is better
///
/// # Errors
/// Returns an error if the objective fails or returns a non-finite score
pub fn run_search<P, F>(
    family: ModelFamily,
    base: &P,
    config: &SearchConfig,
    mut objective: F,
) -> Result<SearchReport>
where
    P: Tunable,
    F: FnMut(&P) -> Result<f64>,
{
    if config.n_trials == 0 {
        return Err(PipelineError::config("search needs at least one trial"));
    }
    let mut sampler = TpeSampler::new(P::search_space(), config);
    let pb = create_main_progress_bar(
        config.n_trials as u64,
        Some(&format!("Searching {family} parameters")),
    );
    let mut trials = Vec::with_capacity(config.n_trials);
    let mut best: Option<(usize, f64)> = None;

    for _ in 0..config.n_trials {
        let trial = sampler.suggest();
        let params = base.with_trial(&trial)?;
        let score = objective(&params)?;
        if !score.is_finite() {
            return Err(PipelineError::Metric(format!(
                "trial {} produced a non-finite score",
                trial.number()
            )));
        }
        if best.is_none_or(|(_, b)| score > b) {
            best = Some((trial.number(), score));
            info!("Trial {} improved {family} pAUC to {score:.5}", trial.number());
        }
        trials.push(TrialRecord {
            number: trial.number(),
            params: serde_json::to_value(&params)?,
            score,
        });
        sampler.observe(trial, score);
        pb.inc(1);
    }

    let (best_trial, best_score) =
        best.ok_or_else(|| PipelineError::Metric("search produced no trials".to_string()))?;
    finish_progress_bar(
        &pb,
        Some(&format!("{family}: best pAUC {best_score:.5} at trial {best_trial}")),
    );
    Ok(SearchReport {
        family,
        best_trial,
        best_score,
        best_params: trials[best_trial].params.clone(),
        trials,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(n_trials: usize) -> SearchConfig {
        SearchConfig {
            n_trials,
            n_startup_trials: 5,
            ..SearchConfig::default()
        }
    }

    #[test]
    fn test_suggestions_stay_in_bounds() {
        let mut sampler = TpeSampler::new(CatBoostParams::search_space(), &config(40));
        for i in 0..40 {
            let trial = sampler.suggest();
            let params = CatBoostParams::default().with_trial(&trial).unwrap();
            assert!((0.01..=0.08).contains(&params.learning_rate));
            assert!((2..=8).contains(&params.depth));
            assert!(BORDER_COUNT_CHOICES.contains(&params.border_count));
            assert!((8..=40).contains(&params.min_data_in_leaf));
            sampler.observe(trial, f64::from(i % 7));
        }
        assert_eq!(sampler.num_observed(), 40);
    }

    #[test]
    fn test_search_concentrates_near_the_optimum() {
        let report = run_search(
            ModelFamily::XgBoost,
            &XgBoostParams::default(),
            &config(60),
            |p: &XgBoostParams| Ok(-(p.subsample - 0.9).powi(2) - (p.learning_rate.ln() - 0.05f64.ln()).powi(2)),
        )
        .unwrap();
        assert_eq!(report.trials.len(), 60);
        let best = &report.trials[report.best_trial];
        assert_eq!(best.score, report.best_score);
        assert!(report.best_score > -0.1, "best score {}", report.best_score);
    }

    #[test]
    fn test_search_is_reproducible() {
        let objective = |p: &LightGbmParams| Ok(p.colsample_bynode - p.lambda_l1);
        let a = run_search(ModelFamily::LightGbm, &LightGbmParams::default(), &config(12), objective).unwrap();
        let b = run_search(ModelFamily::LightGbm, &LightGbmParams::default(), &config(12), objective).unwrap();
        assert_eq!(a.best_params, b.best_params);
    }

    #[test]
    fn test_failing_objective_aborts() {
        let result = run_search(
            ModelFamily::CatBoost,
            &CatBoostParams::default(),
            &config(3),
            |_: &CatBoostParams| Err(PipelineError::Metric("single class".to_string())),
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_normal_cdf_approximation() {
        assert!((std_normal_cdf(0.0) - 0.5).abs() < 1e-6);
        assert!((std_normal_cdf(1.959_964) - 0.975).abs() < 1e-6);
        assert!((std_normal_cdf(-1.959_964) - 0.025).abs() < 1e-6);
    }
}
