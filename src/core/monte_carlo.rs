//! Randomized trial batches over the simulation engine.
//!
//! Each trial perturbs the baseline parameters with three independent
//! standard-normal deviates and runs a fully isolated engine. Trials carry
//! their own ChaCha stream derived from the batch seed, so results are
//! reproducible regardless of how rayon schedules them.

use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;

use super::engine::SimulationEngine;
use super::types::{ParameterError, SimulationParameters};

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloConfig {
    pub simulations: u32,
    /// Volatility of the per-period return rate, as a fraction (0.01 = 1pp of
    /// rate movement per standard deviation).
    pub return_volatility: f64,
    /// Volatility of the loan interest rate, same scale.
    pub rate_volatility: f64,
    /// Relative volatility of the yearly fixed costs.
    pub cost_volatility: f64,
    pub seed: u64,
}

/// Terminal figures of one randomized trial.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TrialOutcome {
    pub roi: f64,
    pub final_wealth: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonteCarloSummary {
    pub simulations: u32,
    pub mean_roi: f64,
    pub median_roi: f64,
    pub p5_roi: f64,
    pub p95_roi: f64,
    /// Fraction of trials that ended below the starting capital.
    pub loss_probability: f64,
    /// 5th percentile of final wealth minus starting capital.
    pub value_at_risk_5: f64,
}

pub struct MonteCarloEngine {
    baseline: SimulationParameters,
}

impl MonteCarloEngine {
    pub fn new(baseline: SimulationParameters) -> Result<Self, ParameterError> {
        baseline.validate()?;
        Ok(Self { baseline })
    }

    /// Runs the whole batch in parallel and aggregates the sorted trial
    /// distribution. A single failing trial fails the batch rather than
    /// leaking a partial aggregate.
    pub fn run(&self, config: &MonteCarloConfig) -> Result<MonteCarloSummary, ParameterError> {
        if config.simulations == 0 {
            return Err(ParameterError::ZeroTrialCount);
        }

        let trials: Vec<TrialOutcome> = (0..config.simulations)
            .into_par_iter()
            .map(|trial| self.run_trial(config, trial))
            .collect::<Result<_, _>>()?;

        let summary = summarize(&trials, self.baseline.starting_capital, config.simulations);
        info!(
            simulations = summary.simulations,
            mean_roi = summary.mean_roi,
            p5_roi = summary.p5_roi,
            loss_probability = summary.loss_probability,
            "monte carlo batch finished"
        );
        Ok(summary)
    }

    fn run_trial(
        &self,
        config: &MonteCarloConfig,
        trial: u32,
    ) -> Result<TrialOutcome, ParameterError> {
        let mut rng = ChaCha8Rng::seed_from_u64(derive_seed(config.seed, trial));
        let return_dev: f64 = StandardNormal.sample(&mut rng);
        let rate_dev: f64 = StandardNormal.sample(&mut rng);
        let cost_dev: f64 = StandardNormal.sample(&mut rng);

        let mut params = self.baseline.clone();
        params.expected_return_rate += return_dev * config.return_volatility * 100.0;
        params.loan_interest_rate =
            (params.loan_interest_rate + rate_dev * config.rate_volatility * 100.0).max(0.0);
        params.fixed_costs_per_year =
            (params.fixed_costs_per_year * (1.0 + cost_dev * config.cost_volatility)).max(0.0);

        let run = SimulationEngine::new(params)?.run();
        Ok(TrialOutcome {
            roi: run.final_results.final_roi,
            final_wealth: run.final_results.final_wealth,
        })
    }
}

fn summarize(trials: &[TrialOutcome], starting_capital: f64, simulations: u32) -> MonteCarloSummary {
    let mut rois: Vec<f64> = trials.iter().map(|t| t.roi).collect();
    let mut wealth_deltas: Vec<f64> = trials
        .iter()
        .map(|t| t.final_wealth - starting_capital)
        .collect();

    let mean_roi = rois.iter().sum::<f64>() / rois.len() as f64;
    let losses = rois.iter().filter(|roi| **roi < 0.0).count();

    MonteCarloSummary {
        simulations,
        mean_roi,
        median_roi: percentile(&mut rois, 50.0),
        p5_roi: percentile(&mut rois, 5.0),
        p95_roi: percentile(&mut rois, 95.0),
        loss_probability: losses as f64 / trials.len() as f64,
        value_at_risk_5: percentile(&mut wealth_deltas, 5.0),
    }
}

/// Per-trial seed stream: a splitmix64 finalizer over the mixed batch seed and
/// trial index keeps neighboring trials statistically independent.
fn derive_seed(base_seed: u64, trial: u32) -> u64 {
    splitmix64(base_seed ^ ((trial as u64) << 32) ^ trial as u64)
}

fn splitmix64(mut x: u64) -> u64 {
    x = x.wrapping_add(0x9E3779B97F4A7C15);
    let mut z = x;
    z = (z ^ (z >> 30)).wrapping_mul(0xBF58476D1CE4E5B9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94D049BB133111EB);
    z ^ (z >> 31)
}

/// Linear interpolation between order statistics. Sorts in place.
fn percentile(values: &mut [f64], p: f64) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.sort_by(|a, b| a.total_cmp(b));

    let n = values.len();
    if n == 1 {
        return values[0];
    }
    let rank = (p / 100.0) * (n as f64 - 1.0);
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    if lower == upper {
        values[lower]
    } else {
        let w = rank - lower as f64;
        values[lower] * (1.0 - w) + values[upper] * w
    }
}
