//! What-if analysis on top of a baseline run.
//!
//! Every scenario builds its own engine from a merged parameter copy, so the
//! baseline ledger can never be disturbed by a what-if excursion.

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::engine::SimulationEngine;
use super::types::{
    AmortizationType, ParameterError, ReturnCadence, SimulationParameters, SimulationRun,
    TaxRegime,
};

/// Sparse parameter overlay. Absent fields fall through to the baseline.
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ParameterOverrides {
    pub starting_capital: Option<f64>,
    pub loan_principal: Option<f64>,
    pub loan_interest_rate: Option<f64>,
    pub investment_horizon_months: Option<u32>,
    pub loan_term_months: Option<u32>,
    pub return_cadence: Option<ReturnCadence>,
    pub expected_return_rate: Option<f64>,
    pub amortization_type: Option<AmortizationType>,
    pub reinvestment_rate: Option<f64>,
    pub fixed_costs_per_year: Option<f64>,
    pub reinvestment_threshold: Option<f64>,
    pub inflation_rate: Option<f64>,
    pub tax_regime: Option<TaxRegime>,
}

impl ParameterOverrides {
    pub fn apply_to(&self, baseline: &SimulationParameters) -> SimulationParameters {
        let mut params = baseline.clone();
        if let Some(v) = self.starting_capital {
            params.starting_capital = v;
        }
        if let Some(v) = self.loan_principal {
            params.loan_principal = v;
        }
        if let Some(v) = self.loan_interest_rate {
            params.loan_interest_rate = v;
        }
        if let Some(v) = self.investment_horizon_months {
            params.investment_horizon_months = v;
        }
        if let Some(v) = self.loan_term_months {
            params.loan_term_months = v;
        }
        if let Some(v) = self.return_cadence {
            params.return_cadence = v;
        }
        if let Some(v) = self.expected_return_rate {
            params.expected_return_rate = v;
        }
        if let Some(v) = self.amortization_type {
            params.amortization_type = v;
        }
        if let Some(v) = self.reinvestment_rate {
            params.reinvestment_rate = v;
        }
        if let Some(v) = self.fixed_costs_per_year {
            params.fixed_costs_per_year = v;
        }
        if let Some(v) = self.reinvestment_threshold {
            params.reinvestment_threshold = v;
        }
        if let Some(v) = self.inflation_rate {
            params.inflation_rate = v;
        }
        if let Some(v) = &self.tax_regime {
            params.tax_regime = v.clone();
        }
        params
    }
}

/// One entry of the stress battery output.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StressOutcome {
    pub name: &'static str,
    pub roi: f64,
    /// ROI delta against the unstressed baseline, in percentage points.
    pub impact: f64,
}

pub struct ScenarioRunner {
    baseline: SimulationParameters,
    baseline_run: SimulationRun,
}

impl ScenarioRunner {
    /// Validates and runs the baseline once; its ROI anchors every stress
    /// impact figure.
    pub fn new(baseline: SimulationParameters) -> Result<Self, ParameterError> {
        let baseline_run = SimulationEngine::new(baseline.clone())?.run();
        Ok(Self {
            baseline,
            baseline_run,
        })
    }

    pub fn baseline_run(&self) -> &SimulationRun {
        &self.baseline_run
    }

    pub fn baseline_roi(&self) -> f64 {
        self.baseline_run.final_results.final_roi
    }

    /// Terminal ROI of the baseline with `overrides` applied. The merged
    /// parameter set is re-validated, so an override can fail where the
    /// baseline did not.
    pub fn calculate_scenario(&self, overrides: &ParameterOverrides) -> Result<f64, ParameterError> {
        let params = overrides.apply_to(&self.baseline);
        let run = SimulationEngine::new(params)?.run();
        Ok(run.final_results.final_roi)
    }

    /// Fixed five-shock battery, reported in battery order.
    pub fn run_stress_test(&self) -> Result<Vec<StressOutcome>, ParameterError> {
        let shocks: [(&'static str, ParameterOverrides); 5] = [
            (
                "interest rate +2pp",
                ParameterOverrides {
                    loan_interest_rate: Some(self.baseline.loan_interest_rate + 2.0),
                    ..Default::default()
                },
            ),
            (
                "returns -30%",
                ParameterOverrides {
                    expected_return_rate: Some(self.baseline.expected_return_rate * 0.7),
                    ..Default::default()
                },
            ),
            (
                "fixed costs +50%",
                ParameterOverrides {
                    fixed_costs_per_year: Some(self.baseline.fixed_costs_per_year * 1.5),
                    ..Default::default()
                },
            ),
            (
                "inflation +5pp",
                ParameterOverrides {
                    inflation_rate: Some(self.baseline.inflation_rate + 5.0),
                    ..Default::default()
                },
            ),
            (
                "combined shock",
                ParameterOverrides {
                    loan_interest_rate: Some(self.baseline.loan_interest_rate + 2.0),
                    expected_return_rate: Some(self.baseline.expected_return_rate * 0.7),
                    fixed_costs_per_year: Some(self.baseline.fixed_costs_per_year * 1.5),
                    inflation_rate: Some(self.baseline.inflation_rate + 5.0),
                    ..Default::default()
                },
            ),
        ];

        let baseline_roi = self.baseline_roi();
        let mut outcomes = Vec::with_capacity(shocks.len());
        for (name, overrides) in shocks {
            let roi = self.calculate_scenario(&overrides)?;
            debug!(shock = name, roi, impact = roi - baseline_roi, "stress shock");
            outcomes.push(StressOutcome {
                name,
                roi,
                impact: roi - baseline_roi,
            });
        }
        Ok(outcomes)
    }
}
