use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReturnCadence {
    /// `expected_return_rate` is a per-month percentage.
    Monthly,
    /// `expected_return_rate` is an annual percentage, converted to an
    /// equivalent compounding monthly rate.
    Annual,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AmortizationType {
    Annuity,
    Linear,
    InterestOnly,
}

/// One marginal band of a tax table. `upper == None` means the band is open.
/// Rates are percentages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBracket {
    pub upper: Option<f64>,
    pub rate: f64,
}

impl TaxBracket {
    pub fn capped(upper: f64, rate: f64) -> Self {
        Self {
            upper: Some(upper),
            rate,
        }
    }

    pub fn open(rate: f64) -> Self {
        Self { upper: None, rate }
    }
}

/// Tax regime the simulation assesses periodic liability under. Selected once
/// per parameter set; each variant carries its own frozen configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "regime", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum TaxRegime {
    /// Two-tier profit tax assessed monthly on the distributed share of
    /// taxable profit. The threshold is an annual amount.
    Corporate {
        low_rate: f64,
        standard_rate: f64,
        low_rate_threshold: f64,
    },
    /// Personal income tax assessed monthly with a single flat rate on the
    /// distributed share; the bracket table feeds the standalone annual
    /// estimator only. Interest is partially deductible.
    ProgressiveIncome {
        brackets: Vec<TaxBracket>,
        /// Fraction (0..=1) of interest paid that reduces taxable profit.
        interest_deductible_fraction: f64,
        flat_rate: f64,
    },
    /// Deemed-return levy on net wealth, assessed every 12th month above an
    /// exemption threshold. The flat deemed rate drives the engine; the
    /// bracket table feeds the standalone annual estimator.
    WealthTax {
        deemed_return_rate: f64,
        tax_rate: f64,
        exemption_threshold: f64,
        deemed_return_brackets: Vec<TaxBracket>,
    },
}

/// Immutable inputs for one simulation run. All rates are percentages.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationParameters {
    pub starting_capital: f64,
    pub loan_principal: f64,
    pub loan_interest_rate: f64,
    pub investment_horizon_months: u32,
    pub loan_term_months: u32,
    pub return_cadence: ReturnCadence,
    pub expected_return_rate: f64,
    pub amortization_type: AmortizationType,
    /// Share (percent) of a positive net result that is a candidate for
    /// reinvestment into the portfolio.
    pub reinvestment_rate: f64,
    pub fixed_costs_per_year: f64,
    /// Minimum candidate amount below which the whole net result is kept in
    /// cash instead (all-or-nothing test on the candidate).
    pub reinvestment_threshold: f64,
    pub inflation_rate: f64,
    pub tax_regime: TaxRegime,
}

impl SimulationParameters {
    /// Rejects parameter sets the engine cannot run meaningfully. Called by
    /// every engine constructor so invalid inputs never reach the monthly
    /// loop.
    pub fn validate(&self) -> Result<(), ParameterError> {
        if !self.starting_capital.is_finite() || self.starting_capital <= 0.0 {
            return Err(ParameterError::NonPositiveStartingCapital(
                self.starting_capital,
            ));
        }
        if self.investment_horizon_months == 0 {
            return Err(ParameterError::ZeroHorizon);
        }
        for (name, value) in [
            ("loan_principal", self.loan_principal),
            ("loan_interest_rate", self.loan_interest_rate),
            ("fixed_costs_per_year", self.fixed_costs_per_year),
            ("reinvestment_threshold", self.reinvestment_threshold),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ParameterError::NegativeValue { name, value });
            }
        }
        if !self.expected_return_rate.is_finite() || self.expected_return_rate <= -100.0 {
            return Err(ParameterError::ReturnRateOutOfRange(
                self.expected_return_rate,
            ));
        }
        if !self.inflation_rate.is_finite() || self.inflation_rate <= -100.0 {
            return Err(ParameterError::InflationRateOutOfRange(self.inflation_rate));
        }
        if !(0.0..=100.0).contains(&self.reinvestment_rate) {
            return Err(ParameterError::ReinvestmentRateOutOfRange(
                self.reinvestment_rate,
            ));
        }
        if self.loan_principal > 0.0 && self.loan_term_months == 0 {
            return Err(ParameterError::ZeroLoanTerm);
        }
        validate_regime(&self.tax_regime)
    }
}

fn validate_regime(regime: &TaxRegime) -> Result<(), ParameterError> {
    match regime {
        TaxRegime::Corporate {
            low_rate,
            standard_rate,
            low_rate_threshold,
        } => {
            for (name, value) in [("low_rate", *low_rate), ("standard_rate", *standard_rate)] {
                if !(0.0..=100.0).contains(&value) {
                    return Err(ParameterError::TaxRateOutOfRange { name, value });
                }
            }
            if !low_rate_threshold.is_finite() || *low_rate_threshold < 0.0 {
                return Err(ParameterError::NegativeValue {
                    name: "low_rate_threshold",
                    value: *low_rate_threshold,
                });
            }
            Ok(())
        }
        TaxRegime::ProgressiveIncome {
            brackets,
            interest_deductible_fraction,
            flat_rate,
        } => {
            if !(0.0..=1.0).contains(interest_deductible_fraction) {
                return Err(ParameterError::DeductibleFractionOutOfRange(
                    *interest_deductible_fraction,
                ));
            }
            if !(0.0..=100.0).contains(flat_rate) {
                return Err(ParameterError::TaxRateOutOfRange {
                    name: "flat_rate",
                    value: *flat_rate,
                });
            }
            validate_brackets(brackets)
        }
        TaxRegime::WealthTax {
            deemed_return_rate,
            tax_rate,
            exemption_threshold,
            deemed_return_brackets,
        } => {
            for (name, value) in [
                ("deemed_return_rate", *deemed_return_rate),
                ("tax_rate", *tax_rate),
            ] {
                if !(0.0..=100.0).contains(&value) {
                    return Err(ParameterError::TaxRateOutOfRange { name, value });
                }
            }
            if !exemption_threshold.is_finite() || *exemption_threshold < 0.0 {
                return Err(ParameterError::NegativeValue {
                    name: "exemption_threshold",
                    value: *exemption_threshold,
                });
            }
            validate_brackets(deemed_return_brackets)
        }
    }
}

fn validate_brackets(brackets: &[TaxBracket]) -> Result<(), ParameterError> {
    let Some((last, capped)) = brackets.split_last() else {
        return Err(ParameterError::InvalidBracketTable);
    };
    if last.upper.is_some() {
        return Err(ParameterError::InvalidBracketTable);
    }
    let mut previous_upper = 0.0;
    for bracket in capped {
        let Some(upper) = bracket.upper else {
            return Err(ParameterError::InvalidBracketTable);
        };
        if !upper.is_finite() || upper <= previous_upper {
            return Err(ParameterError::InvalidBracketTable);
        }
        previous_upper = upper;
    }
    for bracket in brackets {
        if !(0.0..=100.0).contains(&bracket.rate) {
            return Err(ParameterError::TaxRateOutOfRange {
                name: "bracket rate",
                value: bracket.rate,
            });
        }
    }
    Ok(())
}

#[derive(Debug, Error, PartialEq)]
pub enum ParameterError {
    #[error("starting capital must be > 0, got {0}")]
    NonPositiveStartingCapital(f64),
    #[error("investment horizon must be at least 1 month")]
    ZeroHorizon,
    #[error("{name} must be finite and >= 0, got {value}")]
    NegativeValue { name: &'static str, value: f64 },
    #[error("expected return rate must be a finite percentage > -100, got {0}")]
    ReturnRateOutOfRange(f64),
    #[error("inflation rate must be a finite percentage > -100, got {0}")]
    InflationRateOutOfRange(f64),
    #[error("reinvestment rate must be between 0 and 100 percent, got {0}")]
    ReinvestmentRateOutOfRange(f64),
    #[error("loan term must be at least 1 month when a loan principal is set")]
    ZeroLoanTerm,
    #[error("{name} must be a percentage between 0 and 100, got {value}")]
    TaxRateOutOfRange { name: &'static str, value: f64 },
    #[error("interest deductible fraction must be between 0 and 1, got {0}")]
    DeductibleFractionOutOfRange(f64),
    #[error("bracket table must be non-empty, strictly increasing, and end with an open bracket")]
    InvalidBracketTable,
    #[error("simulation count must be > 0")]
    ZeroTrialCount,
}

/// One settled month, appended to the run ledger. Balances are the
/// post-settlement snapshot.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MonthlyLedgerEntry {
    pub month: u32,
    pub gross_return: f64,
    pub tax_paid: f64,
    pub interest_paid: f64,
    pub principal_paid: f64,
    pub fixed_costs: f64,
    pub net_result: f64,
    pub portfolio_value: f64,
    pub cash_reserve: f64,
    pub loan_balance: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlySnapshot {
    pub year: u32,
    pub portfolio_value: f64,
    pub cash_reserve: f64,
    pub loan_balance: f64,
    pub total_wealth: f64,
    pub roi: f64,
    pub real_portfolio_value: f64,
    pub real_cash_reserve: f64,
    pub real_loan_balance: f64,
    pub real_total_wealth: f64,
    pub real_roi: f64,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalResults {
    pub final_wealth: f64,
    pub final_roi: f64,
    pub leverage_factor: f64,
    pub final_cash_reserve: f64,
    pub real_final_wealth: f64,
    pub real_final_roi: f64,
    pub real_final_cash_reserve: f64,
    /// Nominal final wealth minus its inflation-adjusted equivalent.
    pub purchasing_power_loss: f64,
}

/// Complete output of one engine run, consumed read-only by every wrapper.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationRun {
    pub final_results: FinalResults,
    pub yearly_snapshots: Vec<YearlySnapshot>,
    pub monthly_ledger: Vec<MonthlyLedgerEntry>,
}
