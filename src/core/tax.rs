//! Polymorphic tax assessment.
//!
//! One `compute` per regime variant, selected once per parameter set. The
//! per-period engine and the standalone annual estimators share a single
//! bracket-aware evaluator parameterized by the number of assessment periods
//! per year, so the monthly and annual paths cannot drift apart.

use super::types::{TaxBracket, TaxRegime};

// ============================================================================
// Default Regime Tables
// ============================================================================
// Frozen defaults used by the CLI/API surface and tests; the engine itself
// runs on whatever validated regime it is handed.

pub const DEFAULT_CORPORATE_LOW_RATE: f64 = 19.0;
pub const DEFAULT_CORPORATE_STANDARD_RATE: f64 = 25.8;
pub const DEFAULT_CORPORATE_LOW_RATE_THRESHOLD: f64 = 200_000.0;

pub const DEFAULT_INCOME_FLAT_RATE: f64 = 36.97;
pub const DEFAULT_INTEREST_DEDUCTIBLE_FRACTION: f64 = 0.5;

pub const DEFAULT_DEEMED_RETURN_RATE: f64 = 6.04;
pub const DEFAULT_WEALTH_TAX_RATE: f64 = 36.0;
pub const DEFAULT_WEALTH_TAX_EXEMPTION: f64 = 57_000.0;

pub fn default_corporate_regime() -> TaxRegime {
    TaxRegime::Corporate {
        low_rate: DEFAULT_CORPORATE_LOW_RATE,
        standard_rate: DEFAULT_CORPORATE_STANDARD_RATE,
        low_rate_threshold: DEFAULT_CORPORATE_LOW_RATE_THRESHOLD,
    }
}

pub fn default_progressive_income_regime() -> TaxRegime {
    TaxRegime::ProgressiveIncome {
        brackets: vec![
            TaxBracket::capped(75_518.0, 36.97),
            TaxBracket::open(49.5),
        ],
        interest_deductible_fraction: DEFAULT_INTEREST_DEDUCTIBLE_FRACTION,
        flat_rate: DEFAULT_INCOME_FLAT_RATE,
    }
}

pub fn default_wealth_tax_regime() -> TaxRegime {
    TaxRegime::WealthTax {
        deemed_return_rate: DEFAULT_DEEMED_RETURN_RATE,
        tax_rate: DEFAULT_WEALTH_TAX_RATE,
        exemption_threshold: DEFAULT_WEALTH_TAX_EXEMPTION,
        deemed_return_brackets: vec![
            TaxBracket::capped(100_000.0, 1.03),
            TaxBracket::capped(1_000_000.0, 6.04),
            TaxBracket::open(6.04),
        ],
    }
}

/// Flow and wealth snapshot for one assessment period, taken before the
/// month's settlement applies.
#[derive(Copy, Clone, Debug)]
pub struct TaxContext {
    pub month: u32,
    pub gross_return: f64,
    pub interest_due: f64,
    pub fixed_costs: f64,
    /// portfolio + cash - loan, evaluated before this month's flows.
    pub net_wealth: f64,
    /// Percent of profit retained in the portfolio; the complement is the
    /// distributed share that profit regimes tax.
    pub reinvestment_rate: f64,
}

#[derive(Clone, Debug)]
pub struct TaxEngine {
    regime: TaxRegime,
}

impl TaxEngine {
    pub fn new(regime: TaxRegime) -> Self {
        Self { regime }
    }

    pub fn regime(&self) -> &TaxRegime {
        &self.regime
    }

    /// Periodic tax liability. Total over every valid regime: month 0 is
    /// always 0, profit regimes assess monthly, the wealth regime assesses
    /// only every 12th month and reports the annual levy divided by 12.
    pub fn compute(&self, ctx: &TaxContext) -> f64 {
        if ctx.month == 0 {
            return 0.0;
        }
        match &self.regime {
            TaxRegime::Corporate {
                low_rate,
                standard_rate,
                low_rate_threshold,
            } => {
                let taxable = (ctx.gross_return - ctx.interest_due - ctx.fixed_costs).max(0.0);
                let distributed = taxable * (1.0 - ctx.reinvestment_rate / 100.0);
                let tiers = [
                    TaxBracket::capped(*low_rate_threshold, *low_rate),
                    TaxBracket::open(*standard_rate),
                ];
                bracket_tax(distributed, &tiers, 12.0)
            }
            TaxRegime::ProgressiveIncome {
                interest_deductible_fraction,
                flat_rate,
                ..
            } => {
                let deductible = ctx.interest_due * interest_deductible_fraction;
                let taxable = (ctx.gross_return - deductible - ctx.fixed_costs).max(0.0);
                let distributed = taxable * (1.0 - ctx.reinvestment_rate / 100.0);
                distributed * flat_rate / 100.0
            }
            TaxRegime::WealthTax {
                deemed_return_rate,
                tax_rate,
                exemption_threshold,
                ..
            } => {
                if ctx.month % 12 != 0 {
                    return 0.0;
                }
                let taxable_wealth = (ctx.net_wealth - exemption_threshold).max(0.0);
                let deemed_return = taxable_wealth * deemed_return_rate / 100.0;
                let annual_tax = deemed_return * tax_rate / 100.0;
                annual_tax / 12.0
            }
        }
    }
}

/// Marginal tax over a bracket table. Bracket bounds are annual amounts;
/// `periods_per_year` scales them down to the assessment period (12 for a
/// monthly charge, 1 for an annual estimate).
pub fn bracket_tax(base: f64, brackets: &[TaxBracket], periods_per_year: f64) -> f64 {
    if base <= 0.0 {
        return 0.0;
    }
    let mut tax = 0.0;
    let mut lower = 0.0;
    for bracket in brackets {
        let upper = match bracket.upper {
            Some(upper) => (upper / periods_per_year).min(base),
            None => base,
        };
        if upper > lower {
            tax += (upper - lower) * bracket.rate / 100.0;
            lower = upper;
        }
        if lower >= base {
            break;
        }
    }
    tax
}

/// Full progressive-table estimate of the tax on one year of income. Display
/// companion to the flat per-period rate the engine applies.
pub fn estimate_progressive_annual(annual_income: f64, brackets: &[TaxBracket]) -> f64 {
    bracket_tax(annual_income, brackets, 1.0)
}

/// Tiered deemed-return estimate of the annual wealth levy. Display companion
/// to the flat deemed rate the engine applies.
pub fn estimate_wealth_tax_annual(
    net_wealth: f64,
    exemption_threshold: f64,
    deemed_return_brackets: &[TaxBracket],
    tax_rate: f64,
) -> f64 {
    let taxable_wealth = (net_wealth - exemption_threshold).max(0.0);
    let deemed_return = bracket_tax(taxable_wealth, deemed_return_brackets, 1.0);
    deemed_return * tax_rate / 100.0
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn ctx(month: u32) -> TaxContext {
        TaxContext {
            month,
            gross_return: 4_500.0,
            interest_due: 600.0,
            fixed_costs: 100.0,
            net_wealth: 150_000.0,
            reinvestment_rate: 80.0,
        }
    }

    #[test]
    fn month_zero_is_always_free() {
        for regime in [
            default_corporate_regime(),
            default_progressive_income_regime(),
            default_wealth_tax_regime(),
        ] {
            assert_eq!(TaxEngine::new(regime).compute(&ctx(0)), 0.0);
        }
    }

    #[test]
    fn corporate_taxes_distributed_profit_at_low_rate_below_threshold() {
        let engine = TaxEngine::new(default_corporate_regime());
        // taxable = 4500 - 600 - 100 = 3800; distributed = 3800 * 0.2 = 760,
        // well under the monthly threshold slice of 200_000 / 12.
        assert_relative_eq!(engine.compute(&ctx(1)), 760.0 * 0.19, epsilon = 1e-9);
    }

    #[test]
    fn corporate_applies_standard_rate_above_monthly_threshold() {
        let engine = TaxEngine::new(default_corporate_regime());
        let mut large = ctx(1);
        large.gross_return = 120_000.0;
        large.reinvestment_rate = 0.0;
        // distributed = 120000 - 600 - 100 = 119300; first 200000/12 at 19%.
        let slice = 200_000.0 / 12.0;
        let expected = slice * 0.19 + (119_300.0 - slice) * 0.258;
        assert_relative_eq!(engine.compute(&large), expected, epsilon = 1e-6);
    }

    #[test]
    fn corporate_loss_months_owe_nothing() {
        let engine = TaxEngine::new(default_corporate_regime());
        let mut loss = ctx(3);
        loss.gross_return = 200.0;
        assert_eq!(engine.compute(&loss), 0.0);
    }

    #[test]
    fn progressive_income_deducts_half_the_interest_by_default() {
        let engine = TaxEngine::new(default_progressive_income_regime());
        // taxable = 4500 - 300 - 100 = 4100; distributed = 820.
        assert_relative_eq!(
            engine.compute(&ctx(1)),
            820.0 * DEFAULT_INCOME_FLAT_RATE / 100.0,
            epsilon = 1e-9
        );
    }

    #[test]
    fn wealth_tax_assesses_only_every_twelfth_month() {
        let engine = TaxEngine::new(default_wealth_tax_regime());
        for month in 1..12 {
            assert_eq!(engine.compute(&ctx(month)), 0.0);
        }
        // taxable wealth = 150000 - 57000 = 93000.
        let expected = 93_000.0 * 0.0604 * 0.36 / 12.0;
        assert_relative_eq!(engine.compute(&ctx(12)), expected, epsilon = 1e-9);
        assert_relative_eq!(engine.compute(&ctx(24)), expected, epsilon = 1e-9);
    }

    #[test]
    fn wealth_tax_respects_exemption() {
        let engine = TaxEngine::new(default_wealth_tax_regime());
        let mut small = ctx(12);
        small.net_wealth = 40_000.0;
        assert_eq!(engine.compute(&small), 0.0);
    }

    #[test]
    fn bracket_tax_walks_marginal_bands() {
        let brackets = [
            TaxBracket::capped(10_000.0, 10.0),
            TaxBracket::capped(30_000.0, 20.0),
            TaxBracket::open(30.0),
        ];
        assert_relative_eq!(bracket_tax(5_000.0, &brackets, 1.0), 500.0, epsilon = 1e-9);
        assert_relative_eq!(
            bracket_tax(40_000.0, &brackets, 1.0),
            10_000.0 * 0.1 + 20_000.0 * 0.2 + 10_000.0 * 0.3,
            epsilon = 1e-9
        );
        assert_eq!(bracket_tax(-5.0, &brackets, 1.0), 0.0);
    }

    #[test]
    fn monthly_and_annual_bracket_paths_agree_on_scaled_bases() {
        // Twelve identical monthly charges must equal one annual charge on
        // twelve times the base, since the bounds scale linearly.
        let brackets = [
            TaxBracket::capped(60_000.0, 15.0),
            TaxBracket::open(40.0),
        ];
        let monthly = bracket_tax(7_000.0, &brackets, 12.0);
        let annual = bracket_tax(84_000.0, &brackets, 1.0);
        assert_relative_eq!(monthly * 12.0, annual, epsilon = 1e-9);
    }

    #[test]
    fn progressive_annual_estimator_uses_full_table() {
        let TaxRegime::ProgressiveIncome { brackets, .. } = default_progressive_income_regime()
        else {
            unreachable!()
        };
        let expected = 75_518.0 * 0.3697 + (90_000.0 - 75_518.0) * 0.495;
        assert_relative_eq!(
            estimate_progressive_annual(90_000.0, &brackets),
            expected,
            epsilon = 1e-6
        );
    }

    #[test]
    fn wealth_estimator_applies_tiered_deemed_return() {
        let TaxRegime::WealthTax {
            exemption_threshold,
            deemed_return_brackets,
            tax_rate,
            ..
        } = default_wealth_tax_regime()
        else {
            unreachable!()
        };
        let taxable = 250_000.0 - exemption_threshold;
        let deemed = 100_000.0 * 0.0103 + (taxable - 100_000.0) * 0.0604;
        assert_relative_eq!(
            estimate_wealth_tax_annual(
                250_000.0,
                exemption_threshold,
                &deemed_return_brackets,
                tax_rate
            ),
            deemed * 0.36,
            epsilon = 1e-6
        );
    }
}
