//! Monthly simulation state machine.
//!
//! One engine instance per validated parameter set. Every `run` owns a fresh
//! private state and returns an immutable [`SimulationRun`]; nothing is shared
//! between runs, so wrappers may execute them in parallel freely.

use tracing::debug;

use super::amortization::{AmortizationCalculator, LoanPayment};
use super::tax::{TaxContext, TaxEngine};
use super::types::{
    FinalResults, MonthlyLedgerEntry, ParameterError, ReturnCadence, SimulationParameters,
    SimulationRun, YearlySnapshot,
};

/// Mutable balances advanced month by month. Private to the engine; the
/// outside world only ever sees the settled ledger copies.
#[derive(Copy, Clone, Debug)]
struct SimulationState {
    portfolio_value: f64,
    cash_reserve: f64,
    loan_balance: f64,
}

impl SimulationState {
    fn initial(params: &SimulationParameters) -> Self {
        Self {
            portfolio_value: params.starting_capital + params.loan_principal,
            cash_reserve: 0.0,
            loan_balance: params.loan_principal,
        }
    }

    fn net_wealth(&self) -> f64 {
        self.portfolio_value + self.cash_reserve - self.loan_balance
    }
}

#[derive(Clone, Debug)]
pub struct SimulationEngine {
    params: SimulationParameters,
    calculator: AmortizationCalculator,
    tax: TaxEngine,
}

impl SimulationEngine {
    pub fn new(params: SimulationParameters) -> Result<Self, ParameterError> {
        params.validate()?;
        let calculator = AmortizationCalculator::new(
            params.loan_principal,
            params.loan_interest_rate,
            params.loan_term_months,
        );
        let tax = TaxEngine::new(params.tax_regime.clone());
        Ok(Self {
            params,
            calculator,
            tax,
        })
    }

    pub fn params(&self) -> &SimulationParameters {
        &self.params
    }

    /// Per-month growth rate as a fraction. An annual cadence converts to the
    /// equivalent compounding monthly rate.
    fn period_rate(&self) -> f64 {
        match self.params.return_cadence {
            ReturnCadence::Monthly => self.params.expected_return_rate / 100.0,
            ReturnCadence::Annual => {
                (1.0 + self.params.expected_return_rate / 100.0).powf(1.0 / 12.0) - 1.0
            }
        }
    }

    /// Runs the full horizon and returns the settled ledger, yearly snapshots
    /// and terminal results.
    pub fn run(&self) -> SimulationRun {
        let params = &self.params;
        let period_rate = self.period_rate();
        let monthly_fixed_costs = params.fixed_costs_per_year / 12.0;

        let mut state = SimulationState::initial(params);
        let mut monthly_ledger = Vec::with_capacity(params.investment_horizon_months as usize);
        let mut yearly_snapshots =
            Vec::with_capacity((params.investment_horizon_months / 12) as usize);

        debug!(
            horizon_months = params.investment_horizon_months,
            starting_portfolio = state.portfolio_value,
            "simulation started"
        );

        for month in 1..=params.investment_horizon_months {
            let gross_return = state.portfolio_value * period_rate;

            let payment = if month <= params.loan_term_months {
                self.calculator
                    .split(params.amortization_type, state.loan_balance)
            } else {
                LoanPayment::NONE
            };

            // Wealth tax assesses the position before this month's flows.
            let tax_paid = self.tax.compute(&TaxContext {
                month,
                gross_return,
                interest_due: payment.interest,
                fixed_costs: monthly_fixed_costs,
                net_wealth: state.net_wealth(),
                reinvestment_rate: params.reinvestment_rate,
            });

            let net_result = gross_return - tax_paid - payment.total() - monthly_fixed_costs;
            self.settle(&mut state, net_result);
            state.loan_balance = (state.loan_balance - payment.principal).max(0.0);

            monthly_ledger.push(MonthlyLedgerEntry {
                month,
                gross_return,
                tax_paid,
                interest_paid: payment.interest,
                principal_paid: payment.principal,
                fixed_costs: monthly_fixed_costs,
                net_result,
                portfolio_value: state.portfolio_value,
                cash_reserve: state.cash_reserve,
                loan_balance: state.loan_balance,
            });

            if month % 12 == 0 {
                yearly_snapshots.push(self.snapshot(&state, month / 12));
            }
        }

        let final_results = self.final_results(&state);
        debug!(
            final_wealth = final_results.final_wealth,
            final_roi = final_results.final_roi,
            "simulation finished"
        );

        SimulationRun {
            final_results,
            yearly_snapshots,
            monthly_ledger,
        }
    }

    /// Applies one month's net result to the balances. A deficit draws cash
    /// first and then liquidates the portfolio, floored at 0 (no borrowing).
    /// A surplus is split by the reinvestment rate, subject to an
    /// all-or-nothing threshold test on the candidate amount.
    fn settle(&self, state: &mut SimulationState, net_result: f64) {
        if net_result < 0.0 {
            let deficit = -net_result;
            let from_cash = deficit.min(state.cash_reserve);
            state.cash_reserve -= from_cash;
            state.portfolio_value = (state.portfolio_value - (deficit - from_cash)).max(0.0);
            return;
        }
        let candidate = net_result * self.params.reinvestment_rate / 100.0;
        if candidate >= self.params.reinvestment_threshold {
            state.portfolio_value += candidate;
            state.cash_reserve += net_result - candidate;
        } else {
            state.cash_reserve += net_result;
        }
    }

    fn snapshot(&self, state: &SimulationState, year: u32) -> YearlySnapshot {
        let deflator = (1.0 + self.params.inflation_rate / 100.0).powi(year as i32);
        let total_wealth = state.net_wealth();
        let roi = self.roi(total_wealth);
        let real_total_wealth = total_wealth / deflator;
        YearlySnapshot {
            year,
            portfolio_value: state.portfolio_value,
            cash_reserve: state.cash_reserve,
            loan_balance: state.loan_balance,
            total_wealth,
            roi,
            real_portfolio_value: state.portfolio_value / deflator,
            real_cash_reserve: state.cash_reserve / deflator,
            real_loan_balance: state.loan_balance / deflator,
            real_total_wealth,
            real_roi: self.roi(real_total_wealth),
        }
    }

    fn final_results(&self, state: &SimulationState) -> FinalResults {
        let params = &self.params;
        // Fractional exponent so partial final years deflate proportionally;
        // for whole-year horizons this matches the last yearly snapshot.
        let years = f64::from(params.investment_horizon_months) / 12.0;
        let deflator = (1.0 + params.inflation_rate / 100.0).powf(years);

        let final_wealth = state.net_wealth();
        let real_final_wealth = final_wealth / deflator;
        let leverage_factor = if params.loan_principal > 0.0 {
            (params.starting_capital + params.loan_principal) / params.starting_capital
        } else {
            1.0
        };

        FinalResults {
            final_wealth,
            final_roi: self.roi(final_wealth),
            leverage_factor,
            final_cash_reserve: state.cash_reserve,
            real_final_wealth,
            real_final_roi: self.roi(real_final_wealth),
            real_final_cash_reserve: state.cash_reserve / deflator,
            purchasing_power_loss: final_wealth - real_final_wealth,
        }
    }

    fn roi(&self, wealth: f64) -> f64 {
        (wealth - self.params.starting_capital) / self.params.starting_capital * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::tax;
    use crate::core::types::{AmortizationType, TaxRegime};
    use approx::assert_relative_eq;
    use proptest::prelude::*;

    fn fixture_params() -> SimulationParameters {
        SimulationParameters {
            starting_capital: 50_000.0,
            loan_principal: 100_000.0,
            loan_interest_rate: 8.0,
            investment_horizon_months: 120,
            loan_term_months: 120,
            return_cadence: ReturnCadence::Monthly,
            expected_return_rate: 3.0,
            amortization_type: AmortizationType::Annuity,
            reinvestment_rate: 80.0,
            fixed_costs_per_year: 0.0,
            reinvestment_threshold: 0.0,
            inflation_rate: 2.0,
            tax_regime: tax::default_corporate_regime(),
        }
    }

    fn unleveraged_params() -> SimulationParameters {
        SimulationParameters {
            loan_principal: 0.0,
            loan_term_months: 0,
            loan_interest_rate: 0.0,
            inflation_rate: 0.0,
            ..fixture_params()
        }
    }

    #[test]
    fn invalid_parameters_never_reach_the_loop() {
        let mut params = fixture_params();
        params.starting_capital = -1.0;
        assert!(matches!(
            SimulationEngine::new(params),
            Err(ParameterError::NonPositiveStartingCapital(_))
        ));
    }

    #[test]
    fn ledger_and_snapshot_counts_match_horizon() {
        let run = SimulationEngine::new(fixture_params()).unwrap().run();
        assert_eq!(run.monthly_ledger.len(), 120);
        assert_eq!(run.yearly_snapshots.len(), 10);
        assert_eq!(run.monthly_ledger[0].month, 1);
        assert_eq!(run.yearly_snapshots[9].year, 10);
    }

    #[test]
    fn full_reinvestment_without_leverage_compounds_exactly() {
        // No loan, no fixed costs, 100% reinvestment with a zero threshold:
        // the corporate distributed share is 0 so no tax falls due and the
        // portfolio compounds at the plain monthly rate.
        let mut params = unleveraged_params();
        params.reinvestment_rate = 100.0;
        params.expected_return_rate = 1.0;
        params.investment_horizon_months = 24;
        let run = SimulationEngine::new(params).unwrap().run();

        let expected = 50_000.0 * 1.01f64.powi(24);
        assert_relative_eq!(run.final_results.final_wealth, expected, epsilon = 1e-6);
        assert_relative_eq!(run.final_results.final_cash_reserve, 0.0);
    }

    #[test]
    fn annual_cadence_matches_equivalent_monthly_rate() {
        let mut annual = unleveraged_params();
        annual.reinvestment_rate = 100.0;
        annual.return_cadence = ReturnCadence::Annual;
        annual.expected_return_rate = 12.682503013196972; // (1.01)^12 - 1, in percent

        let mut monthly = unleveraged_params();
        monthly.reinvestment_rate = 100.0;
        monthly.expected_return_rate = 1.0;

        let annual_run = SimulationEngine::new(annual).unwrap().run();
        let monthly_run = SimulationEngine::new(monthly).unwrap().run();
        assert_relative_eq!(
            annual_run.final_results.final_wealth,
            monthly_run.final_results.final_wealth,
            epsilon = 1e-6
        );
    }

    #[test]
    fn fixture_roi_is_positive_and_bit_stable() {
        let engine = SimulationEngine::new(fixture_params()).unwrap();
        let first = engine.run();
        let second = engine.run();
        assert!(first.final_results.final_roi > 0.0);
        assert_eq!(first, second);
    }

    #[test]
    fn threshold_below_candidate_reinvests_exactly_the_candidate() {
        let mut params = unleveraged_params();
        params.reinvestment_threshold = 100.0;
        params.investment_horizon_months = 1;
        let run = SimulationEngine::new(params).unwrap().run();

        let entry = &run.monthly_ledger[0];
        // candidate = netResult * 80% clears the 100 threshold here.
        let candidate = entry.net_result * 0.8;
        assert!(candidate >= 100.0);
        assert_relative_eq!(entry.portfolio_value, 50_000.0 + candidate, epsilon = 1e-9);
        assert_relative_eq!(
            entry.cash_reserve,
            entry.net_result - candidate,
            epsilon = 1e-9
        );
    }

    #[test]
    fn threshold_above_candidate_routes_everything_to_cash() {
        let mut params = unleveraged_params();
        params.reinvestment_threshold = 1.0e9;
        let run = SimulationEngine::new(params).unwrap().run();

        for entry in &run.monthly_ledger {
            assert_relative_eq!(entry.portfolio_value, 50_000.0);
        }
        assert!(run.final_results.final_cash_reserve > 0.0);
    }

    #[test]
    fn deficits_draw_cash_before_liquidating_portfolio() {
        // A negative return with the corporate regime produces no tax, so
        // netResult = grossReturn + nothing else on an unleveraged run.
        let mut params = unleveraged_params();
        params.expected_return_rate = -2.0;
        params.fixed_costs_per_year = 1_200.0;
        params.investment_horizon_months = 12;
        let run = SimulationEngine::new(params).unwrap().run();

        for entry in &run.monthly_ledger {
            assert!(entry.net_result < 0.0);
            assert_eq!(entry.cash_reserve, 0.0);
            assert!(entry.portfolio_value >= 0.0);
        }
        assert!(run.final_results.final_wealth < 50_000.0);
    }

    #[test]
    fn annuity_and_linear_loans_amortize_to_zero_at_term() {
        for schedule in [AmortizationType::Annuity, AmortizationType::Linear] {
            let mut params = fixture_params();
            params.amortization_type = schedule;
            let run = SimulationEngine::new(params).unwrap().run();
            let last = run.monthly_ledger.last().unwrap();
            assert!(
                last.loan_balance.abs() < 1e-6,
                "{schedule:?} left balance {}",
                last.loan_balance
            );
        }
    }

    #[test]
    fn interest_only_loan_never_amortizes() {
        let mut params = fixture_params();
        params.amortization_type = AmortizationType::InterestOnly;
        let run = SimulationEngine::new(params).unwrap().run();
        for entry in &run.monthly_ledger {
            assert_eq!(entry.principal_paid, 0.0);
            assert_eq!(entry.loan_balance, 100_000.0);
        }
    }

    #[test]
    fn loan_service_stops_after_the_term() {
        let mut params = fixture_params();
        params.amortization_type = AmortizationType::InterestOnly;
        params.loan_term_months = 60;
        let run = SimulationEngine::new(params).unwrap().run();
        assert!(run.monthly_ledger[59].interest_paid > 0.0);
        assert_eq!(run.monthly_ledger[60].interest_paid, 0.0);
    }

    #[test]
    fn wealth_tax_charges_every_twelfth_month_on_pre_flow_wealth() {
        let mut params = unleveraged_params();
        params.tax_regime = tax::default_wealth_tax_regime();
        params.investment_horizon_months = 24;
        let run = SimulationEngine::new(params).unwrap().run();

        for entry in &run.monthly_ledger {
            if entry.month % 12 != 0 {
                assert_eq!(entry.tax_paid, 0.0, "month {}", entry.month);
            }
        }

        // The month-12 charge is levied on the wealth standing after month 11
        // settled, i.e. before any of month 12's own flows.
        for assessment_month in [12usize, 24] {
            let before = &run.monthly_ledger[assessment_month - 2];
            let net_wealth = before.portfolio_value + before.cash_reserve - before.loan_balance;
            let taxable = (net_wealth - 57_000.0).max(0.0);
            assert!(taxable > 0.0);
            let expected = taxable * 6.04 / 100.0 * 36.0 / 100.0 / 12.0;
            let charged = run.monthly_ledger[assessment_month - 1].tax_paid;
            assert_relative_eq!(charged, expected, epsilon = 1e-9);
        }
    }

    #[test]
    fn zero_inflation_makes_real_equal_nominal() {
        let mut params = fixture_params();
        params.inflation_rate = 0.0;
        let run = SimulationEngine::new(params).unwrap().run();
        for snap in &run.yearly_snapshots {
            assert_eq!(snap.real_total_wealth, snap.total_wealth);
            assert_eq!(snap.real_roi, snap.roi);
        }
        assert_eq!(run.final_results.purchasing_power_loss, 0.0);
    }

    #[test]
    fn final_results_agree_with_last_snapshot_on_whole_year_horizons() {
        let run = SimulationEngine::new(fixture_params()).unwrap().run();
        let last = run.yearly_snapshots.last().unwrap();
        assert_relative_eq!(run.final_results.final_wealth, last.total_wealth);
        assert_relative_eq!(run.final_results.final_roi, last.roi);
        assert_relative_eq!(
            run.final_results.real_final_wealth,
            last.real_total_wealth,
            epsilon = 1e-9
        );
    }

    #[test]
    fn leverage_factor_reflects_loan_share() {
        let leveraged = SimulationEngine::new(fixture_params()).unwrap().run();
        assert_relative_eq!(leveraged.final_results.leverage_factor, 3.0);

        let unleveraged = SimulationEngine::new(unleveraged_params()).unwrap().run();
        assert_relative_eq!(unleveraged.final_results.leverage_factor, 1.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn balances_never_go_negative(
            return_rate in -5.0..5.0f64,
            reinvestment_rate in 0.0..=100.0f64,
            fixed_costs in 0.0..5_000.0f64,
            loan_rate in 0.0..15.0f64,
        ) {
            let mut params = fixture_params();
            params.expected_return_rate = return_rate;
            params.reinvestment_rate = reinvestment_rate;
            params.fixed_costs_per_year = fixed_costs;
            params.loan_interest_rate = loan_rate;
            let run = SimulationEngine::new(params).unwrap().run();

            for entry in &run.monthly_ledger {
                prop_assert!(entry.portfolio_value >= 0.0);
                prop_assert!(entry.cash_reserve >= 0.0);
                prop_assert!(entry.loan_balance >= 0.0);
            }
        }

        #[test]
        fn loan_balance_is_monotonically_non_increasing(
            loan_rate in 0.0..15.0f64,
            schedule_idx in 0usize..3,
        ) {
            let schedules = [
                AmortizationType::Annuity,
                AmortizationType::Linear,
                AmortizationType::InterestOnly,
            ];
            let mut params = fixture_params();
            params.loan_interest_rate = loan_rate;
            params.amortization_type = schedules[schedule_idx];
            let run = SimulationEngine::new(params).unwrap().run();

            let mut previous = 100_000.0;
            for entry in &run.monthly_ledger {
                prop_assert!(entry.loan_balance <= previous + 1e-9);
                previous = entry.loan_balance;
            }
        }

        #[test]
        fn surplus_months_conserve_the_net_result(
            return_rate in 0.5..4.0f64,
            reinvestment_rate in 0.0..=100.0f64,
            threshold in 0.0..2_000.0f64,
        ) {
            let mut params = unleveraged_params();
            params.expected_return_rate = return_rate;
            params.reinvestment_rate = reinvestment_rate;
            params.reinvestment_threshold = threshold;
            let run = SimulationEngine::new(params).unwrap().run();

            let mut portfolio = 50_000.0;
            let mut cash = 0.0;
            for entry in &run.monthly_ledger {
                let delta = (entry.portfolio_value - portfolio) + (entry.cash_reserve - cash);
                prop_assert!((delta - entry.net_result).abs() < 1e-6);
                let candidate = entry.net_result * reinvestment_rate / 100.0;
                if candidate < threshold {
                    prop_assert!((entry.portfolio_value - portfolio).abs() < 1e-9);
                }
                portfolio = entry.portfolio_value;
                cash = entry.cash_reserve;
            }
        }
    }
}
