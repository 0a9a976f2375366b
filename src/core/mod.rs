mod amortization;
mod engine;
mod monte_carlo;
mod scenario;
mod tax;
mod types;
mod waterfall;

pub use amortization::{AmortizationCalculator, LoanPayment};
pub use engine::SimulationEngine;
pub use monte_carlo::{MonteCarloConfig, MonteCarloEngine, MonteCarloSummary, TrialOutcome};
pub use scenario::{ParameterOverrides, ScenarioRunner, StressOutcome};
pub use tax::{
    TaxContext, TaxEngine, bracket_tax, default_corporate_regime,
    default_progressive_income_regime, default_wealth_tax_regime, estimate_progressive_annual,
    estimate_wealth_tax_annual,
};
pub use types::{
    AmortizationType, FinalResults, MonthlyLedgerEntry, ParameterError, ReturnCadence,
    SimulationParameters, SimulationRun, TaxBracket, TaxRegime, YearlySnapshot,
};
pub use waterfall::{WaterfallItem, WaterfallKind, WaterfallPeriod, decompose};
