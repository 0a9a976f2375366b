use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;
use tracing::info;

use crate::core::{
    AmortizationType, MonteCarloConfig, MonteCarloEngine, ParameterOverrides, ReturnCadence,
    ScenarioRunner, SimulationEngine, SimulationParameters, StressOutcome, TaxBracket, TaxRegime,
    WaterfallItem, WaterfallPeriod, decompose,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliTaxRegime {
    Corporate,
    ProgressiveIncome,
    WealthTax,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliReturnCadence {
    Monthly,
    Annual,
}

impl From<CliReturnCadence> for ReturnCadence {
    fn from(value: CliReturnCadence) -> Self {
        match value {
            CliReturnCadence::Monthly => ReturnCadence::Monthly,
            CliReturnCadence::Annual => ReturnCadence::Annual,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliAmortizationType {
    Annuity,
    Linear,
    InterestOnly,
}

impl From<CliAmortizationType> for AmortizationType {
    fn from(value: CliAmortizationType) -> Self {
        match value {
            CliAmortizationType::Annuity => AmortizationType::Annuity,
            CliAmortizationType::Linear => AmortizationType::Linear,
            CliAmortizationType::InterestOnly => AmortizationType::InterestOnly,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiTaxRegime {
    Corporate,
    #[serde(alias = "progressiveIncome", alias = "progressive_income")]
    ProgressiveIncome,
    #[serde(alias = "wealthTax", alias = "wealth_tax")]
    WealthTax,
}

impl From<ApiTaxRegime> for CliTaxRegime {
    fn from(value: ApiTaxRegime) -> Self {
        match value {
            ApiTaxRegime::Corporate => CliTaxRegime::Corporate,
            ApiTaxRegime::ProgressiveIncome => CliTaxRegime::ProgressiveIncome,
            ApiTaxRegime::WealthTax => CliTaxRegime::WealthTax,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiReturnCadence {
    Monthly,
    Annual,
}

impl From<ApiReturnCadence> for CliReturnCadence {
    fn from(value: ApiReturnCadence) -> Self {
        match value {
            ApiReturnCadence::Monthly => CliReturnCadence::Monthly,
            ApiReturnCadence::Annual => CliReturnCadence::Annual,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiAmortizationType {
    Annuity,
    Linear,
    #[serde(alias = "interestOnly", alias = "interest_only")]
    InterestOnly,
}

impl From<ApiAmortizationType> for CliAmortizationType {
    fn from(value: ApiAmortizationType) -> Self {
        match value {
            ApiAmortizationType::Annuity => CliAmortizationType::Annuity,
            ApiAmortizationType::Linear => CliAmortizationType::Linear,
            ApiAmortizationType::InterestOnly => CliAmortizationType::InterestOnly,
        }
    }
}

/// Sparse API request: every absent field falls back to the CLI default.
#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct SimulatePayload {
    starting_capital: Option<f64>,
    loan_principal: Option<f64>,
    loan_interest_rate: Option<f64>,
    investment_horizon_months: Option<u32>,
    loan_term_months: Option<u32>,
    return_cadence: Option<ApiReturnCadence>,
    expected_return_rate: Option<f64>,
    amortization_type: Option<ApiAmortizationType>,
    reinvestment_rate: Option<f64>,
    fixed_costs_per_year: Option<f64>,
    reinvestment_threshold: Option<f64>,
    inflation_rate: Option<f64>,

    tax_regime: Option<ApiTaxRegime>,
    corporate_low_rate: Option<f64>,
    corporate_standard_rate: Option<f64>,
    corporate_low_rate_threshold: Option<f64>,
    income_flat_rate: Option<f64>,
    interest_deductible_fraction: Option<f64>,
    deemed_return_rate: Option<f64>,
    wealth_tax_rate: Option<f64>,
    wealth_tax_exemption: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenarioPayload {
    #[serde(flatten)]
    baseline: SimulatePayload,
    overrides: ParameterOverrides,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct MonteCarloPayload {
    #[serde(flatten)]
    baseline: SimulatePayload,
    simulations: Option<u32>,
    return_volatility: Option<f64>,
    rate_volatility: Option<f64>,
    cost_volatility: Option<f64>,
    seed: Option<u64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct WaterfallPayload {
    #[serde(flatten)]
    baseline: SimulatePayload,
    /// 1-based year; absent means the whole horizon.
    year: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "levsim",
    about = "Leveraged-investment simulator (amortized loan + tax regimes + Monte Carlo)"
)]
struct Cli {
    #[arg(long, default_value_t = 50_000.0)]
    starting_capital: f64,
    #[arg(long, default_value_t = 100_000.0)]
    loan_principal: f64,
    #[arg(
        long,
        default_value_t = 8.0,
        help = "Annual loan interest rate in percent, e.g. 8"
    )]
    loan_interest_rate: f64,
    #[arg(long, default_value_t = 120)]
    investment_horizon_months: u32,
    #[arg(long, default_value_t = 120)]
    loan_term_months: u32,
    #[arg(long, value_enum, default_value_t = CliReturnCadence::Monthly)]
    return_cadence: CliReturnCadence,
    #[arg(
        long,
        default_value_t = 3.0,
        help = "Expected return in percent per cadence period"
    )]
    expected_return_rate: f64,
    #[arg(long, value_enum, default_value_t = CliAmortizationType::Annuity)]
    amortization_type: CliAmortizationType,
    #[arg(
        long,
        default_value_t = 80.0,
        help = "Share of a positive net result reinvested, in percent"
    )]
    reinvestment_rate: f64,
    #[arg(long, default_value_t = 0.0)]
    fixed_costs_per_year: f64,
    #[arg(
        long,
        default_value_t = 0.0,
        help = "Minimum candidate amount required before any reinvestment happens"
    )]
    reinvestment_threshold: f64,
    #[arg(long, default_value_t = 2.0)]
    inflation_rate: f64,

    #[arg(long, value_enum, default_value_t = CliTaxRegime::Corporate)]
    tax_regime: CliTaxRegime,
    #[arg(long, default_value_t = 19.0)]
    corporate_low_rate: f64,
    #[arg(long, default_value_t = 25.8)]
    corporate_standard_rate: f64,
    #[arg(long, default_value_t = 200_000.0, help = "Annual profit threshold")]
    corporate_low_rate_threshold: f64,
    #[arg(
        long,
        default_value_t = 36.97,
        help = "Flat per-period income tax rate in percent"
    )]
    income_flat_rate: f64,
    #[arg(
        long,
        default_value_t = 0.5,
        help = "Fraction (0..1) of interest paid that is deductible"
    )]
    interest_deductible_fraction: f64,
    #[arg(long, default_value_t = 6.04)]
    deemed_return_rate: f64,
    #[arg(long, default_value_t = 36.0)]
    wealth_tax_rate: f64,
    #[arg(long, default_value_t = 57_000.0)]
    wealth_tax_exemption: f64,
}

/// Assembles and validates the full parameter set from CLI values. The
/// progressive and deemed-return bracket tables come from the frozen defaults;
/// only their scalar rates are overridable at this surface.
fn build_params(cli: Cli) -> Result<SimulationParameters, String> {
    let tax_regime = match cli.tax_regime {
        CliTaxRegime::Corporate => TaxRegime::Corporate {
            low_rate: cli.corporate_low_rate,
            standard_rate: cli.corporate_standard_rate,
            low_rate_threshold: cli.corporate_low_rate_threshold,
        },
        CliTaxRegime::ProgressiveIncome => TaxRegime::ProgressiveIncome {
            brackets: default_progressive_brackets(),
            interest_deductible_fraction: cli.interest_deductible_fraction,
            flat_rate: cli.income_flat_rate,
        },
        CliTaxRegime::WealthTax => TaxRegime::WealthTax {
            deemed_return_rate: cli.deemed_return_rate,
            tax_rate: cli.wealth_tax_rate,
            exemption_threshold: cli.wealth_tax_exemption,
            deemed_return_brackets: default_deemed_return_brackets(),
        },
    };

    let params = SimulationParameters {
        starting_capital: cli.starting_capital,
        loan_principal: cli.loan_principal,
        loan_interest_rate: cli.loan_interest_rate,
        investment_horizon_months: cli.investment_horizon_months,
        loan_term_months: cli.loan_term_months,
        return_cadence: cli.return_cadence.into(),
        expected_return_rate: cli.expected_return_rate,
        amortization_type: cli.amortization_type.into(),
        reinvestment_rate: cli.reinvestment_rate,
        fixed_costs_per_year: cli.fixed_costs_per_year,
        reinvestment_threshold: cli.reinvestment_threshold,
        inflation_rate: cli.inflation_rate,
        tax_regime,
    };
    params.validate().map_err(|e| e.to_string())?;
    Ok(params)
}

fn default_progressive_brackets() -> Vec<TaxBracket> {
    match crate::core::default_progressive_income_regime() {
        TaxRegime::ProgressiveIncome { brackets, .. } => brackets,
        _ => unreachable!("default progressive regime has the progressive variant"),
    }
}

fn default_deemed_return_brackets() -> Vec<TaxBracket> {
    match crate::core::default_wealth_tax_regime() {
        TaxRegime::WealthTax {
            deemed_return_brackets,
            ..
        } => deemed_return_brackets,
        _ => unreachable!("default wealth regime has the wealth-tax variant"),
    }
}

fn params_from_payload(payload: SimulatePayload) -> Result<SimulationParameters, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.starting_capital {
        cli.starting_capital = v;
    }
    if let Some(v) = payload.loan_principal {
        cli.loan_principal = v;
    }
    if let Some(v) = payload.loan_interest_rate {
        cli.loan_interest_rate = v;
    }
    if let Some(v) = payload.investment_horizon_months {
        cli.investment_horizon_months = v;
    }
    if let Some(v) = payload.loan_term_months {
        cli.loan_term_months = v;
    }
    if let Some(v) = payload.return_cadence {
        cli.return_cadence = CliReturnCadence::from(v);
    }
    if let Some(v) = payload.expected_return_rate {
        cli.expected_return_rate = v;
    }
    if let Some(v) = payload.amortization_type {
        cli.amortization_type = CliAmortizationType::from(v);
    }
    if let Some(v) = payload.reinvestment_rate {
        cli.reinvestment_rate = v;
    }
    if let Some(v) = payload.fixed_costs_per_year {
        cli.fixed_costs_per_year = v;
    }
    if let Some(v) = payload.reinvestment_threshold {
        cli.reinvestment_threshold = v;
    }
    if let Some(v) = payload.inflation_rate {
        cli.inflation_rate = v;
    }
    if let Some(v) = payload.tax_regime {
        cli.tax_regime = CliTaxRegime::from(v);
    }
    if let Some(v) = payload.corporate_low_rate {
        cli.corporate_low_rate = v;
    }
    if let Some(v) = payload.corporate_standard_rate {
        cli.corporate_standard_rate = v;
    }
    if let Some(v) = payload.corporate_low_rate_threshold {
        cli.corporate_low_rate_threshold = v;
    }
    if let Some(v) = payload.income_flat_rate {
        cli.income_flat_rate = v;
    }
    if let Some(v) = payload.interest_deductible_fraction {
        cli.interest_deductible_fraction = v;
    }
    if let Some(v) = payload.deemed_return_rate {
        cli.deemed_return_rate = v;
    }
    if let Some(v) = payload.wealth_tax_rate {
        cli.wealth_tax_rate = v;
    }
    if let Some(v) = payload.wealth_tax_exemption {
        cli.wealth_tax_exemption = v;
    }

    build_params(cli)
}

fn default_cli_for_api() -> Cli {
    Cli {
        starting_capital: 50_000.0,
        loan_principal: 100_000.0,
        loan_interest_rate: 8.0,
        investment_horizon_months: 120,
        loan_term_months: 120,
        return_cadence: CliReturnCadence::Monthly,
        expected_return_rate: 3.0,
        amortization_type: CliAmortizationType::Annuity,
        reinvestment_rate: 80.0,
        fixed_costs_per_year: 0.0,
        reinvestment_threshold: 0.0,
        inflation_rate: 2.0,
        tax_regime: CliTaxRegime::Corporate,
        corporate_low_rate: 19.0,
        corporate_standard_rate: 25.8,
        corporate_low_rate_threshold: 200_000.0,
        income_flat_rate: 36.97,
        interest_deductible_fraction: 0.5,
        deemed_return_rate: 6.04,
        wealth_tax_rate: 36.0,
        wealth_tax_exemption: 57_000.0,
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioResponse {
    baseline_roi: f64,
    roi: f64,
    impact: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct StressResponse {
    baseline_roi: f64,
    outcomes: Vec<StressOutcome>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct WaterfallResponse {
    year: Option<u32>,
    items: Vec<WaterfallItem>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/simulate",
            get(simulate_get_handler).post(simulate_post_handler),
        )
        .route("/api/scenario", post(scenario_handler))
        .route("/api/stress", post(stress_handler))
        .route("/api/montecarlo", post(monte_carlo_handler))
        .route("/api/waterfall", post(waterfall_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    info!(%addr, "levsim HTTP API listening");
    println!("levsim HTTP API listening on http://{addr}");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn simulate_get_handler(Query(payload): Query<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

async fn simulate_post_handler(Json(payload): Json<SimulatePayload>) -> Response {
    simulate_handler_impl(payload)
}

fn simulate_handler_impl(payload: SimulatePayload) -> Response {
    let params = match params_from_payload(payload) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let engine = match SimulationEngine::new(params) {
        Ok(engine) => engine,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    json_response(StatusCode::OK, engine.run())
}

async fn scenario_handler(Json(payload): Json<ScenarioPayload>) -> Response {
    let params = match params_from_payload(payload.baseline) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let runner = match ScenarioRunner::new(params) {
        Ok(runner) => runner,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match runner.calculate_scenario(&payload.overrides) {
        Ok(roi) => json_response(
            StatusCode::OK,
            ScenarioResponse {
                baseline_roi: runner.baseline_roi(),
                roi,
                impact: roi - runner.baseline_roi(),
            },
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn stress_handler(Json(payload): Json<SimulatePayload>) -> Response {
    let params = match params_from_payload(payload) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let runner = match ScenarioRunner::new(params) {
        Ok(runner) => runner,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match runner.run_stress_test() {
        Ok(outcomes) => json_response(
            StatusCode::OK,
            StressResponse {
                baseline_roi: runner.baseline_roi(),
                outcomes,
            },
        ),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn monte_carlo_handler(Json(payload): Json<MonteCarloPayload>) -> Response {
    let params = match params_from_payload(payload.baseline) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let config = MonteCarloConfig {
        simulations: payload.simulations.unwrap_or(1_000),
        return_volatility: payload.return_volatility.unwrap_or(0.01),
        rate_volatility: payload.rate_volatility.unwrap_or(0.005),
        cost_volatility: payload.cost_volatility.unwrap_or(0.1),
        seed: payload.seed.unwrap_or(42),
    };
    let engine = match MonteCarloEngine::new(params) {
        Ok(engine) => engine,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    match engine.run(&config) {
        Ok(summary) => json_response(StatusCode::OK, summary),
        Err(e) => error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    }
}

async fn waterfall_handler(Json(payload): Json<WaterfallPayload>) -> Response {
    let params = match params_from_payload(payload.baseline) {
        Ok(params) => params,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };
    let engine = match SimulationEngine::new(params.clone()) {
        Ok(engine) => engine,
        Err(e) => return error_response(StatusCode::BAD_REQUEST, &e.to_string()),
    };
    let run = engine.run();
    let period = payload
        .year
        .map_or(WaterfallPeriod::WholeHorizon, WaterfallPeriod::Year);
    let items = decompose(&params, &run, period);
    json_response(
        StatusCode::OK,
        WaterfallResponse {
            year: payload.year,
            items,
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    if let Ok(value) = "no-store".parse() {
        response.headers_mut().insert(header::CACHE_CONTROL, value);
    }
    response
}

fn error_response(status: StatusCode, msg: &str) -> Response {
    json_response(
        status,
        ErrorResponse {
            error: msg.to_string(),
        },
    )
}
