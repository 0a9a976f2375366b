//! Cashflow waterfall decomposition of a settled run.
//!
//! Reconciles gross assets (portfolio + cash) over a period: the start
//! balance plus every signed flow lands exactly on the end balance, because
//! monthly settlement conserves the net result.

use serde::Serialize;

use super::types::{MonthlyLedgerEntry, SimulationParameters, SimulationRun};

/// Period selector: the whole horizon, or one 1-based calendar year of it.
#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum WaterfallPeriod {
    WholeHorizon,
    Year(u32),
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum WaterfallKind {
    Start,
    Flow,
    /// End balance; reported but excluded from the running cumulative.
    Total,
}

#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallItem {
    pub label: &'static str,
    pub kind: WaterfallKind,
    pub value: f64,
    pub cumulative: f64,
    /// |value| relative to the period's end balance; 0 when that is 0.
    pub impact_pct: f64,
}

/// Ordered waterfall for the requested period. An out-of-range year yields an
/// empty breakdown rather than an error.
pub fn decompose(
    params: &SimulationParameters,
    run: &SimulationRun,
    period: WaterfallPeriod,
) -> Vec<WaterfallItem> {
    let ledger = &run.monthly_ledger;
    let initial_assets = params.starting_capital + params.loan_principal;

    let (start_balance, financing, entries) = match period {
        WaterfallPeriod::WholeHorizon => (
            params.starting_capital,
            Some(params.loan_principal),
            ledger.as_slice(),
        ),
        WaterfallPeriod::Year(year) => {
            let Some(first_month) = year
                .checked_sub(1)
                .and_then(|offset| offset.checked_mul(12))
                .filter(|start| (*start as usize) < ledger.len())
            else {
                return Vec::new();
            };
            let first = first_month as usize;
            let last = (first + 12).min(ledger.len());
            let start = if first == 0 {
                initial_assets
            } else {
                assets_after(&ledger[first - 1])
            };
            (start, None, &ledger[first..last])
        }
    };

    let mut gross_return = 0.0;
    let mut tax = 0.0;
    let mut interest = 0.0;
    let mut principal = 0.0;
    let mut fixed_costs = 0.0;
    for entry in entries {
        gross_return += entry.gross_return;
        tax += entry.tax_paid;
        interest += entry.interest_paid;
        principal += entry.principal_paid;
        fixed_costs += entry.fixed_costs;
    }
    let end_balance = entries.last().map_or(start_balance, assets_after);

    let mut builder = WaterfallBuilder::new(start_balance, end_balance);
    builder.push("start balance", WaterfallKind::Start, start_balance);
    if let Some(loan) = financing {
        builder.push("loan financing", WaterfallKind::Flow, loan);
    }
    builder.push("gross return", WaterfallKind::Flow, gross_return);
    builder.push("tax", WaterfallKind::Flow, -tax);
    builder.push("interest", WaterfallKind::Flow, -interest);
    builder.push("principal repayment", WaterfallKind::Flow, -principal);
    builder.push("fixed costs", WaterfallKind::Flow, -fixed_costs);
    builder.push("end balance", WaterfallKind::Total, end_balance);
    builder.items
}

fn assets_after(entry: &MonthlyLedgerEntry) -> f64 {
    entry.portfolio_value + entry.cash_reserve
}

struct WaterfallBuilder {
    items: Vec<WaterfallItem>,
    cumulative: f64,
    end_balance: f64,
}

impl WaterfallBuilder {
    fn new(start_balance: f64, end_balance: f64) -> Self {
        Self {
            items: Vec::with_capacity(8),
            cumulative: start_balance,
            end_balance,
        }
    }

    fn push(&mut self, label: &'static str, kind: WaterfallKind, value: f64) {
        match kind {
            WaterfallKind::Start => self.cumulative = value,
            WaterfallKind::Flow => self.cumulative += value,
            WaterfallKind::Total => {}
        }
        let impact_pct = if self.end_balance == 0.0 {
            0.0
        } else {
            (value.abs() / self.end_balance) * 100.0
        };
        self.items.push(WaterfallItem {
            label,
            kind,
            value,
            cumulative: self.cumulative,
            impact_pct,
        });
    }
}
