use super::types::AmortizationType;

/// Interest/principal split for one loan period.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LoanPayment {
    pub interest: f64,
    pub principal: f64,
}

impl LoanPayment {
    pub const NONE: LoanPayment = LoanPayment {
        interest: 0.0,
        principal: 0.0,
    };

    pub fn total(self) -> f64 {
        self.interest + self.principal
    }
}

/// Computes the monthly debt service for one loan. Constructed once per run
/// from the validated parameters; holds no mutable state.
#[derive(Copy, Clone, Debug)]
pub struct AmortizationCalculator {
    principal: f64,
    annual_rate: f64,
    term_months: u32,
}

impl AmortizationCalculator {
    /// `annual_rate` is a percentage, e.g. 8.0 for 8% per year.
    pub fn new(principal: f64, annual_rate: f64, term_months: u32) -> Self {
        Self {
            principal,
            annual_rate,
            term_months,
        }
    }

    pub fn monthly_rate(&self) -> f64 {
        self.annual_rate / 12.0 / 100.0
    }

    /// Fixed total payment of the annuity schedule. Falls back to straight
    /// principal division when the rate is zero (the annuity formula would
    /// divide by zero there).
    pub fn annuity_payment(&self) -> f64 {
        if self.term_months == 0 || self.principal <= 0.0 {
            return 0.0;
        }
        let n = self.term_months as f64;
        let i = self.monthly_rate();
        if i == 0.0 {
            return self.principal / n;
        }
        self.principal * i / (1.0 - (1.0 + i).powf(-n))
    }

    /// Fixed principal portion of the linear schedule; interest is computed
    /// separately each month on the remaining balance.
    pub fn linear_principal(&self) -> f64 {
        if self.term_months == 0 || self.principal <= 0.0 {
            return 0.0;
        }
        self.principal / self.term_months as f64
    }

    /// Splits this month's payment for the given schedule against the current
    /// outstanding balance. The principal portion is capped at the balance so
    /// the loan can never be overpaid into negative territory.
    pub fn split(&self, schedule: AmortizationType, balance: f64) -> LoanPayment {
        if balance <= 0.0 {
            return LoanPayment::NONE;
        }
        let interest = balance * self.monthly_rate();
        let principal = match schedule {
            AmortizationType::Annuity => (self.annuity_payment() - interest).max(0.0),
            AmortizationType::Linear => self.linear_principal(),
            // Interest-only never touches the principal; any balloon
            // repayment at horizon end is outside the model.
            AmortizationType::InterestOnly => 0.0,
        };
        LoanPayment {
            interest,
            principal: principal.min(balance),
        }
    }
}
