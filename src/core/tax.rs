use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct TaxBracket {
    pub upper_limit: f64,
    pub rate: f64,
}

impl TaxBracket {
    pub const fn new(upper_limit: f64, rate: f64) -> Self {
        Self { upper_limit, rate }
    }
}

#[derive(Copy, Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FilingStatus {
    Single,
    #[default]
    Married,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Taxpayer {
    pub gross_income: f64,
    #[serde(default)]
    pub filing_status: FilingStatus,
    #[serde(default)]
    pub itemized_deductions: Option<f64>,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxBreakdown {
    pub federal_tax: f64,
    pub state_tax: f64,
    pub total_tax: f64,
    pub net_income: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PreTaxSolution {
    pub gross_income: f64,
    pub iterations: u32,
    pub converged: bool,
}

pub const FEDERAL_BRACKETS_SINGLE_2024: [TaxBracket; 7] = [
    TaxBracket::new(11_600.0, 0.10),
    TaxBracket::new(47_150.0, 0.12),
    TaxBracket::new(100_525.0, 0.22),
    TaxBracket::new(191_950.0, 0.24),
    TaxBracket::new(243_725.0, 0.32),
    TaxBracket::new(609_350.0, 0.35),
    TaxBracket::new(f64::INFINITY, 0.37),
];

pub const FEDERAL_BRACKETS_MARRIED_2024: [TaxBracket; 7] = [
    TaxBracket::new(23_200.0, 0.10),
    TaxBracket::new(94_300.0, 0.12),
    TaxBracket::new(201_050.0, 0.22),
    TaxBracket::new(383_900.0, 0.24),
    TaxBracket::new(487_450.0, 0.32),
    TaxBracket::new(731_200.0, 0.35),
    TaxBracket::new(f64::INFINITY, 0.37),
];

pub const STANDARD_DEDUCTION_SINGLE_2024: f64 = 14_600.0;
pub const STANDARD_DEDUCTION_MARRIED_2024: f64 = 29_200.0;

pub const MASSACHUSETTS_BRACKETS: [TaxBracket; 1] = [TaxBracket::new(f64::INFINITY, 0.05)];

const SOLVER_MAX_ITERATIONS: u32 = 100;
const SOLVER_TOLERANCE: f64 = 0.01;
const SOLVER_UPPER_BOUND_BUFFER: f64 = 1.5;

#[derive(Debug, Clone, PartialEq)]
pub struct TaxTables {
    pub federal_single: Vec<TaxBracket>,
    pub federal_married: Vec<TaxBracket>,
    pub standard_deduction_single: f64,
    pub standard_deduction_married: f64,
    pub state: Vec<TaxBracket>,
}

impl Default for TaxTables {
    fn default() -> Self {
        Self {
            federal_single: FEDERAL_BRACKETS_SINGLE_2024.to_vec(),
            federal_married: FEDERAL_BRACKETS_MARRIED_2024.to_vec(),
            standard_deduction_single: STANDARD_DEDUCTION_SINGLE_2024,
            standard_deduction_married: STANDARD_DEDUCTION_MARRIED_2024,
            state: MASSACHUSETTS_BRACKETS.to_vec(),
        }
    }
}

impl TaxTables {
    pub fn federal_brackets(&self, status: FilingStatus) -> &[TaxBracket] {
        match status {
            FilingStatus::Single => &self.federal_single,
            FilingStatus::Married => &self.federal_married,
        }
    }

    pub fn standard_deduction(&self, status: FilingStatus) -> f64 {
        match status {
            FilingStatus::Single => self.standard_deduction_single,
            FilingStatus::Married => self.standard_deduction_married,
        }
    }

    /// Itemized deductions only win when they exceed the standard deduction.
    pub fn deduction_for(&self, taxpayer: &Taxpayer) -> f64 {
        let standard = self.standard_deduction(taxpayer.filing_status);
        match taxpayer.itemized_deductions {
            Some(itemized) if itemized > standard => itemized,
            _ => standard,
        }
    }
}

// Callers clamp negative income to zero. Limits must be strictly increasing.
pub fn progressive_tax(taxable_income: f64, brackets: &[TaxBracket]) -> f64 {
    let mut tax = 0.0;
    let mut previous_limit = 0.0;

    for bracket in brackets {
        if taxable_income > bracket.upper_limit {
            tax += (bracket.upper_limit - previous_limit) * bracket.rate;
        } else {
            tax += (taxable_income - previous_limit) * bracket.rate;
            break;
        }
        previous_limit = bracket.upper_limit;
    }

    tax
}

/// Federal plus state tax for one taxpayer. The state schedule applies no
/// deduction. All outputs are rounded to cents.
pub fn total_tax(taxpayer: &Taxpayer, tables: &TaxTables) -> TaxBreakdown {
    let deduction = tables.deduction_for(taxpayer);

    let federal_taxable = (taxpayer.gross_income - deduction).max(0.0);
    let federal_tax = progressive_tax(
        federal_taxable,
        tables.federal_brackets(taxpayer.filing_status),
    );

    let state_deduction = 0.0;
    let state_taxable = (taxpayer.gross_income - state_deduction).max(0.0);
    let state_tax = progressive_tax(state_taxable, &tables.state);

    let net_income = taxpayer.gross_income - federal_tax - state_tax;

    TaxBreakdown {
        federal_tax: round_cents(federal_tax),
        state_tax: round_cents(state_tax),
        total_tax: round_cents(federal_tax + state_tax),
        net_income: round_cents(net_income),
    }
}

pub fn solve_pre_tax_income(
    taxpayer: &Taxpayer,
    after_tax_target: f64,
    tables: &TaxTables,
    brackets: &[TaxBracket],
) -> f64 {
    solve_pre_tax_income_detailed(taxpayer, after_tax_target, tables, brackets).gross_income
}

/// Bisection on gross income. Tax is never negative so the target itself is
/// a lower bound; the upper bound grosses the target up at the top marginal
/// rate with extra headroom for progressivity. Hitting the iteration ceiling
/// is not a failure: the last midpoint is returned unconverged.
pub fn solve_pre_tax_income_detailed(
    taxpayer: &Taxpayer,
    after_tax_target: f64,
    tables: &TaxTables,
    brackets: &[TaxBracket],
) -> PreTaxSolution {
    let deduction = tables.deduction_for(taxpayer);
    let max_rate = brackets
        .iter()
        .map(|b| b.rate)
        .fold(f64::NEG_INFINITY, f64::max);

    let mut lo = after_tax_target;
    let mut hi = (after_tax_target + deduction) / (1.0 - max_rate) * SOLVER_UPPER_BOUND_BUFFER;
    let mut best_guess = (lo + hi) * 0.5;

    for it in 1..=SOLVER_MAX_ITERATIONS {
        let mid = (lo + hi) * 0.5;
        let taxable = (mid - deduction).max(0.0);
        let after_tax = mid - progressive_tax(taxable, brackets);
        let difference = after_tax - after_tax_target;

        if difference.abs() < SOLVER_TOLERANCE {
            return PreTaxSolution {
                gross_income: round_cents(mid),
                iterations: it,
                converged: true,
            };
        }

        if difference > 0.0 {
            hi = mid;
        } else {
            lo = mid;
        }
        best_guess = mid;
    }

    log::debug!(
        "pre-tax solver hit {SOLVER_MAX_ITERATIONS} iterations for target {after_tax_target}; returning best estimate {best_guess}"
    );
    PreTaxSolution {
        gross_income: round_cents(best_guess),
        iterations: SOLVER_MAX_ITERATIONS,
        converged: false,
    }
}

fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}
