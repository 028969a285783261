mod engine;
mod tax;
mod types;

pub use engine::{HORIZON_AGE, project, project_with_tables};
pub use tax::{
    FEDERAL_BRACKETS_MARRIED_2024, FEDERAL_BRACKETS_SINGLE_2024, FilingStatus,
    MASSACHUSETTS_BRACKETS, PreTaxSolution, STANDARD_DEDUCTION_MARRIED_2024,
    STANDARD_DEDUCTION_SINGLE_2024, TaxBracket, TaxBreakdown, TaxTables, Taxpayer,
    progressive_tax, solve_pre_tax_income, solve_pre_tax_income_detailed, total_tax,
};
pub use types::{
    EditableField, InputParameters, YearInputs, YearOverrides, YearlySnapshot, apply_edit,
};
