use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// Household parameters for one projection run.
///
/// Rates are decimal fractions (`0.03` is 3%). Social Security amounts are
/// monthly. `cash_threshold` is a number of years of annual need.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputParameters {
    #[serde(default, deserialize_with = "lenient::age")]
    pub age1: u32,
    #[serde(default, deserialize_with = "lenient::age")]
    pub age2: u32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub starting_portfolio: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub inflation_rate: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub ss1_amount: f64,
    #[serde(default, deserialize_with = "lenient::age")]
    pub ss1_start_age: u32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub ss2_amount: f64,
    #[serde(default, deserialize_with = "lenient::age")]
    pub ss2_start_age: u32,
    #[serde(default, deserialize_with = "lenient::number")]
    pub cola_percentage: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub stock_return_rate: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub cash_threshold: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub base_annual_expense: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub base_rental_income: f64,
    #[serde(default, deserialize_with = "lenient::number")]
    pub rental_income_growth_rate: f64,
}

impl Default for InputParameters {
    fn default() -> Self {
        Self {
            age1: 55,
            age2: 56,
            starting_portfolio: 1_000_000.0,
            inflation_rate: 0.03,
            ss1_amount: 3_000.0,
            ss1_start_age: 65,
            ss2_amount: 2_500.0,
            ss2_start_age: 65,
            cola_percentage: 0.02,
            stock_return_rate: 0.065,
            cash_threshold: 2.0,
            base_annual_expense: 50_000.0,
            base_rental_income: 0.0,
            rental_income_growth_rate: 0.02,
        }
    }
}

/// Per-year overrides. `annual_expense` and `rental_income` replace the base
/// value and still receive that year's growth multiplier; the rest are
/// literal dollar amounts for the year.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YearInputs {
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub annual_expense: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub rental_income: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub fixed_expense: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub tuition: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub one_off_expenses: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub income1: Option<f64>,
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        deserialize_with = "lenient::optional_number"
    )]
    pub income2: Option<f64>,
}

pub type YearOverrides = BTreeMap<u32, YearInputs>;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum EditableField {
    FixedExpense,
    Tuition,
    OneOffExpenses,
    Income1,
    Income2,
}

impl EditableField {
    pub const ALL: [EditableField; 5] = [
        EditableField::FixedExpense,
        EditableField::Tuition,
        EditableField::OneOffExpenses,
        EditableField::Income1,
        EditableField::Income2,
    ];

    pub fn name(self) -> &'static str {
        match self {
            EditableField::FixedExpense => "fixedExpense",
            EditableField::Tuition => "tuition",
            EditableField::OneOffExpenses => "oneOffExpenses",
            EditableField::Income1 => "income1",
            EditableField::Income2 => "income2",
        }
    }

    fn slot(self, inputs: &mut YearInputs) -> &mut Option<f64> {
        match self {
            EditableField::FixedExpense => &mut inputs.fixed_expense,
            EditableField::Tuition => &mut inputs.tuition,
            EditableField::OneOffExpenses => &mut inputs.one_off_expenses,
            EditableField::Income1 => &mut inputs.income1,
            EditableField::Income2 => &mut inputs.income2,
        }
    }
}

impl fmt::Display for EditableField {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for EditableField {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().replace(['-', '_'], "").to_ascii_lowercase();
        EditableField::ALL
            .into_iter()
            .find(|field| field.name().to_ascii_lowercase() == normalized)
            .ok_or_else(|| {
                let names = EditableField::ALL.map(EditableField::name).join(", ");
                format!("unknown editable field '{s}' (expected one of: {names})")
            })
    }
}

/// Writes one grid cell into the override map, creating the year's record if
/// needed. Other fields of that year are left as they were.
pub fn apply_edit(overrides: &mut YearOverrides, year: u32, field: EditableField, value: f64) {
    let inputs = overrides.entry(year).or_default();
    *field.slot(inputs) = Some(value);
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct YearlySnapshot {
    pub year: u32,
    pub age1: u32,
    pub age2: u32,
    pub annual_expense: f64,
    pub fixed_expense: f64,
    pub tuition: f64,
    pub one_off_expenses: f64,
    pub total_expenses: f64,
    pub rental_income: f64,
    pub income1: f64,
    pub income2: f64,
    pub ss1: f64,
    pub ss2: f64,
    pub total_tax: f64,
    pub effective_tax_rate: f64,
    pub total_income: f64,
    pub annual_need: f64,
    pub cash: f64,
    pub stock: f64,
    pub net_worth: f64,
    pub inflation_adjusted: f64,
}

/// Coercions for hand-edited or browser-produced JSON where a number may be
/// missing, `null`, or a string.
mod lenient {
    use serde::{Deserialize, Deserializer};
    use serde_json::Value;

    pub fn number<'de, D>(deserializer: D) -> Result<f64, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(value.as_ref().map(coerce).unwrap_or(0.0))
    }

    pub fn optional_number<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Option::<Value>::deserialize(deserializer)?;
        Ok(match value {
            None | Some(Value::Null) => None,
            Some(other) => Some(coerce(&other)),
        })
    }

    pub fn age<'de, D>(deserializer: D) -> Result<u32, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw = number(deserializer)?;
        // `as` saturates and truncates toward zero.
        Ok(if raw > 0.0 { raw as u32 } else { 0 })
    }

    fn coerce(value: &Value) -> f64 {
        match value {
            Value::Number(n) => n.as_f64().unwrap_or(0.0),
            Value::String(s) => s
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|v| v.is_finite())
                .unwrap_or(0.0),
            _ => 0.0,
        }
    }
}
