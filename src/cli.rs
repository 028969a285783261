use std::io::Write;
use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};

use crate::core::{
    EditableField, FilingStatus, TaxTables, Taxpayer, apply_edit, project,
    solve_pre_tax_income_detailed, total_tax,
};
use crate::persistence::{DEFAULT_FILE_NAME, SavedState};

#[derive(Parser, Debug)]
#[command(
    name = "bucketsim",
    about = "Two-bucket retirement projection (cash reserve + growth assets, Social Security, tax)"
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Serve the JSON API
    Serve {
        #[arg(long, default_value_t = 8080)]
        port: u16,
    },
    /// Run a projection and print yearly snapshots as JSON
    Project {
        /// Saved state to load; defaults are used when omitted
        #[arg(long)]
        input: Option<PathBuf>,
        /// Grid edit as YEAR:FIELD=VALUE, e.g. 3:fixedExpense=10000
        #[arg(long = "edit", value_parser = parse_grid_edit)]
        edits: Vec<GridEdit>,
        /// Write the (edited) state back out
        #[arg(long)]
        save: Option<PathBuf>,
        #[arg(long)]
        compact: bool,
    },
    /// Write the default state to a file
    Init {
        #[arg(default_value = DEFAULT_FILE_NAME)]
        path: PathBuf,
    },
    /// Federal + Massachusetts tax on a gross income
    Tax {
        #[arg(long)]
        gross_income: f64,
        #[arg(long, value_enum, default_value_t = CliFilingStatus::Married)]
        filing_status: CliFilingStatus,
        #[arg(long)]
        itemized_deductions: Option<f64>,
    },
    /// Gross income needed for a federal after-tax target
    Pretax {
        #[arg(long)]
        after_tax: f64,
        #[arg(long, value_enum, default_value_t = CliFilingStatus::Married)]
        filing_status: CliFilingStatus,
        #[arg(long)]
        itemized_deductions: Option<f64>,
    },
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
pub enum CliFilingStatus {
    Single,
    Married,
}

impl From<CliFilingStatus> for FilingStatus {
    fn from(value: CliFilingStatus) -> Self {
        match value {
            CliFilingStatus::Single => FilingStatus::Single,
            CliFilingStatus::Married => FilingStatus::Married,
        }
    }
}

#[derive(Copy, Clone, Debug, PartialEq)]
pub struct GridEdit {
    pub year: u32,
    pub field: EditableField,
    pub value: f64,
}

fn parse_grid_edit(raw: &str) -> Result<GridEdit, String> {
    let (year, rest) = raw
        .split_once(':')
        .ok_or_else(|| format!("expected YEAR:FIELD=VALUE, got '{raw}'"))?;
    let (field, value) = rest
        .split_once('=')
        .ok_or_else(|| format!("expected YEAR:FIELD=VALUE, got '{raw}'"))?;

    let year = year
        .trim()
        .parse::<u32>()
        .map_err(|e| format!("invalid year '{year}': {e}"))?;
    let field = field.parse::<EditableField>()?;
    let value = value
        .trim()
        .parse::<f64>()
        .map_err(|e| format!("invalid value '{value}': {e}"))?;
    if !value.is_finite() {
        return Err(format!("value must be finite, got '{value}'"));
    }

    Ok(GridEdit { year, field, value })
}

pub async fn run(cli: Cli) -> Result<()> {
    match cli.command {
        Command::Serve { port } => crate::api::run_http_server(port)
            .await
            .with_context(|| format!("server on port {port} failed")),
        Command::Project {
            input,
            edits,
            save,
            compact,
        } => run_project(input, &edits, save, compact),
        Command::Init { path } => SavedState::default()
            .save(&path)
            .with_context(|| format!("failed to write defaults to {}", path.display())),
        Command::Tax {
            gross_income,
            filing_status,
            itemized_deductions,
        } => {
            let taxpayer = Taxpayer {
                gross_income,
                filing_status: filing_status.into(),
                itemized_deductions,
            };
            let breakdown = total_tax(&taxpayer, &TaxTables::default());
            print_json(&breakdown, false)
        }
        Command::Pretax {
            after_tax,
            filing_status,
            itemized_deductions,
        } => {
            let status = FilingStatus::from(filing_status);
            let taxpayer = Taxpayer {
                gross_income: 0.0,
                filing_status: status,
                itemized_deductions,
            };
            let tables = TaxTables::default();
            let solution = solve_pre_tax_income_detailed(
                &taxpayer,
                after_tax,
                &tables,
                tables.federal_brackets(status),
            );
            print_json(&solution, false)
        }
    }
}

fn run_project(
    input: Option<PathBuf>,
    edits: &[GridEdit],
    save: Option<PathBuf>,
    compact: bool,
) -> Result<()> {
    let mut state = match input {
        Some(path) => SavedState::load(&path).with_context(|| {
            format!(
                "failed to load {}; please check the file format",
                path.display()
            )
        })?,
        None => SavedState::default(),
    };

    for edit in edits {
        apply_edit(&mut state.yearly_inputs, edit.year, edit.field, edit.value);
    }

    let years = project(&state.input_params, &state.yearly_inputs);
    log::info!("projected {} year(s)", years.len());
    print_json(&years, compact)?;

    if let Some(path) = save {
        state.save(&path)?;
    }
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<()> {
    let json = if compact {
        serde_json::to_string(value)?
    } else {
        serde_json::to_string_pretty(value)?
    };
    let mut stdout = std::io::stdout().lock();
    writeln!(stdout, "{json}").context("failed to write to stdout")?;
    Ok(())
}
