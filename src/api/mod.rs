use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    FilingStatus, InputParameters, PreTaxSolution, TaxBreakdown, TaxTables, Taxpayer,
    YearOverrides, YearlySnapshot, project, solve_pre_tax_income_detailed, total_tax,
};
use crate::persistence::SavedState;

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ParamsPayload {
    age1: Option<u32>,
    age2: Option<u32>,
    starting_portfolio: Option<f64>,
    inflation_rate: Option<f64>,
    ss1_amount: Option<f64>,
    ss1_start_age: Option<u32>,
    ss2_amount: Option<f64>,
    ss2_start_age: Option<u32>,
    cola_percentage: Option<f64>,
    stock_return_rate: Option<f64>,
    cash_threshold: Option<f64>,
    base_annual_expense: Option<f64>,
    base_rental_income: Option<f64>,
    rental_income_growth_rate: Option<f64>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ProjectPayload {
    input_params: ParamsPayload,
    yearly_inputs: YearOverrides,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PreTaxPayload {
    after_tax_income: f64,
    #[serde(default)]
    filing_status: FilingStatus,
    #[serde(default)]
    itemized_deductions: Option<f64>,
}

#[derive(Debug)]
struct ProjectRequest {
    params: InputParameters,
    overrides: YearOverrides,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProjectResponse {
    years: Vec<YearlySnapshot>,
    final_net_worth: Option<f64>,
    final_inflation_adjusted: Option<f64>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_params(payload: ParamsPayload) -> Result<InputParameters, String> {
    let defaults = InputParameters::default();
    let params = InputParameters {
        age1: payload.age1.unwrap_or(defaults.age1),
        age2: payload.age2.unwrap_or(defaults.age2),
        starting_portfolio: payload
            .starting_portfolio
            .unwrap_or(defaults.starting_portfolio),
        inflation_rate: payload.inflation_rate.unwrap_or(defaults.inflation_rate),
        ss1_amount: payload.ss1_amount.unwrap_or(defaults.ss1_amount),
        ss1_start_age: payload.ss1_start_age.unwrap_or(defaults.ss1_start_age),
        ss2_amount: payload.ss2_amount.unwrap_or(defaults.ss2_amount),
        ss2_start_age: payload.ss2_start_age.unwrap_or(defaults.ss2_start_age),
        cola_percentage: payload.cola_percentage.unwrap_or(defaults.cola_percentage),
        stock_return_rate: payload
            .stock_return_rate
            .unwrap_or(defaults.stock_return_rate),
        cash_threshold: payload.cash_threshold.unwrap_or(defaults.cash_threshold),
        base_annual_expense: payload
            .base_annual_expense
            .unwrap_or(defaults.base_annual_expense),
        base_rental_income: payload
            .base_rental_income
            .unwrap_or(defaults.base_rental_income),
        rental_income_growth_rate: payload
            .rental_income_growth_rate
            .unwrap_or(defaults.rental_income_growth_rate),
    };
    validate_params(&params)?;
    Ok(params)
}

const MAX_AGE: u32 = 130;

fn validate_params(params: &InputParameters) -> Result<(), String> {
    for (name, age) in [
        ("age1", params.age1),
        ("age2", params.age2),
        ("ss1StartAge", params.ss1_start_age),
        ("ss2StartAge", params.ss2_start_age),
    ] {
        if age > MAX_AGE {
            return Err(format!("{name} must be at most {MAX_AGE}"));
        }
    }

    for (name, value) in [
        ("startingPortfolio", params.starting_portfolio),
        ("ss1Amount", params.ss1_amount),
        ("ss2Amount", params.ss2_amount),
        ("cashThreshold", params.cash_threshold),
        ("baseAnnualExpense", params.base_annual_expense),
        ("baseRentalIncome", params.base_rental_income),
    ] {
        if !value.is_finite() || value < 0.0 {
            return Err(format!("{name} must be a finite number >= 0"));
        }
    }

    for (name, rate) in [
        ("inflationRate", params.inflation_rate),
        ("colaPercentage", params.cola_percentage),
        ("stockReturnRate", params.stock_return_rate),
        ("rentalIncomeGrowthRate", params.rental_income_growth_rate),
    ] {
        if !rate.is_finite() || rate <= -1.0 {
            return Err(format!("{name} must be a finite rate > -1"));
        }
    }

    Ok(())
}

fn validate_overrides(overrides: &YearOverrides) -> Result<(), String> {
    for (year, inputs) in overrides {
        for (name, value) in [
            ("annualExpense", inputs.annual_expense),
            ("rentalIncome", inputs.rental_income),
            ("fixedExpense", inputs.fixed_expense),
            ("tuition", inputs.tuition),
            ("oneOffExpenses", inputs.one_off_expenses),
            ("income1", inputs.income1),
            ("income2", inputs.income2),
        ] {
            if value.is_some_and(|v| !v.is_finite()) {
                return Err(format!("yearlyInputs[{year}].{name} must be finite"));
            }
        }
    }
    Ok(())
}

fn project_request_from_payload(payload: ProjectPayload) -> Result<ProjectRequest, String> {
    let params = build_params(payload.input_params)?;
    validate_overrides(&payload.yearly_inputs)?;
    Ok(ProjectRequest {
        params,
        overrides: payload.yearly_inputs,
    })
}

#[cfg(test)]
fn project_request_from_json(json: &str) -> Result<ProjectRequest, String> {
    let payload = serde_json::from_str::<ProjectPayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    project_request_from_payload(payload)
}

fn build_project_response(years: Vec<YearlySnapshot>) -> ProjectResponse {
    let last = years.last();
    ProjectResponse {
        final_net_worth: last.map(|y| y.net_worth),
        final_inflation_adjusted: last.map(|y| y.inflation_adjusted),
        years,
    }
}

fn pre_tax_solution(payload: &PreTaxPayload) -> Result<PreTaxSolution, String> {
    if !payload.after_tax_income.is_finite() || payload.after_tax_income < 0.0 {
        return Err("afterTaxIncome must be a finite number >= 0".to_string());
    }
    let tables = TaxTables::default();
    let taxpayer = Taxpayer {
        gross_income: 0.0,
        filing_status: payload.filing_status,
        itemized_deductions: payload.itemized_deductions,
    };
    Ok(solve_pre_tax_income_detailed(
        &taxpayer,
        payload.after_tax_income,
        &tables,
        tables.federal_brackets(payload.filing_status),
    ))
}

fn tax_breakdown(taxpayer: &Taxpayer) -> Result<TaxBreakdown, String> {
    if !taxpayer.gross_income.is_finite() || taxpayer.gross_income < 0.0 {
        return Err("grossIncome must be a finite number >= 0".to_string());
    }
    Ok(total_tax(taxpayer, &TaxTables::default()))
}

pub fn router() -> Router {
    Router::new()
        .route("/api/defaults", get(defaults_handler))
        .route(
            "/api/project",
            get(project_get_handler).post(project_post_handler),
        )
        .route("/api/tax", post(tax_handler))
        .route("/api/pretax", post(pretax_handler))
        .fallback(not_found_handler)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let listener = TcpListener::bind(addr).await?;
    log::info!("projection API listening on http://{addr}");
    log::info!("local access: http://127.0.0.1:{port}/api/defaults");

    axum::serve(listener, router()).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn defaults_handler() -> Response {
    json_response(StatusCode::OK, SavedState::default())
}

async fn project_get_handler(Query(params): Query<ParamsPayload>) -> Response {
    project_handler_impl(ProjectPayload {
        input_params: params,
        yearly_inputs: YearOverrides::new(),
    })
}

async fn project_post_handler(Json(payload): Json<ProjectPayload>) -> Response {
    project_handler_impl(payload)
}

fn project_handler_impl(payload: ProjectPayload) -> Response {
    let request = match project_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => {
            log::debug!("rejected projection request: {msg}");
            return error_response(StatusCode::BAD_REQUEST, &msg);
        }
    };

    let years = project(&request.params, &request.overrides);
    log::info!(
        "projected {} year(s) with {} override year(s)",
        years.len(),
        request.overrides.len()
    );
    json_response(StatusCode::OK, build_project_response(years))
}

async fn tax_handler(Json(taxpayer): Json<Taxpayer>) -> Response {
    match tax_breakdown(&taxpayer) {
        Ok(breakdown) => json_response(StatusCode::OK, breakdown),
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

async fn pretax_handler(Json(payload): Json<PreTaxPayload>) -> Response {
    match pre_tax_solution(&payload) {
        Ok(solution) => {
            if !solution.converged {
                log::debug!(
                    "pre-tax solve for {} did not converge",
                    payload.after_tax_income
                );
            }
            json_response(StatusCode::OK, solution)
        }
        Err(msg) => error_response(StatusCode::BAD_REQUEST, &msg),
    }
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        header::HeaderValue::from_static("no-store"),
    );
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
