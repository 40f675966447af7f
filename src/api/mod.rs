use axum::{
    Router,
    extract::{Json, Query},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
    routing::get,
};
use clap::{Parser, ValueEnum};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tokio::net::TcpListener;

use crate::core::{
    CompanyStage, DilutionResult, ExitScenario, FundingRound, GrantInputs, OpportunityCostResult,
    OptionType, PreferredType, SolveConfig, TaxCalculation, WaterfallResult, apply_dilution,
    break_even_multiple, calculate_grant_taxes, calculate_waterfall, current_value,
    derive_company_stage, exercise_cost, expected_value, opportunity_cost_series, paper_gain,
    paper_gain_percent, preferred_rounds, roi, solve_exit_for_payout, stage_adjusted_scenarios,
    validate_scenarios, valuation_from_ownership,
};

#[derive(Copy, Clone, Debug, Eq, PartialEq, ValueEnum)]
enum CliOptionType {
    Iso,
    Nso,
}

impl From<CliOptionType> for OptionType {
    fn from(value: CliOptionType) -> Self {
        match value {
            CliOptionType::Iso => OptionType::Iso,
            CliOptionType::Nso => OptionType::Nso,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiOptionType {
    #[serde(alias = "ISO")]
    Iso,
    #[serde(alias = "NSO")]
    Nso,
}

impl From<ApiOptionType> for CliOptionType {
    fn from(value: ApiOptionType) -> Self {
        match value {
            ApiOptionType::Iso => CliOptionType::Iso,
            ApiOptionType::Nso => CliOptionType::Nso,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "kebab-case")]
enum ApiPreferredType {
    #[serde(alias = "nonParticipating", alias = "non_participating")]
    NonParticipating,
    Participating,
}

impl From<ApiPreferredType> for PreferredType {
    fn from(value: ApiPreferredType) -> Self {
        match value {
            ApiPreferredType::NonParticipating => PreferredType::NonParticipating,
            ApiPreferredType::Participating => PreferredType::Participating,
        }
    }
}

#[derive(Copy, Clone, Debug, Eq, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
enum ApiCompanyStage {
    #[serde(alias = "preSeed", alias = "pre_seed", alias = "preseed")]
    PreSeed,
    Seed,
    #[serde(alias = "seriesA", alias = "series_a")]
    SeriesA,
    #[serde(alias = "seriesB", alias = "series_b")]
    SeriesB,
    #[serde(alias = "seriesCPlus", alias = "series_c_plus", alias = "series-c+")]
    SeriesCPlus,
}

impl From<ApiCompanyStage> for CompanyStage {
    fn from(value: ApiCompanyStage) -> Self {
        match value {
            ApiCompanyStage::PreSeed => CompanyStage::PreSeed,
            ApiCompanyStage::Seed => CompanyStage::Seed,
            ApiCompanyStage::SeriesA => CompanyStage::SeriesA,
            ApiCompanyStage::SeriesB => CompanyStage::SeriesB,
            ApiCompanyStage::SeriesCPlus => CompanyStage::SeriesCPlus,
        }
    }
}

impl From<CompanyStage> for ApiCompanyStage {
    fn from(value: CompanyStage) -> Self {
        match value {
            CompanyStage::PreSeed => ApiCompanyStage::PreSeed,
            CompanyStage::Seed => ApiCompanyStage::Seed,
            CompanyStage::SeriesA => ApiCompanyStage::SeriesA,
            CompanyStage::SeriesB => ApiCompanyStage::SeriesB,
            CompanyStage::SeriesCPlus => ApiCompanyStage::SeriesCPlus,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct RoundPayload {
    id: Option<u32>,
    name: String,
    dilution_percent: f64,
    amount_raised: f64,
    liquidation_multiple: f64,
    preferred_type: ApiPreferredType,
    seniority: Option<u32>,
}

impl Default for RoundPayload {
    fn default() -> Self {
        Self {
            id: None,
            name: String::new(),
            dilution_percent: 0.0,
            amount_raised: 0.0,
            liquidation_multiple: 1.0,
            preferred_type: ApiPreferredType::NonParticipating,
            seniority: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScenarioPayload {
    name: String,
    multiple: f64,
    probability: f64,
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct EvaluatePayload {
    number_of_options: Option<f64>,
    strike_price: Option<f64>,
    current_fmv: Option<f64>,
    company_valuation: Option<f64>,
    ownership_percent: Option<f64>,
    option_type: Option<ApiOptionType>,
    federal_tax_bracket: Option<f64>,
    annual_wages: Option<f64>,

    rounds: Option<Vec<RoundPayload>>,
    scenarios: Option<Vec<ScenarioPayload>>,

    exit_valuation: Option<f64>,
    target_payout: Option<f64>,

    alternative_principal: Option<f64>,
    alternative_return_rate: Option<f64>,
    time_horizon_years: Option<u32>,
}

#[derive(Parser, Debug)]
#[command(
    name = "upside",
    about = "Startup stock option outcome calculator (dilution, taxes, exit waterfall, expected value)"
)]
struct Cli {
    #[arg(long, default_value_t = 10_000.0)]
    number_of_options: f64,
    #[arg(long, default_value_t = 1.0, help = "Strike price per share")]
    strike_price: f64,
    #[arg(long, default_value_t = 5.0, help = "Current fair market value per share")]
    current_fmv: f64,
    #[arg(
        long,
        help = "Company valuation; derived from ownership and FMV when omitted"
    )]
    company_valuation: Option<f64>,
    #[arg(
        long,
        default_value_t = 0.1,
        help = "Ownership as percent of fully diluted shares"
    )]
    ownership_percent: f64,
    #[arg(long, value_enum, default_value_t = CliOptionType::Iso)]
    option_type: CliOptionType,
    #[arg(
        long,
        default_value_t = 32.0,
        help = "Federal marginal tax bracket in percent, applied to NSO ordinary income"
    )]
    federal_tax_bracket: f64,
    #[arg(
        long,
        help = "Annual wages counted against the Social Security cap; full FICA assumed when omitted"
    )]
    annual_wages: Option<f64>,
    #[arg(
        long,
        help = "Exit valuation for the waterfall; defaults to the company valuation"
    )]
    exit_valuation: Option<f64>,
    #[arg(
        long,
        help = "Solve for the exit valuation that yields this employee payout"
    )]
    target_payout: Option<f64>,
    #[arg(
        long,
        help = "Alternative investment principal; defaults to the exercise cost"
    )]
    alternative_principal: Option<f64>,
    #[arg(
        long,
        default_value_t = 7.0,
        help = "Alternative investment annual return in percent"
    )]
    alternative_return_rate: f64,
    #[arg(long, default_value_t = 10, help = "Opportunity cost horizon in years")]
    time_horizon_years: u32,
}

#[derive(Debug, Clone, Copy)]
struct EvaluateOptions {
    exit_valuation: Option<f64>,
    target_payout: Option<f64>,
    alternative_principal: Option<f64>,
    alternative_return_rate: f64,
    time_horizon_years: u32,
}

#[derive(Debug)]
struct ApiRequest {
    grant: GrantInputs,
    rounds: Vec<FundingRound>,
    scenarios: Option<Vec<ExitScenario>>,
    options: EvaluateOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SummaryResponse {
    exercise_cost: f64,
    current_value: f64,
    paper_gain: f64,
    paper_gain_percent: f64,
    break_even_multiple: f64,
    roi_percent: f64,
    company_valuation: f64,
    ownership_after_dilution: f64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TargetExitResponse {
    target_payout: f64,
    exit_valuation: f64,
    converged: bool,
    capped: bool,
    iterations: u32,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct EvaluateResponse {
    summary: SummaryResponse,
    dilution: DilutionResult,
    taxes: TaxCalculation,
    stage: ApiCompanyStage,
    scenarios: Vec<ExitScenario>,
    expected_value: f64,
    waterfall: WaterfallResult,
    target_exit: Option<TargetExitResponse>,
    opportunity_cost: OpportunityCostResult,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScenariosResponse {
    stage: ApiCompanyStage,
    scenarios: Vec<ExitScenario>,
}

#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: String,
}

fn build_grant(cli: &Cli) -> Result<GrantInputs, String> {
    if !cli.number_of_options.is_finite() || cli.number_of_options < 0.0 {
        return Err("--number-of-options must be >= 0".to_string());
    }

    if !cli.strike_price.is_finite() || cli.strike_price < 0.0 {
        return Err("--strike-price must be >= 0".to_string());
    }

    if !cli.current_fmv.is_finite() || cli.current_fmv < 0.0 {
        return Err("--current-fmv must be >= 0".to_string());
    }

    if !(0.0..=100.0).contains(&cli.ownership_percent) {
        return Err("--ownership-percent must be between 0 and 100".to_string());
    }

    if !(0.0..=100.0).contains(&cli.federal_tax_bracket) {
        return Err("--federal-tax-bracket must be between 0 and 100".to_string());
    }

    if let Some(wages) = cli.annual_wages {
        if !wages.is_finite() || wages < 0.0 {
            return Err("--annual-wages must be >= 0".to_string());
        }
    }

    if let Some(valuation) = cli.company_valuation {
        if !valuation.is_finite() || valuation < 0.0 {
            return Err("--company-valuation must be >= 0".to_string());
        }
    }

    let company_valuation = match cli.company_valuation {
        Some(valuation) => valuation,
        None => valuation_from_ownership(
            cli.number_of_options,
            cli.current_fmv,
            cli.ownership_percent,
        ),
    };

    Ok(GrantInputs {
        number_of_options: cli.number_of_options,
        strike_price: cli.strike_price,
        current_fmv: cli.current_fmv,
        company_valuation,
        ownership_percent: cli.ownership_percent,
        option_type: cli.option_type.into(),
        federal_tax_bracket: cli.federal_tax_bracket / 100.0,
        annual_wages: cli.annual_wages,
    })
}

fn build_options(cli: &Cli) -> Result<EvaluateOptions, String> {
    if let Some(exit) = cli.exit_valuation {
        if !exit.is_finite() || exit < 0.0 {
            return Err("--exit-valuation must be >= 0".to_string());
        }
    }

    if let Some(target) = cli.target_payout {
        if !target.is_finite() || target < 0.0 {
            return Err("--target-payout must be >= 0".to_string());
        }
    }

    if let Some(principal) = cli.alternative_principal {
        if !principal.is_finite() || principal < 0.0 {
            return Err("--alternative-principal must be >= 0".to_string());
        }
    }

    if !cli.alternative_return_rate.is_finite() || cli.alternative_return_rate <= -100.0 {
        return Err("--alternative-return-rate must be > -100".to_string());
    }

    if cli.time_horizon_years > 100 {
        return Err("--time-horizon-years must be <= 100".to_string());
    }

    Ok(EvaluateOptions {
        exit_valuation: cli.exit_valuation,
        target_payout: cli.target_payout,
        alternative_principal: cli.alternative_principal,
        alternative_return_rate: cli.alternative_return_rate / 100.0,
        time_horizon_years: cli.time_horizon_years,
    })
}

fn build_rounds(payloads: &[RoundPayload]) -> Result<Vec<FundingRound>, String> {
    let mut rounds = Vec::with_capacity(payloads.len());

    for (index, payload) in payloads.iter().enumerate() {
        let name = if payload.name.is_empty() {
            format!("Round {}", index + 1)
        } else {
            payload.name.clone()
        };

        if !(0.0..=100.0).contains(&payload.dilution_percent) {
            return Err(format!("{name}: dilutionPercent must be between 0 and 100"));
        }
        if !payload.amount_raised.is_finite() || payload.amount_raised < 0.0 {
            return Err(format!("{name}: amountRaised must be >= 0"));
        }
        if !payload.liquidation_multiple.is_finite() || payload.liquidation_multiple < 1.0 {
            return Err(format!("{name}: liquidationMultiple must be >= 1"));
        }

        rounds.push(FundingRound {
            id: payload.id.unwrap_or(index as u32 + 1),
            name,
            dilution_percent: payload.dilution_percent,
            amount_raised: payload.amount_raised,
            liquidation_multiple: payload.liquidation_multiple,
            preferred_type: payload.preferred_type.into(),
            // List order doubles as seniority unless the caller says otherwise.
            seniority: payload.seniority.unwrap_or(index as u32),
        });
    }

    Ok(rounds)
}

fn build_scenarios(payloads: &[ScenarioPayload]) -> Result<Vec<ExitScenario>, String> {
    let mut scenarios = Vec::with_capacity(payloads.len());

    for payload in payloads {
        if !payload.multiple.is_finite() || payload.multiple < 0.0 {
            return Err(format!("scenario {}: multiple must be >= 0", payload.name));
        }
        if !(0.0..=1.0).contains(&payload.probability) {
            return Err(format!(
                "scenario {}: probability must be between 0 and 1",
                payload.name
            ));
        }

        scenarios.push(ExitScenario {
            name: payload.name.clone(),
            multiple: payload.multiple,
            probability: payload.probability,
        });
    }

    let validation = validate_scenarios(&scenarios);
    if !validation.valid {
        return Err(format!(
            "scenario probabilities must sum to 1.0 (total {:.6}, difference {:+.6})",
            validation.total, validation.difference
        ));
    }

    Ok(scenarios)
}

pub async fn run_http_server(port: u16) -> std::io::Result<()> {
    let addr = SocketAddr::from(([0, 0, 0, 0], port));
    let app = Router::new()
        .route(
            "/api/evaluate",
            get(evaluate_get_handler).post(evaluate_post_handler),
        )
        .route("/api/scenarios", get(scenarios_handler))
        .fallback(not_found_handler);

    let listener = TcpListener::bind(addr).await?;
    println!("upside HTTP API listening on http://{addr}");
    println!("Local access: http://127.0.0.1:{port}/api/evaluate");

    axum::serve(listener, app).await
}

async fn not_found_handler() -> Response {
    error_response(StatusCode::NOT_FOUND, "Not found")
}

async fn evaluate_get_handler(Query(payload): Query<EvaluatePayload>) -> Response {
    evaluate_handler_impl(payload).await
}

async fn evaluate_post_handler(Json(payload): Json<EvaluatePayload>) -> Response {
    evaluate_handler_impl(payload).await
}

async fn evaluate_handler_impl(payload: EvaluatePayload) -> Response {
    let request = match api_request_from_payload(payload) {
        Ok(request) => request,
        Err(msg) => return error_response(StatusCode::BAD_REQUEST, &msg),
    };

    json_response(StatusCode::OK, build_evaluate_response(&request))
}

#[derive(Debug, Default, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct ScenariosQuery {
    stage: Option<ApiCompanyStage>,
}

async fn scenarios_handler(Query(query): Query<ScenariosQuery>) -> Response {
    let stage = query
        .stage
        .map(CompanyStage::from)
        .unwrap_or(CompanyStage::Seed);

    json_response(
        StatusCode::OK,
        ScenariosResponse {
            stage: stage.into(),
            scenarios: stage_adjusted_scenarios(stage),
        },
    )
}

fn json_response<T: Serialize>(status: StatusCode, body: T) -> Response {
    let mut response = (status, Json(body)).into_response();
    response.headers_mut().insert(
        header::CACHE_CONTROL,
        "no-store".parse().expect("valid header"),
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

#[cfg(test)]
fn api_request_from_json(json: &str) -> Result<ApiRequest, String> {
    let payload = serde_json::from_str::<EvaluatePayload>(json)
        .map_err(|e| format!("Invalid API JSON payload: {e}"))?;
    api_request_from_payload(payload)
}

fn api_request_from_payload(payload: EvaluatePayload) -> Result<ApiRequest, String> {
    let mut cli = default_cli_for_api();

    if let Some(v) = payload.number_of_options {
        cli.number_of_options = v;
    }
    if let Some(v) = payload.strike_price {
        cli.strike_price = v;
    }
    if let Some(v) = payload.current_fmv {
        cli.current_fmv = v;
    }
    if let Some(v) = payload.company_valuation {
        cli.company_valuation = Some(v);
    }
    if let Some(v) = payload.ownership_percent {
        cli.ownership_percent = v;
    }
    if let Some(v) = payload.option_type {
        cli.option_type = v.into();
    }
    if let Some(v) = payload.federal_tax_bracket {
        cli.federal_tax_bracket = v;
    }
    if let Some(v) = payload.annual_wages {
        cli.annual_wages = Some(v);
    }

    if let Some(v) = payload.exit_valuation {
        cli.exit_valuation = Some(v);
    }
    if let Some(v) = payload.target_payout {
        cli.target_payout = Some(v);
    }
    if let Some(v) = payload.alternative_principal {
        cli.alternative_principal = Some(v);
    }
    if let Some(v) = payload.alternative_return_rate {
        cli.alternative_return_rate = v;
    }
    if let Some(v) = payload.time_horizon_years {
        cli.time_horizon_years = v;
    }

    let rounds = build_rounds(payload.rounds.as_deref().unwrap_or(&[]))?;
    let scenarios = match &payload.scenarios {
        Some(entries) => Some(build_scenarios(entries)?),
        None => None,
    };

    let grant = build_grant(&cli)?;
    let options = build_options(&cli)?;

    Ok(ApiRequest {
        grant,
        rounds,
        scenarios,
        options,
    })
}

fn default_cli_for_api() -> Cli {
    Cli {
        number_of_options: 10_000.0,
        strike_price: 1.0,
        current_fmv: 5.0,
        company_valuation: None,
        ownership_percent: 0.1,
        option_type: CliOptionType::Iso,
        federal_tax_bracket: 32.0,
        annual_wages: None,
        exit_valuation: None,
        target_payout: None,
        alternative_principal: None,
        alternative_return_rate: 7.0,
        time_horizon_years: 10,
    }
}

fn build_evaluate_response(request: &ApiRequest) -> EvaluateResponse {
    let grant = &request.grant;

    let cost = exercise_cost(grant.number_of_options, grant.strike_price);
    let value = current_value(grant.number_of_options, grant.current_fmv);
    let gain = paper_gain(grant.number_of_options, grant.strike_price, grant.current_fmv);

    let dilution = apply_dilution(grant.ownership_percent, &request.rounds);
    let diluted_ownership = dilution.ownership_after;

    let taxes = calculate_grant_taxes(grant);
    let stage = derive_company_stage(&request.rounds);
    let scenarios = request
        .scenarios
        .clone()
        .unwrap_or_else(|| stage_adjusted_scenarios(stage));

    let expected = expected_value(diluted_ownership, grant.company_valuation, cost, &scenarios);

    let preferred = preferred_rounds(&request.rounds);
    let exit_valuation = request
        .options
        .exit_valuation
        .unwrap_or(grant.company_valuation);
    let waterfall = calculate_waterfall(exit_valuation, &preferred, diluted_ownership);

    let target_exit = request.options.target_payout.and_then(|target| {
        solve_exit_for_payout(target, &preferred, diluted_ownership, SolveConfig::default())
            .ok()
            .map(|result| TargetExitResponse {
                target_payout: result.target_payout,
                exit_valuation: result.exit_valuation,
                converged: result.converged,
                capped: result.capped,
                iterations: result.iterations.len() as u32,
            })
    });

    let principal = request.options.alternative_principal.unwrap_or(cost);
    let opportunity_cost = opportunity_cost_series(
        principal,
        request.options.alternative_return_rate,
        request.options.time_horizon_years,
        diluted_ownership,
        grant.company_valuation,
        cost,
        &scenarios,
    );

    EvaluateResponse {
        summary: SummaryResponse {
            exercise_cost: cost,
            current_value: value,
            paper_gain: gain,
            paper_gain_percent: paper_gain_percent(
                grant.number_of_options,
                grant.strike_price,
                grant.current_fmv,
            ),
            break_even_multiple: break_even_multiple(grant.strike_price, grant.current_fmv),
            roi_percent: roi(gain, cost),
            company_valuation: grant.company_valuation,
            ownership_after_dilution: diluted_ownership,
        },
        dilution,
        taxes,
        stage: stage.into(),
        scenarios,
        expected_value: expected,
        waterfall,
        target_exit,
        opportunity_cost,
    }
}
