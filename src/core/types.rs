use serde::Serialize;

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum OptionType {
    Iso,
    Nso,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum PreferredType {
    NonParticipating,
    Participating,
}

#[derive(Copy, Clone, Debug, Eq, PartialEq)]
pub enum CompanyStage {
    PreSeed,
    Seed,
    SeriesA,
    SeriesB,
    SeriesCPlus,
}

#[derive(Debug, Clone)]
pub struct GrantInputs {
    pub number_of_options: f64,
    pub strike_price: f64,
    pub current_fmv: f64,
    pub company_valuation: f64,
    pub ownership_percent: f64,
    pub option_type: OptionType,
    pub federal_tax_bracket: f64,
    pub annual_wages: Option<f64>,
}

#[derive(Debug, Clone)]
pub struct FundingRound {
    pub id: u32,
    pub name: String,
    pub dilution_percent: f64,
    pub amount_raised: f64,
    pub liquidation_multiple: f64,
    pub preferred_type: PreferredType,
    pub seniority: u32,
}

#[derive(Debug, Clone)]
pub struct PreferredRound {
    pub id: u32,
    pub name: String,
    pub invested_amount: f64,
    pub liquidation_multiple: f64,
    pub preferred_type: PreferredType,
    pub ownership_percent: f64,
    pub seniority: u32,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExitScenario {
    pub name: String,
    pub multiple: f64,
    pub probability: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScenarioValidation {
    pub valid: bool,
    pub total: f64,
    pub difference: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DilutionResult {
    pub ownership_after: f64,
    pub total_dilution_percent: f64,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(
    tag = "optionType",
    rename_all = "camelCase",
    rename_all_fields = "camelCase"
)]
pub enum TaxBreakdown {
    Iso {
        amt_income: f64,
        estimated_amt: f64,
    },
    Nso {
        ordinary_income: f64,
        ordinary_income_tax: f64,
        fica_tax: f64,
        ss_capped: bool,
    },
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TaxCalculation {
    pub spread: f64,
    pub spread_total: f64,
    pub estimated_tax_at_exercise: f64,
    #[serde(flatten)]
    pub breakdown: TaxBreakdown,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RoundPayout {
    pub id: u32,
    pub name: String,
    pub payout: f64,
    pub converted_to_common: bool,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WaterfallResult {
    pub exit_value: f64,
    pub preferred_payout: f64,
    pub common_pool: f64,
    pub employee_ownership_of_common: f64,
    pub employee_payout: f64,
    pub round_payouts: Vec<RoundPayout>,
}

#[derive(Debug, Clone, Copy, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityCostPoint {
    pub year: u32,
    pub alternative_value: f64,
    pub options_expected_value: f64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OpportunityCostResult {
    pub points: Vec<OpportunityCostPoint>,
    pub break_even_year: Option<u32>,
    pub final_alternative_value: f64,
    pub final_options_expected_value: f64,
}
