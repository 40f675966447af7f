mod engine;
mod solver;
mod types;

pub use engine::{
    apply_dilution, break_even_multiple, calculate_grant_taxes, calculate_taxes,
    calculate_waterfall, current_value, default_scenarios, derive_company_stage, exercise_cost,
    exit_value_at, expected_value, opportunity_cost_series, paper_gain, paper_gain_percent,
    preferred_rounds, roi, stage_adjusted_scenarios, validate_scenarios, valuation_from_ownership,
};
pub use solver::{
    SolveConfig, SolveIteration, SolveResult, exit_for_target_payout, solve_exit_for_payout,
};
pub use types::{
    CompanyStage, DilutionResult, ExitScenario, FundingRound, GrantInputs, OpportunityCostPoint,
    OpportunityCostResult, OptionType, PreferredRound, PreferredType, RoundPayout,
    ScenarioValidation, TaxBreakdown, TaxCalculation, WaterfallResult,
};
