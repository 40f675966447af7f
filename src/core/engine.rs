use super::types::{
    CompanyStage, DilutionResult, ExitScenario, FundingRound, GrantInputs, OpportunityCostPoint,
    OpportunityCostResult, OptionType, PreferredRound, PreferredType, RoundPayout,
    ScenarioValidation, TaxBreakdown, TaxCalculation, WaterfallResult,
};

const AMT_RATE: f64 = 0.28;
const MEDICARE_RATE: f64 = 0.0145;
const SOCIAL_SECURITY_RATE: f64 = 0.062;
const SOCIAL_SECURITY_WAGE_CAP: f64 = 176_100.0;

const SCENARIO_SUM_TOLERANCE: f64 = 1e-6;
const RENORMALIZE_DRIFT: f64 = 0.001;

const BASE_FAILURE_PROBABILITY: f64 = 0.70;
const UNICORN_BOOST_SHARE: f64 = 0.1;
const SUCCESS_BOOST_SHARE: f64 = 0.225;

const FIRST_EXIT_YEAR: u32 = 3;
const EXIT_RAMP_YEARS: f64 = 8.0;

pub fn exercise_cost(number_of_options: f64, strike_price: f64) -> f64 {
    number_of_options * strike_price
}

pub fn current_value(number_of_options: f64, current_fmv: f64) -> f64 {
    number_of_options * current_fmv
}

pub fn paper_gain(number_of_options: f64, strike_price: f64, current_fmv: f64) -> f64 {
    current_value(number_of_options, current_fmv) - exercise_cost(number_of_options, strike_price)
}

pub fn paper_gain_percent(number_of_options: f64, strike_price: f64, current_fmv: f64) -> f64 {
    let cost = exercise_cost(number_of_options, strike_price);
    if cost == 0.0 {
        return 0.0;
    }
    paper_gain(number_of_options, strike_price, current_fmv) / cost * 100.0
}

pub fn break_even_multiple(strike_price: f64, current_fmv: f64) -> f64 {
    if current_fmv == 0.0 {
        return f64::INFINITY;
    }
    strike_price / current_fmv
}

pub fn roi(profit: f64, cost: f64) -> f64 {
    if cost == 0.0 {
        return if profit > 0.0 { f64::INFINITY } else { 0.0 };
    }
    profit / cost * 100.0
}

pub fn valuation_from_ownership(
    number_of_options: f64,
    current_fmv: f64,
    ownership_percent: f64,
) -> f64 {
    if ownership_percent <= 0.0 || number_of_options <= 0.0 {
        return 0.0;
    }
    number_of_options * current_fmv / (ownership_percent / 100.0)
}

pub fn apply_dilution(initial_ownership_percent: f64, rounds: &[FundingRound]) -> DilutionResult {
    let retained: f64 = rounds
        .iter()
        .map(|round| 1.0 - round.dilution_percent / 100.0)
        .product();

    DilutionResult {
        ownership_after: initial_ownership_percent * retained,
        total_dilution_percent: (1.0 - retained) * 100.0,
    }
}

pub fn calculate_taxes(
    number_of_options: f64,
    strike_price: f64,
    exercise_fmv: f64,
    option_type: OptionType,
    federal_tax_bracket: f64,
    annual_wages: Option<f64>,
) -> TaxCalculation {
    let spread = (exercise_fmv - strike_price).max(0.0);
    let spread_total = spread * number_of_options;

    match option_type {
        OptionType::Iso => {
            let estimated_amt = spread_total * AMT_RATE;
            TaxCalculation {
                spread,
                spread_total,
                estimated_tax_at_exercise: estimated_amt,
                breakdown: TaxBreakdown::Iso {
                    amt_income: spread_total,
                    estimated_amt,
                },
            }
        }
        OptionType::Nso => {
            let ordinary_income_tax = spread_total * federal_tax_bracket;
            let (fica_tax, ss_capped) = fica_on_spread(spread_total, annual_wages);
            TaxCalculation {
                spread,
                spread_total,
                estimated_tax_at_exercise: ordinary_income_tax + fica_tax,
                breakdown: TaxBreakdown::Nso {
                    ordinary_income: spread_total,
                    ordinary_income_tax,
                    fica_tax,
                    ss_capped,
                },
            }
        }
    }
}

fn fica_on_spread(spread_total: f64, annual_wages: Option<f64>) -> (f64, bool) {
    let Some(wages) = annual_wages else {
        // No wage information: assume the full spread is under the cap.
        return (
            spread_total * (SOCIAL_SECURITY_RATE + MEDICARE_RATE),
            false,
        );
    };

    let ss_taxable = (SOCIAL_SECURITY_WAGE_CAP - wages).max(0.0).min(spread_total);
    let fica = ss_taxable * SOCIAL_SECURITY_RATE + spread_total * MEDICARE_RATE;
    (fica, ss_taxable < spread_total)
}

pub fn calculate_grant_taxes(grant: &GrantInputs) -> TaxCalculation {
    calculate_taxes(
        grant.number_of_options,
        grant.strike_price,
        grant.current_fmv,
        grant.option_type,
        grant.federal_tax_bracket,
        grant.annual_wages,
    )
}

/// The one place the dilution%-equals-investor-ownership% approximation is
/// applied when projecting funding rounds into waterfall inputs.
pub fn preferred_rounds(rounds: &[FundingRound]) -> Vec<PreferredRound> {
    rounds
        .iter()
        .map(|round| PreferredRound {
            id: round.id,
            name: round.name.clone(),
            invested_amount: round.amount_raised,
            liquidation_multiple: round.liquidation_multiple,
            preferred_type: round.preferred_type,
            ownership_percent: round.dilution_percent,
            seniority: round.seniority,
        })
        .collect()
}

pub fn calculate_waterfall(
    exit_valuation: f64,
    rounds: &[PreferredRound],
    employee_ownership_percent: f64,
) -> WaterfallResult {
    let exit_value = exit_valuation.max(0.0);

    if rounds.is_empty() {
        return WaterfallResult {
            exit_value,
            preferred_payout: 0.0,
            common_pool: exit_value,
            employee_ownership_of_common: employee_ownership_percent,
            employee_payout: employee_ownership_percent / 100.0 * exit_value,
            round_payouts: Vec::new(),
        };
    }

    let total_preferred_ownership: f64 = rounds.iter().map(|r| r.ownership_percent).sum();
    let total_common_ownership = 100.0 - total_preferred_ownership;
    let employee_ownership_of_common = if total_common_ownership <= 0.0 {
        0.0
    } else {
        employee_ownership_percent / total_common_ownership * 100.0
    };

    // Most senior paid first; ties resolve in input order.
    let mut order: Vec<usize> = (0..rounds.len()).collect();
    order.sort_by(|a, b| rounds[*b].seniority.cmp(&rounds[*a].seniority));

    let mut remaining = exit_value;
    let mut payouts = vec![0.0_f64; rounds.len()];
    let mut converted = vec![false; rounds.len()];

    for &index in &order {
        let round = &rounds[index];
        let preference = round.invested_amount * round.liquidation_multiple;
        let pro_rata = round.ownership_percent / 100.0 * exit_value;

        let payout = match round.preferred_type {
            PreferredType::NonParticipating => {
                converted[index] = pro_rata > preference;
                remaining.min(preference.max(pro_rata))
            }
            PreferredType::Participating => remaining.min(preference),
        };

        payouts[index] += payout;
        remaining -= payout;
    }

    for &index in &order {
        let round = &rounds[index];
        if round.preferred_type == PreferredType::Participating {
            let share = round.ownership_percent / 100.0 * remaining;
            payouts[index] += share;
            remaining -= share;
        }
    }

    let common_pool = remaining.max(0.0);
    let preferred_payout: f64 = payouts.iter().sum();

    let round_payouts = order
        .iter()
        .map(|&index| RoundPayout {
            id: rounds[index].id,
            name: rounds[index].name.clone(),
            payout: payouts[index],
            converted_to_common: converted[index],
        })
        .collect();

    WaterfallResult {
        exit_value,
        preferred_payout,
        common_pool,
        employee_ownership_of_common,
        employee_payout: employee_ownership_of_common / 100.0 * common_pool,
        round_payouts,
    }
}

pub fn exit_value_at(ownership_percent: f64, company_valuation: f64, multiple: f64) -> f64 {
    ownership_percent / 100.0 * company_valuation * multiple
}

pub fn expected_value(
    ownership_percent: f64,
    company_valuation: f64,
    cost_to_exercise: f64,
    scenarios: &[ExitScenario],
) -> f64 {
    if scenarios.is_empty() {
        return 0.0;
    }

    let gross: f64 = scenarios
        .iter()
        .map(|scenario| {
            scenario.probability
                * exit_value_at(ownership_percent, company_valuation, scenario.multiple)
        })
        .sum();
    gross - cost_to_exercise
}

pub fn validate_scenarios(scenarios: &[ExitScenario]) -> ScenarioValidation {
    let total: f64 = scenarios.iter().map(|s| s.probability).sum();
    let difference = total - 1.0;
    ScenarioValidation {
        valid: difference.abs() <= SCENARIO_SUM_TOLERANCE,
        total,
        difference,
    }
}

pub fn derive_company_stage(rounds: &[FundingRound]) -> CompanyStage {
    let Some(last) = rounds.last() else {
        return CompanyStage::Seed;
    };

    let name = last.name.to_lowercase();
    if name.contains("series c") || name.contains("series d") {
        CompanyStage::SeriesCPlus
    } else if name.contains("series b") {
        CompanyStage::SeriesB
    } else if name.contains("series a") {
        CompanyStage::SeriesA
    } else if name.contains("pre-seed") || name.contains("preseed") {
        CompanyStage::PreSeed
    } else {
        // Bridge rounds, SAFEs and anything unrecognized read as seed-stage.
        CompanyStage::Seed
    }
}

pub fn default_scenarios() -> Vec<ExitScenario> {
    vec![
        scenario("Failure", 0.0, BASE_FAILURE_PROBABILITY),
        scenario("Acquihire", 0.5, 0.10),
        scenario("Modest exit", 2.0, 0.10),
        scenario("Good exit", 5.0, 0.05),
        scenario("Great exit", 10.0, 0.03),
        scenario("Unicorn", 50.0, 0.02),
    ]
}

fn scenario(name: &str, multiple: f64, probability: f64) -> ExitScenario {
    ExitScenario {
        name: name.to_string(),
        multiple,
        probability,
    }
}

struct StageProfile {
    target_failure_probability: f64,
    unicorn_multiplier: f64,
}

fn stage_profile(stage: CompanyStage) -> StageProfile {
    let (target_failure_probability, unicorn_multiplier) = match stage {
        CompanyStage::PreSeed => (0.75, 1.0),
        CompanyStage::Seed => (0.70, 1.0),
        CompanyStage::SeriesA => (0.55, 1.2),
        CompanyStage::SeriesB => (0.40, 1.5),
        CompanyStage::SeriesCPlus => (0.25, 2.0),
    };
    StageProfile {
        target_failure_probability,
        unicorn_multiplier,
    }
}

pub fn stage_adjusted_scenarios(stage: CompanyStage) -> Vec<ExitScenario> {
    let mut scenarios = default_scenarios();
    let profile = stage_profile(stage);
    let success_boost = BASE_FAILURE_PROBABILITY - profile.target_failure_probability;

    let unicorn_index = scenarios
        .iter()
        .enumerate()
        .max_by(|(_, a), (_, b)| a.multiple.total_cmp(&b.multiple))
        .map(|(index, _)| index);

    for (index, entry) in scenarios.iter_mut().enumerate() {
        if entry.multiple == 0.0 {
            entry.probability = profile.target_failure_probability;
        } else if Some(index) == unicorn_index {
            entry.probability = (entry.probability
                + success_boost * UNICORN_BOOST_SHARE * profile.unicorn_multiplier)
                .max(0.0);
        } else {
            entry.probability = (entry.probability + success_boost * SUCCESS_BOOST_SHARE).max(0.0);
        }
    }

    let total: f64 = scenarios.iter().map(|s| s.probability).sum();
    if (total - 1.0).abs() > RENORMALIZE_DRIFT && total > 0.0 {
        for entry in &mut scenarios {
            entry.probability /= total;
        }
    }

    scenarios
}

pub fn opportunity_cost_series(
    principal: f64,
    annual_rate: f64,
    horizon_years: u32,
    ownership_percent: f64,
    company_valuation: f64,
    cost_to_exercise: f64,
    scenarios: &[ExitScenario],
) -> OpportunityCostResult {
    let expected_exit_profit: f64 = scenarios
        .iter()
        .map(|s| {
            s.probability
                * (exit_value_at(ownership_percent, company_valuation, s.multiple)
                    - cost_to_exercise)
                    .max(0.0)
        })
        .sum();

    let mut points = Vec::with_capacity(horizon_years as usize + 1);
    let mut break_even_year = None;

    for year in 0..=horizon_years {
        let alternative_value = principal * (1.0 + annual_rate).powi(year as i32);
        let options_expected_value = if year < FIRST_EXIT_YEAR {
            0.0
        } else {
            let cumulative_exit_probability =
                (((year - FIRST_EXIT_YEAR + 1) as f64) / EXIT_RAMP_YEARS).min(1.0);
            cumulative_exit_probability * expected_exit_profit
        };

        if break_even_year.is_none() && options_expected_value > alternative_value - principal {
            break_even_year = Some(year);
        }

        points.push(OpportunityCostPoint {
            year,
            alternative_value,
            options_expected_value,
        });
    }

    let last = points.last().copied().unwrap_or(OpportunityCostPoint {
        year: 0,
        alternative_value: principal,
        options_expected_value: 0.0,
    });

    OpportunityCostResult {
        points,
        break_even_year,
        final_alternative_value: last.alternative_value,
        final_options_expected_value: last.options_expected_value,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::{prop_assert, prop_assume, proptest};

    const EPS: f64 = 1e-6;

    fn assert_approx(actual: f64, expected: f64) {
        assert!(
            (actual - expected).abs() <= EPS,
            "expected {expected}, got {actual}"
        );
    }

    fn assert_approx_tol(actual: f64, expected: f64, tol: f64) {
        assert!(
            (actual - expected).abs() <= tol,
            "expected {expected}, got {actual}, tolerance {tol}"
        );
    }

    fn round(
        id: u32,
        name: &str,
        dilution_percent: f64,
        amount_raised: f64,
        seniority: u32,
    ) -> FundingRound {
        FundingRound {
            id,
            name: name.to_string(),
            dilution_percent,
            amount_raised,
            liquidation_multiple: 1.0,
            preferred_type: PreferredType::NonParticipating,
            seniority,
        }
    }

    fn preferred(
        id: u32,
        invested_amount: f64,
        liquidation_multiple: f64,
        preferred_type: PreferredType,
        ownership_percent: f64,
        seniority: u32,
    ) -> PreferredRound {
        PreferredRound {
            id,
            name: format!("Round {id}"),
            invested_amount,
            liquidation_multiple,
            preferred_type,
            ownership_percent,
            seniority,
        }
    }

    #[test]
    fn exercise_cost_and_paper_gain_concrete() {
        assert_approx(exercise_cost(10_000.0, 1.0), 10_000.0);
        assert_approx(current_value(10_000.0, 5.0), 50_000.0);
        assert_approx(paper_gain(10_000.0, 1.0, 5.0), 40_000.0);
        assert_approx(paper_gain_percent(10_000.0, 1.0, 5.0), 400.0);
    }

    #[test]
    fn paper_gain_percent_is_zero_when_cost_is_zero() {
        assert_approx(paper_gain_percent(10_000.0, 0.0, 5.0), 0.0);
        assert_approx(paper_gain_percent(0.0, 1.0, 5.0), 0.0);
    }

    #[test]
    fn break_even_multiple_fails_safe_on_zero_fmv() {
        assert!(break_even_multiple(1.0, 0.0).is_infinite());
        assert_approx(break_even_multiple(1.0, 5.0), 0.2);
    }

    #[test]
    fn roi_handles_zero_cost() {
        assert!(roi(1.0, 0.0).is_infinite());
        assert_approx(roi(0.0, 0.0), 0.0);
        assert_approx(roi(-50.0, 0.0), 0.0);
        assert_approx(roi(500.0, 1_000.0), 50.0);
    }

    #[test]
    fn valuation_from_ownership_concrete() {
        assert_approx(
            valuation_from_ownership(10_000.0, 5.0, 0.1),
            50_000_000.0,
        );
        assert_approx(valuation_from_ownership(10_000.0, 5.0, 0.0), 0.0);
        assert_approx(valuation_from_ownership(0.0, 5.0, 0.1), 0.0);
    }

    #[test]
    fn dilution_with_no_rounds_is_identity() {
        let result = apply_dilution(1.0, &[]);
        assert_approx(result.ownership_after, 1.0);
        assert_approx(result.total_dilution_percent, 0.0);
    }

    #[test]
    fn dilution_full_round_zeroes_ownership() {
        let rounds = vec![round(1, "Seed", 100.0, 1_000_000.0, 0)];
        let result = apply_dilution(2.0, &rounds);
        assert_eq!(result.ownership_after, 0.0);
        assert_approx(result.total_dilution_percent, 100.0);
    }

    #[test]
    fn dilution_compounds_across_rounds() {
        let rounds = vec![
            round(1, "Seed", 20.0, 2_000_000.0, 0),
            round(2, "Series A", 10.0, 8_000_000.0, 1),
        ];
        let result = apply_dilution(1.0, &rounds);
        assert_approx(result.ownership_after, 0.72);
        assert_approx_tol(result.total_dilution_percent, 28.0, 1e-9);
    }

    #[test]
    fn iso_tax_uses_simplified_amt_rate() {
        let taxes = calculate_taxes(10_000.0, 1.0, 5.0, OptionType::Iso, 0.32, None);
        assert_approx(taxes.spread, 4.0);
        assert_approx(taxes.spread_total, 40_000.0);
        assert_approx(taxes.estimated_tax_at_exercise, 11_200.0);
        match taxes.breakdown {
            TaxBreakdown::Iso {
                amt_income,
                estimated_amt,
            } => {
                assert_approx(amt_income, 40_000.0);
                assert_approx(estimated_amt, 11_200.0);
            }
            TaxBreakdown::Nso { .. } => panic!("expected ISO breakdown"),
        }
    }

    #[test]
    fn nso_tax_without_wages_applies_combined_fica() {
        let taxes = calculate_taxes(10_000.0, 1.0, 5.0, OptionType::Nso, 0.32, None);
        assert_approx(taxes.spread_total, 40_000.0);
        match taxes.breakdown {
            TaxBreakdown::Nso {
                ordinary_income,
                ordinary_income_tax,
                fica_tax,
                ss_capped,
            } => {
                assert_approx(ordinary_income, 40_000.0);
                assert_approx(ordinary_income_tax, 12_800.0);
                assert_approx(fica_tax, 3_060.0);
                assert!(!ss_capped);
            }
            TaxBreakdown::Iso { .. } => panic!("expected NSO breakdown"),
        }
        assert_approx(taxes.estimated_tax_at_exercise, 15_860.0);
    }

    #[test]
    fn nso_tax_with_wages_above_cap_is_medicare_only() {
        let taxes = calculate_taxes(10_000.0, 1.0, 5.0, OptionType::Nso, 0.32, Some(200_000.0));
        match taxes.breakdown {
            TaxBreakdown::Nso {
                fica_tax, ss_capped, ..
            } => {
                assert_approx(fica_tax, 580.0);
                assert!(ss_capped);
            }
            TaxBreakdown::Iso { .. } => panic!("expected NSO breakdown"),
        }
    }

    #[test]
    fn nso_tax_with_partial_cap_room_splits_social_security() {
        let taxes = calculate_taxes(10_000.0, 1.0, 5.0, OptionType::Nso, 0.32, Some(150_000.0));
        match taxes.breakdown {
            TaxBreakdown::Nso {
                fica_tax, ss_capped, ..
            } => {
                // 26,100 of spread is below the cap: 26,100 * 6.2% + 40,000 * 1.45%
                assert_approx(fica_tax, 26_100.0 * 0.062 + 580.0);
                assert!(ss_capped);
            }
            TaxBreakdown::Iso { .. } => panic!("expected NSO breakdown"),
        }
    }

    #[test]
    fn underwater_options_have_no_taxable_spread() {
        let taxes = calculate_taxes(10_000.0, 5.0, 1.0, OptionType::Nso, 0.32, None);
        assert_approx(taxes.spread, 0.0);
        assert_approx(taxes.spread_total, 0.0);
        assert_approx(taxes.estimated_tax_at_exercise, 0.0);
    }

    #[test]
    fn waterfall_without_preferred_rounds_is_pro_rata() {
        let result = calculate_waterfall(40_000_000.0, &[], 0.1);
        assert_eq!(result.employee_payout, 0.1 / 100.0 * 40_000_000.0);
        assert_eq!(result.preferred_payout, 0.0);
        assert_eq!(result.common_pool, 40_000_000.0);
    }

    #[test]
    fn waterfall_single_non_participating_takes_preference() {
        let rounds = vec![preferred(
            1,
            10_000_000.0,
            1.0,
            PreferredType::NonParticipating,
            20.0,
            0,
        )];
        let result = calculate_waterfall(40_000_000.0, &rounds, 0.1);

        assert_approx(result.preferred_payout, 10_000_000.0);
        assert_approx(result.common_pool, 30_000_000.0);
        assert_approx(result.employee_ownership_of_common, 0.125);
        assert_approx(result.employee_payout, 37_500.0);
        assert!(!result.round_payouts[0].converted_to_common);
    }

    #[test]
    fn waterfall_non_participating_converts_when_pro_rata_is_larger() {
        let rounds = vec![preferred(
            1,
            10_000_000.0,
            1.0,
            PreferredType::NonParticipating,
            20.0,
            0,
        )];
        let result = calculate_waterfall(100_000_000.0, &rounds, 0.1);

        assert_approx(result.preferred_payout, 20_000_000.0);
        assert_approx(result.common_pool, 80_000_000.0);
        assert!(result.round_payouts[0].converted_to_common);
    }

    #[test]
    fn waterfall_participating_preferred_double_dips() {
        let rounds = vec![preferred(
            1,
            10_000_000.0,
            1.0,
            PreferredType::Participating,
            20.0,
            0,
        )];
        let result = calculate_waterfall(40_000_000.0, &rounds, 0.1);

        // 10M preference plus 20% of the remaining 30M.
        assert_approx(result.preferred_payout, 16_000_000.0);
        assert_approx(result.common_pool, 24_000_000.0);
        assert_approx(result.employee_payout, 0.125 / 100.0 * 24_000_000.0);
    }

    #[test]
    fn waterfall_pays_senior_rounds_first() {
        let rounds = vec![
            preferred(1, 5_000_000.0, 1.0, PreferredType::NonParticipating, 1.0, 0),
            preferred(2, 10_000_000.0, 1.0, PreferredType::NonParticipating, 1.0, 1),
        ];
        let result = calculate_waterfall(10_000_000.0, &rounds, 0.1);

        assert_eq!(result.round_payouts[0].id, 2);
        assert_approx(result.round_payouts[0].payout, 10_000_000.0);
        assert_approx(result.round_payouts[1].payout, 0.0);
        assert_approx(result.common_pool, 0.0);
        assert_approx(result.employee_payout, 0.0);
    }

    #[test]
    fn waterfall_follows_explicit_seniority_not_input_order() {
        let rounds = vec![
            preferred(1, 5_000_000.0, 1.0, PreferredType::NonParticipating, 1.0, 5),
            preferred(2, 10_000_000.0, 1.0, PreferredType::NonParticipating, 1.0, 2),
        ];
        let result = calculate_waterfall(5_000_000.0, &rounds, 0.1);

        assert_eq!(result.round_payouts[0].id, 1);
        assert_approx(result.round_payouts[0].payout, 5_000_000.0);
        assert_approx(result.round_payouts[1].payout, 0.0);
    }

    #[test]
    fn waterfall_caps_preference_at_remaining_value() {
        let rounds = vec![preferred(
            1,
            10_000_000.0,
            2.0,
            PreferredType::NonParticipating,
            20.0,
            0,
        )];
        let result = calculate_waterfall(8_000_000.0, &rounds, 0.1);

        assert_approx(result.preferred_payout, 8_000_000.0);
        assert_approx(result.common_pool, 0.0);
        assert_approx(result.employee_payout, 0.0);
    }

    #[test]
    fn preferred_rounds_projection_copies_dilution_as_ownership() {
        let rounds = vec![round(7, "Series A", 18.0, 12_000_000.0, 3)];
        let projected = preferred_rounds(&rounds);
        assert_eq!(projected.len(), 1);
        assert_eq!(projected[0].id, 7);
        assert_approx(projected[0].ownership_percent, 18.0);
        assert_approx(projected[0].invested_amount, 12_000_000.0);
        assert_eq!(projected[0].seniority, 3);
    }

    #[test]
    fn company_stage_matches_round_names() {
        let cases = [
            ("Pre-Seed", CompanyStage::PreSeed),
            ("Seed", CompanyStage::Seed),
            ("Series A", CompanyStage::SeriesA),
            ("Series B", CompanyStage::SeriesB),
            ("Series C", CompanyStage::SeriesCPlus),
            ("Series D+", CompanyStage::SeriesCPlus),
            ("Bridge", CompanyStage::Seed),
        ];
        for (name, expected) in cases {
            let rounds = vec![round(1, name, 10.0, 1_000_000.0, 0)];
            assert_eq!(derive_company_stage(&rounds), expected, "round {name}");
        }
        assert_eq!(derive_company_stage(&[]), CompanyStage::Seed);
    }

    #[test]
    fn company_stage_uses_last_round() {
        let rounds = vec![
            round(1, "Seed", 20.0, 2_000_000.0, 0),
            round(2, "Series B", 15.0, 30_000_000.0, 1),
        ];
        assert_eq!(derive_company_stage(&rounds), CompanyStage::SeriesB);
    }

    #[test]
    fn stage_scenarios_sum_to_one_for_every_stage() {
        for stage in [
            CompanyStage::PreSeed,
            CompanyStage::Seed,
            CompanyStage::SeriesA,
            CompanyStage::SeriesB,
            CompanyStage::SeriesCPlus,
        ] {
            let scenarios = stage_adjusted_scenarios(stage);
            let validation = validate_scenarios(&scenarios);
            assert!(
                validation.valid,
                "stage {stage:?} total {}",
                validation.total
            );
            for entry in &scenarios {
                assert!(entry.probability >= 0.0);
            }
        }
    }

    #[test]
    fn later_stages_lower_failure_and_boost_unicorns() {
        let seed = stage_adjusted_scenarios(CompanyStage::Seed);
        let late = stage_adjusted_scenarios(CompanyStage::SeriesCPlus);

        let failure = |set: &[ExitScenario]| {
            set.iter()
                .find(|s| s.multiple == 0.0)
                .map(|s| s.probability)
                .unwrap_or(0.0)
        };
        let unicorn = |set: &[ExitScenario]| {
            set.iter()
                .find(|s| s.multiple == 50.0)
                .map(|s| s.probability)
                .unwrap_or(0.0)
        };

        assert!(failure(&late) < failure(&seed));
        assert!(unicorn(&late) > unicorn(&seed));
        assert_approx(failure(&seed), 0.70);
    }

    #[test]
    fn expected_value_concrete() {
        let scenarios = vec![
            scenario("Failure", 0.0, 0.5),
            scenario("Home run", 10.0, 0.5),
        ];
        let value = expected_value(0.1, 50_000_000.0, 15_000.0, &scenarios);
        assert_approx(value, 235_000.0);
    }

    #[test]
    fn expected_value_of_empty_scenario_set_is_zero() {
        assert_approx(expected_value(0.1, 50_000_000.0, 15_000.0, &[]), 0.0);
    }

    #[test]
    fn validate_scenarios_reports_signed_difference() {
        let scenarios = vec![
            scenario("Failure", 0.0, 0.5),
            scenario("Home run", 10.0, 0.4),
        ];
        let validation = validate_scenarios(&scenarios);
        assert!(!validation.valid);
        assert_approx(validation.total, 0.9);
        assert_approx(validation.difference, -0.1);
    }

    #[test]
    fn opportunity_cost_has_no_exits_before_year_three() {
        let scenarios = vec![scenario("Exit", 10.0, 1.0)];
        let result =
            opportunity_cost_series(15_000.0, 0.07, 10, 0.1, 50_000_000.0, 15_000.0, &scenarios);

        assert_eq!(result.points.len(), 11);
        for point in &result.points[..3] {
            assert_approx(point.options_expected_value, 0.0);
        }
        assert!(result.points[3].options_expected_value > 0.0);
    }

    #[test]
    fn opportunity_cost_ramp_saturates_at_year_ten() {
        let scenarios = vec![scenario("Exit", 10.0, 1.0)];
        let result =
            opportunity_cost_series(15_000.0, 0.07, 12, 0.1, 50_000_000.0, 15_000.0, &scenarios);

        let expected_profit = 0.1 / 100.0 * 50_000_000.0 * 10.0 - 15_000.0;
        assert_approx(result.points[10].options_expected_value, expected_profit);
        assert_approx(result.points[12].options_expected_value, expected_profit);
        assert_approx_tol(
            result.points[4].options_expected_value,
            expected_profit * 2.0 / 8.0,
            1e-6,
        );
    }

    #[test]
    fn opportunity_cost_alternative_compounds() {
        let result = opportunity_cost_series(10_000.0, 0.07, 2, 0.1, 0.0, 0.0, &[]);
        assert_approx(result.points[0].alternative_value, 10_000.0);
        assert_approx(result.points[2].alternative_value, 10_000.0 * 1.07 * 1.07);
        assert_approx(result.final_alternative_value, 10_000.0 * 1.07 * 1.07);
    }

    #[test]
    fn opportunity_cost_break_even_at_year_three_with_flat_alternative() {
        let scenarios = vec![scenario("Exit", 10.0, 1.0)];
        let result =
            opportunity_cost_series(15_000.0, 0.0, 10, 0.1, 50_000_000.0, 15_000.0, &scenarios);
        assert_eq!(result.break_even_year, Some(3));
    }

    #[test]
    fn opportunity_cost_never_breaks_even_with_worthless_options() {
        let scenarios = vec![scenario("Failure", 0.0, 1.0)];
        let result =
            opportunity_cost_series(15_000.0, 0.07, 10, 0.1, 50_000_000.0, 15_000.0, &scenarios);
        assert_eq!(result.break_even_year, None);
        assert_approx(result.final_options_expected_value, 0.0);
    }

    proptest! {
        #![proptest_config(proptest::test_runner::Config::with_cases(64))]

        #[test]
        fn prop_dilution_never_increases_ownership(
            initial_bp in 0u32..10_000,
            dilutions in proptest::collection::vec(0u32..=10_000, 0..6)
        ) {
            let initial = initial_bp as f64 / 100.0;
            let rounds: Vec<FundingRound> = dilutions
                .iter()
                .enumerate()
                .map(|(index, bp)| round(
                    index as u32,
                    "Round",
                    *bp as f64 / 100.0,
                    1_000_000.0,
                    index as u32,
                ))
                .collect();

            let result = apply_dilution(initial, &rounds);
            prop_assert!(result.ownership_after <= initial + 1e-9);
            prop_assert!(result.ownership_after >= 0.0);
            prop_assert!((0.0..=100.0 + 1e-9).contains(&result.total_dilution_percent));

            let undiluted = rounds.iter().all(|r| r.dilution_percent == 0.0);
            if rounds.is_empty() || undiluted {
                prop_assert!((result.ownership_after - initial).abs() <= 1e-12);
            }
        }

        #[test]
        fn prop_waterfall_conserves_value(
            exit_m in 0u32..2_000,
            invested_a in 1u32..50,
            invested_b in 1u32..50,
            own_a in 1u32..30,
            own_b in 1u32..30,
            participating_a in proptest::bool::ANY,
            participating_b in proptest::bool::ANY,
            employee_bp in 0u32..200
        ) {
            let rounds = vec![
                preferred(
                    1,
                    invested_a as f64 * 1_000_000.0,
                    1.0,
                    if participating_a { PreferredType::Participating } else { PreferredType::NonParticipating },
                    own_a as f64,
                    0,
                ),
                preferred(
                    2,
                    invested_b as f64 * 1_000_000.0,
                    1.5,
                    if participating_b { PreferredType::Participating } else { PreferredType::NonParticipating },
                    own_b as f64,
                    1,
                ),
            ];
            let exit_value = exit_m as f64 * 1_000_000.0;
            let employee = employee_bp as f64 / 100.0;

            let result = calculate_waterfall(exit_value, &rounds, employee);
            prop_assert!(result.preferred_payout + result.common_pool <= exit_value + 1e-6);
            prop_assert!(result.common_pool >= 0.0);
            prop_assert!(result.employee_payout >= 0.0);
            for payout in &result.round_payouts {
                prop_assert!(payout.payout >= 0.0);
            }
        }

        #[test]
        fn prop_waterfall_employee_payout_monotonic_in_exit_value(
            exit_m in 0u32..1_000,
            step_m in 0u32..1_000,
            invested in 1u32..50,
            own in 1u32..40,
            participating in proptest::bool::ANY,
            employee_bp in 1u32..200
        ) {
            let rounds = vec![preferred(
                1,
                invested as f64 * 1_000_000.0,
                1.0,
                if participating { PreferredType::Participating } else { PreferredType::NonParticipating },
                own as f64,
                0,
            )];
            let employee = employee_bp as f64 / 100.0;

            let low = calculate_waterfall(exit_m as f64 * 1_000_000.0, &rounds, employee);
            let high = calculate_waterfall((exit_m + step_m) as f64 * 1_000_000.0, &rounds, employee);
            prop_assert!(high.employee_payout >= low.employee_payout - 1e-6);
        }

        #[test]
        fn prop_no_preferred_rounds_matches_pro_rata_exactly(
            exit_m in 0u32..5_000,
            employee_bp in 0u32..10_000
        ) {
            let exit_value = exit_m as f64 * 1_000_000.0;
            let employee = employee_bp as f64 / 100.0;
            let result = calculate_waterfall(exit_value, &[], employee);
            prop_assert!(result.employee_payout == employee / 100.0 * exit_value);
        }

        #[test]
        fn prop_expected_value_scales_with_ownership(
            own_bp in 1u32..500,
            valuation_m in 1u32..1_000
        ) {
            let ownership = own_bp as f64 / 100.0;
            let valuation = valuation_m as f64 * 1_000_000.0;
            let scenarios = default_scenarios();
            prop_assume!(validate_scenarios(&scenarios).valid);

            let base = expected_value(ownership, valuation, 0.0, &scenarios);
            let doubled = expected_value(ownership * 2.0, valuation, 0.0, &scenarios);
            prop_assert!((doubled - base * 2.0).abs() <= base.abs().max(1.0) * 1e-9);
        }
    }
}
