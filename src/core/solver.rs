use super::engine::calculate_waterfall;
use super::types::PreferredRound;

#[derive(Debug, Clone, Copy)]
pub struct SolveConfig {
    pub precision: f64,
    pub max_exit_valuation: f64,
    pub max_iterations: u32,
}

impl Default for SolveConfig {
    fn default() -> Self {
        Self {
            precision: 1_000.0,
            max_exit_valuation: 1e15,
            max_iterations: 64,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct SolveIteration {
    pub iteration: u32,
    pub lower_bound: f64,
    pub upper_bound: f64,
    pub payout_at_midpoint: f64,
}

#[derive(Debug, Clone)]
pub struct SolveResult {
    pub target_payout: f64,
    pub exit_valuation: f64,
    pub iterations: Vec<SolveIteration>,
    pub converged: bool,
    pub capped: bool,
}

pub fn exit_for_target_payout(
    target_payout: f64,
    rounds: &[PreferredRound],
    employee_ownership_percent: f64,
) -> f64 {
    solve_exit_for_payout(
        target_payout.max(0.0),
        rounds,
        employee_ownership_percent,
        SolveConfig::default(),
    )
    .map(|result| result.exit_valuation)
    .unwrap_or(0.0)
}

pub fn solve_exit_for_payout(
    target_payout: f64,
    rounds: &[PreferredRound],
    employee_ownership_percent: f64,
    config: SolveConfig,
) -> Result<SolveResult, String> {
    validate_config(config)?;

    if !target_payout.is_finite() || target_payout < 0.0 {
        return Err("target_payout must be finite and >= 0".to_string());
    }

    // Without preferred claims the waterfall is pure pro-rata and inverts in
    // closed form.
    if rounds.is_empty() || employee_ownership_percent <= 0.0 {
        let exit_valuation = if employee_ownership_percent <= 0.0 {
            0.0
        } else {
            target_payout / (employee_ownership_percent / 100.0)
        };
        return Ok(SolveResult {
            target_payout,
            exit_valuation,
            iterations: Vec::new(),
            converged: true,
            capped: false,
        });
    }

    if target_payout == 0.0 {
        return Ok(SolveResult {
            target_payout,
            exit_valuation: 0.0,
            iterations: Vec::new(),
            converged: true,
            capped: false,
        });
    }

    let payout_at =
        |exit: f64| calculate_waterfall(exit, rounds, employee_ownership_percent).employee_payout;

    let mut low = 0.0_f64;
    let mut high = (target_payout * 100.0).min(config.max_exit_valuation);

    while payout_at(high) < target_payout {
        if high >= config.max_exit_valuation {
            // Pathological inputs (near-zero ownership) may never reach the
            // target; return the capped bound instead of searching forever.
            return Ok(SolveResult {
                target_payout,
                exit_valuation: config.max_exit_valuation,
                iterations: Vec::new(),
                converged: false,
                capped: true,
            });
        }
        high = (high * 2.0).min(config.max_exit_valuation);
    }

    let mut iterations = Vec::new();
    let mut iteration = 0;
    let mut converged = true;

    while high - low > config.precision {
        if iteration >= config.max_iterations {
            converged = false;
            break;
        }
        iteration += 1;

        let mid = (low + high) * 0.5;
        let payout = payout_at(mid);
        iterations.push(SolveIteration {
            iteration,
            lower_bound: low,
            upper_bound: high,
            payout_at_midpoint: payout,
        });

        if payout >= target_payout {
            high = mid;
        } else {
            low = mid;
        }
    }

    Ok(SolveResult {
        target_payout,
        exit_valuation: high,
        iterations,
        converged,
        capped: false,
    })
}

fn validate_config(config: SolveConfig) -> Result<(), String> {
    if !config.precision.is_finite() || config.precision <= 0.0 {
        return Err("precision must be > 0".to_string());
    }
    if !config.max_exit_valuation.is_finite() || config.max_exit_valuation <= 0.0 {
        return Err("max_exit_valuation must be > 0".to_string());
    }
    if config.max_iterations == 0 {
        return Err("max_iterations must be > 0".to_string());
    }
    Ok(())
}
