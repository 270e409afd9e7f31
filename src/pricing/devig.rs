use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::pricing::SkipReason;

/// Slack for probabilities that sum to 1 up to float error.
const SUM_EPSILON: f64 = 1e-9;

/// How the bookmaker margin is removed from a two-way market.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DevigMethod {
    /// Each side divided by the overround; keeps the ratio between sides.
    #[default]
    Multiplicative,
    /// Half the margin subtracted from each side.
    Additive,
}

impl FromStr for DevigMethod {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "multiplicative" | "proportional" => Ok(DevigMethod::Multiplicative),
            "additive" => Ok(DevigMethod::Additive),
            other => Err(format!("unknown devig method '{other}' (expected multiplicative or additive)")),
        }
    }
}

/// Remove the vig from raw implied probabilities `(over, under)`.
///
/// Fails with `Underround` when the raw probabilities sum below 1: a market
/// priced that way is an arbitrage or bad data and cannot be devigged.
pub fn devig(method: DevigMethod, p_over: f64, p_under: f64) -> Result<(f64, f64), SkipReason> {
    let valid = |p: f64| p.is_finite() && p > 0.0 && p < 1.0;
    if !valid(p_over) || !valid(p_under) {
        return Err(SkipReason::InvalidPrice);
    }

    let sum = p_over + p_under;
    if sum < 1.0 - SUM_EPSILON {
        return Err(SkipReason::Underround);
    }

    match method {
        DevigMethod::Multiplicative => Ok((p_over / sum, p_under / sum)),
        DevigMethod::Additive => {
            // stays inside (0, 1) for two-way markets since each side is < 1
            let margin = (sum - 1.0) / 2.0;
            Ok((p_over - margin, p_under - margin))
        }
    }
}
