use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::InvexisError;
use crate::types::Rate;
use crate::InvexisResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parameters for annualising simulated portfolio outcomes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatisticsParameters {
    /// Annual risk-free rate for the Sharpe ratio.
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: Rate,
    /// Trading days per year used to annualise the horizon.
    #[serde(default = "default_trading_days")]
    pub trading_days_per_year: f64,
}

pub fn default_risk_free_rate() -> Rate {
    0.02
}

pub fn default_trading_days() -> f64 {
    252.0
}

impl Default for StatisticsParameters {
    fn default() -> Self {
        StatisticsParameters {
            risk_free_rate: default_risk_free_rate(),
            trading_days_per_year: default_trading_days(),
        }
    }
}

/// Heuristic risk bucket by annualised standard deviation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RiskCategory {
    Conservative,
    Moderate,
    Aggressive,
}

impl fmt::Display for RiskCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RiskCategory::Conservative => "Conservative",
            RiskCategory::Moderate => "Moderate",
            RiskCategory::Aggressive => "Aggressive",
        };
        write!(f, "{s}")
    }
}

/// Annualised summary of a simulated portfolio.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioStatistics {
    pub expected_annual_return: Rate,
    pub annual_std_dev: Rate,
    pub sharpe_ratio: f64,
    /// Largest peak-to-trough fall of the mean path, as a fraction of the peak.
    pub max_drawdown: Rate,
    pub risk_category: RiskCategory,
}

/// Distribution of final portfolio values.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EndingValueSummary {
    pub mean: f64,
    pub median: f64,
    pub std_dev: f64,
    pub min: f64,
    pub max: f64,
    /// 5th percentile of final values.
    pub value_at_risk_5: f64,
    /// Share of runs ending below the initial value.
    pub probability_of_loss: f64,
}

/// Per-step cross-sectional bands of a [time][run] value matrix.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PercentileBands {
    pub mean: Vec<f64>,
    pub p10: Vec<f64>,
    pub p25: Vec<f64>,
    pub p50: Vec<f64>,
    pub p75: Vec<f64>,
    pub p90: Vec<f64>,
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Percentile of a **sorted** slice using linear interpolation.
/// NaN for an empty slice.
pub fn percentile_sorted(sorted: &[f64], p: f64) -> f64 {
    match sorted.len() {
        0 => f64::NAN,
        1 => sorted[0],
        len => {
            let rank = p / 100.0 * (len - 1) as f64;
            let lower = rank.floor() as usize;
            let upper = rank.ceil() as usize;
            if lower == upper {
                sorted[lower]
            } else {
                let frac = rank - lower as f64;
                sorted[lower] * (1.0 - frac) + sorted[upper] * frac
            }
        }
    }
}

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut v = values.to_vec();
    v.sort_by(|a, b| a.total_cmp(b));
    v
}

/// Median; NaN for an empty slice.
pub fn median(values: &[f64]) -> f64 {
    percentile_sorted(&sorted_copy(values), 50.0)
}

fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation.
fn std_dev(values: &[f64]) -> f64 {
    if values.is_empty() {
        return f64::NAN;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    var.sqrt()
}

/// Mean across runs at each step of a [time][run] matrix.
pub fn mean_path(values: &[Vec<f64>]) -> Vec<f64> {
    values.iter().map(|row| mean(row)).collect()
}

/// Median across runs at each step of a [time][run] matrix.
pub fn median_path(values: &[Vec<f64>]) -> Vec<f64> {
    values.iter().map(|row| median(row)).collect()
}

/// Maximum drawdown of a path relative to its running peak. Steps before the
/// first positive value contribute nothing.
pub fn max_drawdown(path: &[f64]) -> f64 {
    let mut peak = f64::NEG_INFINITY;
    let mut worst = 0.0_f64;
    for &v in path {
        peak = peak.max(v);
        if peak > 0.0 {
            worst = worst.max((peak - v) / peak);
        }
    }
    worst
}

pub fn classify_risk(annual_std_dev: f64) -> RiskCategory {
    if annual_std_dev < 0.08 {
        RiskCategory::Conservative
    } else if annual_std_dev < 0.15 {
        RiskCategory::Moderate
    } else {
        RiskCategory::Aggressive
    }
}

fn final_values(values: &[Vec<f64>]) -> InvexisResult<&[f64]> {
    match values.last() {
        Some(row) if !row.is_empty() => Ok(row),
        _ => Err(InvexisError::InsufficientData(
            "Value matrix has no simulated runs".into(),
        )),
    }
}

fn validate_initial_value(initial_value: f64) -> InvexisResult<()> {
    if !initial_value.is_finite() || initial_value <= 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "initial_value".into(),
            reason: "Initial portfolio value must be positive".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Summarise the final row of a [time][run] value matrix.
pub fn ending_value_summary(
    values: &[Vec<f64>],
    initial_value: f64,
) -> InvexisResult<EndingValueSummary> {
    validate_initial_value(initial_value)?;
    let finals = final_values(values)?;
    let sorted = sorted_copy(finals);
    let n = sorted.len() as f64;
    let losses = sorted.iter().filter(|v| **v < initial_value).count() as f64;

    Ok(EndingValueSummary {
        mean: mean(&sorted),
        median: percentile_sorted(&sorted, 50.0),
        std_dev: std_dev(&sorted),
        min: sorted[0],
        max: sorted[sorted.len() - 1],
        value_at_risk_5: percentile_sorted(&sorted, 5.0),
        probability_of_loss: losses / n,
    })
}

/// Mean and percentile paths of a [time][run] value matrix.
pub fn percentile_bands(values: &[Vec<f64>]) -> PercentileBands {
    let mut bands = PercentileBands {
        mean: Vec::with_capacity(values.len()),
        p10: Vec::with_capacity(values.len()),
        p25: Vec::with_capacity(values.len()),
        p50: Vec::with_capacity(values.len()),
        p75: Vec::with_capacity(values.len()),
        p90: Vec::with_capacity(values.len()),
    };
    for row in values {
        let sorted = sorted_copy(row);
        bands.mean.push(mean(&sorted));
        bands.p10.push(percentile_sorted(&sorted, 10.0));
        bands.p25.push(percentile_sorted(&sorted, 25.0));
        bands.p50.push(percentile_sorted(&sorted, 50.0));
        bands.p75.push(percentile_sorted(&sorted, 75.0));
        bands.p90.push(percentile_sorted(&sorted, 90.0));
    }
    bands
}

/// Annualised return, volatility, Sharpe ratio, drawdown and risk bucket of
/// a simulated portfolio.
///
/// The horizon is the number of rows of `values` (step 0 included), so the
/// annualisation exponent is `trading_days_per_year / time_intervals`. Runs
/// that end at or below zero are treated as a total loss.
pub fn portfolio_statistics(
    values: &[Vec<f64>],
    initial_value: f64,
    params: &StatisticsParameters,
) -> InvexisResult<PortfolioStatistics> {
    validate_initial_value(initial_value)?;
    if !params.trading_days_per_year.is_finite() || params.trading_days_per_year <= 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "trading_days_per_year".into(),
            reason: "Must be positive".into(),
        });
    }
    let finals = final_values(values)?;
    let exponent = params.trading_days_per_year / values.len() as f64;

    let period_return = (mean(finals) - initial_value) / initial_value;
    let expected_annual_return = (1.0 + period_return).max(0.0).powf(exponent) - 1.0;

    let annualised: Vec<f64> = finals
        .iter()
        .map(|v| (v / initial_value).max(0.0).powf(exponent) - 1.0)
        .collect();
    let annual_std_dev = std_dev(&annualised);

    let sharpe_ratio = if annual_std_dev != 0.0 {
        (expected_annual_return - params.risk_free_rate) / annual_std_dev
    } else {
        0.0
    };

    let cumulative: Vec<f64> = mean_path(values).iter().map(|v| v / initial_value).collect();

    Ok(PortfolioStatistics {
        expected_annual_return,
        annual_std_dev,
        sharpe_ratio,
        max_drawdown: max_drawdown(&cumulative),
        risk_category: classify_risk(annual_std_dev),
    })
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
