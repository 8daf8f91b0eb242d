use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

use super::paths::SimulatedPaths;
use super::statistics::{
    ending_value_summary, percentile_bands, portfolio_statistics, EndingValueSummary,
    PercentileBands, PortfolioStatistics, StatisticsParameters,
};
use crate::error::InvexisError;
use crate::types::{with_metadata, ComputationOutput, Matrix};
use crate::InvexisResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Buy-and-hold portfolio value per `[time step][run]`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioValuePaths {
    pub time_intervals: usize,
    pub iterations: usize,
    /// Shares held per asset, fixed at step 0.
    pub share_counts: Vec<f64>,
    pub values: Matrix,
}

impl PortfolioValuePaths {
    pub fn final_values(&self) -> &[f64] {
        self.values.last().map(Vec::as_slice).unwrap_or(&[])
    }
}

/// Input for a portfolio projection over already simulated asset paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioValueInput {
    pub initial_value: f64,
    /// One weight per asset, in the order of `paths.assets`.
    pub weights: Vec<f64>,
    pub paths: SimulatedPaths,
    #[serde(default)]
    pub statistics: StatisticsParameters,
}

/// Portfolio projection with summary statistics.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioValueOutput {
    pub share_counts: Vec<f64>,
    pub mean_path: Vec<f64>,
    pub final_values: Vec<f64>,
    pub bands: PercentileBands,
    pub ending_values: EndingValueSummary,
    pub statistics: PortfolioStatistics,
}

// ---------------------------------------------------------------------------
// Aggregation
// ---------------------------------------------------------------------------

/// Aggregate per-asset paths into portfolio value paths.
///
/// Dollar allocations `initial_value * w_i` are converted to share counts
/// using each asset's step-0 price of the first run; an asset priced at zero
/// gets zero shares. Shares are never rebalanced. Step 0 of every run is the
/// initial value.
pub fn simulate_portfolio_value(
    initial_value: f64,
    weights: &[f64],
    paths: &SimulatedPaths,
) -> InvexisResult<PortfolioValuePaths> {
    if !initial_value.is_finite() || initial_value <= 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "initial_value".into(),
            reason: "Initial portfolio value must be positive".into(),
        });
    }
    if paths.is_empty() {
        return Err(InvexisError::InsufficientData(
            "No simulated asset paths provided".into(),
        ));
    }
    if weights.len() != paths.len() {
        return Err(InvexisError::length_mismatch(
            "weights",
            paths.len(),
            weights.len(),
        ));
    }
    if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
        return Err(InvexisError::InvalidInput {
            field: format!("weights[{}]", paths.assets[i].symbol),
            reason: "Weight must be finite".into(),
        });
    }

    let (steps, runs) = (paths.time_intervals, paths.iterations);
    for asset in &paths.assets {
        if asset.values.len() != steps || asset.values.iter().any(|row| row.len() != runs) {
            let cols = asset.values.first().map(|r| r.len()).unwrap_or(0);
            return Err(InvexisError::shape_mismatch(
                &format!("paths[{}]", asset.symbol),
                (steps, runs),
                (asset.values.len(), cols),
            ));
        }
    }
    if steps == 0 || runs == 0 {
        return Err(InvexisError::InsufficientData(
            "Simulated paths have no steps or runs".into(),
        ));
    }

    let share_counts: Vec<f64> = paths
        .assets
        .iter()
        .zip(weights.iter())
        .map(|(asset, w)| {
            let s0 = asset.values[0][0];
            if s0 == 0.0 {
                if *w != 0.0 {
                    warn!(symbol = %asset.symbol, "initial price is zero; holding no shares");
                }
                0.0
            } else {
                initial_value * w / s0
            }
        })
        .collect();

    let mut values = vec![vec![0.0; runs]; steps];
    values[0].fill(initial_value);
    for (t, row) in values.iter_mut().enumerate().skip(1) {
        for (run, cell) in row.iter_mut().enumerate() {
            *cell = paths
                .assets
                .iter()
                .zip(share_counts.iter())
                .map(|(asset, shares)| shares * asset.values[t][run])
                .sum();
        }
    }

    Ok(PortfolioValuePaths {
        time_intervals: steps,
        iterations: runs,
        share_counts,
        values,
    })
}

/// Bands, ending-value summary and annualised statistics of a projection.
pub fn summarise_portfolio(
    portfolio: PortfolioValuePaths,
    initial_value: f64,
    params: &StatisticsParameters,
) -> InvexisResult<PortfolioValueOutput> {
    let bands = percentile_bands(&portfolio.values);
    let ending_values = ending_value_summary(&portfolio.values, initial_value)?;
    let statistics = portfolio_statistics(&portfolio.values, initial_value, params)?;

    Ok(PortfolioValueOutput {
        mean_path: bands.mean.clone(),
        final_values: portfolio.final_values().to_vec(),
        share_counts: portfolio.share_counts,
        bands,
        ending_values,
        statistics,
    })
}

/// Project a portfolio over simulated paths and summarise the outcome.
pub fn run_portfolio_value(
    input: &PortfolioValueInput,
) -> InvexisResult<ComputationOutput<PortfolioValueOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let portfolio = simulate_portfolio_value(input.initial_value, &input.weights, &input.paths)?;

    let weight_sum: f64 = input.weights.iter().sum();
    if (weight_sum - 1.0).abs() > 1e-6 {
        warnings.push(format!(
            "Weights sum to {:.6}; portfolio starts {} invested",
            weight_sum,
            if weight_sum < 1.0 { "under" } else { "over" }
        ));
    }
    for (asset, shares) in input.paths.assets.iter().zip(portfolio.share_counts.iter()) {
        if *shares == 0.0 && asset.values[0][0] == 0.0 {
            warnings.push(format!("{} has a zero initial price; no shares held", asset.symbol));
        }
    }

    let output = summarise_portfolio(portfolio, input.initial_value, &input.statistics)?;

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Buy-and-hold portfolio value over simulated asset paths",
        &serde_json::json!({
            "initial_value": input.initial_value,
            "n_assets": input.paths.len(),
            "time_intervals": input.paths.time_intervals,
            "iterations": input.paths.iterations,
            "rebalancing": "none",
            "risk_free_rate": input.statistics.risk_free_rate,
            "trading_days_per_year": input.statistics.trading_days_per_year,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
