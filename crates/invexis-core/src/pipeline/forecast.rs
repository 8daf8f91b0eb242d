use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::{info, warn};

use super::parameters::ModelParameters;
use crate::black_litterman::blend::{normalize_weights, run_black_litterman, BlackLittermanInput};
use crate::error::InvexisError;
use crate::market::equilibrium::{implied_equilibrium_returns, EquilibriumInput};
use crate::market::returns::{estimate_returns, AssetPriceSeries, DroppedSymbol, ReturnsInput};
use crate::monte_carlo::paths::{simulate_correlated_paths, PathSimulationInput, SimulatedPaths};
use crate::monte_carlo::portfolio::{
    simulate_portfolio_value, summarise_portfolio, PortfolioValueOutput,
};
use crate::types::{note_degraded, with_metadata, ComputationOutput, Estimate, Matrix, Symbol};
use crate::views::sentiment::{generate_views, ViewInput, ViewSet};
use crate::InvexisResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Everything needed to run the forecast, already fetched by the caller.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastInput {
    /// One closing-price series per requested symbol. Order fixes the pivot.
    pub price_history: Vec<AssetPriceSeries>,
    #[serde(default)]
    pub market_caps: BTreeMap<Symbol, f64>,
    /// Compound sentiment per symbol; missing symbols score 0.0.
    #[serde(default)]
    pub sentiment: BTreeMap<Symbol, f64>,
    #[serde(default)]
    pub parameters: ModelParameters,
}

/// Full output of one forecast run. Every vector is ordered by `symbols`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Forecast {
    pub symbols: Vec<Symbol>,
    pub dropped_symbols: Vec<DroppedSymbol>,
    pub current_prices: Vec<f64>,
    pub mean_returns: Vec<f64>,
    pub covariance: Matrix,
    pub market_weights: Vec<f64>,
    pub implied_returns: Estimate<Vec<f64>>,
    pub views: ViewSet,
    pub posterior_returns: Estimate<Vec<f64>>,
    pub optimal_weights: Estimate<Vec<f64>>,
    pub median_paths: BTreeMap<Symbol, Vec<f64>>,
    pub paths: Estimate<SimulatedPaths>,
    pub parameters: ModelParameters,
}

/// Compact view of a [`Forecast`] without the simulated paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ForecastSummary {
    pub symbols: Vec<Symbol>,
    pub dropped_symbols: Vec<Symbol>,
    pub current_prices: BTreeMap<Symbol, f64>,
    pub implied_returns: BTreeMap<Symbol, f64>,
    pub posterior_returns: BTreeMap<Symbol, f64>,
    pub optimal_weights: BTreeMap<Symbol, f64>,
    pub n_views: usize,
    pub time_intervals: usize,
    pub iterations: usize,
    /// Reasons for every degraded step.
    pub degraded: Vec<String>,
}

impl Forecast {
    fn keyed(&self, values: &[f64]) -> BTreeMap<Symbol, f64> {
        self.symbols.iter().cloned().zip(values.iter().copied()).collect()
    }

    pub fn optimal_weight_map(&self) -> BTreeMap<Symbol, f64> {
        self.keyed(&self.optimal_weights.value)
    }

    pub fn summary(&self) -> ForecastSummary {
        let degraded = [
            self.implied_returns.degraded_reason(),
            self.posterior_returns.degraded_reason(),
            self.optimal_weights.degraded_reason(),
            self.paths.degraded_reason(),
        ]
        .into_iter()
        .flatten()
        .map(str::to_string)
        .collect();

        ForecastSummary {
            symbols: self.symbols.clone(),
            dropped_symbols: self.dropped_symbols.iter().map(|d| d.symbol.clone()).collect(),
            current_prices: self.keyed(&self.current_prices),
            implied_returns: self.keyed(&self.implied_returns.value),
            posterior_returns: self.keyed(&self.posterior_returns.value),
            optimal_weights: self.optimal_weight_map(),
            n_views: self.views.len(),
            time_intervals: self.paths.value.time_intervals,
            iterations: self.paths.value.iterations,
            degraded,
        }
    }
}

/// Caller weights to evaluate against a forecast's simulated paths.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulationRequest {
    /// Weight per symbol. Symbols left out weigh 0.
    pub weights: BTreeMap<Symbol, f64>,
    #[serde(default = "default_initial_value")]
    pub initial_value: f64,
    /// Rescale the weights to sum to 1 before simulating.
    #[serde(default)]
    pub normalize: bool,
}

pub fn default_initial_value() -> f64 {
    100_000.0
}

/// Portfolio outcome for caller weights, alongside the optimal weights.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PortfolioSimulation {
    pub weights: BTreeMap<Symbol, f64>,
    pub optimal_weights: BTreeMap<Symbol, f64>,
    #[serde(flatten)]
    pub portfolio: PortfolioValueOutput,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

fn absorb<T: Serialize>(output: ComputationOutput<T>, warnings: &mut Vec<String>) -> T {
    warnings.extend(output.warnings);
    output.result
}

/// Run returns estimation, equilibrium, views, Black-Litterman and path
/// simulation over one consistent effective symbol set.
pub fn run_forecast(input: &ForecastInput) -> InvexisResult<ComputationOutput<Forecast>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();
    let params = &input.parameters;
    params.validate()?;

    let returns = absorb(
        estimate_returns(&ReturnsInput {
            series: input.price_history.clone(),
        })?,
        &mut warnings,
    );
    let symbols = returns.symbols.clone();
    info!(
        symbols = ?symbols,
        observations = returns.num_observations,
        "running forecast"
    );

    let equilibrium = absorb(
        implied_equilibrium_returns(&EquilibriumInput {
            symbols: symbols.clone(),
            covariance: returns.covariance.clone(),
            market_caps: input.market_caps.clone(),
            mean_returns: returns.mean_returns.clone(),
            risk_aversion: params.risk_aversion_bl,
        })?,
        &mut warnings,
    );

    let views = absorb(
        generate_views(&ViewInput {
            symbols: symbols.clone(),
            sentiment: input.sentiment.clone(),
            covariance: returns.covariance.clone(),
            parameters: params.views.clone(),
        })?,
        &mut warnings,
    );

    let blended = absorb(
        run_black_litterman(&BlackLittermanInput {
            symbols: symbols.clone(),
            implied_returns: equilibrium.implied_returns.value.clone(),
            covariance: returns.covariance.clone(),
            views: Some(views.clone()),
            tau: params.tau_bl,
            risk_aversion: params.risk_aversion_opt,
        })?,
        &mut warnings,
    );

    let paths = absorb(
        simulate_correlated_paths(&PathSimulationInput {
            symbols: symbols.clone(),
            covariance: returns.covariance.clone(),
            mean_returns: returns.mean_returns.clone(),
            initial_prices: returns.last_prices.clone(),
            time_intervals: params.time_intervals,
            iterations: params.iterations,
            seed: params.seed,
            volatility_scale: params.volatility_scale,
        })?,
        &mut warnings,
    );

    let median_paths = paths
        .value
        .assets
        .iter()
        .map(|a| (a.symbol.clone(), a.median_path()))
        .collect();

    let forecast = Forecast {
        symbols,
        dropped_symbols: returns.dropped_symbols,
        current_prices: returns.last_prices,
        mean_returns: returns.mean_returns,
        covariance: returns.covariance,
        market_weights: equilibrium.market_weights,
        implied_returns: equilibrium.implied_returns,
        views,
        posterior_returns: blended.posterior_returns,
        optimal_weights: blended.optimal_weights,
        median_paths,
        paths,
        parameters: params.clone(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Sentiment-driven Black-Litterman forecast with correlated GBM simulation",
        &serde_json::json!({
            "n_requested": input.price_history.len(),
            "n_effective": forecast.symbols.len(),
            "parameters": params,
        }),
        warnings,
        elapsed,
        forecast,
    ))
}

/// Evaluate caller weights against the paths of a completed forecast.
///
/// Weights are keyed by symbol; unknown symbols are rejected and missing ones
/// weigh 0. Degraded forecast inputs are reported as warnings.
pub fn simulate_portfolio(
    forecast: &Forecast,
    request: &SimulationRequest,
) -> InvexisResult<ComputationOutput<PortfolioSimulation>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    if let Some(unknown) = request
        .weights
        .keys()
        .find(|s| !forecast.symbols.contains(*s))
    {
        return Err(InvexisError::InvalidInput {
            field: format!("weights[{}]", unknown),
            reason: format!(
                "Symbol is not part of the forecast (effective symbols: {:?})",
                forecast.symbols
            ),
        });
    }

    let raw: Vec<f64> = forecast
        .symbols
        .iter()
        .map(|s| request.weights.get(s).copied().unwrap_or(0.0))
        .collect();
    let weights = if request.normalize {
        let normalized = normalize_weights(&raw)?;
        note_degraded(&normalized, &mut warnings);
        normalized.value
    } else {
        raw
    };

    if forecast.paths.is_degraded() {
        warn!("simulating a portfolio over degraded asset paths");
    }
    note_degraded(&forecast.paths, &mut warnings);

    let params = forecast.parameters.statistics();
    let portfolio = simulate_portfolio_value(request.initial_value, &weights, &forecast.paths.value)?;
    let summary = summarise_portfolio(portfolio, request.initial_value, &params)?;

    let output = PortfolioSimulation {
        weights: forecast.keyed(&weights),
        optimal_weights: forecast.optimal_weight_map(),
        portfolio: summary,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Buy-and-hold projection of caller weights over forecast paths",
        &serde_json::json!({
            "initial_value": request.initial_value,
            "normalize": request.normalize,
            "risk_free_rate": params.risk_free_rate,
            "trading_days_per_year": params.trading_days_per_year,
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
