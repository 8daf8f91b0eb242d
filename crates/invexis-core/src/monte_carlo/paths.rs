use rand::rngs::StdRng;
use rand::Rng;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use statrs::distribution::Normal;
use std::time::Instant;
use tracing::{debug, warn};

use super::statistics::{mean_path, median_path};
use crate::error::InvexisError;
use crate::linalg::{add_to_diagonal, cholesky, diagonal, mat_vec_multiply, validate_covariance};
use crate::types::{
    note_degraded, validate_symbols, with_metadata, ComputationOutput, Estimate, Matrix, Symbol,
};
use crate::InvexisResult;

/// Diagonal jitter added to Sigma when the first Cholesky attempt fails.
pub const CHOLESKY_JITTER: f64 = 1e-7;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to the correlated GBM path simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathSimulationInput {
    /// Symbol ordering; must match the rows and columns of `covariance`.
    pub symbols: Vec<Symbol>,
    /// N x N covariance of per-step log returns.
    pub covariance: Matrix,
    /// Historical mean log return per step, per asset.
    pub mean_returns: Vec<f64>,
    /// Last observed price per asset (S0).
    pub initial_prices: Vec<f64>,
    /// Path length including the starting price.
    #[serde(default = "default_time_intervals")]
    pub time_intervals: usize,
    /// Number of independent runs.
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    /// Optional seed for reproducibility.
    #[serde(default)]
    pub seed: Option<u64>,
    /// Multiplier on the random term. 1.0 leaves the model unchanged.
    #[serde(default = "default_volatility_scale")]
    pub volatility_scale: f64,
}

pub fn default_time_intervals() -> usize {
    252
}

pub fn default_iterations() -> usize {
    2_000
}

pub fn default_volatility_scale() -> f64 {
    1.0
}

/// Simulated prices of one asset, indexed `[time step][run]`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetPaths {
    pub symbol: Symbol,
    pub values: Matrix,
}

impl AssetPaths {
    /// Median price across runs at each step.
    pub fn median_path(&self) -> Vec<f64> {
        median_path(&self.values)
    }

    /// Mean price across runs at each step.
    pub fn mean_path(&self) -> Vec<f64> {
        mean_path(&self.values)
    }

    /// Prices of a single run over time.
    pub fn run(&self, run: usize) -> Option<Vec<f64>> {
        self.values.iter().map(|row| row.get(run).copied()).collect()
    }
}

/// Jointly simulated paths for every asset, all sharing the same
/// `time_intervals x iterations` shape.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulatedPaths {
    pub time_intervals: usize,
    pub iterations: usize,
    pub assets: Vec<AssetPaths>,
}

impl SimulatedPaths {
    /// Zero-filled paths, returned when the covariance cannot be factorised.
    pub fn zeros(symbols: &[Symbol], time_intervals: usize, iterations: usize) -> Self {
        SimulatedPaths {
            time_intervals,
            iterations,
            assets: symbols
                .iter()
                .map(|s| AssetPaths {
                    symbol: s.clone(),
                    values: vec![vec![0.0; iterations]; time_intervals],
                })
                .collect(),
        }
    }

    pub fn get(&self, symbol: &str) -> Option<&AssetPaths> {
        self.assets.iter().find(|a| a.symbol == symbol)
    }

    pub fn symbols(&self) -> Vec<Symbol> {
        self.assets.iter().map(|a| a.symbol.clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.assets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.assets.is_empty()
    }
}

/// Lower-triangular factor of Sigma and whether jitter was needed.
#[derive(Debug, Clone)]
pub struct CorrelationFactor {
    pub lower: Matrix,
    pub jittered: bool,
}

// ---------------------------------------------------------------------------
// Factorisation
// ---------------------------------------------------------------------------

/// Cholesky factor of `covariance`, retrying once with [`CHOLESKY_JITTER`]
/// on the diagonal. Fails with `SimulationInfeasible` if both attempts fail.
pub fn correlation_factor(covariance: &[Vec<f64>]) -> InvexisResult<CorrelationFactor> {
    match cholesky(covariance, "simulation covariance") {
        Ok(lower) => Ok(CorrelationFactor {
            lower,
            jittered: false,
        }),
        Err(InvexisError::SingularMatrix { .. }) => {
            warn!(
                jitter = CHOLESKY_JITTER,
                "covariance is not positive-definite; retrying Cholesky with diagonal jitter"
            );
            let jittered = add_to_diagonal(covariance, CHOLESKY_JITTER);
            match cholesky(&jittered, "jittered simulation covariance") {
                Ok(lower) => Ok(CorrelationFactor {
                    lower,
                    jittered: true,
                }),
                Err(InvexisError::SingularMatrix { .. }) => Err(InvexisError::SimulationInfeasible(
                    format!(
                        "Cholesky decomposition failed even after adding {} to the diagonal",
                        CHOLESKY_JITTER
                    ),
                )),
                Err(e) => Err(e),
            }
        }
        Err(e) => Err(e),
    }
}

// ---------------------------------------------------------------------------
// Generation
// ---------------------------------------------------------------------------

/// Model inputs for [`generate_paths`], already validated.
pub struct GbmModel<'a> {
    pub lower: &'a [Vec<f64>],
    /// mu_i - 0.5 * Sigma_ii
    pub drift: &'a [f64],
    /// sqrt(Sigma_ii)
    pub std_devs: &'a [f64],
    pub initial_prices: &'a [f64],
    pub volatility_scale: f64,
}

/// Generate per-asset `[time][run]` paths from `rng`.
///
/// One vector of independent standard normals is drawn per (run, step) and
/// pushed through the Cholesky factor, so every asset in a run sees the same
/// correlated shock. Step return for asset i is
/// `exp(drift_i + (L z)_i * sd_i * volatility_scale)`.
pub fn generate_paths(
    rng: &mut StdRng,
    model: &GbmModel<'_>,
    time_intervals: usize,
    iterations: usize,
) -> InvexisResult<Vec<Matrix>> {
    let n = model.initial_prices.len();
    let normal = Normal::new(0.0, 1.0)
        .map_err(|e| InvexisError::SimulationInfeasible(format!("Standard normal: {e}")))?;

    let mut paths: Vec<Matrix> = model
        .initial_prices
        .iter()
        .map(|&s0| {
            let mut m = vec![vec![0.0; iterations]; time_intervals];
            if let Some(first) = m.first_mut() {
                first.fill(s0);
            }
            m
        })
        .collect();

    let mut z = vec![0.0; n];
    for run in 0..iterations {
        for t in 1..time_intervals {
            for zi in z.iter_mut() {
                *zi = rng.sample(&normal);
            }
            let shock = mat_vec_multiply(model.lower, &z);
            for (i, asset) in paths.iter_mut().enumerate() {
                let growth = (model.drift[i]
                    + shock[i] * model.std_devs[i] * model.volatility_scale)
                    .exp();
                asset[t][run] = asset[t - 1][run] * growth;
            }
        }
    }

    Ok(paths)
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

fn validate_input(input: &PathSimulationInput) -> InvexisResult<()> {
    validate_symbols(&input.symbols, "symbols")?;
    let n = input.symbols.len();
    validate_covariance(&input.covariance, n, "covariance")?;
    if input.mean_returns.len() != n {
        return Err(InvexisError::length_mismatch(
            "mean_returns",
            n,
            input.mean_returns.len(),
        ));
    }
    if input.initial_prices.len() != n {
        return Err(InvexisError::length_mismatch(
            "initial_prices",
            n,
            input.initial_prices.len(),
        ));
    }
    if let Some(i) = input.mean_returns.iter().position(|m| !m.is_finite()) {
        return Err(InvexisError::InvalidInput {
            field: format!("mean_returns[{}]", input.symbols[i]),
            reason: "Mean return must be finite".into(),
        });
    }
    if let Some(i) = input
        .initial_prices
        .iter()
        .position(|p| !p.is_finite() || *p < 0.0)
    {
        return Err(InvexisError::InvalidInput {
            field: format!("initial_prices[{}]", input.symbols[i]),
            reason: "Initial price must be finite and non-negative".into(),
        });
    }
    if input.time_intervals == 0 {
        return Err(InvexisError::InvalidInput {
            field: "time_intervals".into(),
            reason: "Must be at least 1".into(),
        });
    }
    if input.iterations == 0 {
        return Err(InvexisError::InvalidInput {
            field: "iterations".into(),
            reason: "Must be at least 1".into(),
        });
    }
    if !input.volatility_scale.is_finite() || input.volatility_scale < 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "volatility_scale".into(),
            reason: "Must be finite and non-negative".into(),
        });
    }
    Ok(())
}

/// Simulate correlated multi-asset GBM price paths.
///
/// Shape and length mismatches are fatal. A covariance that cannot be
/// factorised even after jitter yields zero-filled paths flagged as degraded,
/// so a batch keeps going past one bad input.
pub fn simulate_correlated_paths(
    input: &PathSimulationInput,
) -> InvexisResult<ComputationOutput<Estimate<SimulatedPaths>>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_input(input)?;

    let mut rng = match input.seed {
        Some(s) => StdRng::seed_from_u64(s),
        None => StdRng::from_entropy(),
    };

    let paths = simulate_with_rng(input, &mut rng)?;
    note_degraded(&paths, &mut warnings);
    if paths.value.jittered {
        warnings.push(format!(
            "Covariance was not positive-definite; {} added to the diagonal",
            CHOLESKY_JITTER
        ));
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Correlated geometric Brownian motion (Cholesky-factored shocks)",
        &serde_json::json!({
            "n_assets": input.symbols.len(),
            "time_intervals": input.time_intervals,
            "iterations": input.iterations,
            "seed": input.seed,
            "volatility_scale": input.volatility_scale,
            "drift": "mu - 0.5 * sigma^2",
        }),
        warnings,
        elapsed,
        paths.map(|p| p.paths),
    ))
}

/// Paths plus the factorisation outcome, so the envelope can report jitter.
pub(crate) struct PathRun {
    pub paths: SimulatedPaths,
    pub jittered: bool,
}

/// Validated simulation driven by a caller-owned RNG.
pub(crate) fn simulate_with_rng(
    input: &PathSimulationInput,
    rng: &mut StdRng,
) -> InvexisResult<Estimate<PathRun>> {
    let factor = match correlation_factor(&input.covariance) {
        Ok(f) => f,
        Err(InvexisError::SimulationInfeasible(reason)) => {
            warn!(symbols = ?input.symbols, %reason, "returning zero-filled paths");
            let zeros =
                SimulatedPaths::zeros(&input.symbols, input.time_intervals, input.iterations);
            return Ok(Estimate::degraded(
                PathRun {
                    paths: zeros,
                    jittered: false,
                },
                format!("Simulation infeasible: {reason}; paths are zero-filled"),
            ));
        }
        Err(e) => return Err(e),
    };

    let variances = diagonal(&input.covariance);
    let std_devs: Vec<f64> = variances.iter().map(|v| v.sqrt()).collect();
    let drift: Vec<f64> = input
        .mean_returns
        .iter()
        .zip(variances.iter())
        .map(|(mu, var)| mu - 0.5 * var)
        .collect();
    debug!(
        mean_returns = ?input.mean_returns,
        variances = ?variances,
        drift = ?drift,
        volatility_scale = input.volatility_scale,
        "simulation inputs"
    );

    let model = GbmModel {
        lower: &factor.lower,
        drift: &drift,
        std_devs: &std_devs,
        initial_prices: &input.initial_prices,
        volatility_scale: input.volatility_scale,
    };
    let values = generate_paths(rng, &model, input.time_intervals, input.iterations)?;

    let assets = input
        .symbols
        .iter()
        .zip(values)
        .map(|(s, v)| AssetPaths {
            symbol: s.clone(),
            values: v,
        })
        .collect();

    Ok(Estimate::computed(PathRun {
        paths: SimulatedPaths {
            time_intervals: input.time_intervals,
            iterations: input.iterations,
            assets,
        },
        jittered: factor.jittered,
    }))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
