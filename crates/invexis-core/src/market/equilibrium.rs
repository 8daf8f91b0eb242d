use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::warn;

use crate::error::InvexisError;
use crate::linalg::{mat_vec_multiply, validate_covariance};
use crate::types::{
    note_degraded, validate_symbols, with_metadata, ComputationOutput, Estimate, Matrix, Symbol,
};
use crate::InvexisResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to the equilibrium model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumInput {
    /// Effective symbol set; must match the covariance ordering.
    pub symbols: Vec<Symbol>,
    /// N x N covariance of log returns.
    pub covariance: Matrix,
    /// Market capitalisation per symbol. Missing or non-positive entries
    /// fall back to a capitalisation of 1.
    #[serde(default)]
    pub market_caps: BTreeMap<Symbol, f64>,
    /// Mean historical log return per symbol. Only consulted when no market
    /// capitalisation is available at all.
    #[serde(default)]
    pub mean_returns: Vec<f64>,
    /// Risk aversion coefficient (delta).
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion: f64,
}

pub fn default_risk_aversion() -> f64 {
    2.5
}

/// Output of the equilibrium model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EquilibriumOutput {
    pub symbols: Vec<Symbol>,
    /// Capitalisation weights used for Pi (sum to 1).
    pub market_weights: Vec<f64>,
    /// Implied equilibrium returns Pi = delta * Sigma * w. Degraded to a
    /// uniform historical mean when no capitalisation is known.
    pub implied_returns: Estimate<Vec<f64>>,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Capitalisation weights cap_i / sum(cap). Unknown caps count as 1.
/// Returns `None` when no symbol has a usable capitalisation.
pub fn market_cap_weights(symbols: &[Symbol], caps: &BTreeMap<Symbol, f64>) -> Option<Vec<f64>> {
    let usable: Vec<Option<f64>> = symbols
        .iter()
        .map(|s| caps.get(s).copied().filter(|c| c.is_finite() && *c > 0.0))
        .collect();
    if usable.iter().all(Option::is_none) {
        return None;
    }
    let raw: Vec<f64> = usable.iter().map(|c| c.unwrap_or(1.0)).collect();
    let total: f64 = raw.iter().sum();
    Some(raw.iter().map(|c| c / total).collect())
}

/// Compute market-implied equilibrium returns.
///
/// When capitalisation is wholly unavailable the model does not fail: Pi is
/// set to a uniform vector equal to the overall historical mean return and
/// the estimate is flagged as degraded.
pub fn implied_equilibrium_returns(
    input: &EquilibriumInput,
) -> InvexisResult<ComputationOutput<EquilibriumOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_symbols(&input.symbols, "symbols")?;
    let n = input.symbols.len();
    validate_covariance(&input.covariance, n, "covariance")?;

    if !input.risk_aversion.is_finite() || input.risk_aversion <= 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "risk_aversion".into(),
            reason: "risk_aversion must be positive".into(),
        });
    }

    for s in &input.symbols {
        match input.market_caps.get(s) {
            Some(c) if !c.is_finite() || *c <= 0.0 => {
                warnings.push(format!("Market cap for {} is unusable ({}); using 1", s, c));
            }
            None if !input.market_caps.is_empty() => {
                warnings.push(format!("Market cap for {} unavailable; using 1", s));
            }
            _ => {}
        }
    }

    let (market_weights, implied_returns) =
        match market_cap_weights(&input.symbols, &input.market_caps) {
            Some(w) => {
                let sigma_w = mat_vec_multiply(&input.covariance, &w);
                let pi: Vec<f64> = sigma_w.iter().map(|v| input.risk_aversion * v).collect();
                (w, Estimate::computed(pi))
            }
            None => {
                if input.mean_returns.len() != n {
                    return Err(InvexisError::length_mismatch(
                        "mean_returns (required when market caps are unavailable)",
                        n,
                        input.mean_returns.len(),
                    ));
                }
                let overall = input.mean_returns.iter().sum::<f64>() / n as f64;
                let reason = format!(
                    "Market caps unavailable for {:?}; Pi set to uniform historical mean {:.6}",
                    input.symbols, overall
                );
                warn!(%reason, "equilibrium returns degraded");
                (vec![1.0 / n as f64; n], Estimate::degraded(vec![overall; n], reason))
            }
        };
    note_degraded(&implied_returns, &mut warnings);

    let output = EquilibriumOutput {
        symbols: input.symbols.clone(),
        market_weights,
        implied_returns,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Market-implied equilibrium returns (reverse optimisation)",
        &serde_json::json!({
            "n_assets": n,
            "risk_aversion": input.risk_aversion,
            "n_market_caps": input.market_caps.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
