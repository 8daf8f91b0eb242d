use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::warn;

use crate::error::InvexisError;
use crate::linalg::{
    mat_add, mat_inverse, mat_multiply, mat_scale, mat_transpose, mat_vec_multiply,
    validate_covariance, vec_dot,
};
use crate::types::{
    note_degraded, validate_symbols, with_metadata, ComputationOutput, Estimate, Matrix, Symbol,
};
use crate::views::sentiment::ViewSet;
use crate::InvexisResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Input to the Black-Litterman blender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackLittermanInput {
    /// Effective symbol set, matching Pi and Sigma ordering.
    pub symbols: Vec<Symbol>,
    /// Implied equilibrium returns (Pi).
    pub implied_returns: Vec<f64>,
    /// N x N covariance (Sigma).
    pub covariance: Matrix,
    /// View set (P, Q, Omega). Omitted means no views.
    #[serde(default)]
    pub views: Option<ViewSet>,
    /// Weight of the prior relative to the views (tau).
    #[serde(default = "default_tau")]
    pub tau: f64,
    /// Risk aversion used for the mean-variance weights.
    #[serde(default = "default_risk_aversion_opt")]
    pub risk_aversion: f64,
}

pub fn default_tau() -> f64 {
    0.05
}

pub fn default_risk_aversion_opt() -> f64 {
    3.0
}

/// Comparison of prior (equilibrium) vs posterior return for one asset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnComparison {
    pub symbol: Symbol,
    pub prior_return: f64,
    pub posterior_return: f64,
    pub shift: f64,
}

/// Output of the Black-Litterman blender.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlackLittermanOutput {
    pub symbols: Vec<Symbol>,
    pub posterior_returns: Estimate<Vec<f64>>,
    pub optimal_weights: Estimate<Vec<f64>>,
    pub prior_vs_posterior: Vec<ReturnComparison>,
    /// w* . E[R]
    pub portfolio_expected_return: f64,
    /// sqrt(w*' Sigma w*)
    pub portfolio_volatility: f64,
    pub n_views: usize,
}

// ---------------------------------------------------------------------------
// Posterior returns
// ---------------------------------------------------------------------------

/// Blend equilibrium returns with views:
///
/// ```text
/// E[R] = [ (tau*Sigma)^-1 + P' Omega^-1 P ]^-1 * [ (tau*Sigma)^-1 Pi + P' Omega^-1 Q ]
/// ```
///
/// With no views Pi is returned unchanged. Shape mismatches are fatal; a
/// singular Omega, tau*Sigma or bracket matrix degrades to Pi.
pub fn posterior_returns(
    pi: &[f64],
    sigma: &[Vec<f64>],
    views: &ViewSet,
    tau: f64,
) -> InvexisResult<Estimate<Vec<f64>>> {
    let n = pi.len();
    if n == 0 {
        return Err(InvexisError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    validate_covariance(sigma, n, "covariance")?;
    views.validate(n)?;
    if !tau.is_finite() || tau <= 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "tau".into(),
            reason: "tau must be positive".into(),
        });
    }

    if views.is_empty() {
        return Ok(Estimate::computed(pi.to_vec()));
    }

    match blend(pi, sigma, views, tau) {
        Ok(posterior) => Ok(Estimate::computed(posterior)),
        Err(InvexisError::SingularMatrix { context }) => {
            let reason = format!(
                "Singular matrix in Black-Litterman blend ({}); posterior falls back to prior",
                context
            );
            warn!(%reason, "posterior returns degraded");
            Ok(Estimate::degraded(pi.to_vec(), reason))
        }
        Err(e) => Err(e),
    }
}

fn blend(pi: &[f64], sigma: &[Vec<f64>], views: &ViewSet, tau: f64) -> InvexisResult<Vec<f64>> {
    let n = pi.len();
    let p_mat = &views.pick_matrix;

    let tau_sigma = mat_scale(sigma, tau);
    let tau_sigma_inv = mat_inverse(&tau_sigma, "tau * Sigma")?;
    let omega_inv = mat_inverse(&views.omega, "Omega")?;

    // P' * Omega^-1  (N x K)
    let p_t = mat_transpose(p_mat, n);
    let pt_omega_inv = mat_multiply(&p_t, &omega_inv);

    // Left: (tau*Sigma)^-1 + P' Omega^-1 P  (N x N)
    let pt_omega_inv_p = mat_multiply(&pt_omega_inv, p_mat);
    let left = mat_add(&tau_sigma_inv, &pt_omega_inv_p);
    let left_inv = mat_inverse(&left, "posterior precision bracket")?;

    // Right: (tau*Sigma)^-1 Pi + P' Omega^-1 Q  (N x 1)
    let tau_sigma_inv_pi = mat_vec_multiply(&tau_sigma_inv, pi);
    let pt_omega_inv_q = mat_vec_multiply(&pt_omega_inv, &views.view_returns);
    let right: Vec<f64> = tau_sigma_inv_pi
        .iter()
        .zip(pt_omega_inv_q.iter())
        .map(|(a, b)| a + b)
        .collect();

    let posterior = mat_vec_multiply(&left_inv, &right);
    if posterior.iter().any(|v| !v.is_finite()) {
        return Err(InvexisError::SingularMatrix {
            context: "posterior returns overflowed".into(),
        });
    }
    Ok(posterior)
}

// ---------------------------------------------------------------------------
// Optimal weights
// ---------------------------------------------------------------------------

/// Equal weights 1/N.
pub fn equal_weights(n: usize) -> Vec<f64> {
    vec![1.0 / n as f64; n]
}

/// Unconstrained mean-variance weights w = Sigma^-1 E[R] / delta, normalised
/// to sum to 1. No long-only or bound constraints are applied, so weights may
/// be negative or exceed 1.
///
/// A singular Sigma, or raw weights summing to exactly zero, fall back to
/// equal weights.
pub fn optimal_weights(
    posterior: &[f64],
    sigma: &[Vec<f64>],
    risk_aversion: f64,
) -> InvexisResult<Estimate<Vec<f64>>> {
    let n = posterior.len();
    if n == 0 {
        return Err(InvexisError::InsufficientData(
            "At least one asset required".into(),
        ));
    }
    validate_covariance(sigma, n, "covariance")?;
    if !risk_aversion.is_finite() || risk_aversion <= 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "risk_aversion".into(),
            reason: "risk_aversion must be positive".into(),
        });
    }

    let sigma_inv = match mat_inverse(sigma, "Sigma") {
        Ok(inv) => inv,
        Err(InvexisError::SingularMatrix { .. }) => {
            let reason = "Covariance matrix is singular; optimal weights fall back to equal weights";
            warn!(n_assets = n, "{}", reason);
            return Ok(Estimate::degraded(equal_weights(n), reason));
        }
        Err(e) => return Err(e),
    };

    let raw: Vec<f64> = mat_vec_multiply(&sigma_inv, posterior)
        .iter()
        .map(|v| v / risk_aversion)
        .collect();
    let total: f64 = raw.iter().sum();

    if total == 0.0 || !total.is_finite() {
        let reason = format!(
            "Raw optimal weights sum to {}; cannot normalise, using equal weights",
            total
        );
        warn!(%reason, "optimal weights degraded");
        return Ok(Estimate::degraded(equal_weights(n), reason));
    }

    Ok(Estimate::computed(raw.iter().map(|w| w / total).collect()))
}

/// Normalise caller-supplied weights to sum to 1. Weights summing to zero
/// fall back to equal weights.
pub fn normalize_weights(weights: &[f64]) -> InvexisResult<Estimate<Vec<f64>>> {
    if weights.is_empty() {
        return Err(InvexisError::InsufficientData(
            "At least one weight required".into(),
        ));
    }
    if let Some(i) = weights.iter().position(|w| !w.is_finite()) {
        return Err(InvexisError::InvalidInput {
            field: format!("weights[{}]", i),
            reason: "Weight must be finite".into(),
        });
    }
    let total: f64 = weights.iter().sum();
    if total == 0.0 {
        return Ok(Estimate::degraded(
            equal_weights(weights.len()),
            "Weights sum to zero; defaulting to equal weights",
        ));
    }
    Ok(Estimate::computed(weights.iter().map(|w| w / total).collect()))
}

// ---------------------------------------------------------------------------
// Combined report
// ---------------------------------------------------------------------------

/// Run the blender end to end: posterior returns, optimal weights and
/// per-asset prior-vs-posterior shifts.
pub fn run_black_litterman(
    input: &BlackLittermanInput,
) -> InvexisResult<ComputationOutput<BlackLittermanOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_symbols(&input.symbols, "symbols")?;
    let n = input.symbols.len();
    if input.implied_returns.len() != n {
        return Err(InvexisError::length_mismatch(
            "implied_returns",
            n,
            input.implied_returns.len(),
        ));
    }

    let no_views = ViewSet::empty(n);
    let views = input.views.as_ref().unwrap_or(&no_views);

    let posterior = posterior_returns(&input.implied_returns, &input.covariance, views, input.tau)?;
    note_degraded(&posterior, &mut warnings);
    let weights = optimal_weights(&posterior.value, &input.covariance, input.risk_aversion)?;
    note_degraded(&weights, &mut warnings);

    let prior_vs_posterior: Vec<ReturnComparison> = input
        .symbols
        .iter()
        .enumerate()
        .map(|(i, s)| ReturnComparison {
            symbol: s.clone(),
            prior_return: input.implied_returns[i],
            posterior_return: posterior.value[i],
            shift: posterior.value[i] - input.implied_returns[i],
        })
        .collect();

    let portfolio_expected_return = vec_dot(&weights.value, &posterior.value);
    let sigma_w = mat_vec_multiply(&input.covariance, &weights.value);
    let portfolio_variance = vec_dot(&weights.value, &sigma_w);
    let portfolio_volatility = portfolio_variance.max(0.0).sqrt();

    for (s, w) in input.symbols.iter().zip(weights.value.iter()) {
        if *w < 0.0 {
            warnings.push(format!("Short position: {} has weight {:.4}", s, w));
        } else if *w > 1.0 {
            warnings.push(format!("Leveraged position: {} has weight {:.4}", s, w));
        }
    }

    let output = BlackLittermanOutput {
        symbols: input.symbols.clone(),
        posterior_returns: posterior,
        optimal_weights: weights,
        prior_vs_posterior,
        portfolio_expected_return,
        portfolio_volatility,
        n_views: views.len(),
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Black-Litterman posterior returns with unconstrained mean-variance weights",
        &serde_json::json!({
            "n_assets": n,
            "n_views": views.len(),
            "tau": input.tau,
            "risk_aversion": input.risk_aversion,
            "constraints": "none (weights normalised to sum to 1)",
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::views::sentiment::{build_views, ViewParameters};

    fn two_asset_sigma() -> Matrix {
        vec![vec![0.04, 0.006], vec![0.006, 0.09]]
    }

    fn relative_view(q: f64, omega: f64) -> ViewSet {
        ViewSet {
            n_assets: 2,
            pick_matrix: vec![vec![1.0, -1.0]],
            view_returns: vec![q],
            omega: vec![vec![omega]],
            views: Vec::new(),
        }
    }

    #[test]
    fn test_no_views_returns_pi_exactly() {
        let pi = vec![0.066, 0.099];
        let post = posterior_returns(&pi, &two_asset_sigma(), &ViewSet::empty(2), 0.05).unwrap();
        assert_eq!(post.value, pi);
        assert!(!post.is_degraded());
    }

    #[test]
    fn test_relative_view_moves_spread_toward_view() {
        let pi = vec![0.066, 0.099];
        let post = posterior_returns(&pi, &two_asset_sigma(), &relative_view(0.02, 0.001), 0.05)
            .unwrap();
        let prior_spread = pi[0] - pi[1];
        let post_spread = post.value[0] - post.value[1];
        assert!(post_spread > prior_spread);
        assert!(post_spread < 0.02);
    }

    #[test]
    fn test_single_asset_closed_form() {
        // One asset, absolute view on it: posterior is the precision-weighted
        // average of prior and view.
        let pi = vec![0.05];
        let sigma = vec![vec![0.04]];
        let views = ViewSet {
            n_assets: 1,
            pick_matrix: vec![vec![1.0]],
            view_returns: vec![0.10],
            omega: vec![vec![0.002]],
            views: Vec::new(),
        };
        let tau = 0.05;
        let post = posterior_returns(&pi, &sigma, &views, tau).unwrap();
        let prec_prior = 1.0 / (tau * 0.04);
        let prec_view = 1.0 / 0.002;
        let expected = (prec_prior * 0.05 + prec_view * 0.10) / (prec_prior + prec_view);
        assert!((post.value[0] - expected).abs() < 1e-12);
    }

    #[test]
    fn test_singular_omega_falls_back_to_prior() {
        let pi = vec![0.066, 0.099];
        let post = posterior_returns(&pi, &two_asset_sigma(), &relative_view(0.02, 0.0), 0.05)
            .unwrap();
        assert!(post.is_degraded());
        assert_eq!(post.value, pi);
    }

    #[test]
    fn test_singular_sigma_in_blend_falls_back_to_prior() {
        let pi = vec![0.01, 0.01];
        let sigma = vec![vec![0.01, 0.01], vec![0.01, 0.01]];
        let post = posterior_returns(&pi, &sigma, &relative_view(0.02, 0.001), 0.05).unwrap();
        assert!(post.is_degraded());
        assert_eq!(post.value, pi);
    }

    #[test]
    fn test_view_shape_mismatch_is_fatal() {
        let pi = vec![0.066, 0.099];
        let mut views = relative_view(0.02, 0.001);
        views.view_returns.push(0.01);
        assert!(matches!(
            posterior_returns(&pi, &two_asset_sigma(), &views, 0.05),
            Err(InvexisError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_blend_is_deterministic() {
        let sigma = vec![
            vec![0.0004, 0.0001, 0.00005],
            vec![0.0001, 0.0009, 0.0002],
            vec![0.00005, 0.0002, 0.0016],
        ];
        let symbols: Vec<Symbol> = vec!["P".into(), "A".into(), "B".into()];
        let views =
            build_views(&symbols, &[0.1, 0.6, -0.3], &sigma, &ViewParameters::default()).unwrap();
        let pi = vec![0.0003, 0.0005, 0.0008];
        let a = posterior_returns(&pi, &sigma, &views, 0.05).unwrap();
        let b = posterior_returns(&pi, &sigma, &views, 0.05).unwrap();
        assert_eq!(a, b);
        let bits_a: Vec<u64> = a.value.iter().map(|v| v.to_bits()).collect();
        let bits_b: Vec<u64> = b.value.iter().map(|v| v.to_bits()).collect();
        assert_eq!(bits_a, bits_b);
    }

    #[test]
    fn test_optimal_weights_sum_to_one() {
        let w = optimal_weights(&[0.066, 0.099], &two_asset_sigma(), 3.0).unwrap();
        let total: f64 = w.value.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
        assert!(!w.is_degraded());
    }

    #[test]
    fn test_optimal_weights_recover_market_weights_from_pi() {
        // Pi = delta * Sigma * w_mkt, so Sigma^-1 Pi / delta normalised is w_mkt.
        let sigma = two_asset_sigma();
        let w_mkt = [0.6, 0.4];
        let pi: Vec<f64> = mat_vec_multiply(&sigma, &w_mkt)
            .iter()
            .map(|v| 2.5 * v)
            .collect();
        let w = optimal_weights(&pi, &sigma, 3.0).unwrap();
        assert!((w.value[0] - 0.6).abs() < 1e-9);
        assert!((w.value[1] - 0.4).abs() < 1e-9);
    }

    #[test]
    fn test_optimal_weights_may_be_negative() {
        let w = optimal_weights(&[0.10, -0.05], &two_asset_sigma(), 3.0).unwrap();
        assert!(w.value[1] < 0.0);
        assert!(w.value[0] > 1.0);
        let total: f64 = w.value.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_singular_sigma_gives_equal_weights() {
        let sigma = vec![vec![0.01, 0.01], vec![0.01, 0.01]];
        let w = optimal_weights(&[0.01, 0.02], &sigma, 3.0).unwrap();
        assert!(w.is_degraded());
        assert_eq!(w.value, vec![0.5, 0.5]);
    }

    #[test]
    fn test_zero_raw_sum_gives_equal_weights() {
        let sigma = vec![vec![0.01, 0.0], vec![0.0, 0.01]];
        let w = optimal_weights(&[0.01, -0.01], &sigma, 3.0).unwrap();
        assert!(w.is_degraded());
        assert_eq!(w.value, vec![0.5, 0.5]);
    }

    #[test]
    fn test_normalize_weights() {
        let w = normalize_weights(&[2.0, 2.0, 4.0]).unwrap();
        assert_eq!(w.value, vec![0.25, 0.25, 0.5]);
        let z = normalize_weights(&[1.0, -1.0]).unwrap();
        assert!(z.is_degraded());
        assert_eq!(z.value, vec![0.5, 0.5]);
    }

    #[test]
    fn test_run_black_litterman_report() {
        let input = BlackLittermanInput {
            symbols: vec!["A".into(), "B".into()],
            implied_returns: vec![0.066, 0.099],
            covariance: two_asset_sigma(),
            views: Some(relative_view(0.02, 0.001)),
            tau: 0.05,
            risk_aversion: 3.0,
        };
        let result = run_black_litterman(&input).unwrap();
        let out = &result.result;
        assert_eq!(out.n_views, 1);
        assert!(out.prior_vs_posterior[0].shift > 0.0);
        assert!(out.portfolio_volatility > 0.0);
        let total: f64 = out.optimal_weights.value.iter().sum();
        assert!((total - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_run_black_litterman_defaults_from_json() {
        let json = r#"{
            "symbols": ["A", "B"],
            "implied_returns": [0.066, 0.099],
            "covariance": [[0.04, 0.006], [0.006, 0.09]]
        }"#;
        let input: BlackLittermanInput = serde_json::from_str(json).unwrap();
        assert_eq!(input.tau, 0.05);
        assert_eq!(input.risk_aversion, 3.0);
        let out = run_black_litterman(&input).unwrap().result;
        assert_eq!(out.n_views, 0);
        assert_eq!(out.posterior_returns.value, vec![0.066, 0.099]);
    }
}
