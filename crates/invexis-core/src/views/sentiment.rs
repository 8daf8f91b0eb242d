use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Instant;
use tracing::debug;

use crate::error::InvexisError;
use crate::linalg::{mat_multiply, mat_scale, validate_covariance, vec_dot};
use crate::types::{validate_symbols, with_metadata, ComputationOutput, Matrix, Symbol};
use crate::InvexisResult;

/// Added to every Omega diagonal entry so the matrix stays invertible even
/// when two assets are perfectly correlated.
pub const OMEGA_EPSILON: f64 = 1e-9;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Tunable parameters for turning sentiment into relative views.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ViewParameters {
    /// Minimum absolute sentiment difference (exclusive) before a view is
    /// emitted.
    #[serde(default = "default_sentiment_diff_threshold")]
    pub sentiment_diff_threshold: f64,
    /// Confidence scale applied to Sigma when building Omega.
    #[serde(default = "default_tau_for_omega")]
    pub tau_for_omega: f64,
    /// Expected return differential per unit of sentiment difference.
    #[serde(default = "default_sentiment_to_return_factor")]
    pub sentiment_to_return_factor: f64,
}

fn default_sentiment_diff_threshold() -> f64 {
    0.10
}

fn default_tau_for_omega() -> f64 {
    0.025
}

fn default_sentiment_to_return_factor() -> f64 {
    0.001
}

impl Default for ViewParameters {
    fn default() -> Self {
        ViewParameters {
            sentiment_diff_threshold: default_sentiment_diff_threshold(),
            tau_for_omega: default_tau_for_omega(),
            sentiment_to_return_factor: default_sentiment_to_return_factor(),
        }
    }
}

/// One relative view: `asset` outperforms `pivot` by `expected_return`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentimentView {
    pub asset: Symbol,
    pub pivot: Symbol,
    pub sentiment_diff: f64,
    pub expected_return: f64,
    /// Omega diagonal entry for this view.
    pub uncertainty: f64,
}

/// Structured views (P, Q, Omega). `K` may be zero.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ViewSet {
    /// Column count of the pick matrix (number of assets).
    pub n_assets: usize,
    /// K x N pick matrix; each row holds +1 at the asset and -1 at the pivot.
    pub pick_matrix: Matrix,
    /// K view returns (Q).
    pub view_returns: Vec<f64>,
    /// K x K diagonal view-uncertainty matrix (Omega).
    pub omega: Matrix,
    pub views: Vec<SentimentView>,
}

impl ViewSet {
    /// A valid "no views" result over `n_assets` assets.
    pub fn empty(n_assets: usize) -> Self {
        ViewSet {
            n_assets,
            pick_matrix: Vec::new(),
            view_returns: Vec::new(),
            omega: Vec::new(),
            views: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.pick_matrix.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pick_matrix.is_empty()
    }

    /// Check that P is K x N, Q has K entries and Omega is K x K.
    pub fn validate(&self, n_assets: usize) -> InvexisResult<()> {
        let k = self.pick_matrix.len();
        if self.n_assets != n_assets {
            return Err(InvexisError::length_mismatch(
                "views.n_assets",
                n_assets,
                self.n_assets,
            ));
        }
        for row in &self.pick_matrix {
            if row.len() != n_assets {
                return Err(InvexisError::shape_mismatch(
                    "views.pick_matrix",
                    (k, n_assets),
                    (k, row.len()),
                ));
            }
        }
        if self.view_returns.len() != k {
            return Err(InvexisError::length_mismatch(
                "views.view_returns",
                k,
                self.view_returns.len(),
            ));
        }
        if self.omega.len() != k || self.omega.iter().any(|r| r.len() != k) {
            let cols = self.omega.first().map(|r| r.len()).unwrap_or(0);
            return Err(InvexisError::shape_mismatch(
                "views.omega",
                (k, k),
                (self.omega.len(), cols),
            ));
        }
        Ok(())
    }
}

/// Input to the view generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ViewInput {
    /// Ordered effective symbol set; `symbols[0]` is the pivot.
    pub symbols: Vec<Symbol>,
    /// Compound sentiment per symbol; absent symbols score 0.0.
    #[serde(default)]
    pub sentiment: BTreeMap<Symbol, f64>,
    /// N x N covariance in `symbols` order.
    pub covariance: Matrix,
    #[serde(default)]
    pub parameters: ViewParameters,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Look up each symbol's score, defaulting to 0.0.
pub fn sentiment_vector(symbols: &[Symbol], sentiment: &BTreeMap<Symbol, f64>) -> Vec<f64> {
    symbols
        .iter()
        .map(|s| sentiment.get(s).copied().unwrap_or(0.0))
        .collect()
}

/// Build pivot-relative views from per-asset sentiment.
///
/// `symbols[0]` is the pivot. Every other asset whose sentiment differs from
/// the pivot's by strictly more than the threshold yields one view, so at
/// most N - 1 views are produced and the pivot is never compared with itself.
pub fn build_views(
    symbols: &[Symbol],
    sentiment: &[f64],
    covariance: &[Vec<f64>],
    params: &ViewParameters,
) -> InvexisResult<ViewSet> {
    let n = symbols.len();
    validate_covariance(covariance, n, "covariance")?;
    if sentiment.len() != n {
        return Err(InvexisError::length_mismatch("sentiment", n, sentiment.len()));
    }
    validate_parameters(params)?;
    if let Some(i) = sentiment.iter().position(|s| !s.is_finite()) {
        return Err(InvexisError::InvalidInput {
            field: format!("sentiment[{}]", symbols[i]),
            reason: "Sentiment score must be finite".into(),
        });
    }

    if n < 2 {
        return Ok(ViewSet::empty(n));
    }

    let pivot = 0;
    let mut pick_matrix: Matrix = Vec::new();
    let mut view_returns: Vec<f64> = Vec::new();
    let mut diffs: Vec<(usize, f64)> = Vec::new();

    for i in 1..n {
        let diff = sentiment[i] - sentiment[pivot];
        if diff.abs() > params.sentiment_diff_threshold {
            let mut row = vec![0.0; n];
            row[i] = 1.0;
            row[pivot] = -1.0;
            pick_matrix.push(row);
            view_returns.push(diff * params.sentiment_to_return_factor);
            diffs.push((i, diff));
        } else {
            debug!(
                asset = %symbols[i],
                diff,
                threshold = params.sentiment_diff_threshold,
                "no view emitted"
            );
        }
    }

    if pick_matrix.is_empty() {
        return Ok(ViewSet::empty(n));
    }

    // Omega = diag(diag(P * tau*Sigma * P')) + eps * I
    let k = pick_matrix.len();
    let tau_sigma = mat_scale(covariance, params.tau_for_omega);
    let p_tau_sigma = mat_multiply(&pick_matrix, &tau_sigma);
    let mut omega = vec![vec![0.0; k]; k];
    for v in 0..k {
        omega[v][v] = vec_dot(&p_tau_sigma[v], &pick_matrix[v]) + OMEGA_EPSILON;
    }

    let views = diffs
        .iter()
        .enumerate()
        .map(|(v, (i, diff))| SentimentView {
            asset: symbols[*i].clone(),
            pivot: symbols[pivot].clone(),
            sentiment_diff: *diff,
            expected_return: view_returns[v],
            uncertainty: omega[v][v],
        })
        .collect();

    Ok(ViewSet {
        n_assets: n,
        pick_matrix,
        view_returns,
        omega,
        views,
    })
}

/// Generate the (P, Q, Omega) view set from a sentiment map.
pub fn generate_views(input: &ViewInput) -> InvexisResult<ComputationOutput<ViewSet>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    validate_symbols(&input.symbols, "symbols")?;
    for key in input.sentiment.keys() {
        if !input.symbols.contains(key) {
            warnings.push(format!("Sentiment for unknown symbol '{}' ignored", key));
        }
    }

    let scores = sentiment_vector(&input.symbols, &input.sentiment);
    let views = build_views(
        &input.symbols,
        &scores,
        &input.covariance,
        &input.parameters,
    )?;

    if views.is_empty() {
        warnings.push(
            "No sentiment difference exceeded the threshold; posterior will equal the prior"
                .into(),
        );
    }

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Pivot-relative sentiment views",
        &serde_json::json!({
            "pivot": input.symbols.first(),
            "n_assets": input.symbols.len(),
            "sentiment_diff_threshold": input.parameters.sentiment_diff_threshold,
            "tau_for_omega": input.parameters.tau_for_omega,
            "sentiment_to_return_factor": input.parameters.sentiment_to_return_factor,
            "omega_epsilon": OMEGA_EPSILON,
        }),
        warnings,
        elapsed,
        views,
    ))
}

fn validate_parameters(params: &ViewParameters) -> InvexisResult<()> {
    if !params.sentiment_diff_threshold.is_finite() || params.sentiment_diff_threshold < 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "sentiment_diff_threshold".into(),
            reason: "Threshold must be a non-negative number".into(),
        });
    }
    if !params.tau_for_omega.is_finite() || params.tau_for_omega <= 0.0 {
        return Err(InvexisError::InvalidInput {
            field: "tau_for_omega".into(),
            reason: "tau_for_omega must be positive".into(),
        });
    }
    if !params.sentiment_to_return_factor.is_finite() {
        return Err(InvexisError::InvalidInput {
            field: "sentiment_to_return_factor".into(),
            reason: "Factor must be finite".into(),
        });
    }
    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn symbols(names: &[&str]) -> Vec<Symbol> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn three_asset_cov() -> Matrix {
        vec![
            vec![0.0004, 0.0001, 0.00005],
            vec![0.0001, 0.0009, 0.0002],
            vec![0.00005, 0.0002, 0.0016],
        ]
    }

    #[test]
    fn test_threshold_selects_views() {
        let syms = symbols(&["PIV", "A", "B"]);
        let views = build_views(
            &syms,
            &[0.0, 0.5, 0.05],
            &three_asset_cov(),
            &ViewParameters::default(),
        )
        .unwrap();

        assert_eq!(views.len(), 1);
        assert_eq!(views.pick_matrix[0], vec![-1.0, 1.0, 0.0]);
        assert!((views.view_returns[0] - 0.0005).abs() < 1e-15);
        assert_eq!(views.views[0].asset, "A");
        assert_eq!(views.views[0].pivot, "PIV");
    }

    #[test]
    fn test_omega_from_pair_covariance() {
        let syms = symbols(&["PIV", "A", "B"]);
        let cov = three_asset_cov();
        let views = build_views(&syms, &[0.0, 0.5, -0.4], &cov, &ViewParameters::default())
            .unwrap();
        assert_eq!(views.len(), 2);
        // tau * (var_A + var_P - 2 cov_AP) + eps
        let expected_a = 0.025 * (0.0009 + 0.0004 - 2.0 * 0.0001) + OMEGA_EPSILON;
        let expected_b = 0.025 * (0.0016 + 0.0004 - 2.0 * 0.00005) + OMEGA_EPSILON;
        assert!((views.omega[0][0] - expected_a).abs() < 1e-15);
        assert!((views.omega[1][1] - expected_b).abs() < 1e-15);
        assert_eq!(views.omega[0][1], 0.0);
        assert!(views.view_returns[1] < 0.0);
    }

    #[test]
    fn test_never_more_than_n_minus_one_views() {
        let syms = symbols(&["P", "A", "B", "C"]);
        let cov = vec![
            vec![0.01, 0.0, 0.0, 0.0],
            vec![0.0, 0.01, 0.0, 0.0],
            vec![0.0, 0.0, 0.01, 0.0],
            vec![0.0, 0.0, 0.0, 0.01],
        ];
        let views = build_views(&syms, &[-1.0, 1.0, 1.0, 1.0], &cov, &ViewParameters::default())
            .unwrap();
        assert_eq!(views.len(), 3);
        for row in &views.pick_matrix {
            assert_eq!(row[0], -1.0);
            assert_eq!(row.iter().filter(|v| **v == 1.0).count(), 1);
        }
    }

    #[test]
    fn test_exact_threshold_emits_no_view() {
        let syms = symbols(&["P", "A"]);
        let cov = vec![vec![0.01, 0.0], vec![0.0, 0.01]];
        let params = ViewParameters {
            sentiment_diff_threshold: 0.25,
            ..ViewParameters::default()
        };
        let views = build_views(&syms, &[0.0, 0.25], &cov, &params).unwrap();
        assert!(views.is_empty());
    }

    #[test]
    fn test_single_asset_has_no_views() {
        let views = build_views(
            &symbols(&["ONLY"]),
            &[0.9],
            &[vec![0.0004]],
            &ViewParameters::default(),
        )
        .unwrap();
        assert_eq!(views, ViewSet::empty(1));
        assert!(views.validate(1).is_ok());
    }

    #[test]
    fn test_missing_sentiment_defaults_to_zero() {
        let input = ViewInput {
            symbols: symbols(&["PIV", "A", "B"]),
            sentiment: BTreeMap::from([("A".to_string(), 0.3)]),
            covariance: three_asset_cov(),
            parameters: ViewParameters::default(),
        };
        let out = generate_views(&input).unwrap().result;
        assert_eq!(out.len(), 1);
        assert!((out.views[0].sentiment_diff - 0.3).abs() < 1e-15);
    }

    #[test]
    fn test_covariance_mismatch_is_fatal() {
        let input = ViewInput {
            symbols: symbols(&["PIV", "A"]),
            sentiment: BTreeMap::new(),
            covariance: three_asset_cov(),
            parameters: ViewParameters::default(),
        };
        assert!(matches!(
            generate_views(&input),
            Err(InvexisError::DimensionMismatch { .. })
        ));
    }

    #[test]
    fn test_non_finite_sentiment_rejected() {
        let syms = symbols(&["P", "A"]);
        let cov = vec![vec![0.01, 0.0], vec![0.0, 0.01]];
        assert!(build_views(&syms, &[0.0, f64::NAN], &cov, &ViewParameters::default()).is_err());
    }

    #[test]
    fn test_view_set_validate_catches_bad_shapes() {
        let mut vs = ViewSet::empty(2);
        vs.pick_matrix.push(vec![1.0, -1.0]);
        assert!(vs.validate(2).is_err());
        vs.view_returns.push(0.001);
        vs.omega.push(vec![0.0001]);
        assert!(vs.validate(2).is_ok());
        assert!(vs.validate(3).is_err());
    }

    #[test]
    fn test_parameters_deserialise_with_defaults() {
        let p: ViewParameters = serde_json::from_str(r#"{"tau_for_omega": 0.05}"#).unwrap();
        assert_eq!(p.tau_for_omega, 0.05);
        assert_eq!(p.sentiment_diff_threshold, 0.10);
        assert_eq!(p.sentiment_to_return_factor, 0.001);
    }
}
