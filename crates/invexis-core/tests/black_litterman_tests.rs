use invexis_core::black_litterman::blend::{
    optimal_weights, posterior_returns, run_black_litterman, BlackLittermanInput,
};
use invexis_core::market::equilibrium::{implied_equilibrium_returns, EquilibriumInput};
use invexis_core::views::headlines::{aggregate_sentiment, DEFAULT_MAX_HEADLINES};
use invexis_core::views::sentiment::{build_views, ViewParameters, ViewSet};
use invexis_core::{InvexisError, Matrix, Symbol};
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

// ===========================================================================
// Shared fixtures
// ===========================================================================

fn symbols() -> Vec<Symbol> {
    vec!["SPY".into(), "AAPL".into(), "XOM".into()]
}

// Daily covariance of three liquid names
fn daily_sigma() -> Matrix {
    vec![
        vec![0.000100, 0.000080, 0.000040],
        vec![0.000080, 0.000290, 0.000030],
        vec![0.000040, 0.000030, 0.000250],
    ]
}

fn caps() -> BTreeMap<Symbol, f64> {
    BTreeMap::from([
        ("SPY".to_string(), 5.0e11),
        ("AAPL".to_string(), 3.0e12),
        ("XOM".to_string(), 4.5e11),
    ])
}

fn equilibrium() -> Vec<f64> {
    let input = EquilibriumInput {
        symbols: symbols(),
        covariance: daily_sigma(),
        market_caps: caps(),
        mean_returns: vec![],
        risk_aversion: 2.5,
    };
    implied_equilibrium_returns(&input)
        .unwrap()
        .result
        .implied_returns
        .value
}

// ===========================================================================
// View generation
// ===========================================================================

#[test]
fn test_threshold_example_emits_only_large_difference() {
    // pivot=0.0, A=0.5, B=0.05 with threshold 0.10
    let views = build_views(
        &["PIVOT".into(), "A".into(), "B".into()],
        &[0.0, 0.5, 0.05],
        &daily_sigma(),
        &ViewParameters::default(),
    )
    .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views.pick_matrix[0], vec![-1.0, 1.0, 0.0]);
    assert!((views.view_returns[0] - 0.0005).abs() < 1e-15);
    assert_eq!(views.views[0].asset, "A");
    assert_eq!(views.views[0].pivot, "PIVOT");
}

#[test]
fn test_views_never_exceed_n_minus_one() {
    let views = build_views(
        &symbols(),
        &[-0.9, 0.9, 0.8],
        &daily_sigma(),
        &ViewParameters::default(),
    )
    .unwrap();
    assert_eq!(views.len(), 2);
    for row in &views.pick_matrix {
        // pivot column always -1, never compared with itself
        assert_eq!(row[0], -1.0);
        assert_eq!(row.iter().filter(|v| **v == 1.0).count(), 1);
    }
}

#[test]
fn test_headline_scores_feed_views() {
    let scorer = |h: &str| {
        if h.contains("record") {
            0.7
        } else {
            0.0
        }
    };
    let headlines = BTreeMap::from([
        (
            "AAPL".to_string(),
            vec!["Apple posts record quarter".to_string()],
        ),
        ("XOM".to_string(), vec!["Oil flat".to_string()]),
    ]);
    let sentiment = aggregate_sentiment(&scorer, &symbols(), &headlines, DEFAULT_MAX_HEADLINES);
    let scores: Vec<f64> = symbols().iter().map(|s| sentiment[s]).collect();
    assert_eq!(scores, vec![0.0, 0.7, 0.0]);

    let views = build_views(&symbols(), &scores, &daily_sigma(), &ViewParameters::default())
        .unwrap();
    assert_eq!(views.len(), 1);
    assert_eq!(views.views[0].asset, "AAPL");
}

// ===========================================================================
// Blending
// ===========================================================================

#[test]
fn test_zero_views_posterior_is_prior() {
    let pi = equilibrium();
    let post = posterior_returns(&pi, &daily_sigma(), &ViewSet::empty(3), 0.05).unwrap();
    assert_eq!(post.value, pi);
    assert!(!post.is_degraded());
}

#[test]
fn test_bullish_view_raises_asset_relative_to_pivot() {
    let pi = equilibrium();
    let views = build_views(
        &symbols(),
        &[0.0, 0.8, 0.0],
        &daily_sigma(),
        &ViewParameters::default(),
    )
    .unwrap();
    let post = posterior_returns(&pi, &daily_sigma(), &views, 0.05).unwrap();
    assert!(!post.is_degraded());
    assert!(post.value[1] - post.value[0] > pi[1] - pi[0]);
}

#[test]
fn test_optimal_weights_from_prior_recover_market_weights() {
    let pi = equilibrium();
    let w = optimal_weights(&pi, &daily_sigma(), 3.0).unwrap();
    let total_cap: f64 = caps().values().sum();
    let expected: Vec<f64> = symbols().iter().map(|s| caps()[s] / total_cap).collect();
    for (got, want) in w.value.iter().zip(expected.iter()) {
        assert!((got - want).abs() < 1e-9);
    }
}

#[test]
fn test_single_asset_degenerate_case() {
    let input = EquilibriumInput {
        symbols: vec!["ONLY".into()],
        covariance: vec![vec![0.0004]],
        market_caps: BTreeMap::from([("ONLY".to_string(), 1.0e9)]),
        mean_returns: vec![],
        risk_aversion: 2.5,
    };
    let pi = implied_equilibrium_returns(&input).unwrap().result.implied_returns.value;
    assert!((pi[0] - 2.5 * 0.0004).abs() < 1e-15);

    let bl = run_black_litterman(&BlackLittermanInput {
        symbols: vec!["ONLY".into()],
        implied_returns: pi.clone(),
        covariance: vec![vec![0.0004]],
        views: None,
        tau: 0.05,
        risk_aversion: 3.0,
    })
    .unwrap()
    .result;
    assert_eq!(bl.posterior_returns.value, pi);
    assert_eq!(bl.optimal_weights.value, vec![1.0]);
}

#[test]
fn test_repeated_runs_are_bit_identical() {
    let views = build_views(
        &symbols(),
        &[0.1, 0.6, -0.4],
        &daily_sigma(),
        &ViewParameters::default(),
    )
    .unwrap();
    let input = BlackLittermanInput {
        symbols: symbols(),
        implied_returns: equilibrium(),
        covariance: daily_sigma(),
        views: Some(views),
        tau: 0.05,
        risk_aversion: 3.0,
    };
    let a = run_black_litterman(&input).unwrap().result;
    let b = run_black_litterman(&input).unwrap().result;
    let bits = |v: &[f64]| v.iter().map(|x| x.to_bits()).collect::<Vec<u64>>();
    assert_eq!(
        bits(&a.posterior_returns.value),
        bits(&b.posterior_returns.value)
    );
    assert_eq!(bits(&a.optimal_weights.value), bits(&b.optimal_weights.value));
}

#[test]
fn test_sigma_symbol_mismatch_is_fatal() {
    let input = BlackLittermanInput {
        symbols: symbols(),
        implied_returns: vec![0.001, 0.002],
        covariance: daily_sigma(),
        views: None,
        tau: 0.05,
        risk_aversion: 3.0,
    };
    assert!(matches!(
        run_black_litterman(&input),
        Err(InvexisError::DimensionMismatch { .. })
    ));
}
