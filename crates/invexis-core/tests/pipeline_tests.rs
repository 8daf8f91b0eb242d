use chrono::NaiveDate;
use invexis_core::market::returns::{AssetPriceSeries, PricePoint};
use invexis_core::monte_carlo::paths::{simulate_correlated_paths, PathSimulationInput};
use invexis_core::monte_carlo::portfolio::simulate_portfolio_value;
use invexis_core::pipeline::{
    cache_key, run_forecast, simulate_portfolio, ForecastCache, ForecastInput, ModelParameters,
    SimulationRequest,
};
use invexis_core::InvexisError;
use pretty_assertions::assert_eq;
use std::collections::BTreeMap;

// ===========================================================================
// Fixtures
// ===========================================================================

fn trading_day(offset: usize) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 2).unwrap() + chrono::Duration::days(offset as i64)
}

/// Deterministic oscillating price series with a mild trend. Distinct
/// frequencies keep the assets from being collinear.
fn synthetic_series(
    symbol: &str,
    start: f64,
    trend: f64,
    wobble: f64,
    freq: f64,
    len: usize,
) -> AssetPriceSeries {
    AssetPriceSeries {
        symbol: symbol.into(),
        prices: (0..len)
            .map(|i| PricePoint {
                date: trading_day(i),
                close: start * (1.0 + trend * i as f64) * (1.0 + wobble * (freq * i as f64).sin()),
            })
            .collect(),
    }
}

fn three_asset_input(seed: u64) -> ForecastInput {
    ForecastInput {
        price_history: vec![
            synthetic_series("SPY", 470.0, 0.0004, 0.006, 0.9, 60),
            synthetic_series("AAPL", 185.0, 0.0008, 0.015, 2.3, 60),
            synthetic_series("XOM", 102.0, -0.0002, 0.012, 1.7, 60),
        ],
        market_caps: BTreeMap::from([
            ("SPY".to_string(), 5.0e11),
            ("AAPL".to_string(), 2.9e12),
            ("XOM".to_string(), 4.1e11),
        ]),
        sentiment: BTreeMap::from([
            ("SPY".to_string(), 0.05),
            ("AAPL".to_string(), 0.45),
            ("XOM".to_string(), -0.30),
        ]),
        parameters: ModelParameters {
            time_intervals: 30,
            iterations: 50,
            seed: Some(seed),
            ..ModelParameters::default()
        },
    }
}

// ===========================================================================
// Path simulation
// ===========================================================================

#[test]
fn test_two_asset_paths_shape_and_positivity() {
    let input = PathSimulationInput {
        symbols: vec!["AAPL".into(), "MSFT".into()],
        covariance: vec![vec![0.0001, 0.00005], vec![0.00005, 0.00015]],
        mean_returns: vec![0.0006, 0.0005],
        initial_prices: vec![185.0, 375.0],
        time_intervals: 20,
        iterations: 5,
        seed: Some(2024),
        volatility_scale: 1.0,
    };
    let paths = simulate_correlated_paths(&input).unwrap().result.value;
    for asset in &paths.assets {
        assert_eq!((asset.values.len(), asset.values[0].len()), (20, 5));
        assert!(asset.values.iter().flatten().all(|v| *v > 0.0));
    }

    let pv = simulate_portfolio_value(10_000.0, &[0.6, 0.4], &paths).unwrap();
    assert!(pv.values[0].iter().all(|v| *v == 10_000.0));
}

// ===========================================================================
// End-to-end forecast
// ===========================================================================

#[test]
fn test_forecast_end_to_end() {
    let out = run_forecast(&three_asset_input(7)).unwrap();
    let f = &out.result;

    assert_eq!(f.symbols, vec!["SPY", "AAPL", "XOM"]);
    assert_eq!(f.covariance.len(), 3);
    assert_eq!(f.implied_returns.value.len(), 3);
    assert!(!f.implied_returns.is_degraded());

    // AAPL (+0.40) and XOM (-0.35) both clear the 0.10 threshold vs SPY
    assert_eq!(f.views.len(), 2);

    let total: f64 = f.optimal_weights.value.iter().sum();
    assert!((total - 1.0).abs() < 1e-9);

    let paths = &f.paths.value;
    assert_eq!(paths.time_intervals, 30);
    assert_eq!(paths.iterations, 50);
    for (asset, s0) in paths.assets.iter().zip(f.current_prices.iter()) {
        assert!(asset.values[0].iter().all(|v| v == s0));
    }
    assert_eq!(f.median_paths.len(), 3);
    assert_eq!(out.metadata.precision, "ieee754_f64");
}

#[test]
fn test_forecast_is_reproducible_with_seed() {
    let a = run_forecast(&three_asset_input(99)).unwrap().result;
    let b = run_forecast(&three_asset_input(99)).unwrap().result;
    assert_eq!(a.paths, b.paths);
    assert_eq!(a.posterior_returns, b.posterior_returns);
}

#[test]
fn test_asset_with_short_history_is_dropped() {
    let mut input = three_asset_input(1);
    input.price_history.push(AssetPriceSeries {
        symbol: "NEWCO".into(),
        prices: vec![PricePoint {
            date: trading_day(59),
            close: 12.0,
        }],
    });
    let out = run_forecast(&input).unwrap();
    let f = &out.result;
    assert_eq!(f.symbols.len(), 3);
    assert_eq!(f.dropped_symbols[0].symbol, "NEWCO");
    assert_eq!(f.paths.value.assets.len(), 3);
    assert!(out.warnings.iter().any(|w| w.contains("NEWCO")));
}

#[test]
fn test_missing_market_caps_degrade_but_complete() {
    let mut input = three_asset_input(5);
    input.market_caps.clear();
    let f = run_forecast(&input).unwrap().result;
    assert!(f.implied_returns.is_degraded());
    assert!(!f.summary().degraded.is_empty());
    assert_eq!(f.paths.value.assets.len(), 3);
}

#[test]
fn test_no_usable_history_is_fatal() {
    let input = ForecastInput {
        price_history: vec![AssetPriceSeries {
            symbol: "X".into(),
            prices: vec![],
        }],
        market_caps: BTreeMap::new(),
        sentiment: BTreeMap::new(),
        parameters: ModelParameters::default(),
    };
    assert!(matches!(
        run_forecast(&input),
        Err(InvexisError::InsufficientData(_))
    ));
}

// ===========================================================================
// Caller weights and caching
// ===========================================================================

#[test]
fn test_simulate_caller_weights_from_cache() {
    let mut cache = ForecastCache::new();
    let input = three_asset_input(21);
    let forecast = cache.get_or_run(&input).unwrap();

    let request = SimulationRequest {
        weights: BTreeMap::from([("SPY".to_string(), 0.6), ("AAPL".to_string(), 0.4)]),
        initial_value: 10_000.0,
        normalize: false,
    };
    let sim = simulate_portfolio(&forecast.result, &request).unwrap().result;
    assert_eq!(sim.portfolio.mean_path.len(), 30);
    assert_eq!(sim.portfolio.mean_path[0], 10_000.0);
    assert_eq!(sim.portfolio.final_values.len(), 50);
    assert_eq!(sim.weights["XOM"], 0.0);
    assert_eq!(sim.optimal_weights.len(), 3);
    assert!(sim.portfolio.statistics.annual_std_dev >= 0.0);

    let again = cache.get_or_run(&input).unwrap();
    assert!(std::sync::Arc::ptr_eq(&forecast, &again));
    assert_eq!(cache.len(), 1);
    assert!(cache.get(&cache_key(&input).unwrap()).is_some());
}
