use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::time::Instant;
use tracing::warn;

use crate::error::InvexisError;
use crate::types::{with_metadata, ComputationOutput, Matrix, Symbol};
use crate::InvexisResult;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A single closing price observation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePoint {
    pub date: NaiveDate,
    pub close: f64,
}

/// Closing price history for one symbol, in any date order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AssetPriceSeries {
    pub symbol: Symbol,
    pub prices: Vec<PricePoint>,
}

/// Input to the returns estimator: one price series per symbol. The order of
/// `series` fixes the symbol ordering used by every downstream computation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsInput {
    pub series: Vec<AssetPriceSeries>,
}

/// A symbol removed during alignment, with the reason.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DroppedSymbol {
    pub symbol: Symbol,
    pub reason: String,
}

/// Price panel after alignment: every column shares the same date index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricePanel {
    /// Effective symbol set, in input order.
    pub symbols: Vec<Symbol>,
    /// Ascending trading dates common to every symbol.
    pub dates: Vec<NaiveDate>,
    /// Closing prices, `[date][symbol]`.
    pub prices: Matrix,
    pub dropped_symbols: Vec<DroppedSymbol>,
}

/// Log-return statistics for the effective symbol set.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReturnsOutput {
    pub symbols: Vec<Symbol>,
    pub dropped_symbols: Vec<DroppedSymbol>,
    /// Dates of each return row (the later date of each price pair).
    pub dates: Vec<NaiveDate>,
    /// Log returns, `[date][symbol]`.
    pub returns: Matrix,
    /// Sample covariance of log returns (ddof = 1), N x N.
    pub covariance: Matrix,
    /// Mean log return per symbol.
    pub mean_returns: Vec<f64>,
    /// Last aligned close per symbol (S0 for simulation).
    pub last_prices: Vec<f64>,
    pub num_observations: usize,
}

// ---------------------------------------------------------------------------
// Public API
// ---------------------------------------------------------------------------

/// Align the input series onto a common date index.
///
/// Non-finite and non-positive closes are discarded. A symbol with fewer
/// than two valid closes is dropped; the survivors are inner-joined on date
/// so a row missing any symbol is removed. Later duplicates of a date
/// overwrite earlier ones.
pub fn align_prices(input: &ReturnsInput) -> InvexisResult<PricePanel> {
    if input.series.is_empty() {
        return Err(InvexisError::InsufficientData(
            "At least one price series is required".into(),
        ));
    }

    let mut seen = HashSet::new();
    for s in &input.series {
        if !seen.insert(s.symbol.as_str()) {
            return Err(InvexisError::InvalidInput {
                field: "series".into(),
                reason: format!("Duplicate symbol '{}'", s.symbol),
            });
        }
    }

    let mut kept: Vec<(Symbol, BTreeMap<NaiveDate, f64>)> = Vec::new();
    let mut dropped_symbols = Vec::new();

    for s in &input.series {
        let valid: BTreeMap<NaiveDate, f64> = s
            .prices
            .iter()
            .filter(|p| p.close.is_finite() && p.close > 0.0)
            .map(|p| (p.date, p.close))
            .collect();

        if valid.len() < 2 {
            let reason = format!(
                "only {} valid closing price(s), at least 2 required",
                valid.len()
            );
            warn!(symbol = %s.symbol, %reason, "dropping symbol");
            dropped_symbols.push(DroppedSymbol {
                symbol: s.symbol.clone(),
                reason,
            });
            continue;
        }
        kept.push((s.symbol.clone(), valid));
    }

    if kept.is_empty() {
        let names: Vec<&str> = input.series.iter().map(|s| s.symbol.as_str()).collect();
        return Err(InvexisError::InsufficientData(format!(
            "No valid symbols remain after filtering {:?}",
            names
        )));
    }

    let mut common: BTreeSet<NaiveDate> = kept[0].1.keys().copied().collect();
    for (_, series) in kept.iter().skip(1) {
        common.retain(|d| series.contains_key(d));
    }
    let dates: Vec<NaiveDate> = common.into_iter().collect();

    let symbols: Vec<Symbol> = kept.iter().map(|(s, _)| s.clone()).collect();
    if dates.len() < 2 {
        return Err(InvexisError::InsufficientData(format!(
            "Only {} aligned price observation(s) for {:?}, at least 2 required",
            dates.len(),
            symbols
        )));
    }

    let prices: Matrix = dates
        .iter()
        .map(|d| kept.iter().map(|(_, series)| series[d]).collect())
        .collect();

    Ok(PricePanel {
        symbols,
        dates,
        prices,
        dropped_symbols,
    })
}

/// Log returns r_t = ln(P_t / P_{t-1}); the first row is dropped.
pub fn log_returns(prices: &[Vec<f64>]) -> Matrix {
    prices
        .windows(2)
        .map(|w| {
            w[1].iter()
                .zip(w[0].iter())
                .map(|(curr, prev)| (curr / prev).ln())
                .collect()
        })
        .collect()
}

/// Per-column arithmetic mean.
pub fn column_means(rows: &[Vec<f64>]) -> Vec<f64> {
    let t = rows.len();
    let n = rows.first().map(|r| r.len()).unwrap_or(0);
    let mut means = vec![0.0; n];
    if t == 0 {
        return means;
    }
    for row in rows {
        for (m, v) in means.iter_mut().zip(row.iter()) {
            *m += v;
        }
    }
    for m in &mut means {
        *m /= t as f64;
    }
    means
}

/// Sample covariance matrix (divisor T - 1). Requires at least two rows.
pub fn sample_covariance(rows: &[Vec<f64>], means: &[f64]) -> InvexisResult<Matrix> {
    let t = rows.len();
    if t < 2 {
        return Err(InvexisError::InsufficientData(format!(
            "Sample covariance needs at least 2 return observations, got {}",
            t
        )));
    }
    let n = means.len();
    let mut cov = vec![vec![0.0; n]; n];
    for row in rows {
        for i in 0..n {
            let di = row[i] - means[i];
            for j in i..n {
                cov[i][j] += di * (row[j] - means[j]);
            }
        }
    }
    let denom = (t - 1) as f64;
    for i in 0..n {
        for j in i..n {
            cov[i][j] /= denom;
            cov[j][i] = cov[i][j];
        }
    }
    Ok(cov)
}

/// Convert a price history panel into log-return statistics.
pub fn estimate_returns(input: &ReturnsInput) -> InvexisResult<ComputationOutput<ReturnsOutput>> {
    let start = Instant::now();
    let mut warnings: Vec<String> = Vec::new();

    let panel = align_prices(input)?;
    for d in &panel.dropped_symbols {
        warnings.push(format!("Dropped {}: {}", d.symbol, d.reason));
    }

    let returns = log_returns(&panel.prices);
    let mean_returns = column_means(&returns);
    let covariance = sample_covariance(&returns, &mean_returns)?;

    let last_prices = panel.prices.last().cloned().unwrap_or_default();
    let dates: Vec<NaiveDate> = panel.dates.iter().skip(1).copied().collect();

    for (i, sym) in panel.symbols.iter().enumerate() {
        if covariance[i][i] == 0.0 {
            warnings.push(format!(
                "{} has zero return variance over the sample; covariance is singular",
                sym
            ));
        }
    }

    let output = ReturnsOutput {
        num_observations: returns.len(),
        symbols: panel.symbols,
        dropped_symbols: panel.dropped_symbols,
        dates,
        returns,
        covariance,
        mean_returns,
        last_prices,
    };

    let elapsed = start.elapsed().as_micros() as u64;
    Ok(with_metadata(
        "Log-return and sample covariance estimation",
        &serde_json::json!({
            "return_type": "log",
            "covariance_ddof": 1,
            "alignment": "inner join on date",
            "n_input_series": input.series.len(),
        }),
        warnings,
        elapsed,
        output,
    ))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
