//! Reduce per-symbol news headlines to one compound sentiment score.
//!
//! The scoring model itself is supplied by the caller through
//! [`HeadlineScorer`]; this module only decides which headlines count and
//! how their scores are combined.

use std::collections::BTreeMap;
use tracing::warn;

use crate::types::Symbol;

/// Default number of headlines considered per symbol.
pub const DEFAULT_MAX_HEADLINES: usize = 5;

/// A compound-polarity sentiment function, typically returning a score in
/// [-1, 1].
pub trait HeadlineScorer {
    fn compound(&self, headline: &str) -> f64;
}

impl<F> HeadlineScorer for F
where
    F: Fn(&str) -> f64,
{
    fn compound(&self, headline: &str) -> f64 {
        self(headline)
    }
}

/// Mean compound score of the first `max_headlines` headlines.
///
/// Returns 0.0 when there are no headlines. Non-finite scores are skipped.
pub fn score_headlines<S: HeadlineScorer + ?Sized>(
    scorer: &S,
    headlines: &[String],
    max_headlines: usize,
) -> f64 {
    let scores: Vec<f64> = headlines
        .iter()
        .take(max_headlines)
        .filter(|h| !h.trim().is_empty())
        .map(|h| scorer.compound(h))
        .filter(|s| {
            if !s.is_finite() {
                warn!(score = %s, "discarding non-finite headline score");
            }
            s.is_finite()
        })
        .collect();

    if scores.is_empty() {
        0.0
    } else {
        scores.iter().sum::<f64>() / scores.len() as f64
    }
}

/// Score every symbol in `symbols` order. Symbols without headlines score 0.0.
pub fn aggregate_sentiment<S: HeadlineScorer + ?Sized>(
    scorer: &S,
    symbols: &[Symbol],
    headlines: &BTreeMap<Symbol, Vec<String>>,
    max_headlines: usize,
) -> BTreeMap<Symbol, f64> {
    symbols
        .iter()
        .map(|s| {
            let score = headlines
                .get(s)
                .map(|h| score_headlines(scorer, h, max_headlines))
                .unwrap_or(0.0);
            (s.clone(), score)
        })
        .collect()
}
