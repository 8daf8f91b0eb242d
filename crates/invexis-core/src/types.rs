use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::InvexisError;
use crate::InvexisResult;

/// Row-major dense matrix.
pub type Matrix = Vec<Vec<f64>>;

/// Rates expressed as decimals (0.05 = 5%). Never as percentages.
pub type Rate = f64;

/// Ticker symbol.
pub type Symbol = String;

/// Whether a value was computed as requested or produced by a documented
/// fallback.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum EstimateStatus {
    Computed,
    Degraded { reason: String },
}

/// A value paired with its computation status, so callers can tell
/// "computed" from "fell back" without parsing log output.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Estimate<T> {
    pub value: T,
    #[serde(flatten)]
    pub status: EstimateStatus,
}

impl<T> Estimate<T> {
    pub fn computed(value: T) -> Self {
        Estimate {
            value,
            status: EstimateStatus::Computed,
        }
    }

    pub fn degraded(value: T, reason: impl Into<String>) -> Self {
        Estimate {
            value,
            status: EstimateStatus::Degraded {
                reason: reason.into(),
            },
        }
    }

    pub fn is_degraded(&self) -> bool {
        matches!(self.status, EstimateStatus::Degraded { .. })
    }

    /// Reason for the fallback, if any.
    pub fn degraded_reason(&self) -> Option<&str> {
        match &self.status {
            EstimateStatus::Computed => None,
            EstimateStatus::Degraded { reason } => Some(reason.as_str()),
        }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Estimate<U> {
        Estimate {
            value: f(self.value),
            status: self.status,
        }
    }
}

/// Standard computation output envelope
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationOutput<T: Serialize> {
    pub result: T,
    pub methodology: String,
    pub assumptions: serde_json::Value,
    pub warnings: Vec<String>,
    pub metadata: ComputationMetadata,
}

/// Metadata for every computation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ComputationMetadata {
    pub version: String,
    pub computation_time_us: u64,
    pub precision: String,
}

/// Helper to wrap computation results with metadata
pub fn with_metadata<T: Serialize>(
    methodology: &str,
    assumptions: &impl Serialize,
    warnings: Vec<String>,
    elapsed_us: u64,
    result: T,
) -> ComputationOutput<T> {
    ComputationOutput {
        result,
        methodology: methodology.to_string(),
        assumptions: serde_json::to_value(assumptions).unwrap_or_default(),
        warnings,
        metadata: ComputationMetadata {
            version: env!("CARGO_PKG_VERSION").to_string(),
            computation_time_us: elapsed_us,
            precision: "ieee754_f64".to_string(),
        },
    }
}

/// Push the fallback reason of a degraded estimate onto `warnings`.
pub(crate) fn note_degraded<T>(estimate: &Estimate<T>, warnings: &mut Vec<String>) {
    if let Some(reason) = estimate.degraded_reason() {
        warnings.push(reason.to_string());
    }
}

/// Reject an empty symbol list or one containing duplicates. Every
/// downstream vector and matrix is indexed by this ordering.
pub(crate) fn validate_symbols(symbols: &[Symbol], field: &str) -> InvexisResult<()> {
    if symbols.is_empty() {
        return Err(InvexisError::InsufficientData(format!(
            "{field}: at least one symbol required"
        )));
    }
    let mut seen = HashSet::with_capacity(symbols.len());
    for s in symbols {
        if !seen.insert(s.as_str()) {
            return Err(InvexisError::InvalidInput {
                field: field.to_string(),
                reason: format!("Duplicate symbol '{}'", s),
            });
        }
    }
    Ok(())
}
