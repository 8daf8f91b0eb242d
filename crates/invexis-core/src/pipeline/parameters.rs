use serde::{Deserialize, Serialize};

use crate::black_litterman::blend::{default_risk_aversion_opt, default_tau};
use crate::error::InvexisError;
use crate::market::equilibrium::default_risk_aversion;
use crate::monte_carlo::paths::{
    default_iterations, default_time_intervals, default_volatility_scale,
};
use crate::monte_carlo::statistics::{
    default_risk_free_rate, default_trading_days, StatisticsParameters,
};
use crate::views::sentiment::ViewParameters;
use crate::InvexisResult;

/// Named numeric configuration for one forecast run. Every field has a
/// default, so `{}` is a valid document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelParameters {
    /// Risk aversion used to back out equilibrium returns.
    #[serde(default = "default_risk_aversion")]
    pub risk_aversion_bl: f64,
    /// Prior scaling in the Black-Litterman blend.
    #[serde(default = "default_tau")]
    pub tau_bl: f64,
    /// Risk aversion used for the mean-variance weights.
    #[serde(default = "default_risk_aversion_opt")]
    pub risk_aversion_opt: f64,
    #[serde(default)]
    pub views: ViewParameters,
    #[serde(default = "default_time_intervals")]
    pub time_intervals: usize,
    #[serde(default = "default_iterations")]
    pub iterations: usize,
    #[serde(default)]
    pub seed: Option<u64>,
    #[serde(default = "default_volatility_scale")]
    pub volatility_scale: f64,
    #[serde(default = "default_risk_free_rate")]
    pub risk_free_rate: f64,
    #[serde(default = "default_trading_days")]
    pub trading_days_per_year: f64,
}

impl Default for ModelParameters {
    fn default() -> Self {
        ModelParameters {
            risk_aversion_bl: default_risk_aversion(),
            tau_bl: default_tau(),
            risk_aversion_opt: default_risk_aversion_opt(),
            views: ViewParameters::default(),
            time_intervals: default_time_intervals(),
            iterations: default_iterations(),
            seed: None,
            volatility_scale: default_volatility_scale(),
            risk_free_rate: default_risk_free_rate(),
            trading_days_per_year: default_trading_days(),
        }
    }
}

impl ModelParameters {
    pub fn statistics(&self) -> StatisticsParameters {
        StatisticsParameters {
            risk_free_rate: self.risk_free_rate,
            trading_days_per_year: self.trading_days_per_year,
        }
    }

    /// Reject values no component would accept, before any work is done.
    pub fn validate(&self) -> InvexisResult<()> {
        let positive = [
            ("risk_aversion_bl", self.risk_aversion_bl),
            ("tau_bl", self.tau_bl),
            ("risk_aversion_opt", self.risk_aversion_opt),
            ("trading_days_per_year", self.trading_days_per_year),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(InvexisError::InvalidInput {
                    field: field.into(),
                    reason: format!("Must be positive, got {value}"),
                });
            }
        }
        if !self.risk_free_rate.is_finite() {
            return Err(InvexisError::InvalidInput {
                field: "risk_free_rate".into(),
                reason: "Must be finite".into(),
            });
        }
        if self.time_intervals == 0 || self.iterations == 0 {
            return Err(InvexisError::InvalidInput {
                field: "time_intervals/iterations".into(),
                reason: "Both must be at least 1".into(),
            });
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_uses_defaults() {
        let p: ModelParameters = serde_json::from_str("{}").unwrap();
        assert_eq!(p, ModelParameters::default());
        assert_eq!(p.risk_aversion_bl, 2.5);
        assert_eq!(p.tau_bl, 0.05);
        assert_eq!(p.risk_aversion_opt, 3.0);
        assert_eq!(p.time_intervals, 252);
        assert_eq!(p.iterations, 2000);
        assert_eq!(p.volatility_scale, 1.0);
        assert_eq!(p.views.sentiment_diff_threshold, 0.10);
    }

    #[test]
    fn test_partial_override() {
        let p: ModelParameters =
            serde_json::from_str(r#"{"iterations": 50, "views": {"tau_for_omega": 0.05}}"#)
                .unwrap();
        assert_eq!(p.iterations, 50);
        assert_eq!(p.views.tau_for_omega, 0.05);
        assert_eq!(p.views.sentiment_to_return_factor, 0.001);
    }

    #[test]
    fn test_validate_rejects_non_positive_tau() {
        let p = ModelParameters {
            tau_bl: 0.0,
            ..ModelParameters::default()
        };
        assert!(p.validate().is_err());
        assert!(ModelParameters::default().validate().is_ok());
    }
}
