use super::{RETURN_SCALE, VolatilityEstimator, returns_for_fit, variance};
use crate::error::ForecastError;
use crate::types::PriceSeries;

/// Exponentially weighted variance of zero-mean returns (RiskMetrics style).
///
/// Cheaper than a GARCH fit and never iterates, so it is a useful fallback
/// when the likelihood surface is badly conditioned.
#[derive(Debug, Clone, Copy)]
pub struct EwmaVolatility {
    lambda: f64,
}

impl EwmaVolatility {
    pub const RISKMETRICS_LAMBDA: f64 = 0.94;

    /// `lambda` must lie in `(0, 1)`; out-of-range values fall back to 0.94.
    pub fn new(lambda: f64) -> Self {
        let lambda = if lambda > 0.0 && lambda < 1.0 {
            lambda
        } else {
            Self::RISKMETRICS_LAMBDA
        };
        Self { lambda }
    }

    pub fn lambda(&self) -> f64 {
        self.lambda
    }
}

impl Default for EwmaVolatility {
    fn default() -> Self {
        Self::new(Self::RISKMETRICS_LAMBDA)
    }
}

impl VolatilityEstimator for EwmaVolatility {
    fn name(&self) -> &'static str {
        "ewma"
    }

    fn forecast_sigma(&self, history: &PriceSeries) -> Result<f64, ForecastError> {
        let returns = returns_for_fit(history)?;
        let seed = variance(&returns);
        let var = returns
            .iter()
            .fold(seed, |v, r| self.lambda * v + (1.0 - self.lambda) * r * r);

        if !(var.is_finite() && var >= 0.0) {
            return Err(ForecastError::ModelConvergence(format!(
                "ewma variance is not finite: {var}"
            )));
        }
        Ok(var.sqrt() / RETURN_SCALE)
    }
}
