//! Constant-mean GARCH(1,1) with Gaussian innovations.
//!
//! ```text
//! r_t = mu + e_t
//! h_t = omega + alpha * e_{t-1}^2 + beta * h_{t-1}
//! ```
//!
//! Parameters are fitted by maximum likelihood on percent-scaled log returns.
//! The search runs in an unconstrained space:
//!
//! ```text
//! omega = exp(x0)
//! alpha = exp(x1) / (1 + exp(x1) + exp(x2))
//! beta  = exp(x2) / (1 + exp(x1) + exp(x2))
//! ```
//!
//! which keeps `omega > 0`, `alpha, beta > 0` and `alpha + beta < 1`
//! (covariance stationarity) without explicit constraints.

use std::f64::consts::PI;

use tracing::debug;

use super::optimize::NelderMead;
use super::{RETURN_SCALE, VolatilityEstimator, mean, returns_for_fit, variance};
use crate::error::ForecastError;
use crate::types::PriceSeries;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GarchFit {
    pub mu: f64,
    pub omega: f64,
    pub alpha: f64,
    pub beta: f64,
    /// Maximized log-likelihood.
    pub log_likelihood: f64,
    /// Conditional variance at the last observation.
    pub last_variance: f64,
    /// Last residual.
    pub last_residual: f64,
    pub converged: bool,
}

impl GarchFit {
    /// One-step-ahead conditional variance, in percent² units.
    pub fn next_variance(&self) -> f64 {
        self.omega + self.alpha * self.last_residual.powi(2) + self.beta * self.last_variance
    }

    pub fn persistence(&self) -> f64 {
        self.alpha + self.beta
    }
}

#[derive(Debug, Clone, Default)]
pub struct Garch11 {
    optimizer: NelderMead,
}

impl Garch11 {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fits the model to percent-scaled returns.
    pub fn fit(&self, returns: &[f64]) -> Result<GarchFit, ForecastError> {
        let mu = mean(returns);
        let residuals: Vec<f64> = returns.iter().map(|r| r - mu).collect();
        let backcast = variance(returns);

        let objective = |x: &[f64]| {
            let (omega, alpha, beta) = unpack(x);
            negative_log_likelihood(&residuals, omega, alpha, beta, backcast).0
        };

        // alpha = 0.1, beta = 0.8, omega matching the sample variance.
        let x0 = [(0.1 * backcast).ln(), 0.0, 8.0f64.ln()];
        let min = self.optimizer.minimize(objective, &x0);

        if !min.value.is_finite() {
            return Err(ForecastError::ModelConvergence(
                "likelihood is not finite at any evaluated point".into(),
            ));
        }

        let (omega, alpha, beta) = unpack(&min.x);
        let (nll, last_variance) =
            negative_log_likelihood(&residuals, omega, alpha, beta, backcast);

        let fit = GarchFit {
            mu,
            omega,
            alpha,
            beta,
            log_likelihood: -nll,
            last_variance,
            last_residual: residuals.last().copied().unwrap_or(0.0),
            converged: min.converged,
        };

        if !(fit.next_variance().is_finite() && fit.next_variance() >= 0.0) {
            return Err(ForecastError::ModelConvergence(format!(
                "non-finite variance forecast (omega={omega}, alpha={alpha}, beta={beta})"
            )));
        }

        debug!(
            omega = fit.omega,
            alpha = fit.alpha,
            beta = fit.beta,
            log_likelihood = fit.log_likelihood,
            iterations = min.iterations,
            converged = fit.converged,
            "garch(1,1) fitted"
        );

        Ok(fit)
    }
}

impl VolatilityEstimator for Garch11 {
    fn name(&self) -> &'static str {
        "garch11"
    }

    fn forecast_sigma(&self, history: &PriceSeries) -> Result<f64, ForecastError> {
        let returns = returns_for_fit(history)?;
        let fit = self.fit(&returns)?;
        Ok(fit.next_variance().sqrt() / RETURN_SCALE)
    }
}

fn unpack(x: &[f64]) -> (f64, f64, f64) {
    let omega = x[0].exp();
    let a = x[1].exp();
    let b = x[2].exp();
    let denom = 1.0 + a + b;
    (omega, a / denom, b / denom)
}

/// Returns `(nll, h_T)`; `nll` is `+inf` when the recursion leaves the valid region.
fn negative_log_likelihood(
    residuals: &[f64],
    omega: f64,
    alpha: f64,
    beta: f64,
    backcast: f64,
) -> (f64, f64) {
    if !(omega.is_finite() && alpha.is_finite() && beta.is_finite()) {
        return (f64::INFINITY, f64::NAN);
    }

    let ln_2pi = (2.0 * PI).ln();
    let mut h = backcast;
    let mut prev_sq = backcast;
    let mut nll = 0.0;

    for e in residuals {
        h = omega + alpha * prev_sq + beta * h;
        if !(h.is_finite() && h > 0.0) {
            return (f64::INFINITY, f64::NAN);
        }
        nll += 0.5 * (ln_2pi + h.ln() + e * e / h);
        prev_sq = e * e;
    }

    (nll, h)
}
