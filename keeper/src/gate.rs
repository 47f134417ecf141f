//! Profitability gate.
//!
//! `cost = gas_units * gas_price` in wei, compared against the threshold in
//! wei. Accept iff `cost <= threshold`; the boundary accepts. A gas price
//! that cannot be read rejects.

use async_trait::async_trait;
use serde::Serialize;
use tracing::{info, warn};

pub const WEI_PER_ETH: f64 = 1e18;

/// Current network fee, in wei per gas unit.
#[async_trait]
pub trait GasPriceSource: Send + Sync {
    async fn gas_price_wei(&self) -> anyhow::Result<u128>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProfitabilityVerdict {
    pub accepted: bool,
    pub gas_units: u64,
    /// `None` when the fee source was unavailable.
    pub gas_price_wei: Option<u128>,
    pub cost_eth: Option<f64>,
    pub threshold_eth: f64,
}

#[derive(Debug, Clone, Copy)]
pub struct ProfitabilityGate {
    threshold_eth: f64,
    threshold_wei: u128,
}

impl ProfitabilityGate {
    pub fn new(threshold_eth: f64) -> Self {
        let threshold_wei = if threshold_eth.is_finite() && threshold_eth > 0.0 {
            (threshold_eth * WEI_PER_ETH).round() as u128
        } else {
            0
        };
        Self {
            threshold_eth,
            threshold_wei,
        }
    }

    pub fn threshold_eth(&self) -> f64 {
        self.threshold_eth
    }

    pub async fn evaluate(
        &self,
        gas_units: u64,
        source: &dyn GasPriceSource,
    ) -> ProfitabilityVerdict {
        match source.gas_price_wei().await {
            Ok(price) => {
                let verdict = self.judge(gas_units, price);
                if verdict.accepted {
                    info!(gas_units, gas_price_wei = %price, cost_eth = verdict.cost_eth, threshold_eth = self.threshold_eth, "gate accepted");
                } else {
                    info!(gas_units, gas_price_wei = %price, cost_eth = verdict.cost_eth, threshold_eth = self.threshold_eth, "gate rejected: cost above threshold");
                }
                verdict
            }
            Err(e) => {
                warn!(error = %e, "gas price unavailable, rejecting");
                ProfitabilityVerdict {
                    accepted: false,
                    gas_units,
                    gas_price_wei: None,
                    cost_eth: None,
                    threshold_eth: self.threshold_eth,
                }
            }
        }
    }

    /// Pure decision for a known gas price.
    pub fn judge(&self, gas_units: u64, gas_price_wei: u128) -> ProfitabilityVerdict {
        let cost_wei = (gas_units as u128).checked_mul(gas_price_wei);
        let accepted = matches!(cost_wei, Some(c) if c <= self.threshold_wei);

        ProfitabilityVerdict {
            accepted,
            gas_units,
            gas_price_wei: Some(gas_price_wei),
            cost_eth: cost_wei.map(|c| c as f64 / WEI_PER_ETH),
            threshold_eth: self.threshold_eth,
        }
    }
}

#[cfg(test)]
mod tests {
    use proptest::prelude::*;

    use super::*;

    const GWEI: u128 = 1_000_000_000;

    struct Fixed(u128);

    #[async_trait]
    impl GasPriceSource for Fixed {
        async fn gas_price_wei(&self) -> anyhow::Result<u128> {
            Ok(self.0)
        }
    }

    struct Down;

    #[async_trait]
    impl GasPriceSource for Down {
        async fn gas_price_wei(&self) -> anyhow::Result<u128> {
            anyhow::bail!("connection refused")
        }
    }

    #[test]
    fn boundary_cost_is_accepted() {
        // 500k gas * 40 gwei = 0.02 ETH exactly
        let v = ProfitabilityGate::new(0.02).judge(500_000, 40 * GWEI);
        assert!(v.accepted);
        assert_eq!(v.cost_eth, Some(0.02));
    }

    #[test]
    fn one_wei_over_is_rejected() {
        let v = ProfitabilityGate::new(0.02).judge(1, 20_000_000_000_000_001);
        assert!(!v.accepted);
    }

    #[tokio::test]
    async fn expensive_gas_is_rejected() {
        // 500k gas * 100 gwei = 0.05 ETH
        let v = ProfitabilityGate::new(0.02)
            .evaluate(500_000, &Fixed(100 * GWEI))
            .await;
        assert!(!v.accepted);
        assert_eq!(v.cost_eth, Some(0.05));
    }

    #[tokio::test]
    async fn unavailable_price_fails_safe() {
        let v = ProfitabilityGate::new(1_000.0).evaluate(1, &Down).await;
        assert!(!v.accepted);
        assert_eq!(v.gas_price_wei, None);
    }

    #[test]
    fn overflow_rejects() {
        assert!(!ProfitabilityGate::new(0.02).judge(u64::MAX, u128::MAX).accepted);
    }

    proptest! {
        #[test]
        fn accepts_iff_cost_within_threshold(units in 0u64..10_000_000, gwei in 0u128..1_000) {
            let gate = ProfitabilityGate::new(0.02);
            let cost = units as u128 * gwei * GWEI;
            prop_assert_eq!(gate.judge(units, gwei * GWEI).accepted, cost <= 20_000_000_000_000_000);
        }
    }
}
