//! Transaction cost simulation
//!
//! Pure functions over a snapshot of network states. Nothing here is
//! cached: every call recomputes the full result set from its inputs.

use serde::Serialize;

use crate::config::GasProfile;
use crate::gas_oracle::FeeSample;
use crate::tracker::NetworkState;

/// Fee quotes are in gwei; costs are reported in whole native units
pub const GWEI_PER_NATIVE: f64 = 1e9;

/// Cost of the simulated transaction on one network
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SimulationResult {
    pub network_id: String,
    pub display_name: String,
    pub symbol: String,

    /// Gas cost in native units
    pub gas_cost_native: f64,

    /// Gas cost in USD
    pub gas_cost_fiat: f64,

    /// Gas cost plus the transferred value, in USD
    pub total_cost_fiat: f64,
}

/// Cost calculator for a fixed transaction shape
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SimulationEngine {
    gas_units: u64,
}

impl Default for SimulationEngine {
    fn default() -> Self {
        Self::new(GasProfile::default())
    }
}

impl SimulationEngine {
    pub fn new(profile: GasProfile) -> Self {
        Self::with_gas_units(profile.gas_units())
    }

    pub fn with_gas_units(gas_units: u64) -> Self {
        Self { gas_units }
    }

    /// Gas cost in native units for one fee quote
    pub fn gas_cost_native(&self, fees: &FeeSample) -> f64 {
        fees.total_fee() * self.gas_units as f64 / GWEI_PER_NATIVE
    }

    /// One result per network, in input order
    pub fn calculate(
        &self,
        networks: &[NetworkState],
        reference_price: f64,
        notional_amount: f64,
    ) -> Vec<SimulationResult> {
        let transfer_fiat = notional_amount * reference_price;

        networks
            .iter()
            .map(|network| {
                let gas_cost_native = self.gas_cost_native(&network.latest);
                let gas_cost_fiat = gas_cost_native * reference_price;

                SimulationResult {
                    network_id: network.config.id.clone(),
                    display_name: network.config.display_name.clone(),
                    symbol: network.config.symbol.clone(),
                    gas_cost_native,
                    gas_cost_fiat,
                    total_cost_fiat: gas_cost_fiat + transfer_fiat,
                }
            })
            .collect()
    }
}

/// Result with the lowest total cost
pub fn cheapest(results: &[SimulationResult]) -> Option<&SimulationResult> {
    results
        .iter()
        .min_by(|a, b| a.total_cost_fiat.total_cmp(&b.total_cost_fiat))
}

// ============================================
// TESTS
// ============================================
