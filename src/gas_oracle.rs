//! Gas Fee Oracle - JSON-RPC Integration
//!
//! Produces one normalized fee quote per call for a configured network:
//! base fee from the latest block, priority fee from
//! `eth_maxPriorityFeePerGas`, and the composite `eth_gasPrice`.
//! All values are reported in gwei.

use alloy_eips::BlockNumberOrTag;
use alloy_network::Ethereum;
use alloy_provider::{Provider, RootProvider};
use chrono::{DateTime, Utc};
use eyre::{eyre, Result};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::future::Future;
use tracing::{debug, trace};

use crate::chains::NetworkConfig;

// ============================================
// CONSTANTS
// ============================================

/// Wei per gwei
const WEI_PER_GWEI: f64 = 1e9;

// ============================================
// FEE SAMPLE
// ============================================

/// A single normalized fee quote, in gwei
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeeSample {
    /// Base fee of the latest block
    pub base_fee: f64,

    /// Suggested priority fee (tip)
    pub priority_fee: f64,

    /// Effective gas price reported by the node
    pub composite_price: f64,

    /// When the quote was taken
    pub sampled_at: DateTime<Utc>,
}

impl FeeSample {
    pub fn new(base_fee: f64, priority_fee: f64, composite_price: f64) -> Self {
        Self::at(base_fee, priority_fee, composite_price, Utc::now())
    }

    pub fn at(
        base_fee: f64,
        priority_fee: f64,
        composite_price: f64,
        sampled_at: DateTime<Utc>,
    ) -> Self {
        Self { base_fee, priority_fee, composite_price, sampled_at }
    }

    /// Placeholder held by a network before its first quote arrives
    pub fn empty() -> Self {
        Self::new(0.0, 0.0, 0.0)
    }

    /// Reject malformed quotes (negative or non-finite prices)
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("base fee", self.base_fee),
            ("priority fee", self.priority_fee),
            ("composite price", self.composite_price),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(eyre!("Malformed fee quote: {} = {}", name, value));
            }
        }
        Ok(())
    }

    /// Per-gas fee used for cost estimates (base + priority)
    pub fn total_fee(&self) -> f64 {
        self.base_fee + self.priority_fee
    }
}

// ============================================
// PROVIDER INTERFACE
// ============================================

/// Source of fee quotes for a network.
///
/// Implementations must be cheap to call concurrently; the tracker may have
/// several quotes in flight for the same network.
pub trait FeeQuoteProvider: Send + Sync + 'static {
    /// Fetch one fee quote for `network`
    fn fetch(&self, network: &NetworkConfig) -> impl Future<Output = Result<FeeSample>> + Send;

    /// Drop any connection held for `network`. Called when its session stops.
    fn release(&self, _network: &NetworkConfig) {}
}

// ============================================
// JSON-RPC PROVIDER
// ============================================

/// Fee quotes straight from each network's JSON-RPC endpoint
#[derive(Debug, Default)]
pub struct RpcFeeQuoteProvider {
    /// One HTTP provider per network id, created on first use
    providers: Mutex<HashMap<String, RootProvider<Ethereum>>>,
}

impl RpcFeeQuoteProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of networks with an open provider
    pub fn open_connections(&self) -> usize {
        self.providers.lock().len()
    }

    fn provider_for(&self, network: &NetworkConfig) -> Result<RootProvider<Ethereum>> {
        let mut providers = self.providers.lock();
        if let Some(provider) = providers.get(&network.id) {
            return Ok(provider.clone());
        }

        let url = network
            .rpc_url
            .parse()
            .map_err(|e| eyre!("Invalid RPC URL for {}: {}", network.id, e))?;
        let provider = RootProvider::<Ethereum>::new_http(url);

        debug!("🔌 Opened RPC provider for {} ({})", network.display_name, network.rpc_url);
        providers.insert(network.id.clone(), provider.clone());
        Ok(provider)
    }
}

impl FeeQuoteProvider for RpcFeeQuoteProvider {
    async fn fetch(&self, network: &NetworkConfig) -> Result<FeeSample> {
        let provider = self.provider_for(network)?;

        let gas_price_wei = provider.get_gas_price().await?;

        let block = provider.get_block_by_number(BlockNumberOrTag::Latest).await?;
        let base_fee_wei = block
            .and_then(|b| b.header.base_fee_per_gas)
            .unwrap_or_default();

        // Pre-1559 networks don't answer this; treat as zero tip
        let priority_fee_wei = match provider.get_max_priority_fee_per_gas().await {
            Ok(fee) => fee,
            Err(e) => {
                trace!("{}: no priority fee ({})", network.id, e);
                0
            }
        };

        let sample = FeeSample::new(
            base_fee_wei as f64 / WEI_PER_GWEI,
            priority_fee_wei as f64 / WEI_PER_GWEI,
            gas_price_wei as f64 / WEI_PER_GWEI,
        );

        trace!(
            "⛽ {}: base {:.4} gwei, tip {:.4} gwei, price {:.4} gwei",
            network.id,
            sample.base_fee,
            sample.priority_fee,
            sample.composite_price
        );

        Ok(sample)
    }

    fn release(&self, network: &NetworkConfig) {
        if self.providers.lock().remove(&network.id).is_some() {
            debug!("🔌 Released RPC provider for {}", network.display_name);
        }
    }
}

// ============================================
// TESTS
// ============================================
