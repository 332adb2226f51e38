//! Network definitions for the gas tracker
//!
//! The default deployment tracks three EVM networks. Any set can be
//! configured; this table only supplies the defaults and the display
//! metadata (name, symbol, color) the dashboard needs.

use serde::{Deserialize, Serialize};

/// A network we sample fees from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Stable identifier, used as the map key everywhere ("ethereum")
    pub id: String,

    /// Human readable name ("Ethereum")
    pub display_name: String,

    /// Native asset symbol ("ETH")
    pub symbol: String,

    /// Chart color as a hex string
    pub color: String,

    /// JSON-RPC endpoint
    pub rpc_url: String,

    /// EIP-155 chain id
    pub chain_id: u64,
}

impl NetworkConfig {
    pub fn new(
        id: &str,
        display_name: &str,
        symbol: &str,
        color: &str,
        rpc_url: &str,
        chain_id: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            display_name: display_name.to_string(),
            symbol: symbol.to_string(),
            color: color.to_string(),
            rpc_url: rpc_url.to_string(),
            chain_id,
        }
    }

    /// Env var holding an RPC override for this network, e.g. `ETHEREUM_RPC_URL`
    pub fn rpc_env_key(&self) -> String {
        format!("{}_RPC_URL", self.id.to_uppercase().replace('-', "_"))
    }
}

impl std::fmt::Display for NetworkConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} ({})", self.display_name, self.symbol)
    }
}

// ============================================
// DEFAULT NETWORKS
// ============================================

pub fn ethereum() -> NetworkConfig {
    NetworkConfig::new(
        "ethereum",
        "Ethereum",
        "ETH",
        "#627EEA",
        "https://ethereum-rpc.publicnode.com",
        1,
    )
}

pub fn polygon() -> NetworkConfig {
    NetworkConfig::new(
        "polygon",
        "Polygon",
        "MATIC",
        "#8247E5",
        "https://polygon-rpc.com",
        137,
    )
}

pub fn arbitrum() -> NetworkConfig {
    NetworkConfig::new(
        "arbitrum",
        "Arbitrum",
        "ETH",
        "#28A0F0",
        "https://arbitrum-one.publicnode.com",
        42161,
    )
}

/// All networks tracked out of the box, in display order
pub fn default_networks() -> Vec<NetworkConfig> {
    vec![ethereum(), polygon(), arbitrum()]
}

/// Look up a default network by identifier (case-insensitive)
pub fn find_default(id: &str) -> Option<NetworkConfig> {
    let id = id.trim().to_lowercase();
    default_networks().into_iter().find(|n| n.id == id)
}
