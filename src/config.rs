//! Configuration for the Gas Tracker
//!
//! Networks, polling cadences and simulation defaults. Loaded from the
//! environment (with `.env` support) or from a TOML file.

use eyre::{eyre, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::chains::{self, NetworkConfig};

// ============================================
// TRACKING MODE
// ============================================

/// Tracking mode determines whether networks are being polled
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrackingMode {
    /// Live mode - every configured network is polled on its cadence
    Live,

    /// Simulation mode - polling is stopped, the last known fees feed
    /// the cost simulator
    Simulation,
}

impl Default for TrackingMode {
    fn default() -> Self {
        TrackingMode::Live
    }
}

impl std::fmt::Display for TrackingMode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackingMode::Live => f.pad("LIVE"),
            TrackingMode::Simulation => f.pad("SIMULATION"),
        }
    }
}

impl FromStr for TrackingMode {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "live" => Ok(TrackingMode::Live),
            "simulation" | "sim" => Ok(TrackingMode::Simulation),
            other => Err(eyre!("Unknown tracking mode: {}", other)),
        }
    }
}

// ============================================
// GAS PROFILE
// ============================================

/// Transaction shape used by the cost simulator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GasProfile {
    /// Plain native transfer
    Transfer,

    /// ERC-20 `transfer`
    Erc20Transfer,

    /// DEX swap
    Swap,
}

impl GasProfile {
    /// Gas units consumed by this kind of transaction
    pub fn gas_units(&self) -> u64 {
        match self {
            GasProfile::Transfer => 21_000,
            GasProfile::Erc20Transfer => 65_000,
            GasProfile::Swap => 150_000,
        }
    }
}

impl Default for GasProfile {
    fn default() -> Self {
        GasProfile::Transfer
    }
}

impl std::fmt::Display for GasProfile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            GasProfile::Transfer => f.pad(&format!("Transfer ({} gas)", self.gas_units())),
            GasProfile::Erc20Transfer => f.pad(&format!("ERC-20 Transfer ({} gas)", self.gas_units())),
            GasProfile::Swap => f.pad(&format!("Swap ({} gas)", self.gas_units())),
        }
    }
}

impl FromStr for GasProfile {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "transfer" => Ok(GasProfile::Transfer),
            "erc20" | "erc20_transfer" => Ok(GasProfile::Erc20Transfer),
            "swap" => Ok(GasProfile::Swap),
            other => Err(eyre!("Unknown gas profile: {}", other)),
        }
    }
}

// ============================================
// PRICE FEED
// ============================================

/// Source of the native asset reference price
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceFeedKind {
    /// Random demo price between $2000 and $2500
    Mock,

    /// CoinGecko simple price API
    CoinGecko,

    /// Constant price (FIXED_PRICE_USD)
    Fixed,
}

impl Default for PriceFeedKind {
    fn default() -> Self {
        PriceFeedKind::Mock
    }
}

impl std::fmt::Display for PriceFeedKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceFeedKind::Mock => f.pad("Mock (random)"),
            PriceFeedKind::CoinGecko => f.pad("CoinGecko"),
            PriceFeedKind::Fixed => f.pad("Fixed"),
        }
    }
}

impl FromStr for PriceFeedKind {
    type Err = eyre::Report;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "mock" => Ok(PriceFeedKind::Mock),
            "coingecko" | "gecko" => Ok(PriceFeedKind::CoinGecko),
            "fixed" => Ok(PriceFeedKind::Fixed),
            other => Err(eyre!("Unknown price feed: {}", other)),
        }
    }
}

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Main configuration struct for the Gas Tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Tracking ==========
    /// Mode the tracker is put in at startup
    pub initial_mode: TrackingMode,

    /// Seconds between fee quotes per network
    pub fee_poll_interval_secs: u64,

    /// Seconds between reference price samples
    pub price_poll_interval_secs: u64,

    /// Upper bound on a single fetch before it counts as failed
    pub fetch_timeout_secs: u64,

    /// Points kept per network history
    pub history_capacity: usize,

    // ========== Reference Price ==========
    /// Where the native asset price comes from
    pub price_feed: PriceFeedKind,

    /// Price API base URL (CoinGecko compatible)
    pub price_api_url: String,

    /// Asset id queried from the price API
    pub price_asset_id: String,

    /// Price used by the fixed feed
    pub fixed_price_usd: f64,

    /// Price used when no feed value has ever been seen
    pub fallback_price_usd: f64,

    // ========== Simulation ==========
    /// Default transaction size, in native units
    pub notional_amount: f64,

    /// Transaction shape
    pub gas_profile: GasProfile,

    // ========== Networks ==========
    /// Networks to track, in display order. Kept last so the TOML form
    /// lists plain keys before the `[[networks]]` tables.
    pub networks: Vec<NetworkConfig>,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let defaults = Self::default();

        Ok(Self {
            initial_mode: match env::var("TRACKING_MODE") {
                Ok(s) => s.parse()?,
                Err(_) => defaults.initial_mode,
            },
            fee_poll_interval_secs: env::var("FEE_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "6".to_string())
                .parse()
                .unwrap_or(6),
            price_poll_interval_secs: env::var("PRICE_POLL_INTERVAL_SECS")
                .unwrap_or_else(|_| "30".to_string())
                .parse()
                .unwrap_or(30),
            fetch_timeout_secs: env::var("FETCH_TIMEOUT_SECS")
                .unwrap_or_else(|_| "5".to_string())
                .parse()
                .unwrap_or(5),
            history_capacity: env::var("HISTORY_CAPACITY")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),

            price_feed: match env::var("PRICE_FEED") {
                Ok(s) => s.parse()?,
                Err(_) => defaults.price_feed,
            },
            price_api_url: env::var("PRICE_API_URL").unwrap_or(defaults.price_api_url),
            price_asset_id: env::var("PRICE_ASSET_ID").unwrap_or(defaults.price_asset_id),
            fixed_price_usd: env::var("FIXED_PRICE_USD")
                .unwrap_or_else(|_| "2300.0".to_string())
                .parse()
                .unwrap_or(2300.0),
            fallback_price_usd: env::var("FALLBACK_PRICE_USD")
                .unwrap_or_else(|_| "2300.0".to_string())
                .parse()
                .unwrap_or(2300.0),

            notional_amount: env::var("NOTIONAL_AMOUNT")
                .unwrap_or_else(|_| "0.1".to_string())
                .parse()
                .unwrap_or(0.1),
            gas_profile: match env::var("GAS_PROFILE") {
                Ok(s) => s.parse()?,
                Err(_) => defaults.gas_profile,
            },

            networks: Self::networks_from_env()?,
        })
    }

    /// Networks selected by `NETWORKS`, with `<ID>_RPC_URL` overrides applied
    fn networks_from_env() -> Result<Vec<NetworkConfig>> {
        let mut networks = match env::var("NETWORKS") {
            Ok(list) => list
                .split(',')
                .filter(|s| !s.trim().is_empty())
                .map(|id| {
                    chains::find_default(id).ok_or_else(|| eyre!("Unknown network in NETWORKS: {}", id))
                })
                .collect::<Result<Vec<_>>>()?,
            Err(_) => chains::default_networks(),
        };

        for network in &mut networks {
            if let Ok(url) = env::var(network.rpc_env_key()) {
                network.rpc_url = url;
            }
        }

        Ok(networks)
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    pub fn fee_poll_interval(&self) -> Duration {
        Duration::from_secs(self.fee_poll_interval_secs)
    }

    pub fn price_poll_interval(&self) -> Duration {
        Duration::from_secs(self.price_poll_interval_secs)
    }

    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_secs(self.fetch_timeout_secs)
    }

    /// Validate configuration. Networks are only checked for presence of
    /// their fields; an empty network list is reported by the tracker itself.
    pub fn validate(&self) -> Result<()> {
        let mut seen = HashSet::new();
        for network in &self.networks {
            if network.id.trim().is_empty() {
                return Err(eyre!("Network with empty id in configuration"));
            }
            if !seen.insert(network.id.as_str()) {
                return Err(eyre!("Network '{}' is configured twice", network.id));
            }
            if network.rpc_url.trim().is_empty() {
                return Err(eyre!(
                    "Network '{}' has no RPC URL - set {}",
                    network.id,
                    network.rpc_env_key()
                ));
            }
        }

        if self.fee_poll_interval_secs == 0 || self.price_poll_interval_secs == 0 {
            return Err(eyre!("Polling intervals must be at least 1 second"));
        }
        if self.fetch_timeout_secs == 0 {
            return Err(eyre!("FETCH_TIMEOUT_SECS must be at least 1 second"));
        }
        if self.history_capacity == 0 {
            return Err(eyre!("HISTORY_CAPACITY must be at least 1"));
        }
        if !self.notional_amount.is_finite() || self.notional_amount < 0.0 {
            return Err(eyre!(
                "NOTIONAL_AMOUNT must be a non-negative number (currently {})",
                self.notional_amount
            ));
        }
        if !self.fallback_price_usd.is_finite() || self.fallback_price_usd <= 0.0 {
            return Err(eyre!(
                "FALLBACK_PRICE_USD must be positive (currently {})",
                self.fallback_price_usd
            ));
        }
        if self.price_feed == PriceFeedKind::Fixed
            && (!self.fixed_price_usd.is_finite() || self.fixed_price_usd <= 0.0)
        {
            return Err(eyre!("Fixed price feed requires a positive FIXED_PRICE_USD"));
        }

        Ok(())
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              GAS TRACKER - CONFIGURATION                   ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Initial Mode:      {:^40} ║", self.initial_mode);
        println!("║ Networks:          {:^40} ║", self.networks.len());
        for network in &self.networks {
            println!("║ • {:<16} {:>40} ║", network.display_name, format!("chain {}", network.chain_id));
        }
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ POLLING                                                    ║");
        println!("║ • Fee Cadence:     {:>38}s ║", self.fee_poll_interval_secs);
        println!("║ • Price Cadence:   {:>38}s ║", self.price_poll_interval_secs);
        println!("║ • Fetch Timeout:   {:>38}s ║", self.fetch_timeout_secs);
        println!("║ • History Points:  {:^40} ║", self.history_capacity);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ REFERENCE PRICE                                            ║");
        println!("║ • Feed:            {:^40} ║", self.price_feed);
        println!("║ • Fallback:        ${:<38.2} ║", self.fallback_price_usd);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SIMULATION                                                 ║");
        println!("║ • Amount:          {:<39.4} ║", self.notional_amount);
        println!("║ • Profile:         {:^40} ║", self.gas_profile);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            initial_mode: TrackingMode::Live,
            fee_poll_interval_secs: 6,
            price_poll_interval_secs: 30,
            fetch_timeout_secs: 5,
            history_capacity: 100,
            price_feed: PriceFeedKind::Mock,
            price_api_url: "https://api.coingecko.com/api/v3".to_string(),
            price_asset_id: "ethereum".to_string(),
            fixed_price_usd: 2300.0,
            fallback_price_usd: 2300.0,
            notional_amount: 0.1,
            gas_profile: GasProfile::Transfer,
            networks: chains::default_networks(),
        }
    }
}

// ============================================
// TESTS
// ============================================
