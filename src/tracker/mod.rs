//! The Tracker
//!
//! Responsible for:
//! - Polling every configured network on its own cadence
//! - Keeping a bounded, time-ordered fee history per network
//! - Sampling the reference price and keeping a usable value at all times
//! - Switching between live polling and simulation without leaking tasks

mod coordinator;
mod history;
mod session;
mod state;

pub use coordinator::{TrackerSettings, TrackingCoordinator};
pub use state::NetworkState;

/// Scripted providers and feeds for driving the tracker in tests
#[cfg(test)]
pub(crate) mod testing {
    use eyre::{eyre, Result};
    use parking_lot::Mutex;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use crate::chains::NetworkConfig;
    use crate::gas_oracle::{FeeQuoteProvider, FeeSample};
    use crate::price_feed::ReferencePriceFeed;

    /// What one scripted fetch does
    #[derive(Debug, Clone, Copy)]
    pub struct Step {
        delay: Duration,
        fees: Option<(f64, f64)>,
    }

    impl Step {
        /// Quote with base fee `price`, no tip
        pub fn ok(price: f64) -> Self {
            Self::fees(price, 0.0)
        }

        pub fn fees(base_fee: f64, priority_fee: f64) -> Self {
            Self { delay: Duration::ZERO, fees: Some((base_fee, priority_fee)) }
        }

        pub fn fail() -> Self {
            Self { delay: Duration::ZERO, fees: None }
        }

        pub fn after(mut self, delay: Duration) -> Self {
            self.delay = delay;
            self
        }
    }

    type Script = Box<dyn Fn(&str, usize) -> Step + Send + Sync>;

    /// Fee provider following a script of (network id, per-network call number)
    pub struct ScriptedProvider {
        script: Script,
        calls: Mutex<HashMap<String, usize>>,
        releases: AtomicUsize,
    }

    impl ScriptedProvider {
        pub fn new(script: impl Fn(usize) -> Step + Send + Sync + 'static) -> Self {
            Self::per_network(move |_, n| script(n))
        }

        pub fn per_network(script: impl Fn(&str, usize) -> Step + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                calls: Mutex::new(HashMap::new()),
                releases: AtomicUsize::new(0),
            }
        }

        pub fn constant(price: f64) -> Self {
            Self::new(move |_| Step::ok(price))
        }

        /// Total fetches across networks
        pub fn calls(&self) -> usize {
            self.calls.lock().values().sum()
        }

        pub fn calls_for(&self, network: &str) -> usize {
            self.calls.lock().get(network).copied().unwrap_or(0)
        }

        pub fn releases(&self) -> usize {
            self.releases.load(Ordering::SeqCst)
        }
    }

    impl FeeQuoteProvider for ScriptedProvider {
        async fn fetch(&self, network: &NetworkConfig) -> Result<FeeSample> {
            let n = {
                let mut calls = self.calls.lock();
                let count = calls.entry(network.id.clone()).or_default();
                *count += 1;
                *count
            };

            let step = (self.script)(&network.id, n);
            tokio::time::sleep(step.delay).await;

            step.fees
                .map(|(base, tip)| FeeSample::new(base, tip, base + tip))
                .ok_or_else(|| eyre!("{} node unavailable", network.id))
        }

        fn release(&self, _network: &NetworkConfig) {
            self.releases.fetch_add(1, Ordering::SeqCst);
        }
    }

    /// Reference price feed following a script of call numbers
    pub struct ScriptedPriceFeed {
        script: Box<dyn Fn(usize) -> Option<f64> + Send + Sync>,
        delays: Box<dyn Fn(usize) -> Duration + Send + Sync>,
        calls: AtomicUsize,
    }

    impl ScriptedPriceFeed {
        pub fn new(script: impl Fn(usize) -> Option<f64> + Send + Sync + 'static) -> Self {
            Self {
                script: Box::new(script),
                delays: Box::new(|_| Duration::ZERO),
                calls: AtomicUsize::new(0),
            }
        }

        /// Delay each call by `delays(call number)`
        pub fn with_delays(mut self, delays: impl Fn(usize) -> Duration + Send + Sync + 'static) -> Self {
            self.delays = Box::new(delays);
            self
        }

        pub fn constant(price: f64) -> Self {
            Self::new(move |_| Some(price))
        }

        pub fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    impl ReferencePriceFeed for ScriptedPriceFeed {
        async fn fetch(&self) -> Result<f64> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            tokio::time::sleep((self.delays)(n)).await;
            (self.script)(n).ok_or_else(|| eyre!("price feed unavailable"))
        }
    }
}
