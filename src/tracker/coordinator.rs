//! Tracking Coordinator
//!
//! Owns one [`NetworkSession`] per network, the reference price loop and
//! the simulation results. Everything the dashboard reads is published
//! through watch channels, so reads never wait on polling.
//!
//! Mode switches:
//! - `Live`: start a session for every network without an active one and
//!   the price loop (one immediate sample, then every `price_cadence`)
//! - `Simulation`: stop every session and the price loop, keep the last
//!   known fees and price, recompute the simulation

use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::session::{NetworkSession, SampleHook, SessionTiming};
use super::state::{NetworkSlot, NetworkState, ReferencePrice};
use crate::chains::NetworkConfig;
use crate::config::{Config, GasProfile, TrackingMode};
use crate::gas_oracle::FeeQuoteProvider;
use crate::price_feed::ReferencePriceFeed;
use crate::simulator::{SimulationEngine, SimulationResult};

// ============================================
// SETTINGS / STATUS / ERRORS
// ============================================

/// Tracker tuning, usually derived from [`Config`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TrackerSettings {
    /// Time between fee quotes per network
    pub fee_cadence: Duration,

    /// Time between reference price samples
    pub price_cadence: Duration,

    /// Bound on every single fetch
    pub fetch_timeout: Duration,

    /// Points kept per network history
    pub history_capacity: usize,

    /// Reference price used until the feed delivers
    pub fallback_price: f64,

    /// Initial simulated transaction size
    pub notional_amount: f64,

    pub gas_profile: GasProfile,
}

impl Default for TrackerSettings {
    fn default() -> Self {
        Self::from_config(&Config::default())
    }
}

impl TrackerSettings {
    pub fn from_config(config: &Config) -> Self {
        Self {
            fee_cadence: config.fee_poll_interval(),
            price_cadence: config.price_poll_interval(),
            fetch_timeout: config.fetch_timeout(),
            history_capacity: config.history_capacity,
            fallback_price: config.fallback_price_usd,
            notional_amount: config.notional_amount,
            gas_profile: config.gas_profile,
        }
    }

    fn session_timing(&self) -> SessionTiming {
        SessionTiming { cadence: self.fee_cadence, fetch_timeout: self.fetch_timeout }
    }
}

/// Coordinator-level flags for the dashboard
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TrackerStatus {
    /// Waiting for the first quote of every network
    pub is_loading: bool,

    /// Last setup failure, cleared when tracking starts again
    pub last_error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TrackerError {
    /// Nothing to track
    #[error("Failed to start gas tracking: no networks configured")]
    NoNetworks,

    /// Simulated amount must be a finite, non-negative number
    #[error("Invalid notional amount: {0}")]
    InvalidNotional(f64),
}

// ============================================
// SHARED STATE
// ============================================

/// State shared with the polling tasks
struct Shared {
    networks: Vec<Arc<NetworkSlot>>,
    engine: SimulationEngine,
    reference_price: watch::Sender<ReferencePrice>,
    /// Issue number of the price fetch behind the current reference price
    price_generation: AtomicU64,
    notional: watch::Sender<f64>,
    results: watch::Sender<Vec<SimulationResult>>,
}

impl Shared {
    /// Rebuild every simulation result from current snapshots.
    ///
    /// Runs under the results lock, so the last publisher always read the
    /// freshest inputs.
    fn recompute(&self) {
        self.results.send_modify(|results| {
            let states: Vec<NetworkState> = self.networks.iter().map(|slot| slot.snapshot()).collect();
            let price = self.reference_price.borrow().value;
            let notional = *self.notional.borrow();
            *results = self.engine.calculate(&states, price, notional);
        });
    }

    /// Fold a price fetch into the reference price. Dropped when the loop
    /// was stopped or a later-issued fetch already landed.
    fn apply_price(&self, generation: u64, token: &CancellationToken, fetched: Option<f64>) -> bool {
        self.reference_price.send_if_modified(|price| {
            if token.is_cancelled() || generation <= self.price_generation.load(Ordering::SeqCst) {
                return false;
            }
            self.price_generation.store(generation, Ordering::SeqCst);
            *price = price.next(fetched);
            true
        })
    }

    fn mark_all_disconnected(&self) {
        for slot in &self.networks {
            slot.mark_disconnected();
        }
    }
}

// ============================================
// PRICE LOOP
// ============================================

struct PriceLoop {
    token: CancellationToken,
    task: JoinHandle<()>,
}

impl PriceLoop {
    /// One fetch right away, then one per `cadence`. Every tick spawns its
    /// own fetch, so a slow feed never delays the next sample.
    fn spawn<F: ReferencePriceFeed>(
        shared: Arc<Shared>,
        feed: Arc<F>,
        cadence: Duration,
        fetch_timeout: Duration,
    ) -> Self {
        let token = CancellationToken::new();
        let task_token = token.clone();

        let task = tokio::spawn(async move {
            let mut clock = time::interval(cadence);
            clock.set_missed_tick_behavior(MissedTickBehavior::Skip);
            let mut in_flight = JoinSet::new();
            // Numbers continue across restarts, like the network slots
            let mut issued = shared.price_generation.load(Ordering::SeqCst);

            loop {
                tokio::select! {
                    _ = task_token.cancelled() => break,
                    _ = clock.tick() => {
                        issued += 1;
                        in_flight.spawn(Self::sample(
                            shared.clone(),
                            feed.clone(),
                            issued,
                            fetch_timeout,
                            task_token.clone(),
                        ));
                    }
                    Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
                }
            }

            in_flight.abort_all();
        });

        Self { token, task }
    }

    async fn sample<F: ReferencePriceFeed>(
        shared: Arc<Shared>,
        feed: Arc<F>,
        generation: u64,
        fetch_timeout: Duration,
        token: CancellationToken,
    ) {
        let price = match time::timeout(fetch_timeout, feed.fetch()).await {
            Ok(Ok(price)) if price.is_finite() && price > 0.0 => Some(price),
            Ok(Ok(price)) => {
                warn!("Ignoring invalid reference price: {}", price);
                None
            }
            Ok(Err(e)) => {
                warn!("Error fetching reference price: {}", e);
                None
            }
            Err(_) => {
                warn!("Reference price fetch timed out after {:?}", fetch_timeout);
                None
            }
        };

        if !shared.apply_price(generation, &token, price) {
            debug!("Dropped superseded price fetch #{}", generation);
            return;
        }
        let current = *shared.reference_price.borrow();
        debug!("💲 Reference price: {:?}", current);
        shared.recompute();
    }

    fn stop(self) {
        self.token.cancel();
        self.task.abort();
    }
}

// ============================================
// COORDINATOR
// ============================================

/// Sessions and loops, only touched under the control lock
struct Control<P: FeeQuoteProvider> {
    sessions: HashMap<String, NetworkSession<P>>,
    price_loop: Option<PriceLoop>,
}

impl<P: FeeQuoteProvider> Control<P> {
    fn teardown(&mut self, shared: &Shared) {
        for (_, mut session) in self.sessions.drain() {
            session.stop();
        }
        if let Some(price_loop) = self.price_loop.take() {
            price_loop.stop();
        }
        shared.mark_all_disconnected();
    }
}

/// Drives fee polling for every configured network
pub struct TrackingCoordinator<P: FeeQuoteProvider, F: ReferencePriceFeed> {
    shared: Arc<Shared>,
    provider: Arc<P>,
    feed: Arc<F>,
    settings: TrackerSettings,
    mode: watch::Sender<TrackingMode>,
    status: watch::Sender<TrackerStatus>,
    /// Bumped on every activation, so a stale activation can't clear `is_loading`
    activation: AtomicU64,
    control: Mutex<Control<P>>,
}

impl<P: FeeQuoteProvider, F: ReferencePriceFeed> TrackingCoordinator<P, F> {
    /// Create an idle coordinator (Simulation mode, nothing polling)
    pub fn new(
        networks: Vec<NetworkConfig>,
        provider: Arc<P>,
        feed: Arc<F>,
        settings: TrackerSettings,
    ) -> Self {
        let networks = networks
            .into_iter()
            .map(|config| Arc::new(NetworkSlot::new(config, settings.history_capacity)))
            .collect();

        let shared = Arc::new(Shared {
            networks,
            engine: SimulationEngine::new(settings.gas_profile),
            reference_price: watch::Sender::new(ReferencePrice::fallback(settings.fallback_price)),
            price_generation: AtomicU64::new(0),
            notional: watch::Sender::new(settings.notional_amount),
            results: watch::Sender::new(Vec::new()),
        });
        shared.recompute();

        Self {
            shared,
            provider,
            feed,
            settings,
            mode: watch::Sender::new(TrackingMode::Simulation),
            status: watch::Sender::new(TrackerStatus::default()),
            activation: AtomicU64::new(0),
            control: Mutex::new(Control { sessions: HashMap::new(), price_loop: None }),
        }
    }

    // ========== Read surface ==========

    pub fn mode(&self) -> TrackingMode {
        *self.mode.borrow()
    }

    /// Snapshot of every network, in configured order
    pub fn networks(&self) -> Vec<NetworkState> {
        self.shared.networks.iter().map(|slot| slot.snapshot()).collect()
    }

    pub fn reference_price(&self) -> ReferencePrice {
        *self.shared.reference_price.borrow()
    }

    pub fn notional_amount(&self) -> f64 {
        *self.shared.notional.borrow()
    }

    pub fn simulation_results(&self) -> Vec<SimulationResult> {
        self.shared.results.borrow().clone()
    }

    pub fn status(&self) -> TrackerStatus {
        self.status.borrow().clone()
    }

    pub fn is_loading(&self) -> bool {
        self.status.borrow().is_loading
    }

    pub fn last_error(&self) -> Option<String> {
        self.status.borrow().last_error.clone()
    }

    /// Networks with a connecting or polling session
    pub async fn active_sessions(&self) -> usize {
        let control = self.control.lock().await;
        control.sessions.values().filter(|s| s.is_active()).count()
    }

    pub async fn is_price_loop_running(&self) -> bool {
        self.control.lock().await.price_loop.is_some()
    }

    // ========== Commands ==========

    /// Switch mode. No-op when unchanged.
    ///
    /// Entering Live resolves once every network's first quote has settled
    /// (success or failure), or the sessions were stopped meanwhile.
    pub async fn set_mode(&self, mode: TrackingMode) {
        let pending = {
            let mut control = self.control.lock().await;
            if self.mode() == mode {
                debug!("Tracking mode already {}", mode);
                return;
            }
            self.mode.send_replace(mode);
            info!("🔀 Tracking mode: {}", mode);

            match mode {
                TrackingMode::Live => self.activate(&mut control),
                TrackingMode::Simulation => {
                    control.teardown(&self.shared);
                    self.status.send_modify(|s| s.is_loading = false);
                    None
                }
            }
        };

        if mode == TrackingMode::Simulation {
            self.shared.recompute();
        }

        if let Some((activation, ready)) = pending {
            join_all(ready).await;
            let current = self.activation.load(Ordering::SeqCst) == activation;
            if current && self.mode() == TrackingMode::Live {
                self.status.send_modify(|s| s.is_loading = false);
                info!("✓ Tracking {} networks", self.shared.networks.len());
            }
        }
    }

    /// Change the simulated transaction size and recompute
    pub fn set_notional_amount(&self, amount: f64) -> Result<(), TrackerError> {
        if !amount.is_finite() || amount < 0.0 {
            warn!("Rejected notional amount {}", amount);
            return Err(TrackerError::InvalidNotional(amount));
        }
        self.shared.notional.send_replace(amount);
        self.shared.recompute();
        Ok(())
    }

    /// Recompute simulation results from the current state
    pub fn request_simulation_recompute(&self) -> Vec<SimulationResult> {
        self.shared.recompute();
        self.simulation_results()
    }

    /// Stop all polling and release every handle. Leaves the coordinator in
    /// Simulation mode so a later `set_mode(Live)` starts over. Re-entrant.
    pub async fn stop(&self) {
        let mut control = self.control.lock().await;
        control.teardown(&self.shared);
        self.status.send_modify(|s| s.is_loading = false);
        if self.mode.send_replace(TrackingMode::Simulation) == TrackingMode::Live {
            info!("⏹  Tracking stopped");
        }
    }

    /// Start whatever isn't running. Returns the activation number and the
    /// readiness futures of the sessions started, or None on setup failure.
    fn activate(
        &self,
        control: &mut Control<P>,
    ) -> Option<(u64, Vec<BoxFuture<'static, ()>>)> {
        let activation = self.activation.fetch_add(1, Ordering::SeqCst) + 1;

        if self.shared.networks.is_empty() {
            let err = TrackerError::NoNetworks;
            error!("{}", err);
            self.status.send_replace(TrackerStatus { is_loading: false, last_error: Some(err.to_string()) });
            return None;
        }

        self.status.send_replace(TrackerStatus { is_loading: true, last_error: None });

        if control.price_loop.is_none() {
            control.price_loop = Some(PriceLoop::spawn(
                self.shared.clone(),
                self.feed.clone(),
                self.settings.price_cadence,
                self.settings.fetch_timeout,
            ));
        }

        let mut ready = Vec::with_capacity(self.shared.networks.len());
        for slot in &self.shared.networks {
            if control.sessions.get(slot.id()).is_some_and(|s| s.is_active()) {
                continue;
            }
            if let Some(mut stale) = control.sessions.remove(slot.id()) {
                stale.stop();
            }

            let mut session =
                NetworkSession::new(slot.clone(), self.provider.clone(), self.settings.session_timing())
                    .with_sample_hook(self.sample_hook());
            session.start();
            ready.push(session.ready().boxed());
            control.sessions.insert(slot.id().to_string(), session);
        }

        Some((activation, ready))
    }

    fn sample_hook(&self) -> SampleHook {
        let shared: Weak<Shared> = Arc::downgrade(&self.shared);
        Arc::new(move || {
            if let Some(shared) = shared.upgrade() {
                shared.recompute();
            }
        })
    }
}

impl<P: FeeQuoteProvider, F: ReferencePriceFeed> Drop for TrackingCoordinator<P, F> {
    fn drop(&mut self) {
        self.control.get_mut().teardown(&self.shared);
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains;
    use crate::tracker::state::PriceSource;
    use crate::tracker::testing::{ScriptedPriceFeed, ScriptedProvider, Step};

    type Tracker = TrackingCoordinator<ScriptedProvider, ScriptedPriceFeed>;

    fn tracker(provider: &Arc<ScriptedProvider>, feed: &Arc<ScriptedPriceFeed>) -> Tracker {
        TrackingCoordinator::new(
            chains::default_networks(),
            provider.clone(),
            feed.clone(),
            TrackerSettings::default(),
        )
    }

    fn network(tracker: &Tracker, id: &str) -> NetworkState {
        tracker.networks().into_iter().find(|n| n.id() == id).unwrap()
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_starts_every_network_and_price() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        assert_eq!(tracker.mode(), TrackingMode::Simulation);
        tracker.set_mode(TrackingMode::Live).await;

        assert_eq!(tracker.mode(), TrackingMode::Live);
        assert!(!tracker.is_loading());
        assert_eq!(tracker.last_error(), None);
        assert_eq!(tracker.active_sessions().await, 3);
        assert!(tracker.is_price_loop_running().await);
        assert!(tracker.networks().iter().all(|n| n.connected && n.has_sample()));

        // Price loop samples immediately
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(feed.calls(), 1);
        assert_eq!(tracker.reference_price().value, 2000.0);
        assert_eq!(tracker.reference_price().source, PriceSource::Feed);

        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_live_twice_creates_no_duplicates() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Live).await;
        tracker.set_mode(TrackingMode::Live).await;
        assert_eq!(tracker.active_sessions().await, 3);

        // t = 0, 6, 12: three quotes per network, not six
        time::sleep(Duration::from_secs(13)).await;
        for id in ["ethereum", "polygon", "arbitrum"] {
            assert_eq!(provider.calls_for(id), 3, "{id}");
        }

        // t = 0 and 30: two price samples
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(feed.calls(), 2);

        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_mode_round_trip_does_not_leak_timers() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Live).await;
        time::sleep(Duration::from_secs(7)).await;
        assert_eq!(provider.calls_for("ethereum"), 2);

        tracker.set_mode(TrackingMode::Simulation).await;
        assert_eq!(tracker.active_sessions().await, 0);
        assert!(!tracker.is_price_loop_running().await);
        assert!(tracker.networks().iter().all(|n| !n.connected));

        // Nothing polls while simulating; history is kept
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.calls_for("ethereum"), 2);
        assert_eq!(network(&tracker, "ethereum").history.len(), 2);

        tracker.set_mode(TrackingMode::Live).await;
        assert_eq!(tracker.active_sessions().await, 3);
        assert_eq!(provider.calls_for("ethereum"), 3);

        // One quote per cadence after the restart
        time::sleep(Duration::from_secs(13)).await;
        assert_eq!(provider.calls_for("ethereum"), 5);
        assert_eq!(provider.releases(), 3);

        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_failing_network_is_isolated() {
        let provider = Arc::new(ScriptedProvider::per_network(|id, _| {
            if id == "polygon" { Step::fail() } else { Step::ok(12.0) }
        }));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Live).await;
        time::sleep(Duration::from_secs(13)).await;

        let polygon = network(&tracker, "polygon");
        assert!(!polygon.connected);
        assert!(!polygon.has_sample());

        for id in ["ethereum", "arbitrum"] {
            let network = network(&tracker, id);
            assert!(network.connected, "{id}");
            assert_eq!(network.history.len(), 3, "{id}");
        }
        assert_eq!(tracker.last_error(), None);

        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_price_failure_falls_back() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::new(|n| match n {
            1 => None,
            2 => Some(2100.0),
            3 => Some(f64::NAN),
            _ => None,
        }));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Live).await;
        time::sleep(Duration::from_millis(10)).await;
        let price = tracker.reference_price();
        assert_eq!(price.value, 2300.0);
        assert_eq!(price.source, PriceSource::Default);

        time::sleep(Duration::from_secs(30)).await;
        assert_eq!(tracker.reference_price().value, 2100.0);

        time::sleep(Duration::from_secs(30)).await;
        let price = tracker.reference_price();
        assert_eq!(price.value, 2100.0);
        assert_eq!(price.source, PriceSource::LastKnown);

        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_no_networks_sets_error() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker: Tracker =
            TrackingCoordinator::new(vec![], provider.clone(), feed.clone(), TrackerSettings::default());

        tracker.set_mode(TrackingMode::Live).await;

        let status = tracker.status();
        assert!(!status.is_loading);
        assert!(status.last_error.unwrap().contains("no networks"));
        assert!(!tracker.is_price_loop_running().await);
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_simulation_results_follow_inputs() {
        let provider = Arc::new(ScriptedProvider::per_network(|id, _| match id {
            "ethereum" => Step::fees(10.0, 2.0),
            "polygon" => Step::fees(30.0, 30.0),
            _ => Step::fees(0.01, 0.0),
        }));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Live).await;
        time::sleep(Duration::from_millis(10)).await;
        tracker.set_mode(TrackingMode::Simulation).await;

        let results = tracker.simulation_results();
        assert_eq!(results.len(), 3);
        let ethereum = &results[0];
        assert_eq!(ethereum.network_id, "ethereum");
        assert!((ethereum.total_cost_fiat - 200.504).abs() < 1e-9);

        tracker.set_notional_amount(1.0).unwrap();
        let results = tracker.simulation_results();
        assert!((results[0].total_cost_fiat - 2000.504).abs() < 1e-9);
        assert_eq!(results.len(), 3);

        assert_eq!(
            tracker.set_notional_amount(-0.5),
            Err(TrackerError::InvalidNotional(-0.5))
        );
        assert_eq!(tracker.notional_amount(), 1.0);

        let again = tracker.request_simulation_recompute();
        assert_eq!(again, results);
    }

    #[tokio::test(start_paused = true)]
    async fn test_stop_is_reentrant_and_restartable() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.stop().await;
        tracker.set_mode(TrackingMode::Live).await;
        tracker.stop().await;
        tracker.stop().await;

        assert_eq!(tracker.mode(), TrackingMode::Simulation);
        assert_eq!(tracker.active_sessions().await, 0);
        assert!(!tracker.is_price_loop_running().await);
        assert!(tracker.networks().iter().all(|n| !n.connected));

        let calls = provider.calls();
        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.calls(), calls);

        tracker.set_mode(TrackingMode::Live).await;
        assert_eq!(tracker.active_sessions().await, 3);
        tracker.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_switch_to_simulation_while_connecting() {
        let provider = Arc::new(ScriptedProvider::new(|_| Step::ok(12.0).after(Duration::from_secs(3))));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = Arc::new(tracker(&provider, &feed));

        let live = {
            let tracker = tracker.clone();
            tokio::spawn(async move { tracker.set_mode(TrackingMode::Live).await })
        };
        time::sleep(Duration::from_secs(1)).await;
        tracker.set_mode(TrackingMode::Simulation).await;
        live.await.unwrap();

        // In-flight first quotes were dropped with their sessions
        time::sleep(Duration::from_secs(10)).await;
        assert!(tracker.networks().iter().all(|n| !n.has_sample() && !n.connected));
        assert!(!tracker.is_loading());
    }

    #[tokio::test(start_paused = true)]
    async fn test_samples_trigger_recompute() {
        let provider = Arc::new(ScriptedProvider::new(|n| Step::fees(10.0 * n as f64, 0.0)));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Live).await;
        // First quote: 10 gwei x 21000 gas
        assert!((tracker.simulation_results()[0].gas_cost_native - 0.00021).abs() < 1e-15);

        time::sleep(Duration::from_secs(7)).await;
        // Second quote: 20 gwei x 21000 gas
        assert!((tracker.simulation_results()[0].gas_cost_native - 0.00042).abs() < 1e-15);

        tracker.stop().await;
    }

    #[tokio::test]
    async fn test_results_available_when_starting_in_simulation() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Simulation).await;

        let results = tracker.simulation_results();
        assert_eq!(results.len(), 3);
        // No quotes yet: only the transferred value, at the fallback price
        for result in &results {
            assert_eq!(result.gas_cost_native, 0.0);
            assert!((result.total_cost_fiat - 0.1 * 2300.0).abs() < 1e-9);
        }
        assert_eq!(provider.calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_every_network() {
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let feed = Arc::new(ScriptedPriceFeed::constant(2000.0));
        let tracker = tracker(&provider, &feed);

        tracker.set_mode(TrackingMode::Live).await;
        time::sleep(Duration::from_millis(10)).await;
        assert_eq!(provider.releases(), 0);
        assert_eq!(feed.calls(), 1);

        drop(tracker);
        assert_eq!(provider.releases(), 3);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(provider.calls(), 3);
        assert_eq!(feed.calls(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_slow_price_feed_keeps_cadence() {
        // Fetch 1 takes 50s, the rest 1s
        let feed = Arc::new(
            ScriptedPriceFeed::new(|n| Some(1000.0 + n as f64))
                .with_delays(|n| Duration::from_secs(if n == 1 { 50 } else { 1 })),
        );
        let provider = Arc::new(ScriptedProvider::constant(12.0));
        let settings = TrackerSettings {
            fetch_timeout: Duration::from_secs(60),
            ..TrackerSettings::default()
        };
        let tracker: Tracker =
            TrackingCoordinator::new(chains::default_networks(), provider.clone(), feed.clone(), settings);

        tracker.set_mode(TrackingMode::Live).await;

        // Ticks at 0 and 30 both fetched; fetch 2 landed at 31
        time::sleep(Duration::from_secs(35)).await;
        assert_eq!(feed.calls(), 2);
        assert_eq!(tracker.reference_price().value, 1002.0);

        // Fetch 1 lands at 50 and is older than fetch 2
        time::sleep(Duration::from_secs(20)).await;
        assert_eq!(tracker.reference_price().value, 1002.0);

        tracker.stop().await;
    }
}
