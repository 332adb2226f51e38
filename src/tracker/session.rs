//! Network Session
//!
//! Owns the polling lifecycle for one network:
//! `Idle -> Connecting -> Polling -> Stopped`.
//!
//! - One immediate quote on start, then one per cadence tick
//! - Each tick spawns its own fetch, so a slow node never delays the next tick
//! - Results land in issue order; late or cancelled results are dropped
//! - Failures only flip `connected` and are retried on the next tick

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::{JoinHandle, JoinSet};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use super::state::{NetworkSlot, QuoteOutcome};
use crate::gas_oracle::FeeQuoteProvider;

/// Called after a fresh fee sample has been applied
pub type SampleHook = Arc<dyn Fn() + Send + Sync>;

/// Lifecycle of a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// Created, not started
    Idle,

    /// First quote in flight
    Connecting,

    /// Polling on cadence. Connection health is the network's `connected` flag.
    Polling,

    /// Stopped for good
    Stopped,
}

impl std::fmt::Display for SessionPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionPhase::Idle => write!(f, "idle"),
            SessionPhase::Connecting => write!(f, "connecting"),
            SessionPhase::Polling => write!(f, "polling"),
            SessionPhase::Stopped => write!(f, "stopped"),
        }
    }
}

/// Polling timings for a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionTiming {
    /// Time between quotes
    pub cadence: Duration,

    /// Time after which a quote counts as failed
    pub fetch_timeout: Duration,
}

impl Default for SessionTiming {
    fn default() -> Self {
        Self { cadence: Duration::from_secs(6), fetch_timeout: Duration::from_secs(5) }
    }
}

/// Polling session for a single network
pub struct NetworkSession<P: FeeQuoteProvider> {
    slot: Arc<NetworkSlot>,
    provider: Arc<P>,
    timing: SessionTiming,
    on_sample: Option<SampleHook>,
    token: CancellationToken,
    phase: watch::Sender<SessionPhase>,
    task: Option<JoinHandle<()>>,
}

impl<P: FeeQuoteProvider> NetworkSession<P> {
    pub fn new(slot: Arc<NetworkSlot>, provider: Arc<P>, timing: SessionTiming) -> Self {
        Self {
            slot,
            provider,
            timing,
            on_sample: None,
            token: CancellationToken::new(),
            phase: watch::Sender::new(SessionPhase::Idle),
            task: None,
        }
    }

    /// Run `hook` after every applied fee sample
    pub fn with_sample_hook(mut self, hook: SampleHook) -> Self {
        self.on_sample = Some(hook);
        self
    }

    pub fn phase(&self) -> SessionPhase {
        *self.phase.borrow()
    }

    /// Connecting or polling
    pub fn is_active(&self) -> bool {
        matches!(self.phase(), SessionPhase::Connecting | SessionPhase::Polling)
    }

    /// Start polling. Only an idle session can start; returns whether it did.
    pub fn start(&mut self) -> bool {
        let started = self.phase.send_if_modified(|phase| {
            if *phase != SessionPhase::Idle {
                return false;
            }
            *phase = SessionPhase::Connecting;
            true
        });
        if !started {
            debug!("Session for {} already {}", self.slot.id(), self.phase());
            return false;
        }

        info!("📡 Tracking {}", self.slot.config());

        let poller = Poller {
            slot: self.slot.clone(),
            provider: self.provider.clone(),
            fetch_timeout: self.timing.fetch_timeout,
            token: self.token.clone(),
            on_sample: self.on_sample.clone(),
        };
        let phase = self.phase.clone();
        let cadence = self.timing.cadence;

        self.task = Some(tokio::spawn(poller.run(cadence, phase)));
        true
    }

    /// Resolves once the first quote has settled or the session stopped
    pub fn ready(&self) -> impl std::future::Future<Output = ()> + Send + 'static {
        let mut phase = self.phase.subscribe();
        async move {
            let _ = phase
                .wait_for(|p| matches!(p, SessionPhase::Polling | SessionPhase::Stopped))
                .await;
        }
    }

    /// Stop polling and mark the network disconnected. Idempotent.
    pub fn stop(&mut self) {
        if self.phase.send_replace(SessionPhase::Stopped) == SessionPhase::Stopped {
            return;
        }

        self.token.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        self.slot.mark_disconnected();
        self.provider.release(self.slot.config());

        info!("⏹  Stopped tracking {}", self.slot.config().display_name);
    }
}

impl<P: FeeQuoteProvider> Drop for NetworkSession<P> {
    fn drop(&mut self) {
        self.stop();
    }
}

impl<P: FeeQuoteProvider> std::fmt::Debug for NetworkSession<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NetworkSession")
            .field("network", &self.slot.id())
            .field("phase", &*self.phase.borrow())
            .field("timing", &self.timing)
            .finish()
    }
}

// ============================================
// POLLING TASK
// ============================================

/// Everything a single fetch needs, cheap to clone into spawned tasks
struct Poller<P> {
    slot: Arc<NetworkSlot>,
    provider: Arc<P>,
    fetch_timeout: Duration,
    token: CancellationToken,
    on_sample: Option<SampleHook>,
}

impl<P> Clone for Poller<P> {
    fn clone(&self) -> Self {
        Self {
            slot: self.slot.clone(),
            provider: self.provider.clone(),
            fetch_timeout: self.fetch_timeout,
            token: self.token.clone(),
            on_sample: self.on_sample.clone(),
        }
    }
}

impl<P: FeeQuoteProvider> Poller<P> {
    async fn run(self, cadence: Duration, phase: watch::Sender<SessionPhase>) {
        let first = self.slot.issue();
        tokio::select! {
            _ = self.token.cancelled() => return,
            _ = self.clone().poll_once(first) => {}
        }

        phase.send_if_modified(|p| {
            if *p != SessionPhase::Connecting {
                return false;
            }
            *p = SessionPhase::Polling;
            true
        });

        let mut ticker = time::interval_at(Instant::now() + cadence, cadence);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut in_flight = JoinSet::new();

        loop {
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = ticker.tick() => {
                    let generation = self.slot.issue();
                    in_flight.spawn(self.clone().poll_once(generation));
                }
                Some(_) = in_flight.join_next(), if !in_flight.is_empty() => {}
            }
        }

        in_flight.abort_all();
    }

    async fn poll_once(self, generation: u64) {
        let network = self.slot.config();

        let outcome = match time::timeout(self.fetch_timeout, self.provider.fetch(network)).await {
            Ok(Ok(sample)) => match sample.validate() {
                Ok(()) => QuoteOutcome::Sample(sample),
                Err(e) => {
                    warn!("{}: {}", network.id, e);
                    QuoteOutcome::Rejected
                }
            },
            Ok(Err(e)) => {
                warn!("Error fetching gas data for {}: {}", network.id, e);
                QuoteOutcome::Failed
            }
            Err(_) => {
                warn!("Gas fetch for {} timed out after {:?}", network.id, self.fetch_timeout);
                QuoteOutcome::Failed
            }
        };

        if !self.slot.apply(generation, &self.token, &outcome) {
            debug!("Dropped superseded quote #{} for {}", generation, network.id);
            return;
        }

        trace!("{} quote #{} applied: {:?}", network.id, generation, outcome);
        if let (QuoteOutcome::Sample(_), Some(hook)) = (&outcome, &self.on_sample) {
            hook();
        }
    }
}

// ============================================
// TESTS
// ============================================
