//! Shared tracker state
//!
//! Each network lives in a [`NetworkSlot`]: a watch cell whose value is
//! replaced atomically on every write, so readers always see a complete
//! [`NetworkState`]. Writes carry the issue number of the fetch that
//! produced them and are dropped if a newer fetch already landed.

use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use super::history::{HistoryBuffer, HistoryPoint};
use crate::chains::NetworkConfig;
use crate::gas_oracle::FeeSample;

// ============================================
// NETWORK STATE
// ============================================

/// Latest view of one network
#[derive(Debug, Clone)]
pub struct NetworkState {
    pub config: Arc<NetworkConfig>,

    /// Most recent accepted fee quote
    pub latest: FeeSample,

    /// Chart points, oldest first
    pub history: HistoryBuffer,

    /// Whether the last settled fetch succeeded
    pub connected: bool,

    /// Issue number of the fetch behind the last write (0 = none yet)
    pub generation: u64,
}

impl NetworkState {
    pub fn new(config: Arc<NetworkConfig>, history_capacity: usize) -> Self {
        Self {
            config,
            latest: FeeSample::empty(),
            history: HistoryBuffer::new(history_capacity),
            connected: false,
            generation: 0,
        }
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Whether any quote has been accepted yet
    pub fn has_sample(&self) -> bool {
        !self.history.is_empty()
    }
}

/// Result of one fee fetch, ready to be applied
#[derive(Debug, Clone, PartialEq)]
pub enum QuoteOutcome {
    /// Valid quote
    Sample(FeeSample),

    /// Provider failed or timed out
    Failed,

    /// Provider answered with a malformed quote; state is left untouched
    Rejected,
}

// ============================================
// NETWORK SLOT
// ============================================

/// Shared cell for one network, alive for the tracker's lifetime
#[derive(Debug)]
pub struct NetworkSlot {
    config: Arc<NetworkConfig>,
    state: watch::Sender<NetworkState>,
    /// Last issued fetch number. Survives session restarts.
    issued: AtomicU64,
}

impl NetworkSlot {
    pub fn new(config: NetworkConfig, history_capacity: usize) -> Self {
        let config = Arc::new(config);
        let state = NetworkState::new(config.clone(), history_capacity);
        Self { config, state: watch::Sender::new(state), issued: AtomicU64::new(0) }
    }

    pub fn config(&self) -> &NetworkConfig {
        &self.config
    }

    pub fn id(&self) -> &str {
        &self.config.id
    }

    /// Consistent copy of the current state
    pub fn snapshot(&self) -> NetworkState {
        self.state.borrow().clone()
    }

    /// Reserve the next fetch number
    pub(crate) fn issue(&self) -> u64 {
        self.issued.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Apply a settled fetch. Returns false when the result was dropped
    /// because its session was cancelled or a newer fetch already landed.
    ///
    /// The cancellation check happens under the cell's write lock, so once
    /// `mark_disconnected` runs after a cancel, no stale result can follow it.
    pub(crate) fn apply(
        &self,
        generation: u64,
        token: &CancellationToken,
        outcome: &QuoteOutcome,
    ) -> bool {
        self.state.send_if_modified(|state| {
            if token.is_cancelled() || generation <= state.generation {
                return false;
            }

            match outcome {
                QuoteOutcome::Sample(sample) => {
                    state.latest = *sample;
                    state.history.append(HistoryPoint::from_sample(sample));
                    state.connected = true;
                }
                QuoteOutcome::Failed => state.connected = false,
                QuoteOutcome::Rejected => {}
            }
            state.generation = generation;
            true
        })
    }

    pub(crate) fn mark_disconnected(&self) {
        self.state.send_if_modified(|state| std::mem::replace(&mut state.connected, false));
    }
}

// ============================================
// REFERENCE PRICE
// ============================================

/// Where the current reference price came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PriceSource {
    /// Configured default, no feed value seen yet
    Default,

    /// Fresh value from the feed
    Feed,

    /// Feed failed, holding the last good value
    LastKnown,
}

impl std::fmt::Display for PriceSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PriceSource::Default => write!(f, "default"),
            PriceSource::Feed => write!(f, "feed"),
            PriceSource::LastKnown => write!(f, "last known"),
        }
    }
}

/// Native asset price in USD
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ReferencePrice {
    pub value: f64,
    pub source: PriceSource,
    /// Time of the last good feed value
    pub updated_at: Option<DateTime<Utc>>,
}

impl ReferencePrice {
    pub fn fallback(value: f64) -> Self {
        Self { value, source: PriceSource::Default, updated_at: None }
    }

    /// Next price after a feed result. Failures keep the last good value,
    /// or the default when there never was one.
    pub fn next(&self, fetched: Option<f64>) -> Self {
        match fetched {
            Some(value) => Self { value, source: PriceSource::Feed, updated_at: Some(Utc::now()) },
            None if self.updated_at.is_some() => Self { source: PriceSource::LastKnown, ..*self },
            None => *self,
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chains;

    fn slot() -> NetworkSlot {
        NetworkSlot::new(chains::ethereum(), 100)
    }

    #[test]
    fn test_apply_sample() {
        let slot = slot();
        let token = CancellationToken::new();

        let generation = slot.issue();
        let sample = FeeSample::new(10.0, 2.0, 12.0);
        assert!(slot.apply(generation, &token, &QuoteOutcome::Sample(sample)));

        let state = slot.snapshot();
        assert!(state.connected);
        assert!(state.has_sample());
        assert_eq!(state.latest, sample);
        assert_eq!(state.history.last().unwrap().close, 12.0);
        assert_eq!(state.generation, generation);
    }

    #[test]
    fn test_stale_result_dropped() {
        let slot = slot();
        let token = CancellationToken::new();

        let older = slot.issue();
        let newer = slot.issue();

        assert!(slot.apply(newer, &token, &QuoteOutcome::Failed));
        assert!(!slot.apply(older, &token, &QuoteOutcome::Sample(FeeSample::new(1.0, 1.0, 2.0))));

        let state = slot.snapshot();
        assert!(!state.connected);
        assert!(!state.has_sample());
        assert_eq!(state.generation, newer);
    }

    #[test]
    fn test_cancelled_result_dropped() {
        let slot = slot();
        let token = CancellationToken::new();
        let generation = slot.issue();

        token.cancel();
        assert!(!slot.apply(generation, &token, &QuoteOutcome::Sample(FeeSample::new(1.0, 1.0, 2.0))));
        assert_eq!(slot.snapshot().generation, 0);
    }

    #[test]
    fn test_rejected_leaves_fields() {
        let slot = slot();
        let token = CancellationToken::new();

        let first = slot.issue();
        slot.apply(first, &token, &QuoteOutcome::Sample(FeeSample::new(10.0, 2.0, 12.0)));
        let second = slot.issue();
        assert!(slot.apply(second, &token, &QuoteOutcome::Rejected));

        let state = slot.snapshot();
        assert!(state.connected);
        assert_eq!(state.history.len(), 1);
        assert_eq!(state.latest.composite_price, 12.0);
    }

    #[test]
    fn test_mark_disconnected_notifies_once() {
        let slot = slot();
        let token = CancellationToken::new();
        let mut rx = slot.state.subscribe();

        slot.apply(slot.issue(), &token, &QuoteOutcome::Sample(FeeSample::new(1.0, 0.0, 1.0)));
        rx.borrow_and_update();

        slot.mark_disconnected();
        assert!(rx.has_changed().unwrap());
        rx.borrow_and_update();

        slot.mark_disconnected();
        assert!(!rx.has_changed().unwrap());
    }

    #[test]
    fn test_reference_price_fallback() {
        let price = ReferencePrice::fallback(2300.0);

        let failed = price.next(None);
        assert_eq!(failed.value, 2300.0);
        assert_eq!(failed.source, PriceSource::Default);

        let fresh = failed.next(Some(2450.0));
        assert_eq!(fresh.value, 2450.0);
        assert_eq!(fresh.source, PriceSource::Feed);

        let held = fresh.next(None);
        assert_eq!(held.value, 2450.0);
        assert_eq!(held.source, PriceSource::LastKnown);
        assert_eq!(held.updated_at, fresh.updated_at);
    }
}
