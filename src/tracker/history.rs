//! Per-network fee history
//!
//! A bounded, strictly time-ordered series of chart points. Every sample
//! becomes a flat OHLC point (all four prices equal to the composite gas
//! price); the buffer only orders and bounds them.

use serde::{Deserialize, Serialize};
use std::collections::VecDeque;

use crate::gas_oracle::FeeSample;

/// Default number of points kept per network
pub const HISTORY_CAPACITY: usize = 100;

/// One chart point. `time` is unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistoryPoint {
    pub time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl HistoryPoint {
    /// Flat point at a single price level
    pub fn flat(time: i64, price: f64) -> Self {
        Self { time, open: price, high: price, low: price, close: price }
    }

    pub fn from_sample(sample: &FeeSample) -> Self {
        Self::flat(sample.sampled_at.timestamp(), sample.composite_price)
    }
}

/// Bounded history with strictly increasing timestamps
#[derive(Debug, Clone, PartialEq)]
pub struct HistoryBuffer {
    points: VecDeque<HistoryPoint>,
    capacity: usize,
}

impl Default for HistoryBuffer {
    fn default() -> Self {
        Self::new(HISTORY_CAPACITY)
    }
}

impl HistoryBuffer {
    /// Create an empty buffer. A zero capacity is bumped to one.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { points: VecDeque::with_capacity(capacity), capacity }
    }

    /// Append a point, evicting the oldest once full.
    ///
    /// A point not strictly after the last one is moved to `last.time + 1`.
    pub fn append(&mut self, mut point: HistoryPoint) {
        if let Some(last) = self.points.back() {
            if point.time <= last.time {
                point.time = last.time + 1;
            }
        }

        if self.points.len() == self.capacity {
            self.points.pop_front();
        }
        self.points.push_back(point);
    }

    pub fn len(&self) -> usize {
        self.points.len()
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn last(&self) -> Option<&HistoryPoint> {
        self.points.back()
    }

    pub fn iter(&self) -> impl Iterator<Item = &HistoryPoint> {
        self.points.iter()
    }

    /// Copy of the points, oldest first
    pub fn to_vec(&self) -> Vec<HistoryPoint> {
        self.iter().copied().collect()
    }

    /// Relative change of the latest close against the previous point
    pub fn trend(&self) -> Option<f64> {
        let mut recent = self.points.iter().rev();
        let last = recent.next()?;
        let prev = recent.next()?;
        if prev.close == 0.0 {
            return None;
        }
        Some((last.close - prev.close) / prev.close)
    }
}

// ============================================
// TESTS
// ============================================
