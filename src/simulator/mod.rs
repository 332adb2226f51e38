//! The Simulator
//!
//! Responsible for:
//! - Turning the latest fee quote of every network into the cost of a
//!   hypothetical transaction, in native units and in USD
//! - Picking the cheapest network for display

mod cost;

pub use cost::{cheapest, SimulationEngine, SimulationResult};
