//! Drop automation for the potion puzzle.
//!
//! This module provides:
//! - Timing profile loading and per-pair overrides
//! - Cooperative cancellation and bounded retries
//! - Mouse input (smoothed moves, timed clicks)
//! - Placement strategies and the Drop Controller state machine
//! - The runner that owns the worker thread

pub mod config;
pub mod input;
pub mod interrupt;
pub mod placement;
pub mod queue;
pub mod retry;
pub mod runner;
pub mod state;

pub use config::{ConfigStore, DelayProfile, Fallback, Param};
pub use interrupt::InterruptMonitor;
pub use placement::{LeftmostFit, PairTable, Placement, PlacementStrategy};
pub use queue::{CycleResult, DropState, EngineEvent, EventKind};
pub use retry::RetryPolicy;
pub use runner::Engine;
pub use state::DropController;
