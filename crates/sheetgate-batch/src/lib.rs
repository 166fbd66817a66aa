//! SheetGate Batch Coordinator
//!
//! Coalesces concurrent per-sheet writes into grouped flushes so a burst of
//! `addRow` calls from many request handlers becomes one remote round-trip.

pub mod config;
pub mod coordinator;
pub mod operation;
pub mod queue;
pub mod stats;

pub use config::BatchConfig;
pub use coordinator::BatchCoordinator;
pub use operation::{OpOutcome, OpResult, Operation};
pub use queue::QueueState;
pub use stats::BatchStats;
