//! Session execution
//!
//! The `Scheduler` actor owns the session registry and the admission queue,
//! starts sessions through the `ProcessManager` as capacity allows, and
//! publishes every lifecycle transition through the event broadcaster.

mod admission;
mod process_manager;
mod registry;
mod scheduler;

pub use scheduler::{Scheduler, SchedulerConfig, SchedulerError};
