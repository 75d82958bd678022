//! Engagement Reconciler Library
//!
//! Configuration, dependency wiring and the scheduling loop of the binary
//! that keeps stored vote and comment counters in step with live records.
pub mod config;
pub mod errors;
pub mod scheduler;

pub use config::{Dependencies, ReconcilerConfig};
pub use errors::ReconcilerError;
pub use scheduler::{PassKind, Scheduler};
