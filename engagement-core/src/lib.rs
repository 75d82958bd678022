//! # Engagement Core
//! This crate holds the vote and counter consistency logic: the vote ledger
//! that keeps one live vote per voter and target, the projectors that keep
//! denormalized counters in step with it, and the consistency checker that
//! repairs drift between the two.
//!
//! ## Modules
//!
//! - [`ledger`]: per-voter vote state machine and its serialization
//! - [`projector`]: vote counter and comment count projections
//! - [`consistency`]: reconciliation of counters against authoritative records
//! - [`service`]: facade used by the HTTP layer and the reconciler
pub mod config;
pub mod consistency;
pub mod drift;
pub mod errors;
pub mod ledger;
pub mod locks;
pub mod projector;
pub mod service;

pub use config::EngagementConfig;
pub use consistency::ConsistencyChecker;
pub use drift::{DriftReason, DriftSignal};
pub use errors::EngagementError;
pub use ledger::VoteLedger;
pub use projector::{CommentCountProjector, CounterProjector};
pub use service::EngagementService;
