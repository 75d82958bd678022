//! Error types for the engagement core.
mod consistency;
mod engagement;
mod ledger;
mod projector;

pub use consistency::ConsistencyError;
pub use engagement::EngagementError;
pub use ledger::LedgerError;
pub use projector::ProjectorError;
