//! # Engagement Repository
//! This crate provides traits and implementations for the records the
//! engagement core owns: live votes and the denormalized counters of
//! stories and comments. It includes error definitions, the repository
//! interfaces, a PostgreSQL implementation and an in-memory implementation.
pub mod errors;
pub mod interfaces;
pub mod memory;
pub mod postgres;
pub mod types;

pub use errors::RepositoryError;
pub use interfaces::{TargetsRepository, VotesRepository};
pub use memory::InMemoryEngagementStore;
pub use postgres::PostgresEngagementRepository;
pub use types::{AppliedCommentDelta, AppliedDelta, TargetStatus};
