//! This module defines and re-exports the interfaces for the engagement repository.
mod targets;
mod votes;

pub use targets::TargetsRepository;
pub use votes::VotesRepository;
