//! Error types for the engagement repository.
mod repository;

pub use repository::RepositoryError;
