//! PostgreSQL implementation of the engagement repository.
//!
//! ## Database Tables
//!
//! - `stories`: story counters (`upvotes`, `downvotes`, `comment_count`) and soft-delete flag
//! - `comments`: comment counters, parent story and soft-delete flag
//! - `votes`: one row per live vote, referencing exactly one of `story_id` / `comment_id`
//!
//! Uniqueness of `(voter, target)` is enforced by partial unique indexes, so
//! vote writes are compare-and-swaps that surface a lost race as
//! `RepositoryError::Conflict`.
mod engagement_repository;

pub use engagement_repository::PostgresEngagementRepository;
