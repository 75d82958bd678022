//! # Engagement Shared
//! This crate defines the data structures shared across the engagement core.
//! It includes vote records, target references, the per-voter vote state
//! machine, aggregate counters and reconciliation reports.
pub mod types;
