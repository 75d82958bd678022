//! In-memory implementation of the engagement repository.
//!
//! Mirrors the PostgreSQL semantics: vote writes are compare-and-swaps under
//! the vote table lock, and counters are atomics so deltas from distinct
//! voters never lose an increment and never take a lock on the counters.
mod store;

pub use store::InMemoryEngagementStore;
