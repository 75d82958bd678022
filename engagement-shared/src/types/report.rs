use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::types::{AggregateSnapshot, TargetType, VoteStats, VoteValue};

/// Result of a cast as returned to the caller.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CastVoteOutcome {
    /// The vote the voter holds after the cast, `None` after a toggle-off.
    pub current_vote: Option<VoteValue>,
    /// `None` when the vote was recorded but the counters could not be read.
    pub stats: Option<VoteStats>,
}

/// A target's stored counters next to the counts derived from the
/// authoritative vote and comment records, read from one snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TargetSnapshot {
    pub stored: AggregateSnapshot,
    pub actual: AggregateSnapshot,
}

impl TargetSnapshot {
    pub fn is_consistent(&self) -> bool {
        self.stored == self.actual
    }
}

/// A single aggregate found to have drifted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Correction {
    pub target_id: Uuid,
    pub before: AggregateSnapshot,
    pub after: AggregateSnapshot,
}

impl Correction {
    pub fn upvotes_delta(&self) -> i64 {
        self.after.upvotes as i64 - self.before.upvotes as i64
    }

    pub fn downvotes_delta(&self) -> i64 {
        self.after.downvotes as i64 - self.before.downvotes as i64
    }

    pub fn comment_count_delta(&self) -> i64 {
        self.after.comment_count.unwrap_or(0) as i64 - self.before.comment_count.unwrap_or(0) as i64
    }
}

/// Summary of one reconciliation (or diagnosis) pass over a target type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub target_type: TargetType,
    /// Targets examined.
    pub scanned: u64,
    /// Mismatches found. On a reconcile pass these were written back.
    pub corrections: Vec<Correction>,
    /// Targets whose counters moved between snapshot and write-back.
    pub raced: Vec<Uuid>,
    /// Targets whose corrected aggregate could not be written.
    pub failed: Vec<Uuid>,
}

impl ReconcileReport {
    pub fn new(target_type: TargetType) -> Self {
        Self {
            target_type,
            scanned: 0,
            corrections: Vec::new(),
            raced: Vec::new(),
            failed: Vec::new(),
        }
    }

    /// Whether the pass left every scanned target consistent.
    pub fn is_clean(&self) -> bool {
        self.raced.is_empty() && self.failed.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_correction_deltas() {
        let correction = Correction {
            target_id: Uuid::new_v4(),
            before: AggregateSnapshot {
                upvotes: 4,
                downvotes: 0,
                comment_count: Some(5),
            },
            after: AggregateSnapshot {
                upvotes: 3,
                downvotes: 1,
                comment_count: Some(3),
            },
        };
        assert_eq!(correction.upvotes_delta(), -1);
        assert_eq!(correction.downvotes_delta(), 1);
        assert_eq!(correction.comment_count_delta(), -2);
    }

    #[test]
    fn test_cast_outcome_null_vote() {
        let outcome = CastVoteOutcome {
            current_vote: None,
            stats: Some(VoteStats::new(0, 0)),
        };
        let json = serde_json::to_value(outcome).unwrap();
        assert!(json["currentVote"].is_null());
        assert_eq!(json["stats"]["upvotes"], 0);
        assert_eq!(json["stats"]["voteRatio"], 0.0);
    }

    #[test]
    fn test_cast_outcome_without_stats() {
        let outcome = CastVoteOutcome {
            current_vote: Some(VoteValue::Up),
            stats: None,
        };
        let json = serde_json::to_value(outcome).unwrap();
        assert_eq!(json["currentVote"], "upvote");
        assert!(json["stats"].is_null());
    }
}
