use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};

/// Public vote counters of a target.
///
/// `net_votes` is always derived from the two stored counters. The
/// serialized form also carries the derived `voteRatio`.
#[derive(Debug, Clone, Copy, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct VoteStats {
    pub upvotes: u64,
    pub downvotes: u64,
    pub net_votes: i64,
}

impl VoteStats {
    pub fn new(upvotes: u64, downvotes: u64) -> Self {
        Self {
            upvotes,
            downvotes,
            net_votes: upvotes as i64 - downvotes as i64,
        }
    }

    /// Share of upvotes among all votes, `0.0` when nobody voted.
    pub fn vote_ratio(&self) -> f64 {
        let total = self.upvotes + self.downvotes;
        if total == 0 {
            0.0
        } else {
            self.upvotes as f64 / total as f64
        }
    }
}

impl Serialize for VoteStats {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("VoteStats", 4)?;
        state.serialize_field("upvotes", &self.upvotes)?;
        state.serialize_field("downvotes", &self.downvotes)?;
        state.serialize_field("netVotes", &self.net_votes)?;
        state.serialize_field("voteRatio", &self.vote_ratio())?;
        state.end()
    }
}

/// Every denormalized counter of a target at one point in time.
///
/// `comment_count` is `None` for targets that do not carry one.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub struct AggregateSnapshot {
    pub upvotes: u64,
    pub downvotes: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub comment_count: Option<u64>,
}

impl AggregateSnapshot {
    pub fn stats(&self) -> VoteStats {
        VoteStats::new(self.upvotes, self.downvotes)
    }
}
