//! Result types returned by the repository interfaces.
use engagement_shared::types::VoteStats;

/// Whether a target can currently receive votes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetStatus {
    Missing,
    Deleted,
    Live,
}

/// Counters of a target after a vote delta was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedDelta {
    pub stats: VoteStats,
    /// `true` when a counter would have gone negative and was held at zero.
    pub clamped: bool,
}

/// Comment count of a story after a comment delta was applied.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AppliedCommentDelta {
    pub comment_count: u64,
    /// `true` when the count would have gone negative and was held at zero.
    pub clamped: bool,
}
