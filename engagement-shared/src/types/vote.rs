use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::types::TargetRef;

/// Represents the type of vote cast by a user.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum VoteValue {
    /// Indicates an upvote or positive endorsement.
    #[serde(rename = "upvote")]
    Up,
    /// Indicates a downvote or negative endorsement.
    #[serde(rename = "downvote")]
    Down,
}

impl VoteValue {
    pub fn as_str(&self) -> &'static str {
        match self {
            VoteValue::Up => "upvote",
            VoteValue::Down => "downvote",
        }
    }
}

impl fmt::Display for VoteValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string is not a recognized vote type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{0} is not a valid vote type")]
pub struct ParseVoteValueError(pub String);

impl FromStr for VoteValue {
    type Err = ParseVoteValueError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "upvote" => Ok(VoteValue::Up),
            "downvote" => Ok(VoteValue::Down),
            other => Err(ParseVoteValueError(other.to_string())),
        }
    }
}

/// Uniqueness key of a vote: one voter on one target.
pub type VoteKey = (Uuid, TargetRef);

/// Represents a user's live vote on a target.
///
/// At most one `Vote` exists per `(voter_id, target)`. The record is created
/// on the first cast, updated in place when the voter switches sides and
/// removed when the voter repeats the same vote.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct Vote {
    pub voter_id: Uuid,
    pub target: TargetRef,
    pub vote_type: VoteValue,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Vote {
    /// Creates a fresh vote record stamped with the current time.
    pub fn new(voter_id: Uuid, target: TargetRef, vote_type: VoteValue) -> Self {
        let now = Utc::now();
        Self {
            voter_id,
            target,
            vote_type,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn key(&self) -> VoteKey {
        (self.voter_id, self.target)
    }
}
