use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// The kind of content a vote can reference.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(rename_all = "lowercase")]
pub enum TargetType {
    /// A top-level story. Stories also carry a comment count.
    Story,
    /// A comment attached to a story.
    Comment,
}

impl TargetType {
    /// Every target type, in reconciliation order.
    pub const ALL: [TargetType; 2] = [TargetType::Story, TargetType::Comment];

    pub fn as_str(&self) -> &'static str {
        match self {
            TargetType::Story => "story",
            TargetType::Comment => "comment",
        }
    }

    /// Whether targets of this type carry a denormalized comment count.
    pub fn has_comment_count(&self) -> bool {
        matches!(self, TargetType::Story)
    }
}

impl fmt::Display for TargetType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Returned when a string does not name a known target type.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("unknown target type: {0}")]
pub struct ParseTargetTypeError(pub String);

impl FromStr for TargetType {
    type Err = ParseTargetTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "story" => Ok(TargetType::Story),
            "comment" => Ok(TargetType::Comment),
            other => Err(ParseTargetTypeError(other.to_string())),
        }
    }
}

/// Identifies a single votable target.
///
/// A target is always exactly one kind, so a vote referencing a `TargetRef`
/// can never point at both a story and a comment, or at neither.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub struct TargetRef {
    pub target_id: Uuid,
    pub target_type: TargetType,
}

impl TargetRef {
    pub fn new(target_id: Uuid, target_type: TargetType) -> Self {
        Self {
            target_id,
            target_type,
        }
    }

    pub fn story(target_id: Uuid) -> Self {
        Self::new(target_id, TargetType::Story)
    }

    pub fn comment(target_id: Uuid) -> Self {
        Self::new(target_id, TargetType::Comment)
    }
}

impl fmt::Display for TargetRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.target_type, self.target_id)
    }
}
