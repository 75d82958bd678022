use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle change of a comment that affects its story's comment count.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum CommentEventKind {
    Created,
    Deleted,
}

/// A comment lifecycle event emitted by whatever owns comment persistence.
///
/// `event_id` identifies a delivery so redelivered events can be dropped.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct CommentEvent {
    pub event_id: Uuid,
    pub story_id: Uuid,
    pub kind: CommentEventKind,
}

impl CommentEvent {
    pub fn created(story_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            story_id,
            kind: CommentEventKind::Created,
        }
    }

    pub fn deleted(story_id: Uuid) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            story_id,
            kind: CommentEventKind::Deleted,
        }
    }

    /// The comment-count change this event implies.
    pub fn delta(&self) -> i64 {
        match self.kind {
            CommentEventKind::Created => 1,
            CommentEventKind::Deleted => -1,
        }
    }
}
