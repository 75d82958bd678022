use serde::{Deserialize, Serialize};

use crate::types::VoteValue;

/// The state of one voter on one target.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
pub enum VoteState {
    #[default]
    NoVote,
    Upvoted,
    Downvoted,
}

impl From<Option<VoteValue>> for VoteState {
    fn from(vote: Option<VoteValue>) -> Self {
        match vote {
            None => VoteState::NoVote,
            Some(VoteValue::Up) => VoteState::Upvoted,
            Some(VoteValue::Down) => VoteState::Downvoted,
        }
    }
}

impl VoteState {
    /// The vote a voter in this state currently holds.
    pub fn vote(&self) -> Option<VoteValue> {
        match self {
            VoteState::NoVote => None,
            VoteState::Upvoted => Some(VoteValue::Up),
            VoteState::Downvoted => Some(VoteValue::Down),
        }
    }

    /// Applies a cast to this state.
    ///
    /// Casting the held vote again toggles it off, casting the opposite vote
    /// switches sides, and casting from `NoVote` creates a vote.
    pub fn cast(self, input: VoteValue) -> VoteTransition {
        let next = match (self.vote(), input) {
            (Some(held), input) if held == input => VoteState::NoVote,
            (_, input) => VoteState::from(Some(input)),
        };
        VoteTransition {
            previous: self,
            next,
            delta: VoteDelta::between(self, next),
        }
    }
}

/// A counter change to apply to a target aggregate.
#[derive(Clone, Copy, Debug, Serialize, Deserialize, PartialEq, Eq, Default)]
pub struct VoteDelta {
    pub upvotes: i64,
    pub downvotes: i64,
}

impl VoteDelta {
    pub const ZERO: VoteDelta = VoteDelta {
        upvotes: 0,
        downvotes: 0,
    };

    pub fn new(upvotes: i64, downvotes: i64) -> Self {
        Self { upvotes, downvotes }
    }

    /// The counter change that moves a target from `from` to `to`.
    pub fn between(from: VoteState, to: VoteState) -> Self {
        let weight = |state: VoteState| match state {
            VoteState::NoVote => (0, 0),
            VoteState::Upvoted => (1, 0),
            VoteState::Downvoted => (0, 1),
        };
        let (from_up, from_down) = weight(from);
        let (to_up, to_down) = weight(to);
        Self::new(to_up - from_up, to_down - from_down)
    }

    pub fn is_zero(&self) -> bool {
        self.upvotes == 0 && self.downvotes == 0
    }

    /// The change in net score implied by this delta.
    pub fn net(&self) -> i64 {
        self.upvotes - self.downvotes
    }
}

/// The outcome of applying one cast to a voter's state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct VoteTransition {
    pub previous: VoteState,
    pub next: VoteState,
    pub delta: VoteDelta,
}
