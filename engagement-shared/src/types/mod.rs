mod comment_event;
mod report;
mod stats;
mod target;
mod vote;
mod vote_state;

pub use comment_event::{CommentEvent, CommentEventKind};
pub use report::{CastVoteOutcome, Correction, ReconcileReport, TargetSnapshot};
pub use stats::{AggregateSnapshot, VoteStats};
pub use target::{ParseTargetTypeError, TargetRef, TargetType};
pub use vote::{ParseVoteValueError, Vote, VoteKey, VoteValue};
pub use vote_state::{VoteDelta, VoteState, VoteTransition};
