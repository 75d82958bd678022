//! Projections of vote and comment records onto the denormalized counters
//! stored on stories and comments.
mod comment_count;
mod counter;

pub use comment_count::CommentCountProjector;
pub use counter::CounterProjector;
