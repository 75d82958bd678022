//! This module defines the `VotesRepository` trait, the authoritative store of
//! live votes. Every write is a compare-and-swap against the state the caller
//! observed, so two writers racing on the same `(voter, target)` pair cannot
//! both succeed.
use engagement_shared::types::{TargetRef, Vote, VoteValue};
use uuid::Uuid;

use crate::errors::RepositoryError;

/// A trait that defines the interface for the live vote records.
#[async_trait::async_trait]
pub trait VotesRepository: Send + Sync {
    /// Retrieves the live vote of a voter on a target, if any.
    async fn get_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
    ) -> Result<Option<Vote>, RepositoryError>;

    /// Inserts a new vote record.
    ///
    /// # Arguments
    ///
    /// * `vote` - The vote to insert.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The vote was inserted.
    /// * `Err(RepositoryError::Conflict)` - A vote for the same voter and target already exists.
    async fn insert_vote(&self, vote: &Vote) -> Result<(), RepositoryError>;

    /// Switches the type of an existing vote.
    ///
    /// # Arguments
    ///
    /// * `voter_id` - The voter owning the vote.
    /// * `target` - The voted target.
    /// * `expected` - The vote type the caller observed.
    /// * `vote_type` - The new vote type.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - The vote was updated.
    /// * `Err(RepositoryError::Conflict)` - No vote with the `expected` type exists anymore.
    async fn update_vote_type(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        expected: VoteValue,
        vote_type: VoteValue,
    ) -> Result<(), RepositoryError>;

    /// Deletes an existing vote.
    ///
    /// Returns `Err(RepositoryError::Conflict)` when no vote with the
    /// `expected` type exists anymore.
    async fn delete_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        expected: VoteValue,
    ) -> Result<(), RepositoryError>;
}
