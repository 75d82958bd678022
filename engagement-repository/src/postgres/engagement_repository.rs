use async_trait::async_trait;
use chrono::{DateTime, Utc};
use engagement_shared::types::{
    AggregateSnapshot, TargetRef, TargetSnapshot, TargetType, Vote, VoteDelta, VoteStats,
    VoteValue,
};
use sqlx::Row;
use tracing::debug;
use uuid::Uuid;

use crate::errors::RepositoryError;
use crate::interfaces::{TargetsRepository, VotesRepository};
use crate::types::{AppliedCommentDelta, AppliedDelta, TargetStatus};

/// PostgreSQL implementation of the engagement repository.
///
/// Implements both `VotesRepository` and `TargetsRepository` on a shared
/// `sqlx::PgPool`. Counter changes are single `UPDATE` statements, so
/// concurrent deltas from distinct voters never lose an increment.
pub struct PostgresEngagementRepository {
    pool: sqlx::PgPool,
}

impl PostgresEngagementRepository {
    /// Creates a new PostgreSQL repository instance.
    ///
    /// # Arguments
    ///
    /// * `pool` - Configured PostgreSQL connection pool with the engagement schema
    ///
    /// # Returns
    ///
    /// * `Ok(PostgresEngagementRepository)` - Ready-to-use repository instance
    /// * `Err(RepositoryError)` - Future validation errors (currently always succeeds)
    pub async fn new(pool: sqlx::PgPool) -> Result<Self, RepositoryError> {
        Ok(Self { pool })
    }

    /// Applies the bundled schema migrations.
    pub async fn migrate(&self) -> Result<(), RepositoryError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

fn table(target_type: TargetType) -> &'static str {
    match target_type {
        TargetType::Story => "stories",
        TargetType::Comment => "comments",
    }
}

fn vote_column(target_type: TargetType) -> &'static str {
    match target_type {
        TargetType::Story => "story_id",
        TargetType::Comment => "comment_id",
    }
}

fn encode_vote_type(vote_type: VoteValue) -> i16 {
    match vote_type {
        VoteValue::Up => 0,
        VoteValue::Down => 1,
    }
}

fn decode_vote_type(value: i16) -> Result<VoteValue, RepositoryError> {
    match value {
        0 => Ok(VoteValue::Up),
        1 => Ok(VoteValue::Down),
        _ => Err(RepositoryError::InvalidVoteType(value)),
    }
}

fn to_counter(value: i64) -> Result<u64, RepositoryError> {
    u64::try_from(value).map_err(|_| RepositoryError::InvalidCounter(value))
}

fn to_column(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn aggregate_from_row(
    row: &sqlx::postgres::PgRow,
    upvotes: &str,
    downvotes: &str,
    comment_count: &str,
) -> Result<AggregateSnapshot, RepositoryError> {
    let comment_count: Option<i64> = row.try_get(comment_count)?;
    Ok(AggregateSnapshot {
        upvotes: to_counter(row.try_get(upvotes)?)?,
        downvotes: to_counter(row.try_get(downvotes)?)?,
        comment_count: comment_count.map(to_counter).transpose()?,
    })
}

#[async_trait]
impl VotesRepository for PostgresEngagementRepository {
    async fn get_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
    ) -> Result<Option<Vote>, RepositoryError> {
        let query = format!(
            "SELECT vote_type, created_at, updated_at FROM votes WHERE voter_id = $1 AND {} = $2",
            vote_column(target.target_type)
        );

        let row = sqlx::query(&query)
            .bind(voter_id)
            .bind(target.target_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<Vote, RepositoryError> {
            Ok(Vote {
                voter_id,
                target,
                vote_type: decode_vote_type(row.try_get("vote_type")?)?,
                created_at: row.try_get::<DateTime<Utc>, _>("created_at")?,
                updated_at: row.try_get::<DateTime<Utc>, _>("updated_at")?,
            })
        })
        .transpose()
    }

    /// Inserts a vote, relying on the partial unique indexes to reject a
    /// second live vote for the same voter and target.
    async fn insert_vote(&self, vote: &Vote) -> Result<(), RepositoryError> {
        let query = format!(
            r#"
            INSERT INTO votes (voter_id, {}, vote_type, created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT DO NOTHING
            "#,
            vote_column(vote.target.target_type)
        );

        let result = sqlx::query(&query)
            .bind(vote.voter_id)
            .bind(vote.target.target_id)
            .bind(encode_vote_type(vote.vote_type))
            .bind(vote.created_at)
            .bind(vote.updated_at)
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::conflict(format!(
                "vote by {} on {} already exists",
                vote.voter_id, vote.target
            )));
        }
        Ok(())
    }

    async fn update_vote_type(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        expected: VoteValue,
        vote_type: VoteValue,
    ) -> Result<(), RepositoryError> {
        let query = format!(
            r#"
            UPDATE votes SET vote_type = $3, updated_at = NOW()
            WHERE voter_id = $1 AND {} = $2 AND vote_type = $4
            "#,
            vote_column(target.target_type)
        );

        let result = sqlx::query(&query)
            .bind(voter_id)
            .bind(target.target_id)
            .bind(encode_vote_type(vote_type))
            .bind(encode_vote_type(expected))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::conflict(format!(
                "{expected} by {voter_id} on {target} changed before update"
            )));
        }
        Ok(())
    }

    async fn delete_vote(
        &self,
        voter_id: Uuid,
        target: TargetRef,
        expected: VoteValue,
    ) -> Result<(), RepositoryError> {
        let query = format!(
            "DELETE FROM votes WHERE voter_id = $1 AND {} = $2 AND vote_type = $3",
            vote_column(target.target_type)
        );

        let result = sqlx::query(&query)
            .bind(voter_id)
            .bind(target.target_id)
            .bind(encode_vote_type(expected))
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::conflict(format!(
                "{expected} by {voter_id} on {target} changed before delete"
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TargetsRepository for PostgresEngagementRepository {
    async fn target_status(&self, target: TargetRef) -> Result<TargetStatus, RepositoryError> {
        let query = format!("SELECT is_deleted FROM {} WHERE id = $1", table(target.target_type));

        let is_deleted: Option<bool> = sqlx::query_scalar(&query)
            .bind(target.target_id)
            .fetch_optional(&self.pool)
            .await?;

        Ok(match is_deleted {
            None => TargetStatus::Missing,
            Some(true) => TargetStatus::Deleted,
            Some(false) => TargetStatus::Live,
        })
    }

    async fn get_aggregate(
        &self,
        target: TargetRef,
    ) -> Result<Option<AggregateSnapshot>, RepositoryError> {
        let comment_count = if target.target_type.has_comment_count() {
            "comment_count"
        } else {
            "NULL::BIGINT"
        };
        let query = format!(
            "SELECT upvotes, downvotes, {comment_count} AS comment_count FROM {} WHERE id = $1",
            table(target.target_type)
        );

        let row = sqlx::query(&query)
            .bind(target.target_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| aggregate_from_row(&row, "upvotes", "downvotes", "comment_count"))
            .transpose()
    }

    /// Applies the delta with one `UPDATE`, flooring at zero. The locked
    /// `prev` row tells whether the floor was hit.
    async fn apply_vote_delta(
        &self,
        target: TargetRef,
        delta: VoteDelta,
    ) -> Result<Option<AppliedDelta>, RepositoryError> {
        let table = table(target.target_type);
        let query = format!(
            r#"
            UPDATE {table} AS t
            SET upvotes = GREATEST(t.upvotes + $2, 0),
                downvotes = GREATEST(t.downvotes + $3, 0)
            FROM (SELECT id, upvotes, downvotes FROM {table} WHERE id = $1 FOR UPDATE) AS prev
            WHERE t.id = prev.id
            RETURNING t.upvotes, t.downvotes,
                (prev.upvotes + $2 < 0 OR prev.downvotes + $3 < 0) AS clamped
            "#
        );

        let row = sqlx::query(&query)
            .bind(target.target_id)
            .bind(delta.upvotes)
            .bind(delta.downvotes)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<AppliedDelta, RepositoryError> {
            Ok(AppliedDelta {
                stats: VoteStats::new(
                    to_counter(row.try_get("upvotes")?)?,
                    to_counter(row.try_get("downvotes")?)?,
                ),
                clamped: row.try_get("clamped")?,
            })
        })
        .transpose()
    }

    async fn apply_comment_delta(
        &self,
        story_id: Uuid,
        delta: i64,
    ) -> Result<Option<AppliedCommentDelta>, RepositoryError> {
        let row = sqlx::query(
            r#"
            UPDATE stories AS t
            SET comment_count = GREATEST(t.comment_count + $2, 0)
            FROM (SELECT id, comment_count FROM stories WHERE id = $1 FOR UPDATE) AS prev
            WHERE t.id = prev.id
            RETURNING t.comment_count, (prev.comment_count + $2 < 0) AS clamped
            "#,
        )
        .bind(story_id)
        .bind(delta)
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| -> Result<AppliedCommentDelta, RepositoryError> {
            Ok(AppliedCommentDelta {
                comment_count: to_counter(row.try_get("comment_count")?)?,
                clamped: row.try_get("clamped")?,
            })
        })
        .transpose()
    }

    async fn list_target_ids(
        &self,
        target_type: TargetType,
        after: Option<Uuid>,
        limit: usize,
    ) -> Result<Vec<Uuid>, RepositoryError> {
        let query = format!(
            "SELECT id FROM {} WHERE ($1::UUID IS NULL OR id > $1) ORDER BY id LIMIT $2",
            table(target_type)
        );

        let ids = sqlx::query_scalar(&query)
            .bind(after)
            .bind(i64::try_from(limit).unwrap_or(i64::MAX))
            .fetch_all(&self.pool)
            .await?;

        Ok(ids)
    }

    /// Reads stored and derived counters in a single statement, which
    /// PostgreSQL evaluates against one snapshot.
    async fn snapshot(&self, target: TargetRef) -> Result<Option<TargetSnapshot>, RepositoryError> {
        let column = vote_column(target.target_type);
        let (stored_comments, live_comments) = if target.target_type.has_comment_count() {
            (
                "t.comment_count",
                "(SELECT COUNT(*) FROM comments c WHERE c.story_id = t.id AND NOT c.is_deleted)",
            )
        } else {
            ("NULL::BIGINT", "NULL::BIGINT")
        };
        let query = format!(
            r#"
            SELECT t.upvotes, t.downvotes, {stored_comments} AS comment_count,
                (SELECT COUNT(*) FROM votes v WHERE v.{column} = t.id AND v.vote_type = 0) AS live_upvotes,
                (SELECT COUNT(*) FROM votes v WHERE v.{column} = t.id AND v.vote_type = 1) AS live_downvotes,
                {live_comments} AS live_comments
            FROM {} AS t
            WHERE t.id = $1
            "#,
            table(target.target_type)
        );

        let row = sqlx::query(&query)
            .bind(target.target_id)
            .fetch_optional(&self.pool)
            .await?;

        row.map(|row| -> Result<TargetSnapshot, RepositoryError> {
            Ok(TargetSnapshot {
                stored: aggregate_from_row(&row, "upvotes", "downvotes", "comment_count")?,
                actual: aggregate_from_row(&row, "live_upvotes", "live_downvotes", "live_comments")?,
            })
        })
        .transpose()
    }

    async fn overwrite_aggregate(
        &self,
        target: TargetRef,
        expected: &AggregateSnapshot,
        corrected: &AggregateSnapshot,
    ) -> Result<bool, RepositoryError> {
        let table = table(target.target_type);
        let result = match (expected.comment_count, corrected.comment_count) {
            (Some(expected_comments), Some(corrected_comments)) => {
                let query = format!(
                    r#"
                    UPDATE {table}
                    SET upvotes = $2, downvotes = $3, comment_count = $4
                    WHERE id = $1 AND upvotes = $5 AND downvotes = $6 AND comment_count = $7
                    "#
                );
                sqlx::query(&query)
                    .bind(target.target_id)
                    .bind(to_column(corrected.upvotes))
                    .bind(to_column(corrected.downvotes))
                    .bind(to_column(corrected_comments))
                    .bind(to_column(expected.upvotes))
                    .bind(to_column(expected.downvotes))
                    .bind(to_column(expected_comments))
                    .execute(&self.pool)
                    .await?
            }
            _ => {
                let query = format!(
                    r#"
                    UPDATE {table}
                    SET upvotes = $2, downvotes = $3
                    WHERE id = $1 AND upvotes = $4 AND downvotes = $5
                    "#
                );
                sqlx::query(&query)
                    .bind(target.target_id)
                    .bind(to_column(corrected.upvotes))
                    .bind(to_column(corrected.downvotes))
                    .bind(to_column(expected.upvotes))
                    .bind(to_column(expected.downvotes))
                    .execute(&self.pool)
                    .await?
            }
        };

        debug!(
            target_ref = %target,
            rows_affected = result.rows_affected(),
            "Overwrote aggregate"
        );
        Ok(result.rows_affected() == 1)
    }
}
