//! SQLite persistence gateway.
//!
//! Uses a `sqlx` pool in WAL mode. Vote transactions open with a write
//! statement so SQLite's writer lock is taken before anything is read,
//! which serializes every vote transaction (and so every [`BallotKey`]).
//!
//! Writers wait for the lock for at most the gateway's write timeout.
//! Running out of it is reported as [`GatewayError::Timeout`].

use std::str::FromStr;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::{Pool, Sqlite, Transaction};
use tracing::{debug, info};

use beatbattle_core::config::DatabaseConfig;
use beatbattle_core::{
    Contest, ContestDraft, ContestFilter, ContestId, Deadlines, Feedback, NewSubmission, Phase,
    Submission, SubmissionId, SubmissionOwner, UserId, VoteId,
};

use super::{BallotKey, Gateway, Result, VoteTransaction};
use crate::error::GatewayError;

const SCHEMA_SQL: &str = r"
CREATE TABLE IF NOT EXISTS contests (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    title TEXT NOT NULL,
    rules TEXT NOT NULL,
    entry_deadline TEXT NOT NULL,
    voting_deadline TEXT NOT NULL,
    phase TEXT NOT NULL DEFAULT 'entry',
    host_id INTEGER NOT NULL,
    password TEXT,
    max_votes INTEGER NOT NULL CHECK (max_votes BETWEEN 1 AND 10)
);

CREATE TABLE IF NOT EXISTS submissions (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    contest_id INTEGER NOT NULL REFERENCES contests(id) ON DELETE CASCADE,
    user_id INTEGER NOT NULL,
    url TEXT NOT NULL,
    votes INTEGER NOT NULL DEFAULT 0 CHECK (votes >= 0),
    qualified INTEGER NOT NULL DEFAULT 1,
    placement INTEGER CHECK (placement IS NULL OR placement >= 1),
    UNIQUE (contest_id, user_id)
);

CREATE TABLE IF NOT EXISTS votes (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    contest_id INTEGER NOT NULL REFERENCES contests(id) ON DELETE CASCADE,
    UNIQUE (user_id, submission_id)
);

CREATE TABLE IF NOT EXISTS likes (
    user_id INTEGER NOT NULL,
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    PRIMARY KEY (submission_id, user_id)
);

CREATE TABLE IF NOT EXISTS feedback (
    id INTEGER PRIMARY KEY AUTOINCREMENT,
    user_id INTEGER NOT NULL,
    submission_id INTEGER NOT NULL REFERENCES submissions(id) ON DELETE CASCADE,
    body TEXT NOT NULL,
    UNIQUE (submission_id, user_id)
);

CREATE INDEX IF NOT EXISTS idx_votes_user_contest ON votes(user_id, contest_id);
CREATE INDEX IF NOT EXISTS idx_submissions_contest ON submissions(contest_id);
CREATE INDEX IF NOT EXISTS idx_contests_phase ON contests(phase, entry_deadline);
";

const CONTEST_COLUMNS: &str = "c.id, c.title, c.rules, c.entry_deadline, c.voting_deadline, \
     c.phase, c.host_id, c.password, c.max_votes, \
     (SELECT COUNT(*) FROM submissions s WHERE s.contest_id = c.id) AS submission_count";

const SUBMISSION_COLUMNS: &str = "id, user_id, contest_id, url, votes, qualified, placement";

// ============================================================================
// Rows
// ============================================================================

#[derive(Debug, sqlx::FromRow)]
struct ContestRow {
    id: i64,
    title: String,
    rules: String,
    entry_deadline: DateTime<Utc>,
    voting_deadline: DateTime<Utc>,
    phase: String,
    host_id: i64,
    password: Option<String>,
    max_votes: i64,
    submission_count: i64,
}

impl TryFrom<ContestRow> for Contest {
    type Error = GatewayError;

    fn try_from(row: ContestRow) -> Result<Self> {
        Ok(Self {
            id: ContestId(row.id),
            title: row.title,
            rules: row.rules,
            deadlines: Deadlines {
                entry: row.entry_deadline,
                voting: row.voting_deadline,
            },
            phase: row.phase.parse()?,
            host: UserId(row.host_id),
            password: row.password,
            max_votes: to_u32("max_votes", row.max_votes)?,
            submission_count: to_u32("submission_count", row.submission_count)?,
        })
    }
}

#[derive(Debug, sqlx::FromRow)]
struct SubmissionRow {
    id: i64,
    user_id: i64,
    contest_id: i64,
    url: String,
    votes: i64,
    qualified: bool,
    placement: Option<i64>,
}

impl TryFrom<SubmissionRow> for Submission {
    type Error = GatewayError;

    fn try_from(row: SubmissionRow) -> Result<Self> {
        Ok(Self {
            id: SubmissionId(row.id),
            owner: UserId(row.user_id),
            contest: ContestId(row.contest_id),
            url: row.url,
            votes: to_u32("votes", row.votes)?,
            qualified: row.qualified,
            placement: row
                .placement
                .map(|p| to_u32("placement", p))
                .transpose()?,
        })
    }
}

fn to_u32(column: &str, value: i64) -> Result<u32> {
    u32::try_from(value)
        .map_err(|_| GatewayError::Corrupt(format!("{column} out of range: {value}")))
}

fn is_foreign_key_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_foreign_key_violation())
}

fn is_check_violation(err: &sqlx::Error) -> bool {
    matches!(err, sqlx::Error::Database(db) if db.is_check_violation())
}

/// `SQLITE_BUSY` and its extended codes.
fn is_busy(err: &sqlx::Error) -> bool {
    matches!(
        err,
        sqlx::Error::Database(db) if db
            .code()
            .and_then(|code| code.parse::<i32>().ok())
            .is_some_and(|code| code & 0xff == 5)
    )
}

// ============================================================================
// Gateway
// ============================================================================

/// Gateway backed by a SQLite database file.
#[derive(Debug, Clone)]
pub struct SqliteGateway {
    pool: Pool<Sqlite>,
    write_timeout: Duration,
}

impl SqliteGateway {
    /// Opens a connection pool for `config.url`, creating the file if needed.
    ///
    /// A write blocked by another writer gives up after `write_timeout`.
    ///
    /// # Errors
    ///
    /// Returns a database error if the URL is invalid or the pool cannot
    /// connect.
    pub async fn connect(config: &DatabaseConfig, write_timeout: Duration) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(&config.url)?
            .create_if_missing(true)
            .journal_mode(SqliteJournalMode::Wal)
            .synchronous(SqliteSynchronous::Normal)
            .foreign_keys(true)
            .busy_timeout(write_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .acquire_timeout(config.acquire_timeout)
            .connect_with(options)
            .await?;

        info!(
            url = %config.url,
            max_connections = config.max_connections,
            write_timeout = ?write_timeout,
            "connected to SQLite"
        );
        Ok(Self {
            pool,
            write_timeout,
        })
    }

    /// Creates the schema if it does not exist yet.
    ///
    /// # Errors
    ///
    /// Returns a database error if a statement fails.
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(SCHEMA_SQL).execute(&self.pool).await?;
        debug!("schema ready");
        Ok(())
    }

    /// Returns the underlying pool.
    #[must_use]
    pub const fn pool(&self) -> &Pool<Sqlite> {
        &self.pool
    }

    /// Converts a failed write, reporting lock waits as timeouts.
    fn write_error(&self, err: sqlx::Error) -> GatewayError {
        if is_busy(&err) {
            GatewayError::Timeout {
                waited: self.write_timeout,
            }
        } else {
            err.into()
        }
    }

    async fn begin_write(&self) -> Result<Transaction<'static, Sqlite>> {
        self.pool.begin().await.map_err(|e| self.write_error(e))
    }
}

#[async_trait]
impl Gateway for SqliteGateway {
    async fn contest_phase(&self, contest: ContestId) -> Result<Phase> {
        let phase: Option<String> = sqlx::query_scalar("SELECT phase FROM contests WHERE id = ?")
            .bind(contest.0)
            .fetch_optional(&self.pool)
            .await?;
        let phase = phase.ok_or(GatewayError::contest_not_found(contest.0))?;
        Ok(phase.parse()?)
    }

    async fn set_contest_phase(
        &self,
        contest: ContestId,
        expected: Phase,
        new: Phase,
    ) -> Result<bool> {
        if !expected.can_advance_to(new) {
            return Ok(false);
        }

        let result = sqlx::query("UPDATE contests SET phase = ? WHERE id = ? AND phase = ?")
            .bind(new.as_str())
            .bind(contest.0)
            .bind(expected.as_str())
            .execute(&self.pool)
            .await
            .map_err(|e| self.write_error(e))?;
        if result.rows_affected() > 0 {
            return Ok(true);
        }

        // Distinguish a lost race from a missing contest
        self.contest_phase(contest).await?;
        Ok(false)
    }

    async fn contest_deadlines(&self, contest: ContestId) -> Result<Deadlines> {
        let row: Option<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            "SELECT entry_deadline, voting_deadline FROM contests WHERE id = ?",
        )
        .bind(contest.0)
        .fetch_optional(&self.pool)
        .await?;
        let (entry, voting) = row.ok_or(GatewayError::contest_not_found(contest.0))?;
        Ok(Deadlines { entry, voting })
    }

    async fn max_votes(&self, contest: ContestId) -> Result<u32> {
        let max: Option<i64> = sqlx::query_scalar("SELECT max_votes FROM contests WHERE id = ?")
            .bind(contest.0)
            .fetch_optional(&self.pool)
            .await?;
        to_u32(
            "max_votes",
            max.ok_or(GatewayError::contest_not_found(contest.0))?,
        )
    }

    async fn submission_owner(&self, submission: SubmissionId) -> Result<Option<SubmissionOwner>> {
        let row: Option<(i64, i64)> =
            sqlx::query_as("SELECT user_id, contest_id FROM submissions WHERE id = ?")
                .bind(submission.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(row.map(|(user, contest)| SubmissionOwner {
            user: UserId(user),
            contest: ContestId(contest),
        }))
    }

    async fn find_vote(&self, voter: UserId, submission: SubmissionId) -> Result<Option<VoteId>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM votes WHERE user_id = ? AND submission_id = ?")
                .bind(voter.0)
                .bind(submission.0)
                .fetch_optional(&self.pool)
                .await?;
        Ok(id.map(VoteId))
    }

    async fn count_votes(&self, voter: UserId, contest: ContestId) -> Result<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE user_id = ? AND contest_id = ?")
                .bind(voter.0)
                .bind(contest.0)
                .fetch_one(&self.pool)
                .await?;
        to_u32("vote count", count)
    }

    async fn begin(&self, key: BallotKey) -> Result<Box<dyn VoteTransaction>> {
        let mut tx = self.begin_write().await?;

        // No-op write: takes the writer lock before the first read
        sqlx::query("UPDATE contests SET max_votes = max_votes WHERE id = ?")
            .bind(key.contest.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.write_error(e))?;

        debug!(voter = %key.voter, contest = %key.contest, "sqlite transaction opened");
        Ok(Box::new(SqliteTransaction { tx }))
    }

    async fn contest(&self, contest: ContestId) -> Result<Contest> {
        let row = sqlx::query_as::<_, ContestRow>(&format!(
            "SELECT {CONTEST_COLUMNS} FROM contests c WHERE c.id = ?"
        ))
        .bind(contest.0)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(GatewayError::contest_not_found(contest.0))?
            .try_into()
    }

    async fn list_contests(&self, filter: ContestFilter) -> Result<Vec<Contest>> {
        let clause = match filter {
            ContestFilter::Open => {
                "WHERE c.phase IN ('entry', 'voting') ORDER BY c.entry_deadline ASC, c.id ASC"
            }
            ContestFilter::Past => {
                "WHERE c.phase = 'complete' ORDER BY c.entry_deadline DESC, c.id DESC"
            }
        };
        let rows = sqlx::query_as::<_, ContestRow>(&format!(
            "SELECT {CONTEST_COLUMNS} FROM contests c {clause}"
        ))
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Contest::try_from).collect()
    }

    async fn submissions(&self, contest: ContestId) -> Result<Vec<Submission>> {
        // Surfaces NotFound for unknown contests instead of an empty list
        self.contest_phase(contest).await?;

        let rows = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions \
             WHERE contest_id = ? ORDER BY votes DESC, id ASC"
        ))
        .bind(contest.0)
        .fetch_all(&self.pool)
        .await?;
        rows.into_iter().map(Submission::try_from).collect()
    }

    async fn create_contest(&self, draft: &ContestDraft) -> Result<ContestId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO contests (title, rules, entry_deadline, voting_deadline, phase, \
             host_id, password, max_votes) VALUES (?, ?, ?, ?, ?, ?, ?, ?) RETURNING id",
        )
        .bind(&draft.title)
        .bind(&draft.rules)
        .bind(draft.deadlines.entry)
        .bind(draft.deadlines.voting)
        .bind(Phase::Entry.as_str())
        .bind(draft.host.0)
        .bind(draft.password.as_deref())
        .bind(i64::from(draft.max_votes))
        .fetch_one(&self.pool)
        .await
        .map_err(|e| self.write_error(e))?;
        debug!(contest = id, "contest row inserted");
        Ok(ContestId(id))
    }

    async fn create_submission(&self, submission: &NewSubmission) -> Result<SubmissionId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO submissions (contest_id, user_id, url) VALUES (?, ?, ?) \
             ON CONFLICT (contest_id, user_id) DO UPDATE SET url = excluded.url \
             RETURNING id",
        )
        .bind(submission.contest.0)
        .bind(submission.owner.0)
        .bind(&submission.url)
        .fetch_one(&self.pool)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                GatewayError::contest_not_found(submission.contest.0)
            } else {
                self.write_error(err)
            }
        })?;
        Ok(SubmissionId(id))
    }

    async fn submission(&self, submission: SubmissionId) -> Result<Submission> {
        let row = sqlx::query_as::<_, SubmissionRow>(&format!(
            "SELECT {SUBMISSION_COLUMNS} FROM submissions WHERE id = ?"
        ))
        .bind(submission.0)
        .fetch_optional(&self.pool)
        .await?;
        row.ok_or(GatewayError::submission_not_found(submission.0))?
            .try_into()
    }

    async fn delete_submission(&self, submission: SubmissionId) -> Result<u32> {
        let mut tx = self.begin_write().await?;

        // Counted under the writer lock
        let votes = sqlx::query("DELETE FROM votes WHERE submission_id = ?")
            .bind(submission.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.write_error(e))?
            .rows_affected();
        let deleted = sqlx::query("DELETE FROM submissions WHERE id = ?")
            .bind(submission.0)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            tx.rollback().await?;
            return Err(GatewayError::submission_not_found(submission.0));
        }
        tx.commit().await?;

        debug!(submission = submission.0, votes, "submission deleted");
        u32::try_from(votes).map_err(|_| GatewayError::Corrupt(format!("vote count {votes}")))
    }

    async fn set_qualified(&self, submission: SubmissionId, qualified: bool) -> Result<()> {
        let result = sqlx::query(
            "UPDATE submissions SET qualified = ?, \
             placement = CASE WHEN ? THEN placement ELSE NULL END WHERE id = ?",
        )
        .bind(qualified)
        .bind(qualified)
        .bind(submission.0)
        .execute(&self.pool)
        .await
        .map_err(|e| self.write_error(e))?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::submission_not_found(submission.0));
        }
        Ok(())
    }

    async fn set_placements(
        &self,
        contest: ContestId,
        placements: &[(SubmissionId, Option<u32>)],
    ) -> Result<()> {
        let mut tx = self.begin_write().await?;
        for (id, placement) in placements {
            let result = sqlx::query(
                "UPDATE submissions SET placement = ? WHERE id = ? AND contest_id = ?",
            )
            .bind(placement.map(i64::from))
            .bind(id.0)
            .bind(contest.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.write_error(e))?;
            if result.rows_affected() == 0 {
                tx.rollback().await?;
                return Err(GatewayError::submission_not_found(id.0));
            }
        }
        tx.commit().await?;
        Ok(())
    }

    async fn toggle_like(&self, user: UserId, submission: SubmissionId) -> Result<bool> {
        let mut tx = self.begin_write().await?;
        let removed = sqlx::query("DELETE FROM likes WHERE user_id = ? AND submission_id = ?")
            .bind(user.0)
            .bind(submission.0)
            .execute(&mut *tx)
            .await
            .map_err(|e| self.write_error(e))?
            .rows_affected();
        if removed == 0 {
            sqlx::query("INSERT INTO likes (user_id, submission_id) VALUES (?, ?)")
                .bind(user.0)
                .bind(submission.0)
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    if is_foreign_key_violation(&err) {
                        GatewayError::submission_not_found(submission.0)
                    } else {
                        err.into()
                    }
                })?;
        }
        tx.commit().await?;
        Ok(removed == 0)
    }

    async fn like_count(&self, submission: SubmissionId) -> Result<u32> {
        let row: Option<(i64,)> = sqlx::query_as(
            "SELECT (SELECT COUNT(*) FROM likes l WHERE l.submission_id = s.id) \
             FROM submissions s WHERE s.id = ?",
        )
        .bind(submission.0)
        .fetch_optional(&self.pool)
        .await?;
        let (count,) = row.ok_or(GatewayError::submission_not_found(submission.0))?;
        to_u32("like count", count)
    }

    async fn upsert_feedback(
        &self,
        author: UserId,
        submission: SubmissionId,
        text: &str,
    ) -> Result<bool> {
        let mut tx = self.begin_write().await?;
        let updated =
            sqlx::query("UPDATE feedback SET body = ? WHERE user_id = ? AND submission_id = ?")
                .bind(text)
                .bind(author.0)
                .bind(submission.0)
                .execute(&mut *tx)
                .await
                .map_err(|e| self.write_error(e))?
                .rows_affected();
        if updated == 0 {
            sqlx::query("INSERT INTO feedback (user_id, submission_id, body) VALUES (?, ?, ?)")
                .bind(author.0)
                .bind(submission.0)
                .bind(text)
                .execute(&mut *tx)
                .await
                .map_err(|err| {
                    if is_foreign_key_violation(&err) {
                        GatewayError::submission_not_found(submission.0)
                    } else {
                        err.into()
                    }
                })?;
        }
        tx.commit().await?;
        Ok(updated == 0)
    }

    async fn feedback(&self, submission: SubmissionId) -> Result<Vec<Feedback>> {
        // NotFound for unknown submissions
        self.submission(submission).await?;

        let rows: Vec<(i64, String)> = sqlx::query_as(
            "SELECT user_id, body FROM feedback WHERE submission_id = ? ORDER BY user_id",
        )
        .bind(submission.0)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows
            .into_iter()
            .map(|(author, text)| Feedback {
                author: UserId(author),
                submission,
                text,
            })
            .collect())
    }
}

// ============================================================================
// Transaction
// ============================================================================

struct SqliteTransaction {
    tx: Transaction<'static, Sqlite>,
}

#[async_trait]
impl VoteTransaction for SqliteTransaction {
    async fn find_vote(
        &mut self,
        voter: UserId,
        submission: SubmissionId,
    ) -> Result<Option<VoteId>> {
        let id: Option<i64> =
            sqlx::query_scalar("SELECT id FROM votes WHERE user_id = ? AND submission_id = ?")
                .bind(voter.0)
                .bind(submission.0)
                .fetch_optional(&mut *self.tx)
                .await?;
        Ok(id.map(VoteId))
    }

    async fn count_votes(&mut self, voter: UserId, contest: ContestId) -> Result<u32> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM votes WHERE user_id = ? AND contest_id = ?")
                .bind(voter.0)
                .bind(contest.0)
                .fetch_one(&mut *self.tx)
                .await?;
        to_u32("vote count", count)
    }

    async fn insert_vote(
        &mut self,
        voter: UserId,
        submission: SubmissionId,
        contest: ContestId,
    ) -> Result<VoteId> {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO votes (user_id, submission_id, contest_id) VALUES (?, ?, ?) RETURNING id",
        )
        .bind(voter.0)
        .bind(submission.0)
        .bind(contest.0)
        .fetch_one(&mut *self.tx)
        .await
        .map_err(|err| {
            if is_foreign_key_violation(&err) {
                GatewayError::submission_not_found(submission.0)
            } else {
                err.into()
            }
        })?;
        Ok(VoteId(id))
    }

    async fn delete_vote(&mut self, vote: VoteId) -> Result<()> {
        let result = sqlx::query("DELETE FROM votes WHERE id = ?")
            .bind(vote.0)
            .execute(&mut *self.tx)
            .await?;
        if result.rows_affected() == 0 {
            return Err(GatewayError::NotFound {
                entity: "vote",
                id: vote.0,
            });
        }
        Ok(())
    }

    async fn adjust_tally(&mut self, submission: SubmissionId, delta: i64) -> Result<u32> {
        let votes: Option<i64> =
            sqlx::query_scalar("UPDATE submissions SET votes = votes + ? WHERE id = ? RETURNING votes")
                .bind(delta)
                .bind(submission.0)
                .fetch_optional(&mut *self.tx)
                .await
                .map_err(|err| {
                    if is_check_violation(&err) {
                        GatewayError::Corrupt(format!(
                            "tally of submission {submission} would go negative"
                        ))
                    } else {
                        err.into()
                    }
                })?;
        to_u32(
            "votes",
            votes.ok_or(GatewayError::submission_not_found(submission.0))?,
        )
    }

    async fn commit(self: Box<Self>) -> Result<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self: Box<Self>) -> Result<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}
