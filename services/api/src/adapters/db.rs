//! services/api/src/adapters/db.rs
//!
//! This module contains the database adapter, which is the concrete implementation
//! of the `DatabaseService` port from the `core` crate. It handles all interactions
//! with the PostgreSQL database using `sqlx`.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use peerteach_core::domain::{
    ActivityEntry, ActivityKind, Challenge, ChallengeStatus, FeedbackItem, FeedbackStatus, Level,
    Profile, Teachback, TeachbackStatus, UserCredentials,
};
use peerteach_core::ports::{DatabaseService, PortError, PortResult};
use sqlx::{FromRow, PgPool};
use uuid::Uuid;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `DatabaseService` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

/// Maps driver-level failures onto the port taxonomy. `RowNotFound` is
/// handled at each call site where the entity name is known.
fn map_db_err(e: sqlx::Error) -> PortError {
    match e {
        sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => PortError::Unavailable(e.to_string()),
        other => PortError::Unexpected(other.to_string()),
    }
}

//=========================================================================================
// "Impure" Database Record Structs
//=========================================================================================

#[derive(FromRow)]
struct UserRecord {
    user_id: Uuid,
    email: String,
    hashed_password: String,
}
impl UserRecord {
    fn to_domain(self) -> UserCredentials {
        UserCredentials {
            user_id: self.user_id,
            email: self.email,
            hashed_password: self.hashed_password,
        }
    }
}

#[derive(FromRow)]
struct ProfileRecord {
    user_id: Uuid,
    display_name: Option<String>,
    photo_url: Option<String>,
    xp: i64,
    streak: i32,
    badges: Vec<String>,
}
impl ProfileRecord {
    fn to_domain(self) -> Profile {
        Profile {
            user_id: self.user_id,
            display_name: self.display_name,
            photo_url: self.photo_url,
            xp: self.xp,
            streak: self.streak,
            badges: self.badges,
        }
    }
}

#[derive(FromRow)]
struct ChallengeRecord {
    id: Uuid,
    owner_id: Uuid,
    title: String,
    topic: String,
    level: String,
    prompt: String,
    notes: Option<String>,
    status: String,
    due_ts: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl ChallengeRecord {
    /// Documents are validated here, at the read boundary; an unknown
    /// level or status string is an error, not a value to pass along.
    fn to_domain(self) -> PortResult<Challenge> {
        let level = Level::parse(&self.level).ok_or_else(|| {
            PortError::Unexpected(format!("invalid challenge level '{}'", self.level))
        })?;
        let status = ChallengeStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("invalid challenge status '{}'", self.status))
        })?;
        Ok(Challenge {
            id: self.id,
            owner_id: self.owner_id,
            title: self.title,
            topic: self.topic,
            level,
            prompt: self.prompt,
            notes: self.notes,
            status,
            due_ts: self.due_ts,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct TeachbackRecord {
    id: Uuid,
    challenge_id: Option<Uuid>,
    requester_id: Uuid,
    assignee_id: Uuid,
    prompt: String,
    notes: Option<String>,
    status: String,
    due_ts: DateTime<Utc>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl TeachbackRecord {
    fn to_domain(self) -> PortResult<Teachback> {
        let status = TeachbackStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("invalid teach-back status '{}'", self.status))
        })?;
        Ok(Teachback {
            id: self.id,
            challenge_id: self.challenge_id,
            requester_id: self.requester_id,
            assignee_id: self.assignee_id,
            prompt: self.prompt,
            notes: self.notes,
            status,
            due_ts: self.due_ts,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct FeedbackRecord {
    id: Uuid,
    reviewer_id: Uuid,
    learner: String,
    title: String,
    points: i32,
    status: String,
    rating: Option<i32>,
    comment: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}
impl FeedbackRecord {
    fn to_domain(self) -> PortResult<FeedbackItem> {
        let status = FeedbackStatus::parse(&self.status).ok_or_else(|| {
            PortError::Unexpected(format!("invalid feedback status '{}'", self.status))
        })?;
        Ok(FeedbackItem {
            id: self.id,
            reviewer_id: self.reviewer_id,
            learner: self.learner,
            title: self.title,
            points: self.points,
            status,
            rating: self.rating,
            comment: self.comment,
            created_at: self.created_at,
            updated_at: self.updated_at,
        })
    }
}

#[derive(FromRow)]
struct ActivityRecord {
    id: Uuid,
    user_id: Uuid,
    text: String,
    kind: String,
    created_at: DateTime<Utc>,
}
impl ActivityRecord {
    fn to_domain(self) -> PortResult<ActivityEntry> {
        let kind = ActivityKind::parse(&self.kind)
            .ok_or_else(|| PortError::Unexpected(format!("invalid activity kind '{}'", self.kind)))?;
        Ok(ActivityEntry {
            id: self.id,
            user_id: self.user_id,
            text: self.text,
            kind,
            created_at: self.created_at,
        })
    }
}

//=========================================================================================
// `DatabaseService` Trait Implementation
//=========================================================================================

#[async_trait]
impl DatabaseService for DbAdapter {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "INSERT INTO users (user_id, email, hashed_password) VALUES ($1, $2, $3) \
             RETURNING user_id, email, hashed_password",
        )
        .bind(Uuid::new_v4())
        .bind(email)
        .bind(hashed_password)
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(record.to_domain())
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let record = sqlx::query_as::<_, UserRecord>(
            "SELECT user_id, email, hashed_password FROM users WHERE email = $1",
        )
        .bind(email)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("User {} not found", email)),
            other => map_db_err(other),
        })?;
        Ok(record.to_domain())
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        sqlx::query("INSERT INTO auth_sessions (id, user_id, expires_at) VALUES ($1, $2, $3)")
            .bind(session_id)
            .bind(user_id)
            .bind(expires_at)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let row: Option<(Uuid,)> =
            sqlx::query_as("SELECT user_id FROM auth_sessions WHERE id = $1 AND expires_at > now()")
                .bind(session_id)
                .fetch_optional(&self.pool)
                .await
                .map_err(map_db_err)?;
        row.map(|(user_id,)| user_id).ok_or(PortError::Unauthorized)
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM auth_sessions WHERE id = $1")
            .bind(session_id)
            .execute(&self.pool)
            .await
            .map_err(map_db_err)?;
        Ok(())
    }

    async fn upsert_profile(&self, profile: Profile) -> PortResult<()> {
        sqlx::query(
            "INSERT INTO profiles (user_id, display_name, photo_url, xp, streak, badges) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT (user_id) DO UPDATE SET \
                 display_name = EXCLUDED.display_name, \
                 photo_url = EXCLUDED.photo_url, \
                 xp = EXCLUDED.xp, \
                 streak = EXCLUDED.streak, \
                 badges = EXCLUDED.badges",
        )
        .bind(profile.user_id)
        .bind(profile.display_name)
        .bind(profile.photo_url)
        .bind(profile.xp)
        .bind(profile.streak)
        .bind(profile.badges)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        let record = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, display_name, photo_url, xp, streak, badges \
             FROM profiles WHERE user_id = $1",
        )
        .bind(user_id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Profile {} not found", user_id))
            }
            other => map_db_err(other),
        })?;
        Ok(record.to_domain())
    }

    async fn list_candidate_profiles(&self, exclude: Uuid, limit: u32) -> PortResult<Vec<Profile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, display_name, photo_url, xp, streak, badges \
             FROM profiles WHERE user_id <> $1 ORDER BY user_id LIMIT $2",
        )
        .bind(exclude)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn top_profiles_by_xp(&self, limit: u32) -> PortResult<Vec<Profile>> {
        let records = sqlx::query_as::<_, ProfileRecord>(
            "SELECT user_id, display_name, photo_url, xp, streak, badges \
             FROM profiles ORDER BY xp DESC, user_id LIMIT $1",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        Ok(records.into_iter().map(|r| r.to_domain()).collect())
    }

    async fn create_challenge_with_teachback(
        &self,
        challenge: Challenge,
        teachback: Option<Teachback>,
    ) -> PortResult<()> {
        // One transaction for the pair; a failure on either insert leaves
        // neither record behind.
        let mut tx = self.pool.begin().await.map_err(map_db_err)?;

        sqlx::query(
            "INSERT INTO challenges \
                 (id, owner_id, title, topic, level, prompt, notes, status, due_ts, created_at, updated_at) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
        )
        .bind(challenge.id)
        .bind(challenge.owner_id)
        .bind(&challenge.title)
        .bind(&challenge.topic)
        .bind(challenge.level.as_str())
        .bind(&challenge.prompt)
        .bind(&challenge.notes)
        .bind(challenge.status.as_str())
        .bind(challenge.due_ts)
        .bind(challenge.created_at)
        .bind(challenge.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(map_db_err)?;

        if let Some(tb) = teachback {
            sqlx::query(
                "INSERT INTO teachbacks \
                     (id, challenge_id, requester_id, assignee_id, prompt, notes, status, due_ts, created_at, updated_at) \
                 VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            )
            .bind(tb.id)
            .bind(tb.challenge_id)
            .bind(tb.requester_id)
            .bind(tb.assignee_id)
            .bind(&tb.prompt)
            .bind(&tb.notes)
            .bind(tb.status.as_str())
            .bind(tb.due_ts)
            .bind(tb.created_at)
            .bind(tb.updated_at)
            .execute(&mut *tx)
            .await
            .map_err(map_db_err)?;
        }

        tx.commit().await.map_err(map_db_err)?;
        Ok(())
    }

    async fn get_challenge(&self, id: Uuid) -> PortResult<Challenge> {
        let record = sqlx::query_as::<_, ChallengeRecord>(
            "SELECT id, owner_id, title, topic, level, prompt, notes, status, due_ts, created_at, updated_at \
             FROM challenges WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Challenge {} not found", id)),
            other => map_db_err(other),
        })?;
        record.to_domain()
    }

    async fn update_challenge(
        &self,
        id: Uuid,
        status: ChallengeStatus,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE challenges SET status = $1, notes = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Challenge {} not found", id)));
        }
        Ok(())
    }

    async fn list_challenges_by_owner(
        &self,
        owner_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<Challenge>> {
        let records = sqlx::query_as::<_, ChallengeRecord>(
            "SELECT id, owner_id, title, topic, level, prompt, notes, status, due_ts, created_at, updated_at \
             FROM challenges WHERE owner_id = $1 ORDER BY due_ts ASC LIMIT $2",
        )
        .bind(owner_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_teachback(&self, id: Uuid) -> PortResult<Teachback> {
        let record = sqlx::query_as::<_, TeachbackRecord>(
            "SELECT id, challenge_id, requester_id, assignee_id, prompt, notes, status, due_ts, created_at, updated_at \
             FROM teachbacks WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => PortError::NotFound(format!("Teach-back {} not found", id)),
            other => map_db_err(other),
        })?;
        record.to_domain()
    }

    async fn update_teachback(
        &self,
        id: Uuid,
        status: TeachbackStatus,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE teachbacks SET status = $1, notes = $2, updated_at = $3 WHERE id = $4",
        )
        .bind(status.as_str())
        .bind(notes)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Teach-back {} not found", id)));
        }
        Ok(())
    }

    async fn list_teachbacks_by_assignee(
        &self,
        assignee_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<Teachback>> {
        let records = sqlx::query_as::<_, TeachbackRecord>(
            "SELECT id, challenge_id, requester_id, assignee_id, prompt, notes, status, due_ts, created_at, updated_at \
             FROM teachbacks WHERE assignee_id = $1 ORDER BY due_ts ASC LIMIT $2",
        )
        .bind(assignee_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn get_feedback_item(&self, id: Uuid) -> PortResult<FeedbackItem> {
        let record = sqlx::query_as::<_, FeedbackRecord>(
            "SELECT id, reviewer_id, learner, title, points, status, rating, comment, created_at, updated_at \
             FROM feedback_queue WHERE id = $1",
        )
        .bind(id)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| match e {
            sqlx::Error::RowNotFound => {
                PortError::NotFound(format!("Feedback item {} not found", id))
            }
            other => map_db_err(other),
        })?;
        record.to_domain()
    }

    async fn complete_feedback_item(
        &self,
        id: Uuid,
        rating: i32,
        comment: &str,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let result = sqlx::query(
            "UPDATE feedback_queue SET status = 'completed', rating = $1, comment = $2, updated_at = $3 \
             WHERE id = $4",
        )
        .bind(rating)
        .bind(comment)
        .bind(updated_at)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(map_db_err)?;
        if result.rows_affected() == 0 {
            return Err(PortError::NotFound(format!("Feedback item {} not found", id)));
        }
        Ok(())
    }

    async fn list_feedback_for_reviewer(
        &self,
        reviewer_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<FeedbackItem>> {
        let records = sqlx::query_as::<_, FeedbackRecord>(
            "SELECT id, reviewer_id, learner, title, points, status, rating, comment, created_at, updated_at \
             FROM feedback_queue WHERE reviewer_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(reviewer_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }

    async fn append_activity(
        &self,
        user_id: Uuid,
        text: &str,
        kind: ActivityKind,
    ) -> PortResult<ActivityEntry> {
        // created_at is assigned by the database.
        let record = sqlx::query_as::<_, ActivityRecord>(
            "INSERT INTO activity (id, user_id, text, kind) VALUES ($1, $2, $3, $4) \
             RETURNING id, user_id, text, kind, created_at",
        )
        .bind(Uuid::new_v4())
        .bind(user_id)
        .bind(text)
        .bind(kind.as_str())
        .fetch_one(&self.pool)
        .await
        .map_err(map_db_err)?;
        record.to_domain()
    }

    async fn list_activity_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<ActivityEntry>> {
        let records = sqlx::query_as::<_, ActivityRecord>(
            "SELECT id, user_id, text, kind, created_at \
             FROM activity WHERE user_id = $1 ORDER BY created_at DESC LIMIT $2",
        )
        .bind(user_id)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(map_db_err)?;
        records.into_iter().map(|r| r.to_domain()).collect()
    }
}
