//! crates/peerteach_core/src/ports.rs
//!
//! Defines the service contracts (traits) for the application's core logic.
//! These traits form the boundary of the hexagonal architecture, allowing the core
//! to be independent of specific external implementations like databases or APIs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::domain::{
    ActivityEntry, ActivityKind, Challenge, ChallengeStatus, FeedbackItem, Profile, Teachback,
    TeachbackStatus, UserCredentials,
};

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from external services (e.g., database, network).
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Item not found: {0}")]
    NotFound(String),
    #[error("Service is temporarily unavailable: {0}")]
    Unavailable(String),
    #[error("Unauthorized")]
    Unauthorized,
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Service Port (Trait)
//=========================================================================================

/// The document-store contract the workflow runs against.
///
/// Listing operations take an explicit `limit` because every caller reads a
/// bounded page: dashboards show the first handful of rows, and the
/// teach-back candidate pool is a fixed-size page of profiles.
#[async_trait]
pub trait DatabaseService: Send + Sync {
    // --- Auth Methods ---
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserCredentials>;

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials>;

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()>;

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid>;

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()>;

    // --- Profiles ---
    async fn upsert_profile(&self, profile: Profile) -> PortResult<()>;

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile>;

    /// A bounded page of profiles excluding `exclude`, the candidate pool
    /// for teach-back assignment.
    async fn list_candidate_profiles(&self, exclude: Uuid, limit: u32) -> PortResult<Vec<Profile>>;

    /// Global leaderboard: top profiles ordered by XP descending.
    async fn top_profiles_by_xp(&self, limit: u32) -> PortResult<Vec<Profile>>;

    // --- Challenges & Teachbacks ---

    /// Persists a challenge and, when present, its linked teach-back as a
    /// single unit: either both records exist afterwards or neither does.
    async fn create_challenge_with_teachback(
        &self,
        challenge: Challenge,
        teachback: Option<Teachback>,
    ) -> PortResult<()>;

    async fn get_challenge(&self, id: Uuid) -> PortResult<Challenge>;

    async fn update_challenge(
        &self,
        id: Uuid,
        status: ChallengeStatus,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Challenges owned by `owner_id`, ordered by due timestamp ascending.
    async fn list_challenges_by_owner(&self, owner_id: Uuid, limit: u32)
        -> PortResult<Vec<Challenge>>;

    async fn get_teachback(&self, id: Uuid) -> PortResult<Teachback>;

    async fn update_teachback(
        &self,
        id: Uuid,
        status: TeachbackStatus,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Teach-backs assigned to `assignee_id`, ordered by due timestamp ascending.
    async fn list_teachbacks_by_assignee(
        &self,
        assignee_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<Teachback>>;

    // --- Feedback Queue ---
    async fn get_feedback_item(&self, id: Uuid) -> PortResult<FeedbackItem>;

    async fn complete_feedback_item(
        &self,
        id: Uuid,
        rating: i32,
        comment: &str,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()>;

    /// Feedback items assigned to `reviewer_id`, newest first.
    async fn list_feedback_for_reviewer(
        &self,
        reviewer_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<FeedbackItem>>;

    // --- Activity Feed ---

    /// Appends one entry to `user_id`'s feed. The creation timestamp is
    /// assigned by the store and returned in the entry.
    async fn append_activity(
        &self,
        user_id: Uuid,
        text: &str,
        kind: ActivityKind,
    ) -> PortResult<ActivityEntry>;

    /// `user_id`'s feed, newest first.
    async fn list_activity_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<ActivityEntry>>;
}
