//! crates/peerteach_core/src/memory.rs
//!
//! In-memory implementation of `DatabaseService`.
//!
//! Backs the workflow tests and local experimentation: all state is held in
//! `HashMap`s behind `RwLock`s and lost on drop. The combined
//! challenge/teach-back write takes both write locks before touching either
//! map, so the pair is applied as a unit just like the SQL adapter's
//! transaction.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::domain::{
    ActivityEntry, ActivityKind, AuthSession, Challenge, ChallengeStatus, FeedbackItem, Profile,
    Teachback, TeachbackStatus, UserCredentials,
};
use crate::ports::{DatabaseService, PortError, PortResult};

/// In-memory document store.
pub struct InMemoryStore {
    users: RwLock<HashMap<String, UserCredentials>>,
    auth_sessions: RwLock<HashMap<String, AuthSession>>,
    profiles: RwLock<HashMap<Uuid, Profile>>,
    challenges: RwLock<HashMap<Uuid, Challenge>>,
    teachbacks: RwLock<HashMap<Uuid, Teachback>>,
    feedback: RwLock<HashMap<Uuid, FeedbackItem>>,
    activity: RwLock<Vec<ActivityEntry>>,
    /// Fault-injection knob: when set, `append_activity` fails. Lets tests
    /// prove that primary transitions survive a dead activity feed.
    activity_unavailable: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self {
            users: RwLock::new(HashMap::new()),
            auth_sessions: RwLock::new(HashMap::new()),
            profiles: RwLock::new(HashMap::new()),
            challenges: RwLock::new(HashMap::new()),
            teachbacks: RwLock::new(HashMap::new()),
            feedback: RwLock::new(HashMap::new()),
            activity: RwLock::new(Vec::new()),
            activity_unavailable: AtomicBool::new(false),
        }
    }

    pub fn fail_activity_appends(&self, fail: bool) {
        self.activity_unavailable.store(fail, Ordering::SeqCst);
    }

    /// Seeds a teach-back directly, bypassing challenge creation.
    pub async fn insert_teachback(&self, teachback: Teachback) {
        self.teachbacks
            .write()
            .await
            .insert(teachback.id, teachback);
    }

    /// Seeds a feedback-queue item. The workflow only ever reads and
    /// completes these; creating them is an upstream concern.
    pub async fn insert_feedback_item(&self, item: FeedbackItem) {
        self.feedback.write().await.insert(item.id, item);
    }
}

impl Default for InMemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DatabaseService for InMemoryStore {
    async fn create_user_with_email(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> PortResult<UserCredentials> {
        let mut users = self.users.write().await;
        if users.contains_key(email) {
            return Err(PortError::Unexpected(format!(
                "email {email} is already registered"
            )));
        }
        let creds = UserCredentials {
            user_id: Uuid::new_v4(),
            email: email.to_string(),
            hashed_password: hashed_password.to_string(),
        };
        users.insert(email.to_string(), creds.clone());
        Ok(creds)
    }

    async fn get_user_by_email(&self, email: &str) -> PortResult<UserCredentials> {
        let users = self.users.read().await;
        users
            .get(email)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("User {email} not found")))
    }

    async fn create_auth_session(
        &self,
        session_id: &str,
        user_id: Uuid,
        expires_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut sessions = self.auth_sessions.write().await;
        sessions.insert(
            session_id.to_string(),
            AuthSession {
                id: session_id.to_string(),
                user_id,
                expires_at,
            },
        );
        Ok(())
    }

    async fn validate_auth_session(&self, session_id: &str) -> PortResult<Uuid> {
        let sessions = self.auth_sessions.read().await;
        match sessions.get(session_id) {
            Some(session) if session.expires_at > Utc::now() => Ok(session.user_id),
            _ => Err(PortError::Unauthorized),
        }
    }

    async fn delete_auth_session(&self, session_id: &str) -> PortResult<()> {
        let mut sessions = self.auth_sessions.write().await;
        sessions.remove(session_id);
        Ok(())
    }

    async fn upsert_profile(&self, profile: Profile) -> PortResult<()> {
        let mut profiles = self.profiles.write().await;
        profiles.insert(profile.user_id, profile);
        Ok(())
    }

    async fn get_profile(&self, user_id: Uuid) -> PortResult<Profile> {
        let profiles = self.profiles.read().await;
        profiles
            .get(&user_id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Profile {user_id} not found")))
    }

    async fn list_candidate_profiles(&self, exclude: Uuid, limit: u32) -> PortResult<Vec<Profile>> {
        let profiles = self.profiles.read().await;
        let mut candidates: Vec<Profile> = profiles
            .values()
            .filter(|p| p.user_id != exclude)
            .cloned()
            .collect();
        // Stable page order, mirroring a keyed scan.
        candidates.sort_by_key(|p| p.user_id);
        candidates.truncate(limit as usize);
        Ok(candidates)
    }

    async fn top_profiles_by_xp(&self, limit: u32) -> PortResult<Vec<Profile>> {
        let profiles = self.profiles.read().await;
        let mut rows: Vec<Profile> = profiles.values().cloned().collect();
        rows.sort_by(|a, b| b.xp.cmp(&a.xp).then(a.user_id.cmp(&b.user_id)));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn create_challenge_with_teachback(
        &self,
        challenge: Challenge,
        teachback: Option<Teachback>,
    ) -> PortResult<()> {
        if let Some(tb) = &teachback {
            if tb.assignee_id == tb.requester_id {
                return Err(PortError::Unexpected(
                    "teach-back assignee must differ from requester".to_string(),
                ));
            }
        }
        // Both write locks are held across both inserts; the pair lands
        // atomically or not at all.
        let mut challenges = self.challenges.write().await;
        let mut teachbacks = self.teachbacks.write().await;
        challenges.insert(challenge.id, challenge);
        if let Some(tb) = teachback {
            teachbacks.insert(tb.id, tb);
        }
        Ok(())
    }

    async fn get_challenge(&self, id: Uuid) -> PortResult<Challenge> {
        let challenges = self.challenges.read().await;
        challenges
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Challenge {id} not found")))
    }

    async fn update_challenge(
        &self,
        id: Uuid,
        status: ChallengeStatus,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut challenges = self.challenges.write().await;
        let challenge = challenges
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Challenge {id} not found")))?;
        challenge.status = status;
        challenge.notes = notes;
        challenge.updated_at = updated_at;
        Ok(())
    }

    async fn list_challenges_by_owner(
        &self,
        owner_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<Challenge>> {
        let challenges = self.challenges.read().await;
        let mut rows: Vec<Challenge> = challenges
            .values()
            .filter(|c| c.owner_id == owner_id)
            .cloned()
            .collect();
        rows.sort_by_key(|c| c.due_ts);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn get_teachback(&self, id: Uuid) -> PortResult<Teachback> {
        let teachbacks = self.teachbacks.read().await;
        teachbacks
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Teach-back {id} not found")))
    }

    async fn update_teachback(
        &self,
        id: Uuid,
        status: TeachbackStatus,
        notes: Option<String>,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut teachbacks = self.teachbacks.write().await;
        let teachback = teachbacks
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Teach-back {id} not found")))?;
        teachback.status = status;
        teachback.notes = notes;
        teachback.updated_at = updated_at;
        Ok(())
    }

    async fn list_teachbacks_by_assignee(
        &self,
        assignee_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<Teachback>> {
        let teachbacks = self.teachbacks.read().await;
        let mut rows: Vec<Teachback> = teachbacks
            .values()
            .filter(|t| t.assignee_id == assignee_id)
            .cloned()
            .collect();
        rows.sort_by_key(|t| t.due_ts);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn get_feedback_item(&self, id: Uuid) -> PortResult<FeedbackItem> {
        let feedback = self.feedback.read().await;
        feedback
            .get(&id)
            .cloned()
            .ok_or_else(|| PortError::NotFound(format!("Feedback item {id} not found")))
    }

    async fn complete_feedback_item(
        &self,
        id: Uuid,
        rating: i32,
        comment: &str,
        updated_at: DateTime<Utc>,
    ) -> PortResult<()> {
        let mut feedback = self.feedback.write().await;
        let item = feedback
            .get_mut(&id)
            .ok_or_else(|| PortError::NotFound(format!("Feedback item {id} not found")))?;
        item.status = crate::domain::FeedbackStatus::Completed;
        item.rating = Some(rating);
        item.comment = Some(comment.to_string());
        item.updated_at = updated_at;
        Ok(())
    }

    async fn list_feedback_for_reviewer(
        &self,
        reviewer_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<FeedbackItem>> {
        let feedback = self.feedback.read().await;
        let mut rows: Vec<FeedbackItem> = feedback
            .values()
            .filter(|f| f.reviewer_id == reviewer_id)
            .cloned()
            .collect();
        rows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn append_activity(
        &self,
        user_id: Uuid,
        text: &str,
        kind: ActivityKind,
    ) -> PortResult<ActivityEntry> {
        if self.activity_unavailable.load(Ordering::SeqCst) {
            return Err(PortError::Unavailable("activity feed is down".to_string()));
        }
        let entry = ActivityEntry {
            id: Uuid::new_v4(),
            user_id,
            text: text.to_string(),
            kind,
            created_at: Utc::now(),
        };
        let mut activity = self.activity.write().await;
        activity.push(entry.clone());
        Ok(entry)
    }

    async fn list_activity_for_user(
        &self,
        user_id: Uuid,
        limit: u32,
    ) -> PortResult<Vec<ActivityEntry>> {
        let activity = self.activity.read().await;
        // The backing vec is in append order; reverse iteration is
        // newest-first even when two appends share a timestamp.
        let rows: Vec<ActivityEntry> = activity
            .iter()
            .rev()
            .filter(|a| a.user_id == user_id)
            .take(limit as usize)
            .cloned()
            .collect();
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Level;
    use chrono::Duration;

    fn challenge(owner_id: Uuid, due_in_days: i64) -> Challenge {
        let now = Utc::now();
        Challenge {
            id: Uuid::new_v4(),
            owner_id,
            title: "Explain Recursion".to_string(),
            topic: "Algorithms".to_string(),
            level: Level::Beginner,
            prompt: String::new(),
            notes: None,
            status: ChallengeStatus::Open,
            due_ts: now + Duration::days(due_in_days),
            created_at: now,
            updated_at: now,
        }
    }

    fn teachback_for(challenge: &Challenge, assignee_id: Uuid) -> Teachback {
        Teachback {
            id: Uuid::new_v4(),
            challenge_id: Some(challenge.id),
            requester_id: challenge.owner_id,
            assignee_id,
            prompt: "Teach back \"Explain Recursion\" (Algorithms)".to_string(),
            notes: None,
            status: TeachbackStatus::Pending,
            due_ts: challenge.due_ts,
            created_at: challenge.created_at,
            updated_at: challenge.updated_at,
        }
    }

    fn profile(user_id: Uuid, xp: i64) -> Profile {
        Profile {
            user_id,
            display_name: None,
            photo_url: None,
            xp,
            streak: 0,
            badges: vec![],
        }
    }

    #[tokio::test]
    async fn get_returns_not_found_for_missing_challenge() {
        let store = InMemoryStore::new();
        let err = store.get_challenge(Uuid::new_v4()).await.unwrap_err();
        assert!(matches!(err, PortError::NotFound(_)));
    }

    #[tokio::test]
    async fn combined_write_persists_both_records() {
        let store = InMemoryStore::new();
        let c = challenge(Uuid::new_v4(), 3);
        let tb = teachback_for(&c, Uuid::new_v4());

        store
            .create_challenge_with_teachback(c.clone(), Some(tb.clone()))
            .await
            .unwrap();

        assert_eq!(store.get_challenge(c.id).await.unwrap().id, c.id);
        assert_eq!(store.get_teachback(tb.id).await.unwrap().id, tb.id);
    }

    #[tokio::test]
    async fn combined_write_rejects_self_assignment_atomically() {
        let store = InMemoryStore::new();
        let c = challenge(Uuid::new_v4(), 3);
        let bad = teachback_for(&c, c.owner_id);

        let err = store
            .create_challenge_with_teachback(c.clone(), Some(bad.clone()))
            .await
            .unwrap_err();
        assert!(matches!(err, PortError::Unexpected(_)));

        // Neither record was written.
        assert!(matches!(
            store.get_challenge(c.id).await.unwrap_err(),
            PortError::NotFound(_)
        ));
        assert!(matches!(
            store.get_teachback(bad.id).await.unwrap_err(),
            PortError::NotFound(_)
        ));
    }

    #[tokio::test]
    async fn candidate_listing_excludes_the_given_user_and_respects_limit() {
        let store = InMemoryStore::new();
        let me = Uuid::new_v4();
        store.upsert_profile(profile(me, 0)).await.unwrap();
        for _ in 0..30 {
            store
                .upsert_profile(profile(Uuid::new_v4(), 0))
                .await
                .unwrap();
        }

        let candidates = store.list_candidate_profiles(me, 25).await.unwrap();
        assert_eq!(candidates.len(), 25);
        assert!(candidates.iter().all(|p| p.user_id != me));
    }

    #[tokio::test]
    async fn leaderboard_orders_by_xp_descending() {
        let store = InMemoryStore::new();
        for xp in [50, 900, 300] {
            store
                .upsert_profile(profile(Uuid::new_v4(), xp))
                .await
                .unwrap();
        }

        let top = store.top_profiles_by_xp(2).await.unwrap();
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].xp, 900);
        assert_eq!(top[1].xp, 300);
    }

    #[tokio::test]
    async fn activity_feed_is_per_user_and_newest_first() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        let other = Uuid::new_v4();
        store
            .append_activity(user, "first", ActivityKind::Info)
            .await
            .unwrap();
        store
            .append_activity(other, "noise", ActivityKind::Info)
            .await
            .unwrap();
        store
            .append_activity(user, "second", ActivityKind::Challenge)
            .await
            .unwrap();

        let feed = store.list_activity_for_user(user, 10).await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].text, "second");
        assert_eq!(feed[1].text, "first");
    }

    #[tokio::test]
    async fn expired_auth_session_is_rejected() {
        let store = InMemoryStore::new();
        let user = Uuid::new_v4();
        store
            .create_auth_session("fresh", user, Utc::now() + Duration::days(1))
            .await
            .unwrap();
        store
            .create_auth_session("stale", user, Utc::now() - Duration::minutes(1))
            .await
            .unwrap();

        assert_eq!(store.validate_auth_session("fresh").await.unwrap(), user);
        assert!(matches!(
            store.validate_auth_session("stale").await.unwrap_err(),
            PortError::Unauthorized
        ));
        assert!(matches!(
            store.validate_auth_session("missing").await.unwrap_err(),
            PortError::Unauthorized
        ));
    }
}
