//! crates/peerteach_core/src/workflow.rs
//!
//! The challenge/teach-back/feedback workflow, written against the
//! `DatabaseService` port. Each component performs one primary store write
//! per user action; the activity-feed append that follows is best-effort
//! and never fails the action that triggered it.

use std::sync::Arc;

use chrono::{Duration, Utc};
use rand::seq::SliceRandom;
use tracing::warn;
use uuid::Uuid;

use crate::domain::{
    ActivityKind, Challenge, ChallengeStatus, FeedbackItem, FeedbackStatus, Level, Teachback,
    TeachbackStatus,
};
use crate::ports::{DatabaseService, PortError};

/// The authenticated caller, passed explicitly to every operation that acts
/// on their behalf. There is no ambient global user.
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub user_id: Uuid,
    pub display_name: Option<String>,
}

impl CurrentUser {
    pub fn new(user_id: Uuid) -> Self {
        Self {
            user_id,
            display_name: None,
        }
    }
}

/// Errors surfaced by workflow operations. Every variant renders as a short
/// human-readable message; no error codes reach the end user.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error("{0}")]
    Validation(String),
    #[error("Cannot move this {entity} from {from} to {to}")]
    InvalidTransition {
        entity: &'static str,
        from: &'static str,
        to: &'static str,
    },
    #[error("You don't have permission to modify this record")]
    Permission,
    #[error(transparent)]
    Store(#[from] PortError),
}

pub type WorkflowResult<T> = Result<T, WorkflowError>;

fn require(value: &str, field: &str) -> WorkflowResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(WorkflowError::Validation(format!("{field} is required")));
    }
    Ok(trimmed.to_string())
}

//=========================================================================================
// ActivityLog
//=========================================================================================

/// Append-only, fire-and-forget logging sink for per-user activity feeds.
///
/// `record` never returns an error: a failed append is logged at `warn` and
/// discarded, so the primary state transition that triggered it always
/// stands on its own.
#[derive(Clone)]
pub struct ActivityLog {
    store: Arc<dyn DatabaseService>,
}

impl ActivityLog {
    pub fn new(store: Arc<dyn DatabaseService>) -> Self {
        Self { store }
    }

    pub async fn record(&self, user_id: Uuid, text: &str, kind: ActivityKind) {
        if let Err(err) = self.store.append_activity(user_id, text, kind).await {
            warn!(%user_id, kind = kind.as_str(), error = %err, "activity append failed");
        }
    }
}

//=========================================================================================
// ChallengeCreator
//=========================================================================================

/// Input for creating a challenge.
#[derive(Debug, Clone)]
pub struct NewChallenge {
    pub title: String,
    pub topic: String,
    pub level: Level,
    pub due_in_days: i64,
    pub prompt: String,
}

/// Outcome of a creation: the persisted challenge and, when a candidate
/// assignee existed, the teach-back that was assigned alongside it.
#[derive(Debug, Clone)]
pub struct ChallengeCreated {
    pub challenge: Challenge,
    pub teachback: Option<Teachback>,
}

/// Builds a new challenge and attempts exactly one automatic teach-back
/// assignment to a randomly chosen other user.
#[derive(Clone)]
pub struct ChallengeCreator {
    store: Arc<dyn DatabaseService>,
    log: ActivityLog,
    candidate_pool_size: u32,
}

impl ChallengeCreator {
    pub fn new(store: Arc<dyn DatabaseService>, log: ActivityLog, candidate_pool_size: u32) -> Self {
        Self {
            store,
            log,
            candidate_pool_size,
        }
    }

    pub async fn create(
        &self,
        caller: &CurrentUser,
        input: NewChallenge,
    ) -> WorkflowResult<ChallengeCreated> {
        let title = require(&input.title, "Title")?;
        let topic = require(&input.topic, "Topic")?;
        if input.due_in_days < 1 {
            return Err(WorkflowError::Validation(
                "Due must be at least one day out".to_string(),
            ));
        }

        let now = Utc::now();
        let due_ts = now + Duration::days(input.due_in_days);
        let challenge = Challenge {
            id: Uuid::new_v4(),
            owner_id: caller.user_id,
            title: title.clone(),
            topic: topic.clone(),
            level: input.level,
            prompt: input.prompt.trim().to_string(),
            notes: None,
            status: ChallengeStatus::Open,
            due_ts,
            created_at: now,
            updated_at: now,
        };

        let candidates = self
            .store
            .list_candidate_profiles(caller.user_id, self.candidate_pool_size)
            .await?;
        let assignee = {
            let mut rng = rand::thread_rng();
            candidates.choose(&mut rng).cloned()
        };

        let teachback = assignee.map(|profile| Teachback {
            id: Uuid::new_v4(),
            challenge_id: Some(challenge.id),
            requester_id: caller.user_id,
            assignee_id: profile.user_id,
            prompt: format!("Teach back \"{title}\" ({topic})"),
            notes: None,
            status: TeachbackStatus::Pending,
            due_ts,
            created_at: now,
            updated_at: now,
        });

        // Challenge and teach-back are persisted as a unit; a partial pair
        // cannot exist.
        self.store
            .create_challenge_with_teachback(challenge.clone(), teachback.clone())
            .await?;

        match &teachback {
            Some(tb) => {
                self.log
                    .record(
                        caller.user_id,
                        &format!("Created \"{title}\" and assigned a teach-back to a peer"),
                        ActivityKind::Challenge,
                    )
                    .await;
                self.log
                    .record(
                        tb.assignee_id,
                        &format!("You were assigned a teach-back: {}", tb.prompt),
                        ActivityKind::Teachback,
                    )
                    .await;
            }
            None => {
                self.log
                    .record(
                        caller.user_id,
                        &format!("Created \"{title}\" (no peers available for a teach-back yet)"),
                        ActivityKind::Info,
                    )
                    .await;
            }
        }

        Ok(ChallengeCreated {
            challenge,
            teachback,
        })
    }
}

//=========================================================================================
// ChallengeLifecycle
//=========================================================================================

/// Moves a challenge through its status lifecycle on behalf of its owner.
#[derive(Clone)]
pub struct ChallengeLifecycle {
    store: Arc<dyn DatabaseService>,
    log: ActivityLog,
}

impl ChallengeLifecycle {
    pub fn new(store: Arc<dyn DatabaseService>, log: ActivityLog) -> Self {
        Self { store, log }
    }

    async fn load_owned(&self, caller: &CurrentUser, id: Uuid) -> WorkflowResult<Challenge> {
        let challenge = self.store.get_challenge(id).await?;
        if challenge.owner_id != caller.user_id {
            return Err(WorkflowError::Permission);
        }
        Ok(challenge)
    }

    fn check(from: ChallengeStatus, to: ChallengeStatus) -> WorkflowResult<()> {
        if !from.can_transition(to) {
            return Err(WorkflowError::InvalidTransition {
                entity: "challenge",
                from: from.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }

    /// "Start/Continue": open or accepted -> in_progress.
    pub async fn start(&self, caller: &CurrentUser, id: Uuid) -> WorkflowResult<Challenge> {
        let challenge = self.load_owned(caller, id).await?;
        Self::check(challenge.status, ChallengeStatus::InProgress)?;
        let now = Utc::now();
        self.store
            .update_challenge(id, ChallengeStatus::InProgress, challenge.notes.clone(), now)
            .await?;
        self.log
            .record(
                caller.user_id,
                &format!("Started \"{}\"", challenge.title),
                ActivityKind::Challenge,
            )
            .await;
        Ok(Challenge {
            status: ChallengeStatus::InProgress,
            updated_at: now,
            ..challenge
        })
    }

    /// The in-progress self-loop: persist working notes without advancing.
    /// Saving from open/accepted implicitly starts the work.
    pub async fn save_progress(
        &self,
        caller: &CurrentUser,
        id: Uuid,
        notes: &str,
    ) -> WorkflowResult<Challenge> {
        let challenge = self.load_owned(caller, id).await?;
        Self::check(challenge.status, ChallengeStatus::InProgress)?;
        let now = Utc::now();
        let notes = Some(notes.to_string());
        self.store
            .update_challenge(id, ChallengeStatus::InProgress, notes.clone(), now)
            .await?;
        self.log
            .record(
                caller.user_id,
                &format!("Saved progress on \"{}\"", challenge.title),
                ActivityKind::Challenge,
            )
            .await;
        Ok(Challenge {
            status: ChallengeStatus::InProgress,
            notes,
            updated_at: now,
            ..challenge
        })
    }

    /// "Mark complete": in_progress -> completed. Terminal.
    pub async fn complete(&self, caller: &CurrentUser, id: Uuid) -> WorkflowResult<Challenge> {
        let challenge = self.load_owned(caller, id).await?;
        Self::check(challenge.status, ChallengeStatus::Completed)?;
        let now = Utc::now();
        self.store
            .update_challenge(id, ChallengeStatus::Completed, challenge.notes.clone(), now)
            .await?;
        self.log
            .record(
                caller.user_id,
                &format!("Completed \"{}\"", challenge.title),
                ActivityKind::Challenge,
            )
            .await;
        Ok(Challenge {
            status: ChallengeStatus::Completed,
            updated_at: now,
            ..challenge
        })
    }
}

//=========================================================================================
// TeachbackLifecycle
//=========================================================================================

/// Moves an assigned teach-back through its lifecycle on behalf of the
/// assignee. Same shape as the challenge lifecycle, scoped to `assignee_id`.
#[derive(Clone)]
pub struct TeachbackLifecycle {
    store: Arc<dyn DatabaseService>,
    log: ActivityLog,
}

impl TeachbackLifecycle {
    pub fn new(store: Arc<dyn DatabaseService>, log: ActivityLog) -> Self {
        Self { store, log }
    }

    async fn load_assigned(&self, caller: &CurrentUser, id: Uuid) -> WorkflowResult<Teachback> {
        let teachback = self.store.get_teachback(id).await?;
        if teachback.assignee_id != caller.user_id {
            return Err(WorkflowError::Permission);
        }
        Ok(teachback)
    }

    fn check(from: TeachbackStatus, to: TeachbackStatus) -> WorkflowResult<()> {
        if !from.can_transition(to) {
            return Err(WorkflowError::InvalidTransition {
                entity: "teach-back",
                from: from.as_str(),
                to: to.as_str(),
            });
        }
        Ok(())
    }

    pub async fn start(&self, caller: &CurrentUser, id: Uuid) -> WorkflowResult<Teachback> {
        let teachback = self.load_assigned(caller, id).await?;
        Self::check(teachback.status, TeachbackStatus::InProgress)?;
        let now = Utc::now();
        self.store
            .update_teachback(id, TeachbackStatus::InProgress, teachback.notes.clone(), now)
            .await?;
        self.log
            .record(
                caller.user_id,
                &format!("Started teach-back \"{}\"", teachback.prompt),
                ActivityKind::Teachback,
            )
            .await;
        Ok(Teachback {
            status: TeachbackStatus::InProgress,
            updated_at: now,
            ..teachback
        })
    }

    pub async fn save_progress(
        &self,
        caller: &CurrentUser,
        id: Uuid,
        notes: &str,
    ) -> WorkflowResult<Teachback> {
        let teachback = self.load_assigned(caller, id).await?;
        Self::check(teachback.status, TeachbackStatus::InProgress)?;
        let now = Utc::now();
        let notes = Some(notes.to_string());
        self.store
            .update_teachback(id, TeachbackStatus::InProgress, notes.clone(), now)
            .await?;
        self.log
            .record(
                caller.user_id,
                &format!("Saved teach-back \"{}\"", teachback.prompt),
                ActivityKind::Teachback,
            )
            .await;
        Ok(Teachback {
            status: TeachbackStatus::InProgress,
            notes,
            updated_at: now,
            ..teachback
        })
    }

    pub async fn complete(&self, caller: &CurrentUser, id: Uuid) -> WorkflowResult<Teachback> {
        let teachback = self.load_assigned(caller, id).await?;
        Self::check(teachback.status, TeachbackStatus::Completed)?;
        let now = Utc::now();
        self.store
            .update_teachback(id, TeachbackStatus::Completed, teachback.notes.clone(), now)
            .await?;
        self.log
            .record(
                caller.user_id,
                &format!("Completed teach-back \"{}\"", teachback.prompt),
                ActivityKind::Teachback,
            )
            .await;
        Ok(Teachback {
            status: TeachbackStatus::Completed,
            updated_at: now,
            ..teachback
        })
    }
}

//=========================================================================================
// FeedbackLifecycle
//=========================================================================================

/// Completes feedback-queue items on behalf of the assigned reviewer.
#[derive(Clone)]
pub struct FeedbackLifecycle {
    store: Arc<dyn DatabaseService>,
    log: ActivityLog,
}

impl FeedbackLifecycle {
    pub fn new(store: Arc<dyn DatabaseService>, log: ActivityLog) -> Self {
        Self { store, log }
    }

    /// Loads an item for the review form, verifying the caller is its
    /// reviewer. A mismatch blocks before any write can happen.
    pub async fn load_for_review(
        &self,
        caller: &CurrentUser,
        id: Uuid,
    ) -> WorkflowResult<FeedbackItem> {
        let item = self.store.get_feedback_item(id).await?;
        if item.reviewer_id != caller.user_id {
            return Err(WorkflowError::Permission);
        }
        Ok(item)
    }

    /// Submits the review: status -> completed with rating and comment.
    /// Re-submitting a completed item overwrites the previous review.
    pub async fn submit(
        &self,
        caller: &CurrentUser,
        id: Uuid,
        rating: i32,
        comment: &str,
    ) -> WorkflowResult<FeedbackItem> {
        let item = self.load_for_review(caller, id).await?;
        if !(1..=5).contains(&rating) {
            return Err(WorkflowError::Validation(
                "Rating must be between 1 and 5".to_string(),
            ));
        }
        if !item.status.can_transition(FeedbackStatus::Completed) {
            return Err(WorkflowError::InvalidTransition {
                entity: "feedback",
                from: item.status.as_str(),
                to: FeedbackStatus::Completed.as_str(),
            });
        }
        let now = Utc::now();
        self.store
            .complete_feedback_item(id, rating, comment, now)
            .await?;
        self.log
            .record(
                caller.user_id,
                &format!("Gave feedback on \"{}\" for {}", item.title, item.learner),
                ActivityKind::Feedback,
            )
            .await;
        Ok(FeedbackItem {
            status: FeedbackStatus::Completed,
            rating: Some(rating),
            comment: Some(comment.to_string()),
            updated_at: now,
            ..item
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Profile;
    use crate::memory::InMemoryStore;
    use chrono::Duration;

    fn profile(user_id: Uuid, name: &str) -> Profile {
        Profile {
            user_id,
            display_name: Some(name.to_string()),
            photo_url: None,
            xp: 0,
            streak: 0,
            badges: vec![],
        }
    }

    fn new_challenge(days: i64) -> NewChallenge {
        NewChallenge {
            title: "Explain Recursion".to_string(),
            topic: "Algorithms".to_string(),
            level: Level::Beginner,
            due_in_days: days,
            prompt: "Walk through a recursive solution out loud.".to_string(),
        }
    }

    fn seeded_challenge(owner_id: Uuid, status: ChallengeStatus) -> Challenge {
        let now = Utc::now();
        Challenge {
            id: Uuid::new_v4(),
            owner_id,
            title: "Explain Recursion".to_string(),
            topic: "Algorithms".to_string(),
            level: Level::Beginner,
            prompt: String::new(),
            notes: None,
            status,
            due_ts: now + Duration::days(3),
            created_at: now,
            updated_at: now,
        }
    }

    fn seeded_teachback(assignee_id: Uuid, status: TeachbackStatus) -> Teachback {
        let now = Utc::now();
        Teachback {
            id: Uuid::new_v4(),
            challenge_id: None,
            requester_id: Uuid::new_v4(),
            assignee_id,
            prompt: "Teach back \"Explain Recursion\" (Algorithms)".to_string(),
            notes: None,
            status,
            due_ts: now + Duration::days(3),
            created_at: now,
            updated_at: now,
        }
    }

    fn components(
        store: Arc<InMemoryStore>,
    ) -> (
        ChallengeCreator,
        ChallengeLifecycle,
        TeachbackLifecycle,
        FeedbackLifecycle,
    ) {
        let store: Arc<dyn DatabaseService> = store;
        let log = ActivityLog::new(store.clone());
        (
            ChallengeCreator::new(store.clone(), log.clone(), 25),
            ChallengeLifecycle::new(store.clone(), log.clone()),
            TeachbackLifecycle::new(store.clone(), log.clone()),
            FeedbackLifecycle::new(store, log),
        )
    }

    #[tokio::test]
    async fn create_assigns_one_teachback_to_the_other_user() {
        let store = Arc::new(InMemoryStore::new());
        let creator_id = Uuid::new_v4();
        let peer_id = Uuid::new_v4();
        store.upsert_profile(profile(creator_id, "U1")).await.unwrap();
        store.upsert_profile(profile(peer_id, "U2")).await.unwrap();

        let (creator, _, _, _) = components(store.clone());
        let caller = CurrentUser::new(creator_id);
        let before = Utc::now();
        let created = creator.create(&caller, new_challenge(3)).await.unwrap();

        assert_eq!(created.challenge.status, ChallengeStatus::Open);
        assert_eq!(created.challenge.owner_id, creator_id);
        let expected_due = before + Duration::days(3);
        let drift = (created.challenge.due_ts - expected_due).num_seconds().abs();
        assert!(drift <= 5, "due_ts should be ~3 days out, drifted {drift}s");

        let tb = created.teachback.expect("one teach-back should be assigned");
        assert_eq!(tb.assignee_id, peer_id);
        assert_eq!(tb.requester_id, creator_id);
        assert_eq!(tb.status, TeachbackStatus::Pending);
        assert_eq!(tb.due_ts, created.challenge.due_ts);
        assert_eq!(tb.challenge_id, Some(created.challenge.id));

        // One feed entry each for the creator and the assignee.
        let creator_feed = store.list_activity_for_user(creator_id, 10).await.unwrap();
        let peer_feed = store.list_activity_for_user(peer_id, 10).await.unwrap();
        assert_eq!(creator_feed.len(), 1);
        assert_eq!(peer_feed.len(), 1);
        assert_eq!(peer_feed[0].kind, ActivityKind::Teachback);

        // Exactly one teach-back record came out of the creation.
        let assigned = store.list_teachbacks_by_assignee(peer_id, 10).await.unwrap();
        assert_eq!(assigned.len(), 1);
    }

    #[tokio::test]
    async fn create_with_empty_pool_still_succeeds_with_fallback_entry() {
        let store = Arc::new(InMemoryStore::new());
        let creator_id = Uuid::new_v4();
        store.upsert_profile(profile(creator_id, "U1")).await.unwrap();

        let (creator, _, _, _) = components(store.clone());
        let caller = CurrentUser::new(creator_id);
        let created = creator.create(&caller, new_challenge(3)).await.unwrap();

        assert!(created.teachback.is_none());
        let feed = store.list_activity_for_user(creator_id, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].kind, ActivityKind::Info);
    }

    #[tokio::test]
    async fn assignee_is_never_the_requester() {
        let store = Arc::new(InMemoryStore::new());
        let creator_id = Uuid::new_v4();
        store.upsert_profile(profile(creator_id, "me")).await.unwrap();
        for i in 0..10 {
            store
                .upsert_profile(profile(Uuid::new_v4(), &format!("peer{i}")))
                .await
                .unwrap();
        }

        let (creator, _, _, _) = components(store.clone());
        let caller = CurrentUser::new(creator_id);
        for _ in 0..20 {
            let created = creator.create(&caller, new_challenge(1)).await.unwrap();
            let tb = created.teachback.expect("candidates exist");
            assert_ne!(tb.assignee_id, creator_id);
        }
    }

    #[tokio::test]
    async fn create_rejects_blank_title_before_any_write() {
        let store = Arc::new(InMemoryStore::new());
        let creator_id = Uuid::new_v4();
        let (creator, _, _, _) = components(store.clone());
        let caller = CurrentUser::new(creator_id);

        let mut input = new_challenge(3);
        input.title = "   ".to_string();
        let err = creator.create(&caller, input).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));

        let feed = store.list_activity_for_user(creator_id, 10).await.unwrap();
        assert!(feed.is_empty());
    }

    #[tokio::test]
    async fn start_moves_accepted_challenge_to_in_progress() {
        let store = Arc::new(InMemoryStore::new());
        let owner_id = Uuid::new_v4();
        let challenge = seeded_challenge(owner_id, ChallengeStatus::Accepted);
        let other = seeded_challenge(owner_id, ChallengeStatus::Accepted);
        store
            .create_challenge_with_teachback(challenge.clone(), None)
            .await
            .unwrap();
        store
            .create_challenge_with_teachback(other.clone(), None)
            .await
            .unwrap();

        let (_, lifecycle, _, _) = components(store.clone());
        let caller = CurrentUser::new(owner_id);
        let updated = lifecycle.start(&caller, challenge.id).await.unwrap();
        assert_eq!(updated.status, ChallengeStatus::InProgress);

        let feed = store.list_activity_for_user(owner_id, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert!(feed[0].text.starts_with("Started"));

        // The sibling challenge is untouched.
        let untouched = store.get_challenge(other.id).await.unwrap();
        assert_eq!(untouched.status, ChallengeStatus::Accepted);
    }

    #[tokio::test]
    async fn completing_an_open_challenge_is_rejected_without_writes() {
        let store = Arc::new(InMemoryStore::new());
        let owner_id = Uuid::new_v4();
        let challenge = seeded_challenge(owner_id, ChallengeStatus::Open);
        store
            .create_challenge_with_teachback(challenge.clone(), None)
            .await
            .unwrap();

        let (_, lifecycle, _, _) = components(store.clone());
        let caller = CurrentUser::new(owner_id);
        let err = lifecycle.complete(&caller, challenge.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));

        let unchanged = store.get_challenge(challenge.id).await.unwrap();
        assert_eq!(unchanged.status, ChallengeStatus::Open);
        assert!(store
            .list_activity_for_user(owner_id, 10)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn non_owner_cannot_progress_a_challenge() {
        let store = Arc::new(InMemoryStore::new());
        let owner_id = Uuid::new_v4();
        let challenge = seeded_challenge(owner_id, ChallengeStatus::Accepted);
        store
            .create_challenge_with_teachback(challenge.clone(), None)
            .await
            .unwrap();

        let (_, lifecycle, _, _) = components(store.clone());
        let stranger = CurrentUser::new(Uuid::new_v4());
        let err = lifecycle.start(&stranger, challenge.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::Permission));

        let unchanged = store.get_challenge(challenge.id).await.unwrap();
        assert_eq!(unchanged.status, ChallengeStatus::Accepted);
    }

    #[tokio::test]
    async fn completed_teachback_stays_completed() {
        let store = Arc::new(InMemoryStore::new());
        let assignee_id = Uuid::new_v4();
        let tb = seeded_teachback(assignee_id, TeachbackStatus::Pending);
        store.insert_teachback(tb.clone()).await;

        let (_, _, lifecycle, _) = components(store.clone());
        let caller = CurrentUser::new(assignee_id);

        let started = lifecycle.start(&caller, tb.id).await.unwrap();
        assert_eq!(started.status, TeachbackStatus::InProgress);
        let done = lifecycle.complete(&caller, tb.id).await.unwrap();
        assert_eq!(done.status, TeachbackStatus::Completed);

        // No path leads out of completed.
        let err = lifecycle.start(&caller, tb.id).await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        let err = lifecycle.save_progress(&caller, tb.id, "late notes").await.unwrap_err();
        assert!(matches!(err, WorkflowError::InvalidTransition { .. }));
        let final_state = store.get_teachback(tb.id).await.unwrap();
        assert_eq!(final_state.status, TeachbackStatus::Completed);
    }

    #[tokio::test]
    async fn save_progress_keeps_notes_and_self_loops() {
        let store = Arc::new(InMemoryStore::new());
        let owner_id = Uuid::new_v4();
        let challenge = seeded_challenge(owner_id, ChallengeStatus::InProgress);
        store
            .create_challenge_with_teachback(challenge.clone(), None)
            .await
            .unwrap();

        let (_, lifecycle, _, _) = components(store.clone());
        let caller = CurrentUser::new(owner_id);
        let updated = lifecycle
            .save_progress(&caller, challenge.id, "draft of my explanation")
            .await
            .unwrap();
        assert_eq!(updated.status, ChallengeStatus::InProgress);
        assert_eq!(updated.notes.as_deref(), Some("draft of my explanation"));

        let stored = store.get_challenge(challenge.id).await.unwrap();
        assert_eq!(stored.notes.as_deref(), Some("draft of my explanation"));
    }

    #[tokio::test]
    async fn feedback_submit_completes_item_and_logs() {
        let store = Arc::new(InMemoryStore::new());
        let reviewer_id = Uuid::new_v4();
        let item = FeedbackItem {
            id: Uuid::new_v4(),
            reviewer_id,
            learner: "Riya".to_string(),
            title: "SQL joins explainer".to_string(),
            points: 20,
            status: FeedbackStatus::Pending,
            rating: None,
            comment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_feedback_item(item.clone()).await;

        let (_, _, _, feedback) = components(store.clone());
        let caller = CurrentUser::new(reviewer_id);
        let updated = feedback
            .submit(&caller, item.id, 4, "Clear and well paced")
            .await
            .unwrap();
        assert_eq!(updated.status, FeedbackStatus::Completed);
        assert_eq!(updated.rating, Some(4));

        let stored = store.get_feedback_item(item.id).await.unwrap();
        assert_eq!(stored.status, FeedbackStatus::Completed);
        assert_eq!(stored.rating, Some(4));
        assert_eq!(stored.comment.as_deref(), Some("Clear and well paced"));

        let feed = store.list_activity_for_user(reviewer_id, 10).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(
            feed[0].text,
            "Gave feedback on \"SQL joins explainer\" for Riya"
        );
    }

    #[tokio::test]
    async fn feedback_submit_blocked_for_wrong_reviewer() {
        let store = Arc::new(InMemoryStore::new());
        let item = FeedbackItem {
            id: Uuid::new_v4(),
            reviewer_id: Uuid::new_v4(),
            learner: "Dev".to_string(),
            title: "Data modeling 101".to_string(),
            points: 10,
            status: FeedbackStatus::Pending,
            rating: None,
            comment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_feedback_item(item.clone()).await;

        let (_, _, _, feedback) = components(store.clone());
        let stranger = CurrentUser::new(Uuid::new_v4());
        let err = feedback
            .submit(&stranger, item.id, 4, "nice")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::Permission));

        let unchanged = store.get_feedback_item(item.id).await.unwrap();
        assert_eq!(unchanged.status, FeedbackStatus::Pending);
        assert_eq!(unchanged.rating, None);
    }

    #[tokio::test]
    async fn feedback_rating_out_of_range_is_rejected() {
        let store = Arc::new(InMemoryStore::new());
        let reviewer_id = Uuid::new_v4();
        let item = FeedbackItem {
            id: Uuid::new_v4(),
            reviewer_id,
            learner: "Kabir".to_string(),
            title: "Binary search teach-back".to_string(),
            points: 15,
            status: FeedbackStatus::Pending,
            rating: None,
            comment: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        store.insert_feedback_item(item.clone()).await;

        let (_, _, _, feedback) = components(store.clone());
        let caller = CurrentUser::new(reviewer_id);
        let err = feedback.submit(&caller, item.id, 6, "!").await.unwrap_err();
        assert!(matches!(err, WorkflowError::Validation(_)));
        let unchanged = store.get_feedback_item(item.id).await.unwrap();
        assert_eq!(unchanged.status, FeedbackStatus::Pending);
    }

    #[tokio::test]
    async fn failed_activity_append_does_not_fail_the_transition() {
        let store = Arc::new(InMemoryStore::new());
        let owner_id = Uuid::new_v4();
        let challenge = seeded_challenge(owner_id, ChallengeStatus::InProgress);
        store
            .create_challenge_with_teachback(challenge.clone(), None)
            .await
            .unwrap();
        store.fail_activity_appends(true);

        let (_, lifecycle, _, _) = components(store.clone());
        let caller = CurrentUser::new(owner_id);
        let updated = lifecycle.complete(&caller, challenge.id).await.unwrap();
        assert_eq!(updated.status, ChallengeStatus::Completed);

        let stored = store.get_challenge(challenge.id).await.unwrap();
        assert_eq!(stored.status, ChallengeStatus::Completed);
    }
}
