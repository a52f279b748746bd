//! crates/peerteach_core/src/domain.rs
//!
//! Defines the pure, core data structures for the application.
//! These structs are independent of any database or serialization format.
//!
//! Status fields are real enums with explicit transition tables rather than
//! free-form strings; anything read from storage is parsed (and rejected)
//! at that boundary.

use chrono::{DateTime, Utc};
use std::fmt;
use uuid::Uuid;

/// Difficulty of a challenge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Beginner,
    Intermediate,
    Advanced,
}

impl Level {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Beginner => "Beginner",
            Self::Intermediate => "Intermediate",
            Self::Advanced => "Advanced",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "Beginner" => Some(Self::Beginner),
            "Intermediate" => Some(Self::Intermediate),
            "Advanced" => Some(Self::Advanced),
            _ => None,
        }
    }
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a challenge, owned and progressed by its creator.
///
/// Statuses only ever move forward along
/// `open < accepted < in_progress < completed`; the one self-loop
/// (`in_progress -> in_progress`) covers saving working notes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChallengeStatus {
    Open,
    Accepted,
    InProgress,
    Completed,
}

impl ChallengeStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Open => "open",
            Self::Accepted => "accepted",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "open" => Some(Self::Open),
            "accepted" => Some(Self::Accepted),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    /// The exhaustive transition table.
    ///
    /// `Open -> InProgress` is admitted alongside `Open -> Accepted` to
    /// cover the single-"Start"-button flow where acceptance is implicit.
    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Open, Self::Accepted)
                | (Self::Open, Self::InProgress)
                | (Self::Accepted, Self::InProgress)
                | (Self::InProgress, Self::InProgress)
                | (Self::InProgress, Self::Completed)
        )
    }
}

impl fmt::Display for ChallengeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of an assigned teach-back, progressed by its assignee.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum TeachbackStatus {
    Pending,
    InProgress,
    Completed,
}

impl TeachbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::InProgress => "in_progress",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "in_progress" => Some(Self::InProgress),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::InProgress)
                | (Self::InProgress, Self::InProgress)
                | (Self::InProgress, Self::Completed)
        )
    }
}

impl fmt::Display for TeachbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle of a feedback-queue item.
///
/// `Completed -> Completed` is deliberately allowed: a reviewer can re-open
/// a finished review and submit an updated rating/comment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum FeedbackStatus {
    Pending,
    Completed,
}

impl FeedbackStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pending => "pending",
            Self::Completed => "completed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(Self::Pending),
            "completed" => Some(Self::Completed),
            _ => None,
        }
    }

    pub fn can_transition(self, next: Self) -> bool {
        matches!(
            (self, next),
            (Self::Pending, Self::Completed) | (Self::Completed, Self::Completed)
        )
    }
}

impl fmt::Display for FeedbackStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse tag on an activity entry, used by feeds to pick an icon.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ActivityKind {
    Challenge,
    Teachback,
    Feedback,
    Info,
}

impl ActivityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Challenge => "challenge",
            Self::Teachback => "teachback",
            Self::Feedback => "feedback",
            Self::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "challenge" => Some(Self::Challenge),
            "teachback" => Some(Self::Teachback),
            "feedback" => Some(Self::Feedback),
            "info" => Some(Self::Info),
            _ => None,
        }
    }
}

impl fmt::Display for ActivityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A learning task created by one user, to be completed by that same owner.
#[derive(Debug, Clone)]
pub struct Challenge {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub topic: String,
    pub level: Level,
    pub prompt: String,
    /// Free-text working notes, saved via the in-progress self-loop.
    pub notes: Option<String>,
    pub status: ChallengeStatus,
    pub due_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A derived assignment asking a different user to teach the challenge's
/// concept back. Invariant: `assignee_id != requester_id`.
#[derive(Debug, Clone)]
pub struct Teachback {
    pub id: Uuid,
    /// Back-reference to the challenge this was spawned from. Not an
    /// ownership relation; deleting either side leaves the other intact.
    pub challenge_id: Option<Uuid>,
    pub requester_id: Uuid,
    pub assignee_id: Uuid,
    pub prompt: String,
    pub notes: Option<String>,
    pub status: TeachbackStatus,
    pub due_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// A pending review duty assigned to a reviewer for a learner's work.
#[derive(Debug, Clone)]
pub struct FeedbackItem {
    pub id: Uuid,
    pub reviewer_id: Uuid,
    /// Display name of the learner whose work is being reviewed.
    pub learner: String,
    pub title: String,
    /// XP reward for completing the review.
    pub points: i32,
    pub status: FeedbackStatus,
    pub rating: Option<i32>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// An immutable line in a user's activity feed. Append-only.
#[derive(Debug, Clone)]
pub struct ActivityEntry {
    pub id: Uuid,
    pub user_id: Uuid,
    pub text: String,
    pub kind: ActivityKind,
    /// Assigned by the store at write time.
    pub created_at: DateTime<Utc>,
}

/// A user's public profile and aggregate progress. Read-only from the
/// workflow's perspective; XP/badge awarding happens elsewhere.
#[derive(Debug, Clone)]
pub struct Profile {
    pub user_id: Uuid,
    pub display_name: Option<String>,
    pub photo_url: Option<String>,
    pub xp: i64,
    pub streak: i32,
    pub badges: Vec<String>,
}

const XP_PER_LEVEL: i64 = 500;

impl Profile {
    /// Derived level shown on dashboards.
    pub fn level(&self) -> i64 {
        self.xp / XP_PER_LEVEL + 1
    }

    /// Percent progress through the current level, 0..=100.
    pub fn level_pct(&self) -> i64 {
        (self.xp % XP_PER_LEVEL) * 100 / XP_PER_LEVEL
    }
}

// Only used internally for login/signup - contains sensitive data
#[derive(Debug, Clone)]
pub struct UserCredentials {
    pub user_id: Uuid,
    pub email: String,
    pub hashed_password: String,
}

// Represents a browser login session (auth cookie)
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub id: String,
    pub user_id: Uuid,
    pub expires_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn challenge_statuses_round_trip() {
        for status in [
            ChallengeStatus::Open,
            ChallengeStatus::Accepted,
            ChallengeStatus::InProgress,
            ChallengeStatus::Completed,
        ] {
            assert_eq!(ChallengeStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(ChallengeStatus::parse("archived"), None);
    }

    #[test]
    fn completed_challenge_is_terminal() {
        for next in [
            ChallengeStatus::Open,
            ChallengeStatus::Accepted,
            ChallengeStatus::InProgress,
            ChallengeStatus::Completed,
        ] {
            assert!(!ChallengeStatus::Completed.can_transition(next));
        }
    }

    #[test]
    fn completed_teachback_is_terminal() {
        for next in [
            TeachbackStatus::Pending,
            TeachbackStatus::InProgress,
            TeachbackStatus::Completed,
        ] {
            assert!(!TeachbackStatus::Completed.can_transition(next));
        }
    }

    #[test]
    fn feedback_allows_resubmission() {
        assert!(FeedbackStatus::Pending.can_transition(FeedbackStatus::Completed));
        assert!(FeedbackStatus::Completed.can_transition(FeedbackStatus::Completed));
        assert!(!FeedbackStatus::Completed.can_transition(FeedbackStatus::Pending));
    }

    #[test]
    fn level_derivation() {
        let profile = Profile {
            user_id: Uuid::new_v4(),
            display_name: None,
            photo_url: None,
            xp: 1250,
            streak: 3,
            badges: vec![],
        };
        assert_eq!(profile.level(), 3);
        assert_eq!(profile.level_pct(), 50);
    }

    fn arb_challenge_status() -> impl Strategy<Value = ChallengeStatus> {
        prop_oneof![
            Just(ChallengeStatus::Open),
            Just(ChallengeStatus::Accepted),
            Just(ChallengeStatus::InProgress),
            Just(ChallengeStatus::Completed),
        ]
    }

    fn arb_teachback_status() -> impl Strategy<Value = TeachbackStatus> {
        prop_oneof![
            Just(TeachbackStatus::Pending),
            Just(TeachbackStatus::InProgress),
            Just(TeachbackStatus::Completed),
        ]
    }

    proptest! {
        /// Every admitted challenge transition is monotone in the status
        /// order; a status never moves backwards.
        #[test]
        fn challenge_transitions_never_go_backwards(
            from in arb_challenge_status(),
            to in arb_challenge_status(),
        ) {
            if from.can_transition(to) {
                prop_assert!(to >= from);
            }
        }

        #[test]
        fn teachback_transitions_never_go_backwards(
            from in arb_teachback_status(),
            to in arb_teachback_status(),
        ) {
            if from.can_transition(to) {
                prop_assert!(to >= from);
            }
        }

        /// Walking any sequence of attempted transitions, applying only the
        /// admitted ones, keeps the status non-decreasing throughout.
        #[test]
        fn challenge_status_is_monotone_over_sequences(
            attempts in proptest::collection::vec(arb_challenge_status(), 0..20),
        ) {
            let mut current = ChallengeStatus::Open;
            for next in attempts {
                if current.can_transition(next) {
                    prop_assert!(next >= current);
                    current = next;
                }
            }
        }
    }
}
