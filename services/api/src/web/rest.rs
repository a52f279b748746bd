//! services/api/src/web/rest.rs
//!
//! Contains the Axum handlers for the REST API endpoints and the master
//! definition for the OpenAPI specification.

use crate::web::state::AppState;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    Extension,
};
use chrono::{DateTime, Utc};
use peerteach_core::domain::{
    ActivityEntry, Challenge, FeedbackItem, Level, Profile, Teachback,
};
use peerteach_core::ports::PortError;
use peerteach_core::workflow::{ChallengeCreated, CurrentUser, NewChallenge, WorkflowError};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::error;
use utoipa::{OpenApi, ToSchema};
use uuid::Uuid;

/// Page size for the full list views; the dashboard uses the (smaller)
/// configured limit instead.
const LIST_PAGE_LIMIT: u32 = 100;

/// Entries shown in the activity feed views.
const ACTIVITY_FEED_LIMIT: u32 = 10;

//=========================================================================================
// OpenAPI Master Definition
//=========================================================================================

#[derive(OpenApi)]
#[openapi(
    paths(
        crate::web::auth::signup_handler,
        crate::web::auth::login_handler,
        crate::web::auth::logout_handler,
        create_challenge_handler,
        list_challenges_handler,
        get_challenge_handler,
        start_challenge_handler,
        save_challenge_progress_handler,
        complete_challenge_handler,
        list_teachbacks_handler,
        get_teachback_handler,
        start_teachback_handler,
        save_teachback_progress_handler,
        complete_teachback_handler,
        list_feedback_handler,
        get_feedback_handler,
        submit_feedback_handler,
        activity_handler,
        dashboard_handler,
        leaderboard_handler,
    ),
    components(schemas(
        crate::web::auth::SignupRequest,
        crate::web::auth::LoginRequest,
        crate::web::auth::AuthResponse,
        CreateChallengeRequest,
        SaveProgressRequest,
        SubmitFeedbackRequest,
        ChallengeResponse,
        CreateChallengeResponse,
        TeachbackResponse,
        FeedbackResponse,
        ActivityResponse,
        LeaderboardEntry,
        DashboardResponse,
    )),
    tags(
        (name = "PeerTeach API", description = "API endpoints for the peer-to-peer learning workflow.")
    )
)]
pub struct ApiDoc;

//=========================================================================================
// API Response and Payload Structs
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct CreateChallengeRequest {
    pub title: String,
    pub topic: String,
    /// One of `Beginner`, `Intermediate`, `Advanced`.
    pub level: String,
    pub due_in_days: i64,
    #[serde(default)]
    pub prompt: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SaveProgressRequest {
    pub notes: String,
}

#[derive(Deserialize, ToSchema)]
pub struct SubmitFeedbackRequest {
    pub rating: i32,
    #[serde(default)]
    pub comment: String,
}

#[derive(Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
}

#[derive(Serialize, ToSchema)]
pub struct ChallengeResponse {
    pub id: Uuid,
    pub title: String,
    pub topic: String,
    pub level: String,
    pub status: String,
    pub prompt: String,
    pub notes: Option<String>,
    pub due_ts: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl From<Challenge> for ChallengeResponse {
    fn from(c: Challenge) -> Self {
        Self {
            id: c.id,
            title: c.title,
            topic: c.topic,
            level: c.level.as_str().to_string(),
            status: c.status.as_str().to_string(),
            prompt: c.prompt,
            notes: c.notes,
            due_ts: c.due_ts,
            created_at: c.created_at,
            updated_at: c.updated_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct TeachbackResponse {
    pub id: Uuid,
    pub challenge_id: Option<Uuid>,
    pub requester_id: Uuid,
    pub assignee_id: Uuid,
    pub prompt: String,
    pub notes: Option<String>,
    pub status: String,
    pub due_ts: DateTime<Utc>,
}

impl From<Teachback> for TeachbackResponse {
    fn from(t: Teachback) -> Self {
        Self {
            id: t.id,
            challenge_id: t.challenge_id,
            requester_id: t.requester_id,
            assignee_id: t.assignee_id,
            prompt: t.prompt,
            notes: t.notes,
            status: t.status.as_str().to_string(),
            due_ts: t.due_ts,
        }
    }
}

/// The response payload sent after successfully creating a challenge.
#[derive(Serialize, ToSchema)]
pub struct CreateChallengeResponse {
    pub challenge: ChallengeResponse,
    /// The auto-assigned teach-back, absent when no candidate peer existed.
    pub teachback: Option<TeachbackResponse>,
}

impl From<ChallengeCreated> for CreateChallengeResponse {
    fn from(created: ChallengeCreated) -> Self {
        Self {
            challenge: created.challenge.into(),
            teachback: created.teachback.map(Into::into),
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct FeedbackResponse {
    pub id: Uuid,
    pub learner: String,
    pub title: String,
    pub points: i32,
    pub status: String,
    pub rating: Option<i32>,
    pub comment: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl From<FeedbackItem> for FeedbackResponse {
    fn from(f: FeedbackItem) -> Self {
        Self {
            id: f.id,
            learner: f.learner,
            title: f.title,
            points: f.points,
            status: f.status.as_str().to_string(),
            rating: f.rating,
            comment: f.comment,
            created_at: f.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct ActivityResponse {
    pub id: Uuid,
    pub text: String,
    pub kind: String,
    pub created_at: DateTime<Utc>,
}

impl From<ActivityEntry> for ActivityResponse {
    fn from(a: ActivityEntry) -> Self {
        Self {
            id: a.id,
            text: a.text,
            kind: a.kind.as_str().to_string(),
            created_at: a.created_at,
        }
    }
}

#[derive(Serialize, ToSchema)]
pub struct LeaderboardEntry {
    pub user_id: Uuid,
    pub name: String,
    pub xp: i64,
}

impl From<Profile> for LeaderboardEntry {
    fn from(p: Profile) -> Self {
        // Anonymous profiles fall back to a short id prefix.
        let name = p
            .display_name
            .unwrap_or_else(|| p.user_id.to_string()[..6].to_string());
        Self {
            user_id: p.user_id,
            name,
            xp: p.xp,
        }
    }
}

/// Everything the dashboard shows in one response: profile stats, the
/// short work lists, the leaderboard, and recent activity.
#[derive(Serialize, ToSchema)]
pub struct DashboardResponse {
    pub xp: i64,
    pub streak: i32,
    pub level: i64,
    pub level_pct: i64,
    pub badges: Vec<String>,
    pub active_challenges: Vec<ChallengeResponse>,
    pub teachbacks_due: Vec<TeachbackResponse>,
    pub feedback_queue: Vec<FeedbackResponse>,
    pub recent_activity: Vec<ActivityResponse>,
    pub leaderboard: Vec<LeaderboardEntry>,
}

//=========================================================================================
// Error Mapping
//=========================================================================================

fn port_error(err: PortError) -> (StatusCode, String) {
    match err {
        PortError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
        PortError::Unavailable(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Service is temporarily unavailable. Please retry.".to_string(),
        ),
        PortError::Unauthorized => (
            StatusCode::FORBIDDEN,
            "You don't have permission to access this data".to_string(),
        ),
        PortError::Unexpected(msg) => {
            error!("store error: {msg}");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Something went wrong. Please try again.".to_string(),
            )
        }
    }
}

fn workflow_error(err: WorkflowError) -> (StatusCode, String) {
    match err {
        WorkflowError::Validation(msg) => (StatusCode::BAD_REQUEST, msg),
        WorkflowError::InvalidTransition { .. } => (StatusCode::CONFLICT, err.to_string()),
        WorkflowError::Permission => (StatusCode::FORBIDDEN, err.to_string()),
        WorkflowError::Store(port) => port_error(port),
    }
}

//=========================================================================================
// Challenge Handlers
//=========================================================================================

/// Create a challenge and auto-assign a teach-back to a random peer.
#[utoipa::path(
    post,
    path = "/challenges",
    request_body = CreateChallengeRequest,
    responses(
        (status = 201, description = "Challenge created", body = CreateChallengeResponse),
        (status = 400, description = "Validation failure"),
        (status = 503, description = "Store unavailable")
    )
)]
pub async fn create_challenge_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Json(req): Json<CreateChallengeRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let level = Level::parse(&req.level).ok_or_else(|| {
        (
            StatusCode::BAD_REQUEST,
            format!("'{}' is not a valid level", req.level),
        )
    })?;

    let created = state
        .creator
        .create(
            &caller,
            NewChallenge {
                title: req.title,
                topic: req.topic,
                level,
                due_in_days: req.due_in_days,
                prompt: req.prompt,
            },
        )
        .await
        .map_err(workflow_error)?;

    Ok((
        StatusCode::CREATED,
        Json(CreateChallengeResponse::from(created)),
    ))
}

/// List the caller's challenges, optionally filtered by a search needle.
#[utoipa::path(
    get,
    path = "/challenges",
    params(("q" = Option<String>, Query, description = "Case-insensitive filter over title/topic/level/status")),
    responses(
        (status = 200, description = "The caller's challenges, due soonest first", body = [ChallengeResponse])
    )
)]
pub async fn list_challenges_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Query(query): Query<SearchQuery>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = state
        .db
        .list_challenges_by_owner(caller.user_id, LIST_PAGE_LIMIT)
        .await
        .map_err(port_error)?;

    let rows = match query.q.as_deref().map(str::trim) {
        Some(needle) if !needle.is_empty() => {
            let needle = needle.to_lowercase();
            rows.into_iter()
                .filter(|c| {
                    [c.title.as_str(), c.topic.as_str(), c.level.as_str(), c.status.as_str()]
                        .iter()
                        .any(|field| field.to_lowercase().contains(&needle))
                })
                .collect()
        }
        _ => rows,
    };

    let response: Vec<ChallengeResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// Fetch one challenge.
#[utoipa::path(
    get,
    path = "/challenges/{id}",
    params(("id" = Uuid, Path, description = "Challenge id")),
    responses(
        (status = 200, description = "The challenge", body = ChallengeResponse),
        (status = 404, description = "No such challenge")
    )
)]
pub async fn get_challenge_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let challenge = state.db.get_challenge(id).await.map_err(port_error)?;
    Ok(Json(ChallengeResponse::from(challenge)))
}

/// Start (or continue) working on a challenge: moves it to `in_progress`.
#[utoipa::path(
    post,
    path = "/challenges/{id}/start",
    params(("id" = Uuid, Path, description = "Challenge id")),
    responses(
        (status = 200, description = "Challenge is now in progress", body = ChallengeResponse),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Not startable from its current status")
    )
)]
pub async fn start_challenge_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let challenge = state
        .challenges
        .start(&caller, id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(ChallengeResponse::from(challenge)))
}

/// Save working notes without completing the challenge.
#[utoipa::path(
    post,
    path = "/challenges/{id}/progress",
    params(("id" = Uuid, Path, description = "Challenge id")),
    request_body = SaveProgressRequest,
    responses(
        (status = 200, description = "Progress saved", body = ChallengeResponse),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Challenge is already completed")
    )
)]
pub async fn save_challenge_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveProgressRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let challenge = state
        .challenges
        .save_progress(&caller, id, &req.notes)
        .await
        .map_err(workflow_error)?;
    Ok(Json(ChallengeResponse::from(challenge)))
}

/// Mark a challenge complete. Terminal.
#[utoipa::path(
    post,
    path = "/challenges/{id}/complete",
    params(("id" = Uuid, Path, description = "Challenge id")),
    responses(
        (status = 200, description = "Challenge completed", body = ChallengeResponse),
        (status = 403, description = "Caller is not the owner"),
        (status = 409, description = "Only an in-progress challenge can be completed")
    )
)]
pub async fn complete_challenge_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let challenge = state
        .challenges
        .complete(&caller, id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(ChallengeResponse::from(challenge)))
}

//=========================================================================================
// Teachback Handlers
//=========================================================================================

/// List teach-backs assigned to the caller, due soonest first.
#[utoipa::path(
    get,
    path = "/teachbacks",
    responses(
        (status = 200, description = "Teach-backs assigned to the caller", body = [TeachbackResponse])
    )
)]
pub async fn list_teachbacks_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = state
        .db
        .list_teachbacks_by_assignee(caller.user_id, LIST_PAGE_LIMIT)
        .await
        .map_err(port_error)?;
    let response: Vec<TeachbackResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// Fetch one teach-back.
#[utoipa::path(
    get,
    path = "/teachbacks/{id}",
    params(("id" = Uuid, Path, description = "Teach-back id")),
    responses(
        (status = 200, description = "The teach-back", body = TeachbackResponse),
        (status = 404, description = "No such teach-back")
    )
)]
pub async fn get_teachback_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let teachback = state.db.get_teachback(id).await.map_err(port_error)?;
    Ok(Json(TeachbackResponse::from(teachback)))
}

/// Start an assigned teach-back: `pending` -> `in_progress`.
#[utoipa::path(
    post,
    path = "/teachbacks/{id}/start",
    params(("id" = Uuid, Path, description = "Teach-back id")),
    responses(
        (status = 200, description = "Teach-back is now in progress", body = TeachbackResponse),
        (status = 403, description = "Caller is not the assignee"),
        (status = 409, description = "Not startable from its current status")
    )
)]
pub async fn start_teachback_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let teachback = state
        .teachbacks
        .start(&caller, id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(TeachbackResponse::from(teachback)))
}

/// Save teach-back notes without completing it.
#[utoipa::path(
    post,
    path = "/teachbacks/{id}/progress",
    params(("id" = Uuid, Path, description = "Teach-back id")),
    request_body = SaveProgressRequest,
    responses(
        (status = 200, description = "Progress saved", body = TeachbackResponse),
        (status = 403, description = "Caller is not the assignee"),
        (status = 409, description = "Teach-back is already completed")
    )
)]
pub async fn save_teachback_progress_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<SaveProgressRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let teachback = state
        .teachbacks
        .save_progress(&caller, id, &req.notes)
        .await
        .map_err(workflow_error)?;
    Ok(Json(TeachbackResponse::from(teachback)))
}

/// Mark a teach-back complete. Terminal.
#[utoipa::path(
    post,
    path = "/teachbacks/{id}/complete",
    params(("id" = Uuid, Path, description = "Teach-back id")),
    responses(
        (status = 200, description = "Teach-back completed", body = TeachbackResponse),
        (status = 403, description = "Caller is not the assignee"),
        (status = 409, description = "Only an in-progress teach-back can be completed")
    )
)]
pub async fn complete_teachback_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let teachback = state
        .teachbacks
        .complete(&caller, id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(TeachbackResponse::from(teachback)))
}

//=========================================================================================
// Feedback Handlers
//=========================================================================================

/// List the caller's feedback queue, newest first.
#[utoipa::path(
    get,
    path = "/feedback",
    responses(
        (status = 200, description = "Feedback items awaiting the caller's review", body = [FeedbackResponse])
    )
)]
pub async fn list_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = state
        .db
        .list_feedback_for_reviewer(caller.user_id, LIST_PAGE_LIMIT)
        .await
        .map_err(port_error)?;
    let response: Vec<FeedbackResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// Load one feedback item for review. Blocked unless the caller is the
/// assigned reviewer.
#[utoipa::path(
    get,
    path = "/feedback/{id}",
    params(("id" = Uuid, Path, description = "Feedback item id")),
    responses(
        (status = 200, description = "The feedback item", body = FeedbackResponse),
        (status = 403, description = "Caller is not the assigned reviewer"),
        (status = 404, description = "No such feedback item")
    )
)]
pub async fn get_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let item = state
        .feedback
        .load_for_review(&caller, id)
        .await
        .map_err(workflow_error)?;
    Ok(Json(FeedbackResponse::from(item)))
}

/// Submit a review: rating 1-5 plus a free-text comment.
#[utoipa::path(
    post,
    path = "/feedback/{id}",
    params(("id" = Uuid, Path, description = "Feedback item id")),
    request_body = SubmitFeedbackRequest,
    responses(
        (status = 200, description = "Review recorded", body = FeedbackResponse),
        (status = 400, description = "Rating out of range"),
        (status = 403, description = "Caller is not the assigned reviewer")
    )
)]
pub async fn submit_feedback_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
    Path(id): Path<Uuid>,
    Json(req): Json<SubmitFeedbackRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let item = state
        .feedback
        .submit(&caller, id, req.rating, &req.comment)
        .await
        .map_err(workflow_error)?;
    Ok(Json(FeedbackResponse::from(item)))
}

//=========================================================================================
// Activity, Dashboard, Leaderboard
//=========================================================================================

/// The caller's activity feed, newest first.
#[utoipa::path(
    get,
    path = "/activity",
    responses(
        (status = 200, description = "Recent activity for the caller", body = [ActivityResponse])
    )
)]
pub async fn activity_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = state
        .db
        .list_activity_for_user(caller.user_id, ACTIVITY_FEED_LIMIT)
        .await
        .map_err(port_error)?;
    let response: Vec<ActivityResponse> = rows.into_iter().map(Into::into).collect();
    Ok(Json(response))
}

/// One-call summary backing the dashboard page.
#[utoipa::path(
    get,
    path = "/dashboard",
    responses(
        (status = 200, description = "Profile stats, work lists, leaderboard and recent activity", body = DashboardResponse)
    )
)]
pub async fn dashboard_handler(
    State(state): State<Arc<AppState>>,
    Extension(caller): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // A missing profile renders as zeroed stats rather than an error.
    let profile = match state.db.get_profile(caller.user_id).await {
        Ok(profile) => profile,
        Err(PortError::NotFound(_)) => Profile {
            user_id: caller.user_id,
            display_name: None,
            photo_url: None,
            xp: 0,
            streak: 0,
            badges: vec![],
        },
        Err(e) => return Err(port_error(e)),
    };

    let limit = state.config.list_limit;
    let active_challenges = state
        .db
        .list_challenges_by_owner(caller.user_id, limit)
        .await
        .map_err(port_error)?;
    let teachbacks_due = state
        .db
        .list_teachbacks_by_assignee(caller.user_id, limit)
        .await
        .map_err(port_error)?;
    let feedback_queue = state
        .db
        .list_feedback_for_reviewer(caller.user_id, limit)
        .await
        .map_err(port_error)?;
    let recent_activity = state
        .db
        .list_activity_for_user(caller.user_id, ACTIVITY_FEED_LIMIT)
        .await
        .map_err(port_error)?;
    let leaderboard = state
        .db
        .top_profiles_by_xp(state.config.leaderboard_size)
        .await
        .map_err(port_error)?;

    Ok(Json(DashboardResponse {
        xp: profile.xp,
        streak: profile.streak,
        level: profile.level(),
        level_pct: profile.level_pct(),
        badges: profile.badges,
        active_challenges: active_challenges.into_iter().map(Into::into).collect(),
        teachbacks_due: teachbacks_due.into_iter().map(Into::into).collect(),
        feedback_queue: feedback_queue.into_iter().map(Into::into).collect(),
        recent_activity: recent_activity.into_iter().map(Into::into).collect(),
        leaderboard: leaderboard.into_iter().map(Into::into).collect(),
    }))
}

/// Global top profiles by XP.
#[utoipa::path(
    get,
    path = "/leaderboard",
    responses(
        (status = 200, description = "Top profiles by XP", body = [LeaderboardEntry])
    )
)]
pub async fn leaderboard_handler(
    State(state): State<Arc<AppState>>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let rows = state
        .db
        .top_profiles_by_xp(state.config.leaderboard_size)
        .await
        .map_err(port_error)?;
    let response: Vec<LeaderboardEntry> = rows.into_iter().map(Into::into).collect();
    Ok(Json(response))
}
