//! services/api/src/web/state.rs
//!
//! Defines the application's shared state.

use crate::config::Config;
use peerteach_core::ports::DatabaseService;
use peerteach_core::workflow::{
    ActivityLog, ChallengeCreator, ChallengeLifecycle, FeedbackLifecycle, TeachbackLifecycle,
};
use std::sync::Arc;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

/// The shared application state, created once at startup and passed to all handlers.
#[derive(Clone)]
pub struct AppState {
    pub db: Arc<dyn DatabaseService>,
    pub config: Arc<Config>,
    pub activity: ActivityLog,
    pub creator: ChallengeCreator,
    pub challenges: ChallengeLifecycle,
    pub teachbacks: TeachbackLifecycle,
    pub feedback: FeedbackLifecycle,
}

impl AppState {
    /// Wires the workflow components over one shared store.
    pub fn new(db: Arc<dyn DatabaseService>, config: Arc<Config>) -> Self {
        let activity = ActivityLog::new(db.clone());
        let creator = ChallengeCreator::new(db.clone(), activity.clone(), config.candidate_pool_size);
        let challenges = ChallengeLifecycle::new(db.clone(), activity.clone());
        let teachbacks = TeachbackLifecycle::new(db.clone(), activity.clone());
        let feedback = FeedbackLifecycle::new(db.clone(), activity.clone());
        Self {
            db,
            config,
            activity,
            creator,
            challenges,
            teachbacks,
            feedback,
        }
    }
}
