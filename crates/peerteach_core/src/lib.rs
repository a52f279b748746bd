pub mod domain;
pub mod memory;
pub mod ports;
pub mod workflow;

pub use domain::{
    ActivityEntry, ActivityKind, AuthSession, Challenge, ChallengeStatus, FeedbackItem,
    FeedbackStatus, Level, Profile, Teachback, TeachbackStatus, UserCredentials,
};
pub use memory::InMemoryStore;
pub use ports::{DatabaseService, PortError, PortResult};
pub use workflow::{
    ActivityLog, ChallengeCreated, ChallengeCreator, ChallengeLifecycle, CurrentUser,
    FeedbackLifecycle, NewChallenge, TeachbackLifecycle, WorkflowError, WorkflowResult,
};
