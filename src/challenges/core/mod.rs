//! Core types shared by the challenge session and the admission gate.

pub mod timing;
pub mod types;

pub use timing::RateLimiterState;
pub use types::{
    ChallengeConfig, ChallengeToken, DEFAULT_ACTION, DEFAULT_PROJECT_BASE_URL,
    DEFAULT_SCRIPT_ENDPOINT, DEFAULT_SITE_KEY, ProjectContext,
};
