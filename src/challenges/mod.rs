// Challenge acquisition: page payloads, the browser session that runs them, and the admission gate in front of it.

pub mod admission;
pub mod core;
pub mod scripts;
pub mod session;

#[cfg(test)]
pub(crate) mod testing;

pub use admission::{AdmissionConfig, AdmissionError, AdmissionGate, TokenSource};
pub use session::{
    AttemptFailure, CaptchaConfigSource, ChallengeSession, SessionError, SessionState,
};
