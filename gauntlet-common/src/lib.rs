//! Common types shared across Gauntlet crates.
//!
//! This crate defines the data model for one orchestrated run (challenge
//! descriptors, step records, the final [`RunResult`]), the classified
//! [`FlowError`] taxonomy, the [`RetryPolicy`] configuration value, and
//! centralised tracing setup in [`observability`]. It is intentionally
//! lightweight so every crate in the workspace can depend on it.

use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub mod observability;

/// Browser automation stealth level.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StealthLevel {
    Lightweight,
    Balanced,
    Maximum,
}

/// Which anti-bot challenge provider is present on the page, if any.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChallengeKind {
    None,
    Turnstile,
    Hcaptcha,
    /// A verification interstitial was recognised from page text but the
    /// provider could not be identified structurally.
    Unknown,
}

impl ChallengeKind {
    pub fn is_present(&self) -> bool {
        !matches!(self, ChallengeKind::None)
    }
}

/// Snapshot of a detected challenge, produced by the detector and consumed
/// within a single resolution attempt. Never persisted beyond the run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChallengeDescriptor {
    pub kind: ChallengeKind,
    /// Site key if the detection strategy happened to surface one; the
    /// resolver runs its own extraction chain when this is empty.
    pub site_key: Option<String>,
    /// Source URL of the challenge-hosting frame, when detected via iframe.
    pub frame_src: Option<String>,
    pub page_url: String,
}

impl ChallengeDescriptor {
    pub fn none(page_url: impl Into<String>) -> Self {
        Self {
            kind: ChallengeKind::None,
            site_key: None,
            frame_src: None,
            page_url: page_url.into(),
        }
    }
}

/// Immutable value handed to the solver capability.
#[derive(Debug, Clone, Serialize)]
pub struct SolveRequest {
    pub kind: ChallengeKind,
    pub site_key: String,
    pub page_url: String,
}

/// Successful solver output: the proof token to inject.
#[derive(Debug, Clone, Deserialize)]
pub struct SolveResponse {
    pub token: String,
}

/// Login credentials for the target site. `Debug` redacts the secret so it
/// never leaks into logs or error reports.
#[derive(Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub identity: String,
    pub secret: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("identity", &self.identity)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepOutcome {
    Ok,
    Failed,
}

/// Audit record for one executed step. Append-only; the orchestrator owns
/// the sequence and hands it to the caller inside [`RunResult`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StepRecord {
    pub name: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcome: StepOutcome,
    pub artifacts: Vec<PathBuf>,
}

/// One extracted result item.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Listing {
    pub title: String,
    pub price: u64,
    pub link: String,
}

/// Terminal value of one orchestrated run. No further mutation after
/// construction.
#[derive(Debug, Serialize)]
pub struct RunResult {
    pub success: bool,
    pub listings: Vec<Listing>,
    pub steps: Vec<StepRecord>,
    pub failure: Option<Failure>,
}

/// Serializable projection of the terminal [`FlowError`] of a failed run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    PreconditionTimeout,
    ParameterExtraction,
    Solver,
    SubmissionRejected,
    SessionUnusable,
    Config,
    Other,
}

/// Classified errors for the whole flow.
#[derive(Debug, thiserror::Error)]
pub enum FlowError {
    /// An awaited page condition never became true. Recoverable by the
    /// caller via retry at the orchestrator level, not recovered locally.
    #[error("timed out after {timeout:?} waiting for: {what}")]
    PreconditionTimeout { what: String, timeout: Duration },

    /// Challenge parameters could not be located by any fallback strategy.
    /// Terminal: retrying without a different strategy cannot succeed.
    #[error("challenge parameters not found: {0}")]
    ParameterExtraction(String),

    /// The solver capability failed or returned no usable token.
    #[error("solver failure: {0}")]
    Solver(String),

    /// The challenge persisted after a full solve/inject/submit cycle.
    #[error("challenge persisted after submission")]
    SubmissionRejected,

    /// The browser session itself is in a bad state. Always terminal.
    #[error("browser session unusable: {0}")]
    SessionUnusable(String),

    /// Configuration was incomplete or invalid.
    #[error("configuration error: {0}")]
    Config(String),

    /// A lower-level failure re-wrapped with the step it occurred in.
    #[error("step `{step}` failed: {source}")]
    Step {
        step: String,
        #[source]
        source: Box<FlowError>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl FlowError {
    /// The serializable discriminant, looking through [`FlowError::Step`]
    /// wrapping so callers classify on the underlying cause.
    pub fn kind(&self) -> FailureKind {
        match self {
            FlowError::PreconditionTimeout { .. } => FailureKind::PreconditionTimeout,
            FlowError::ParameterExtraction(_) => FailureKind::ParameterExtraction,
            FlowError::Solver(_) => FailureKind::Solver,
            FlowError::SubmissionRejected => FailureKind::SubmissionRejected,
            FlowError::SessionUnusable(_) => FailureKind::SessionUnusable,
            FlowError::Config(_) => FailureKind::Config,
            FlowError::Step { source, .. } => source.kind(),
            FlowError::Other(_) => FailureKind::Other,
        }
    }

    pub fn into_failure(self) -> Failure {
        Failure {
            kind: self.kind(),
            message: self.to_string(),
        }
    }
}

/// Convenient alias for results that use [`FlowError`].
pub type Result<T> = std::result::Result<T, FlowError>;

/// Bounded retry configuration for the challenge resolver.
///
/// Plain configuration, not mutable state: every call site passes a policy
/// instead of hand-rolling a loop.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    per_attempt_timeout: Duration,
    backoff: Duration,
}

impl RetryPolicy {
    /// Build a policy. `max_attempts` of zero is rejected here so the
    /// invariant holds everywhere downstream.
    pub fn new(max_attempts: u32, per_attempt_timeout: Duration, backoff: Duration) -> Result<Self> {
        if max_attempts == 0 {
            return Err(FlowError::Config(
                "retry max_attempts must be at least 1".to_string(),
            ));
        }
        Ok(Self {
            max_attempts,
            per_attempt_timeout,
            backoff,
        })
    }

    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    pub fn per_attempt_timeout(&self) -> Duration {
        self.per_attempt_timeout
    }

    pub fn backoff(&self) -> Duration {
        self.backoff
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout: Duration::from_secs(120),
            backoff: Duration::from_secs(5),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retry_policy_rejects_zero_attempts() {
        let err = RetryPolicy::new(0, Duration::from_secs(1), Duration::ZERO).unwrap_err();
        assert_eq!(err.kind(), FailureKind::Config);
    }

    #[test]
    fn retry_policy_accepts_one_attempt() {
        let policy = RetryPolicy::new(1, Duration::from_secs(1), Duration::ZERO).unwrap();
        assert_eq!(policy.max_attempts(), 1);
    }

    #[test]
    fn step_wrapping_preserves_underlying_kind() {
        let inner = FlowError::Solver("no token".into());
        let wrapped = FlowError::Step {
            step: "resolve-challenge".into(),
            source: Box::new(inner),
        };
        assert_eq!(wrapped.kind(), FailureKind::Solver);
        let failure = wrapped.into_failure();
        assert!(failure.message.contains("resolve-challenge"));
        assert!(failure.message.contains("no token"));
    }

    #[test]
    fn credentials_debug_redacts_secret() {
        let creds = Credentials {
            identity: "user@example.com".into(),
            secret: "hunter2".into(),
        };
        let rendered = format!("{:?}", creds);
        assert!(rendered.contains("user@example.com"));
        assert!(!rendered.contains("hunter2"));
    }
}
