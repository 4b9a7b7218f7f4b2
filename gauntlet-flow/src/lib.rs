//! The challenge-resolution and resilient-step orchestration engine.
//!
//! One run drives a browser session through navigation, an optional
//! anti-bot challenge, credential submission, and result extraction. Every
//! stage goes through the [`executor::StepExecutor`] so it gets the same
//! precondition wait, diagnostic capture, timeout, and error wrapping; the
//! [`resolve::ChallengeResolver`] owns the only retry loop.
//!
//! - [`artifacts::ArtifactRecorder`]: screenshots and error reports per step
//! - [`detect::ChallengeDetector`]: ordered detection strategies
//! - [`resolve::ChallengeResolver`]: detect → extract → solve → inject →
//!   submit → confirm state machine
//! - [`run::FlowOrchestrator`]: the full sequenced flow and [`gauntlet_common::RunResult`]

pub mod artifacts;
pub mod detect;
pub mod executor;
pub mod resolve;
pub mod run;
