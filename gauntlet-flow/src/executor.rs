//! Uniform envelope around every step of the flow: precondition wait,
//! before/after diagnostic capture, timeout enforcement, and error
//! translation. Retries live one level up, in the resolver and the caller
//! of the orchestrator, never here.

use std::future::Future;
use std::path::PathBuf;
use std::time::Duration;

use chrono::Utc;
use gauntlet_browser::session::PageSession;
use gauntlet_common::{FlowError, Result, StepOutcome, StepRecord};
use tracing::{debug, error, info, warn};

use crate::artifacts::ArtifactRecorder;

/// Per-step options for [`StepExecutor::execute`].
#[derive(Debug, Clone, Copy, Default)]
pub struct StepOptions<'a> {
    /// Fallback chain that must resolve before the action runs.
    pub wait_for: Option<&'a [String]>,
    /// Bounds both the precondition wait and the action itself.
    pub timeout: Duration,
    /// When set, a missed precondition is logged and the action still runs
    /// instead of failing the step.
    pub optional: bool,
}

impl<'a> StepOptions<'a> {
    pub fn bounded(timeout: Duration) -> Self {
        Self {
            wait_for: None,
            timeout,
            optional: false,
        }
    }

    pub fn waiting_for(selectors: &'a [String], timeout: Duration) -> Self {
        Self {
            wait_for: Some(selectors),
            timeout,
            optional: false,
        }
    }
}

/// Runs actions against the browser session under a uniform diagnostic
/// envelope. Every invocation produces exactly one [`StepRecord`].
pub struct StepExecutor<'a> {
    session: &'a dyn PageSession,
    recorder: &'a ArtifactRecorder,
    records: Vec<StepRecord>,
}

impl<'a> StepExecutor<'a> {
    pub fn new(session: &'a dyn PageSession, recorder: &'a ArtifactRecorder) -> Self {
        Self {
            session,
            recorder,
            records: Vec::new(),
        }
    }

    pub fn records(&self) -> &[StepRecord] {
        &self.records
    }

    pub fn into_records(self) -> Vec<StepRecord> {
        self.records
    }

    /// Run `action` as the step named `name`. Failures come back wrapped
    /// with the step name; the underlying classification is preserved.
    pub async fn execute<T, F, Fut>(
        &mut self,
        name: &str,
        opts: StepOptions<'_>,
        action: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let started_at = Utc::now();
        let mut artifacts = Vec::new();
        info!(step = name, "starting step");

        let result = self.drive(name, &opts, action, &mut artifacts).await;

        self.records.push(StepRecord {
            name: name.to_string(),
            started_at,
            finished_at: Utc::now(),
            outcome: if result.is_ok() {
                StepOutcome::Ok
            } else {
                StepOutcome::Failed
            },
            artifacts,
        });

        match result {
            Ok(value) => {
                info!(step = name, "step finished");
                Ok(value)
            }
            Err(e) => {
                error!(step = name, error = %e, "step failed");
                Err(FlowError::Step {
                    step: name.to_string(),
                    source: Box::new(e),
                })
            }
        }
    }

    async fn drive<T, F, Fut>(
        &self,
        name: &str,
        opts: &StepOptions<'_>,
        action: F,
        artifacts: &mut Vec<PathBuf>,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        if let Some(selectors) = opts.wait_for {
            match self.session.wait_for_any(selectors, opts.timeout).await {
                Ok(matched) => debug!(step = name, %matched, "precondition met"),
                Err(e @ FlowError::PreconditionTimeout { .. }) if opts.optional => {
                    debug!(step = name, error = %e, "optional precondition not met, continuing");
                }
                Err(e) => {
                    self.capture(name, "error", artifacts).await;
                    self.report(name, &e, artifacts).await;
                    return Err(e);
                }
            }
        }

        self.capture(name, "before", artifacts).await;

        match tokio::time::timeout(opts.timeout, action()).await {
            Ok(Ok(value)) => {
                self.capture(name, "after", artifacts).await;
                Ok(value)
            }
            Ok(Err(e)) => {
                self.capture(name, "error", artifacts).await;
                self.report(name, &e, artifacts).await;
                Err(e)
            }
            Err(_) => {
                let e = FlowError::PreconditionTimeout {
                    what: format!("step `{name}` to settle"),
                    timeout: opts.timeout,
                };
                self.capture(name, "error", artifacts).await;
                self.report(name, &e, artifacts).await;
                Err(e)
            }
        }
    }

    /// Best-effort screenshot. A capture failure is logged and never masks
    /// the step's own outcome.
    async fn capture(&self, step: &str, phase: &str, artifacts: &mut Vec<PathBuf>) {
        let shot = match self.session.screenshot().await {
            Ok(bytes) => bytes,
            Err(e) => {
                warn!(step, phase, error = %e, "screenshot capture failed");
                return;
            }
        };
        match self.recorder.record_screenshot(&format!("{phase}-{step}"), &shot) {
            Ok(path) => artifacts.push(path),
            Err(e) => warn!(step, phase, error = %e, "screenshot write failed"),
        }
    }

    /// Best-effort structured error report with whatever page context the
    /// session can still provide.
    async fn report(&self, step: &str, error: &FlowError, artifacts: &mut Vec<PathBuf>) {
        let url = self.session.current_url().await.ok();
        let html = self.session.page_source().await.ok();
        match self
            .recorder
            .record_error_report(step, error, url.as_deref(), html.as_deref())
        {
            Ok(path) => artifacts.push(path),
            Err(e) => warn!(step, error = %e, "error report write failed"),
        }
    }
}
