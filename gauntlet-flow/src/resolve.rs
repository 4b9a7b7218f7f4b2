//! Challenge resolution state machine: detect → extract → solve → inject →
//! submit → confirm, with a bounded retry loop.
//!
//! Retries restart at detection rather than at solving: a rejected
//! submission usually means the challenge was re-issued with a fresh
//! parameter set, so re-detection must precede re-solving.

use std::time::Duration;

use gauntlet_browser::session::PageSession;
use gauntlet_common::{
    ChallengeDescriptor, FailureKind, FlowError, Result, RetryPolicy, SolveRequest,
};
use gauntlet_solver::CaptchaSolver;
use regex::Regex;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};
use url::Url;

use crate::detect::ChallengeDetector;

const SUBMIT_CLICK_TIMEOUT: Duration = Duration::from_secs(5);
const CONFIRM_PROBE_INTERVAL: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolverState {
    Idle,
    Detecting,
    ExtractingParams,
    Solving,
    Injecting,
    Submitting,
    Confirming,
    Resolved,
    Failed,
}

fn transition(state: &mut ResolverState, next: ResolverState) {
    debug!(from = ?state, to = ?next, "resolver transition");
    *state = next;
}

/// Selector chains the resolver works with. Response fields cover several
/// providers at once: provider detection is heuristic, so the token is
/// written into every known field rather than guessing one.
#[derive(Debug, Clone)]
pub struct ChallengeSelectors {
    /// Elements that may carry an explicit `data-sitekey`.
    pub sitekey_attr: Vec<String>,
    /// Hidden form fields that may hold the site key.
    pub sitekey_fields: Vec<String>,
    /// Token injection targets.
    pub response_fields: Vec<String>,
    pub submit_buttons: Vec<String>,
}

impl Default for ChallengeSelectors {
    fn default() -> Self {
        Self {
            sitekey_attr: vec![
                ".cf-turnstile".into(),
                ".h-captcha".into(),
                "[data-sitekey]".into(),
            ],
            sitekey_fields: vec![
                "input[name='sitekey']".into(),
                "input[name='data-sitekey']".into(),
            ],
            response_fields: vec![
                "textarea[name='cf-turnstile-response']".into(),
                "input[name='cf-turnstile-response']".into(),
                "textarea[name='h-captcha-response']".into(),
                "textarea[name='g-recaptcha-response']".into(),
            ],
            submit_buttons: vec!["button[type='submit']".into(), "input[type='submit']".into()],
        }
    }
}

pub struct ChallengeResolver<'a> {
    detector: &'a ChallengeDetector,
    solver: &'a dyn CaptchaSolver,
    policy: RetryPolicy,
    selectors: ChallengeSelectors,
    /// How long a submitted challenge gets to leave the page before the
    /// cycle counts as rejected.
    confirm_window: Duration,
}

impl<'a> ChallengeResolver<'a> {
    pub fn new(
        detector: &'a ChallengeDetector,
        solver: &'a dyn CaptchaSolver,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            detector,
            solver,
            policy,
            selectors: ChallengeSelectors::default(),
            confirm_window: Duration::from_secs(10),
        }
    }

    pub fn with_selectors(mut self, selectors: ChallengeSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_confirm_window(mut self, window: Duration) -> Self {
        self.confirm_window = window;
        self
    }

    /// Drive the state machine to `Resolved` or a terminal failure.
    ///
    /// Solver failures and rejected submissions consume attempts under the
    /// retry policy; parameter-extraction failures and an unusable session
    /// propagate immediately.
    pub async fn resolve(&self, session: &dyn PageSession) -> Result<()> {
        let mut state = ResolverState::Idle;
        let mut last_error: Option<FlowError> = None;

        for attempt in 1..=self.policy.max_attempts() {
            if attempt > 1 {
                debug!(attempt, backoff = ?self.policy.backoff(), "retrying challenge resolution");
                sleep(self.policy.backoff()).await;
            }

            transition(&mut state, ResolverState::Detecting);
            let descriptor = self.detector.detect(session).await?;
            if !descriptor.kind.is_present() {
                transition(&mut state, ResolverState::Resolved);
                return Ok(());
            }
            info!(kind = ?descriptor.kind, attempt, "challenge present");

            transition(&mut state, ResolverState::ExtractingParams);
            let site_key = self.extract_site_key(session, &descriptor).await?;

            transition(&mut state, ResolverState::Solving);
            let request = SolveRequest {
                kind: descriptor.kind,
                site_key,
                page_url: descriptor.page_url.clone(),
            };
            let token = match timeout(
                self.policy.per_attempt_timeout(),
                self.solver.solve(&request),
            )
            .await
            {
                Ok(Ok(response)) => response.token,
                Ok(Err(e)) if e.kind() == FailureKind::Solver => {
                    warn!(attempt, error = %e, "solver attempt failed");
                    last_error = Some(e);
                    continue;
                }
                Ok(Err(e)) => return Err(e),
                Err(_) => {
                    warn!(attempt, "solver attempt timed out");
                    last_error = Some(FlowError::Solver(format!(
                        "no token within {:?}",
                        self.policy.per_attempt_timeout()
                    )));
                    continue;
                }
            };

            transition(&mut state, ResolverState::Injecting);
            let written = session
                .set_value_all(&self.selectors.response_fields, &token)
                .await?;
            if written == 0 {
                warn!("no known response field on page; token had nowhere to go");
            }

            transition(&mut state, ResolverState::Submitting);
            if session
                .exists_any(&self.selectors.submit_buttons)
                .await?
                .is_some()
            {
                session
                    .click_any(&self.selectors.submit_buttons, SUBMIT_CLICK_TIMEOUT)
                    .await?;
            }

            transition(&mut state, ResolverState::Confirming);
            if self.challenge_gone(session, &descriptor).await? {
                transition(&mut state, ResolverState::Resolved);
                return Ok(());
            }
            warn!(attempt, "challenge persisted after submission");
            last_error = Some(FlowError::SubmissionRejected);
        }

        transition(&mut state, ResolverState::Failed);
        Err(last_error.unwrap_or(FlowError::SubmissionRejected))
    }

    /// Poll the detector until the submitted challenge leaves the page or
    /// the confirm window elapses. A different challenge kind counts as a
    /// changed page state, i.e. this cycle is done.
    async fn challenge_gone(
        &self,
        session: &dyn PageSession,
        descriptor: &ChallengeDescriptor,
    ) -> Result<bool> {
        let deadline = Instant::now() + self.confirm_window;
        loop {
            let current = self.detector.detect(session).await?;
            if current.kind != descriptor.kind {
                return Ok(true);
            }
            if Instant::now() >= deadline {
                return Ok(false);
            }
            sleep(CONFIRM_PROBE_INTERVAL).await;
        }
    }

    /// Ordered fallback chain for the site key. First non-empty match wins.
    /// Exhausting the chain is terminal: retrying without a different
    /// strategy cannot succeed.
    async fn extract_site_key(
        &self,
        session: &dyn PageSession,
        descriptor: &ChallengeDescriptor,
    ) -> Result<String> {
        if let Some(key) = descriptor.site_key.as_deref().filter(|k| !k.is_empty()) {
            return Ok(key.to_string());
        }

        if let Some(key) = session
            .attr_any(&self.selectors.sitekey_attr, "data-sitekey")
            .await?
            .filter(|k| !k.is_empty())
        {
            debug!(strategy = "attribute", "site key extracted");
            return Ok(key);
        }

        let mut frames = Vec::new();
        if let Some(src) = &descriptor.frame_src {
            frames.push(src.clone());
        }
        frames.extend(session.frame_sources().await?);
        for src in &frames {
            if let Some(key) = site_key_from_frame_url(src) {
                debug!(strategy = "frame-url", "site key extracted");
                return Ok(key);
            }
        }

        for selector in &self.selectors.sitekey_fields {
            if let Some(value) = session.read_value(selector).await?.filter(|v| !v.is_empty()) {
                debug!(strategy = "form-field", "site key extracted");
                return Ok(value);
            }
        }

        if let Some(key) = site_key_from_source(&session.page_source().await?) {
            debug!(strategy = "script-scan", "site key extracted");
            return Ok(key);
        }

        Err(FlowError::ParameterExtraction(
            "no site key via attribute, frame url, form field, or script scan".to_string(),
        ))
    }
}

/// Site key from a challenge frame URL: a `sitekey`/`k` query parameter, or
/// the `0x…` path segment Turnstile embeds.
fn site_key_from_frame_url(src: &str) -> Option<String> {
    let url = Url::parse(src).ok()?;
    if let Some(key) = url
        .query_pairs()
        .find(|(k, _)| k == "sitekey" || k == "k")
        .map(|(_, v)| v.into_owned())
        .filter(|v| !v.is_empty())
    {
        return Some(key);
    }
    url.path_segments()?
        .find(|seg| seg.starts_with("0x") && seg.len() > 10)
        .map(|seg| seg.to_string())
}

/// Last-resort scan of inline markup/scripts for a site key literal.
fn site_key_from_source(html: &str) -> Option<String> {
    let attr = Regex::new(r#"data-sitekey\s*=\s*["']([0-9A-Za-z_-]{8,})["']"#).ok()?;
    if let Some(caps) = attr.captures(html) {
        return Some(caps[1].to_string());
    }
    let literal = Regex::new(r#"["']sitekey["']\s*:\s*["']([0-9A-Za-z_-]{8,})["']"#).ok()?;
    literal.captures(html).map(|caps| caps[1].to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_url_query_parameter_wins() {
        let key = site_key_from_frame_url(
            "https://newassets.hcaptcha.com/captcha/v1/abc/static?sitekey=ae73173b-7003-44e0",
        );
        assert_eq!(key.as_deref(), Some("ae73173b-7003-44e0"));

        let key = site_key_from_frame_url("https://example.com/anchor?k=6LcAbCdE&co=xyz");
        assert_eq!(key.as_deref(), Some("6LcAbCdE"));
    }

    #[test]
    fn turnstile_path_segment_is_recognised() {
        let key = site_key_from_frame_url(
            "https://challenges.cloudflare.com/cdn-cgi/challenge-platform/h/b/turnstile/if/ov2/0x4AAAAAAABkMYinukE8nzY/light/normal",
        );
        assert_eq!(key.as_deref(), Some("0x4AAAAAAABkMYinukE8nzY"));
    }

    #[test]
    fn unparsable_frame_src_yields_nothing() {
        assert_eq!(site_key_from_frame_url("not a url"), None);
        assert_eq!(site_key_from_frame_url("https://example.com/"), None);
    }

    #[test]
    fn script_scan_finds_attribute_and_literal_forms() {
        let html = r#"<div class="cf-turnstile" data-sitekey="0x4AAAAAAA1234"></div>"#;
        assert_eq!(site_key_from_source(html).as_deref(), Some("0x4AAAAAAA1234"));

        let html = r#"<script>turnstile.render('#c', { 'sitekey': 'key_from_script_9', theme: 'light' });</script>"#;
        assert_eq!(
            site_key_from_source(html).as_deref(),
            Some("key_from_script_9")
        );

        assert_eq!(site_key_from_source("<html></html>"), None);
    }
}
