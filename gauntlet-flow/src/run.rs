//! The full orchestrated flow: navigate, clear any challenge, optionally log
//! in, apply the price filter, extract results. Each stage runs through the
//! [`StepExecutor`] envelope; the session is closed on every exit path.

use std::time::Duration;

use gauntlet_browser::session::{ListingSelectors, PageSession, RawListing};
use gauntlet_common::{Credentials, Listing, Result, RetryPolicy, RunResult};
use gauntlet_solver::CaptchaSolver;
use tracing::{info, warn};

use crate::artifacts::ArtifactRecorder;
use crate::detect::ChallengeDetector;
use crate::executor::{StepExecutor, StepOptions};
use crate::resolve::{ChallengeResolver, ChallengeSelectors};

/// Per-run inputs, as opposed to the orchestrator's own wiring.
#[derive(Debug, Clone)]
pub struct RunParams {
    pub target_url: String,
    pub credentials: Option<Credentials>,
    /// Inclusive upper bound applied to extracted listings.
    pub max_price: u64,
}

/// Fallback chains for every element the flow touches. Defaults match the
/// deployments this has run against; override any chain via config.
#[derive(Debug, Clone)]
pub struct FlowSelectors {
    /// Signals the landing page rendered its primary content.
    pub main_content: Vec<String>,
    /// Signals a challenge interstitial rendered instead.
    pub challenge_frame: Vec<String>,
    pub identity_input: Vec<String>,
    pub secret_input: Vec<String>,
    pub confirm_checkbox: Vec<String>,
    pub submit_button: Vec<String>,
    /// Empty chain disables the price-filter stage entirely.
    pub price_filter: Vec<String>,
    pub listings: ListingSelectors,
    pub challenge: ChallengeSelectors,
}

impl Default for FlowSelectors {
    fn default() -> Self {
        Self {
            main_content: vec!["#main_content".into(), ".main_content".into(), "main".into()],
            challenge_frame: vec![
                "iframe[src*='hcaptcha']".into(),
                "iframe[src*='turnstile']".into(),
                "iframe[src*='challenges.cloudflare.com']".into(),
            ],
            identity_input: vec![
                "input[type='email']".into(),
                "input[name='email']".into(),
                "input[type='text']".into(),
            ],
            secret_input: vec!["input[type='password']".into()],
            confirm_checkbox: vec!["input[type='checkbox']".into()],
            submit_button: vec!["button[type='submit']".into()],
            price_filter: vec![
                "input[data-test-id='price-to']".into(),
                "input[name='price_to']".into(),
            ],
            listings: ListingSelectors {
                item: vec!["[data-test-id='feed-item']".into()],
                title: vec!["[data-test-id='title']".into()],
                price: vec!["[data-test-id='price']".into()],
                link: vec!["a[href^='/vehicles/cars/']".into(), "a[href]".into()],
            },
            challenge: ChallengeSelectors::default(),
        }
    }
}

/// Stage timeouts, shortest to longest. Short covers single interactions,
/// medium covers form round-trips, long covers full page loads.
#[derive(Debug, Clone, Copy)]
pub struct StageTimeouts {
    pub short: Duration,
    pub medium: Duration,
    pub long: Duration,
}

impl Default for StageTimeouts {
    fn default() -> Self {
        Self {
            short: Duration::from_secs(5),
            medium: Duration::from_secs(15),
            long: Duration::from_secs(30),
        }
    }
}

pub struct FlowOrchestrator {
    detector: ChallengeDetector,
    policy: RetryPolicy,
    selectors: FlowSelectors,
    timeouts: StageTimeouts,
    recorder: ArtifactRecorder,
}

impl FlowOrchestrator {
    pub fn new(recorder: ArtifactRecorder) -> Self {
        Self {
            detector: ChallengeDetector::default(),
            policy: RetryPolicy::default(),
            selectors: FlowSelectors::default(),
            timeouts: StageTimeouts::default(),
            recorder,
        }
    }

    pub fn with_detector(mut self, detector: ChallengeDetector) -> Self {
        self.detector = detector;
        self
    }

    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn with_selectors(mut self, selectors: FlowSelectors) -> Self {
        self.selectors = selectors;
        self
    }

    pub fn with_timeouts(mut self, timeouts: StageTimeouts) -> Self {
        self.timeouts = timeouts;
        self
    }

    /// Run the flow to completion. Never panics and never returns early
    /// without closing the session; all outcomes land in the [`RunResult`].
    pub async fn run(
        &self,
        session: &dyn PageSession,
        solver: &dyn CaptchaSolver,
        params: &RunParams,
    ) -> RunResult {
        let mut executor = StepExecutor::new(session, &self.recorder);
        let outcome = self.drive(session, solver, params, &mut executor).await;

        if let Err(e) = session.close().await {
            warn!(error = %e, "session close failed");
        }

        let (listings, failure) = match outcome {
            Ok(listings) => (listings, None),
            Err(e) => (Vec::new(), Some(e.into_failure())),
        };
        RunResult {
            success: failure.is_none(),
            listings,
            steps: executor.into_records(),
            failure,
        }
    }

    async fn drive(
        &self,
        session: &dyn PageSession,
        solver: &dyn CaptchaSolver,
        params: &RunParams,
        executor: &mut StepExecutor<'_>,
    ) -> Result<Vec<Listing>> {
        let sel = &self.selectors;

        // The landing page is "ready" when either the real content or a
        // challenge interstitial has rendered.
        let mut ready = sel.main_content.clone();
        ready.extend(sel.challenge_frame.iter().cloned());
        executor
            .execute(
                "navigate",
                StepOptions::bounded(self.timeouts.long * 2),
                || async {
                    session.navigate(&params.target_url).await?;
                    session.wait_for_any(&ready, self.timeouts.long).await?;
                    Ok(())
                },
            )
            .await?;

        // Cheap probe outside the step envelope; an absent challenge should
        // not produce a resolve step in the audit trail.
        let probe = self.detector.detect(session).await?;
        if probe.kind.is_present() {
            info!(kind = ?probe.kind, "challenge detected, resolving");
            let resolver = ChallengeResolver::new(&self.detector, solver, self.policy.clone())
                .with_selectors(sel.challenge.clone());
            let budget = self.resolution_budget();
            executor
                .execute("resolve-challenge", StepOptions::bounded(budget), || async {
                    resolver.resolve(session).await
                })
                .await?;
        }

        if let Some(credentials) = &params.credentials {
            executor
                .execute(
                    "fill-credentials",
                    StepOptions::waiting_for(&sel.identity_input, self.timeouts.medium),
                    || async {
                        session
                            .type_any(&sel.identity_input, &credentials.identity, self.timeouts.short)
                            .await?;
                        session
                            .type_any(&sel.secret_input, &credentials.secret, self.timeouts.short)
                            .await?;
                        // Remember-me style checkboxes are not always there.
                        if session.exists_any(&sel.confirm_checkbox).await?.is_some() {
                            session
                                .click_any(&sel.confirm_checkbox, self.timeouts.short)
                                .await?;
                        }
                        Ok(())
                    },
                )
                .await?;

            executor
                .execute(
                    "submit",
                    StepOptions::bounded(self.timeouts.long),
                    || async {
                        session
                            .click_any(&sel.submit_button, self.timeouts.short)
                            .await?;
                        // Some targets stay on the same document after login;
                        // a missing content signal is not a failed submit.
                        if let Err(e) = session
                            .wait_for_any(&sel.main_content, self.timeouts.medium)
                            .await
                        {
                            warn!(error = %e, "no content signal after submit");
                        }
                        Ok(())
                    },
                )
                .await?;
        }

        if !sel.price_filter.is_empty() {
            executor
                .execute(
                    "apply-price-filter",
                    StepOptions::waiting_for(&sel.price_filter, self.timeouts.medium),
                    || async {
                        session
                            .click_any(&sel.price_filter, self.timeouts.short)
                            .await?;
                        session
                            .type_any(
                                &sel.price_filter,
                                &params.max_price.to_string(),
                                self.timeouts.short,
                            )
                            .await?;
                        session.press_enter(&sel.price_filter).await?;
                        Ok(())
                    },
                )
                .await?;
        }

        let raw = executor
            .execute(
                "extract-results",
                StepOptions::waiting_for(&sel.listings.item, self.timeouts.long),
                || async { session.collect_listings(&sel.listings).await },
            )
            .await?;

        let listings = project_listings(raw, params.max_price);
        info!(count = listings.len(), max_price = params.max_price, "extraction finished");
        Ok(listings)
    }

    /// Upper bound for the whole resolution step: every attempt may spend a
    /// full solve timeout plus backoff, plus slack for page interactions.
    fn resolution_budget(&self) -> Duration {
        let per_attempt = self.policy.per_attempt_timeout() + self.policy.backoff();
        per_attempt * self.policy.max_attempts() + Duration::from_secs(60)
    }
}

/// Digits-only price normalisation. Anything unparsable comes out as zero,
/// which keeps the item under any non-negative price cap.
pub fn normalize_price(text: &str) -> u64 {
    let digits: String = text.chars().filter(|c| c.is_ascii_digit()).collect();
    digits.parse().unwrap_or(0)
}

/// Project raw page items into output listings, keeping those at or under
/// `max_price`.
pub fn project_listings(raw: Vec<RawListing>, max_price: u64) -> Vec<Listing> {
    raw.into_iter()
        .map(|item| Listing {
            title: item.title,
            price: normalize_price(&item.price_text),
            link: item.link,
        })
        .filter(|listing| listing.price <= max_price)
        .collect()
}
