//! Challenge detection: an ordered list of independent strategies run as a
//! snapshot probe against the current page. Structural signals (container
//! elements, hosted frames) come before textual heuristics, which are more
//! prone to false positives from localised or paraphrased copy.

use gauntlet_browser::session::PageSession;
use gauntlet_common::{ChallengeDescriptor, ChallengeKind, Result};
use tracing::debug;

/// Markers each strategy probes for. Defaults cover the providers the flow
/// has been seen to hit; extend via config when a deployment differs.
#[derive(Debug, Clone)]
pub struct DetectionRules {
    pub turnstile_containers: Vec<String>,
    pub hcaptcha_containers: Vec<String>,
    /// Substring of a frame `src` → the provider it implies.
    pub frame_patterns: Vec<(String, ChallengeKind)>,
    /// Lowercase page-text phrases implying a verification interstitial.
    pub text_phrases: Vec<String>,
}

impl Default for DetectionRules {
    fn default() -> Self {
        Self {
            turnstile_containers: vec![
                ".cf-turnstile".into(),
                "#cf-chl-widget".into(),
                "div[data-sitekey][data-action]".into(),
            ],
            hcaptcha_containers: vec![
                ".h-captcha".into(),
                ".hcaptcha-box".into(),
                "[data-hcaptcha-widget-id]".into(),
            ],
            frame_patterns: vec![
                ("challenges.cloudflare.com".into(), ChallengeKind::Turnstile),
                ("/turnstile/".into(), ChallengeKind::Turnstile),
                ("hcaptcha.com".into(), ChallengeKind::Hcaptcha),
            ],
            text_phrases: vec![
                "verify you are human".into(),
                "verifying you are human".into(),
                "checking your browser before accessing".into(),
                "please complete the security check".into(),
                "prove you are human".into(),
                "checking if the site connection is secure".into(),
            ],
        }
    }
}

pub struct ChallengeDetector {
    rules: DetectionRules,
}

impl ChallengeDetector {
    pub fn new(rules: DetectionRules) -> Self {
        Self { rules }
    }

    /// Snapshot check for a challenge on the current page. Never waits and
    /// never fails for "nothing found"; only an unusable session errors.
    pub async fn detect(&self, session: &dyn PageSession) -> Result<ChallengeDescriptor> {
        let page_url = session.current_url().await?;

        // Strategy 1: known container elements.
        if session
            .exists_any(&self.rules.turnstile_containers)
            .await?
            .is_some()
        {
            debug!(%page_url, "challenge container matched: turnstile");
            return Ok(ChallengeDescriptor {
                kind: ChallengeKind::Turnstile,
                site_key: None,
                frame_src: None,
                page_url,
            });
        }
        if session
            .exists_any(&self.rules.hcaptcha_containers)
            .await?
            .is_some()
        {
            debug!(%page_url, "challenge container matched: hcaptcha");
            return Ok(ChallengeDescriptor {
                kind: ChallengeKind::Hcaptcha,
                site_key: None,
                frame_src: None,
                page_url,
            });
        }

        // Strategy 2: challenge-hosting frames.
        for src in session.frame_sources().await? {
            for (needle, kind) in &self.rules.frame_patterns {
                if src.contains(needle.as_str()) {
                    debug!(%page_url, frame = %src, ?kind, "challenge frame matched");
                    return Ok(ChallengeDescriptor {
                        kind: *kind,
                        site_key: None,
                        frame_src: Some(src),
                        page_url,
                    });
                }
            }
        }

        // Strategy 3: textual heuristics. Provider stays unknown.
        let text = session.page_text().await?.to_lowercase();
        for phrase in &self.rules.text_phrases {
            if text.contains(phrase.as_str()) {
                debug!(%page_url, %phrase, "verification phrase matched");
                return Ok(ChallengeDescriptor {
                    kind: ChallengeKind::Unknown,
                    site_key: None,
                    frame_src: None,
                    page_url,
                });
            }
        }

        Ok(ChallengeDescriptor::none(page_url))
    }
}

impl Default for ChallengeDetector {
    fn default() -> Self {
        Self::new(DetectionRules::default())
    }
}
