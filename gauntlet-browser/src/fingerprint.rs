use rand::prelude::SliceRandom;

/// Snapshot of user agent, viewport, and locale characteristics presented
/// to the target site.
#[derive(Debug, Clone)]
pub struct UserAgentProfile {
    pub user_agent: String,
    pub viewport: (u32, u32),
    pub platform: String,
    pub languages: Vec<String>,
}

/// Small pool of plausible desktop profiles; one is picked per session and
/// then held stable so fingerprint signals stay consistent across steps.
#[derive(Debug, Clone)]
pub struct UserAgentManager {
    desktop_profiles: Vec<UserAgentProfile>,
    current: Option<UserAgentProfile>,
}

impl UserAgentManager {
    pub fn new() -> Self {
        Self {
            desktop_profiles: vec![
                UserAgentProfile {
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
                    viewport: (1920, 1080),
                    platform: "Win32".to_string(),
                    languages: vec!["en-US".to_string(), "en".to_string()],
                },
                UserAgentProfile {
                    user_agent: "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36".to_string(),
                    viewport: (1440, 900),
                    platform: "MacIntel".to_string(),
                    languages: vec!["en-US".to_string(), "en".to_string()],
                },
                UserAgentProfile {
                    user_agent: "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/125.0.0.0 Safari/537.36".to_string(),
                    viewport: (1366, 768),
                    platform: "Win32".to_string(),
                    languages: vec!["en-US".to_string(), "en".to_string()],
                },
            ],
            current: None,
        }
    }

    /// Get (or lazily select) the profile for this session.
    pub fn session_profile(&mut self) -> &UserAgentProfile {
        self.current.get_or_insert_with(|| {
            let mut rng = rand::thread_rng();
            self.desktop_profiles
                .choose(&mut rng)
                .cloned()
                .unwrap_or_else(|| self.desktop_profiles[0].clone())
        })
    }
}

impl Default for UserAgentManager {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn profile_is_stable_within_a_session() {
        let mut manager = UserAgentManager::new();
        let first = manager.session_profile().user_agent.clone();
        let second = manager.session_profile().user_agent.clone();
        assert_eq!(first, second);
    }
}
