use std::collections::HashMap;

use anyhow::{Context, Result};
use fantoccini::ClientBuilder;
use gauntlet_common::StealthLevel;
use serde_json::json;
use webdriver::capabilities::Capabilities;

use crate::{
    behavioral::BehavioralEngine,
    fingerprint::UserAgentManager,
    page::WebDriverSession,
    stealth::build_stealth_arguments,
};

/// WebDriver bootstrap: connects to a running chromedriver with stealth
/// capabilities and hands out the page session the flow engine drives.
pub struct GauntletDriver {
    session: WebDriverSession,
}

impl GauntletDriver {
    /// Connect to the WebDriver service at `webdriver_url` (chromedriver's
    /// default is `http://localhost:9515`).
    pub async fn new(webdriver_url: &str, headless: bool, stealth: StealthLevel) -> Result<Self> {
        let mut caps = Capabilities::new();
        let mut chrome_opts = HashMap::new();

        let mut user_agents = UserAgentManager::new();
        let profile = user_agents.session_profile().clone();

        let mut args = build_stealth_arguments(&stealth, &profile);
        if headless {
            args.push("--headless=new".to_string());
            args.push("--disable-gpu".to_string());
        }
        chrome_opts.insert("args".to_string(), json!(args));
        caps.insert("goog:chromeOptions".to_string(), json!(chrome_opts));

        let client = ClientBuilder::native()
            .capabilities(caps)
            .connect(webdriver_url)
            .await
            .with_context(|| format!("failed to connect to WebDriver at {webdriver_url}"))?;

        let session = WebDriverSession::new(client, stealth, BehavioralEngine::new());
        Ok(Self { session })
    }

    /// Hand out the page session. The caller owns closing it, exactly once.
    pub fn into_session(self) -> WebDriverSession {
        self.session
    }
}
