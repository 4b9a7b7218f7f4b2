use std::time::Duration;

use async_trait::async_trait;
use fantoccini::{elements::Element, error::CmdError, key::Key, Client, Locator};
use gauntlet_common::{FlowError, Result, StealthLevel};
use serde_json::json;
use tokio::time::{sleep, Instant};
use tracing::debug;

use crate::{
    behavioral::BehavioralEngine,
    session::{ListingSelectors, PageSession, RawListing},
    stealth::StealthScripts,
};

const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Fantoccini-backed implementation of [`PageSession`].
pub struct WebDriverSession {
    client: Client,
    stealth: StealthLevel,
    behavioral: BehavioralEngine,
}

impl WebDriverSession {
    pub fn new(client: Client, stealth: StealthLevel, behavioral: BehavioralEngine) -> Self {
        Self {
            client,
            stealth,
            behavioral,
        }
    }

    /// Translate a WebDriver failure into the flow taxonomy. A lost
    /// connection or dead session window means the whole session is gone;
    /// anything else stays an opaque driver error.
    fn classify(e: CmdError) -> FlowError {
        match e {
            CmdError::Lost(io) => FlowError::SessionUnusable(io.to_string()),
            other => {
                let msg = other.to_string();
                if msg.contains("no such window")
                    || msg.contains("invalid session")
                    || msg.contains("session not created")
                    || msg.contains("chrome not reachable")
                {
                    FlowError::SessionUnusable(msg)
                } else {
                    FlowError::Other(anyhow::Error::new(other))
                }
            }
        }
    }

    /// Find the first element resolvable through the fallback chain,
    /// returning the selector that matched alongside it.
    async fn find_first(&self, selectors: &[String]) -> Result<Option<(String, Element)>> {
        for selector in selectors {
            match self.client.find(Locator::Css(selector)).await {
                Ok(element) => return Ok(Some((selector.clone(), element))),
                Err(e) if e.is_no_such_element() => continue,
                Err(e) => return Err(Self::classify(e)),
            }
        }
        Ok(None)
    }

    async fn apply_stealth(&self) -> Result<()> {
        self.client
            .execute(StealthScripts::core_evasions(), vec![])
            .await
            .map_err(Self::classify)?;
        match self.stealth {
            StealthLevel::Lightweight => {}
            StealthLevel::Balanced => {
                self.client
                    .execute(StealthScripts::canvas_evasions(), vec![])
                    .await
                    .map_err(Self::classify)?;
            }
            StealthLevel::Maximum => {
                self.client
                    .execute(StealthScripts::canvas_evasions(), vec![])
                    .await
                    .map_err(Self::classify)?;
                self.client
                    .execute(StealthScripts::webgl_evasions(), vec![])
                    .await
                    .map_err(Self::classify)?;
            }
        }
        Ok(())
    }

    /// First non-empty text found through the chain, relative to `element`.
    async fn child_text(&self, element: &Element, selectors: &[String]) -> Result<String> {
        for selector in selectors {
            match element.find(Locator::Css(selector)).await {
                Ok(child) => {
                    let text = child.text().await.map_err(Self::classify)?;
                    if !text.trim().is_empty() {
                        return Ok(text.trim().to_string());
                    }
                }
                Err(e) if e.is_no_such_element() => continue,
                Err(e) => return Err(Self::classify(e)),
            }
        }
        Ok(String::new())
    }

    async fn child_href(&self, element: &Element, selectors: &[String]) -> Result<String> {
        for selector in selectors {
            match element.find(Locator::Css(selector)).await {
                Ok(child) => {
                    if let Some(href) = child.attr("href").await.map_err(Self::classify)? {
                        return Ok(href);
                    }
                }
                Err(e) if e.is_no_such_element() => continue,
                Err(e) => return Err(Self::classify(e)),
            }
        }
        Ok(String::new())
    }
}

#[async_trait]
impl PageSession for WebDriverSession {
    async fn navigate(&self, url: &str) -> Result<()> {
        self.behavioral.random_delay(300, 1200).await;
        self.client.goto(url).await.map_err(Self::classify)?;
        self.apply_stealth().await
    }

    async fn current_url(&self) -> Result<String> {
        self.client
            .current_url()
            .await
            .map(|u| u.to_string())
            .map_err(Self::classify)
    }

    async fn page_text(&self) -> Result<String> {
        let value = self
            .client
            .execute("return document.body ? document.body.innerText : '';", vec![])
            .await
            .map_err(Self::classify)?;
        Ok(value.as_str().unwrap_or_default().to_string())
    }

    async fn page_source(&self) -> Result<String> {
        self.client.source().await.map_err(Self::classify)
    }

    async fn wait_for_any(&self, selectors: &[String], timeout: Duration) -> Result<String> {
        let deadline = Instant::now() + timeout;
        loop {
            if let Some(matched) = self.exists_any(selectors).await? {
                return Ok(matched);
            }
            if Instant::now() >= deadline {
                return Err(FlowError::PreconditionTimeout {
                    what: selectors.join(", "),
                    timeout,
                });
            }
            sleep(PROBE_INTERVAL).await;
        }
    }

    async fn exists_any(&self, selectors: &[String]) -> Result<Option<String>> {
        Ok(self.find_first(selectors).await?.map(|(sel, _)| sel))
    }

    async fn click_any(&self, selectors: &[String], timeout: Duration) -> Result<()> {
        let matched = self.wait_for_any(selectors, timeout).await?;
        let Some((_, element)) = self.find_first(std::slice::from_ref(&matched)).await? else {
            // Matched a moment ago but gone now; surface as a timeout so the
            // caller can retry at its own level.
            return Err(FlowError::PreconditionTimeout {
                what: matched,
                timeout,
            });
        };
        self.behavioral.random_delay(100, 400).await;
        element.click().await.map_err(Self::classify)?;
        Ok(())
    }

    async fn type_any(&self, selectors: &[String], text: &str, timeout: Duration) -> Result<()> {
        let matched = self.wait_for_any(selectors, timeout).await?;
        let Some((_, element)) = self.find_first(std::slice::from_ref(&matched)).await? else {
            return Err(FlowError::PreconditionTimeout {
                what: matched,
                timeout,
            });
        };
        element.clear().await.map_err(Self::classify)?;
        self.behavioral.type_text_human_like(&element, text).await
    }

    async fn press_enter(&self, selectors: &[String]) -> Result<()> {
        if let Some((selector, element)) = self.find_first(selectors).await? {
            debug!(%selector, "sending Enter");
            let enter: char = Key::Enter.into();
            element
                .send_keys(&enter.to_string())
                .await
                .map_err(Self::classify)?;
        }
        Ok(())
    }

    async fn attr_any(&self, selectors: &[String], attr: &str) -> Result<Option<String>> {
        if let Some((_, element)) = self.find_first(selectors).await? {
            return element.attr(attr).await.map_err(Self::classify);
        }
        Ok(None)
    }

    async fn read_value(&self, selector: &str) -> Result<Option<String>> {
        match self.client.find(Locator::Css(selector)).await {
            Ok(element) => element.prop("value").await.map_err(Self::classify),
            Err(e) if e.is_no_such_element() => Ok(None),
            Err(e) => Err(Self::classify(e)),
        }
    }

    async fn set_value_all(&self, selectors: &[String], value: &str) -> Result<usize> {
        let script = r#"
            let count = 0;
            for (const sel of arguments[0]) {
                for (const el of document.querySelectorAll(sel)) {
                    el.value = arguments[1];
                    el.dispatchEvent(new Event('input', { bubbles: true }));
                    count++;
                }
            }
            return count;
        "#;
        let result = self
            .client
            .execute(script, vec![json!(selectors), json!(value)])
            .await
            .map_err(Self::classify)?;
        Ok(result.as_u64().unwrap_or(0) as usize)
    }

    async fn frame_sources(&self) -> Result<Vec<String>> {
        let result = self
            .client
            .execute(
                "return Array.from(document.querySelectorAll('iframe')).map(f => f.src || '');",
                vec![],
            )
            .await
            .map_err(Self::classify)?;
        Ok(result
            .as_array()
            .map(|arr| {
                arr.iter()
                    .filter_map(|v| v.as_str())
                    .filter(|s| !s.is_empty())
                    .map(|s| s.to_string())
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn screenshot(&self) -> Result<Vec<u8>> {
        self.client.screenshot().await.map_err(Self::classify)
    }

    async fn collect_listings(&self, selectors: &ListingSelectors) -> Result<Vec<RawListing>> {
        let mut items = Vec::new();
        for selector in &selectors.item {
            items = self
                .client
                .find_all(Locator::Css(selector))
                .await
                .map_err(Self::classify)?;
            if !items.is_empty() {
                break;
            }
        }

        let mut listings = Vec::with_capacity(items.len());
        for item in &items {
            listings.push(RawListing {
                title: self.child_text(item, &selectors.title).await?,
                price_text: self.child_text(item, &selectors.price).await?,
                link: self.child_href(item, &selectors.link).await?,
            });
        }
        Ok(listings)
    }

    async fn close(&self) -> Result<()> {
        self.client.clone().close().await.map_err(Self::classify)
    }
}
