//! The Browser Session capability consumed by the flow engine.
//!
//! No single selector is trusted: every selector-bearing operation takes an
//! ordered list of equivalent selectors (a fallback chain) and succeeds iff
//! at least one of them resolves within the timeout.

use std::time::Duration;

use async_trait::async_trait;
use gauntlet_common::Result;

/// Fallback chains used to project a page's result list into output items.
#[derive(Debug, Clone)]
pub struct ListingSelectors {
    /// Container of one result item.
    pub item: Vec<String>,
    /// Title element within an item.
    pub title: Vec<String>,
    /// Price element within an item.
    pub price: Vec<String>,
    /// Anchor within an item; its `href` becomes the link.
    pub link: Vec<String>,
}

/// One result item as read off the page, before normalisation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawListing {
    pub title: String,
    pub price_text: String,
    pub link: String,
}

/// Abstract page session. Implemented by [`crate::page::WebDriverSession`]
/// for real runs and by in-memory fakes in tests.
#[async_trait]
pub trait PageSession: Send + Sync {
    async fn navigate(&self, url: &str) -> Result<()>;

    async fn current_url(&self) -> Result<String>;

    /// Visible text of the page body.
    async fn page_text(&self) -> Result<String>;

    /// Full HTML source.
    async fn page_source(&self) -> Result<String>;

    /// Block until one selector in the chain resolves, returning the one
    /// that matched. Fails with `PreconditionTimeout` on elapse.
    async fn wait_for_any(&self, selectors: &[String], timeout: Duration) -> Result<String>;

    /// Snapshot probe: which selector in the chain matches right now, if
    /// any. Never waits and never fails for "not found".
    async fn exists_any(&self, selectors: &[String]) -> Result<Option<String>>;

    async fn click_any(&self, selectors: &[String], timeout: Duration) -> Result<()>;

    async fn type_any(&self, selectors: &[String], text: &str, timeout: Duration) -> Result<()>;

    /// Send Enter to the first matching element.
    async fn press_enter(&self, selectors: &[String]) -> Result<()>;

    /// Read an attribute off the first matching element.
    async fn attr_any(&self, selectors: &[String], attr: &str) -> Result<Option<String>>;

    /// Current `value` property of the element at `selector`.
    async fn read_value(&self, selector: &str) -> Result<Option<String>>;

    /// Overwrite the `value` of every element matching any selector in the
    /// chain. Idempotent; returns the number of fields written.
    async fn set_value_all(&self, selectors: &[String], value: &str) -> Result<usize>;

    /// `src` of every iframe on the page.
    async fn frame_sources(&self) -> Result<Vec<String>>;

    async fn screenshot(&self) -> Result<Vec<u8>>;

    async fn collect_listings(&self, selectors: &ListingSelectors) -> Result<Vec<RawListing>>;

    /// Close the underlying session. Callers invoke this exactly once per
    /// run, on every exit path.
    async fn close(&self) -> Result<()>;
}
