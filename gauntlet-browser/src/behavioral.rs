use std::time::Duration;

use fantoccini::elements::Element;
use gauntlet_common::Result;
use rand::rngs::OsRng;
use rand::Rng;
use tokio::time::sleep;

/// Produces human-like delays and typing behavior to reduce automation
/// signals.
#[derive(Debug, Clone)]
pub struct BehavioralEngine {}

impl BehavioralEngine {
    pub fn new() -> Self {
        Self {}
    }

    /// Sleep for a random duration between `min` and `max` milliseconds.
    pub async fn random_delay(&self, min: u64, max: u64) {
        let mut rng = OsRng;
        let ms = rng.gen_range(min..=max);
        sleep(Duration::from_millis(ms)).await;
    }

    /// Type the provided text with small random delays between characters.
    pub async fn type_text_human_like(&self, element: &Element, text: &str) -> Result<()> {
        for ch in text.chars() {
            element
                .send_keys(&ch.to_string())
                .await
                .map_err(|e| gauntlet_common::FlowError::Other(anyhow::Error::new(e)))?;
            self.random_delay(30, 150).await;
        }
        Ok(())
    }
}

impl Default for BehavioralEngine {
    fn default() -> Self {
        Self::new()
    }
}
