//! Wiring from the typed configuration to one runnable flow.

use std::time::Duration;

use anyhow::Result;
use gauntlet_browser::driver::GauntletDriver;
use gauntlet_common::RunResult;
use gauntlet_config::GauntletConfig;
use gauntlet_flow::artifacts::ArtifactRecorder;
use gauntlet_flow::run::{FlowOrchestrator, FlowSelectors, RunParams, StageTimeouts};
use gauntlet_solver::{CaptchaSolver, TwoCaptchaClient};
use tracing::{info, warn};

/// Balance under which a solve is likely to be rejected mid-run.
const LOW_BALANCE: f64 = 1.0;

/// Build everything from config, drive the flow once, and hand back the
/// terminal result. The session is opened here and closed by the flow.
pub async fn run_once(cfg: &GauntletConfig) -> Result<RunResult> {
    let solver = TwoCaptchaClient::new(
        cfg.solver.api_key.clone(),
        Some(cfg.solver.endpoint.clone()),
        Duration::from_secs(cfg.solver.poll_interval_secs),
        Duration::from_secs(cfg.solver.solve_timeout_secs),
    )?;
    match solver.balance().await {
        Ok(balance) if balance < LOW_BALANCE => warn!(balance, "solver balance is low"),
        Ok(balance) => info!(balance, "solver account ready"),
        Err(e) => warn!(error = %e, "solver balance check failed"),
    }

    let flow = build_flow(cfg)?;
    let params = RunParams {
        target_url: cfg.target_url.clone(),
        credentials: cfg.credentials.clone(),
        max_price: cfg.max_price,
    };

    let driver = GauntletDriver::new(&cfg.webdriver_url, cfg.headless, cfg.stealth).await?;
    let session = driver.into_session();

    Ok(flow.run(&session, &solver, &params).await)
}

fn build_flow(cfg: &GauntletConfig) -> Result<FlowOrchestrator> {
    let policy = cfg.retry.to_policy()?;

    let mut selectors = FlowSelectors::default();
    if let Some(chain) = &cfg.selectors.main_content {
        selectors.main_content = chain.clone();
    }
    if let Some(chain) = &cfg.selectors.identity_input {
        selectors.identity_input = chain.clone();
    }
    if let Some(chain) = &cfg.selectors.secret_input {
        selectors.secret_input = chain.clone();
    }
    if let Some(chain) = &cfg.selectors.submit_button {
        selectors.submit_button = chain.clone();
    }
    if let Some(chain) = &cfg.selectors.price_filter {
        selectors.price_filter = chain.clone();
    }
    if let Some(chain) = &cfg.selectors.list_item {
        selectors.listings.item = chain.clone();
    }

    let timeouts = StageTimeouts {
        short: Duration::from_secs(cfg.timeouts.short_secs),
        medium: Duration::from_secs(cfg.timeouts.medium_secs),
        long: Duration::from_secs(cfg.timeouts.long_secs),
    };

    Ok(FlowOrchestrator::new(ArtifactRecorder::new(&cfg.artifacts_dir))
        .with_policy(policy)
        .with_selectors(selectors)
        .with_timeouts(timeouts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use gauntlet_config::GauntletConfigLoader;

    const MINIMAL: &str = r#"
target_url: "https://example.com/listings"
max_price: 10000
solver:
  api_key: "test-key"
"#;

    #[test]
    fn minimal_config_wires_a_flow() {
        let cfg = GauntletConfigLoader::new()
            .with_yaml_str(MINIMAL)
            .load()
            .unwrap();
        assert!(build_flow(&cfg).is_ok());
    }

    #[test]
    fn invalid_retry_settings_fail_wiring() {
        let yaml = format!(
            "{MINIMAL}\nretry:\n  max_attempts: 0\n  per_attempt_timeout_secs: 1\n  backoff_secs: 0\n"
        );
        let cfg = GauntletConfigLoader::new()
            .with_yaml_str(&yaml)
            .load()
            .unwrap();
        assert!(build_flow(&cfg).is_err());
    }
}
