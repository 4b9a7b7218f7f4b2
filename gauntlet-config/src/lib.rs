//! Loader for run configuration with YAML + environment overlays.
//!
//! A `gauntlet.yaml` file describes the target site, credentials, retry
//! policy, and solver service. `GAUNTLET__`-prefixed environment variables
//! override file values, and `${VAR}` placeholders inside string values are
//! expanded recursively (depth-capped) so secrets can live in the
//! environment rather than on disk.

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigError, Environment, File};
use gauntlet_common::{Credentials, FlowError, RetryPolicy, StealthLevel};
use serde::Deserialize;
use serde_json::Value;

const MAXIMUM_ENV_EXPANSION_DEPTH: usize = 8;

fn default_true() -> bool {
    true
}
fn default_webdriver_url() -> String {
    "http://localhost:9515".into()
}
fn default_artifacts_dir() -> String {
    "artifacts".into()
}
fn default_stealth() -> StealthLevel {
    StealthLevel::Balanced
}

#[derive(Debug, Deserialize)]
pub struct GauntletConfig {
    /// Entry URL for the run.
    pub target_url: String,
    /// Inclusive price ceiling applied during result extraction.
    pub max_price: u64,
    /// Login credentials; omitted for credential-less scrape targets.
    #[serde(default)]
    pub credentials: Option<Credentials>,
    #[serde(default = "default_true")]
    pub headless: bool,
    /// One of `lightweight`, `balanced`, `maximum`.
    #[serde(default = "default_stealth")]
    pub stealth: StealthLevel,
    #[serde(default = "default_webdriver_url")]
    pub webdriver_url: String,
    /// Directory for screenshots and error reports.
    #[serde(default = "default_artifacts_dir")]
    pub artifacts_dir: String,
    #[serde(default)]
    pub retry: RetrySettings,
    pub solver: SolverSettings,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
    #[serde(default)]
    pub selectors: SelectorOverrides,
}

#[derive(Debug, Deserialize)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub per_attempt_timeout_secs: u64,
    pub backoff_secs: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            per_attempt_timeout_secs: 120,
            backoff_secs: 5,
        }
    }
}

impl RetrySettings {
    /// Materialise the validated policy; zero attempts is rejected here.
    pub fn to_policy(&self) -> Result<RetryPolicy, FlowError> {
        RetryPolicy::new(
            self.max_attempts,
            Duration::from_secs(self.per_attempt_timeout_secs),
            Duration::from_secs(self.backoff_secs),
        )
    }
}

#[derive(Debug, Deserialize)]
pub struct SolverSettings {
    /// API key for the solving service, usually `${CAPTCHA_API_KEY}`.
    pub api_key: String,
    #[serde(default = "default_solver_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,
    #[serde(default = "default_solve_timeout")]
    pub solve_timeout_secs: u64,
}

fn default_solver_endpoint() -> String {
    "https://2captcha.com".into()
}
fn default_poll_interval() -> u64 {
    5
}
fn default_solve_timeout() -> u64 {
    180
}

/// Per-stage waits, mirroring the short/medium/long buckets the flow uses.
#[derive(Debug, Clone, Deserialize)]
pub struct TimeoutSettings {
    pub short_secs: u64,
    pub medium_secs: u64,
    pub long_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            short_secs: 5,
            medium_secs: 15,
            long_secs: 30,
        }
    }
}

/// Optional overrides for the built-in selector fallback chains. Each entry
/// is an ordered list of equivalent selectors, tried in sequence.
#[derive(Debug, Default, Deserialize)]
pub struct SelectorOverrides {
    #[serde(default)]
    pub main_content: Option<Vec<String>>,
    #[serde(default)]
    pub identity_input: Option<Vec<String>>,
    #[serde(default)]
    pub secret_input: Option<Vec<String>>,
    #[serde(default)]
    pub submit_button: Option<Vec<String>>,
    #[serde(default)]
    pub price_filter: Option<Vec<String>>,
    #[serde(default)]
    pub list_item: Option<Vec<String>>,
}

// Expansion runs over the whole merged tree so nested values and arrays get
// the same treatment as top-level strings.
fn expand_env_in_value(v: &mut Value) {
    match v {
        Value::String(s) => {
            if s.contains('$') {
                let mut cur = std::mem::take(s);
                for _ in 0..MAXIMUM_ENV_EXPANSION_DEPTH {
                    let expanded = match shellexpand::env(&cur) {
                        Ok(cow) => cow.into_owned(),
                        Err(_) => cur.clone(),
                    };
                    if expanded == cur {
                        break;
                    }
                    cur = expanded;
                }
                *s = cur;
            }
        }
        Value::Array(arr) => arr.iter_mut().for_each(expand_env_in_value),
        Value::Object(obj) => obj.values_mut().for_each(expand_env_in_value),
        _ => {}
    }
}

/// Builder hiding the `config` crate wiring (YAML file + env overrides).
pub struct GauntletConfigLoader {
    builder: config::ConfigBuilder<config::builder::DefaultState>,
}

impl Default for GauntletConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl GauntletConfigLoader {
    /// Start with the defaults: `GAUNTLET__` env overrides on top of
    /// whatever files/snippets are attached later.
    pub fn new() -> Self {
        let builder =
            Config::builder().add_source(Environment::with_prefix("GAUNTLET").separator("__"));
        Self { builder }
    }

    /// Attach a config file; the `config` crate infers the format by suffix.
    pub fn with_file<P: AsRef<Path>>(mut self, path: P) -> Self {
        self.builder = self.builder.add_source(File::from(path.as_ref()).required(true));
        self
    }

    /// Merge an inline YAML snippet; used by tests and the CLI.
    pub fn with_yaml_str(mut self, yaml: &str) -> Self {
        self.builder = self
            .builder
            .add_source(File::from_str(yaml, config::FileFormat::Yaml));
        self
    }

    /// Build, expand `${VAR}` placeholders, and deserialize into the typed
    /// configuration.
    pub fn load(self) -> Result<GauntletConfig, ConfigError> {
        let cfg = self.builder.build()?;

        let mut v: Value = cfg.try_deserialize()?;
        expand_env_in_value(&mut v);

        serde_json::from_value(v).map_err(|e| ConfigError::Message(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    const MINIMAL: &str = r#"
target_url: "https://example.com/listings"
max_price: 10000
solver:
  api_key: "test-key"
"#;

    #[test]
    fn minimal_config_gets_defaults() {
        let cfg = GauntletConfigLoader::new()
            .with_yaml_str(MINIMAL)
            .load()
            .unwrap();
        assert_eq!(cfg.max_price, 10000);
        assert!(cfg.headless);
        assert!(cfg.credentials.is_none());
        assert_eq!(cfg.webdriver_url, "http://localhost:9515");
        assert_eq!(cfg.stealth, StealthLevel::Balanced);
        assert_eq!(cfg.retry.max_attempts, 3);
        assert_eq!(cfg.solver.endpoint, "https://2captcha.com");
        assert_eq!(cfg.timeouts.long_secs, 30);
    }

    #[test]
    fn retry_settings_materialise_into_policy() {
        let cfg = GauntletConfigLoader::new()
            .with_yaml_str(MINIMAL)
            .load()
            .unwrap();
        let policy = cfg.retry.to_policy().unwrap();
        assert_eq!(policy.max_attempts(), 3);
        assert_eq!(policy.backoff(), Duration::from_secs(5));
    }

    #[test]
    fn zero_attempts_rejected_when_materialised() {
        let yaml = format!(
            "{}\nretry:\n  max_attempts: 0\n  per_attempt_timeout_secs: 1\n  backoff_secs: 0\n",
            MINIMAL
        );
        let cfg = GauntletConfigLoader::new()
            .with_yaml_str(&yaml)
            .load()
            .unwrap();
        assert!(cfg.retry.to_policy().is_err());
    }

    #[test]
    fn secrets_expand_from_environment() {
        temp_env::with_var("CAPTCHA_API_KEY", Some("from-env"), || {
            let yaml = r#"
target_url: "https://example.com"
max_price: 500
credentials:
  identity: "user@example.com"
  secret: "${CAPTCHA_API_KEY}"
solver:
  api_key: "${CAPTCHA_API_KEY}"
"#;
            let cfg = GauntletConfigLoader::new()
                .with_yaml_str(yaml)
                .load()
                .unwrap();
            assert_eq!(cfg.solver.api_key, "from-env");
            assert_eq!(cfg.credentials.unwrap().secret, "from-env");
        });
    }

    #[test]
    fn expansion_is_recursive_but_bounded() {
        temp_env::with_vars(
            [
                ("INNER", Some("deep")),
                ("OUTER", Some("wrapped-${INNER}")),
            ],
            || {
                let mut v = json!({"key": "${OUTER}"});
                expand_env_in_value(&mut v);
                assert_eq!(v, json!({"key": "wrapped-deep"}));
            },
        );
    }

    #[test]
    fn unknown_vars_are_left_as_is() {
        let mut v = json!("hi-${DOES_NOT_EXIST}");
        expand_env_in_value(&mut v);
        assert_eq!(v, json!("hi-${DOES_NOT_EXIST}"));
    }

    #[test]
    fn selector_overrides_parse_as_ordered_lists() {
        let yaml = format!(
            "{}\nselectors:\n  price_filter:\n    - \"input[data-test-id='price-to']\"\n    - \"input[name='price_to']\"\n",
            MINIMAL
        );
        let cfg = GauntletConfigLoader::new()
            .with_yaml_str(&yaml)
            .load()
            .unwrap();
        let chain = cfg.selectors.price_filter.unwrap();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], "input[data-test-id='price-to']");
    }
}
