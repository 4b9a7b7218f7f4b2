use std::path::PathBuf;

use anyhow::Result;
use clap::Parser;
use gauntlet_common::observability::{init_logging, LogConfig};
use gauntlet_config::{GauntletConfig, GauntletConfigLoader};

mod harness;

#[derive(Parser, Debug)]
#[command(name = "gauntlet", about = "Drive a protected listings flow end to end")]
struct Cli {
    /// Path to the run configuration.
    #[arg(long, default_value = "gauntlet.yaml")]
    config: PathBuf,

    /// Override the configured headless setting.
    #[arg(long)]
    headless: Option<bool>,

    /// Override the configured entry URL.
    #[arg(long)]
    target_url: Option<String>,

    /// Where the extracted results land as JSON.
    #[arg(long, default_value = "results.json")]
    output: PathBuf,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut cfg: GauntletConfig = GauntletConfigLoader::new().with_file(&cli.config).load()?;
    if let Some(headless) = cli.headless {
        cfg.headless = headless;
    }
    if let Some(url) = cli.target_url {
        cfg.target_url = url;
    }

    let log_path = init_logging(LogConfig::default())?;
    tracing::info!(log = %log_path.display(), target = %cfg.target_url, "gauntlet starting");

    let result = harness::run_once(&cfg).await?;

    let body = serde_json::json!({
        "success": result.success,
        "count": result.listings.len(),
        "data": result.listings,
        "steps": result.steps,
        "failure": result.failure,
    });
    std::fs::write(&cli.output, serde_json::to_string_pretty(&body)?)?;
    tracing::info!(
        output = %cli.output.display(),
        count = result.listings.len(),
        success = result.success,
        "run finished"
    );

    if !result.success {
        std::process::exit(1);
    }
    Ok(())
}
