//! `epiharvest` — run the configured producers once against one store.
//!
//! # Usage
//!
//! ```
//! epiharvest --config epiharvest.toml
//! epiharvest --only GBR_PHE --only USA_NYT --window-days 14
//! epiharvest --validate
//! ```

use std::{path::PathBuf, sync::Arc};

use anyhow::Context as _;
use clap::Parser;
use epiharvest_runner::{AnyStore, HarvestConfig, Runner, feed_registry};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(
  name = "epiharvest",
  author,
  version,
  about = "Batch ingestion of regional COVID-19 facts"
)]
struct Cli {
  /// Path to the TOML configuration file.
  #[arg(short, long, default_value = "epiharvest.toml")]
  config: PathBuf,

  /// Run only these sources. May be repeated.
  #[arg(long = "only", value_name = "SOURCE")]
  only: Vec<String>,

  /// Route epidemiology writes to the staging table.
  #[arg(long)]
  validate: bool,

  /// Drop records older than this many days.
  #[arg(long, value_name = "N")]
  window_days: Option<u32>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
  tracing_subscriber::fmt()
    .with_env_filter(
      EnvFilter::builder()
        .with_default_directive(LevelFilter::INFO.into())
        .from_env_lossy(),
    )
    .init();

  let cli = Cli::parse();

  let mut config = HarvestConfig::load(&cli.config)
    .with_context(|| format!("failed to read config {}", cli.config.display()))?;

  // CLI flags override the file and environment.
  if cli.validate {
    config.validate = true;
  }
  if cli.window_days.is_some() {
    config.sliding_window_days = cli.window_days;
  }

  let store = AnyStore::open(&config.backend)
    .await
    .context("failed to open backend")?;

  let registry = feed_registry::<AnyStore>(&config.feeds);
  if registry.is_empty() {
    tracing::warn!("no producers configured");
  }

  let runner = Runner::new(Arc::new(store), registry, config.run_settings());
  let summary = runner.run(&cli.only).await;

  for outcome in summary.failed() {
    tracing::warn!(
      source = %outcome.source,
      outcome = ?outcome.outcome,
      "producer did not complete"
    );
  }
  for outcome in &summary.outcomes {
    let unresolved = outcome.diagnostics.unresolved().count();
    let missing_geocodes = outcome.diagnostics.missing_geocodes().count();
    if unresolved + missing_geocodes > 0 {
      tracing::info!(source = %outcome.source, unresolved, missing_geocodes, "region gaps");
    }
  }

  Ok(())
}
