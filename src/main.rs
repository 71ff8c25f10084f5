//! RideTwin - demo driver
//!
//! Fits a digital twin on a synthetic ride history, explains a fresh ride and mines
//! cross-session patterns, printing every result as JSON.
//!
//! Usage: `ridetwin [config.toml]`

use std::path::PathBuf;

use anyhow::Context;
use ridetwin::config::{default_config_path, load_config};
use ridetwin::synthetic::SyntheticRideBuilder;
use ridetwin::ContextTrainer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Seed of the synthetic history.
const HISTORY_SEED: u64 = 2024;
const HISTORY_SESSIONS: usize = 24;
const SAMPLES_PER_SESSION: usize = 900;

fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    tracing::info!("Starting RideTwin v{}", env!("CARGO_PKG_VERSION"));

    let config_path = std::env::args()
        .nth(1)
        .map(PathBuf::from)
        .unwrap_or_else(default_config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("loading {}", config_path.display()))?;
    tracing::info!(path = %config_path.display(), "Configuration loaded");

    let mut builder = SyntheticRideBuilder::new(HISTORY_SEED);
    let history = builder.history(HISTORY_SESSIONS, SAMPLES_PER_SESSION);
    let mining = config.mining.clone();

    let mut trainer = ContextTrainer::new(config);
    let model = trainer.fit(history).context("fitting digital twin")?;
    tracing::info!(
        regressor = model.regressor_name(),
        r_squared = model.r_squared(),
        "Twin ready"
    );

    let profile = builder.random_profile(SAMPLES_PER_SESSION, 12.0);
    let (activity, weather) = builder.ride(&profile);
    let explanation = trainer
        .explain_session(&activity, &weather)
        .context("explaining session")?;

    println!("{}", serde_json::to_string_pretty(&explanation.drift.summary)?);
    println!("{}", serde_json::to_string_pretty(&explanation.counterfactual)?);
    println!("{}", serde_json::to_string_pretty(&explanation.rationale)?);
    println!("{}", serde_json::to_string_pretty(&explanation.context)?);

    match trainer.mine_global_patterns(&mining) {
        Ok(rules) => {
            for rule in &rules {
                tracing::info!("{rule}");
            }
            println!("{}", serde_json::to_string_pretty(&rules)?);
        }
        Err(err) => tracing::warn!(error = %err, "Pattern mining skipped"),
    }

    Ok(())
}
