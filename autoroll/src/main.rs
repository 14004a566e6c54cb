use anyhow::{Context, Result};
use clap::{Arg, Command};
use spore_autoroll::{Config, Engine, StopReason};
use std::str::FromStr;
use tracing::{info, Level};

#[tokio::main]
async fn main() -> Result<()> {
    // Parse arguments
    let matches = Command::new("autoroll")
        .about("Spin one trait of a spore-fates token until it reaches a target value.")
        .arg(Arg::new("config").long("config").required(true))
        .get_matches();

    // Load from config file
    let config_file = matches
        .get_one::<String>("config")
        .context("missing --config")?;
    let config_file = std::fs::read_to_string(config_file)
        .with_context(|| format!("could not read config file {config_file}"))?;
    let config: Config =
        serde_yaml::from_str(&config_file).context("could not parse config file")?;

    // Setup logging
    let level = Level::from_str(&config.log_level).context("invalid log level")?;
    if config.json_logs {
        tracing_subscriber::fmt().json().with_max_level(level).init();
    } else {
        tracing_subscriber::fmt().with_max_level(level).init();
    }

    let engine = Engine::from_config(&config)?;
    let summary = engine.run().await?;
    match summary.reason {
        StopReason::Reached => info!(value = summary.final_value, "target reached"),
        StopReason::Exhausted => info!(
            value = summary.final_value,
            attempts = summary.attempts,
            "attempt budget spent"
        ),
    }
    Ok(())
}
