//! `invert` binary: trains the latent inversion encoder or evaluates a saved
//! checkpoint against a frozen pretrained generator.
//!
//! # Usage
//!
//! ```bash
//! cargo run --release --bin invert -- --config config/invert.toml
//! cargo run --release --bin invert -- --config config/invert.toml --mode infer
//! ```

use std::path::PathBuf;

use anyhow::Context;
use clap::Parser;
use tracing::info;

use latent_inversion_core::config::{InversionConfig, Mode};
use latent_inversion_core::logging::JsonlMetricsSink;
use latent_inversion_core::run::{run, RunOutcome};

#[derive(Parser, Debug)]
#[command(
    name = "invert",
    version,
    about = "Train an encoder into the latent space of a frozen generator",
    long_about = None
)]
struct Args {
    /// Path to the TOML configuration file. Defaults apply when omitted.
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Override the configured mode.
    #[arg(long, value_enum)]
    mode: Option<Mode>,

    /// Log level (trace, debug, info, warn, error).
    #[arg(long, default_value = "info")]
    log_level: String,
}

fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    let log_level_filter = args
        .log_level
        .parse::<tracing_subscriber::filter::LevelFilter>()
        .unwrap_or(tracing_subscriber::filter::LevelFilter::INFO);
    tracing_subscriber::fmt()
        .with_max_level(log_level_filter)
        .with_target(false)
        .init();

    let mut config = match args.config.as_deref() {
        Some(path) => {
            info!("Loading configuration from {}", path.display());
            InversionConfig::load_from_file(path)
                .with_context(|| format!("failed to load {}", path.display()))?
        }
        None => {
            info!("No configuration file provided; using defaults");
            InversionConfig::default()
        }
    };
    if let Some(mode) = args.mode {
        config.mode = mode;
    }

    let mut sink = JsonlMetricsSink::new(&config.paths.metrics);

    match run(&config, &mut sink).context("run failed")? {
        RunOutcome::Trained(history) => {
            let last = history.epochs.last();
            info!(
                "Finished {} epochs ({} optimizer steps, {} checkpoints); final val loss {:.4}",
                history.epochs.len(),
                history.optimizer_steps,
                history.checkpoints.len(),
                last.map(|m| m.val_loss).unwrap_or(f32::NAN)
            );
        }
        RunOutcome::Inferred(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
    }
    Ok(())
}
