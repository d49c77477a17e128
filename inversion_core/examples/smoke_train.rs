//! Trains an encoder against a randomly initialised generator on synthetic
//! data, then evaluates the last checkpoint on known and unknown classes.
//!
//! Run with: cargo run --example smoke_train

use latent_inversion_core::checkpoint::Checkpointable;
use latent_inversion_core::config::{DataSource, InversionConfig, Mode};
use latent_inversion_core::model::{CriticArtifact, GeneratorArtifact};
use latent_inversion_core::run::{run, RunOutcome};
use latent_inversion_core::{MemorySink, RngContext};

fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_target(false).init();

    let workspace = std::env::temp_dir().join("latent_inversion_smoke");
    let mut config = InversionConfig::default();
    config.epochs = 4;
    config.checkpoint_period = 2;
    config.batch_size = 16;
    config.vis_samples = 8;
    config.model.latent_dim = 8;
    config.model.encoder_hidden = vec![64];
    config.model.image_size = 8;
    config.data.source = DataSource::Synthetic;
    config.data.synthetic_train_per_class = 24;
    config.data.synthetic_val_per_class = 6;
    config.paths.decoder = workspace.join("pretrained").join("generator.bin");
    config.paths.discriminator = workspace.join("pretrained").join("discriminator.bin");
    config.paths.checkpoint_dir = workspace.join("ckpt");
    config.paths.output_dir = workspace.join("output");
    config.paths.infer_checkpoint_epoch = config.epochs;

    let rng = RngContext::new(config.seed);
    let image_dim = config.image_shape().numel();
    GeneratorArtifact::random(config.model.latent_dim, &[32], image_dim, &rng)
        .save_checkpoint(&config.paths.decoder)?;
    CriticArtifact::random(image_dim, &[16], &rng).save_checkpoint(&config.paths.discriminator)?;

    let mut sink = MemorySink::new();
    if let RunOutcome::Trained(history) = run(&config, &mut sink)? {
        for epoch in &history.epochs {
            println!(
                "epoch {:>2}  train {:.5}  val {:.5}  lr {:.2e}",
                epoch.epoch, epoch.train_loss, epoch.val_loss, epoch.learning_rate
            );
        }
        println!("checkpoints: {:?}", history.checkpoints);
    }

    config.mode = Mode::Infer;
    if let RunOutcome::Inferred(report) = run(&config, &mut sink)? {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }
    println!("artifacts in {}", workspace.display());
    Ok(())
}
