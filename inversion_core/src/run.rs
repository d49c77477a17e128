//! End-to-end run orchestration.
//!
//! [`run`] wires configuration, data, the frozen decoder and the encoder
//! together and dispatches on [`Mode`]. Every precondition (split validity,
//! artifact presence, shape compatibility) is checked before any directory,
//! checkpoint or metric is written.

use std::fs;
use std::sync::Arc;

use serde::Serialize;
use tracing::info;

use crate::checkpoint::EncoderCheckpointer;
use crate::config::{DataSource, InversionConfig, Mode};
use crate::data::{
    eval_transform, load_cifar10, restrict_to, synthetic, train_transform, CifarPart, DataLoader,
    DatasetView, LabeledImageDataset, Normalize, SplitAssignment, SplitPolicy, SyntheticConfig,
};
use crate::error::{InversionError, InversionResult};
use crate::evaluation::{evaluate_distances, InferenceReport};
use crate::logging::MetricsSink;
use crate::model::{ensure_compatible, Encoder, FrozenDecoder};
use crate::rng::RngContext;
use crate::training::{Trainer, TrainingHistory};
use crate::visualize::render_grid;

/// What a completed run produced.
#[derive(Debug, Clone, Serialize)]
pub enum RunOutcome {
    Trained(TrainingHistory),
    Inferred(InferenceReport),
}

/// Train and validation/test datasets for `config`.
pub fn load_datasets(
    config: &InversionConfig,
    rng: &RngContext,
) -> InversionResult<(LabeledImageDataset, LabeledImageDataset)> {
    let (train, test) = match config.data.source {
        DataSource::Cifar10 => (
            load_cifar10(&config.data.root, CifarPart::Train)?,
            load_cifar10(&config.data.root, CifarPart::Test)?,
        ),
        DataSource::Synthetic => {
            let base = SyntheticConfig {
                shape: config.image_shape(),
                num_classes: config.data.num_classes,
                samples_per_class: config.data.synthetic_train_per_class,
                ..SyntheticConfig::default()
            };
            let val = SyntheticConfig {
                samples_per_class: config.data.synthetic_val_per_class,
                ..base
            };
            (
                synthetic::generate(&base, rng, 0)?,
                synthetic::generate(&val, rng, 1)?,
            )
        }
    };

    let expected = config.image_shape();
    for dataset in [&train, &test] {
        InversionError::check_dim(
            "dataset image size vs configured image size",
            expected.numel(),
            dataset.shape().numel(),
        )?;
    }
    Ok((train, test))
}

/// Runs training or inference as configured, recording metrics to `sink`.
pub fn run<S: MetricsSink + ?Sized>(
    config: &InversionConfig,
    sink: &mut S,
) -> InversionResult<RunOutcome> {
    let device = config.device.resolve();
    let rng = RngContext::new(config.seed);
    info!(
        "Starting {:?} run on {:?}: split {}, seed {}",
        config.mode, device, config.split_index, config.seed
    );

    let (train_set, test_set) = load_datasets(config, &rng)?;
    let policy = SplitPolicy::new(config.data.num_classes, config.data.num_known)
        .with_strategy(config.data.split_strategy, rng);
    let split = policy.partition(&train_set, config.split_index)?;
    info!("Known classes {:?}, unknown classes {:?}", split.known, split.unknown);

    let decoder = FrozenDecoder::load(&config.paths.decoder, &config.paths.discriminator)?;

    match config.mode {
        Mode::Train => {
            let encoder = Encoder::new(
                config.image_shape().numel(),
                &config.model.encoder_hidden,
                config.model.latent_dim,
                &rng,
            );
            ensure_compatible(&encoder, &decoder, config.image_shape().numel())?;
            prepare_directories(config)?;

            let normalize = Normalize::for_channels(config.channels);
            let train = DataLoader::new(
                restrict_to(&train_set, &split.known),
                config.batch_size,
                Arc::new(train_transform(normalize.clone())),
                rng,
            )
            .shuffled(true)
            .with_prefetch(config.data.workers);
            let val = eval_loader(config, restrict_to(&test_set, &split.known), rng);

            let mut trainer = Trainer::from_config(encoder, &decoder, config);
            let history = trainer.fit(&train, &val, sink)?;
            Ok(RunOutcome::Trained(history))
        }
        Mode::Infer => {
            let report = run_inference(config, &decoder, &test_set, &split, sink)?;
            Ok(RunOutcome::Inferred(report))
        }
    }
}

/// Loads the configured checkpoint and reports reconstruction distances over
/// the known and unknown classes of `test_set`.
///
/// Writes `known_recons.png` and `unk_recons.png` to the output directory and
/// records the eight distance scalars.
pub fn run_inference<S: MetricsSink + ?Sized>(
    config: &InversionConfig,
    decoder: &FrozenDecoder,
    test_set: &LabeledImageDataset,
    split: &SplitAssignment,
    sink: &mut S,
) -> InversionResult<InferenceReport> {
    let checkpointer = EncoderCheckpointer::new(&config.paths.checkpoint_dir);
    let checkpoint = checkpointer.load_epoch(config.paths.infer_checkpoint_epoch)?;
    let encoder = checkpoint.encoder;
    ensure_compatible(&encoder, decoder, config.image_shape().numel())?;
    prepare_directories(config)?;
    info!("Loaded encoder checkpoint from epoch {}", checkpoint.epoch);

    let rng = RngContext::new(config.seed);
    let known = eval_loader(config, restrict_to(test_set, &split.known), rng);
    render_head(config, &encoder, decoder, &known, "known_recons.png")?;
    let known_report = evaluate_distances(&encoder, decoder, &known, "known")?;

    let unknown = eval_loader(config, restrict_to(test_set, &split.unknown), rng);
    render_head(config, &encoder, decoder, &unknown, "unk_recons.png")?;
    let unknown_report = evaluate_distances(&encoder, decoder, &unknown, "unknown")?;

    let report = InferenceReport {
        checkpoint_epoch: checkpoint.epoch,
        known: known_report,
        unknown: unknown_report,
    };
    sink.record(checkpoint.epoch, &report.metrics())?;
    Ok(report)
}

fn eval_loader(config: &InversionConfig, view: DatasetView, rng: RngContext) -> DataLoader {
    DataLoader::new(
        view,
        config.batch_size,
        Arc::new(eval_transform(Normalize::for_channels(config.channels))),
        rng,
    )
    .with_prefetch(config.data.workers)
}

fn render_head(
    config: &InversionConfig,
    encoder: &Encoder,
    decoder: &FrozenDecoder,
    loader: &DataLoader,
    file_name: &str,
) -> InversionResult<()> {
    if let Some(head) = loader.head(config.vis_samples) {
        render_grid(
            encoder,
            decoder,
            &head.images,
            config.image_shape(),
            &Normalize::for_channels(config.channels),
            config.paths.output_dir.join(file_name),
        )?;
    }
    Ok(())
}

fn prepare_directories(config: &InversionConfig) -> InversionResult<()> {
    fs::create_dir_all(&config.paths.output_dir)?;
    fs::create_dir_all(&config.paths.checkpoint_dir)?;
    Ok(())
}
