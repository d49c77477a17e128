//! Encoder training loop.
//!
//! Each epoch walks the phases `Training → Validating → Logging →
//! Checkpointing` and the run ends in `Done` after the configured number of
//! epochs (or earlier, once the optimizer-step cap is reached). Only the
//! encoder is updated; gradients flow through the frozen decoder to its input
//! and stop there.

use std::path::PathBuf;
use std::time::Instant;

use ndarray::Array2;
use serde::Serialize;
use tracing::{debug, info};

use crate::checkpoint::EncoderCheckpointer;
use crate::config::InversionConfig;
use crate::data::{DataLoader, ImageShape, Normalize};
use crate::error::{InversionError, InversionResult};
use crate::logging::{Metric, MetricsSink};
use crate::model::{DifferentiableMap, Encoder, FrozenDecoder};
use crate::neural::{mse_loss, mse_loss_with_gradients, AdamOptimizer, LearningRate};
use crate::scheduler::PlateauScheduler;
use crate::visualize::render_grid;

/// Where the epoch state machine currently is. Epochs are zero-based.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum EpochPhase {
    Training(usize),
    Validating(usize),
    Logging(usize),
    Checkpointing(usize),
    Done,
}

/// Summary of one completed epoch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EpochMetrics {
    pub epoch: usize,
    /// Mean of the epoch's per-batch training losses.
    pub train_loss: f32,
    /// Mean of the per-batch validation losses.
    pub val_loss: f32,
    /// Learning rate after the scheduler step.
    pub learning_rate: f32,
    pub batches: usize,
    pub elapsed_ms: u128,
}

/// Everything a finished [`Trainer::fit`] run produced.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TrainingHistory {
    pub epochs: Vec<EpochMetrics>,
    /// Every per-batch training loss, in order.
    pub batch_losses: Vec<f32>,
    /// Checkpoints written, with the epoch tag each carries.
    pub checkpoints: Vec<(usize, PathBuf)>,
    pub grids: Vec<PathBuf>,
    pub optimizer_steps: usize,
}

/// Loop-level knobs, separate from model and optimizer hyperparameters.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainerSettings {
    pub epochs: usize,
    pub checkpoint_period: usize,
    /// Stop once this many optimizer steps have been taken (checked at the
    /// end of each epoch).
    pub max_steps: usize,
    pub vis_samples: usize,
    pub output_dir: PathBuf,
    pub shape: ImageShape,
    pub normalize: Normalize,
}

impl TrainerSettings {
    pub fn from_config(config: &InversionConfig) -> Self {
        Self {
            epochs: config.epochs,
            checkpoint_period: config.checkpoint_period,
            max_steps: config.iterations,
            vis_samples: config.vis_samples,
            output_dir: config.paths.output_dir.clone(),
            shape: config.image_shape(),
            normalize: Normalize::for_channels(config.channels),
        }
    }
}

/// Per-epoch values carried across phases.
#[derive(Debug)]
struct EpochProgress {
    started: Instant,
    batch_losses: Vec<f32>,
    val_loss: f32,
}

pub struct Trainer<'a> {
    encoder: Encoder,
    decoder: &'a FrozenDecoder,
    optimizer: AdamOptimizer,
    scheduler: PlateauScheduler,
    checkpointer: EncoderCheckpointer,
    settings: TrainerSettings,
}

impl<'a> Trainer<'a> {
    pub fn new(
        encoder: Encoder,
        decoder: &'a FrozenDecoder,
        optimizer: AdamOptimizer,
        scheduler: PlateauScheduler,
        checkpointer: EncoderCheckpointer,
        settings: TrainerSettings,
    ) -> Self {
        Self {
            encoder,
            decoder,
            optimizer,
            scheduler,
            checkpointer,
            settings,
        }
    }

    /// Builds the optimizer, scheduler and checkpointer described by `config`.
    pub fn from_config(
        encoder: Encoder,
        decoder: &'a FrozenDecoder,
        config: &InversionConfig,
    ) -> Self {
        let optimizer =
            AdamOptimizer::new(config.learning_rate, config.betas, config.weight_decay);
        let scheduler = PlateauScheduler::new(config.scheduler.factor, config.scheduler.patience)
            .threshold(config.scheduler.threshold)
            .min_lr(config.scheduler.min_lr);
        Self::new(
            encoder,
            decoder,
            optimizer,
            scheduler,
            EncoderCheckpointer::new(&config.paths.checkpoint_dir),
            TrainerSettings::from_config(config),
        )
    }

    pub fn encoder(&self) -> &Encoder {
        &self.encoder
    }

    pub fn into_encoder(self) -> Encoder {
        self.encoder
    }

    pub fn optimizer(&self) -> &AdamOptimizer {
        &self.optimizer
    }

    pub fn scheduler(&self) -> &PlateauScheduler {
        &self.scheduler
    }

    /// Runs the epoch state machine to completion.
    ///
    /// Empty splits fail with [`InversionError::EmptySplit`] before anything
    /// is written. A non-finite loss aborts the run; metrics and checkpoints
    /// of epochs already completed stay on disk.
    pub fn fit<S: MetricsSink + ?Sized>(
        &mut self,
        train: &DataLoader,
        val: &DataLoader,
        sink: &mut S,
    ) -> InversionResult<TrainingHistory> {
        if train.is_empty() {
            return Err(InversionError::EmptySplit {
                split: "training".to_string(),
            });
        }
        if val.is_empty() {
            return Err(InversionError::EmptySplit {
                split: "validation".to_string(),
            });
        }

        info!(
            "Training encoder ({} parameters) for {} epochs: {} train / {} val samples, {} batches per epoch",
            self.encoder.num_parameters(),
            self.settings.epochs,
            train.len(),
            val.len(),
            train.num_batches()
        );

        let mut history = TrainingHistory::default();
        let mut progress = EpochProgress {
            started: Instant::now(),
            batch_losses: Vec::new(),
            val_loss: f32::NAN,
        };
        let mut phase = EpochPhase::Training(0);

        loop {
            debug!("Entering {:?}", phase);
            phase = match phase {
                EpochPhase::Training(epoch) => {
                    progress.started = Instant::now();
                    progress.batch_losses = self.train_epoch(epoch, train)?;
                    EpochPhase::Validating(epoch)
                }
                EpochPhase::Validating(epoch) => {
                    progress.val_loss = self.validate(epoch, val)?;
                    self.scheduler.step(progress.val_loss, &mut self.optimizer);
                    EpochPhase::Logging(epoch)
                }
                EpochPhase::Logging(epoch) => {
                    let metrics = self.log_epoch(epoch, &progress, val, sink, &mut history)?;
                    history.batch_losses.append(&mut progress.batch_losses);
                    history.epochs.push(metrics);
                    EpochPhase::Checkpointing(epoch)
                }
                EpochPhase::Checkpointing(epoch) => {
                    let tag = epoch + 1;
                    if tag % self.settings.checkpoint_period == 0 {
                        let path = self.checkpointer.save(&self.encoder, tag)?;
                        history.checkpoints.push((tag, path));
                    }

                    if tag >= self.settings.epochs {
                        EpochPhase::Done
                    } else if self.optimizer.step_count() >= self.settings.max_steps {
                        info!(
                            "Reached {} optimizer steps after epoch {}; stopping",
                            self.optimizer.step_count(),
                            tag
                        );
                        EpochPhase::Done
                    } else {
                        EpochPhase::Training(tag)
                    }
                }
                EpochPhase::Done => break,
            };
        }

        history.optimizer_steps = self.optimizer.step_count();
        Ok(history)
    }

    /// One pass over `loader`, updating the encoder after every batch.
    /// Returns the per-batch losses.
    pub fn train_epoch(&mut self, epoch: usize, loader: &DataLoader) -> InversionResult<Vec<f32>> {
        let mut losses = Vec::with_capacity(loader.num_batches());
        loader.for_each_batch::<InversionError, _>(epoch, |batch_index, batch| {
            let loss = self.train_step(epoch, batch_index, &batch.images)?;
            debug!("epoch {} batch {}: loss {:.6}", epoch, batch_index, loss);
            losses.push(loss);
            Ok(())
        })?;
        Ok(losses)
    }

    /// Forward, backward and one optimizer step on a single batch.
    ///
    /// A non-finite loss fails with [`InversionError::NonFiniteLoss`] and
    /// leaves the encoder and optimizer untouched.
    pub fn train_step(
        &mut self,
        epoch: usize,
        batch_index: usize,
        images: &Array2<f32>,
    ) -> InversionResult<f32> {
        let encoder_trace = self.encoder.forward_traced(images);
        let decoder_trace = self.decoder.forward_traced(encoder_trace.output());
        let (loss, grad_output) = mse_loss_with_gradients(decoder_trace.output(), images);
        ensure_finite(loss, epoch, batch_index)?;

        let grad_latent = self.decoder.backward_input(&decoder_trace, &grad_output);
        let gradients = self.encoder.backward(&encoder_trace, &grad_latent);
        self.encoder.apply_gradients(&gradients, &mut self.optimizer);
        Ok(loss)
    }

    /// Mean per-batch reconstruction loss over `loader`. No parameter is
    /// touched.
    pub fn validate(&self, epoch: usize, loader: &DataLoader) -> InversionResult<f32> {
        let mut total = 0.0f64;
        let mut batches = 0usize;
        loader.for_each_batch::<InversionError, _>(epoch, |batch_index, batch| {
            let recon = self.decoder.decode(&self.encoder.encode(&batch.images));
            let loss = mse_loss(&recon, &batch.images);
            ensure_finite(loss, epoch, batch_index)?;
            total += loss as f64;
            batches += 1;
            Ok(())
        })?;
        Ok((total / batches.max(1) as f64) as f32)
    }

    fn log_epoch<S: MetricsSink + ?Sized>(
        &self,
        epoch: usize,
        progress: &EpochProgress,
        val: &DataLoader,
        sink: &mut S,
        history: &mut TrainingHistory,
    ) -> InversionResult<EpochMetrics> {
        let batches = progress.batch_losses.len();
        let train_loss = progress.batch_losses.iter().sum::<f32>() / batches.max(1) as f32;
        let learning_rate = self.optimizer.learning_rate();

        info!(
            "epoch [{}/{}], train loss:{:.4}, val loss:{:.4}, lr:{:.3e}",
            epoch + 1,
            self.settings.epochs,
            train_loss,
            progress.val_loss,
            learning_rate
        );

        let mut metrics = vec![
            Metric::scalar("train_loss", train_loss),
            Metric::scalar("val_loss", progress.val_loss),
            Metric::scalar("lr", learning_rate),
        ];
        if let Some(head) = val.head(self.settings.vis_samples) {
            let path = render_grid(
                &self.encoder,
                self.decoder,
                &head.images,
                self.settings.shape,
                &self.settings.normalize,
                self.settings.output_dir.join(format!("recons_epoch{epoch}.png")),
            )?;
            metrics.push(Metric::image("reconstructions", &path));
            history.grids.push(path);
        }
        sink.record(epoch, &metrics)?;

        Ok(EpochMetrics {
            epoch,
            train_loss,
            val_loss: progress.val_loss,
            learning_rate,
            batches,
            elapsed_ms: progress.started.elapsed().as_millis(),
        })
    }
}

fn ensure_finite(loss: f32, epoch: usize, batch: usize) -> InversionResult<()> {
    if loss.is_finite() {
        Ok(())
    } else {
        Err(InversionError::NonFiniteLoss {
            epoch,
            batch,
            value: loss,
        })
    }
}
