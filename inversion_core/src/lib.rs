//! # Latent Inversion Core
//!
//! Trains an encoder that maps images into the latent space of a frozen,
//! pretrained generator so that `decode(encode(x)) ≈ x`, and measures how
//! well that inversion generalizes from the classes it was trained on
//! ("known") to held-out classes ("unknown").
//!
//! ## Quick Start
//!
//! ```rust
//! use latent_inversion_core::model::{
//!     reconstruct, CriticArtifact, Encoder, FrozenDecoder, GeneratorArtifact,
//! };
//! use latent_inversion_core::rng::RngContext;
//! use ndarray::Array2;
//!
//! let rng = RngContext::new(0);
//! let decoder = FrozenDecoder::from_artifacts(
//!     GeneratorArtifact::random(8, &[32], 48, &rng),
//!     CriticArtifact::random(48, &[16], &rng),
//! )
//! .unwrap();
//! let encoder = Encoder::new(48, &[32], 8, &rng);
//!
//! let images = Array2::zeros((4, 48));
//! let recon = reconstruct(&encoder, &decoder, &images);
//! assert_eq!(recon.dim(), (4, 48));
//! ```
//!
//! ## Core Modules
//!
//! - [`data`] - Datasets, transforms, known/unknown splits and batching
//! - [`model`] - Trainable encoder and frozen decoder
//! - [`training`] - Epoch state machine
//! - [`scheduler`] - Plateau learning-rate reduction
//! - [`evaluation`] - L1/L2 reconstruction distances
//! - [`checkpoint`] - Versioned binary snapshots
//! - [`visualize`] - Reconstruction grids
//! - [`run`] - Train / infer orchestration

pub mod checkpoint;
pub mod config;
pub mod data;
pub mod error;
pub mod evaluation;
pub mod logging;
pub mod model;
pub mod neural;
pub mod rng;
pub mod run;
pub mod scheduler;
pub mod training;
pub mod visualize;

pub use checkpoint::{CheckpointError, Checkpointable, EncoderCheckpoint, EncoderCheckpointer};
pub use config::{ConfigError, InversionConfig, Mode};
pub use data::{restrict_to, DataLoader, LabeledImageDataset, SplitAssignment, SplitPolicy};
pub use error::{InversionError, InversionResult};
pub use evaluation::{evaluate_distances, DistanceReport, InferenceReport};
pub use logging::{JsonlMetricsSink, MemorySink, Metric, MetricsSink};
pub use model::{DifferentiableMap, Encoder, FrozenDecoder};
pub use rng::{RngContext, RngStream};
pub use run::{run, run_inference, RunOutcome};
pub use scheduler::PlateauScheduler;
pub use training::{EpochMetrics, EpochPhase, Trainer, TrainerSettings, TrainingHistory};
pub use visualize::render_grid;
