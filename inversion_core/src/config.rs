//! Run configuration loaded from TOML.
//!
//! The file is deserialized into raw structs whose missing fields take
//! defaults, then validated into [`InversionConfig`]. Every field is optional;
//! an empty document yields the default configuration.

use std::fs;
use std::path::{Path, PathBuf};

use clap::ValueEnum;
use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::data::{ImageShape, SplitStrategy};

/// What a run does once the decoder and data are loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum Mode {
    #[default]
    Train,
    /// Load a saved encoder, render grids and report distances.
    Infer,
}

/// Requested compute device.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DevicePreference {
    #[default]
    Cpu,
    Cuda,
}

impl DevicePreference {
    /// The device actually used. Only the CPU backend exists, so a `cuda`
    /// request falls back with a warning.
    pub fn resolve(self) -> DevicePreference {
        if self == DevicePreference::Cuda {
            warn!("CUDA requested but only the CPU backend is available; falling back to CPU");
        }
        DevicePreference::Cpu
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DataSource {
    #[default]
    Cifar10,
    Synthetic,
}

/// Validated run configuration.
///
/// # Examples
///
/// ```
/// use latent_inversion_core::config::{InversionConfig, Mode};
///
/// let config = InversionConfig::from_str("mode = \"infer\"\nsplit_index = 3").unwrap();
/// assert_eq!(config.mode, Mode::Infer);
/// assert!(config.paths.checkpoint_dir.ends_with("split3"));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InversionConfig {
    pub channels: usize,
    pub mode: Mode,
    pub device: DevicePreference,
    /// Upper bound on optimizer steps; checked at epoch boundaries.
    pub iterations: usize,
    pub batch_size: usize,
    pub learning_rate: f32,
    pub betas: (f32, f32),
    pub weight_decay: f32,
    pub epochs: usize,
    pub split_index: usize,
    pub checkpoint_period: usize,
    pub seed: u64,
    /// Images per reconstruction grid.
    pub vis_samples: usize,
    pub scheduler: SchedulerConfig,
    pub model: ModelConfig,
    pub data: DataConfig,
    pub paths: PathsConfig,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SchedulerConfig {
    pub factor: f32,
    pub patience: usize,
    pub threshold: f32,
    pub min_lr: f32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelConfig {
    pub latent_dim: usize,
    pub encoder_hidden: Vec<usize>,
    pub image_size: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DataConfig {
    pub source: DataSource,
    pub root: PathBuf,
    pub num_classes: usize,
    pub num_known: usize,
    pub split_strategy: SplitStrategy,
    /// Prefetch depth of the loaders.
    pub workers: usize,
    pub synthetic_train_per_class: usize,
    pub synthetic_val_per_class: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PathsConfig {
    pub decoder: PathBuf,
    pub discriminator: PathBuf,
    pub checkpoint_dir: PathBuf,
    pub output_dir: PathBuf,
    pub metrics: PathBuf,
    /// Epoch tag of the checkpoint loaded in inference mode.
    pub infer_checkpoint_epoch: usize,
}

impl InversionConfig {
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(&path)?;
        Self::from_str(&contents)
    }

    pub fn from_str(toml_str: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig =
            toml::from_str(toml_str).map_err(|err| ConfigError::Parse(err.to_string()))?;
        Self::try_from(raw)
    }

    /// Geometry of the images the encoder consumes.
    pub fn image_shape(&self) -> ImageShape {
        ImageShape::new(self.channels, self.model.image_size, self.model.image_size)
    }

    fn try_from(raw: RawConfig) -> Result<Self, ConfigError> {
        let invalid = |msg: &str| Err(ConfigError::Parse(msg.to_string()));

        if raw.channels == 0 {
            return invalid("channels must be ≥ 1");
        }
        if raw.batch_size == 0 {
            return invalid("batch_size must be ≥ 1");
        }
        if raw.epochs == 0 {
            return invalid("epochs must be ≥ 1");
        }
        if raw.iterations == 0 {
            return invalid("iterations must be ≥ 1");
        }
        if raw.checkpoint_period == 0 {
            return invalid("checkpoint_period must be ≥ 1");
        }
        if !raw.learning_rate.is_finite() || raw.learning_rate <= 0.0 {
            return invalid("learning_rate must be positive");
        }
        let [beta1, beta2] = raw.betas;
        if !(0.0..1.0).contains(&beta1) || !(0.0..1.0).contains(&beta2) {
            return invalid("betas must lie in [0, 1)");
        }
        if !raw.weight_decay.is_finite() || raw.weight_decay < 0.0 {
            return invalid("weight_decay must be ≥ 0");
        }
        if raw.vis_samples == 0 {
            return invalid("vis_samples must be ≥ 1");
        }

        let scheduler = SchedulerConfig::try_from(&raw.scheduler)?;
        let model = ModelConfig::try_from(&raw.model)?;
        let data = DataConfig::try_from(&raw.data)?;

        Ok(Self::assemble(raw, scheduler, model, data))
    }

    fn assemble(
        raw: RawConfig,
        scheduler: SchedulerConfig,
        model: ModelConfig,
        data: DataConfig,
    ) -> Self {
        let paths = PathsConfig::resolve(raw.paths, raw.split_index, raw.epochs);
        Self {
            channels: raw.channels,
            mode: raw.mode,
            device: raw.device,
            iterations: raw.iterations,
            batch_size: raw.batch_size,
            learning_rate: raw.learning_rate,
            betas: (raw.betas[0], raw.betas[1]),
            weight_decay: raw.weight_decay,
            epochs: raw.epochs,
            split_index: raw.split_index,
            checkpoint_period: raw.checkpoint_period,
            seed: raw.seed,
            vis_samples: raw.vis_samples,
            scheduler,
            model,
            data,
            paths,
        }
    }
}

impl Default for InversionConfig {
    fn default() -> Self {
        let raw = RawConfig::default();
        Self::assemble(
            raw,
            SchedulerConfig {
                factor: default_factor(),
                patience: default_patience(),
                threshold: default_threshold(),
                min_lr: default_min_lr(),
            },
            ModelConfig {
                latent_dim: default_latent_dim(),
                encoder_hidden: default_encoder_hidden(),
                image_size: default_image_size(),
            },
            DataConfig {
                source: DataSource::default(),
                root: default_data_root(),
                num_classes: default_num_classes(),
                num_known: default_num_known(),
                split_strategy: SplitStrategy::default(),
                workers: default_workers(),
                synthetic_train_per_class: default_synthetic_train(),
                synthetic_val_per_class: default_synthetic_val(),
            },
        )
    }
}

impl SchedulerConfig {
    fn try_from(raw: &RawScheduler) -> Result<Self, ConfigError> {
        if !(raw.factor > 0.0 && raw.factor < 1.0) {
            return Err(ConfigError::Parse(
                "scheduler.factor must lie in (0, 1)".into(),
            ));
        }
        if !raw.threshold.is_finite() || raw.threshold < 0.0 {
            return Err(ConfigError::Parse("scheduler.threshold must be ≥ 0".into()));
        }
        if !raw.min_lr.is_finite() || raw.min_lr < 0.0 {
            return Err(ConfigError::Parse("scheduler.min_lr must be ≥ 0".into()));
        }

        Ok(Self {
            factor: raw.factor,
            patience: raw.patience,
            threshold: raw.threshold,
            min_lr: raw.min_lr,
        })
    }
}

impl ModelConfig {
    fn try_from(raw: &RawModel) -> Result<Self, ConfigError> {
        if raw.latent_dim == 0 {
            return Err(ConfigError::Parse("model.latent_dim must be ≥ 1".into()));
        }
        if raw.image_size == 0 {
            return Err(ConfigError::Parse("model.image_size must be ≥ 1".into()));
        }
        if raw.encoder_hidden.iter().any(|&width| width == 0) {
            return Err(ConfigError::Parse(
                "model.encoder_hidden widths must be ≥ 1".into(),
            ));
        }

        Ok(Self {
            latent_dim: raw.latent_dim,
            encoder_hidden: raw.encoder_hidden.clone(),
            image_size: raw.image_size,
        })
    }
}

impl DataConfig {
    fn try_from(raw: &RawData) -> Result<Self, ConfigError> {
        if raw.num_classes < 2 {
            return Err(ConfigError::Parse("data.num_classes must be ≥ 2".into()));
        }
        if raw.num_known == 0 || raw.num_known >= raw.num_classes {
            return Err(ConfigError::Parse(
                "data.num_known must lie in 1..num_classes".into(),
            ));
        }

        Ok(Self {
            source: raw.source,
            root: raw.root.clone(),
            num_classes: raw.num_classes,
            num_known: raw.num_known,
            split_strategy: raw.split_strategy,
            workers: raw.workers.max(1),
            synthetic_train_per_class: raw.synthetic_train_per_class,
            synthetic_val_per_class: raw.synthetic_val_per_class,
        })
    }
}

impl PathsConfig {
    fn resolve(raw: RawPaths, split_index: usize, epochs: usize) -> Self {
        let pretrained = PathBuf::from(format!("ckpt/wgan_gp/split{split_index}"));
        let output_dir = raw
            .output_dir
            .unwrap_or_else(|| PathBuf::from(format!("output/wgan_encoder/split{split_index}")));
        Self {
            decoder: raw
                .decoder
                .unwrap_or_else(|| pretrained.join("generator.bin")),
            discriminator: raw
                .discriminator
                .unwrap_or_else(|| pretrained.join("discriminator.bin")),
            checkpoint_dir: raw
                .checkpoint_dir
                .unwrap_or_else(|| PathBuf::from(format!("ckpt/wgan_encoder/split{split_index}"))),
            metrics: raw
                .metrics
                .unwrap_or_else(|| output_dir.join("metrics.jsonl")),
            output_dir,
            infer_checkpoint_epoch: raw.infer_checkpoint_epoch.unwrap_or(epochs),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawConfig {
    #[serde(default = "default_channels")]
    channels: usize,
    #[serde(default)]
    mode: Mode,
    #[serde(default)]
    device: DevicePreference,
    #[serde(default = "default_iterations")]
    iterations: usize,
    #[serde(default = "default_batch_size")]
    batch_size: usize,
    #[serde(default = "default_learning_rate")]
    learning_rate: f32,
    #[serde(default = "default_betas")]
    betas: [f32; 2],
    #[serde(default = "default_weight_decay")]
    weight_decay: f32,
    #[serde(default = "default_epochs")]
    epochs: usize,
    #[serde(default = "default_split_index")]
    split_index: usize,
    #[serde(default = "default_checkpoint_period")]
    checkpoint_period: usize,
    #[serde(default)]
    seed: u64,
    #[serde(default = "default_vis_samples")]
    vis_samples: usize,
    #[serde(default)]
    scheduler: RawScheduler,
    #[serde(default)]
    model: RawModel,
    #[serde(default)]
    data: RawData,
    #[serde(default)]
    paths: RawPaths,
}

impl Default for RawConfig {
    fn default() -> Self {
        Self {
            channels: default_channels(),
            mode: Mode::default(),
            device: DevicePreference::default(),
            iterations: default_iterations(),
            batch_size: default_batch_size(),
            learning_rate: default_learning_rate(),
            betas: default_betas(),
            weight_decay: default_weight_decay(),
            epochs: default_epochs(),
            split_index: default_split_index(),
            checkpoint_period: default_checkpoint_period(),
            seed: 0,
            vis_samples: default_vis_samples(),
            scheduler: RawScheduler::default(),
            model: RawModel::default(),
            data: RawData::default(),
            paths: RawPaths::default(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawScheduler {
    #[serde(default = "default_factor")]
    factor: f32,
    #[serde(default = "default_patience")]
    patience: usize,
    #[serde(default = "default_threshold")]
    threshold: f32,
    #[serde(default = "default_min_lr")]
    min_lr: f32,
}

impl Default for RawScheduler {
    fn default() -> Self {
        Self {
            factor: default_factor(),
            patience: default_patience(),
            threshold: default_threshold(),
            min_lr: default_min_lr(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawModel {
    #[serde(default = "default_latent_dim")]
    latent_dim: usize,
    #[serde(default = "default_encoder_hidden")]
    encoder_hidden: Vec<usize>,
    #[serde(default = "default_image_size")]
    image_size: usize,
}

impl Default for RawModel {
    fn default() -> Self {
        Self {
            latent_dim: default_latent_dim(),
            encoder_hidden: default_encoder_hidden(),
            image_size: default_image_size(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawData {
    #[serde(default)]
    source: DataSource,
    #[serde(default = "default_data_root")]
    root: PathBuf,
    #[serde(default = "default_num_classes")]
    num_classes: usize,
    #[serde(default = "default_num_known")]
    num_known: usize,
    #[serde(default)]
    split_strategy: SplitStrategy,
    #[serde(default = "default_workers")]
    workers: usize,
    #[serde(default = "default_synthetic_train")]
    synthetic_train_per_class: usize,
    #[serde(default = "default_synthetic_val")]
    synthetic_val_per_class: usize,
}

impl Default for RawData {
    fn default() -> Self {
        Self {
            source: DataSource::default(),
            root: default_data_root(),
            num_classes: default_num_classes(),
            num_known: default_num_known(),
            split_strategy: SplitStrategy::default(),
            workers: default_workers(),
            synthetic_train_per_class: default_synthetic_train(),
            synthetic_val_per_class: default_synthetic_val(),
        }
    }
}

#[derive(Debug, Default, Deserialize)]
struct RawPaths {
    decoder: Option<PathBuf>,
    discriminator: Option<PathBuf>,
    checkpoint_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    metrics: Option<PathBuf>,
    infer_checkpoint_epoch: Option<usize>,
}

fn default_channels() -> usize {
    3
}

fn default_iterations() -> usize {
    40_000
}

fn default_batch_size() -> usize {
    128
}

fn default_learning_rate() -> f32 {
    1.0e-3
}

fn default_betas() -> [f32; 2] {
    [0.5, 0.999]
}

fn default_weight_decay() -> f32 {
    1.0e-4
}

fn default_epochs() -> usize {
    100
}

fn default_split_index() -> usize {
    1
}

fn default_checkpoint_period() -> usize {
    25
}

fn default_vis_samples() -> usize {
    20
}

fn default_factor() -> f32 {
    0.5
}

fn default_patience() -> usize {
    10
}

fn default_threshold() -> f32 {
    1.0e-4
}

fn default_min_lr() -> f32 {
    1.0e-6
}

fn default_latent_dim() -> usize {
    100
}

fn default_encoder_hidden() -> Vec<usize> {
    vec![512]
}

fn default_image_size() -> usize {
    32
}

fn default_data_root() -> PathBuf {
    PathBuf::from("data")
}

fn default_num_classes() -> usize {
    10
}

fn default_num_known() -> usize {
    6
}

fn default_workers() -> usize {
    8
}

fn default_synthetic_train() -> usize {
    100
}

fn default_synthetic_val() -> usize {
    20
}

#[derive(Debug)]
pub enum ConfigError {
    Io(std::io::Error),
    Parse(String),
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Io(err) => write!(f, "IO error: {}", err),
            ConfigError::Parse(err) => write!(f, "Parse error: {}", err),
        }
    }
}

impl std::error::Error for ConfigError {}

impl From<std::io::Error> for ConfigError {
    fn from(value: std::io::Error) -> Self {
        ConfigError::Io(value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_document_yields_defaults() {
        let config = InversionConfig::from_str("").unwrap();
        assert_eq!(config, InversionConfig::default());
        assert_eq!(config.batch_size, 128);
        assert_eq!(config.betas, (0.5, 0.999));
        assert_eq!(config.scheduler.patience, 10);
        assert_eq!(config.data.num_known, 6);
        assert_eq!(config.paths.infer_checkpoint_epoch, 100);
        assert_eq!(
            config.paths.decoder,
            PathBuf::from("ckpt/wgan_gp/split1/generator.bin")
        );
        assert_eq!(config.image_shape().numel(), 3 * 32 * 32);
    }

    #[test]
    fn mode_names_match_on_command_line_and_in_toml() {
        assert_eq!(<Mode as ValueEnum>::from_str("infer", false), Ok(Mode::Infer));
        assert_eq!(<Mode as ValueEnum>::from_str("train", false), Ok(Mode::Train));
        assert!(<Mode as ValueEnum>::from_str("eval", false).is_err());
        let config = InversionConfig::from_str("mode = \"infer\"").unwrap();
        assert_eq!(config.mode, Mode::Infer);
    }

    #[test]
    fn parses_sections() {
        let toml = r#"
            mode = "infer"
            device = "cuda"
            epochs = 4
            betas = [0.9, 0.99]

            [scheduler]
            factor = 0.25

            [model]
            encoder_hidden = [64, 32]

            [data]
            source = "synthetic"
            split_strategy = "shuffled"

            [paths]
            output_dir = "out"
        "#;
        let config = InversionConfig::from_str(toml).unwrap();
        assert_eq!(config.mode, Mode::Infer);
        assert_eq!(config.device.resolve(), DevicePreference::Cpu);
        assert_eq!(config.betas, (0.9, 0.99));
        assert_eq!(config.scheduler.factor, 0.25);
        assert_eq!(config.model.encoder_hidden, vec![64, 32]);
        assert_eq!(config.data.source, DataSource::Synthetic);
        assert_eq!(config.data.split_strategy, SplitStrategy::Shuffled);
        assert_eq!(config.paths.metrics, PathBuf::from("out/metrics.jsonl"));
        assert_eq!(config.paths.infer_checkpoint_epoch, 4);
    }

    #[test]
    fn rejects_invalid_values() {
        for toml in [
            "batch_size = 0",
            "epochs = 0",
            "checkpoint_period = 0",
            "learning_rate = -1.0",
            "betas = [1.0, 0.9]",
            "[scheduler]\nfactor = 1.0",
            "[data]\nnum_known = 10",
            "mode = \"eval\"",
        ] {
            assert!(
                InversionConfig::from_str(toml).is_err(),
                "accepted invalid config: {toml}"
            );
        }
    }
}
