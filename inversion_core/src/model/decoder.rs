//! Frozen pretrained generator (and its critic).
//!
//! The adversarial training that produced these weights happens elsewhere;
//! this module only reads the two artifacts and exposes the generator as an
//! immutable, input-differentiable mapping.

use std::path::Path;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::checkpoint::{CheckpointError, Checkpointable};
use crate::error::{InversionError, InversionResult};
use crate::model::DifferentiableMap;
use crate::neural::network::NetworkConfigSnapshot;
use crate::neural::{Activation, DenseLayer, Mlp, MlpTrace};
use crate::rng::RngContext;

const ARTIFACT_VERSION: u32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
enum ArtifactKind {
    Generator,
    Critic,
}

#[derive(Serialize, Deserialize)]
struct ArtifactSnapshot {
    version: u32,
    kind: ArtifactKind,
    layers: Vec<DenseLayer>,
    config: NetworkConfigSnapshot,
}

fn write_artifact<P: AsRef<Path>>(
    kind: ArtifactKind,
    network: &Mlp,
    path: P,
) -> Result<(), CheckpointError> {
    let snapshot = ArtifactSnapshot {
        version: ARTIFACT_VERSION,
        kind,
        layers: network.layers().to_vec(),
        config: NetworkConfigSnapshot::from_layers(network.layers()),
    };
    GeneratorArtifact::write_snapshot(&snapshot, path)
}

fn read_artifact<P: AsRef<Path>>(kind: ArtifactKind, path: P) -> Result<Mlp, CheckpointError> {
    let snapshot: ArtifactSnapshot = GeneratorArtifact::read_snapshot(path)?;
    if snapshot.version != ARTIFACT_VERSION {
        return Err(CheckpointError::VersionMismatch {
            expected: ARTIFACT_VERSION,
            found: snapshot.version,
        });
    }
    if snapshot.kind != kind {
        return Err(CheckpointError::InvalidFormat(format!(
            "expected a {kind:?} artifact, found {:?}",
            snapshot.kind
        )));
    }
    snapshot.config.validate_layers(&snapshot.layers)?;
    Ok(Mlp::from_layers(snapshot.layers))
}

/// Serialized generator weights: latent `[N, latent_dim]` → image `[N, C·H·W]`.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorArtifact {
    network: Mlp,
}

impl GeneratorArtifact {
    /// Builds a randomly initialized generator with a `tanh` output, for
    /// smoke runs and tests where no pretrained artifact is at hand.
    pub fn random(latent_dim: usize, hidden_dims: &[usize], output_dim: usize, rng: &RngContext) -> Self {
        let mut widths = vec![latent_dim];
        widths.extend_from_slice(hidden_dims);
        widths.push(output_dim);
        Self {
            network: Mlp::new(&widths, Activation::Relu, Activation::Tanh, rng, 0),
        }
    }

    pub fn latent_dim(&self) -> usize {
        self.network.input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.network.output_dim()
    }
}

impl Checkpointable for GeneratorArtifact {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        write_artifact(ArtifactKind::Generator, &self.network, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        read_artifact(ArtifactKind::Generator, path).map(|network| Self { network })
    }
}

/// Serialized critic weights: image `[N, C·H·W]` → score `[N, 1]`.
#[derive(Debug, Clone, PartialEq)]
pub struct CriticArtifact {
    network: Mlp,
}

impl CriticArtifact {
    pub fn random(input_dim: usize, hidden_dims: &[usize], rng: &RngContext) -> Self {
        let mut widths = vec![input_dim];
        widths.extend_from_slice(hidden_dims);
        widths.push(1);
        Self {
            network: Mlp::new(&widths, Activation::LeakyRelu(0.2), Activation::Identity, rng, 500),
        }
    }

    pub fn input_dim(&self) -> usize {
        self.network.input_dim()
    }
}

impl Checkpointable for CriticArtifact {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        write_artifact(ArtifactKind::Critic, &self.network, path)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        read_artifact(ArtifactKind::Critic, path).map(|network| Self { network })
    }
}

/// The pretrained generator with its parameters sealed.
///
/// There is no `&mut self` method and the wrapped networks are private, so
/// nothing downstream can update the decoder once it is loaded. Gradients
/// still flow through it to its input via [`DifferentiableMap::backward_input`].
#[derive(Debug, Clone)]
pub struct FrozenDecoder {
    generator: Mlp,
    critic: Mlp,
}

impl FrozenDecoder {
    /// Loads the generator and critic artifacts.
    ///
    /// Fails with [`InversionError::MissingArtifact`] if either path is absent
    /// or does not hold a valid serialized model of the right kind.
    pub fn load<P: AsRef<Path>, Q: AsRef<Path>>(
        decoder_path: P,
        discriminator_path: Q,
    ) -> InversionResult<Self> {
        let decoder_path = decoder_path.as_ref();
        let discriminator_path = discriminator_path.as_ref();

        let generator = load_artifact::<GeneratorArtifact>(decoder_path)?;
        let critic = load_artifact::<CriticArtifact>(discriminator_path)?;
        let decoder = Self::from_artifacts(generator, critic)?;

        info!(
            "Loaded frozen decoder from {} (latent {}, output {})",
            decoder_path.display(),
            decoder.latent_dim(),
            decoder.image_dim()
        );
        Ok(decoder)
    }

    /// Seals already-loaded artifacts.
    pub fn from_artifacts(generator: GeneratorArtifact, critic: CriticArtifact) -> InversionResult<Self> {
        InversionError::check_dim(
            "generator output vs critic input",
            generator.output_dim(),
            critic.input_dim(),
        )?;
        Ok(Self {
            generator: generator.network,
            critic: critic.network,
        })
    }

    pub fn latent_dim(&self) -> usize {
        self.generator.input_dim()
    }

    /// Flattened size of one decoded image.
    pub fn image_dim(&self) -> usize {
        self.generator.output_dim()
    }

    /// Decodes a batch of latent codes into flattened images.
    pub fn decode(&self, latent: &Array2<f32>) -> Array2<f32> {
        self.generator.forward(latent)
    }

    /// Critic score per image. Diagnostic only; training and evaluation never
    /// consult it.
    pub fn critic_score(&self, images: &Array2<f32>) -> Array2<f32> {
        self.critic.forward(images)
    }
}

impl DifferentiableMap for FrozenDecoder {
    fn input_dim(&self) -> usize {
        self.latent_dim()
    }

    fn output_dim(&self) -> usize {
        self.image_dim()
    }

    fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        self.decode(input)
    }

    fn forward_traced(&self, input: &Array2<f32>) -> MlpTrace {
        self.generator.forward_traced(input)
    }

    fn backward_input(&self, trace: &MlpTrace, grad_output: &Array2<f32>) -> Array2<f32> {
        self.generator.backward_input(trace, grad_output)
    }
}

fn load_artifact<T: Checkpointable>(path: &Path) -> InversionResult<T> {
    if !path.is_file() {
        return Err(InversionError::missing_artifact(
            path,
            "artifact file does not exist",
        ));
    }
    T::load_checkpoint(path).map_err(|err| InversionError::missing_artifact(path, err))
}
