//! Trainable image → latent encoder.

use std::path::Path;

use ndarray::{Array2, ArrayViewD};
use serde::{Deserialize, Serialize};

use crate::checkpoint::{CheckpointError, Checkpointable};
use crate::model::DifferentiableMap;
use crate::neural::network::NetworkConfigSnapshot;
use crate::neural::{Activation, AdamOptimizer, DenseLayer, LayerGradients, Mlp, MlpTrace};
use crate::rng::RngContext;

const ENCODER_CHECKPOINT_VERSION: u32 = 1;

/// Init streams of the encoder start here so they never collide with the
/// streams used to synthesize decoder artifacts.
const ENCODER_STREAM_OFFSET: u64 = 1_000;

#[derive(Serialize, Deserialize)]
struct EncoderSnapshot {
    version: u32,
    epoch: usize,
    layers: Vec<DenseLayer>,
    config: NetworkConfigSnapshot,
}

/// Gradients for every encoder layer, in forward order.
#[derive(Debug, Clone)]
pub struct EncoderGradients {
    pub layers: Vec<LayerGradients>,
}

/// Maps flattened, normalized images to latent codes.
///
/// # Architecture
///
/// ```text
/// image [N, C·H·W] → (dense → LeakyReLU(0.2))* → dense → latent [N, latent_dim]
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct Encoder {
    network: Mlp,
}

impl Encoder {
    /// Creates an encoder with seeded initialization.
    ///
    /// # Examples
    ///
    /// ```
    /// use latent_inversion_core::model::Encoder;
    /// use latent_inversion_core::rng::RngContext;
    ///
    /// let encoder = Encoder::new(3 * 8 * 8, &[64], 16, &RngContext::new(0));
    /// assert_eq!(encoder.latent_dim(), 16);
    /// ```
    pub fn new(input_dim: usize, hidden_dims: &[usize], latent_dim: usize, rng: &RngContext) -> Self {
        let mut widths = Vec::with_capacity(hidden_dims.len() + 2);
        widths.push(input_dim);
        widths.extend_from_slice(hidden_dims);
        widths.push(latent_dim);

        Self {
            network: Mlp::new(
                &widths,
                Activation::LeakyRelu(0.2),
                Activation::Identity,
                rng,
                ENCODER_STREAM_OFFSET,
            ),
        }
    }

    pub fn latent_dim(&self) -> usize {
        self.network.output_dim()
    }

    pub fn num_parameters(&self) -> usize {
        self.network.num_parameters()
    }

    /// Produces one latent code per input row.
    pub fn encode(&self, images: &Array2<f32>) -> Array2<f32> {
        self.network.forward(images)
    }

    /// Parameter gradients given the gradient of the loss w.r.t. the latent codes.
    pub fn backward(&self, trace: &MlpTrace, grad_latent: &Array2<f32>) -> EncoderGradients {
        let (_, layers) = self.network.backward(trace, grad_latent);
        EncoderGradients { layers }
    }

    /// Enumerates the learnable parameters under the names the optimizer
    /// binds its moment estimates to.
    pub fn parameters(&self) -> Vec<(String, ArrayViewD<'_, f32>)> {
        self.network
            .layers()
            .iter()
            .enumerate()
            .flat_map(|(idx, layer)| {
                let (weights, bias) = parameter_names(idx);
                [
                    (weights, layer.weights.view().into_dyn()),
                    (bias, layer.bias.view().into_dyn()),
                ]
            })
            .collect()
    }

    /// Applies one optimizer step to every parameter.
    pub fn apply_gradients(&mut self, gradients: &EncoderGradients, optimizer: &mut AdamOptimizer) {
        assert_eq!(
            gradients.layers.len(),
            self.network.layers().len(),
            "gradient count must match layer count"
        );

        optimizer.begin_step();
        for (idx, (layer, grads)) in self
            .network
            .layers_mut()
            .iter_mut()
            .zip(gradients.layers.iter())
            .enumerate()
        {
            let (weights, bias) = parameter_names(idx);
            optimizer.update(&weights, &mut layer.weights, &grads.weights);
            optimizer.update(&bias, &mut layer.bias, &grads.bias);
        }
    }

    /// Saves the encoder tagged with `epoch`.
    pub fn save_tagged<P: AsRef<Path>>(&self, path: P, epoch: usize) -> Result<(), CheckpointError> {
        let snapshot = EncoderSnapshot {
            version: ENCODER_CHECKPOINT_VERSION,
            epoch,
            layers: self.network.layers().to_vec(),
            config: NetworkConfigSnapshot::from_layers(self.network.layers()),
        };

        Self::write_snapshot(&snapshot, path)
    }

    /// Loads an encoder together with its epoch tag.
    pub fn load_tagged<P: AsRef<Path>>(path: P) -> Result<(Self, usize), CheckpointError> {
        let snapshot: EncoderSnapshot = Self::read_snapshot(path)?;
        if snapshot.version != ENCODER_CHECKPOINT_VERSION {
            return Err(CheckpointError::VersionMismatch {
                expected: ENCODER_CHECKPOINT_VERSION,
                found: snapshot.version,
            });
        }

        snapshot.config.validate_layers(&snapshot.layers)?;

        Ok((
            Self {
                network: Mlp::from_layers(snapshot.layers),
            },
            snapshot.epoch,
        ))
    }
}

/// Optimizer keys of layer `idx`: `(weights, bias)`.
fn parameter_names(idx: usize) -> (String, String) {
    (format!("layer{idx}_weights"), format!("layer{idx}_bias"))
}

impl DifferentiableMap for Encoder {
    fn input_dim(&self) -> usize {
        self.network.input_dim()
    }

    fn output_dim(&self) -> usize {
        self.network.output_dim()
    }

    fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        self.encode(input)
    }

    fn forward_traced(&self, input: &Array2<f32>) -> MlpTrace {
        self.network.forward_traced(input)
    }

    fn backward_input(&self, trace: &MlpTrace, grad_output: &Array2<f32>) -> Array2<f32> {
        self.network.backward_input(trace, grad_output)
    }
}

impl Checkpointable for Encoder {
    fn save_checkpoint<P: AsRef<Path>>(&self, path: P) -> Result<(), CheckpointError> {
        self.save_tagged(path, 0)
    }

    fn load_checkpoint<P: AsRef<Path>>(path: P) -> Result<Self, CheckpointError> {
        Self::load_tagged(path).map(|(encoder, _)| encoder)
    }
}
