//! Multi-layer perceptron built from [`DenseLayer`]s.

use ndarray::Array2;
use serde::{Deserialize, Serialize};

use crate::checkpoint::CheckpointError;
use crate::neural::gradient::Activation;
use crate::neural::layer::{DenseLayer, LayerGradients, LayerTrace};
use crate::rng::RngContext;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct LayerConfigSnapshot {
    pub activation: Activation,
    pub shape: (usize, usize),
}

/// Architecture description stored next to serialized weights so that a
/// corrupted or mismatched file is rejected during load.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct NetworkConfigSnapshot {
    pub layer_configs: Vec<LayerConfigSnapshot>,
}

impl NetworkConfigSnapshot {
    pub fn from_layers(layers: &[DenseLayer]) -> Self {
        let layer_configs = layers
            .iter()
            .map(|layer| LayerConfigSnapshot {
                activation: layer.activation,
                shape: layer.weights.dim(),
            })
            .collect();

        Self { layer_configs }
    }

    pub fn validate_layers(&self, layers: &[DenseLayer]) -> Result<(), CheckpointError> {
        if layers.is_empty() {
            return Err(CheckpointError::InvalidFormat(
                "Network must contain at least one layer".to_string(),
            ));
        }

        if self.layer_configs.len() != layers.len() {
            return Err(CheckpointError::InvalidFormat(format!(
                "Layer count mismatch: expected {}, found {}",
                self.layer_configs.len(),
                layers.len()
            )));
        }

        for (expected, layer) in self.layer_configs.iter().zip(layers.iter()) {
            if expected.activation != layer.activation {
                return Err(CheckpointError::InvalidFormat(format!(
                    "Layer activation mismatch: expected {:?}, found {:?}",
                    expected.activation, layer.activation
                )));
            }

            if expected.shape != layer.weights.dim() || layer.bias.len() != expected.shape.0 {
                return Err(CheckpointError::InvalidFormat(format!(
                    "Layer shape mismatch: expected {:?}, found {:?}",
                    expected.shape,
                    layer.weights.dim()
                )));
            }
        }

        for pair in layers.windows(2) {
            if pair[0].output_dim() != pair[1].input_dim() {
                return Err(CheckpointError::InvalidFormat(format!(
                    "Layers do not chain: {} outputs feed {} inputs",
                    pair[0].output_dim(),
                    pair[1].input_dim()
                )));
            }
        }

        Ok(())
    }
}

/// Cached activations of one traced forward pass.
#[derive(Debug, Clone)]
pub struct MlpTrace {
    layers: Vec<LayerTrace>,
}

impl MlpTrace {
    /// Final output of the traced pass.
    pub fn output(&self) -> &Array2<f32> {
        // a trace always holds at least one layer
        &self.layers[self.layers.len() - 1].output
    }
}

/// A stack of dense layers applied in order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Mlp {
    layers: Vec<DenseLayer>,
}

impl Mlp {
    /// Builds an MLP from an already-validated layer list.
    pub(crate) fn from_layers(layers: Vec<DenseLayer>) -> Self {
        Self { layers }
    }

    /// Builds an MLP with the given widths.
    ///
    /// `widths = [in, h1, …, out]`; hidden layers use `hidden`, the final layer
    /// uses `output`.
    pub fn new(
        widths: &[usize],
        hidden: Activation,
        output: Activation,
        rng: &RngContext,
        stream_offset: u64,
    ) -> Self {
        assert!(widths.len() >= 2, "an MLP needs input and output widths");
        let last = widths.len() - 2;
        let layers = widths
            .windows(2)
            .enumerate()
            .map(|(idx, pair)| {
                let activation = if idx == last { output } else { hidden };
                DenseLayer::new(
                    pair[0],
                    pair[1],
                    activation,
                    rng,
                    stream_offset + idx as u64,
                )
            })
            .collect();
        Self { layers }
    }

    pub fn layers(&self) -> &[DenseLayer] {
        &self.layers
    }

    pub(crate) fn layers_mut(&mut self) -> &mut [DenseLayer] {
        &mut self.layers
    }

    pub fn input_dim(&self) -> usize {
        self.layers[0].input_dim()
    }

    pub fn output_dim(&self) -> usize {
        self.layers[self.layers.len() - 1].output_dim()
    }

    pub fn num_parameters(&self) -> usize {
        self.layers.iter().map(DenseLayer::num_parameters).sum()
    }

    /// Forward pass with no caching (inference / no-grad mode).
    pub fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        let mut activation = self.layers[0].forward(input);
        for layer in &self.layers[1..] {
            activation = layer.forward(&activation);
        }
        activation
    }

    /// Forward pass recording every layer's intermediates.
    pub fn forward_traced(&self, input: &Array2<f32>) -> MlpTrace {
        let mut traces: Vec<LayerTrace> = Vec::with_capacity(self.layers.len());
        for layer in &self.layers {
            let trace = match traces.last() {
                Some(previous) => layer.forward_traced(&previous.output),
                None => layer.forward_traced(input),
            };
            traces.push(trace);
        }
        MlpTrace { layers: traces }
    }

    /// Propagates `grad_output` back to the network input, ignoring parameters.
    pub fn backward_input(&self, trace: &MlpTrace, grad_output: &Array2<f32>) -> Array2<f32> {
        let mut grad = grad_output.clone();
        for (layer, layer_trace) in self.layers.iter().zip(trace.layers.iter()).rev() {
            grad = layer.backward_input(layer_trace, &grad);
        }
        grad
    }

    /// Full backward pass: input gradient plus per-layer parameter gradients
    /// in forward order.
    pub fn backward(
        &self,
        trace: &MlpTrace,
        grad_output: &Array2<f32>,
    ) -> (Array2<f32>, Vec<LayerGradients>) {
        let mut layer_gradients = Vec::with_capacity(self.layers.len());
        let mut grad = grad_output.clone();

        for (layer, layer_trace) in self.layers.iter().zip(trace.layers.iter()).rev() {
            let (grad_input, grads) = layer.backward(layer_trace, &grad);
            layer_gradients.push(grads);
            grad = grad_input;
        }

        layer_gradients.reverse();
        (grad, layer_gradients)
    }
}
