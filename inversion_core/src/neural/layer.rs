//! Fully-connected layer with hand-written backpropagation.

use ndarray::{Array1, Array2, Axis};
use rand::Rng;
use serde::{Deserialize, Serialize};

use crate::neural::gradient::Activation;
use crate::rng::{RngContext, RngStream};

/// A dense layer operating on row-major batches.
///
/// # Architecture
///
/// ```text
/// input [N, in] → input · Wᵀ + b → activation → output [N, out]
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DenseLayer {
    /// Learnable weights, `[out, in]`
    pub weights: Array2<f32>,
    /// Learnable bias, `[out]`
    pub bias: Array1<f32>,
    /// Non-linearity applied after the affine transform
    pub activation: Activation,
}

/// Values cached by [`DenseLayer::forward_traced`] for the backward pass.
#[derive(Debug, Clone)]
pub struct LayerTrace {
    pub input: Array2<f32>,
    pub pre_activation: Array2<f32>,
    pub output: Array2<f32>,
}

/// Parameter gradients of a single layer.
#[derive(Debug, Clone)]
pub struct LayerGradients {
    pub weights: Array2<f32>,
    pub bias: Array1<f32>,
}

impl DenseLayer {
    /// Creates a layer with Xavier-uniform weights and zero bias.
    ///
    /// # Arguments
    ///
    /// * `input_dim` - Width of incoming rows
    /// * `output_dim` - Width of produced rows
    /// * `activation` - Non-linearity after the affine map
    /// * `rng` - Seeding context
    /// * `layer_id` - Distinguishes the init stream of this layer
    pub fn new(
        input_dim: usize,
        output_dim: usize,
        activation: Activation,
        rng: &RngContext,
        layer_id: u64,
    ) -> Self {
        let mut rng = rng.stream(RngStream::Init(layer_id));
        let scale = (6.0 / (input_dim + output_dim) as f32).sqrt();
        let weights = Array2::from_shape_fn((output_dim, input_dim), |_| {
            (rng.gen::<f32>() * 2.0 - 1.0) * scale
        });

        Self {
            weights,
            bias: Array1::zeros(output_dim),
            activation,
        }
    }

    pub fn input_dim(&self) -> usize {
        self.weights.ncols()
    }

    pub fn output_dim(&self) -> usize {
        self.weights.nrows()
    }

    fn affine(&self, input: &Array2<f32>) -> Array2<f32> {
        input.dot(&self.weights.t()) + &self.bias
    }

    /// Forward pass without caching anything.
    pub fn forward(&self, input: &Array2<f32>) -> Array2<f32> {
        self.activation.apply(&self.affine(input))
    }

    /// Forward pass that keeps the intermediate values needed by `backward`.
    pub fn forward_traced(&self, input: &Array2<f32>) -> LayerTrace {
        let pre_activation = self.affine(input);
        let output = self.activation.apply(&pre_activation);
        LayerTrace {
            input: input.clone(),
            pre_activation,
            output,
        }
    }

    /// Gradient with respect to the layer input only.
    pub fn backward_input(&self, trace: &LayerTrace, grad_output: &Array2<f32>) -> Array2<f32> {
        let grad_pre =
            self.activation
                .backward(grad_output, &trace.pre_activation, &trace.output);
        grad_pre.dot(&self.weights)
    }

    /// Gradients with respect to the input and both parameters.
    ///
    /// Parameter gradients are summed over the batch; the loss is expected to
    /// already carry the `1/N` of a mean reduction.
    pub fn backward(
        &self,
        trace: &LayerTrace,
        grad_output: &Array2<f32>,
    ) -> (Array2<f32>, LayerGradients) {
        let grad_pre =
            self.activation
                .backward(grad_output, &trace.pre_activation, &trace.output);
        let grad_input = grad_pre.dot(&self.weights);
        let grads = LayerGradients {
            weights: grad_pre.t().dot(&trace.input),
            bias: grad_pre.sum_axis(Axis(0)),
        };
        (grad_input, grads)
    }

    /// Number of learnable scalars.
    pub fn num_parameters(&self) -> usize {
        self.weights.len() + self.bias.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn test_layer_creation() {
        let layer = DenseLayer::new(12, 4, Activation::Relu, &RngContext::new(42), 0);
        assert_eq!(layer.weights.dim(), (4, 12));
        assert_eq!(layer.bias.len(), 4);
        assert_eq!(layer.num_parameters(), 52);
    }

    #[test]
    fn test_forward_shape() {
        let layer = DenseLayer::new(6, 3, Activation::Tanh, &RngContext::new(1), 0);
        let input = Array2::from_elem((5, 6), 0.25);
        let output = layer.forward(&input);
        assert_eq!(output.dim(), (5, 3));
        assert!(output.iter().all(|v| v.abs() < 1.0));
    }

    #[test]
    fn test_backward_matches_manual_linear_case() {
        let layer = DenseLayer {
            weights: array![[1.0, 2.0], [3.0, 4.0]],
            bias: array![0.5, -0.5],
            activation: Activation::Identity,
        };
        let input = array![[1.0, -1.0]];
        let trace = layer.forward_traced(&input);
        assert_eq!(trace.output, array![[-0.5, -1.5]]);

        let (grad_input, grads) = layer.backward(&trace, &array![[1.0, 1.0]]);
        assert_eq!(grad_input, array![[4.0, 6.0]]);
        assert_eq!(grads.weights, array![[1.0, -1.0], [1.0, -1.0]]);
        assert_eq!(grads.bias, array![1.0, 1.0]);
        assert_eq!(layer.backward_input(&trace, &array![[1.0, 1.0]]), grad_input);
    }

    #[test]
    fn test_init_is_seeded() {
        let a = DenseLayer::new(8, 8, Activation::Relu, &RngContext::new(9), 3);
        let b = DenseLayer::new(8, 8, Activation::Relu, &RngContext::new(9), 3);
        let c = DenseLayer::new(8, 8, Activation::Relu, &RngContext::new(9), 4);
        assert_eq!(a, b);
        assert_ne!(a.weights, c.weights);
    }
}
