use ndarray::Array2;

use crate::neural::MlpTrace;

/// A mapping from one batch of arrays to another that can propagate
/// gradients back to its input.
///
/// [`crate::model::Encoder`] is the trainable implementation and
/// [`crate::model::FrozenDecoder`] the frozen one. Only the encoder exposes a
/// parameter update path; the trait itself never mutates `self`.
pub trait DifferentiableMap {
    /// Width of each input row.
    fn input_dim(&self) -> usize;

    /// Width of each output row.
    fn output_dim(&self) -> usize;

    /// Forward pass without recording intermediates (no-grad mode).
    fn forward(&self, input: &Array2<f32>) -> Array2<f32>;

    /// Forward pass recording what `backward_input` needs.
    fn forward_traced(&self, input: &Array2<f32>) -> MlpTrace;

    /// Gradient of the loss with respect to the input of the traced pass.
    fn backward_input(&self, trace: &MlpTrace, grad_output: &Array2<f32>) -> Array2<f32>;
}
