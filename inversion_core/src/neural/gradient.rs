//! Activation functions and their derivatives.
//!
//! Each activation is applied element-wise to a batch of pre-activations.
//! The backward rules take the cached pre-activation and output so that no
//! activation needs to be recomputed during backpropagation.

use ndarray::{Array2, Zip};
use serde::{Deserialize, Serialize};

/// Element-wise non-linearity applied after a dense transform.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum Activation {
    /// Passes values through unchanged.
    Identity,
    /// `max(0, x)`
    Relu,
    /// `x` for positive inputs, `slope * x` otherwise.
    LeakyRelu(f32),
    /// Hyperbolic tangent, bounded to `(-1, 1)`.
    Tanh,
}

impl Activation {
    /// Forward: maps pre-activations to activations.
    pub fn apply(&self, pre: &Array2<f32>) -> Array2<f32> {
        match *self {
            Activation::Identity => pre.clone(),
            Activation::Relu => pre.mapv(|x| x.max(0.0)),
            Activation::LeakyRelu(slope) => pre.mapv(|x| if x > 0.0 { x } else { slope * x }),
            Activation::Tanh => pre.mapv(f32::tanh),
        }
    }

    /// Backward: ∂L/∂pre given ∂L/∂out, the cached pre-activation and output.
    ///
    /// ```text
    /// Relu:       ∂out/∂pre = 1[pre > 0]
    /// LeakyRelu:  ∂out/∂pre = 1 or slope
    /// Tanh:       ∂out/∂pre = 1 - out²
    /// ```
    pub fn backward(
        &self,
        grad_output: &Array2<f32>,
        pre: &Array2<f32>,
        output: &Array2<f32>,
    ) -> Array2<f32> {
        let mut grad = grad_output.clone();
        match *self {
            Activation::Identity => {}
            Activation::Relu => {
                Zip::from(&mut grad).and(pre).for_each(|g, &x| {
                    if x <= 0.0 {
                        *g = 0.0;
                    }
                });
            }
            Activation::LeakyRelu(slope) => {
                Zip::from(&mut grad).and(pre).for_each(|g, &x| {
                    if x <= 0.0 {
                        *g *= slope;
                    }
                });
            }
            Activation::Tanh => {
                Zip::from(&mut grad)
                    .and(output)
                    .par_for_each(|g, &y| *g *= 1.0 - y * y);
            }
        }
        grad
    }
}
