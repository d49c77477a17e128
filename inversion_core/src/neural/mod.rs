//! Neural network building blocks.
//!
//! Dense layers with hand-written backpropagation, the MLP that stacks them,
//! the Adam optimizer and the reconstruction losses. Everything operates on
//! row-major `ndarray` batches of shape `[N, features]`.

pub mod gradient;
pub mod layer;
pub mod loss;
pub mod network;
pub mod optimizer;

pub use gradient::Activation;
pub use layer::{DenseLayer, LayerGradients, LayerTrace};
pub use loss::{l1_distance_sum, l2_distance_sum, mse_loss, mse_loss_with_gradients};
pub use network::{Mlp, MlpTrace};
pub use optimizer::{AdamOptimizer, LearningRate};
